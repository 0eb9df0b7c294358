//! Self-update watch: polls the service's own executable and reports once a
//! modification has settled, so a freshly installed build takes over on the
//! next start.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const MIN_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The watched executable changed and has been stable for one poll.
    ExecutableModified(PathBuf),
}

/// Turns a series of modification-time samples into a single "changes done"
/// edge: a new mtime must be seen twice in a row. A failed stat (file being
/// replaced) counts as still changing.
#[derive(Debug, Clone)]
pub struct ChangeTracker {
    baseline: SystemTime,
    pending: Option<SystemTime>,
}

impl ChangeTracker {
    pub fn new(baseline: SystemTime) -> Self {
        Self {
            baseline,
            pending: None,
        }
    }

    pub fn observe(&mut self, current: Option<SystemTime>) -> bool {
        match current {
            None => {
                self.pending = None;
                false
            }
            Some(mtime) if mtime == self.baseline => {
                self.pending = None;
                false
            }
            Some(mtime) if self.pending == Some(mtime) => true,
            Some(mtime) => {
                self.pending = Some(mtime);
                false
            }
        }
    }
}

pub fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Spawn the poller. Returns `None` when the file cannot be stat'ed up front.
pub fn spawn_executable_watcher(
    path: PathBuf,
    interval: Duration,
    events: mpsc::Sender<WatchEvent>,
) -> Option<JoinHandle<()>> {
    let Some(baseline) = modified_time(&path) else {
        tracing::warn!(
            "Cannot stat {}; self-update watch disabled",
            path.display()
        );
        return None;
    };

    let interval = interval.max(MIN_INTERVAL);
    tracing::info!(
        "Watching {} for changes (every {}ms)",
        path.display(),
        interval.as_millis()
    );

    Some(tokio::spawn(async move {
        let mut tracker = ChangeTracker::new(baseline);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if tracker.observe(modified_time(&path)) {
                        tracing::info!("{} finished changing", path.display());
                        let _ = events.send(WatchEvent::ExecutableModified(path.clone())).await;
                        break;
                    }
                }
                _ = events.closed() => {
                    tracing::debug!("Executable watcher shutting down");
                    break;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_unchanged_file_never_fires() {
        let mut tracker = ChangeTracker::new(at(100));
        for _ in 0..5 {
            assert!(!tracker.observe(Some(at(100))));
        }
    }

    #[test]
    fn test_fires_once_new_mtime_is_stable() {
        let mut tracker = ChangeTracker::new(at(100));
        assert!(!tracker.observe(Some(at(200))));
        assert!(tracker.observe(Some(at(200))));
    }

    #[test]
    fn test_ongoing_writes_delay_the_event() {
        let mut tracker = ChangeTracker::new(at(100));
        assert!(!tracker.observe(Some(at(200))));
        assert!(!tracker.observe(Some(at(201))));
        assert!(!tracker.observe(None));
        assert!(!tracker.observe(Some(at(202))));
        assert!(tracker.observe(Some(at(202))));
    }

    #[tokio::test]
    async fn test_watcher_reports_modified_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timekeep-server");
        std::fs::write(&path, b"v1").unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        let handle =
            spawn_executable_watcher(path.clone(), Duration::from_millis(50), tx).unwrap();

        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        drop(file);

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should report the change");
        assert_eq!(event, Some(WatchEvent::ExecutableModified(path)));
        handle.await.unwrap();
    }

    #[test]
    fn test_missing_file_disables_watch() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = rt.enter();
        let (tx, _rx) = mpsc::channel(1);
        assert!(spawn_executable_watcher(
            PathBuf::from("/nonexistent/timekeep-server"),
            Duration::from_millis(50),
            tx
        )
        .is_none());
    }
}
