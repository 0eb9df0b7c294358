use timekeep_core::ipc::Signal;
use tokio::sync::broadcast;

const SIGNAL_BUFFER: usize = 64;

/// Fan-out of change signals to every subscribed client. Fire-and-forget:
/// nothing is acknowledged and late subscribers get no replay.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Signal>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(SIGNAL_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emit(&self, signal: Signal) {
        match self.tx.send(signal) {
            Ok(n) => tracing::debug!("{} sent to {} subscribers", signal.name(), n),
            Err(_) => tracing::debug!("{} dropped: no subscribers", signal.name()),
        }
    }

    /// Invalidate every client-side cache at once.
    pub fn dispatch_overwrite(&self) {
        self.emit(Signal::TagsChanged);
        self.emit(Signal::FactsChanged);
        self.emit(Signal::ActivitiesChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_emit_reaches_every_subscriber() {
        let hub = NotificationHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.emit(Signal::FactsChanged);

        assert_eq!(a.try_recv().unwrap(), Signal::FactsChanged);
        assert_eq!(b.try_recv().unwrap(), Signal::FactsChanged);
        assert!(matches!(a.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_dispatch_overwrite_fires_three_signals() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe();

        hub.dispatch_overwrite();

        assert_eq!(rx.try_recv().unwrap(), Signal::TagsChanged);
        assert_eq!(rx.try_recv().unwrap(), Signal::FactsChanged);
        assert_eq!(rx.try_recv().unwrap(), Signal::ActivitiesChanged);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let hub = NotificationHub::new();
        hub.emit(Signal::ToggleCalled);

        let mut late = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }
}
