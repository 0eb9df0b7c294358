//! End-to-end tests: a real service on a temporary Unix socket, driven
//! through `timekeep_core::Client`.

use chrono::NaiveTime;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use timekeep_core::config::ServiceConfig;
use timekeep_core::ipc::{Signal, TimekeepRequest};
use timekeep_core::{db, Client, FactRecord, SqliteStorage};
use timekeep_server::{
    server, LifecycleState, NotificationHub, ServiceLifecycle, StopReason, StorageFacade,
};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);

struct TestService {
    config: ServiceConfig,
    socket_path: String,
    handle: JoinHandle<anyhow::Result<StopReason>>,
    interrupt: Option<oneshot::Sender<()>>,
    states: watch::Receiver<LifecycleState>,
    _dir: TempDir,
}

fn service_config(dir: &TempDir) -> ServiceConfig {
    ServiceConfig {
        socket_path: dir.path().join("timekeep.sock").display().to_string(),
        watch_executable: false,
        ..ServiceConfig::default()
    }
}

async fn start_service_with(dir: TempDir, config: ServiceConfig) -> TestService {
    let lifecycle = ServiceLifecycle::new(config.clone());
    let states = lifecycle.watch_state();
    assert_eq!(lifecycle.state(), LifecycleState::Starting);
    let running = lifecycle
        .start()
        .await
        .expect("Failed to start service")
        .expect("No other instance should be running");
    assert_eq!(running.state(), LifecycleState::Running);
    let socket_path = running.socket_path().to_string();

    let pool = db::create_memory_pool()
        .await
        .expect("Failed to open in-memory database");
    let storage = SqliteStorage::with_rules(pool, NaiveTime::from_hms_opt(5, 0, 0).unwrap(), 60);
    let facade = StorageFacade::new(storage, NotificationHub::new());

    let (interrupt, interrupted) = oneshot::channel::<()>();
    let handle = tokio::spawn(running.serve(facade, async move {
        let _ = interrupted.await;
    }));

    TestService {
        config,
        socket_path,
        handle,
        interrupt: Some(interrupt),
        states,
        _dir: dir,
    }
}

async fn start_service() -> TestService {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = service_config(&dir);
    start_service_with(dir, config).await
}

async fn connect(service: &TestService) -> Client {
    Client::connect(&service.socket_path)
        .await
        .expect("Failed to connect to service")
}

async fn stop(mut service: TestService) -> StopReason {
    if let Some(interrupt) = service.interrupt.take() {
        let _ = interrupt.send(());
    }
    tokio::time::timeout(WAIT, service.handle)
        .await
        .expect("service did not stop in time")
        .expect("service task panicked")
        .expect("service failed")
}

#[tokio::test]
async fn test_ping_and_introspect() {
    let service = start_service().await;
    let mut client = connect(&service).await;

    let pong = client.call(&TimekeepRequest::Ping).await.unwrap();
    assert!(pong.is_ok());
    assert_eq!(pong.version, timekeep_core::ipc::PROTOCOL_VERSION);

    let methods: Vec<serde_json::Value> = client.invoke(&TimekeepRequest::Introspect).await.unwrap();
    assert_eq!(methods.len(), timekeep_core::ipc::METHODS.len());
    assert!(methods.iter().any(|m| m["name"] == "GetActivityByName"));

    assert_eq!(stop(service).await, StopReason::Interrupted);
}

#[tokio::test]
async fn test_calls_round_trip_over_socket() {
    let service = start_service().await;
    let mut client = connect(&service).await;

    let cat: i64 = client
        .invoke(&TimekeepRequest::AddCategory {
            name: "Work".to_string(),
        })
        .await
        .unwrap();
    let looked_up: i64 = client
        .invoke(&TimekeepRequest::GetCategoryId {
            category: "Work".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(looked_up, cat);

    let id: i64 = client
        .invoke(&TimekeepRequest::AddFact {
            fact: "coding@Work, sockets #rust #ipc".to_string(),
            start_time: 1_710_493_200,
            end_time: 1_710_496_800,
            temporary: false,
        })
        .await
        .unwrap();
    assert!(id > 0);

    let record: FactRecord = client
        .invoke(&TimekeepRequest::GetFact { fact_id: id })
        .await
        .unwrap();
    assert_eq!(record.id(), id);
    assert_eq!(record.category(), "Work");
    assert_eq!(record.tags(), ["rust", "ipc"]);
    assert_eq!(record.end_time(), 1_710_496_800);

    stop(service).await;
}

#[tokio::test]
async fn test_failed_call_reports_error_and_connection_survives() {
    let service = start_service().await;
    let mut client = connect(&service).await;

    let response = client
        .call(&TimekeepRequest::GetFact { fact_id: 999 })
        .await
        .unwrap();
    assert!(!response.is_ok());
    assert!(response.error.unwrap_or_default().contains("not found"));

    let empty: serde_json::Map<String, serde_json::Value> = client
        .invoke(&TimekeepRequest::GetActivityByName {
            activity: String::new(),
            category_id: -1,
            resurrect: true,
        })
        .await
        .unwrap();
    assert!(empty.is_empty());

    stop(service).await;
}

#[tokio::test]
async fn test_subscriber_receives_change_signals() {
    let service = start_service().await;
    let mut subscriber = connect(&service).await;
    subscriber.subscribe().await.unwrap();

    let mut client = connect(&service).await;
    let _: i64 = client
        .invoke(&TimekeepRequest::AddFact {
            fact: "reading".to_string(),
            start_time: 0,
            end_time: 0,
            temporary: false,
        })
        .await
        .unwrap();
    let signal = tokio::time::timeout(WAIT, subscriber.next_signal())
        .await
        .expect("no signal")
        .unwrap();
    assert_eq!(signal, Signal::FactsChanged);

    let _: () = client.invoke(&TimekeepRequest::Toggle).await.unwrap();
    let signal = tokio::time::timeout(WAIT, subscriber.next_signal())
        .await
        .expect("no signal")
        .unwrap();
    assert_eq!(signal, Signal::ToggleCalled);

    stop(service).await;
}

#[tokio::test]
async fn test_second_instance_backs_off() {
    let service = start_service().await;

    let second = ServiceLifecycle::new(service.config.clone())
        .start()
        .await
        .unwrap();
    assert!(second.is_none());

    let mut client = connect(&service).await;
    assert!(client.call(&TimekeepRequest::Ping).await.unwrap().is_ok());

    stop(service).await;
}

#[tokio::test]
async fn test_unserved_first_instance_still_blocks_second() {
    let dir = TempDir::new().unwrap();
    let config = service_config(&dir);

    // Bound but not yet serving, as during startup.
    let first = ServiceLifecycle::new(config.clone()).start().await.unwrap();
    assert!(first.is_some());

    let second = ServiceLifecycle::new(config.clone()).start().await.unwrap();
    assert!(second.is_none());
    assert!(Path::new(&config.socket_path).exists(), "first socket left alone");

    drop(first);
    let third = ServiceLifecycle::new(config).start().await.unwrap();
    assert!(third.is_some(), "lock is released with the old instance");
}

#[tokio::test]
async fn test_only_refused_or_missing_sockets_are_stale() {
    let dir = TempDir::new().unwrap();

    let busy = dir.path().join("busy.sock").display().to_string();
    let _listener = tokio::net::UnixListener::bind(&busy).unwrap();
    assert!(server::instance_running(&busy).await, "accepts but never answers");

    let leftover = dir.path().join("leftover.sock").display().to_string();
    std::fs::write(&leftover, b"").unwrap();
    assert!(!server::instance_running(&leftover).await);

    let missing = dir.path().join("missing.sock").display().to_string();
    assert!(!server::instance_running(&missing).await);
}

#[tokio::test]
async fn test_stale_socket_is_replaced() {
    let dir = TempDir::new().unwrap();
    let config = service_config(&dir);
    std::fs::write(&config.socket_path, b"left over").unwrap();

    let service = start_service_with(dir, config).await;
    let mut client = connect(&service).await;
    assert!(client.call(&TimekeepRequest::Ping).await.unwrap().is_ok());

    stop(service).await;
}

#[tokio::test]
async fn test_quit_replies_then_stops() {
    let mut service = start_service().await;
    let mut client = connect(&service).await;

    let _: () = client.invoke(&TimekeepRequest::Quit).await.unwrap();

    let reason = tokio::time::timeout(WAIT, &mut service.handle)
        .await
        .expect("service did not stop in time")
        .unwrap()
        .unwrap();
    assert_eq!(reason, StopReason::Quit);
    assert_eq!(*service.states.borrow(), LifecycleState::Stopping);
    assert!(!Path::new(&service.socket_path).exists());
    assert!(Client::connect(&service.socket_path).await.is_err());
}

#[tokio::test]
async fn test_interrupt_removes_socket() {
    let service = start_service().await;
    let socket_path = service.socket_path.clone();
    assert!(Path::new(&socket_path).exists());

    assert_eq!(stop(service).await, StopReason::Interrupted);
    assert!(!Path::new(&socket_path).exists());
}

#[tokio::test]
async fn test_modified_executable_stops_service() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("timekeep-server");
    std::fs::write(&target, b"v1").unwrap();

    let config = ServiceConfig {
        watch_executable: true,
        watch_interval_ms: 50,
        watch_path: Some(target.display().to_string()),
        ..service_config(&dir)
    };
    let mut service = start_service_with(dir, config).await;

    // Let the watcher take its baseline.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let file = std::fs::OpenOptions::new().write(true).open(&target).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000))
        .unwrap();

    let reason = tokio::time::timeout(WAIT, &mut service.handle)
        .await
        .expect("service did not notice the change")
        .unwrap()
        .unwrap();
    assert_eq!(reason, StopReason::ExecutableModified(target));
}
