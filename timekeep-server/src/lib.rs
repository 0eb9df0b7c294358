pub mod facade;
pub mod lifecycle;
pub mod notify;
pub mod router;
pub mod server;
pub mod watcher;

pub use facade::StorageFacade;
pub use lifecycle::{LifecycleState, RunningService, ServiceLifecycle, StopReason};
pub use notify::NotificationHub;
