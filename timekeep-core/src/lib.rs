pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod ipc;
pub mod models;
pub mod parse;
pub mod record;
pub mod storage;
pub mod time;

pub use client::Client;
pub use config::TimekeepConfig;
pub use error::TimekeepError;
pub use models::{Activity, Category, Fact, FactDraft, Tag};
pub use record::FactRecord;
pub use storage::{SqliteStorage, Storage};
