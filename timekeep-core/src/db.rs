use crate::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

pub const CREATE_CATEGORIES: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
  id    INTEGER PRIMARY KEY AUTOINCREMENT,
  name  TEXT NOT NULL
);
"#;

pub const CREATE_ACTIVITIES: &str = r#"
CREATE TABLE IF NOT EXISTS activities (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  name         TEXT NOT NULL,
  category_id  INTEGER NOT NULL DEFAULT -1,
  deleted      INTEGER NOT NULL DEFAULT 0
);
"#;

pub const CREATE_FACTS: &str = r#"
CREATE TABLE IF NOT EXISTS facts (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  activity_id  INTEGER NOT NULL,
  start_time   TEXT NOT NULL,
  end_time     TEXT,
  description  TEXT
);
"#;

pub const CREATE_TAGS: &str = r#"
CREATE TABLE IF NOT EXISTS tags (
  id            INTEGER PRIMARY KEY AUTOINCREMENT,
  name          TEXT NOT NULL UNIQUE,
  autocomplete  INTEGER NOT NULL DEFAULT 1
);
"#;

pub const CREATE_FACT_TAGS: &str = r#"
CREATE TABLE IF NOT EXISTS fact_tags (
  id       INTEGER PRIMARY KEY AUTOINCREMENT,
  fact_id  INTEGER NOT NULL,
  tag_id   INTEGER NOT NULL
);
"#;

pub const INDEX_FACTS_START_TIME: &str =
    "CREATE INDEX IF NOT EXISTS idx_facts_start_time ON facts(start_time);";

pub const INDEX_FACT_TAGS_FACT_ID: &str =
    "CREATE INDEX IF NOT EXISTS idx_fact_tags_fact_id ON fact_tags(fact_id);";

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_CATEGORIES,
        CREATE_ACTIVITIES,
        CREATE_FACTS,
        CREATE_TAGS,
        CREATE_FACT_TAGS,
        INDEX_FACTS_START_TIME,
        INDEX_FACT_TAGS_FACT_ID,
    ]
}

pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let url = shellexpand::tilde(&config.url).into_owned();
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let db_path = options.get_filename().to_path_buf();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !Path::new(parent).exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory pool, used by tests and `--memory` runs.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in schema_statements() {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn health_check(pool: &SqlitePool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT sqlite_version()").fetch_one(pool).await?;
    Ok(row.0)
}
