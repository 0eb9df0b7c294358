use chrono::NaiveTime;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TimekeepConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
    /// Retire the running instance once its own executable is replaced.
    pub watch_executable: bool,
    pub watch_interval_ms: u64,
    /// Watch this file instead of the current executable.
    #[serde(default)]
    pub watch_path: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/timekeep.sock".to_string(),
            log_level: "info".to_string(),
            watch_executable: true,
            watch_interval_ms: 2000,
            watch_path: None,
        }
    }
}

impl ServiceConfig {
    pub fn socket_path(&self) -> String {
        shellexpand::tilde(&self.socket_path).into_owned()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://~/.local/share/timekeep/timekeep.db".to_string(),
            max_connections: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    /// Facts starting before this time of day belong to the previous day.
    pub day_start: String,
    /// Stopped facts shorter than this are discarded.
    pub min_fact_seconds: i64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            day_start: "05:00".to_string(),
            min_fact_seconds: 60,
        }
    }
}

impl TrackingConfig {
    pub fn day_start(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.day_start, "%H:%M").map_err(|e| {
            ConfigError::Message(format!("invalid tracking.day_start {:?}: {}", self.day_start, e))
        })
    }
}

impl TimekeepConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let defaults = ServiceConfig::default();
        let database = DatabaseConfig::default();
        let tracking = TrackingConfig::default();

        let s = Config::builder()
            .set_default("service.socket_path", defaults.socket_path)?
            .set_default("service.log_level", defaults.log_level)?
            .set_default("service.watch_executable", defaults.watch_executable)?
            .set_default("service.watch_interval_ms", defaults.watch_interval_ms)?
            .set_default("database.url", database.url)?
            .set_default("database.max_connections", database.max_connections)?
            .set_default("tracking.day_start", tracking.day_start)?
            .set_default("tracking.min_fact_seconds", tracking.min_fact_seconds)?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("TIMEKEEP").separator("__"))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.tracking.day_start()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = TimekeepConfig::load("/nonexistent/timekeep").unwrap();
        assert_eq!(config.tracking.min_fact_seconds, 60);
        assert_eq!(
            config.tracking.day_start().unwrap(),
            NaiveTime::from_hms_opt(5, 0, 0).unwrap()
        );
        assert!(config.service.watch_executable);
    }

    #[test]
    fn test_bad_day_start_is_rejected() {
        let tracking = TrackingConfig {
            day_start: "25:99".to_string(),
            min_fact_seconds: 60,
        };
        assert!(tracking.day_start().is_err());
    }
}
