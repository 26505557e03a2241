//! YAML configuration loading, layered with environment variable
//! overrides via the `config` crate — the same layering style the
//! teacher's own services use for their `.env`/env-var configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbSettings {
    #[serde(rename = "type")]
    pub kind: String,
    pub database_name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub password: String,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub listen_addr: String,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimeoutSettings {
    #[serde(default)]
    pub phase_queue_default: Option<u64>,
    #[serde(default)]
    pub phase_init_default: Option<u64>,
    #[serde(default)]
    pub phase_running_default: Option<u64>,
    #[serde(default)]
    pub phase_whole_default: Option<u64>,
}

impl TimeoutSettings {
    pub fn to_timeout_setting(&self) -> crate::phase::TimeoutSetting {
        crate::phase::TimeoutSetting {
            queue: self.phase_queue_default,
            init: self.phase_init_default,
            running: self.phase_running_default,
            whole: self.phase_whole_default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub addr: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggerSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub env: String,
    pub db: DbSettings,
    pub redis: RedisSettings,
    pub server: ServerSettings,
    #[serde(default)]
    pub timeout: TimeoutSettings,
    #[serde(default)]
    pub logger: LoggerSettings,
}

impl AppConfig {
    /// Loads a YAML file, then layers `APP_*`-prefixed environment
    /// variables over it (e.g. `APP_SERVER__LISTEN_ADDR`).
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_settings_convert_cleanly() {
        let settings = TimeoutSettings { phase_running_default: Some(60), ..Default::default() };
        let converted = settings.to_timeout_setting();
        assert_eq!(converted.running, Some(60));
        assert_eq!(converted.queue, None);
    }

    #[test]
    fn logger_settings_default_to_info_text() {
        let settings = LoggerSettings::default();
        assert_eq!(settings.level, "info");
        assert_eq!(settings.format, "text");
    }
}
