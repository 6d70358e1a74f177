use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub adb: AdbConfig,
    pub stream: StreamConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS (the development front-end)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    /// Daily-rolled log file; console only when unset
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    /// adb executable (looked up in PATH when not absolute)
    pub path: String,
    pub command_timeout_secs: u64,
    pub pair_timeout_secs: u64,
    /// Wait after `adb tcpip` while adbd restarts in TCP mode
    pub tcpip_settle_ms: u64,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            path: "adb".to_string(),
            command_timeout_secs: 10,
            pair_timeout_secs: 30,
            tcpip_settle_ms: 2000,
        }
    }
}

impl AdbConfig {
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    #[must_use]
    pub const fn pair_timeout(&self) -> Duration {
        Duration::from_secs(self.pair_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Local path of the scrcpy server jar pushed to the device
    pub server_path: String,
    pub server_version: String,
    /// Longest video edge in pixels (0 = device native)
    pub max_size: u32,
    pub bit_rate: u32,
    pub max_fps: u32,
    /// Attempts to open the forwarded video socket
    pub connect_attempts: u32,
    pub connect_retry_ms: u64,
    /// NAL units read on first attach while looking for SPS/PPS/IDR
    pub init_read_attempts: u32,
    pub init_retry_delay_ms: u64,
    /// Polls for cached bootstrap data when a session is reused
    pub cached_wait_attempts: u32,
    pub cached_wait_delay_ms: u64,
    /// Append everything sent to viewers into `debug_dir`
    pub debug_save_stream: bool,
    pub debug_dir: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            server_path: "scrcpy-server".to_string(),
            server_version: "3.3.3".to_string(),
            max_size: 1280,
            bit_rate: 4_000_000,
            max_fps: 20,
            connect_attempts: 20,
            connect_retry_ms: 100,
            init_read_attempts: 20,
            init_retry_delay_ms: 500,
            cached_wait_attempts: 10,
            cached_wait_delay_ms: 500,
            debug_save_stream: false,
            debug_dir: "debug_streams".to_string(),
        }
    }
}

impl StreamConfig {
    #[must_use]
    pub const fn init_retry_delay(&self) -> Duration {
        Duration::from_millis(self.init_retry_delay_ms)
    }

    #[must_use]
    pub const fn cached_wait_delay(&self) -> Duration {
        Duration::from_millis(self.cached_wait_delay_ms)
    }

    #[must_use]
    pub const fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }
}

/// How per-device state is keyed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// Key by transport address (USB serial, or `ip:port` once on WiFi)
    #[default]
    Address,
    /// Key by the hardware serial reported by the device
    Serial,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub policy: IdentityPolicy,
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // AUTOGLM_SERVER__PORT, AUTOGLM_STREAM__DEBUG_SAVE_STREAM, ...
        builder = builder.add_source(
            Environment::with_prefix("AUTOGLM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Collect every configuration problem instead of stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.server.port == 0 {
            errors.push("server.port must be greater than zero".to_string());
        }
        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error"
        ) {
            errors.push(format!("logging.level '{}' is not a valid level", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            errors.push(format!(
                "logging.format '{}' must be 'pretty' or 'json'",
                self.logging.format
            ));
        }
        if self.adb.path.trim().is_empty() {
            errors.push("adb.path must not be empty".to_string());
        }
        if self.adb.command_timeout_secs == 0 || self.adb.pair_timeout_secs == 0 {
            errors.push("adb timeouts must be greater than zero".to_string());
        }
        if self.stream.init_read_attempts == 0 {
            errors.push("stream.init_read_attempts must be greater than zero".to_string());
        }
        if self.stream.cached_wait_attempts == 0 {
            errors.push("stream.cached_wait_attempts must be greater than zero".to_string());
        }
        if self.stream.connect_attempts == 0 {
            errors.push("stream.connect_attempts must be greater than zero".to_string());
        }
        if self.stream.bit_rate == 0 {
            errors.push("stream.bit_rate must be greater than zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.adb.path, "adb");
        assert_eq!(config.stream.init_read_attempts, 20);
        assert_eq!(config.stream.cached_wait_attempts, 10);
        assert_eq!(config.stream.init_retry_delay(), Duration::from_millis(500));
        assert_eq!(config.identity.policy, IdentityPolicy::Address);
        assert!(!config.stream.debug_save_stream);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        config.stream.init_read_attempts = 0;
        config.stream.cached_wait_attempts = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("logging.level"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autoglm.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9100}, "stream": {"max_fps": 30}, "identity": {"policy": "serial"}}"#,
        )
        .unwrap();

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.stream.max_fps, 30);
        assert_eq!(config.stream.bit_rate, 4_000_000);
        assert_eq!(config.identity.policy, IdentityPolicy::Serial);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Some("/nonexistent/autoglm.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
    }
}
