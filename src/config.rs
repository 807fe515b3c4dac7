//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `dashboard.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ServerConfig: bind address for http + websocket.
//!     - DatabaseConfig: sqlite file location.
//!     - BroadcastConfig: tick interval and batch size of the push loop.
//!     - ApiConfig: row cap for `/get_data`.
//!     - ClockConfig: display zone as a fixed utc offset.
//!     - LoggingConfig: default log level and payload echo.
//!
//! every section and every key is optional; missing pieces take defaults.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// env var naming an explicit config file
pub const CONFIG_ENV: &str = "DASHBOARD_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub broadcast: BroadcastConfig,
    pub api: ApiConfig,
    pub clock: ClockConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BroadcastConfig {
    pub interval_ms: u64,
    pub batch_size: u32,
    /// buffered push events per client before a slow one starts skipping
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub max_rows: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClockConfig {
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_broadcasts: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:5000".to_string() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("site.db") }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { interval_ms: 1000, batch_size: 10, channel_capacity: 16 }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { max_rows: 100 }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        // Asia/Kolkata, no DST
        Self { utc_offset_minutes: 330 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_broadcasts: false }
    }
}

impl BroadcastConfig {
    /// tick period, never shorter than 10ms
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(10))
    }
}

impl DashboardConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: DashboardConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback
    ///
    /// `DASHBOARD_CONFIG` wins when set; otherwise `config/dashboard.toml`
    /// then `../config/dashboard.toml` are tried.
    pub fn load_or_default() -> Self {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("config").join("dashboard.toml"));
        paths.push(PathBuf::from("..").join("config").join("dashboard.toml"));

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let row = |text: String| println!("│ {:<39} │", text);

        println!("┌─────────────────────────────────────────┐");
        println!("│         DASHBOARD CONFIGURATION         │");
        println!("├─────────────────────────────────────────┤");
        row(format!("Bind: {}", self.server.bind));
        row(format!("Database: {}", self.database.path.display()));
        row(format!(
            "Broadcast: every {}ms, {} rows",
            self.broadcast.interval_ms, self.broadcast.batch_size
        ));
        row(format!("API Row Cap: {}", self.api.max_rows));
        row(format!("UTC Offset: {} min", self.clock.utc_offset_minutes));
        row(format!("Log Level: {}", self.logging.level));
        println!("└─────────────────────────────────────────┘");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = DashboardConfig::parse("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.database.path, PathBuf::from("site.db"));
        assert_eq!(config.broadcast.interval_ms, 1000);
        assert_eq!(config.broadcast.batch_size, 10);
        assert_eq!(config.api.max_rows, 100);
        assert_eq!(config.clock.utc_offset_minutes, 330);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = DashboardConfig::parse(
            r#"
            [broadcast]
            batch_size = 25

            [clock]
            utc_offset_minutes = -300
            "#,
        )
        .unwrap();
        assert_eq!(config.broadcast.batch_size, 25);
        assert_eq!(config.broadcast.interval_ms, 1000);
        assert_eq!(config.clock.utc_offset_minutes, -300);
        assert_eq!(config.api.max_rows, 100);
    }

    #[test]
    fn interval_has_a_floor() {
        let broadcast = BroadcastConfig { interval_ms: 0, ..BroadcastConfig::default() };
        assert_eq!(broadcast.interval(), Duration::from_millis(10));
    }

    #[test]
    fn bad_types_are_reported() {
        let err = DashboardConfig::parse("[api]\nmax_rows = \"lots\"").unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn load_reads_shipped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1:8080\"\n").unwrap();
        let config = DashboardConfig::load(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert!(DashboardConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
