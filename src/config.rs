//! Runtime configuration, read once at startup from `HOSTPULSE_*`
//! environment variables. Unset or unparseable values fall back to defaults.

use crate::series;

use std::env;
use std::path::PathBuf;

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the dashboard and API listen on (default: 8080)
    pub http_port: u16,
    /// Base directory for the alert log, reports and snapshot caches.
    pub data_dir: PathBuf,
    /// Live endpoint of the legacy script host, if it exposes one.
    pub legacy_url: Option<String>,
    /// Snapshot file the legacy host writes each tick.
    pub legacy_file: PathBuf,
    /// Live endpoint of the native agent.
    pub native_url: Option<String>,
    /// Snapshot file the native agent writes each tick.
    pub native_file: PathBuf,
    /// Collector tick interval in seconds (default: 5)
    pub sample_interval_secs: u64,
    /// Per-source live fetch timeout in seconds (default: 2)
    pub source_timeout_secs: u64,
    /// Rolling chart window length in ticks (default: 60)
    pub series_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            http_port: 8080,
            legacy_url: None,
            legacy_file: data_dir.join("legacy_latest.json"),
            native_url: Some("http://127.0.0.1:8889/metrics".to_string()),
            native_file: data_dir.join("native_latest.json"),
            sample_interval_secs: 5,
            source_timeout_secs: 2,
            series_capacity: series::DEFAULT_CAPACITY,
            data_dir,
        }
    }
}

impl Config {
    /// Read settings from the environment.
    ///
    /// Recognized variables:
    /// - `HOSTPULSE_HTTP_PORT`: HTTP port (default: 8080)
    /// - `HOSTPULSE_DATA_DIR`: data directory (default: "data")
    /// - `HOSTPULSE_LEGACY_URL`: legacy host live endpoint (default: unset)
    /// - `HOSTPULSE_LEGACY_FILE`: legacy snapshot file path
    /// - `HOSTPULSE_NATIVE_URL`: native agent live endpoint
    /// - `HOSTPULSE_NATIVE_FILE`: native snapshot file path
    /// - `HOSTPULSE_SAMPLE_INTERVAL_SECS`: collector tick interval (default: 5)
    /// - `HOSTPULSE_SOURCE_TIMEOUT_SECS`: live fetch timeout (default: 2)
    /// - `HOSTPULSE_SERIES_CAPACITY`: chart window length (default: 60)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("HOSTPULSE_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(dir) = env::var("HOSTPULSE_DATA_DIR") {
            cfg.data_dir = PathBuf::from(&dir);
            cfg.legacy_file = cfg.data_dir.join("legacy_latest.json");
            cfg.native_file = cfg.data_dir.join("native_latest.json");
        }

        if let Ok(url) = env::var("HOSTPULSE_LEGACY_URL") {
            cfg.legacy_url = Some(url);
        }
        if let Ok(path) = env::var("HOSTPULSE_LEGACY_FILE") {
            cfg.legacy_file = PathBuf::from(path);
        }
        if let Ok(url) = env::var("HOSTPULSE_NATIVE_URL") {
            cfg.native_url = Some(url);
        }
        if let Ok(path) = env::var("HOSTPULSE_NATIVE_FILE") {
            cfg.native_file = PathBuf::from(path);
        }

        if let Ok(secs_str) = env::var("HOSTPULSE_SAMPLE_INTERVAL_SECS") {
            if let Ok(secs) = secs_str.parse() {
                cfg.sample_interval_secs = secs;
            }
        }
        if let Ok(secs_str) = env::var("HOSTPULSE_SOURCE_TIMEOUT_SECS") {
            if let Ok(secs) = secs_str.parse() {
                cfg.source_timeout_secs = secs;
            }
        }
        if let Ok(cap_str) = env::var("HOSTPULSE_SERIES_CAPACITY") {
            if let Ok(cap) = cap_str.parse() {
                cfg.series_capacity = cap;
            }
        }

        cfg
    }

    /// Path of the alert log file.
    pub fn alerts_path(&self) -> PathBuf {
        self.data_dir.join("alerts").join("alerts.json")
    }

    /// Base directory for generated reports.
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.sample_interval_secs, 5);
        assert_eq!(cfg.source_timeout_secs, 2);
        assert_eq!(cfg.series_capacity, 60);
        assert_eq!(cfg.alerts_path(), PathBuf::from("data/alerts/alerts.json"));
    }
}
