//! Alert log storage.
//!
//! Alerts live in a single flat JSON document `{"timestamp": ..., "alerts": [...]}`.
//! The store is an explicit handle owning its file path; all writes go through a
//! read-modify-write under an internal mutex and land via temp-file + rename so a
//! concurrent reader never observes a half-written document. A missing or corrupt
//! file is an empty log, never a hard failure.

mod engine;

pub use engine::{AlertEngine, AlertEvent, Thresholds};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;

/// Alert store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("alert file not found")]
    NotFound,
    #[error("malformed alert file: {0}")]
    Malformed(String),
    #[error("invalid alert level: {0:?}")]
    InvalidLevel(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alert severity. Construction from anything outside the three levels fails,
/// both here and during deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AlertLevel::Info),
            "warning" => Ok(AlertLevel::Warning),
            "critical" => Ok(AlertLevel::Critical),
            other => Err(StoreError::InvalidLevel(other.to_string())),
        }
    }
}

/// A single threshold-violation record. Immutable once created; `value` and
/// `threshold` are omitted from the document entirely when absent, which is not
/// the same thing as serializing `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Missing in hand-edited files; an empty string sorts as the minimum.
    #[serde(default)]
    pub timestamp: String,
}

/// On-disk document shape. `alerts` stays a raw value during the first parse so
/// a wrong-shaped field degrades to an empty list instead of an error.
#[derive(Debug, Serialize, Deserialize)]
struct AlertDocument {
    timestamp: String,
    alerts: serde_json::Value,
}

/// Counts of alerts by level, all three levels always present.
pub fn get_alert_counts(alerts: &[Alert]) -> HashMap<AlertLevel, usize> {
    let mut counts = HashMap::from([
        (AlertLevel::Info, 0),
        (AlertLevel::Warning, 0),
        (AlertLevel::Critical, 0),
    ]);
    for alert in alerts {
        *counts.entry(alert.level).or_insert(0) += 1;
    }
    counts
}

/// Alerts for an exact metric key, relative order preserved.
pub fn filter_by_metric<'a>(alerts: &'a [Alert], metric: &str) -> Vec<&'a Alert> {
    alerts.iter().filter(|a| a.metric == metric).collect()
}

/// The alert with the maximum timestamp, `None` for an empty slice. Lexicographic
/// comparison is sound because timestamps are zero-padded ISO-8601 with a `Z`.
pub fn get_latest(alerts: &[Alert]) -> Option<&Alert> {
    alerts.iter().max_by(|a, b| a.timestamp.cmp(&b.timestamp))
}

/// Sort newest-first. Entries with a missing timestamp sort last rather than
/// failing the whole sort.
fn sort_by_timestamp(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// File-backed alert log handle.
pub struct AlertStore {
    path: PathBuf,
    // Single-writer discipline for the read-modify-write cycle.
    write_lock: Mutex<()>,
}

impl AlertStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted log, newest first.
    ///
    /// A missing file is created empty as a side effect and yields `[]`. A file
    /// that fails to parse, or whose `alerts` field is not a list, also yields
    /// `[]` but is left untouched on disk.
    pub fn load(&self, level_filter: Option<AlertLevel>, limit: Option<usize>) -> Vec<Alert> {
        let mut alerts = match self.read_document() {
            Ok(alerts) => alerts,
            Err(StoreError::NotFound) => {
                if let Err(e) = self.create_empty() {
                    tracing::warn!("Failed to create alert file {}: {}", self.path.display(), e);
                }
                return Vec::new();
            }
            Err(StoreError::Malformed(reason)) => {
                tracing::warn!(
                    "Alert file {} is malformed ({}); treating as empty",
                    self.path.display(),
                    reason
                );
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("Failed to read alert file {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        sort_by_timestamp(&mut alerts);

        if let Some(level) = level_filter {
            alerts.retain(|a| a.level == level);
        }
        if let Some(limit) = limit {
            alerts.truncate(limit);
        }
        alerts
    }

    /// Write `{timestamp: now, alerts: []}`, creating parent directories.
    ///
    /// Directory-creation or write failures come back as errors; callers treat
    /// them as local and non-fatal. Takes the write lock like every other
    /// mutation: an unguarded write here could race a concurrent `add` through
    /// the shared temp file and publish an empty document over its append.
    pub fn create_empty(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.write_alerts(&[])
    }

    /// Append one alert, stamped with the current UTC time, rewriting the whole
    /// document atomically. A missing log is created first; a malformed one is
    /// replaced by the appended-to empty log.
    pub fn add(
        &self,
        metric: &str,
        level: AlertLevel,
        message: &str,
        value: Option<f64>,
        threshold: Option<f64>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut alerts = match self.read_document() {
            Ok(alerts) => alerts,
            Err(StoreError::NotFound) | Err(StoreError::Malformed(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        alerts.push(Alert {
            level,
            metric: metric.to_string(),
            message: message.to_string(),
            value,
            threshold,
            timestamp: now_iso(),
        });

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.write_alerts(&alerts)
    }

    /// Validate a string level at the boundary, then add. Nothing is written for
    /// an unknown level and the log is unchanged.
    pub fn add_with_level_str(
        &self,
        metric: &str,
        level: &str,
        message: &str,
        value: Option<f64>,
        threshold: Option<f64>,
    ) -> Result<(), StoreError> {
        let level = AlertLevel::from_str(level)?;
        self.add(metric, level, message, value, threshold)
    }

    /// Truncate the log to an empty list, preserving the file. Idempotent.
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.write_alerts(&[])
    }

    /// Read and parse the on-disk document, distinguishing the failure classes
    /// even though most callers collapse them to "empty".
    fn read_document(&self) -> Result<Vec<Alert>, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound)
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let doc: AlertDocument = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        if !doc.alerts.is_array() {
            return Err(StoreError::Malformed("alerts field is not a list".into()));
        }

        serde_json::from_value(doc.alerts).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    /// Rewrite the document via a temp file in the same directory plus rename,
    /// so readers see either the old or the new document, never a partial one.
    fn write_alerts(&self, alerts: &[Alert]) -> Result<(), StoreError> {
        let doc = serde_json::json!({
            "timestamp": now_iso(),
            "alerts": alerts,
        });
        let body = serde_json::to_string_pretty(&doc)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> AlertStore {
        AlertStore::new(dir.path().join("alerts.json"))
    }

    fn seed_alert(ts: &str, message: &str) -> Alert {
        Alert {
            level: AlertLevel::Info,
            metric: "cpu".to_string(),
            message: message.to_string(),
            value: None,
            threshold: None,
            timestamp: ts.to_string(),
        }
    }

    #[test]
    fn test_load_missing_file_creates_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let alerts = store.load(None, None);
        assert!(alerts.is_empty());
        assert!(store.path().exists());

        // Second load finds the now-existing empty log.
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(doc["timestamp"].is_string());
        assert_eq!(doc["alerts"], serde_json::json!([]));
        assert!(store.load(None, None).is_empty());
    }

    #[test]
    fn test_load_malformed_json_returns_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{invalid json").unwrap();

        assert!(store.load(None, None).is_empty());
        // The malformed file is not rewritten.
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{invalid json");
    }

    #[test]
    fn test_load_alerts_field_not_a_list() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"timestamp":"x","alerts":"not a list"}"#).unwrap();

        assert!(store.load(None, None).is_empty());
    }

    #[test]
    fn test_add_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store
            .add("cpu", AlertLevel::Warning, "CPU usage high", Some(85.5), Some(80.0))
            .unwrap();

        let alerts = store.load(None, None);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric, "cpu");
        assert_eq!(alerts[0].level, AlertLevel::Warning);
        assert_eq!(alerts[0].value, Some(85.5));
        assert!(alerts[0].timestamp.ends_with('Z'));
    }

    #[test]
    fn test_add_invalid_level_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let result = store.add_with_level_str("cpu", "invalid_level", "Test", None, None);
        assert!(matches!(result, Err(StoreError::InvalidLevel(_))));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_add_without_value_omits_fields_entirely() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store
            .add("system", AlertLevel::Info, "System started", None, None)
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &doc["alerts"][0];
        assert!(entry.get("value").is_none());
        assert!(entry.get("threshold").is_none());
    }

    #[test]
    fn test_add_to_nested_directory() {
        let dir = TempDir::new().unwrap();
        let store = AlertStore::new(dir.path().join("data").join("alerts").join("alerts.json"));

        store.create_empty().unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.add("cpu", AlertLevel::Warning, "high", None, None).unwrap();
        assert_eq!(store.load(None, None).len(), 1);

        store.clear().unwrap();
        assert!(store.load(None, None).is_empty());

        store.clear().unwrap();
        assert!(store.load(None, None).is_empty());
        assert!(store.path().exists());
    }

    #[test]
    fn test_concurrent_adds_all_persisted() {
        use std::sync::Arc;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(AlertStore::new(dir.path().join("alerts.json")));
        store.create_empty().unwrap();

        let mut handles = Vec::new();
        for worker in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..2 {
                    store
                        .add(
                            "cpu",
                            AlertLevel::Warning,
                            &format!("worker {} alert {}", worker, i),
                            Some(91.0),
                            Some(90.0),
                        )
                        .unwrap();
                }
            }));
        }
        // A concurrent reader must only ever see a well-formed document.
        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..20 {
                    let _ = store.load(None, None);
                }
            })
        };
        for handle in handles {
            handle.join().unwrap();
        }
        reader.join().unwrap();

        assert_eq!(store.load(None, None).len(), 8);
    }

    #[test]
    fn test_load_with_level_filter_and_limit() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.add("cpu", AlertLevel::Warning, "w1", None, None).unwrap();
        store.add("memory", AlertLevel::Critical, "c1", None, None).unwrap();
        store.add("disk", AlertLevel::Warning, "w2", None, None).unwrap();

        let critical = store.load(Some(AlertLevel::Critical), None);
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].message, "c1");

        let limited = store.load(None, Some(2));
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_load_sorts_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let doc = serde_json::json!({
            "timestamp": "2025-12-05T12:00:00Z",
            "alerts": [
                seed_alert("2025-12-05T10:00:00Z", "Old"),
                seed_alert("2025-12-05T12:00:00Z", "New"),
                seed_alert("2025-12-05T11:00:00Z", "Middle"),
            ],
        });
        std::fs::write(store.path(), doc.to_string()).unwrap();

        let alerts = store.load(None, None);
        let messages: Vec<_> = alerts.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(messages, ["New", "Middle", "Old"]);
    }

    #[test]
    fn test_missing_timestamp_sorts_last() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"timestamp":"x","alerts":[
                {"level":"info","metric":"a","message":"Without timestamp"},
                {"level":"info","metric":"b","message":"With timestamp",
                 "timestamp":"2025-12-05T10:00:00Z"}
            ]}"#,
        )
        .unwrap();

        let alerts = store.load(None, None);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].message, "With timestamp");
        assert_eq!(alerts[1].message, "Without timestamp");
    }

    #[test]
    fn test_alert_rejects_unknown_level_on_parse() {
        let result: Result<Alert, _> = serde_json::from_str(
            r#"{"level":"fatal","metric":"cpu","message":"x","timestamp":"t"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_get_alert_counts() {
        assert_eq!(
            get_alert_counts(&[]),
            HashMap::from([
                (AlertLevel::Info, 0),
                (AlertLevel::Warning, 0),
                (AlertLevel::Critical, 0),
            ])
        );

        let alerts = vec![
            Alert { level: AlertLevel::Info, ..seed_alert("t", "1") },
            Alert { level: AlertLevel::Warning, ..seed_alert("t", "2") },
            Alert { level: AlertLevel::Warning, ..seed_alert("t", "3") },
            Alert { level: AlertLevel::Critical, ..seed_alert("t", "4") },
        ];
        let counts = get_alert_counts(&alerts);
        assert_eq!(counts[&AlertLevel::Info], 1);
        assert_eq!(counts[&AlertLevel::Warning], 2);
        assert_eq!(counts[&AlertLevel::Critical], 1);
    }

    #[test]
    fn test_filter_by_metric_preserves_order() {
        let alerts = vec![
            Alert { metric: "cpu".into(), ..seed_alert("t1", "first") },
            Alert { metric: "memory".into(), ..seed_alert("t2", "other") },
            Alert { metric: "cpu".into(), ..seed_alert("t3", "second") },
        ];

        let cpu = filter_by_metric(&alerts, "cpu");
        assert_eq!(cpu.len(), 2);
        assert_eq!(cpu[0].message, "first");
        assert_eq!(cpu[1].message, "second");
        assert!(filter_by_metric(&alerts, "disk").is_empty());
    }

    #[test]
    fn test_get_latest() {
        assert!(get_latest(&[]).is_none());

        let alerts = vec![
            seed_alert("2025-12-05T10:00:00Z", "Old"),
            seed_alert("2025-12-05T12:00:00Z", "Latest"),
            seed_alert("2025-12-05T11:00:00Z", "Middle"),
        ];
        assert_eq!(get_latest(&alerts).unwrap().message, "Latest");
    }
}
