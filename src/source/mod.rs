//! Snapshot sources and the dual-source reconciler.
//!
//! Each collector (legacy script host, native agent) is reachable two ways: a
//! live HTTP endpoint and the snapshot file it most recently wrote. A fetch
//! prefers live with a bounded timeout and falls back to the file; a source
//! with neither is simply absent. The dual fetch joins both sources
//! concurrently, so a dead source costs its own timeout and nothing more.

use crate::snapshot::Snapshot;

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Source fetch error types. Callers mostly collapse these to "absent", but the
/// classes stay distinguishable.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("live fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("live fetch failed: {0}")]
    Network(String),
    #[error("live endpoint returned status {0}")]
    Status(u16),
    #[error("no live endpoint configured")]
    NoEndpoint,
    #[error("snapshot file not found")]
    NotFound,
    #[error("malformed snapshot: {0}")]
    Malformed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a fetched snapshot actually came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    File,
}

/// One collector's pair of access paths.
pub struct SnapshotSource {
    name: String,
    live_url: Option<String>,
    cache_path: PathBuf,
    timeout: Duration,
    client: reqwest::Client,
}

impl SnapshotSource {
    pub fn new(
        name: &str,
        live_url: Option<String>,
        cache_path: PathBuf,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            live_url,
            cache_path,
            timeout,
            client,
        })
    }

    pub fn file_available(&self) -> bool {
        self.cache_path.exists()
    }

    pub fn live_url(&self) -> Option<&str> {
        self.live_url.as_deref()
    }

    /// Query the live endpoint within the configured timeout.
    pub async fn fetch_live(&self) -> Result<Snapshot, SourceError> {
        let url = self.live_url.as_ref().ok_or(SourceError::NoEndpoint)?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(self.timeout)
            } else {
                SourceError::Network(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        response
            .json::<Snapshot>()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))
    }

    /// Read the most recently written snapshot file for this source.
    pub fn read_cached(&self) -> Result<Snapshot, SourceError> {
        let raw = match std::fs::read_to_string(&self.cache_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound)
            }
            Err(e) => return Err(SourceError::Io(e)),
        };
        serde_json::from_str(&raw).map_err(|e| SourceError::Malformed(e.to_string()))
    }

    /// Live first, file fallback. Absence is a normal outcome, never an error
    /// surfaced upward; the provenance tag records which path answered.
    pub async fn latest(&self) -> Option<(Snapshot, Provenance)> {
        match self.fetch_live().await {
            Ok(snapshot) => return Some((snapshot, Provenance::Live)),
            Err(SourceError::NoEndpoint) => {}
            Err(e) => {
                tracing::debug!("Live fetch for {} failed: {}; trying file", self.name, e);
            }
        }

        match self.read_cached() {
            Ok(snapshot) => Some((snapshot, Provenance::File)),
            Err(SourceError::NotFound) => None,
            Err(e) => {
                tracing::warn!("Cached snapshot for {} unreadable: {}", self.name, e);
                None
            }
        }
    }
}

/// Merged per-request view over both collectors. Ephemeral; not persisted.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DualView {
    pub legacy: Option<Snapshot>,
    pub native: Option<Snapshot>,
}

impl DualView {
    /// Both sources absent, as distinct from a single-source partial result.
    pub fn is_unavailable(&self) -> bool {
        self.legacy.is_none() && self.native.is_none()
    }

    /// The snapshot the dashboard leads with: legacy when present, else native.
    pub fn preferred(&self) -> Option<&Snapshot> {
        self.legacy.as_ref().or(self.native.as_ref())
    }
}

/// Fetch both sources concurrently and join. Wall time is bounded by the larger
/// of the two timeouts when both are live, never their product with retries.
pub async fn fetch_dual(legacy: &SnapshotSource, native: &SnapshotSource) -> DualView {
    let (legacy_result, native_result) = tokio::join!(legacy.latest(), native.latest());

    DualView {
        legacy: legacy_result.map(|(s, _)| s),
        native: native_result.map(|(s, _)| s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_snapshot(dir: &TempDir, name: &str, cpu: f64) -> PathBuf {
        let path = dir.path().join(name);
        let body = format!(
            r#"{{"timestamp":"2025-12-17T10:00:00Z","cpu":{{"usage_percent":{}}}}}"#,
            cpu
        );
        std::fs::write(&path, body).unwrap();
        path
    }

    fn file_source(name: &str, path: PathBuf) -> SnapshotSource {
        SnapshotSource::new(name, None, path, Duration::from_millis(200)).unwrap()
    }

    #[tokio::test]
    async fn test_file_fallback_when_no_endpoint() {
        let dir = TempDir::new().unwrap();
        let path = write_snapshot(&dir, "latest.json", 45.5);
        let source = file_source("legacy", path);

        let (snapshot, provenance) = source.latest().await.unwrap();
        assert_eq!(provenance, Provenance::File);
        assert_eq!(snapshot.cpu.unwrap().usage_percent, 45.5);
    }

    #[tokio::test]
    async fn test_missing_everything_is_absent_not_error() {
        let dir = TempDir::new().unwrap();
        let source = file_source("native", dir.path().join("missing.json"));

        assert!(source.latest().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_cache_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let source = file_source("legacy", path);

        assert!(source.latest().await.is_none());
    }

    #[tokio::test]
    async fn test_dead_live_endpoint_falls_back_to_file() {
        let dir = TempDir::new().unwrap();
        let path = write_snapshot(&dir, "latest.json", 12.0);
        // Unroutable address; the bounded timeout turns this into a fast fallback.
        let source = SnapshotSource::new(
            "native",
            Some("http://127.0.0.1:1/metrics".to_string()),
            path,
            Duration::from_millis(200),
        )
        .unwrap();

        let (snapshot, provenance) = source.latest().await.unwrap();
        assert_eq!(provenance, Provenance::File);
        assert_eq!(snapshot.cpu.unwrap().usage_percent, 12.0);
    }

    #[tokio::test]
    async fn test_dual_view_partial_result() {
        let dir = TempDir::new().unwrap();
        let legacy_path = write_snapshot(&dir, "legacy.json", 45.5);
        let legacy = file_source("legacy", legacy_path);
        let native = file_source("native", dir.path().join("missing.json"));

        let view = fetch_dual(&legacy, &native).await;
        assert!(view.legacy.is_some());
        assert!(view.native.is_none());
        assert!(!view.is_unavailable());
        assert!(view.preferred().is_some());
    }

    #[tokio::test]
    async fn test_dual_view_unavailable_when_both_absent() {
        let dir = TempDir::new().unwrap();
        let legacy = file_source("legacy", dir.path().join("a.json"));
        let native = file_source("native", dir.path().join("b.json"));

        let view = fetch_dual(&legacy, &native).await;
        assert!(view.is_unavailable());
        assert!(view.preferred().is_none());
    }

    #[tokio::test]
    async fn test_preferred_falls_back_to_native() {
        let dir = TempDir::new().unwrap();
        let native_path = write_snapshot(&dir, "native.json", 33.0);
        let legacy = file_source("legacy", dir.path().join("missing.json"));
        let native = file_source("native", native_path);

        let view = fetch_dual(&legacy, &native).await;
        let preferred = view.preferred().unwrap();
        assert_eq!(preferred.cpu.as_ref().unwrap().usage_percent, 33.0);
    }
}
