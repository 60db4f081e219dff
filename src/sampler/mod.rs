//! Collector tick loop.
//!
//! One logical loop drives everything stateful: each tick fetches both sources
//! (concurrently, independently timed out), feeds per-source chart windows and
//! rate trackers, and runs the alert engine over the preferred snapshot. Chart
//! state lives behind a mutex and is copied out on read.

use crate::alerts::{AlertEngine, AlertStore, Thresholds};
use crate::series::{ChartHistory, ChartSeries, RateTracker};
use crate::snapshot::Snapshot;
use crate::source::{fetch_dual, DualView, SnapshotSource};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Chart groupings the dashboard asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Cpu,
    Memory,
    Network,
    Disk,
    Gpu,
}

impl ChartKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cpu" => Some(ChartKind::Cpu),
            "memory" => Some(ChartKind::Memory),
            "network" => Some(ChartKind::Network),
            "disk" => Some(ChartKind::Disk),
            "gpu" => Some(ChartKind::Gpu),
            _ => None,
        }
    }
}

/// Chart series for both sources; a source that has produced no ticks yet is
/// absent rather than empty-but-misleading.
#[derive(Debug, serde::Serialize)]
pub struct SourceCharts {
    pub legacy: Option<ChartSeries>,
    pub native: Option<ChartSeries>,
}

/// Rolling chart state for one collector stream.
pub struct SourceWindow {
    history: ChartHistory,
    rates: RateTracker,
    ticks: u64,
}

impl SourceWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: ChartHistory::new(capacity),
            rates: RateTracker::new(),
            ticks: 0,
        }
    }

    /// Fold one snapshot into the window.
    pub fn record(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) {
        let rates = self.rates.update(snapshot, now);

        // Out-of-range readings chart as gaps, same as a missing metric.
        let mut points: HashMap<String, Option<f64>> = HashMap::from([
            (
                "cpu".to_string(),
                snapshot.cpu.as_ref().and_then(|c| c.valid_usage()),
            ),
            (
                "memory".to_string(),
                snapshot.memory.as_ref().and_then(|m| m.percent_used()),
            ),
            ("network_rx".to_string(), rates.rx_mb_s),
            ("network_tx".to_string(), rates.tx_mb_s),
        ]);

        for disk in &snapshot.disk {
            points.insert(format!("disk:{}", disk.device), disk.valid_used_percent());
        }
        for (i, gpu) in snapshot.gpu_devices().iter().enumerate() {
            points.insert(format!("gpu:{}", i), gpu.valid_temperature());
        }

        self.history.record_tick(&snapshot.timestamp, &points);
        self.ticks += 1;
    }

    pub fn has_data(&self) -> bool {
        self.ticks > 0
    }

    pub fn chart(&self, kind: ChartKind) -> ChartSeries {
        match kind {
            ChartKind::Cpu => self.history.to_chart_series(&["cpu"]),
            ChartKind::Memory => self.history.to_chart_series(&["memory"]),
            ChartKind::Network => self.history.to_chart_series(&["network_rx", "network_tx"]),
            ChartKind::Disk => self.history.to_chart_series_by_prefix("disk:"),
            ChartKind::Gpu => self.history.to_chart_series_by_prefix("gpu:"),
        }
    }
}

struct SamplerState {
    engine: AlertEngine,
    legacy: SourceWindow,
    native: SourceWindow,
}

/// The collector loop and the chart state it maintains.
pub struct Sampler {
    legacy_source: Arc<SnapshotSource>,
    native_source: Arc<SnapshotSource>,
    store: Arc<AlertStore>,
    state: Mutex<SamplerState>,
    interval: Duration,
}

impl Sampler {
    pub fn new(
        legacy_source: Arc<SnapshotSource>,
        native_source: Arc<SnapshotSource>,
        store: Arc<AlertStore>,
        thresholds: Thresholds,
        series_capacity: usize,
        interval: Duration,
    ) -> Self {
        Self {
            legacy_source,
            native_source,
            store,
            state: Mutex::new(SamplerState {
                engine: AlertEngine::new(thresholds),
                legacy: SourceWindow::new(series_capacity),
                native: SourceWindow::new(series_capacity),
            }),
            interval,
        }
    }

    /// Run one collection tick: fetch, record, evaluate, persist alerts.
    /// Returns the merged view so callers can reuse the fetch.
    pub async fn sample_once(&self) -> DualView {
        let view = fetch_dual(&self.legacy_source, &self.native_source).await;
        let now = Utc::now();

        let events = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

            if let Some(snapshot) = &view.legacy {
                state.legacy.record(snapshot, now);
            }
            if let Some(snapshot) = &view.native {
                state.native.record(snapshot, now);
            }

            match view.preferred() {
                Some(snapshot) => state.engine.evaluate(snapshot, now),
                None => Vec::new(),
            }
        };

        for event in events {
            if let Err(e) = self.store.add(
                &event.metric,
                event.level,
                &event.message,
                Some(event.value),
                Some(event.threshold),
            ) {
                tracing::error!("Failed to persist alert for {}: {}", event.metric, e);
            } else {
                tracing::info!("Alert [{}] {}", event.level, event.message);
            }
        }

        view
    }

    /// Chart series for both sources, copied out under the lock.
    pub fn charts(&self, kind: ChartKind) -> SourceCharts {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        SourceCharts {
            legacy: state.legacy.has_data().then(|| state.legacy.chart(kind)),
            native: state.native.has_data().then(|| state.native.chart(kind)),
        }
    }

    pub fn legacy_source(&self) -> &SnapshotSource {
        &self.legacy_source
    }

    pub fn native_source(&self) -> &SnapshotSource {
        &self.native_source
    }

    /// Start the background tick loop. Returns a stop sender; the loop exits
    /// when it fires or every sender is dropped.
    pub fn start(self: Arc<Self>) -> tokio::sync::broadcast::Sender<()> {
        let (stop_tx, mut stop_rx) = tokio::sync::broadcast::channel(1);
        let sampler = self;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sampler.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            tracing::info!(
                "Sampler started (tick every {:?})",
                sampler.interval
            );

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::info!("Sampler stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        let view = sampler.sample_once().await;
                        if view.is_unavailable() {
                            tracing::debug!("Both snapshot sources unavailable this tick");
                        }
                    }
                }
            }
        });

        stop_tx
    }
}
