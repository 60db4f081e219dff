//! Threshold evaluation with sustained-condition tracking.
//!
//! The engine is the stateful half of alerting: it compares one snapshot per
//! tick against configured thresholds and decides which crossings become alert
//! records. A breach fires once when it first appears, stays silent while the
//! same `(metric, level)` pair remains the most recent unresolved alert, and
//! fires exactly one extra "sustained" alert if it outlives the sustain window.

use crate::snapshot::Snapshot;

use super::AlertLevel;

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

/// Alerting thresholds. Strict `value > threshold` everywhere; equality is safe.
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub cpu_warning_percent: f64,
    pub memory_critical_percent: f64,
    pub disk_warning_percent: f64,
    pub gpu_temp_warning_celsius: f64,
    pub gpu_temp_critical_celsius: f64,
    /// How long a breach must persist before the single sustained alert fires.
    pub sustain_window: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_warning_percent: 90.0,
            memory_critical_percent: 95.0,
            disk_warning_percent: 85.0,
            gpu_temp_warning_celsius: 80.0,
            gpu_temp_critical_celsius: 90.0,
            sustain_window: Duration::seconds(30),
        }
    }
}

/// An alert the engine wants persisted this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub metric: String,
    pub level: AlertLevel,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

#[derive(Debug)]
struct BreachState {
    since: DateTime<Utc>,
    sustained_reported: bool,
}

/// Stateful threshold evaluator. One instance per collector stream; feed it
/// every tick, persist whatever events come back.
#[derive(Debug)]
pub struct AlertEngine {
    thresholds: Thresholds,
    active: HashMap<(String, AlertLevel), BreachState>,
}

impl AlertEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            active: HashMap::new(),
        }
    }

    /// Evaluate one snapshot at `now` and return the alerts to persist.
    ///
    /// Out-of-range percentages are collector bugs, handled like GPU sensor
    /// errors: the reading is skipped, never compared against a threshold.
    /// Metrics without a valid reading this tick (vanished device, bad sensor)
    /// have their breach state swept; a later breach is a fresh episode.
    pub fn evaluate(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let t = self.thresholds.clone();

        if let Some(usage) = snapshot.cpu.as_ref().and_then(|c| c.valid_usage()) {
            seen.insert("cpu".to_string());
            self.check(
                &mut events,
                "cpu",
                AlertLevel::Warning,
                usage,
                t.cpu_warning_percent,
                format!(
                    "CPU usage ({:.1}%) exceeds threshold ({:.1}%)",
                    usage, t.cpu_warning_percent
                ),
                now,
            );
        }

        if let Some(percent) = snapshot.memory.as_ref().and_then(|m| m.percent_used()) {
            seen.insert("memory".to_string());
            self.check(
                &mut events,
                "memory",
                AlertLevel::Critical,
                percent,
                t.memory_critical_percent,
                format!(
                    "Memory usage ({:.1}%) exceeds threshold ({:.1}%)",
                    percent, t.memory_critical_percent
                ),
                now,
            );
        }

        for disk in &snapshot.disk {
            let Some(used) = disk.valid_used_percent() else {
                continue;
            };
            let metric = format!("disk:{}", disk.device);
            seen.insert(metric.clone());
            self.check(
                &mut events,
                &metric,
                AlertLevel::Warning,
                used,
                t.disk_warning_percent,
                format!(
                    "Disk {} usage ({:.1}%) exceeds threshold ({:.1}%)",
                    disk.device, used, t.disk_warning_percent
                ),
                now,
            );
        }

        if let Some(temp) = snapshot.primary_gpu().and_then(|g| g.valid_temperature()) {
            seen.insert("gpu".to_string());
            // Critical wins over warning for the same reading; the warning state
            // is resolved so recovery back into the warning band re-alerts.
            if temp > t.gpu_temp_critical_celsius {
                self.resolve("gpu", AlertLevel::Warning);
                self.check(
                    &mut events,
                    "gpu",
                    AlertLevel::Critical,
                    temp,
                    t.gpu_temp_critical_celsius,
                    format!(
                        "GPU temperature ({:.1}\u{b0}C) exceeds threshold ({:.1}\u{b0}C)",
                        temp, t.gpu_temp_critical_celsius
                    ),
                    now,
                );
            } else {
                self.resolve("gpu", AlertLevel::Critical);
                self.check(
                    &mut events,
                    "gpu",
                    AlertLevel::Warning,
                    temp,
                    t.gpu_temp_warning_celsius,
                    format!(
                        "GPU temperature ({:.1}\u{b0}C) exceeds threshold ({:.1}\u{b0}C)",
                        temp, t.gpu_temp_warning_celsius
                    ),
                    now,
                );
            }
        }

        self.active.retain(|(metric, _), _| seen.contains(metric));

        events
    }

    /// Number of unresolved breaches currently tracked.
    pub fn active_breaches(&self) -> usize {
        self.active.len()
    }

    fn check(
        &mut self,
        events: &mut Vec<AlertEvent>,
        metric: &str,
        level: AlertLevel,
        value: f64,
        threshold: f64,
        message: String,
        now: DateTime<Utc>,
    ) {
        let key = (metric.to_string(), level);

        if !(value > threshold) {
            // At or below threshold resolves the episode.
            self.active.remove(&key);
            return;
        }

        match self.active.get_mut(&key) {
            None => {
                self.active.insert(key, BreachState { since: now, sustained_reported: false });
                events.push(AlertEvent {
                    metric: metric.to_string(),
                    level,
                    message,
                    value,
                    threshold,
                });
            }
            Some(state) => {
                // Same (metric, level) already unresolved: suppress repeats, but
                // report the episode once as sustained when it outlives the window.
                if !state.sustained_reported && now - state.since >= self.thresholds.sustain_window
                {
                    state.sustained_reported = true;
                    events.push(AlertEvent {
                        metric: metric.to_string(),
                        level,
                        message: format!("Sustained: {}", message),
                        value,
                        threshold,
                    });
                }
            }
        }
    }

    fn resolve(&mut self, metric: &str, level: AlertLevel) {
        self.active.remove(&(metric.to_string(), level));
    }
}
