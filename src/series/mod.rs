//! Rolling chart history.
//!
//! Fixed-capacity per-metric buffers fed one point per collection tick. Every
//! buffer advances together with the label ring, so labels and data arrays stay
//! parallel; a tick that lacked a metric records a null gap rather than dropping
//! the slot, which would shear the x-axis for anyone zipping labels with data.

use crate::snapshot::{chart_label, Snapshot};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};

pub const DEFAULT_CAPACITY: usize = 60;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Bounded FIFO of chart points. `len() <= capacity` always; appending beyond
/// capacity evicts the oldest point.
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    points: VecDeque<Option<f64>>,
    capacity: usize,
}

impl SeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, value: Option<f64>) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Option<f64>> {
        self.points.get(index).copied()
    }

    pub fn to_vec(&self) -> Vec<Option<f64>> {
        self.points.iter().copied().collect()
    }
}

/// Chart-ready series: labels plus parallel datasets, the shape the dashboard's
/// chart library consumes directly.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    pub label: String,
    /// Parallel to `labels`; `None` serializes as a null gap.
    pub data: Vec<Option<f64>>,
}

/// Per-source rolling window over all tracked metric keys.
///
/// Single-writer (the sampler tick loop); readers get copied-out series, never a
/// view into a buffer mid-eviction.
#[derive(Debug)]
pub struct ChartHistory {
    capacity: usize,
    labels: VecDeque<String>,
    // BTreeMap keeps dataset order stable across ticks (disk:C: before disk:D:).
    buffers: BTreeMap<String, SeriesBuffer>,
}

impl ChartHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            labels: VecDeque::with_capacity(capacity),
            buffers: BTreeMap::new(),
        }
    }

    /// Record one tick. Known keys missing from `points` get a null gap; keys
    /// first seen this tick are back-filled with gaps so arrays stay parallel.
    pub fn record_tick(&mut self, timestamp: &str, points: &HashMap<String, Option<f64>>) {
        if self.labels.len() == self.capacity {
            self.labels.pop_front();
        }
        self.labels.push_back(chart_label(timestamp));

        for key in points.keys() {
            if !self.buffers.contains_key(key) {
                let mut buffer = SeriesBuffer::new(self.capacity);
                // Gaps for the ticks this key wasn't tracked yet.
                for _ in 1..self.labels.len() {
                    buffer.push(None);
                }
                self.buffers.insert(key.clone(), buffer);
            }
        }

        for (key, buffer) in self.buffers.iter_mut() {
            buffer.push(points.get(key).copied().flatten());
        }
    }

    /// Copy out chart series for the requested keys. Unknown keys yield an
    /// all-gap dataset of the current window length.
    pub fn to_chart_series(&self, keys: &[&str]) -> ChartSeries {
        let labels: Vec<String> = self.labels.iter().cloned().collect();
        let datasets = keys
            .iter()
            .map(|key| Dataset {
                label: (*key).to_string(),
                data: match self.buffers.get(*key) {
                    Some(buffer) => buffer.to_vec(),
                    None => vec![None; labels.len()],
                },
            })
            .collect();
        ChartSeries { labels, datasets }
    }

    /// Series for every key sharing a prefix, e.g. all `disk:` devices.
    pub fn to_chart_series_by_prefix(&self, prefix: &str) -> ChartSeries {
        let keys: Vec<&str> = self
            .buffers
            .keys()
            .filter(|k| k.starts_with(prefix))
            .map(|k| k.as_str())
            .collect();
        self.to_chart_series(&keys)
    }
}

/// Derives MB/s rates from cumulative per-interface byte counters.
///
/// A counter that went backwards means the interface reset; the rate for that
/// tick is unknown, never negative.
#[derive(Debug, Default)]
pub struct RateTracker {
    last: HashMap<String, (DateTime<Utc>, u64, u64)>,
}

/// One tick's derived rates, summed across interfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkRates {
    pub rx_mb_s: Option<f64>,
    pub tx_mb_s: Option<f64>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold this tick's counters into per-tick rates. The first observation of
    /// an interface has no baseline and contributes an unknown rate.
    pub fn update(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> NetworkRates {
        let mut rx_total: Option<f64> = None;
        let mut tx_total: Option<f64> = None;

        for iface in &snapshot.network {
            let prev = self
                .last
                .insert(iface.iface.clone(), (now, iface.rx_bytes, iface.tx_bytes));

            let Some((prev_time, prev_rx, prev_tx)) = prev else {
                continue;
            };

            let elapsed = (now - prev_time).num_milliseconds() as f64 / 1000.0;
            if elapsed <= 0.0 {
                continue;
            }

            if let Some(rate) = counter_rate(prev_rx, iface.rx_bytes, elapsed) {
                *rx_total.get_or_insert(0.0) += rate;
            }
            if let Some(rate) = counter_rate(prev_tx, iface.tx_bytes, elapsed) {
                *tx_total.get_or_insert(0.0) += rate;
            }
        }

        // Baselines for interfaces gone from this snapshot are stale; drop
        // them so a reappearing interface starts a fresh observation.
        self.last
            .retain(|name, _| snapshot.network.iter().any(|n| n.iface == *name));

        NetworkRates {
            rx_mb_s: rx_total,
            tx_mb_s: tx_total,
        }
    }
}

/// Rate in MB/s between two counter readings, or `None` on a counter reset.
pub fn counter_rate(c0: u64, c1: u64, elapsed_secs: f64) -> Option<f64> {
    if c1 < c0 || elapsed_secs <= 0.0 {
        return None;
    }
    Some((c1 - c0) as f64 / elapsed_secs / BYTES_PER_MB)
}
