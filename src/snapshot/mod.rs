//! Snapshot data model.
//!
//! One `Snapshot` is a single collection tick's worth of host readings, produced
//! by one of two independent collectors (the legacy script host or the native
//! agent) and consumed as-is. Collectors disagree about which fields they emit,
//! so every sub-record and most fields are optional; a missing key is data, not
//! an error.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// A full metrics snapshot as written by a collector.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Snapshot {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryStats>,
    #[serde(default)]
    pub disk: Vec<DiskUsage>,
    #[serde(default)]
    pub network: Vec<NetworkCounters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<TemperatureStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SystemInfo {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub uptime_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CpuStats {
    #[serde(default)]
    pub usage_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_processors: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CpuStats {
    /// Usage if the reading is a plausible percentage.
    pub fn valid_usage(&self) -> Option<f64> {
        valid_percent(self.usage_percent)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryStats {
    #[serde(default)]
    pub total_mb: u64,
    #[serde(default)]
    pub used_mb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_mb: Option<u64>,
    /// Collectors that report a precomputed percentage win over our own ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_percent: Option<f64>,
}

impl MemoryStats {
    /// Used memory as a percentage of total, preferring the collector's figure.
    pub fn percent_used(&self) -> Option<f64> {
        if let Some(p) = self.usage_percent {
            return valid_percent(p);
        }
        if self.total_mb == 0 {
            return None;
        }
        valid_percent(self.used_mb as f64 / self.total_mb as f64 * 100.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiskUsage {
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub used_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_gb: Option<f64>,
}

impl DiskUsage {
    pub fn valid_used_percent(&self) -> Option<f64> {
        valid_percent(self.used_percent)
    }
}

/// Cumulative interface counters. Monotonically non-decreasing between ticks
/// barring a counter reset; rate derivation lives in `crate::series`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkCounters {
    #[serde(default)]
    pub iface: String,
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TemperatureStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_celsius: Option<f64>,
    #[serde(default)]
    pub gpus: Vec<GpuDevice>,
}

/// Native-agent GPU block (`gpu` top-level key).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GpuStats {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub devices: Vec<GpuDevice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuType {
    Dedicated,
    Integrated,
    #[serde(other)]
    Unknown,
}

impl Default for GpuType {
    fn default() -> Self {
        GpuType::Unknown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GpuDevice {
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, rename = "type")]
    pub gpu_type: GpuType,
    /// `null` or a value at/below zero means the sensor failed, not a reading.
    #[serde(default)]
    pub temperature_celsius: Option<f64>,
    #[serde(default)]
    pub vram_used_mb: u64,
    #[serde(default)]
    pub vram_total_mb: u64,
}

impl GpuDevice {
    /// Temperature if the sensor produced a plausible value.
    pub fn valid_temperature(&self) -> Option<f64> {
        self.temperature_celsius.filter(|t| *t > 0.0)
    }

    pub fn vram_percent(&self) -> Option<f64> {
        if self.vram_total_mb == 0 {
            return None;
        }
        Some(self.vram_used_mb as f64 / self.vram_total_mb as f64 * 100.0)
    }
}

impl Snapshot {
    /// All GPU devices across the two shapes collectors use (`temperature.gpus`
    /// on the legacy host, top-level `gpu.devices` on the native agent).
    pub fn gpu_devices(&self) -> &[GpuDevice] {
        if let Some(temp) = &self.temperature {
            if !temp.gpus.is_empty() {
                return &temp.gpus;
            }
        }
        if let Some(gpu) = &self.gpu {
            return &gpu.devices;
        }
        &[]
    }

    /// Primary display GPU: first dedicated device, else the first one listed.
    pub fn primary_gpu(&self) -> Option<&GpuDevice> {
        let devices = self.gpu_devices();
        devices
            .iter()
            .find(|g| g.gpu_type == GpuType::Dedicated)
            .or_else(|| devices.first())
    }
}

/// A percentage reading outside `[0, 100]` is a collector bug, not data.
/// NaN fails the range check and is rejected with the rest.
pub fn valid_percent(value: f64) -> Option<f64> {
    (0.0..=100.0).contains(&value).then_some(value)
}

/// Format an ISO-8601 timestamp as a `HH:MM:SS` chart label in the timestamp's
/// own zone. Unparseable input falls back to the raw string so the label axis
/// never loses a slot.
pub fn chart_label(timestamp: &str) -> String {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(dt) => dt.format("%H:%M:%S").to_string(),
        Err(_) => timestamp.to_string(),
    }
}
