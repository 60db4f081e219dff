//! HTTP request handlers.

use super::AppState;
use crate::alerts::{filter_by_metric, get_alert_counts, get_latest, Alert, AlertLevel, StoreError};
use crate::report;
use crate::sampler::ChartKind;
use crate::source::{fetch_dual, Provenance};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;

// ============================================================================
// Templates (simple string replacement, same approach as the report renderer)
// ============================================================================

const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");
const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Dashboard
// ============================================================================

pub async fn handle_dashboard() -> impl IntoResponse {
    let page = LAYOUT_TEMPLATE
        .replace("{{title}}", "HostPulse Dashboard")
        .replace("{{content}}", DASHBOARD_TEMPLATE);

    Html(page)
}

// ============================================================================
// API: Metrics
// ============================================================================

fn source_tag(name: &str, provenance: Provenance) -> String {
    match provenance {
        Provenance::Live => format!("{}_live", name),
        Provenance::File => format!("{}_file", name),
    }
}

pub async fn handle_get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.sampler.legacy_source().latest().await {
        Some((snapshot, provenance)) => Json(json!({
            "success": true,
            "source": source_tag("legacy", provenance),
            "timestamp": now_iso(),
            "data": snapshot,
        }))
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "No metrics available. Ensure the legacy collector is running.",
            })),
        )
            .into_response(),
    }
}

pub async fn handle_get_native_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.sampler.native_source().latest().await {
        Some((snapshot, provenance)) => Json(json!({
            "success": true,
            "source": source_tag("native", provenance),
            "timestamp": now_iso(),
            "data": snapshot,
        }))
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "Native agent unavailable (live endpoint and file both failed)",
            })),
        )
            .into_response(),
    }
}

pub async fn handle_get_dual_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let view = fetch_dual(state.sampler.legacy_source(), state.sampler.native_source()).await;

    if view.is_unavailable() {
        // Both sources down is a distinct condition, not an empty result.
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "No snapshot source available",
            })),
        )
            .into_response();
    }

    Json(json!({
        "success": true,
        "timestamp": now_iso(),
        "legacy": view.legacy,
        "native": view.native,
    }))
    .into_response()
}

pub async fn handle_metrics_source(State(state): State<AppState>) -> impl IntoResponse {
    let legacy = state.sampler.legacy_source();
    let native = state.sampler.native_source();

    Json(json!({
        "legacy_url": legacy.live_url(),
        "legacy_file_available": legacy.file_available(),
        "native_url": native.live_url(),
        "native_file_available": native.file_available(),
    }))
}

// ============================================================================
// API: Charts
// ============================================================================

pub async fn handle_get_charts(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> impl IntoResponse {
    let Some(kind) = ChartKind::parse(&kind) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("unknown chart kind: {}", kind),
        )
            .into_response();
    };

    Json(state.sampler.charts(kind)).into_response()
}

// ============================================================================
// API: Alerts
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub metric: Option<String>,
}

pub async fn handle_get_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    let level_filter = match query.level.as_deref() {
        Some(raw) => match AlertLevel::from_str(raw) {
            Ok(level) => Some(level),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("invalid alert level: {}", raw),
                )
                    .into_response()
            }
        },
        None => None,
    };

    let alerts = state.store.load(level_filter, None);
    let alerts = apply_alert_query(alerts, query.metric.as_deref(), query.limit);

    Json(json!({ "success": true, "alerts": alerts })).into_response()
}

/// The metric filter narrows before `limit` truncates, so the limit bounds the
/// set the caller asked for, not the pre-filter log.
fn apply_alert_query(alerts: Vec<Alert>, metric: Option<&str>, limit: Option<usize>) -> Vec<Alert> {
    let mut alerts = match metric {
        Some(metric) => filter_by_metric(&alerts, metric)
            .into_iter()
            .cloned()
            .collect(),
        None => alerts,
    };
    if let Some(limit) = limit {
        alerts.truncate(limit);
    }
    alerts
}

#[derive(Debug, Deserialize)]
pub struct CreateAlertRequest {
    pub metric: String,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

pub async fn handle_add_alert(
    State(state): State<AppState>,
    Json(req): Json<CreateAlertRequest>,
) -> impl IntoResponse {
    match state.store.add_with_level_str(
        &req.metric,
        &req.level,
        &req.message,
        req.value,
        req.threshold,
    ) {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(StoreError::InvalidLevel(level)) => (
            StatusCode::BAD_REQUEST,
            format!("invalid alert level: {}", level),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_clear_alerts(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.clear() {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_alert_summary(State(state): State<AppState>) -> impl IntoResponse {
    let alerts = state.store.load(None, None);
    let counts = get_alert_counts(&alerts);

    Json(json!({
        "success": true,
        "counts": counts,
        "latest": get_latest(&alerts),
        "total": alerts.len(),
    }))
}

// ============================================================================
// API: Reports
// ============================================================================

pub async fn handle_generate_report(State(state): State<AppState>) -> impl IntoResponse {
    let view = fetch_dual(state.sampler.legacy_source(), state.sampler.native_source()).await;

    if view.is_unavailable() {
        return Json(json!({
            "success": false,
            "error": "No metrics available to generate report",
        }))
        .into_response();
    }

    let alerts = state.store.load(None, None);

    match report::generate_report(&view, &alerts, &state.config.reports_dir()) {
        Ok((md_path, html_path)) => Json(json!({
            "success": true,
            "files": {
                "markdown": md_path.display().to_string(),
                "html": html_path.display().to_string(),
            },
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Report generation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Health
// ============================================================================

pub async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "version": env!("CARGO_PKG_VERSION") }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(metric: &str, message: &str) -> Alert {
        Alert {
            level: AlertLevel::Warning,
            metric: metric.to_string(),
            message: message.to_string(),
            value: None,
            threshold: None,
            timestamp: "2025-12-17T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_metric_filter_applies_before_limit() {
        // cpu and memory alerts interleaved; the limit must count only the
        // metric the caller asked for.
        let mut alerts = Vec::new();
        for i in 0..6 {
            alerts.push(alert("cpu", &format!("cpu {}", i)));
            alerts.push(alert("memory", &format!("memory {}", i)));
        }

        let result = apply_alert_query(alerts.clone(), Some("cpu"), Some(5));
        assert_eq!(result.len(), 5);
        assert!(result.iter().all(|a| a.metric == "cpu"));

        let unfiltered = apply_alert_query(alerts, None, Some(5));
        assert_eq!(unfiltered.len(), 5);
    }
}
