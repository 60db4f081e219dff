//! On-demand system reports.
//!
//! Renders the current dual view plus the alert log into a Markdown and an HTML
//! document under the reports directory. The HTML side uses the same
//! string-replacement templating as the dashboard pages.

use crate::alerts::{get_alert_counts, Alert, AlertLevel};
use crate::snapshot::Snapshot;
use crate::source::DualView;

use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};

const REPORT_TEMPLATE: &str = include_str!("template.html");

/// Human-readable byte size, auto-scaled.
pub fn format_bytes(bytes: f64) -> String {
    let mut value = bytes;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{:.2} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.2} TB", value)
}

/// ISO timestamp rendered for report headers; unparseable input passes through.
fn format_timestamp(timestamp: &str) -> String {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(dt) => dt
            .with_timezone(&Utc)
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
        Err(_) => timestamp.to_string(),
    }
}

/// One source's summary block, in Markdown.
fn summarize(snapshot: Option<&Snapshot>, title: &str) -> String {
    let mut out = format!("## {}\n\n", title);

    let Some(snap) = snapshot else {
        out.push_str("_Source unavailable._\n\n");
        return out;
    };

    if let Some(system) = &snap.system {
        out.push_str(&format!("- Host: `{}` ({})\n", system.hostname, system.os));
    }
    out.push_str(&format!("- Captured: {}\n", format_timestamp(&snap.timestamp)));
    if let Some(cpu) = &snap.cpu {
        out.push_str(&format!("- CPU usage: {:.1}%\n", cpu.usage_percent));
    }
    if let Some(mem) = &snap.memory {
        if let Some(percent) = mem.percent_used() {
            out.push_str(&format!(
                "- Memory: {:.1}% ({} of {})\n",
                percent,
                format_bytes(mem.used_mb as f64 * 1024.0 * 1024.0),
                format_bytes(mem.total_mb as f64 * 1024.0 * 1024.0),
            ));
        }
    }
    for disk in &snap.disk {
        out.push_str(&format!(
            "- Disk {}: {:.1}% used\n",
            disk.device, disk.used_percent
        ));
    }
    if let Some(gpu) = snap.primary_gpu() {
        let temp = match gpu.valid_temperature() {
            Some(t) => format!("{:.0}\u{b0}C", t),
            None => "N/A".to_string(),
        };
        out.push_str(&format!(
            "- GPU: {} {} ({})\n",
            gpu.vendor, gpu.model, temp
        ));
    }
    out.push('\n');
    out
}

fn alerts_section(alerts: &[Alert]) -> String {
    let counts = get_alert_counts(alerts);
    let mut out = format!(
        "## Alerts\n\n{} critical, {} warning, {} info\n\n",
        counts[&AlertLevel::Critical],
        counts[&AlertLevel::Warning],
        counts[&AlertLevel::Info],
    );

    if alerts.is_empty() {
        out.push_str("_No alerts recorded._\n");
        return out;
    }

    out.push_str("| Time | Level | Metric | Message |\n|---|---|---|---|\n");
    for alert in alerts {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            alert.timestamp, alert.level, alert.metric, alert.message
        ));
    }
    out
}

/// Build the Markdown report body.
pub fn render_markdown(view: &DualView, alerts: &[Alert], generated_at: &str) -> String {
    let mut out = format!("# System Report\n\nGenerated: {}\n\n", generated_at);
    out.push_str(&summarize(view.legacy.as_ref(), "Legacy Host"));
    out.push_str(&summarize(view.native.as_ref(), "Native Agent"));
    out.push_str(&alerts_section(alerts));
    out
}

/// Generate both report files and return their paths (markdown, html).
///
/// The report directories are created on demand; a disk-full or permission
/// failure propagates to the caller as a reported, non-retried error.
pub fn generate_report(
    view: &DualView,
    alerts: &[Alert],
    reports_dir: &Path,
) -> Result<(PathBuf, PathBuf), std::io::Error> {
    let markdown_dir = reports_dir.join("markdown");
    let html_dir = reports_dir.join("html");
    std::fs::create_dir_all(&markdown_dir)?;
    std::fs::create_dir_all(&html_dir)?;

    let now = Local::now();
    let stamp = now.format("%Y%m%d_%H%M%S").to_string();
    let generated_at = now.format("%Y-%m-%d %H:%M:%S").to_string();

    let markdown = render_markdown(view, alerts, &generated_at);
    let md_path = markdown_dir.join(format!("report_{}.md", stamp));
    std::fs::write(&md_path, &markdown)?;

    let counts = get_alert_counts(alerts);
    let html = REPORT_TEMPLATE
        .replace("{{generated_at}}", &generated_at)
        .replace("{{legacy_summary}}", &summarize(view.legacy.as_ref(), "Legacy Host"))
        .replace("{{native_summary}}", &summarize(view.native.as_ref(), "Native Agent"))
        .replace("{{critical_count}}", &counts[&AlertLevel::Critical].to_string())
        .replace("{{warning_count}}", &counts[&AlertLevel::Warning].to_string())
        .replace("{{info_count}}", &counts[&AlertLevel::Info].to_string())
        .replace("{{alert_rows}}", &alert_rows_html(alerts));
    let html_path = html_dir.join(format!("report_{}.html", stamp));
    std::fs::write(&html_path, html)?;

    tracing::info!(
        "Generated report {} / {}",
        md_path.display(),
        html_path.display()
    );

    Ok((md_path, html_path))
}

fn alert_rows_html(alerts: &[Alert]) -> String {
    if alerts.is_empty() {
        return "<tr><td colspan=\"4\">No alerts recorded.</td></tr>".to_string();
    }
    alerts
        .iter()
        .map(|a| {
            format!(
                "<tr><td>{}</td><td class=\"{}\">{}</td><td>{}</td><td>{}</td></tr>",
                a.timestamp, a.level, a.level, a.metric, a.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::CpuStats;
    use tempfile::TempDir;

    fn sample_view() -> DualView {
        DualView {
            legacy: Some(Snapshot {
                timestamp: "2025-12-17T10:00:00Z".to_string(),
                cpu: Some(CpuStats { usage_percent: 45.5, ..Default::default() }),
                ..Default::default()
            }),
            native: None,
        }
    }

    fn sample_alerts() -> Vec<Alert> {
        vec![Alert {
            level: AlertLevel::Warning,
            metric: "cpu".to_string(),
            message: "CPU usage (91.5%) exceeds threshold (90.0%)".to_string(),
            value: Some(91.5),
            threshold: Some(90.0),
            timestamp: "2025-12-17T10:00:00Z".to_string(),
        }]
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512.0), "512.00 B");
        assert_eq!(format_bytes(2048.0), "2.00 KB");
        assert_eq!(format_bytes(3.5 * 1024.0 * 1024.0), "3.50 MB");
    }

    #[test]
    fn test_markdown_includes_both_sources_and_counts() {
        let md = render_markdown(&sample_view(), &sample_alerts(), "2025-12-17 10:00:00");
        assert!(md.contains("## Legacy Host"));
        assert!(md.contains("CPU usage: 45.5%"));
        assert!(md.contains("## Native Agent"));
        assert!(md.contains("_Source unavailable._"));
        assert!(md.contains("0 critical, 1 warning, 0 info"));
    }

    #[test]
    fn test_generate_report_writes_both_files() {
        let dir = TempDir::new().unwrap();
        let (md_path, html_path) =
            generate_report(&sample_view(), &sample_alerts(), dir.path()).unwrap();

        assert!(md_path.exists());
        assert!(html_path.exists());

        let html = std::fs::read_to_string(&html_path).unwrap();
        assert!(html.contains("CPU usage (91.5%) exceeds threshold (90.0%)"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_empty_log_report() {
        let view = DualView::default();
        let md = render_markdown(&view, &[], "2025-12-17 10:00:00");
        assert!(md.contains("0 critical, 0 warning, 0 info"));
        assert!(md.contains("_No alerts recorded._"));
    }
}
