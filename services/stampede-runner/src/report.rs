//! Run summary handed to notification channels.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use stampede_core::RunStats;

const UNKNOWN: &str = "Unknown";

/// Everything known about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub project: String,
    pub env: String,
    pub host: String,
    /// Local start time, `YYYY-mm-dd HH:MM:SS`.
    pub start_time: String,
    pub duration_secs: f64,
    pub users: u32,
    pub html_report: PathBuf,
    pub stats: RunStats,
}

impl RunReport {
    pub fn title(&self) -> String {
        format!("Stampede Test Report - {}", self.project)
    }

    pub fn duration_label(&self) -> String {
        format!("{:.2} s", self.duration_secs)
    }

    /// Plain-text summary shared by every channel.
    pub fn summary(&self, tester: Option<&str>, department: Option<&str>) -> String {
        let stats = &self.stats;
        let mut text = String::new();

        let _ = writeln!(text, "Hello team,");
        let _ = writeln!(
            text,
            "The [{}] load test started at {} and finished after {}.",
            self.project,
            self.start_time,
            self.duration_label()
        );
        text.push('\n');
        let _ = writeln!(text, "Tester: {}", tester.unwrap_or(UNKNOWN));
        let _ = writeln!(text, "Department: {}", department.unwrap_or(UNKNOWN));
        let _ = writeln!(text, "Target: `{}`", self.host);
        let _ = writeln!(text, "Concurrent users: {}", self.users);
        text.push('\n');

        let _ = writeln!(text, "Key metrics:");
        let _ = writeln!(text, "• Requests: {}", stats.requests);
        let _ = writeln!(text, "• Throughput (RPS): {:.2} /s", stats.rps);
        let _ = writeln!(
            text,
            "• Failure rate: {:.2}% ({} failures)",
            stats.failure_rate(),
            stats.failures
        );
        let _ = writeln!(text, "• Avg response time: {:.0} ms", stats.avg_ms);
        let _ = writeln!(text, "• P95 response time: {:.0} ms", stats.p95_ms);
        let _ = writeln!(text, "• P99 response time: {:.0} ms", stats.p99_ms);
        let _ = writeln!(text, "• Max response time: {:.0} ms", stats.max_ms);
        text.push('\n');

        if !stats.top_slowest.is_empty() {
            let _ = writeln!(text, "Top {} slowest endpoints (P95):", stats.top_slowest.len());
            for (i, endpoint) in stats.top_slowest.iter().enumerate() {
                let _ = writeln!(
                    text,
                    "{}. [{}] {} - P95: {:.0}ms (Avg: {:.0}ms, Count: {})",
                    i + 1,
                    endpoint.method,
                    endpoint.name,
                    endpoint.p95_ms,
                    endpoint.avg_ms,
                    endpoint.count
                );
            }
            text.push('\n');
        }

        text.push_str("The full HTML report and CSV data are attached.");
        text
    }
}

/// Most recently modified `.html` file directly under `dir`.
pub fn latest_html_report(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("html")))
        .map(|path| {
            let modified = path
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::EndpointStat;

    fn report() -> RunReport {
        RunReport {
            project: "crm".to_string(),
            env: "dev".to_string(),
            host: "https://crm.example.com".to_string(),
            start_time: "2024-05-01 10:00:00".to_string(),
            duration_secs: 31.456,
            users: 10,
            html_report: PathBuf::from("reports/crm_dev_20240501_100000.html"),
            stats: RunStats {
                requests: 400,
                failures: 2,
                rps: 13.333,
                avg_ms: 120.4,
                p95_ms: 310.6,
                p99_ms: 480.2,
                max_ms: 990.0,
                top_slowest: vec![EndpointStat {
                    method: "POST".to_string(),
                    name: "/api/login".to_string(),
                    avg_ms: 200.2,
                    p95_ms: 450.0,
                    count: 40,
                }],
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_title_and_duration() {
        let report = report();
        assert_eq!(report.title(), "Stampede Test Report - crm");
        assert_eq!(report.duration_label(), "31.46 s");
    }

    #[test]
    fn test_summary_metrics() {
        let text = report().summary(Some("alice"), None);
        assert!(text.contains("Tester: alice"));
        assert!(text.contains("Department: Unknown"));
        assert!(text.contains("Target: `https://crm.example.com`"));
        assert!(text.contains("• Requests: 400"));
        assert!(text.contains("• Throughput (RPS): 13.33 /s"));
        assert!(text.contains("• Failure rate: 0.50% (2 failures)"));
        assert!(text.contains("• P95 response time: 311 ms"));
        assert!(text.contains("1. [POST] /api/login - P95: 450ms (Avg: 200ms, Count: 40)"));
    }

    #[test]
    fn test_latest_html_report() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(latest_html_report(dir.path()).is_none());

        let older = dir.path().join("crm_dev_20240501_090000.html");
        let newer = dir.path().join("crm_dev_20240501_100000.html");
        std::fs::write(&older, "old").unwrap();
        std::fs::write(dir.path().join("crm_dev_20240501_100000_stats.csv"), "x").unwrap();
        std::fs::write(&newer, "new").unwrap();
        let past = SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&older)
            .unwrap()
            .set_modified(past)
            .unwrap();

        assert_eq!(latest_html_report(dir.path()), Some(newer));
    }

    #[test]
    fn test_summary_without_endpoints() {
        let mut report = report();
        report.stats.top_slowest.clear();
        let text = report.summary(None, None);
        assert!(!text.contains("slowest endpoints"));
        assert!(text.ends_with("attached."));
    }
}
