//! Summary statistics from the engine's `<prefix>_stats.csv` export.

use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::{error, warn};

/// Number of slowest endpoints kept in a summary.
pub const TOP_SLOWEST: usize = 5;

const AGGREGATE_ROW_NAMES: [&str; 2] = ["Aggregated", "Total"];

/// One endpoint row of the export.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointStat {
    pub method: String,
    pub name: String,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub count: u64,
}

/// Whole-run aggregate plus the slowest endpoints by P95.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub requests: u64,
    pub failures: u64,
    pub rps: f64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub top_slowest: Vec<EndpointStat>,
}

impl RunStats {
    /// Failure percentage, 0 when nothing ran.
    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64 * 100.0
        }
    }

    /// Parse a stats export. A missing or unreadable file yields zeroed stats.
    pub fn from_csv_path(path: &Path) -> Self {
        if !path.exists() {
            warn!(path = %path.display(), "Stats CSV not found");
            return Self::default();
        }
        let parsed = std::fs::File::open(path)
            .map_err(csv::Error::from)
            .and_then(Self::from_reader);
        match parsed {
            Ok(stats) => stats,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to parse stats CSV");
                Self::default()
            }
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv = csv::Reader::from_reader(reader);
        let headers = csv.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let type_col = column("Type");
        let name_col = column("Name");
        let count_col = column("Request Count");
        let failure_col = column("Failure Count");
        let rps_col = column("Requests/s");
        let avg_col = column("Average Response Time");
        let min_col = column("Min Response Time");
        let max_col = column("Max Response Time");
        let p50_col = column("50%");
        let p90_col = column("90%");
        let p95_col = column("95%");
        let p99_col = column("99%");

        let mut stats = Self::default();
        let mut endpoints = Vec::new();

        for record in csv.records() {
            let record = record?;
            let field = |col: Option<usize>| col.and_then(|i| record.get(i)).unwrap_or("");
            let name = field(name_col);

            if AGGREGATE_ROW_NAMES.contains(&name) {
                stats.requests = lenient_u64(field(count_col));
                stats.failures = lenient_u64(field(failure_col));
                stats.rps = lenient_f64(field(rps_col));
                stats.avg_ms = lenient_f64(field(avg_col));
                stats.min_ms = lenient_f64(field(min_col));
                stats.max_ms = lenient_f64(field(max_col));
                stats.p50_ms = lenient_f64(field(p50_col));
                stats.p90_ms = lenient_f64(field(p90_col));
                stats.p95_ms = lenient_f64(field(p95_col));
                stats.p99_ms = lenient_f64(field(p99_col));
            } else {
                endpoints.push(EndpointStat {
                    method: field(type_col).to_string(),
                    name: name.to_string(),
                    avg_ms: lenient_f64(field(avg_col)),
                    p95_ms: lenient_f64(field(p95_col)),
                    count: lenient_u64(field(count_col)),
                });
            }
        }

        // Stable sort keeps file order among equal P95 values.
        endpoints.sort_by(|a, b| b.p95_ms.total_cmp(&a.p95_ms));
        endpoints.truncate(TOP_SLOWEST);
        stats.top_slowest = endpoints;
        Ok(stats)
    }
}

/// Numeric cell; `N/A`, blanks and garbage read as zero.
fn lenient_f64(cell: &str) -> f64 {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn lenient_u64(cell: &str) -> u64 {
    let cell = cell.trim();
    cell.parse::<u64>()
        .ok()
        .or_else(|| cell.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
        .unwrap_or(0)
}
