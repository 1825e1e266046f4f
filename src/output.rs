//! Output formatting and persistence for wait-time summaries.
//!
//! Supports JSON pretty-printing and CSV append.

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::waits::WaitStats;

/// One summary row: wait statistics for a (route, stop, direction) group.
#[derive(Debug, Serialize)]
pub struct WaitSummaryRecord {
    pub computed_at: DateTime<Utc>,
    pub route: String,
    pub stop: String,
    pub direction: String,
    pub samples: usize,
    pub mean_wait_secs: f64,
    pub stddev_wait_secs: f64,
    pub p5_secs: f64,
    pub p25_secs: f64,
    pub p50_secs: f64,
    pub p75_secs: f64,
    pub p95_secs: f64,
}

impl WaitSummaryRecord {
    pub fn new(route: &str, stop: &str, direction: &str, stats: &WaitStats) -> Self {
        WaitSummaryRecord {
            computed_at: Utc::now(),
            route: route.to_string(),
            stop: stop.to_string(),
            direction: direction.to_string(),
            samples: stats.count,
            mean_wait_secs: stats.mean,
            stddev_wait_secs: stats.stddev,
            p5_secs: stats.p5,
            p25_secs: stats.p25,
            p50_secs: stats.p50,
            p75_secs: stats.p75,
            p95_secs: stats.p95,
        }
    }
}

/// Logs a record as pretty-printed JSON.
pub fn print_json(record: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

/// Appends a record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &str, record: &impl Serialize) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    fn record() -> WaitSummaryRecord {
        let stats = WaitStats::from_waits(&[30.0, 90.0, 150.0]).unwrap();
        WaitSummaryRecord::new("12", "5579", "12___I_F00", &stats)
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&record()).unwrap();
    }

    #[test]
    fn test_append_record_creates_file() {
        let path = temp_path("headway_rater_test_create.csv");
        let _ = fs::remove_file(&path); // clean up any prior run

        append_record(&path, &record()).unwrap();

        assert!(Path::new(&path).exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("mean_wait_secs"));
        assert!(content.contains("5579"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("headway_rater_test_header.csv");
        let _ = fs::remove_file(&path);

        append_record(&path, &record()).unwrap();
        append_record(&path, &record()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        // Header line should appear exactly once
        let header_count = content
            .lines()
            .filter(|l| l.contains("computed_at"))
            .count();
        assert_eq!(header_count, 1);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_two_rows() {
        let path = temp_path("headway_rater_test_rows.csv");
        let _ = fs::remove_file(&path);

        append_record(&path, &record()).unwrap();
        append_record(&path, &record()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        // 1 header + 2 data rows
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        fs::remove_file(&path).unwrap();
    }
}
