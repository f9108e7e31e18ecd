//! `RunnerResult` and its JSON serialization (spec.md §4.5).

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreResult;
use crate::histogram::DistributionReport;
use crate::options::OutputSink;

/// The result emitted at the end of one run. Field order matches the
/// declared order here, which `serde_json` preserves for struct variants.
#[derive(Debug, Clone, Serialize)]
pub struct RunnerResult {
    #[serde(rename = "RequestedQPS")]
    pub requested_qps: f64,
    #[serde(rename = "ActualQPS")]
    pub actual_qps: f64,
    #[serde(rename = "RequestedDuration")]
    pub requested_duration: Option<f64>,
    #[serde(rename = "ActualDuration")]
    pub actual_duration: f64,
    #[serde(rename = "NumThreads")]
    pub num_threads: u32,
    #[serde(rename = "Count")]
    pub total_count: u64,
    #[serde(rename = "WarmupCount")]
    pub warmup_count: u64,
    #[serde(rename = "ErrorCount")]
    pub error_count: u64,
    #[serde(rename = "RetCodes")]
    pub error_tally: HashMap<String, u64>,
    #[serde(rename = "BytesIn")]
    pub bytes_in: u64,
    #[serde(rename = "BytesOut")]
    pub bytes_out: u64,
    #[serde(rename = "Labels")]
    pub labels: String,
    #[serde(rename = "RunID")]
    pub run_id: String,
    #[serde(rename = "DurationHistogram")]
    pub distribution: DistributionReport,
}

/// Wraps a `RunnerResult` with the `StartTime` field, added once the run
/// finishes (the result itself carries no wall-clock anchor).
#[derive(Debug, Serialize)]
struct TimestampedResult<'a> {
    #[serde(rename = "StartTime")]
    start_time: String,
    #[serde(flatten)]
    result: &'a RunnerResult,
}

impl RunnerResult {
    /// Serializes this result (with the given start time) and writes it to
    /// `sink`. A `File`/`AutoSave` sink is created, truncated, flushed, and
    /// closed; `Stdout` writes to standard output; `None` is a no-op.
    pub fn write(&self, start_time: DateTime<Utc>, sink: &OutputSink) -> CoreResult<()> {
        let wrapped = TimestampedResult {
            start_time: start_time.to_rfc3339(),
            result: self,
        };
        let json = serde_json::to_string_pretty(&wrapped)?;

        match sink {
            OutputSink::None => Ok(()),
            OutputSink::Stdout => {
                println!("{json}");
                Ok(())
            }
            OutputSink::File(path) => write_to_path(path, &json),
            OutputSink::AutoSave(dir) => {
                let filename = auto_save_filename(&self.labels, start_time);
                write_to_path(&dir.join(filename), &json)
            }
        }
    }
}

fn write_to_path(path: &Path, json: &str) -> CoreResult<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(json.as_bytes())?;
    file.flush()?;
    Ok(())
}

/// `{sanitized_labels}_{YYYY-MM-DD-HHMMSS}.json`, per spec.md §4.5.
fn auto_save_filename(labels: &str, start_time: DateTime<Utc>) -> String {
    let sanitized: String = labels
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let sanitized = if sanitized.is_empty() { "run".to_string() } else { sanitized };
    format!("{sanitized}_{}.json", start_time.format("%Y-%m-%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Histogram;

    fn sample_result() -> RunnerResult {
        let mut h = Histogram::new(0.0, 0.001).unwrap();
        for v in [0.001, 0.002, 0.01, 0.5] {
            h.record(v).unwrap();
        }
        let distribution = h.export(&[50.0, 99.0]);
        RunnerResult {
            requested_qps: 100.0,
            actual_qps: 98.2,
            requested_duration: Some(2.0),
            actual_duration: 2.01,
            num_threads: 4,
            total_count: 4,
            warmup_count: 0,
            error_count: 0,
            error_tally: HashMap::new(),
            bytes_in: 100,
            bytes_out: 40,
            labels: "smoke test".into(),
            run_id: "abc123".into(),
            distribution,
        }
    }

    #[test]
    fn auto_save_filename_sanitizes_labels() {
        let ts = DateTime::parse_from_rfc3339("2026-07-27T10:20:30Z").unwrap().with_timezone(&Utc);
        let name = auto_save_filename("smoke test/v1", ts);
        assert_eq!(name, "smoke_test_v1_2026-07-27-102030.json");
    }

    #[test]
    fn auto_save_filename_defaults_when_labels_empty() {
        let ts = DateTime::parse_from_rfc3339("2026-07-27T10:20:30Z").unwrap().with_timezone(&Utc);
        let name = auto_save_filename("", ts);
        assert_eq!(name, "run_2026-07-27-102030.json");
    }

    #[test]
    fn write_to_stdout_does_not_error() {
        let result = sample_result();
        let ts = Utc::now();
        result.write(ts, &OutputSink::Stdout).unwrap();
    }

    #[test]
    fn write_to_file_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let result = sample_result();
        let ts = Utc::now();
        result.write(ts, &OutputSink::File(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["RunID"], "abc123");
        assert_eq!(value["Count"], 4);
        assert!(value["StartTime"].is_string());
    }
}
