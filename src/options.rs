//! `RunnerOptions`: the immutable configuration the CLI builds and hands to
//! the periodic runner. No process-wide state lives in the core — every
//! tunable is a field here (Design Notes §9).

use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::percentiles::parse_percentiles;

/// How a run decides when to stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunLength {
    /// Stop after exactly `n` total calls across all workers.
    Exact(u64),
    /// Stop when wall-clock time reaches this duration after the start
    /// barrier.
    Timed(Duration),
    /// Run until externally cancelled (negative duration in the raw CLI
    /// input).
    Infinite,
}

/// A policy that halts the run the moment a call result matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortOn {
    /// Halt on a specific HTTP status code.
    HttpStatus(u16),
    /// Halt on any socket/transport-level error (CLI's `-1` sentinel).
    SocketError,
}

/// Where a `RunnerResult` is written once a run completes.
#[derive(Debug, Clone)]
pub enum OutputSink {
    /// `-` on the CLI: write to stdout.
    Stdout,
    /// A specific file path, created/truncated.
    File(std::path::PathBuf),
    /// Auto-save mode: derive the filename from labels + timestamp and
    /// place it under this data directory.
    AutoSave(std::path::PathBuf),
    /// No JSON output requested.
    None,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Target aggregate QPS across all workers. `<= 0` means unthrottled.
    pub qps: f64,
    /// Number of concurrent workers, clamped to >= 1 by `normalize`.
    pub num_threads: u32,
    pub run_length: RunLength,
    /// Percentiles to report, sorted/deduped/validated.
    pub percentiles: Vec<f64>,
    /// Histogram linear-region bucket width (seconds).
    pub resolution: f64,
    /// Histogram linear-region origin (seconds).
    pub offset: f64,
    pub jitter: bool,
    pub run_id: String,
    pub labels: String,
    pub output: OutputSink,
    pub abort_on: Option<AbortOn>,
    pub allow_initial_errors: bool,
}

/// Raw, CLI-shaped inputs before normalization. Mirrors the flags in
/// spec.md §6 closely enough that `cli.rs` can build one directly.
pub struct RawOptions {
    pub qps: f64,
    pub num_threads: u32,
    /// Negative => infinite; zero => defer to `exactly`; positive => timed.
    pub duration: f64,
    /// `> 0` supersedes `duration`.
    pub exactly: u64,
    pub percentiles: String,
    pub resolution: f64,
    pub offset: f64,
    pub jitter: bool,
    pub run_id: String,
    pub labels: String,
    pub output: OutputSink,
    pub abort_on: Option<AbortOn>,
    pub allow_initial_errors: bool,
}

impl RawOptions {
    /// Validates and converts into an immutable `RunnerOptions`. This is
    /// the single place the "duration == 0 and exactly == 0" open question
    /// from spec.md §9 is resolved: both zero is a `ConfigError`.
    pub fn normalize(self) -> CoreResult<RunnerOptions> {
        let num_threads = self.num_threads.max(1);

        if self.resolution <= 0.0 || !self.resolution.is_finite() {
            return Err(CoreError::Config(format!(
                "resolution must be > 0, got {}",
                self.resolution
            )));
        }
        if !self.offset.is_finite() {
            return Err(CoreError::Config("offset must be finite".into()));
        }

        let run_length = if self.exactly > 0 {
            RunLength::Exact(self.exactly)
        } else if self.duration > 0.0 {
            RunLength::Timed(Duration::from_secs_f64(self.duration))
        } else if self.duration < 0.0 {
            RunLength::Infinite
        } else {
            return Err(CoreError::Config(
                "both duration and exactly count are zero; specify one".into(),
            ));
        };

        let percentiles = parse_percentiles(&self.percentiles)?;

        Ok(RunnerOptions {
            qps: self.qps,
            num_threads,
            run_length,
            percentiles,
            resolution: self.resolution,
            offset: self.offset,
            jitter: self.jitter,
            run_id: self.run_id,
            labels: self.labels,
            output: self.output,
            abort_on: self.abort_on,
            allow_initial_errors: self.allow_initial_errors,
        })
    }
}

impl RunnerOptions {
    /// Per-worker target rate. `None` means unthrottled.
    pub fn per_worker_qps(&self) -> Option<f64> {
        if self.qps <= 0.0 {
            None
        } else {
            Some(self.qps / self.num_threads as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_raw() -> RawOptions {
        RawOptions {
            qps: 100.0,
            num_threads: 4,
            duration: 2.0,
            exactly: 0,
            percentiles: "50,75,90,99,99.9".into(),
            resolution: 0.001,
            offset: 0.0,
            jitter: false,
            run_id: "r1".into(),
            labels: "".into(),
            output: OutputSink::None,
            abort_on: None,
            allow_initial_errors: false,
        }
    }

    #[test]
    fn both_zero_is_config_error() {
        let mut raw = base_raw();
        raw.duration = 0.0;
        raw.exactly = 0;
        assert!(matches!(raw.normalize(), Err(CoreError::Config(_))));
    }

    #[test]
    fn exactly_supersedes_duration() {
        let mut raw = base_raw();
        raw.exactly = 10;
        let opts = raw.normalize().unwrap();
        assert_eq!(opts.run_length, RunLength::Exact(10));
    }

    #[test]
    fn negative_duration_is_infinite() {
        let mut raw = base_raw();
        raw.duration = -1.0;
        let opts = raw.normalize().unwrap();
        assert_eq!(opts.run_length, RunLength::Infinite);
    }

    #[test]
    fn num_threads_clamped_to_at_least_one() {
        let mut raw = base_raw();
        raw.num_threads = 0;
        let opts = raw.normalize().unwrap();
        assert_eq!(opts.num_threads, 1);
    }

    #[test]
    fn per_worker_qps_splits_evenly() {
        let opts = base_raw().normalize().unwrap();
        assert_eq!(opts.per_worker_qps(), Some(25.0));
    }

    #[test]
    fn unthrottled_when_qps_non_positive() {
        let mut raw = base_raw();
        raw.qps = 0.0;
        let opts = raw.normalize().unwrap();
        assert_eq!(opts.per_worker_qps(), None);
    }
}
