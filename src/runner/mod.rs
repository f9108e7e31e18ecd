//! The periodic runner: schedules calls across N workers at a target rate,
//! collects per-worker histograms, and merges them into a final result.

pub mod result;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::AdapterFactory;
use crate::error::CoreResult;
use crate::histogram::Histogram;
use crate::options::{AbortOn, RunLength, RunnerOptions};
use result::RunnerResult;

/// Bootstrap delay before the synchronized start instant, giving every
/// worker's spawn + barrier wait time to settle before `T0`.
const BOOTSTRAP: Duration = Duration::from_millis(50);

struct WorkerOutcome {
    histogram: Histogram,
    calls: u64,
    errors: u64,
    warmup: u64,
    error_tally: HashMap<String, u64>,
    bytes_in: u64,
    bytes_out: u64,
    last_completion: Instant,
}

pub struct PeriodicRunner {
    options: RunnerOptions,
    factory: Arc<dyn AdapterFactory>,
}

impl PeriodicRunner {
    pub fn new(options: RunnerOptions, factory: Arc<dyn AdapterFactory>) -> Self {
        Self { options, factory }
    }

    /// Runs to completion. `cancel` is the external cancellation signal
    /// (ctrl-c, or a caller-driven abort); it is also the token `AbortOn`
    /// triggers internally.
    pub async fn run(self, cancel: CancellationToken) -> CoreResult<RunnerResult> {
        let options = Arc::new(self.options);
        let num_threads = options.num_threads as usize;

        // Establish every worker's adapter before the start barrier; any
        // failure here is a SetupError that aborts the whole run.
        let mut adapters = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            adapters.push(self.factory.build(i).await?);
        }

        let barrier = Arc::new(Barrier::new(num_threads));
        let start_instant = Instant::now() + BOOTSTRAP;
        let exact_remaining = Arc::new(AtomicU64::new(match options.run_length {
            RunLength::Exact(n) => n,
            _ => 0,
        }));
        let mut handles = Vec::with_capacity(num_threads);
        for (worker_index, adapter) in adapters.into_iter().enumerate() {
            let options = options.clone();
            let barrier = barrier.clone();
            let cancel = cancel.clone();
            let exact_remaining = exact_remaining.clone();

            handles.push(tokio::spawn(async move {
                run_worker(
                    worker_index,
                    options,
                    adapter,
                    barrier,
                    start_instant,
                    cancel,
                    exact_remaining,
                )
                .await
            }));
        }

        let mut outcomes = Vec::with_capacity(num_threads);
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    warn!("worker task panicked: {join_err}");
                }
            }
        }

        merge_outcomes(&options, start_instant, outcomes)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    worker_index: usize,
    options: Arc<RunnerOptions>,
    mut adapter: Box<dyn crate::adapters::CallAdapter>,
    barrier: Arc<Barrier>,
    start_instant: Instant,
    cancel: CancellationToken,
    exact_remaining: Arc<AtomicU64>,
) -> WorkerOutcome {
    let mut histogram = Histogram::new(options.offset, options.resolution)
        .expect("options were validated during normalize");

    let interval = options.per_worker_qps().map(|q| Duration::from_secs_f64(1.0 / q));

    let is_exact_mode = matches!(options.run_length, RunLength::Exact(_));
    let deadline = match options.run_length {
        RunLength::Timed(d) => Some(start_instant + d),
        _ => None,
    };

    let mut calls: u64 = 0;
    let mut errors: u64 = 0;
    let mut warmup: u64 = 0;
    let mut bytes_in: u64 = 0;
    let mut bytes_out: u64 = 0;
    let mut error_tally: HashMap<String, u64> = HashMap::new();
    let mut last_completion = start_instant;

    barrier.wait().await;

    let mut k: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            debug!(worker_index, "cancellation observed before scheduling call {k}");
            break;
        }

        if is_exact_mode {
            let prev = exact_remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                if v == 0 { None } else { Some(v - 1) }
            });
            if prev.is_err() {
                break;
            }
        }

        let nominal = match interval {
            Some(iv) => start_instant + iv * k as u32,
            None => Instant::now(),
        };
        let scheduled = if options.jitter {
            if let Some(iv) = interval {
                let half = iv.as_secs_f64() / 2.0;
                let jitter_secs = rand::thread_rng().gen_range(-half..half);
                add_signed(nominal, jitter_secs)
            } else {
                nominal
            }
        } else {
            nominal
        };

        if let Some(dl) = deadline {
            if scheduled >= dl {
                break;
            }
        }

        let now = Instant::now();
        if scheduled > now {
            tokio::time::sleep(scheduled - now).await;
        }

        if cancel.is_cancelled() {
            break;
        }
        if let Some(dl) = deadline {
            if Instant::now() >= dl {
                break;
            }
        }

        let call_start = Instant::now();
        let outcome = adapter.call().await;
        let elapsed = call_start.elapsed();
        last_completion = Instant::now();

        if let Err(e) = histogram.record(elapsed.as_secs_f64()) {
            warn!(worker_index, "failed to record sample: {e}");
        }

        calls += 1;
        let this_is_warmup = !is_exact_mode && k == 0;
        if this_is_warmup {
            warmup += 1;
        }

        bytes_in += outcome.bytes_in;
        bytes_out += outcome.bytes_out;

        if !outcome.ok {
            errors += 1;
            if let Some(tag) = &outcome.tag {
                *error_tally.entry(tag.clone()).or_insert(0) += 1;
            }

            let during_warmup_grace = this_is_warmup && options.allow_initial_errors;
            if !during_warmup_grace {
                if let Some(policy) = options.abort_on {
                    if abort_matches(policy, &outcome.tag) {
                        info!(worker_index, ?policy, "abort-on policy matched, cancelling run");
                        cancel.cancel();
                    }
                }
            }
        }

        k += 1;
    }

    adapter.close().await;

    WorkerOutcome {
        histogram,
        calls,
        errors,
        warmup,
        error_tally,
        bytes_in,
        bytes_out,
        last_completion,
    }
}

fn abort_matches(policy: AbortOn, tag: &Option<String>) -> bool {
    match (policy, tag) {
        (AbortOn::HttpStatus(code), Some(t)) => t.parse::<u16>().map(|c| c == code).unwrap_or(false),
        (AbortOn::SocketError, Some(t)) => t == "socket" || t == "timeout",
        _ => false,
    }
}

fn add_signed(instant: Instant, secs: f64) -> Instant {
    if secs >= 0.0 {
        instant + Duration::from_secs_f64(secs)
    } else {
        instant
            .checked_sub(Duration::from_secs_f64(-secs))
            .unwrap_or(instant)
    }
}

fn merge_outcomes(
    options: &RunnerOptions,
    start_instant: Instant,
    outcomes: Vec<WorkerOutcome>,
) -> CoreResult<RunnerResult> {
    let mut merged = Histogram::new(options.offset, options.resolution)?;
    let mut total_calls = 0u64;
    let mut total_errors = 0u64;
    let mut total_warmup = 0u64;
    let mut bytes_in = 0u64;
    let mut bytes_out = 0u64;
    let mut error_tally: HashMap<String, u64> = HashMap::new();
    let mut last_completion = start_instant;

    for outcome in outcomes {
        merged.merge(&outcome.histogram)?;
        total_calls += outcome.calls;
        total_errors += outcome.errors;
        total_warmup += outcome.warmup;
        bytes_in += outcome.bytes_in;
        bytes_out += outcome.bytes_out;
        for (k, v) in outcome.error_tally {
            *error_tally.entry(k).or_insert(0) += v;
        }
        if outcome.last_completion > last_completion {
            last_completion = outcome.last_completion;
        }
    }

    let actual_duration = last_completion.saturating_duration_since(start_instant);
    let actual_qps = if actual_duration.as_secs_f64() > 0.0 {
        total_calls as f64 / actual_duration.as_secs_f64()
    } else {
        0.0
    };

    let distribution = merged.export(&options.percentiles);

    Ok(RunnerResult {
        requested_qps: options.qps,
        actual_qps,
        requested_duration: match options.run_length {
            RunLength::Timed(d) => Some(d.as_secs_f64()),
            _ => None,
        },
        actual_duration: actual_duration.as_secs_f64(),
        num_threads: options.num_threads,
        total_count: total_calls,
        warmup_count: total_warmup,
        error_count: total_errors,
        error_tally,
        bytes_in,
        bytes_out,
        labels: options.labels.clone(),
        run_id: options.run_id.clone(),
        distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterFactory, CallAdapter, CallOutcome};
    use crate::options::{OutputSink, RawOptions};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;

    struct AlwaysOkAdapter;

    #[async_trait]
    impl CallAdapter for AlwaysOkAdapter {
        async fn call(&mut self) -> CallOutcome {
            CallOutcome { ok: true, bytes_in: 1, bytes_out: 1, tag: None }
        }
        async fn close(&mut self) {}
    }

    struct AlwaysOkFactory;

    #[async_trait]
    impl AdapterFactory for AlwaysOkFactory {
        async fn build(&self, _worker_index: usize) -> CoreResult<Box<dyn CallAdapter>> {
            Ok(Box::new(AlwaysOkAdapter))
        }
    }

    struct FlakyFactory {
        calls_before_failure: StdAtomicU64,
    }

    struct FlakyAdapter {
        counter: Arc<StdAtomicU64>,
    }

    #[async_trait]
    impl CallAdapter for FlakyAdapter {
        async fn call(&mut self) -> CallOutcome {
            let n = self.counter.fetch_sub(1, Ordering::SeqCst);
            if n == 0 {
                CallOutcome { ok: false, bytes_in: 0, bytes_out: 0, tag: Some("503".into()) }
            } else {
                CallOutcome { ok: true, bytes_in: 1, bytes_out: 1, tag: Some("200".into()) }
            }
        }
        async fn close(&mut self) {}
    }

    #[async_trait]
    impl AdapterFactory for FlakyFactory {
        async fn build(&self, _worker_index: usize) -> CoreResult<Box<dyn CallAdapter>> {
            let shared = Arc::new(StdAtomicU64::new(self.calls_before_failure.load(Ordering::SeqCst)));
            Ok(Box::new(FlakyAdapter { counter: shared }))
        }
    }

    fn raw_exact(n: u64, threads: u32) -> RawOptions {
        RawOptions {
            qps: 0.0,
            num_threads: threads,
            duration: 0.0,
            exactly: n,
            percentiles: "50,99".into(),
            resolution: 0.001,
            offset: 0.0,
            jitter: false,
            run_id: "test".into(),
            labels: "".into(),
            output: OutputSink::None,
            abort_on: None,
            allow_initial_errors: false,
        }
    }

    #[tokio::test]
    async fn exact_mode_completes_exactly_n_calls() {
        let options = raw_exact(10, 4).normalize().unwrap();
        let runner = PeriodicRunner::new(options, Arc::new(AlwaysOkFactory));
        let result = runner.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.total_count, 10);
        assert_eq!(result.warmup_count, 0);
    }

    #[tokio::test]
    async fn timed_mode_produces_plausible_count() {
        let mut raw = raw_exact(0, 2);
        raw.exactly = 0;
        raw.duration = 1.0;
        raw.qps = 50.0;
        let options = raw.normalize().unwrap();
        let runner = PeriodicRunner::new(options, Arc::new(AlwaysOkFactory));
        let result = runner.run(CancellationToken::new()).await.unwrap();
        assert!(result.total_count > 0, "expected some calls, got {}", result.total_count);
        assert!(result.total_count <= 120, "count should roughly track 50qps*1s, got {}", result.total_count);
    }

    #[tokio::test]
    async fn abort_on_policy_stops_run_early() {
        let options = raw_exact(1000, 1).normalize().unwrap();
        let mut options = options;
        options.abort_on = Some(AbortOn::HttpStatus(503));
        let factory = FlakyFactory { calls_before_failure: StdAtomicU64::new(3) };
        let runner = PeriodicRunner::new(options, Arc::new(factory));
        let result = runner.run(CancellationToken::new()).await.unwrap();
        assert!(result.total_count < 1000, "abort-on should have stopped the run early");
        assert!(result.error_tally.get("503").copied().unwrap_or(0) >= 1);
    }
}
