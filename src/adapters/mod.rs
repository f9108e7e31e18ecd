//! Per-protocol call adapters: stateless `DoCall` primitives the periodic
//! runner treats as opaque. Each adapter is thread-confined — one instance
//! per worker, established before the run's start barrier.

pub mod grpc;
pub mod http;
pub mod tcp;
pub mod udp;

use async_trait::async_trait;

use crate::error::CoreResult;

/// The result of one `CallAdapter::call` invocation.
#[derive(Debug, Clone, Default)]
pub struct CallOutcome {
    pub ok: bool,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Protocol-specific tag used for error/status classification in the
    /// final report (HTTP status code as a string, "timeout", "socket", ...).
    pub tag: Option<String>,
}

/// A stateless call primitive, confined to a single worker/connection.
#[async_trait]
pub trait CallAdapter: Send {
    /// Issue one call and report its outcome. Must never panic on a
    /// failing call — failures are reported via `ok = false` plus `tag`.
    async fn call(&mut self) -> CallOutcome;

    /// Graceful close, invoked once when the worker exits.
    async fn close(&mut self);
}

/// Builds one `CallAdapter` per worker. Implementations must establish
/// their connection during `build`, before the run's synchronized start —
/// a failure here is a `SetupError` that aborts the whole run.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn build(&self, worker_index: usize) -> CoreResult<Box<dyn CallAdapter>>;
}
