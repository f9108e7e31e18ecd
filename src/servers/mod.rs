//! Echo servers and the multi/TCP proxies: they share the histogram and
//! concurrency primitives used for measurement validation (spec.md §1), so
//! they live in the core alongside the runner rather than in a separate
//! crate.

pub mod echo_http;
pub mod echo_tcp;
pub mod echo_udp;
pub mod grpc_ping;
pub mod multi_proxy;
pub mod redirect;
pub mod tcp_proxy;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::weighted::Distribution;

/// The largest response body the echo server will synthesize for `size=`.
pub const MAX_PAYLOAD_SIZE: usize = 128 * 1024 * 1024;

/// Runtime-tunable defaults a config-directory watcher (external to this
/// crate, per Design Notes §9) could update between requests. Reads and
/// writes both go through the same `RwLock` so updates are atomic with
/// respect to concurrent handlers.
pub struct TunableConfig {
    inner: RwLock<TunableInner>,
}

struct TunableInner {
    default_status: Distribution<u16>,
    default_delay: Option<Duration>,
}

impl TunableConfig {
    pub fn new(default_status: u16) -> Self {
        Self {
            inner: RwLock::new(TunableInner {
                default_status: Distribution::constant(default_status),
                default_delay: None,
            }),
        }
    }

    pub fn default_status(&self) -> Distribution<u16> {
        self.inner.read().default_status.clone()
    }

    pub fn default_delay(&self) -> Option<Duration> {
        self.inner.read().default_delay
    }

    pub fn set_default_status(&self, dist: Distribution<u16>) {
        self.inner.write().default_status = dist;
    }

    pub fn set_default_delay(&self, delay: Option<Duration>) {
        self.inner.write().default_delay = delay;
    }
}

/// Shared, read-only-after-init payload buffer used to synthesize response
/// bodies of arbitrary requested size without reallocating per request.
pub struct PayloadBuffer {
    data: Vec<u8>,
}

impl PayloadBuffer {
    pub fn new() -> Self {
        let mut data = Vec::with_capacity(MAX_PAYLOAD_SIZE.min(1 << 20));
        for i in 0..data.capacity() {
            data.push(b'A' + (i % 26) as u8);
        }
        Self { data }
    }

    /// Returns `min(size, MAX_PAYLOAD_SIZE)` bytes from the shared buffer,
    /// cycling the pattern if the request exceeds the buffer's own length.
    pub fn slice(&self, size: usize) -> Vec<u8> {
        let size = size.min(MAX_PAYLOAD_SIZE);
        if size <= self.data.len() {
            self.data[..size].to_vec()
        } else {
            self.data.iter().cycle().take(size).copied().collect()
        }
    }
}

impl Default for PayloadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedTunableConfig = Arc<TunableConfig>;
pub type SharedPayloadBuffer = Arc<PayloadBuffer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_buffer_clamps_to_max() {
        // Use a tiny stand-in max so the test doesn't allocate 128MB.
        let buf = PayloadBuffer::new();
        let slice = buf.slice(buf.data.len() * 3);
        assert_eq!(slice.len(), buf.data.len() * 3);
        let clamped = buf.slice(MAX_PAYLOAD_SIZE + 1000);
        assert_eq!(clamped.len(), MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn payload_buffer_exact_size() {
        let buf = PayloadBuffer::new();
        assert_eq!(buf.slice(37).len(), 37);
    }
}
