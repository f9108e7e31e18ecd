//! gRPC call adapter. One `tonic::transport::Channel` per worker, multiplexed
//! across `streams` logical client handles (HTTP/2 already multiplexes the
//! channel; the `streams` count controls how many round-robin client handles
//! a single worker walks through, matching the round-robin contract in
//! spec.md §4.3 without opening `streams` separate TCP connections).

use async_trait::async_trait;
use tonic::transport::Channel;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

use super::{AdapterFactory, CallAdapter, CallOutcome};
use crate::error::{CoreError, CoreResult};

pub mod pb {
    tonic::include_proto!("ballistic.ping");
}

use pb::ping_server_client::PingServerClient;
use pb::PingMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrpcMode {
    /// Probe the standard `grpc.health.v1.Health/Check` RPC.
    Health { service_name: String },
    /// Exercise the crate's own unary `Ping` RPC.
    Ping,
}

#[derive(Debug, Clone)]
pub struct GrpcAdapterConfig {
    /// `host:port`, no scheme.
    pub target: String,
    pub streams: usize,
    pub mode: GrpcMode,
    pub payload_size: usize,
}

pub struct GrpcAdapterFactory {
    pub config: GrpcAdapterConfig,
}

#[async_trait]
impl AdapterFactory for GrpcAdapterFactory {
    async fn build(&self, _worker_index: usize) -> CoreResult<Box<dyn CallAdapter>> {
        let endpoint = format!("http://{}", self.config.target);
        let channel = Channel::from_shared(endpoint)
            .map_err(|e| CoreError::Setup(format!("invalid gRPC target: {e}")))?
            .connect()
            .await
            .map_err(|e| CoreError::Setup(format!("gRPC connect to {}: {e}", self.config.target)))?;

        let streams = self.config.streams.max(1);

        match &self.config.mode {
            GrpcMode::Health { service_name } => {
                let clients: Vec<_> = (0..streams)
                    .map(|_| HealthClient::new(channel.clone()))
                    .collect();
                Ok(Box::new(GrpcHealthAdapter {
                    clients,
                    next: 0,
                    service_name: service_name.clone(),
                }))
            }
            GrpcMode::Ping => {
                let clients: Vec<_> = (0..streams)
                    .map(|_| PingServerClient::new(channel.clone()))
                    .collect();
                Ok(Box::new(GrpcPingAdapter {
                    clients,
                    next: 0,
                    payload: vec![0u8; self.config.payload_size],
                }))
            }
        }
    }
}

struct GrpcHealthAdapter {
    clients: Vec<HealthClient<Channel>>,
    next: usize,
    service_name: String,
}

#[async_trait]
impl CallAdapter for GrpcHealthAdapter {
    async fn call(&mut self) -> CallOutcome {
        let idx = self.next;
        self.next = (self.next + 1) % self.clients.len();

        let request = tonic::Request::new(HealthCheckRequest {
            service: self.service_name.clone(),
        });

        match self.clients[idx].check(request).await {
            Ok(resp) => {
                let serving = resp.get_ref().status == tonic_health::pb::health_check_response::ServingStatus::Serving as i32;
                CallOutcome {
                    ok: serving,
                    bytes_in: 0,
                    bytes_out: 0,
                    tag: Some(format!("{:?}", resp.get_ref().status)),
                }
            }
            Err(status) => CallOutcome {
                ok: false,
                bytes_in: 0,
                bytes_out: 0,
                tag: Some(status.code().to_string()),
            },
        }
    }

    async fn close(&mut self) {}
}

struct GrpcPingAdapter {
    clients: Vec<PingServerClient<Channel>>,
    next: usize,
    payload: Vec<u8>,
}

#[async_trait]
impl CallAdapter for GrpcPingAdapter {
    async fn call(&mut self) -> CallOutcome {
        let idx = self.next;
        self.next = (self.next + 1) % self.clients.len();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        let request = tonic::Request::new(PingMessage {
            ts_seconds: now.as_secs() as i64,
            ts_nanos: now.subsec_nanos() as i32,
            payload: self.payload.clone(),
            seq: 0,
        });

        let bytes_out = self.payload.len() as u64;

        match self.clients[idx].ping(request).await {
            Ok(resp) => CallOutcome {
                ok: true,
                bytes_in: resp.get_ref().payload.len() as u64,
                bytes_out,
                tag: None,
            },
            Err(status) => CallOutcome {
                ok: false,
                bytes_in: 0,
                bytes_out,
                tag: Some(status.code().to_string()),
            },
        }
    }

    async fn close(&mut self) {}
}
