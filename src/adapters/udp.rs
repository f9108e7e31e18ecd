//! UDP call adapter: one bound socket per worker, connected to the target
//! so `send`/`recv` don't need to re-specify the peer address each call.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::{AdapterFactory, CallAdapter, CallOutcome};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct UdpAdapterConfig {
    pub addr: String,
    pub payload: Vec<u8>,
    pub udp_timeout: Duration,
}

pub struct UdpAdapterFactory {
    pub config: UdpAdapterConfig,
}

#[async_trait]
impl AdapterFactory for UdpAdapterFactory {
    async fn build(&self, _worker_index: usize) -> CoreResult<Box<dyn CallAdapter>> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| CoreError::Setup(format!("udp bind: {e}")))?;
        socket
            .connect(&self.config.addr)
            .await
            .map_err(|e| CoreError::Setup(format!("udp connect to {}: {e}", self.config.addr)))?;

        Ok(Box::new(UdpAdapter {
            socket,
            config: self.config.clone(),
        }))
    }
}

struct UdpAdapter {
    socket: UdpSocket,
    config: UdpAdapterConfig,
}

#[async_trait]
impl CallAdapter for UdpAdapter {
    async fn call(&mut self) -> CallOutcome {
        let payload = &self.config.payload;

        if let Err(e) = self.socket.send(payload).await {
            return CallOutcome {
                ok: false,
                bytes_in: 0,
                bytes_out: 0,
                tag: Some(format!("send error: {e}")),
            };
        }

        let mut buf = vec![0u8; 65_536];
        match timeout(self.config.udp_timeout, self.socket.recv(&mut buf)).await {
            Ok(Ok(n)) => CallOutcome {
                ok: true,
                bytes_in: n as u64,
                bytes_out: payload.len() as u64,
                tag: None,
            },
            Ok(Err(e)) => CallOutcome {
                ok: false,
                bytes_in: 0,
                bytes_out: payload.len() as u64,
                tag: Some(format!("recv error: {e}")),
            },
            Err(_) => CallOutcome {
                ok: false,
                bytes_in: 0,
                bytes_out: payload.len() as u64,
                tag: Some("timeout".into()),
            },
        }
    }

    async fn close(&mut self) {
        // UDP sockets have no shutdown handshake; dropping releases the fd.
    }
}
