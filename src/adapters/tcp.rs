//! TCP call adapter: one persistent connection per worker. Each call writes
//! a fixed payload and expects a byte-exact echo back within the timeout.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{AdapterFactory, CallAdapter, CallOutcome};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct TcpAdapterConfig {
    pub addr: String,
    pub payload: Vec<u8>,
    pub timeout: Duration,
}

pub struct TcpAdapterFactory {
    pub config: TcpAdapterConfig,
}

#[async_trait]
impl AdapterFactory for TcpAdapterFactory {
    async fn build(&self, _worker_index: usize) -> CoreResult<Box<dyn CallAdapter>> {
        let stream = TcpStream::connect(&self.config.addr)
            .await
            .map_err(|e| CoreError::Setup(format!("tcp connect to {}: {e}", self.config.addr)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| CoreError::Setup(format!("set_nodelay: {e}")))?;

        Ok(Box::new(TcpAdapter {
            stream,
            config: self.config.clone(),
        }))
    }
}

struct TcpAdapter {
    stream: TcpStream,
    config: TcpAdapterConfig,
}

#[async_trait]
impl CallAdapter for TcpAdapter {
    async fn call(&mut self) -> CallOutcome {
        let payload = &self.config.payload;
        let want = payload.len();

        let result = timeout(self.config.timeout, async {
            self.stream.write_all(payload).await?;
            let mut buf = vec![0u8; want];
            self.stream.read_exact(&mut buf).await?;
            Ok::<Vec<u8>, std::io::Error>(buf)
        })
        .await;

        match result {
            Ok(Ok(echoed)) => CallOutcome {
                ok: echoed == *payload,
                bytes_in: echoed.len() as u64,
                bytes_out: payload.len() as u64,
                tag: None,
            },
            Ok(Err(_)) => CallOutcome {
                ok: false,
                bytes_in: 0,
                bytes_out: payload.len() as u64,
                tag: Some("socket".into()),
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
        let _ = self.stream.shutdown().await;
    }
}
