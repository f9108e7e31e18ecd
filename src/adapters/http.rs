//! HTTP call adapter: one `reqwest::Client` per worker (keep-alive is the
//! client's default), issuing the configured method/body/headers.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Method};

use super::{AdapterFactory, CallAdapter, CallOutcome};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct HttpAdapterConfig {
    pub url: String,
    pub method: Method,
    pub body: Option<Vec<u8>>,
    pub headers: Vec<(String, String)>,
    pub keep_alive: bool,
    pub discard_body: bool,
    pub timeout: Duration,
    /// If set, only this status is considered `ok`; otherwise any 2xx.
    pub accept_status: Option<u16>,
}

pub struct HttpAdapterFactory {
    pub config: HttpAdapterConfig,
}

#[async_trait]
impl AdapterFactory for HttpAdapterFactory {
    async fn build(&self, _worker_index: usize) -> CoreResult<Box<dyn CallAdapter>> {
        let mut builder = Client::builder().timeout(self.config.timeout);
        if !self.config.keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        }
        let client = builder
            .build()
            .map_err(|e| CoreError::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Box::new(HttpAdapter {
            client,
            config: self.config.clone(),
        }))
    }
}

struct HttpAdapter {
    client: Client,
    config: HttpAdapterConfig,
}

#[async_trait]
impl CallAdapter for HttpAdapter {
    async fn call(&mut self) -> CallOutcome {
        let mut req = self.client.request(self.config.method.clone(), &self.config.url);
        for (k, v) in &self.config.headers {
            req = req.header(k, v);
        }
        let bytes_out = self.config.body.as_ref().map(|b| b.len() as u64).unwrap_or(0);
        if let Some(body) = self.config.body.clone() {
            req = req.body(body);
        }

        match req.send().await {
            Ok(resp) => {
                let status = resp.status();
                let bytes_in = if self.config.discard_body {
                    // Drain chunk-by-chunk instead of buffering the whole
                    // body, so a large response never gets fully allocated.
                    let mut stream = resp.bytes_stream();
                    let mut total = 0u64;
                    while let Some(chunk) = stream.next().await {
                        total += chunk.map(|c| c.len() as u64).unwrap_or(0);
                    }
                    total
                } else {
                    resp.bytes().await.map(|b| b.len() as u64).unwrap_or(0)
                };

                let ok = match self.config.accept_status {
                    Some(wanted) => status.as_u16() == wanted,
                    None => status.is_success(),
                };

                CallOutcome {
                    ok,
                    bytes_in,
                    bytes_out,
                    tag: Some(status.as_u16().to_string()),
                }
            }
            Err(e) => CallOutcome {
                ok: false,
                bytes_in: 0,
                bytes_out,
                tag: Some(if e.is_timeout() { "timeout".into() } else { "socket".into() }),
            },
        }
    }

    async fn close(&mut self) {
        // reqwest::Client has no explicit close; dropping it tears down the
        // connection pool. Nothing to do here beyond documenting intent.
    }
}
