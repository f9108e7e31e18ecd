//! Multi-proxy (`-M`): fans every incoming request out to K target base
//! URLs, either in parallel (first response streams back, the rest are
//! drained) or serially (forward in order, return the last response).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use reqwest::Client;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};

#[derive(Clone)]
pub struct MultiProxyConfig {
    pub targets: Vec<String>,
    pub serial: bool,
    pub mirror_origin: bool,
}

pub struct MultiProxyState {
    pub config: MultiProxyConfig,
    pub client: Client,
}

pub fn router(state: Arc<MultiProxyState>) -> Router {
    Router::new().route("/*path", any(handle)).route("/", any(handle)).with_state(state)
}

/// Binds `local_addr` and fans every incoming request out to `config`'s
/// targets until the process exits.
pub async fn serve(local_addr: &str, config: MultiProxyConfig) -> CoreResult<()> {
    let state = Arc::new(MultiProxyState { config, client: Client::new() });
    let listener = tokio::net::TcpListener::bind(local_addr)
        .await
        .map_err(|e| CoreError::Setup(format!("multi-proxy bind {local_addr}: {e}")))?;
    info!(local_addr, targets = ?state.config.targets, serial = state.config.serial, "multi-proxy listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| CoreError::Setup(format!("multi-proxy serve: {e}")))
}

async fn handle(State(state): State<Arc<MultiProxyState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            warn!("failed to buffer request body: {e}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let suffix = if state.config.mirror_origin {
        parts.uri.path_and_query().map(|pq| pq.as_str().to_string()).unwrap_or_default()
    } else {
        String::new()
    };

    if state.config.serial {
        forward_serial(&state, &parts.method, &suffix, &parts.headers, body_bytes).await
    } else {
        forward_parallel(&state, &parts.method, &suffix, &parts.headers, body_bytes).await
    }
}

async fn forward_one(
    client: &Client,
    target_base: &str,
    method: &axum::http::Method,
    suffix: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Option<(StatusCode, Bytes)> {
    let url = format!("{}{}", target_base.trim_end_matches('/'), suffix);
    let method = reqwest::Method::from_bytes(method.as_str().as_bytes()).ok()?;

    let mut req = client.request(method, &url);
    for (k, v) in headers.iter() {
        req = req.header(k.as_str(), v.as_bytes());
    }
    req = req.body(body);

    match req.send().await {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let bytes = resp.bytes().await.unwrap_or_default();
            Some((status, bytes))
        }
        Err(e) => {
            warn!("multi-proxy forward to {url} failed: {e}");
            None
        }
    }
}

async fn forward_serial(
    state: &MultiProxyState,
    method: &axum::http::Method,
    suffix: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let mut last = None;
    for target in &state.config.targets {
        last = forward_one(&state.client, target, method, suffix, headers, body.clone()).await;
    }
    match last {
        Some((status, bytes)) => (status, bytes).into_response(),
        None => StatusCode::BAD_GATEWAY.into_response(),
    }
}

async fn forward_parallel(
    state: &MultiProxyState,
    method: &axum::http::Method,
    suffix: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let futures = state
        .config
        .targets
        .iter()
        .map(|target| forward_one(&state.client, target, method, suffix, headers, body.clone()));

    let results = futures_util::future::join_all(futures).await;

    // First successful response wins; the rest were still drained above
    // (forward_one always reads the full body before returning).
    match results.into_iter().flatten().next() {
        Some((status, bytes)) => (status, bytes).into_response(),
        None => StatusCode::BAD_GATEWAY.into_response(),
    }
}

/// Used by the CLI to validate `-M "localAddr url1 url2 ..."` specs before
/// binding a listener.
pub fn parse_multi_spec(spec: &str) -> crate::error::CoreResult<(String, Vec<String>)> {
    let mut parts = spec.split_whitespace();
    let local_addr = parts
        .next()
        .ok_or_else(|| crate::error::CoreError::Config("empty -M spec".into()))?
        .to_string();
    let targets: Vec<String> = parts.map(|s| s.to_string()).collect();
    if targets.is_empty() {
        return Err(crate::error::CoreError::Config(format!(
            "-M spec {spec:?} has no target URLs"
        )));
    }
    let _: Uri = targets[0].parse().map_err(|_| {
        crate::error::CoreError::Config(format!("invalid target URL {:?}", targets[0]))
    })?;
    Ok((local_addr, targets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_multi_spec() {
        let (addr, targets) = parse_multi_spec("127.0.0.1:8080 http://a:1 http://b:2").unwrap();
        assert_eq!(addr, "127.0.0.1:8080");
        assert_eq!(targets, vec!["http://a:1", "http://b:2"]);
    }

    #[test]
    fn rejects_spec_with_no_targets() {
        assert!(parse_multi_spec("127.0.0.1:8080").is_err());
    }
}
