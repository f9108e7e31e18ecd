//! HTTP echo server: a single axum handler reading query knobs (`status`,
//! `delay`, `size`, `header`, `close`), used both as a measurement target
//! and to validate the runner's HTTP adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tracing::warn;

use super::{PayloadBuffer, TunableConfig};
use crate::weighted::Distribution;

pub struct EchoState {
    pub payload: Arc<PayloadBuffer>,
    pub tunable: Arc<TunableConfig>,
}

pub fn router(state: Arc<EchoState>) -> Router {
    Router::new().route("/*path", any(handle)).route("/", any(handle)).with_state(state)
}

fn parse_status_spec(spec: &str) -> crate::error::CoreResult<u16> {
    spec.parse()
        .map_err(|_| crate::error::CoreError::Config(format!("invalid status code {spec:?}")))
}

fn parse_delay_spec(spec: &str) -> crate::error::CoreResult<Duration> {
    let ms: u64 = spec
        .trim_end_matches("ms")
        .parse()
        .map_err(|_| crate::error::CoreError::Config(format!("invalid delay {spec:?}")))?;
    Ok(Duration::from_millis(ms))
}

async fn handle(
    State(state): State<Arc<EchoState>>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let mut rng = rand::thread_rng();

    let status = match params.get("status") {
        Some(spec) => match Distribution::parse(spec, parse_status_spec) {
            Ok(dist) => dist.sample(&mut rng),
            Err(e) => {
                warn!("bad status spec {spec:?}: {e}");
                200
            }
        },
        None => state.tunable.default_status().sample(&mut rng),
    };

    let delay = match params.get("delay") {
        Some(spec) => match Distribution::parse(spec, parse_delay_spec) {
            Ok(dist) => Some(dist.sample(&mut rng)),
            Err(e) => {
                warn!("bad delay spec {spec:?}: {e}");
                None
            }
        },
        None => state.tunable.default_delay(),
    };
    if let Some(d) = delay {
        tokio::time::sleep(d).await;
    }

    let size: Option<usize> = params.get("size").and_then(|s| s.parse().ok());
    let body_out = match size {
        Some(n) => state.payload.slice(n),
        None => body.to_vec(),
    };

    let close = params.get("close").map(|v| v != "0" && v != "false").unwrap_or(false);

    let status_code = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    let mut response = (status_code, body_out).into_response();

    if let Some(header_values) = params.get("header") {
        // Axum's Query<HashMap<..>> only keeps the last repeated key; a
        // production CLI-backed setup would collect all occurrences, this
        // handler accepts one `Key: Value` pair per request for simplicity.
        if let Some((k, v)) = header_values.split_once(':') {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(k.trim()),
                HeaderValue::from_str(v.trim()),
            ) {
                response.headers_mut().insert(name, value);
            }
        }
    }

    if close {
        response
            .headers_mut()
            .insert(axum::http::header::CONNECTION, HeaderValue::from_static("close"));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_spec_accepts_numeric() {
        assert_eq!(parse_status_spec("503").unwrap(), 503);
    }

    #[test]
    fn parse_delay_spec_parses_milliseconds() {
        assert_eq!(parse_delay_spec("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_delay_spec("150").unwrap(), Duration::from_millis(150));
    }
}
