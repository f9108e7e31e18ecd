//! HTTPS redirector: answers every request with a 301 to the same path on
//! the configured HTTPS port.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;

#[derive(Clone)]
pub struct RedirectState {
    pub https_port: u16,
}

pub fn router(state: Arc<RedirectState>) -> Router {
    Router::new().route("/*path", any(handle)).route("/", any(handle)).with_state(state)
}

async fn handle(State(state): State<Arc<RedirectState>>, headers: HeaderMap, uri: Uri) -> Response {
    // Path-only request-targets (the normal case for HTTP/1.1) carry no
    // authority on `Uri`; the `Host` header is the real source of truth.
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.split(':').next())
        .or_else(|| uri.host())
        .unwrap_or("localhost");
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let location = format!("https://{host}:{}{path_and_query}", state.https_port);

    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, location)],
    )
        .into_response()
}
