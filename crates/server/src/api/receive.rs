use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use hookline_core::RequestHeaders;
use hookline_gateway::InboundRequest;

use crate::error::ServerError;

use super::AppState;
use super::schemas::ReceiveResponse;

/// `POST /receive/{source}` -- ingest a webhook from a configured source.
///
/// The body is kept as raw bytes so the signature is checked against
/// exactly what the producer sent.
pub async fn receive(
    State(state): State<AppState>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReceiveResponse>, ServerError> {
    ingest(&state, &source, &headers, body).await
}

/// `POST /receive/provider/{name}` -- same pipeline, addressed by provider
/// name.
pub async fn receive_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReceiveResponse>, ServerError> {
    ingest(&state, &name, &headers, body).await
}

async fn ingest(
    state: &AppState,
    source: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Json<ReceiveResponse>, ServerError> {
    let request = InboundRequest::new(to_request_headers(headers), body);
    let received = state.receiver.handle(source, &request).await?;
    Ok(Json(ReceiveResponse {
        event_id: received.event.id,
        event_type: received.event.event_type,
        status: received.event.status,
        duplicate: received.duplicate,
    }))
}

/// Headers whose values are not visible ASCII are dropped.
fn to_request_headers(headers: &HeaderMap) -> RequestHeaders {
    let mut out = RequestHeaders::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.insert(name.as_str(), value);
        }
    }
    out
}
