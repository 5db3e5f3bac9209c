use hookline_core::{DeliveryId, EventId, EventStatus};
use hookline_gateway::MetricsSnapshot;
use serde::{Deserialize, Serialize};

/// Response body for `POST /receive/...`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiveResponse {
    pub event_id: EventId,
    pub event_type: String,
    pub status: EventStatus,
    /// `true` when the delivery id was already recorded.
    pub duplicate: bool,
}

/// Request body for `POST /v1/events`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishRequest {
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub delivery_ids: Vec<DeliveryId>,
}

/// Optional body for `POST /v1/deliveries/{id}/cancel`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// Request body for `POST /admin/circuit-breakers/open`.
#[derive(Debug, Serialize, Deserialize)]
pub struct OpenCircuitRequest {
    /// Destination URL or origin.
    pub destination: String,
    pub duration_seconds: u64,
}

/// Request body for `POST /admin/circuit-breakers/close`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CloseCircuitRequest {
    pub destination: String,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub queued_retries: usize,
    pub metrics: MetricsSnapshot,
}
