use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hookline_gateway::{DispatchError, GatewayError, ReceiveError};
use thiserror::Error;

/// Errors that can occur when running the Hookline server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine could not be assembled.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// An inbound webhook was refused.
    #[error(transparent)]
    Receive(#[from] ReceiveError),

    /// A delivery operation failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Config(_) | Self::Io(_) | Self::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Receive(e) => match e {
                ReceiveError::UnknownSource(_) => StatusCode::NOT_FOUND,
                ReceiveError::SignatureInvalid { .. } => StatusCode::UNAUTHORIZED,
                ReceiveError::MalformedPayload(_) | ReceiveError::RawBodyUnavailable => {
                    StatusCode::BAD_REQUEST
                }
                ReceiveError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Dispatch(e) => match e {
                DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
                DispatchError::Terminal { .. } | DispatchError::InFlight(_) => {
                    StatusCode::CONFLICT
                }
                DispatchError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
                DispatchError::Signing(_)
                | DispatchError::Encoding(_)
                | DispatchError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
