//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use typhoon_reconciler::RegistrationError;
use typhoon_store::StoreError;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("server error: {0}")]
    Server(String),
}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        match self {
            RpcError::NotFound(_) => StatusCode::NOT_FOUND,
            RpcError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::Conflict(_) => StatusCode::CONFLICT,
            RpcError::Store(_) | RpcError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for RpcError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => RpcError::NotFound(key),
            StoreError::Duplicate(key) => RpcError::Conflict(key),
            other => RpcError::Store(other.to_string()),
        }
    }
}

impl From<RegistrationError> for RpcError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::InvalidWallet(_) | RegistrationError::InvalidUsername(_) => {
                RpcError::InvalidRequest(e.to_string())
            }
            RegistrationError::Taken(what) => RpcError::Conflict(format!("{what} already registered")),
            RegistrationError::ReferralIdExhausted => RpcError::Server(e.to_string()),
            RegistrationError::Store(inner) => inner.into(),
        }
    }
}
