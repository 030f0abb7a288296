//! The gateway's top-level error taxonomy (`spec.md` §7). One variant per
//! row of the error table; each maps to a fixed HTTP status and the
//! `{error, detail?, hint?}` body shape.

use axum::response::{IntoResponse, Response};
use cashflow_core::error::{CovenantError, GenesisError, KeyError, SettlementError, StoreError, UsageError, VerifyError};
use cashflow_gate::GateError;
use http::StatusCode;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    PaymentRequired(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("server error: {0}")]
    ServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::PaymentRequired(m) => (StatusCode::PAYMENT_REQUIRED, m.clone()),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ApiError::ServerError(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
        };
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

/// Renders a `(StatusCode, ApiError)` pair as `{error, hint}`.
pub fn with_hint(error: ApiError, hint: &str) -> Response {
    let (status, message) = match &error {
        ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
        ApiError::PaymentRequired(m) => (StatusCode::PAYMENT_REQUIRED, m.clone()),
        ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
        ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
        ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
        ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
        ApiError::ServerError(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
    };
    (status, axum::Json(json!({ "error": message, "hint": hint }))).into_response()
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ApiError::NotFound(format!("not found: {id}")),
            StoreError::Duplicate(id) => ApiError::Conflict(format!("duplicate: {id}")),
            other => ApiError::ServerError(other.to_string()),
        }
    }
}

impl From<UsageError> for ApiError {
    fn from(e: UsageError) -> Self {
        match e {
            UsageError::BalanceExhausted { .. } => ApiError::PaymentRequired(e.to_string()),
            UsageError::Store(e) => e.into(),
        }
    }
}

impl From<KeyError> for ApiError {
    fn from(e: KeyError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<VerifyError> for ApiError {
    fn from(e: VerifyError) -> Self {
        ApiError::PaymentRequired(e.to_string())
    }
}

impl From<CovenantError> for ApiError {
    fn from(e: CovenantError) -> Self {
        match e {
            CovenantError::IntervalNotElapsed { .. } => ApiError::Conflict(e.to_string()),
            other => ApiError::ServerError(other.to_string()),
        }
    }
}

impl From<GenesisError> for ApiError {
    fn from(e: GenesisError) -> Self {
        match e {
            GenesisError::NoFundingUtxo(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::ServerError(other.to_string()),
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::NotActive => ApiError::Conflict(e.to_string()),
            SettlementError::NothingPending => ApiError::BadRequest(e.to_string()),
            SettlementError::Covenant(e) => e.into(),
            SettlementError::Store(e) => e.into(),
            SettlementError::Usage(e) => e.into(),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::BadRequest(m) => ApiError::BadRequest(m),
            GateError::PaymentRequired(m) => ApiError::PaymentRequired(m),
            GateError::Forbidden(m) => ApiError::Forbidden(m),
            GateError::NotFound(m) => ApiError::NotFound(m),
            GateError::Conflict(m) => ApiError::Conflict(m),
            GateError::ServerError(m) => ApiError::ServerError(m),
        }
    }
}
