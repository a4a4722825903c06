use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;
use wellness_aggregation::{AggregationError, BudgetError};
use wellness_zk::ProofError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error")]
    Internal,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };

        (status, Json(ErrorBody { error: msg })).into_response()
    }
}

impl From<ProofError> for ApiError {
    fn from(e: ProofError) -> Self {
        match e {
            ProofError::Validation(v) => ApiError::BadRequest(v.to_string()),
            ProofError::UnknownCircuit(u) => ApiError::NotFound(u.to_string()),
            e @ (ProofError::CircuitUnavailable(_) | ProofError::WorkerPool(_)) => ApiError::Unavailable(e.to_string()),
            // Already logged (with alarm for self-verification) by the proof service.
            ProofError::Generation { .. } | ProofError::SelfVerificationFailure { .. } | ProofError::Zk(_) => {
                ApiError::Internal
            }
        }
    }
}

impl From<AggregationError> for ApiError {
    fn from(e: AggregationError) -> Self {
        match e {
            AggregationError::EmptyInput => ApiError::NotFound(e.to_string()),
            AggregationError::Budget(BudgetError::Exceeded { .. }) => ApiError::Conflict(e.to_string()),
            AggregationError::SchemaMismatch { .. }
            | AggregationError::DuplicateUser(_)
            | AggregationError::ValueOutOfRange { .. }
            | AggregationError::InvalidEpsilon(_)
            | AggregationError::Budget(BudgetError::InvalidSpend(_))
            | AggregationError::Encoding(_) => ApiError::BadRequest(e.to_string()),
            AggregationError::KeyMismatch { .. }
            | AggregationError::Decryption { .. }
            | AggregationError::Budget(BudgetError::InvalidCap(_)) => {
                tracing::error!(error = %e, "aggregation fault");
                ApiError::Internal
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!(error = %e, "database error");
        ApiError::Internal
    }
}
