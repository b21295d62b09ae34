use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, LineupError>;

/// Errors surfaced by lineup and slate assembly.
///
/// `Clone` because a single failed fetch is shared by every caller coalesced
/// onto it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LineupError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Malformed aggregate data. Never fatal: the item is ranked with the default prior.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataIntegrityWarning {
    #[error("negative impression count {impressions} for {key}")]
    NegativeImpressions { key: String, impressions: i64 },

    #[error("negative open count {opens} for {key}")]
    NegativeOpens { key: String, opens: i64 },
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ResponseError for LineupError {
    fn error_response(&self) -> HttpResponse {
        let code = self.status_code();
        let message = match self {
            LineupError::NotFound(msg)
            | LineupError::Validation(msg)
            | LineupError::UpstreamUnavailable(msg)
            | LineupError::Internal(msg) => msg.clone(),
        };

        HttpResponse::build(code).json(ErrorResponse {
            error: message,
            code: code.as_u16(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            LineupError::NotFound(_) => StatusCode::NOT_FOUND,
            LineupError::Validation(_) => StatusCode::BAD_REQUEST,
            LineupError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LineupError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for LineupError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => LineupError::UpstreamUnavailable(msg),
            other => LineupError::Internal(other.to_string()),
        }
    }
}
