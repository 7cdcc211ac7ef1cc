use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

/// Out-of-domain numeric input to the odds arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum OddsError {
    #[error("invalid decimal odds {0}: must be finite and > 1.0")]
    InvalidOdds(f64),

    #[error("invalid probability {0}: must be within [0, 1]")]
    InvalidProbability(f64),

    #[error("invalid bankroll {0}: must be finite and >= 0")]
    InvalidBankroll(f64),

    #[error("invalid kelly multiplier {0}: must be finite and >= 0")]
    InvalidMultiplier(f64),
}

/// A row store record that cannot become a `Pick` without inventing numbers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PickError {
    #[error("malformed pick {id}: field `{field}` is {reason}")]
    Malformed {
        id: String,
        field: &'static str,
        reason: String,
    },
}

impl PickError {
    pub fn malformed(id: &str, field: &'static str, reason: impl Into<String>) -> Self {
        PickError::Malformed {
            id: id.to_string(),
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Odds error: {0}")]
    Odds(#[from] OddsError),

    #[error("Pick error: {0}")]
    Pick(#[from] PickError),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Pick {0} is locked for this viewer")]
    PaymentRequired(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Row store error: {0}")]
    RowStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Odds(_) | AppError::Validation(_) | AppError::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Pick(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Http(_) | AppError::RowStore(_) | AppError::WebSocket(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Config(_) | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Odds(_) => "invalid_odds_input",
            AppError::Validation(_) | AppError::Json(_) => "validation_error",
            AppError::Unauthenticated => "authentication_required",
            AppError::PaymentRequired(_) => "payment_required",
            AppError::Pick(_) => "malformed_pick",
            AppError::Http(_) | AppError::RowStore(_) | AppError::WebSocket(_) => "upstream_error",
            AppError::Config(_) | AppError::Io(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
