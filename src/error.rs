use actix_web::http::{header::ContentType, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;

/// Every failure a handler can report. Rendering happens only in
/// [`ResponseError::error_response`], so no path leaves a request unanswered.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed, expired or forged session token.
    #[error("unauthorized access")]
    Unauthorized,

    /// Uniqueness violation the caller can act on.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Store(_) | AppError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            AppError::Unauthorized => {
                log::warn!("Rejected unauthenticated request");
                HttpResponse::build(status).json(json!({ "message": "unauthorized access" }))
            }
            AppError::Conflict(msg) => HttpResponse::build(status)
                .content_type(ContentType::plaintext())
                .body(msg.clone()),
            AppError::BadRequest(msg) => {
                log::debug!("Bad request: {}", msg);
                HttpResponse::build(status).json(json!({ "message": msg }))
            }
            AppError::Store(e) => {
                log::error!("Database error: {}", e);
                HttpResponse::build(status).json(json!({ "message": "internal server error" }))
            }
            AppError::Token(e) => {
                log::error!("Failed to encode token: {}", e);
                HttpResponse::build(status).json(json!({ "message": "internal server error" }))
            }
        }
    }
}
