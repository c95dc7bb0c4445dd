//! API error types

use std::path::PathBuf;

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use broadside_common::tracing;
use broadside_dispatch::CampaignError;
use serde_json::json;
use thiserror::Error;

/// Errors that stop the API server itself
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failed to bind to the specified address
    #[error("Failed to bind API server to {address}: {source}")]
    BindError {
        address: String,
        source: std::io::Error,
    },

    /// API server encountered a runtime error
    #[error("API server error: {0}")]
    ServerError(String),
}

/// Failures loading recipients
#[derive(Debug, Error)]
pub enum AudienceError {
    #[error("Failed to read audience from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse audience from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },

    #[error("Audience source unavailable: {0}")]
    Unavailable(String),
}

/// A request that could not be served, rendered as
/// `{ "success": false, "error": ... }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub status: StatusCode,
    pub message: String,
}

impl HandlerError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Endpoint not found".to_string(),
        }
    }

    pub fn method_not_allowed() -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            message: "Method not allowed".to_string(),
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

impl From<CampaignError> for HandlerError {
    fn from(error: CampaignError) -> Self {
        if error.is_validation() {
            Self::bad_request(error.to_string())
        } else {
            tracing::error!(%error, "Campaign send failed");
            Self::internal(error.to_string())
        }
    }
}

impl From<AudienceError> for HandlerError {
    fn from(error: AudienceError) -> Self {
        tracing::error!(%error, "Audience lookup failed");
        Self::internal(error.to_string())
    }
}

impl From<JsonRejection> for HandlerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for HandlerError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}
