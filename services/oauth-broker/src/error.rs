//! HTTP-facing error taxonomy
//!
//! Every failure on the login and callback routes ends up here and is
//! rendered as `{"error": ...}` JSON. Nothing is retried; the browser gets
//! the failure directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use provider::ProviderKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The provider redirected back with `error=...`
    #[error("provider reported error: {error}")]
    ProviderError {
        error: String,
        description: Option<String>,
    },

    /// State matches neither a live pending authorization nor a fixed tag
    #[error("unrecognized state")]
    UnrecognizedState,

    /// State named a pending authorization whose TTL had elapsed
    #[error("authorization flow expired")]
    ExpiredState,

    #[error("missing authorization code")]
    MissingCode,

    /// Query string could not be decoded into callback parameters
    #[error("malformed callback query")]
    MalformedQuery,

    #[error("unknown provider")]
    UnknownProvider,

    #[error("token exchange with {provider} failed: {source}")]
    ExchangeFailed {
        provider: ProviderKind,
        #[source]
        source: oauth_flow::Error,
    },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ProviderError { .. }
            | ApiError::UnrecognizedState
            | ApiError::ExpiredState
            | ApiError::MissingCode
            | ApiError::MalformedQuery => StatusCode::BAD_REQUEST,
            ApiError::UnknownProvider => StatusCode::NOT_FOUND,
            ApiError::ExchangeFailed { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Metrics/log label for the callback outcome this error represents.
    pub fn outcome(&self) -> &'static str {
        match self {
            ApiError::ProviderError { .. } => "provider_error",
            ApiError::UnrecognizedState => "unrecognized_state",
            ApiError::ExpiredState => "expired_state",
            ApiError::MissingCode => "missing_code",
            ApiError::MalformedQuery => "malformed_query",
            ApiError::UnknownProvider => "unknown_provider",
            ApiError::ExchangeFailed { .. } => "exchange_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            ApiError::ProviderError { error, description } => {
                let mut body = serde_json::json!({ "error": error });
                if let Some(description) = description {
                    body["error_description"] = serde_json::Value::String(description.clone());
                }
                body
            }
            // Upstream body (or transport message) relayed as-is
            ApiError::ExchangeFailed { source, .. } => {
                serde_json::json!({ "error": source.detail() })
            }
            other => serde_json::json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            self.body().to_string(),
        )
            .into_response()
    }
}
