//! Crate-wide error type and HTTP response conversion
//!
//! Every fallible operation across the security pipeline, the flow engine,
//! and the observability fan-out returns [`Error`]. The security pipeline
//! and the HTTP adapter (C12) are the only places that convert an `Error`
//! into an HTTP response; everywhere else the typed error propagates with
//! `?`.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error, one variant family per §7 error kind.
#[derive(Debug, ThisError)]
pub enum Error {
    // ---- Validation ----
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid wildcard pattern: {0}")]
    InvalidPattern(String),

    // ---- Not-found ----
    #[error("flow not found: {0}")]
    FlowNotFound(String),
    #[error("graph not found: {0}")]
    GraphNotFound(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("start node not set for graph {0}")]
    StartNodeNotSet(String),

    // ---- Auth ----
    #[error("unauthorized")]
    Unauthorized,
    #[error("missing Authorization header")]
    MissingAuthHeader,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("no credential handler matched the request")]
    NoHandlerFound,
    #[error("forbidden")]
    Forbidden,
    #[error("insufficient scopes")]
    InsufficientScopes,

    // ---- Conflict ----
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
    #[error("duplicate graph id: {0}")]
    DuplicateGraph(String),

    // ---- State ----
    #[error("operation on closed subscriber")]
    SubscriberClosed,
    #[error("flow {0} is already terminal")]
    FlowTerminal(String),
    #[error("flow {0} has a call already in flight")]
    FlowBusy(String),

    // ---- External ----
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("executor failure: {0}")]
    Executor(String),
    #[error("tracing provider failure: {0}")]
    TracingProvider(String),
    #[error("configuration error: {0}")]
    Config(String),

    // ---- Cancelled ----
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// HTTP status this error maps to, independent of header/body shaping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthorized
            | Error::MissingAuthHeader
            | Error::InvalidToken(_)
            | Error::NoHandlerFound => StatusCode::UNAUTHORIZED,
            Error::Forbidden | Error::InsufficientScopes => StatusCode::FORBIDDEN,
            Error::FlowNotFound(_)
            | Error::GraphNotFound(_)
            | Error::UserNotFound(_)
            | Error::StartNodeNotSet(_) => StatusCode::NOT_FOUND,
            Error::DuplicateNode(_) | Error::DuplicateGraph(_) | Error::FlowBusy(_) => {
                StatusCode::CONFLICT
            }
            Error::Validation(_) | Error::InvalidPattern(_) => StatusCode::BAD_REQUEST,
            Error::SubscriberClosed | Error::FlowTerminal(_) => StatusCode::BAD_REQUEST,
            Error::Storage(_) | Error::Executor(_) | Error::TracingProvider(_) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable error code for the JSON body.
    fn code(&self) -> &'static str {
        match self {
            Error::Unauthorized
            | Error::MissingAuthHeader
            | Error::InvalidToken(_)
            | Error::NoHandlerFound => "unauthorized",
            Error::Forbidden | Error::InsufficientScopes => "forbidden",
            Error::FlowNotFound(_) => "flow_not_found",
            Error::GraphNotFound(_) => "graph_not_found",
            Error::UserNotFound(_) => "user_not_found",
            Error::StartNodeNotSet(_) => "start_node_not_set",
            Error::DuplicateNode(_) => "duplicate_node",
            Error::DuplicateGraph(_) => "duplicate_graph",
            Error::SubscriberClosed => "subscriber_closed",
            Error::FlowTerminal(_) => "flow_terminal",
            Error::FlowBusy(_) => "flow_busy",
            Error::Validation(_) => "invalid_request",
            Error::InvalidPattern(_) => "invalid_pattern",
            Error::Storage(_) => "storage_error",
            Error::Executor(_) => "executor_error",
            Error::TracingProvider(_) => "tracing_provider_error",
            Error::Config(_) => "config_error",
            Error::Cancelled => "cancelled",
        }
    }

    /// `true` for the subset of kinds §4.4 maps with a `WWW-Authenticate` header.
    fn wants_bearer_challenge(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized | Error::MissingAuthHeader | Error::InvalidToken(_) | Error::NoHandlerFound
        )
    }
}

/// JSON body shape for every error response: `{error, error_description}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_description: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let description = self.to_string();
        let body = ErrorBody {
            error: self.code().to_string(),
            error_description: description,
        };

        let mut response = (status, Json(body)).into_response();
        if self.wants_bearer_challenge() {
            response
                .headers_mut()
                .insert("WWW-Authenticate", HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_401_with_bearer_challenge() {
        let err = Error::Unauthorized;
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(err.wants_bearer_challenge());
    }

    #[test]
    fn forbidden_maps_to_403_without_challenge() {
        let err = Error::InsufficientScopes;
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(!err.wants_bearer_challenge());
    }

    #[test]
    fn no_handler_found_is_treated_as_unauthorized() {
        let err = Error::NoHandlerFound;
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code(), "unauthorized");
    }
}
