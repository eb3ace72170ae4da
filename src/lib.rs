//! # thunder
//!
//! The identity platform server core: a request-admission security pipeline,
//! an authentication-flow execution engine, and the observability fan-out
//! that both report through.
//!
//! ## Example
//!
//! ```rust,no_run
//! use thunder_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ThunderConfig::load()?;
//!
//!     let state = AppState::builder().config(config.clone()).build().await?;
//!     let app = thunder_core::http::router(state);
//!
//!     Server::new(config).serve(app).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod flow;
pub mod http;
pub mod observability;
pub mod security;
pub mod server;
pub mod state;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::ThunderConfig;
    pub use crate::error::{Error, Result};
    pub use crate::flow::{
        FlowEngine, Graph, GraphType, InputField, Node, NodeKind, NodeResponse, NodeResponseStatus, NodeResponseType,
    };
    pub use crate::security::{BearerJwtHandler, CredentialHandler, Principal, SecurityPipeline};
    pub use crate::server::Server;
    pub use crate::state::{AppState, AppStateBuilder};

    pub use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{delete, get, patch, post, put},
        Extension, Router,
    };

    pub use serde::{Deserialize, Serialize};
    pub use tracing::{debug, error, info, instrument, trace, warn, Level, Span};
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Duration as ChronoDuration, Utc};
    pub use uuid::Uuid;
}
