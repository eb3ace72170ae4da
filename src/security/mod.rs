//! Request-admission security pipeline: path matching, handler dispatch,
//! principal binding, and authorization (C4-C7)

pub mod context;
pub mod handler;
pub mod path_matcher;
pub mod pipeline;

pub use context::Principal;
pub use handler::{BearerJwtHandler, CredentialHandler};
pub use path_matcher::PathMatcher;
pub use pipeline::SecurityPipeline;

/// The subset of an inbound HTTP request the security pipeline needs:
/// method, path, and a lookup into its headers. Kept independent of any
/// particular HTTP framework type so C5-C7 stay framework-agnostic; the
/// HTTP adapter (C12) builds one of these per request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub authorization_header: Option<String>,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, path: impl Into<String>, authorization_header: Option<String>) -> Self {
        Self { method: method.into(), path: path.into(), authorization_header }
    }

    pub fn is_preflight(&self) -> bool {
        self.method.eq_ignore_ascii_case("OPTIONS")
    }
}
