//! Security pipeline (C5): public-path bypass, preflight bypass, handler
//! selection, authenticate -> authorize -> principal binding.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::observability::event::{Event, EventStatus};
use crate::observability::registry::Registry;
use crate::security::context::Principal;
use crate::security::handler::CredentialHandler;
use crate::security::path_matcher::PathMatcher;
use crate::security::RequestInfo;

/// Outcome of admitting a request: either it bypassed authentication
/// (public path or CORS preflight) or it carries the principal a handler
/// bound to it.
#[derive(Debug, Clone, Default)]
pub struct SecurityContext {
    pub principal: Option<Principal>,
}

/// Wires the compiled public-path matcher to an ordered list of credential
/// handlers and runs the §4.4 algorithm for every inbound request. Every
/// admission decision is also reported to the observability fan-out under
/// `observability.security`, so the event bus carries real traffic even
/// when the flow engine is idle.
pub struct SecurityPipeline {
    public_paths: PathMatcher,
    handlers: Vec<Box<dyn CredentialHandler>>,
    observability: Option<Arc<Registry>>,
}

impl SecurityPipeline {
    pub fn new(public_paths: PathMatcher, handlers: Vec<Box<dyn CredentialHandler>>) -> Self {
        Self { public_paths, handlers, observability: None }
    }

    /// Attach an observability fan-out to report admission decisions to.
    pub fn with_observability(mut self, observability: Arc<Registry>) -> Self {
        self.observability = Some(observability);
        self
    }

    /// Admit or reject `request`, per §4.4's seven-step algorithm.
    pub async fn admit(&self, request: &RequestInfo) -> Result<SecurityContext> {
        if self.public_paths.is_match(&request.path) {
            self.emit_admitted(request, None).await;
            return Ok(SecurityContext::default());
        }
        if request.is_preflight() {
            self.emit_admitted(request, None).await;
            return Ok(SecurityContext::default());
        }

        let result = self.authenticate_and_authorize(request).await;
        match result {
            Ok(context) => {
                self.emit_admitted(request, context.principal.as_ref()).await;
                Ok(context)
            }
            Err(err) => {
                self.emit_denied(request, &err).await;
                Err(err)
            }
        }
    }

    async fn authenticate_and_authorize(&self, request: &RequestInfo) -> Result<SecurityContext> {
        let handler = self
            .handlers
            .iter()
            .find(|h| h.can_handle(request))
            .ok_or(Error::NoHandlerFound)?;

        let principal = handler.authenticate(request).await?;
        handler.authorize(request, principal.as_ref()).await?;

        Ok(SecurityContext { principal })
    }

    async fn emit_admitted(&self, request: &RequestInfo, principal: Option<&Principal>) {
        let data = json!({
            "path": request.path,
            "method": request.method,
            "user_id": principal.map(Principal::user_id),
        });
        self.emit("security.request.admitted", EventStatus::Success, request, data).await;
    }

    async fn emit_denied(&self, request: &RequestInfo, err: &Error) {
        let data = json!({
            "path": request.path,
            "method": request.method,
            "error": err.to_string(),
        });
        self.emit("security.request.denied", EventStatus::Failure, request, data).await;
    }

    async fn emit(&self, event_type: &str, status: EventStatus, request: &RequestInfo, data: Value) {
        let Some(observability) = &self.observability else { return };
        let trace_id = Uuid::new_v4().to_string();
        let event = Event::new(trace_id, event_type, "security-pipeline", status, "observability.security", data, Utc::now());
        observability.publish(&event).await;
    }
}
