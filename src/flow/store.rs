//! Flow context store (C10)
//!
//! Mirrors the repository pattern's return-position-impl-trait shape rather
//! than `async_trait`: a single backend is swapped in at the call site
//! (the engine is generic over `FlowContextStore`), so there is no need to
//! pay for a trait object here.
//!
//! Two keyspaces, matching §6's `flow_context` and `flow_current_node_response`
//! tables: [`FlowContext`] carries the durable position and claims of an
//! in-flight flow, while the node response lives separately so a slow write
//! to one never blocks a read of the other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};
use crate::flow::engine::NodeResponse;

/// Per-`flow_id` persistent state (§3 flow-context model).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowContext {
    pub flow_type: Option<String>,
    pub application_id: Option<String>,
    pub graph_id: Option<String>,
    pub current_node_id: Option<String>,
    pub current_action_id: Option<String>,
    pub authenticated: bool,
    pub authenticated_user_id: Option<String>,
    #[serde(default)]
    pub user_input_data: HashMap<String, Value>,
    #[serde(default)]
    pub runtime_data: HashMap<String, Value>,
    #[serde(default)]
    pub authenticated_user_attributes: HashMap<String, Value>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FlowContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Key/value store for in-flight flow state, keyed by flow id.
///
/// Implementations may tolerate a node-response record lagging the context
/// by at most one turn (§4.7): a `Get` immediately after a `Put` issued by a
/// concurrent `Resume` for the same flow is allowed to observe either value,
/// but never a value older than two turns back.
pub trait FlowContextStore: Send + Sync {
    fn put(&self, flow_id: &str, context: FlowContext) -> impl Future<Output = Result<()>> + Send;

    /// Returns `(context, found)`; `found` is false (with a default context)
    /// when no entry exists yet, which is not itself an error.
    fn get(&self, flow_id: &str) -> impl Future<Output = Result<(FlowContext, bool)>> + Send;

    /// Persists what the current node most recently emitted, so `get_node_response`
    /// can reconstruct it for a caller that re-fetches a prompting flow.
    fn put_node_response(&self, flow_id: &str, response: &NodeResponse) -> impl Future<Output = Result<()>> + Send;

    fn get_node_response(&self, flow_id: &str) -> impl Future<Output = Result<Option<NodeResponse>>> + Send;

    /// Removes both keyspaces' entries for `flow_id`. Called on terminal
    /// states (§4.8) and explicit abandonment.
    fn delete(&self, flow_id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Process-local store backed by sharded concurrent maps. Good enough for a
/// single instance; a durable backend would implement the same trait.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFlowContextStore {
    entries: Arc<DashMap<String, String>>,
    node_responses: Arc<DashMap<String, String>>,
}

impl InMemoryFlowContextStore {
    pub fn new() -> Self {
        Self { entries: Arc::new(DashMap::new()), node_responses: Arc::new(DashMap::new()) }
    }
}

impl FlowContextStore for InMemoryFlowContextStore {
    async fn put(&self, flow_id: &str, context: FlowContext) -> Result<()> {
        let encoded = serde_json::to_string(&context).map_err(|e| Error::Storage(e.to_string()))?;
        self.entries.insert(flow_id.to_string(), encoded);
        Ok(())
    }

    async fn get(&self, flow_id: &str) -> Result<(FlowContext, bool)> {
        let Some(raw) = self.entries.get(flow_id) else {
            return Ok((FlowContext::new(), false));
        };
        match serde_json::from_str::<FlowContext>(&raw) {
            Ok(context) => Ok((context, true)),
            Err(e) => {
                // A malformed record should not wedge the flow; surface an
                // empty context and let the caller decide how to proceed.
                info!(flow_id, error = %e, "discarding malformed flow context record");
                Ok((FlowContext::new(), true))
            }
        }
    }

    async fn put_node_response(&self, flow_id: &str, response: &NodeResponse) -> Result<()> {
        let encoded = serde_json::to_string(response).map_err(|e| Error::Storage(e.to_string()))?;
        self.node_responses.insert(flow_id.to_string(), encoded);
        Ok(())
    }

    async fn get_node_response(&self, flow_id: &str) -> Result<Option<NodeResponse>> {
        let Some(raw) = self.node_responses.get(flow_id) else {
            return Ok(None);
        };
        match serde_json::from_str::<NodeResponse>(&raw) {
            Ok(response) => Ok(Some(response)),
            Err(e) => {
                info!(flow_id, error = %e, "discarding malformed node-response record");
                Ok(None)
            }
        }
    }

    async fn delete(&self, flow_id: &str) -> Result<()> {
        self.entries.remove(flow_id);
        self.node_responses.remove(flow_id);
        Ok(())
    }
}
