//! Flow execution engine (C11): Start/Resume/Abandon over a graph catalog,
//! guarded by a per-flow mutex shard so two concurrent calls against the
//! same flow id never interleave.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::flow::executor;
use crate::flow::graph::{Graph, InputField, Node, NodeKind};
use crate::flow::store::{FlowContext, FlowContextStore};
use crate::observability::event::{Event, EventStatus};
use crate::observability::registry::Registry;

/// `status` of a node response (§3 flow-context model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeResponseStatus {
    Incomplete,
    Complete,
    Fail,
}

/// `type` of a node response, meaningful only when `status = incomplete`:
/// a user-facing view, a redirect, or a prompt an executor issues
/// internally rather than to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeResponseType {
    View,
    Redirect,
    InternalPrompt,
}

/// The shape handed back to a caller after `Start` or `Resume`: what the
/// current node needs, or the outcome if the flow just finished. Also the
/// record persisted to the `flow_current_node_response` keyspace (§6) so a
/// prompting flow's last response survives a process restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResponse {
    pub status: NodeResponseStatus,
    #[serde(rename = "type")]
    pub response_type: Option<NodeResponseType>,
    pub failure_reason: Option<String>,
    pub required_data: Vec<InputField>,
    pub additional_data: Value,
    pub redirect_url: Option<String>,
    pub actions: Vec<String>,
    pub next_node_id: Option<String>,
    pub runtime_data: Value,
    pub assertion: Option<String>,
}

impl NodeResponse {
    pub(crate) fn prompting(missing: Vec<InputField>) -> Self {
        Self {
            status: NodeResponseStatus::Incomplete,
            response_type: Some(NodeResponseType::View),
            failure_reason: None,
            required_data: missing,
            additional_data: Value::Null,
            redirect_url: None,
            actions: Vec::new(),
            next_node_id: None,
            runtime_data: Value::Null,
            assertion: None,
        }
    }

    pub(crate) fn failure(reason: String) -> Self {
        Self {
            status: NodeResponseStatus::Fail,
            response_type: None,
            failure_reason: Some(reason),
            required_data: Vec::new(),
            additional_data: Value::Null,
            redirect_url: None,
            actions: Vec::new(),
            next_node_id: None,
            runtime_data: Value::Null,
            assertion: None,
        }
    }

    pub(crate) fn success(assertion: String) -> Self {
        Self {
            status: NodeResponseStatus::Complete,
            response_type: None,
            failure_reason: None,
            required_data: Vec::new(),
            additional_data: Value::Null,
            redirect_url: None,
            actions: Vec::new(),
            next_node_id: None,
            runtime_data: Value::Null,
            assertion: Some(assertion),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    Initial,
    Prompting,
    Running,
    Terminal,
}

#[derive(Debug, Clone)]
struct FlowRecord {
    graph_id: String,
    current_node_id: String,
    state: FlowState,
}

/// Executes flow graphs. Generic over the context-store backend so the
/// in-memory default can be swapped for a durable one without touching the
/// state machine.
pub struct FlowEngine<S: FlowContextStore> {
    graphs: DashMap<String, Graph>,
    store: S,
    flows: DashMap<String, FlowRecord>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
    observability: Arc<Registry>,
}

impl<S: FlowContextStore> FlowEngine<S> {
    pub fn new(store: S, observability: Arc<Registry>) -> Self {
        Self { graphs: DashMap::new(), store, flows: DashMap::new(), locks: DashMap::new(), observability }
    }

    pub fn register_graph(&self, graph: Graph) {
        self.graphs.insert(graph.id.clone(), graph);
    }

    /// Number of graphs currently registered, for readiness reporting.
    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    fn lock_for(&self, flow_id: &str) -> Arc<AsyncMutex<()>> {
        self.locks.entry(flow_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    pub async fn start(&self, graph_id: &str, initial_data: Value) -> Result<(String, NodeResponse)> {
        let graph = self.graphs.get(graph_id).ok_or_else(|| Error::GraphNotFound(graph_id.to_string()))?;
        let start_node_id = graph.start_node_id.clone().ok_or_else(|| Error::StartNodeNotSet(graph_id.to_string()))?;
        let flow_type = graph.graph_type.as_str().to_string();
        drop(graph);

        let flow_id = Uuid::new_v4().to_string();
        self.flows.insert(
            flow_id.clone(),
            FlowRecord { graph_id: graph_id.to_string(), current_node_id: start_node_id.clone(), state: FlowState::Initial },
        );
        let context = FlowContext {
            flow_type: Some(flow_type),
            graph_id: Some(graph_id.to_string()),
            current_node_id: Some(start_node_id),
            updated_at: Some(Utc::now()),
            ..FlowContext::default()
        };
        self.store.put(&flow_id, context).await?;

        self.emit(&flow_id, "flow.started", EventStatus::InProgress, &Value::Null).await;

        let lock = self.lock_for(&flow_id);
        let _guard = lock.lock().await;
        let response = self.advance(&flow_id, initial_data).await?;
        Ok((flow_id, response))
    }

    pub async fn resume(&self, flow_id: &str, input: Value) -> Result<NodeResponse> {
        {
            let record = self.flows.get(flow_id).ok_or_else(|| Error::FlowNotFound(flow_id.to_string()))?;
            if record.state == FlowState::Terminal {
                return Err(Error::FlowTerminal(flow_id.to_string()));
            }
        }

        let lock = self.lock_for(flow_id);
        let _guard = lock.try_lock().map_err(|_| Error::FlowBusy(flow_id.to_string()))?;
        self.advance(flow_id, input).await
    }

    pub async fn abandon(&self, flow_id: &str) -> Result<()> {
        let lock = self.lock_for(flow_id);
        let _guard = lock.lock().await;

        self.flows.remove(flow_id).ok_or_else(|| Error::FlowNotFound(flow_id.to_string()))?;
        self.store.delete(flow_id).await?;
        self.emit(flow_id, "flow.abandoned", EventStatus::Success, &Value::Null).await;
        Ok(())
    }

    /// Walks the graph from the flow's current node, merging `input` into
    /// the flow context, until a node needs more data from the caller or the
    /// flow reaches a terminal node. Deterministic: a node with more than
    /// one successor must resolve to exactly one via its executor.
    async fn advance(&self, flow_id: &str, input: Value) -> Result<NodeResponse> {
        let (mut context, _) = self.store.get(flow_id).await?;
        merge_object(&mut context.user_input_data, &input);

        loop {
            let (graph_id, current_node_id) = {
                let record = self.flows.get(flow_id).ok_or_else(|| Error::FlowNotFound(flow_id.to_string()))?;
                (record.graph_id.clone(), record.current_node_id.clone())
            };
            let graph = self.graphs.get(&graph_id).ok_or_else(|| Error::GraphNotFound(graph_id.clone()))?;
            let node = graph.nodes.get(&current_node_id).cloned().ok_or_else(|| {
                Error::Validation(format!("current node {current_node_id} is missing from graph {graph_id}"))
            })?;
            drop(graph);

            // Every turn mirrors the engine's in-memory position into the
            // persisted context (§4.7) so a store-backed Get can reconstruct
            // the flow without consulting the engine's own index.
            context.graph_id = Some(graph_id.clone());
            context.current_node_id = Some(current_node_id.clone());
            context.updated_at = Some(Utc::now());

            match node.kind {
                NodeKind::PromptOnly => {
                    let missing: Vec<InputField> = node
                        .input_data
                        .iter()
                        .filter(|field| field.required && !context.user_input_data.contains_key(&field.name))
                        .cloned()
                        .collect();

                    if !missing.is_empty() {
                        self.store.put(flow_id, context).await?;
                        let response = NodeResponse::prompting(missing);
                        self.store.put_node_response(flow_id, &response).await?;
                        self.set_state(flow_id, &current_node_id, FlowState::Prompting);
                        self.emit(flow_id, "flow.prompting", EventStatus::Pending, &Value::Null).await;
                        return Ok(response);
                    }

                    let next = self.single_successor(&node)?;
                    self.store.put(flow_id, context.clone()).await?;
                    self.set_state(flow_id, &next, FlowState::Running);
                }
                NodeKind::Decision => {
                    let next = match &node.executor_config {
                        Some(config) => {
                            let outcome = self.run_executor(config, &mut context).await?;
                            outcome.next_node_override.unwrap_or(self.single_successor(&node)?)
                        }
                        None => self.single_successor(&node)?,
                    };
                    self.set_state(flow_id, &next, FlowState::Running);
                }
                NodeKind::TaskExecution => {
                    let outcome = match &node.executor_config {
                        Some(config) => self.run_executor(config, &mut context).await?,
                        None => executor::ExecutorOutcome::success(),
                    };

                    if !outcome.success {
                        let reason = outcome.failure_reason.unwrap_or_else(|| "unknown error".to_string());
                        let response = NodeResponse::failure(reason.clone());
                        self.store.put_node_response(flow_id, &response).await?;
                        self.set_state(flow_id, &current_node_id, FlowState::Terminal);
                        self.store.delete(flow_id).await?;
                        self.emit(flow_id, "flow.failed", EventStatus::Failure, &serde_json::json!({"failure_reason": reason})).await;
                        return Ok(response);
                    }

                    self.store.put(flow_id, context.clone()).await?;
                    let next = outcome.next_node_override.unwrap_or(self.single_successor(&node)?);
                    self.set_state(flow_id, &next, FlowState::Running);
                }
                NodeKind::AuthSuccess => {
                    context.authenticated = true;
                    context.authenticated_user_id =
                        context.user_input_data.get("username").and_then(Value::as_str).map(str::to_string);
                    self.set_state(flow_id, &current_node_id, FlowState::Terminal);
                    let assertion = format!("flow:{flow_id}:node:{current_node_id}");
                    let response = NodeResponse::success(assertion);
                    self.store.put_node_response(flow_id, &response).await?;
                    // Terminal states delete the context (§4.8); the engine's
                    // own flow record stays so a later Resume sees FlowTerminal.
                    self.store.delete(flow_id).await?;
                    self.emit(flow_id, "flow.completed", EventStatus::Success, &Value::Null).await;
                    return Ok(response);
                }
            }
        }
    }

    fn single_successor(&self, node: &Node) -> Result<String> {
        node.next
            .first()
            .cloned()
            .ok_or_else(|| Error::Validation(format!("node {} has no successor to advance to", node.id)))
    }

    async fn run_executor(&self, config: &crate::flow::graph::ExecutorConfig, context: &mut FlowContext) -> Result<executor::ExecutorOutcome> {
        let executor = executor::resolve(&config.name).ok_or_else(|| Error::Executor(format!("no executor registered for {}", config.name)))?;
        executor.execute(context, &config.properties).await
    }

    fn set_state(&self, flow_id: &str, node_id: &str, state: FlowState) {
        if let Some(mut record) = self.flows.get_mut(flow_id) {
            record.current_node_id = node_id.to_string();
            record.state = state;
        }
    }

    async fn emit(&self, flow_id: &str, event_type: &str, status: EventStatus, data: &Value) {
        let mut payload = data.clone();
        if payload.is_null() {
            payload = serde_json::json!({});
        }
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("flow_id".to_string(), Value::String(flow_id.to_string()));
        }
        let event = Event::new(flow_id, event_type, "flow-engine", status, "observability.flows", payload, Utc::now());
        self.observability.publish(&event).await;
    }
}

fn merge_object(target: &mut HashMap<String, Value>, input: &Value) {
    if let Some(obj) = input.as_object() {
        for (key, value) in obj {
            target.insert(key.clone(), value.clone());
        }
    }
}
