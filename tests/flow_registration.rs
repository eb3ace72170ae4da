//! Covers the registration-derivation path end to end (§4.6): a login graph
//! loaded from disk gets a sibling registration graph with a provisioning
//! step spliced in front of its auth-success node, and that step actually
//! runs when the derived flow executes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use thunder_core::config::ObservabilityConfig;
use thunder_core::error::Result;
use thunder_core::flow::{
    self, register_builtin_executors, Executor, ExecutorFactory, ExecutorOutcome, FlowEngine, Graph, GraphType,
    InMemoryFlowContextStore, Node, NodeKind, NodeResponseStatus,
};
use thunder_core::observability::registry::Registry;

struct CountingProvisioner {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Executor for CountingProvisioner {
    async fn execute(&self, _context: &mut flow::FlowContext, _properties: &HashMap<String, String>) -> Result<ExecutorOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutorOutcome::success())
    }
}

struct CountingProvisionerFactory {
    calls: Arc<AtomicUsize>,
}

impl ExecutorFactory for CountingProvisionerFactory {
    fn name(&self) -> &str {
        "CountingProvisioner"
    }

    fn create(&self) -> Box<dyn Executor> {
        Box::new(CountingProvisioner { calls: self.calls.clone() })
    }
}

fn login_graph() -> Graph {
    let mut graph = Graph::new("login", Some(GraphType::Authentication));
    graph.add_node(Node::new("start", NodeKind::PromptOnly));
    graph.add_node(Node::new("success", NodeKind::AuthSuccess));
    graph.set_start_node("start");
    graph.add_edge("start", "success").unwrap();
    graph
}

#[tokio::test]
async fn derived_registration_graph_runs_its_provisioning_node_before_success() {
    let calls = Arc::new(AtomicUsize::new(0));
    thunder_core::flow::executor::register_factory(Arc::new(CountingProvisionerFactory { calls: calls.clone() }));

    let mut registration = login_graph().derive_registration().unwrap();
    registration.id = "login-registration".to_string();
    for node in registration.nodes.values_mut() {
        if node.kind == NodeKind::TaskExecution {
            node.executor_config = Some(thunder_core::flow::graph::ExecutorConfig {
                name: "CountingProvisioner".to_string(),
                properties: HashMap::new(),
            });
        }
    }

    let observability = Arc::new(Registry::initialize(&ObservabilityConfig::default()).await.unwrap());
    let engine = FlowEngine::new(InMemoryFlowContextStore::new(), observability);
    engine.register_graph(registration);

    let (_, response) = engine.start("login-registration", Value::Null).await.unwrap();
    assert_eq!(response.status, NodeResponseStatus::Complete);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn loader_derives_a_registration_graph_only_for_graphs_lacking_one() {
    register_builtin_executors();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("login.json"), login_graph().to_json().unwrap()).unwrap();

    let already_registered = {
        let mut g = Graph::new("has-reg", Some(GraphType::Authentication));
        g.add_node(Node::new("start", NodeKind::AuthSuccess));
        g.set_start_node("start");
        g
    };
    std::fs::write(dir.path().join("has-reg.json"), already_registered.to_json().unwrap()).unwrap();
    let sibling = {
        let mut g = Graph::new("has-reg-registration", Some(GraphType::Registration));
        g.add_node(Node::new("start", NodeKind::AuthSuccess));
        g.set_start_node("start");
        g
    };
    std::fs::write(dir.path().join("has-reg-registration.json"), sibling.to_json().unwrap()).unwrap();

    let observability = Arc::new(Registry::initialize(&ObservabilityConfig::default()).await.unwrap());
    let engine = FlowEngine::new(InMemoryFlowContextStore::new(), observability);
    let loaded = flow::loader::load_and_register(&engine, dir.path(), true).unwrap();

    // login -> login-registration (derived), has-reg, has-reg-registration (on disk): 4 total.
    assert_eq!(loaded, 4);

    let (_, response) = engine.start("login-registration", json!({})).await.unwrap();
    assert_eq!(response.status, NodeResponseStatus::Complete);
}
