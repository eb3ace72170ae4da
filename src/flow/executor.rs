//! Node executors (C11 support): the registry-of-constructors pattern used
//! for observability sinks and credential handlers, reapplied to the code
//! a task-execution or decision node runs.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock as StdRwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::flow::store::FlowContext;

/// What an executor did, reported back to the engine.
#[derive(Debug, Clone)]
pub struct ExecutorOutcome {
    pub success: bool,
    /// For decision nodes: which of the node's declared `next` ids to take.
    /// `None` means "let the engine pick the sole successor."
    pub next_node_override: Option<String>,
    pub data: Value,
    pub failure_reason: Option<String>,
}

impl ExecutorOutcome {
    pub fn success() -> Self {
        Self { success: true, next_node_override: None, data: Value::Null, failure_reason: None }
    }

    pub fn success_with_data(data: Value) -> Self {
        Self { success: true, next_node_override: None, data, failure_reason: None }
    }

    pub fn branch_to(node_id: impl Into<String>) -> Self {
        Self { success: true, next_node_override: Some(node_id.into()), data: Value::Null, failure_reason: None }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self { success: false, next_node_override: None, data: Value::Null, failure_reason: Some(reason.into()) }
    }
}

/// Code bound to a task-execution or decision node by name via
/// [`ExecutorConfig`](crate::flow::graph::ExecutorConfig).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, context: &mut FlowContext, properties: &HashMap<String, String>) -> Result<ExecutorOutcome>;
}

pub trait ExecutorFactory: Send + Sync {
    fn name(&self) -> &str;
    fn create(&self) -> Box<dyn Executor>;
}

static FACTORIES: LazyLock<StdRwLock<HashMap<String, Arc<dyn ExecutorFactory>>>> =
    LazyLock::new(|| StdRwLock::new(HashMap::new()));

pub fn register_factory(factory: Arc<dyn ExecutorFactory>) {
    let name = factory.name().to_string();
    if FACTORIES.read().unwrap().contains_key(&name) {
        tracing::warn!(executor = %name, "replacing already-registered executor factory");
    }
    FACTORIES.write().unwrap().insert(name, factory);
}

pub fn resolve(name: &str) -> Option<Box<dyn Executor>> {
    FACTORIES.read().unwrap().get(name).map(|f| f.create())
}

#[cfg(test)]
pub fn clear_registry() {
    FACTORIES.write().unwrap().clear();
}

/// No-op executor used for provisioning placeholders and in tests; always
/// succeeds without touching the context.
pub struct NoopExecutor;

#[async_trait]
impl Executor for NoopExecutor {
    async fn execute(&self, _context: &mut FlowContext, _properties: &HashMap<String, String>) -> Result<ExecutorOutcome> {
        Ok(ExecutorOutcome::success())
    }
}

pub struct NoopExecutorFactory;

impl ExecutorFactory for NoopExecutorFactory {
    fn name(&self) -> &str {
        "ProvisioningExecutor"
    }

    fn create(&self) -> Box<dyn Executor> {
        Box::new(NoopExecutor)
    }
}

/// Registers the executors this crate ships out of the box. Call once during
/// process start, before any graph referencing them is executed. Safe to
/// call more than once — a re-registration just replaces the prior one.
pub fn register_builtin_executors() {
    register_factory(Arc::new(NoopExecutorFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFailFactory;
    struct AlwaysFail;

    #[async_trait]
    impl Executor for AlwaysFail {
        async fn execute(&self, _context: &mut FlowContext, _properties: &HashMap<String, String>) -> Result<ExecutorOutcome> {
            Ok(ExecutorOutcome::failure("boom"))
        }
    }

    impl ExecutorFactory for AlwaysFailFactory {
        fn name(&self) -> &str {
            "AlwaysFail"
        }

        fn create(&self) -> Box<dyn Executor> {
            Box::new(AlwaysFail)
        }
    }

    #[tokio::test]
    async fn registered_executor_can_be_resolved_by_name() {
        clear_registry();
        register_factory(Arc::new(AlwaysFailFactory));
        let executor = resolve("AlwaysFail").expect("registered");
        let mut context = FlowContext::new();
        let outcome = executor.execute(&mut context, &HashMap::new()).await.unwrap();
        assert!(!outcome.success);
    }

    #[test]
    fn unregistered_name_resolves_to_none() {
        clear_registry();
        assert!(resolve("missing").is_none());
    }
}
