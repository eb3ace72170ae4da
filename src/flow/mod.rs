//! Authentication-flow execution engine: graph model, persistence, node
//! executors, and the engine that walks a flow from start to a terminal
//! node (C8-C11).

pub mod engine;
pub mod executor;
pub mod graph;
pub mod loader;
pub mod store;

pub use engine::{FlowEngine, NodeResponse, NodeResponseStatus, NodeResponseType};
pub use executor::{register_builtin_executors, Executor, ExecutorFactory, ExecutorOutcome};
pub use graph::{Graph, GraphType, InputField, Node, NodeKind};
pub use store::{FlowContext, FlowContextStore, InMemoryFlowContextStore};
