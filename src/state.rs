//! Application state: wires configuration, the security pipeline, the
//! observability fan-out, and the flow engine into the single `Arc`-shared
//! handle the HTTP adapter (C12) carries through every request.

use std::sync::Arc;

use crate::config::ThunderConfig;
use crate::error::Result;
use crate::flow::{FlowEngine, InMemoryFlowContextStore};
use crate::observability::registry::Registry;
use crate::security::{BearerJwtHandler, CredentialHandler, PathMatcher, SecurityPipeline};

#[derive(Clone)]
pub struct AppState {
    config: Arc<ThunderConfig>,
    security: Arc<SecurityPipeline>,
    observability: Arc<Registry>,
    flow_engine: Arc<FlowEngine<InMemoryFlowContextStore>>,
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    pub fn config(&self) -> &ThunderConfig {
        &self.config
    }

    pub fn security(&self) -> &SecurityPipeline {
        &self.security
    }

    pub fn observability(&self) -> &Arc<Registry> {
        &self.observability
    }

    pub fn flow_engine(&self) -> &Arc<FlowEngine<InMemoryFlowContextStore>> {
        &self.flow_engine
    }
}

pub struct AppStateBuilder {
    config: Option<ThunderConfig>,
    enable_tracing: bool,
    extra_handlers: Vec<Box<dyn CredentialHandler>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self { config: None, enable_tracing: true, extra_handlers: Vec::new() }
    }

    pub fn config(mut self, config: ThunderConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register an additional credential handler ahead of the default bearer
    /// handler. Mainly used by tests that need a deterministic fake.
    pub fn with_handler(mut self, handler: Box<dyn CredentialHandler>) -> Self {
        self.extra_handlers.push(handler);
        self
    }

    pub fn without_tracing(mut self) -> Self {
        self.enable_tracing = false;
        self
    }

    pub fn with_tracing(mut self) -> Self {
        self.enable_tracing = true;
        self
    }

    fn init_tracing(level: &str) {
        use std::sync::Once;
        static INIT: Once = Once::new();

        INIT.call_once(|| {
            let filter = tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
            tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
        });
    }

    /// Build the application state: compiles the public-path matcher, wires
    /// up the bearer-JWT handler from the configured key material, boots the
    /// observability fan-out, and loads every graph under `flow.graph_directory`.
    pub async fn build(self) -> Result<AppState> {
        let config = self.config.unwrap_or_default();

        if self.enable_tracing {
            Self::init_tracing(&config.service.log_level);
        }

        let observability = Arc::new(crate::observability::bootstrap(&config.observability).await?);

        let public_paths = PathMatcher::compile(&config.security.public_paths)?;
        let mut handlers = self.extra_handlers;
        handlers.push(Box::new(BearerJwtHandler::from_config(&config.security)?));
        let security = Arc::new(SecurityPipeline::new(public_paths, handlers).with_observability(observability.clone()));

        crate::flow::executor::register_builtin_executors();
        let flow_engine = Arc::new(FlowEngine::new(InMemoryFlowContextStore::new(), observability.clone()));
        let graph_dir = config.flow.graph_directory.as_path();
        let loaded = crate::flow::loader::load_and_register(&flow_engine, graph_dir, config.flow.auto_infer_registration)?;
        tracing::info!(count = loaded, path = %graph_dir.display(), "loaded flow graphs");

        Ok(AppState { config: Arc::new(config), security, observability, flow_engine })
    }
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_with_defaults_produces_a_runnable_state() {
        let graph_dir = tempfile::tempdir().unwrap();
        let key_dir = tempfile::tempdir().unwrap();
        let key_path = key_dir.path().join("hmac-secret");
        std::fs::write(&key_path, b"test-secret").unwrap();

        let mut config = ThunderConfig::default();
        config.flow.graph_directory = graph_dir.path().to_path_buf();
        config.security.bearer_verifier.algorithm = "HS256".to_string();
        config.security.bearer_verifier.public_key_path = key_path;

        let state = AppState::builder().config(config).without_tracing().build().await.unwrap();
        assert_eq!(state.config().service.name, "thunder");
    }
}
