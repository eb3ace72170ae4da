//! Observability fan-out: event model, subscriber registry, and sinks
//!
//! `C1` is [`event::Event`]; `C2` is [`registry::Registry`] plus the global
//! factory registry; `C3` is the console/file/tracing sinks under
//! [`sinks`], each implementing [`registry::Subscriber`].

pub mod event;
pub mod registry;
pub mod sinks;

use std::sync::Arc;

use crate::config::ObservabilityConfig;
use crate::error::Result;

/// Register the three built-in sink factories. Safe to call more than once —
/// each registration simply replaces the previous one under the same name.
/// Call this once during process start, before [`registry::Registry::initialize`].
pub fn register_builtin_sinks(config: &ObservabilityConfig) {
    registry::register_factory("console", Arc::new(sinks::console::ConsoleSubscriberFactory));
    registry::register_factory("file", Arc::new(sinks::file::FileSubscriberFactory::from_config(config)));
    registry::register_factory(
        "tracing",
        Arc::new(sinks::tracing_sink::TracingSubscriberFactory::from_config(config)),
    );
}

/// Register built-ins and initialize them against `config` in one step.
pub async fn bootstrap(config: &ObservabilityConfig) -> Result<registry::Registry> {
    register_builtin_sinks(config);
    registry::Registry::initialize(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_with_default_config_activates_console_only() {
        registry::clear_registry();
        let config = ObservabilityConfig::default();
        let registry = bootstrap(&config).await.unwrap();
        assert_eq!(registry.active_count(), 1);
        registry::clear_registry();
    }
}
