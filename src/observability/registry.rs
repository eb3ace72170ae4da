//! Subscriber registry & fan-out (C2)
//!
//! Sinks register a named constructor before the server starts serving
//! traffic (a registry-of-constructors, per the no-runtime-reflection design
//! note in §9). `Registry::initialize` then builds one instance per enabled
//! factory and `Registry::publish` fans an event out to every active
//! subscriber whose categories match.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock as StdRwLock};

use async_trait::async_trait;
use tokio::sync::RwLock as AsyncRwLock;
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::error::{Error, Result};
use crate::observability::event::Event;

const WILDCARD_CATEGORY: &str = "*";

/// Lifecycle of a subscriber instance (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Active,
    Closed,
}

/// A pluggable observability sink. Implementors are the console, file, and
/// tracing sinks in [`crate::observability::sinks`].
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Category tags this instance cares about; `*` subscribes to everything.
    fn categories(&self) -> Vec<String>;

    /// Whether this subscriber should be constructed for the given config.
    async fn is_enabled(&self, config: &ObservabilityConfig) -> bool;

    /// One-time setup (opening files, connecting to a tracing provider).
    async fn initialize(&mut self) -> Result<()>;

    /// Handle a single event. Errors are logged and swallowed by the
    /// registry — one bad sink must not affect the others.
    async fn on_event(&self, event: &Event) -> Result<()>;

    /// Release resources. Safe to call twice.
    async fn close(&self) -> Result<()>;
}

/// Constructs fresh [`Subscriber`] instances under a stable name.
pub trait SubscriberFactory: Send + Sync {
    fn name(&self) -> &str;
    fn create(&self) -> Box<dyn Subscriber>;
}

static FACTORIES: LazyLock<StdRwLock<HashMap<String, Arc<dyn SubscriberFactory>>>> =
    LazyLock::new(|| StdRwLock::new(HashMap::new()));

/// Register a factory under `name`. A duplicate name replaces the previous
/// registration and logs a warning.
pub fn register_factory(name: impl Into<String>, factory: Arc<dyn SubscriberFactory>) {
    let name = name.into();
    let mut factories = FACTORIES.write().expect("subscriber factory registry poisoned");
    if factories.insert(name.clone(), factory).is_some() {
        tracing::warn!(factory = %name, "replacing previously registered subscriber factory");
    }
}

/// Copy of every registered factory, keyed by name.
pub fn all_factories() -> HashMap<String, Arc<dyn SubscriberFactory>> {
    FACTORIES.read().expect("subscriber factory registry poisoned").clone()
}

/// Test-only isolation hook: drop every registered factory.
pub fn clear_registry() {
    FACTORIES.write().expect("subscriber factory registry poisoned").clear();
}

struct ActiveSubscriber {
    id: String,
    categories: Vec<String>,
    state: AsyncRwLock<LifecycleState>,
    inner: Box<dyn Subscriber>,
}

impl ActiveSubscriber {
    fn wants(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == WILDCARD_CATEGORY || c == category)
    }

    async fn dispatch(&self, event: &Event) -> Result<()> {
        if *self.state.read().await != LifecycleState::Active {
            return Err(Error::SubscriberClosed);
        }
        self.inner.on_event(event).await
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state == LifecycleState::Closed {
            return Ok(());
        }
        self.inner.close().await?;
        *state = LifecycleState::Closed;
        Ok(())
    }
}

/// Runtime collection of active subscribers built from the global factory
/// registry, per the [`ObservabilityConfig`] supplied at startup.
pub struct Registry {
    subscribers: Vec<ActiveSubscriber>,
}

impl Registry {
    /// Construct and initialize every enabled factory. In strict failure
    /// mode the first `initialize` error aborts and is returned; in lenient
    /// mode the error is logged and initialization continues with the rest.
    pub async fn initialize(config: &ObservabilityConfig) -> Result<Self> {
        let mut subscribers = Vec::new();
        let mut names: Vec<_> = all_factories().into_iter().collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, factory) in names {
            let mut instance = factory.create();
            if !instance.is_enabled(config).await {
                continue;
            }
            match instance.initialize().await {
                Ok(()) => subscribers.push(ActiveSubscriber {
                    id: Uuid::new_v4().to_string(),
                    categories: instance.categories(),
                    state: AsyncRwLock::new(LifecycleState::Active),
                    inner: instance,
                }),
                Err(err) if config.failure_mode == crate::config::FailureMode::Strict => {
                    tracing::error!(subscriber = %name, error = %err, "subscriber failed to initialize (strict)");
                    return Err(err);
                }
                Err(err) => {
                    tracing::error!(subscriber = %name, error = %err, "subscriber failed to initialize, skipping (lenient)");
                }
            }
        }

        Ok(Self { subscribers })
    }

    /// Number of active subscribers, for readiness reporting.
    pub fn active_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `event` to every active subscriber whose categories match.
    /// Delivery order across subscribers is unspecified; errors from one
    /// subscriber are logged and do not prevent delivery to the others.
    pub async fn publish(&self, event: &Event) {
        for subscriber in &self.subscribers {
            if !subscriber.wants(&event.category) {
                continue;
            }
            if let Err(err) = subscriber.dispatch(event).await {
                tracing::error!(
                    subscriber_id = %subscriber.id,
                    event_id = %event.event_id,
                    error = %err,
                    "subscriber failed to handle event"
                );
            }
        }
    }

    /// Close every active subscriber. Idempotent.
    pub async fn shutdown(&self) {
        for subscriber in &self.subscribers {
            if let Err(err) = subscriber.close().await {
                tracing::error!(subscriber_id = %subscriber.id, error = %err, "error closing subscriber");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::event::EventStatus;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingSubscriber {
        categories: Vec<String>,
        received: Arc<Mutex<Vec<String>>>,
        fail_next: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Subscriber for RecordingSubscriber {
        fn categories(&self) -> Vec<String> {
            self.categories.clone()
        }

        async fn is_enabled(&self, _config: &ObservabilityConfig) -> bool {
            true
        }

        async fn initialize(&mut self) -> Result<()> {
            Ok(())
        }

        async fn on_event(&self, event: &Event) -> Result<()> {
            if self.fail_next.swap(0, Ordering::SeqCst) == 1 {
                return Err(Error::Storage("simulated failure".into()));
            }
            self.received.lock().unwrap().push(event.event_id.clone());
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct RecordingFactory {
        name: String,
        categories: Vec<String>,
        received: Arc<Mutex<Vec<String>>>,
        fail_next: Arc<AtomicUsize>,
    }

    impl SubscriberFactory for RecordingFactory {
        fn name(&self) -> &str {
            &self.name
        }

        fn create(&self) -> Box<dyn Subscriber> {
            Box::new(RecordingSubscriber {
                categories: self.categories.clone(),
                received: self.received.clone(),
                fail_next: self.fail_next.clone(),
            })
        }
    }

    fn sample_event(category: &str) -> Event {
        Event::new(
            "trace",
            "flow.node.entered",
            "flow-engine",
            EventStatus::Success,
            category,
            json!({}),
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn fan_out_preserves_per_sink_order_and_isolates_errors() {
        clear_registry();
        let sink_a = Arc::new(Mutex::new(Vec::new()));
        let sink_b = Arc::new(Mutex::new(Vec::new()));
        let fail_flag = Arc::new(AtomicUsize::new(1));

        register_factory(
            "a",
            Arc::new(RecordingFactory {
                name: "a".into(),
                categories: vec!["observability.flows".into()],
                received: sink_a.clone(),
                fail_next: fail_flag,
            }),
        );
        register_factory(
            "b",
            Arc::new(RecordingFactory {
                name: "b".into(),
                categories: vec!["observability.flows".into()],
                received: sink_b.clone(),
                fail_next: Arc::new(AtomicUsize::new(0)),
            }),
        );

        let config = ObservabilityConfig::default();
        let registry = Registry::initialize(&config).await.unwrap();
        assert_eq!(registry.active_count(), 2);

        let events = vec![
            sample_event("observability.flows"),
            sample_event("observability.flows"),
            sample_event("observability.flows"),
        ];
        let ids: Vec<_> = events.iter().map(|e| e.event_id.clone()).collect();
        for event in &events {
            registry.publish(event).await;
        }

        // sink A dropped its first event (simulated failure) but received the rest in order.
        assert_eq!(*sink_a.lock().unwrap(), ids[1..]);
        assert_eq!(*sink_b.lock().unwrap(), ids);
        clear_registry();
    }

    #[tokio::test]
    async fn category_filtering_excludes_non_matching_events() {
        clear_registry();
        let sink = Arc::new(Mutex::new(Vec::new()));
        register_factory(
            "only-security",
            Arc::new(RecordingFactory {
                name: "only-security".into(),
                categories: vec!["observability.security".into()],
                received: sink.clone(),
                fail_next: Arc::new(AtomicUsize::new(0)),
            }),
        );
        let registry = Registry::initialize(&ObservabilityConfig::default()).await.unwrap();
        registry.publish(&sample_event("observability.flows")).await;
        assert!(sink.lock().unwrap().is_empty());
        clear_registry();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        clear_registry();
        register_factory(
            "idempotent",
            Arc::new(RecordingFactory {
                name: "idempotent".into(),
                categories: vec!["*".into()],
                received: Arc::new(Mutex::new(Vec::new())),
                fail_next: Arc::new(AtomicUsize::new(0)),
            }),
        );
        let registry = Registry::initialize(&ObservabilityConfig::default()).await.unwrap();
        registry.shutdown().await;
        registry.shutdown().await;
        clear_registry();
    }
}
