//! Tracing sink: converts each event into a span in a remote tracing backend
//!
//! Trace-id propagation is handled manually rather than leaning on the SDK's
//! default ID generator: the event's `trace_id` (a UUID-form identifier with
//! hyphens, or already-bare hex) determines the span's trace-id; a malformed
//! value falls back to a freshly generated one with a warning logged.
//! `data.trace_parent`, when present and well-formed, becomes the span's
//! parent span-id; a malformed value is ignored without failing the call.

use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::trace::{
    Span, SpanContext, SpanId, SpanKind, Status, TraceContextExt, TraceFlags, TraceId, TraceState,
    Tracer, TracerProvider,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::SERVICE_NAME;
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::error::{Error, Result};
use crate::observability::event::{Event, EventStatus};
use crate::observability::registry::{Subscriber, SubscriberFactory};

const FACTORY_NAME: &str = "tracing";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Components treated as known edges: their spans get `SpanKind::Server`
/// rather than `SpanKind::Internal` (§4.2).
const EDGE_COMPONENTS: &[&str] = &["OAuth2Server", "TokenHandler"];

fn parse_trace_id(raw: &str) -> TraceId {
    let stripped: String = raw.chars().filter(|c| *c != '-').collect();
    match TraceId::from_hex(&stripped) {
        Ok(id) if id != TraceId::INVALID => id,
        _ => {
            tracing::warn!(raw_trace_id = raw, "malformed trace id, generating a fresh one");
            let fresh: String = Uuid::new_v4().simple().to_string();
            TraceId::from_hex(&fresh).unwrap_or(TraceId::INVALID)
        }
    }
}

fn parse_parent_span_id(event: &Event) -> SpanId {
    event
        .data
        .get("trace_parent")
        .and_then(|v| v.as_str())
        .and_then(|raw| SpanId::from_hex(raw).ok())
        .filter(|id| *id != SpanId::INVALID)
        .unwrap_or(SpanId::INVALID)
}

fn span_kind_for(component: &str) -> SpanKind {
    if EDGE_COMPONENTS.contains(&component) {
        SpanKind::Server
    } else {
        SpanKind::Internal
    }
}

pub struct TracingSubscriber {
    categories: Vec<String>,
    endpoint: Option<String>,
    provider: Option<SdkTracerProvider>,
}

impl TracingSubscriber {
    fn new(endpoint: Option<String>, categories: Vec<String>) -> Self {
        Self { categories, endpoint, provider: None }
    }

    fn build_provider(&self) -> Result<SdkTracerProvider> {
        let resource = Resource::builder()
            .with_attributes(vec![KeyValue::new(SERVICE_NAME, "thunder")])
            .build();

        let mut builder = SdkTracerProvider::builder().with_resource(resource);

        if let Some(endpoint) = &self.endpoint {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .map_err(|e| Error::TracingProvider(e.to_string()))?;
            builder = builder.with_batch_exporter(exporter);
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Subscriber for TracingSubscriber {
    fn categories(&self) -> Vec<String> {
        self.categories.clone()
    }

    async fn is_enabled(&self, config: &ObservabilityConfig) -> bool {
        config.enabled && config.otel.enabled
    }

    async fn initialize(&mut self) -> Result<()> {
        self.provider = Some(self.build_provider()?);
        Ok(())
    }

    async fn on_event(&self, event: &Event) -> Result<()> {
        let provider = self.provider.as_ref().ok_or(Error::SubscriberClosed)?;
        let tracer = provider.tracer("thunder");

        let trace_id = parse_trace_id(&event.trace_id);
        let parent_span_id = parse_parent_span_id(event);
        let parent_context = SpanContext::new(
            trace_id,
            parent_span_id,
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        let cx = Context::new().with_remote_span_context(parent_context);

        let mut span = tracer
            .span_builder(event.r#type.clone())
            .with_kind(span_kind_for(&event.component))
            .with_start_time(event.timestamp)
            .start_with_context(&tracer, &cx);

        for (key, value) in event.tag_pairs() {
            span.set_attribute(KeyValue::new(key, value));
        }

        span.add_event(
            event.r#type.clone(),
            event
                .tag_pairs()
                .into_iter()
                .map(|(k, v)| KeyValue::new(k, v))
                .collect(),
        );

        if event.status == EventStatus::Failure {
            span.set_status(Status::error(event.failure_message()));
        }

        span.end();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(provider) = self.provider.clone() else {
            return Ok(());
        };
        let result = tokio::time::timeout(
            SHUTDOWN_GRACE,
            tokio::task::spawn_blocking(move || provider.shutdown()),
        )
        .await;
        match result {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(Error::TracingProvider(e.to_string())),
            Ok(Err(e)) => Err(Error::TracingProvider(e.to_string())),
            Err(_) => Err(Error::TracingProvider("shutdown exceeded 5s grace window".to_string())),
        }
    }
}

pub struct TracingSubscriberFactory {
    endpoint: Option<String>,
    categories: Vec<String>,
}

impl TracingSubscriberFactory {
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        Self { endpoint: config.otel.endpoint.clone(), categories: config.otel.categories.clone() }
    }
}

impl Default for TracingSubscriberFactory {
    fn default() -> Self {
        Self { endpoint: None, categories: vec!["*".to_string()] }
    }
}

impl SubscriberFactory for TracingSubscriberFactory {
    fn name(&self) -> &str {
        FACTORY_NAME
    }

    fn create(&self) -> Box<dyn Subscriber> {
        Box::new(TracingSubscriber::new(self.endpoint.clone(), self.categories.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_hyphens_are_stripped() {
        let id = parse_trace_id("4bf92f35-77b3-4da6-a3ce-929d0e0e4736");
        assert_eq!(format!("{id:032x}"), "4bf92f3577b34da6a3ce929d0e0e4736");
    }

    #[test]
    fn malformed_trace_id_falls_back_to_a_fresh_one() {
        let id = parse_trace_id("not-a-trace-id");
        assert_ne!(id, TraceId::INVALID);
    }

    #[test]
    fn missing_trace_parent_yields_invalid_span_id() {
        let event = Event::new(
            "4bf92f35-77b3-4da6-a3ce-929d0e0e4736",
            "flow.node.entered",
            "flow-engine",
            EventStatus::Success,
            "observability.flows",
            serde_json::json!({}),
            chrono::Utc::now(),
        );
        assert_eq!(parse_parent_span_id(&event), SpanId::INVALID);
    }

    #[test]
    fn malformed_trace_parent_is_ignored_not_fatal() {
        let event = Event::new(
            "trace",
            "flow.node.entered",
            "flow-engine",
            EventStatus::Success,
            "observability.flows",
            serde_json::json!({"trace_parent": "not-valid"}),
            chrono::Utc::now(),
        );
        assert_eq!(parse_parent_span_id(&event), SpanId::INVALID);
    }

    #[test]
    fn known_edge_components_get_server_kind() {
        assert!(matches!(span_kind_for("OAuth2Server"), SpanKind::Server));
        assert!(matches!(span_kind_for("flow-engine"), SpanKind::Internal));
    }
}
