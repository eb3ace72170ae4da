//! Typed observability event (C1)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outcome of the thing an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Failure,
    Pending,
    InProgress,
}

/// A single observability record produced by the security pipeline or the
/// flow engine and handed to the subscriber registry for fan-out.
///
/// `event_id` is unique within a process. `timestamp` is supplied by the
/// producer, never defaulted by a sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub trace_id: String,
    pub r#type: String,
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub status: EventStatus,
    pub category: String,
    pub data: Value,
}

impl Event {
    /// Build a new event with a freshly generated id and the given timestamp.
    pub fn new(
        trace_id: impl Into<String>,
        event_type: impl Into<String>,
        component: impl Into<String>,
        status: EventStatus,
        category: impl Into<String>,
        data: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            trace_id: trace_id.into(),
            r#type: event_type.into(),
            timestamp,
            component: component.into(),
            status,
            category: category.into(),
            data,
        }
    }

    /// Read `data.<key>` as a string attribute, or `None` if absent, not a
    /// string, or empty — the "nil or empty string dropped" invariant (§3)
    /// lives here so every tag-emitting sink enforces it identically.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Flatten `data`'s top-level object entries into `(key, value)` string
    /// pairs suitable for tag/attribute emission, dropping nil and empty
    /// string values. Nested aggregates are rendered as compact JSON text.
    pub fn tag_pairs(&self) -> Vec<(String, String)> {
        let Value::Object(map) = &self.data else {
            return Vec::new();
        };
        map.iter()
            .filter_map(|(k, v)| match v {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some((k.clone(), s.clone())),
                other => Some((k.clone(), other.to_string())),
            })
            .collect()
    }

    /// First non-empty of `data.error`, `data.failure_reason`, falling back
    /// to the literal `"unknown error"` — used by the tracing sink to set
    /// span status on a failure event (§4.2).
    pub fn failure_message(&self) -> String {
        self.data_str("error")
            .or_else(|| self.data_str("failure_reason"))
            .unwrap_or("unknown error")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(data: Value) -> Event {
        Event::new(
            "trace-1",
            "flow.node.entered",
            "flow-engine",
            EventStatus::Success,
            "observability.flows",
            data,
            Utc::now(),
        )
    }

    #[test]
    fn event_id_is_generated_and_unique() {
        let a = sample(json!({}));
        let b = sample(json!({}));
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn tag_pairs_drops_nil_and_empty_string() {
        let event = sample(json!({
            "flow_id": "f1",
            "graph_id": "",
            "error": null,
            "count": 3,
        }));
        let pairs = event.tag_pairs();
        assert!(pairs.contains(&("flow_id".to_string(), "f1".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "graph_id"));
        assert!(!pairs.iter().any(|(k, _)| k == "error"));
        assert!(pairs.contains(&("count".to_string(), "3".to_string())));
    }

    #[test]
    fn failure_message_prefers_error_then_failure_reason_then_default() {
        assert_eq!(sample(json!({"error": "boom"})).failure_message(), "boom");
        assert_eq!(
            sample(json!({"failure_reason": "timeout"})).failure_message(),
            "timeout"
        );
        assert_eq!(sample(json!({})).failure_message(), "unknown error");
    }
}
