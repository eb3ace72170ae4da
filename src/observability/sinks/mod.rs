//! Stateless formatters and write adapters shared by every sink (C3)

pub mod console;
pub mod file;
pub mod tracing_sink;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{Error, Result};
use crate::observability::event::Event;

/// Converts an [`Event`] into bytes ready to hand to a [`Writer`].
pub trait Formatter: Send + Sync {
    fn format(&self, event: &Event) -> Result<Vec<u8>>;
}

/// `json` formatter — the default for unknown format tokens.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, event: &Event) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(event).map_err(|e| Error::Storage(e.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// `csv` formatter — one row per event, tag pairs flattened into a single
/// semicolon-joined field.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format(&self, event: &Event) -> Result<Vec<u8>> {
        let tags = event
            .tag_pairs()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";");
        let line = format!(
            "{},{},{},{},{:?},{}\n",
            event.event_id, event.trace_id, event.r#type, event.component, event.status, tags
        );
        Ok(line.into_bytes())
    }
}

/// Resolve a sink's configured format token into a [`Formatter`], defaulting
/// to JSON for anything unrecognized.
pub fn formatter_for(format: &str) -> Box<dyn Formatter> {
    match format {
        "csv" => Box::new(CsvFormatter),
        _ => Box::new(JsonFormatter),
    }
}

/// A byte sink a formatted event is written through. Writing after `close`
/// returns an error.
#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(&self, bytes: &[u8]) -> Result<()>;
    async fn flush(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Shared event-processing helper used by every sink: format, write, and log
/// at debug on success / error on failure. An event that fails to format or
/// write is itself an error, per §4.2; callers (the [`Subscriber`] impls)
/// decide whether that error is fatal.
///
/// [`Subscriber`]: crate::observability::registry::Subscriber
pub async fn process_event(
    event: &Event,
    formatter: &dyn Formatter,
    writer: &dyn Writer,
    label: &str,
) -> Result<()> {
    let bytes = formatter.format(event)?;
    match writer.write(&bytes).await {
        Ok(()) => {
            tracing::debug!(sink = label, event_id = %event.event_id, "event delivered");
            Ok(())
        }
        Err(err) => {
            tracing::error!(sink = label, event_id = %event.event_id, error = %err, "event delivery failed");
            Err(err)
        }
    }
}

/// Structured `data.error` / `data.failure_reason` lookup, exposed for
/// sinks and tests that want the raw fallback value as a [`serde_json::Value`].
pub fn failure_value(event: &Event) -> serde_json::Value {
    json!(event.failure_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::event::EventStatus;
    use std::sync::Mutex;

    struct CapturingWriter {
        buf: Mutex<Vec<Vec<u8>>>,
        closed: Mutex<bool>,
    }

    #[async_trait]
    impl Writer for CapturingWriter {
        async fn write(&self, bytes: &[u8]) -> Result<()> {
            if *self.closed.lock().unwrap() {
                return Err(Error::SubscriberClosed);
            }
            self.buf.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }

        async fn flush(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn sample() -> Event {
        Event::new(
            "trace",
            "flow.node.entered",
            "flow-engine",
            EventStatus::Success,
            "observability.flows",
            json!({"flow_id": "f1"}),
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn process_event_writes_formatted_bytes() {
        let writer = CapturingWriter { buf: Mutex::new(Vec::new()), closed: Mutex::new(false) };
        process_event(&sample(), &JsonFormatter, &writer, "test").await.unwrap();
        assert_eq!(writer.buf.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn writing_after_close_is_an_error() {
        let writer = CapturingWriter { buf: Mutex::new(Vec::new()), closed: Mutex::new(false) };
        writer.close().await.unwrap();
        let result = process_event(&sample(), &JsonFormatter, &writer, "test").await;
        assert!(result.is_err());
    }

    #[test]
    fn unknown_format_token_defaults_to_json() {
        let bytes = formatter_for("yaml").format(&sample()).unwrap();
        assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_ok());
    }
}
