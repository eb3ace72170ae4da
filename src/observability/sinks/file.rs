//! File sink: appends formatted events to a log file
//!
//! Defaults to `<home>/logs/observability/observability.log` when no path is
//! configured. `close` flushes before closing.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::ObservabilityConfig;
use crate::error::{Error, Result};
use crate::observability::event::Event;
use crate::observability::registry::{Subscriber, SubscriberFactory};
use crate::observability::sinks::{formatter_for, process_event, Formatter, Writer};

const FACTORY_NAME: &str = "file";

fn default_log_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join("logs/observability/observability.log")
}

struct FileWriter {
    path: PathBuf,
    handle: Mutex<Option<File>>,
}

impl FileWriter {
    async fn ensure_open(&self) -> Result<()> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Error::Storage(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        *handle = Some(file);
        Ok(())
    }
}

#[async_trait]
impl Writer for FileWriter {
    async fn write(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_open().await?;
        let mut handle = self.handle.lock().await;
        let Some(file) = handle.as_mut() else {
            return Err(Error::SubscriberClosed);
        };
        file.write_all(bytes).await.map_err(|e| Error::Storage(e.to_string()))
    }

    async fn flush(&self) -> Result<()> {
        let mut handle = self.handle.lock().await;
        if let Some(file) = handle.as_mut() {
            file.flush().await.map_err(|e| Error::Storage(e.to_string()))?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.flush().await?;
        *self.handle.lock().await = None;
        Ok(())
    }
}

pub struct FileSubscriber {
    categories: Vec<String>,
    formatter: Box<dyn Formatter>,
    writer: FileWriter,
    closed: std::sync::atomic::AtomicBool,
}

impl FileSubscriber {
    fn new(path: PathBuf, format: &str, categories: Vec<String>) -> Self {
        Self {
            categories,
            formatter: formatter_for(format),
            writer: FileWriter { path, handle: Mutex::new(None) },
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Subscriber for FileSubscriber {
    fn categories(&self) -> Vec<String> {
        self.categories.clone()
    }

    async fn is_enabled(&self, config: &ObservabilityConfig) -> bool {
        config.enabled && config.file.enabled
    }

    async fn initialize(&mut self) -> Result<()> {
        self.writer.ensure_open().await
    }

    async fn on_event(&self, event: &Event) -> Result<()> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::SubscriberClosed);
        }
        process_event(event, self.formatter.as_ref(), &self.writer, FACTORY_NAME).await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        self.writer.close().await
    }
}

pub struct FileSubscriberFactory {
    path: Option<PathBuf>,
    format: String,
    categories: Vec<String>,
}

impl FileSubscriberFactory {
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        Self {
            path: config.file.path.clone(),
            format: config.file.format.clone(),
            categories: config.file.categories.clone(),
        }
    }
}

impl Default for FileSubscriberFactory {
    fn default() -> Self {
        Self { path: None, format: "json".to_string(), categories: vec!["*".to_string()] }
    }
}

impl SubscriberFactory for FileSubscriberFactory {
    fn name(&self) -> &str {
        FACTORY_NAME
    }

    fn create(&self) -> Box<dyn Subscriber> {
        let path = self.path.clone().unwrap_or_else(default_log_path);
        Box::new(FileSubscriber::new(path, &self.format, self.categories.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_closes_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observability.log");
        let mut subscriber = FileSubscriber::new(path.clone(), "json", vec!["*".to_string()]);
        subscriber.initialize().await.unwrap();
        let event = Event::new(
            "trace",
            "flow.node.entered",
            "flow-engine",
            crate::observability::event::EventStatus::Success,
            "observability.flows",
            serde_json::json!({}),
            chrono::Utc::now(),
        );
        subscriber.on_event(&event).await.unwrap();
        subscriber.close().await.unwrap();
        subscriber.close().await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains(&event.event_id));
    }

    #[tokio::test]
    async fn writing_after_close_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observability.log");
        let mut subscriber = FileSubscriber::new(path, "json", vec!["*".to_string()]);
        subscriber.initialize().await.unwrap();
        subscriber.close().await.unwrap();
        let event = Event::new(
            "trace",
            "flow.node.entered",
            "flow-engine",
            crate::observability::event::EventStatus::Success,
            "observability.flows",
            serde_json::json!({}),
            chrono::Utc::now(),
        );
        assert!(subscriber.on_event(&event).await.is_err());
    }
}
