//! Console sink: writes formatted events to process standard output

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::config::ObservabilityConfig;
use crate::error::{Error, Result};
use crate::observability::event::Event;
use crate::observability::registry::{Subscriber, SubscriberFactory};
use crate::observability::sinks::{formatter_for, process_event, Formatter, Writer};

const FACTORY_NAME: &str = "console";

struct StdoutWriter {
    stdout: Mutex<Stdout>,
    closed: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl Writer for StdoutWriter {
    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::SubscriberClosed);
        }
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(bytes).await.map_err(|e| Error::Storage(e.to_string()))
    }

    async fn flush(&self) -> Result<()> {
        self.stdout.lock().await.flush().await.map_err(|e| Error::Storage(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        self.flush().await
    }
}

pub struct ConsoleSubscriber {
    categories: Vec<String>,
    formatter: Box<dyn Formatter>,
    writer: StdoutWriter,
}

impl ConsoleSubscriber {
    fn new() -> Self {
        Self {
            categories: vec!["*".to_string()],
            formatter: formatter_for("json"),
            writer: StdoutWriter {
                stdout: Mutex::new(tokio::io::stdout()),
                closed: std::sync::atomic::AtomicBool::new(false),
            },
        }
    }
}

#[async_trait]
impl Subscriber for ConsoleSubscriber {
    fn categories(&self) -> Vec<String> {
        self.categories.clone()
    }

    async fn is_enabled(&self, config: &ObservabilityConfig) -> bool {
        config.enabled && config.console.enabled
    }

    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_event(&self, event: &Event) -> Result<()> {
        process_event(event, self.formatter.as_ref(), &self.writer, FACTORY_NAME).await
    }

    async fn close(&self) -> Result<()> {
        self.writer.close().await
    }
}

pub struct ConsoleSubscriberFactory;

impl SubscriberFactory for ConsoleSubscriberFactory {
    fn name(&self) -> &str {
        FACTORY_NAME
    }

    fn create(&self) -> Box<dyn Subscriber> {
        Box::new(ConsoleSubscriber::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn respects_enabled_flags() {
        let mut subscriber = ConsoleSubscriber::new();
        let mut config = ObservabilityConfig::default();
        config.console.enabled = false;
        assert!(!subscriber.is_enabled(&config).await);
        config.console.enabled = true;
        assert!(subscriber.is_enabled(&config).await);
        subscriber.initialize().await.unwrap();
    }
}
