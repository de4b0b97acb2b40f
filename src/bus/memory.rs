//! In-process bus used when embedding the dispatcher and in tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{BusError, InboundMessage, Publisher};

/// A published message as recorded by [`MemoryBus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Whether it went through [`Publisher::publish_event`]
    pub event: bool,
}

impl Published {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// Records everything published to it and can feed inbound messages
#[derive(Default)]
pub struct MemoryBus {
    published: Mutex<Vec<Published>>,
    fail_publishes: Mutex<bool>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel pair for feeding a dispatcher loop
    pub fn inbound_channel(
        capacity: usize,
    ) -> (mpsc::Sender<InboundMessage>, mpsc::Receiver<InboundMessage>) {
        mpsc::channel(capacity)
    }

    /// Snapshot of every message published so far
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Messages published to exactly `topic`
    pub fn published_to(&self, topic: &str) -> Vec<Published> {
        self.published()
            .into_iter()
            .filter(|p| p.topic == topic)
            .collect()
    }

    /// Make subsequent publishes fail, simulating a broker outage
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.fail_publishes.lock() {
            *flag = failing;
        }
    }

    fn record(&self, topic: &str, payload: Vec<u8>, event: bool) -> Result<(), BusError> {
        if self.fail_publishes.lock().map(|f| *f).unwrap_or(false) {
            return Err(BusError::Publish {
                topic: topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }
        let mut published = self.published.lock().map_err(|_| BusError::Closed)?;
        published.push(Published {
            topic: topic.to_string(),
            payload,
            event,
        });
        Ok(())
    }
}

#[async_trait]
impl Publisher for MemoryBus {
    async fn publish_raw(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.record(topic, payload, false)
    }

    async fn publish_event(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.record(topic, payload, true)
    }
}
