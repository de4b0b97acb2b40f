//! Message bus plumbing shared by the dispatcher and the webhook path.
//!
//! Topics are slash-delimited (`requests/{action}`, `responses/{id}`,
//! `orders/{event_type}`); transports translate them to their own naming.

pub mod memory;
pub mod nats;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryBus;
pub use nats::{NatsBus, NatsConfig};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to connect to broker: {0}")]
    Connect(String),

    #[error("failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("publish to {0} timed out")]
    Timeout(String),

    #[error("bus is closed")]
    Closed,
}

/// A message delivered by a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Outbound side of the bus
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish raw bytes to `topic`
    async fn publish_raw(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Publish an event that downstream consumers expect to be retained.
    /// Transports without durable streams treat this as a plain publish.
    async fn publish_event(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.publish_raw(topic, payload).await
    }
}
