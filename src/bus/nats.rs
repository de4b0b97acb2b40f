//! NATS transport.
//!
//! Topic `a/b/c` maps to subject `a.b.c`; the MQTT-style wildcards `#` and
//! `+` map to `>` and `*`. Events go through a JetStream stream so they are
//! retained; responses use core publish.

use std::time::Duration;

use async_nats::jetstream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use super::{BusError, InboundMessage, Publisher};

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub client_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// JetStream stream retaining outbound events
    pub event_stream: String,
    /// Subjects bound to the event stream
    pub event_subjects: Vec<String>,
    pub max_age: Duration,
    pub publish_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            client_name: "shopbridge".to_string(),
            username: None,
            password: None,
            event_stream: "ORDERS".to_string(),
            event_subjects: vec!["orders.>".to_string()],
            max_age: Duration::from_secs(24 * 60 * 60), // 24 hours
            publish_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Translate a slash topic (or topic filter) into a NATS subject
pub fn topic_to_subject(topic: &str) -> String {
    topic
        .split('/')
        .map(|segment| match segment {
            "#" => ">",
            "+" => "*",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Translate a NATS subject back into a slash topic
pub fn subject_to_topic(subject: &str) -> String {
    subject.replace('.', "/")
}

#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    publish_timeout: Duration,
}

impl NatsBus {
    /// Connect to NATS and make sure the event stream exists
    pub async fn connect(config: NatsConfig) -> Result<Self, BusError> {
        let mut options = async_nats::ConnectOptions::new()
            .name(&config.client_name)
            .connection_timeout(config.connect_timeout);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&config.url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        tracing::info!("Connected to NATS at {}", config.url);

        let jetstream = jetstream::new(client.clone());
        jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: config.event_stream.clone(),
                subjects: config.event_subjects.clone(),
                max_age: config.max_age,
                storage: jetstream::stream::StorageType::File,
                num_replicas: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        tracing::info!("JetStream stream '{}' ready", config.event_stream);

        Ok(Self {
            client,
            jetstream,
            publish_timeout: config.publish_timeout,
        })
    }

    /// Subscribe to a topic filter, yielding messages with slash topics
    pub async fn subscribe(
        &self,
        topic_filter: &str,
    ) -> Result<BoxStream<'static, InboundMessage>, BusError> {
        let subject = topic_to_subject(topic_filter);
        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| BusError::Subscribe {
                topic: topic_filter.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!("Subscribed to {} (subject {})", topic_filter, subject);

        Ok(subscriber
            .map(|msg| InboundMessage {
                topic: subject_to_topic(msg.subject.as_str()),
                payload: msg.payload.to_vec(),
            })
            .boxed())
    }

    /// Check if the NATS connection is active
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    /// Flush pending publishes before shutdown
    pub async fn close(&self) {
        if let Err(e) = self.client.flush().await {
            tracing::warn!("Failed to flush NATS connection: {}", e);
        }
        tracing::info!("Disconnected from NATS");
    }
}

#[async_trait]
impl Publisher for NatsBus {
    async fn publish_raw(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let subject = topic_to_subject(topic);
        let publish = async {
            self.client.publish(subject.clone(), payload.into()).await?;
            self.client.flush().await?;
            Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
        };

        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(Ok(())) => {
                tracing::debug!("Published to {}", topic);
                Ok(())
            }
            Ok(Err(e)) => Err(BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BusError::Timeout(topic.to_string())),
        }
    }

    async fn publish_event(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let subject = topic_to_subject(topic);
        let publish = async {
            let ack = self.jetstream.publish(subject.clone(), payload.into()).await?;
            ack.await?;
            Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
        };

        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(Ok(())) => {
                tracing::debug!("Published event to JetStream subject {}", subject);
                Ok(())
            }
            Ok(Err(e)) => Err(BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BusError::Timeout(topic.to_string())),
        }
    }
}
