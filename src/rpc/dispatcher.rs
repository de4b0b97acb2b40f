//! Routes inbound request messages to handlers and publishes correlated
//! responses.
//!
//! Messages are handled one at a time: [`Dispatcher::run`] awaits each
//! handler before pulling the next message, so a slow upstream call holds
//! back the rest of the subscription.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::bus::{InboundMessage, Publisher};
use crate::rpc::envelope::{ErrorCode, RequestEnvelope, ResponseEnvelope};
use crate::rpc::topics::{parse_request_topic, response_topic};

/// Handles one action
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the response for `request`. Failures are reported inside the
    /// envelope, never as a Rust error.
    async fn handle(&self, request: &RequestEnvelope) -> ResponseEnvelope;
}

pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
    publisher: Arc<dyn Publisher>,
}

impl Dispatcher {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            handlers: HashMap::new(),
            publisher,
        }
    }

    /// Register a handler for an action. Registering the same action again
    /// replaces the earlier handler.
    pub fn register_handler(
        &mut self,
        action: impl Into<String>,
        handler: Arc<dyn RequestHandler>,
    ) {
        let action = action.into();
        if self.handlers.insert(action.clone(), handler).is_some() {
            tracing::warn!("Handler for action '{}' replaced by a later registration", action);
        } else {
            tracing::info!("Registered handler for action: {}", action);
        }
    }

    pub fn has_handler(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    /// Registered action names, sorted
    pub fn actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self.handlers.keys().cloned().collect();
        actions.sort();
        actions
    }

    /// Process messages until the stream ends
    pub async fn run<S>(&self, messages: S)
    where
        S: Stream<Item = InboundMessage> + Send,
    {
        futures::pin_mut!(messages);
        while let Some(message) = messages.next().await {
            self.handle_message(&message.topic, &message.payload).await;
        }
        tracing::info!("Request stream ended");
    }

    /// Decode, route and answer a single message
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) {
        tracing::debug!("Received message on topic: {}", topic);

        let Some(hints) = parse_request_topic(topic) else {
            tracing::warn!("Invalid topic format: {}", topic);
            return;
        };

        let mut request: RequestEnvelope = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Failed to parse message on {}: {}", topic, e);
                // No request id to correlate with, so this is refused by
                // publish_response and the message is dropped.
                self.publish_error("", ErrorCode::ParseError, "Failed to parse request message")
                    .await;
                return;
            }
        };

        if request.platform.is_empty() {
            if let Some(platform) = hints.platform {
                request.platform = platform;
            }
        }
        if request.action.is_empty() {
            request.action = hints.action;
        }

        let Some(handler) = self.handlers.get(&request.action) else {
            tracing::warn!("No handler for action: {}", request.action);
            let message = format!("Unknown action: {}", request.action);
            self.publish_error(&request.request_id, ErrorCode::UnknownAction, &message)
                .await;
            return;
        };

        let response = handler.handle(&request).await;
        self.publish_response(&request.request_id, response).await;
    }

    async fn publish_error(&self, request_id: &str, code: ErrorCode, message: &str) {
        let response = ResponseEnvelope::failure(request_id, code, message);
        self.publish_response(request_id, response).await;
    }

    /// Publish to `responses/{request_id}`, stamping the id onto the
    /// envelope. Delivery is best effort: failures are logged and dropped.
    async fn publish_response(&self, request_id: &str, mut response: ResponseEnvelope) {
        if request_id.is_empty() {
            tracing::warn!("Cannot publish response: missing request_id");
            return;
        }
        response.request_id = request_id.to_string();

        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to serialize response for {}: {}", request_id, e);
                return;
            }
        };

        let topic = response_topic(request_id);
        match self.publisher.publish_raw(&topic, payload).await {
            Ok(()) => tracing::debug!("Published response to: {}", topic),
            Err(e) => tracing::error!("Failed to publish response: {}", e),
        }
    }
}
