//! Webhook ingestion: verify a signed platform notification, map its payload
//! into the canonical schema and publish it to `orders/{event_type}`.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::bus::{BusError, Publisher};
use crate::mapping::{FieldMapper, DEFAULT_PLATFORM};
use crate::rpc::event_topic;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("shop_id is required in payload")]
    MissingShopId,

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Publish(#[from] BusError),
}

/// Body posted to the webhook endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Message published for every accepted webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event_type: String,
    pub timestamp: String,
    pub platform: String,
    pub shop_id: String,
    pub data: Map<String, Value>,
}

impl EventMessage {
    pub fn new(event_type: &str, platform: &str, shop_id: &str, data: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            platform: platform.to_string(),
            shop_id: shop_id.to_string(),
            data,
        }
    }
}

pub struct WebhookService {
    secret: String,
    publisher: Arc<dyn Publisher>,
    mapper: Arc<FieldMapper>,
}

impl WebhookService {
    pub fn new(
        secret: impl Into<String>,
        publisher: Arc<dyn Publisher>,
        mapper: Arc<FieldMapper>,
    ) -> Self {
        Self {
            secret: secret.into(),
            publisher,
            mapper,
        }
    }

    /// Check a hex HMAC-SHA256 signature of `payload`. Always false when no
    /// secret is configured.
    pub fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        match sign(&self.secret, payload) {
            Some(expected) => signature.as_bytes().ct_eq(expected.as_bytes()).into(),
            None => false,
        }
    }

    /// Map and publish one notification
    pub async fn process_webhook(
        &self,
        event_type: &str,
        data: Map<String, Value>,
    ) -> Result<EventMessage, WebhookError> {
        let platform_id = data
            .get("platform")
            .and_then(Value::as_str)
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PLATFORM.to_string());

        let shop_id = ["store_id", "shop_id"]
            .iter()
            .filter_map(|key| data.get(*key).and_then(Value::as_str))
            .find(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(WebhookError::MissingShopId)?;

        let entity_type = infer_entity_type(event_type, &data);
        let mapped = match entity_type.as_deref() {
            Some(entity_type) => match self.mapper.transform(&platform_id, entity_type, &data) {
                Ok(mapped) => mapped,
                Err(e) => {
                    tracing::warn!(
                        "Mapping failed (platform={} entity={}), using raw payload: {}",
                        platform_id,
                        entity_type,
                        e
                    );
                    data
                }
            },
            None => data,
        };

        let message = EventMessage::new(event_type, &platform_id, &shop_id, mapped);
        let topic = event_topic(event_type);
        self.publisher
            .publish_event(&topic, serde_json::to_vec(&message)?)
            .await?;

        tracing::info!("Published {} for shop {} to {}", event_type, shop_id, topic);
        Ok(message)
    }
}

/// Hex HMAC-SHA256 of `payload`, or `None` for an empty secret
pub fn sign(secret: &str, payload: &[u8]) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Entity type for mapping: `data.entity_type` when present, else the event
/// type up to its first `.` or `_`.
pub fn infer_entity_type(event_type: &str, data: &Map<String, Value>) -> Option<String> {
    if let Some(explicit) = data.get("entity_type").and_then(Value::as_str) {
        let explicit = explicit.trim();
        if !explicit.is_empty() {
            return Some(explicit.to_lowercase());
        }
    }

    let normalized = event_type.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    let prefix = if normalized.contains('.') {
        normalized.split('.').next()
    } else {
        normalized.split('_').next()
    };
    prefix.map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::store::{MemoryStore, MappingRuleStore, NewMappingRule};
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn service(secret: &str) -> (WebhookService, Arc<MemoryBus>, Arc<MemoryStore>) {
        let bus = Arc::new(MemoryBus::new());
        let store = Arc::new(MemoryStore::new());
        let mapper = Arc::new(FieldMapper::with_store(store.clone()));
        (WebhookService::new(secret, bus.clone(), mapper), bus, store)
    }

    #[test]
    fn test_verify_signature() {
        let (service, _, _) = service("s3cret");
        let body = br#"{"event_type":"order.created"}"#;
        let signature = sign("s3cret", body).unwrap();

        assert!(service.verify_signature(body, &signature));
        assert!(!service.verify_signature(body, "deadbeef"));
        assert!(!service.verify_signature(b"tampered", &signature));
    }

    #[test]
    fn test_empty_secret_rejects_everything() {
        let (service, _, _) = service("");

        assert!(sign("", b"x").is_none());
        assert!(!service.verify_signature(b"x", ""));
    }

    #[test]
    fn test_infer_entity_type() {
        let empty = Map::new();

        assert_eq!(infer_entity_type("order.created", &empty).as_deref(), Some("order"));
        assert_eq!(infer_entity_type("Product_Updated", &empty).as_deref(), Some("product"));
        assert_eq!(infer_entity_type("refund", &empty).as_deref(), Some("refund"));
        assert_eq!(infer_entity_type("  ", &empty), None);

        let explicit = object(json!({"entity_type": " Product "}));
        assert_eq!(infer_entity_type("order.created", &explicit).as_deref(), Some("product"));
    }

    #[tokio::test]
    async fn test_process_webhook_maps_and_publishes() {
        let (service, bus, store) = service("s");
        store
            .upsert(NewMappingRule {
                platform_id: "shopee".to_string(),
                entity_type: "order".to_string(),
                source_field_path: "total".to_string(),
                target_field_path: "amount".to_string(),
                transform: None,
                active: true,
            })
            .unwrap();

        let data = object(json!({"platform": " Shopee ", "store_id": "42", "total": 10}));
        let message = service.process_webhook("order.created", data).await.unwrap();

        assert_eq!(message.platform, "shopee");
        assert_eq!(message.shop_id, "42");
        assert_eq!(Value::Object(message.data), json!({"amount": 10}));

        let published = bus.published_to("orders/order.created");
        assert_eq!(published.len(), 1);
        assert!(published[0].event);
        assert_eq!(published[0].json()["event_type"], json!("order.created"));
    }

    #[tokio::test]
    async fn test_shop_id_fallback_and_default_platform() {
        let (service, _, _) = service("s");

        let message = service
            .process_webhook("product_updated", object(json!({"shop_id": "7", "title": "x"})))
            .await
            .unwrap();

        assert_eq!(message.platform, "default");
        assert_eq!(message.shop_id, "7");
        // No rules for the pair: payload passes through
        assert_eq!(message.data["title"], json!("x"));
    }

    #[tokio::test]
    async fn test_missing_shop_id() {
        let (service, bus, _) = service("s");

        let result = service.process_webhook("order.created", object(json!({"x": 1}))).await;

        assert!(matches!(result, Err(WebhookError::MissingShopId)));
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_reported() {
        let (service, bus, _) = service("s");
        bus.set_failing(true);

        let result = service
            .process_webhook("order.created", object(json!({"store_id": "1"})))
            .await;

        assert!(matches!(result, Err(WebhookError::Publish(_))));
    }
}
