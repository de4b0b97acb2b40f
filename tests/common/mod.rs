//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use shopbridge::store::{MappingRuleStore, MemoryStore, NewMappingRule, TrustedService};
use shopbridge::upstream::{UpstreamApi, UpstreamError};

pub const API_KEY: &str = "svc-key";
pub const READ_ONLY_KEY: &str = "read-only-key";

/// One call seen by [`FakeUpstream`]
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamCall {
    pub method: String,
    pub path: String,
    pub shop_id: String,
    pub body: Option<Value>,
}

/// Upstream that answers every call with a canned result
pub struct FakeUpstream {
    reply: Result<Value, (u16, String)>,
    calls: Mutex<Vec<UpstreamCall>>,
}

impl FakeUpstream {
    pub fn ok(reply: Value) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err((status, body.to_string())),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<UpstreamCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamApi for FakeUpstream {
    async fn request(
        &self,
        method: &str,
        path: &str,
        shop_id: &str,
        body: Option<&Value>,
    ) -> Result<Map<String, Value>, UpstreamError> {
        self.calls.lock().unwrap().push(UpstreamCall {
            method: method.to_string(),
            path: path.to_string(),
            shop_id: shop_id.to_string(),
            body: body.cloned(),
        });

        match &self.reply {
            Ok(Value::Object(map)) => Ok(map.clone()),
            Ok(other) => Err(UpstreamError::Decode(format!("not an object: {}", other))),
            Err((status, body)) => Err(UpstreamError::Status {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}

pub fn rule(
    platform: &str,
    entity: &str,
    source: &str,
    target: &str,
    transform: Option<&str>,
) -> NewMappingRule {
    NewMappingRule {
        platform_id: platform.to_string(),
        entity_type: entity.to_string(),
        source_field_path: source.to_string(),
        target_field_path: target.to_string(),
        transform: transform.map(str::to_string),
        active: true,
    }
}

/// Store with one all-powerful service, one limited to `api_request`, and
/// a couple of shopee product rules
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store
        .add_trusted_service(TrustedService {
            id: String::new(),
            api_key: API_KEY.to_string(),
            name: "catalog-sync".to_string(),
            allowed_actions: vec!["*".to_string()],
            is_active: true,
        })
        .unwrap();
    store
        .add_trusted_service(TrustedService {
            id: String::new(),
            api_key: READ_ONLY_KEY.to_string(),
            name: "reporting".to_string(),
            allowed_actions: vec!["api_request".to_string()],
            is_active: true,
        })
        .unwrap();

    store.upsert(rule("shopee", "product", "title", "name", None)).unwrap();
    store
        .upsert(rule(
            "shopee",
            "product",
            "variants.0.price",
            "variant_price",
            Some("cents_to_dollars"),
        ))
        .unwrap();
    Arc::new(store)
}
