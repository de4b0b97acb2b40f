//! Requests flowing through the dispatcher, handlers and in-memory bus

mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use common::{seeded_store, FakeUpstream, API_KEY};
use shopbridge::bus::{InboundMessage, MemoryBus};
use shopbridge::handlers::{register_handlers, AuthService};
use shopbridge::mapping::{FieldMapper, MappingRuleService, RuleInput};
use shopbridge::rpc::{Dispatcher, ErrorCode, ResponseEnvelope};

struct Harness {
    dispatcher: Dispatcher,
    bus: Arc<MemoryBus>,
    upstream: Arc<FakeUpstream>,
    rules: MappingRuleService,
}

fn harness(reply: Value) -> Harness {
    let store = seeded_store();
    let bus = Arc::new(MemoryBus::new());
    let upstream = FakeUpstream::ok(reply);
    let mapper = Arc::new(FieldMapper::with_store(store.clone()));

    let mut dispatcher = Dispatcher::new(bus.clone());
    register_handlers(
        &mut dispatcher,
        Arc::new(AuthService::new(store.clone())),
        upstream.clone(),
        mapper.clone(),
    );

    Harness {
        dispatcher,
        bus,
        upstream,
        rules: MappingRuleService::new(store, mapper),
    }
}

fn message(topic: &str, body: Value) -> InboundMessage {
    InboundMessage {
        topic: topic.to_string(),
        payload: serde_json::to_vec(&body).unwrap(),
    }
}

fn response(bus: &MemoryBus, request_id: &str) -> ResponseEnvelope {
    let published = bus.published_to(&format!("responses/{}", request_id));
    assert_eq!(published.len(), 1, "expected one response for {}", request_id);
    serde_json::from_slice(&published[0].payload).unwrap()
}

#[tokio::test]
async fn test_platform_scoped_request_is_mapped() {
    let h = harness(json!({"products": [{"title": "Mug", "variants": [{"price": 1500}]}]}));

    h.dispatcher
        .handle_message(
            "requests/shopee/api_request",
            &serde_json::to_vec(&json!({
                "request_id": "r-1",
                "api_key": API_KEY,
                "shop_id": "42",
                "params": {
                    "path": "/sellers/42/products",
                    "entity_type": "product",
                    "entity_key": "products"
                }
            }))
            .unwrap(),
        )
        .await;

    let response = response(&h.bus, "r-1");
    assert!(response.success);
    assert_eq!(response.request_id, "r-1");
    assert_eq!(
        response.data,
        json!({"products": [{"name": "Mug", "variant_price": 15}]})
    );
    assert_eq!(h.upstream.calls()[0].path, "/sellers/42/products");
}

#[tokio::test]
async fn test_handler_errors_are_published() {
    let h = harness(json!({}));

    h.dispatcher
        .handle_message(
            "requests/api_request",
            &serde_json::to_vec(&json!({"request_id": "r-2", "api_key": "unknown"})).unwrap(),
        )
        .await;

    let response = response(&h.bus, "r-2");
    assert!(!response.success);
    assert_eq!(response.data, Value::Null);
    assert_eq!(response.error_code(), Some(ErrorCode::Unauthorized));
}

#[tokio::test]
async fn test_rule_change_is_visible_to_next_request() {
    let h = harness(json!({"title": "Mug"}));
    let request = |id: &str| {
        message(
            "requests/shopee/api_request",
            json!({
                "request_id": id, "api_key": API_KEY,
                "params": {"path": "/x", "entity_type": "product"}
            }),
        )
    };

    let first = request("r-1");
    h.dispatcher.handle_message(&first.topic, &first.payload).await;
    assert_eq!(response(&h.bus, "r-1").data, json!({"name": "Mug"}));

    h.rules
        .upsert(RuleInput {
            platform_id: "shopee".to_string(),
            entity_type: "product".to_string(),
            source_field: "title".to_string(),
            target_field: "product_name".to_string(),
            ..Default::default()
        })
        .unwrap();

    let second = request("r-2");
    h.dispatcher.handle_message(&second.topic, &second.payload).await;
    assert_eq!(response(&h.bus, "r-2").data, json!({"product_name": "Mug"}));
}

#[tokio::test]
async fn test_run_drains_channel_in_order() {
    let h = harness(json!({"ok": true}));
    let (tx, rx) = MemoryBus::inbound_channel(8);

    tx.send(message(
        "requests/api_request",
        json!({"request_id": "a", "api_key": API_KEY, "params": {"path": "/a"}}),
    ))
    .await
    .unwrap();
    tx.send(message("requests", json!({"request_id": "dropped"})))
        .await
        .unwrap();
    tx.send(InboundMessage {
        topic: "requests/api_request".to_string(),
        payload: b"not json".to_vec(),
    })
    .await
    .unwrap();
    tx.send(message("requests/foo", json!({"request_id": "b"})))
        .await
        .unwrap();
    tx.send(message(
        "requests/api_request",
        json!({"request_id": "c", "api_key": API_KEY, "params": {"path": "/c"}}),
    ))
    .await
    .unwrap();
    drop(tx);

    let stream =
        futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|m| (m, rx)) });
    h.dispatcher.run(stream).await;

    let topics: Vec<String> = h.bus.published().into_iter().map(|p| p.topic).collect();
    assert_eq!(topics, vec!["responses/a", "responses/b", "responses/c"]);
    assert_eq!(response(&h.bus, "b").error_code(), Some(ErrorCode::UnknownAction));

    let paths: Vec<String> = h.upstream.calls().into_iter().map(|c| c.path).collect();
    assert_eq!(paths, vec!["/a", "/c"]);
}
