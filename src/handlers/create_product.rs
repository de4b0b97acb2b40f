//! Creates a product upstream from a platform-shaped payload.
//!
//! Params:
//! - `product` (required): product object
//! - `entity_type`: when set, `product` is reverse-mapped to the canonical
//!   schema before it is forwarded

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{resolve_platform_id, AuthService, CREATE_PRODUCT_ACTION};
use crate::mapping::FieldMapper;
use crate::rpc::{ErrorCode, RequestEnvelope, RequestHandler, ResponseEnvelope};
use crate::upstream::UpstreamApi;

pub struct CreateProductHandler {
    auth: Arc<AuthService>,
    upstream: Arc<dyn UpstreamApi>,
    mapper: Arc<FieldMapper>,
}

impl CreateProductHandler {
    pub fn new(
        auth: Arc<AuthService>,
        upstream: Arc<dyn UpstreamApi>,
        mapper: Arc<FieldMapper>,
    ) -> Self {
        Self { auth, upstream, mapper }
    }
}

#[async_trait]
impl RequestHandler for CreateProductHandler {
    async fn handle(&self, request: &RequestEnvelope) -> ResponseEnvelope {
        let id = request.request_id.as_str();

        if let Err(e) = self.auth.authorize(&request.api_key, CREATE_PRODUCT_ACTION) {
            return ResponseEnvelope::failure(id, e.code(), e.to_string());
        }

        let Some(product) = request.param_object("product") else {
            return ResponseEnvelope::failure(
                id,
                ErrorCode::BadRequest,
                "product data is required in params",
            );
        };

        let mut product = product.clone();
        if let Some(entity_type) = request.param_str("entity_type") {
            let platform_id = resolve_platform_id(request);
            match self.mapper.reverse_transform(&platform_id, entity_type, &product) {
                Ok(canonical) => product = canonical,
                Err(e) => tracing::warn!("Reverse mapping error, forwarding raw product: {}", e),
            }
        }

        let path = format!("/sellers/{}/products", request.shop_id);
        let body = Value::Object(product);
        match self.upstream.request("POST", &path, &request.shop_id, Some(&body)).await {
            Ok(result) => ResponseEnvelope::success(id, Value::Object(result)),
            Err(e) => {
                tracing::error!("Create product error: {}", e);
                ResponseEnvelope::failure(id, ErrorCode::ApiError, e.to_string())
            }
        }
    }
}
