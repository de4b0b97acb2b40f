//! Generic read proxy: forwards a call to the upstream API and maps the
//! result into the caller's platform schema.
//!
//! Params:
//! - `path` (required): upstream path, e.g. `/sellers/123/products`
//! - `method`: HTTP method, default `GET`
//! - `entity_type`: entity type used to select mapping rules
//! - `entity_key`: key of the entity array inside the upstream result

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{resolve_platform_id, AuthService, API_REQUEST_ACTION};
use crate::mapping::FieldMapper;
use crate::rpc::{ErrorCode, RequestEnvelope, RequestHandler, ResponseEnvelope};
use crate::upstream::UpstreamApi;

pub struct ApiRequestHandler {
    auth: Arc<AuthService>,
    upstream: Arc<dyn UpstreamApi>,
    mapper: Arc<FieldMapper>,
}

impl ApiRequestHandler {
    pub fn new(
        auth: Arc<AuthService>,
        upstream: Arc<dyn UpstreamApi>,
        mapper: Arc<FieldMapper>,
    ) -> Self {
        Self { auth, upstream, mapper }
    }

    fn map_entity(&self, platform_id: &str, entity_type: &str, entity: Value) -> Value {
        let Value::Object(fields) = entity else {
            return entity;
        };
        match self.mapper.transform(platform_id, entity_type, &fields) {
            Ok(mapped) => Value::Object(mapped),
            Err(e) => {
                tracing::warn!("Mapping error, passing entity through: {}", e);
                Value::Object(fields)
            }
        }
    }

    fn map_result(
        &self,
        request: &RequestEnvelope,
        mut result: Map<String, Value>,
    ) -> Map<String, Value> {
        let Some(entity_type) = request.param_str("entity_type") else {
            return result;
        };
        let platform_id = resolve_platform_id(request);

        match request.param_str("entity_key") {
            Some(entity_key) => {
                if let Some(Value::Array(entities)) = result.get_mut(entity_key) {
                    *entities = std::mem::take(entities)
                        .into_iter()
                        .map(|entity| self.map_entity(&platform_id, entity_type, entity))
                        .collect();
                }
                result
            }
            None => match self.mapper.transform(&platform_id, entity_type, &result) {
                Ok(mapped) => mapped,
                Err(e) => {
                    tracing::warn!("Mapping error, returning raw result: {}", e);
                    result
                }
            },
        }
    }
}

#[async_trait]
impl RequestHandler for ApiRequestHandler {
    async fn handle(&self, request: &RequestEnvelope) -> ResponseEnvelope {
        let id = request.request_id.as_str();

        if let Err(e) = self.auth.authorize(&request.api_key, API_REQUEST_ACTION) {
            return ResponseEnvelope::failure(id, e.code(), e.to_string());
        }

        let Some(path) = request.param_str("path") else {
            return ResponseEnvelope::failure(
                id,
                ErrorCode::BadRequest,
                "path is required in params",
            );
        };
        let method = request
            .param_str("method")
            .map(str::to_uppercase)
            .unwrap_or_else(|| "GET".to_string());

        let result = match self.upstream.request(&method, path, &request.shop_id, None).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("API request error: {}", e);
                return ResponseEnvelope::failure(id, ErrorCode::ApiError, e.to_string());
            }
        };

        ResponseEnvelope::success(id, Value::Object(self.map_result(request, result)))
    }
}
