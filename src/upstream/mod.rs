//! Calls into the commerce platform's HTTP API on behalf of a shop.

pub mod client;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::store::StoreError;

pub use client::{PlatformClient, UpstreamConfig};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("no token found for shop={0}")]
    MissingToken(String),

    #[error("failed to get token: {0}")]
    TokenStore(#[from] StoreError),

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("API error: status={status} body={body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to parse response: {0}")]
    Decode(String),
}

/// Upstream platform API scoped by shop
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Send `method path` for `shop_id`, with an optional JSON body, and
    /// decode the JSON object it returns.
    async fn request(
        &self,
        method: &str,
        path: &str,
        shop_id: &str,
        body: Option<&Value>,
    ) -> Result<Map<String, Value>, UpstreamError>;
}
