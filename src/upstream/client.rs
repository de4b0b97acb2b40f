//! reqwest implementation of [`UpstreamApi`] using per-shop bearer tokens.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{UpstreamApi, UpstreamError};
use crate::store::{Token, TokenStore};

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    token_type: Option<String>,
}

pub struct PlatformClient {
    config: UpstreamConfig,
    http: Client,
    tokens: Arc<dyn TokenStore>,
}

impl PlatformClient {
    pub fn new(config: UpstreamConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, UpstreamError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http, tokens })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn access_token(&self, shop_id: &str) -> Result<Token, UpstreamError> {
        let token = self
            .tokens
            .find_by_shop_id(shop_id)?
            .ok_or_else(|| UpstreamError::MissingToken(shop_id.to_string()))?;

        if token.should_refresh() {
            return self.refresh_token(token).await;
        }
        Ok(token)
    }

    async fn refresh_token(&self, mut token: Token) -> Result<Token, UpstreamError> {
        tracing::debug!("Refreshing token for shop {}", token.shop_id);

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", token.refresh_token.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(self.url("/oauth/token"))
            .form(&form)
            .send()
            .await
            .map_err(|e| UpstreamError::Refresh(e.to_string()))?;

        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Refresh(format!("status={} body={}", status, body)));
        }

        let refreshed: TokenResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Refresh(e.to_string()))?;

        token.access_token = refreshed.access_token;
        if let Some(refresh) = refreshed.refresh_token.filter(|r| !r.is_empty()) {
            token.refresh_token = refresh;
        }
        if let Some(kind) = refreshed.token_type.filter(|t| !t.is_empty()) {
            token.token_type = kind;
        }
        token.expires_at = Utc::now() + chrono::Duration::seconds(refreshed.expires_in);

        let saved = self.tokens.save(token)?;
        tracing::info!("Refreshed upstream token for shop {}", saved.shop_id);
        Ok(saved)
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        access_token: &str,
        body: Option<&Value>,
    ) -> Result<Response, UpstreamError> {
        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .bearer_auth(access_token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

#[async_trait]
impl UpstreamApi for PlatformClient {
    async fn request(
        &self,
        method: &str,
        path: &str,
        shop_id: &str,
        body: Option<&Value>,
    ) -> Result<Map<String, Value>, UpstreamError> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| UpstreamError::InvalidMethod(method.to_string()))?;

        let mut token = self.access_token(shop_id).await?;
        let mut response = self.send(&method, path, &token.access_token, body).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!("Upstream rejected token for shop {}, refreshing once", shop_id);
            token = self.refresh_token(token).await?;
            response = self.send(&method, path, &token.access_token, body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Map<String, Value>>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}
