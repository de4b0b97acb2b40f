//! Records held by the adapter's stores.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Wildcard entry in [`TrustedService::allowed_actions`]
pub const ANY_ACTION: &str = "*";

/// One source-path to target-path translation directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub id: String,
    pub platform_id: String,
    pub entity_type: String,
    /// Path in the canonical schema
    #[serde(rename = "source_field")]
    pub source_field_path: String,
    /// Path in the platform schema
    #[serde(rename = "target_field")]
    pub target_field_path: String,
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(rename = "is_active", default = "default_active")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Rule contents before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMappingRule {
    pub platform_id: String,
    pub entity_type: String,
    #[serde(rename = "source_field")]
    pub source_field_path: String,
    #[serde(rename = "target_field")]
    pub target_field_path: String,
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(rename = "is_active", default = "default_active")]
    pub active: bool,
}

impl NewMappingRule {
    /// Uniqueness key: at most one rule per platform, entity type and source path
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.platform_id, &self.entity_type, &self.source_field_path)
    }
}

fn default_active() -> bool {
    true
}

/// Equality filters for listing rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RuleFilter {
    #[serde(default)]
    pub platform_id: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
}

impl RuleFilter {
    pub fn matches(&self, rule: &MappingRule) -> bool {
        self.platform_id.as_deref().map_or(true, |p| p == rule.platform_id)
            && self.entity_type.as_deref().map_or(true, |e| e == rule.entity_type)
    }
}

/// An authorized caller identified by its API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedService {
    #[serde(default)]
    pub id: String,
    pub api_key: String,
    pub name: String,
    #[serde(default)]
    pub allowed_actions: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl TrustedService {
    /// A service may perform an action iff it is active and the action, or
    /// the `*` wildcard, is in its allow-list.
    pub fn can_perform(&self, action: &str) -> bool {
        self.is_active
            && self
                .allowed_actions
                .iter()
                .any(|allowed| allowed == action || allowed == ANY_ACTION)
    }
}

/// Upstream access credentials for one shop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub id: String,
    pub shop_id: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    /// Tokens are refreshed this long before they expire
    pub const REFRESH_MARGIN_MINUTES: i64 = 5;

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn should_refresh(&self) -> bool {
        Utc::now() + Duration::minutes(Self::REFRESH_MARGIN_MINUTES) > self.expires_at
    }
}
