//! Repositories the adapter reads mapping rules, trusted services and
//! upstream tokens from.
//!
//! The traits are synchronous; [`MemoryStore`] backs tests and seed-file
//! deployments, [`PgStore`] (feature `postgres`) backs production.

pub mod models;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use thiserror::Error;

pub use models::{MappingRule, NewMappingRule, RuleFilter, Token, TrustedService, ANY_ACTION};
pub use memory::{MemoryStore, SeedData};
#[cfg(feature = "postgres")]
pub use postgres::{Database, DatabaseConfig, PgStore};

/// Errors raised by store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("failed to load seed file: {0}")]
    Seed(String),

    #[error("database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Source of mapping rules
pub trait MappingRuleStore: Send + Sync {
    /// Active rules for one (platform, entity type) pair, in insertion order
    fn find_active(
        &self,
        platform_id: &str,
        entity_type: &str,
    ) -> Result<Vec<MappingRule>, StoreError>;

    /// All rules matching the filter, active or not
    fn list(&self, filter: &RuleFilter) -> Result<Vec<MappingRule>, StoreError>;

    /// Insert or replace the rule keyed by (platform, entity type, source path)
    fn upsert(&self, rule: NewMappingRule) -> Result<MappingRule, StoreError>;

    /// Delete a rule by id
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Source of trusted callers
pub trait TrustedServiceStore: Send + Sync {
    /// Active service owning `api_key`, if any
    fn find_by_api_key(&self, api_key: &str) -> Result<Option<TrustedService>, StoreError>;
}

/// Source of upstream access tokens
pub trait TokenStore: Send + Sync {
    fn find_by_shop_id(&self, shop_id: &str) -> Result<Option<Token>, StoreError>;

    /// Insert or replace the token for its shop, returning the stored row
    fn save(&self, token: Token) -> Result<Token, StoreError>;
}
