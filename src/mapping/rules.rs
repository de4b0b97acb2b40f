//! Management operations over mapping rules.
//!
//! Every mutation clears the whole [`FieldMapper`] cache so the next mapping
//! call sees the store's current rule set.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::mapping::FieldMapper;
use crate::store::{MappingRule, MappingRuleStore, NewMappingRule, RuleFilter, StoreError};

pub const DEFAULT_PLATFORM: &str = "default";

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rule as submitted by an operator, before normalization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleInput {
    #[serde(default)]
    pub platform_id: String,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub source_field: String,
    #[serde(default)]
    pub target_field: String,
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl RuleInput {
    /// Trim every field, lower-case platform and entity type, and apply the
    /// platform and `is_active` defaults.
    pub fn normalize(self) -> Result<NewMappingRule, RuleError> {
        let mut platform_id = self.platform_id.trim().to_lowercase();
        if platform_id.is_empty() {
            platform_id = DEFAULT_PLATFORM.to_string();
        }
        let entity_type = self.entity_type.trim().to_lowercase();
        let source = self.source_field.trim().to_string();
        let target = self.target_field.trim().to_string();

        if entity_type.is_empty() || source.is_empty() || target.is_empty() {
            return Err(RuleError::Invalid(
                "entity_type/source_field/target_field are required".to_string(),
            ));
        }

        Ok(NewMappingRule {
            platform_id,
            entity_type,
            source_field_path: source,
            target_field_path: target,
            transform: self
                .transform
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            active: self.is_active.unwrap_or(true),
        })
    }
}

/// List, upsert and delete rules, keeping the mapper's cache coherent
#[derive(Clone)]
pub struct MappingRuleService {
    store: Arc<dyn MappingRuleStore>,
    mapper: Arc<FieldMapper>,
}

impl MappingRuleService {
    pub fn new(store: Arc<dyn MappingRuleStore>, mapper: Arc<FieldMapper>) -> Self {
        Self { store, mapper }
    }

    pub fn list(&self, filter: &RuleFilter) -> Result<Vec<MappingRule>, RuleError> {
        let filter = RuleFilter {
            platform_id: non_blank(&filter.platform_id),
            entity_type: non_blank(&filter.entity_type),
        };
        Ok(self.store.list(&filter)?)
    }

    pub fn upsert(&self, input: RuleInput) -> Result<MappingRule, RuleError> {
        let rule = input.normalize()?;
        let stored = self.store.upsert(rule)?;
        self.mapper.clear_cache();

        tracing::info!(
            "Upserted mapping {} ({}/{}: {} -> {})",
            stored.id,
            stored.platform_id,
            stored.entity_type,
            stored.source_field_path,
            stored.target_field_path
        );
        Ok(stored)
    }

    pub fn delete(&self, id: &str) -> Result<(), RuleError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(RuleError::Invalid("id is required".to_string()));
        }

        self.store.delete(id)?;
        self.mapper.clear_cache();
        tracing::info!("Deleted mapping {}", id);
        Ok(())
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}
