//! In-process store, optionally seeded from a YAML file.
//!
//! ```yaml
//! mappings:
//!   - platform_id: shopee
//!     entity_type: product
//!     source_field: variants.0.price
//!     target_field: variant_price
//!     transform: cents_to_dollars
//! trusted_services:
//!   - api_key: shopee-key-123
//!     name: shopee-sync
//!     allowed_actions: ["*"]
//! ```

use std::fs;
use std::path::Path;
use std::sync::RwLock;

use chrono::Utc;
use indexmap::IndexMap;
use serde::Deserialize;
use uuid::Uuid;

use super::{
    MappingRule, MappingRuleStore, NewMappingRule, RuleFilter, StoreError, Token, TokenStore,
    TrustedService, TrustedServiceStore,
};

/// Records loaded from a seed file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub mappings: Vec<NewMappingRule>,
    #[serde(default)]
    pub trusted_services: Vec<TrustedService>,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

impl SeedData {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| StoreError::Seed(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| StoreError::Seed(format!("{}: {}", path.display(), e)))
    }
}

#[derive(Default)]
struct Tables {
    /// Keyed by rule id; iteration order is insertion order
    rules: IndexMap<String, MappingRule>,
    services: IndexMap<String, TrustedService>,
    tokens: IndexMap<String, Token>,
}

/// Store keeping every table in memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding the seed's records
    pub fn from_seed(seed: SeedData) -> Result<Self, StoreError> {
        let store = Self::new();
        for rule in seed.mappings {
            store.upsert(rule)?;
        }
        for service in seed.trusted_services {
            store.add_trusted_service(service)?;
        }
        for token in seed.tokens {
            store.save(token)?;
        }
        Ok(store)
    }

    pub fn add_trusted_service(&self, mut service: TrustedService) -> Result<(), StoreError> {
        if service.id.is_empty() {
            service.id = Uuid::new_v4().to_string();
        }
        let mut tables = self.write()?;
        tables.services.insert(service.api_key.clone(), service);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl MappingRuleStore for MemoryStore {
    fn find_active(
        &self,
        platform_id: &str,
        entity_type: &str,
    ) -> Result<Vec<MappingRule>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .rules
            .values()
            .filter(|r| r.active && r.platform_id == platform_id && r.entity_type == entity_type)
            .cloned()
            .collect())
    }

    fn list(&self, filter: &RuleFilter) -> Result<Vec<MappingRule>, StoreError> {
        let tables = self.read()?;
        Ok(tables.rules.values().filter(|r| filter.matches(r)).cloned().collect())
    }

    fn upsert(&self, rule: NewMappingRule) -> Result<MappingRule, StoreError> {
        let mut tables = self.write()?;

        let existing = tables.rules.values_mut().find(|r| {
            let key = (
                r.platform_id.as_str(),
                r.entity_type.as_str(),
                r.source_field_path.as_str(),
            );
            key == rule.key()
        });

        if let Some(stored) = existing {
            stored.target_field_path = rule.target_field_path;
            stored.transform = rule.transform;
            stored.active = rule.active;
            return Ok(stored.clone());
        }

        let stored = MappingRule {
            id: Uuid::new_v4().to_string(),
            platform_id: rule.platform_id,
            entity_type: rule.entity_type,
            source_field_path: rule.source_field_path,
            target_field_path: rule.target_field_path,
            transform: rule.transform,
            active: rule.active,
            created_at: Utc::now(),
        };
        tables.rules.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        tables
            .rules
            .shift_remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("mapping {}", id)))
    }
}

impl TrustedServiceStore for MemoryStore {
    fn find_by_api_key(&self, api_key: &str) -> Result<Option<TrustedService>, StoreError> {
        let tables = self.read()?;
        Ok(tables.services.get(api_key).filter(|s| s.is_active).cloned())
    }
}

impl TokenStore for MemoryStore {
    fn find_by_shop_id(&self, shop_id: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.read()?.tokens.get(shop_id).cloned())
    }

    fn save(&self, mut token: Token) -> Result<Token, StoreError> {
        let mut tables = self.write()?;
        if token.id.is_empty() {
            token.id = tables
                .tokens
                .get(&token.shop_id)
                .map(|t| t.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
        }
        tables.tokens.insert(token.shop_id.clone(), token.clone());
        Ok(token)
    }
}
