//! Rule-driven conversion between the canonical schema and platform schemas.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::mapping::path::FieldPath;
use crate::store::{MappingRule, MappingRuleStore, StoreError};
use crate::transform_registry::TransformRegistry;

/// Errors from resolving a rule set
#[derive(Debug, Error)]
pub enum MapperError {
    #[error("failed to load mapping rules for {platform_id}/{entity_type}: {source}")]
    Store {
        platform_id: String,
        entity_type: String,
        #[source]
        source: StoreError,
    },

    #[error("mapping cache lock poisoned")]
    Poisoned,
}

type RuleSet = Arc<[MappingRule]>;

/// Rule sets keyed by (platform, entity type).
///
/// Populated lazily and dropped wholesale by [`MappingCache::clear`]. The
/// configured TTL is recorded but not consulted: entries live until the
/// next clear.
///
/// Every clear bumps a generation counter. A rule set fetched before a
/// clear is not stored after it, so a lookup racing a rule change can never
/// leave the old set cached.
pub struct MappingCache {
    state: RwLock<CacheState>,
    ttl: Duration,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<(String, String), RuleSet>,
    generation: u64,
}

impl MappingCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached rule set, plus the generation it was looked up in
    fn get(
        &self,
        platform_id: &str,
        entity_type: &str,
    ) -> Result<(Option<RuleSet>, u64), MapperError> {
        let state = self.state.read().map_err(|_| MapperError::Poisoned)?;
        let rules = state
            .entries
            .get(&(platform_id.to_string(), entity_type.to_string()))
            .cloned();
        Ok((rules, state.generation))
    }

    /// Store a rule set fetched during `generation`. Returns `false` when a
    /// clear happened since, in which case nothing is stored.
    fn insert(
        &self,
        platform_id: &str,
        entity_type: &str,
        rules: RuleSet,
        generation: u64,
    ) -> Result<bool, MapperError> {
        let mut state = self.state.write().map_err(|_| MapperError::Poisoned)?;
        if state.generation != generation {
            return Ok(false);
        }
        state
            .entries
            .insert((platform_id.to_string(), entity_type.to_string()), rules);
        Ok(true)
    }

    pub fn clear(&self) {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.entries.clear();
        state.generation = state.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MappingCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

/// Applies mapping rule sets to JSON objects in either direction
pub struct FieldMapper {
    store: Arc<dyn MappingRuleStore>,
    cache: Arc<MappingCache>,
    registry: Arc<TransformRegistry>,
}

impl FieldMapper {
    pub fn new(
        store: Arc<dyn MappingRuleStore>,
        cache: Arc<MappingCache>,
        registry: Arc<TransformRegistry>,
    ) -> Self {
        Self { store, cache, registry }
    }

    /// Mapper with a default cache and the built-in transforms
    pub fn with_store(store: Arc<dyn MappingRuleStore>) -> Self {
        Self::new(
            store,
            Arc::new(MappingCache::default()),
            Arc::new(TransformRegistry::builtin()),
        )
    }

    /// Convert canonical data into the platform's shape.
    ///
    /// With no rules for the pair the input comes back unchanged. Otherwise
    /// the output holds only the fields rules produced; rules whose source
    /// path does not resolve are skipped.
    pub fn transform(
        &self,
        platform_id: &str,
        entity_type: &str,
        data: &Map<String, Value>,
    ) -> Result<Map<String, Value>, MapperError> {
        let rules = self.rules_for(platform_id, entity_type)?;
        if rules.is_empty() {
            return Ok(data.clone());
        }

        let mut result = Map::new();
        for rule in rules.iter() {
            let source = FieldPath::parse(&rule.source_field_path);
            let Some(value) = source.read_from(data) else {
                continue;
            };

            let value = match rule.transform.as_deref().filter(|t| !t.is_empty()) {
                Some(name) => self.registry.apply(name, value),
                None => value.clone(),
            };
            FieldPath::parse(&rule.target_field_path).write_into(&mut result, value);
        }

        Ok(result)
    }

    /// Convert platform-shaped data back to the canonical schema, reading
    /// each rule's target path and writing its source path through the
    /// transform's inverse.
    pub fn reverse_transform(
        &self,
        platform_id: &str,
        entity_type: &str,
        data: &Map<String, Value>,
    ) -> Result<Map<String, Value>, MapperError> {
        let rules = self.rules_for(platform_id, entity_type)?;
        if rules.is_empty() {
            return Ok(data.clone());
        }

        let mut result = Map::new();
        for rule in rules.iter() {
            let target = FieldPath::parse(&rule.target_field_path);
            let Some(value) = target.read_from(data) else {
                continue;
            };

            let value = match rule.transform.as_deref().filter(|t| !t.is_empty()) {
                Some(name) => self.registry.apply_inverse(name, value),
                None => value.clone(),
            };
            FieldPath::parse(&rule.source_field_path).write_into(&mut result, value);
        }

        Ok(result)
    }

    /// Transform serialized JSON
    pub fn transform_json(
        &self,
        platform_id: &str,
        entity_type: &str,
        json: &[u8],
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        let data: Map<String, Value> = serde_json::from_slice(json)?;
        let result = self.transform(platform_id, entity_type, &data)?;
        Ok(serde_json::to_vec(&result)?)
    }

    /// Drop every cached rule set
    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::debug!("Mapping cache cleared");
    }

    pub fn cache(&self) -> &MappingCache {
        &self.cache
    }

    fn rules_for(&self, platform_id: &str, entity_type: &str) -> Result<RuleSet, MapperError> {
        let (cached, generation) = self.cache.get(platform_id, entity_type)?;
        if let Some(rules) = cached {
            return Ok(rules);
        }

        let rules: RuleSet = self
            .store
            .find_active(platform_id, entity_type)
            .map_err(|source| MapperError::Store {
                platform_id: platform_id.to_string(),
                entity_type: entity_type.to_string(),
                source,
            })?
            .into();

        tracing::debug!(
            "Loaded {} mapping rules for {}/{}",
            rules.len(),
            platform_id,
            entity_type
        );
        if !self
            .cache
            .insert(platform_id, entity_type, rules.clone(), generation)?
        {
            tracing::debug!(
                "Mapping cache cleared while loading {}/{}, not caching",
                platform_id,
                entity_type
            );
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingRuleService, RuleInput};
    use crate::store::{MemoryStore, NewMappingRule, RuleFilter};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    fn rule(source: &str, target: &str, transform: Option<&str>) -> NewMappingRule {
        NewMappingRule {
            platform_id: "shopee".to_string(),
            entity_type: "product".to_string(),
            source_field_path: source.to_string(),
            target_field_path: target.to_string(),
            transform: transform.map(String::from),
            active: true,
        }
    }

    fn mapper_with(rules: Vec<NewMappingRule>) -> (Arc<MemoryStore>, FieldMapper) {
        let store = Arc::new(MemoryStore::new());
        for r in rules {
            store.upsert(r).unwrap();
        }
        let mapper = FieldMapper::with_store(store.clone());
        (store, mapper)
    }

    /// Counts store fetches
    struct CountingStore {
        inner: MemoryStore,
        fetches: AtomicUsize,
    }

    impl MappingRuleStore for CountingStore {
        fn find_active(&self, p: &str, e: &str) -> Result<Vec<MappingRule>, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.find_active(p, e)
        }
        fn list(&self, f: &RuleFilter) -> Result<Vec<MappingRule>, StoreError> {
            self.inner.list(f)
        }
        fn upsert(&self, r: NewMappingRule) -> Result<MappingRule, StoreError> {
            self.inner.upsert(r)
        }
        fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete(id)
        }
    }

    struct FailingStore;

    impl MappingRuleStore for FailingStore {
        fn find_active(&self, _: &str, _: &str) -> Result<Vec<MappingRule>, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
        fn list(&self, _: &RuleFilter) -> Result<Vec<MappingRule>, StoreError> {
            Ok(Vec::new())
        }
        fn upsert(&self, _: NewMappingRule) -> Result<MappingRule, StoreError> {
            Err(StoreError::Backend("read only".to_string()))
        }
        fn delete(&self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    /// Changes the rules and clears the cache in the middle of its first
    /// fetch, after the result has already been read
    struct RacingStore {
        inner: MemoryStore,
        cache: Arc<MappingCache>,
        raced: AtomicBool,
    }

    impl MappingRuleStore for RacingStore {
        fn find_active(&self, p: &str, e: &str) -> Result<Vec<MappingRule>, StoreError> {
            let snapshot = self.inner.find_active(p, e)?;
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.upsert(rule("title", "product_name", None))?;
                self.cache.clear();
            }
            Ok(snapshot)
        }
        fn list(&self, f: &RuleFilter) -> Result<Vec<MappingRule>, StoreError> {
            self.inner.list(f)
        }
        fn upsert(&self, r: NewMappingRule) -> Result<MappingRule, StoreError> {
            self.inner.upsert(r)
        }
        fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete(id)
        }
    }

    #[test]
    fn test_identity_without_rules() {
        let (_, mapper) = mapper_with(vec![]);
        let data = object(json!({"title": "Mug", "variants": [{"price": 1500}]}));

        assert_eq!(mapper.transform("shopee", "product", &data).unwrap(), data);
        assert_eq!(mapper.reverse_transform("shopee", "product", &data).unwrap(), data);
    }

    #[test]
    fn test_variant_price_scenario() {
        let (_, mapper) = mapper_with(vec![rule(
            "variants.0.price",
            "variant_price",
            Some("cents_to_dollars"),
        )]);
        let data = object(json!({"variants": [{"price": 1500}]}));

        let result = mapper.transform("shopee", "product", &data).unwrap();
        assert_eq!(Value::Object(result), json!({"variant_price": 15}));
    }

    #[test]
    fn test_missing_source_is_omitted() {
        let (_, mapper) = mapper_with(vec![
            rule("title", "name", Some("uppercase")),
            rule("description", "body", None),
        ]);
        let data = object(json!({"title": "mug"}));

        let result = mapper.transform("shopee", "product", &data).unwrap();
        assert_eq!(Value::Object(result), json!({"name": "MUG"}));
    }

    #[test]
    fn test_reverse_transform_inverts() {
        let (_, mapper) = mapper_with(vec![
            rule("variants.0.price", "item.price", Some("cents_to_dollars")),
            rule("title", "item.name", None),
        ]);
        let platform = object(json!({"item": {"price": 15.5, "name": "Mug"}}));

        let canonical = mapper.reverse_transform("shopee", "product", &platform).unwrap();
        assert_eq!(
            Value::Object(canonical),
            json!({"variants": [{"price": 1550}], "title": "Mug"})
        );
    }

    #[test]
    fn test_transform_does_not_mutate_input() {
        let (_, mapper) = mapper_with(vec![rule("a.b", "c", None)]);
        let data = object(json!({"a": {"b": 1}}));
        let before = data.clone();

        mapper.transform("shopee", "product", &data).unwrap();
        assert_eq!(data, before);
    }

    #[test]
    fn test_rules_are_cached_until_cleared() {
        let counting = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            fetches: AtomicUsize::new(0),
        });
        counting.upsert(rule("title", "name", None)).unwrap();
        let mapper = FieldMapper::with_store(counting.clone());
        let data = object(json!({"title": "Mug", "sku": "M-1"}));

        mapper.transform("shopee", "product", &data).unwrap();
        mapper.transform("shopee", "product", &data).unwrap();
        assert_eq!(counting.fetches.load(Ordering::SeqCst), 1);

        counting.upsert(rule("sku", "code", None)).unwrap();
        let stale = mapper.transform("shopee", "product", &data).unwrap();
        assert_eq!(Value::Object(stale), json!({"name": "Mug"}));

        mapper.clear_cache();
        let fresh = mapper.transform("shopee", "product", &data).unwrap();
        assert_eq!(Value::Object(fresh), json!({"name": "Mug", "code": "M-1"}));
        assert_eq!(counting.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_rule_sets_are_cached() {
        let (_, mapper) = mapper_with(vec![]);

        mapper.transform("amazon", "seller", &Map::new()).unwrap();
        assert_eq!(mapper.cache().len(), 1);
        mapper.clear_cache();
        assert!(mapper.cache().is_empty());
    }

    #[test]
    fn test_store_failure_surfaces_as_error() {
        let mapper = FieldMapper::with_store(Arc::new(FailingStore));

        let err = mapper.transform("shopee", "product", &Map::new()).unwrap_err();
        assert!(matches!(err, MapperError::Store { .. }));
    }

    #[test]
    fn test_transform_json() {
        let (_, mapper) = mapper_with(vec![rule("title", "name", None)]);

        let out = mapper
            .transform_json("shopee", "product", br#"{"title":"Mug"}"#)
            .unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&out).unwrap(), json!({"name": "Mug"}));
    }

    #[test]
    fn test_clear_during_fetch_does_not_cache_old_rules() {
        let cache = Arc::new(MappingCache::default());
        let store = Arc::new(RacingStore {
            inner: MemoryStore::new(),
            cache: cache.clone(),
            raced: AtomicBool::new(false),
        });
        store.upsert(rule("title", "name", None)).unwrap();
        let mapper = FieldMapper::new(store, cache, Arc::new(TransformRegistry::builtin()));
        let data = object(json!({"title": "Mug"}));

        // The racing lookup itself sees the set it fetched
        let during = mapper.transform("shopee", "product", &data).unwrap();
        assert_eq!(Value::Object(during), json!({"name": "Mug"}));
        assert!(mapper.cache().is_empty());

        let next = mapper.transform("shopee", "product", &data).unwrap();
        assert_eq!(Value::Object(next), json!({"product_name": "Mug"}));
    }

    #[test]
    fn test_concurrent_lookups_with_rule_changes() {
        let store = Arc::new(MemoryStore::new());
        store.upsert(rule("title", "name_0", None)).unwrap();
        let mapper = Arc::new(FieldMapper::with_store(store.clone()));
        let rules = MappingRuleService::new(store, mapper.clone());
        let data = object(json!({"title": "Mug"}));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let mapped = mapper.transform("shopee", "product", &data).unwrap();
                        assert_eq!(mapped.len(), 1);
                        assert_eq!(mapped.values().next(), Some(&json!("Mug")));
                    }
                });
            }
            scope.spawn(|| {
                for i in 1..=50 {
                    rules
                        .upsert(RuleInput {
                            platform_id: "shopee".to_string(),
                            entity_type: "product".to_string(),
                            source_field: "title".to_string(),
                            target_field: format!("name_{}", i),
                            ..RuleInput::default()
                        })
                        .unwrap();
                }
            });
        });

        let after = mapper.transform("shopee", "product", &data).unwrap();
        assert_eq!(Value::Object(after), json!({"name_50": "Mug"}));
    }

    #[test]
    fn test_cache_ttl_is_recorded() {
        let cache = MappingCache::new(Duration::from_secs(30));

        assert_eq!(cache.ttl(), Duration::from_secs(30));
    }
}
