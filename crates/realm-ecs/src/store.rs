//! Entity storage with secondary indices.
//!
//! The [`EntityStore`] owns every live [`Entity`] and maintains four derived
//! indices:
//!
//! - by entity type,
//! - by `position.realm`,
//! - by `position.city`,
//! - by component presence (one bucket per component name).
//!
//! Every mutation goes through the store, which de-indexes the old record and
//! re-indexes the new one in full. Indices are never patched piecemeal, so
//! after any `add` / `update` / `remove` each index reflects exactly the
//! current entity set.
//!
//! Entities whose position lacks a string `realm` or `city` are simply absent
//! from that index. Queries always re-check every condition against the
//! entity itself, so the index is only used to narrow the candidate set.
//!
//! # Example
//!
//! ```
//! use realm_ecs::prelude::*;
//! use serde_json::json;
//!
//! let mut store = EntityStore::new();
//! store
//!     .add(Entity::new("guard-1", "npc").with_component(
//!         "position",
//!         json!({"realm": "north", "city": "Karth"}),
//!     ))
//!     .unwrap();
//!
//! let in_karth = store.query(&EntityQuery::new().entity_type("npc").city("Karth"));
//! assert_eq!(in_karth.len(), 1);
//! assert!(store.remove("guard-1").is_some());
//! assert!(store.by_city("Karth").is_empty());
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::entity::{Components, Entity, EntityId};
use crate::merge::deep_merge;
use crate::EcsError;

// ---------------------------------------------------------------------------
// IdSet
// ---------------------------------------------------------------------------

/// Insertion-ordered set of ids with O(1) removal.
///
/// Removal swaps the last id into the vacated slot, so order is only stable
/// while nothing is removed.
#[derive(Debug, Default, Clone)]
struct IdSet {
    order: Vec<EntityId>,
    slots: HashMap<EntityId, usize>,
}

impl IdSet {
    fn insert(&mut self, id: &EntityId) {
        if self.slots.contains_key(id) {
            return;
        }
        self.slots.insert(id.clone(), self.order.len());
        self.order.push(id.clone());
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(slot) = self.slots.remove(id) else {
            return false;
        };
        self.order.swap_remove(slot);
        if let Some(moved) = self.order.get(slot) {
            self.slots.insert(moved.clone(), slot);
        }
        true
    }

    fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.order.iter()
    }
}

/// A keyed family of [`IdSet`]s. Empty buckets are dropped.
#[derive(Debug, Default, Clone)]
struct Index {
    buckets: HashMap<String, IdSet>,
}

impl Index {
    fn insert(&mut self, key: &str, id: &EntityId) {
        self.buckets.entry(key.to_owned()).or_default().insert(id);
    }

    fn remove(&mut self, key: &str, id: &str) {
        if let Some(bucket) = self.buckets.get_mut(key) {
            bucket.remove(id);
            if bucket.is_empty() {
                self.buckets.remove(key);
            }
        }
    }

    fn get(&self, key: &str) -> Option<&IdSet> {
        self.buckets.get(key)
    }

    fn references(&self, id: &str) -> bool {
        self.buckets.values().any(|b| b.contains(id))
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

// ---------------------------------------------------------------------------
// EntityPatch
// ---------------------------------------------------------------------------

/// A partial update applied by [`EntityStore::update`].
///
/// Applied in this order: type change, component replacement, component
/// deep-merge, component removal.
#[derive(Debug, Clone, Default)]
pub struct EntityPatch {
    /// New entity type, if any.
    pub entity_type: Option<String>,
    /// Components to insert or overwrite wholesale.
    pub set: Components,
    /// Components to deep-merge into the existing value (objects merge
    /// recursively; arrays and scalars replace).
    pub merge: Components,
    /// Components to drop.
    pub remove: Vec<String>,
}

impl EntityPatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the entity type.
    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Insert or replace a component.
    pub fn set(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.set.insert(name.into(), value);
        self
    }

    /// Deep-merge into a component (inserting it when absent).
    pub fn merge(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.merge.insert(name.into(), value);
        self
    }

    /// Remove a component.
    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.remove.push(name.into());
        self
    }

    fn apply(self, entity: &mut Entity) {
        if let Some(entity_type) = self.entity_type {
            entity.entity_type = entity_type;
        }
        entity.components.extend(self.set);
        for (name, overlay) in self.merge {
            match entity.components.get_mut(&name) {
                Some(existing) => deep_merge(existing, &overlay),
                None => {
                    entity.components.insert(name, overlay);
                }
            }
        }
        for name in &self.remove {
            entity.components.remove(name);
        }
    }
}

// ---------------------------------------------------------------------------
// EntityQuery
// ---------------------------------------------------------------------------

type Predicate<'p> = Box<dyn Fn(&Entity) -> bool + 'p>;

/// Filter for [`EntityStore::query`]. All conditions are ANDed.
#[derive(Default)]
pub struct EntityQuery<'p> {
    entity_type: Option<String>,
    realm: Option<String>,
    city: Option<String>,
    with_components: Vec<String>,
    predicate: Option<Predicate<'p>>,
}

impl<'p> EntityQuery<'p> {
    /// A query matching every entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one entity type.
    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Restrict to entities whose `position.realm` equals `realm`.
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Restrict to entities whose `position.city` equals `city`.
    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Require a component. May be called repeatedly.
    pub fn with_component(mut self, name: impl Into<String>) -> Self {
        self.with_components.push(name.into());
        self
    }

    /// Arbitrary in-memory predicate, evaluated last.
    pub fn filter(mut self, predicate: impl Fn(&Entity) -> bool + 'p) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    fn matches(&self, entity: &Entity) -> bool {
        if let Some(ty) = &self.entity_type {
            if entity.entity_type != *ty {
                return false;
            }
        }
        if let Some(realm) = &self.realm {
            if entity.realm() != Some(realm.as_str()) {
                return false;
            }
        }
        if let Some(city) = &self.city {
            if entity.city() != Some(city.as_str()) {
                return false;
            }
        }
        if !self.with_components.iter().all(|c| entity.has_component(c)) {
            return false;
        }
        self.predicate.as_ref().map_or(true, |p| p(entity))
    }
}

impl fmt::Debug for EntityQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityQuery")
            .field("entity_type", &self.entity_type)
            .field("realm", &self.realm)
            .field("city", &self.city)
            .field("with_components", &self.with_components)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// IndexStats
// ---------------------------------------------------------------------------

/// Bucket counts for each secondary index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Number of distinct entity types.
    pub types: usize,
    /// Number of distinct realms.
    pub realms: usize,
    /// Number of distinct cities.
    pub cities: usize,
    /// Number of distinct component names.
    pub components: usize,
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

/// Owns entity records and keeps the secondary indices consistent.
#[derive(Debug, Default, Clone)]
pub struct EntityStore {
    entities: HashMap<EntityId, Entity>,
    /// Insertion order of the whole store.
    all: IdSet,
    by_type: Index,
    by_realm: Index,
    by_city: Index,
    by_component: Index,
}

impl EntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entity.
    ///
    /// Fails with [`EcsError::DuplicateEntity`] if the id is already live;
    /// the existing record is left untouched.
    pub fn add(&mut self, entity: Entity) -> Result<(), EcsError> {
        if self.entities.contains_key(entity.id.as_str()) {
            return Err(EcsError::DuplicateEntity {
                id: entity.id.clone(),
            });
        }
        self.index(&entity);
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    /// Look up an entity by id.
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Whether an entity with this id is live.
    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Remove an entity, returning it. Unknown ids return `None`.
    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        let entity = self.entities.remove(id)?;
        self.unindex(&entity);
        Some(entity)
    }

    /// Apply a partial update and re-index. Returns `false` for unknown ids.
    pub fn update(&mut self, id: &str, patch: EntityPatch) -> bool {
        self.update_with(id, |entity| patch.apply(entity))
    }

    /// Mutate an entity in place and re-index. Returns `false` for unknown
    /// ids.
    ///
    /// The id is restored after `f` runs; an entity cannot be renamed
    /// through this path.
    pub fn update_with(&mut self, id: &str, f: impl FnOnce(&mut Entity)) -> bool {
        let Some(mut entity) = self.entities.remove(id) else {
            debug!(entity_id = id, "update on unknown entity ignored");
            return false;
        };
        self.unindex(&entity);
        let original_id = entity.id.clone();
        f(&mut entity);
        entity.id = original_id;
        self.index(&entity);
        self.entities.insert(entity.id.clone(), entity);
        true
    }

    /// Entities matching `query`.
    ///
    /// Narrows to the smallest applicable index bucket first, then checks
    /// every condition in memory. Result order follows the chosen bucket's
    /// insertion order and is not stable across removals.
    pub fn query(&self, query: &EntityQuery<'_>) -> Vec<&Entity> {
        match self.narrowest_candidates(query) {
            Some(candidates) => candidates
                .iter()
                .filter_map(|id| self.entities.get(id.as_str()))
                .filter(|e| query.matches(e))
                .collect(),
            None => self
                .all
                .iter()
                .filter_map(|id| self.entities.get(id.as_str()))
                .filter(|e| query.matches(e))
                .collect(),
        }
    }

    /// Ids of the entities matching `query`.
    pub fn query_ids(&self, query: &EntityQuery<'_>) -> Vec<EntityId> {
        self.query(query).into_iter().map(|e| e.id.clone()).collect()
    }

    /// All entities of one type (index only).
    pub fn by_type(&self, entity_type: &str) -> Vec<&Entity> {
        self.collect_bucket(self.by_type.get(entity_type))
    }

    /// All entities carrying a component (index only).
    pub fn by_component(&self, name: &str) -> Vec<&Entity> {
        self.collect_bucket(self.by_component.get(name))
    }

    /// All entities positioned in a realm (index only).
    pub fn by_realm(&self, realm: &str) -> Vec<&Entity> {
        self.collect_bucket(self.by_realm.get(realm))
    }

    /// All entities positioned in a city (index only).
    pub fn by_city(&self, city: &str) -> Vec<&Entity> {
        self.collect_bucket(self.by_city.get(city))
    }

    /// Number of live entities.
    pub fn count(&self) -> usize {
        self.entities.len()
    }

    /// Whether the store holds no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate over every entity in insertion order (modulo removals).
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.all.iter().filter_map(|id| self.entities.get(id.as_str()))
    }

    /// Every live id.
    pub fn ids(&self) -> Vec<EntityId> {
        self.all.iter().cloned().collect()
    }

    /// Drop every entity and index entry.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.all = IdSet::default();
        self.by_type.clear();
        self.by_realm.clear();
        self.by_city.clear();
        self.by_component.clear();
    }

    /// Bucket counts per index.
    pub fn index_stats(&self) -> IndexStats {
        IndexStats {
            types: self.by_type.buckets.len(),
            realms: self.by_realm.buckets.len(),
            cities: self.by_city.buckets.len(),
            components: self.by_component.buckets.len(),
        }
    }

    /// Whether any index still references `id`. Exposed for consistency
    /// checks in tests.
    pub fn is_indexed(&self, id: &str) -> bool {
        self.all.contains(id)
            || self.by_type.references(id)
            || self.by_realm.references(id)
            || self.by_city.references(id)
            || self.by_component.references(id)
    }

    // -- internal helpers ---------------------------------------------------

    fn index(&mut self, entity: &Entity) {
        let id = &entity.id;
        self.all.insert(id);
        self.by_type.insert(&entity.entity_type, id);
        if let Some(realm) = entity.realm() {
            self.by_realm.insert(realm, id);
        }
        if let Some(city) = entity.city() {
            self.by_city.insert(city, id);
        }
        for name in entity.components.keys() {
            self.by_component.insert(name, id);
        }
    }

    fn unindex(&mut self, entity: &Entity) {
        let id = entity.id.as_str();
        self.all.remove(id);
        self.by_type.remove(&entity.entity_type, id);
        if let Some(realm) = entity.realm() {
            self.by_realm.remove(realm, id);
        }
        if let Some(city) = entity.city() {
            self.by_city.remove(city, id);
        }
        for name in entity.components.keys() {
            self.by_component.remove(name, id);
        }
    }

    fn collect_bucket(&self, bucket: Option<&IdSet>) -> Vec<&Entity> {
        bucket
            .map(|b| {
                b.iter()
                    .filter_map(|id| self.entities.get(id.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The smallest index bucket implied by the query, or `None` when the
    /// query has no indexed condition.
    fn narrowest_candidates(&self, query: &EntityQuery<'_>) -> Option<&[EntityId]> {
        const EMPTY: &[EntityId] = &[];

        let mut buckets: Vec<Option<&IdSet>> = Vec::new();
        if let Some(ty) = &query.entity_type {
            buckets.push(self.by_type.get(ty));
        }
        if let Some(realm) = &query.realm {
            buckets.push(self.by_realm.get(realm));
        }
        if let Some(city) = &query.city {
            buckets.push(self.by_city.get(city));
        }
        for name in &query.with_components {
            buckets.push(self.by_component.get(name));
        }

        buckets
            .into_iter()
            .min_by_key(|bucket| bucket.map_or(0, IdSet::len))
            .map(|bucket| bucket.map_or(EMPTY, |b| b.order.as_slice()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn npc(id: &str, realm: &str, city: &str) -> Entity {
        Entity::new(id, "npc")
            .with_component("position", json!({"realm": realm, "city": city}))
            .with_component("stats", json!({"health": 10, "maxHealth": 10}))
    }

    fn ids(entities: &[&Entity]) -> Vec<String> {
        let mut v: Vec<String> = entities.iter().map(|e| e.id.to_string()).collect();
        v.sort();
        v
    }

    // -- 1. add / get / remove ----------------------------------------------

    #[test]
    fn add_then_get() {
        let mut store = EntityStore::new();
        store.add(npc("a", "north", "Karth")).unwrap();
        assert_eq!(store.count(), 1);
        assert_eq!(store.get("a").unwrap().entity_type, "npc");
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn duplicate_id_rejected_and_original_kept() {
        let mut store = EntityStore::new();
        store.add(npc("a", "north", "Karth")).unwrap();
        let err = store.add(Entity::new("a", "item")).unwrap_err();
        assert!(matches!(err, EcsError::DuplicateEntity { .. }));
        assert_eq!(store.get("a").unwrap().entity_type, "npc");
        assert_eq!(store.by_type("item").len(), 0);
    }

    #[test]
    fn remove_clears_every_index() {
        let mut store = EntityStore::new();
        store.add(npc("a", "north", "Karth")).unwrap();
        store.add(npc("b", "north", "Karth")).unwrap();

        let removed = store.remove("a").unwrap();
        assert_eq!(removed.id.as_str(), "a");
        assert!(!store.is_indexed("a"));
        assert_eq!(ids(&store.by_type("npc")), vec!["b"]);
        assert_eq!(ids(&store.by_realm("north")), vec!["b"]);
        assert_eq!(ids(&store.by_city("Karth")), vec!["b"]);
        assert_eq!(ids(&store.by_component("stats")), vec!["b"]);
    }

    #[test]
    fn unknown_id_operations_are_noops() {
        let mut store = EntityStore::new();
        assert!(store.remove("ghost").is_none());
        assert!(!store.update("ghost", EntityPatch::new().set("x", json!(1))));
        assert!(!store.update_with("ghost", |_| {}));
        assert_eq!(store.count(), 0);
    }

    // -- 2. update re-indexes -----------------------------------------------

    #[test]
    fn update_moves_entity_between_index_buckets() {
        let mut store = EntityStore::new();
        store.add(npc("a", "north", "Karth")).unwrap();

        let moved = store.update(
            "a",
            EntityPatch::new().merge("position", json!({"city": "Vell"})),
        );
        assert!(moved);
        assert!(store.by_city("Karth").is_empty());
        assert_eq!(ids(&store.by_city("Vell")), vec!["a"]);
        // Merge kept the realm.
        assert_eq!(ids(&store.by_realm("north")), vec!["a"]);
    }

    #[test]
    fn update_type_and_components() {
        let mut store = EntityStore::new();
        store.add(npc("a", "north", "Karth")).unwrap();

        store.update(
            "a",
            EntityPatch::new()
                .entity_type("merchant")
                .set("inventory", json!({"items": []}))
                .remove("stats"),
        );

        assert!(store.by_type("npc").is_empty());
        assert_eq!(ids(&store.by_type("merchant")), vec!["a"]);
        assert!(store.by_component("stats").is_empty());
        assert_eq!(ids(&store.by_component("inventory")), vec!["a"]);
    }

    #[test]
    fn merge_replaces_arrays_and_recurses_objects() {
        let mut store = EntityStore::new();
        store
            .add(Entity::new("a", "npc").with_component(
                "stats",
                json!({"health": 5, "tags": ["a", "b"], "nested": {"x": 1, "y": 2}}),
            ))
            .unwrap();
        store.update(
            "a",
            EntityPatch::new().merge("stats", json!({"tags": ["c"], "nested": {"y": 3}})),
        );
        assert_eq!(
            store.get("a").unwrap().component("stats").unwrap(),
            &json!({"health": 5, "tags": ["c"], "nested": {"x": 1, "y": 3}})
        );
    }

    #[test]
    fn update_with_cannot_rename() {
        let mut store = EntityStore::new();
        store.add(npc("a", "north", "Karth")).unwrap();
        store.update_with("a", |e| {
            e.id = EntityId::from("b");
            e.components.remove("position");
        });
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
        assert!(store.by_realm("north").is_empty());
    }

    // -- 3. queries ---------------------------------------------------------

    #[test]
    fn query_combines_all_conditions() {
        let mut store = EntityStore::new();
        store.add(npc("a", "north", "Karth")).unwrap();
        store.add(npc("b", "north", "Vell")).unwrap();
        store.add(npc("c", "south", "Karth")).unwrap();
        store
            .add(Entity::new("d", "item").with_component("position", json!({"realm": "north", "city": "Karth"})))
            .unwrap();

        let q = EntityQuery::new().entity_type("npc").realm("north").city("Karth");
        assert_eq!(ids(&store.query(&q)), vec!["a"]);

        let q = EntityQuery::new().realm("north").with_component("stats");
        assert_eq!(ids(&store.query(&q)), vec!["a", "b"]);

        let q = EntityQuery::new()
            .entity_type("npc")
            .filter(|e| e.city() == Some("Karth"));
        assert_eq!(ids(&store.query(&q)), vec!["a", "c"]);
    }

    #[test]
    fn query_without_indexed_condition_scans_everything() {
        let mut store = EntityStore::new();
        store.add(npc("a", "north", "Karth")).unwrap();
        store.add(Entity::new("b", "item")).unwrap();
        assert_eq!(store.query(&EntityQuery::new()).len(), 2);
        let q = EntityQuery::new().filter(|e| e.entity_type == "item");
        assert_eq!(ids(&store.query(&q)), vec!["b"]);
    }

    #[test]
    fn query_on_missing_bucket_is_empty() {
        let mut store = EntityStore::new();
        store.add(npc("a", "north", "Karth")).unwrap();
        let q = EntityQuery::new().entity_type("npc").city("Nowhere");
        assert!(store.query(&q).is_empty());
    }

    #[test]
    fn incomplete_position_is_unindexed_but_still_queryable() {
        let mut store = EntityStore::new();
        store
            .add(Entity::new("a", "npc").with_component("position", json!({"realm": "north"})))
            .unwrap();
        assert!(store.index_stats().cities == 0);
        let q = EntityQuery::new().realm("north");
        assert_eq!(ids(&store.query(&q)), vec!["a"]);
        let q = EntityQuery::new().realm("north").city("Karth");
        assert!(store.query(&q).is_empty());
    }

    #[test]
    fn insertion_order_without_removals() {
        let mut store = EntityStore::new();
        for id in ["a", "b", "c", "d"] {
            store.add(npc(id, "north", "Karth")).unwrap();
        }
        let got: Vec<&str> = store.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(got, vec!["a", "b", "c", "d"]);
    }

    // -- 4. clear / stats ---------------------------------------------------

    #[test]
    fn clear_empties_store_and_indices() {
        let mut store = EntityStore::new();
        store.add(npc("a", "north", "Karth")).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.index_stats(), IndexStats::default());
        assert!(!store.is_indexed("a"));
        // Ids may be added again after a clear.
        store.add(npc("a", "north", "Karth")).unwrap();
    }

    #[test]
    fn index_stats_count_buckets() {
        let mut store = EntityStore::new();
        store.add(npc("a", "north", "Karth")).unwrap();
        store.add(npc("b", "south", "Vell")).unwrap();
        store.add(Entity::new("c", "item")).unwrap();
        assert_eq!(
            store.index_stats(),
            IndexStats {
                types: 2,
                realms: 2,
                cities: 2,
                components: 2,
            }
        );
    }
}
