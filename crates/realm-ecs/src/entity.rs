//! Entity records and id generation.
//!
//! An [`Entity`] is a string id, a type name, and a bag of named components.
//! Component data is opaque structured JSON; the runtime never interprets it
//! except for the `position.realm` / `position.city` fields used by the
//! store's secondary indices.
//!
//! Ids come from an [`IdGenerator`]. The default
//! [`TimestampIdGenerator`] combines the entity type, the creation time, and a
//! monotonically increasing counter. Tests swap in a
//! [`SequentialIdGenerator`] for reproducible ids.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Component bag: component name -> structured data.
///
/// `BTreeMap` keeps serialization order deterministic.
pub type Components = BTreeMap<String, serde_json::Value>;

/// Name of the component whose `realm` / `city` fields are indexed.
pub const POSITION_COMPONENT: &str = "position";

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A globally unique entity identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap an id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// An entity: id, type, and named component data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique id. Never reused while the owning store is live.
    pub id: EntityId,
    /// Entity type name (e.g. `"npc"`, `"item"`).
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Component name -> component data.
    #[serde(default)]
    pub components: Components,
}

impl Entity {
    /// Create an entity with no components.
    pub fn new(id: impl Into<EntityId>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            components: Components::new(),
        }
    }

    /// Builder-style component insertion.
    pub fn with_component(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.components.insert(name.into(), value);
        self
    }

    /// Component data by name.
    pub fn component(&self, name: &str) -> Option<&serde_json::Value> {
        self.components.get(name)
    }

    /// Mutable component data by name.
    pub fn component_mut(&mut self, name: &str) -> Option<&mut serde_json::Value> {
        self.components.get_mut(name)
    }

    /// Whether the entity carries the named component.
    pub fn has_component(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// `position.realm`, if the position component has a string realm.
    pub fn realm(&self) -> Option<&str> {
        self.position_field("realm")
    }

    /// `position.city`, if the position component has a string city.
    pub fn city(&self) -> Option<&str> {
        self.position_field("city")
    }

    fn position_field(&self, field: &str) -> Option<&str> {
        self.components
            .get(POSITION_COMPONENT)?
            .get(field)?
            .as_str()
    }
}

// ---------------------------------------------------------------------------
// IdGenerator
// ---------------------------------------------------------------------------

/// Produces fresh entity ids.
pub trait IdGenerator {
    /// Return the next id for an entity of `entity_type`.
    fn next_id(&mut self, entity_type: &str) -> EntityId;
}

impl<F> IdGenerator for F
where
    F: FnMut(&str) -> EntityId,
{
    fn next_id(&mut self, entity_type: &str) -> EntityId {
        self(entity_type)
    }
}

/// Default generator: `"{type}_{unix_millis}_{counter}"`.
///
/// The counter never decreases, so two ids generated within the same
/// millisecond still differ.
#[derive(Debug, Default)]
pub struct TimestampIdGenerator {
    counter: u64,
}

impl TimestampIdGenerator {
    /// Create a generator whose counter starts at zero.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for TimestampIdGenerator {
    fn next_id(&mut self, entity_type: &str) -> EntityId {
        self.counter += 1;
        EntityId(format!(
            "{entity_type}_{}_{}",
            unix_millis(),
            self.counter
        ))
    }
}

/// Deterministic generator: `"{prefix}-1"`, `"{prefix}-2"`, ...
#[derive(Debug, Clone)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: u64,
}

impl SequentialIdGenerator {
    /// Create a generator that numbers ids from 1 under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&mut self, _entity_type: &str) -> EntityId {
        let id = EntityId(format!("{}-{}", self.prefix, self.next));
        self.next += 1;
        id
    }
}

/// Milliseconds since the Unix epoch (0 if the clock is before the epoch).
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
