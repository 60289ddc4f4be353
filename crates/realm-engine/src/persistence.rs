//! The persistence collaborator contract.
//!
//! The runtime does not implement durable storage. It talks to one through
//! the [`Persistence`] trait, and only from world initialization, save, and
//! load: never from inside a tick. [`MemoryPersistence`] is the in-memory
//! implementation used by headless harnesses and tests.

use std::collections::BTreeMap;

use realm_ecs::entity::{unix_millis, Entity, EntityId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::snapshot::{SaveRecord, SaveSummary};
use crate::PersistenceError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One line of in-game chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub speaker: String,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl ChatMessage {
    /// A message stamped with the current time.
    pub fn now(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            timestamp: unix_millis(),
        }
    }
}

/// Standing between two entities. Symmetric: `(a, b)` and `(b, a)` name
/// the same relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// The lexicographically smaller id.
    pub a: EntityId,
    pub b: EntityId,
    pub score: f64,
    pub updated_at: u64,
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Storage backend for entities, saves, chat, and relationships.
pub trait Persistence {
    fn load_entities(&self) -> Result<Vec<Entity>, PersistenceError>;
    fn entities_by_type(&self, entity_type: &str) -> Result<Vec<Entity>, PersistenceError>;
    fn entities_by_realm(&self, realm: &str) -> Result<Vec<Entity>, PersistenceError>;
    fn entities_by_city(&self, city: &str) -> Result<Vec<Entity>, PersistenceError>;

    /// Insert or replace entities by id. Returns how many were written.
    fn bulk_put_entities(&mut self, entities: &[Entity]) -> Result<usize, PersistenceError>;
    fn clear_entities(&mut self) -> Result<(), PersistenceError>;

    fn put_save(&mut self, save: SaveRecord) -> Result<(), PersistenceError>;
    fn get_save(&self, id: &str) -> Result<Option<SaveRecord>, PersistenceError>;
    /// Every save, oldest first.
    fn all_saves(&self) -> Result<Vec<SaveSummary>, PersistenceError>;

    fn add_chat_message(&mut self, message: ChatMessage) -> Result<(), PersistenceError>;
    /// The most recent `limit` messages, oldest first.
    fn recent_chat(&self, limit: usize) -> Result<Vec<ChatMessage>, PersistenceError>;

    fn relationship(&self, a: &str, b: &str) -> Result<Option<Relationship>, PersistenceError>;
    /// Add `delta` to the pair's score, creating it at zero first if needed.
    fn update_relationship(
        &mut self,
        a: &str,
        b: &str,
        delta: f64,
    ) -> Result<Relationship, PersistenceError>;

    /// Release the backend. Calls after `close` fail with
    /// [`PersistenceError::Closed`]; closing twice is allowed.
    fn close(&mut self) -> Result<(), PersistenceError>;
}

// ---------------------------------------------------------------------------
// MemoryPersistence
// ---------------------------------------------------------------------------

/// In-memory [`Persistence`].
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entities: BTreeMap<EntityId, Entity>,
    saves: Vec<SaveRecord>,
    chat: Vec<ChatMessage>,
    relationships: BTreeMap<(EntityId, EntityId), Relationship>,
    closed: bool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend pre-seeded with entities, as if loaded from disk.
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            entities: entities.into_iter().map(|e| (e.id.clone(), e)).collect(),
            ..Self::default()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), PersistenceError> {
        if self.closed {
            Err(PersistenceError::Closed)
        } else {
            Ok(())
        }
    }

    fn filtered(&self, pred: impl Fn(&Entity) -> bool) -> Result<Vec<Entity>, PersistenceError> {
        self.ensure_open()?;
        Ok(self.entities.values().filter(|e| pred(e)).cloned().collect())
    }
}

fn pair_key(a: &str, b: &str) -> (EntityId, EntityId) {
    if a <= b {
        (EntityId::from(a), EntityId::from(b))
    } else {
        (EntityId::from(b), EntityId::from(a))
    }
}

impl Persistence for MemoryPersistence {
    fn load_entities(&self) -> Result<Vec<Entity>, PersistenceError> {
        self.filtered(|_| true)
    }

    fn entities_by_type(&self, entity_type: &str) -> Result<Vec<Entity>, PersistenceError> {
        self.filtered(|e| e.entity_type == entity_type)
    }

    fn entities_by_realm(&self, realm: &str) -> Result<Vec<Entity>, PersistenceError> {
        self.filtered(|e| e.realm() == Some(realm))
    }

    fn entities_by_city(&self, city: &str) -> Result<Vec<Entity>, PersistenceError> {
        self.filtered(|e| e.city() == Some(city))
    }

    fn bulk_put_entities(&mut self, entities: &[Entity]) -> Result<usize, PersistenceError> {
        self.ensure_open()?;
        for entity in entities {
            self.entities.insert(entity.id.clone(), entity.clone());
        }
        debug!(count = entities.len(), "entities written");
        Ok(entities.len())
    }

    fn clear_entities(&mut self) -> Result<(), PersistenceError> {
        self.ensure_open()?;
        self.entities.clear();
        Ok(())
    }

    fn put_save(&mut self, save: SaveRecord) -> Result<(), PersistenceError> {
        self.ensure_open()?;
        match self.saves.iter_mut().find(|s| s.id == save.id) {
            Some(existing) => *existing = save,
            None => self.saves.push(save),
        }
        Ok(())
    }

    fn get_save(&self, id: &str) -> Result<Option<SaveRecord>, PersistenceError> {
        self.ensure_open()?;
        Ok(self.saves.iter().find(|s| s.id == id).cloned())
    }

    fn all_saves(&self) -> Result<Vec<SaveSummary>, PersistenceError> {
        self.ensure_open()?;
        Ok(self.saves.iter().map(SaveSummary::from).collect())
    }

    fn add_chat_message(&mut self, message: ChatMessage) -> Result<(), PersistenceError> {
        self.ensure_open()?;
        self.chat.push(message);
        Ok(())
    }

    fn recent_chat(&self, limit: usize) -> Result<Vec<ChatMessage>, PersistenceError> {
        self.ensure_open()?;
        let skip = self.chat.len().saturating_sub(limit);
        Ok(self.chat[skip..].to_vec())
    }

    fn relationship(&self, a: &str, b: &str) -> Result<Option<Relationship>, PersistenceError> {
        self.ensure_open()?;
        Ok(self.relationships.get(&pair_key(a, b)).cloned())
    }

    fn update_relationship(
        &mut self,
        a: &str,
        b: &str,
        delta: f64,
    ) -> Result<Relationship, PersistenceError> {
        self.ensure_open()?;
        let key = pair_key(a, b);
        let entry = self
            .relationships
            .entry(key.clone())
            .or_insert_with(|| Relationship {
                a: key.0,
                b: key.1,
                score: 0.0,
                updated_at: 0,
            });
        entry.score += delta;
        entry.updated_at = unix_millis();
        Ok(entry.clone())
    }

    fn close(&mut self) -> Result<(), PersistenceError> {
        self.closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn citizen(id: &str, realm: &str, city: &str) -> Entity {
        Entity::new(id, "npc").with_component("position", json!({"realm": realm, "city": city}))
    }

    // -- 1. Entities --

    #[test]
    fn entity_queries() {
        let mut db = MemoryPersistence::with_entities([
            citizen("a", "north", "Karth"),
            citizen("b", "north", "Vell"),
        ]);
        db.bulk_put_entities(&[Entity::new("c", "item")]).unwrap();

        assert_eq!(db.load_entities().unwrap().len(), 3);
        assert_eq!(db.entities_by_type("npc").unwrap().len(), 2);
        assert_eq!(db.entities_by_realm("north").unwrap().len(), 2);
        assert_eq!(db.entities_by_city("Vell").unwrap()[0].id.as_str(), "b");

        db.clear_entities().unwrap();
        assert!(db.load_entities().unwrap().is_empty());
    }

    #[test]
    fn bulk_put_replaces_by_id() {
        let mut db = MemoryPersistence::new();
        db.bulk_put_entities(&[Entity::new("a", "npc")]).unwrap();
        db.bulk_put_entities(&[Entity::new("a", "item")]).unwrap();
        let all = db.load_entities().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].entity_type, "item");
    }

    // -- 2. Saves --

    #[test]
    fn saves_are_listed_in_insertion_order() {
        let mut db = MemoryPersistence::new();
        for (id, name) in [("s1", "first"), ("s2", "second")] {
            db.put_save(SaveRecord::new(id, name, 0, 0, 0, Vec::new()).unwrap())
                .unwrap();
        }
        let names: Vec<_> = db.all_saves().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(db.get_save("s2").unwrap().is_some());
        assert!(db.get_save("nope").unwrap().is_none());
    }

    // -- 3. Chat and relationships --

    #[test]
    fn recent_chat_keeps_latest_in_order() {
        let mut db = MemoryPersistence::new();
        for i in 0..5 {
            db.add_chat_message(ChatMessage::now("bard", format!("verse {i}")))
                .unwrap();
        }
        let recent: Vec<_> = db.recent_chat(2).unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(recent, vec!["verse 3", "verse 4"]);
        assert_eq!(db.recent_chat(50).unwrap().len(), 5);
    }

    #[test]
    fn relationships_are_symmetric_and_accumulate() {
        let mut db = MemoryPersistence::new();
        assert!(db.relationship("x", "y").unwrap().is_none());
        db.update_relationship("y", "x", 2.5).unwrap();
        let rel = db.update_relationship("x", "y", -1.0).unwrap();
        assert_eq!(rel.score, 1.5);
        assert_eq!(rel.a.as_str(), "x");
        assert_eq!(db.relationship("y", "x").unwrap().unwrap().score, 1.5);
    }

    // -- 4. Close --

    #[test]
    fn calls_after_close_fail() {
        let mut db = MemoryPersistence::new();
        db.close().unwrap();
        db.close().unwrap();
        assert!(db.is_closed());
        assert!(matches!(db.load_entities(), Err(PersistenceError::Closed)));
        assert!(matches!(
            db.add_chat_message(ChatMessage::now("a", "b")),
            Err(PersistenceError::Closed)
        ));
    }
}
