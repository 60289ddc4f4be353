//! Realm ECS -- entity storage and messaging for the realm simulation.
//!
//! This crate holds the two leaf components of the runtime:
//!
//! - [`store::EntityStore`]: owns [`entity::Entity`] records (string id, type,
//!   JSON component bag) and keeps secondary indices by type, realm, city, and
//!   component presence consistent across every mutation.
//! - [`event::EventBus`]: synchronous, priority-ordered publish/subscribe with
//!   snapshot dispatch and a bounded history ring.
//!
//! Neither depends on the other. The schema, factory, scheduler, and world
//! orchestrator live in the `realm-schema` and `realm-engine` crates.
//!
//! # Quick Start
//!
//! ```
//! use realm_ecs::prelude::*;
//! use serde_json::json;
//!
//! let mut store = EntityStore::new();
//! store
//!     .add(Entity::new("hero", "player").with_component("stats", json!({"health": 10})))
//!     .unwrap();
//!
//! let bus = EventBus::new();
//! bus.emit("entity:created", json!({"id": "hero"}), Some("example"));
//!
//! assert_eq!(store.by_component("stats").len(), 1);
//! assert_eq!(bus.history(Some("entity:created"), None).len(), 1);
//! ```

#![deny(unsafe_code)]

pub mod entity;
pub mod event;
pub mod merge;
pub mod store;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by entity store operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// An entity with this id is already live in the store.
    #[error("entity '{id}' already exists; ids are never reused while the store is live")]
    DuplicateEntity {
        /// The conflicting id.
        id: entity::EntityId,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::entity::{
        Components, Entity, EntityId, IdGenerator, SequentialIdGenerator, TimestampIdGenerator,
    };
    pub use crate::event::{EmitReport, EventBus, GameEvent, Subscription};
    pub use crate::merge::{deep_merge, merge_components};
    pub use crate::store::{EntityPatch, EntityQuery, EntityStore, IndexStats};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use crate::prelude::*;

    #[test]
    fn handler_mutates_shared_store_through_ids() {
        // Handlers only see ids in the payload and re-fetch from the store.
        let store = Rc::new(RefCell::new(EntityStore::new()));
        store
            .borrow_mut()
            .add(Entity::new("rat", "monster").with_component("stats", json!({"health": 3})))
            .unwrap();

        let bus = EventBus::new();
        let s = Rc::clone(&store);
        bus.subscribe("hit", 0, move |_, event| {
            let id = event.data["target"].as_str().unwrap_or_default();
            let damage = event.data["damage"].as_i64().unwrap_or(0);
            s.borrow_mut().update_with(id, |e| {
                if let Some(hp) = e.component_mut("stats").and_then(|stats| stats.get_mut("health")) {
                    *hp = json!(hp.as_i64().unwrap_or(0) - damage);
                }
            });
            Ok(())
        });

        bus.emit("hit", json!({"target": "rat", "damage": 2}), None);
        assert_eq!(
            store.borrow().get("rat").unwrap().component("stats").unwrap()["health"],
            json!(1)
        );
    }

    #[test]
    fn hit_priority_order_and_history() {
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = Rc::clone(&order);
        bus.subscribe("hit", 0, move |_, _| {
            o.borrow_mut().push(0);
            Ok(())
        });
        let o = Rc::clone(&order);
        bus.subscribe("hit", 10, move |_, _| {
            o.borrow_mut().push(10);
            Ok(())
        });

        bus.emit("hit", json!({"damage": 1}), None);

        assert_eq!(*order.borrow(), vec![10, 0]);
        let last = bus.history(Some("hit"), Some(1));
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].event_type, "hit");
        assert_eq!(last[0].data, json!({"damage": 1}));
    }

    #[test]
    fn duplicate_entity_error_message_names_id() {
        let mut store = EntityStore::new();
        store.add(Entity::new("x", "npc")).unwrap();
        let err = store.add(Entity::new("x", "npc")).unwrap_err();
        assert!(err.to_string().contains("'x'"));
    }
}
