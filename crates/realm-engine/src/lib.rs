//! Realm Engine -- the simulation driver for the realm runtime.
//!
//! Builds on [`realm_ecs`] (store, event bus) and [`realm_schema`] (type
//! registry, entity factory) to provide:
//!
//! - [`system`]: the [`System`](system::System) trait and the phase-ordered,
//!   fault-isolating [`SystemScheduler`](system::SystemScheduler).
//! - [`tick`]: the fixed-timestep [`TickLoop`](tick::TickLoop).
//! - [`persistence`]: the storage collaborator contract and an in-memory
//!   implementation.
//! - [`snapshot`]: hashed save records.
//! - [`command`]: parsed command requests and outcomes.
//! - [`world`]: the [`GameWorld`](world::GameWorld) orchestrator tying it
//!   all together.
//! - [`logging`]: `tracing` subscriber setup for hosts and tests.
//!
//! # Quick Start
//!
//! ```
//! use realm_engine::prelude::*;
//!
//! let mut world = GameWorld::headless();
//! world.initialize().unwrap();
//!
//! let outcome = world.execute_command(CommandRequest::new("look").with_arg("well"));
//! assert!(outcome.success);
//!
//! world.step();
//! assert_eq!(world.stats().tick_count, 1);
//! world.shutdown().unwrap();
//! ```

#![deny(unsafe_code)]

pub mod command;
pub mod logging;
pub mod persistence;
pub mod snapshot;
pub mod system;
pub mod tick;
pub mod world;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the ECS crate for convenience.
pub use realm_ecs;

/// Re-export the schema crate for convenience.
pub use realm_schema;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The backend was closed; no further calls are accepted.
    #[error("persistence backend is closed")]
    Closed,

    /// Backend-specific failure.
    #[error("persistence backend failure: {0}")]
    Backend(String),
}

/// Errors raised by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("a system named '{name}' is already registered")]
    DuplicateSystem { name: String },

    /// A configuration that parsed but cannot drive a world.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("no save with id '{id}'")]
    SaveNotFound { id: String },

    /// The stored hash does not match the record's contents.
    #[error("save '{id}' failed its integrity check")]
    CorruptSave { id: String },

    #[error(transparent)]
    Ecs(#[from] realm_ecs::EcsError),

    #[error(transparent)]
    Schema(#[from] realm_schema::SchemaError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use realm_ecs::prelude::*;
    pub use realm_schema::prelude::*;

    pub use crate::command::{CommandOutcome, CommandRequest, ParsedCommand};
    pub use crate::persistence::{ChatMessage, MemoryPersistence, Persistence, Relationship};
    pub use crate::snapshot::{SaveRecord, SaveSummary};
    pub use crate::system::{Phase, RunReport, System, SystemContext, SystemScheduler, SystemStats, TickContext};
    pub use crate::tick::{TickConfig, TickLoop};
    pub use crate::world::{GameWorld, WorldConfig, WorldStats};
    pub use crate::{EngineError, PersistenceError};
}
