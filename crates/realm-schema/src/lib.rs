//! Realm Schema -- type definitions, validation, and template-based entity
//! construction.
//!
//! # Modules
//!
//! - [`schema`]: recursive structural [`schema::Schema`] and the pure
//!   validator producing path-addressed [`schema::ValidationError`]s.
//! - [`registry`]: the [`registry::TypeRegistry`] of entity type definitions.
//!   Validation results are data, never errors.
//! - [`factory`]: template inheritance and the [`factory::EntityFactory`],
//!   where an invalid entity becomes [`SchemaError::ValidationFailed`].
//!
//! # Example
//!
//! ```
//! use realm_schema::prelude::*;
//! use realm_ecs::entity::SequentialIdGenerator;
//! use serde_json::json;
//!
//! let mut registry = TypeRegistry::new();
//! registry
//!     .register(EntityTypeDefinition::new("npc").require("stats"))
//!     .unwrap();
//!
//! let mut factory = EntityFactory::new().with_id_generator(SequentialIdGenerator::new("npc"));
//! factory.attach_registry(registry);
//! factory
//!     .register_template(
//!         EntityTemplate::new("guard", "npc").with_component("stats", json!({"health": 10})),
//!     )
//!     .unwrap();
//!
//! let guard = factory.create_from_template("guard", None).unwrap();
//! assert_eq!(guard.id.as_str(), "npc-1");
//! ```

#![deny(unsafe_code)]

pub mod factory;
pub mod registry;
pub mod schema;

use schema::ValidationError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Registration and construction errors.
///
/// Validation itself never errors; only the factory turns a failed
/// [`registry::ValidationReport`] into [`SchemaError::ValidationFailed`].
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid definition for entity type '{entity_type}': {reason}")]
    InvalidTypeDefinition { entity_type: String, reason: String },

    #[error("entity type '{entity_type}' appears more than once in one batch")]
    DuplicateType { entity_type: String },

    #[error("invalid template '{id}': {reason}")]
    InvalidTemplate { id: String, reason: String },

    #[error("template '{id}' appears more than once in one batch")]
    DuplicateTemplate { id: String },

    #[error("template '{template}' extends unknown template '{parent}'")]
    MissingParent { template: String, parent: String },

    #[error("template '{template}' is part of an inheritance cycle")]
    TemplateCycle { template: String },

    /// A bulk registration pass made no progress.
    #[error("circular or missing parent for templates: {}", .ids.join(", "))]
    UnresolvedTemplates { ids: Vec<String> },

    #[error("unknown template '{id}'")]
    UnknownTemplate { id: String },

    /// The built entity did not satisfy its type definition. Carries every
    /// violation, not just the first.
    #[error("entity of type '{entity_type}' failed validation: {}", format_errors(.errors))]
    ValidationFailed {
        entity_type: String,
        errors: Vec<ValidationError>,
    },

    #[error("malformed JSON input: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::factory::{EntityFactory, EntityTemplate};
    pub use crate::registry::{EntityTypeDefinition, TypeRegistry, ValidationReport};
    pub use crate::schema::{Schema, ValidationError};
    pub use crate::SchemaError;
}
