//! Type registry: named entity type definitions and structural validation.
//!
//! A [`TypeRegistry`] maps entity type names to [`EntityTypeDefinition`]s.
//! Validation ([`TypeRegistry::validate`]) never mutates the entity and never
//! fails; it returns a [`ValidationReport`] listing every violation. Turning a
//! failed report into an error is the factory's job.
//!
//! The entity store does not consult the registry. Entities inserted
//! directly into a store bypass validation so harnesses can seed arbitrary
//! state.

use std::collections::{BTreeMap, HashMap, HashSet};

use realm_ecs::entity::Entity;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::schema::{join, Schema, ValidationError};
use crate::SchemaError;

// ---------------------------------------------------------------------------
// EntityTypeDefinition
// ---------------------------------------------------------------------------

/// The shape an entity of one type must have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeDefinition {
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Components every entity of this type must carry.
    #[serde(default)]
    pub required_components: Vec<String>,
    /// Components an entity may carry. Informational; extra components are
    /// never rejected.
    #[serde(default)]
    pub optional_components: Vec<String>,
    /// Per-component structural schemas, checked when the component is
    /// present.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub component_schemas: BTreeMap<String, Schema>,
}

impl EntityTypeDefinition {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            required_components: Vec::new(),
            optional_components: Vec::new(),
            component_schemas: BTreeMap::new(),
        }
    }

    /// Add a required component.
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required_components.push(name.into());
        self
    }

    /// Add an optional component.
    pub fn optional(mut self, name: impl Into<String>) -> Self {
        self.optional_components.push(name.into());
        self
    }

    /// Attach a schema to a component.
    pub fn with_schema(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.component_schemas.insert(name.into(), schema);
        self
    }

    fn check(&self) -> Result<(), SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidTypeDefinition {
            entity_type: self.entity_type.clone(),
            reason,
        };

        if self.entity_type.trim().is_empty() {
            return Err(invalid("type name must not be empty".into()));
        }
        let names = self
            .required_components
            .iter()
            .chain(&self.optional_components)
            .chain(self.component_schemas.keys());
        for name in names {
            if name.trim().is_empty() {
                return Err(invalid("component names must not be empty".into()));
            }
        }
        if let Some(both) = self
            .required_components
            .iter()
            .find(|name| self.optional_components.contains(name))
        {
            return Err(invalid(format!(
                "component '{both}' is listed as both required and optional"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ValidationReport
// ---------------------------------------------------------------------------

/// Result of validating one entity. `valid` is true iff `errors` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Paths of every error, in report order.
    pub fn paths(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.path.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

/// Registry of entity type definitions.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, EntityTypeDefinition>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Redefining a type replaces the old definition
    /// wholesale (no merging) and logs a warning.
    pub fn register(&mut self, definition: EntityTypeDefinition) -> Result<(), SchemaError> {
        definition.check()?;
        self.insert(definition);
        Ok(())
    }

    /// Register a batch of definitions.
    ///
    /// The batch is checked as a whole before anything is inserted: an
    /// invalid definition or a type named twice in the same batch fails the
    /// call and leaves the registry unchanged. Returns the number of
    /// definitions registered.
    pub fn register_all(
        &mut self,
        definitions: impl IntoIterator<Item = EntityTypeDefinition>,
    ) -> Result<usize, SchemaError> {
        let definitions: Vec<EntityTypeDefinition> = definitions.into_iter().collect();
        let mut seen = HashSet::new();
        for definition in &definitions {
            definition.check()?;
            if !seen.insert(definition.entity_type.as_str()) {
                return Err(SchemaError::DuplicateType {
                    entity_type: definition.entity_type.clone(),
                });
            }
        }
        let count = definitions.len();
        for definition in definitions {
            self.insert(definition);
        }
        debug!(count, "registered entity type batch");
        Ok(count)
    }

    /// Register a batch from a JSON array of definitions.
    pub fn register_from_json(&mut self, json: &serde_json::Value) -> Result<usize, SchemaError> {
        let definitions: Vec<EntityTypeDefinition> = serde_json::from_value(json.clone())?;
        self.register_all(definitions)
    }

    /// Validate an entity against its type's definition.
    ///
    /// Checks, in order: non-empty id and type, the type is registered, every
    /// required component is present, and every present component with a
    /// schema matches it. All violations are collected.
    pub fn validate(&self, entity: &Entity) -> ValidationReport {
        let mut errors = Vec::new();

        if entity.id.is_empty() {
            errors.push(ValidationError::new("id", "entity id must not be empty"));
        }
        if entity.entity_type.is_empty() {
            errors.push(ValidationError::new("type", "entity type must not be empty"));
            return ValidationReport::from_errors(errors);
        }

        let Some(definition) = self.types.get(&entity.entity_type) else {
            errors.push(ValidationError::new(
                "type",
                format!("unknown entity type '{}'", entity.entity_type),
            ));
            return ValidationReport::from_errors(errors);
        };

        for name in &definition.required_components {
            if !entity.has_component(name) {
                errors.push(ValidationError::new(
                    join("components", name),
                    "required component is missing",
                ));
            }
        }

        for (name, schema) in &definition.component_schemas {
            if let Some(value) = entity.component(name) {
                errors.extend(schema.validate(value, &join("components", name)));
            }
        }

        ValidationReport::from_errors(errors)
    }

    pub fn has_type(&self, entity_type: &str) -> bool {
        self.types.contains_key(entity_type)
    }

    /// The definition for a type, if registered.
    pub fn definition(&self, entity_type: &str) -> Option<&EntityTypeDefinition> {
        self.types.get(entity_type)
    }

    /// Remove a type. Returns `false` if it was not registered.
    pub fn unregister(&mut self, entity_type: &str) -> bool {
        self.types.remove(entity_type).is_some()
    }

    pub fn clear(&mut self) {
        self.types.clear();
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn insert(&mut self, definition: EntityTypeDefinition) {
        let name = definition.entity_type.clone();
        if self.types.insert(name.clone(), definition).is_some() {
            warn!(entity_type = %name, "entity type redefined; previous definition replaced");
        } else {
            debug!(entity_type = %name, "entity type registered");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
