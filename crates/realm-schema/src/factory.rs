//! Template inheritance and entity construction.
//!
//! An [`EntityTemplate`] is a named blueprint of default component data.
//! Templates form a forest through `extends`; resolving a template
//! deep-merges the fully resolved parent with the child, root to leaf, with
//! the child winning field by field (see [`realm_ecs::merge`]).
//!
//! The [`EntityFactory`] owns the templates, an id generator, and optionally
//! the [`TypeRegistry`] it validates against. All three creation paths
//! (template, raw type, clone) follow the same steps:
//!
//! 1. Deep-clone the source components. Instances never share data with the
//!    template or with each other.
//! 2. Merge override components with the inheritance merge rule.
//! 3. Assign a fresh id.
//! 4. Validate against the attached registry, if any. An invalid entity is
//!    never returned; the error carries every violation path.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use realm_ecs::entity::{Components, Entity, IdGenerator, TimestampIdGenerator};
use realm_ecs::merge::merge_components;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::registry::TypeRegistry;
use crate::SchemaError;

// ---------------------------------------------------------------------------
// EntityTemplate
// ---------------------------------------------------------------------------

/// A named, inheritable blueprint of default component data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTemplate {
    pub id: String,
    /// Entity type of instances. May be empty on a child template, in which
    /// case the parent's type is inherited.
    #[serde(rename = "type", default)]
    pub entity_type: String,
    /// Parent template id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    /// Partial component bag layered over the parent's.
    #[serde(default)]
    pub components: Components,
}

impl EntityTemplate {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            extends: None,
            components: Components::new(),
        }
    }

    /// Set the parent template.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn with_component(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.components.insert(name.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// EntityFactory
// ---------------------------------------------------------------------------

/// Builds entities from templates, raw type data, or existing entities.
pub struct EntityFactory {
    templates: HashMap<String, EntityTemplate>,
    registry: Option<TypeRegistry>,
    validate_on_create: bool,
    id_generator: Box<dyn IdGenerator>,
}

impl fmt::Debug for EntityFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityFactory")
            .field("templates", &self.templates.len())
            .field("registry", &self.registry.as_ref().map(TypeRegistry::len))
            .field("validate_on_create", &self.validate_on_create)
            .finish_non_exhaustive()
    }
}

impl Default for EntityFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityFactory {
    /// A factory with no templates, no registry, and timestamp-based ids.
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            registry: None,
            validate_on_create: true,
            id_generator: Box::new(TimestampIdGenerator::new()),
        }
    }

    /// Replace the id generator (builder form).
    pub fn with_id_generator(mut self, generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Box::new(generator);
        self
    }

    /// Replace the id generator.
    pub fn set_id_generator(&mut self, generator: impl IdGenerator + 'static) {
        self.id_generator = Box::new(generator);
    }

    /// Attach a registry; subsequent creations are validated against it.
    /// Returns the previously attached registry, if any.
    pub fn attach_registry(&mut self, registry: TypeRegistry) -> Option<TypeRegistry> {
        self.registry.replace(registry)
    }

    /// Detach and return the registry. Creations are no longer validated.
    pub fn detach_registry(&mut self) -> Option<TypeRegistry> {
        self.registry.take()
    }

    pub fn registry(&self) -> Option<&TypeRegistry> {
        self.registry.as_ref()
    }

    pub fn registry_mut(&mut self) -> Option<&mut TypeRegistry> {
        self.registry.as_mut()
    }

    /// Toggle validation without detaching the registry.
    pub fn set_validate_on_create(&mut self, enabled: bool) {
        self.validate_on_create = enabled;
    }

    pub fn validates_on_create(&self) -> bool {
        self.validate_on_create && self.registry.is_some()
    }

    // -- templates ----------------------------------------------------------

    /// Register one template.
    ///
    /// The parent, if any, must already be registered. Re-registering an
    /// existing id replaces it, unless the new `extends` would close a cycle.
    pub fn register_template(&mut self, template: EntityTemplate) -> Result<(), SchemaError> {
        if template.id.trim().is_empty() {
            return Err(SchemaError::InvalidTemplate {
                id: template.id,
                reason: "template id must not be empty".into(),
            });
        }

        match &template.extends {
            None if template.entity_type.is_empty() => {
                return Err(SchemaError::InvalidTemplate {
                    id: template.id,
                    reason: "a root template must name an entity type".into(),
                });
            }
            None => {}
            Some(parent) => {
                if !self.templates.contains_key(parent) && parent != &template.id {
                    return Err(SchemaError::MissingParent {
                        template: template.id.clone(),
                        parent: parent.clone(),
                    });
                }
                if self.closes_cycle(&template.id, parent) {
                    return Err(SchemaError::TemplateCycle {
                        template: template.id.clone(),
                    });
                }
            }
        }

        let id = template.id.clone();
        if self.templates.insert(id.clone(), template).is_some() {
            warn!(template = %id, "template redefined; previous template replaced");
        } else {
            debug!(template = %id, "template registered");
        }
        Ok(())
    }

    /// Register a batch of templates in any order.
    ///
    /// Works through a queue in passes, registering every template whose
    /// parent is already known. A pass that registers nothing means the
    /// remaining templates have a circular or missing parent; the call then
    /// fails with [`SchemaError::UnresolvedTemplates`] naming them, and the
    /// factory's templates are left as they were before the call.
    pub fn register_templates(
        &mut self,
        templates: impl IntoIterator<Item = EntityTemplate>,
    ) -> Result<usize, SchemaError> {
        let mut pending: VecDeque<EntityTemplate> = templates.into_iter().collect();
        let mut seen = HashSet::new();
        for template in &pending {
            if !seen.insert(template.id.as_str()) {
                return Err(SchemaError::DuplicateTemplate {
                    id: template.id.clone(),
                });
            }
        }

        let total = pending.len();
        let before = self.templates.clone();
        let result = self.drain_queue(&mut pending);
        if result.is_err() {
            self.templates = before;
        } else {
            debug!(count = total, "registered template batch");
        }
        result.map(|()| total)
    }

    /// Register a batch from a JSON array of templates.
    pub fn register_templates_from_json(
        &mut self,
        json: &serde_json::Value,
    ) -> Result<usize, SchemaError> {
        let templates: Vec<EntityTemplate> = serde_json::from_value(json.clone())?;
        self.register_templates(templates)
    }

    fn drain_queue(&mut self, pending: &mut VecDeque<EntityTemplate>) -> Result<(), SchemaError> {
        while !pending.is_empty() {
            let mut progressed = false;
            for _ in 0..pending.len() {
                let Some(template) = pending.pop_front() else {
                    break;
                };
                let ready = template
                    .extends
                    .as_ref()
                    .map_or(true, |parent| self.templates.contains_key(parent));
                if ready {
                    self.register_template(template)?;
                    progressed = true;
                } else {
                    pending.push_back(template);
                }
            }
            if !progressed {
                let mut ids: Vec<String> = pending.iter().map(|t| t.id.clone()).collect();
                ids.sort();
                return Err(SchemaError::UnresolvedTemplates { ids });
            }
        }
        Ok(())
    }

    /// Whether making `id` extend `parent` would create a cycle.
    fn closes_cycle(&self, id: &str, parent: &str) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == id || !visited.insert(current) {
                return true;
            }
            cursor = self
                .templates
                .get(current)
                .and_then(|t| t.extends.as_deref());
        }
        false
    }

    /// Fully resolve a template: the returned template has no parent and
    /// carries the root-to-leaf merged components.
    pub fn resolve_template(&self, id: &str) -> Result<EntityTemplate, SchemaError> {
        let mut resolving = HashSet::new();
        let (entity_type, components) = self.resolve_inner(id, &mut resolving)?;
        Ok(EntityTemplate {
            id: id.to_owned(),
            entity_type,
            extends: None,
            components,
        })
    }

    fn resolve_inner(
        &self,
        id: &str,
        resolving: &mut HashSet<String>,
    ) -> Result<(String, Components), SchemaError> {
        let template = self
            .templates
            .get(id)
            .ok_or_else(|| SchemaError::UnknownTemplate { id: id.to_owned() })?;
        if !resolving.insert(id.to_owned()) {
            return Err(SchemaError::TemplateCycle {
                template: id.to_owned(),
            });
        }

        let resolved = match &template.extends {
            None => (template.entity_type.clone(), template.components.clone()),
            Some(parent) => {
                if !self.templates.contains_key(parent) {
                    return Err(SchemaError::MissingParent {
                        template: id.to_owned(),
                        parent: parent.clone(),
                    });
                }
                let (parent_type, mut components) = self.resolve_inner(parent, resolving)?;
                merge_components(&mut components, &template.components);
                let entity_type = if template.entity_type.is_empty() {
                    parent_type
                } else {
                    template.entity_type.clone()
                };
                (entity_type, components)
            }
        };

        resolving.remove(id);
        Ok(resolved)
    }

    pub fn has_template(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// The template as registered (unresolved).
    pub fn template(&self, id: &str) -> Option<&EntityTemplate> {
        self.templates.get(id)
    }

    /// Registered template ids, sorted.
    pub fn template_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Remove a template. Children that extend it fail to resolve until it
    /// is registered again.
    pub fn unregister_template(&mut self, id: &str) -> bool {
        self.templates.remove(id).is_some()
    }

    // -- creation -----------------------------------------------------------

    /// Stamp out an entity from a template, layering `overrides` on top.
    pub fn create_from_template(
        &mut self,
        template_id: &str,
        overrides: Option<&Components>,
    ) -> Result<Entity, SchemaError> {
        let resolved = self.resolve_template(template_id)?;
        self.build(resolved.entity_type, resolved.components, overrides)
    }

    /// Build an entity of `entity_type` from raw component data.
    pub fn create_from_type(
        &mut self,
        entity_type: &str,
        components: Components,
    ) -> Result<Entity, SchemaError> {
        self.build(entity_type.to_owned(), components, None)
    }

    /// Copy an entity under a fresh id, layering `overrides` on top. The
    /// source is untouched.
    pub fn clone_entity(
        &mut self,
        source: &Entity,
        overrides: Option<&Components>,
    ) -> Result<Entity, SchemaError> {
        self.build(source.entity_type.clone(), source.components.clone(), overrides)
    }

    fn build(
        &mut self,
        entity_type: String,
        mut components: Components,
        overrides: Option<&Components>,
    ) -> Result<Entity, SchemaError> {
        if let Some(overrides) = overrides {
            merge_components(&mut components, overrides);
        }
        let id = self.id_generator.next_id(&entity_type);
        let entity = Entity {
            id,
            entity_type,
            components,
        };

        if self.validate_on_create {
            if let Some(registry) = &self.registry {
                let report = registry.validate(&entity);
                if !report.valid {
                    return Err(SchemaError::ValidationFailed {
                        entity_type: entity.entity_type,
                        errors: report.errors,
                    });
                }
            }
        }

        debug!(entity_id = %entity.id, entity_type = %entity.entity_type, "entity built");
        Ok(entity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
