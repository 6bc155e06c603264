//! Schema registry.

use std::collections::HashMap;

use super::{EntitySchema, Mapping};
use crate::error::{EngineError, EngineResult};

/// Read-only source of entity schemas.
pub trait SchemaProvider: Send + Sync {
    /// Look up an entity by name.
    fn entity(&self, name: &str) -> Option<&EntitySchema>;

    /// Look up an entity by name, failing when it is not registered.
    fn require(&self, name: &str) -> EngineResult<&EntitySchema> {
        self.entity(name)
            .ok_or_else(|| EngineError::UnknownEntity(name.to_string()))
    }
}

/// In-memory registry of entity schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: HashMap<String, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any previous schema with the same name.
    pub fn with(mut self, schema: EntitySchema) -> Self {
        self.register(schema);
        self
    }

    pub fn register(&mut self, schema: EntitySchema) {
        self.entities.insert(schema.name().to_string(), schema);
    }

    /// Check that every relation points at a registered entity.
    ///
    /// Returns a list of problems. Empty list means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for schema in self.entities.values() {
            for attr in schema.attributes() {
                let target = match &attr.mapping {
                    Mapping::ToOne { target, .. } | Mapping::ToMany { target, .. } => target,
                    _ => continue,
                };
                if !self.entities.contains_key(target) {
                    errors.push(format!(
                        "{}.{} refers to unknown entity '{}'",
                        schema.name(),
                        attr.name,
                        target
                    ));
                }
            }
        }
        errors.sort();
        errors
    }
}

impl SchemaProvider for SchemaRegistry {
    fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }
}
