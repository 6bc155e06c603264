//! Entity schema descriptors.
//!
//! Provides the read-only metadata the planner resolves field paths against:
//! - EntitySchema: table, identity and attributes of one entity
//! - Attribute: name, declared value type and storage mapping
//! - SchemaRegistry: lookup of entities by name for relation traversal

mod registry;

use std::fmt;

use serde::de::DeserializeOwned;

use crate::error::{EngineError, EngineResult};

pub use registry::{SchemaProvider, SchemaRegistry};

/// An entity type whose pages can be queried.
///
/// `NAME` must match the name the entity's schema is registered under.
pub trait Entity: DeserializeOwned + Send + 'static {
    const NAME: &'static str;
}

/// Declared value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    Float,
    Text,
    Boolean,
    Enum(EnumType),
    /// Relation to another entity, by entity name.
    Entity(String),
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Integer => f.write_str("integer"),
            ValueType::Float => f.write_str("float"),
            ValueType::Text => f.write_str("text"),
            ValueType::Boolean => f.write_str("boolean"),
            ValueType::Enum(e) => write!(f, "enum {}", e.name),
            ValueType::Entity(name) => write!(f, "entity {name}"),
        }
    }
}

/// An enumerated type stored by variant name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    name: String,
    variants: Vec<String>,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Find a variant by case-insensitive name or by its decimal ordinal.
    pub fn resolve(&self, token: &str) -> Option<&str> {
        let token = token.trim();
        if let Some(v) = self.variants.iter().find(|v| v.eq_ignore_ascii_case(token)) {
            return Some(v);
        }
        token.parse::<i64>().ok().and_then(|i| self.by_ordinal(i))
    }

    pub fn by_ordinal(&self, ordinal: i64) -> Option<&str> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| self.variants.get(i))
            .map(String::as_str)
    }
}

/// Kind of an attribute, as seen by the path resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Scalar,
    ToOneRelation,
    ToManyRelation,
    ElementCollection,
}

/// How an attribute is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    /// A column on the entity's own table.
    Column(String),
    /// `owner.foreign_key = target.identity`.
    ToOne { target: String, foreign_key: String },
    /// `target.mapped_by = owner.identity`.
    ToMany { target: String, mapped_by: String },
    /// Values in a side table keyed by the owner's identity.
    Collection {
        table: String,
        owner_key: String,
        value_column: String,
    },
}

/// A named attribute of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Declared type; the element type for collections, the target for relations.
    pub value_type: ValueType,
    pub mapping: Mapping,
}

impl Attribute {
    pub fn kind(&self) -> AttributeKind {
        match self.mapping {
            Mapping::Column(_) => AttributeKind::Scalar,
            Mapping::ToOne { .. } => AttributeKind::ToOneRelation,
            Mapping::ToMany { .. } => AttributeKind::ToManyRelation,
            Mapping::Collection { .. } => AttributeKind::ElementCollection,
        }
    }

    /// Whether a criterion on this attribute tests membership in a set of values.
    pub fn is_collection_valued(&self) -> bool {
        matches!(
            self.kind(),
            AttributeKind::ToManyRelation | AttributeKind::ElementCollection
        )
    }
}

/// Schema of one entity.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: String,
    table: String,
    identity: String,
    attributes: Vec<Attribute>,
}

impl EntitySchema {
    /// Create a schema with an integer identity attribute `id`.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            identity: "id".to_string(),
            attributes: vec![Attribute {
                name: "id".to_string(),
                value_type: ValueType::Integer,
                mapping: Mapping::Column("id".to_string()),
            }],
        }
    }

    /// Replace the identity attribute.
    pub fn identity(
        mut self,
        name: impl Into<String>,
        column: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        let old = std::mem::take(&mut self.identity);
        self.attributes.retain(|a| a.name != old);
        let name = name.into();
        self.identity = name.clone();
        self.push(name, value_type, Mapping::Column(column.into()))
    }

    /// Add a scalar attribute stored in a column of the same name.
    pub fn scalar(self, name: impl Into<String>, value_type: ValueType) -> Self {
        let name = name.into();
        let column = name.clone();
        self.push(name, value_type, Mapping::Column(column))
    }

    /// Add a scalar attribute stored in a differently named column.
    pub fn scalar_column(
        self,
        name: impl Into<String>,
        column: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        self.push(name.into(), value_type, Mapping::Column(column.into()))
    }

    /// Add a to-one relation held by a foreign key on this entity's table.
    pub fn to_one(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        let target = target.into();
        self.push(
            name.into(),
            ValueType::Entity(target.clone()),
            Mapping::ToOne {
                target,
                foreign_key: foreign_key.into(),
            },
        )
    }

    /// Add a to-many relation held by a foreign key on the target's table.
    pub fn to_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        mapped_by: impl Into<String>,
    ) -> Self {
        let target = target.into();
        self.push(
            name.into(),
            ValueType::Entity(target.clone()),
            Mapping::ToMany {
                target,
                mapped_by: mapped_by.into(),
            },
        )
    }

    /// Add an element collection stored in a side table.
    pub fn element_collection(
        self,
        name: impl Into<String>,
        table: impl Into<String>,
        owner_key: impl Into<String>,
        value_column: impl Into<String>,
        element_type: ValueType,
    ) -> Self {
        self.push(
            name.into(),
            element_type,
            Mapping::Collection {
                table: table.into(),
                owner_key: owner_key.into(),
                value_column: value_column.into(),
            },
        )
    }

    fn push(mut self, name: String, value_type: ValueType, mapping: Mapping) -> Self {
        self.attributes.retain(|a| a.name != name);
        self.attributes.push(Attribute {
            name,
            value_type,
            mapping,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> EngineResult<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| EngineError::UnknownAttribute {
                entity: self.name.clone(),
                attribute: name.to_string(),
            })
    }

    pub fn attribute_kind(&self, name: &str) -> EngineResult<AttributeKind> {
        self.attribute(name).map(Attribute::kind)
    }

    pub fn declared_type(&self, name: &str) -> EngineResult<&ValueType> {
        self.attribute(name).map(|a| &a.value_type)
    }

    /// The identity attribute.
    pub fn identity_attribute(&self) -> &Attribute {
        // `identity` is always pushed alongside its name.
        self.attributes
            .iter()
            .find(|a| a.name == self.identity)
            .unwrap_or(&self.attributes[0])
    }

    /// Column holding the identity.
    pub fn identity_column(&self) -> &str {
        match &self.identity_attribute().mapping {
            Mapping::Column(c) => c,
            _ => &self.identity,
        }
    }

    /// Attributes stored in columns of the entity's own table, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = (&Attribute, &str)> {
        self.attributes.iter().filter_map(|a| match &a.mapping {
            Mapping::Column(c) => Some((a, c.as_str())),
            _ => None,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn person() -> EntitySchema {
        EntitySchema::new("person", "person")
            .scalar("name", ValueType::Text)
            .scalar_column("created", "created_at", ValueType::Integer)
            .to_one("team", "team", "team_id")
            .to_many("orders", "purchase", "person_id")
            .element_collection("tags", "person_tag", "person_id", "tag", ValueType::Text)
    }

    #[test]
    fn attribute_kinds() {
        let schema = person();
        assert_eq!(schema.attribute_kind("name").unwrap(), AttributeKind::Scalar);
        assert_eq!(
            schema.attribute_kind("team").unwrap(),
            AttributeKind::ToOneRelation
        );
        assert_eq!(
            schema.attribute_kind("orders").unwrap(),
            AttributeKind::ToManyRelation
        );
        assert_eq!(
            schema.attribute_kind("tags").unwrap(),
            AttributeKind::ElementCollection
        );
    }

    #[test]
    fn unknown_attribute() {
        let err = person().attribute("nope").unwrap_err();
        assert!(matches!(err, EngineError::UnknownAttribute { .. }));
    }

    #[test]
    fn columns_skip_relations_and_collections() {
        let schema = person();
        let cols: Vec<_> = schema.columns().map(|(a, c)| (a.name.as_str(), c)).collect();
        assert_eq!(
            cols,
            vec![("id", "id"), ("name", "name"), ("created", "created_at")]
        );
    }

    #[test]
    fn identity_can_be_replaced() {
        let schema = EntitySchema::new("code", "code").identity("key", "code_key", ValueType::Text);
        assert_eq!(schema.identity_attribute().name, "key");
        assert_eq!(schema.identity_column(), "code_key");
        assert!(schema.attribute("id").is_err());
    }

    #[test]
    fn enum_resolution() {
        let status = EnumType::new("status", ["ACTIVE", "INACTIVE"]);
        assert_eq!(status.resolve("active"), Some("ACTIVE"));
        assert_eq!(status.resolve("1"), Some("INACTIVE"));
        assert_eq!(status.resolve("2"), None);
        assert_eq!(status.resolve("gone"), None);
    }
}
