//! Field path resolution.
//!
//! A field path is a dot-separated list of attribute names walked from the
//! root entity. Every segment but the last must name a relation and becomes
//! a LEFT JOIN, materialized once per resolver. The last segment may be
//! wrapped in a marker when it is collection-valued:
//! - `@tags` resolves to the shared join of the collection (ordering, projection)
//! - `@tags@` resolves to a dedicated membership join (IN test and its COUNT)
//!
//! Resolved expressions are cached per path for the lifetime of the resolver,
//! which is one plan build.

use std::collections::HashMap;

use sea_query::{Alias, Expr, ExprTrait, JoinType, Query, SelectStatement, SimpleExpr};

use crate::error::{EngineError, EngineResult};
use crate::schema::{Attribute, EntitySchema, Mapping, SchemaProvider, ValueType};

/// Wrap the last segment of `path` in the shared collection join marker.
pub fn shared(path: &str) -> String {
    mark(path, "@", "")
}

/// Wrap the last segment of `path` in the membership join marker.
pub fn membership(path: &str) -> String {
    mark(path, "@", "@")
}

fn mark(path: &str, open: &str, close: &str) -> String {
    match path.rsplit_once('.') {
        Some((parents, last)) => format!("{parents}.{open}{last}{close}"),
        None => format!("{open}{path}{close}"),
    }
}

/// Where a resolved expression comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A column of the root or of a joined relation.
    Column,
    /// The value column of a collection join.
    Collection,
    /// An aggregate over one or more rows; filters on it go to HAVING.
    Aggregate,
    /// A scalar subquery correlated on the root identity. Fixed per identity,
    /// so it is never grouped by.
    Derived,
}

/// A field path resolved against one query root.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedExpr {
    expr: SimpleExpr,
    value_type: ValueType,
    origin: Origin,
}

impl ResolvedExpr {
    pub fn new(expr: impl Into<SimpleExpr>, value_type: ValueType, origin: Origin) -> Self {
        Self {
            expr: expr.into(),
            value_type,
            origin,
        }
    }

    /// A derived aggregate expression, such as a count over a collection join.
    pub fn aggregate(expr: impl Into<SimpleExpr>, value_type: ValueType) -> Self {
        Self::new(expr, value_type, Origin::Aggregate)
    }

    pub fn expr(&self) -> &SimpleExpr {
        &self.expr
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_aggregate(&self) -> bool {
        self.origin == Origin::Aggregate
    }

    pub fn is_collection(&self) -> bool {
        self.origin == Origin::Collection
    }

    /// Whether a GROUP BY on the root identity must list this expression.
    pub fn needs_grouping(&self) -> bool {
        matches!(self.origin, Origin::Column | Origin::Collection)
    }

    pub fn into_expr(self) -> SimpleExpr {
        self.expr
    }
}

/// A LEFT JOIN materialized by the resolver.
#[derive(Debug, Clone)]
pub(crate) struct JoinClause {
    pub alias: String,
    pub table: String,
    pub on: SimpleExpr,
    pub to_many: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Plain,
    Shared,
    Membership,
}

/// Resolves field paths against one query root, creating joins on demand.
pub struct PathResolver<'s> {
    schemas: &'s dyn SchemaProvider,
    root: &'s EntitySchema,
    alias: String,
    joins: Vec<JoinClause>,
    /// Join key (path prefix, `@`-suffixed for membership joins) to alias.
    join_index: HashMap<String, String>,
    cache: HashMap<String, ResolvedExpr>,
    /// Projected output fields, which shadow schema paths of the same name.
    overrides: HashMap<String, ResolvedExpr>,
    detached: usize,
}

impl<'s> PathResolver<'s> {
    pub fn new(schemas: &'s dyn SchemaProvider, root: &'s EntitySchema, alias: &str) -> Self {
        Self {
            schemas,
            root,
            alias: alias.to_string(),
            joins: Vec::new(),
            join_index: HashMap::new(),
            cache: HashMap::new(),
            overrides: HashMap::new(),
            detached: 0,
        }
    }

    pub fn root(&self) -> &'s EntitySchema {
        self.root
    }

    pub fn root_alias(&self) -> &str {
        &self.alias
    }

    /// The root's identity column.
    pub fn identity(&self) -> ResolvedExpr {
        ResolvedExpr::new(
            column(&self.alias, self.root.identity_column()),
            self.root.identity_attribute().value_type.clone(),
            Origin::Column,
        )
    }

    /// A column of the root table.
    pub fn root_column(&self, column_name: &str) -> SimpleExpr {
        column(&self.alias, column_name)
    }

    /// Find the attribute a path ends in, without materializing joins.
    pub fn terminal(&self, path: &str) -> EngineResult<&'s Attribute> {
        let (parents, last) = split(path)?;
        let mut entity = self.root;
        for segment in parents {
            let (_, target) = self.relation(entity, path, segment)?;
            entity = target;
        }
        let (name, _) = parse_marker(path, last)?;
        entity.attribute(name)
    }

    /// Whether `field` is shadowed by a projected output field.
    pub fn overridden(&self, field: &str) -> Option<&ResolvedExpr> {
        self.overrides.get(field)
    }

    pub(crate) fn override_field(&mut self, field: &str, resolved: ResolvedExpr) {
        self.overrides.insert(field.to_string(), resolved);
    }

    /// Resolve a field path, joining relations as needed.
    pub fn resolve(&mut self, path: &str) -> EngineResult<ResolvedExpr> {
        if let Some(resolved) = self.overrides.get(path).or_else(|| self.cache.get(path)) {
            return Ok(resolved.clone());
        }

        let schemas = self.schemas;
        let (parents, last) = split(path)?;
        let mut entity = self.root;
        let mut alias = self.alias.clone();
        let mut prefix = String::new();

        for segment in parents {
            let (attribute, target) = self.relation(entity, path, segment)?;
            push_segment(&mut prefix, segment);
            let owner = alias.clone();
            alias = match &attribute.mapping {
                Mapping::ToOne { foreign_key, .. } => {
                    let on_target = target.identity_column().to_string();
                    let foreign_key = foreign_key.clone();
                    self.join(prefix.clone(), target.table(), false, |join| {
                        column(join, &on_target).equals((Alias::new(&owner), Alias::new(&foreign_key)))
                    })
                }
                Mapping::ToMany { mapped_by, .. } => {
                    let owner_id = entity.identity_column().to_string();
                    let mapped_by = mapped_by.clone();
                    self.join(prefix.clone(), target.table(), true, |join| {
                        column(join, &mapped_by).equals((Alias::new(&owner), Alias::new(&owner_id)))
                    })
                }
                _ => unreachable_relation(path, segment)?,
            };
            entity = target;
        }

        let (name, marker) = parse_marker(path, last)?;
        let attribute = entity.attribute(name)?;
        let owner_id = entity.identity_column().to_string();

        let resolved = match (&attribute.mapping, marker) {
            (Mapping::Column(c), Marker::Plain) => {
                ResolvedExpr::new(column(&alias, c), attribute.value_type.clone(), Origin::Column)
            }
            (Mapping::ToOne { target, foreign_key }, Marker::Plain) => {
                let target = schemas.require(target)?;
                ResolvedExpr::new(
                    column(&alias, foreign_key),
                    target.identity_attribute().value_type.clone(),
                    Origin::Column,
                )
            }
            (Mapping::Column(_) | Mapping::ToOne { .. }, _) => {
                return Err(EngineError::invalid_path(
                    path,
                    format!("'{name}' is not collection-valued and takes no join marker"),
                ));
            }
            (Mapping::ToMany { target, mapped_by }, marker) => {
                let target = schemas.require(target)?;
                let key = collection_key(&prefix, name, marker);
                let join = self.join(key, target.table(), true, |join| {
                    column(join, mapped_by).equals((Alias::new(&alias), Alias::new(&owner_id)))
                });
                ResolvedExpr::new(
                    column(&join, target.identity_column()),
                    target.identity_attribute().value_type.clone(),
                    Origin::Collection,
                )
            }
            (
                Mapping::Collection {
                    table,
                    owner_key,
                    value_column,
                },
                marker,
            ) => {
                let key = collection_key(&prefix, name, marker);
                let join = self.join(key, table, true, |join| {
                    column(join, owner_key).equals((Alias::new(&alias), Alias::new(&owner_id)))
                });
                ResolvedExpr::new(
                    column(&join, value_column),
                    attribute.value_type.clone(),
                    Origin::Collection,
                )
            }
        };

        self.cache.insert(path.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// A fresh resolver over the same root under a new alias, for subqueries
    /// correlated on the root identity. Its joins never reach this resolver.
    pub(crate) fn detached(&mut self) -> PathResolver<'s> {
        let alias = format!("{}_sub{}", self.alias, self.detached);
        self.detached += 1;
        PathResolver::new(self.schemas, self.root, &alias)
    }

    /// `SELECT expr FROM root AS alias <joins> WHERE alias.id = outer`
    pub(crate) fn correlated_select(&self, expr: SimpleExpr, outer: SimpleExpr) -> SelectStatement {
        let mut query = Query::select();
        query
            .expr(expr)
            .from_as(Alias::new(self.root.table()), Alias::new(&self.alias));
        self.apply_joins(&mut query);
        query.and_where(Expr::expr(self.identity().into_expr()).eq(outer));
        query
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    pub fn has_to_many_joins(&self) -> bool {
        self.joins.iter().any(|j| j.to_many)
    }

    pub(crate) fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    pub(crate) fn apply_joins(&self, query: &mut SelectStatement) {
        for join in &self.joins {
            query.join_as(
                JoinType::LeftJoin,
                Alias::new(&join.table),
                Alias::new(&join.alias),
                join.on.clone(),
            );
        }
    }

    fn relation(
        &self,
        entity: &'s EntitySchema,
        path: &str,
        segment: &str,
    ) -> EngineResult<(&'s Attribute, &'s EntitySchema)> {
        if segment.starts_with('@') {
            return Err(EngineError::invalid_path(
                path,
                "join markers are only allowed on the last segment",
            ));
        }
        let attribute = entity.attribute(segment)?;
        match &attribute.mapping {
            Mapping::ToOne { target, .. } | Mapping::ToMany { target, .. } => {
                let schemas = self.schemas;
                Ok((attribute, schemas.require(target)?))
            }
            _ => unreachable_relation(path, segment),
        }
    }

    fn join(
        &mut self,
        key: String,
        table: &str,
        to_many: bool,
        on: impl FnOnce(&str) -> SimpleExpr,
    ) -> String {
        if let Some(alias) = self.join_index.get(&key) {
            return alias.clone();
        }
        let alias = format!(
            "{}_{}",
            self.alias,
            key.replace('.', "_").replace('@', "_in")
        );
        self.joins.push(JoinClause {
            alias: alias.clone(),
            table: table.to_string(),
            on: on(&alias),
            to_many,
        });
        self.join_index.insert(key, alias.clone());
        alias
    }
}

fn column(alias: &str, column: &str) -> SimpleExpr {
    Expr::col((Alias::new(alias), Alias::new(column))).into()
}

fn split(path: &str) -> EngineResult<(Vec<&str>, &str)> {
    let mut segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(EngineError::invalid_path(path, "empty segment"));
    }
    match segments.pop() {
        Some(last) => Ok((segments, last)),
        None => Err(EngineError::invalid_path(path, "empty path")),
    }
}

fn parse_marker<'p>(path: &str, segment: &'p str) -> EngineResult<(&'p str, Marker)> {
    let (name, marker) = match segment.strip_prefix('@') {
        Some(rest) => match rest.strip_suffix('@') {
            Some(name) => (name, Marker::Membership),
            None => (rest, Marker::Shared),
        },
        None => (segment, Marker::Plain),
    };
    if name.is_empty() || name.contains('@') {
        return Err(EngineError::invalid_path(path, "malformed join marker"));
    }
    Ok((name, marker))
}

fn push_segment(prefix: &mut String, segment: &str) {
    if !prefix.is_empty() {
        prefix.push('.');
    }
    prefix.push_str(segment);
}

fn collection_key(prefix: &str, name: &str, marker: Marker) -> String {
    let mut key = prefix.to_string();
    push_segment(&mut key, name);
    if marker == Marker::Membership {
        key.push('@');
    }
    key
}

fn unreachable_relation<T>(path: &str, segment: &str) -> EngineResult<T> {
    Err(EngineError::invalid_path(
        path,
        format!("'{segment}' is not a relation"),
    ))
}
