//! Projection builders and the query context they receive.
//!
//! A projection builder runs once per query root. It may resolve paths, build
//! aggregates and add WHERE conditions through [`QueryContext`], and returns
//! either `None` (select the whole entity) or an ordered [`Projection`].

use sea_query::{Func, SimpleExpr};

use super::path::{self, Origin, PathResolver, ResolvedExpr};
use crate::error::EngineResult;
use crate::schema::{EntitySchema, ValueType};

/// Ordered mapping of output field name to expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    fields: Vec<(String, ResolvedExpr)>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output field. A repeated name replaces the earlier expression in place.
    pub fn field(mut self, name: impl Into<String>, expr: ResolvedExpr) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = expr,
            None => self.fields.push((name, expr)),
        }
        self
    }

    pub fn fields(&self) -> &[(String, ResolvedExpr)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_aggregates(&self) -> bool {
        self.fields.iter().any(|(_, e)| e.is_aggregate())
    }
}

/// Query-building capabilities handed to a [`ProjectionBuilder`].
pub struct QueryContext<'r, 's> {
    resolver: &'r mut PathResolver<'s>,
    conditions: Vec<SimpleExpr>,
}

impl<'r, 's> QueryContext<'r, 's> {
    pub(crate) fn new(resolver: &'r mut PathResolver<'s>) -> Self {
        Self {
            resolver,
            conditions: Vec::new(),
        }
    }

    pub fn root(&self) -> &'s EntitySchema {
        self.resolver.root()
    }

    pub fn root_alias(&self) -> &str {
        self.resolver.root_alias()
    }

    pub fn identity(&self) -> ResolvedExpr {
        self.resolver.identity()
    }

    /// Resolve a path for output; collection-valued paths use their shared join.
    pub fn path(&mut self, path: &str) -> EngineResult<ResolvedExpr> {
        read_target(self.resolver, path)
    }

    /// `COUNT(DISTINCT path)`.
    pub fn count(&mut self, path: &str) -> EngineResult<ResolvedExpr> {
        let target = self.path(path)?;
        Ok(ResolvedExpr::aggregate(
            Func::count_distinct(target.into_expr()),
            ValueType::Integer,
        ))
    }

    /// `SUM(path)` per root identity.
    ///
    /// Computed in a correlated subquery, so joins made for other paths of
    /// the page query cannot repeat the summed rows.
    pub fn sum(&mut self, path: &str) -> EngineResult<ResolvedExpr> {
        self.per_identity(path, |expr| Func::sum(expr).into(), None)
    }

    pub fn min(&mut self, path: &str) -> EngineResult<ResolvedExpr> {
        let target = self.path(path)?;
        let value_type = target.value_type().clone();
        Ok(ResolvedExpr::aggregate(Func::min(target.into_expr()), value_type))
    }

    pub fn max(&mut self, path: &str) -> EngineResult<ResolvedExpr> {
        let target = self.path(path)?;
        let value_type = target.value_type().clone();
        Ok(ResolvedExpr::aggregate(Func::max(target.into_expr()), value_type))
    }

    /// `AVG(path)` per root identity, computed like [`QueryContext::sum`].
    pub fn avg(&mut self, path: &str) -> EngineResult<ResolvedExpr> {
        self.per_identity(path, |expr| Func::avg(expr).into(), Some(ValueType::Float))
    }

    /// Add a WHERE condition that applies to the data and the count query alike.
    pub fn and_where(&mut self, condition: impl Into<SimpleExpr>) {
        self.conditions.push(condition.into());
    }

    pub(crate) fn into_conditions(self) -> Vec<SimpleExpr> {
        self.conditions
    }

    fn per_identity(
        &mut self,
        path: &str,
        aggregate: impl FnOnce(SimpleExpr) -> SimpleExpr,
        value_type: Option<ValueType>,
    ) -> EngineResult<ResolvedExpr> {
        let mut inner = self.resolver.detached();
        let target = read_target(&mut inner, path)?;
        let value_type = value_type.unwrap_or_else(|| target.value_type().clone());
        let select = inner.correlated_select(
            aggregate(target.into_expr()),
            self.resolver.identity().into_expr(),
        );
        Ok(ResolvedExpr::new(
            SimpleExpr::SubQuery(None, Box::new(select.into_sub_query_statement())),
            value_type,
            Origin::Derived,
        ))
    }
}

/// Resolve `path` for reading: ordering and projection.
pub(crate) fn read_target(
    resolver: &mut PathResolver<'_>,
    path: &str,
) -> EngineResult<ResolvedExpr> {
    if let Some(resolved) = resolver.overridden(path) {
        return Ok(resolved.clone());
    }
    let attribute = resolver.terminal(path)?;
    if attribute.is_collection_valued() && !path.contains('@') {
        resolver.resolve(&path::shared(path))
    } else {
        resolver.resolve(path)
    }
}

/// Builds the output projection of a page query.
pub trait ProjectionBuilder: Send + Sync {
    fn build(&self, ctx: &mut QueryContext<'_, '_>) -> EngineResult<Option<Projection>>;
}

impl<F> ProjectionBuilder for F
where
    F: Fn(&mut QueryContext<'_, '_>) -> EngineResult<Option<Projection>> + Send + Sync,
{
    fn build(&self, ctx: &mut QueryContext<'_, '_>) -> EngineResult<Option<Projection>> {
        self(ctx)
    }
}

/// Selects every column-mapped attribute of the root entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeEntity;

impl ProjectionBuilder for WholeEntity {
    fn build(&self, _ctx: &mut QueryContext<'_, '_>) -> EngineResult<Option<Projection>> {
        Ok(None)
    }
}

/// Pin a closure to the [`ProjectionBuilder`] signature.
pub fn projection<F>(f: F) -> F
where
    F: Fn(&mut QueryContext<'_, '_>) -> EngineResult<Option<Projection>> + Send + Sync,
{
    f
}
