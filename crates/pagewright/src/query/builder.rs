//! Page plan builder using SeaQuery.
//!
//! Builds the data query of a page request and, when asked, the matching
//! count query. Both are built against the same root entity with their own
//! table aliases:
//! - `e` for the data query (and for a copied count restriction)
//! - `c` for the outer count query
//! - `s` for a count subquery recompiled on a fresh root

use sea_query::{Alias, Expr, Func, Order, Query, SelectStatement, SimpleExpr};

use super::grouping::Restriction;
use super::path::{PathResolver, ResolvedExpr};
use super::plan::{Capabilities, CountIdiom, OutputColumn, PagePlan, QueryPlan};
use super::predicate::{self, CompiledPredicate};
use super::projection::{self, Projection, ProjectionBuilder, QueryContext};
use crate::criteria::{Criterion, Parameters};
use crate::error::{EngineError, EngineResult};
use crate::page::PageRequest;
use crate::schema::{EntitySchema, SchemaProvider};

const DATA_ALIAS: &str = "e";
const COUNT_ALIAS: &str = "c";
const SUBQUERY_ALIAS: &str = "s";

/// Limit used when an offset must be rendered without a bounded limit.
pub const UNBOUNDED_LIMIT: u64 = i64::MAX as u64;

/// A root's resolver, projection and restriction, before any SELECT exists.
struct Prepared<'s> {
    resolver: PathResolver<'s>,
    projection: Option<Projection>,
    restriction: Restriction,
    parameters: Parameters,
}

/// Builds page plans for one root entity.
pub struct PlanBuilder<'s> {
    schemas: &'s dyn SchemaProvider,
    root: &'s EntitySchema,
    capabilities: Capabilities,
}

impl<'s> PlanBuilder<'s> {
    pub fn new(
        schemas: &'s dyn SchemaProvider,
        root: &'s EntitySchema,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            schemas,
            root,
            capabilities,
        }
    }

    /// Build the data plan and, when `want_count` is set, the count plan.
    ///
    /// `require_projection` fails the build with `IllegalProjection` when the
    /// projection builder selects the whole entity.
    pub fn build(
        &self,
        request: &PageRequest,
        want_count: bool,
        projection: &dyn ProjectionBuilder,
        require_projection: bool,
    ) -> EngineResult<PagePlan> {
        let prepared = self.prepare(request, projection, DATA_ALIAS)?;
        if require_projection && prepared.projection.is_none() {
            return Err(EngineError::IllegalProjection);
        }

        let restriction = prepared.restriction.clone();
        let parameters = prepared.parameters.clone();
        let data = self.data_plan(request, prepared)?;

        let count = if want_count {
            Some(self.count_plan(request, projection, &data, restriction, parameters)?)
        } else {
            None
        };

        tracing::debug!(
            entity = %self.root.name(),
            joins = data.has_joins,
            distinct = data.distinct,
            group_by = data.group_by_len,
            having = data.has_having,
            counted = count.is_some(),
            "built page plan"
        );

        Ok(PagePlan { data, count })
    }

    /// Run the projection builder, then compile and route the criteria.
    fn prepare(
        &self,
        request: &PageRequest,
        builder: &dyn ProjectionBuilder,
        alias: &str,
    ) -> EngineResult<Prepared<'s>> {
        let mut resolver = PathResolver::new(self.schemas, self.root, alias);

        let (projection, conditions) = {
            let mut ctx = QueryContext::new(&mut resolver);
            let projection = builder.build(&mut ctx)?.filter(|p| !p.is_empty());
            (projection, ctx.into_conditions())
        };
        if let Some(projection) = &projection {
            for (name, resolved) in projection.fields() {
                resolver.override_field(name, resolved.clone());
            }
        }

        let mut parameters = Parameters::new();
        let required = compile_all(&mut resolver, request.required(), &mut parameters)?;
        let optional = compile_all(&mut resolver, request.optional(), &mut parameters)?;
        let identity = resolver.identity().into_expr();
        let restriction = Restriction::new(conditions).route(required, optional, identity);

        Ok(Prepared {
            resolver,
            projection,
            restriction,
            parameters,
        })
    }

    fn data_plan(&self, request: &PageRequest, prepared: Prepared<'s>) -> EngineResult<QueryPlan> {
        let Prepared {
            mut resolver,
            projection,
            mut restriction,
            parameters,
        } = prepared;

        let mut query = Query::select();
        query.from_as(Alias::new(self.root.table()), Alias::new(DATA_ALIAS));

        // SELECT list
        let mut columns = Vec::new();
        let mut selected: Vec<(SimpleExpr, bool)> = Vec::new();
        match &projection {
            None => {
                for (attribute, column) in self.root.columns() {
                    let expr = resolver.root_column(column);
                    query.expr_as(expr.clone(), Alias::new(&attribute.name));
                    columns.push(OutputColumn {
                        name: attribute.name.clone(),
                        value_type: attribute.value_type.clone(),
                    });
                    selected.push((expr, true));
                }
            }
            Some(projection) => {
                for (name, resolved) in projection.fields() {
                    query.expr_as(resolved.expr().clone(), Alias::new(name));
                    columns.push(OutputColumn {
                        name: name.clone(),
                        value_type: resolved.value_type().clone(),
                    });
                    selected.push((resolved.expr().clone(), resolved.needs_grouping()));
                }
            }
        }

        // ORDER BY
        let mut ordering = Vec::new();
        for order in request.ordering() {
            if request.limit() == Some(1) {
                if resolver.overridden(order.path()).is_none() {
                    resolver.terminal(order.path())?;
                }
                continue;
            }
            let resolved = projection::read_target(&mut resolver, order.path())?;
            let resolved = if resolved.is_collection() {
                collapse(resolved, order.is_ascending())
            } else {
                resolved
            };
            ordering.push((resolved, order.is_ascending()));
        }

        // GROUP BY
        let aggregated = projection.as_ref().is_some_and(Projection::has_aggregates)
            || ordering.iter().any(|(resolved, _)| resolved.is_aggregate());
        if restriction.has_having() || aggregated {
            let group_by = restriction.group_by_mut();
            group_by.add(resolver.identity().into_expr());
            for (expr, needs_grouping) in &selected {
                if *needs_grouping {
                    group_by.add(expr.clone());
                }
            }
            for (resolved, _) in &ordering {
                if resolved.needs_grouping() {
                    group_by.add(resolved.expr().clone());
                }
            }
        }
        let group_by_len = restriction.group_by().len();

        resolver.apply_joins(&mut query);
        restriction.apply(&mut query);

        let to_many = resolver.has_to_many_joins();
        let distinct = to_many && group_by_len == 0;
        if distinct {
            query.distinct();
            for (i, (resolved, _)) in ordering.iter().enumerate() {
                if !selected.iter().any(|(expr, _)| expr == resolved.expr()) {
                    query.expr_as(resolved.expr().clone(), Alias::new(format!("order_{i}")));
                }
            }
        }

        for (resolved, ascending) in &ordering {
            let direction = if *ascending { Order::Asc } else { Order::Desc };
            query.order_by_expr(resolved.expr().clone(), direction);
        }

        // Range
        let offset = (to_many || request.offset() != 0).then_some(request.offset());
        let limit = match request.limit() {
            Some(limit) => Some(limit),
            None if offset.is_some() => Some(UNBOUNDED_LIMIT),
            None => None,
        };
        if let Some(limit) = limit {
            query.limit(limit);
        }
        if let Some(offset) = offset {
            query.offset(offset);
        }

        Ok(QueryPlan {
            statement: query,
            columns,
            parameters: parameters.values().to_vec(),
            has_order_by: !ordering.is_empty(),
            distinct,
            limit,
            offset,
            has_joins: resolver.has_joins(),
            group_by_len,
            has_having: restriction.has_having(),
        })
    }

    /// `SELECT COUNT(c.id) FROM table c`, restricted to the identities the data
    /// query matches when it has any restriction.
    fn count_plan(
        &self,
        request: &PageRequest,
        projection: &dyn ProjectionBuilder,
        data: &QueryPlan,
        restriction: Restriction,
        parameters: Parameters,
    ) -> EngineResult<QueryPlan> {
        let identity = self.root.identity_column();
        let outer_id = column(COUNT_ALIAS, identity);

        let mut query = Query::select();
        query
            .expr(Func::count(outer_id.clone()))
            .from_as(Alias::new(self.root.table()), Alias::new(COUNT_ALIAS));

        let mut plan_parameters = Vec::new();
        let mut has_having = false;
        if !restriction.is_empty() {
            let (mut subquery, inner_id, parameters) =
                if self.capabilities.supports_copy_restriction && !data.has_joins {
                    let mut subquery = self.identity_select(DATA_ALIAS);
                    restriction.apply(&mut subquery);
                    has_having = restriction.has_having();
                    (subquery, column(DATA_ALIAS, identity), parameters)
                } else {
                    let prepared = self.prepare(request, projection, SUBQUERY_ALIAS)?;
                    let mut subquery = self.identity_select(SUBQUERY_ALIAS);
                    prepared.resolver.apply_joins(&mut subquery);
                    prepared.restriction.apply(&mut subquery);
                    has_having = prepared.restriction.has_having();
                    (
                        subquery,
                        column(SUBQUERY_ALIAS, identity),
                        prepared.parameters,
                    )
                };

            match self.capabilities.preferred_count_idiom {
                CountIdiom::In => {
                    query.and_where(Expr::expr(outer_id).in_subquery(subquery));
                }
                CountIdiom::Exists => {
                    subquery.and_where(Expr::expr(inner_id).eq(outer_id));
                    query.and_where(Expr::exists(subquery));
                }
            }
            plan_parameters = parameters.values().to_vec();
        }

        Ok(QueryPlan {
            statement: query,
            columns: Vec::new(),
            parameters: plan_parameters,
            has_order_by: false,
            distinct: false,
            limit: None,
            offset: None,
            has_joins: false,
            group_by_len: 0,
            has_having,
        })
    }

    fn identity_select(&self, alias: &str) -> SelectStatement {
        let mut query = Query::select();
        query
            .expr(column(alias, self.root.identity_column()))
            .from_as(Alias::new(self.root.table()), Alias::new(alias));
        query
    }
}

/// One sort key per root identity for a collection: its least value when
/// ascending, its greatest when descending.
fn collapse(resolved: ResolvedExpr, ascending: bool) -> ResolvedExpr {
    let value_type = resolved.value_type().clone();
    let expr = resolved.into_expr();
    let key = if ascending {
        Func::min(expr)
    } else {
        Func::max(expr)
    };
    ResolvedExpr::aggregate(key, value_type)
}

/// Compile criteria in order, dropping those that fail softly.
fn compile_all(
    resolver: &mut PathResolver<'_>,
    criteria: &[(String, Criterion)],
    parameters: &mut Parameters,
) -> EngineResult<Vec<CompiledPredicate>> {
    let mut compiled = Vec::with_capacity(criteria.len());
    for (field, criterion) in criteria {
        match predicate::compile(resolver, field, criterion, parameters) {
            Ok(predicate) => compiled.push(predicate),
            Err(e) if e.is_soft() => {
                tracing::warn!(
                    field = %field,
                    criterion = %criterion,
                    error = %e,
                    "dropping criterion"
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(compiled)
}

fn column(alias: &str, column: &str) -> SimpleExpr {
    Expr::col((Alias::new(alias), Alias::new(column))).into()
}
