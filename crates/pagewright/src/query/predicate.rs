//! Criterion to predicate compilation.
//!
//! Dispatch order for one `field -> criterion` pair:
//! - `Not` inverts the inner criterion; across a to-many path it becomes a
//!   NOT EXISTS decided per root identity
//! - `Null` becomes IS NULL
//! - collection-valued fields become a membership test over the dedicated join
//! - lists become an OR of their element predicates
//! - structured criteria build themselves
//! - plain literals use the structured criterion matching the declared type

use sea_query::{Cond, Expr, Func, SimpleExpr, Value};

use super::path::{self, PathResolver, ResolvedExpr};
use crate::criteria::{
    Alternatives, Binder, Bool, Criterion, Enumerated, IgnoreCase, Literal, Numeric, Parameters,
};
use crate::error::{EngineError, EngineResult};
use crate::schema::ValueType;

/// Clause a predicate must be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Where,
    Having,
}

#[derive(Debug, Clone, PartialEq)]
struct Membership {
    join_value: SimpleExpr,
    count: usize,
}

/// A compiled criterion with the metadata the router needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    field: String,
    expr: SimpleExpr,
    clause: Clause,
    membership: Option<Membership>,
}

impl CompiledPredicate {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn expr(&self) -> &SimpleExpr {
        &self.expr
    }

    pub fn clause(&self) -> Clause {
        self.clause
    }

    /// Number of distinct values a membership predicate tests for.
    pub fn membership_count(&self) -> Option<usize> {
        self.membership.as_ref().map(|m| m.count)
    }

    /// `COUNT(DISTINCT join) = N` for a membership test over more than one value.
    ///
    /// The IN test alone keeps rows holding any of the values; the count keeps
    /// only rows holding all of them.
    pub fn count_predicate(&self) -> Option<SimpleExpr> {
        let membership = self.membership.as_ref().filter(|m| m.count > 1)?;
        let count = i64::try_from(membership.count).ok()?;
        Some(Expr::expr(Func::count_distinct(membership.join_value.clone())).eq(count))
    }
}

/// Compile one criterion against `field`.
///
/// Path errors are fatal. Criterion errors (`InvalidCriterion`,
/// `UnsupportedCriterion`) are left for the caller to tolerate.
pub fn compile(
    resolver: &mut PathResolver<'_>,
    field: &str,
    criterion: &Criterion,
    parameters: &mut Parameters,
) -> EngineResult<CompiledPredicate> {
    if let Criterion::Not(negation) = criterion
        && resolver.overridden(field).is_none()
    {
        let mut inner = resolver.detached();
        let mut scratch = parameters.clone();
        let positive = compile(&mut inner, field, negation.inner(), &mut scratch)?;
        if inner.has_to_many_joins() {
            *parameters = scratch;
            return Ok(CompiledPredicate {
                field: field.to_string(),
                expr: not_exists(resolver, &inner, &positive),
                clause: Clause::Where,
                membership: None,
            });
        }
    }

    let resolved = filter_target(resolver, field)?;
    let mut binder = parameters.binder(field);
    let (expr, count) = build(&resolved, criterion, &mut binder)?;

    Ok(CompiledPredicate {
        field: field.to_string(),
        expr,
        clause: if resolved.is_aggregate() {
            Clause::Having
        } else {
            Clause::Where
        },
        membership: count.map(|count| Membership {
            join_value: resolved.into_expr(),
            count,
        }),
    })
}

/// Negation across a to-many path, decided per root identity:
/// `NOT EXISTS (SELECT 1 FROM root s <joins> WHERE s.id = e.id AND positive)`.
///
/// A multi-value membership keeps its count, so the negation is the
/// complement of "holds all of".
fn not_exists(
    outer: &PathResolver<'_>,
    inner: &PathResolver<'_>,
    positive: &CompiledPredicate,
) -> SimpleExpr {
    let mut select = inner.correlated_select(Expr::val(1).into(), outer.identity().into_expr());
    select.and_where(positive.expr().clone());
    if let Some(count) = positive.count_predicate() {
        select
            .add_group_by([inner.identity().into_expr()])
            .and_having(count);
    }
    Expr::exists(select).not()
}

/// Projected fields first; collection-valued paths go through their membership join.
fn filter_target(resolver: &mut PathResolver<'_>, field: &str) -> EngineResult<ResolvedExpr> {
    if let Some(resolved) = resolver.overridden(field) {
        return Ok(resolved.clone());
    }
    let attribute = resolver.terminal(field)?;
    if attribute.is_collection_valued() && !field.contains('@') {
        resolver.resolve(&path::membership(field))
    } else {
        resolver.resolve(field)
    }
}

fn build(
    resolved: &ResolvedExpr,
    criterion: &Criterion,
    binder: &mut Binder<'_>,
) -> EngineResult<(SimpleExpr, Option<usize>)> {
    let expr = resolved.expr();
    let value_type = resolved.value_type();

    let plain = |e: SimpleExpr| (e, None);
    match criterion {
        Criterion::Not(negation) => {
            let (inner, _) = build(resolved, negation.inner(), binder)?;
            Ok((inner.not(), None))
        }
        Criterion::Null => Ok(plain(Expr::expr(expr.clone()).is_null())),
        _ if resolved.is_collection() => {
            let (predicate, count) = membership(expr, value_type, criterion, binder)?;
            Ok((predicate, Some(count)))
        }
        Criterion::AnyOf(alternatives) => any_of(resolved, alternatives, binder).map(plain),
        Criterion::Numeric(numeric) => numeric.build(expr, value_type, binder).map(plain),
        Criterion::Enumerated(enumerated) => enumerated.build(expr, value_type, binder).map(plain),
        Criterion::Bool(boolean) => boolean.build(expr, value_type, binder).map(plain),
        Criterion::IgnoreCase(text) => text.build(expr, value_type, binder).map(plain),
        Criterion::Value(literal) => shorthand(expr, value_type, literal, binder).map(plain),
    }
}

fn any_of(
    resolved: &ResolvedExpr,
    alternatives: &Alternatives,
    binder: &mut Binder<'_>,
) -> EngineResult<SimpleExpr> {
    let mut predicates = Vec::with_capacity(alternatives.items().len());
    for item in alternatives.items() {
        match build(resolved, item, binder) {
            Ok((predicate, _)) => predicates.push(predicate),
            Err(err) if err.is_soft() => {
                tracing::debug!(field = binder.field(), error = %err, "skipping list element");
            }
            Err(err) => return Err(err),
        }
    }

    if predicates.len() > 1 {
        let any = predicates
            .into_iter()
            .fold(Cond::any(), |cond, predicate| cond.add(predicate));
        return Ok(any.into());
    }
    // A one-element list compiles exactly like its single value.
    predicates
        .pop()
        .ok_or_else(|| binder.invalid("no list element could be compiled"))
}

fn membership(
    join_value: &SimpleExpr,
    element_type: &ValueType,
    criterion: &Criterion,
    binder: &mut Binder<'_>,
) -> EngineResult<(SimpleExpr, usize)> {
    let Criterion::AnyOf(alternatives) = criterion else {
        return Err(binder.invalid(format!(
            "collection-valued field needs a list of values, got {}",
            criterion.type_name()
        )));
    };

    let mut values: Vec<Value> = Vec::with_capacity(alternatives.items().len());
    for item in alternatives.items() {
        let Criterion::Value(literal) = item else {
            return Err(binder.invalid(format!(
                "collection values must be plain literals, got {}",
                item.type_name()
            )));
        };
        let value = coerce(literal, element_type).map_err(|reason| binder.invalid(reason))?;
        if !values.contains(&value) {
            values.push(value);
        }
    }

    let count = values.len();
    let bound: Vec<Value> = values.into_iter().map(|v| binder.bind_value(v)).collect();
    Ok((Expr::expr(join_value.clone()).is_in(bound), count))
}

/// Convert a literal to a bindable value of the declared element type.
fn coerce(literal: &Literal, value_type: &ValueType) -> Result<Value, String> {
    match value_type {
        ValueType::Integer | ValueType::Float => Numeric::parse(literal, value_type),
        ValueType::Boolean => Bool::parse(literal).map(|b| Value::from(b.value())),
        ValueType::Enum(enum_type) => {
            Enumerated::parse(literal, enum_type).map(|variant| Value::from(variant.to_string()))
        }
        ValueType::Text => match literal {
            Literal::Text(s) => Ok(Value::from(s.clone())),
            other => Err(format!("{other} is not text")),
        },
        ValueType::Entity(name) => Err(format!("{literal} cannot stand for entity {name}")),
    }
}

fn shorthand(
    expr: &SimpleExpr,
    value_type: &ValueType,
    literal: &Literal,
    binder: &mut Binder<'_>,
) -> EngineResult<SimpleExpr> {
    match (value_type, literal) {
        (ValueType::Enum(_), Literal::Text(_) | Literal::Integer(_)) => {
            Enumerated::value(literal.clone()).build(expr, value_type, binder)
        }
        (
            ValueType::Integer | ValueType::Float,
            Literal::Integer(_) | Literal::Float(_) | Literal::Text(_),
        ) => Numeric::Eq(literal.clone()).build(expr, value_type, binder),
        (ValueType::Boolean, Literal::Bool(_) | Literal::Integer(_) | Literal::Text(_)) => {
            Bool::parse(literal)
                .map_err(|reason| binder.invalid(reason))?
                .build(expr, value_type, binder)
        }
        (ValueType::Text, Literal::Text(s)) => {
            IgnoreCase::value(s.clone()).build(expr, value_type, binder)
        }
        _ => Err(EngineError::UnsupportedCriterion {
            field: binder.field().to_string(),
            declared_type: value_type.to_string(),
            value: literal.to_string(),
            value_type: literal.type_name(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, EnumType, SchemaProvider, SchemaRegistry};
    use sea_query::{Alias, Query, SqliteQueryBuilder};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new().with(
            EntitySchema::new("person", "person")
                .scalar("name", ValueType::Text)
                .scalar("age", ValueType::Integer)
                .scalar("active", ValueType::Boolean)
                .scalar(
                    "status",
                    ValueType::Enum(EnumType::new("status", ["ACTIVE", "INACTIVE"])),
                )
                .element_collection("tags", "person_tag", "person_id", "tag", ValueType::Text),
        )
    }

    fn where_sql(predicate: &CompiledPredicate) -> String {
        let sql = Query::select()
            .column(Alias::new("id"))
            .from(Alias::new("person"))
            .and_where(predicate.expr().clone())
            .to_string(SqliteQueryBuilder);
        sql.split_once(" WHERE ")
            .map(|(_, w)| w.to_string())
            .unwrap_or_default()
    }

    fn compile_one(field: &str, criterion: Criterion) -> EngineResult<CompiledPredicate> {
        let registry = registry();
        let root = registry.require("person").unwrap();
        let mut resolver = PathResolver::new(&registry, root, "e");
        let mut parameters = Parameters::new();
        compile(&mut resolver, field, &criterion, &mut parameters)
    }

    #[test]
    fn null_is_is_null() {
        let p = compile_one("name", Criterion::Null).unwrap();
        assert_eq!(where_sql(&p), "\"e\".\"name\" IS NULL");
        assert_eq!(p.clause(), Clause::Where);
    }

    #[test]
    fn shorthand_follows_declared_type() {
        let p = compile_one("age", Criterion::from("42")).unwrap();
        assert_eq!(where_sql(&p), "\"e\".\"age\" = 42");

        let p = compile_one("status", Criterion::from("active")).unwrap();
        assert_eq!(where_sql(&p), "\"e\".\"status\" = 'ACTIVE'");

        let p = compile_one("active", Criterion::from("yes")).unwrap();
        let sql = where_sql(&p);
        assert!(
            sql == "\"e\".\"active\" = TRUE" || sql == "\"e\".\"active\" = 1",
            "{sql}"
        );

        let p = compile_one("name", Criterion::from("Jo")).unwrap();
        assert_eq!(where_sql(&p), "LOWER(\"e\".\"name\") = 'jo'");
    }

    #[test]
    fn mismatched_shape_is_unsupported() {
        let err = compile_one("name", Criterion::from(3_i64)).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedCriterion { .. }), "{err}");
        assert!(err.is_soft());

        let err = compile_one("active", Criterion::from(1.5)).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedCriterion { .. }), "{err}");
    }

    #[test]
    fn unknown_field_is_fatal() {
        let err = compile_one("nickname", Criterion::from("x")).unwrap_err();
        assert!(!err.is_soft());
    }

    #[test]
    fn not_is_complement() {
        let p = compile_one("age", Criterion::not(Numeric::gt(30)).unwrap()).unwrap();
        let sql = where_sql(&p);
        assert!(sql.starts_with("NOT"), "{sql}");
        assert!(sql.contains("\"e\".\"age\" > 30"), "{sql}");

        let p = compile_one("name", Criterion::not(Criterion::Null).unwrap()).unwrap();
        let sql = where_sql(&p);
        assert!(sql.starts_with("NOT"), "{sql}");
        assert!(sql.contains("\"e\".\"name\" IS NULL"), "{sql}");
    }

    #[test]
    fn list_is_or_and_drops_bad_elements() {
        let list = Criterion::any_of([
            Criterion::from(18),
            Criterion::from("x"),
            Criterion::from(30),
        ])
        .unwrap();
        let p = compile_one("age", list).unwrap();
        let sql = where_sql(&p);
        assert!(sql.contains("\"e\".\"age\" = 18 OR \"e\".\"age\" = 30"), "{sql}");

        let list = Criterion::any_of(["x", "y"]).unwrap();
        let err = compile_one("age", list).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCriterion { .. }), "{err}");
    }

    #[test]
    fn one_element_list_equals_single_value() {
        let single = compile_one("age", Criterion::from(18)).unwrap();
        let list = compile_one("age", Criterion::any_of([18]).unwrap()).unwrap();
        assert_eq!(single.expr(), list.expr());
    }

    #[test]
    fn collection_membership_counts_distinct_values() {
        let p = compile_one("tags", Criterion::any_of(["x", "y", "x"]).unwrap()).unwrap();
        assert_eq!(p.membership_count(), Some(2));
        assert_eq!(where_sql(&p), "\"e_tags_in\".\"tag\" IN ('x', 'y')");

        let count = p.count_predicate().unwrap();
        let sql = Query::select()
            .column(Alias::new("id"))
            .from(Alias::new("person"))
            .and_having(count)
            .to_string(SqliteQueryBuilder);
        assert!(sql.contains("HAVING COUNT(DISTINCT \"e_tags_in\".\"tag\") = 2"), "{sql}");
    }

    #[test]
    fn single_membership_value_has_no_count() {
        let p = compile_one("tags", Criterion::any_of(["x"]).unwrap()).unwrap();
        assert_eq!(p.membership_count(), Some(1));
        assert!(p.count_predicate().is_none());
    }

    #[test]
    fn collection_needs_a_list() {
        let err = compile_one("tags", Criterion::from("x")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCriterion { .. }), "{err}");
    }

    #[test]
    fn negated_membership_is_decided_per_identity() {
        let registry = registry();
        let root = registry.require("person").unwrap();
        let mut resolver = PathResolver::new(&registry, root, "e");
        let mut parameters = Parameters::new();
        let criterion = Criterion::not(Criterion::any_of(["x"]).unwrap()).unwrap();
        let p = compile(&mut resolver, "tags", &criterion, &mut parameters).unwrap();

        assert!(p.membership_count().is_none());
        assert_eq!(p.clause(), Clause::Where);
        assert!(!resolver.has_joins());
        assert_eq!(parameters.values().len(), 1);
        assert_eq!(
            where_sql(&p),
            "NOT EXISTS(SELECT 1 FROM \"person\" AS \"e_sub0\" \
             LEFT JOIN \"person_tag\" AS \"e_sub0_tags_in\" ON \"e_sub0_tags_in\".\"person_id\" = \"e_sub0\".\"id\" \
             WHERE \"e_sub0\".\"id\" = \"e\".\"id\" AND \"e_sub0_tags_in\".\"tag\" IN ('x'))"
        );
    }

    #[test]
    fn negated_multi_value_membership_keeps_its_count() {
        let criterion = Criterion::not(Criterion::any_of(["x", "y"]).unwrap()).unwrap();
        let p = compile_one("tags", criterion).unwrap();
        assert!(p.membership_count().is_none());
        let sql = where_sql(&p);
        assert!(sql.starts_with("NOT EXISTS("), "{sql}");
        assert!(
            sql.contains("GROUP BY \"e_sub0\".\"id\" HAVING COUNT(DISTINCT \"e_sub0_tags_in\".\"tag\") = 2"),
            "{sql}"
        );
    }

    #[test]
    fn negated_column_stays_row_level() {
        let registry = registry();
        let root = registry.require("person").unwrap();
        let mut resolver = PathResolver::new(&registry, root, "e");
        let mut parameters = Parameters::new();
        let criterion = Criterion::not(Numeric::gt(30)).unwrap();
        let p = compile(&mut resolver, "age", &criterion, &mut parameters).unwrap();
        let sql = where_sql(&p);
        assert!(sql.starts_with("NOT"), "{sql}");
        assert!(!sql.contains("EXISTS"), "{sql}");
        assert!(!resolver.has_joins());
        assert_eq!(parameters.values().len(), 1);
    }

    #[test]
    fn aggregate_targets_route_to_having() {
        let registry = registry();
        let root = registry.require("person").unwrap();
        let mut resolver = PathResolver::new(&registry, root, "e");
        let tags = resolver.resolve("@tags").unwrap();
        resolver.override_field(
            "tagCount",
            ResolvedExpr::aggregate(Func::count(tags.into_expr()), ValueType::Integer),
        );
        let mut parameters = Parameters::new();
        let p = compile(&mut resolver, "tagCount", &Criterion::from(2), &mut parameters).unwrap();
        assert_eq!(p.clause(), Clause::Having);
    }
}
