//! Filter criteria.
//!
//! A [`Criterion`] is the value half of a `field path → criterion` filter.
//! Plain literals are compiled by shorthand against the field's declared type;
//! the structured variants carry their own parse-and-build rules:
//! - Numeric: equals / less than / greater than / between
//! - Enumerated: match enum variants by name or ordinal
//! - Bool: boolean match with lenient parsing
//! - IgnoreCase: case-insensitive equality or wildcard match

mod boolean;
mod enumerated;
mod ignore_case;
mod numeric;

use std::fmt;

use sea_query::{SimpleExpr, Value};

use crate::error::{EngineError, EngineResult};

pub use boolean::Bool;
pub use enumerated::Enumerated;
pub use ignore_case::{IgnoreCase, MatchMode};
pub use numeric::Numeric;

/// A primitive criterion operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Literal {
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Integer(_) => "integer",
            Literal::Float(_) => "float",
            Literal::Text(_) => "text",
            Literal::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Text(s) => write!(f, "{s:?}"),
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Integer(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Literal::Integer(i64::from(v))
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Text(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::Text(v)
    }
}

/// The value side of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Matches NULL.
    Null,
    /// Plain value, compiled by shorthand against the declared type.
    Value(Literal),
    Not(Negation),
    /// Any of the alternatives; all of them for collection-valued fields.
    AnyOf(Alternatives),
    Numeric(Numeric),
    Enumerated(Enumerated),
    Bool(Bool),
    IgnoreCase(IgnoreCase),
}

/// A negated criterion. Never wraps another negation.
#[derive(Debug, Clone, PartialEq)]
pub struct Negation(Box<Criterion>);

impl Negation {
    pub fn inner(&self) -> &Criterion {
        &self.0
    }
}

/// A non-empty list of criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternatives(Vec<Criterion>);

impl Alternatives {
    pub fn items(&self) -> &[Criterion] {
        &self.0
    }
}

impl Criterion {
    /// Negate a criterion. Double negation must be collapsed by the caller.
    pub fn not(criterion: impl Into<Criterion>) -> EngineResult<Criterion> {
        match criterion.into() {
            Criterion::Not(_) => Err(EngineError::InvalidRequest(
                "double negation; use the inner criterion instead".to_string(),
            )),
            other => Ok(Criterion::Not(Negation(Box::new(other)))),
        }
    }

    /// Negate, collapsing `Not(Not(x))` to `x`.
    pub fn negate(self) -> Criterion {
        match self {
            Criterion::Not(Negation(inner)) => *inner,
            other => Criterion::Not(Negation(Box::new(other))),
        }
    }

    /// Build a list criterion. An empty list is an error, not "match nothing".
    pub fn any_of<I, C>(items: I) -> EngineResult<Criterion>
    where
        I: IntoIterator<Item = C>,
        C: Into<Criterion>,
    {
        let items: Vec<Criterion> = items.into_iter().map(Into::into).collect();
        if items.is_empty() {
            return Err(EngineError::InvalidRequest(
                "empty criterion list".to_string(),
            ));
        }
        Ok(Criterion::AnyOf(Alternatives(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Criterion::Null => "null",
            Criterion::Value(lit) => lit.type_name(),
            Criterion::Not(_) => "not",
            Criterion::AnyOf(_) => "list",
            Criterion::Numeric(_) => "numeric",
            Criterion::Enumerated(_) => "enumerated",
            Criterion::Bool(_) => "bool",
            Criterion::IgnoreCase(_) => "ignore_case",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Null => f.write_str("null"),
            Criterion::Value(lit) => write!(f, "{lit}"),
            Criterion::Not(n) => write!(f, "not({})", n.inner()),
            Criterion::AnyOf(alts) => {
                f.write_str("[")?;
                for (i, c) in alts.items().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("]")
            }
            Criterion::Numeric(n) => write!(f, "{n:?}"),
            Criterion::Enumerated(e) => write!(f, "{e:?}"),
            Criterion::Bool(b) => write!(f, "{b:?}"),
            Criterion::IgnoreCase(i) => write!(f, "{i:?}"),
        }
    }
}

impl From<Literal> for Criterion {
    fn from(v: Literal) -> Self {
        Criterion::Value(v)
    }
}

macro_rules! criterion_from_primitive {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Criterion {
                fn from(v: $ty) -> Self {
                    Criterion::Value(Literal::from(v))
                }
            }
        )*
    };
}

criterion_from_primitive!(i64, i32, f64, bool, &str, String);

impl From<Numeric> for Criterion {
    fn from(v: Numeric) -> Self {
        Criterion::Numeric(v)
    }
}

impl From<Enumerated> for Criterion {
    fn from(v: Enumerated) -> Self {
        Criterion::Enumerated(v)
    }
}

impl From<Bool> for Criterion {
    fn from(v: Bool) -> Self {
        Criterion::Bool(v)
    }
}

impl From<IgnoreCase> for Criterion {
    fn from(v: IgnoreCase) -> Self {
        Criterion::IgnoreCase(v)
    }
}

impl TryFrom<serde_json::Value> for Criterion {
    type Error = EngineError;

    /// Convert an untyped filter value, as submitted by a filter UI.
    fn try_from(value: serde_json::Value) -> EngineResult<Self> {
        use serde_json::Value as Json;

        Ok(match value {
            Json::Null => Criterion::Null,
            Json::Bool(b) => b.into(),
            Json::Number(n) => match n.as_i64() {
                Some(i) => i.into(),
                None => n.as_f64().map(Criterion::from).ok_or_else(|| {
                    EngineError::InvalidRequest(format!("unrepresentable number {n}"))
                })?,
            },
            Json::String(s) => s.into(),
            Json::Array(items) => Criterion::any_of(
                items
                    .into_iter()
                    .map(Criterion::try_from)
                    .collect::<EngineResult<Vec<_>>>()?,
            )?,
            Json::Object(_) => {
                return Err(EngineError::InvalidRequest(
                    "object filter values are not supported".to_string(),
                ));
            }
        })
    }
}

/// Collects bound parameter values for one plan build.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    values: Vec<(String, Value)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// A binder that names parameters after `field`.
    pub fn binder<'a>(&'a mut self, field: &'a str) -> Binder<'a> {
        Binder {
            field,
            parameters: self,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bound values with their generated names, in binding order.
    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }
}

/// Binds operands of one field's criterion.
pub struct Binder<'a> {
    field: &'a str,
    parameters: &'a mut Parameters,
}

impl Binder<'_> {
    pub fn field(&self) -> &str {
        self.field
    }

    /// Register `value` as a query parameter and return its placeholder expression.
    pub fn bind(&mut self, value: impl Into<Value>) -> SimpleExpr {
        SimpleExpr::Value(self.bind_value(value))
    }

    /// Register `value` and return it, for list operands such as `IN`.
    pub fn bind_value(&mut self, value: impl Into<Value>) -> Value {
        let value = value.into();
        let name = format!(
            "{}_{}",
            self.field.replace('.', "_"),
            self.parameters.values.len()
        );
        self.parameters.values.push((name, value.clone()));
        value
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> EngineError {
        EngineError::invalid_criterion(self.field, reason)
    }
}
