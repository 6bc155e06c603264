//! Enumerated match criterion.

use sea_query::{Expr, SimpleExpr, Value};

use super::{Binder, Literal};
use crate::error::EngineResult;
use crate::schema::{EnumType, ValueType};

/// Match an enum field against one or more variants.
///
/// Candidates are variant names (case-insensitive) or ordinals.
#[derive(Debug, Clone, PartialEq)]
pub struct Enumerated {
    candidates: Vec<Literal>,
}

impl Enumerated {
    pub fn value(candidate: impl Into<Literal>) -> Self {
        Self {
            candidates: vec![candidate.into()],
        }
    }

    pub fn any_of<I, L>(candidates: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn candidates(&self) -> &[Literal] {
        &self.candidates
    }

    /// Resolve one candidate to a variant name of `enum_type`.
    pub fn parse<'e>(candidate: &Literal, enum_type: &'e EnumType) -> Result<&'e str, String> {
        let variant = match candidate {
            Literal::Text(s) => enum_type.resolve(s),
            Literal::Integer(i) => enum_type.by_ordinal(*i),
            other => return Err(format!("{other} cannot name a variant of {}", enum_type.name())),
        };
        variant.ok_or_else(|| format!("{candidate} is not a variant of {}", enum_type.name()))
    }

    pub(crate) fn build(
        &self,
        expr: &SimpleExpr,
        value_type: &ValueType,
        binder: &mut Binder<'_>,
    ) -> EngineResult<SimpleExpr> {
        let ValueType::Enum(enum_type) = value_type else {
            return Err(binder.invalid(format!("declared type {value_type} is not an enum")));
        };

        let mut variants: Vec<&str> = Vec::with_capacity(self.candidates.len());
        for candidate in &self.candidates {
            let variant =
                Self::parse(candidate, enum_type).map_err(|reason| binder.invalid(reason))?;
            if !variants.contains(&variant) {
                variants.push(variant);
            }
        }

        let target = Expr::expr(expr.clone());
        match variants.as_slice() {
            [] => Err(binder.invalid("no enum candidates given")),
            [single] => Ok(target.eq(binder.bind(*single))),
            many => {
                let values: Vec<Value> = many.iter().map(|v| binder.bind_value(*v)).collect();
                Ok(target.is_in(values))
            }
        }
    }
}
