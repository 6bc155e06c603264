use sea_query::{Expr, SimpleExpr};

use super::{Binder, Literal};
use crate::error::EngineResult;
use crate::schema::ValueType;

/// Boolean match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bool {
    value: bool,
}

impl Bool {
    pub fn is(value: bool) -> Self {
        Self { value }
    }

    pub fn value(&self) -> bool {
        self.value
    }

    /// Lenient parse: booleans, 0/1, and true/false/yes/no in any case.
    pub fn parse(value: &Literal) -> Result<Self, String> {
        let parsed = match value {
            Literal::Bool(b) => Some(*b),
            Literal::Integer(0) => Some(false),
            Literal::Integer(1) => Some(true),
            Literal::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        parsed
            .map(Self::is)
            .ok_or_else(|| format!("{value} is not a boolean"))
    }

    pub(crate) fn build(
        &self,
        expr: &SimpleExpr,
        value_type: &ValueType,
        binder: &mut Binder<'_>,
    ) -> EngineResult<SimpleExpr> {
        if *value_type != ValueType::Boolean {
            return Err(binder.invalid(format!("declared type {value_type} is not boolean")));
        }
        Ok(Expr::expr(expr.clone()).eq(binder.bind(self.value)))
    }
}
