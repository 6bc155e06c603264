//! Numeric comparison criterion.

use sea_query::{Expr, SimpleExpr, Value};

use super::{Binder, Literal};
use crate::error::EngineResult;
use crate::schema::ValueType;

/// Compare a numeric field against one or two operands.
///
/// Operands may be given as text; they are parsed to the field's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Numeric {
    Eq(Literal),
    Lt(Literal),
    Gt(Literal),
    /// Inclusive range.
    Between(Literal, Literal),
}

impl Numeric {
    pub fn eq(value: impl Into<Literal>) -> Self {
        Numeric::Eq(value.into())
    }

    pub fn lt(value: impl Into<Literal>) -> Self {
        Numeric::Lt(value.into())
    }

    pub fn gt(value: impl Into<Literal>) -> Self {
        Numeric::Gt(value.into())
    }

    pub fn between(low: impl Into<Literal>, high: impl Into<Literal>) -> Self {
        Numeric::Between(low.into(), high.into())
    }

    /// Parse an operand to a value of the declared numeric type.
    pub fn parse(value: &Literal, value_type: &ValueType) -> Result<Value, String> {
        match value_type {
            ValueType::Integer => parse_integer(value).map(Value::from),
            ValueType::Float => parse_float(value).map(Value::from),
            other => Err(format!("declared type {other} is not numeric")),
        }
    }

    pub(crate) fn build(
        &self,
        expr: &SimpleExpr,
        value_type: &ValueType,
        binder: &mut Binder<'_>,
    ) -> EngineResult<SimpleExpr> {
        let mut operand = |lit: &Literal| -> EngineResult<SimpleExpr> {
            let value = Self::parse(lit, value_type).map_err(|reason| binder.invalid(reason))?;
            Ok(binder.bind(value))
        };

        let target = Expr::expr(expr.clone());
        Ok(match self {
            Numeric::Eq(v) => target.eq(operand(v)?),
            Numeric::Lt(v) => target.lt(operand(v)?),
            Numeric::Gt(v) => target.gt(operand(v)?),
            Numeric::Between(low, high) => {
                let low = operand(low)?;
                let high = operand(high)?;
                target.between(low, high)
            }
        })
    }
}

fn parse_integer(value: &Literal) -> Result<i64, String> {
    match value {
        Literal::Integer(i) => Ok(*i),
        Literal::Float(f) => float_to_integer(*f),
        Literal::Text(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Ok(i),
                Err(_) => s
                    .parse::<f64>()
                    .map_err(|_| format!("'{s}' is not a number"))
                    .and_then(float_to_integer),
            }
        }
        Literal::Bool(b) => Err(format!("{b} is not a number")),
    }
}

fn float_to_integer(f: f64) -> Result<i64, String> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Ok(f as i64)
    } else {
        Err(format!("{f} is not an integer"))
    }
}

fn parse_float(value: &Literal) -> Result<f64, String> {
    let f = match value {
        Literal::Integer(i) => *i as f64,
        Literal::Float(f) => *f,
        Literal::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a number", s.trim()))?,
        Literal::Bool(b) => return Err(format!("{b} is not a number")),
    };
    if f.is_finite() {
        Ok(f)
    } else {
        Err(format!("{f} is not finite"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::criteria::Parameters;
    use sea_query::{Alias, PostgresQueryBuilder, Query};

    fn render(cond: SimpleExpr) -> String {
        Query::select()
            .column(Alias::new("id"))
            .from(Alias::new("person"))
            .and_where(cond)
            .to_string(PostgresQueryBuilder)
    }

    fn age() -> SimpleExpr {
        Expr::col(Alias::new("age")).into()
    }

    #[test]
    fn parses_text_to_declared_type() {
        assert_eq!(
            Numeric::parse(&Literal::from(" 42 "), &ValueType::Integer),
            Ok(Value::from(42_i64))
        );
        assert_eq!(
            Numeric::parse(&Literal::from("2.0"), &ValueType::Integer),
            Ok(Value::from(2_i64))
        );
        assert_eq!(
            Numeric::parse(&Literal::from("2.5"), &ValueType::Float),
            Ok(Value::from(2.5_f64))
        );
        assert!(Numeric::parse(&Literal::from("2.5"), &ValueType::Integer).is_err());
        assert!(Numeric::parse(&Literal::from("abc"), &ValueType::Float).is_err());
        assert!(Numeric::parse(&Literal::from(1_i64), &ValueType::Text).is_err());
    }

    #[test]
    fn between_binds_two_parameters() {
        let mut params = Parameters::new();
        let cond = Numeric::between(18, "65")
            .build(&age(), &ValueType::Integer, &mut params.binder("age"))
            .unwrap();
        assert_eq!(params.len(), 2);
        let sql = render(cond);
        assert!(sql.contains("\"age\" BETWEEN 18 AND 65"), "{sql}");
    }

    #[test]
    fn invalid_operand_is_invalid_criterion() {
        let mut params = Parameters::new();
        let err = Numeric::gt("lots")
            .build(&age(), &ValueType::Integer, &mut params.binder("age"))
            .unwrap_err();
        assert!(err.is_soft());
        assert!(params.is_empty());
    }
}
