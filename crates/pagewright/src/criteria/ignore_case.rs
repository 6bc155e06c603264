//! Case-insensitive text criterion.
//!
//! Both sides are lower-cased. `Exact` patterns may carry `*` (any run) and
//! `?` (any single character) wildcards; the other modes match the pattern
//! literally at the start, the end, or anywhere in the value.

use sea_query::{Expr, Func, LikeExpr, SimpleExpr};

use super::Binder;
use crate::error::EngineResult;
use crate::schema::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    StartsWith,
    EndsWith,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreCase {
    pattern: String,
    mode: MatchMode,
}

impl IgnoreCase {
    pub fn value(pattern: impl Into<String>) -> Self {
        Self::with_mode(pattern, MatchMode::Exact)
    }

    pub fn starts_with(pattern: impl Into<String>) -> Self {
        Self::with_mode(pattern, MatchMode::StartsWith)
    }

    pub fn ends_with(pattern: impl Into<String>) -> Self {
        Self::with_mode(pattern, MatchMode::EndsWith)
    }

    pub fn contains(pattern: impl Into<String>) -> Self {
        Self::with_mode(pattern, MatchMode::Contains)
    }

    pub fn with_mode(pattern: impl Into<String>, mode: MatchMode) -> Self {
        Self {
            pattern: pattern.into(),
            mode,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// The LIKE pattern for this criterion, or `None` when plain equality suffices.
    fn like_pattern(&self) -> Option<String> {
        let lowered = self.pattern.to_lowercase();
        let escaped = escape_like_wildcards(&lowered);
        match self.mode {
            MatchMode::Exact if !lowered.contains(['*', '?']) => None,
            MatchMode::Exact => Some(escaped.replace('*', "%").replace('?', "_")),
            MatchMode::StartsWith => Some(format!("{escaped}%")),
            MatchMode::EndsWith => Some(format!("%{escaped}")),
            MatchMode::Contains => Some(format!("%{escaped}%")),
        }
    }

    pub(crate) fn build(
        &self,
        expr: &SimpleExpr,
        value_type: &ValueType,
        binder: &mut Binder<'_>,
    ) -> EngineResult<SimpleExpr> {
        if !matches!(value_type, ValueType::Text | ValueType::Enum(_)) {
            return Err(binder.invalid(format!("declared type {value_type} is not text")));
        }

        let lowered = Expr::expr(Func::lower(expr.clone()));
        Ok(match self.like_pattern() {
            None => lowered.eq(binder.bind(self.pattern.to_lowercase())),
            Some(pattern) => {
                binder.bind_value(pattern.as_str());
                lowered.like(LikeExpr::new(pattern).escape('\\'))
            }
        })
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
