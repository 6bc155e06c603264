//! WHERE / HAVING routing and GROUP BY inference.

use sea_query::{Cond, SelectStatement, SimpleExpr};

use super::predicate::{Clause, CompiledPredicate};

/// GROUP BY list. Adding an expression twice is a no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupBy {
    exprs: Vec<SimpleExpr>,
}

impl GroupBy {
    /// Add `expr` unless already present. Returns whether it was added.
    pub fn add(&mut self, expr: SimpleExpr) -> bool {
        if self.exprs.contains(&expr) {
            return false;
        }
        self.exprs.push(expr);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn exprs(&self) -> &[SimpleExpr] {
        &self.exprs
    }
}

/// WHERE and HAVING conjuncts plus the grouping they need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Restriction {
    conditions: Vec<SimpleExpr>,
    having: Vec<SimpleExpr>,
    group_by: GroupBy,
}

impl Restriction {
    /// Start from caller-supplied WHERE conditions.
    pub fn new(conditions: Vec<SimpleExpr>) -> Self {
        Self {
            conditions,
            ..Self::default()
        }
    }

    /// Route compiled predicates to WHERE or HAVING.
    ///
    /// Required predicates are conjoined; optional predicates form a single OR
    /// group conjoined after them. The optional group goes to HAVING as a whole
    /// when any member is an aggregate. Required membership tests over several
    /// values add their count to HAVING. Any HAVING conjunct groups by `identity`.
    pub fn route(
        mut self,
        required: Vec<CompiledPredicate>,
        optional: Vec<CompiledPredicate>,
        identity: SimpleExpr,
    ) -> Self {
        for predicate in required {
            let count = predicate.count_predicate();
            match predicate.clause() {
                Clause::Where => self.conditions.push(predicate.expr().clone()),
                Clause::Having => self.having.push(predicate.expr().clone()),
            }
            if let Some(count) = count {
                self.having.push(count);
            }
        }

        if !optional.is_empty() {
            let to_having = optional.iter().any(|p| p.clause() == Clause::Having);
            let group = match optional.as_slice() {
                [only] => only.expr().clone(),
                many => many
                    .iter()
                    .fold(Cond::any(), |cond, p| cond.add(p.expr().clone()))
                    .into(),
            };
            if to_having {
                self.having.push(group);
            } else {
                self.conditions.push(group);
            }
        }

        if !self.having.is_empty() {
            self.group_by.add(identity);
        }
        self
    }

    pub fn group_by(&self) -> &GroupBy {
        &self.group_by
    }

    pub fn group_by_mut(&mut self) -> &mut GroupBy {
        &mut self.group_by
    }

    pub fn has_having(&self) -> bool {
        !self.having.is_empty()
    }

    /// Whether the restriction constrains or groups rows at all.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.having.is_empty() && self.group_by.is_empty()
    }

    pub fn apply(&self, query: &mut SelectStatement) {
        for condition in &self.conditions {
            query.and_where(condition.clone());
        }
        if !self.group_by.is_empty() {
            query.add_group_by(self.group_by.exprs.iter().cloned());
        }
        for condition in &self.having {
            query.and_having(condition.clone());
        }
    }
}
