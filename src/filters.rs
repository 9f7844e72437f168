//! Compiles a dashboard [`Filter`] into a SQL predicate over `users u`.
//!
//! Placeholders are never numbered by hand: a condition's placeholder is its
//! position in the parameter list, and [`Bindings`] continues the numbering
//! for parameters a query appends after the predicate (time anchors, limits).

use crate::db::SqlValue;
use crate::models::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    AtLeast,
    AtMost,
    Equals,
}

impl Comparison {
    fn operator(self) -> &'static str {
        match self {
            Self::AtLeast => ">=",
            Self::AtMost => "<=",
            Self::Equals => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    column: &'static str,
    comparison: Comparison,
}

/// AND-joined conditions with their bound values, in append order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
    params: Vec<SqlValue>,
}

impl Predicate {
    pub fn builder() -> PredicateBuilder {
        PredicateBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Rendered conditions, e.g. `u.plan = ?3`.
    pub fn conditions(&self) -> Vec<String> {
        self.conditions
            .iter()
            .enumerate()
            .map(|(index, condition)| {
                format!("{} {} ?{}", condition.column, condition.comparison.operator(), index + 1)
            })
            .collect()
    }

    /// ` WHERE a AND b ...`, or an empty string when unconstrained.
    pub fn where_clause(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions().join(" AND "))
        }
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn bindings(&self) -> Bindings {
        Bindings {
            params: self.params.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PredicateBuilder {
    predicate: Predicate,
}

impl PredicateBuilder {
    pub fn at_least<V: Into<SqlValue>>(self, column: &'static str, value: Option<V>) -> Self {
        self.push(column, Comparison::AtLeast, value)
    }

    pub fn at_most<V: Into<SqlValue>>(self, column: &'static str, value: Option<V>) -> Self {
        self.push(column, Comparison::AtMost, value)
    }

    pub fn equals<V: Into<SqlValue>>(self, column: &'static str, value: Option<V>) -> Self {
        self.push(column, Comparison::Equals, value)
    }

    fn push<V: Into<SqlValue>>(mut self, column: &'static str, comparison: Comparison, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.predicate.conditions.push(Condition { column, comparison });
            self.predicate.params.push(value.into());
        }
        self
    }

    pub fn build(self) -> Predicate {
        self.predicate
    }
}

/// Parameter list seeded from a predicate; further binds take the next
/// placeholder number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    params: Vec<SqlValue>,
}

impl Bindings {
    pub fn bind(&mut self, value: impl Into<SqlValue>) -> String {
        self.params.push(value.into());
        format!("?{}", self.params.len())
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

/// Time bounds bind in storage format, so they compare correctly against
/// stored `created_at` text.
pub fn compile(filter: &Filter) -> Predicate {
    Predicate::builder()
        .at_least("u.created_at", filter.from)
        .at_most("u.created_at", filter.to)
        .equals("u.plan", filter.plan.as_deref())
        .equals("u.provider", filter.provider.as_deref())
        .equals("u.subscription_status", filter.subscription_status.as_deref())
        .build()
}
