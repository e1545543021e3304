//! Abstract query model handed over by the resource framework.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A single filter node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Equal { field: String, value: Value },
    NotEqual { field: String, value: Value },
    GreaterThan { field: String, value: Value },
    GreaterOrEqual { field: String, value: Value },
    LowerThan { field: String, value: Value },
    LowerOrEqual { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    NotIn { field: String, values: Vec<Value> },
    Exists { field: String },
    NotExists { field: String },
    Regex { field: String, pattern: String },
    And(Vec<Expression>),
    Or(Vec<Expression>),
    /// Matches every row. Required to clear a whole table.
    All,
}

impl Expression {
    pub fn equal(field: &str, value: impl Into<Value>) -> Self {
        Expression::Equal {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn not_equal(field: &str, value: impl Into<Value>) -> Self {
        Expression::NotEqual {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn greater_than(field: &str, value: impl Into<Value>) -> Self {
        Expression::GreaterThan {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn greater_or_equal(field: &str, value: impl Into<Value>) -> Self {
        Expression::GreaterOrEqual {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn lower_than(field: &str, value: impl Into<Value>) -> Self {
        Expression::LowerThan {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn lower_or_equal(field: &str, value: impl Into<Value>) -> Self {
        Expression::LowerOrEqual {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn is_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Expression::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Expression::NotIn {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn exists(field: &str) -> Self {
        Expression::Exists {
            field: field.to_string(),
        }
    }

    pub fn not_exists(field: &str) -> Self {
        Expression::NotExists {
            field: field.to_string(),
        }
    }

    pub fn regex(field: &str, pattern: &str) -> Self {
        Expression::Regex {
            field: field.to_string(),
            pattern: pattern.to_string(),
        }
    }

    pub fn and(children: impl IntoIterator<Item = Expression>) -> Self {
        Expression::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Or(children.into_iter().collect())
    }
}

/// Top-level filter: every expression must hold. Empty means no filter.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate(pub Vec<Expression>);

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, expression: Expression) -> Self {
        self.0.push(expression);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expressions(&self) -> &[Expression] {
        &self.0
    }
}

impl From<Expression> for Predicate {
    fn from(expression: Expression) -> Self {
        Predicate(vec![expression])
    }
}

impl FromIterator<Expression> for Predicate {
    fn from_iter<I: IntoIterator<Item = Expression>>(iter: I) -> Self {
        Predicate(iter.into_iter().collect())
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub name: String,
    pub reversed: bool,
}

impl SortField {
    pub fn asc(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reversed: false,
        }
    }

    pub fn desc(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reversed: true,
        }
    }
}

/// Ordered sort keys. Empty means identifier order.
pub type Sort = Vec<SortField>;

/// Pagination window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub offset: usize,
    /// `None` means no limit.
    pub limit: Option<usize>,
}

impl Window {
    pub fn new(offset: usize, limit: Option<usize>) -> Self {
        Self { offset, limit }
    }
}

/// Query builder for composable, immutable queries
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub predicate: Predicate,
    pub sort: Sort,
    pub window: Option<Window>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predicate(mut self, predicate: impl Into<Predicate>) -> Self {
        self.predicate = predicate.into();
        self
    }

    pub fn with_condition(mut self, expression: Expression) -> Self {
        self.predicate.0.push(expression);
        self
    }

    pub fn with_sort(mut self, field: SortField) -> Self {
        self.sort.push(field);
        self
    }

    pub fn with_window(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.window = Some(Window::new(offset, limit));
        self
    }

    /// Offset reported back in the item list.
    pub fn offset(&self) -> usize {
        self.window.map_or(0, |w| w.offset)
    }
}
