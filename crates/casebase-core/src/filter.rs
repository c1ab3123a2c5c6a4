//! Query filters: per-column constraints combined by conjunction

use indexmap::IndexMap;

use crate::value::Value;

/// Constraint on a single column
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Exact match
    Equals(Value),
    /// Substring match (case-sensitive, as stored)
    Contains(String),
    /// Inclusive range; either bound may be open
    Range {
        min: Option<Value>,
        max: Option<Value>,
    },
}

/// A set of column constraints, combined with AND.
///
/// Constraint order is preserved so the generated SQL is deterministic
/// for a given filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    constraints: IndexMap<String, Constraint>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require an exact value in `column`
    pub fn equals(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints
            .insert(column.into(), Constraint::Equals(value.into()));
        self
    }

    /// Require `column` to contain `needle` as a substring
    pub fn contains(mut self, column: impl Into<String>, needle: impl Into<String>) -> Self {
        self.constraints
            .insert(column.into(), Constraint::Contains(needle.into()));
        self
    }

    /// Require `column` to lie within the inclusive range `[min, max]`
    pub fn range(
        mut self,
        column: impl Into<String>,
        min: Option<Value>,
        max: Option<Value>,
    ) -> Self {
        self.constraints
            .insert(column.into(), Constraint::Range { min, max });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// (column, constraint) pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Constraint)> {
        self.constraints.iter().map(|(k, v)| (k.as_str(), v))
    }
}
