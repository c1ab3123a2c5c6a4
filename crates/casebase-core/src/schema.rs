//! Table schemas: ordered column name to column type mappings

use indexmap::IndexMap;

use crate::value::ColumnType;

/// Schema of one table: column names mapped to inferred types,
/// in stable insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    columns: IndexMap<String, ColumnType>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self {
            columns: IndexMap::new(),
        }
    }

    /// Add a column, replacing the type of an existing column of the same
    /// name. Returns false if a column of that name was already present.
    pub fn insert(&mut self, name: impl Into<String>, ty: ColumnType) -> bool {
        self.columns.insert(name.into(), ty).is_none()
    }

    pub fn get(&self, name: &str) -> Option<ColumnType> {
        self.columns.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in schema order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// (name, type) pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, ColumnType)> for TableSchema {
    fn from_iter<I: IntoIterator<Item = (String, ColumnType)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
