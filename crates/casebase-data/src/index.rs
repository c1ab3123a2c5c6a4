//! Secondary index configuration and creation
//!
//! Indexes are built once, after every file has been loaded, so bulk
//! inserts never pay per-row index maintenance.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use casebase_core::{CaseError, Result};

use crate::sql::{quote_ident, table_columns};

/// Standard search columns of the case records: case name, docket
/// number, court, and cause of action.
pub const DEFAULT_INDEX_COLUMNS: [&str; 4] = ["案件名称", "案号", "法院", "案由"];

/// Which columns to index, per table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Table name mapped to the columns to index in it
    pub tables: BTreeMap<String, Vec<String>>,
}

impl IndexConfig {
    /// Load a configuration from a JSON file of the shape
    /// `{"tables": {"civil": ["案号", "法院"]}}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| CaseError::Parse {
            file: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// The standard case-record search columns, applied to every given
    /// table.
    pub fn case_defaults<'a>(tables: impl IntoIterator<Item = &'a str>) -> Self {
        let columns: Vec<String> = DEFAULT_INDEX_COLUMNS.iter().map(|c| c.to_string()).collect();
        Self {
            tables: tables
                .into_iter()
                .map(|t| (t.to_string(), columns.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|columns| columns.is_empty())
    }
}

/// Creates the configured indexes over a populated database
pub struct IndexBuilder<'a> {
    conn: &'a Connection,
    config: &'a IndexConfig,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(conn: &'a Connection, config: &'a IndexConfig) -> Self {
        Self { conn, config }
    }

    /// Create one index per configured (table, column) pair, returning
    /// the names actually created. Pairs whose table or column does not
    /// exist are skipped with a warning; indexes that already exist are
    /// left untouched.
    pub fn build(&self) -> Result<Vec<String>> {
        let mut created = Vec::new();
        for (table, columns) in &self.config.tables {
            let existing = table_columns(self.conn, table)?;
            if existing.is_empty() {
                warn!("skipping indexes for missing table {}", table);
                continue;
            }
            for column in columns {
                if !existing.iter().any(|c| c == column) {
                    warn!("table {} has no column {}, skipping index", table, column);
                    continue;
                }
                let index_name = format!("idx_{}_{}", table, column);
                if self.index_exists(&index_name)? {
                    debug!("index {} already exists", index_name);
                    continue;
                }
                let sql = format!(
                    "CREATE INDEX {} ON {} ({})",
                    quote_ident(&index_name),
                    quote_ident(table),
                    quote_ident(column)
                );
                self.conn.execute(&sql, [])?;
                info!("created index {}", index_name);
                created.push(index_name);
            }
        }
        Ok(created)
    }

    fn index_exists(&self, name: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1")?;
        Ok(stmt.exists([name])?)
    }
}
