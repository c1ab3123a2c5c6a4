//! Database writer: table creation, additive schema evolution, and
//! batched row appends
//!
//! The writer owns the one read-write connection for the duration of an
//! ingestion run. Tables are created once and only ever grow new columns;
//! each file's rows are committed in a single transaction so a failure
//! rolls back exactly that file.

use std::path::Path;

use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use casebase_core::{CaseError, Result, TableSchema, Value};

use crate::sql::{quote_ident, table_columns};

/// Upper bound on bound parameters per INSERT statement, kept under
/// SQLite's host-parameter limit.
const MAX_BATCH_PARAMS: usize = 900;

/// Owner of the read-write database connection
pub struct DatabaseWriter {
    conn: Connection,
}

impl DatabaseWriter {
    /// Open (creating if necessary) the target database file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            CaseError::Write(format!("failed to open database {}: {}", path.display(), e))
        })?;
        Ok(Self { conn })
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create `table` if absent; otherwise add any columns of `schema`
    /// the table does not have yet. Existing columns are never dropped
    /// or retyped. Returns true when the table was newly created.
    pub fn ensure_table(&mut self, table: &str, schema: &TableSchema) -> Result<bool> {
        let existing = table_columns(&self.conn, table)?;
        if existing.is_empty() {
            let columns: Vec<String> = schema
                .iter()
                .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql_decl()))
                .collect();
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                quote_ident(table),
                columns.join(", ")
            );
            self.conn.execute(&sql, [])?;
            info!("created table {}", table);
            return Ok(true);
        }

        for (name, ty) in schema.iter() {
            if existing.iter().any(|c| c == name) {
                continue;
            }
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_ident(table),
                quote_ident(name),
                ty.sql_decl()
            );
            self.conn.execute(&sql, [])?;
            debug!("added column {} to table {}", name, table);
        }
        Ok(false)
    }

    /// Append `rows` to `table` within a single transaction: either every
    /// row commits or none do. The insert names the schema's columns
    /// explicitly, so tables that have evolved wider than this file get
    /// NULL in the columns the file doesn't carry.
    pub fn append_rows(
        &mut self,
        table: &str,
        schema: &TableSchema,
        rows: &[Vec<Value>],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let cols = schema.len();
        let column_list = schema
            .column_names()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");
        let row_placeholders = format!("({})", vec!["?"; cols].join(", "));
        let rows_per_batch = (MAX_BATCH_PARAMS / cols.max(1)).max(1);

        let tx = self.conn.transaction()?;
        for chunk in rows.chunks(rows_per_batch) {
            let values = vec![row_placeholders.as_str(); chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                quote_ident(table),
                column_list,
                values
            );
            // Full-size chunks all share one cached statement
            let mut stmt = tx.prepare_cached(&sql)?;
            stmt.execute(params_from_iter(chunk.iter().flatten()))?;
        }
        tx.commit()?;

        debug!("inserted {} rows into {}", rows.len(), table);
        Ok(rows.len() as u64)
    }
}
