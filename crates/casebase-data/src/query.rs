//! Read-only query service over an ingested database
//!
//! Opened after ingestion completes, on its own read-only connection.
//! Filters compile to a parameterized conjunction of per-column
//! predicates; every call re-executes its query against storage.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OpenFlags};

use casebase_core::{CaseError, Constraint, QueryFilter, Result, Value};

use crate::sql::{quote_ident, table_columns};

/// Result of one row query: column names plus matching rows in natural
/// storage order.
#[derive(Debug)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Read-only access to a populated case database
#[derive(Debug)]
pub struct QueryService {
    conn: Connection,
}

impl QueryService {
    /// Open the database read-only. Fails with `NotFound` when the file
    /// does not exist.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(CaseError::NotFound(format!(
                "database {} does not exist",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| {
                CaseError::Query(format!("failed to open database {}: {}", path.display(), e))
            })?;
        Ok(Self { conn })
    }

    /// Rows of `table` matching every constraint in `filter`, up to
    /// `limit` if given.
    pub fn query(
        &self,
        table: &str,
        filter: &QueryFilter,
        limit: Option<usize>,
    ) -> Result<QueryRows> {
        let columns = self.columns_of(table)?;
        for (column, _) in filter.iter() {
            if !columns.iter().any(|c| c == column) {
                return Err(CaseError::Query(format!(
                    "table {} has no column {}",
                    table, column
                )));
            }
        }

        let mut sql = format!("SELECT * FROM {}", quote_ident(table));
        let mut params: Vec<Value> = Vec::new();
        let mut clauses: Vec<String> = Vec::new();
        for (column, constraint) in filter.iter() {
            match constraint {
                Constraint::Equals(value) => {
                    clauses.push(format!("{} = ?", quote_ident(column)));
                    params.push(value.clone());
                }
                Constraint::Contains(needle) => {
                    clauses.push(format!("{} LIKE ? ESCAPE '\\'", quote_ident(column)));
                    params.push(Value::Text(format!("%{}%", escape_like(needle))));
                }
                Constraint::Range { min, max } => {
                    if let Some(min) = min {
                        clauses.push(format!("{} >= ?", quote_ident(column)));
                        params.push(min.clone());
                    }
                    if let Some(max) = max {
                        clauses.push(format!("{} <= ?", quote_ident(column)));
                        params.push(max.clone());
                    }
                }
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| CaseError::Query(e.to_string()))?;
        let mut raw = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| CaseError::Query(e.to_string()))?;

        let mut rows = Vec::new();
        while let Some(row) = raw.next().map_err(|e| CaseError::Query(e.to_string()))? {
            let mut record = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| CaseError::Query(e.to_string()))?;
                record.push(decode_value(value));
            }
            rows.push(record);
        }
        Ok(QueryRows { columns, rows })
    }

    /// Unique non-null values of `column` in `table`, in unspecified
    /// order.
    pub fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<Value>> {
        let columns = self.columns_of(table)?;
        if !columns.iter().any(|c| c == column) {
            return Err(CaseError::Query(format!(
                "table {} has no column {}",
                table, column
            )));
        }

        let sql = format!(
            "SELECT DISTINCT {c} FROM {t} WHERE {c} IS NOT NULL",
            c = quote_ident(column),
            t = quote_ident(table)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| CaseError::Query(e.to_string()))?;
        let mut raw = stmt
            .query([])
            .map_err(|e| CaseError::Query(e.to_string()))?;

        let mut values = Vec::new();
        while let Some(row) = raw.next().map_err(|e| CaseError::Query(e.to_string()))? {
            let value = row
                .get_ref(0)
                .map_err(|e| CaseError::Query(e.to_string()))?;
            values.push(decode_value(value));
        }
        Ok(values)
    }

    fn columns_of(&self, table: &str) -> Result<Vec<String>> {
        let columns =
            table_columns(&self.conn, table).map_err(|e| CaseError::Query(e.to_string()))?;
        if columns.is_empty() {
            return Err(CaseError::NotFound(format!(
                "table {} does not exist",
                table
            )));
        }
        Ok(columns)
    }
}

fn decode_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

/// Escape LIKE metacharacters so a needle matches itself literally
fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use casebase_core::ErrorKind;
    use std::path::PathBuf;

    fn seed_database(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("cases.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE civil (case_id INTEGER, court TEXT, amount REAL);
             INSERT INTO civil VALUES
                 (1, '广州中院', 120.5),
                 (2, '深圳中院', 80.0),
                 (3, '广州中院', NULL),
                 (4, NULL, 15.25);",
        )
        .unwrap();
        path
    }

    #[test]
    fn missing_database_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = QueryService::open(&dir.path().join("absent.db")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn unfiltered_query_returns_all_rows() {
        let dir = tempfile::tempdir().unwrap();
        let service = QueryService::open(&seed_database(&dir)).unwrap();

        let result = service.query("civil", &QueryFilter::new(), None).unwrap();
        assert_eq!(result.columns, vec!["case_id", "court", "amount"]);
        assert_eq!(result.rows.len(), 4);
        assert_eq!(result.rows[0][0], Value::Integer(1));
        assert_eq!(result.rows[2][2], Value::Null);
    }

    #[test]
    fn equality_and_range_filters_conjoin() {
        let dir = tempfile::tempdir().unwrap();
        let service = QueryService::open(&seed_database(&dir)).unwrap();

        let filter = QueryFilter::new()
            .equals("court", "广州中院")
            .range("amount", Some(Value::Real(100.0)), None);
        let result = service.query("civil", &filter, None).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][0], Value::Integer(1));
    }

    #[test]
    fn contains_filter_matches_substrings() {
        let dir = tempfile::tempdir().unwrap();
        let service = QueryService::open(&seed_database(&dir)).unwrap();

        let filter = QueryFilter::new().contains("court", "广州");
        let result = service.query("civil", &filter, None).unwrap();
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn contains_treats_metacharacters_literally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cases.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE t (name TEXT);
             INSERT INTO t VALUES ('100%'), ('100x'), ('a_b'), ('axb');",
        )
        .unwrap();
        drop(conn);

        let service = QueryService::open(&path).unwrap();
        let percent = service
            .query("t", &QueryFilter::new().contains("name", "100%"), None)
            .unwrap();
        assert_eq!(percent.rows.len(), 1);
        let underscore = service
            .query("t", &QueryFilter::new().contains("name", "a_b"), None)
            .unwrap();
        assert_eq!(underscore.rows.len(), 1);
    }

    #[test]
    fn limit_truncates_results() {
        let dir = tempfile::tempdir().unwrap();
        let service = QueryService::open(&seed_database(&dir)).unwrap();

        let result = service.query("civil", &QueryFilter::new(), Some(2)).unwrap();
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn queries_are_restartable() {
        let dir = tempfile::tempdir().unwrap();
        let service = QueryService::open(&seed_database(&dir)).unwrap();

        let filter = QueryFilter::new().equals("court", "深圳中院");
        let first = service.query("civil", &filter, None).unwrap();
        let second = service.query("civil", &filter, None).unwrap();
        assert_eq!(first.rows, second.rows);
    }

    #[test]
    fn unknown_table_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = QueryService::open(&seed_database(&dir)).unwrap();

        let err = service.query("criminal", &QueryFilter::new(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn unknown_filter_column_is_a_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = QueryService::open(&seed_database(&dir)).unwrap();

        let filter = QueryFilter::new().equals("judge", "x");
        let err = service.query("civil", &filter, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);

        let err = service.distinct_values("civil", "judge").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);
    }

    #[test]
    fn distinct_values_exclude_null_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let service = QueryService::open(&seed_database(&dir)).unwrap();

        let mut values = service.distinct_values("civil", "court").unwrap();
        assert!(values.iter().all(|v| !v.is_null()));
        values.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        assert_eq!(
            values,
            vec![
                Value::Text("广州中院".into()),
                Value::Text("深圳中院".into())
            ]
        );
    }
}
