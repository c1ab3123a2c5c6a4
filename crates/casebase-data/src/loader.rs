//! Loading one CSV file into an in-memory table
//!
//! A file is decoded (UTF-8 first, GB18030 as fallback for the encoding
//! the case archives circulate in), parsed with strict record arity,
//! type-inferred column by column, and returned as rows of typed values
//! ready for the writer.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use ahash::AHashSet;
use csv::ReaderBuilder;
use encoding_rs::{GB18030, UTF_8};
use tracing::debug;

use casebase_core::{CaseError, ColumnType, Result, TableSchema, Value};

/// Field delimiter of the case archive files
pub const DELIMITER: u8 = b',';

/// One file loaded into memory, ready to be written
#[derive(Debug)]
pub struct LoadedTable {
    /// Derived table name
    pub name: String,
    /// Inferred schema, columns in file order
    pub schema: TableSchema,
    /// Rows of values, each aligned to the schema's column order
    pub rows: Vec<Vec<Value>>,
}

/// Read, decode, and type a single case file.
pub fn load_table(path: &Path) -> Result<LoadedTable> {
    let bytes = fs::read(path)?;
    let contents = decode_contents(&bytes, path)?;

    let mut reader = ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .from_reader(contents.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| parse_error(path, &e))?
        .clone();
    let columns = normalize_headers(headers.iter());
    if columns.is_empty() {
        return Err(CaseError::Parse {
            file: path.to_path_buf(),
            message: "file has no header row".to_string(),
        });
    }

    let mut records: Vec<Vec<String>> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| parse_error(path, &e))?;
        records.push(record.iter().map(|s| s.to_string()).collect());
    }

    let schema: TableSchema = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.clone(), infer_column_type(&records, idx)))
        .collect();

    let rows = records
        .into_iter()
        .map(|record| {
            record
                .into_iter()
                .zip(schema.iter())
                .map(|(cell, (_, ty))| convert_cell(&cell, ty))
                .collect()
        })
        .collect();

    Ok(LoadedTable {
        name: table_name_for(path),
        schema,
        rows,
    })
}

/// Derive the table name for a case file.
///
/// Pure: the same file name always yields the same table name. The stem
/// is sanitized to identifier characters, ASCII-lowercased, and trailing
/// `_<digits>` partition suffixes are stripped, so `civil_2023.csv` and
/// `civil_2024.csv` both land in table `civil`.
pub fn table_name_for(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("cases");
    let mut name: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    loop {
        let Some((prefix, suffix)) = name.rsplit_once('_') else {
            break;
        };
        if prefix.trim_end_matches('_').is_empty()
            || suffix.is_empty()
            || !suffix.chars().all(|c| c.is_ascii_digit())
        {
            break;
        }
        name.truncate(prefix.len());
    }
    let name = name.trim_end_matches('_');

    if name.is_empty() {
        "cases".to_string()
    } else {
        name.to_string()
    }
}

/// Decode file contents: strict UTF-8 first, then GB18030.
fn decode_contents<'a>(bytes: &'a [u8], path: &Path) -> Result<Cow<'a, str>> {
    let (text, had_errors) = UTF_8.decode_with_bom_removal(bytes);
    if !had_errors {
        return Ok(text);
    }
    debug!("{}: not valid UTF-8, retrying as GB18030", path.display());
    let (text, had_errors) = GB18030.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(CaseError::Encoding {
            file: path.to_path_buf(),
            message: "contents are neither valid UTF-8 nor GB18030".to_string(),
        });
    }
    Ok(text)
}

/// Trim headers, name the unnamed, and deduplicate repeats with numeric
/// suffixes, preserving order.
fn normalize_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut used: AHashSet<String> = AHashSet::new();
    let mut columns = Vec::new();
    for (idx, raw) in headers.enumerate() {
        let trimmed = raw.trim();
        let base = if trimmed.is_empty() {
            format!("column_{}", idx + 1)
        } else {
            trimmed.to_string()
        };
        let mut name = base.clone();
        let mut n = 1;
        while !used.insert(name.clone()) {
            n += 1;
            name = format!("{}_{}", base, n);
        }
        columns.push(name);
    }
    columns
}

/// Inferred type of one column, examining every value in the file:
/// integer if all non-empty values parse as integers, real if all parse
/// as floats, text otherwise.
fn infer_column_type(records: &[Vec<String>], col_idx: usize) -> ColumnType {
    let mut is_int = true;
    let mut is_real = true;
    let mut saw_value = false;

    for row in records {
        let Some(value) = row.get(col_idx) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        saw_value = true;
        if is_int && value.parse::<i64>().is_err() {
            is_int = false;
        }
        if is_real && value.parse::<f64>().is_err() {
            is_real = false;
        }
        if !is_int && !is_real {
            break;
        }
    }

    if !saw_value {
        ColumnType::Text
    } else if is_int {
        ColumnType::Integer
    } else if is_real {
        ColumnType::Real
    } else {
        ColumnType::Text
    }
}

fn convert_cell(cell: &str, ty: ColumnType) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match ty {
        ColumnType::Integer => cell
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(cell.to_string())),
        ColumnType::Real => cell
            .parse::<f64>()
            .map(Value::Real)
            .unwrap_or_else(|_| Value::Text(cell.to_string())),
        ColumnType::Text => Value::Text(cell.to_string()),
    }
}

fn parse_error(path: &Path, error: &csv::Error) -> CaseError {
    CaseError::Parse {
        file: path.to_path_buf(),
        message: error.to_string(),
    }
}
