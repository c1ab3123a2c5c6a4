//! Core vocabulary for the case archive ingestion system
//!
//! This crate provides the shared types used by the ingestion and query
//! layers: cell values, table schemas, query filters, run reports, and
//! the error taxonomy.

pub mod filter;
pub mod report;
pub mod schema;
pub mod value;

use std::path::PathBuf;
use thiserror::Error;

// Re-export commonly used types
pub use filter::{Constraint, QueryFilter};
pub use report::{FileFailure, IngestReport, PipelineState};
pub use schema::TableSchema;
pub use value::{ColumnType, Value};

/// Errors that can occur while ingesting or querying case data
#[derive(Error, Debug)]
pub enum CaseError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("parse error in {file}: {message}")]
    Parse { file: PathBuf, message: String },

    #[error("encoding error in {file}: {message}")]
    Encoding { file: PathBuf, message: String },

    #[error("write error: {0}")]
    Write(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable tag identifying an error class, used in run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Parse,
    Encoding,
    Write,
    Query,
    Io,
}

impl CaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaseError::NotFound(_) => ErrorKind::NotFound,
            CaseError::Parse { .. } => ErrorKind::Parse,
            CaseError::Encoding { .. } => ErrorKind::Encoding,
            CaseError::Write(_) => ErrorKind::Write,
            CaseError::Query(_) => ErrorKind::Query,
            CaseError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<rusqlite::Error> for CaseError {
    fn from(error: rusqlite::Error) -> Self {
        CaseError::Write(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CaseError>;
