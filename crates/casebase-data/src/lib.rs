//! Ingestion and query layer for the case archive database
//!
//! The pipeline walks a directory tree of case CSV files, loads each one
//! into memory with an inferred schema, writes it into a SQLite database
//! (one table per derived table name, one transaction per file), builds
//! the configured secondary indexes, and reports what happened. The query
//! service runs against the finished database over its own read-only
//! connection.

pub mod discover;
pub mod index;
pub mod loader;
pub mod pipeline;
pub mod query;
pub mod writer;

mod sql;

// Re-exports
pub use discover::discover_files;
pub use index::{IndexBuilder, IndexConfig};
pub use loader::{load_table, table_name_for, LoadedTable};
pub use pipeline::IngestionPipeline;
pub use query::{QueryRows, QueryService};
pub use writer::DatabaseWriter;
