//! Command-line entry point for building and querying case databases

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use casebase_core::{IngestReport, QueryFilter};
use casebase_data::{IndexConfig, IngestionPipeline, QueryRows, QueryService};

#[derive(Parser)]
#[command(
    name = "casebase",
    about = "Build and query a case record database from CSV archives"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a directory tree of case CSV files into a database
    Ingest {
        /// Directory to scan recursively for CSV files
        root: PathBuf,
        /// Database file to create or append to
        #[arg(long, default_value = "cases.db")]
        database: PathBuf,
        /// JSON file mapping table names to the columns to index
        #[arg(long)]
        index_config: Option<PathBuf>,
    },
    /// Query rows from an ingested table
    Query {
        table: String,
        #[arg(long, default_value = "cases.db")]
        database: PathBuf,
        /// Exact-match filter, COLUMN=VALUE (repeatable)
        #[arg(long = "eq", value_parser = parse_column_value)]
        equals: Vec<(String, String)>,
        /// Substring filter, COLUMN=SUBSTRING (repeatable)
        #[arg(long = "contains", value_parser = parse_column_value)]
        contains: Vec<(String, String)>,
        /// Maximum number of rows to print
        #[arg(long)]
        limit: Option<usize>,
        /// Emit rows as JSON objects instead of tab-separated text
        #[arg(long)]
        json: bool,
    },
    /// List the distinct non-null values of one column
    Distinct {
        table: String,
        column: String,
        #[arg(long, default_value = "cases.db")]
        database: PathBuf,
    },
}

fn parse_column_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(column, value)| (column.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected COLUMN=VALUE, got {:?}", s))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Ingest {
            root,
            database,
            index_config,
        } => {
            let mut pipeline = IngestionPipeline::new(root, database);
            if let Some(path) = index_config {
                pipeline = pipeline.with_index_config(IndexConfig::from_json_file(&path)?);
            }
            let report = pipeline.run()?;
            print_report(&report);
        }
        Command::Query {
            table,
            database,
            equals,
            contains,
            limit,
            json,
        } => {
            let service = QueryService::open(&database)?;
            let mut filter = QueryFilter::new();
            for (column, value) in equals {
                filter = filter.equals(column, value);
            }
            for (column, needle) in contains {
                filter = filter.contains(column, needle);
            }
            let result = service.query(&table, &filter, limit)?;
            if json {
                print_rows_json(&result)?;
            } else {
                print_rows_text(&result);
            }
        }
        Command::Distinct {
            table,
            column,
            database,
        } => {
            let service = QueryService::open(&database)?;
            for value in service.distinct_values(&table, &column)? {
                println!("{}", value);
            }
        }
    }
    Ok(())
}

fn print_report(report: &IngestReport) {
    for (table, rows) in &report.rows {
        println!("{}: {} rows", table, rows);
    }
    if !report.tables_created.is_empty() {
        println!("tables created: {}", report.tables_created.join(", "));
    }
    if !report.indexes.is_empty() {
        println!("indexes created: {}", report.indexes.join(", "));
    }
    for failure in &report.failures {
        eprintln!("failed {}: {}", failure.file.display(), failure.error);
    }
}

fn print_rows_text(result: &QueryRows) {
    println!("{}", result.columns.join("\t"));
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        println!("{}", cells.join("\t"));
    }
}

fn print_rows_json(result: &QueryRows) -> Result<()> {
    for row in &result.rows {
        let object: serde_json::Map<String, serde_json::Value> = result
            .columns
            .iter()
            .zip(row)
            .map(|(column, value)| Ok((column.clone(), serde_json::to_value(value)?)))
            .collect::<Result<_>>()?;
        println!("{}", serde_json::to_string(&object)?);
    }
    Ok(())
}
