//! Orchestration of one ingestion run
//!
//! Drives discovery, per-file load and write, then index creation, and
//! accumulates the terminal report. A failure scoped to one file is
//! recorded and the run continues; only run-level conditions (missing
//! root, unopenable database, index-phase storage failure) abort.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use casebase_core::{IngestReport, PipelineState, Result};

use crate::discover::discover_files;
use crate::index::{IndexBuilder, IndexConfig};
use crate::loader::load_table;
use crate::writer::DatabaseWriter;

/// Single-run ingestion driver: discovery, load, write, index.
pub struct IngestionPipeline {
    root: PathBuf,
    db_path: PathBuf,
    index_config: Option<IndexConfig>,
    state: PipelineState,
}

impl IngestionPipeline {
    pub fn new(root: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            db_path: db_path.into(),
            index_config: None,
            state: PipelineState::Idle,
        }
    }

    /// Use an explicit index configuration instead of the case defaults.
    pub fn with_index_config(mut self, config: IndexConfig) -> Self {
        self.index_config = Some(config);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run the whole pipeline. Returns the terminal report on `Done`;
    /// an error here means the run itself failed, not any one file.
    pub fn run(&mut self) -> Result<IngestReport> {
        match self.execute() {
            Ok(report) => {
                self.transition(PipelineState::Done);
                info!(
                    "ingestion done: {} rows into {} tables, {} files failed",
                    report.total_rows(),
                    report.rows.len(),
                    report.failures.len()
                );
                Ok(report)
            }
            Err(err) => {
                error!("ingestion failed: {}", err);
                self.transition(PipelineState::Failed);
                Err(err)
            }
        }
    }

    fn execute(&mut self) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        self.transition(PipelineState::Discovering);
        let files = discover_files(&self.root)?;
        info!(
            "discovered {} case files under {}",
            files.len(),
            self.root.display()
        );

        let mut writer = DatabaseWriter::open(&self.db_path)?;

        self.transition(PipelineState::Loading);
        let mut touched: Vec<String> = Vec::new();
        for file in &files {
            if let Err(err) = Self::ingest_file(&mut writer, file, &mut touched, &mut report) {
                warn!("skipping {}: {}", file.display(), err);
                report.record_failure(file.clone(), err);
            }
        }

        self.transition(PipelineState::Indexing);
        let config = match &self.index_config {
            Some(config) => config.clone(),
            None => IndexConfig::case_defaults(touched.iter().map(|s| s.as_str())),
        };
        report.indexes = IndexBuilder::new(writer.connection(), &config).build()?;

        Ok(report)
    }

    /// Load one file and commit its rows. Any error aborts this file
    /// only; the transaction in the writer keeps the abort atomic.
    fn ingest_file(
        writer: &mut DatabaseWriter,
        file: &Path,
        touched: &mut Vec<String>,
        report: &mut IngestReport,
    ) -> Result<()> {
        info!("loading {}", file.display());
        let loaded = load_table(file)?;

        let created = writer.ensure_table(&loaded.name, &loaded.schema)?;
        if created {
            report.tables_created.push(loaded.name.clone());
        }
        if !touched.contains(&loaded.name) {
            touched.push(loaded.name.clone());
        }

        let inserted = writer.append_rows(&loaded.name, &loaded.schema, &loaded.rows)?;
        report.record_rows(&loaded.name, inserted);
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casebase_core::{ErrorKind, QueryFilter, Value};
    use std::collections::BTreeMap;
    use std::fs;

    use crate::query::QueryService;

    fn write_case_dir(dir: &Path) {
        fs::create_dir_all(dir.join("2023")).unwrap();
        fs::write(
            dir.join("2023/civil_2023.csv"),
            "case_id,court,amount\n1,广州中院,120.5\n2,深圳中院,80\n3,广州中院,\n",
        )
        .unwrap();
        fs::write(
            dir.join("criminal_2023.csv"),
            "case_id,court,charge\n10,佛山中院,盗窃\n11,佛山中院,诈骗\n",
        )
        .unwrap();
    }

    #[test]
    fn ingests_civil_and_criminal_archives() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cases.db");
        write_case_dir(dir.path());

        let mut pipeline = IngestionPipeline::new(dir.path(), &db);
        assert_eq!(pipeline.state(), PipelineState::Idle);
        let report = pipeline.run().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Done);

        assert_eq!(report.rows["civil"], 3);
        assert_eq!(report.rows["criminal"], 2);
        assert!(report.failures.is_empty());
        let mut created = report.tables_created.clone();
        created.sort();
        assert_eq!(created, vec!["civil", "criminal"]);

        let service = QueryService::open(&db).unwrap();
        let civil = service.query("civil", &QueryFilter::new(), None).unwrap();
        assert_eq!(civil.columns.len(), 3);
        assert_eq!(civil.rows.len(), 3);
        let criminal = service.query("criminal", &QueryFilter::new(), None).unwrap();
        assert_eq!(criminal.columns.len(), 3);
        assert_eq!(criminal.rows.len(), 2);

        let courts = service.distinct_values("civil", "court").unwrap();
        assert_eq!(courts.len(), 2);
    }

    #[test]
    fn reruns_into_fresh_databases_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        write_case_dir(dir.path());

        let db_a = dir.path().join("a.db");
        let db_b = dir.path().join("b.db");
        let report_a = IngestionPipeline::new(dir.path(), &db_a).run().unwrap();
        let report_b = IngestionPipeline::new(dir.path(), &db_b).run().unwrap();

        assert_eq!(report_a.rows, report_b.rows);
    }

    #[test]
    fn rerun_against_the_same_database_appends() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cases.db");
        write_case_dir(dir.path());

        IngestionPipeline::new(dir.path(), &db).run().unwrap();
        let second = IngestionPipeline::new(dir.path(), &db).run().unwrap();

        // the second run creates nothing new, it only appends
        assert!(second.tables_created.is_empty());
        let service = QueryService::open(&db).unwrap();
        let civil = service.query("civil", &QueryFilter::new(), None).unwrap();
        assert_eq!(civil.rows.len(), 6);
    }

    #[test]
    fn conflicting_schemas_union_additively() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cases.db");
        // two files, same table name, different columns
        fs::write(
            dir.path().join("civil_2022.csv"),
            "case_id,court\n1,a\n2,b\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("civil_2023.csv"),
            "case_id,amount\n3,10.5\n",
        )
        .unwrap();

        let report = IngestionPipeline::new(dir.path(), &db).run().unwrap();
        assert_eq!(report.rows["civil"], 3);
        assert_eq!(report.tables_created, vec!["civil"]);

        let service = QueryService::open(&db).unwrap();
        let result = service.query("civil", &QueryFilter::new(), None).unwrap();
        assert_eq!(result.columns, vec!["case_id", "court", "amount"]);
        // rows from the first file read NULL in the evolved column
        assert_eq!(result.rows[0][2], Value::Null);
        // rows from the second file read NULL in the column they lack
        assert_eq!(result.rows[2][1], Value::Null);
        assert_eq!(result.rows[2][2], Value::Real(10.5));
    }

    #[test]
    fn one_bad_file_does_not_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cases.db");
        write_case_dir(dir.path());
        // extra delimiter makes the second data row too wide
        fs::write(
            dir.path().join("broken_2023.csv"),
            "case_id,court\n1,a\n2,b,EXTRA\n",
        )
        .unwrap();

        let mut pipeline = IngestionPipeline::new(dir.path(), &db);
        let report = pipeline.run().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Done);

        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert!(failure.file.ends_with("broken_2023.csv"));
        assert_eq!(failure.error.kind(), ErrorKind::Parse);

        // every other table is fully populated
        assert_eq!(report.rows["civil"], 3);
        assert_eq!(report.rows["criminal"], 2);
        // nothing from the broken file was committed
        let service = QueryService::open(&db).unwrap();
        let err = service.query("broken", &QueryFilter::new(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn undecodable_file_is_recorded_as_encoding_failure() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cases.db");
        write_case_dir(dir.path());
        // 0xFF 0xFF is invalid in UTF-8 and unmapped in GB18030
        fs::write(dir.path().join("garbled.csv"), [0xFFu8, 0xFF, 0x0A]).unwrap();

        let report = IngestionPipeline::new(dir.path(), &db).run().unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error.kind(), ErrorKind::Encoding);
        assert_eq!(report.rows["civil"], 3);
    }

    #[test]
    fn missing_root_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cases.db");

        let mut pipeline = IngestionPipeline::new(dir.path().join("absent"), &db);
        let err = pipeline.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(!db.exists());
    }

    #[test]
    fn explicit_index_config_builds_those_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cases.db");
        write_case_dir(dir.path());

        let mut tables = BTreeMap::new();
        tables.insert(
            "civil".to_string(),
            vec!["court".to_string(), "missing".to_string()],
        );
        let config = IndexConfig { tables };

        let report = IngestionPipeline::new(dir.path(), &db)
            .with_index_config(config)
            .run()
            .unwrap();
        assert_eq!(report.indexes, vec!["idx_civil_court"]);
    }

    #[test]
    fn default_index_config_skips_absent_case_columns() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cases.db");
        // columns here don't include any of the standard case columns
        write_case_dir(dir.path());

        let report = IngestionPipeline::new(dir.path(), &db).run().unwrap();
        assert!(report.indexes.is_empty());

        // a table carrying a standard column does get indexed
        fs::write(
            dir.path().join("named_2023.csv"),
            "案号,法院\n甲1,广州中院\n",
        )
        .unwrap();
        let report = IngestionPipeline::new(dir.path(), &db).run().unwrap();
        assert!(report.indexes.contains(&"idx_named_法院".to_string()));
        assert!(report.indexes.contains(&"idx_named_案号".to_string()));
    }
}
