//! The data ingestion stage: export, feature store, train/test split.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::artifact::DataIngestionArtifact;
use crate::config::DataIngestionConfig;
use crate::data::source::RecordSource;
use crate::data::table::Table;
use crate::error::PipelineError;

/// Document-store identifier column, removed from every export.
pub const RECORD_ID_COLUMN: &str = "_id";

pub struct DataIngestion {
    config: DataIngestionConfig,
    source: Box<dyn RecordSource>,
}

impl DataIngestion {
    pub fn new(config: DataIngestionConfig, source: Box<dyn RecordSource>) -> Self {
        Self { config, source }
    }

    /// Export the collection into the feature store.
    pub fn export_data_into_feature_store(&self) -> Result<Table, PipelineError> {
        let info = self.source.describe();
        tracing::info!(
            source = %info.source_type,
            location = %info.location,
            collection = %self.config.collection_name,
            "Exporting data from record source"
        );
        let table = self.source.fetch()?.drop_columns(&[RECORD_ID_COLUMN]);
        tracing::info!(
            rows = table.row_count(),
            columns = table.column_count(),
            "Fetched records"
        );
        table.write_csv(&self.config.feature_store_file_path)?;
        Ok(table)
    }

    /// Shuffle with the configured seed and write the train/test files.
    pub fn split_data_as_train_test(&self, table: &Table) -> Result<(), PipelineError> {
        let (train, test) =
            split_train_test(table, self.config.train_test_split_ratio, self.config.split_seed)?;
        train.write_csv(&self.config.training_file_path)?;
        test.write_csv(&self.config.testing_file_path)?;
        tracing::info!(
            train_rows = train.row_count(),
            test_rows = test.row_count(),
            "Performed train test split"
        );
        Ok(())
    }

    pub fn run(&self) -> Result<DataIngestionArtifact, PipelineError> {
        tracing::info!("Starting data ingestion");
        let table = self.export_data_into_feature_store()?;
        self.split_data_as_train_test(&table)?;
        Ok(DataIngestionArtifact {
            trained_file_path: self.config.training_file_path.clone(),
            test_file_path: self.config.testing_file_path.clone(),
        })
    }
}

/// Split `table` into `(train, test)` with `ceil(n * test_ratio)` test rows.
///
/// Both halves are non-empty; the same seed always yields the same split.
pub fn split_train_test(
    table: &Table,
    test_ratio: f64,
    seed: u64,
) -> Result<(Table, Table), PipelineError> {
    let n = table.row_count();
    if n < 2 {
        return Err(PipelineError::ingestion(format!(
            "need at least 2 records to split, got {n}"
        )));
    }
    let test_count = ((n as f64 * test_ratio).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let (test_idx, train_idx) = indices.split_at(test_count);
    Ok((table.select_rows(train_idx), table.select_rows(test_idx)))
}
