//! Record store (Arrow/Parquet ingestion, typed in-memory records)
//!
//! **Read-Only Design**:
//! - Datasets are produced by the external Moran simulator; this crate never
//!   writes them back
//! - Rows are decoded into typed records once at load time; `Type` values are
//!   trimmed and parsed here, never per query
//! - Filters are lazy views over the loaded records and never mutate the store
//!
//! Ingestion goes through Arrow: CSV via `arrow::csv` with an explicit schema
//! built from the header, Parquet via `parquet::arrow`. Both paths share the
//! column decoding in [`schema`].

mod record;
pub mod schema;

pub use record::{AbsorptionRecord, ParamKey, RecordType, SimulationRecord, TimeWindow};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashSet;
use tracing::{debug, info};

use crate::{Error, Result};

/// A record type that can be decoded from a simulator dataset.
pub trait TableRecord: Sized + Send + Sync {
    /// Human-readable dataset name used in errors and logs
    const DATASET: &'static str;

    /// Columns that must be present in the header
    const REQUIRED_COLUMNS: &'static [&'static str];

    /// Arrow type a column is read as
    fn column_type(name: &str) -> DataType;

    /// The (N, r) pair this record belongs to
    fn key(&self) -> ParamKey;

    /// Decode every row of `batch`; `first_row` is the index of its first row
    /// within the whole dataset
    ///
    /// # Errors
    /// Returns error if a required value is null or invalid
    fn decode_batch(batch: &RecordBatch, first_row: usize) -> Result<Vec<Self>>;
}

/// Typed, read-only, in-memory table of records.
#[derive(Debug, Clone)]
pub struct RecordStore<R> {
    records: Vec<R>,
}

/// Store of the time-series dataset (ODE, Moran and Deviation rows)
pub type SimulationStore = RecordStore<SimulationRecord>;

/// Store of the absorption-time dataset
pub type AbsorptionStore = RecordStore<AbsorptionRecord>;

fn open_input(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(Error::MissingFile {
            path: path.to_path_buf(),
        });
    }
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::MissingFile {
                path: path.to_path_buf(),
            }
        } else {
            Error::Io(e)
        }
    })
}

impl<R: TableRecord> RecordStore<R> {
    /// Create a store from already typed records
    ///
    /// Useful for testing and for producers that hold data in memory
    #[must_use]
    pub const fn from_records(records: Vec<R>) -> Self {
        Self { records }
    }

    /// Load a dataset, choosing the reader from the file extension
    /// (`.parquet` → Parquet, anything else → CSV)
    ///
    /// # Errors
    /// See [`load_csv`](Self::load_csv) and [`load_parquet`](Self::load_parquet)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let is_parquet = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
        if is_parquet {
            Self::load_parquet(path)
        } else {
            Self::load_csv(path)
        }
    }

    /// Load a CSV dataset
    ///
    /// Short rows are accepted: trailing optional columns become nulls.
    ///
    /// # Errors
    /// - `Error::MissingFile` if `path` does not exist
    /// - `Error::Schema` if a required column is absent from the header
    /// - `Error::InvalidRecord` if a row cannot be decoded
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        use arrow::csv::ReaderBuilder;

        let path = path.as_ref();
        let mut reader = BufReader::new(open_input(path)?);

        let columns = schema::read_header(&mut reader)?;
        schema::require_columns::<R>(&columns)?;
        debug!(path = %path.display(), ?columns, "csv header");

        // Header already consumed above
        let csv = ReaderBuilder::new(Arc::new(schema::csv_schema::<R>(&columns)))
            .with_header(false)
            .with_truncated_rows(true)
            .build_buffered(reader)?;

        let mut records = Vec::new();
        for batch in csv {
            let batch = batch?;
            records.extend(R::decode_batch(&batch, records.len())?);
        }

        info!(path = %path.display(), records = records.len(), "loaded {}", R::DATASET);
        Ok(Self { records })
    }

    /// Load a Parquet dataset with the same column layout as the CSV form
    ///
    /// # Errors
    /// - `Error::MissingFile` if `path` does not exist
    /// - `Error::Schema` if a required column is absent
    /// - `Error::InvalidRecord` if a row cannot be decoded
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let path = path.as_ref();
        let file = open_input(path)?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let columns: Vec<String> = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().trim().to_string())
            .collect();
        schema::require_columns::<R>(&columns)?;

        let mut records = Vec::new();
        for batch in builder.build()? {
            let batch = batch?;
            records.extend(R::decode_batch(&batch, records.len())?);
        }

        info!(path = %path.display(), records = records.len(), "loaded {}", R::DATASET);
        Ok(Self { records })
    }

    /// All records in native (file) order
    #[must_use]
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Lazily filter records, preserving native order
    ///
    /// The returned view may be empty; nothing is evaluated until it is
    /// iterated.
    ///
    /// # Example
    ///
    /// ```rust
    /// use moran_validate::storage::{RecordType, SimulationRecord, SimulationStore};
    ///
    /// let store = SimulationStore::from_records(vec![
    ///     SimulationRecord::new(100, 1.1, RecordType::Ode, 0.0, 0.5),
    ///     SimulationRecord::new(100, 1.1, RecordType::Moran, 0.3, 0.51),
    /// ]);
    /// let moran = store.filter(|r| r.record_type() == RecordType::Moran);
    /// assert_eq!(moran.count(), 1);
    /// ```
    pub fn filter<P>(&self, predicate: P) -> RecordView<'_, R, P>
    where
        P: FnMut(&R) -> bool,
    {
        RecordView {
            iter: self.records.iter(),
            predicate,
        }
    }

    /// Records of one (N, r) pair, in native order
    pub fn for_pair(&self, key: ParamKey) -> RecordView<'_, R, impl FnMut(&R) -> bool> {
        self.filter(move |record| {
            let k = record.key();
            key.matches(k.n, k.r)
        })
    }

    /// Distinct (N, r) pairs in first-appearance order
    #[must_use]
    pub fn pairs(&self) -> Vec<ParamKey> {
        let mut seen = FxHashSet::default();
        self.records
            .iter()
            .map(TableRecord::key)
            .filter(|key| seen.insert(key.bits()))
            .collect()
    }

    /// Distinct r values, ascending
    #[must_use]
    pub fn r_values(&self) -> Vec<f64> {
        let mut seen = FxHashSet::default();
        let mut values: Vec<f64> = self
            .records
            .iter()
            .map(|record| record.key().r)
            .filter(|r| seen.insert(r.to_bits()))
            .collect();
        values.sort_by(f64::total_cmp);
        values
    }
}

impl RecordStore<SimulationRecord> {
    /// Records of one (N, r, Type) combination, in native order
    ///
    /// `step` names the analysis that needs the records; it is carried in
    /// the error when nothing matches.
    ///
    /// # Errors
    /// Returns `Error::EmptyResult` naming `key` if no record matches
    pub fn select(
        &self,
        key: ParamKey,
        record_type: RecordType,
        step: &str,
    ) -> Result<Vec<&SimulationRecord>> {
        non_empty(
            self.for_pair(key)
                .filter(|record| record.record_type() == record_type)
                .collect(),
            key,
            record_type,
            step,
        )
    }

    /// Like [`select`](Self::select), restricted to records whose time lies
    /// in `window`
    ///
    /// # Errors
    /// Returns `Error::EmptyResult` naming `key` if no record matches
    pub fn select_window(
        &self,
        key: ParamKey,
        record_type: RecordType,
        window: TimeWindow,
        step: &str,
    ) -> Result<Vec<&SimulationRecord>> {
        non_empty(
            self.for_pair(key)
                .filter(|record| {
                    record.record_type() == record_type && window.contains(record.time())
                })
                .collect(),
            key,
            record_type,
            step,
        )
    }

    /// All records of one type, in native order
    pub fn of_type(
        &self,
        record_type: RecordType,
    ) -> RecordView<'_, SimulationRecord, impl FnMut(&SimulationRecord) -> bool> {
        self.filter(move |record| record.record_type() == record_type)
    }
}

impl RecordStore<AbsorptionRecord> {
    /// Absorption times of one (N, r) pair, in native order
    #[must_use]
    pub fn times(&self, key: ParamKey) -> Vec<f64> {
        self.for_pair(key)
            .map(AbsorptionRecord::absorption_time)
            .collect()
    }
}

fn non_empty<'a>(
    records: Vec<&'a SimulationRecord>,
    key: ParamKey,
    record_type: RecordType,
    step: &str,
) -> Result<Vec<&'a SimulationRecord>> {
    if records.is_empty() {
        return Err(Error::EmptyResult {
            key,
            record_type,
            step: step.to_string(),
        });
    }
    Ok(records)
}

/// Lazy filtered view over a [`RecordStore`]
pub struct RecordView<'a, R, P> {
    iter: std::slice::Iter<'a, R>,
    predicate: P,
}

impl<'a, R, P> Iterator for RecordView<'a, R, P>
where
    P: FnMut(&R) -> bool,
{
    type Item = &'a R;

    fn next(&mut self) -> Option<Self::Item> {
        let predicate = &mut self.predicate;
        self.iter.by_ref().find(|record| predicate(*record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> SimulationStore {
        SimulationStore::from_records(vec![
            SimulationRecord::new(1000, 1.05, RecordType::Ode, 0.0, 0.5),
            SimulationRecord::new(1000, 1.05, RecordType::Moran, 0.0, 0.5),
            SimulationRecord::new(1000, 1.05, RecordType::Moran, 5.0, 0.6),
            SimulationRecord::new(1000, 1.05, RecordType::Moran, 0.0, 0.1),
            SimulationRecord::new(1000, 1.05, RecordType::Moran, 250.0, 1.0),
            SimulationRecord::new(50, 1.2, RecordType::Moran, 1.0, 0.4),
            SimulationRecord::new(50, 1.2, RecordType::Deviation, 3.9, 0.1)
                .with_std_sup_dev(0.03),
        ])
    }

    #[test]
    fn test_filter_is_lazy_and_non_mutating() {
        let store = sample_store();
        let mut calls = 0;
        let view = store.filter(|_| {
            calls += 1;
            true
        });
        drop(view);
        assert_eq!(calls, 0);
        assert_eq!(store.len(), 7);
    }

    #[test]
    fn test_filter_can_be_empty() {
        let store = sample_store();
        assert_eq!(store.filter(|r| r.n() == 7).count(), 0);
    }

    #[test]
    fn test_select_preserves_native_order() {
        let store = sample_store();
        let moran = store
            .select(ParamKey::new(1000, 1.05), RecordType::Moran, "test")
            .unwrap();
        let times: Vec<f64> = moran.iter().map(|r| r.time()).collect();
        assert_eq!(times, vec![0.0, 5.0, 0.0, 250.0]);
    }

    #[test]
    fn test_select_window_excludes_out_of_range() {
        let store = sample_store();
        let moran = store
            .select_window(
                ParamKey::new(1000, 1.05),
                RecordType::Moran,
                TimeWindow::new(0.0, 200.0),
                "test",
            )
            .unwrap();
        assert_eq!(moran.len(), 3);
    }

    #[test]
    fn test_select_empty_names_pair_and_step() {
        let store = sample_store();
        let err = store
            .select(ParamKey::new(500, 1.5), RecordType::Moran, "trajectories")
            .unwrap_err();
        match err {
            Error::EmptyResult {
                key,
                record_type,
                step,
            } => {
                assert_eq!(key, ParamKey::new(500, 1.5));
                assert_eq!(record_type, RecordType::Moran);
                assert_eq!(step, "trajectories");
            }
            other => panic!("expected EmptyResult, got {other:?}"),
        }
    }

    #[test]
    fn test_pairs_first_appearance_order() {
        let store = sample_store();
        assert_eq!(
            store.pairs(),
            vec![ParamKey::new(1000, 1.05), ParamKey::new(50, 1.2)]
        );
        assert_eq!(store.r_values(), vec![1.05, 1.2]);
    }

    #[test]
    fn test_of_type() {
        let store = sample_store();
        assert_eq!(store.of_type(RecordType::Deviation).count(), 1);
    }

    #[test]
    fn test_absorption_times() {
        let store = AbsorptionStore::from_records(vec![
            AbsorptionRecord::new(50, 1.1, 12.0),
            AbsorptionRecord::new(50, 1.2, 9.0),
            AbsorptionRecord::new(50, 1.1, 30.5),
        ]);
        assert_eq!(store.times(ParamKey::new(50, 1.1)), vec![12.0, 30.5]);
        assert!(store.times(ParamKey::new(100, 1.1)).is_empty());
    }

    #[test]
    fn test_missing_file() {
        let err = SimulationStore::load_csv("/nonexistent/moran_simulation_results.csv")
            .unwrap_err();
        assert!(matches!(err, Error::MissingFile { .. }));
    }
}
