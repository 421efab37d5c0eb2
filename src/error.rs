//! Error types for moran-validate
//!
//! Load-time errors (`MissingFile`, `Schema`, `InvalidRecord`, I/O) abort a
//! batch before any analysis runs. Analysis errors (`EmptyResult`,
//! `Integration`, `InvalidParameter`) are scoped to the (N, r) pair that
//! produced them.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::{ParamKey, RecordType};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// moran-validate error types
#[derive(Error, Debug)]
pub enum Error {
    /// Input dataset does not exist
    #[error("Input file not found: {}\nRun the Moran simulator first to produce it.", path.display())]
    MissingFile {
        /// Path that was requested
        path: PathBuf,
    },

    /// Required column absent from a dataset
    #[error("Schema error: required column '{column}' is absent ({context})")]
    Schema {
        /// Column name as it appears in the header
        column: String,
        /// Dataset or record the column was required for
        context: String,
    },

    /// A row that cannot be represented as a typed record
    #[error("Invalid record at row {row}: {message}")]
    InvalidRecord {
        /// Zero-based data row (header excluded)
        row: usize,
        /// What was wrong with the row
        message: String,
    },

    /// A filter for an (N, r, Type) combination matched nothing
    #[error("No {record_type} records for {key}; skipping {step}")]
    EmptyResult {
        /// The (N, r) pair that was requested
        key: ParamKey,
        /// The record type that was requested
        record_type: RecordType,
        /// Analysis step that cannot proceed
        step: String,
    },

    /// ODE solution left its valid domain
    #[error("Integration error at t={t}: x={x} ({message})")]
    Integration {
        /// Time at which the failure was detected
        t: f64,
        /// Offending state value
        x: f64,
        /// Failure description
        message: String,
    },

    /// Invalid configuration or function argument
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error (CSV decoding, casts)
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON error (config files, report export)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable short name of the variant, used in analysis reports
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingFile { .. } => "MissingFile",
            Self::Schema { .. } => "Schema",
            Self::InvalidRecord { .. } => "InvalidRecord",
            Self::EmptyResult { .. } => "EmptyResult",
            Self::Integration { .. } => "Integration",
            Self::InvalidParameter(_) => "InvalidParameter",
            Self::Io(_) => "Io",
            Self::Arrow(_) => "Arrow",
            Self::Parquet(_) => "Parquet",
            Self::Json(_) => "Json",
        }
    }

    /// Whether the error aborts the whole batch rather than one analysis
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::EmptyResult { .. } | Self::Integration { .. } | Self::InvalidParameter(_)
        )
    }
}
