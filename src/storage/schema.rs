//! Column layout of the simulator datasets and Arrow column access
//!
//! Columns are located by trimmed name, so a header written as `N, r, Type`
//! decodes the same as `N,r,Type`. Every numeric column is cast to `Int64`
//! or `Float64` before decoding, which lets CSV and Parquet inputs (where N
//! may be stored as `Int32`) share one code path.

use std::io::BufRead;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use super::TableRecord;
use crate::{Error, Result};

/// Population size
pub const COL_N: &str = "N";
/// Selection ratio
pub const COL_R: &str = "r";
/// Record type (`ODE`, `Moran`, `Deviation`)
pub const COL_TYPE: &str = "Type";
/// Sample time
pub const COL_TIME: &str = "Time";
/// Sample value
pub const COL_VALUE: &str = "Value";
/// Simulator run index (optional)
pub const COL_SIM_ID: &str = "Sim_ID";
/// Standard deviation of the supremum deviation (optional)
pub const COL_STD_SUP_DEV: &str = "std_sup_dev";
/// Absorption time
pub const COL_ABSORPTION_TIME: &str = "AbsorptionTime";

/// Read and split the CSV header line, trimming every column name.
///
/// Leaves `reader` positioned at the first data row.
///
/// # Errors
/// Returns error if the header cannot be read
pub fn read_header<B: BufRead>(reader: &mut B) -> Result<Vec<String>> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let line = line.trim_start_matches('\u{feff}').trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(line.split(',').map(|name| name.trim().to_string()).collect())
}

/// Check that every required column of `R` is present.
///
/// # Errors
/// Returns `Error::Schema` naming the first missing column
pub fn require_columns<R: TableRecord>(columns: &[String]) -> Result<()> {
    for &required in R::REQUIRED_COLUMNS {
        if !columns.iter().any(|c| c == required) {
            return Err(Error::Schema {
                column: required.to_string(),
                context: R::DATASET.to_string(),
            });
        }
    }
    Ok(())
}

/// Arrow schema for a CSV file with the given (trimmed) header.
///
/// All fields are nullable: the simulator writes short rows whose trailing
/// optional columns come back as nulls.
#[must_use]
pub fn csv_schema<R: TableRecord>(columns: &[String]) -> Schema {
    Schema::new(
        columns
            .iter()
            .map(|name| Field::new(name.as_str(), R::column_type(name), true))
            .collect::<Vec<_>>(),
    )
}

fn find_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a ArrayRef> {
    batch
        .schema_ref()
        .fields()
        .iter()
        .position(|f| f.name().trim() == name)
        .map(|idx| batch.column(idx))
}

fn cast_column(batch: &RecordBatch, name: &str, to: &DataType) -> Result<Option<ArrayRef>> {
    find_column(batch, name)
        .map(|array| cast(array, to).map_err(Error::from))
        .transpose()
}

fn missing(name: &str) -> Error {
    Error::Schema {
        column: name.to_string(),
        context: "record batch".to_string(),
    }
}

/// Column `name` as `Int64`.
///
/// # Errors
/// Returns error if the column is absent or cannot be cast
pub fn int64_column(batch: &RecordBatch, name: &str) -> Result<Int64Array> {
    optional_int64_column(batch, name)?.ok_or_else(|| missing(name))
}

/// Column `name` as `Float64`.
///
/// # Errors
/// Returns error if the column is absent or cannot be cast
pub fn float64_column(batch: &RecordBatch, name: &str) -> Result<Float64Array> {
    optional_float64_column(batch, name)?.ok_or_else(|| missing(name))
}

/// Column `name` as `Utf8`.
///
/// # Errors
/// Returns error if the column is absent or cannot be cast
pub fn utf8_column(batch: &RecordBatch, name: &str) -> Result<StringArray> {
    let array = cast_column(batch, name, &DataType::Utf8)?.ok_or_else(|| missing(name))?;
    array
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| missing(name))
}

/// Column `name` as `Int64`, or `None` if the dataset lacks it.
///
/// # Errors
/// Returns error if the column exists but cannot be cast
pub fn optional_int64_column(batch: &RecordBatch, name: &str) -> Result<Option<Int64Array>> {
    Ok(cast_column(batch, name, &DataType::Int64)?
        .and_then(|a| a.as_any().downcast_ref::<Int64Array>().cloned()))
}

/// Column `name` as `Float64`, or `None` if the dataset lacks it.
///
/// # Errors
/// Returns error if the column exists but cannot be cast
pub fn optional_float64_column(batch: &RecordBatch, name: &str) -> Result<Option<Float64Array>> {
    Ok(cast_column(batch, name, &DataType::Float64)?
        .and_then(|a| a.as_any().downcast_ref::<Float64Array>().cloned()))
}

fn null_value(row: usize, column: &str) -> Error {
    Error::InvalidRecord {
        row,
        message: format!("missing value in required column '{column}'"),
    }
}

/// Value `i` of a required integer column.
///
/// # Errors
/// Returns `Error::InvalidRecord` if the value is null
pub fn required_i64(array: &Int64Array, i: usize, row: usize, column: &str) -> Result<i64> {
    if array.is_null(i) {
        return Err(null_value(row, column));
    }
    Ok(array.value(i))
}

/// Value `i` of a required float column.
///
/// # Errors
/// Returns `Error::InvalidRecord` if the value is null
pub fn required_f64(array: &Float64Array, i: usize, row: usize, column: &str) -> Result<f64> {
    if array.is_null(i) {
        return Err(null_value(row, column));
    }
    Ok(array.value(i))
}

/// Value `i` of a required string column.
///
/// # Errors
/// Returns `Error::InvalidRecord` if the value is null
pub fn required_str<'a>(
    array: &'a StringArray,
    i: usize,
    row: usize,
    column: &str,
) -> Result<&'a str> {
    if array.is_null(i) {
        return Err(null_value(row, column));
    }
    Ok(array.value(i))
}

/// Value `i` of an optional integer column.
#[must_use]
pub fn optional_i64(array: &Int64Array, i: usize) -> Option<i64> {
    (!array.is_null(i)).then(|| array.value(i))
}

/// Value `i` of an optional float column.
#[must_use]
pub fn optional_f64(array: &Float64Array, i: usize) -> Option<f64> {
    (!array.is_null(i)).then(|| array.value(i))
}

/// Validate a raw N value.
///
/// # Errors
/// Returns `Error::InvalidRecord` unless `1 <= n <= u32::MAX`
pub fn population(n: i64, row: usize) -> Result<u32> {
    u32::try_from(n)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| Error::InvalidRecord {
            row,
            message: format!("population size N={n} is not a positive 32-bit integer"),
        })
}

/// Validate a time-like value.
///
/// # Errors
/// Returns `Error::InvalidRecord` for negative or non-finite values
pub fn non_negative(value: f64, row: usize, column: &str) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidRecord {
            row,
            message: format!("{column}={value} must be finite and non-negative"),
        })
    }
}

/// Validate a sample value.
///
/// # Errors
/// Returns `Error::InvalidRecord` for NaN or infinite values
pub fn finite(value: f64, row: usize, column: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::InvalidRecord {
            row,
            message: format!("{column}={value} must be finite"),
        })
    }
}
