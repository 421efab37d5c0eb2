//! Typed records of the two simulator datasets

use std::fmt;
use std::str::FromStr;

use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use super::schema::{self, COL_ABSORPTION_TIME, COL_N, COL_R, COL_SIM_ID, COL_STD_SUP_DEV};
use super::schema::{COL_TIME, COL_TYPE, COL_VALUE};
use super::TableRecord;
use crate::tolerances::R_MATCH;
use crate::{Error, Result};

/// An (N, r) parameter pair: population size and selection ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamKey {
    /// Population size N
    pub n: u32,
    /// Selection ratio r
    pub r: f64,
}

impl ParamKey {
    /// Create a new key.
    #[must_use]
    pub const fn new(n: u32, r: f64) -> Self {
        Self { n, r }
    }

    /// Whether this key denotes the same pair as `(n, r)`.
    ///
    /// N must match exactly; r within [`R_MATCH`].
    #[must_use]
    pub fn matches(&self, n: u32, r: f64) -> bool {
        self.n == n && (self.r - r).abs() <= R_MATCH
    }

    /// Exact identity used for hashing records of one dataset.
    pub(crate) const fn bits(&self) -> (u32, u64) {
        (self.n, self.r.to_bits())
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N={}, r={}", self.n, self.r)
    }
}

/// Kind of sample a [`SimulationRecord`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Point of the simulator's own ODE curve
    #[serde(rename = "ODE")]
    Ode,
    /// Point of one stochastic Moran trajectory
    Moran,
    /// Per-(N, r) supremum-deviation summary
    Deviation,
}

impl RecordType {
    /// Name used in the `Type` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ode => "ODE",
            Self::Moran => "Moran",
            Self::Deviation => "Deviation",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    /// Parses an already trimmed `Type` value.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ODE" => Ok(Self::Ode),
            "Moran" => Ok(Self::Moran),
            "Deviation" => Ok(Self::Deviation),
            other => Err(Error::InvalidParameter(format!(
                "unknown record type '{other}' (expected ODE, Moran or Deviation)"
            ))),
        }
    }
}

/// Inclusive time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Lower bound (inclusive)
    pub start: f64,
    /// Upper bound (inclusive)
    pub end: f64,
}

impl TimeWindow {
    /// Create a window.
    #[must_use]
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Whether `t` lies in the window.
    #[must_use]
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::new(0.0, 200.0)
    }
}

/// One row of the time-series dataset.
///
/// ODE and Moran rows are curve samples at `time`. Deviation rows carry the
/// horizon ln N in `time`, the mean supremum deviation in `value` and its
/// standard deviation in `std_sup_dev`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    n: u32,
    r: f64,
    record_type: RecordType,
    time: f64,
    value: f64,
    sim_id: Option<i64>,
    std_sup_dev: Option<f64>,
}

impl SimulationRecord {
    /// Create a record without the optional columns.
    #[must_use]
    pub const fn new(n: u32, r: f64, record_type: RecordType, time: f64, value: f64) -> Self {
        Self {
            n,
            r,
            record_type,
            time,
            value,
            sim_id: None,
            std_sup_dev: None,
        }
    }

    /// Attach the simulator's run index.
    #[must_use]
    pub const fn with_sim_id(mut self, sim_id: i64) -> Self {
        self.sim_id = Some(sim_id);
        self
    }

    /// Attach the standard deviation of the supremum deviation.
    #[must_use]
    pub const fn with_std_sup_dev(mut self, std_sup_dev: f64) -> Self {
        self.std_sup_dev = Some(std_sup_dev);
        self
    }

    /// Population size N.
    #[must_use]
    pub const fn n(&self) -> u32 {
        self.n
    }

    /// Selection ratio r.
    #[must_use]
    pub const fn r(&self) -> f64 {
        self.r
    }

    /// Record type.
    #[must_use]
    pub const fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Sample time.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }

    /// Sample value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Simulator run index, if the column was present.
    #[must_use]
    pub const fn sim_id(&self) -> Option<i64> {
        self.sim_id
    }

    /// Standard deviation of the supremum deviation (Deviation rows).
    #[must_use]
    pub const fn std_sup_dev(&self) -> Option<f64> {
        self.std_sup_dev
    }
}

impl TableRecord for SimulationRecord {
    const DATASET: &'static str = "time-series dataset";
    const REQUIRED_COLUMNS: &'static [&'static str] = &[COL_N, COL_R, COL_TYPE, COL_TIME, COL_VALUE];

    fn column_type(name: &str) -> DataType {
        match name {
            COL_N | COL_SIM_ID => DataType::Int64,
            COL_R | COL_TIME | COL_VALUE | COL_STD_SUP_DEV => DataType::Float64,
            _ => DataType::Utf8,
        }
    }

    fn key(&self) -> ParamKey {
        ParamKey::new(self.n, self.r)
    }

    fn decode_batch(batch: &RecordBatch, first_row: usize) -> Result<Vec<Self>> {
        let n = schema::int64_column(batch, COL_N)?;
        let r = schema::float64_column(batch, COL_R)?;
        let kind = schema::utf8_column(batch, COL_TYPE)?;
        let time = schema::float64_column(batch, COL_TIME)?;
        let value = schema::float64_column(batch, COL_VALUE)?;
        let sim_id = schema::optional_int64_column(batch, COL_SIM_ID)?;
        let std_sup_dev = schema::optional_float64_column(batch, COL_STD_SUP_DEV)?;

        (0..batch.num_rows())
            .map(|i| {
                let row = first_row + i;
                let kind = schema::required_str(&kind, i, row, COL_TYPE)?;
                let record_type = kind
                    .trim()
                    .parse::<RecordType>()
                    .map_err(|e| Error::InvalidRecord {
                        row,
                        message: e.to_string(),
                    })?;
                Ok(Self {
                    n: schema::population(schema::required_i64(&n, i, row, COL_N)?, row)?,
                    r: schema::required_f64(&r, i, row, COL_R)?,
                    record_type,
                    time: schema::non_negative(
                        schema::required_f64(&time, i, row, COL_TIME)?,
                        row,
                        COL_TIME,
                    )?,
                    value: schema::finite(
                        schema::required_f64(&value, i, row, COL_VALUE)?,
                        row,
                        COL_VALUE,
                    )?,
                    sim_id: sim_id.as_ref().and_then(|a| schema::optional_i64(a, i)),
                    std_sup_dev: std_sup_dev.as_ref().and_then(|a| schema::optional_f64(a, i)),
                })
            })
            .collect()
    }
}

/// One absorption event of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsorptionRecord {
    n: u32,
    r: f64,
    absorption_time: f64,
    sim_id: Option<i64>,
}

impl AbsorptionRecord {
    /// Create a record.
    #[must_use]
    pub const fn new(n: u32, r: f64, absorption_time: f64) -> Self {
        Self {
            n,
            r,
            absorption_time,
            sim_id: None,
        }
    }

    /// Attach the simulator's run index.
    #[must_use]
    pub const fn with_sim_id(mut self, sim_id: i64) -> Self {
        self.sim_id = Some(sim_id);
        self
    }

    /// Population size N.
    #[must_use]
    pub const fn n(&self) -> u32 {
        self.n
    }

    /// Selection ratio r.
    #[must_use]
    pub const fn r(&self) -> f64 {
        self.r
    }

    /// Time at which the run hit fixation or loss.
    #[must_use]
    pub const fn absorption_time(&self) -> f64 {
        self.absorption_time
    }

    /// Simulator run index, if the column was present.
    #[must_use]
    pub const fn sim_id(&self) -> Option<i64> {
        self.sim_id
    }
}

impl TableRecord for AbsorptionRecord {
    const DATASET: &'static str = "absorption-time dataset";
    const REQUIRED_COLUMNS: &'static [&'static str] = &[COL_N, COL_R, COL_ABSORPTION_TIME];

    fn column_type(name: &str) -> DataType {
        match name {
            COL_N | COL_SIM_ID => DataType::Int64,
            COL_R | COL_ABSORPTION_TIME => DataType::Float64,
            _ => DataType::Utf8,
        }
    }

    fn key(&self) -> ParamKey {
        ParamKey::new(self.n, self.r)
    }

    fn decode_batch(batch: &RecordBatch, first_row: usize) -> Result<Vec<Self>> {
        let n = schema::int64_column(batch, COL_N)?;
        let r = schema::float64_column(batch, COL_R)?;
        let absorption_time = schema::float64_column(batch, COL_ABSORPTION_TIME)?;
        let sim_id = schema::optional_int64_column(batch, COL_SIM_ID)?;

        (0..batch.num_rows())
            .map(|i| {
                let row = first_row + i;
                Ok(Self {
                    n: schema::population(schema::required_i64(&n, i, row, COL_N)?, row)?,
                    r: schema::required_f64(&r, i, row, COL_R)?,
                    absorption_time: schema::non_negative(
                        schema::required_f64(&absorption_time, i, row, COL_ABSORPTION_TIME)?,
                        row,
                        COL_ABSORPTION_TIME,
                    )?,
                    sim_id: sim_id.as_ref().and_then(|a| schema::optional_i64(a, i)),
                })
            })
            .collect()
    }
}
