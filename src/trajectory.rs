//! Trajectory segmentation
//!
//! **Problem**: the simulator appends every run of one (N, r) pair to a single
//! time column. Run boundaries are not recorded; a new run is only visible
//! as simulated time jumping back towards 0.
//!
//! **Solution**: one stateful pass over the points in file order. A counter
//! starts at 0 and increments whenever a time is strictly less than the time
//! immediately before it; each point is assigned the current counter as its
//! `sim_id`. Only the previous time is kept as state, so no global sort is
//! needed to find the boundaries.
//!
//! The scan is order-sensitive: reordering the input changes the result, so
//! callers must pass records in the store's native order.

use serde::{Deserialize, Serialize};

use crate::storage::SimulationRecord;

/// One (time, value) sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    /// Simulated time
    pub time: f64,
    /// Normalized population x = X / N
    pub value: f64,
}

impl TimePoint {
    /// Create a point.
    #[must_use]
    pub const fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

impl From<&SimulationRecord> for TimePoint {
    fn from(record: &SimulationRecord) -> Self {
        Self::new(record.time(), record.value())
    }
}

impl From<(f64, f64)> for TimePoint {
    fn from((time, value): (f64, f64)) -> Self {
        Self::new(time, value)
    }
}

/// One reconstructed simulation run, ordered by time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    sim_id: usize,
    points: Vec<TimePoint>,
}

impl Trajectory {
    /// Segment index assigned by [`segment`].
    #[must_use]
    pub const fn sim_id(&self) -> usize {
        self.sim_id
    }

    /// Points ordered by time.
    #[must_use]
    pub fn points(&self) -> &[TimePoint] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the trajectory has no points (never true for segmenter output).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Last recorded state of the run (absorption or end of window).
    #[must_use]
    pub fn last(&self) -> Option<TimePoint> {
        self.points.last().copied()
    }

    /// Time span covered by the run.
    #[must_use]
    pub fn duration(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => 0.0,
        }
    }

    /// Value at time `t` by linear interpolation between recorded points.
    ///
    /// Before the first point the first value is returned, after the last
    /// point the last value. At an interior time recorded more than once
    /// the value of the first such point is returned.
    /// Returns NaN for an empty trajectory.
    #[must_use]
    pub fn value_at(&self, t: f64) -> f64 {
        interpolate(&self.points, t)
    }
}

/// Linear interpolation over time-ordered `points` with constant
/// extrapolation at both ends. See [`Trajectory::value_at`].
#[must_use]
pub fn interpolate(points: &[TimePoint], t: f64) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return f64::NAN;
    };
    if t <= first.time {
        return first.value;
    }
    if t >= last.time {
        return last.value;
    }

    // First index with time >= t; 1 <= lower < len by the checks above
    let lower = points.partition_point(|p| p.time < t);
    let (a, b) = (points[lower - 1], points[lower]);
    if b.time <= t {
        return b.value;
    }
    let weight = (t - a.time) / (b.time - a.time);
    weight.mul_add(b.value - a.value, a.value)
}

/// Output of [`segment`]: trajectories indexed by `sim_id` (0, 1, 2, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    trajectories: Vec<Trajectory>,
}

impl Segmentation {
    /// Number of trajectories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    /// Whether no trajectory was found (empty input).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    /// Trajectory with the given `sim_id`.
    #[must_use]
    pub fn get(&self, sim_id: usize) -> Option<&Trajectory> {
        self.trajectories.get(sim_id)
    }

    /// Trajectories in `sim_id` order.
    pub fn iter(&self) -> std::slice::Iter<'_, Trajectory> {
        self.trajectories.iter()
    }

    /// All trajectories as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Trajectory] {
        &self.trajectories
    }

    /// Keep only the first `max` trajectories.
    #[must_use]
    pub fn truncated(mut self, max: usize) -> Self {
        self.trajectories.truncate(max);
        self
    }

    /// Total number of points across all trajectories.
    #[must_use]
    pub fn total_points(&self) -> usize {
        self.trajectories.iter().map(Trajectory::len).sum()
    }
}

impl<'a> IntoIterator for &'a Segmentation {
    type Item = &'a Trajectory;
    type IntoIter = std::slice::Iter<'a, Trajectory>;

    fn into_iter(self) -> Self::IntoIter {
        self.trajectories.iter()
    }
}

/// Split a concatenated time series into independent runs.
///
/// # Example
///
/// ```rust
/// use moran_validate::trajectory::{segment, TimePoint};
///
/// let points = [(0.0, 0.5), (5.0, 0.6), (0.0, 0.1)].map(TimePoint::from);
/// let runs = segment(points);
/// assert_eq!(runs.len(), 2);
/// assert_eq!(runs.get(1).unwrap().points(), &[TimePoint::new(0.0, 0.1)]);
/// ```
#[must_use]
pub fn segment<I>(points: I) -> Segmentation
where
    I: IntoIterator,
    I::Item: Into<TimePoint>,
{
    let mut trajectories: Vec<Trajectory> = Vec::new();
    let mut previous: Option<f64> = None;

    for point in points {
        let point = point.into();
        let reset = previous.is_some_and(|prev| point.time < prev);
        if reset || trajectories.is_empty() {
            trajectories.push(Trajectory {
                sim_id: trajectories.len(),
                points: Vec::new(),
            });
        }
        previous = Some(point.time);
        if let Some(current) = trajectories.last_mut() {
            current.points.push(point);
        }
    }

    for trajectory in &mut trajectories {
        trajectory
            .points
            .sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    Segmentation { trajectories }
}

/// Segment a slice of records (e.g. the output of
/// [`SimulationStore::select`](crate::storage::SimulationStore)).
#[must_use]
pub fn segment_records(records: &[&SimulationRecord]) -> Segmentation {
    segment(records.iter().map(|&record| TimePoint::from(record)))
}
