//! Snapshots and the time series defined over them.
//!
//! A snapshot is one step of the optimisation horizon. Its weight is the number of hours it
//! represents, which scales dispatch costs, emissions and state-of-charge changes.
use crate::error::ModelError;
use crate::input::is_sorted_and_unique;
use crate::units::Hours;
use anyhow::{Result, ensure};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};

/// Hours in a (non-leap) year
pub const HOURS_PER_YEAR: f64 = 8760.0;

/// One time step of the optimisation horizon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// The start of the period represented
    pub timestamp: NaiveDateTime,
    /// The duration represented
    pub weight: Hours,
}

/// Check that snapshots are non-empty, strictly increasing and have positive weights
pub fn check_snapshots(snapshots: &[Snapshot]) -> Result<()> {
    ensure!(
        !snapshots.is_empty(),
        ModelError::Data("There must be at least one snapshot".into())
    );
    ensure!(
        is_sorted_and_unique(snapshots.iter().map(|s| s.timestamp)),
        ModelError::Data("Snapshot timestamps must be unique and in increasing order".into())
    );
    for snapshot in snapshots {
        ensure!(
            snapshot.weight.value() > 0.0 && snapshot.weight.is_finite(),
            ModelError::Data(format!(
                "Snapshot {} has a non-positive weight",
                snapshot.timestamp
            ))
        );
    }

    Ok(())
}

/// How native samples within a bucket are combined into one snapshot value
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum ResampleMethod {
    /// Take the first sample in each bucket
    #[default]
    #[string = "first"]
    First,
    /// Take the mean of the samples in each bucket
    #[string = "mean"]
    Mean,
}

/// A set of named columns over a common set of snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    snapshots: Vec<Snapshot>,
    columns: IndexMap<String, Vec<f64>>,
}

impl TimeSeries {
    /// Create a time series, checking that all columns have one value per snapshot
    pub fn new(snapshots: Vec<Snapshot>, columns: IndexMap<String, Vec<f64>>) -> Result<Self> {
        check_snapshots(&snapshots)?;
        for (name, values) in &columns {
            ensure!(
                values.len() == snapshots.len(),
                ModelError::Data(format!(
                    "Column {name} has {} values but there are {} snapshots",
                    values.len(),
                    snapshots.len()
                ))
            );
        }

        Ok(Self { snapshots, columns })
    }

    /// Create a time series from samples taken at a constant interval.
    ///
    /// Each sample is weighted by the sampling step. Gaps, duplicates and out-of-order timestamps
    /// are reported as data errors.
    pub fn from_samples(
        timestamps: Vec<NaiveDateTime>,
        columns: IndexMap<String, Vec<f64>>,
    ) -> Result<Self> {
        let step = native_step(&timestamps)?;
        let weight = Hours(duration_hours(step));
        let snapshots = timestamps
            .into_iter()
            .map(|timestamp| Snapshot { timestamp, weight })
            .collect();
        Self::new(snapshots, columns)
    }

    /// The snapshots covered
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Number of snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the series has no snapshots (never true for a validated series)
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Sum of snapshot weights
    pub fn total_weight(&self) -> Hours {
        self.snapshots.iter().map(|s| s.weight).sum()
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        let values = self.columns.get(name).ok_or_else(|| {
            ModelError::Configuration(format!("Time series has no column named {name}"))
        })?;
        Ok(values)
    }

    /// The names of all columns
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Resample to a coarser resolution.
    ///
    /// Buckets are `resolution` long and aligned to midnight of the first snapshot's day; each
    /// bucket is labelled with its left edge. The weight of each new snapshot is the total weight
    /// of the samples in its bucket, so a partial bucket at either end of the horizon gets a
    /// smaller weight. The resolution must be a whole multiple of the native step.
    pub fn resample(&self, resolution: Hours, method: ResampleMethod) -> Result<Self> {
        ensure!(
            resolution.value() > 0.0 && resolution.is_finite(),
            ModelError::Configuration("Resolution must be a positive number of hours".into())
        );
        let resolution = hours_to_duration(resolution)?;
        let native_step = self
            .snapshots
            .get(1)
            .map(|s| s.timestamp - self.snapshots[0].timestamp);
        if let Some(native) = native_step {
            ensure!(
                resolution.num_seconds() % native.num_seconds() == 0,
                ModelError::Configuration(format!(
                    "Resolution of {} hours is not a multiple of the time series step of {} hours",
                    duration_hours(resolution),
                    duration_hours(native)
                ))
            );
        }

        let origin = self.snapshots[0].timestamp.date().and_time(NaiveTime::MIN);
        let bucket_of = |timestamp: NaiveDateTime| {
            (timestamp - origin).num_seconds().div_euclid(resolution.num_seconds())
        };

        // Group sample indices by bucket; input is sorted so buckets are contiguous
        let mut buckets: Vec<(i64, Vec<usize>)> = Vec::new();
        for (i, snapshot) in self.snapshots.iter().enumerate() {
            let bucket = bucket_of(snapshot.timestamp);
            match buckets.last_mut() {
                Some((last, indices)) if *last == bucket => indices.push(i),
                _ => buckets.push((bucket, vec![i])),
            }
        }

        let snapshots = buckets
            .iter()
            .map(|(bucket, indices)| Snapshot {
                timestamp: origin + Duration::seconds(bucket * resolution.num_seconds()),
                weight: indices.iter().map(|&i| self.snapshots[i].weight).sum(),
            })
            .collect();

        let columns = self
            .columns
            .iter()
            .map(|(name, values)| {
                let resampled = buckets
                    .iter()
                    .map(|(_, indices)| match method {
                        ResampleMethod::First => values[indices[0]],
                        ResampleMethod::Mean => {
                            indices.iter().map(|&i| values[i]).sum::<f64>() / indices.len() as f64
                        }
                    })
                    .collect();
                (name.clone(), resampled)
            })
            .collect();

        Self::new(snapshots, columns)
    }

    /// Scale the snapshot weights so they add up to a full year
    pub fn annualise(&mut self) {
        let factor = HOURS_PER_YEAR / self.total_weight().value();
        for snapshot in &mut self.snapshots {
            snapshot.weight = Hours(snapshot.weight.value() * factor);
        }
    }
}

/// Get the constant step between timestamps.
///
/// A single timestamp is taken to represent one hour.
fn native_step(timestamps: &[NaiveDateTime]) -> Result<Duration> {
    ensure!(
        !timestamps.is_empty(),
        ModelError::Data("Time series has no rows".into())
    );
    let Some(step) = timestamps.get(1).map(|t| *t - timestamps[0]) else {
        return Ok(Duration::hours(1));
    };
    ensure!(
        step > Duration::zero(),
        ModelError::Data(format!(
            "Timestamps must be in increasing order (found {} after {})",
            timestamps[1], timestamps[0]
        ))
    );

    for (prev, next) in timestamps.iter().zip(timestamps.iter().skip(1)) {
        let diff = *next - *prev;
        ensure!(
            diff > Duration::zero(),
            ModelError::Data(format!(
                "Timestamps must be unique and in increasing order (found {next} after {prev})"
            ))
        );
        ensure!(
            diff == step,
            ModelError::Data(format!(
                "Gap in time series between {prev} and {next}: expected a step of {} hours",
                duration_hours(step)
            ))
        );
    }

    Ok(step)
}

fn duration_hours(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 3600.0
}

fn hours_to_duration(hours: Hours) -> Result<Duration> {
    let seconds = hours.value() * 3600.0;
    ensure!(
        seconds.fract() == 0.0,
        ModelError::Configuration(format!(
            "Resolution of {hours} hours is not a whole number of seconds"
        ))
    );
    #[allow(clippy::cast_possible_truncation)]
    let seconds = seconds as i64;
    Ok(Duration::seconds(seconds))
}
