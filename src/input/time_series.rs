//! Code for reading demand and availability time series from a CSV file.
//!
//! The first column holds timestamps and every other column is a profile. Demand columns are
//! converted to MW; all other columns are availability factors and must lie in [0, 1].
use super::input_err_msg;
use crate::error::ModelError;
use crate::model::TimeSeriesParameters;
use crate::snapshot::TimeSeries;
use crate::units::Hours;
use anyhow::{Context, Result, ensure};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use log::debug;
use std::io;
use std::path::Path;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Read and resample the time series for a model
pub fn read_time_series(model_dir: &Path, params: &TimeSeriesParameters) -> Result<TimeSeries> {
    let file_path = model_dir.join(&params.file);
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&file_path)
        .map_err(|err| ModelError::Data(err.to_string()))
        .with_context(|| input_err_msg(&file_path))?;

    read_time_series_from_reader(reader, params).with_context(|| input_err_msg(&file_path))
}

fn read_time_series_from_reader<R: io::Read>(
    mut reader: csv::Reader<R>,
    params: &TimeSeriesParameters,
) -> Result<TimeSeries> {
    let headers = reader
        .headers()
        .map_err(|err| ModelError::Data(err.to_string()))?
        .clone();
    ensure!(
        headers.len() > 1,
        ModelError::Data("Time series must have a timestamp column and at least one profile".into())
    );
    for column in &params.demand_columns {
        ensure!(
            headers.iter().skip(1).any(|header| header == column),
            ModelError::Configuration(format!("Demand column {column} not found in time series"))
        );
    }

    let names: Vec<String> = headers.iter().skip(1).map(String::from).collect();
    let mut timestamps = Vec::new();
    let mut columns: IndexMap<String, Vec<f64>> =
        names.iter().map(|name| (name.clone(), Vec::new())).collect();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|err| ModelError::Data(err.to_string()))?;
        timestamps.push(parse_timestamp(&record[0])?);
        for (name, cell) in names.iter().zip(record.iter().skip(1)) {
            let value = parse_value(name, cell, row)?;
            columns[name].push(value);
        }
    }

    let scale = params.load_unit.to_mw();
    for (name, values) in &mut columns {
        if params.demand_columns.contains(name) {
            for value in values.iter_mut() {
                ensure!(
                    *value >= 0.0,
                    ModelError::Data(format!("Demand column {name} contains a negative value"))
                );
                *value *= scale;
            }
        } else {
            ensure!(
                values.iter().all(|value| (0.0..=1.0).contains(value)),
                ModelError::Data(format!(
                    "Availability column {name} contains values outside [0, 1]"
                ))
            );
        }
    }

    let native = TimeSeries::from_samples(timestamps, columns)?;
    debug!(
        "Resampling {} native snapshots to {} hours using {:?} rule",
        native.len(),
        params.resolution_hours,
        params.resample
    );
    let mut resampled = native.resample(Hours(params.resolution_hours), params.resample)?;
    if params.annualise {
        resampled.annualise();
    }

    Ok(resampled)
}

fn parse_timestamp(cell: &str) -> Result<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(cell, format).ok())
        .ok_or_else(|| ModelError::Data(format!("Invalid timestamp '{cell}'")).into())
}

fn parse_value(column: &str, cell: &str, row: usize) -> Result<f64> {
    ensure!(
        !cell.is_empty(),
        ModelError::Data(format!("Missing value in column {column} of row {}", row + 1))
    );
    let value: f64 = cell.parse().map_err(|_| {
        ModelError::Data(format!(
            "Invalid value '{cell}' in column {column} of row {}",
            row + 1
        ))
    })?;
    ensure!(
        value.is_finite(),
        ModelError::Data(format!(
            "Non-finite value in column {column} of row {}",
            row + 1
        ))
    );

    Ok(value)
}
