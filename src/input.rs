//! Common routines for handling input data.
use crate::error::ModelError;
use crate::model::{Model, ModelParameters};
use crate::topology::build_network;
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use log::info;
use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use std::fs;
use std::path::Path;

pub mod technology;
use technology::read_technology_table;
pub mod time_series;
use time_series::read_time_series;

/// Read a series of type `T`s from a CSV file.
///
/// Whitespace around fields is trimmed. Parse errors are reported as data errors.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(file_path)
        .map_err(|err| ModelError::Data(err.to_string()))
        .with_context(|| input_err_msg(file_path))?;

    let vec: Vec<T> = reader
        .into_deserialize()
        .map(|result| {
            result
                .map_err(|err| ModelError::Data(err.to_string()))
                .with_context(|| input_err_msg(file_path))
        })
        .try_collect()?;

    ensure!(
        !vec.is_empty(),
        ModelError::Data(format!("CSV file {} cannot be empty", file_path.display()))
    );

    Ok(vec)
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str)
        .map_err(|err| ModelError::Configuration(err.to_string()))
        .with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Read an f64, checking that it is between 0 and 1
pub fn deserialise_proportion<'de, D>(deserialiser: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Deserialize::deserialize(deserialiser)?;
    if !(0.0..=1.0).contains(&value) {
        Err(serde::de::Error::custom("Value must be between 0 and 1"))?;
    }

    Ok(value)
}

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Indicates whether an iterator is sorted and unique
pub fn is_sorted_and_unique<T, I>(iter: I) -> bool
where
    T: PartialOrd + Clone,
    I: IntoIterator<Item = T>,
{
    iter.into_iter().tuple_windows().all(|(a, b)| a < b)
}

/// Read a model from the specified directory.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// The loaded model, whose base network has been built but not solved.
pub fn load_model<P: AsRef<Path>>(model_dir: P) -> Result<Model> {
    let model_dir = model_dir.as_ref();
    let parameters = ModelParameters::from_path(model_dir)?;

    let technologies = read_technology_table(model_dir, &parameters)?;
    info!("Read {} technologies", technologies.len());

    let time_series = read_time_series(model_dir, &parameters.time_series)?;
    info!(
        "Read time series with {} snapshots covering {} hours",
        time_series.len(),
        time_series.total_weight()
    );

    let network = build_network(&parameters, &technologies, &time_series)
        .context("Failed to build network")?;

    Ok(Model {
        model_dir: model_dir.to_path_buf(),
        parameters,
        technologies,
        time_series,
        network,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_model_error;
    use serde::Deserialize;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Record {
        id: String,
        value: u32,
    }

    /// Test a normal read
    #[test]
    fn test_read_csv() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.csv");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "id,value\nhello, 1\n world ,2\n").unwrap();
        }
        let records: Vec<Record> = read_csv(&file_path).unwrap();
        assert_eq!(
            records,
            &[
                Record {
                    id: "hello".to_string(),
                    value: 1,
                },
                Record {
                    id: "world".to_string(),
                    value: 2,
                }
            ]
        );
    }

    #[test]
    fn test_read_csv_empty() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.csv");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "id,value").unwrap();
        }
        assert_model_error!(read_csv::<Record>(&file_path), ModelError::Data(_));
    }

    #[test]
    fn test_read_csv_bad_value() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.csv");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "id,value\nhello,x").unwrap();
        }
        assert_model_error!(read_csv::<Record>(&file_path), ModelError::Data(_));
    }

    #[test]
    fn test_read_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.toml");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "id = \"hello\"\nvalue = 1").unwrap();
        }

        assert_eq!(
            read_toml::<Record>(&file_path).unwrap(),
            Record {
                id: "hello".to_string(),
                value: 1,
            }
        );

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "bad toml syntax").unwrap();
        }

        assert_model_error!(read_toml::<Record>(&file_path), ModelError::Configuration(_));
    }

    #[test]
    fn test_is_sorted_and_unique() {
        assert!(is_sorted_and_unique([1, 2, 3]));
        assert!(is_sorted_and_unique(Vec::<u32>::new()));
        assert!(!is_sorted_and_unique([1, 1, 2]));
        assert!(!is_sorted_and_unique([2, 1]));
    }
}
