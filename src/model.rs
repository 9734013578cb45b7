//! The model struct and its parameters.
use crate::network::Network;
use crate::snapshot::TimeSeries;
use crate::technology::TechnologyTable;
use std::path::PathBuf;

pub mod parameters;
pub use parameters::{
    CostParameters, ModelParameters, PowerUnit, ScenarioParameters, SolverParameters,
    SweepParameters, TimeSeriesParameters,
};

/// A loaded model, ready to be optimised
#[derive(Debug, Clone)]
pub struct Model {
    /// Path to the model folder
    pub model_dir: PathBuf,
    /// Parameters from the model TOML file
    pub parameters: ModelParameters,
    /// The technologies used in the model
    pub technologies: TechnologyTable,
    /// The resampled time series
    pub time_series: TimeSeries,
    /// The base network, without any scenario applied
    pub network: Network,
}
