//! Defines the `ModelParameters` struct, which represents the contents of `model.toml`.
use crate::error::ModelError;
use crate::input::{input_err_msg, read_toml};
use crate::scenario::Scenario;
use crate::snapshot::ResampleMethod;
use crate::sweep::SweepParameter;
use crate::technology::FuelInheritance;
use crate::topology::{GeneratorSpec, StorageSpec, TopologySpec};
use crate::units::{Emissions, MoneyPerPowerPerLength};
use anyhow::{Context, Result, ensure};
use indexmap::{IndexMap, IndexSet};
use log::warn;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::{Path, PathBuf};

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_costs_file, PathBuf, PathBuf::from("costs.csv"));
define_param_default!(default_time_series_file, PathBuf, PathBuf::from("time_series.csv"));
define_param_default!(default_demand_columns, Vec<String>, vec!["load".into()]);
define_param_default!(default_resolution_hours, f64, 4.0);
define_param_default!(
    default_sweep_values,
    Vec<f64>,
    vec![0.0, 25.0, 50.0, 100.0, 150.0, 200.0]
);

/// Represents the contents of the entire model file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// Where technology costs come from and how they are completed
    #[serde(default)]
    pub costs: CostParameters,
    /// Where the time series comes from and how it is resampled
    #[serde(default)]
    pub time_series: TimeSeriesParameters,
    /// The buses of the model and the links between them
    #[serde(default)]
    pub topology: TopologySpec,
    /// Generator technologies
    #[serde(default)]
    pub generators: Vec<GeneratorSpec>,
    /// Storage technologies
    #[serde(default)]
    pub storage_units: Vec<StorageSpec>,
    /// The scenario applied to the base network for a single run
    #[serde(default)]
    pub scenario: ScenarioParameters,
    /// The default sensitivity sweep
    #[serde(default)]
    pub sweep: SweepParameters,
    /// Options for the solver
    #[serde(default)]
    pub solver: SolverParameters,
}

/// The `[costs]` section of the model file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CostParameters {
    /// Path to the cost table, relative to the model directory
    pub file: PathBuf,
    /// Technologies to keep from the cost table (all are kept if empty)
    pub technologies: Vec<String>,
    /// Fuel inheritance rules
    pub inherit: Vec<FuelInheritance>,
    /// Attributes for technologies which may be missing from the cost table
    pub fallback: IndexMap<String, IndexMap<String, f64>>,
}

impl Default for CostParameters {
    fn default() -> Self {
        Self {
            file: default_costs_file(),
            technologies: Vec::new(),
            inherit: FuelInheritance::default_rules(),
            fallback: IndexMap::new(),
        }
    }
}

/// The unit demand is given in
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::upper_case_acronyms)]
pub enum PowerUnit {
    /// Kilowatts
    #[string = "kW"]
    KW,
    /// Megawatts
    #[default]
    #[string = "MW"]
    MW,
    /// Gigawatts
    #[string = "GW"]
    GW,
}

impl PowerUnit {
    /// The factor converting a value in this unit to MW
    pub fn to_mw(self) -> f64 {
        match self {
            Self::KW => 1e-3,
            Self::MW => 1.0,
            Self::GW => 1e3,
        }
    }
}

/// The `[time_series]` section of the model file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeSeriesParameters {
    /// Path to the time series, relative to the model directory
    pub file: PathBuf,
    /// Columns holding demand rather than availability
    pub demand_columns: Vec<String>,
    /// The unit of the demand columns
    pub load_unit: PowerUnit,
    /// The length of each snapshot after resampling
    pub resolution_hours: f64,
    /// How native samples are combined when resampling
    pub resample: ResampleMethod,
    /// Whether to scale snapshot weights so that they sum to one year
    pub annualise: bool,
}

impl Default for TimeSeriesParameters {
    fn default() -> Self {
        Self {
            file: default_time_series_file(),
            demand_columns: default_demand_columns(),
            load_unit: PowerUnit::default(),
            resolution_hours: default_resolution_hours(),
            resample: ResampleMethod::default(),
            annualise: false,
        }
    }
}

/// The `[scenario]` section of the model file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ScenarioParameters {
    /// Cap on total emissions (Mt CO2)
    #[serde(default)]
    pub co2_limit_mt: Option<f64>,
    /// Overrides the cost of transmission (EUR/MW/km/year)
    #[serde(default)]
    pub transmission_cost: Option<f64>,
}

impl ScenarioParameters {
    /// The scenarios making up the base case, in the order they are applied
    pub fn scenarios(&self) -> Vec<Scenario> {
        let mut scenarios = Vec::new();
        if let Some(limit) = self.co2_limit_mt {
            scenarios.push(Scenario::Co2Limit(Emissions::from_megatonnes(limit)));
        }
        if let Some(cost) = self.transmission_cost {
            scenarios.push(Scenario::TransmissionCost(MoneyPerPowerPerLength(cost)));
        }
        scenarios
    }
}

/// The `[sweep]` section of the model file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepParameters {
    /// The parameter which is varied
    pub parameter: SweepParameter,
    /// The values taken by the parameter, in the parameter's unit
    pub values: Vec<f64>,
}

impl Default for SweepParameters {
    fn default() -> Self {
        Self {
            parameter: SweepParameter::default(),
            values: default_sweep_values(),
        }
    }
}

/// The `[solver]` section of the model file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SolverParameters {
    /// Abort the solve after this many seconds
    #[serde(default)]
    pub time_limit_seconds: Option<f64>,
}

fn config_err(msg: impl Into<String>) -> ModelError {
    ModelError::Configuration(msg.into())
}

fn check_non_negative(value: f64, name: &str) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        config_err(format!("{name} must be a finite number of at least zero"))
    );

    Ok(())
}

/// Check that the `[time_series]` section is valid
fn check_time_series(params: &TimeSeriesParameters) -> Result<()> {
    ensure!(
        params.resolution_hours.is_finite() && params.resolution_hours > 0.0,
        config_err("resolution_hours must be a finite number greater than zero")
    );
    ensure!(
        !params.demand_columns.is_empty(),
        config_err("At least one demand column must be given")
    );

    Ok(())
}

/// Check that the units to be added to the network are valid
fn check_units(generators: &[GeneratorSpec], storage_units: &[StorageSpec]) -> Result<()> {
    for generator in generators {
        check_non_negative(generator.p_nom, &format!("p_nom of {}", generator.technology))?;
        if let Some(p_nom_max) = generator.p_nom_max {
            ensure!(
                p_nom_max >= generator.p_nom,
                config_err(format!(
                    "p_nom_max of {} is smaller than p_nom",
                    generator.technology
                ))
            );
        }
    }

    for storage in storage_units {
        ensure!(
            storage.max_hours.is_finite() && storage.max_hours > 0.0,
            config_err(format!("max_hours of {} must be greater than zero", storage.name))
        );
        ensure!(
            (0.0..1.0).contains(&storage.standing_loss),
            config_err(format!("standing_loss of {} must lie in [0, 1)", storage.name))
        );
        check_non_negative(storage.p_nom, &format!("p_nom of {}", storage.name))?;
        check_non_negative(
            storage.state_of_charge_initial,
            &format!("state_of_charge_initial of {}", storage.name),
        )?;
    }

    if generators.is_empty() && storage_units.is_empty() {
        warn!("No generators or storage units are defined");
    }

    Ok(())
}

/// Check that the `[sweep]` section is valid
fn check_sweep(sweep: &SweepParameters) -> Result<()> {
    ensure!(!sweep.values.is_empty(), config_err("Sweep values are empty"));
    for value in &sweep.values {
        check_non_negative(*value, "Each sweep value")?;
    }

    Ok(())
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// Validate parameters after reading in file
    pub fn validate(&self) -> Result<()> {
        check_time_series(&self.time_series)?;

        self.topology.validate()?;
        for column in self.topology.demand_columns() {
            ensure!(
                self.time_series.demand_columns.iter().any(|c| c == column),
                config_err(format!(
                    "Column {column} is used for demand but is not listed in \
                    time_series.demand_columns"
                ))
            );
        }

        check_units(&self.generators, &self.storage_units)?;

        if let Some(limit) = self.scenario.co2_limit_mt {
            check_non_negative(limit, "co2_limit_mt")?;
        }
        if let Some(cost) = self.scenario.transmission_cost {
            check_non_negative(cost, "transmission_cost")?;
        }

        check_sweep(&self.sweep)?;

        if let Some(limit) = self.solver.time_limit_seconds {
            ensure!(
                limit.is_finite() && limit > 0.0,
                config_err("time_limit_seconds must be greater than zero")
            );
        }

        Ok(())
    }

    /// All technologies which the model refers to
    pub fn referenced_technologies(&self) -> IndexSet<String> {
        self.generators
            .iter()
            .map(|generator| generator.technology.as_str())
            .chain(self.storage_units.iter().flat_map(StorageSpec::technologies))
            .chain(self.topology.technologies())
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_model_error, model_parameters};
    use rstest::rstest;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_model_file(dir: &Path, contents: &str) {
        let mut file = File::create(dir.join(MODEL_PARAMETERS_FILE_NAME)).unwrap();
        write!(file, "{contents}").unwrap();
    }

    #[test]
    fn test_model_params_from_path_defaults() {
        let dir = tempdir().unwrap();
        write_model_file(
            dir.path(),
            "[[generators]]\ntechnology = \"onwind\"\nprofile = \"onwind\"\n",
        );

        let params = ModelParameters::from_path(dir.path()).unwrap();
        assert_eq!(params.costs.file, PathBuf::from("costs.csv"));
        assert_eq!(params.costs.inherit, FuelInheritance::default_rules());
        assert_eq!(params.time_series.resample, ResampleMethod::First);
        assert_eq!(params.time_series.load_unit, PowerUnit::MW);
        assert_eq!(params.topology, TopologySpec::default());
        assert_eq!(params.sweep.parameter, SweepParameter::Co2Limit);
        assert_eq!(params.sweep.values, default_sweep_values());
        assert!(params.generators[0].extendable);
    }

    #[test]
    fn test_model_params_from_path_full() {
        let dir = tempdir().unwrap();
        write_model_file(
            dir.path(),
            r#"
[costs]
file = "my_costs.csv"
technologies = ["onwind"]

[costs.fallback."load shedding"]
VOM = 3000

[time_series]
load_unit = "GW"
resolution_hours = 3
resample = "mean"

[topology]
kind = "multi_region"
regions = [
    { name = "north", demand_share = 0.3 },
    { name = "south", demand_share = 0.7 },
]
transmission = [{ bus0 = "north", bus1 = "south", length_km = 400 }]

[[storage_units]]
name = "battery"
max_hours = 6
charger = "battery inverter"
store = "battery storage"

[scenario]
co2_limit_mt = 50

[sweep]
parameter = "transmission_cost"
values = [250, 500]

[solver]
time_limit_seconds = 60
"#,
        );

        let params = ModelParameters::from_path(dir.path()).unwrap();
        assert_eq!(params.costs.fallback["load shedding"]["VOM"], 3000.0);
        assert_eq!(params.time_series.load_unit, PowerUnit::GW);
        assert_eq!(params.time_series.resample, ResampleMethod::Mean);
        assert_eq!(params.topology.electricity_buses(), ["north", "south"]);
        assert_eq!(params.sweep.parameter, SweepParameter::TransmissionCost);
        assert_eq!(params.scenario.scenarios(), [Scenario::co2_limit_mt(50.0)]);
        assert_eq!(
            params.referenced_technologies(),
            ["battery inverter", "battery storage"]
                .into_iter()
                .map(String::from)
                .collect::<IndexSet<String>>()
        );
    }

    #[test]
    fn test_model_params_bad_toml() {
        let dir = tempdir().unwrap();
        write_model_file(dir.path(), "[topology]\nkind = \"ring\"\n");
        assert_model_error!(
            ModelParameters::from_path(dir.path()),
            ModelError::Configuration(_)
        );
    }

    #[rstest]
    fn test_validate_ok(model_parameters: ModelParameters) {
        assert!(model_parameters.validate().is_ok());
    }

    #[rstest]
    #[case(0.0)]
    #[case(-4.0)]
    #[case(f64::NAN)]
    fn test_validate_bad_resolution(mut model_parameters: ModelParameters, #[case] value: f64) {
        model_parameters.time_series.resolution_hours = value;
        assert_model_error!(model_parameters.validate(), ModelError::Configuration(_));
    }

    #[rstest]
    fn test_validate_unlisted_demand_column(mut model_parameters: ModelParameters) {
        model_parameters.topology = TopologySpec::SingleNode {
            bus: "electricity".into(),
            demand_column: "heat".into(),
        };
        assert_model_error!(model_parameters.validate(), ModelError::Configuration(_));
    }

    #[rstest]
    fn test_validate_bad_sweep(mut model_parameters: ModelParameters) {
        model_parameters.sweep.values = vec![50.0, -1.0];
        assert_model_error!(model_parameters.validate(), ModelError::Configuration(_));

        model_parameters.sweep.values.clear();
        assert_model_error!(model_parameters.validate(), ModelError::Configuration(_));
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(6.0, 1.0)]
    fn test_validate_bad_storage(
        mut model_parameters: ModelParameters,
        #[case] max_hours: f64,
        #[case] standing_loss: f64,
    ) {
        model_parameters.storage_units[0].max_hours = max_hours;
        model_parameters.storage_units[0].standing_loss = standing_loss;
        assert_model_error!(model_parameters.validate(), ModelError::Configuration(_));
    }

    #[test]
    fn test_scenario_parameters() {
        let params = ScenarioParameters {
            co2_limit_mt: Some(25.0),
            transmission_cost: Some(400.0),
        };
        assert_eq!(
            params.scenarios(),
            [
                Scenario::co2_limit_mt(25.0),
                Scenario::TransmissionCost(MoneyPerPowerPerLength(400.0))
            ]
        );
        assert!(ScenarioParameters::default().scenarios().is_empty());
    }
}
