//! The module responsible for writing output data to disk.
use crate::id::{BusID, CarrierID, ComponentID, ConstraintID, TechnologyID};
use crate::network::Network;
use crate::scenario::CO2_LIMIT_CONSTRAINT;
use crate::solution::Solution;
use crate::statistics::{energy_balance, storage_energy_capacity, system_cost, total_cost_bn};
use crate::sweep::{SweepParameter, SweepPoint};
use crate::technology::{TechnologyRecord, TechnologyTable};
use crate::units::{
    Dimensionless, EmissionsPerEnergy, Energy, Money, MoneyPerEnergy, MoneyPerPower, Power,
};
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;
pub mod network;

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "gridplan_results";

/// The output file name for technology parameters
const TECHNOLOGIES_FILE_NAME: &str = "technologies.csv";

/// The output file name for optimised capacities
const CAPACITIES_FILE_NAME: &str = "capacities.csv";

/// The output file name for the energy balance
const DISPATCH_FILE_NAME: &str = "dispatch.csv";

/// The output file name for costs by carrier
const COSTS_FILE_NAME: &str = "costs.csv";

/// The output file name for bus prices
const PRICES_FILE_NAME: &str = "prices.csv";

/// The output file name for the sweep summary
const SWEEP_FILE_NAME: &str = "sweep.csv";

/// The output file name for global constraint duals
const GLOBAL_CONSTRAINT_DUALS_FILE_NAME: &str = "debug_global_constraint_duals.csv";

/// The folder the solved network is exported to
const NETWORK_DIRECTORY_NAME: &str = "network";

/// Get the model name from the specified directory path
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Get the model name from the dir path. This ends up being convoluted because we need to check
    // for all possible errors. Ugh.
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    // Construct path
    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory for the model specified at `model_dir`.
///
/// An existing folder which is not empty is only replaced if `allow_overwrite` is set.
///
/// # Returns
///
/// Whether an existing folder with contents was overwritten
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    if output_dir.is_dir() {
        if fs::read_dir(output_dir)?.next().is_none() {
            // already exists and is empty
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Use --overwrite to replace it."
        );
        fs::remove_dir_all(output_dir)?;
        fs::create_dir_all(output_dir)?;
        return Ok(true);
    }

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(false)
}

/// The folder a solved network is exported to, within the output folder.
///
/// Each scenario gets its own folder, named after its label.
pub fn network_export_dir(output_path: &Path, label: &str) -> PathBuf {
    let name: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    output_path.join(NETWORK_DIRECTORY_NAME).join(name)
}

/// The type of a network component in output files
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, SerializeLabeledStringEnum, DeserializeLabeledStringEnum,
)]
enum ComponentKind {
    #[string = "generator"]
    Generator,
    #[string = "storage_unit"]
    StorageUnit,
    #[string = "link"]
    Link,
}

/// Represents a row in the technologies CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct TechnologyRow {
    technology: TechnologyID,
    investment: MoneyPerPower,
    fom: f64,
    vom: MoneyPerEnergy,
    efficiency: Dimensionless,
    fuel: MoneyPerEnergy,
    lifetime: f64,
    co2_intensity: EmissionsPerEnergy,
    discount_rate: Dimensionless,
    capital_cost: MoneyPerPower,
    marginal_cost: MoneyPerEnergy,
}

impl TechnologyRow {
    fn new(record: &TechnologyRecord) -> Self {
        Self {
            technology: record.id.clone(),
            investment: record.investment,
            fom: record.fom,
            vom: record.vom,
            efficiency: record.efficiency,
            fuel: record.fuel,
            lifetime: record.lifetime,
            co2_intensity: record.co2_intensity,
            discount_rate: record.discount_rate,
            capital_cost: record.capital_cost(),
            marginal_cost: record.marginal_cost(),
        }
    }
}

/// Represents a row in the capacities CSV file.
///
/// For links, `bus` is the bus power is withdrawn from.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct CapacityRow {
    scenario: String,
    component: ComponentID,
    kind: ComponentKind,
    bus: BusID,
    carrier: CarrierID,
    p_nom_opt: Power,
    e_nom_opt: Option<Energy>,
}

/// Represents a row in the dispatch CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DispatchRow {
    scenario: String,
    snapshot: String,
    bus: BusID,
    carrier: CarrierID,
    power: Power,
}

/// Represents a row in the costs CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct CostRow {
    scenario: String,
    carrier: CarrierID,
    capex: Money,
    opex: Money,
    total: Money,
}

/// Represents a row in the prices CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct PriceRow {
    scenario: String,
    snapshot: String,
    bus: BusID,
    price: MoneyPerEnergy,
}

/// Represents a row in the sweep CSV file.
///
/// The result columns are empty for points which failed.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct SweepRow {
    parameter: SweepParameter,
    value: f64,
    scenario: String,
    status: String,
    total_cost_bn: Option<f64>,
    total_emissions_mt: Option<f64>,
    co2_dual: Option<f64>,
}

/// Represents a row in the global constraint duals CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct GlobalConstraintDualsRow {
    scenario: String,
    constraint: ConstraintID,
    value: f64,
}

/// Open a CSV file for writing in the output folder
fn new_writer(output_path: &Path, file_name: &str) -> Result<csv::Writer<File>> {
    let file_path = output_path.join(file_name);
    csv::Writer::from_path(&file_path)
        .with_context(|| format!("Failed to create {}", file_path.display()))
}

/// Write the technology records used by a model to file
pub fn write_technologies(output_path: &Path, technologies: &TechnologyTable) -> Result<()> {
    let mut writer = new_writer(output_path, TECHNOLOGIES_FILE_NAME)?;
    for record in technologies.iter() {
        writer.serialize(TechnologyRow::new(record))?;
    }
    writer.flush()?;

    Ok(())
}

/// For writing extra debug information about the model
struct DebugDataWriter {
    global_constraint_duals_writer: csv::Writer<File>,
}

impl DebugDataWriter {
    /// Open CSV files to write debug info to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    fn create(output_path: &Path) -> Result<Self> {
        Ok(Self {
            global_constraint_duals_writer: new_writer(
                output_path,
                GLOBAL_CONSTRAINT_DUALS_FILE_NAME,
            )?,
        })
    }

    /// Write global constraint duals to file
    fn write_global_constraint_duals(&mut self, scenario: &str, solution: &Solution) -> Result<()> {
        for (constraint, value) in &solution.constraint_duals {
            let row = GlobalConstraintDualsRow {
                scenario: scenario.into(),
                constraint: constraint.clone(),
                value: *value,
            };
            self.global_constraint_duals_writer.serialize(row)?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    fn flush(&mut self) -> Result<()> {
        self.global_constraint_duals_writer.flush()?;

        Ok(())
    }
}

/// An object for writing the results of optimised scenarios to file.
///
/// Rows for every scenario go into the same files, labelled with the scenario.
pub struct DataWriter {
    capacities_writer: csv::Writer<File>,
    dispatch_writer: csv::Writer<File>,
    costs_writer: csv::Writer<File>,
    prices_writer: csv::Writer<File>,
    debug_writer: Option<DebugDataWriter>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `save_debug_info` - Whether to include extra CSV files for debugging model
    pub fn create(output_path: &Path, save_debug_info: bool) -> Result<Self> {
        let debug_writer = if save_debug_info {
            // Create debug CSV files
            Some(DebugDataWriter::create(output_path)?)
        } else {
            None
        };

        Ok(Self {
            capacities_writer: new_writer(output_path, CAPACITIES_FILE_NAME)?,
            dispatch_writer: new_writer(output_path, DISPATCH_FILE_NAME)?,
            costs_writer: new_writer(output_path, COSTS_FILE_NAME)?,
            prices_writer: new_writer(output_path, PRICES_FILE_NAME)?,
            debug_writer,
        })
    }

    /// Write all results for one scenario.
    ///
    /// `network` must be the network the solution was found for, with the scenario applied.
    pub fn write_solution(
        &mut self,
        scenario: &str,
        network: &Network,
        solution: &Solution,
    ) -> Result<()> {
        self.write_capacities(scenario, network, solution)?;
        self.write_dispatch(scenario, network, solution)?;
        self.write_costs(scenario, network, solution)?;
        self.write_prices(scenario, solution)?;
        if let Some(wtr) = &mut self.debug_writer {
            wtr.write_global_constraint_duals(scenario, solution)?;
        }

        Ok(())
    }

    /// Write optimal capacities to a CSV file
    fn write_capacities(
        &mut self,
        scenario: &str,
        network: &Network,
        solution: &Solution,
    ) -> Result<()> {
        let energy = storage_energy_capacity(network, solution);
        let generators = solution.generators.iter().map(|(id, result)| {
            let generator = &network.generators()[id];
            let row = (ComponentKind::Generator, &generator.bus, &generator.carrier);
            (id, row, result.p_nom_opt)
        });
        let storage = solution.storage_units.iter().map(|(id, result)| {
            let storage = &network.storage_units()[id];
            let row = (ComponentKind::StorageUnit, &storage.bus, &storage.carrier);
            (id, row, result.p_nom_opt)
        });
        let links = solution.links.iter().map(|(id, result)| {
            let link = &network.links()[id];
            let row = (ComponentKind::Link, &link.bus0, &link.carrier);
            (id, row, result.p_nom_opt)
        });

        for (id, (kind, bus, carrier), p_nom_opt) in generators.chain(storage).chain(links) {
            let row = CapacityRow {
                scenario: scenario.into(),
                component: id.clone(),
                kind,
                bus: bus.clone(),
                carrier: carrier.clone(),
                p_nom_opt,
                e_nom_opt: energy.get(id).copied(),
            };
            self.capacities_writer.serialize(row)?;
        }

        Ok(())
    }

    /// Write the energy balance to a CSV file
    fn write_dispatch(
        &mut self,
        scenario: &str,
        network: &Network,
        solution: &Solution,
    ) -> Result<()> {
        for ((bus, carrier), values) in energy_balance(network, solution) {
            for (snapshot, power) in solution.snapshots.iter().zip(values) {
                let row = DispatchRow {
                    scenario: scenario.into(),
                    snapshot: snapshot.timestamp.to_string(),
                    bus: bus.clone(),
                    carrier: carrier.clone(),
                    power,
                };
                self.dispatch_writer.serialize(row)?;
            }
        }

        Ok(())
    }

    /// Write costs by carrier to a CSV file
    fn write_costs(
        &mut self,
        scenario: &str,
        network: &Network,
        solution: &Solution,
    ) -> Result<()> {
        for (carrier, cost) in system_cost(network, solution) {
            let row = CostRow {
                scenario: scenario.into(),
                carrier,
                capex: cost.capex,
                opex: cost.opex,
                total: cost.total(),
            };
            self.costs_writer.serialize(row)?;
        }

        Ok(())
    }

    /// Write bus prices to a CSV file
    fn write_prices(&mut self, scenario: &str, solution: &Solution) -> Result<()> {
        for (bus, prices) in &solution.bus_prices {
            for (snapshot, price) in solution.snapshots.iter().zip(prices) {
                let row = PriceRow {
                    scenario: scenario.into(),
                    snapshot: snapshot.timestamp.to_string(),
                    bus: bus.clone(),
                    price: *price,
                };
                self.prices_writer.serialize(row)?;
            }
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.capacities_writer.flush()?;
        self.dispatch_writer.flush()?;
        self.costs_writer.flush()?;
        self.prices_writer.flush()?;
        if let Some(wtr) = &mut self.debug_writer {
            wtr.flush()?;
        }

        Ok(())
    }
}

/// An object for writing a summary of each point of a sweep to file
pub struct SweepWriter {
    writer: csv::Writer<File>,
    parameter: SweepParameter,
}

impl SweepWriter {
    /// Open the sweep summary file in the output folder
    pub fn create(output_path: &Path, parameter: SweepParameter) -> Result<Self> {
        Ok(Self {
            writer: new_writer(output_path, SWEEP_FILE_NAME)?,
            parameter,
        })
    }

    /// Write one point of the sweep.
    ///
    /// `network` is the network the point was solved for, if the scenario could be applied.
    pub fn write_point(&mut self, point: &SweepPoint, network: Option<&Network>) -> Result<()> {
        let mut row = SweepRow {
            parameter: self.parameter,
            value: point.value,
            scenario: point.scenario.to_string(),
            status: "optimal".into(),
            total_cost_bn: None,
            total_emissions_mt: None,
            co2_dual: None,
        };
        match &point.outcome {
            Ok(solution) => {
                if let Some(network) = network {
                    row.total_cost_bn = Some(total_cost_bn(&system_cost(network, solution)));
                }
                row.total_emissions_mt = Some(solution.total_emissions.megatonnes());
                row.co2_dual = solution.constraint_dual(CO2_LIMIT_CONSTRAINT);
            }
            Err(err) => row.status = err.status().into(),
        }
        self.writer.serialize(row)?;

        Ok(())
    }

    /// Flush the underlying stream
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ScenarioError, SolveError};
    use crate::fixture::{network, solver, technology_table, zero_solution};
    use crate::optimisation::{HighsSolver, Solver};
    use crate::scenario::Scenario;
    use float_cmp::assert_approx_eq;
    use itertools::Itertools;
    use rstest::rstest;
    use tempfile::tempdir;

    fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> Vec<T> {
        csv::Reader::from_path(path)
            .unwrap()
            .into_deserialize()
            .try_collect()
            .unwrap()
    }

    #[test]
    fn test_create_output_directory() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("results");

        // New folder
        assert!(!create_output_directory(&output_dir, false).unwrap());
        assert!(output_dir.is_dir());

        // Existing empty folder
        assert!(!create_output_directory(&output_dir, false).unwrap());

        // Existing folder with contents
        fs::write(output_dir.join("old.csv"), "a,b\n").unwrap();
        assert!(create_output_directory(&output_dir, false).is_err());
        assert!(create_output_directory(&output_dir, true).unwrap());
        assert!(!output_dir.join("old.csv").exists());
    }

    #[test]
    fn test_network_export_dir() {
        let path = network_export_dir(Path::new("out"), "CO2 limit of 50 Mt");
        assert_eq!(path, Path::new("out/network/CO2_limit_of_50_Mt"));
    }

    #[rstest]
    fn test_write_technologies(technology_table: TechnologyTable) {
        let dir = tempdir().unwrap();
        write_technologies(dir.path(), &technology_table).unwrap();

        let rows: Vec<TechnologyRow> = read_rows(&dir.path().join(TECHNOLOGIES_FILE_NAME));
        assert_eq!(rows.len(), technology_table.len());
        let ocgt = rows.iter().find(|row| row.technology.as_str() == "OCGT").unwrap();
        assert_eq!(*ocgt, TechnologyRow::new(technology_table.get("OCGT").unwrap()));
    }

    #[rstest]
    fn test_write_solution(network: Network, solver: HighsSolver) {
        let solution = solver.solve(&network).unwrap();
        let dir = tempdir().unwrap();
        {
            let mut writer = DataWriter::create(dir.path(), true).unwrap();
            writer
                .write_solution("base scenario", &network, &solution)
                .unwrap();
            writer.flush().unwrap();
        }

        let capacities: Vec<CapacityRow> = read_rows(&dir.path().join(CAPACITIES_FILE_NAME));
        assert_eq!(capacities.len(), 2);
        assert_eq!(capacities[0].component, "wind".into());
        assert_eq!(capacities[0].kind, ComponentKind::Generator);
        assert_approx_eq!(Power, capacities[0].p_nom_opt, Power(100.0), epsilon = 1e-6);
        assert_eq!(capacities[0].e_nom_opt, None);
        assert_eq!(capacities[1].kind, ComponentKind::StorageUnit);
        assert!(capacities[1].e_nom_opt.is_some());

        let costs: Vec<CostRow> = read_rows(&dir.path().join(COSTS_FILE_NAME));
        let total: Money = costs.iter().map(|row| row.total).sum();
        assert_approx_eq!(Money, total, solution.objective, epsilon = 1e-3);

        let n = network.snapshots().len();
        let prices: Vec<PriceRow> = read_rows(&dir.path().join(PRICES_FILE_NAME));
        assert_eq!(prices.len(), n);
        let dispatch: Vec<DispatchRow> = read_rows(&dir.path().join(DISPATCH_FILE_NAME));
        assert!(dispatch.iter().all(|row| row.scenario == "base scenario"));

        // No global constraints, so the debug file has just a header
        let duals: Vec<GlobalConstraintDualsRow> =
            read_rows(&dir.path().join(GLOBAL_CONSTRAINT_DUALS_FILE_NAME));
        assert!(duals.is_empty());
    }

    #[rstest]
    fn test_write_solution_no_debug(network: Network) {
        let solution = zero_solution(&network);
        let dir = tempdir().unwrap();
        {
            let mut writer = DataWriter::create(dir.path(), false).unwrap();
            writer.write_solution("base scenario", &network, &solution).unwrap();
            writer.flush().unwrap();
        }
        assert!(!dir.path().join(GLOBAL_CONSTRAINT_DUALS_FILE_NAME).exists());
    }

    #[rstest]
    fn test_write_sweep(network: Network) {
        let scenario = Scenario::co2_limit_mt(0.0);
        let ok = SweepPoint {
            value: 50.0,
            scenario: Scenario::co2_limit_mt(50.0),
            outcome: Ok(zero_solution(&network)),
        };
        let failed = SweepPoint {
            value: 0.0,
            scenario: scenario.clone(),
            outcome: Err(ScenarioError::Solve {
                scenario,
                source: SolveError::Infeasible,
            }),
        };

        let dir = tempdir().unwrap();
        {
            let mut writer = SweepWriter::create(dir.path(), SweepParameter::Co2Limit).unwrap();
            writer.write_point(&ok, Some(&network)).unwrap();
            writer.write_point(&failed, None).unwrap();
            writer.flush().unwrap();
        }

        let rows: Vec<SweepRow> = read_rows(&dir.path().join(SWEEP_FILE_NAME));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, "optimal");
        assert_eq!(rows[0].total_cost_bn, Some(0.0));
        assert_eq!(rows[1].scenario, "CO2 limit of 0 Mt");
        assert_eq!(rows[1].status, "infeasible");
        assert_eq!(rows[1].total_cost_bn, None);
    }
}
