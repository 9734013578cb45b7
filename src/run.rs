//! Functionality for optimising a model and writing the results to disk.
use crate::model::Model;
use crate::network::Network;
use crate::optimisation::{HighsSolver, Solver};
use crate::output::metadata::write_metadata;
use crate::output::network::write_network;
use crate::output::{DataWriter, SweepWriter, network_export_dir, write_technologies};
use crate::scenario::Scenario;
use crate::solution::Solution;
use crate::statistics::{
    capacity_by_carrier, storage_energy_capacity, system_cost, total_cost_bn,
};
use crate::sweep::{SweepParameter, SweepPoint, run_sweep};
use crate::units::MWH_PER_GWH;
use anyhow::{Context, Result};
use itertools::Itertools;
use log::{info, warn};
use std::path::Path;

/// Options controlling what is written for a run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Whether to write additional information to CSV files
    pub debug_model: bool,
    /// Whether to export each solved network to a folder of CSV files
    pub export_network: bool,
}

/// The base case of a model: its network with the scenarios from the model file applied.
///
/// # Returns
///
/// A label for the base case and its network
pub fn base_case(model: &Model) -> Result<(String, Network)> {
    let scenarios = model.parameters.scenario.scenarios();
    let mut network = model.network.clone();
    for scenario in &scenarios {
        scenario
            .apply_in_place(&mut network)
            .with_context(|| format!("Failed to apply {scenario}"))?;
    }

    let label = if scenarios.is_empty() {
        Scenario::Base.to_string()
    } else {
        scenarios.iter().join(", ")
    };

    Ok((label, network))
}

/// Log the headline results for a solution
fn log_summary(network: &Network, solution: &Solution) {
    let costs = system_cost(network, solution);
    info!("Total system cost: {:.3} bn EUR/a", total_cost_bn(&costs));
    info!(
        "Total emissions: {:.3} Mt CO2",
        solution.total_emissions.megatonnes()
    );
    for (carrier, capacity) in capacity_by_carrier(network, solution) {
        info!("Capacity of {carrier}: {:.1} MW", capacity.value());
    }
    for (id, energy) in storage_energy_capacity(network, solution) {
        info!(
            "Energy capacity of {id}: {:.2} GWh",
            energy.value() / MWH_PER_GWH
        );
    }
}

/// Optimise the base case of a model and write the results.
///
/// # Arguments
///
/// * `model` - The model to run
/// * `output_path` - The folder to which output files will be written
/// * `opts` - What to write
pub fn run(model: &Model, output_path: &Path, opts: RunOptions) -> Result<Solution> {
    write_metadata(output_path, model, "run")?;
    write_technologies(output_path, &model.technologies)?;

    let (label, network) = base_case(model)?;
    info!("Optimising the {label}");
    let solver = HighsSolver::from_parameters(&model.parameters.solver);
    let solution = solver
        .solve(&network)
        .with_context(|| format!("Failed to optimise the {label}"))?;
    log_summary(&network, &solution);

    let mut writer = DataWriter::create(output_path, opts.debug_model)?;
    writer.write_solution(&label, &network, &solution)?;
    writer.flush()?;

    if opts.export_network {
        write_network(&network_export_dir(output_path, &label), &network, &solution)?;
    }

    Ok(solution)
}

/// Run a sensitivity sweep on the base case of a model and write the results.
///
/// Failed points are reported and written to the sweep summary, but don't stop the sweep.
///
/// # Arguments
///
/// * `model` - The model to run
/// * `parameter` - The scenario parameter to vary
/// * `values` - The values the parameter takes
/// * `output_path` - The folder to which output files will be written
/// * `opts` - What to write
pub fn sweep(
    model: &Model,
    parameter: SweepParameter,
    values: &[f64],
    output_path: &Path,
    opts: RunOptions,
) -> Result<Vec<SweepPoint>> {
    write_metadata(output_path, model, "sweep")?;
    write_technologies(output_path, &model.technologies)?;

    let (label, base) = base_case(model)?;
    info!(
        "Sweeping {} over {} values ({}) from the {label}",
        parameter.name(),
        values.len(),
        parameter.unit()
    );
    let solver = HighsSolver::from_parameters(&model.parameters.solver);
    let points = run_sweep(&base, parameter, values, &solver);

    let mut writer = DataWriter::create(output_path, opts.debug_model)?;
    let mut sweep_writer = SweepWriter::create(output_path, parameter)?;
    for point in &points {
        let Ok(solution) = &point.outcome else {
            sweep_writer.write_point(point, None)?;
            continue;
        };

        // Applying the scenario succeeded when the point was solved
        let network = point.scenario.apply(&base)?;
        sweep_writer.write_point(point, Some(&network))?;

        let label = point.scenario.to_string();
        writer.write_solution(&label, &network, solution)?;
        if opts.export_network {
            write_network(&network_export_dir(output_path, &label), &network, solution)?;
        }
    }
    writer.flush()?;
    sweep_writer.flush()?;

    let failed = points.iter().filter(|point| point.outcome.is_err()).count();
    if failed > 0 {
        warn!("{failed} of {} sweep points failed", points.len());
    }

    Ok(points)
}
