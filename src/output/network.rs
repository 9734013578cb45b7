//! Export of a solved network as a folder of CSV files.
//!
//! Each component type has a static table with one row per component, named after the component
//! type (e.g. `generators.csv`). Values which vary over time are written to a table per attribute
//! with one row per snapshot and one column per component (e.g. `generators-p.csv`). Optimised
//! values are included alongside the inputs.
use crate::id::{BusID, CarrierID, ComponentID, ConstraintID};
use crate::network::{CarrierAttribute, ConstraintSense, Network};
use crate::snapshot::Snapshot;
use crate::solution::Solution;
use crate::units::{
    Dimensionless, Emissions, EmissionsPerEnergy, Energy, Hours, Length, MoneyPerEnergy,
    MoneyPerPower, Power,
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::borrow::Borrow;
use std::fs;
use std::iter;
use std::path::Path;

#[derive(Serialize)]
struct SnapshotRow {
    snapshot: String,
    weight: Hours,
}

#[derive(Serialize)]
struct CarrierRow<'a> {
    name: &'a CarrierID,
    co2_emissions: EmissionsPerEnergy,
}

#[derive(Serialize)]
struct BusRow<'a> {
    name: &'a BusID,
    carrier: &'a CarrierID,
}

#[derive(Serialize)]
struct LoadRow<'a> {
    name: &'a ComponentID,
    bus: &'a BusID,
}

#[derive(Serialize)]
struct GeneratorRow<'a> {
    name: &'a ComponentID,
    bus: &'a BusID,
    carrier: &'a CarrierID,
    p_nom: Power,
    p_nom_max: Option<Power>,
    p_nom_extendable: bool,
    capital_cost: MoneyPerPower,
    marginal_cost: MoneyPerEnergy,
    efficiency: Dimensionless,
    p_nom_opt: Option<Power>,
}

#[derive(Serialize)]
struct StorageUnitRow<'a> {
    name: &'a ComponentID,
    bus: &'a BusID,
    carrier: &'a CarrierID,
    p_nom: Power,
    p_nom_max: Option<Power>,
    p_nom_extendable: bool,
    max_hours: Hours,
    efficiency_store: Dimensionless,
    efficiency_dispatch: Dimensionless,
    capital_cost: MoneyPerPower,
    marginal_cost: MoneyPerEnergy,
    cyclic_state_of_charge: bool,
    state_of_charge_initial: Energy,
    standing_loss: Dimensionless,
    p_nom_opt: Option<Power>,
}

#[derive(Serialize)]
struct LinkRow<'a> {
    name: &'a ComponentID,
    bus0: &'a BusID,
    bus1: &'a BusID,
    carrier: &'a CarrierID,
    p_nom: Power,
    p_nom_max: Option<Power>,
    p_nom_extendable: bool,
    p_min_pu: f64,
    efficiency: Dimensionless,
    capital_cost: MoneyPerPower,
    marginal_cost: MoneyPerEnergy,
    length: Option<Length>,
    p_nom_opt: Option<Power>,
}

#[derive(Serialize)]
struct GlobalConstraintRow<'a> {
    name: &'a ConstraintID,
    carrier_attribute: CarrierAttribute,
    sense: ConstraintSense,
    constant: Emissions,
    mu: Option<f64>,
}

/// Write a table with one row per item
fn write_static<T, I>(dir: &Path, file_name: &str, rows: I) -> Result<()>
where
    T: Serialize,
    I: Iterator<Item = T>,
{
    let file_path = dir.join(file_name);
    let mut writer = csv::Writer::from_path(&file_path)
        .with_context(|| format!("Failed to create {}", file_path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Write a table with one row per snapshot and one column per component.
///
/// Nothing is written if there are no components.
fn write_varying<'a, K, I>(
    dir: &Path,
    file_name: &str,
    snapshots: &[Snapshot],
    columns: I,
) -> Result<()>
where
    K: Borrow<str> + 'a,
    I: IntoIterator<Item = (&'a K, Vec<f64>)>,
{
    let (names, values): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
    if names.is_empty() {
        return Ok(());
    }

    let file_path = dir.join(file_name);
    let mut writer = csv::Writer::from_path(&file_path)
        .with_context(|| format!("Failed to create {}", file_path.display()))?;
    let header = names.iter().map(|id| <K as Borrow<str>>::borrow(*id));
    writer.write_record(iter::once("snapshot").chain(header))?;
    for (t, snapshot) in snapshots.iter().enumerate() {
        let row = values.iter().map(|column: &Vec<f64>| column[t].to_string());
        writer.write_record(iter::once(snapshot.timestamp.to_string()).chain(row))?;
    }
    writer.flush()?;

    Ok(())
}

/// Strip the units from a series of values
fn values<T: Copy + Into<f64>>(values: &[T]) -> Vec<f64> {
    values.iter().map(|value| (*value).into()).collect()
}

/// Export a network and its solution to a folder of CSV files.
///
/// The folder is created if it doesn't exist. Components missing from the solution are written
/// without optimised values.
pub fn write_network(dir: &Path, network: &Network, solution: &Solution) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    let snapshots = network.snapshots();

    write_static(
        dir,
        "snapshots.csv",
        snapshots.iter().map(|snapshot| SnapshotRow {
            snapshot: snapshot.timestamp.to_string(),
            weight: snapshot.weight,
        }),
    )?;
    write_static(
        dir,
        "carriers.csv",
        network.carriers().values().map(|carrier| CarrierRow {
            name: &carrier.id,
            co2_emissions: carrier.co2_emissions,
        }),
    )?;
    write_static(
        dir,
        "buses.csv",
        network.buses().values().map(|bus| BusRow {
            name: &bus.id,
            carrier: &bus.carrier,
        }),
    )?;
    write_varying(
        dir,
        "buses-marginal_price.csv",
        snapshots,
        solution
            .bus_prices
            .iter()
            .map(|(id, prices)| (id, values(prices))),
    )?;

    write_static(
        dir,
        "loads.csv",
        network.loads().values().map(|load| LoadRow {
            name: &load.id,
            bus: &load.bus,
        }),
    )?;
    write_varying(
        dir,
        "loads-p_set.csv",
        snapshots,
        network
            .loads()
            .values()
            .map(|load| (&load.id, values(&load.p_set))),
    )?;

    write_generators(dir, network, solution)?;
    write_storage_units(dir, network, solution)?;
    write_links(dir, network, solution)?;

    write_static(
        dir,
        "global_constraints.csv",
        network
            .global_constraints()
            .values()
            .map(|constraint| GlobalConstraintRow {
                name: &constraint.id,
                carrier_attribute: constraint.carrier_attribute,
                sense: constraint.sense,
                constant: constraint.constant,
                mu: solution.constraint_dual(constraint.id.as_str()),
            }),
    )?;

    Ok(())
}

fn write_generators(dir: &Path, network: &Network, solution: &Solution) -> Result<()> {
    let snapshots = network.snapshots();
    write_static(
        dir,
        "generators.csv",
        network.generators().values().map(|generator| GeneratorRow {
            name: &generator.id,
            bus: &generator.bus,
            carrier: &generator.carrier,
            p_nom: generator.p_nom,
            p_nom_max: generator.p_nom_max,
            p_nom_extendable: generator.extendable,
            capital_cost: generator.capital_cost,
            marginal_cost: generator.marginal_cost,
            efficiency: generator.efficiency,
            p_nom_opt: solution.generators.get(&generator.id).map(|r| r.p_nom_opt),
        }),
    )?;
    write_varying(
        dir,
        "generators-p_max_pu.csv",
        snapshots,
        network
            .generators()
            .values()
            .map(|generator| (&generator.id, generator.p_max_pu.clone())),
    )?;
    write_varying(
        dir,
        "generators-p.csv",
        snapshots,
        solution
            .generators
            .iter()
            .map(|(id, result)| (id, values(&result.p))),
    )
}

fn write_storage_units(dir: &Path, network: &Network, solution: &Solution) -> Result<()> {
    let snapshots = network.snapshots();
    write_static(
        dir,
        "storage_units.csv",
        network.storage_units().values().map(|storage| StorageUnitRow {
            name: &storage.id,
            bus: &storage.bus,
            carrier: &storage.carrier,
            p_nom: storage.p_nom,
            p_nom_max: storage.p_nom_max,
            p_nom_extendable: storage.extendable,
            max_hours: storage.max_hours,
            efficiency_store: storage.efficiency_store,
            efficiency_dispatch: storage.efficiency_dispatch,
            capital_cost: storage.capital_cost,
            marginal_cost: storage.marginal_cost,
            cyclic_state_of_charge: storage.cyclic_state_of_charge,
            state_of_charge_initial: storage.state_of_charge_initial,
            standing_loss: storage.standing_loss,
            p_nom_opt: solution.storage_units.get(&storage.id).map(|r| r.p_nom_opt),
        }),
    )?;
    write_varying(
        dir,
        "storage_units-p.csv",
        snapshots,
        solution
            .storage_units
            .iter()
            .map(|(id, result)| (id, values(&result.p()))),
    )?;
    write_varying(
        dir,
        "storage_units-state_of_charge.csv",
        snapshots,
        solution
            .storage_units
            .iter()
            .map(|(id, result)| (id, values(&result.state_of_charge))),
    )
}

fn write_links(dir: &Path, network: &Network, solution: &Solution) -> Result<()> {
    let snapshots = network.snapshots();
    write_static(
        dir,
        "links.csv",
        network.links().values().map(|link| LinkRow {
            name: &link.id,
            bus0: &link.bus0,
            bus1: &link.bus1,
            carrier: &link.carrier,
            p_nom: link.p_nom,
            p_nom_max: link.p_nom_max,
            p_nom_extendable: link.extendable,
            p_min_pu: link.p_min_pu,
            efficiency: link.efficiency,
            capital_cost: link.capital_cost,
            marginal_cost: link.marginal_cost,
            length: link.length,
            p_nom_opt: solution.links.get(&link.id).map(|r| r.p_nom_opt),
        }),
    )?;
    write_varying(
        dir,
        "links-p0.csv",
        snapshots,
        solution
            .links
            .iter()
            .map(|(id, result)| (id, values(&result.p0))),
    )?;
    write_varying(
        dir,
        "links-p1.csv",
        snapshots,
        solution
            .links
            .iter()
            .map(|(id, result)| (id, values(&result.p1))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{network, solver, zero_solution};
    use crate::optimisation::{HighsSolver, Solver};
    use crate::scenario::Scenario;
    use rstest::rstest;
    use tempfile::tempdir;

    fn read_records(path: &Path) -> Vec<csv::StringRecord> {
        csv::Reader::from_path(path)
            .unwrap()
            .records()
            .map(Result::unwrap)
            .collect()
    }

    #[rstest]
    fn test_write_network(network: Network, solver: HighsSolver) {
        let network = Scenario::co2_limit_mt(1.0).apply(&network).unwrap();
        let solution = solver.solve(&network).unwrap();
        let dir = tempdir().unwrap();
        let export = dir.path().join("network");
        write_network(&export, &network, &solution).unwrap();

        for file_name in [
            "snapshots.csv",
            "carriers.csv",
            "buses.csv",
            "buses-marginal_price.csv",
            "loads.csv",
            "loads-p_set.csv",
            "generators.csv",
            "generators-p_max_pu.csv",
            "generators-p.csv",
            "storage_units.csv",
            "storage_units-p.csv",
            "storage_units-state_of_charge.csv",
            "links.csv",
            "global_constraints.csv",
        ] {
            assert!(export.join(file_name).is_file(), "{file_name} missing");
        }

        // There are no links, so there are no link flows either
        assert!(!export.join("links-p0.csv").exists());

        let dispatch = read_records(&export.join("generators-p.csv"));
        assert_eq!(dispatch.len(), network.snapshots().len());
        let header = csv::Reader::from_path(export.join("generators-p.csv"))
            .unwrap()
            .headers()
            .unwrap()
            .clone();
        assert_eq!(header.iter().collect::<Vec<_>>(), ["snapshot", "wind"]);

        let constraints = read_records(&export.join("global_constraints.csv"));
        assert_eq!(constraints.len(), 1);
        assert_eq!(&constraints[0][0], "CO2Limit");
        assert_eq!(&constraints[0][2], "<=");
    }

    #[rstest]
    fn test_write_network_unsolved_components(network: Network) {
        let mut solution = zero_solution(&network);
        solution.generators.clear();
        let dir = tempdir().unwrap();
        write_network(dir.path(), &network, &solution).unwrap();

        let generators = read_records(&dir.path().join("generators.csv"));
        assert_eq!(generators.len(), 1);
        // No optimised capacity
        assert_eq!(generators[0].iter().last(), Some(""));
        assert!(!dir.path().join("generators-p.csv").exists());
    }
}
