//! Fixtures for tests

use crate::model::{Model, ModelParameters};
use crate::network::{Generator, Load, Network, StorageUnit};
use crate::optimisation::HighsSolver;
use crate::snapshot::{Snapshot, TimeSeries};
use crate::solution::{GeneratorResult, LinkResult, Solution, StorageResult};
use crate::technology::{CostCell, FuelInheritance, TechnologyTable};
use crate::topology::{GeneratorSpec, StorageSpec, build_network};
use crate::units::{
    Dimensionless, Emissions, EmissionsPerEnergy, Energy, Hours, Money, MoneyPerEnergy,
    MoneyPerPower, Power,
};
use chrono::{Duration, NaiveDate};
use indexmap::indexmap;
use rstest::fixture;
use std::path::PathBuf;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Assert that an error of the given kind occurs somewhere in the error chain
macro_rules! assert_model_error {
    ($result:expr, $pattern:pat) => {
        assert!(matches!(
            $crate::error::ModelError::find_in(&$result.unwrap_err()),
            Some($pattern)
        ));
    };
}
pub(crate) use assert_model_error;

/// Each snapshot stands for a quarter of a year
const SNAPSHOT_WEIGHT: Hours = Hours(2190.0);

#[fixture]
pub fn snapshots() -> Vec<Snapshot> {
    let start = NaiveDate::from_ymd_opt(2013, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..4)
        .map(|i| Snapshot {
            timestamp: start + Duration::hours(6 * i),
            weight: SNAPSHOT_WEIGHT,
        })
        .collect()
}

#[fixture]
pub fn generator(snapshots: Vec<Snapshot>) -> Generator {
    Generator {
        id: "wind".into(),
        bus: "electricity".into(),
        carrier: "onwind".into(),
        p_nom: Power(0.0),
        p_nom_max: None,
        extendable: true,
        p_max_pu: vec![1.0; snapshots.len()],
        capital_cost: MoneyPerPower(100_000.0),
        marginal_cost: MoneyPerEnergy(0.0),
        efficiency: Dimensionless(1.0),
    }
}

#[fixture]
pub fn storage_unit() -> StorageUnit {
    StorageUnit {
        id: "battery".into(),
        bus: "electricity".into(),
        carrier: "battery".into(),
        p_nom: Power(0.0),
        p_nom_max: None,
        extendable: true,
        max_hours: Hours(6.0),
        efficiency_store: Dimensionless(0.9),
        efficiency_dispatch: Dimensionless(0.9),
        capital_cost: MoneyPerPower(50_000.0),
        marginal_cost: MoneyPerEnergy(0.0),
        cyclic_state_of_charge: true,
        state_of_charge_initial: Energy(0.0),
        standing_loss: Dimensionless(0.0),
    }
}

/// A single bus with a flat 100 MW demand, extendable wind and a battery
#[fixture]
pub fn network(
    snapshots: Vec<Snapshot>,
    generator: Generator,
    storage_unit: StorageUnit,
) -> Network {
    let n = snapshots.len();
    let mut network = Network::new(snapshots).unwrap();
    for carrier in ["electricity", "onwind", "battery"] {
        network.add_carrier(carrier, EmissionsPerEnergy(0.0)).unwrap();
    }
    network.add_bus("electricity", "electricity").unwrap();
    network
        .add_load(Load {
            id: "demand".into(),
            bus: "electricity".into(),
            p_set: vec![Power(100.0); n],
        })
        .unwrap();
    network.add_generator(generator).unwrap();
    network.add_storage_unit(storage_unit).unwrap();

    network
}

#[fixture]
pub fn solver() -> HighsSolver {
    HighsSolver {
        time_limit_seconds: None,
        log_to_console: false,
    }
}

/// A solution with zero capacity and dispatch for every component of `network`
pub fn zero_solution(network: &Network) -> Solution {
    let n = network.snapshots().len();
    Solution {
        snapshots: network.snapshots().to_vec(),
        objective: Money(0.0),
        generators: network
            .generators()
            .keys()
            .map(|id| {
                let result = GeneratorResult {
                    p_nom_opt: Power(0.0),
                    p: vec![Power(0.0); n],
                };
                (id.clone(), result)
            })
            .collect(),
        storage_units: network
            .storage_units()
            .keys()
            .map(|id| {
                let result = StorageResult {
                    p_nom_opt: Power(0.0),
                    p_dispatch: vec![Power(0.0); n],
                    p_store: vec![Power(0.0); n],
                    state_of_charge: vec![Energy(0.0); n],
                };
                (id.clone(), result)
            })
            .collect(),
        links: network
            .links()
            .keys()
            .map(|id| {
                let result = LinkResult {
                    p_nom_opt: Power(0.0),
                    p0: vec![Power(0.0); n],
                    p1: vec![Power(0.0); n],
                    throughput: vec![Power(0.0); n],
                };
                (id.clone(), result)
            })
            .collect(),
        bus_prices: network
            .buses()
            .keys()
            .map(|id| (id.clone(), vec![MoneyPerEnergy(0.0); n]))
            .collect(),
        constraint_duals: network
            .global_constraints()
            .keys()
            .map(|id| (id.clone(), 0.0))
            .collect(),
        total_emissions: Emissions(0.0),
    }
}

fn cost_cell(technology: &str, parameter: &str, value: f64, unit: &str) -> CostCell {
    CostCell {
        technology: technology.into(),
        parameter: parameter.into(),
        value,
        unit: unit.into(),
    }
}

/// Cost cells in the units of a technology-data table
#[fixture]
pub fn cost_cells() -> Vec<CostCell> {
    vec![
        cost_cell("onwind", "investment", 1100.0, "EUR/kW"),
        cost_cell("onwind", "FOM", 1.2, "%/year"),
        cost_cell("onwind", "lifetime", 30.0, "years"),
        cost_cell("OCGT", "investment", 450.0, "EUR/kW"),
        cost_cell("OCGT", "FOM", 1.8, "%/year"),
        cost_cell("OCGT", "VOM", 4.5, "EUR/MWh"),
        cost_cell("OCGT", "efficiency", 0.4, "per unit"),
        cost_cell("OCGT", "lifetime", 25.0, "years"),
        cost_cell("gas", "fuel", 20.0, "EUR/MWh_th"),
        cost_cell("gas", "CO2 intensity", 0.2, "tCO2/MWh_th"),
        cost_cell("battery inverter", "investment", 150.0, "EUR/kW"),
        cost_cell("battery inverter", "efficiency", 0.95, "per unit"),
        cost_cell("battery inverter", "lifetime", 10.0, "years"),
        cost_cell("battery storage", "investment", 150.0, "EUR/kWh"),
        cost_cell("battery storage", "lifetime", 25.0, "years"),
        cost_cell("heat pump", "investment", 900.0, "EUR/kW"),
        cost_cell("heat pump", "efficiency", 3.0, "per unit"),
        cost_cell("heat pump", "lifetime", 20.0, "years"),
    ]
}

#[fixture]
pub fn technology_table(cost_cells: Vec<CostCell>) -> TechnologyTable {
    TechnologyTable::from_cells(cost_cells, &FuelInheritance::default_rules()).unwrap()
}

#[fixture]
pub fn time_series(snapshots: Vec<Snapshot>) -> TimeSeries {
    let columns = indexmap! {
        "load".to_string() => vec![100.0, 120.0, 90.0, 110.0],
        "onwind".to_string() => vec![0.8, 0.3, 0.6, 0.1],
    };
    TimeSeries::new(snapshots, columns).unwrap()
}

/// A single-node model with wind, gas and a battery
#[fixture]
pub fn model_parameters() -> ModelParameters {
    ModelParameters {
        generators: vec![
            GeneratorSpec {
                technology: "onwind".into(),
                name: None,
                profile: Some("onwind".into()),
                p_nom: 0.0,
                p_nom_max: None,
                extendable: true,
                buses: Vec::new(),
            },
            GeneratorSpec {
                technology: "OCGT".into(),
                name: None,
                profile: None,
                p_nom: 0.0,
                p_nom_max: None,
                extendable: true,
                buses: Vec::new(),
            },
        ],
        storage_units: vec![StorageSpec {
            name: "battery storage".into(),
            carrier: None,
            max_hours: 6.0,
            charger: "battery inverter".into(),
            discharger: None,
            store: "battery storage".into(),
            p_nom: 0.0,
            p_nom_max: None,
            extendable: true,
            cyclic: true,
            state_of_charge_initial: 0.0,
            standing_loss: 0.0,
            buses: Vec::new(),
        }],
        ..ModelParameters::default()
    }
}

/// The single-node model, with its base network built
#[fixture]
pub fn model(
    model_parameters: ModelParameters,
    technology_table: TechnologyTable,
    time_series: TimeSeries,
) -> Model {
    let network = build_network(&model_parameters, &technology_table, &time_series).unwrap();
    Model {
        model_dir: PathBuf::from("."),
        parameters: model_parameters,
        technologies: technology_table,
        time_series,
        network,
    }
}
