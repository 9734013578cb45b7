//! Summary statistics calculated from a network and its solution.
use crate::id::{BusID, CarrierID, ComponentID};
use crate::network::Network;
use crate::solution::Solution;
use crate::units::{Energy, Money, Power};
use indexmap::IndexMap;

/// Number of EUR in a billion EUR
pub const EUR_PER_BILLION: f64 = 1e9;

/// The carrier under which loads appear in energy balances
pub const LOAD_CARRIER: &str = "load";

/// Annualised capital and operating costs for a carrier
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CarrierCost {
    /// Capital cost of all capacity
    pub capex: Money,
    /// Dispatch cost
    pub opex: Money,
}

impl CarrierCost {
    /// Capital plus operating costs
    pub fn total(&self) -> Money {
        self.capex + self.opex
    }
}

/// Calculate the costs of each carrier.
///
/// Capital costs are for all capacity, including any which is not extendable.
pub fn system_cost(network: &Network, solution: &Solution) -> IndexMap<CarrierID, CarrierCost> {
    let weights: Vec<_> = network.snapshots().iter().map(|s| s.weight).collect();
    let mut costs: IndexMap<CarrierID, CarrierCost> = IndexMap::new();

    for (id, result) in &solution.generators {
        let generator = &network.generators()[id];
        let cost = costs.entry(generator.carrier.clone()).or_default();
        cost.capex += generator.capital_cost * result.p_nom_opt;
        for (p, w) in result.p.iter().zip(&weights) {
            cost.opex += generator.marginal_cost * (*p * *w);
        }
    }

    for (id, result) in &solution.storage_units {
        let storage = &network.storage_units()[id];
        let cost = costs.entry(storage.carrier.clone()).or_default();
        cost.capex += storage.capital_cost * result.p_nom_opt;
        for (p, w) in result.p_dispatch.iter().zip(&weights) {
            cost.opex += storage.marginal_cost * (*p * *w);
        }
    }

    for (id, result) in &solution.links {
        let link = &network.links()[id];
        let cost = costs.entry(link.carrier.clone()).or_default();
        cost.capex += link.capital_cost * result.p_nom_opt;
        for (p, w) in result.throughput.iter().zip(&weights) {
            cost.opex += link.marginal_cost * (*p * *w);
        }
    }

    costs
}

/// Total system cost in billions of EUR
pub fn total_cost_bn(costs: &IndexMap<CarrierID, CarrierCost>) -> f64 {
    costs.values().map(|cost| cost.total().value()).sum::<f64>() / EUR_PER_BILLION
}

/// Energy capacity of each storage unit (power capacity times `max_hours`)
pub fn storage_energy_capacity(
    network: &Network,
    solution: &Solution,
) -> IndexMap<ComponentID, Energy> {
    solution
        .storage_units
        .iter()
        .map(|(id, result)| {
            let max_hours = network.storage_units()[id].max_hours;
            (id.clone(), result.p_nom_opt * max_hours)
        })
        .collect()
}

/// Optimal capacity of all components, grouped by carrier
pub fn capacity_by_carrier(network: &Network, solution: &Solution) -> IndexMap<CarrierID, Power> {
    let mut capacities: IndexMap<CarrierID, Power> = IndexMap::new();
    let generators = solution
        .generators
        .iter()
        .map(|(id, result)| (&network.generators()[id].carrier, result.p_nom_opt));
    let storage = solution
        .storage_units
        .iter()
        .map(|(id, result)| (&network.storage_units()[id].carrier, result.p_nom_opt));
    let links = solution
        .links
        .iter()
        .map(|(id, result)| (&network.links()[id].carrier, result.p_nom_opt));
    for (carrier, p_nom_opt) in generators.chain(storage).chain(links) {
        *capacities.entry(carrier.clone()).or_default() += p_nom_opt;
    }

    capacities
}

/// Power injected at each bus by each carrier in each snapshot.
///
/// Generation and storage discharge are positive. Storage charging, link withdrawals and loads are
/// negative. Loads appear under the carrier [`LOAD_CARRIER`]. The entries for a bus sum to zero in
/// every snapshot.
pub fn energy_balance(
    network: &Network,
    solution: &Solution,
) -> IndexMap<(BusID, CarrierID), Vec<Power>> {
    let n = network.snapshots().len();
    let mut balance: IndexMap<(BusID, CarrierID), Vec<Power>> = IndexMap::new();
    let mut add = |bus: &BusID, carrier: &CarrierID, values: &[Power], sign: f64| {
        let entry = balance
            .entry((bus.clone(), carrier.clone()))
            .or_insert_with(|| vec![Power(0.0); n]);
        for (total, p) in entry.iter_mut().zip(values) {
            *total += Power(sign * p.value());
        }
    };

    for (id, result) in &solution.generators {
        let generator = &network.generators()[id];
        add(&generator.bus, &generator.carrier, &result.p, 1.0);
    }
    for (id, result) in &solution.storage_units {
        let storage = &network.storage_units()[id];
        add(&storage.bus, &storage.carrier, &result.p(), 1.0);
    }
    for (id, result) in &solution.links {
        let link = &network.links()[id];
        add(&link.bus0, &link.carrier, &result.p0, -1.0);
        add(&link.bus1, &link.carrier, &result.p1, 1.0);
    }
    let load_carrier = CarrierID::new(LOAD_CARRIER);
    for load in network.loads().values() {
        add(&load.bus, &load_carrier, &load.p_set, -1.0);
    }

    balance
}
