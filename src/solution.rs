//! The results of optimising a network.
use crate::id::{BusID, ComponentID, ConstraintID};
use crate::snapshot::Snapshot;
use crate::units::{Emissions, Energy, Money, MoneyPerEnergy, Power};
use indexmap::IndexMap;

/// Optimised capacity and dispatch of a generator
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorResult {
    /// Optimal capacity
    pub p_nom_opt: Power,
    /// Output in each snapshot
    pub p: Vec<Power>,
}

/// Optimised capacity and operation of a storage unit
#[derive(Debug, Clone, PartialEq)]
pub struct StorageResult {
    /// Optimal power capacity
    pub p_nom_opt: Power,
    /// Power delivered to the bus in each snapshot
    pub p_dispatch: Vec<Power>,
    /// Power taken from the bus in each snapshot
    pub p_store: Vec<Power>,
    /// Energy stored at the end of each snapshot
    pub state_of_charge: Vec<Energy>,
}

impl StorageResult {
    /// Net power delivered to the bus in each snapshot
    pub fn p(&self) -> Vec<Power> {
        self.p_dispatch
            .iter()
            .zip(&self.p_store)
            .map(|(dispatch, store)| *dispatch - *store)
            .collect()
    }
}

/// Optimised capacity and flows of a link
#[derive(Debug, Clone, PartialEq)]
pub struct LinkResult {
    /// Optimal capacity
    pub p_nom_opt: Power,
    /// Net power withdrawn from `bus0` in each snapshot (negative when flowing from `bus1`)
    pub p0: Vec<Power>,
    /// Net power delivered to `bus1` in each snapshot
    pub p1: Vec<Power>,
    /// Power entering the link in each snapshot, in either direction
    pub throughput: Vec<Power>,
}

/// The optimal solution for a network
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// The snapshots the solution covers
    pub snapshots: Vec<Snapshot>,
    /// Total annualised system cost
    pub objective: Money,
    /// Generator results, in the network's order
    pub generators: IndexMap<ComponentID, GeneratorResult>,
    /// Storage results, in the network's order
    pub storage_units: IndexMap<ComponentID, StorageResult>,
    /// Link results, in the network's order
    pub links: IndexMap<ComponentID, LinkResult>,
    /// Marginal price of energy at each bus in each snapshot
    pub bus_prices: IndexMap<BusID, Vec<MoneyPerEnergy>>,
    /// Shadow price of each global constraint (EUR/t).
    ///
    /// A binding upper limit has a non-positive shadow price: raising the limit lowers the cost.
    pub constraint_duals: IndexMap<ConstraintID, f64>,
    /// Total emissions over the horizon
    pub total_emissions: Emissions,
}

impl Solution {
    /// Optimal capacity of a generator, storage unit or link
    pub fn p_nom_opt(&self, id: &str) -> Option<Power> {
        self.generators
            .get(id)
            .map(|result| result.p_nom_opt)
            .or_else(|| self.storage_units.get(id).map(|result| result.p_nom_opt))
            .or_else(|| self.links.get(id).map(|result| result.p_nom_opt))
    }

    /// The shadow price of the named global constraint, if there is one
    pub fn constraint_dual(&self, id: &str) -> Option<f64> {
        self.constraint_duals.get(id).copied()
    }
}
