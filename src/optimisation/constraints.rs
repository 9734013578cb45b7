//! Code for adding constraints to the optimisation problem.
use super::{CapacityVariable, Problem, Variable, VariableMap};
use crate::id::{BusID, ConstraintID};
use crate::network::{CarrierAttribute, ConstraintSense, Network};
use indexmap::IndexMap;

/// Add a row limiting `var` to `factor` times a capacity.
///
/// For a fixed capacity this is a bound on `var`; otherwise the capacity variable is moved to the
/// left-hand side.
fn add_upper_capacity_row(
    problem: &mut Problem,
    var: Variable,
    factor: f64,
    capacity: CapacityVariable,
) {
    match capacity {
        CapacityVariable::Fixed(p_nom) => {
            problem.add_row(..=factor * p_nom.value(), [(var, 1.0)]);
        }
        CapacityVariable::Variable(p_nom) => {
            problem.add_row(..=0.0, [(var, 1.0), (p_nom, -factor)]);
        }
    }
}

/// Add the power balance for every bus and snapshot.
///
/// Generation, storage discharge and link deliveries minus storage charging and link withdrawals
/// must equal the demand. A link delivers `efficiency` times the power entering it, in either
/// direction.
///
/// # Returns
///
/// The row indices for each bus, in snapshot order.
pub fn add_balance_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    network: &Network,
) -> IndexMap<BusID, Vec<usize>> {
    let mut keys = IndexMap::new();
    let mut terms = Vec::new();
    for bus in network.buses().keys() {
        let demand = network.bus_demand(bus);
        let mut rows = Vec::with_capacity(demand.len());
        for (t, demand) in demand.into_iter().enumerate() {
            for (id, vars) in &variables.generators {
                if &network.generators()[id].bus == bus {
                    terms.push((vars.p[t], 1.0));
                }
            }
            for (id, vars) in &variables.storage_units {
                if &network.storage_units()[id].bus == bus {
                    terms.push((vars.p_dispatch[t], 1.0));
                    terms.push((vars.p_store[t], -1.0));
                }
            }
            for (id, vars) in &variables.links {
                let link = &network.links()[id];
                let efficiency = link.efficiency.value();
                let reverse = vars.reverse.as_ref().map(|reverse| reverse[t]);
                if &link.bus0 == bus {
                    terms.push((vars.forward[t], -1.0));
                    terms.extend(reverse.map(|p| (p, efficiency)));
                }
                if &link.bus1 == bus {
                    terms.push((vars.forward[t], efficiency));
                    terms.extend(reverse.map(|p| (p, -1.0)));
                }
            }

            let rhs = demand.value();
            rows.push(problem.add_row(rhs..=rhs, terms.drain(..)));
        }
        keys.insert(bus.clone(), rows);
    }

    keys
}

/// Limit the output of each generator to its availability times its capacity
pub fn add_generator_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    network: &Network,
) {
    for (id, vars) in &variables.generators {
        let generator = &network.generators()[id];
        for (p, p_max_pu) in vars.p.iter().zip(&generator.p_max_pu) {
            add_upper_capacity_row(problem, *p, *p_max_pu, vars.capacity);
        }
    }
}

/// Add power and energy limits and state-of-charge continuity for storage units.
///
/// The state of charge at the end of snapshot `t` is:
///
/// ```text
/// soc[t] = (1 - standing_loss)^w[t] * soc[t-1]
///          + w[t] * (eff_store * store[t] - dispatch[t] / eff_dispatch)
/// ```
///
/// where `soc[-1]` is the final state of charge for cyclic storage and the initial state of charge
/// otherwise.
pub fn add_storage_constraints(problem: &mut Problem, variables: &VariableMap, network: &Network) {
    let weights: Vec<f64> = network.snapshots().iter().map(|s| s.weight.value()).collect();
    for (id, vars) in &variables.storage_units {
        let storage = &network.storage_units()[id];
        let max_hours = storage.max_hours.value();
        let eff_store = storage.efficiency_store.value();
        let eff_dispatch = storage.efficiency_dispatch.value();
        let retained = 1.0 - storage.standing_loss.value();

        for t in 0..weights.len() {
            add_upper_capacity_row(problem, vars.p_dispatch[t], 1.0, vars.capacity);
            add_upper_capacity_row(problem, vars.p_store[t], 1.0, vars.capacity);
            add_upper_capacity_row(problem, vars.state_of_charge[t], max_hours, vars.capacity);
        }

        let last = weights.len() - 1;
        for (t, w) in weights.iter().enumerate() {
            let decay = retained.powf(*w);
            let mut terms = vec![
                (vars.state_of_charge[t], 1.0),
                (vars.p_store[t], -w * eff_store),
                (vars.p_dispatch[t], w / eff_dispatch),
            ];
            let rhs = if t > 0 {
                terms.push((vars.state_of_charge[t - 1], -decay));
                0.0
            } else if storage.cyclic_state_of_charge {
                terms.push((vars.state_of_charge[last], -decay));
                0.0
            } else {
                decay * storage.state_of_charge_initial.value()
            };

            problem.add_row(rhs..=rhs, terms);
        }
    }
}

/// Limit forward flow through each link to its capacity and reverse flow to `-p_min_pu` times it
pub fn add_link_constraints(problem: &mut Problem, variables: &VariableMap, network: &Network) {
    for (id, vars) in &variables.links {
        let link = &network.links()[id];
        for p in &vars.forward {
            add_upper_capacity_row(problem, *p, 1.0, vars.capacity);
        }
        for p in vars.reverse.iter().flatten() {
            add_upper_capacity_row(problem, *p, -link.p_min_pu, vars.capacity);
        }
    }
}

/// Add global constraints on primary-energy emissions.
///
/// The emissions of a generator in a snapshot are its output divided by its efficiency, times the
/// emissions of its carrier and the snapshot weight.
///
/// # Returns
///
/// The row index for each constraint.
pub fn add_global_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    network: &Network,
) -> IndexMap<ConstraintID, usize> {
    let mut keys = IndexMap::new();
    for constraint in network.global_constraints().values() {
        let mut terms = Vec::new();
        for (id, vars) in &variables.generators {
            let generator = &network.generators()[id];
            let carrier = &network.carriers()[&generator.carrier];
            let intensity = match constraint.carrier_attribute {
                CarrierAttribute::Co2Emissions => carrier.co2_emissions.value(),
            };
            if intensity <= 0.0 {
                continue;
            }
            let per_output = intensity / generator.efficiency.value();
            for (p, snapshot) in vars.p.iter().zip(network.snapshots()) {
                terms.push((*p, snapshot.weight.value() * per_output));
            }
        }

        let constant = constraint.constant.value();
        let row = match constraint.sense {
            ConstraintSense::LessEqual => problem.add_row(..=constant, terms),
            ConstraintSense::GreaterEqual => problem.add_row(constant.., terms),
            ConstraintSense::Equal => problem.add_row(constant..=constant, terms),
        };
        keys.insert(constraint.id.clone(), row);
    }

    keys
}
