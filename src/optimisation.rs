//! Code for performing the capacity expansion optimisation.
//!
//! The problem is a linear programme which minimises total annualised system cost:
//!
//! ```text
//! sum(capital_cost * p_nom) + sum_t w_t * sum(marginal_cost * p_t)
//! ```
//!
//! subject to a power balance at every bus in every snapshot, availability limits for
//! generators, power and energy limits and state-of-charge continuity for storage units, capacity
//! limits for links and any global constraints on primary-energy emissions.
use crate::error::SolveError;
use crate::id::{BusID, ComponentID, ConstraintID};
use crate::model::SolverParameters;
use crate::network::Network;
use crate::solution::{GeneratorResult, LinkResult, Solution, StorageResult};
use crate::units::{Emissions, Energy, Money, MoneyPerEnergy, Power};
use highs::{HighsModelStatus, RowProblem, Sense};
use indexmap::IndexMap;
use log::{debug, warn};
use std::iter::zip;
use std::ops::RangeBounds;

pub mod constraints;
use constraints::{
    add_balance_constraints, add_generator_constraints, add_global_constraints,
    add_link_constraints, add_storage_constraints,
};

/// A decision variable in the optimisation.
///
/// Note that this type does **not** include the value of the variable; it refers to a particular
/// column of the problem and records its position, so the value can be read from the solution.
#[derive(Debug, Clone, Copy)]
pub struct Variable {
    col: highs::Col,
    index: usize,
}

/// The capacity of a component, which is either fixed or a decision variable
#[derive(Debug, Clone, Copy)]
pub enum CapacityVariable {
    /// Capacity is not extendable
    Fixed(Power),
    /// Capacity is optimised
    Variable(Variable),
}

/// A linear programme under construction.
///
/// Wraps a HiGHS [`RowProblem`], keeping track of the objective coefficient of each column and
/// the index of each row.
#[derive(Default)]
pub struct Problem {
    inner: RowProblem,
    costs: Vec<f64>,
    num_rows: usize,
}

impl Problem {
    /// Add a column with the given objective coefficient and bounds
    pub fn add_column<B: RangeBounds<f64>>(&mut self, cost: f64, bounds: B) -> Variable {
        let index = self.costs.len();
        self.costs.push(cost);
        Variable {
            col: self.inner.add_column(cost, bounds),
            index,
        }
    }

    /// Add a row, returning its index
    pub fn add_row<B, I>(&mut self, bounds: B, terms: I) -> usize
    where
        B: RangeBounds<f64>,
        I: IntoIterator<Item = (Variable, f64)>,
    {
        self.inner
            .add_row(bounds, terms.into_iter().map(|(var, coeff)| (var.col, coeff)));
        self.num_rows += 1;
        self.num_rows - 1
    }

    /// The number of rows added so far
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// The number of columns added so far
    pub fn num_columns(&self) -> usize {
        self.costs.len()
    }
}

/// Variables for a generator
pub struct GeneratorVariables {
    /// Capacity
    pub capacity: CapacityVariable,
    /// Output per snapshot
    pub p: Vec<Variable>,
}

/// Variables for a storage unit
pub struct StorageVariables {
    /// Power capacity
    pub capacity: CapacityVariable,
    /// Discharging power per snapshot
    pub p_dispatch: Vec<Variable>,
    /// Charging power per snapshot
    pub p_store: Vec<Variable>,
    /// State of charge at the end of each snapshot
    pub state_of_charge: Vec<Variable>,
}

/// Variables for a link.
///
/// Each direction of flow has its own non-negative variable so that losses apply whichever way
/// power flows.
pub struct LinkVariables {
    /// Capacity
    pub capacity: CapacityVariable,
    /// Power entering the link at `bus0` per snapshot
    pub forward: Vec<Variable>,
    /// Power entering the link at `bus1` per snapshot, for links with `p_min_pu < 0`
    pub reverse: Option<Vec<Variable>>,
}

/// A map for easy lookup of variables in the problem
#[derive(Default)]
pub struct VariableMap {
    /// Generator variables, in network order
    pub generators: IndexMap<ComponentID, GeneratorVariables>,
    /// Storage variables, in network order
    pub storage_units: IndexMap<ComponentID, StorageVariables>,
    /// Link variables, in network order
    pub links: IndexMap<ComponentID, LinkVariables>,
}

/// The rows whose duals are reported
#[derive(Default)]
pub struct ConstraintKeys {
    /// Power balance rows for each bus, one per snapshot
    pub balance: IndexMap<BusID, Vec<usize>>,
    /// The row for each global constraint
    pub global: IndexMap<ConstraintID, usize>,
}

/// Something which can optimise a network
pub trait Solver {
    /// Find the least-cost solution for a network.
    ///
    /// No partial result is returned on failure.
    fn solve(&self, network: &Network) -> Result<Solution, SolveError>;
}

/// Solves networks with the HiGHS solver
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HighsSolver {
    /// Abort the solve after this many seconds
    pub time_limit_seconds: Option<f64>,
    /// Whether HiGHS writes its own output to the console
    pub log_to_console: bool,
}

impl HighsSolver {
    /// Create a solver from the model's solver parameters.
    ///
    /// HiGHS output is enabled unless logging is switched off.
    pub fn from_parameters(parameters: &SolverParameters) -> Self {
        Self {
            time_limit_seconds: parameters.time_limit_seconds,
            log_to_console: log::max_level() != log::LevelFilter::Off,
        }
    }

    fn run(&self, problem: RowProblem, presolve: bool) -> Result<highs::SolvedModel, SolveError> {
        let mut highs_model = problem.optimise(Sense::Minimise);
        highs_model.set_option("output_flag", self.log_to_console);
        highs_model.set_option("log_to_console", self.log_to_console);
        if let Some(limit) = self.time_limit_seconds {
            highs_model.set_option("time_limit", limit);
        }
        if !presolve {
            highs_model.set_option("presolve", "off");
        }

        highs_model
            .try_solve()
            .map_err(|status| SolveError::Solver(format!("HiGHS returned {status:?}")))
    }
}

impl Solver for HighsSolver {
    fn solve(&self, network: &Network) -> Result<Solution, SolveError> {
        let (problem, variables, keys) = build_problem(network);
        debug!(
            "Solving problem with {} columns and {} rows",
            problem.num_columns(),
            problem.num_rows()
        );
        let costs = problem.costs;
        let mut solved = self.run(problem.inner, true)?;

        // Presolve can't tell these apart, so solve again without it
        if solved.status() == HighsModelStatus::UnboundedOrInfeasible {
            debug!("Problem is unbounded or infeasible; solving again without presolve");
            let (problem, _, _) = build_problem(network);
            solved = self.run(problem.inner, false)?;
        }

        match solved.status() {
            HighsModelStatus::Optimal => {
                let solution = solved.get_solution();
                Ok(extract_solution(
                    network,
                    &variables,
                    &keys,
                    &costs,
                    solution.columns(),
                    solution.dual_rows(),
                ))
            }
            HighsModelStatus::ModelEmpty => {
                warn!("Network has nothing to optimise");
                Ok(extract_solution(network, &variables, &keys, &costs, &[], &[]))
            }
            status => Err(status_error(status)),
        }
    }
}

/// The error for a solve which ended without a solution
fn status_error(status: HighsModelStatus) -> SolveError {
    match status {
        HighsModelStatus::Infeasible => SolveError::Infeasible,
        HighsModelStatus::Unbounded => SolveError::Unbounded,
        status => SolveError::Solver(format!("Could not solve: {status:?}")),
    }
}

/// Build the linear programme for a network
pub fn build_problem(network: &Network) -> (Problem, VariableMap, ConstraintKeys) {
    let mut problem = Problem::default();
    let variables = add_variables(&mut problem, network);

    let balance = add_balance_constraints(&mut problem, &variables, network);
    add_generator_constraints(&mut problem, &variables, network);
    add_storage_constraints(&mut problem, &variables, network);
    add_link_constraints(&mut problem, &variables, network);
    let global = add_global_constraints(&mut problem, &variables, network);

    (problem, variables, ConstraintKeys { balance, global })
}

fn add_capacity_variable(
    problem: &mut Problem,
    extendable: bool,
    capital_cost: f64,
    p_nom: Power,
    p_nom_max: Option<Power>,
) -> CapacityVariable {
    if extendable {
        let max = p_nom_max.map_or(f64::INFINITY, Power::value);
        CapacityVariable::Variable(problem.add_column(capital_cost, p_nom.value()..=max))
    } else {
        CapacityVariable::Fixed(p_nom)
    }
}

/// Add variables to the optimisation problem.
///
/// The objective coefficient of each dispatch variable is its marginal cost scaled by the weight
/// of its snapshot.
fn add_variables(problem: &mut Problem, network: &Network) -> VariableMap {
    let weights: Vec<f64> = network.snapshots().iter().map(|s| s.weight.value()).collect();
    let mut variables = VariableMap::default();

    for generator in network.generators().values() {
        let capacity = add_capacity_variable(
            problem,
            generator.extendable,
            generator.capital_cost.value(),
            generator.p_nom,
            generator.p_nom_max,
        );
        let p = weights
            .iter()
            .map(|w| problem.add_column(w * generator.marginal_cost.value(), 0.0..))
            .collect();
        variables
            .generators
            .insert(generator.id.clone(), GeneratorVariables { capacity, p });
    }

    for storage in network.storage_units().values() {
        let capacity = add_capacity_variable(
            problem,
            storage.extendable,
            storage.capital_cost.value(),
            storage.p_nom,
            storage.p_nom_max,
        );
        let p_dispatch = weights
            .iter()
            .map(|w| problem.add_column(w * storage.marginal_cost.value(), 0.0..))
            .collect();
        let p_store = weights.iter().map(|_| problem.add_column(0.0, 0.0..)).collect();
        let state_of_charge = weights.iter().map(|_| problem.add_column(0.0, 0.0..)).collect();
        variables.storage_units.insert(
            storage.id.clone(),
            StorageVariables {
                capacity,
                p_dispatch,
                p_store,
                state_of_charge,
            },
        );
    }

    for link in network.links().values() {
        let capacity = add_capacity_variable(
            problem,
            link.extendable,
            link.capital_cost.value(),
            link.p_nom,
            link.p_nom_max,
        );
        let mut flow = || -> Vec<Variable> {
            weights
                .iter()
                .map(|w| problem.add_column(w * link.marginal_cost.value(), 0.0..))
                .collect()
        };
        let forward = flow();
        let reverse = (link.p_min_pu < 0.0).then(flow);
        variables.links.insert(
            link.id.clone(),
            LinkVariables {
                capacity,
                forward,
                reverse,
            },
        );
    }

    variables
}

/// Read the solution for a network from the column values and row duals of a solved problem
fn extract_solution(
    network: &Network,
    variables: &VariableMap,
    keys: &ConstraintKeys,
    costs: &[f64],
    columns: &[f64],
    duals: &[f64],
) -> Solution {
    let value = |var: &Variable| columns.get(var.index).copied().unwrap_or(0.0);
    let capacity = |capacity: &CapacityVariable| match capacity {
        CapacityVariable::Fixed(p_nom) => *p_nom,
        CapacityVariable::Variable(var) => Power(value(var)),
    };
    let powers =
        |vars: &[Variable]| -> Vec<Power> { vars.iter().map(|v| Power(value(v))).collect() };

    let generators: IndexMap<_, _> = variables
        .generators
        .iter()
        .map(|(id, vars)| {
            let result = GeneratorResult {
                p_nom_opt: capacity(&vars.capacity),
                p: powers(&vars.p),
            };
            (id.clone(), result)
        })
        .collect();

    let storage_units = variables
        .storage_units
        .iter()
        .map(|(id, vars)| {
            let result = StorageResult {
                p_nom_opt: capacity(&vars.capacity),
                p_dispatch: powers(&vars.p_dispatch),
                p_store: powers(&vars.p_store),
                state_of_charge: vars
                    .state_of_charge
                    .iter()
                    .map(|v| Energy(value(v)))
                    .collect(),
            };
            (id.clone(), result)
        })
        .collect();

    let links = variables
        .links
        .iter()
        .map(|(id, vars)| {
            let efficiency = network.links()[id].efficiency;
            let forward = powers(&vars.forward);
            let reverse = vars
                .reverse
                .as_deref()
                .map_or_else(|| vec![Power(0.0); forward.len()], powers);
            let result = LinkResult {
                p_nom_opt: capacity(&vars.capacity),
                p0: zip(&forward, &reverse)
                    .map(|(f, r)| *f - *r * efficiency)
                    .collect(),
                p1: zip(&forward, &reverse)
                    .map(|(f, r)| *f * efficiency - *r)
                    .collect(),
                throughput: zip(&forward, &reverse).map(|(f, r)| *f + *r).collect(),
            };
            (id.clone(), result)
        })
        .collect();

    // Duals of the balance rows are costs per MW in a snapshot; divide by the weight for prices
    let dual = |row: usize| duals.get(row).copied().unwrap_or(0.0);
    let bus_prices = keys
        .balance
        .iter()
        .map(|(bus, rows)| {
            let prices = rows
                .iter()
                .zip(network.snapshots())
                .map(|(row, snapshot)| MoneyPerEnergy(dual(*row) / snapshot.weight.value()))
                .collect();
            (bus.clone(), prices)
        })
        .collect();
    let constraint_duals = keys
        .global
        .iter()
        .map(|(id, row)| (id.clone(), dual(*row)))
        .collect();

    let objective = costs
        .iter()
        .enumerate()
        .map(|(index, cost)| cost * columns.get(index).copied().unwrap_or(0.0))
        .sum();

    Solution {
        snapshots: network.snapshots().to_vec(),
        objective: Money(objective),
        total_emissions: generator_emissions(network, &generators),
        generators,
        storage_units,
        links,
        bus_prices,
        constraint_duals,
    }
}

/// Total primary-energy emissions of all generators
fn generator_emissions(
    network: &Network,
    generators: &IndexMap<ComponentID, GeneratorResult>,
) -> Emissions {
    let mut total = Emissions(0.0);
    for (id, result) in generators {
        let generator = &network.generators()[id];
        let intensity = network.carriers()[&generator.carrier].co2_emissions;
        for (p, snapshot) in result.p.iter().zip(network.snapshots()) {
            total += intensity * (*p * snapshot.weight / generator.efficiency);
        }
    }
    total
}
