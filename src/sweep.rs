//! Sensitivity sweeps over a scenario parameter.
//!
//! Every point of a sweep starts from the same base network. A point which fails to build or
//! solve is recorded as a failure and the sweep carries on.
use crate::error::{ModelError, ScenarioError};
use crate::network::Network;
use crate::optimisation::Solver;
use crate::scenario::Scenario;
use crate::solution::Solution;
use crate::units::MoneyPerPowerPerLength;
use log::{info, warn};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};

/// The scenario parameter varied by a sweep
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum SweepParameter {
    /// Cap on total emissions (Mt CO2)
    #[default]
    #[string = "co2_limit"]
    Co2Limit,
    /// Cost of transmission capacity (EUR/MW/km/year)
    #[string = "transmission_cost"]
    TransmissionCost,
}

impl SweepParameter {
    /// The name used for the parameter in model files and on the command line
    pub fn name(self) -> &'static str {
        match self {
            Self::Co2Limit => "co2_limit",
            Self::TransmissionCost => "transmission_cost",
        }
    }

    /// Look up a parameter by name
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Co2Limit, Self::TransmissionCost]
            .into_iter()
            .find(|parameter| parameter.name() == name.trim())
    }

    /// The scenario for one value of the parameter
    pub fn scenario(self, value: f64) -> Scenario {
        match self {
            Self::Co2Limit => Scenario::co2_limit_mt(value),
            Self::TransmissionCost => Scenario::TransmissionCost(MoneyPerPowerPerLength(value)),
        }
    }

    /// The unit values are given in
    pub fn unit(self) -> &'static str {
        match self {
            Self::Co2Limit => "Mt",
            Self::TransmissionCost => "EUR/MW/km",
        }
    }
}

/// The outcome for one value of a sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    /// The value of the swept parameter
    pub value: f64,
    /// The scenario applied
    pub scenario: Scenario,
    /// The solution, or why there isn't one
    pub outcome: Result<Solution, ScenarioError>,
}

/// Solve one scenario on a copy of the base network
pub fn run_scenario<S: Solver>(
    base: &Network,
    scenario: &Scenario,
    solver: &S,
) -> Result<Solution, ScenarioError> {
    let network = scenario
        .apply(base)
        .map_err(|err| ScenarioError::Build {
            scenario: scenario.clone(),
            source: ModelError::from_chain(&err),
        })?;

    solver.solve(&network).map_err(|source| ScenarioError::Solve {
        scenario: scenario.clone(),
        source,
    })
}

/// Run a sensitivity sweep.
///
/// One point is returned for each value, in the order given. `base` is never modified.
pub fn run_sweep<S: Solver>(
    base: &Network,
    parameter: SweepParameter,
    values: &[f64],
    solver: &S,
) -> Vec<SweepPoint> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let scenario = parameter.scenario(*value);
            info!("Sweep point {} of {}: {scenario}", i + 1, values.len());
            let outcome = run_scenario(base, &scenario, solver);
            if let Err(err) = &outcome {
                warn!("{err}: {}", err.status());
            }

            SweepPoint {
                value: *value,
                scenario,
                outcome,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SolveError;
    use crate::fixture::{network, solver};
    use crate::network::Generator;
    use crate::optimisation::HighsSolver;
    use crate::scenario::CO2_LIMIT_CONSTRAINT;
    use crate::units::{
        Dimensionless, Emissions, EmissionsPerEnergy, Money, MoneyPerEnergy, MoneyPerPower, Power,
    };
    use rstest::rstest;
    use std::cell::RefCell;

    /// Records the networks it is given and fails for CO2 limits below a threshold
    struct MockSolver {
        seen: RefCell<Vec<Network>>,
        threshold: Emissions,
    }

    impl Solver for MockSolver {
        fn solve(&self, network: &Network) -> Result<Solution, SolveError> {
            self.seen.borrow_mut().push(network.clone());
            let limit = network.global_constraints()[CO2_LIMIT_CONSTRAINT].constant;
            if limit < self.threshold {
                return Err(SolveError::Infeasible);
            }

            Ok(Solution {
                snapshots: network.snapshots().to_vec(),
                objective: Money(1.0 / (1.0 + limit.value())),
                generators: Default::default(),
                storage_units: Default::default(),
                links: Default::default(),
                bus_prices: Default::default(),
                constraint_duals: Default::default(),
                total_emissions: limit,
            })
        }
    }

    #[rstest]
    fn test_sweep_order_and_failures(network: Network) {
        let solver = MockSolver {
            seen: RefCell::new(Vec::new()),
            threshold: Emissions::from_megatonnes(20.0),
        };
        let values = [50.0, 0.0, 25.0, 10.0];
        let points = run_sweep(&network, SweepParameter::Co2Limit, &values, &solver);

        assert_eq!(points.len(), values.len());
        for (point, value) in points.iter().zip(values) {
            assert_eq!(point.value, value);
            assert_eq!(point.scenario, Scenario::co2_limit_mt(value));
        }
        assert!(points[0].outcome.is_ok());
        assert!(points[2].outcome.is_ok());
        for i in [1, 3] {
            let err = points[i].outcome.as_ref().unwrap_err();
            assert_eq!(err.scenario(), &Scenario::co2_limit_mt(values[i]));
            assert_eq!(err.status(), "infeasible");
        }

        // Each point sees exactly one CO2 limit and the base is untouched
        for (seen, value) in solver.seen.borrow().iter().zip(values) {
            assert_eq!(seen.global_constraints().len(), 1);
            assert_eq!(
                seen.global_constraints()[CO2_LIMIT_CONSTRAINT].constant,
                Emissions::from_megatonnes(value)
            );
        }
        assert!(network.global_constraints().is_empty());
    }

    #[rstest]
    fn test_sweep_build_error(network: Network) {
        let solver = MockSolver {
            seen: RefCell::new(Vec::new()),
            threshold: Emissions(0.0),
        };
        let points = run_sweep(&network, SweepParameter::Co2Limit, &[-5.0, 5.0], &solver);
        let err = points[0].outcome.as_ref().unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::Build {
                source: ModelError::Configuration(_),
                ..
            }
        ));
        assert!(points[1].outcome.is_ok());
        assert_eq!(solver.seen.borrow().len(), 1);
    }

    #[rstest]
    fn test_sweep_highs(mut network: Network, solver: HighsSolver) {
        network
            .add_carrier("OCGT", EmissionsPerEnergy(0.2))
            .unwrap();
        let n = network.snapshots().len();
        network
            .add_generator(Generator {
                id: "OCGT".into(),
                bus: "electricity".into(),
                carrier: "OCGT".into(),
                p_nom: Power(0.0),
                p_nom_max: None,
                extendable: true,
                p_max_pu: vec![1.0; n],
                capital_cost: MoneyPerPower(10.0),
                marginal_cost: MoneyPerEnergy(5.0),
                efficiency: Dimensionless(0.5),
            })
            .unwrap();

        let points = run_sweep(&network, SweepParameter::Co2Limit, &[0.0, 0.1, 1.0], &solver);
        let costs: Vec<f64> = points
            .iter()
            .map(|point| point.outcome.as_ref().unwrap().objective.value())
            .collect();

        // Tightening the limit never makes the system cheaper
        assert!(costs[0] >= costs[1] - 1e-3);
        assert!(costs[1] >= costs[2] - 1e-3);
        for point in &points {
            let solution = point.outcome.as_ref().unwrap();
            let limit = Emissions::from_megatonnes(point.value);
            assert!(solution.total_emissions.value() <= limit.value() + 1e-3);
        }
    }

    #[test]
    fn test_sweep_parameter_scenario() {
        assert_eq!(
            SweepParameter::TransmissionCost.scenario(250.0),
            Scenario::TransmissionCost(MoneyPerPowerPerLength(250.0))
        );
        assert_eq!(SweepParameter::Co2Limit.unit(), "Mt");
    }

    #[test]
    fn test_sweep_parameter_names() {
        assert_eq!(
            SweepParameter::from_name("transmission_cost"),
            Some(SweepParameter::TransmissionCost)
        );
        assert_eq!(SweepParameter::Co2Limit.name(), "co2_limit");
        assert_eq!(SweepParameter::from_name("co2"), None);
    }
}
