//! Typed errors for model construction and optimisation.
//!
//! Construction code propagates [`anyhow::Error`]s with context attached, but the root cause of a
//! construction failure is always a [`ModelError`], so callers can tell bad input data apart from
//! a bad model configuration. Solver failures are reported as [`SolveError`]s.
use crate::scenario::Scenario;
use thiserror::Error;

/// An error raised while building a model
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// Technology or time-series input is missing or malformed
    #[error("Invalid input data: {0}")]
    Data(String),
    /// The topology references an undefined bus or unresolved technology, or is otherwise invalid
    #[error("Invalid model configuration: {0}")]
    Configuration(String),
}

impl ModelError {
    /// Find the [`ModelError`] at the root of an error chain, if there is one
    pub fn find_in(err: &anyhow::Error) -> Option<&ModelError> {
        err.chain().find_map(|cause| cause.downcast_ref::<ModelError>())
    }

    /// Convert an error chain into a [`ModelError`], keeping the full chain in the message.
    ///
    /// Errors which did not originate from a [`ModelError`] are treated as configuration errors.
    pub fn from_chain(err: &anyhow::Error) -> ModelError {
        let message = format!("{err:#}");
        match ModelError::find_in(err) {
            Some(ModelError::Data(_)) => ModelError::Data(message),
            _ => ModelError::Configuration(message),
        }
    }
}

/// The reason an optimisation did not produce a solution
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolveError {
    /// The constraints cannot be jointly satisfied
    #[error("The model is infeasible")]
    Infeasible,
    /// The objective has no finite minimum
    #[error("The model is unbounded")]
    Unbounded,
    /// The solver failed for another reason (numerical trouble, time limit etc.)
    #[error("Solver failure: {0}")]
    Solver(String),
}

/// A failure for one scenario of a sensitivity sweep
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScenarioError {
    /// The scenario could not be applied to the base network
    #[error("Could not build scenario with {scenario}")]
    Build {
        /// The scenario which failed
        scenario: Scenario,
        /// The underlying error
        #[source]
        source: ModelError,
    },
    /// The optimisation for the scenario failed
    #[error("Could not solve scenario with {scenario}")]
    Solve {
        /// The scenario which failed
        scenario: Scenario,
        /// The underlying error
        #[source]
        source: SolveError,
    },
}

impl ScenarioError {
    /// The scenario which triggered this error
    pub fn scenario(&self) -> &Scenario {
        match self {
            Self::Build { scenario, .. } | Self::Solve { scenario, .. } => scenario,
        }
    }

    /// A short label describing the kind of failure, for output files
    pub fn status(&self) -> &'static str {
        match self {
            Self::Build {
                source: ModelError::Data(_),
                ..
            } => "data_error",
            Self::Build { .. } => "configuration_error",
            Self::Solve {
                source: SolveError::Infeasible,
                ..
            } => "infeasible",
            Self::Solve {
                source: SolveError::Unbounded,
                ..
            } => "unbounded",
            Self::Solve { .. } => "solver_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn test_find_in_through_context() {
        let err = Err::<(), _>(anyhow!(ModelError::Data("bad value".into())))
            .context("Error reading costs.csv")
            .context("Failed to load model")
            .unwrap_err();
        assert_eq!(
            ModelError::find_in(&err),
            Some(&ModelError::Data("bad value".into()))
        );
    }

    #[test]
    fn test_from_chain() {
        let err = Err::<(), _>(anyhow!(ModelError::Data("bad value".into())))
            .context("Error reading costs.csv")
            .unwrap_err();
        assert_eq!(
            ModelError::from_chain(&err),
            ModelError::Data(
                "Error reading costs.csv: Invalid input data: bad value".into()
            )
        );

        let err = anyhow!("something else");
        assert!(matches!(
            ModelError::from_chain(&err),
            ModelError::Configuration(_)
        ));
    }

    #[test]
    fn test_scenario_error_names_scenario() {
        let scenario = Scenario::co2_limit_mt(50.0);
        let err = ScenarioError::Solve {
            scenario: scenario.clone(),
            source: SolveError::Infeasible,
        };
        assert_eq!(err.scenario(), &scenario);
        assert_eq!(err.status(), "infeasible");
        assert!(err.to_string().contains("50"));
    }
}
