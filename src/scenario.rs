//! Scenarios applied as overlays on a base network.
//!
//! The base network is never modified: applying a scenario produces a new network, so one base
//! can be shared by every point of a sensitivity sweep.
use crate::error::ModelError;
use crate::id::ConstraintID;
use crate::network::{CarrierAttribute, ConstraintSense, GlobalConstraint, Network};
use crate::units::{Emissions, MoneyPerPowerPerLength};
use anyhow::{Result, ensure};
use log::{debug, warn};
use std::fmt;

/// The name of the global constraint capping total emissions
pub const CO2_LIMIT_CONSTRAINT: &str = "CO2Limit";

/// A change applied to a base network before it is optimised
#[derive(Debug, Clone, PartialEq)]
pub enum Scenario {
    /// The base network, unchanged
    Base,
    /// Cap total emissions over the horizon
    Co2Limit(Emissions),
    /// Set the cost of transmission capacity for every link with a length
    TransmissionCost(MoneyPerPowerPerLength),
}

impl Scenario {
    /// A CO2 limit given in megatonnes
    pub fn co2_limit_mt(limit: f64) -> Self {
        Self::Co2Limit(Emissions::from_megatonnes(limit))
    }

    /// Apply the scenario to a copy of `base`
    pub fn apply(&self, base: &Network) -> Result<Network> {
        let mut network = base.clone();
        self.apply_in_place(&mut network)?;
        Ok(network)
    }

    /// Apply the scenario to a network in place
    pub fn apply_in_place(&self, network: &mut Network) -> Result<()> {
        match self {
            Self::Base => {}
            Self::Co2Limit(limit) => {
                ensure!(
                    limit.is_finite() && limit.value() >= 0.0,
                    ModelError::Configuration(format!(
                        "CO2 limit must be non-negative, got {limit}"
                    ))
                );
                let constraint = GlobalConstraint {
                    id: ConstraintID::new(CO2_LIMIT_CONSTRAINT),
                    carrier_attribute: CarrierAttribute::Co2Emissions,
                    sense: ConstraintSense::LessEqual,
                    constant: *limit,
                };
                if let Some(old) = network.upsert_global_constraint(constraint) {
                    debug!("Replaced CO2 limit of {} t", old.constant);
                }
            }
            Self::TransmissionCost(cost) => {
                ensure!(
                    cost.is_finite() && cost.value() >= 0.0,
                    ModelError::Configuration(format!(
                        "Transmission cost must be non-negative, got {cost}"
                    ))
                );
                if network.set_transmission_cost(*cost) == 0 {
                    warn!("Transmission cost set, but the network has no transmission links");
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base scenario"),
            Self::Co2Limit(limit) => write!(f, "CO2 limit of {} Mt", limit.megatonnes()),
            Self::TransmissionCost(cost) => {
                write!(f, "transmission cost of {cost} EUR/MW/km")
            }
        }
    }
}
