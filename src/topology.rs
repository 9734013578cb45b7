//! Building a network from a topology description, a technology table and a time series.
//!
//! Three kinds of topology are supported:
//!
//! * `single_node`: one electricity bus with all components attached
//! * `multi_region`: one electricity bus per region, with the demand split between regions and
//!   transmission links between them
//! * `sector_coupled`: an electricity bus plus one bus per additional carrier (e.g. heat or
//!   hydrogen), joined by conversion links such as heat pumps or electrolysers
use crate::error::ModelError;
use crate::graph::validate_network_connectivity;
use crate::input::deserialise_proportion;
use crate::model::ModelParameters;
use crate::network::{Generator, Link, Load, Network, StorageUnit};
use crate::snapshot::TimeSeries;
use crate::technology::{TechnologyRecord, TechnologyTable};
use crate::units::{
    Dimensionless, Energy, EmissionsPerEnergy, Hours, Length, MoneyPerEnergy,
    MoneyPerPowerPerLength, Power,
};
use anyhow::{Context, Result, ensure};
use float_cmp::approx_eq;
use indexmap::{IndexMap, IndexSet};
use log::info;
use serde::Deserialize;

/// The carrier of electricity buses
pub const ELECTRICITY_CARRIER: &str = "electricity";

/// The carrier of transmission links between regions
pub const TRANSMISSION_CARRIER: &str = "transmission";

/// The default transmission cost (EUR/MW/km/year)
pub const DEFAULT_TRANSMISSION_COST: f64 = 500.0;

fn default_bus() -> String {
    ELECTRICITY_CARRIER.into()
}

fn default_demand_column() -> String {
    "load".into()
}

fn default_transmission_cost() -> MoneyPerPowerPerLength {
    MoneyPerPowerPerLength(DEFAULT_TRANSMISSION_COST)
}

fn default_true() -> bool {
    true
}

fn default_efficiency() -> f64 {
    1.0
}

/// Description of the buses of a model and the links between them
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySpec {
    /// A single electricity bus
    SingleNode {
        /// Name of the bus
        #[serde(default = "default_bus")]
        bus: String,
        /// Time series column with the demand
        #[serde(default = "default_demand_column")]
        demand_column: String,
    },
    /// One electricity bus per region
    MultiRegion {
        /// The regions
        regions: Vec<RegionSpec>,
        /// Transmission links between regions
        #[serde(default)]
        transmission: Vec<TransmissionSpec>,
        /// Annualised cost of transmission capacity per km
        #[serde(default = "default_transmission_cost")]
        transmission_cost: MoneyPerPowerPerLength,
        /// Time series column with the total demand, which is split between regions
        #[serde(default = "default_demand_column")]
        demand_column: String,
    },
    /// An electricity bus plus buses for other carriers
    SectorCoupled {
        /// Name of the electricity bus
        #[serde(default = "default_bus")]
        bus: String,
        /// Time series column with the electricity demand
        #[serde(default = "default_demand_column")]
        demand_column: String,
        /// Additional carriers, each with its own bus and demand
        carriers: Vec<CarrierSpec>,
        /// Links converting between carriers
        #[serde(default)]
        conversions: Vec<ConversionSpec>,
    },
}

impl Default for TopologySpec {
    fn default() -> Self {
        Self::SingleNode {
            bus: default_bus(),
            demand_column: default_demand_column(),
        }
    }
}

/// A region of a multi-region model
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegionSpec {
    /// Name of the region, which is also the name of its bus
    pub name: String,
    /// Fraction of total demand in this region
    #[serde(deserialize_with = "deserialise_proportion")]
    pub demand_share: f64,
    /// Factors applied to availability profiles in this region, keyed by time series column
    #[serde(default)]
    pub profile_scaling: IndexMap<String, f64>,
}

/// A transmission link between two regions
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransmissionSpec {
    /// Name of the link (defaults to `"{bus0}-{bus1}"`)
    #[serde(default)]
    pub name: Option<String>,
    /// First region
    pub bus0: String,
    /// Second region
    pub bus1: String,
    /// Length of the line
    pub length_km: f64,
    /// Existing capacity
    #[serde(default)]
    pub p_nom: f64,
    /// Maximum capacity, if extendable
    #[serde(default)]
    pub p_nom_max: Option<f64>,
    /// Whether the capacity can be expanded
    #[serde(default = "default_true")]
    pub extendable: bool,
    /// Fraction of power delivered
    #[serde(default = "default_efficiency")]
    pub efficiency: f64,
}

impl TransmissionSpec {
    fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.bus0, self.bus1))
    }
}

/// An additional carrier in a sector-coupled model
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CarrierSpec {
    /// Name of the carrier, which is also the name of its bus
    pub name: String,
    /// Time series column with the demand
    #[serde(default)]
    pub demand_column: Option<String>,
    /// A constant demand (MW)
    #[serde(default)]
    pub demand: Option<f64>,
}

/// A link converting one carrier into another
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversionSpec {
    /// Name of the link
    pub name: String,
    /// Technology providing costs and efficiency
    pub technology: String,
    /// Input bus
    pub bus0: String,
    /// Output bus
    pub bus1: String,
    /// Overrides the technology's efficiency (e.g. a heat pump's coefficient of performance)
    #[serde(default)]
    pub efficiency: Option<f64>,
    /// Existing capacity (at the input)
    #[serde(default)]
    pub p_nom: f64,
    /// Maximum capacity, if extendable
    #[serde(default)]
    pub p_nom_max: Option<f64>,
    /// Whether the capacity can be expanded
    #[serde(default = "default_true")]
    pub extendable: bool,
}

/// A generator technology to add to the network
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratorSpec {
    /// Technology providing costs, efficiency and emissions
    pub technology: String,
    /// Name of the generator (defaults to the technology)
    #[serde(default)]
    pub name: Option<String>,
    /// Time series column with the availability; always fully available if omitted
    #[serde(default)]
    pub profile: Option<String>,
    /// Existing capacity, or minimum capacity if extendable
    #[serde(default)]
    pub p_nom: f64,
    /// Maximum capacity, if extendable
    #[serde(default)]
    pub p_nom_max: Option<f64>,
    /// Whether the capacity can be expanded
    #[serde(default = "default_true")]
    pub extendable: bool,
    /// Buses to add the generator to (defaults to all electricity buses)
    #[serde(default)]
    pub buses: Vec<String>,
}

impl GeneratorSpec {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.technology)
    }
}

/// A storage technology to add to the network.
///
/// Storage is built from up to three technologies: a charger, an optional separate discharger,
/// and an energy store. For example, a battery uses an inverter for both charging and
/// discharging, while hydrogen storage uses an electrolyser, a fuel cell and a cavern.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StorageSpec {
    /// Name of the storage unit
    pub name: String,
    /// Carrier of the storage unit (defaults to its name)
    #[serde(default)]
    pub carrier: Option<String>,
    /// Energy capacity as a multiple of power capacity
    pub max_hours: f64,
    /// Technology used for charging
    pub charger: String,
    /// Technology used for discharging (defaults to the charger)
    #[serde(default)]
    pub discharger: Option<String>,
    /// Technology of the energy store, whose investment is per MWh
    pub store: String,
    /// Existing capacity, or minimum capacity if extendable
    #[serde(default)]
    pub p_nom: f64,
    /// Maximum capacity, if extendable
    #[serde(default)]
    pub p_nom_max: Option<f64>,
    /// Whether the capacity can be expanded
    #[serde(default = "default_true")]
    pub extendable: bool,
    /// Whether the state of charge wraps round from the end of the horizon to the start
    #[serde(default = "default_true")]
    pub cyclic: bool,
    /// Initial state of charge (MWh) if not cyclic
    #[serde(default)]
    pub state_of_charge_initial: f64,
    /// Fraction of energy lost per hour
    #[serde(default)]
    pub standing_loss: f64,
    /// Buses to add the storage unit to (defaults to all electricity buses)
    #[serde(default)]
    pub buses: Vec<String>,
}

impl StorageSpec {
    /// The technologies this storage unit is built from
    pub fn technologies(&self) -> impl Iterator<Item = &str> {
        [Some(&self.charger), self.discharger.as_ref(), Some(&self.store)]
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}

fn config_err(msg: String) -> anyhow::Error {
    ModelError::Configuration(msg).into()
}

impl TopologySpec {
    /// Check that the topology is internally consistent
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::SingleNode { .. } => Ok(()),
            Self::MultiRegion {
                regions,
                transmission,
                transmission_cost,
                ..
            } => validate_multi_region(regions, transmission, *transmission_cost),
            Self::SectorCoupled {
                bus,
                carriers,
                conversions,
                ..
            } => validate_sector_coupled(bus, carriers, conversions),
        }
    }

    /// The name of this kind of topology, as written in `model.toml`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SingleNode { .. } => "single_node",
            Self::MultiRegion { .. } => "multi_region",
            Self::SectorCoupled { .. } => "sector_coupled",
        }
    }

    /// The buses which generators and storage units are attached to by default
    pub fn electricity_buses(&self) -> Vec<&str> {
        match self {
            Self::SingleNode { bus, .. } | Self::SectorCoupled { bus, .. } => vec![bus],
            Self::MultiRegion { regions, .. } => {
                regions.iter().map(|region| region.name.as_str()).collect()
            }
        }
    }

    /// All time series columns used for demand
    pub fn demand_columns(&self) -> Vec<&str> {
        match self {
            Self::SingleNode { demand_column, .. } | Self::MultiRegion { demand_column, .. } => {
                vec![demand_column]
            }
            Self::SectorCoupled {
                demand_column,
                carriers,
                ..
            } => std::iter::once(demand_column.as_str())
                .chain(
                    carriers
                        .iter()
                        .filter_map(|carrier| carrier.demand_column.as_deref()),
                )
                .collect(),
        }
    }

    /// Technologies referenced by the topology itself (i.e. by conversion links)
    pub fn technologies(&self) -> Vec<&str> {
        match self {
            Self::SectorCoupled { conversions, .. } => conversions
                .iter()
                .map(|conversion| conversion.technology.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Get the factor to apply to an availability profile at a bus
    fn profile_scaling(&self, bus: &str, profile: &str) -> f64 {
        let Self::MultiRegion { regions, .. } = self else {
            return 1.0;
        };
        regions
            .iter()
            .find(|region| region.name == bus)
            .and_then(|region| region.profile_scaling.get(profile))
            .copied()
            .unwrap_or(1.0)
    }
}

fn check_unique<'a, I>(names: I, what: &str) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = IndexSet::new();
    for name in names {
        ensure!(
            seen.insert(name),
            config_err(format!("{what} {name} is defined more than once"))
        );
    }
    Ok(())
}

fn validate_multi_region(
    regions: &[RegionSpec],
    transmission: &[TransmissionSpec],
    transmission_cost: MoneyPerPowerPerLength,
) -> Result<()> {
    ensure!(
        !regions.is_empty(),
        config_err("A multi-region topology needs at least one region".into())
    );
    check_unique(regions.iter().map(|r| r.name.as_str()), "Region")?;

    for region in regions {
        ensure!(
            (0.0..=1.0).contains(&region.demand_share),
            config_err(format!(
                "Region {}: demand_share must lie in [0, 1]",
                region.name
            ))
        );
        for (profile, factor) in &region.profile_scaling {
            ensure!(
                *factor >= 0.0 && factor.is_finite(),
                config_err(format!(
                    "Region {}: scaling for profile {profile} must be non-negative",
                    region.name
                ))
            );
        }
    }
    let total: f64 = regions.iter().map(|r| r.demand_share).sum();
    ensure!(
        approx_eq!(f64, total, 1.0, epsilon = 1e-6),
        config_err(format!("Demand shares of regions sum to {total} rather than 1"))
    );

    ensure!(
        transmission_cost.value() >= 0.0 && transmission_cost.is_finite(),
        config_err("transmission_cost must be non-negative".into())
    );
    let names: Vec<_> = transmission.iter().map(TransmissionSpec::name).collect();
    check_unique(names.iter().map(String::as_str), "Transmission link")?;
    for line in transmission {
        for bus in [&line.bus0, &line.bus1] {
            ensure!(
                regions.iter().any(|region| &region.name == bus),
                config_err(format!(
                    "Transmission link {} refers to unknown region {bus}",
                    line.name()
                ))
            );
        }
        ensure!(
            line.length_km >= 0.0 && line.length_km.is_finite(),
            config_err(format!(
                "Transmission link {}: length must be non-negative",
                line.name()
            ))
        );
    }

    Ok(())
}

fn validate_sector_coupled(
    bus: &str,
    carriers: &[CarrierSpec],
    conversions: &[ConversionSpec],
) -> Result<()> {
    check_unique(
        std::iter::once(bus).chain(carriers.iter().map(|c| c.name.as_str())),
        "Bus",
    )?;
    for carrier in carriers {
        ensure!(
            carrier.demand_column.is_some() != carrier.demand.is_some(),
            config_err(format!(
                "Carrier {} must have exactly one of demand_column and demand",
                carrier.name
            ))
        );
        if let Some(demand) = carrier.demand {
            ensure!(
                demand >= 0.0 && demand.is_finite(),
                config_err(format!(
                    "Carrier {}: demand must be non-negative",
                    carrier.name
                ))
            );
        }
    }

    check_unique(conversions.iter().map(|c| c.name.as_str()), "Conversion")?;
    for conversion in conversions {
        if let Some(efficiency) = conversion.efficiency {
            ensure!(
                efficiency > 0.0 && efficiency.is_finite(),
                config_err(format!(
                    "Conversion {}: efficiency must be greater than zero",
                    conversion.name
                ))
            );
        }
    }

    Ok(())
}

/// Build the base network for a model.
///
/// No optimisation is performed. The result contains no global constraints; these are added by
/// applying a scenario.
pub fn build_network(
    parameters: &ModelParameters,
    technologies: &TechnologyTable,
    time_series: &TimeSeries,
) -> Result<Network> {
    let topology = &parameters.topology;
    topology.validate()?;

    let mut network = Network::new(time_series.snapshots().to_vec())?;
    network.add_carrier(ELECTRICITY_CARRIER, EmissionsPerEnergy(0.0))?;

    match topology {
        TopologySpec::SingleNode { bus, demand_column } => {
            network.add_bus(bus, ELECTRICITY_CARRIER)?;
            add_load(&mut network, "demand", bus, time_series.column(demand_column)?, 1.0)?;
        }
        TopologySpec::MultiRegion {
            regions,
            transmission,
            transmission_cost,
            demand_column,
        } => {
            let demand = time_series.column(demand_column)?;
            for region in regions {
                network.add_bus(&region.name, ELECTRICITY_CARRIER)?;
                let name = format!("{} demand", region.name);
                add_load(&mut network, &name, &region.name, demand, region.demand_share)?;
            }
            if !transmission.is_empty() {
                network.add_carrier(TRANSMISSION_CARRIER, EmissionsPerEnergy(0.0))?;
            }
            for line in transmission {
                add_transmission(&mut network, line, *transmission_cost)?;
            }
        }
        TopologySpec::SectorCoupled {
            bus,
            demand_column,
            carriers,
            conversions,
        } => {
            network.add_bus(bus, ELECTRICITY_CARRIER)?;
            add_load(&mut network, "demand", bus, time_series.column(demand_column)?, 1.0)?;
            for carrier in carriers {
                network.add_carrier(&carrier.name, EmissionsPerEnergy(0.0))?;
                network.add_bus(&carrier.name, &carrier.name)?;
                let name = format!("{} demand", carrier.name);
                match (&carrier.demand_column, carrier.demand) {
                    (Some(column), _) => {
                        let demand = time_series.column(column)?;
                        add_load(&mut network, &name, &carrier.name, demand, 1.0)?;
                    }
                    (None, demand) => {
                        let flat = vec![demand.unwrap_or(0.0); time_series.len()];
                        add_load(&mut network, &name, &carrier.name, &flat, 1.0)?;
                    }
                }
            }
            for conversion in conversions {
                let record = technologies
                    .get(&conversion.technology)
                    .with_context(|| format!("Invalid conversion {}", conversion.name))?;
                add_conversion(&mut network, conversion, record)?;
            }
        }
    }

    let default_buses = topology.electricity_buses();
    for spec in &parameters.generators {
        let record = technologies
            .get(&spec.technology)
            .with_context(|| format!("Invalid generator {}", spec.name()))?;
        network.add_carrier(&spec.technology, record.co2_intensity)?;
        let buses = buses_or_default(&spec.buses, &default_buses);
        for bus in &buses {
            add_generator(&mut network, topology, spec, record, bus, time_series, buses.len() > 1)
                .with_context(|| format!("Invalid generator {}", spec.name()))?;
        }
    }

    for spec in &parameters.storage_units {
        let buses = buses_or_default(&spec.buses, &default_buses);
        for bus in &buses {
            add_storage(&mut network, spec, technologies, bus, buses.len() > 1)
                .with_context(|| format!("Invalid storage unit {}", spec.name))?;
        }
    }

    validate_network_connectivity(&network)?;
    info!(
        "Built network with {} buses, {} generators, {} storage units and {} links",
        network.buses().len(),
        network.generators().len(),
        network.storage_units().len(),
        network.links().len()
    );

    Ok(network)
}

fn buses_or_default<'a>(buses: &'a [String], default: &[&'a str]) -> Vec<&'a str> {
    if buses.is_empty() {
        default.to_vec()
    } else {
        buses.iter().map(String::as_str).collect()
    }
}

/// Name a component, prefixing it with its bus when it is added to several buses
fn component_name(name: &str, bus: &str, prefix: bool) -> String {
    if prefix {
        format!("{bus} {name}")
    } else {
        name.to_string()
    }
}

fn add_load(
    network: &mut Network,
    name: &str,
    bus: &str,
    demand: &[f64],
    share: f64,
) -> Result<()> {
    network.add_load(Load {
        id: name.into(),
        bus: bus.into(),
        p_set: demand.iter().map(|p| Power(p * share)).collect(),
    })
}

fn add_transmission(
    network: &mut Network,
    line: &TransmissionSpec,
    cost: MoneyPerPowerPerLength,
) -> Result<()> {
    let length = Length(line.length_km);
    network.add_link(Link {
        id: line.name().into(),
        bus0: line.bus0.as_str().into(),
        bus1: line.bus1.as_str().into(),
        carrier: TRANSMISSION_CARRIER.into(),
        p_nom: Power(line.p_nom),
        p_nom_max: line.p_nom_max.map(Power),
        extendable: line.extendable,
        p_min_pu: -1.0,
        efficiency: Dimensionless(line.efficiency),
        capital_cost: cost * length,
        marginal_cost: MoneyPerEnergy(0.0),
        length: Some(length),
    })
}

fn add_conversion(
    network: &mut Network,
    conversion: &ConversionSpec,
    record: &TechnologyRecord,
) -> Result<()> {
    network.add_carrier(&conversion.technology, record.co2_intensity)?;
    network.add_link(Link {
        id: conversion.name.as_str().into(),
        bus0: conversion.bus0.as_str().into(),
        bus1: conversion.bus1.as_str().into(),
        carrier: conversion.technology.as_str().into(),
        p_nom: Power(conversion.p_nom),
        p_nom_max: conversion.p_nom_max.map(Power),
        extendable: conversion.extendable,
        p_min_pu: 0.0,
        efficiency: conversion
            .efficiency
            .map_or(record.efficiency, Dimensionless),
        capital_cost: record.capital_cost(),
        marginal_cost: record.vom,
        length: None,
    })
}

fn add_generator(
    network: &mut Network,
    topology: &TopologySpec,
    spec: &GeneratorSpec,
    record: &TechnologyRecord,
    bus: &str,
    time_series: &TimeSeries,
    prefix: bool,
) -> Result<()> {
    let p_max_pu = match &spec.profile {
        Some(profile) => {
            let scaling = topology.profile_scaling(bus, profile);
            time_series
                .column(profile)?
                .iter()
                .map(|pu| (pu * scaling).clamp(0.0, 1.0))
                .collect()
        }
        None => vec![1.0; time_series.len()],
    };

    network.add_generator(Generator {
        id: component_name(spec.name(), bus, prefix).into(),
        bus: bus.into(),
        carrier: spec.technology.as_str().into(),
        p_nom: Power(spec.p_nom),
        p_nom_max: spec.p_nom_max.map(Power),
        extendable: spec.extendable,
        p_max_pu,
        capital_cost: record.capital_cost(),
        marginal_cost: record.marginal_cost(),
        efficiency: record.efficiency,
    })
}

fn add_storage(
    network: &mut Network,
    spec: &StorageSpec,
    technologies: &TechnologyTable,
    bus: &str,
    prefix: bool,
) -> Result<()> {
    let charger = technologies.get(&spec.charger)?;
    let discharger = match &spec.discharger {
        Some(discharger) => technologies.get(discharger)?,
        None => charger,
    };
    let store = technologies.get(&spec.store)?;
    let max_hours = Hours(spec.max_hours);

    // A separate discharger is paid for on top of the charger
    let mut capital_cost = charger.capital_cost();
    if discharger.id != charger.id {
        capital_cost += discharger.capital_cost();
    }
    capital_cost += store.capital_cost() * Dimensionless(max_hours.value());

    let carrier = spec.carrier.as_deref().unwrap_or(&spec.name);
    network.add_carrier(carrier, EmissionsPerEnergy(0.0))?;
    network.add_storage_unit(StorageUnit {
        id: component_name(&spec.name, bus, prefix).into(),
        bus: bus.into(),
        carrier: carrier.into(),
        p_nom: Power(spec.p_nom),
        p_nom_max: spec.p_nom_max.map(Power),
        extendable: spec.extendable,
        max_hours,
        efficiency_store: charger.efficiency,
        efficiency_dispatch: discharger.efficiency,
        capital_cost,
        marginal_cost: discharger.vom,
        cyclic_state_of_charge: spec.cyclic,
        state_of_charge_initial: Energy(spec.state_of_charge_initial),
        standing_loss: Dimensionless(spec.standing_loss),
    })
}
