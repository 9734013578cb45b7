//! The network model: buses, carriers and the components attached to them.
//!
//! A [`Network`] only ever holds consistent data: every component references buses and carriers
//! which exist, and every time series has one value per snapshot. Components are added through
//! `add_*` methods which check this.
use crate::error::ModelError;
use crate::id::{BusID, CarrierID, ComponentID, ConstraintID, IDCollection};
use crate::snapshot::{Snapshot, check_snapshots};
use crate::units::{
    Dimensionless, Emissions, EmissionsPerEnergy, Energy, Hours, Length, MoneyPerEnergy,
    MoneyPerPower, MoneyPerPowerPerLength, Power,
};
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};

/// An energy carrier (e.g. electricity, heat or a fuel)
#[derive(Debug, Clone, PartialEq)]
pub struct Carrier {
    /// Name of the carrier
    pub id: CarrierID,
    /// Emissions per MWh of primary energy consumed
    pub co2_emissions: EmissionsPerEnergy,
}

/// A node at which power must balance
#[derive(Debug, Clone, PartialEq)]
pub struct Bus {
    /// Name of the bus
    pub id: BusID,
    /// The carrier whose energy balances at this bus
    pub carrier: CarrierID,
}

/// A fixed demand at a bus
#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    /// Name of the load
    pub id: ComponentID,
    /// The bus the load is attached to
    pub bus: BusID,
    /// Demand for each snapshot
    pub p_set: Vec<Power>,
}

/// A generator of energy at a bus
#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    /// Name of the generator
    pub id: ComponentID,
    /// The bus the generator feeds
    pub bus: BusID,
    /// The carrier (technology) of the generator, which determines its emissions
    pub carrier: CarrierID,
    /// Installed capacity, or the minimum capacity if extendable
    pub p_nom: Power,
    /// Maximum capacity if extendable
    pub p_nom_max: Option<Power>,
    /// Whether the capacity is a decision variable
    pub extendable: bool,
    /// Maximum output per unit of capacity for each snapshot
    pub p_max_pu: Vec<f64>,
    /// Annualised cost per MW of capacity
    pub capital_cost: MoneyPerPower,
    /// Cost per MWh of output
    pub marginal_cost: MoneyPerEnergy,
    /// Ratio of output to primary energy consumed
    pub efficiency: Dimensionless,
}

/// A store of energy with a charging and discharging power rating
#[derive(Debug, Clone, PartialEq)]
pub struct StorageUnit {
    /// Name of the storage unit
    pub id: ComponentID,
    /// The bus the storage unit is attached to
    pub bus: BusID,
    /// The carrier (technology) of the storage unit
    pub carrier: CarrierID,
    /// Power capacity, or the minimum capacity if extendable
    pub p_nom: Power,
    /// Maximum power capacity if extendable
    pub p_nom_max: Option<Power>,
    /// Whether the capacity is a decision variable
    pub extendable: bool,
    /// Energy capacity as a multiple of power capacity
    pub max_hours: Hours,
    /// Efficiency of charging
    pub efficiency_store: Dimensionless,
    /// Efficiency of discharging
    pub efficiency_dispatch: Dimensionless,
    /// Annualised cost per MW of power capacity (including the energy store)
    pub capital_cost: MoneyPerPower,
    /// Cost per MWh discharged
    pub marginal_cost: MoneyPerEnergy,
    /// Whether the state of charge at the end of the horizon wraps round to the start
    pub cyclic_state_of_charge: bool,
    /// State of charge before the first snapshot, if not cyclic
    pub state_of_charge_initial: Energy,
    /// Fraction of stored energy lost per hour
    pub standing_loss: Dimensionless,
}

/// A directed connection between two buses which can carry power (transmission or conversion)
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Name of the link
    pub id: ComponentID,
    /// The bus power is withdrawn from
    pub bus0: BusID,
    /// The bus power is delivered to
    pub bus1: BusID,
    /// The carrier (technology) of the link
    pub carrier: CarrierID,
    /// Capacity at `bus0`, or the minimum capacity if extendable
    pub p_nom: Power,
    /// Maximum capacity if extendable
    pub p_nom_max: Option<Power>,
    /// Whether the capacity is a decision variable
    pub extendable: bool,
    /// Minimum flow per unit of capacity; -1 allows the full capacity in reverse
    pub p_min_pu: f64,
    /// Ratio of power delivered to power entering the link, in either direction
    pub efficiency: Dimensionless,
    /// Annualised cost per MW of capacity
    pub capital_cost: MoneyPerPower,
    /// Cost per MWh entering the link
    pub marginal_cost: MoneyPerEnergy,
    /// Length for transmission lines, from which the capital cost may be derived
    pub length: Option<Length>,
}

/// The attribute of carriers a global constraint applies to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, SerializeLabeledStringEnum, DeserializeLabeledStringEnum,
)]
pub enum CarrierAttribute {
    /// Emissions from primary energy consumption
    #[string = "co2_emissions"]
    Co2Emissions,
}

/// The sense of a constraint
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, SerializeLabeledStringEnum, DeserializeLabeledStringEnum,
)]
pub enum ConstraintSense {
    /// The aggregate must not exceed the constant
    #[string = "<="]
    LessEqual,
    /// The aggregate must be at least the constant
    #[string = ">="]
    GreaterEqual,
    /// The aggregate must equal the constant
    #[string = "=="]
    Equal,
}

impl ConstraintSense {
    /// The symbol for this sense
    pub fn symbol(self) -> &'static str {
        match self {
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Equal => "==",
        }
    }
}

/// A constraint on an aggregate over the whole horizon
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConstraint {
    /// Name of the constraint
    pub id: ConstraintID,
    /// The carrier attribute aggregated
    pub carrier_attribute: CarrierAttribute,
    /// The sense of the constraint
    pub sense: ConstraintSense,
    /// The limit
    pub constant: Emissions,
}

/// A network of buses and components, defined over a set of snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    snapshots: Vec<Snapshot>,
    carriers: IndexMap<CarrierID, Carrier>,
    buses: IndexMap<BusID, Bus>,
    loads: IndexMap<ComponentID, Load>,
    generators: IndexMap<ComponentID, Generator>,
    storage_units: IndexMap<ComponentID, StorageUnit>,
    links: IndexMap<ComponentID, Link>,
    global_constraints: IndexMap<ConstraintID, GlobalConstraint>,
}

fn config_err(msg: String) -> anyhow::Error {
    ModelError::Configuration(msg).into()
}

/// Check that a capacity range is valid
fn check_capacity(id: &ComponentID, p_nom: Power, p_nom_max: Option<Power>) -> Result<()> {
    ensure!(
        p_nom.value() >= 0.0 && p_nom.is_finite(),
        config_err(format!("{id}: p_nom must be a finite non-negative number"))
    );
    if let Some(p_nom_max) = p_nom_max {
        ensure!(
            p_nom_max >= p_nom,
            config_err(format!("{id}: p_nom_max must not be less than p_nom"))
        );
    }

    Ok(())
}

/// Check that an efficiency is positive
fn check_efficiency(id: &ComponentID, name: &str, efficiency: Dimensionless) -> Result<()> {
    ensure!(
        efficiency.value() > 0.0 && efficiency.is_finite(),
        config_err(format!("{id}: {name} must be greater than zero"))
    );
    Ok(())
}

impl Network {
    /// Create an empty network over the given snapshots
    pub fn new(snapshots: Vec<Snapshot>) -> Result<Self> {
        check_snapshots(&snapshots)?;
        Ok(Self {
            snapshots,
            carriers: IndexMap::new(),
            buses: IndexMap::new(),
            loads: IndexMap::new(),
            generators: IndexMap::new(),
            storage_units: IndexMap::new(),
            links: IndexMap::new(),
            global_constraints: IndexMap::new(),
        })
    }

    /// The snapshots the network is defined over
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// All carriers
    pub fn carriers(&self) -> &IndexMap<CarrierID, Carrier> {
        &self.carriers
    }

    /// All buses
    pub fn buses(&self) -> &IndexMap<BusID, Bus> {
        &self.buses
    }

    /// All loads
    pub fn loads(&self) -> &IndexMap<ComponentID, Load> {
        &self.loads
    }

    /// All generators
    pub fn generators(&self) -> &IndexMap<ComponentID, Generator> {
        &self.generators
    }

    /// All storage units
    pub fn storage_units(&self) -> &IndexMap<ComponentID, StorageUnit> {
        &self.storage_units
    }

    /// All links
    pub fn links(&self) -> &IndexMap<ComponentID, Link> {
        &self.links
    }

    /// All global constraints, in insertion order
    pub fn global_constraints(&self) -> &IndexMap<ConstraintID, GlobalConstraint> {
        &self.global_constraints
    }

    /// Add a carrier, or update the emissions of an existing one.
    ///
    /// Several technologies can share a carrier, so re-adding one is allowed as long as the
    /// emissions agree.
    pub fn add_carrier(&mut self, id: &str, co2_emissions: EmissionsPerEnergy) -> Result<()> {
        ensure!(
            co2_emissions.value() >= 0.0 && co2_emissions.is_finite(),
            config_err(format!("Carrier {id}: CO2 emissions must be non-negative"))
        );
        if let Some(existing) = self.carriers.get(id) {
            ensure!(
                existing.co2_emissions == co2_emissions,
                config_err(format!(
                    "Carrier {id} added twice with different CO2 emissions"
                ))
            );
            return Ok(());
        }

        let id = CarrierID::new(id);
        self.carriers.insert(
            id.clone(),
            Carrier {
                id,
                co2_emissions,
            },
        );
        Ok(())
    }

    /// Add a bus
    pub fn add_bus(&mut self, id: &str, carrier: &str) -> Result<()> {
        ensure!(
            !self.buses.contains_key(id),
            config_err(format!("Bus {id} defined more than once"))
        );
        let carrier = self.get_carrier_id(carrier)?;
        let id = BusID::new(id);
        self.buses.insert(id.clone(), Bus { id, carrier });
        Ok(())
    }

    /// Add a load
    pub fn add_load(&mut self, mut load: Load) -> Result<()> {
        load.bus = self.get_bus_id(&load.bus)?;
        self.check_series_len(&load.id, load.p_set.len())?;
        ensure!(
            load.p_set.iter().all(|p| p.value() >= 0.0 && p.is_finite()),
            config_err(format!("Load {}: demand must be non-negative", load.id))
        );

        insert_unique(&mut self.loads, load.id.clone(), load)
    }

    /// Add a generator
    pub fn add_generator(&mut self, mut generator: Generator) -> Result<()> {
        let id = generator.id.clone();
        generator.bus = self.get_bus_id(&generator.bus)?;
        generator.carrier = self.get_carrier_id(generator.carrier.as_str())?;
        self.check_series_len(&id, generator.p_max_pu.len())?;
        ensure!(
            generator.p_max_pu.iter().all(|pu| (0.0..=1.0).contains(pu)),
            config_err(format!("{id}: p_max_pu must lie in [0, 1]"))
        );
        check_capacity(&id, generator.p_nom, generator.p_nom_max)?;
        check_efficiency(&id, "efficiency", generator.efficiency)?;

        self.check_new_component(&id)?;
        self.generators.insert(id, generator);
        Ok(())
    }

    /// Add a storage unit
    pub fn add_storage_unit(&mut self, mut storage: StorageUnit) -> Result<()> {
        let id = storage.id.clone();
        storage.bus = self.get_bus_id(&storage.bus)?;
        storage.carrier = self.get_carrier_id(storage.carrier.as_str())?;
        check_capacity(&id, storage.p_nom, storage.p_nom_max)?;
        ensure!(
            storage.max_hours.value() > 0.0 && storage.max_hours.is_finite(),
            config_err(format!("{id}: max_hours must be greater than zero"))
        );
        for (name, efficiency) in [
            ("efficiency_store", storage.efficiency_store),
            ("efficiency_dispatch", storage.efficiency_dispatch),
        ] {
            check_efficiency(&id, name, efficiency)?;
            ensure!(
                efficiency.value() <= 1.0,
                config_err(format!("{id}: {name} must not exceed 1"))
            );
        }
        ensure!(
            (0.0..1.0).contains(&storage.standing_loss.value()),
            config_err(format!("{id}: standing_loss must lie in [0, 1)"))
        );
        ensure!(
            storage.state_of_charge_initial.value() >= 0.0,
            config_err(format!("{id}: state_of_charge_initial must be non-negative"))
        );

        self.check_new_component(&id)?;
        self.storage_units.insert(id, storage);
        Ok(())
    }

    /// Add a link
    pub fn add_link(&mut self, mut link: Link) -> Result<()> {
        let id = link.id.clone();
        link.bus0 = self.get_bus_id(&link.bus0)?;
        link.bus1 = self.get_bus_id(&link.bus1)?;
        ensure!(
            link.bus0 != link.bus1,
            config_err(format!("{id}: a link must connect two different buses"))
        );
        link.carrier = self.get_carrier_id(link.carrier.as_str())?;
        check_capacity(&id, link.p_nom, link.p_nom_max)?;
        check_efficiency(&id, "efficiency", link.efficiency)?;
        ensure!(
            (-1.0..=0.0).contains(&link.p_min_pu),
            config_err(format!("{id}: p_min_pu must lie in [-1, 0]"))
        );
        if let Some(length) = link.length {
            ensure!(
                length.value() >= 0.0 && length.is_finite(),
                config_err(format!("{id}: length must be non-negative"))
            );
        }

        self.check_new_component(&id)?;
        self.links.insert(id, link);
        Ok(())
    }

    /// Add a global constraint, replacing any existing constraint with the same name.
    ///
    /// Returns the replaced constraint, if there was one.
    pub fn upsert_global_constraint(
        &mut self,
        constraint: GlobalConstraint,
    ) -> Option<GlobalConstraint> {
        self.global_constraints
            .insert(constraint.id.clone(), constraint)
    }

    /// Remove a global constraint by name, returning it if it existed
    pub fn remove_global_constraint(&mut self, id: &str) -> Option<GlobalConstraint> {
        self.global_constraints.shift_remove(id)
    }

    /// Set the capital cost of every link with a length to `cost * length`.
    ///
    /// Returns the number of links updated.
    pub fn set_transmission_cost(&mut self, cost: MoneyPerPowerPerLength) -> usize {
        let mut count = 0;
        for link in self.links.values_mut() {
            if let Some(length) = link.length {
                link.capital_cost = cost * length;
                count += 1;
            }
        }
        count
    }

    /// Total demand at a bus for each snapshot
    pub fn bus_demand(&self, bus: &BusID) -> Vec<Power> {
        let mut demand = vec![Power(0.0); self.snapshots.len()];
        for load in self.loads.values().filter(|load| &load.bus == bus) {
            for (total, p) in demand.iter_mut().zip(&load.p_set) {
                *total += *p;
            }
        }
        demand
    }

    fn get_bus_id(&self, id: &BusID) -> Result<BusID> {
        let found = self
            .buses
            .get_id_by_str(id.as_str())
            .ok_or_else(|| config_err(format!("Unknown bus {id}")))?;
        Ok(found)
    }

    fn get_carrier_id(&self, id: &str) -> Result<CarrierID> {
        let found = self
            .carriers
            .get_id_by_str(id)
            .ok_or_else(|| config_err(format!("Unknown carrier {id}")))?;
        Ok(found)
    }

    /// Generators, storage units and links share one namespace
    fn check_new_component(&self, id: &ComponentID) -> Result<()> {
        ensure!(
            !(self.generators.contains_key(id)
                || self.storage_units.contains_key(id)
                || self.links.contains_key(id)),
            config_err(format!("Component {id} defined more than once"))
        );
        Ok(())
    }

    fn check_series_len(&self, id: &ComponentID, len: usize) -> Result<()> {
        ensure!(
            len == self.snapshots.len(),
            config_err(format!(
                "{id}: time series has {len} values but there are {} snapshots",
                self.snapshots.len()
            ))
        );
        Ok(())
    }
}

fn insert_unique<T>(map: &mut IndexMap<ComponentID, T>, id: ComponentID, value: T) -> Result<()> {
    ensure!(
        !map.contains_key(&id),
        config_err(format!("Component {id} defined more than once"))
    );
    map.insert(id, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_model_error, generator, network, storage_unit};
    use rstest::rstest;

    fn co2_limit(constant: f64) -> GlobalConstraint {
        GlobalConstraint {
            id: "CO2Limit".into(),
            carrier_attribute: CarrierAttribute::Co2Emissions,
            sense: ConstraintSense::LessEqual,
            constant: Emissions(constant),
        }
    }

    #[rstest]
    fn test_upsert_global_constraint(mut network: Network) {
        assert!(network.upsert_global_constraint(co2_limit(10.0)).is_none());
        let replaced = network.upsert_global_constraint(co2_limit(5.0));
        assert_eq!(replaced, Some(co2_limit(10.0)));
        assert_eq!(network.global_constraints().len(), 1);
        assert_eq!(
            network.global_constraints()["CO2Limit"].constant,
            Emissions(5.0)
        );

        assert!(network.remove_global_constraint("CO2Limit").is_some());
        assert!(network.global_constraints().is_empty());
    }

    #[rstest]
    fn test_add_generator_unknown_bus(mut network: Network, mut generator: Generator) {
        generator.id = "new".into();
        generator.bus = "nowhere".into();
        assert_model_error!(
            network.add_generator(generator),
            ModelError::Configuration(_)
        );
    }

    #[rstest]
    fn test_add_generator_duplicate(mut network: Network, generator: Generator) {
        assert_model_error!(
            network.add_generator(generator),
            ModelError::Configuration(_)
        );
    }

    #[rstest]
    fn test_component_names_shared(
        mut network: Network,
        mut generator: Generator,
        storage_unit: StorageUnit,
    ) {
        // The battery's name is taken by a storage unit
        generator.id = storage_unit.id.clone();
        assert_model_error!(
            network.add_generator(generator),
            ModelError::Configuration(_)
        );

        network.add_bus("heat", "electricity").unwrap();
        let link = Link {
            id: "wind".into(),
            bus0: "electricity".into(),
            bus1: "heat".into(),
            carrier: "electricity".into(),
            p_nom: Power(10.0),
            p_nom_max: None,
            extendable: false,
            p_min_pu: 0.0,
            efficiency: Dimensionless(1.0),
            capital_cost: MoneyPerPower(0.0),
            marginal_cost: MoneyPerEnergy(0.0),
            length: None,
        };
        assert_model_error!(network.add_link(link), ModelError::Configuration(_));
        assert!(network.links().is_empty());
    }

    #[rstest]
    #[case(vec![0.5, 1.5, 0.5, 0.5])]
    #[case(vec![0.5, 0.5])]
    fn test_add_generator_bad_profile(
        mut network: Network,
        mut generator: Generator,
        #[case] p_max_pu: Vec<f64>,
    ) {
        generator.id = "new".into();
        generator.p_max_pu = p_max_pu;
        assert_model_error!(
            network.add_generator(generator),
            ModelError::Configuration(_)
        );
    }

    #[rstest]
    #[case(0.0, 0.9, 0.0)]
    #[case(0.9, 1.1, 0.0)]
    #[case(0.9, 0.9, 1.0)]
    fn test_add_storage_invalid(
        mut network: Network,
        mut storage_unit: StorageUnit,
        #[case] efficiency_store: f64,
        #[case] efficiency_dispatch: f64,
        #[case] standing_loss: f64,
    ) {
        storage_unit.id = "new".into();
        storage_unit.efficiency_store = Dimensionless(efficiency_store);
        storage_unit.efficiency_dispatch = Dimensionless(efficiency_dispatch);
        storage_unit.standing_loss = Dimensionless(standing_loss);
        assert_model_error!(
            network.add_storage_unit(storage_unit),
            ModelError::Configuration(_)
        );
    }

    #[rstest]
    fn test_add_carrier_conflict(mut network: Network) {
        assert!(network.add_carrier("OCGT", EmissionsPerEnergy(0.2)).is_ok());
        assert_model_error!(
            network.add_carrier("OCGT", EmissionsPerEnergy(0.3)),
            ModelError::Configuration(_)
        );
    }

    #[rstest]
    fn test_bus_demand(network: Network) {
        let demand = network.bus_demand(&"electricity".into());
        assert_eq!(demand, vec![Power(100.0); 4]);
    }
}
