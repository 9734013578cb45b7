//! Technology cost records and the table used to resolve them.
//!
//! A technology cost table starts life as a set of raw `(technology, parameter) -> (value, unit)`
//! cells. [`TechnologyTable::from_cells`] turns these into complete [`TechnologyRecord`]s:
//!
//! 1. costs given per kW (or per kWh) are rescaled to per MW (or per MWh)
//! 2. fuel-derived technologies inherit fuel attributes they do not specify themselves
//! 3. missing attributes are filled with their defaults
//! 4. each record is validated
use crate::error::ModelError;
use crate::finance::annualised_capital_cost;
use crate::id::TechnologyID;
use crate::units::{Dimensionless, EmissionsPerEnergy, MoneyPerEnergy, MoneyPerPower};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

/// An attribute which can be given for a technology in the cost table
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, EnumIter, Display,
)]
#[strum(ascii_case_insensitive)]
pub enum TechnologyAttribute {
    /// Fixed operation and maintenance cost (%/year of investment)
    #[strum(serialize = "FOM")]
    Fom,
    /// Variable operation and maintenance cost (EUR/MWh)
    #[strum(serialize = "VOM")]
    Vom,
    /// Conversion efficiency
    #[strum(serialize = "efficiency")]
    Efficiency,
    /// Fuel cost (EUR/MWh of primary energy)
    #[strum(serialize = "fuel")]
    Fuel,
    /// Overnight investment cost (EUR/MW)
    #[strum(serialize = "investment")]
    Investment,
    /// Economic lifetime (years)
    #[strum(serialize = "lifetime")]
    Lifetime,
    /// Emissions intensity (t/MWh of primary energy)
    #[strum(serialize = "CO2 intensity")]
    Co2Intensity,
    /// Discount rate used for annualising the investment
    #[strum(serialize = "discount rate")]
    DiscountRate,
}

impl TechnologyAttribute {
    /// The value used when a technology does not give this attribute
    pub fn default_value(self) -> f64 {
        match self {
            Self::Efficiency => 1.0,
            Self::Lifetime => 25.0,
            Self::DiscountRate => 0.07,
            Self::Fom | Self::Vom | Self::Fuel | Self::Investment | Self::Co2Intensity => 0.0,
        }
    }

    /// Parse an attribute name, returning `None` for parameters which aren't modelled
    pub fn parse(name: &str) -> Option<Self> {
        Self::from_str(name.trim()).ok()
    }
}

/// The attribute values given for one technology
pub type AttributeMap = IndexMap<TechnologyAttribute, f64>;

/// One raw cell of a technology cost table
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CostCell {
    /// The technology the cell refers to
    pub technology: String,
    /// The parameter name (e.g. "investment")
    pub parameter: String,
    /// The value in the given unit
    pub value: f64,
    /// The unit label (e.g. "EUR/kW")
    #[serde(default)]
    pub unit: String,
}

impl CostCell {
    /// Rescale a cost given per kW (or kWh) to per MW (or MWh).
    ///
    /// Normalising a cell which is already per MW leaves it unchanged.
    pub fn normalise(mut self) -> Self {
        if self.unit.contains("/kW") {
            self.value *= 1000.0;
            self.unit = self.unit.replace("/kW", "/MW");
        }
        self
    }
}

/// Declares that one technology takes some attributes from another one when unspecified
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FuelInheritance {
    /// The technology which inherits
    pub technology: TechnologyID,
    /// The technology inherited from
    pub from: TechnologyID,
    /// The names of inherited attributes
    #[serde(default = "default_inherited_attributes")]
    pub attributes: Vec<String>,
}

fn default_inherited_attributes() -> Vec<String> {
    vec!["fuel".into(), "CO2 intensity".into()]
}

impl FuelInheritance {
    /// Gas turbines take their fuel cost and emissions intensity from gas
    pub fn default_rules() -> Vec<FuelInheritance> {
        ["OCGT", "CCGT"]
            .into_iter()
            .map(|technology| FuelInheritance {
                technology: technology.into(),
                from: "gas".into(),
                attributes: default_inherited_attributes(),
            })
            .collect()
    }

    fn parsed_attributes(&self) -> Result<Vec<TechnologyAttribute>> {
        self.attributes
            .iter()
            .map(|name| {
                TechnologyAttribute::parse(name).ok_or_else(|| {
                    ModelError::Configuration(format!("Unknown technology attribute '{name}'"))
                        .into()
                })
            })
            .collect()
    }
}

/// A complete set of cost and performance parameters for a technology
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnologyRecord {
    /// The technology's name
    pub id: TechnologyID,
    /// Fixed operation and maintenance cost (%/year of investment)
    pub fom: f64,
    /// Variable operation and maintenance cost
    pub vom: MoneyPerEnergy,
    /// Conversion efficiency
    pub efficiency: Dimensionless,
    /// Fuel cost per MWh of primary energy
    pub fuel: MoneyPerEnergy,
    /// Overnight investment cost
    pub investment: MoneyPerPower,
    /// Economic lifetime in years
    pub lifetime: f64,
    /// Emissions per MWh of primary energy
    pub co2_intensity: EmissionsPerEnergy,
    /// Discount rate
    pub discount_rate: Dimensionless,
}

impl TechnologyRecord {
    /// Create a record from the attributes given, filling the others with their defaults
    pub fn from_attributes(id: TechnologyID, attributes: &AttributeMap) -> Result<Self> {
        let get = |attr: TechnologyAttribute| {
            attributes
                .get(&attr)
                .copied()
                .unwrap_or_else(|| attr.default_value())
        };
        let record = Self {
            fom: get(TechnologyAttribute::Fom),
            vom: MoneyPerEnergy(get(TechnologyAttribute::Vom)),
            efficiency: Dimensionless(get(TechnologyAttribute::Efficiency)),
            fuel: MoneyPerEnergy(get(TechnologyAttribute::Fuel)),
            investment: MoneyPerPower(get(TechnologyAttribute::Investment)),
            lifetime: get(TechnologyAttribute::Lifetime),
            co2_intensity: EmissionsPerEnergy(get(TechnologyAttribute::Co2Intensity)),
            discount_rate: Dimensionless(get(TechnologyAttribute::DiscountRate)),
            id,
        };
        record.validate()?;
        Ok(record)
    }

    /// Check that the parameters are physically meaningful.
    ///
    /// Efficiencies above 1 are accepted because conversion technologies such as heat pumps
    /// have them. Negative costs are suspicious but not invalid, so only cause a warning.
    fn validate(&self) -> Result<()> {
        let id = &self.id;
        let invalid = |msg: String| ModelError::Data(format!("Technology {id}: {msg}"));

        ensure!(
            self.efficiency.value() > 0.0 && self.efficiency.is_finite(),
            invalid(format!(
                "efficiency must be greater than zero (got {})",
                self.efficiency
            ))
        );
        ensure!(
            self.lifetime > 0.0 && self.lifetime.is_finite(),
            invalid(format!(
                "lifetime must be greater than zero (got {})",
                self.lifetime
            ))
        );
        ensure!(
            self.co2_intensity.value() >= 0.0,
            invalid(format!(
                "CO2 intensity must be non-negative (got {})",
                self.co2_intensity
            ))
        );
        ensure!(
            (0.0..1.0).contains(&self.discount_rate.value()),
            invalid(format!(
                "discount rate must be in [0, 1) (got {})",
                self.discount_rate
            ))
        );

        for (name, value) in [
            ("FOM", self.fom),
            ("VOM", self.vom.value()),
            ("fuel", self.fuel.value()),
            ("investment", self.investment.value()),
        ] {
            if value < 0.0 {
                warn!("Technology {id} has a negative {name} cost ({value})");
            }
        }

        Ok(())
    }

    /// Cost per MWh of output: `VOM + fuel / efficiency`
    pub fn marginal_cost(&self) -> MoneyPerEnergy {
        self.vom + self.fuel / self.efficiency
    }

    /// Annualised cost per MW of capacity: `(annuity + FOM / 100) * investment`
    pub fn capital_cost(&self) -> MoneyPerPower {
        annualised_capital_cost(
            self.investment,
            self.fom,
            self.lifetime,
            self.discount_rate,
        )
    }

    /// Emissions per MWh of output
    pub fn emissions_per_output(&self) -> EmissionsPerEnergy {
        self.co2_intensity / self.efficiency
    }
}

/// The resolved technology records for a model, plus fallback records for missing ones
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TechnologyTable {
    records: IndexMap<TechnologyID, TechnologyRecord>,
    fallbacks: IndexMap<TechnologyID, TechnologyRecord>,
}

impl TechnologyTable {
    /// Build a table from raw cost cells.
    ///
    /// Parameters which aren't technology attributes (e.g. "c_v" or "voltage") are ignored. Giving
    /// the same parameter twice for one technology is an error.
    pub fn from_cells<I>(cells: I, inheritance: &[FuelInheritance]) -> Result<Self>
    where
        I: IntoIterator<Item = CostCell>,
    {
        let mut raw: IndexMap<TechnologyID, AttributeMap> = IndexMap::new();
        for cell in cells {
            let cell = cell.normalise();
            let Some(attr) = TechnologyAttribute::parse(&cell.parameter) else {
                continue;
            };
            ensure!(
                cell.value.is_finite(),
                ModelError::Data(format!(
                    "Non-finite value for {attr} of technology {}",
                    cell.technology
                ))
            );

            let attributes = raw.entry(cell.technology.trim().into()).or_default();
            ensure!(
                attributes.insert(attr, cell.value).is_none(),
                ModelError::Data(format!(
                    "Duplicate entry for {attr} of technology {}",
                    cell.technology
                ))
            );
        }

        apply_inheritance(&mut raw, inheritance)?;

        let records = raw
            .into_iter()
            .map(|(id, attributes)| {
                let record = TechnologyRecord::from_attributes(id.clone(), &attributes)?;
                Ok((id, record))
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            records,
            fallbacks: IndexMap::new(),
        })
    }

    /// Declare a record to use if the technology is not in the table
    pub fn add_fallback(&mut self, id: TechnologyID, attributes: &AttributeMap) -> Result<()> {
        let record = TechnologyRecord::from_attributes(id.clone(), attributes)
            .with_context(|| format!("Invalid fallback for technology {id}"))?;
        self.fallbacks.insert(id, record);
        Ok(())
    }

    /// Restrict the table to the given technologies.
    ///
    /// Technologies which are neither in the table nor have a fallback are kept out of the result
    /// and reported when they are looked up.
    pub fn select<'a, I>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut records = IndexMap::new();
        for id in ids {
            if let Some((key, record)) = self.records.get_key_value(id) {
                records.insert(key.clone(), record.clone());
            }
        }
        Self {
            records,
            fallbacks: self.fallbacks.clone(),
        }
    }

    /// Look up a technology.
    ///
    /// If the technology is not in the table, the fallback declared for it is used instead and a
    /// warning is logged. If there is no fallback either, a configuration error is returned.
    pub fn get(&self, id: &str) -> Result<&TechnologyRecord> {
        if let Some(record) = self.records.get(id) {
            return Ok(record);
        }
        if let Some(record) = self.fallbacks.get(id) {
            warn!("Technology {id} is not in the cost table; using declared fallback values");
            return Ok(record);
        }

        Err(ModelError::Configuration(format!(
            "Technology {id} is not in the cost table and has no fallback"
        ))
        .into())
    }

    /// Whether the technology can be resolved, either directly or via a fallback
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id) || self.fallbacks.contains_key(id)
    }

    /// Iterate over the records in the table (excluding unused fallbacks)
    pub fn iter(&self) -> impl Iterator<Item = &TechnologyRecord> {
        self.records.values()
    }

    /// Number of records in the table
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<TechnologyRecord> for TechnologyTable {
    fn from_iter<T: IntoIterator<Item = TechnologyRecord>>(iter: T) -> Self {
        Self {
            records: iter
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect(),
            fallbacks: IndexMap::new(),
        }
    }
}

/// Copy inherited attributes into technologies which don't specify them.
///
/// Rules whose target technology is absent from the table are skipped. A target which is present
/// while its source isn't is an error, as the inherited values would silently become defaults.
fn apply_inheritance(
    raw: &mut IndexMap<TechnologyID, AttributeMap>,
    rules: &[FuelInheritance],
) -> Result<()> {
    for rule in rules {
        let attributes = rule.parsed_attributes()?;
        if !raw.contains_key(&rule.technology) {
            continue;
        }
        let source = raw.get(&rule.from).cloned().ok_or_else(|| {
            ModelError::Data(format!(
                "Technology {} inherits from {}, which is not in the cost table",
                rule.technology, rule.from
            ))
        })?;

        let target = &mut raw[&rule.technology];
        for attr in attributes {
            if target.contains_key(&attr) {
                continue;
            }
            let value = source
                .get(&attr)
                .copied()
                .unwrap_or_else(|| attr.default_value());
            target.insert(attr, value);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_model_error, cost_cells};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn cell(technology: &str, parameter: &str, value: f64, unit: &str) -> CostCell {
        CostCell {
            technology: technology.into(),
            parameter: parameter.into(),
            value,
            unit: unit.into(),
        }
    }

    #[rstest]
    #[case("EUR/kW", 1000.0, "EUR/MW")]
    #[case("EUR/kWh", 1000.0, "EUR/MWh")]
    #[case("EUR/kW/year", 1000.0, "EUR/MW/year")]
    #[case("EUR/MW", 1.0, "EUR/MW")]
    #[case("%/year", 1.0, "%/year")]
    fn test_normalise(#[case] unit: &str, #[case] factor: f64, #[case] expected_unit: &str) {
        let normalised = cell("onwind", "investment", 2.5, unit).normalise();
        assert_approx_eq!(f64, normalised.value, 2.5 * factor);
        assert_eq!(normalised.unit, expected_unit);
    }

    #[rstest]
    fn test_normalise_idempotent(cost_cells: Vec<CostCell>) {
        let once: Vec<_> = cost_cells.into_iter().map(CostCell::normalise).collect();
        let twice: Vec<_> = once.iter().cloned().map(CostCell::normalise).collect();
        assert_eq!(once, twice);
    }

    #[rstest]
    #[case("FOM", TechnologyAttribute::Fom)]
    #[case("co2 intensity", TechnologyAttribute::Co2Intensity)]
    #[case(" Discount Rate ", TechnologyAttribute::DiscountRate)]
    fn test_parse_attribute(#[case] name: &str, #[case] expected: TechnologyAttribute) {
        assert_eq!(TechnologyAttribute::parse(name), Some(expected));
    }

    #[test]
    fn test_defaults() {
        let record = TechnologyRecord::from_attributes("solar".into(), &AttributeMap::new())
            .unwrap();
        assert_approx_eq!(f64, record.fom, 0.0);
        assert_approx_eq!(Dimensionless, record.efficiency, Dimensionless(1.0));
        assert_approx_eq!(f64, record.lifetime, 25.0);
        assert_approx_eq!(Dimensionless, record.discount_rate, Dimensionless(0.07));
        assert_approx_eq!(MoneyPerPower, record.capital_cost(), MoneyPerPower(0.0));
        assert_approx_eq!(MoneyPerEnergy, record.marginal_cost(), MoneyPerEnergy(0.0));
    }

    #[rstest]
    fn test_from_cells(cost_cells: Vec<CostCell>) {
        let table = TechnologyTable::from_cells(cost_cells, &FuelInheritance::default_rules())
            .unwrap();
        let ocgt = table.get("OCGT").unwrap();

        // Investment was given per kW
        assert_approx_eq!(MoneyPerPower, ocgt.investment, MoneyPerPower(450_000.0));
        // Fuel and emissions come from gas
        assert_approx_eq!(MoneyPerEnergy, ocgt.fuel, MoneyPerEnergy(20.0));
        assert_approx_eq!(
            EmissionsPerEnergy,
            ocgt.co2_intensity,
            EmissionsPerEnergy(0.2)
        );
        // 4.5 + 20 / 0.4
        assert_approx_eq!(MoneyPerEnergy, ocgt.marginal_cost(), MoneyPerEnergy(54.5));
    }

    #[test]
    fn test_inheritance_keeps_own_values() {
        let cells = vec![
            cell("gas", "fuel", 20.0, "EUR/MWh_th"),
            cell("gas", "CO2 intensity", 0.2, "tCO2/MWh_th"),
            cell("CCGT", "fuel", 30.0, "EUR/MWh_th"),
        ];
        let table = TechnologyTable::from_cells(cells, &FuelInheritance::default_rules()).unwrap();
        let ccgt = table.get("CCGT").unwrap();
        assert_approx_eq!(MoneyPerEnergy, ccgt.fuel, MoneyPerEnergy(30.0));
        assert_approx_eq!(
            EmissionsPerEnergy,
            ccgt.co2_intensity,
            EmissionsPerEnergy(0.2)
        );
    }

    #[test]
    fn test_inheritance_missing_source() {
        let cells = vec![cell("OCGT", "investment", 450.0, "EUR/kW")];
        let result = TechnologyTable::from_cells(cells, &FuelInheritance::default_rules());
        assert_model_error!(result, ModelError::Data(_));
    }

    #[test]
    fn test_duplicate_cell() {
        let cells = vec![
            cell("onwind", "investment", 1000.0, "EUR/kW"),
            cell("onwind", "investment", 1100.0, "EUR/kW"),
        ];
        let result = TechnologyTable::from_cells(cells, &[]);
        assert_model_error!(result, ModelError::Data(_));
    }

    #[rstest]
    #[case(TechnologyAttribute::Efficiency, 0.0)]
    #[case(TechnologyAttribute::Lifetime, 0.0)]
    #[case(TechnologyAttribute::Co2Intensity, -0.1)]
    #[case(TechnologyAttribute::DiscountRate, 1.0)]
    fn test_invalid_record(#[case] attr: TechnologyAttribute, #[case] value: f64) {
        let attributes = [(attr, value)].into_iter().collect();
        let result = TechnologyRecord::from_attributes("bad".into(), &attributes);
        assert_model_error!(result, ModelError::Data(_));
    }

    #[test]
    fn test_heat_pump_efficiency_allowed() {
        let attributes = [(TechnologyAttribute::Efficiency, 3.0)].into_iter().collect();
        assert!(TechnologyRecord::from_attributes("heat pump".into(), &attributes).is_ok());
    }

    #[rstest]
    fn test_costs_non_negative(cost_cells: Vec<CostCell>) {
        let table = TechnologyTable::from_cells(cost_cells, &FuelInheritance::default_rules())
            .unwrap();
        for record in table.iter() {
            assert!(record.capital_cost().value() >= 0.0, "{}", record.id);
            assert!(record.marginal_cost().value() >= 0.0, "{}", record.id);
        }
    }

    #[rstest]
    #[case(0.01, 1.0)]
    #[case(0.5, 5.0)]
    #[case(0.99, 100.0)]
    fn test_capital_cost_sign(#[case] discount_rate: f64, #[case] lifetime: f64) {
        let attributes = [
            (TechnologyAttribute::DiscountRate, discount_rate),
            (TechnologyAttribute::Lifetime, lifetime),
            (TechnologyAttribute::Investment, 1000.0),
        ]
        .into_iter()
        .collect();
        let record = TechnologyRecord::from_attributes("x".into(), &attributes).unwrap();
        assert!(record.capital_cost().value() > 0.0);
    }

    #[test]
    fn test_get_fallback() {
        let mut table = TechnologyTable::default();
        assert_model_error!(table.get("nuclear"), ModelError::Configuration(_));

        let attributes = [(TechnologyAttribute::Vom, 3000.0)].into_iter().collect();
        table.add_fallback("load shedding".into(), &attributes).unwrap();
        let record = table.get("load shedding").unwrap();
        assert_approx_eq!(MoneyPerEnergy, record.marginal_cost(), MoneyPerEnergy(3000.0));
    }

    #[rstest]
    fn test_select(cost_cells: Vec<CostCell>) {
        let table = TechnologyTable::from_cells(cost_cells, &FuelInheritance::default_rules())
            .unwrap();
        let selected = table.select(["onwind", "OCGT", "nuclear"]);
        assert_eq!(selected.len(), 2);
        assert!(selected.contains("onwind"));
        assert!(!selected.contains("gas"));
    }
}
