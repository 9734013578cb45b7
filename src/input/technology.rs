//! Code for reading the technology cost table.
//!
//! The cost table is a long-format CSV with one row per `(technology, parameter)` pair and
//! `value` and `unit` columns. Any further columns (e.g. `source`) are ignored.
use super::{input_err_msg, read_csv};
use crate::error::ModelError;
use crate::model::{CostParameters, ModelParameters};
use crate::technology::{AttributeMap, CostCell, TechnologyAttribute, TechnologyTable};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::info;
use std::path::Path;

/// Read the technology cost table for a model.
///
/// If `costs.technologies` is non-empty, the table is restricted to the listed technologies plus
/// any others the model references.
pub fn read_technology_table(
    model_dir: &Path,
    parameters: &ModelParameters,
) -> Result<TechnologyTable> {
    let file_path = model_dir.join(&parameters.costs.file);
    let cells: Vec<CostCell> = read_csv(&file_path)?;
    let table = build_technology_table(cells, &parameters.costs)
        .with_context(|| input_err_msg(&file_path))?;

    let costs = &parameters.costs;
    if costs.technologies.is_empty() {
        return Ok(table);
    }

    let referenced = parameters.referenced_technologies();
    let selected: Vec<&str> = costs
        .technologies
        .iter()
        .map(String::as_str)
        .chain(referenced.iter().map(String::as_str))
        .collect();
    let filtered = table.select(selected);
    info!(
        "Selected {} of {} technologies from cost table",
        filtered.len(),
        table.len()
    );

    Ok(filtered)
}

fn build_technology_table(cells: Vec<CostCell>, costs: &CostParameters) -> Result<TechnologyTable> {
    let mut table = TechnologyTable::from_cells(cells, &costs.inherit)?;
    for (id, attributes) in &costs.fallback {
        let attributes = parse_attributes(attributes)
            .with_context(|| format!("Invalid fallback for technology {id}"))?;
        table.add_fallback(id.as_str().into(), &attributes)?;
    }

    Ok(table)
}

fn parse_attributes(raw: &IndexMap<String, f64>) -> Result<AttributeMap> {
    raw.iter()
        .map(|(name, value)| -> Result<(TechnologyAttribute, f64)> {
            let attr = TechnologyAttribute::parse(name).ok_or_else(|| {
                ModelError::Configuration(format!("Unknown technology attribute '{name}'"))
            })?;
            Ok((attr, *value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_model_error, cost_cells};
    use crate::units::MoneyPerEnergy;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_read_cost_cells_extra_columns() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("costs.csv");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(
                file,
                "technology,parameter,value,unit,source\n\
                onwind,investment,1100,EUR/kW,somewhere\n\
                onwind,FOM,1.2,%/year,somewhere"
            )
            .unwrap();
        }

        let cells: Vec<CostCell> = read_csv(&file_path).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].unit, "EUR/kW");
    }

    #[rstest]
    fn test_build_with_fallback(cost_cells: Vec<CostCell>) {
        let costs = CostParameters {
            fallback: [(
                "load shedding".to_string(),
                [("VOM".to_string(), 3000.0)].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
            ..CostParameters::default()
        };
        let table = build_technology_table(cost_cells, &costs).unwrap();
        assert_approx_eq!(
            MoneyPerEnergy,
            table.get("load shedding").unwrap().marginal_cost(),
            MoneyPerEnergy(3000.0)
        );
    }

    #[rstest]
    fn test_build_bad_fallback(cost_cells: Vec<CostCell>) {
        let costs = CostParameters {
            fallback: [(
                "load shedding".to_string(),
                [("colour".to_string(), 1.0)].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
            ..CostParameters::default()
        };
        assert_model_error!(
            build_technology_table(cost_cells, &costs),
            ModelError::Configuration(_)
        );
    }
}
