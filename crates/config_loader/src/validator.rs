//! Blueprint validation
//!
//! Rules:
//! - declarative field rules (`validator` derives on the blueprint types)
//! - filter instance names unique
//! - every pipeline stage names a declared filter
//! - each filter instance used at most once in the pipeline
//! - no empty branch
//! - file sink has somewhere to write
//! - source frequency is a number inside `SOURCE_FREQUENCY_RANGE_HZ`

use std::collections::HashSet;

use contracts::{
    ContractError, ServiceBlueprint, SinkType, StageDefinition, SOURCE_FREQUENCY_RANGE_HZ,
};
use validator::Validate;

/// Validate a ServiceBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_filter_names(blueprint)?;
    validate_pipeline(blueprint)?;
    validate_sink(blueprint)?;
    validate_source(blueprint)?;
    Ok(())
}

fn validate_fields(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    blueprint
        .validate()
        .map_err(|e| ContractError::config_validation("blueprint", e.to_string()))
}

/// Filter instance names must be unique
fn validate_filter_names(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for filter in &blueprint.filters {
        if !seen.insert(filter.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("filters[name={}]", filter.name),
                "duplicate filter name",
            ));
        }
    }
    Ok(())
}

fn validate_pipeline(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    let declared: HashSet<_> = blueprint.filters.iter().map(|f| f.name.as_str()).collect();
    let mut used = HashSet::new();
    validate_stages(&blueprint.pipeline, "pipeline", &declared, &mut used)
}

fn validate_stages<'a>(
    stages: &'a [StageDefinition],
    path: &str,
    declared: &HashSet<&str>,
    used: &mut HashSet<&'a str>,
) -> Result<(), ContractError> {
    for (idx, stage) in stages.iter().enumerate() {
        let field = format!("{path}[{idx}]");
        match stage {
            StageDefinition::Filter(name) => {
                if !declared.contains(name.as_str()) {
                    return Err(ContractError::config_validation(
                        field,
                        format!("filter '{name}' is not declared in [[filters]]"),
                    ));
                }
                if !used.insert(name.as_str()) {
                    return Err(ContractError::config_validation(
                        field,
                        format!("filter '{name}' appears more than once"),
                    ));
                }
            }
            StageDefinition::Branch(children) => {
                if children.is_empty() {
                    return Err(ContractError::config_validation(
                        field,
                        "branch cannot be empty",
                    ));
                }
                validate_stages(children, &field, declared, used)?;
            }
        }
    }
    Ok(())
}

fn validate_sink(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    let sink = &blueprint.sink;
    if sink.sink_type == SinkType::File
        && sink
            .params
            .get("base_path")
            .is_some_and(|path| path.trim().is_empty())
    {
        return Err(ContractError::config_validation(
            "sink.params.base_path",
            "base_path cannot be empty",
        ));
    }
    Ok(())
}

/// `range` rules let NaN through
fn validate_source(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    if blueprint.source.period().is_none() {
        return Err(ContractError::config_validation(
            "source.frequency_hz",
            format!(
                "must be between {} and {} Hz, got {}",
                SOURCE_FREQUENCY_RANGE_HZ.start(),
                SOURCE_FREQUENCY_RANGE_HZ.end(),
                blueprint.source.frequency_hz
            ),
        ));
    }
    Ok(())
}
