//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    service: String,
    filter_count: usize,
    stage_count: usize,
    branch_count: usize,
    sink: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    service: blueprint.service.name.clone(),
                    filter_count: blueprint.filters.len(),
                    stage_count: blueprint.pipeline.len(),
                    branch_count: count_branches(&blueprint.pipeline),
                    sink: format!("{} ({:?})", blueprint.sink.name, blueprint.sink.sink_type),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn count_branches(stages: &[contracts::StageDefinition]) -> usize {
    stages
        .iter()
        .map(|stage| match stage {
            contracts::StageDefinition::Filter(_) => 0,
            contracts::StageDefinition::Branch(children) => 1 + count_branches(children),
        })
        .sum()
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &contracts::ServiceBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.pipeline.is_empty() {
        warnings.push("pipeline is empty - readings go straight to the sink".to_string());
    }

    // Declared but never referenced
    let used = contracts::StageDefinition::filter_names(&blueprint.pipeline);
    for filter in &blueprint.filters {
        if !used.contains(&filter.name.as_str()) {
            warnings.push(format!(
                "Filter '{}' is declared but not used in the pipeline",
                filter.name
            ));
        }
    }

    if blueprint.debugger.enabled && blueprint.debugger.buffer_size == 1 {
        warnings.push("debugger.buffer_size is 1 - only the latest set is kept".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Service: {}", summary.service);
            println!("  Filters: {}", summary.filter_count);
            println!("  Stages: {}", summary.stage_count);
            println!("  Branches: {}", summary.branch_count);
            println!("  Sink: {}", summary.sink);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    const SERVICE: &str = r#"
pipeline = ["scale1"]

[service]
name = "sensors"

[[filters]]
name = "scale1"
plugin = "scale"

[[filters]]
name = "unused"
plugin = "passthrough"

[sink]
name = "out"
sink_type = "log"
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_with_warning() {
        let file = write_config(SERVICE);
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        });

        assert!(result.valid);
        let summary = result.summary.unwrap();
        assert_eq!(summary.service, "sensors");
        assert_eq!(summary.filter_count, 2);
        assert_eq!(summary.branch_count, 0);
        assert_eq!(result.warnings.unwrap().len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(&ValidateArgs {
            config: PathBuf::from("/nonexistent/service.toml"),
            json: false,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_undeclared_stage_is_invalid() {
        let file = write_config(&SERVICE.replace(r#"pipeline = ["scale1"]"#, r#"pipeline = ["nope"]"#));
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        });
        assert!(!result.valid);
    }

    #[test]
    fn test_count_branches() {
        use contracts::StageDefinition::{Branch, Filter};
        let stages = vec![
            Filter("a".into()),
            Branch(vec![Filter("b".into()), Branch(vec![Filter("c".into())])]),
        ];
        assert_eq!(count_branches(&stages), 2);
    }
}
