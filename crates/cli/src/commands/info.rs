//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::{ServiceBlueprint, StageDefinition};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    service: String,
    pipeline: Vec<StageDefinition>,
    filters: Vec<FilterInfo>,
    branch: BranchInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    debugger: Option<DebuggerInfo>,
    sink: SinkInfo,
}

#[derive(Serialize)]
struct FilterInfo {
    name: String,
    plugin: String,
    category: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    config: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct BranchInfo {
    queue_capacity: usize,
    drop_policy: String,
}

#[derive(Serialize)]
struct DebuggerInfo {
    buffer_size: usize,
    granularity: String,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &ServiceBlueprint, args: &InfoArgs) -> ConfigInfo {
    let filters = blueprint
        .filters
        .iter()
        .map(|f| FilterInfo {
            name: f.name.clone(),
            plugin: f.plugin.clone(),
            category: contracts::filter_category_name(&blueprint.service.name, &f.name),
            config: if args.filters {
                f.config.clone()
            } else {
                BTreeMap::new()
            },
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        service: blueprint.service.name.clone(),
        pipeline: blueprint.pipeline.clone(),
        filters,
        branch: BranchInfo {
            queue_capacity: blueprint.branch.queue_capacity,
            drop_policy: format!("{:?}", blueprint.branch.drop_policy),
        },
        debugger: blueprint.debugger.enabled.then(|| DebuggerInfo {
            buffer_size: blueprint.debugger.buffer_size,
            granularity: format!("{:?}", blueprint.debugger.granularity),
        }),
        sink: SinkInfo {
            name: blueprint.sink.name.clone(),
            sink_type: format!("{:?}", blueprint.sink.sink_type),
        },
    }
}

fn print_config_info(blueprint: &ServiceBlueprint, args: &InfoArgs) {
    println!("\n=== Service: {} ===\n", blueprint.service.name);
    if !blueprint.service.description.is_empty() {
        println!("{}\n", blueprint.service.description);
    }

    println!("Pipeline:");
    print_stages(&blueprint.pipeline, 1);

    println!("\nFilters ({}):", blueprint.filters.len());
    for filter in &blueprint.filters {
        println!("  {} -> {}", filter.name, filter.plugin);
        if args.filters {
            for (key, value) in &filter.config {
                println!("      {} = {}", key, value);
            }
        }
    }

    println!(
        "\nBranch queue: {} ({:?})",
        blueprint.branch.queue_capacity, blueprint.branch.drop_policy
    );
    if blueprint.debugger.enabled {
        println!(
            "Debugger: {} entries ({:?})",
            blueprint.debugger.buffer_size, blueprint.debugger.granularity
        );
    }
    println!(
        "Sink: {} ({:?})",
        blueprint.sink.name, blueprint.sink.sink_type
    );
    println!();
}

fn print_stages(stages: &[StageDefinition], depth: usize) {
    let indent = "  ".repeat(depth);
    if stages.is_empty() {
        println!("{indent}(empty)");
    }
    for stage in stages {
        match stage {
            StageDefinition::Filter(name) => println!("{indent}- {name}"),
            StageDefinition::Branch(children) => {
                println!("{indent}+ branch");
                print_stages(children, depth + 1);
            }
        }
    }
}
