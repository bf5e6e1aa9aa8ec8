//! Configuration parsing
//!
//! TOML (primary) and JSON.

use contracts::{ContractError, ServiceBlueprint};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<ServiceBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse_json(content: &str) -> Result<ServiceBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<ServiceBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DebugGranularity, DropPolicy, SinkType, StageDefinition};

    #[test]
    fn test_parse_toml_nested_pipeline() {
        let content = r#"
pipeline = ["scale1", ["meta1", ["tap"]], "delta1"]

[service]
name = "sensors"

[[filters]]
name = "scale1"
plugin = "scale"
[filters.config]
factor = "2.0"

[[filters]]
name = "meta1"
plugin = "metadata"

[[filters]]
name = "tap"
plugin = "debug_tap"

[[filters]]
name = "delta1"
plugin = "delta"

[branch]
queue_capacity = 8
drop_policy = "drop_newest"

[debugger]
enabled = true
granularity = "reading"

[sink]
name = "out"
sink_type = "log"
"#;
        let bp = parse_toml(content).unwrap();
        assert_eq!(bp.service.name, "sensors");
        assert_eq!(bp.filters.len(), 4);
        assert_eq!(bp.filters[0].config.get("factor").map(String::as_str), Some("2.0"));
        assert_eq!(
            bp.pipeline[1],
            StageDefinition::Branch(vec![
                StageDefinition::Filter("meta1".into()),
                StageDefinition::Branch(vec![StageDefinition::Filter("tap".into())]),
            ])
        );
        assert_eq!(bp.branch.queue_capacity, 8);
        assert_eq!(bp.branch.drop_policy, DropPolicy::DropNewest);
        assert!(bp.debugger.enabled);
        assert_eq!(bp.debugger.buffer_size, 20);
        assert_eq!(bp.debugger.granularity, DebugGranularity::Reading);
        assert_eq!(bp.sink.sink_type, SinkType::Log);
        assert_eq!(bp.source.readings_per_batch, 5);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "service": { "name": "north" },
            "filters": [{ "name": "p", "plugin": "passthrough" }],
            "pipeline": ["p"],
            "sink": { "name": "log", "sink_type": "log" }
        }"#;
        let bp = parse_json(content).unwrap();
        assert_eq!(bp.pipeline, vec![StageDefinition::Filter("p".into())]);
        assert_eq!(bp.branch.drop_policy, DropPolicy::DropOldest);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let err = parse_toml("invalid toml [[[").unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
