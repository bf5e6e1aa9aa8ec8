//! # Integration Tests
//!
//! Cross-crate end-to-end tests.
//!
//! Covers:
//! - service configuration -> management categories -> built pipeline
//! - built-in filters, branches and the debugger tap working together
//! - failure paths: build atomicity, init failure, rejected reconfiguration

#[cfg(test)]
mod harness {
    use std::sync::Arc;

    use contracts::{ConfigCategory, ConfigItem, PluginType, ReadingSet, PIPELINE_ITEM};
    use pipeline::mock::CollectingSink;
    use pipeline::{
        FilterPipeline, InMemoryManagementClient, InMemoryPluginStore, PipelineContext,
        PipelineDebugger, PluginRegistry,
    };

    pub const SERVICE: &str = "svc";

    /// One service wired to in-memory collaborators and a collecting sink
    pub struct Harness {
        pub management: Arc<InMemoryManagementClient>,
        pub storage: Arc<InMemoryPluginStore>,
        pub sink: Arc<CollectingSink>,
        pub tap: Arc<PipelineDebugger>,
        pub registry: PluginRegistry,
        pub pipeline: FilterPipeline,
    }

    impl Harness {
        /// `stages` is the `pipeline` array; `filters` maps instance -> plugin
        pub fn new(stages: serde_json::Value, filters: &[(&str, &str)]) -> Self {
            let management = Arc::new(InMemoryManagementClient::new());
            let definition = serde_json::json!({ "pipeline": stages }).to_string();
            management.insert_category(ConfigCategory::new(SERVICE, "").with_item(
                PIPELINE_ITEM,
                ConfigItem::new("Filter pipeline", "JSON", "{}").with_value(definition),
            ));
            for (name, plugin) in filters {
                management.insert_category(
                    ConfigCategory::new(contracts::filter_category_name(SERVICE, name), "")
                        .with_item("plugin", ConfigItem::new("", "string", *plugin).with_value(*plugin)),
                );
            }

            let storage = Arc::new(InMemoryPluginStore::new());
            let tap = Arc::new(PipelineDebugger::new());
            let mut registry = PluginRegistry::new();
            filters::register_builtin(&mut registry, tap.clone());

            let context = PipelineContext::new(SERVICE, management.clone(), storage.clone());
            Self {
                management,
                storage,
                sink: Arc::new(CollectingSink::new("collect")),
                tap,
                registry,
                pipeline: FilterPipeline::new(context),
            }
        }

        /// Set one configured item of filter instance `filter`
        pub fn set_item(&self, filter: &str, item: &str, value: &str) {
            self.management
                .update_item(&contracts::filter_category_name(SERVICE, filter), item, value)
                .unwrap();
        }

        pub fn register_scripted(&mut self, name: &str, plugin: pipeline::mock::ScriptedPlugin) {
            let plugin = std::sync::Mutex::new(Some(plugin));
            let fallback = name.to_string();
            self.registry.register(name, PluginType::Filter, move || {
                let scripted = plugin.lock().unwrap().take();
                Box::new(scripted.unwrap_or_else(|| pipeline::mock::ScriptedPlugin::new(&fallback)))
            });
        }

        pub fn build(&mut self) -> Result<(), contracts::PipelineError> {
            self.pipeline
                .build(SERVICE, &self.registry, self.sink.clone())
        }

        pub fn ingest(&self, set: ReadingSet) -> Result<(), contracts::PipelineError> {
            self.pipeline.ingest(set)
        }

        /// Stop everything; branch workers are joined before this returns
        pub fn cleanup(&mut self) {
            self.pipeline.cleanup_filters(SERVICE);
        }
    }
}

#[cfg(test)]
mod scenario_tests {
    use std::sync::Arc;

    use contracts::{
        ConfigCategory, ConfigItem, Datapoint, DatapointValue, PipelineError, Reading, ReadingSet,
    };
    use pipeline::mock::{reading_set, PluginCalls, ScriptedPlugin};
    use pipeline::{FetchMode, ReadingSetCircularBuffer};
    use serde_json::json;

    use crate::harness::{Harness, SERVICE};

    fn assets(set: &ReadingSet) -> Vec<&str> {
        set.readings().iter().map(Reading::asset_name).collect()
    }

    /// Scenario 1: passthrough filter then writer
    #[test]
    fn test_passthrough_chain_delivers_in_order() {
        let mut h = Harness::new(json!(["pass1"]), &[("pass1", "passthrough")]);
        h.build().unwrap();

        let input = ReadingSet::new(vec![
            Reading::single("a", Datapoint::new("v", 1_i64)),
            Reading::single("b", Datapoint::new("v", 2_i64)),
            Reading::single("c", Datapoint::new("v", 3_i64)),
        ]);
        h.ingest(input).unwrap();

        let sets = h.sink.sets();
        assert_eq!(sets.len(), 1);
        assert_eq!(assets(&sets[0]), vec!["a", "b", "c"]);
    }

    /// Scenario 2: branch holding a debug tap
    #[test]
    fn test_branch_debug_tap_captures_after_drain() {
        let mut h = Harness::new(json!([["tap1"]]), &[("tap1", "debug_tap")]);
        h.build().unwrap();

        h.ingest(reading_set("pump", 2)).unwrap();
        h.cleanup();

        // Original on the primary chain, the copy through the branch writer
        assert_eq!(h.sink.set_count(), 2);
        assert_eq!(h.tap.fetch(FetchMode::All).len(), 1);
        assert_eq!(h.tap.fetch(FetchMode::All)[0].reading_count(), 2);
    }

    /// Scenario 3: overwrite-oldest circular buffer
    #[test]
    fn test_circular_buffer_keeps_latest() {
        let mut buffer = ReadingSetCircularBuffer::new(3);
        for asset in ["A", "B", "C", "D"] {
            buffer.insert(&reading_set(asset, 1));
        }

        let kept: Vec<String> = buffer
            .extract(true)
            .iter()
            .map(|set| set.readings()[0].asset_name().to_string())
            .collect();
        assert_eq!(kept, vec!["B", "C", "D"]);
    }

    /// Scenario 4: a plugin rejecting init aborts the build
    #[test]
    fn test_init_failure_aborts_build() {
        let mut h = Harness::new(
            json!(["broken", "after"]),
            &[("broken", "broken"), ("after", "after")],
        );
        let broken_calls = Arc::new(PluginCalls::default());
        let after_calls = Arc::new(PluginCalls::default());
        h.register_scripted(
            "broken",
            ScriptedPlugin::new("broken")
                .failing_init()
                .with_calls(broken_calls.clone()),
        );
        h.register_scripted(
            "after",
            ScriptedPlugin::new("after").with_calls(after_calls.clone()),
        );

        let err = h.build().unwrap_err();
        assert!(matches!(err, PipelineError::InitFailed { .. }), "{err:?}");
        assert!(err.is_build_failure());
        assert!(!h.pipeline.is_ready());
        assert!(h.pipeline.elements().is_empty());

        assert!(matches!(
            h.ingest(reading_set("pump", 1)),
            Err(PipelineError::NotInitialized { .. })
        ));
        assert_eq!(PluginCalls::count(&broken_calls.ingest_calls), 0);
        assert_eq!(PluginCalls::count(&after_calls.ingest_calls), 0);
        assert_eq!(h.sink.set_count(), 0);
    }

    /// Scenario 5: rejected live change keeps the previous configuration
    #[test]
    fn test_invalid_reconfigure_keeps_previous_config() {
        let mut h = Harness::new(json!(["scale1"]), &[("scale1", "scale")]);
        h.set_item("scale1", "factor", "2.0");
        h.build().unwrap();

        let category = contracts::filter_category_name(SERVICE, "scale1");
        let payload = ConfigCategory::new(&category, "")
            .with_item("factor", ConfigItem::new("", "float", "1.0").with_value("abc"))
            .to_json()
            .unwrap();
        let err = h.pipeline.config_changed(&category, &payload).unwrap_err();
        assert!(matches!(err, PipelineError::ReconfigureFailed { .. }));

        for _ in 0..2 {
            h.ingest(ReadingSet::new(vec![Reading::single(
                "pump",
                Datapoint::new("v", 3.0),
            )]))
            .unwrap();
        }

        for reading in h.sink.readings() {
            assert_eq!(reading.datapoint("v").unwrap().value, DatapointValue::Float(6.0));
        }
        assert_eq!(h.sink.set_count(), 2);
    }
}

#[cfg(test)]
mod property_tests {
    use contracts::{DatapointValue, PipelineError, Reading};
    use pipeline::mock::reading_set;
    use serde_json::json;

    use crate::harness::{Harness, SERVICE};

    #[test]
    fn test_order_preserved_through_filters() {
        let mut h = Harness::new(
            json!(["p1", "s1", "m1"]),
            &[("p1", "passthrough"), ("s1", "scale"), ("m1", "metadata")],
        );
        h.set_item("m1", "metadata", r#"{"site": "north"}"#);
        h.build().unwrap();

        h.ingest(reading_set("pump", 50)).unwrap();

        let readings = h.sink.readings();
        assert_eq!(readings.len(), 50);
        for (idx, reading) in readings.iter().enumerate() {
            let seq = reading.datapoint("seq").and_then(|dp| dp.value.as_f64());
            assert_eq!(seq, Some(idx as f64));
            assert!(reading.datapoint("site").is_some());
        }
    }

    #[test]
    fn test_branch_mutation_not_visible_on_primary() {
        let mut h = Harness::new(json!([["m1"]]), &[("m1", "metadata")]);
        h.set_item("m1", "metadata", r#"{"site": "north"}"#);
        h.build().unwrap();

        h.ingest(reading_set("pump", 3)).unwrap();
        h.cleanup();

        let sets = h.sink.sets();
        assert_eq!(sets.len(), 2);
        let (tagged, plain): (Vec<_>, Vec<_>) = sets
            .iter()
            .partition(|set| set.readings()[0].datapoint("site").is_some());
        assert_eq!(tagged.len(), 1);
        assert_eq!(plain.len(), 1);

        for reading in plain[0].readings() {
            assert_eq!(reading.datapoints().len(), 1);
        }
        for reading in tagged[0].readings() {
            assert_eq!(
                reading.datapoint("site").map(|dp| &dp.value),
                Some(&DatapointValue::String("north".into()))
            );
        }
    }

    #[test]
    fn test_branch_inside_branch_delivers_after_cleanup() {
        let mut h = Harness::new(
            json!(["p1", ["m1", ["tap1"]], "p2"]),
            &[
                ("p1", "passthrough"),
                ("m1", "metadata"),
                ("tap1", "debug_tap"),
                ("p2", "passthrough"),
            ],
        );
        h.set_item("m1", "metadata", r#"{"site": "north"}"#);
        h.build().unwrap();

        h.ingest(reading_set("pump", 2)).unwrap();
        h.cleanup();

        // primary, outer branch and inner branch writers
        let sets = h.sink.sets();
        assert_eq!(sets.len(), 3);
        let tagged = sets
            .iter()
            .filter(|set| set.readings()[0].datapoint("site").is_some())
            .count();
        assert_eq!(tagged, 2);

        // the inner copy is taken after m1 tagged the outer one
        let captured = h.tap.fetch(pipeline::FetchMode::All);
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].reading_count(), 2);
    }

    #[test]
    fn test_load_is_atomic() {
        let mut h = Harness::new(
            json!(["f1", "f2", "f3", "f4", "f5"]),
            &[
                ("f1", "passthrough"),
                ("f2", "passthrough"),
                ("f3", "missing_plugin"),
                ("f4", "passthrough"),
                ("f5", "passthrough"),
            ],
        );

        let err = h.build().unwrap_err();
        assert!(
            matches!(err, PipelineError::FilterLoadFailed { ref filter, .. } if filter == "f3"),
            "{err:?}"
        );
        assert!(h.pipeline.elements().is_empty());
        assert!(h.pipeline.first_filter_element().is_none());
        assert!(h.ingest(reading_set("pump", 1)).is_err());
        assert_eq!(h.sink.set_count(), 0);
    }

    #[test]
    fn test_double_cleanup_unregisters_once() {
        let mut h = Harness::new(json!(["d1"]), &[("d1", "delta")]);
        h.build().unwrap();

        let category = contracts::filter_category_name(SERVICE, "d1");
        assert_eq!(h.management.interest_count(&category), 1);

        h.ingest(reading_set("pump", 2)).unwrap();
        h.cleanup();
        h.cleanup();

        assert_eq!(h.management.interest_count(&category), 0);
        // Delta state saved exactly once under <category><plugin>
        assert_eq!(h.storage.keys(), vec![format!("{category}delta")]);
    }

    #[test]
    fn test_sink_failure_leaves_chain_usable() {
        let mut h = Harness::new(json!(["p1"]), &[("p1", "passthrough")]);
        h.build().unwrap();

        h.sink.fail_writes(true);
        let err = h.ingest(reading_set("pump", 1)).unwrap_err();
        assert!(matches!(err, PipelineError::SinkWriteFailed { .. }));
        assert!(err.is_runtime_failure());

        h.sink.fail_writes(false);
        h.ingest(reading_set("pump", 1)).unwrap();
        assert_eq!(h.sink.set_count(), 1);
    }

    #[test]
    fn test_persisted_delta_state_survives_rebuild() {
        let mut h = Harness::new(json!(["d1"]), &[("d1", "delta")]);
        h.build().unwrap();
        h.ingest(reading_set("pump", 1)).unwrap();
        h.cleanup();
        assert_eq!(h.sink.set_count(), 1);

        // Same value again after a rebuild: suppressed by the restored state
        h.build().unwrap();
        h.ingest(reading_set("pump", 1)).unwrap();
        assert_eq!(h.sink.set_count(), 1);

        let changed = vec![Reading::single(
            "pump",
            contracts::Datapoint::new("seq", 42_i64),
        )];
        h.ingest(changed.into()).unwrap();
        assert_eq!(h.sink.set_count(), 2);
    }
}

#[cfg(test)]
mod config_tests {
    use std::io::Write;
    use std::sync::Arc;

    use config_loader::ConfigLoader;
    use contracts::ReadingSink;
    use pipeline::{
        FilterPipeline, InMemoryManagementClient, InMemoryPluginStore, PipelineContext,
        PipelineDebugger, PluginRegistry,
    };

    const SERVICE_TOML: &str = r#"
pipeline = ["scale1", ["meta1"]]

[service]
name = "plant"

[[filters]]
name = "scale1"
plugin = "scale"
[filters.config]
factor = "10"

[[filters]]
name = "meta1"
plugin = "metadata"
[filters.config]
metadata = '{"line": "A"}'

[sink]
name = "out"
sink_type = "file"
"#;

    /// Config file -> categories -> pipeline -> file sink
    #[test]
    fn test_service_file_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            "{SERVICE_TOML}[sink.params]\nbase_path = '{}'\n",
            dir.path().display()
        )
        .unwrap();

        let blueprint = ConfigLoader::load_from_path(file.path()).unwrap();
        let management = Arc::new(InMemoryManagementClient::new());
        management.insert_category(blueprint.service_category());
        for filter in &blueprint.filters {
            management.insert_category(blueprint.filter_category(filter));
        }

        let mut registry = PluginRegistry::new();
        filters::register_builtin(&mut registry, Arc::new(PipelineDebugger::new()));
        let sink = sinks::create_sink(&blueprint.sink).unwrap();
        let context = PipelineContext::new(
            &blueprint.service.name,
            management.clone(),
            Arc::new(InMemoryPluginStore::new()),
        );
        let mut pipeline = FilterPipeline::new(context).with_branch_config(blueprint.branch.clone());
        pipeline
            .build(&blueprint.service.name, &registry, sink.clone())
            .unwrap();
        assert_eq!(
            pipeline.category_names(),
            vec!["plant_meta1", "plant_scale1"]
        );

        pipeline
            .ingest(pipeline::mock::reading_set("press", 3))
            .unwrap();
        pipeline.cleanup_filters(&blueprint.service.name);
        sink.flush().unwrap();

        let content = std::fs::read_to_string(dir.path().join("readings.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 6);
        assert_eq!(content.matches("\"A\"").count(), 3);
        assert_eq!(sink.snapshot().write_count, 2);
    }
}
