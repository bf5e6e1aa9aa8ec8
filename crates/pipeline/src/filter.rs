//! PipelineFilter - stage wrapping one loaded filter plugin
//!
//! Lifecycle:
//! `Constructed -> ConfigurationPending -> Configured -> Initialized -> Running`,
//! `Running <-> Reconfiguring`, then `ShuttingDown -> Shutdown`.

use std::sync::Arc;

use contracts::{
    filter_category_name, ConfigCategory, FilterPlugin, OutputStream, PipelineError, PluginError,
    PluginLoader, PluginType, ReadingSet,
};
use observability::metrics::record_filter_failure;
use tracing::{debug, info, instrument, trace, warn};

use crate::element::{ElementRef, PipelineContext, PipelineElement, Terminal};

/// Filter stage state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Constructed,
    ConfigurationPending,
    Configured,
    Initialized,
    Running,
    Reconfiguring,
    ShuttingDown,
    Shutdown,
}

impl FilterState {
    fn accepts_data(self) -> bool {
        matches!(self, Self::Initialized | Self::Running)
    }

    /// The plugin's init succeeded and it has not been released yet
    fn plugin_live(self) -> bool {
        matches!(self, Self::Initialized | Self::Running | Self::Reconfiguring)
    }
}

pub struct PipelineFilter {
    name: String,
    plugin_name: String,
    plugin: Option<Box<dyn FilterPlugin>>,
    context: Arc<PipelineContext>,
    category_name: String,
    config: Option<ConfigCategory>,
    state: FilterState,
    next: Option<ElementRef>,
    interest_registered: bool,
}

impl PipelineFilter {
    /// Resolve `plugin_name` through the loader and wrap it as stage `name`
    #[instrument(name = "filter_load", skip(loader, context), fields(filter = %name, plugin = %plugin_name))]
    pub fn load(
        name: &str,
        plugin_name: &str,
        loader: &dyn PluginLoader,
        context: Arc<PipelineContext>,
    ) -> Result<Self, PipelineError> {
        let plugin = loader
            .load_plugin(plugin_name, PluginType::Filter)
            .map_err(|source| PipelineError::PluginLoadFailed {
                plugin: plugin_name.to_string(),
                source,
            })?;
        debug!(filter = %name, version = %plugin.info().version, "plugin loaded");
        Ok(Self::with_plugin(name, plugin, context))
    }

    /// Wrap an already instantiated plugin
    pub fn with_plugin(
        name: &str,
        plugin: Box<dyn FilterPlugin>,
        context: Arc<PipelineContext>,
    ) -> Self {
        Self {
            name: name.to_string(),
            plugin_name: plugin.info().name.clone(),
            category_name: filter_category_name(&context.service_name, name),
            plugin: Some(plugin),
            context,
            config: None,
            state: FilterState::Constructed,
            next: None,
            interest_registered: false,
        }
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Current configuration, once setup has run
    pub fn config(&self) -> Option<&ConfigCategory> {
        self.config.as_ref()
    }

    /// Storage key of the plugin's persisted state
    pub fn persist_key(&self) -> String {
        format!("{}{}", self.category_name, self.plugin_name)
    }

    fn persists_data(&self) -> bool {
        self.plugin
            .as_ref()
            .is_some_and(|p| p.info().persist_data)
    }

    fn setup_failed(&self, message: impl std::fmt::Display) -> PipelineError {
        PipelineError::setup_failed(&self.name, message.to_string())
    }

    fn init_failed(&self, message: impl std::fmt::Display) -> PipelineError {
        PipelineError::init_failed(&self.name, message.to_string())
    }

    fn load_persisted_state(&mut self) -> Result<(), PipelineError> {
        let key = self.persist_key();
        let stored = self
            .context
            .storage
            .load_data(&key)
            .map_err(|e| self.init_failed(e))?;
        let Some(state) = stored else {
            debug!(filter = %self.name, key = %key, "no persisted state");
            return Ok(());
        };
        let plugin = self
            .plugin
            .as_mut()
            .ok_or_else(|| PipelineError::init_failed(&self.name, "plugin released"))?;
        plugin
            .start(&state)
            .map_err(|e| PipelineError::init_failed(&self.name, e.to_string()))?;
        debug!(filter = %self.name, key = %key, bytes = state.len(), "persisted state restored");
        Ok(())
    }
}

impl PipelineElement for PipelineFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_next(&mut self, next: Option<ElementRef>) {
        self.next = next;
    }

    fn next(&self) -> Option<ElementRef> {
        self.next.clone()
    }

    fn is_filter(&self) -> bool {
        true
    }

    fn category_name(&self) -> Option<&str> {
        Some(&self.category_name)
    }

    #[instrument(name = "filter_setup", skip(self, _terminal), fields(filter = %self.name, category = %self.category_name))]
    fn setup(&mut self, _terminal: &Terminal) -> Result<(), PipelineError> {
        let plugin = self
            .plugin
            .as_ref()
            .ok_or_else(|| PipelineError::setup_failed(&self.name, "plugin released"))?;
        let live = self.state.plugin_live();
        if !live {
            self.state = FilterState::ConfigurationPending;
        }

        let defaults = plugin
            .info()
            .default_category(&self.category_name)
            .map_err(|e| self.setup_failed(e))?;
        let management = &self.context.management;
        let stored = management
            .create_category(&defaults, true)
            .map_err(|e| self.setup_failed(e))?;
        management
            .add_child_categories(
                &self.context.service_name,
                std::slice::from_ref(&self.category_name),
            )
            .map_err(|e| self.setup_failed(e))?;
        if !self.interest_registered {
            management
                .register_interest(&self.category_name)
                .map_err(|e| self.setup_failed(e))?;
            self.interest_registered = true;
        }

        if live {
            // Registrations refreshed; the running plugin keeps its config.
            debug!(filter = %self.name, state = ?self.state, "filter already live");
            return Ok(());
        }
        self.config = Some(stored);
        self.state = FilterState::Configured;
        debug!(filter = %self.name, "filter configured");
        Ok(())
    }

    #[instrument(name = "filter_init", skip(self, output), fields(filter = %self.name))]
    fn init(&mut self, output: OutputStream) -> Result<(), PipelineError> {
        if self.state != FilterState::Configured {
            return Err(self.init_failed(format!("cannot init in state {:?}", self.state)));
        }
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| PipelineError::init_failed(&self.name, "no configuration"))?;
        let plugin = self
            .plugin
            .as_mut()
            .ok_or_else(|| PipelineError::init_failed(&self.name, "plugin released"))?;
        plugin
            .init(config, output)
            .map_err(|e| PipelineError::init_failed(&self.name, e.to_string()))?;
        // From here on the plugin holds resources and must be shut down.
        self.state = FilterState::Initialized;

        if self.persists_data() {
            self.load_persisted_state()?;
        }
        info!(filter = %self.name, plugin = %self.plugin_name, "filter initialized");
        Ok(())
    }

    fn ingest(&mut self, set: ReadingSet) -> Result<(), PipelineError> {
        if !self.state.accepts_data() {
            return Err(PipelineError::NotInitialized {
                element: self.name.clone(),
            });
        }
        let Some(plugin) = self.plugin.as_mut() else {
            return Err(PipelineError::NotInitialized {
                element: self.name.clone(),
            });
        };
        self.state = FilterState::Running;
        trace!(filter = %self.name, readings = set.count(), "filter ingest");

        plugin.ingest(set).map_err(|e| match e {
            PluginError::Downstream(inner) => inner,
            other => {
                record_filter_failure(&self.name);
                PipelineError::PluginIngestFailed {
                    filter: self.name.clone(),
                    message: other.to_string(),
                }
            }
        })
    }

    #[instrument(name = "filter_reconfigure", skip(self, config), fields(filter = %self.name))]
    fn reconfigure(&mut self, config: &str) -> Result<(), PipelineError> {
        let previous_state = self.state;
        if !previous_state.plugin_live() {
            return Err(PipelineError::reconfigure_failed(
                &self.name,
                format!("not running (state {previous_state:?})"),
            ));
        }
        let update = ConfigCategory::from_json(&self.category_name, config)
            .map_err(|e| PipelineError::reconfigure_failed(&self.name, e.to_string()))?;

        let mut candidate = self.config.clone().unwrap_or_default();
        candidate.items.extend(update.items);

        let plugin = self
            .plugin
            .as_mut()
            .ok_or_else(|| PipelineError::reconfigure_failed(&self.name, "plugin released"))?;
        self.state = FilterState::Reconfiguring;
        let result = plugin.reconfigure(&candidate);
        self.state = previous_state;

        match result {
            Ok(()) => {
                self.config = Some(candidate);
                info!(filter = %self.name, "filter reconfigured");
                Ok(())
            }
            Err(e) => {
                warn!(filter = %self.name, error = %e, "reconfigure rejected, keeping previous configuration");
                Err(PipelineError::reconfigure_failed(&self.name, e.to_string()))
            }
        }
    }

    #[instrument(name = "filter_shutdown", skip(self), fields(filter = %self.name))]
    fn shutdown(&mut self) {
        if self.state == FilterState::Shutdown {
            return;
        }
        let was_live = self.state.plugin_live();
        self.state = FilterState::ShuttingDown;

        if self.interest_registered {
            if let Err(e) = self
                .context
                .management
                .unregister_interest(&self.category_name)
            {
                warn!(filter = %self.name, error = %e, "failed to unregister interest");
            }
            self.interest_registered = false;
        }

        if let Some(mut plugin) = self.plugin.take() {
            if was_live {
                if plugin.info().persist_data {
                    let data = plugin.shutdown_save_data();
                    let key = self.persist_key();
                    if let Err(e) = self.context.storage.persist_data(&key, &data) {
                        warn!(filter = %self.name, key = %key, error = %e, "failed to persist plugin state");
                    }
                } else {
                    plugin.shutdown();
                }
            }
        }

        self.state = FilterState::Shutdown;
        debug!(filter = %self.name, "filter shut down");
    }

    fn is_ready(&self) -> bool {
        self.state.plugin_live()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::PipelineDebugger;
    use crate::memory::{InMemoryManagementClient, InMemoryPluginStore};
    use crate::mock::{reading_set, CollectingSink, PluginCalls, ScriptedPlugin};
    use contracts::{ManagementClient, PluginDataStore};
    use std::sync::Mutex;

    struct Fixture {
        management: Arc<InMemoryManagementClient>,
        storage: Arc<InMemoryPluginStore>,
        context: Arc<PipelineContext>,
        terminal: Terminal,
    }

    fn fixture() -> Fixture {
        let management = Arc::new(InMemoryManagementClient::new());
        let storage = Arc::new(InMemoryPluginStore::new());
        let context = PipelineContext::new("svc", management.clone(), storage.clone());
        let terminal = Terminal {
            sink: Arc::new(CollectingSink::new("out")),
            debugger: Arc::new(PipelineDebugger::new()),
        };
        Fixture {
            management,
            storage,
            context,
            terminal,
        }
    }

    fn collecting_output() -> (OutputStream, Arc<Mutex<Vec<ReadingSet>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let output: OutputStream = Arc::new(move |set| {
            sink.lock().unwrap().push(set);
            Ok(())
        });
        (output, seen)
    }

    fn filter_with(f: &Fixture, plugin: ScriptedPlugin) -> PipelineFilter {
        PipelineFilter::with_plugin("f1", Box::new(plugin), f.context.clone())
    }

    #[test]
    fn test_setup_creates_child_category_and_interest() {
        let f = fixture();
        let mut filter = filter_with(&f, ScriptedPlugin::new("scripted"));
        filter.setup(&f.terminal).unwrap();
        filter.setup(&f.terminal).unwrap();

        assert_eq!(filter.state(), FilterState::Configured);
        assert_eq!(filter.category_name(), Some("svc_f1"));
        let stored = f.management.get_category("svc_f1").unwrap();
        assert_eq!(stored.value("mode"), Some("pass"));
        assert_eq!(f.management.children("svc"), vec!["svc_f1".to_string()]);
        assert_eq!(f.management.interest_count("svc_f1"), 1);
    }

    #[test]
    fn test_setup_keeps_configured_values() {
        let f = fixture();
        f.management.insert_category(
            ConfigCategory::new("svc_f1", "").with_item(
                "mode",
                contracts::ConfigItem::new("", "string", "tag").with_value("tag"),
            ),
        );
        let mut filter = filter_with(&f, ScriptedPlugin::new("scripted"));
        filter.setup(&f.terminal).unwrap();
        let (output, seen) = collecting_output();
        filter.init(output).unwrap();

        filter.ingest(reading_set("a", 1)).unwrap();
        let seen = seen.lock().unwrap();
        assert!(seen[0].readings()[0].datapoint("tag").is_some());
    }

    #[test]
    fn test_ingest_before_init() {
        let f = fixture();
        let mut filter = filter_with(&f, ScriptedPlugin::new("scripted"));
        let err = filter.ingest(reading_set("a", 1)).unwrap_err();
        assert!(matches!(err, PipelineError::NotInitialized { .. }));
    }

    #[test]
    fn test_init_failure() {
        let f = fixture();
        let mut filter = filter_with(&f, ScriptedPlugin::new("scripted").failing_init());
        filter.setup(&f.terminal).unwrap();
        let (output, _) = collecting_output();
        let err = filter.init(output).unwrap_err();
        assert!(matches!(err, PipelineError::InitFailed { .. }));
        assert!(!filter.is_ready());
    }

    #[test]
    fn test_setup_on_live_filter_does_not_reinit_plugin() {
        let f = fixture();
        let calls = Arc::new(PluginCalls::default());
        let mut filter = filter_with(&f, ScriptedPlugin::new("scripted").with_calls(calls.clone()));
        filter.setup(&f.terminal).unwrap();
        let (output, seen) = collecting_output();
        filter.init(output.clone()).unwrap();
        filter.ingest(reading_set("a", 1)).unwrap();

        filter.setup(&f.terminal).unwrap();
        assert_eq!(filter.state(), FilterState::Running);
        assert!(matches!(filter.init(output), Err(PipelineError::InitFailed { .. })));
        assert_eq!(PluginCalls::count(&calls.init_calls), 1);

        filter.ingest(reading_set("b", 1)).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(f.management.interest_count("svc_f1"), 1);
    }

    #[test]
    fn test_plugin_failure_surfaces_as_ingest_failed() {
        let f = fixture();
        let mut filter = filter_with(&f, ScriptedPlugin::new("scripted").failing_ingest());
        filter.setup(&f.terminal).unwrap();
        let (output, _) = collecting_output();
        filter.init(output).unwrap();

        let err = filter.ingest(reading_set("a", 1)).unwrap_err();
        assert!(matches!(err, PipelineError::PluginIngestFailed { ref filter, .. } if filter == "f1"));
    }

    #[test]
    fn test_downstream_failure_passes_through() {
        let f = fixture();
        let mut filter = filter_with(&f, ScriptedPlugin::new("scripted"));
        filter.setup(&f.terminal).unwrap();
        let output: OutputStream = Arc::new(|_| {
            Err(PipelineError::SinkWriteFailed {
                sink: "out".into(),
                message: "full".into(),
            })
        });
        filter.init(output).unwrap();

        let err = filter.ingest(reading_set("a", 1)).unwrap_err();
        assert!(matches!(err, PipelineError::SinkWriteFailed { .. }));
    }

    #[test]
    fn test_reconfigure_invalid_keeps_previous() {
        let f = fixture();
        let mut filter = filter_with(&f, ScriptedPlugin::new("scripted"));
        filter.setup(&f.terminal).unwrap();
        let (output, seen) = collecting_output();
        filter.init(output).unwrap();

        let err = filter
            .reconfigure(r#"{"mode": {"type": "string", "default": "pass", "value": "bogus"}}"#)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ReconfigureFailed { .. }));
        assert_eq!(filter.config().and_then(|c| c.value("mode")), Some("pass"));

        filter.ingest(reading_set("a", 1)).unwrap();
        assert_eq!(filter.state(), FilterState::Running);
        assert!(seen.lock().unwrap()[0].readings()[0].datapoint("tag").is_none());

        filter
            .reconfigure(r#"{"mode": {"type": "string", "default": "pass", "value": "tag"}}"#)
            .unwrap();
        filter.ingest(reading_set("b", 1)).unwrap();
        assert!(seen.lock().unwrap()[1].readings()[0].datapoint("tag").is_some());
    }

    #[test]
    fn test_reconfigure_malformed_json() {
        let f = fixture();
        let mut filter = filter_with(&f, ScriptedPlugin::new("scripted"));
        filter.setup(&f.terminal).unwrap();
        let (output, _) = collecting_output();
        filter.init(output).unwrap();
        assert!(matches!(
            filter.reconfigure("{oops"),
            Err(PipelineError::ReconfigureFailed { .. })
        ));
        assert!(filter.is_ready());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let f = fixture();
        let calls = Arc::new(PluginCalls::default());
        let mut filter = filter_with(&f, ScriptedPlugin::new("scripted").with_calls(calls.clone()));
        filter.setup(&f.terminal).unwrap();
        let (output, _) = collecting_output();
        filter.init(output).unwrap();

        filter.shutdown();
        filter.shutdown();

        assert_eq!(PluginCalls::count(&calls.shutdown_calls), 1);
        assert_eq!(f.management.interest_count("svc_f1"), 0);
        assert_eq!(filter.state(), FilterState::Shutdown);
    }

    #[test]
    fn test_shutdown_after_failed_init_skips_plugin() {
        let f = fixture();
        let calls = Arc::new(PluginCalls::default());
        let mut filter = filter_with(
            &f,
            ScriptedPlugin::new("scripted")
                .failing_init()
                .with_calls(calls.clone()),
        );
        filter.setup(&f.terminal).unwrap();
        let (output, _) = collecting_output();
        assert!(filter.init(output).is_err());

        filter.shutdown();
        assert_eq!(PluginCalls::count(&calls.shutdown_calls), 0);
        assert_eq!(f.management.interest_count("svc_f1"), 0);
    }

    #[test]
    fn test_persisted_state_round_trip() {
        let f = fixture();
        f.storage.persist_data("svc_f1scripted", "ingested=7").unwrap();

        let calls = Arc::new(PluginCalls::default());
        let mut filter = filter_with(
            &f,
            ScriptedPlugin::new("scripted")
                .persisting()
                .with_calls(calls.clone()),
        );
        assert_eq!(filter.persist_key(), "svc_f1scripted");
        filter.setup(&f.terminal).unwrap();
        let (output, _) = collecting_output();
        filter.init(output).unwrap();
        assert_eq!(calls.started_with().as_deref(), Some("ingested=7"));

        filter.ingest(reading_set("a", 1)).unwrap();
        filter.shutdown();

        assert_eq!(PluginCalls::count(&calls.save_calls), 1);
        assert_eq!(PluginCalls::count(&calls.shutdown_calls), 0);
        assert_eq!(
            f.storage.load_data("svc_f1scripted").unwrap().as_deref(),
            Some("ingested=1")
        );
    }
}
