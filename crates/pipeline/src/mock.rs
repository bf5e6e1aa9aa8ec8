//! Mock collaborators
//!
//! Used by unit tests here and by the cross-crate tests; nothing in the
//! engine depends on them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use contracts::{
    ConfigCategory, ContractError, Datapoint, FilterPlugin, OutputStream, PluginError, PluginInfo,
    PluginType, Reading, ReadingSet, ReadingSink,
};

/// `n` readings of `asset`, datapoint `seq` counting from 0
pub fn reading_set(asset: &str, n: usize) -> ReadingSet {
    ReadingSet::new(
        (0..n)
            .map(|i| Reading::single(asset, Datapoint::new("seq", i as i64)))
            .collect(),
    )
}

/// Sink that keeps every set it accepts
#[derive(Debug, Default)]
pub struct CollectingSink {
    name: String,
    sets: Mutex<Vec<ReadingSet>>,
    fail: AtomicBool,
    flushes: AtomicUsize,
}

impl CollectingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Make every following write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sets(&self) -> Vec<ReadingSet> {
        self.sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_count(&self) -> usize {
        self.sets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// All readings received, in arrival order
    pub fn readings(&self) -> Vec<Reading> {
        self.sets().into_iter().flat_map(ReadingSet::into_readings).collect()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl ReadingSink for CollectingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, set: ReadingSet) -> Result<(), ContractError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ContractError::sink_write(&self.name, "rejected"));
        }
        self.sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(set);
        Ok(())
    }

    fn flush(&self) -> Result<(), ContractError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Call counters shared between a [`ScriptedPlugin`] and the test observing it
#[derive(Debug, Default)]
pub struct PluginCalls {
    pub init_calls: AtomicUsize,
    pub ingest_calls: AtomicUsize,
    pub reconfigure_calls: AtomicUsize,
    pub shutdown_calls: AtomicUsize,
    pub save_calls: AtomicUsize,
    pub started_with: Mutex<Option<String>>,
}

impl PluginCalls {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn started_with(&self) -> Option<String> {
        self.started_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Forwarding plugin whose failures are scripted.
///
/// Item `mode` accepts `pass` (forward unchanged) and `tag` (append a `tag`
/// datapoint naming the plugin); anything else is rejected.
pub struct ScriptedPlugin {
    info: PluginInfo,
    calls: Arc<PluginCalls>,
    fail_init: bool,
    fail_ingest: bool,
    tag: bool,
    output: Option<OutputStream>,
}

impl ScriptedPlugin {
    pub fn new(name: &str) -> Self {
        Self {
            info: PluginInfo {
                name: name.to_string(),
                version: "0.0.1".to_string(),
                plugin_type: PluginType::Filter,
                persist_data: false,
                default_config: r#"{"mode": {"description": "pass or tag", "type": "enumeration", "default": "pass"}}"#
                    .to_string(),
            },
            calls: Arc::new(PluginCalls::default()),
            fail_init: false,
            fail_ingest: false,
            tag: false,
            output: None,
        }
    }

    pub fn with_calls(mut self, calls: Arc<PluginCalls>) -> Self {
        self.calls = calls;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_ingest(mut self) -> Self {
        self.fail_ingest = true;
        self
    }

    pub fn persisting(mut self) -> Self {
        self.info.persist_data = true;
        self
    }

    fn apply(&mut self, config: &ConfigCategory) -> Result<(), PluginError> {
        match config.value("mode").unwrap_or("pass") {
            "pass" => self.tag = false,
            "tag" => self.tag = true,
            other => return Err(PluginError::invalid_config(format!("unknown mode '{other}'"))),
        }
        Ok(())
    }
}

impl FilterPlugin for ScriptedPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn init(&mut self, config: &ConfigCategory, output: OutputStream) -> Result<(), PluginError> {
        self.calls.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(PluginError::invalid_config("scripted init failure"));
        }
        self.apply(config)?;
        self.output = Some(output);
        Ok(())
    }

    fn start(&mut self, state: &str) -> Result<(), PluginError> {
        *self
            .calls
            .started_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(state.to_string());
        Ok(())
    }

    fn ingest(&mut self, mut set: ReadingSet) -> Result<(), PluginError> {
        self.calls.ingest_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ingest {
            return Err(PluginError::failed("scripted ingest failure"));
        }
        if self.tag {
            for reading in set.readings_mut() {
                reading.add_datapoint(Datapoint::new("tag", self.info.name.as_str()));
            }
        }
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| PluginError::failed("not initialised"))?;
        output(set)?;
        Ok(())
    }

    fn reconfigure(&mut self, config: &ConfigCategory) -> Result<(), PluginError> {
        self.calls.reconfigure_calls.fetch_add(1, Ordering::SeqCst);
        self.apply(config)
    }

    fn shutdown(&mut self) {
        self.calls.shutdown_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown_save_data(&mut self) -> String {
        self.calls.save_calls.fetch_add(1, Ordering::SeqCst);
        format!(
            "ingested={}",
            self.calls.ingest_calls.load(Ordering::SeqCst)
        )
    }
}
