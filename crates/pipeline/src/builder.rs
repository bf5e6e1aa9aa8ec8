//! FilterPipeline - builds and owns one configured element chain
//!
//! The stage list is read from the service category (item `filter`, JSON
//! `{"pipeline": [...]}`); a nested array is a branch. Building is atomic:
//! when any stage fails to load, set up or init, every element created so far
//! is shut down and nothing is left wired to the sink.

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{
    filter_category_name, BranchConfig, ContractError, PipelineError, PluginLoader, ReadingSet,
    ReadingSink, StageDefinition, PIPELINE_ITEM,
};
use observability::metrics::record_readings_ingested;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::branch::PipelineBranch;
use crate::debugger::{DebuggerAction, PipelineDebugger};
use crate::element::{element_ref, forward_to, lock_element, ElementRef, PipelineContext, Terminal};
use crate::filter::PipelineFilter;
use crate::metrics::{BranchMetrics, BranchMetricsSnapshot};
use crate::writer::PipelineWriter;

#[derive(Debug, Default, Deserialize)]
struct PipelineDefinition {
    #[serde(default)]
    pipeline: Vec<StageDefinition>,
}

pub struct FilterPipeline {
    context: Arc<PipelineContext>,
    branch_config: BranchConfig,
    debugger: Arc<PipelineDebugger>,
    elements: Vec<ElementRef>,
    writer: Option<ElementRef>,
    /// Category name -> owning element, branch children included
    categories: HashMap<String, ElementRef>,
    branches: Vec<(String, Arc<BranchMetrics>)>,
    branch_seq: usize,
    ready: bool,
}

impl FilterPipeline {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self {
            context,
            branch_config: BranchConfig::default(),
            debugger: Arc::new(PipelineDebugger::new()),
            elements: Vec::new(),
            writer: None,
            categories: HashMap::new(),
            branches: Vec::new(),
            branch_seq: 0,
            ready: false,
        }
    }

    /// Queueing used by branches created on the next `load`
    pub fn with_branch_config(mut self, config: BranchConfig) -> Self {
        self.branch_config = config;
        self
    }

    /// Tap at the pipeline entry
    pub fn debugger(&self) -> Arc<PipelineDebugger> {
        self.debugger.clone()
    }

    pub fn service_name(&self) -> &str {
        &self.context.service_name
    }

    /// Top-level elements in chain order (the writer excluded)
    pub fn elements(&self) -> &[ElementRef] {
        &self.elements
    }

    /// Entry of the chain; `None` for an empty pipeline
    pub fn first_filter_element(&self) -> Option<ElementRef> {
        self.elements.first().cloned()
    }

    /// Categories the pipeline listens to, sorted
    pub fn category_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.categories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn branch_metrics(&self) -> Vec<(String, BranchMetricsSnapshot)> {
        self.branches
            .iter()
            .map(|(name, metrics)| (name.clone(), metrics.snapshot()))
            .collect()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
            && self.elements.iter().all(|e| lock_element(e).is_ready())
            && self
                .writer
                .as_ref()
                .is_some_and(|w| lock_element(w).is_ready())
    }

    /// Load and wrap every configured stage, in order.
    ///
    /// Returns the number of top-level elements. A missing category or item
    /// means an empty pipeline.
    #[instrument(name = "pipeline_load", skip(self, loader), fields(service = %self.context.service_name))]
    pub fn load(
        &mut self,
        category_name: &str,
        loader: &dyn PluginLoader,
    ) -> Result<usize, PipelineError> {
        if !self.elements.is_empty() || self.writer.is_some() {
            self.cleanup_filters(category_name);
        }

        let stages = self.read_definition(category_name)?;
        if stages.is_empty() {
            info!(category = %category_name, "no filters configured, pass-through pipeline");
            return Ok(0);
        }

        match self.load_stages(&stages, loader) {
            Ok(elements) => {
                self.elements = elements;
                info!(
                    category = %category_name,
                    elements = self.elements.len(),
                    filters = StageDefinition::filter_names(&stages).len(),
                    "pipeline loaded"
                );
                Ok(self.elements.len())
            }
            Err(e) => {
                error!(category = %category_name, error = %e, "pipeline load failed");
                self.branches.clear();
                Err(e)
            }
        }
    }

    fn read_definition(&self, category_name: &str) -> Result<Vec<StageDefinition>, PipelineError> {
        let category = match self.context.management.get_category(category_name) {
            Ok(category) => category,
            Err(ContractError::CategoryNotFound { .. }) => {
                debug!(category = %category_name, "service category not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(PipelineError::setup_failed(category_name, e.to_string())),
        };
        let Some(json) = category.value(PIPELINE_ITEM).filter(|v| !v.trim().is_empty()) else {
            return Ok(Vec::new());
        };
        let definition: PipelineDefinition = serde_json::from_str(json).map_err(|e| {
            PipelineError::setup_failed(category_name, format!("pipeline definition: {e}"))
        })?;
        Ok(definition.pipeline)
    }

    /// Build one level of stages; on failure the ones already built are shut down
    fn load_stages(
        &mut self,
        stages: &[StageDefinition],
        loader: &dyn PluginLoader,
    ) -> Result<Vec<ElementRef>, PipelineError> {
        let mut built: Vec<ElementRef> = Vec::with_capacity(stages.len());
        for stage in stages {
            let element = match stage {
                StageDefinition::Filter(name) => self.load_filter(name, loader),
                StageDefinition::Branch(children) => self.load_branch(children, loader),
            };
            match element {
                Ok(element) => built.push(element),
                Err(e) => {
                    for element in &built {
                        lock_element(element).shutdown();
                    }
                    return Err(e);
                }
            }
        }
        Ok(built)
    }

    fn load_filter(&self, name: &str, loader: &dyn PluginLoader) -> Result<ElementRef, PipelineError> {
        let plugin_name = self.plugin_name_for(name);
        let filter = PipelineFilter::load(name, &plugin_name, loader, self.context.clone())
            .map_err(|e| PipelineError::filter_load_failed(name, e))?;
        Ok(element_ref(filter))
    }

    fn load_branch(
        &mut self,
        children: &[StageDefinition],
        loader: &dyn PluginLoader,
    ) -> Result<ElementRef, PipelineError> {
        let name = format!("branch{}", self.branch_seq);
        self.branch_seq += 1;
        let children = self.load_stages(children, loader)?;
        let branch = PipelineBranch::new(
            &name,
            children,
            self.branch_config.clone(),
            self.context.clone(),
        );
        self.branches.push((name, branch.metrics()));
        Ok(element_ref(branch))
    }

    /// Plugin of filter instance `filter`: its category's `plugin` item, or the instance name
    fn plugin_name_for(&self, filter: &str) -> String {
        let category = filter_category_name(&self.context.service_name, filter);
        self.context
            .management
            .get_category(&category)
            .ok()
            .and_then(|c| c.value("plugin").map(str::to_string))
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| filter.to_string())
    }

    /// Link the loaded elements to a writer on `sink`, then set up and
    /// init each one in chain order.
    #[instrument(name = "pipeline_setup", skip(self, sink), fields(service = %self.context.service_name, sink = %sink.name()))]
    pub fn setup_filters_pipeline(&mut self, sink: Arc<dyn ReadingSink>) -> Result<(), PipelineError> {
        if self.writer.is_some() {
            warn!("pipeline already set up, cleanup_filters must run first");
            return Err(PipelineError::setup_failed(
                &self.context.service_name,
                "pipeline already set up",
            ));
        }
        let terminal = Terminal {
            sink,
            debugger: self.debugger.clone(),
        };
        let writer = element_ref(PipelineWriter::for_terminal(
            format!("{}_writer", self.context.service_name),
            &terminal,
        ));

        for (idx, element) in self.elements.iter().enumerate() {
            let next = self.elements.get(idx + 1).cloned().unwrap_or_else(|| writer.clone());
            lock_element(element).set_next(Some(next));
        }

        if let Err(e) = self.setup_and_init(&terminal, &writer) {
            error!(error = %e, "pipeline setup failed, tearing down");
            for element in &self.elements {
                lock_element(element).shutdown();
            }
            lock_element(&writer).shutdown();
            self.elements.clear();
            self.branches.clear();
            return Err(e);
        }

        self.categories.clear();
        index_categories(&self.elements, &mut self.categories);
        self.writer = Some(writer);
        self.ready = true;
        info!(
            elements = self.elements.len(),
            categories = self.categories.len(),
            "pipeline ready"
        );
        Ok(())
    }

    fn setup_and_init(&self, terminal: &Terminal, writer: &ElementRef) -> Result<(), PipelineError> {
        for (idx, element) in self.elements.iter().enumerate() {
            let next = self.elements.get(idx + 1).cloned().unwrap_or_else(|| writer.clone());
            let mut element = lock_element(element);
            element.setup(terminal)?;
            element.init(forward_to(next))?;
        }
        let mut writer = lock_element(writer);
        writer.setup(terminal)?;
        writer.init(terminal.sink_output())
    }

    /// `load` then `setup_filters_pipeline`
    pub fn build(
        &mut self,
        category_name: &str,
        loader: &dyn PluginLoader,
        sink: Arc<dyn ReadingSink>,
    ) -> Result<(), PipelineError> {
        self.load(category_name, loader)?;
        self.setup_filters_pipeline(sink)
    }

    /// Push one set through the debugger tap and the chain
    pub fn ingest(&self, set: ReadingSet) -> Result<(), PipelineError> {
        if !self.ready {
            return Err(PipelineError::NotInitialized {
                element: self.context.service_name.clone(),
            });
        }
        record_readings_ingested(&self.context.service_name, set.count());
        if self.debugger.process(&set) == DebuggerAction::Suspend {
            trace!(readings = set.count(), "debugger suspended, set held");
            return Ok(());
        }
        self.deliver(set)
    }

    fn deliver(&self, set: ReadingSet) -> Result<(), PipelineError> {
        let head = self.elements.first().or(self.writer.as_ref()).ok_or_else(|| {
            PipelineError::NotInitialized {
                element: self.context.service_name.clone(),
            }
        })?;
        lock_element(head).ingest(set)
    }

    /// Re-inject the debugger's buffered snapshots, bypassing the tap.
    ///
    /// Returns how many sets were delivered.
    #[instrument(name = "pipeline_replay", skip(self), fields(service = %self.context.service_name))]
    pub fn replay(&self) -> Result<usize, PipelineError> {
        if !self.ready {
            return Err(PipelineError::NotInitialized {
                element: self.context.service_name.clone(),
            });
        }
        let sets = self.debugger.replay();
        let count = sets.len();
        for set in sets {
            self.deliver(set)?;
        }
        info!(sets = count, "debugger buffer replayed");
        Ok(count)
    }

    /// Route a category change notification to the element owning it
    #[instrument(name = "pipeline_config_changed", skip(self, config), fields(service = %self.context.service_name))]
    pub fn config_changed(&self, category: &str, config: &str) -> Result<(), PipelineError> {
        let Some(element) = self.categories.get(category) else {
            debug!(category, "change for unknown category ignored");
            return Ok(());
        };
        let result = lock_element(element).reconfigure(config);
        if let Err(e) = &result {
            warn!(category, error = %e, "reconfiguration rejected");
        }
        result
    }

    /// Shut down every element (interest unregistered, state persisted) and
    /// forget the chain. Safe to call repeatedly.
    #[instrument(name = "pipeline_cleanup", skip(self), fields(service = %self.context.service_name))]
    pub fn cleanup_filters(&mut self, category_name: &str) {
        self.ready = false;
        for element in &self.elements {
            lock_element(element).shutdown();
        }
        if let Some(writer) = self.writer.take() {
            lock_element(&writer).shutdown();
        }
        let released = self.elements.len();
        self.elements.clear();
        self.categories.clear();
        self.branches.clear();
        self.branch_seq = 0;
        debug!(category = %category_name, released, "pipeline cleaned up");
    }
}

impl Drop for FilterPipeline {
    fn drop(&mut self) {
        if !self.elements.is_empty() || self.writer.is_some() {
            let service = self.context.service_name.clone();
            self.cleanup_filters(&service);
        }
    }
}

fn index_categories(elements: &[ElementRef], index: &mut HashMap<String, ElementRef>) {
    for element in elements {
        let children = {
            let guard = lock_element(element);
            if let Some(category) = guard.category_name() {
                index.insert(category.to_string(), element.clone());
            }
            guard.children()
        };
        index_categories(&children, index);
    }
}
