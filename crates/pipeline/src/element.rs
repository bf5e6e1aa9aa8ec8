//! Pipeline element interface
//!
//! Elements form a singly linked chain. Each one is shared behind a mutex so
//! the predecessor's forwarding closure, the branch worker and the owning
//! pipeline can all reach it; within one chain the calls are strictly
//! sequential, so the locks are uncontended on the primary path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{
    ManagementClient, OutputStream, PipelineError, PluginDataStore, ReadingSet, ReadingSink,
};

use crate::debugger::PipelineDebugger;

/// Shared handle to an element
pub type ElementRef = Arc<Mutex<dyn PipelineElement>>;

/// Wrap an element into a shared handle
pub fn element_ref<E: PipelineElement + 'static>(element: E) -> ElementRef {
    Arc::new(Mutex::new(element))
}

/// Lock an element; a panic in another holder does not make the chain unusable
pub fn lock_element(element: &ElementRef) -> MutexGuard<'_, dyn PipelineElement + 'static> {
    element.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Forwarding entry point that feeds `next`
pub fn forward_to(next: ElementRef) -> OutputStream {
    Arc::new(move |set: ReadingSet| lock_element(&next).ingest(set))
}

/// Collaborators shared (not owned) by every element of a pipeline
pub struct PipelineContext {
    pub service_name: String,
    pub management: Arc<dyn ManagementClient>,
    pub storage: Arc<dyn PluginDataStore>,
}

impl PipelineContext {
    pub fn new(
        service_name: impl Into<String>,
        management: Arc<dyn ManagementClient>,
        storage: Arc<dyn PluginDataStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            service_name: service_name.into(),
            management,
            storage,
        })
    }
}

/// Where a chain ends: the terminal sink and the debugger deciding isolation
#[derive(Clone)]
pub struct Terminal {
    pub sink: Arc<dyn ReadingSink>,
    pub debugger: Arc<PipelineDebugger>,
}

impl Terminal {
    /// Output that hands sets straight to the sink
    pub fn sink_output(&self) -> OutputStream {
        let sink = self.sink.clone();
        Arc::new(move |set: ReadingSet| {
            sink.write(set).map_err(|e| PipelineError::SinkWriteFailed {
                sink: sink.name().to_string(),
                message: e.to_string(),
            })
        })
    }
}

/// One pipeline stage
pub trait PipelineElement: Send {
    fn name(&self) -> &str;

    fn set_next(&mut self, next: Option<ElementRef>);

    fn next(&self) -> Option<ElementRef>;

    fn is_filter(&self) -> bool {
        false
    }

    fn is_branch(&self) -> bool {
        false
    }

    /// Configuration category owned by this element, if any
    fn category_name(&self) -> Option<&str> {
        None
    }

    /// Elements of an owned sub-pipeline
    fn children(&self) -> Vec<ElementRef> {
        Vec::new()
    }

    /// Register configuration; safe to call again
    fn setup(&mut self, terminal: &Terminal) -> Result<(), PipelineError>;

    /// Bind the forwarding target. Called once per build, before any ingest.
    fn init(&mut self, output: OutputStream) -> Result<(), PipelineError>;

    fn ingest(&mut self, set: ReadingSet) -> Result<(), PipelineError>;

    /// Apply a live configuration change (category item map JSON)
    fn reconfigure(&mut self, _config: &str) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Release everything; idempotent and safe after a failed init
    fn shutdown(&mut self);

    fn is_ready(&self) -> bool;
}
