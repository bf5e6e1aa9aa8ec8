//! PipelineWriter - terminal stage delivering to the sink

use std::sync::Arc;

use contracts::{OutputStream, PipelineError, ReadingSet, ReadingSink};
use observability::metrics::record_sink_write;
use tracing::{debug, instrument, trace, warn};

use crate::debugger::PipelineDebugger;
use crate::element::{ElementRef, PipelineElement, Terminal};

/// Terminal element; never has a successor
pub struct PipelineWriter {
    name: String,
    sink: Arc<dyn ReadingSink>,
    debugger: Arc<PipelineDebugger>,
    ready: bool,
    shut_down: bool,
    written: u64,
    discarded: u64,
}

impl PipelineWriter {
    pub fn new(
        name: impl Into<String>,
        sink: Arc<dyn ReadingSink>,
        debugger: Arc<PipelineDebugger>,
    ) -> Self {
        Self {
            name: name.into(),
            sink,
            debugger,
            ready: false,
            shut_down: false,
            written: 0,
            discarded: 0,
        }
    }

    /// Writer over the terminal's sink and debugger
    pub fn for_terminal(name: impl Into<String>, terminal: &Terminal) -> Self {
        Self::new(name, terminal.sink.clone(), terminal.debugger.clone())
    }

    /// Sets accepted by the sink
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Sets discarded while the debugger isolated the pipeline
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl PipelineElement for PipelineWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_next(&mut self, next: Option<ElementRef>) {
        if next.is_some() {
            debug!(writer = %self.name, "writer is terminal, successor ignored");
        }
    }

    fn next(&self) -> Option<ElementRef> {
        None
    }

    fn setup(&mut self, _terminal: &Terminal) -> Result<(), PipelineError> {
        Ok(())
    }

    /// The writer delivers to its own sink; `output` is not used
    fn init(&mut self, _output: OutputStream) -> Result<(), PipelineError> {
        self.ready = true;
        self.shut_down = false;
        Ok(())
    }

    fn ingest(&mut self, set: ReadingSet) -> Result<(), PipelineError> {
        if !self.ready {
            return Err(PipelineError::NotInitialized {
                element: self.name.clone(),
            });
        }
        if self.debugger.is_isolated() {
            self.discarded += 1;
            trace!(writer = %self.name, readings = set.count(), "isolated, set discarded");
            return Ok(());
        }

        let readings = set.count();
        let result = self.sink.write(set);
        record_sink_write(self.sink.name(), result.is_ok());
        match result {
            Ok(()) => {
                self.written += 1;
                trace!(writer = %self.name, readings, "set delivered");
                Ok(())
            }
            Err(e) => Err(PipelineError::SinkWriteFailed {
                sink: self.sink.name().to_string(),
                message: e.to_string(),
            }),
        }
    }

    #[instrument(name = "writer_shutdown", skip(self), fields(writer = %self.name))]
    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if self.ready {
            if let Err(e) = self.sink.flush() {
                warn!(writer = %self.name, error = %e, "sink flush failed");
            }
        }
        self.ready = false;
        debug!(
            writer = %self.name,
            written = self.written,
            discarded = self.discarded,
            "writer shut down"
        );
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}
