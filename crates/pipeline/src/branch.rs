//! PipelineBranch - fan-out stage
//!
//! `ingest` deep-copies the incoming set into a bounded queue and forwards the
//! original down the primary chain. One worker thread per branch drains the
//! queue into the branch's own sub-pipeline, which ends in its own writer on
//! the shared terminal sink.
//!
//! The producer never blocks: on a full queue the configured [`DropPolicy`]
//! discards either the oldest queued copy or the incoming one.

use std::sync::Arc;
use std::thread::JoinHandle;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{BranchConfig, DropPolicy, OutputStream, PipelineError, ReadingSet};
use observability::metrics::{record_branch_dropped, record_branch_enqueued, record_branch_queue_depth};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::element::{
    element_ref, forward_to, lock_element, ElementRef, PipelineContext, PipelineElement, Terminal,
};
use crate::metrics::BranchMetrics;
use crate::writer::PipelineWriter;

struct BranchQueue {
    tx: Sender<ReadingSet>,
    /// Producer-side handle, used only to evict the oldest entry
    rx: Receiver<ReadingSet>,
}

pub struct PipelineBranch {
    name: String,
    children: Vec<ElementRef>,
    writer: Option<ElementRef>,
    terminal: Option<Terminal>,
    config: BranchConfig,
    context: Arc<PipelineContext>,
    next: Option<ElementRef>,
    output: Option<OutputStream>,
    queue: Option<BranchQueue>,
    worker: Option<JoinHandle<()>>,
    metrics: Arc<BranchMetrics>,
    ready: bool,
    shut_down: bool,
}

impl PipelineBranch {
    pub fn new(
        name: impl Into<String>,
        children: Vec<ElementRef>,
        config: BranchConfig,
        context: Arc<PipelineContext>,
    ) -> Self {
        Self {
            name: name.into(),
            children,
            writer: None,
            terminal: None,
            config,
            context,
            next: None,
            output: None,
            queue: None,
            worker: None,
            metrics: Arc::new(BranchMetrics::new()),
            ready: false,
            shut_down: false,
        }
    }

    pub fn metrics(&self) -> Arc<BranchMetrics> {
        self.metrics.clone()
    }

    /// Entry point of the sub-pipeline
    fn head(&self) -> Option<ElementRef> {
        self.children.first().cloned().or_else(|| self.writer.clone())
    }

    fn enqueue(&self, queue: &BranchQueue, copy: ReadingSet) {
        match queue.tx.try_send(copy) {
            Ok(()) => self.record_enqueued(),
            Err(TrySendError::Full(copy)) => match self.config.drop_policy {
                DropPolicy::DropNewest => {
                    self.record_dropped();
                    warn!(branch = %self.name, "branch queue full, dropping incoming copy");
                }
                DropPolicy::DropOldest => {
                    if queue.rx.try_recv().is_ok() {
                        self.record_dropped();
                        warn!(branch = %self.name, "branch queue full, dropping oldest copy");
                    }
                    match queue.tx.try_send(copy) {
                        Ok(()) => self.record_enqueued(),
                        Err(_) => {
                            self.record_dropped();
                            warn!(branch = %self.name, "branch queue still full, dropping incoming copy");
                        }
                    }
                }
            },
            Err(TrySendError::Closed(_)) => {
                self.record_dropped();
                warn!(branch = %self.name, "branch queue closed, copy dropped");
            }
        }
        let depth = queue.tx.len();
        self.metrics.set_queue_len(depth);
        record_branch_queue_depth(&self.name, depth);
    }

    fn record_enqueued(&self) {
        self.metrics.inc_enqueued();
        record_branch_enqueued(&self.name);
    }

    fn record_dropped(&self) {
        self.metrics.inc_dropped();
        record_branch_dropped(&self.name);
    }

    fn spawn_worker(
        &self,
        rx: Receiver<ReadingSet>,
        head: ElementRef,
    ) -> Result<JoinHandle<()>, PipelineError> {
        let name = self.name.clone();
        let metrics = self.metrics.clone();
        std::thread::Builder::new()
            .name(format!("branch-{}", self.name))
            .spawn(move || run_worker(name, rx, head, metrics))
            .map_err(|e| PipelineError::init_failed(&self.name, format!("worker spawn: {e}")))
    }
}

/// Drain the queue into the sub-pipeline until it is closed and empty
#[instrument(name = "branch_worker", skip(rx, head, metrics), fields(branch = %name))]
fn run_worker(
    name: String,
    rx: Receiver<ReadingSet>,
    head: ElementRef,
    metrics: Arc<BranchMetrics>,
) {
    debug!(branch = %name, "branch worker started");
    while let Ok(set) = rx.recv_blocking() {
        metrics.set_queue_len(rx.len());
        let readings = set.count();
        match lock_element(&head).ingest(set) {
            Ok(()) => {
                metrics.inc_delivered();
                trace!(branch = %name, readings, "branch copy delivered");
            }
            Err(e) => {
                metrics.inc_failed();
                warn!(branch = %name, error = %e, "branch sub-pipeline rejected copy");
            }
        }
    }
    debug!(branch = %name, delivered = metrics.delivered(), "branch worker exiting");
}

impl PipelineElement for PipelineBranch {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_next(&mut self, next: Option<ElementRef>) {
        self.next = next;
    }

    fn next(&self) -> Option<ElementRef> {
        self.next.clone()
    }

    fn is_branch(&self) -> bool {
        true
    }

    fn children(&self) -> Vec<ElementRef> {
        self.children.clone()
    }

    #[instrument(name = "branch_setup", skip(self, terminal), fields(branch = %self.name, children = self.children.len()))]
    fn setup(&mut self, terminal: &Terminal) -> Result<(), PipelineError> {
        let writer = match &self.writer {
            Some(writer) => writer.clone(),
            None => {
                let writer = element_ref(PipelineWriter::for_terminal(
                    format!("{}_{}_writer", self.context.service_name, self.name),
                    terminal,
                ));
                self.writer = Some(writer.clone());
                writer
            }
        };

        for (idx, child) in self.children.iter().enumerate() {
            let next = self.children.get(idx + 1).cloned().unwrap_or_else(|| writer.clone());
            let mut child = lock_element(child);
            child.set_next(Some(next));
            child.setup(terminal)?;
        }
        lock_element(&writer).setup(terminal)?;
        self.terminal = Some(terminal.clone());
        Ok(())
    }

    #[instrument(name = "branch_init", skip(self, output), fields(branch = %self.name))]
    fn init(&mut self, output: OutputStream) -> Result<(), PipelineError> {
        if self.worker.is_some() {
            return Err(PipelineError::init_failed(&self.name, "branch worker already running"));
        }
        let (Some(terminal), Some(writer)) = (self.terminal.clone(), self.writer.clone()) else {
            return Err(PipelineError::init_failed(&self.name, "init before setup"));
        };

        for (idx, child) in self.children.iter().enumerate() {
            let next = self.children.get(idx + 1).cloned().unwrap_or_else(|| writer.clone());
            lock_element(child).init(forward_to(next))?;
        }
        lock_element(&writer).init(terminal.sink_output())?;

        let capacity = self.config.queue_capacity.max(1);
        let (tx, rx) = bounded(capacity);
        let head = self
            .head()
            .ok_or_else(|| PipelineError::init_failed(&self.name, "no sub-pipeline"))?;
        self.worker = Some(self.spawn_worker(rx.clone(), head)?);
        self.queue = Some(BranchQueue { tx, rx });
        self.output = Some(output);
        self.ready = true;
        info!(branch = %self.name, capacity, policy = ?self.config.drop_policy, "branch initialized");
        Ok(())
    }

    fn ingest(&mut self, set: ReadingSet) -> Result<(), PipelineError> {
        let (Some(queue), Some(output), true) = (&self.queue, &self.output, self.ready) else {
            return Err(PipelineError::NotInitialized {
                element: self.name.clone(),
            });
        };
        self.enqueue(queue, set.deep_copy());
        output(set)
    }

    #[instrument(name = "branch_shutdown", skip(self), fields(branch = %self.name))]
    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.ready = false;

        // Closing lets the worker drain what is queued, then exit.
        if let Some(queue) = self.queue.take() {
            queue.tx.close();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(branch = %self.name, "branch worker panicked");
            }
        }

        for child in &self.children {
            lock_element(child).shutdown();
        }
        if let Some(writer) = &self.writer {
            lock_element(writer).shutdown();
        }
        self.output = None;

        let snapshot = self.metrics.snapshot();
        debug!(
            branch = %self.name,
            enqueued = snapshot.enqueued,
            dropped = snapshot.dropped,
            delivered = snapshot.delivered,
            "branch shut down"
        );
    }

    fn is_ready(&self) -> bool {
        self.ready
            && self.children.iter().all(|c| lock_element(c).is_ready())
            && self
                .writer
                .as_ref()
                .is_some_and(|w| lock_element(w).is_ready())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::PipelineDebugger;
    use crate::filter::PipelineFilter;
    use crate::memory::{InMemoryManagementClient, InMemoryPluginStore};
    use crate::mock::{reading_set, CollectingSink, PluginCalls, ScriptedPlugin};
    use contracts::{ConfigCategory, ConfigItem};
    use std::sync::Mutex;

    struct Fixture {
        management: Arc<InMemoryManagementClient>,
        context: Arc<PipelineContext>,
        sink: Arc<CollectingSink>,
        terminal: Terminal,
    }

    fn fixture() -> Fixture {
        let management = Arc::new(InMemoryManagementClient::new());
        let context = PipelineContext::new(
            "svc",
            management.clone(),
            Arc::new(InMemoryPluginStore::new()),
        );
        let sink = Arc::new(CollectingSink::new("out"));
        let terminal = Terminal {
            sink: sink.clone(),
            debugger: Arc::new(PipelineDebugger::new()),
        };
        Fixture {
            management,
            context,
            sink,
            terminal,
        }
    }

    fn child(f: &Fixture, name: &str, plugin: ScriptedPlugin) -> ElementRef {
        element_ref(PipelineFilter::with_plugin(
            name,
            Box::new(plugin),
            f.context.clone(),
        ))
    }

    fn primary_output() -> (OutputStream, Arc<Mutex<Vec<ReadingSet>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let store = seen.clone();
        let output: OutputStream = Arc::new(move |set| {
            store.lock().unwrap().push(set);
            Ok(())
        });
        (output, seen)
    }

    fn config(capacity: usize, drop_policy: DropPolicy) -> BranchConfig {
        BranchConfig {
            queue_capacity: capacity,
            drop_policy,
        }
    }

    #[test]
    fn test_fan_out_and_drain_on_shutdown() {
        let f = fixture();
        let mut branch = PipelineBranch::new(
            "b0",
            vec![child(&f, "c1", ScriptedPlugin::new("scripted"))],
            config(16, DropPolicy::DropOldest),
            f.context.clone(),
        );
        branch.setup(&f.terminal).unwrap();
        let (output, primary) = primary_output();
        branch.init(output).unwrap();
        assert!(branch.is_ready());

        for i in 0..5 {
            branch.ingest(reading_set(&format!("a{i}"), 2)).unwrap();
        }
        branch.shutdown();

        assert_eq!(primary.lock().unwrap().len(), 5);
        let assets: Vec<_> = f
            .sink
            .sets()
            .iter()
            .map(|s| s.readings()[0].asset_name().to_string())
            .collect();
        assert_eq!(assets, vec!["a0", "a1", "a2", "a3", "a4"]);
        let snapshot = branch.metrics().snapshot();
        assert_eq!(snapshot.enqueued, 5);
        assert_eq!(snapshot.delivered, 5);
        assert_eq!(snapshot.dropped, 0);
    }

    #[test]
    fn test_branch_mutation_not_visible_on_primary() {
        let f = fixture();
        f.management.insert_category(
            ConfigCategory::new("svc_tagger", "")
                .with_item("mode", ConfigItem::new("", "string", "tag").with_value("tag")),
        );
        let mut branch = PipelineBranch::new(
            "b0",
            vec![child(&f, "tagger", ScriptedPlugin::new("scripted"))],
            config(4, DropPolicy::DropOldest),
            f.context.clone(),
        );
        branch.setup(&f.terminal).unwrap();
        let (output, primary) = primary_output();
        branch.init(output).unwrap();

        branch.ingest(reading_set("a", 3)).unwrap();
        branch.shutdown();

        let primary = primary.lock().unwrap();
        assert!(primary[0].readings().iter().all(|r| r.datapoint("tag").is_none()));
        let branched = f.sink.readings();
        assert_eq!(branched.len(), 3);
        assert!(branched.iter().all(|r| r.datapoint("tag").is_some()));
    }

    #[test]
    fn test_drop_newest_when_full() {
        let f = fixture();
        let branch = PipelineBranch::new("b0", vec![], config(2, DropPolicy::DropNewest), f.context.clone());
        let (tx, rx) = bounded(2);
        let queue = BranchQueue { tx, rx: rx.clone() };
        for asset in ["a", "b", "c"] {
            branch.enqueue(&queue, reading_set(asset, 1));
        }
        let kept: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|s| s.readings()[0].asset_name().to_string())
            .collect();
        assert_eq!(kept, vec!["a", "b"]);
        assert_eq!(branch.metrics().dropped(), 1);
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let f = fixture();
        let branch = PipelineBranch::new("b0", vec![], config(2, DropPolicy::DropOldest), f.context.clone());
        let (tx, rx) = bounded(2);
        let queue = BranchQueue { tx, rx: rx.clone() };
        for asset in ["a", "b", "c"] {
            branch.enqueue(&queue, reading_set(asset, 1));
        }
        let kept: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|s| s.readings()[0].asset_name().to_string())
            .collect();
        assert_eq!(kept, vec!["b", "c"]);
        let snapshot = branch.metrics().snapshot();
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.enqueued, 3);
    }

    #[test]
    fn test_child_setup_failure_aborts_branch() {
        let f = fixture();
        let mut branch = PipelineBranch::new(
            "b0",
            vec![child(&f, "c1", ScriptedPlugin::new("scripted").failing_init())],
            config(4, DropPolicy::DropOldest),
            f.context.clone(),
        );
        branch.setup(&f.terminal).unwrap();
        let (output, _) = primary_output();
        let err = branch.init(output).unwrap_err();
        assert!(matches!(err, PipelineError::InitFailed { ref element, .. } if element == "c1"));
        assert!(!branch.is_ready());
        assert!(matches!(
            branch.ingest(reading_set("a", 1)),
            Err(PipelineError::NotInitialized { .. })
        ));
        branch.shutdown();
        assert_eq!(f.management.interest_count("svc_c1"), 0);
    }

    #[test]
    fn test_shutdown_twice() {
        let f = fixture();
        let calls = Arc::new(PluginCalls::default());
        let mut branch = PipelineBranch::new(
            "b0",
            vec![child(&f, "c1", ScriptedPlugin::new("scripted").with_calls(calls.clone()))],
            config(4, DropPolicy::DropOldest),
            f.context.clone(),
        );
        branch.setup(&f.terminal).unwrap();
        let (output, _) = primary_output();
        branch.init(output).unwrap();

        branch.shutdown();
        branch.shutdown();
        assert_eq!(PluginCalls::count(&calls.shutdown_calls), 1);
        assert_eq!(f.sink.flush_count(), 1);
    }
}
