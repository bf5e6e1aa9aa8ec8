//! Pipeline debugger tap
//!
//! Snapshots reading sets flowing past its tap point into a circular buffer.
//! The buffer has its own lock; flags and step credits are atomics, so
//! operator calls never wait on the data path and vice versa.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{DebugGranularity, Reading, ReadingSet};
use observability::metrics::record_debugger_capture;
use tracing::{debug, info};

use crate::buffer::{ReadingCircularBuffer, ReadingSetCircularBuffer};

/// What the tap asks the caller to do with the set it just saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerAction {
    /// Forward as usual
    NoAction,
    /// Hold: the set was captured but must not be forwarded
    Suspend,
}

/// Fetch mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Oldest unread entry, advancing the read cursor
    Single,
    /// Everything buffered, oldest first
    All,
}

/// Shared snapshot handed out by [`PipelineDebugger::fetch`]
#[derive(Debug, Clone)]
pub enum DebugSnapshot {
    Set(Arc<ReadingSet>),
    Reading(Arc<Reading>),
}

impl DebugSnapshot {
    pub fn reading_count(&self) -> usize {
        match self {
            Self::Set(set) => set.count(),
            Self::Reading(_) => 1,
        }
    }

    /// Readings in this snapshot, borrowed
    pub fn readings(&self) -> Vec<&Reading> {
        match self {
            Self::Set(set) => set.readings().iter().collect(),
            Self::Reading(reading) => vec![reading.as_ref()],
        }
    }
}

#[derive(Debug)]
enum DebugBuffer {
    Sets(ReadingSetCircularBuffer),
    Readings(ReadingCircularBuffer),
}

/// Debugger tap
#[derive(Debug, Default)]
pub struct PipelineDebugger {
    buffer: Mutex<Option<DebugBuffer>>,
    suspended: AtomicBool,
    isolated: AtomicBool,
    step_credits: AtomicUsize,
    captured: AtomicU64,
}

impl PipelineDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, Option<DebugBuffer>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a reading-set buffer of `size` entries, replacing any previous one
    pub fn attach(&self, size: usize) {
        self.attach_with(size, DebugGranularity::ReadingSet);
    }

    pub fn attach_with(&self, size: usize, granularity: DebugGranularity) {
        let buffer = match granularity {
            DebugGranularity::ReadingSet => DebugBuffer::Sets(ReadingSetCircularBuffer::new(size)),
            DebugGranularity::Reading => DebugBuffer::Readings(ReadingCircularBuffer::new(size)),
        };
        let replaced = self.lock_buffer().replace(buffer).is_some();
        info!(size, ?granularity, replaced, "debugger attached");
    }

    /// Drop the buffer and clear every flag
    pub fn detach(&self) {
        self.lock_buffer().take();
        self.suspended.store(false, Ordering::SeqCst);
        self.isolated.store(false, Ordering::SeqCst);
        self.step_credits.store(0, Ordering::SeqCst);
        info!("debugger detached");
    }

    pub fn is_attached(&self) -> bool {
        self.lock_buffer().is_some()
    }

    /// Capture a copy of `set`.
    ///
    /// A detached debugger captures nothing and never holds data back.
    pub fn process(&self, set: &ReadingSet) -> DebuggerAction {
        {
            let mut guard = self.lock_buffer();
            let Some(buffer) = guard.as_mut() else {
                return DebuggerAction::NoAction;
            };
            match buffer {
                DebugBuffer::Sets(b) => b.insert(set),
                DebugBuffer::Readings(b) => b.insert(set),
            }
        }
        self.captured.fetch_add(1, Ordering::Relaxed);
        record_debugger_capture(set.count());

        if !self.suspended.load(Ordering::SeqCst) {
            return DebuggerAction::NoAction;
        }
        let stepped = self
            .step_credits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stepped {
            DebuggerAction::NoAction
        } else {
            DebuggerAction::Suspend
        }
    }

    /// Pause forwarding at the tap; leaving suspension drops unused step credits
    pub fn suspend(&self, on: bool) {
        self.suspended.store(on, Ordering::SeqCst);
        if !on {
            self.step_credits.store(0, Ordering::SeqCst);
        }
        debug!(suspended = on, "debugger suspend toggled");
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Let data flow through the filters but keep it away from every writer
    pub fn isolate(&self, on: bool) {
        self.isolated.store(on, Ordering::SeqCst);
        debug!(isolated = on, "debugger isolate toggled");
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated.load(Ordering::SeqCst)
    }

    /// While suspended, let the next `n` sets through
    pub fn step(&self, n: usize) {
        self.step_credits.fetch_add(n, Ordering::SeqCst);
        debug!(n, "debugger step");
    }

    pub fn step_credits(&self) -> usize {
        self.step_credits.load(Ordering::SeqCst)
    }

    /// Number of sets captured since construction
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    /// Fresh copies of the buffered data, oldest first, ready to re-inject.
    ///
    /// Per-reading buffers come back as one set holding every buffered reading.
    pub fn replay(&self) -> Vec<ReadingSet> {
        let mut guard = self.lock_buffer();
        match guard.as_mut() {
            None => Vec::new(),
            Some(DebugBuffer::Sets(b)) => b.extract(true).iter().map(|s| s.deep_copy()).collect(),
            Some(DebugBuffer::Readings(b)) => {
                let readings: Vec<Reading> =
                    b.extract(true).iter().map(|r| r.deep_copy()).collect();
                if readings.is_empty() {
                    Vec::new()
                } else {
                    vec![ReadingSet::new(readings)]
                }
            }
        }
    }

    pub fn fetch(&self, mode: FetchMode) -> Vec<DebugSnapshot> {
        let all = mode == FetchMode::All;
        let mut guard = self.lock_buffer();
        match guard.as_mut() {
            None => Vec::new(),
            Some(DebugBuffer::Sets(b)) => {
                b.extract(all).into_iter().map(DebugSnapshot::Set).collect()
            }
            Some(DebugBuffer::Readings(b)) => b
                .extract(all)
                .into_iter()
                .map(DebugSnapshot::Reading)
                .collect(),
        }
    }
}
