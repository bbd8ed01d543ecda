//! Scheduling and termination detection
//!
//! Decides which vertices are eligible to run and when an execution ends.
//!
//! # Quiescence
//!
//! A single atomic `pending` counter tracks units of outstanding work:
//! every signal in flight and every vertex scheduled to run counts as one.
//! Work is only ever created by existing work, and successors are counted
//! before their predecessor is released, so once `pending` reaches zero it
//! stays zero. The worker whose release hits zero wakes the coordinator,
//! which confirms the observation by probing every worker before
//! declaring termination.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;
use tokio::time::Instant;

use super::stats::TerminationReason;
use super::vertex::VertexId;

/// Shared counters and notifications for one execution
#[derive(Debug)]
pub(crate) struct ExecutionControl {
    /// Signals in flight plus scheduled vertices
    pending: AtomicUsize,
    /// Signals sent but not yet collected
    outstanding_signals: AtomicUsize,
    high_watermark: Option<usize>,
    watermark_crossed: AtomicBool,
    stop: AtomicBool,
    stop_reason: OnceLock<TerminationReason>,
    quiescent: Notify,
    stopped: Notify,
}

impl ExecutionControl {
    pub(crate) fn new(high_watermark: Option<usize>) -> Self {
        Self {
            pending: AtomicUsize::new(0),
            outstanding_signals: AtomicUsize::new(0),
            high_watermark,
            watermark_crossed: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            stop_reason: OnceLock::new(),
            quiescent: Notify::new(),
            stopped: Notify::new(),
        }
    }

    /// Count a signal before it is enqueued
    pub(crate) fn signal_sent(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let outstanding = self.outstanding_signals.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(watermark) = self.high_watermark {
            if outstanding >= watermark && !self.watermark_crossed.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    outstanding,
                    watermark,
                    "Signal backlog crossed high watermark; queues keep growing"
                );
            }
        }
    }

    /// Release signals consumed by a collect (or discarded by a failed vertex)
    pub(crate) fn signals_collected(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.outstanding_signals.fetch_sub(count, Ordering::SeqCst);
        self.release(count);
    }

    pub(crate) fn vertices_scheduled(&self, count: usize) {
        self.pending.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn vertex_finished(&self) {
        self.release(1);
    }

    fn release(&self, count: usize) {
        let previous = self.pending.fetch_sub(count, Ordering::SeqCst);
        debug_assert!(previous >= count, "pending work counter underflow");
        if previous == count {
            self.quiescent.notify_one();
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn outstanding_signals(&self) -> usize {
        self.outstanding_signals.load(Ordering::SeqCst)
    }

    pub(crate) fn is_quiescent(&self) -> bool {
        self.pending() == 0
    }

    /// Wait until some worker released the last unit of pending work
    pub(crate) async fn quiescence(&self) {
        self.quiescent.notified().await
    }

    /// Ask every worker to stop before its next step
    ///
    /// Returns `true` for the first caller; its reason is the one recorded.
    pub(crate) fn request_stop(&self, reason: TerminationReason) -> bool {
        let first = self.stop_reason.set(reason).is_ok();
        self.stop.store(true, Ordering::SeqCst);
        if first {
            self.stopped.notify_one();
        }
        first
    }

    /// Stop every worker after a fatal error, without a termination reason
    pub(crate) fn abort(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.stopped.notify_one();
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_reason(&self) -> Option<TerminationReason> {
        self.stop_reason.get().copied()
    }

    /// Wait until a stop was requested
    pub(crate) async fn stopped(&self) {
        self.stopped.notified().await
    }
}

/// Aborts the execution if a worker task exits without handing its partition back
///
/// Held by every worker and disarmed on the regular exit path. A worker
/// task that unwinds drops it armed.
pub(crate) struct AbortOnDrop {
    control: Option<Arc<ExecutionControl>>,
}

impl AbortOnDrop {
    pub(crate) fn new(control: Arc<ExecutionControl>) -> Self {
        Self {
            control: Some(control),
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.control = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(control) = self.control.take() {
            tracing::error!("Worker exited abnormally; aborting execution");
            control.abort();
        }
    }
}

/// Vertices waiting to run on one worker (asynchronous mode)
///
/// A vertex is queued at most once; it can be queued again after it was
/// taken for a round.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    queue: VecDeque<VertexId>,
    queued: HashSet<VertexId>,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a vertex; returns `false` if it was already queued
    pub(crate) fn schedule(&mut self, id: VertexId) -> bool {
        if self.queued.insert(id) {
            self.queue.push_back(id);
            true
        } else {
            false
        }
    }

    /// Take every vertex currently queued
    pub(crate) fn take_round(&mut self) -> Vec<VertexId> {
        self.queued.clear();
        self.queue.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Step and time bounds of one execution
#[derive(Debug, Clone, Copy)]
pub(crate) struct StepBudget {
    max_steps: Option<usize>,
    deadline: Option<Instant>,
}

impl StepBudget {
    pub(crate) fn new(max_steps: Option<usize>, deadline: Option<Instant>) -> Self {
        Self {
            max_steps,
            deadline,
        }
    }

    /// Reason to halt before running step `step` (0-indexed), if any
    pub(crate) fn exhausted(&self, step: usize) -> Option<TerminationReason> {
        if let Some(max) = self.max_steps {
            if step >= max {
                return Some(TerminationReason::MaxStepsReached);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(TerminationReason::TimeLimitReached);
            }
        }
        None
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// A vertex signals while its score is above the threshold
///
/// NaN scores never signal.
pub(crate) fn should_signal(score: f64, threshold: f64) -> bool {
    score > threshold
}

/// A vertex collects whenever signals are waiting for it
pub(crate) fn should_collect(uncollected: usize) -> bool {
    uncollected > 0
}
