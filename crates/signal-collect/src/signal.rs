//! Signals and per-worker signal queues
//!
//! Every worker owns one inbox. Signals for a vertex are always routed to
//! the inbox of the worker owning that vertex's partition, so exactly one
//! worker ever touches a given vertex's state. Queues are unbounded; the
//! shared [`ExecutionControl`] logs a warning once the outstanding signal
//! count crosses the configured high watermark.

use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use super::error::GraphError;
use super::scheduler::ExecutionControl;
use super::vertex::VertexId;

/// Trait bound for signal payloads
pub trait SignalMessage: Clone + Debug + Send + Sync + 'static {}

impl<T> SignalMessage for T where T: Clone + Debug + Send + Sync + 'static {}

/// A signal in flight between two vertices
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEnvelope<M> {
    pub source: VertexId,
    pub target: VertexId,
    pub payload: M,
    /// Superstep (or round) in which the signal was sent
    pub step: usize,
}

/// Worker that owns `id` when the graph is split into `workers` partitions
pub fn partition_of(id: VertexId, workers: usize) -> usize {
    debug_assert!(workers > 0);
    id.get().rem_euclid(workers as i64) as usize
}

/// Receiving end of one worker's signal queue
pub(crate) struct Inbox<M> {
    receiver: UnboundedReceiver<SignalEnvelope<M>>,
}

impl<M> Inbox<M> {
    /// Take a signal if one is queued
    ///
    /// Returns `None` both when the queue is empty and when every sender is gone.
    pub(crate) fn try_recv(&mut self) -> Option<SignalEnvelope<M>> {
        match self.receiver.try_recv() {
            Ok(envelope) => Some(envelope),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next signal; `None` once every sender is gone
    pub(crate) async fn recv(&mut self) -> Option<SignalEnvelope<M>> {
        self.receiver.recv().await
    }

    pub(crate) fn len(&self) -> usize {
        self.receiver.len()
    }
}

/// Sending side shared by all workers
pub(crate) struct SignalRouter<M> {
    senders: Vec<UnboundedSender<SignalEnvelope<M>>>,
    control: Arc<ExecutionControl>,
}

impl<M> Clone for SignalRouter<M> {
    fn clone(&self) -> Self {
        Self {
            senders: self.senders.clone(),
            control: Arc::clone(&self.control),
        }
    }
}

impl<M: Send> SignalRouter<M> {
    /// Enqueue a signal into the inbox of the worker owning its target
    ///
    /// The signal is counted as pending before it becomes visible to the
    /// receiver. A closed inbox is fatal unless a stop was requested, in
    /// which case the signal is dropped.
    pub(crate) fn send(&self, envelope: SignalEnvelope<M>) -> Result<(), GraphError> {
        let worker = partition_of(envelope.target, self.senders.len());
        self.control.signal_sent();
        match self.senders[worker].send(envelope) {
            Ok(()) => Ok(()),
            Err(_) if self.control.stop_requested() => Ok(()),
            Err(_) => Err(GraphError::worker_failure(worker, "signal inbox closed")),
        }
    }
}

/// Create one inbox per worker and the router feeding them
pub(crate) fn channels<M>(
    workers: usize,
    control: Arc<ExecutionControl>,
) -> (SignalRouter<M>, Vec<Inbox<M>>) {
    let mut senders = Vec::with_capacity(workers);
    let mut inboxes = Vec::with_capacity(workers);
    for _ in 0..workers {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.push(tx);
        inboxes.push(Inbox { receiver: rx });
    }
    (SignalRouter { senders, control }, inboxes)
}
