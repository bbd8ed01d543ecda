//! Partition workers
//!
//! Each worker is a tokio task that exclusively owns one partition of the
//! graph for the duration of an execution. It is the only consumer of its
//! inbox, so it is the only task that ever touches the state of the
//! vertices it owns.
//!
//! A vertex step is: deliver → collect (if signals are waiting) → score →
//! signal (if the score exceeds the threshold).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::config::ExecutionMode;
use super::edge::SignalContext;
use super::error::{GraphError, VertexError};
use super::scheduler::{should_collect, should_signal, AbortOnDrop, ExecutionControl, ReadyQueue};
use super::signal::{Inbox, SignalEnvelope, SignalMessage, SignalRouter};
use super::stats::TerminationReason;
use super::store::Partition;
use super::vertex::{CollectContext, StateValue, VertexId, VertexStatus};

/// Control messages from the coordinator
pub(crate) enum WorkerCommand {
    /// Run one synchronous superstep and reply when it is complete
    Superstep {
        step: usize,
        reply: oneshot::Sender<Result<StepReport, GraphError>>,
    },
    /// Report local idleness (asynchronous quiescence confirmation)
    Poll { reply: oneshot::Sender<PollReport> },
    /// Leave the run loop and hand the partition back
    Stop,
}

/// Result of one superstep on one worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StepReport {
    pub(crate) vertices_run: usize,
    pub(crate) signals_sent: u64,
}

/// Snapshot of local work, taken between steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PollReport {
    pub(crate) ready: usize,
    pub(crate) uncollected: usize,
    pub(crate) queued_signals: usize,
}

impl PollReport {
    pub(crate) fn is_idle(&self) -> bool {
        self.ready == 0 && self.uncollected == 0 && self.queued_signals == 0
    }
}

/// Per-worker counters, merged into the execution statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct WorkerCounters {
    pub(crate) signals_sent: u64,
    pub(crate) signals_collected: u64,
    pub(crate) signal_operations: u64,
    pub(crate) collect_operations: u64,
    pub(crate) failed_vertices: usize,
    /// Asynchronous rounds started
    pub(crate) rounds: usize,
}

impl WorkerCounters {
    pub(crate) fn merge(&mut self, other: &WorkerCounters) {
        self.signals_sent += other.signals_sent;
        self.signals_collected += other.signals_collected;
        self.signal_operations += other.signal_operations;
        self.collect_operations += other.collect_operations;
        self.failed_vertices += other.failed_vertices;
        self.rounds = self.rounds.max(other.rounds);
    }
}

/// What a worker hands back when it stops
pub(crate) struct WorkerOutcome<S, M> {
    pub(crate) index: usize,
    pub(crate) vertices: Partition<S, M>,
    pub(crate) counters: WorkerCounters,
    pub(crate) error: Option<GraphError>,
}

pub(crate) struct Worker<S, M> {
    /// Dropped first when the task unwinds
    exit: AbortOnDrop,
    index: usize,
    vertices: Partition<S, M>,
    inbox: Inbox<M>,
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
    router: SignalRouter<M>,
    control: Arc<ExecutionControl>,
    threshold: f64,
    max_steps: Option<usize>,
    counters: WorkerCounters,
    /// Signals received early, held back until their superstep is over
    deferred: Vec<SignalEnvelope<M>>,
    ready: ReadyQueue,
    error: Option<GraphError>,
}

impl<S: StateValue, M: SignalMessage> Worker<S, M> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        index: usize,
        vertices: Partition<S, M>,
        inbox: Inbox<M>,
        commands: mpsc::UnboundedReceiver<WorkerCommand>,
        router: SignalRouter<M>,
        control: Arc<ExecutionControl>,
        threshold: f64,
        max_steps: Option<usize>,
    ) -> Self {
        Self {
            exit: AbortOnDrop::new(Arc::clone(&control)),
            index,
            vertices,
            inbox,
            commands,
            router,
            control,
            threshold,
            max_steps,
            counters: WorkerCounters::default(),
            deferred: Vec::new(),
            ready: ReadyQueue::new(),
            error: None,
        }
    }

    /// Run until told to stop, then hand the partition back
    pub(crate) async fn run(self, mode: ExecutionMode) -> WorkerOutcome<S, M> {
        match mode {
            ExecutionMode::Synchronous => self.run_synchronous().await,
            ExecutionMode::Asynchronous => self.run_asynchronous().await,
        }
    }

    // =========================================================================
    // Synchronous mode
    // =========================================================================

    async fn run_synchronous(mut self) -> WorkerOutcome<S, M> {
        while let Some(command) = self.commands.recv().await {
            match command {
                WorkerCommand::Superstep { step, reply } => {
                    let result = self.superstep(step);
                    if let Err(e) = &result {
                        tracing::error!(worker = self.index, superstep = step, error = %e, "Superstep failed");
                    }
                    let _ = reply.send(result);
                }
                WorkerCommand::Poll { reply } => {
                    let _ = reply.send(self.poll_report());
                }
                WorkerCommand::Stop => break,
            }
        }
        self.finish()
    }

    /// Deliver the previous superstep's signals and run every vertex that got one
    ///
    /// Superstep 0 runs every vertex.
    fn superstep(&mut self, step: usize) -> Result<StepReport, GraphError> {
        let sent_before = self.counters.signals_sent;

        if step == 0 {
            let ids: Vec<VertexId> = self.vertices.keys().copied().collect();
            for id in ids {
                self.ready.schedule(id);
            }
        }

        // Signals tagged with the current step come from workers that are
        // already running it; they belong to the next superstep.
        for envelope in std::mem::take(&mut self.deferred) {
            self.deliver_synchronous(envelope, step);
        }
        while let Some(envelope) = self.inbox.try_recv() {
            self.deliver_synchronous(envelope, step);
        }

        let round = self.ready.take_round();
        let vertices_run = round.len();
        for id in round {
            self.step_vertex(id, step)?;
        }

        let report = StepReport {
            vertices_run,
            signals_sent: self.counters.signals_sent - sent_before,
        };
        tracing::debug!(
            worker = self.index,
            superstep = step,
            vertices_run = report.vertices_run,
            signals_sent = report.signals_sent,
            "Superstep complete"
        );
        Ok(report)
    }

    fn deliver_synchronous(&mut self, envelope: SignalEnvelope<M>, step: usize) {
        if envelope.step >= step {
            self.deferred.push(envelope);
        } else if let Some(target) = self.deliver(envelope) {
            self.ready.schedule(target);
        }
    }

    // =========================================================================
    // Asynchronous mode
    // =========================================================================

    /// Event-driven loop
    ///
    /// Every vertex starts scheduled (the coordinator has already counted
    /// them as pending work). A vertex is scheduled again whenever a signal
    /// for it arrives. Stop requests are observed between rounds and
    /// between vertex steps, never within a step.
    async fn run_asynchronous(mut self) -> WorkerOutcome<S, M> {
        let ids: Vec<VertexId> = self.vertices.keys().copied().collect();
        for id in ids {
            self.ready.schedule(id);
        }

        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                    continue;
                }
                Err(mpsc::error::TryRecvError::Disconnected) => break,
                Err(mpsc::error::TryRecvError::Empty) => {}
            }

            if self.control.stop_requested() {
                break;
            }

            while let Some(envelope) = self.inbox.try_recv() {
                self.deliver_asynchronous(envelope);
            }

            if !self.ready.is_empty() {
                if let Some(max) = self.max_steps {
                    if self.counters.rounds >= max {
                        if self.control.request_stop(TerminationReason::MaxStepsReached) {
                            tracing::info!(worker = self.index, rounds = self.counters.rounds, "Round limit reached");
                        }
                        break;
                    }
                }

                if let Err(e) = self.run_round() {
                    tracing::error!(worker = self.index, error = %e, "Worker failed");
                    self.error = Some(e);
                    self.control.abort();
                    break;
                }

                // Let other workers and the coordinator make progress
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                envelope = self.inbox.recv() => match envelope {
                    Some(envelope) => self.deliver_asynchronous(envelope),
                    None => break,
                },
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.finish()
    }

    fn run_round(&mut self) -> Result<(), GraphError> {
        let round = self.ready.take_round();
        let step = self.counters.rounds;
        self.counters.rounds += 1;
        tracing::debug!(worker = self.index, round = step, vertices = round.len(), "Starting round");

        for id in round {
            if self.control.stop_requested() {
                break;
            }
            let result = self.step_vertex(id, step);
            self.control.vertex_finished();
            result?;
        }
        Ok(())
    }

    fn deliver_asynchronous(&mut self, envelope: SignalEnvelope<M>) {
        if let Some(target) = self.deliver(envelope) {
            if self.ready.schedule(target) {
                self.control.vertices_scheduled(1);
            }
        }
    }

    /// Returns `false` when the worker should leave its loop
    fn handle_command(&mut self, command: WorkerCommand) -> bool {
        match command {
            WorkerCommand::Poll { reply } => {
                let _ = reply.send(self.poll_report());
                true
            }
            WorkerCommand::Superstep { reply, .. } => {
                let _ = reply.send(Err(GraphError::worker_failure(
                    self.index,
                    "superstep requested in asynchronous mode",
                )));
                true
            }
            WorkerCommand::Stop => false,
        }
    }

    // =========================================================================
    // Vertex steps
    // =========================================================================

    /// Hand a signal to its target vertex
    ///
    /// Returns the target if it should be scheduled. Signals for a failed
    /// vertex are consumed immediately.
    fn deliver(&mut self, envelope: SignalEnvelope<M>) -> Option<VertexId> {
        let SignalEnvelope {
            source,
            target,
            payload,
            ..
        } = envelope;

        match self.vertices.get_mut(&target) {
            Some(entry) if !entry.status.is_failed() => {
                entry.uncollected.push((source, payload));
                Some(target)
            }
            Some(_) => {
                self.counters.signals_collected += 1;
                self.control.signals_collected(1);
                None
            }
            None => {
                // Edges are validated on insert, so this only happens if a
                // vertex vanished from the partition.
                tracing::warn!(worker = self.index, vertex_id = %target, "Signal for unknown vertex dropped");
                self.counters.signals_collected += 1;
                self.control.signals_collected(1);
                None
            }
        }
    }

    /// Collect and signal one vertex
    ///
    /// Vertex failures are isolated: the vertex is marked failed and the
    /// step succeeds. Only a routing failure is returned as an error.
    fn step_vertex(&mut self, id: VertexId, step: usize) -> Result<(), GraphError> {
        let Some(entry) = self.vertices.get_mut(&id) else {
            return Ok(());
        };

        let arrived = std::mem::take(&mut entry.uncollected);
        let consumed = arrived.len();

        if entry.status.is_failed() {
            self.counters.signals_collected += consumed as u64;
            self.control.signals_collected(consumed);
            return Ok(());
        }

        if should_collect(consumed) {
            let mut payloads = Vec::with_capacity(consumed);
            for (source, payload) in arrived {
                entry.most_recent.insert(source, payload.clone());
                payloads.push(payload);
            }

            let vertex = Arc::clone(&entry.vertex);
            let result = {
                let ctx = CollectContext::new(id, &entry.state, &payloads, &entry.most_recent, step);
                catch_unwind(AssertUnwindSafe(|| vertex.collect(&ctx)))
                    .unwrap_or_else(|panic| Err(VertexError::from_panic(panic)))
            };

            self.counters.collect_operations += 1;
            self.counters.signals_collected += consumed as u64;
            self.control.signals_collected(consumed);

            match result {
                Ok(state) => entry.state = state,
                Err(e) => {
                    entry.status = VertexStatus::Failed;
                    self.counters.failed_vertices += 1;
                    tracing::warn!(worker = self.index, vertex_id = %id, step, error = %e, "Collect failed; vertex excluded");
                    return Ok(());
                }
            }
        }

        let score = catch_unwind(AssertUnwindSafe(|| {
            entry
                .vertex
                .score_signal(&entry.state, entry.last_signal_state.as_ref())
        }));
        let score = match score {
            Ok(score) => score,
            Err(panic) => {
                let e = VertexError::from_panic(panic);
                entry.status = VertexStatus::Failed;
                self.counters.failed_vertices += 1;
                tracing::warn!(worker = self.index, vertex_id = %id, step, error = %e, "Scoring failed; vertex excluded");
                return Ok(());
            }
        };
        if !should_signal(score, self.threshold) {
            entry.status = VertexStatus::Dormant;
            return Ok(());
        }

        let vertex = Arc::clone(&entry.vertex);
        let outgoing = &entry.outgoing;
        let state = &entry.state;
        let produced = catch_unwind(AssertUnwindSafe(|| -> Result<Vec<SignalEnvelope<M>>, VertexError> {
            let Some(payload) = vertex.signal(state)? else {
                return Ok(Vec::new());
            };
            let out_degree = outgoing.len();
            let out_weight_sum: f64 = outgoing.iter().map(|edge| edge.weight()).sum();
            Ok(outgoing
                .iter()
                .map(|edge| {
                    let ctx = SignalContext {
                        source: id,
                        target: edge.target(),
                        weight: edge.weight(),
                        out_degree,
                        out_weight_sum,
                    };
                    SignalEnvelope {
                        source: id,
                        target: edge.target(),
                        payload: edge.apply(&payload, &ctx),
                        step,
                    }
                })
                .collect())
        }))
        .unwrap_or_else(|panic| Err(VertexError::from_panic(panic)));

        self.counters.signal_operations += 1;

        let envelopes = match produced {
            Ok(envelopes) => envelopes,
            Err(e) => {
                entry.status = VertexStatus::Failed;
                self.counters.failed_vertices += 1;
                tracing::warn!(worker = self.index, vertex_id = %id, step, error = %e, "Signal failed; vertex excluded");
                return Ok(());
            }
        };

        entry.last_signal_state = Some(entry.state.clone());
        entry.status = if envelopes.is_empty() {
            VertexStatus::Dormant
        } else {
            VertexStatus::Active
        };

        for envelope in envelopes {
            self.router.send(envelope)?;
            self.counters.signals_sent += 1;
        }
        Ok(())
    }

    fn poll_report(&self) -> PollReport {
        PollReport {
            ready: self.ready.len(),
            uncollected: self
                .vertices
                .values()
                .filter(|entry| !entry.uncollected.is_empty())
                .count(),
            queued_signals: self.inbox.len() + self.deferred.len(),
        }
    }

    /// Hand the partition back
    ///
    /// Signals that arrived but were never run (deferred to a superstep that
    /// did not happen, or still queued at a stop) are left on their targets
    /// as uncollected signals.
    fn finish(mut self) -> WorkerOutcome<S, M> {
        self.exit.disarm();

        let mut leftover = std::mem::take(&mut self.deferred);
        while let Some(envelope) = self.inbox.try_recv() {
            leftover.push(envelope);
        }
        let leftover_count = leftover.len();
        for envelope in leftover {
            self.deliver(envelope);
        }

        tracing::debug!(
            worker = self.index,
            leftover_signals = leftover_count,
            signals_sent = self.counters.signals_sent,
            signals_collected = self.counters.signals_collected,
            rounds = self.counters.rounds,
            "Worker stopped"
        );
        WorkerOutcome {
            index: self.index,
            vertices: self.vertices,
            counters: self.counters,
            error: self.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use crate::signal::channels;
    use crate::store::GraphStore;
    use crate::vertex::{BoxedVertex, Vertex};

    /// Adds up everything it receives and forwards its total
    struct SumVertex {
        id: VertexId,
        initial: i64,
        fail_on: Option<i64>,
    }

    impl Vertex<i64, i64> for SumVertex {
        fn id(&self) -> VertexId {
            self.id
        }

        fn initial_state(&self) -> i64 {
            self.initial
        }

        fn collect(&self, ctx: &CollectContext<'_, i64, i64>) -> Result<i64, VertexError> {
            let total = ctx.state() + ctx.signals().iter().sum::<i64>();
            if Some(total) == self.fail_on {
                return Err(VertexError::new("bad total"));
            }
            Ok(total)
        }

        fn signal(&self, state: &i64) -> Result<Option<i64>, VertexError> {
            if *state == 0 {
                Ok(None)
            } else {
                Ok(Some(*state))
            }
        }
    }

    fn sum_vertex(id: i64, initial: i64) -> BoxedVertex<i64, i64> {
        Arc::new(SumVertex {
            id: VertexId::new(id),
            initial,
            fail_on: None,
        })
    }

    fn single_worker(
        store: &mut GraphStore<i64, i64>,
    ) -> (Worker<i64, i64>, Arc<ExecutionControl>, mpsc::UnboundedSender<WorkerCommand>) {
        let control = Arc::new(ExecutionControl::new(None));
        let (router, mut inboxes) = channels(1, Arc::clone(&control));
        let (tx, rx) = mpsc::unbounded_channel();
        let partition = store.take_partitions(1).remove(0);
        let worker = Worker::new(
            0,
            partition,
            inboxes.remove(0),
            rx,
            router,
            Arc::clone(&control),
            0.0,
            None,
        );
        (worker, control, tx)
    }

    #[test]
    fn test_first_superstep_signals_every_vertex() {
        let mut store = GraphStore::default();
        store.add_vertex(sum_vertex(1, 1)).unwrap();
        store.add_vertex(sum_vertex(2, 0)).unwrap();
        store.add_edge(Edge::new(1, 2)).unwrap();

        let (mut worker, control, _tx) = single_worker(&mut store);
        let report = worker.superstep(0).unwrap();
        assert_eq!(report.vertices_run, 2);
        // Vertex 2 has state 0 and stays silent
        assert_eq!(report.signals_sent, 1);
        assert_eq!(control.outstanding_signals(), 1);

        let report = worker.superstep(1).unwrap();
        assert_eq!(report.vertices_run, 1);
        assert_eq!(worker.vertices[&VertexId::new(2)].state, 1);
        assert_eq!(worker.counters.collect_operations, 1);
        assert_eq!(control.outstanding_signals(), 0);
    }

    #[test]
    fn test_signals_of_current_step_are_deferred() {
        let mut store = GraphStore::default();
        store.add_vertex(sum_vertex(1, 0)).unwrap();

        let (mut worker, _control, _tx) = single_worker(&mut store);
        worker.superstep(0).unwrap();

        // Arrives while superstep 1 is running elsewhere
        worker.router.send(SignalEnvelope {
            source: VertexId::new(9),
            target: VertexId::new(1),
            payload: 5,
            step: 1,
        })
        .unwrap();

        let report = worker.superstep(1).unwrap();
        assert_eq!(report.vertices_run, 0);
        assert_eq!(worker.deferred.len(), 1);

        let report = worker.superstep(2).unwrap();
        assert_eq!(report.vertices_run, 1);
        assert_eq!(worker.vertices[&VertexId::new(1)].state, 5);
    }

    #[test]
    fn test_failed_collect_is_isolated() {
        let mut store = GraphStore::default();
        store.add_vertex(sum_vertex(1, 2)).unwrap();
        store
            .add_vertex(Arc::new(SumVertex {
                id: VertexId::new(2),
                initial: 0,
                fail_on: Some(2),
            }))
            .unwrap();
        store.add_edge(Edge::new(1, 2)).unwrap();

        let (mut worker, control, _tx) = single_worker(&mut store);
        worker.superstep(0).unwrap();
        worker.superstep(1).unwrap();

        let failed = &worker.vertices[&VertexId::new(2)];
        assert!(failed.status.is_failed());
        assert_eq!(failed.state, 0);
        assert_eq!(worker.counters.failed_vertices, 1);
        assert_eq!(control.outstanding_signals(), 0);

        // Later signals are consumed without running the vertex
        let collects = worker.counters.collect_operations;
        worker.router.send(SignalEnvelope {
            source: VertexId::new(1),
            target: VertexId::new(2),
            payload: 1,
            step: 1,
        })
        .unwrap();
        worker.superstep(2).unwrap();
        assert_eq!(worker.counters.collect_operations, collects);
        assert_eq!(control.outstanding_signals(), 0);
    }

    #[test]
    fn test_dormant_below_threshold() {
        let mut store = GraphStore::default();
        store.add_vertex(sum_vertex(1, 3)).unwrap();
        store.add_edge(Edge::new(1, 1)).unwrap();

        let (mut worker, _control, _tx) = single_worker(&mut store);
        worker.threshold = 100.0;

        // First signal always happens (infinite score)
        worker.superstep(0).unwrap();
        assert!(worker.vertices[&VertexId::new(1)].status.is_active());

        // 3 -> 6 is a delta of 3, below the threshold
        let report = worker.superstep(1).unwrap();
        assert_eq!(report.signals_sent, 0);
        let entry = &worker.vertices[&VertexId::new(1)];
        assert_eq!(entry.state, 6);
        assert!(entry.status.is_dormant());
        assert_eq!(entry.last_signal_state, Some(3));
    }

    #[test]
    fn test_panicking_vertex_is_failed() {
        struct PanicVertex;

        impl Vertex<i64, i64> for PanicVertex {
            fn id(&self) -> VertexId {
                VertexId::new(1)
            }

            fn initial_state(&self) -> i64 {
                0
            }

            fn collect(&self, ctx: &CollectContext<'_, i64, i64>) -> Result<i64, VertexError> {
                Ok(*ctx.state())
            }

            fn signal(&self, _state: &i64) -> Result<Option<i64>, VertexError> {
                panic!("boom")
            }
        }

        let mut store = GraphStore::default();
        store.add_vertex(Arc::new(PanicVertex)).unwrap();
        let (mut worker, _control, _tx) = single_worker(&mut store);

        worker.superstep(0).unwrap();
        assert!(worker.vertices[&VertexId::new(1)].status.is_failed());
        assert_eq!(worker.counters.failed_vertices, 1);
        assert_eq!(worker.counters.signal_operations, 1);
    }

    #[tokio::test]
    async fn test_asynchronous_worker_reaches_quiescence() {
        let mut store = GraphStore::default();
        store.add_vertex(sum_vertex(1, 1)).unwrap();
        store.add_vertex(sum_vertex(2, 0)).unwrap();
        store.add_edge(Edge::new(1, 2)).unwrap();

        let (worker, control, tx) = single_worker(&mut store);
        control.vertices_scheduled(2);
        let handle = tokio::spawn(worker.run(ExecutionMode::Asynchronous));

        tokio::time::timeout(std::time::Duration::from_secs(5), control.quiescence())
            .await
            .expect("worker never went quiet");

        let (reply, polled) = oneshot::channel();
        tx.send(WorkerCommand::Poll { reply }).unwrap();
        assert!(polled.await.unwrap().is_idle());

        tx.send(WorkerCommand::Stop).unwrap();
        let outcome = handle.await.unwrap();
        assert!(outcome.error.is_none());
        assert_eq!(outcome.vertices[&VertexId::new(2)].state, 1);
        assert_eq!(outcome.counters.signals_sent, outcome.counters.signals_collected);
    }

    #[test]
    fn test_counters_merge() {
        let mut total = WorkerCounters {
            signals_sent: 1,
            rounds: 4,
            ..Default::default()
        };
        total.merge(&WorkerCounters {
            signals_sent: 2,
            failed_vertices: 1,
            rounds: 2,
            ..Default::default()
        });
        assert_eq!(total.signals_sent, 3);
        assert_eq!(total.failed_vertices, 1);
        assert_eq!(total.rounds, 4);
    }
}
