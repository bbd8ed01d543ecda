//! Execution coordinator
//!
//! Splits the graph into partitions, spawns one worker task per partition,
//! drives the chosen execution mode until it terminates, then joins the
//! workers, puts every partition back into the store and aggregates the
//! statistics.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use super::config::{ExecutionConfig, ExecutionMode};
use super::error::GraphError;
use super::scheduler::{ExecutionControl, StepBudget};
use super::signal::{channels, SignalMessage};
use super::stats::{ExecutionStatistics, TerminationReason};
use super::store::GraphStore;
use super::vertex::StateValue;
use super::worker::{Worker, WorkerCommand, WorkerCounters};

type CommandSender = mpsc::UnboundedSender<WorkerCommand>;

/// Run the graph to convergence or until a bound is hit
pub(crate) async fn execute<S, M>(
    store: &mut GraphStore<S, M>,
    config: &ExecutionConfig,
) -> Result<ExecutionStatistics, GraphError>
where
    S: StateValue,
    M: SignalMessage,
{
    config.validate()?;

    let execution_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let start = Instant::now();
    let budget = StepBudget::new(config.max_steps, config.time_limit.map(|limit| start + limit));
    let vertex_count = store.len();
    let edge_count = store.edge_count();
    let workers = config.worker_count;

    tracing::info!(
        execution_id = %execution_id,
        mode = %config.mode,
        workers,
        vertices = vertex_count,
        edges = edge_count,
        threshold = config.convergence_threshold,
        "Starting execution"
    );

    let mut stats = ExecutionStatistics {
        execution_id,
        mode: config.mode,
        worker_count: workers,
        vertex_count,
        edge_count,
        signals_sent: 0,
        signals_collected: 0,
        signal_operations: 0,
        collect_operations: 0,
        steps: 0,
        duration_millis: 0,
        converged: true,
        termination: TerminationReason::Converged,
        failed_vertices: 0,
        converged_vertices: 0,
        started_at,
    };

    if vertex_count == 0 {
        tracing::info!(execution_id = %stats.execution_id, "Empty graph; nothing to execute");
        return Ok(stats);
    }

    let control = Arc::new(ExecutionControl::new(config.signal_high_watermark));
    let (router, inboxes) = channels::<M>(workers, Arc::clone(&control));
    let partitions = store.take_partitions(workers);

    if config.mode == ExecutionMode::Asynchronous {
        // Every vertex starts scheduled
        control.vertices_scheduled(vertex_count);
    }

    let mut commands = Vec::with_capacity(workers);
    let mut handles = Vec::with_capacity(workers);
    for (index, (partition, inbox)) in partitions.into_iter().zip(inboxes).enumerate() {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker::new(
            index,
            partition,
            inbox,
            rx,
            router.clone(),
            Arc::clone(&control),
            config.convergence_threshold,
            config.max_steps,
        );
        handles.push(tokio::spawn(worker.run(config.mode)));
        commands.push(tx);
    }
    drop(router);

    let run = match config.mode {
        ExecutionMode::Synchronous => run_synchronous(&commands, budget, &stats.execution_id)
            .await
            .map(|(reason, steps)| (Some(reason), steps)),
        ExecutionMode::Asynchronous => run_asynchronous(&control, &commands, budget)
            .await
            .map(|reason| (reason, 0)),
    };

    // Stop and join every worker, even after a failure, so the store gets
    // its partitions back.
    for tx in &commands {
        let _ = tx.send(WorkerCommand::Stop);
    }
    drop(commands);

    let mut counters = WorkerCounters::default();
    let mut failure: Option<GraphError> = None;
    for (index, joined) in join_all(handles).await.into_iter().enumerate() {
        match joined {
            Ok(outcome) => {
                store.restore_partition(outcome.vertices);
                counters.merge(&outcome.counters);
                if let Some(e) = outcome.error {
                    failure.get_or_insert(e);
                }
            }
            Err(e) => {
                // The partition owned by this task is lost
                tracing::error!(execution_id = %stats.execution_id, worker = index, error = %e, "Worker task did not complete");
                failure.get_or_insert(GraphError::worker_failure(
                    index,
                    format!("worker task did not complete: {}", e),
                ));
            }
        }
    }

    tracing::debug!(
        execution_id = %stats.execution_id,
        in_flight = control.outstanding_signals(),
        "Workers joined"
    );

    let (reason, sync_steps) = run?;
    if let Some(e) = failure {
        return Err(e);
    }
    let termination = reason
        .ok_or_else(|| GraphError::worker_failure(0, "execution aborted without a reason"))?;

    stats.signals_sent = counters.signals_sent;
    stats.signals_collected = counters.signals_collected;
    stats.signal_operations = counters.signal_operations;
    stats.collect_operations = counters.collect_operations;
    stats.failed_vertices = counters.failed_vertices;
    stats.converged_vertices = store.converged_count(config.convergence_threshold);
    stats.steps = match config.mode {
        ExecutionMode::Synchronous => sync_steps,
        ExecutionMode::Asynchronous => counters.rounds,
    };
    stats.termination = termination;
    stats.converged = termination.is_converged();
    stats.duration_millis = start.elapsed().as_millis() as u64;

    tracing::info!(
        execution_id = %stats.execution_id,
        steps = stats.steps,
        signals_sent = stats.signals_sent,
        signals_collected = stats.signals_collected,
        failed_vertices = stats.failed_vertices,
        converged_vertices = stats.converged_vertices,
        duration_ms = stats.duration_millis,
        termination = %stats.termination,
        "Execution finished"
    );

    Ok(stats)
}

/// Lock-step supersteps
///
/// Superstep N+1 is only issued after every worker replied for superstep N.
/// Bounds are checked between supersteps. Returns the termination reason
/// and the number of supersteps run.
async fn run_synchronous(
    commands: &[CommandSender],
    budget: StepBudget,
    execution_id: &str,
) -> Result<(TerminationReason, usize), GraphError> {
    let mut step = 0;
    loop {
        if let Some(reason) = budget.exhausted(step) {
            tracing::info!(execution_id, superstep = step, reason = %reason, "Execution bound reached");
            return Ok((reason, step));
        }

        let mut replies = Vec::with_capacity(commands.len());
        for (worker, tx) in commands.iter().enumerate() {
            let (reply, rx) = oneshot::channel();
            tx.send(WorkerCommand::Superstep { step, reply })
                .map_err(|_| GraphError::worker_failure(worker, "worker stopped unexpectedly"))?;
            replies.push(rx);
        }

        let mut signals_sent = 0;
        let mut vertices_run = 0;
        for (worker, reply) in join_all(replies).await.into_iter().enumerate() {
            let report = reply
                .map_err(|_| GraphError::worker_failure(worker, "superstep reply dropped"))??;
            signals_sent += report.signals_sent;
            vertices_run += report.vertices_run;
        }

        tracing::debug!(execution_id, superstep = step, vertices_run, signals_sent, "Superstep complete");
        step += 1;

        if signals_sent == 0 {
            return Ok((TerminationReason::Converged, step));
        }
    }
}

/// Wait for quiescence, a stop request or the deadline
///
/// Returns `None` when a worker aborted the execution.
async fn run_asynchronous(
    control: &ExecutionControl,
    commands: &[CommandSender],
    budget: StepBudget,
) -> Result<Option<TerminationReason>, GraphError> {
    let deadline = async {
        match budget.deadline() {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;

            _ = control.stopped() => {
                return Ok(control.stop_reason());
            }
            _ = control.quiescence() => {
                if confirm_quiescence(control, commands).await? {
                    control.request_stop(TerminationReason::Converged);
                    return Ok(control.stop_reason());
                }
            }
            _ = &mut deadline => {
                if control.is_quiescent() && confirm_quiescence(control, commands).await? {
                    control.request_stop(TerminationReason::Converged);
                } else {
                    control.request_stop(TerminationReason::TimeLimitReached);
                }
                return Ok(control.stop_reason());
            }
        }
    }
}

/// Poll every worker to confirm that no work is left anywhere
///
/// Returns `false` if a worker is gone because a stop was requested; the
/// caller then observes the stop.
async fn confirm_quiescence(
    control: &ExecutionControl,
    commands: &[CommandSender],
) -> Result<bool, GraphError> {
    loop {
        if !control.is_quiescent() {
            return Ok(false);
        }

        let mut replies = Vec::with_capacity(commands.len());
        for (worker, tx) in commands.iter().enumerate() {
            let (reply, rx) = oneshot::channel();
            if tx.send(WorkerCommand::Poll { reply }).is_err() {
                return stopped_or_failed(control, worker);
            }
            replies.push(rx);
        }

        let mut idle = true;
        for (worker, reply) in join_all(replies).await.into_iter().enumerate() {
            match reply {
                Ok(report) => idle &= report.is_idle(),
                Err(_) => return stopped_or_failed(control, worker),
            }
        }

        if idle && control.is_quiescent() {
            return Ok(true);
        }

        tracing::debug!("Quiescence not confirmed yet; probing again");
        tokio::task::yield_now().await;
    }
}

fn stopped_or_failed(control: &ExecutionControl, worker: usize) -> Result<bool, GraphError> {
    if control.stop_requested() {
        Ok(false)
    } else {
        Err(GraphError::worker_failure(worker, "worker stopped unexpectedly"))
    }
}
