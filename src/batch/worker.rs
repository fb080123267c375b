//! Worker pool that drains the batch queue

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;

use super::report::ReportBuilder;
use super::{BatchOptions, BatchOrchestrator, combined};
use crate::error::ErrorKind;
use crate::identifier::ThreadIdentifier;
use crate::operations::unsupported;
use crate::types::{Action, BatchEvent, BatchReport, OperationOutcome};

/// Queue and accumulator shared by the workers of one run
///
/// The lock is held only to pop an item or record an outcome, never across a
/// remote call.
struct RunState {
    pending: VecDeque<ThreadIdentifier>,
    /// Items currently being processed, keyed by the worker task holding them
    in_flight: HashMap<task::Id, ThreadIdentifier>,
    report: ReportBuilder,
    threshold: Option<usize>,
}

impl RunState {
    /// With a breaker threshold, an item may only start while every in-flight
    /// item failing would still leave the run below the threshold.
    fn may_dispatch(&self) -> bool {
        match self.threshold {
            Some(threshold) => self.report.consecutive_failures() + self.in_flight.len() < threshold,
            None => true,
        }
    }
}

impl BatchOrchestrator {
    /// Process `items` on a pool of workers and assemble the report
    pub(super) async fn execute(
        &self,
        items: Vec<ThreadIdentifier>,
        requested: usize,
        duplicates_removed: usize,
        action: Action,
        options: BatchOptions,
    ) -> BatchReport {
        let total = items.len();
        let workers = options.concurrency_limit.min(total);

        tracing::info!(
            action = %action.kind(),
            total,
            requested,
            duplicates_removed,
            workers,
            dry_run = options.dry_run,
            "Starting batch"
        );
        self.emit_event(BatchEvent::BatchStarted {
            action: action.kind(),
            total,
            dry_run: options.dry_run,
        });

        let state = Arc::new(Mutex::new(RunState {
            pending: items.into(),
            in_flight: HashMap::new(),
            threshold: options.stop_after_consecutive_failures,
            report: ReportBuilder::new(
                action.kind(),
                requested,
                duplicates_removed,
                options.dry_run,
                options.stop_after_consecutive_failures,
            ),
        }));
        let action = Arc::new(action);
        let progress = Arc::new(Notify::new());

        let mut join_set = JoinSet::new();
        for worker_id in 0..workers {
            let orchestrator = self.clone();
            let state = Arc::clone(&state);
            let action = Arc::clone(&action);
            let progress = Arc::clone(&progress);
            let cancel = options.cancel.clone();
            let dry_run = options.dry_run;
            join_set.spawn(async move {
                orchestrator
                    .worker_loop(worker_id, state, progress, action, cancel, dry_run)
                    .await
            });
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            let Err(e) = joined else {
                continue;
            };
            tracing::error!(error = %e, "Batch worker terminated abnormally");
            let mut guard = state.lock().await;
            if let Some(identifier) = guard.in_flight.remove(&e.id()) {
                let outcome = OperationOutcome::failed(
                    identifier,
                    action.kind(),
                    ErrorKind::Aborted,
                    format!("not completed: batch worker terminated abnormally ({e})"),
                );
                self.emit_event(BatchEvent::ItemFinished {
                    outcome: Box::new(outcome.clone()),
                });
                self.record_outcome(&mut guard, outcome);
            }
            drop(guard);
            progress.notify_waiters();
        }

        let mut state = state.lock().await;
        let cancelled = options.cancel.is_cancelled();
        let remaining: Vec<ThreadIdentifier> = state.pending.drain(..).collect();

        let aborted = if state.report.is_tripped() {
            Some(state.report.abort_remaining(remaining))
        } else {
            if cancelled {
                tracing::warn!(
                    processed = state.report.processed(),
                    dropped = remaining.len(),
                    "Batch cancelled"
                );
                self.emit_event(BatchEvent::BatchCancelled {
                    processed: state.report.processed(),
                });
            } else {
                // Only reachable when every worker died with items queued.
                for identifier in remaining {
                    state.report.record(OperationOutcome::failed(
                        identifier,
                        action.kind(),
                        ErrorKind::Aborted,
                        "not attempted: batch workers terminated abnormally",
                    ));
                }
            }
            None
        };

        let report = std::mem::replace(
            &mut state.report,
            ReportBuilder::new(action.kind(), 0, 0, false, None),
        )
        .finish(cancelled, aborted);

        tracing::info!(
            action = %report.action,
            total = report.total,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            partial = report.partial.len(),
            cancelled = report.cancelled,
            aborted = report.aborted.is_some(),
            elapsed_ms = report.elapsed().num_milliseconds(),
            "Batch finished"
        );
        self.emit_event(BatchEvent::BatchFinished {
            succeeded: report.succeeded.len(),
            failed: report.failed.len(),
            partial: report.partial.len(),
        });

        report
    }

    /// Pull items until the queue is empty, the breaker trips, or the run is
    /// cancelled
    async fn worker_loop(
        &self,
        worker_id: usize,
        state: Arc<Mutex<RunState>>,
        progress: Arc<Notify>,
        action: Arc<Action>,
        cancel: CancellationToken,
        dry_run: bool,
    ) {
        let task_id = task::id();
        loop {
            let identifier = {
                let mut guard = state.lock().await;
                if cancel.is_cancelled() || guard.report.is_tripped() || guard.pending.is_empty() {
                    break;
                }
                if !guard.may_dispatch() {
                    // Registered before the lock is released so a finishing
                    // peer cannot be missed.
                    let finished = progress.notified();
                    drop(guard);
                    tokio::select! {
                        _ = finished => {}
                        _ = cancel.cancelled() => {}
                    }
                    continue;
                }
                let Some(identifier) = guard.pending.pop_front() else {
                    break;
                };
                guard.in_flight.insert(task_id, identifier.clone());
                identifier
            };

            tracing::debug!(worker_id, identifier = %identifier, "Processing item");
            self.emit_event(BatchEvent::ItemStarted {
                identifier: identifier.clone(),
            });

            let outcome = if dry_run {
                self.dry_run_item(&identifier, &action)
            } else {
                self.process_item(&identifier, &action, &cancel).await
            };

            if !outcome.is_success() {
                tracing::warn!(
                    identifier = %outcome.identifier,
                    action = %outcome.action,
                    kind = ?outcome.status.error_kind(),
                    attempts = outcome.attempts,
                    "Item did not succeed"
                );
            }
            self.emit_event(BatchEvent::ItemFinished {
                outcome: Box::new(outcome.clone()),
            });

            let mut guard = state.lock().await;
            guard.in_flight.remove(&task_id);
            self.record_outcome(&mut guard, outcome);
            drop(guard);
            progress.notify_waiters();
        }
    }

    /// Record a finished item and open the breaker when it trips
    fn record_outcome(&self, state: &mut RunState, outcome: OperationOutcome) {
        if state.report.record(outcome) {
            let consecutive_failures = state.report.consecutive_failures();
            let remaining = state.pending.len();
            tracing::warn!(
                consecutive_failures,
                remaining,
                "Circuit breaker tripped, skipping remaining items"
            );
            self.emit_event(BatchEvent::CircuitOpened {
                consecutive_failures,
                remaining,
            });
        }
    }

    /// Run one item through its action
    async fn process_item(
        &self,
        identifier: &ThreadIdentifier,
        action: &Action,
        cancel: &CancellationToken,
    ) -> OperationOutcome {
        match action {
            Action::Reply { body } => self.operations.reply_item(identifier, body, cancel).await,
            Action::Resolve => self.operations.resolution_item(identifier, true, cancel).await,
            Action::Unresolve => self.operations.resolution_item(identifier, false, cancel).await,
            Action::ReplyAndResolve { body } => {
                combined::reply_then_resolve(&self.operations, identifier, body, cancel).await
            }
        }
    }

    /// Classify and check compatibility only
    fn dry_run_item(&self, identifier: &ThreadIdentifier, action: &Action) -> OperationOutcome {
        let mut outcome = OperationOutcome::new(identifier.clone(), action.kind());
        outcome.dry_run = true;
        match self.operations.check_action(identifier, action.kind()) {
            Ok(()) => outcome,
            Err(e) => unsupported(outcome, &e),
        }
    }
}
