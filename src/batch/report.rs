//! Outcome accumulation and circuit-breaker bookkeeping

use chrono::{DateTime, Utc};

use crate::error::ErrorKind;
use crate::identifier::ThreadIdentifier;
use crate::types::{AbortPoint, ActionKind, BatchReport, OperationOutcome, OutcomeStatus};

/// Collects outcomes as items finish and tracks consecutive failures
///
/// Lives behind the batch mutex; every method is synchronous.
#[derive(Debug)]
pub(crate) struct ReportBuilder {
    action: ActionKind,
    requested: usize,
    duplicates_removed: usize,
    dry_run: bool,
    started_at: DateTime<Utc>,
    succeeded: Vec<OperationOutcome>,
    failed: Vec<OperationOutcome>,
    partial: Vec<OperationOutcome>,
    threshold: Option<usize>,
    consecutive_failures: usize,
    tripped_at: Option<usize>,
}

impl ReportBuilder {
    pub(crate) fn new(
        action: ActionKind,
        requested: usize,
        duplicates_removed: usize,
        dry_run: bool,
        threshold: Option<usize>,
    ) -> Self {
        Self {
            action,
            requested,
            duplicates_removed,
            dry_run,
            started_at: Utc::now(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            partial: Vec::new(),
            threshold,
            consecutive_failures: 0,
            tripped_at: None,
        }
    }

    /// Record one finished item
    ///
    /// Returns true when this outcome trips the breaker. A success resets the
    /// failure run; failed and partial items both extend it.
    pub(crate) fn record(&mut self, outcome: OperationOutcome) -> bool {
        match outcome.status {
            OutcomeStatus::Success => {
                self.consecutive_failures = 0;
                self.succeeded.push(outcome);
            }
            OutcomeStatus::Failed { .. } => {
                self.consecutive_failures += 1;
                self.failed.push(outcome);
            }
            OutcomeStatus::PartiallyCompleted { .. } => {
                self.consecutive_failures += 1;
                self.partial.push(outcome);
            }
        }

        match self.threshold {
            Some(threshold) if self.tripped_at.is_none() && self.consecutive_failures >= threshold => {
                self.tripped_at = Some(self.processed());
                true
            }
            _ => false,
        }
    }

    pub(crate) fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.partial.len()
    }

    pub(crate) fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    pub(crate) fn is_tripped(&self) -> bool {
        self.tripped_at.is_some()
    }

    /// Mark every undispatched item as aborted, without a remote call
    pub(crate) fn abort_remaining(&mut self, remaining: impl IntoIterator<Item = ThreadIdentifier>) -> AbortPoint {
        let threshold = self.threshold.unwrap_or_default();
        let mut skipped = 0;
        for identifier in remaining {
            self.failed.push(OperationOutcome::failed(
                identifier,
                self.action,
                ErrorKind::Aborted,
                format!("not attempted: {threshold} consecutive failures stopped the batch"),
            ));
            skipped += 1;
        }
        AbortPoint {
            threshold,
            processed: self.tripped_at.unwrap_or_else(|| self.processed()),
            skipped,
        }
    }

    pub(crate) fn finish(self, cancelled: bool, aborted: Option<AbortPoint>) -> BatchReport {
        let total = self.processed();
        BatchReport {
            action: self.action,
            requested: self.requested,
            duplicates_removed: self.duplicates_removed,
            total,
            succeeded: self.succeeded,
            failed: self.failed,
            partial: self.partial,
            started_at: self.started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            cancelled,
            aborted,
        }
    }
}
