//! Reply-then-resolve workflow
//!
//! Each item moves through a small state machine:
//!
//! ```text
//! Pending -> Replying -> Replied -> Resolving -> Resolved
//!               |                       |
//!               v                       v
//!          ReplyFailed            ResolveFailed
//! ```
//!
//! A reply that fails leaves the thread untouched and the item `Failed`. A
//! resolve that fails after a posted reply leaves the item
//! `PartiallyCompleted`; the reply is never rolled back.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{BatchOptions, BatchOrchestrator};
use crate::error::{ErrorKind, Result};
use crate::identifier::ThreadIdentifier;
use crate::operations::{ThreadOperations, record_failure, unsupported};
use crate::types::{Action, ActionKind, BatchReport, OperationOutcome, OutcomeStatus, Step};

/// Where one item is in the reply-then-resolve workflow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinedState {
    /// Not started
    Pending,
    /// Reply in flight
    Replying,
    /// Reply could not be posted
    ReplyFailed,
    /// Reply posted, resolve not started
    Replied,
    /// Resolve in flight
    Resolving,
    /// Reply posted but resolve failed
    ResolveFailed,
    /// Both steps done
    Resolved,
}

impl CombinedState {
    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(self, next: CombinedState) -> bool {
        use CombinedState::*;
        matches!(
            (self, next),
            (Pending, Replying)
                | (Replying, ReplyFailed)
                | (Replying, Replied)
                | (Replied, Resolving)
                | (Replied, ResolveFailed)
                | (Resolving, ResolveFailed)
                | (Resolving, Resolved)
        )
    }

    /// Whether the item is finished
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CombinedState::ReplyFailed | CombinedState::ResolveFailed | CombinedState::Resolved
        )
    }
}

/// One item's progress, with transition tracing
struct Progress<'a> {
    identifier: &'a ThreadIdentifier,
    state: CombinedState,
}

impl Progress<'_> {
    fn advance(&mut self, next: CombinedState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {next:?}",
            self.state
        );
        tracing::trace!(identifier = %self.identifier, from = ?self.state, to = ?next, "Combined step");
        self.state = next;
    }
}

impl BatchOrchestrator {
    /// Reply to every thread, then resolve each thread whose reply succeeded
    pub async fn run_reply_and_resolve(
        &self,
        identifiers: &[ThreadIdentifier],
        body: &str,
        options: BatchOptions,
    ) -> Result<BatchReport> {
        let action = Action::ReplyAndResolve {
            body: body.to_string(),
        };
        self.run_batch(identifiers, action, options).await
    }
}

/// Drive one item through reply then resolve
pub(crate) async fn reply_then_resolve(
    operations: &ThreadOperations,
    identifier: &ThreadIdentifier,
    body: &str,
    cancel: &CancellationToken,
) -> OperationOutcome {
    let mut outcome = OperationOutcome::new(identifier.clone(), ActionKind::ReplyAndResolve);
    if let Err(e) = operations.check_action(identifier, ActionKind::ReplyAndResolve) {
        return unsupported(outcome, &e);
    }

    let mut progress = Progress {
        identifier,
        state: CombinedState::Pending,
    };

    progress.advance(CombinedState::Replying);
    outcome.reached = Some(Step::Reply);
    match operations.post_reply(identifier, body, cancel).await {
        Ok(done) => {
            outcome.attempts += done.attempts;
            outcome.reply = Some(done.value);
            progress.advance(CombinedState::Replied);
        }
        Err(failure) => {
            record_failure(&mut outcome, failure, None);
            progress.advance(CombinedState::ReplyFailed);
            return outcome;
        }
    }

    if cancel.is_cancelled() {
        outcome.status = OutcomeStatus::PartiallyCompleted {
            completed_step: Step::Reply,
            kind: ErrorKind::Cancelled,
            message: "batch cancelled after the reply was posted".to_string(),
        };
        progress.advance(CombinedState::ResolveFailed);
        return outcome;
    }

    progress.advance(CombinedState::Resolving);
    outcome.reached = Some(Step::Resolve);
    match operations.set_resolution(identifier, true, cancel).await {
        Ok(done) => {
            outcome.attempts += done.attempts;
            outcome.thread = Some(done.value);
            progress.advance(CombinedState::Resolved);
        }
        Err(failure) => {
            record_failure(&mut outcome, failure, Some(Step::Reply));
            progress.advance(CombinedState::ResolveFailed);
        }
    }

    debug_assert!(progress.state.is_terminal());
    outcome
}
