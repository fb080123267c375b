//! Core types for review-batch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ErrorKind;
use crate::identifier::ThreadIdentifier;

/// A comment inside a review thread, as fetched from the remote
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Comment identifier
    pub id: ThreadIdentifier,
    /// Markdown body
    pub body: String,
    /// Author login (empty for deleted accounts)
    pub author: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last edit time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Web URL of the comment
    pub url: String,
    /// Id of the comment this one replies to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// A review thread snapshot
///
/// `is_resolved` reflects the remote state at fetch time only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewThread {
    /// Thread identifier
    pub id: ThreadIdentifier,
    /// Resolution flag as reported by the remote
    pub is_resolved: bool,
    /// Whether the thread points at code that has since changed
    #[serde(default)]
    pub is_outdated: bool,
    /// File the thread is attached to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Line the thread is attached to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Comments in thread order
    pub comments: Vec<Comment>,
}

impl ReviewThread {
    /// The comment that opened the thread
    pub fn first_comment(&self) -> Option<&Comment> {
        self.comments.first()
    }
}

/// Action requested for a batch, with its payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Post a reply on each thread
    Reply {
        /// Reply body
        body: String,
    },
    /// Mark each thread resolved
    Resolve,
    /// Mark each thread unresolved
    Unresolve,
    /// Reply, then resolve on reply success
    ReplyAndResolve {
        /// Reply body
        body: String,
    },
}

impl Action {
    /// Payload-free kind of this action
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Reply { .. } => ActionKind::Reply,
            Action::Resolve => ActionKind::Resolve,
            Action::Unresolve => ActionKind::Unresolve,
            Action::ReplyAndResolve { .. } => ActionKind::ReplyAndResolve,
        }
    }

    /// Reply body, if the action posts one
    pub fn reply_body(&self) -> Option<&str> {
        match self {
            Action::Reply { body } | Action::ReplyAndResolve { body } => Some(body),
            Action::Resolve | Action::Unresolve => None,
        }
    }
}

/// Payload-free action discriminant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Reply only
    Reply,
    /// Resolve only
    Resolve,
    /// Unresolve only
    Unresolve,
    /// Reply then resolve
    ReplyAndResolve,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ActionKind::Reply => "reply",
            ActionKind::Resolve => "resolve",
            ActionKind::Unresolve => "unresolve",
            ActionKind::ReplyAndResolve => "reply and resolve",
        })
    }
}

/// A single remote step an item goes through
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Posting a reply
    Reply,
    /// Resolving the thread
    Resolve,
    /// Unresolving the thread
    Unresolve,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Step::Reply => "reply",
            Step::Resolve => "resolve",
            Step::Unresolve => "unresolve",
        })
    }
}

/// Terminal status of one item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Every step succeeded
    Success,
    /// The item failed before any state change completed
    Failed {
        /// Failure classification
        kind: ErrorKind,
        /// Human-readable detail
        message: String,
    },
    /// A multi-step action succeeded partway and cannot be rolled back
    PartiallyCompleted {
        /// Last step that completed successfully
        completed_step: Step,
        /// Classification of the failure that stopped the item
        kind: ErrorKind,
        /// Human-readable detail
        message: String,
    },
}

impl OutcomeStatus {
    /// Failure kind, if the item did not fully succeed
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OutcomeStatus::Success => None,
            OutcomeStatus::Failed { kind, .. } | OutcomeStatus::PartiallyCompleted { kind, .. } => {
                Some(*kind)
            }
        }
    }
}

/// Result of a posted reply
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyReceipt {
    /// Id of the new comment
    pub reply_id: String,
    /// Web URL of the new comment
    pub url: String,
    /// Author login
    pub author: String,
    /// Creation timestamp as reported by the remote
    pub created_at: String,
    /// Review the reply was attached to, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_id: Option<String>,
    /// First 100 characters of the body
    pub body_preview: String,
}

/// Thread state as returned by a resolve/unresolve mutation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadState {
    /// Resolution flag reported by the remote
    pub is_resolved: bool,
}

/// Outcome of processing one identifier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// The item this outcome belongs to
    pub identifier: ThreadIdentifier,
    /// Action that was requested
    pub action: ActionKind,
    /// Terminal status
    #[serde(flatten)]
    pub status: OutcomeStatus,
    /// Remote call attempts made for this item (all steps)
    pub attempts: u32,
    /// Last step the item entered, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reached: Option<Step>,
    /// True when the item was validated only and no remote call was made
    #[serde(default)]
    pub dry_run: bool,
    /// True when the failure happened after exhausting transient retries
    #[serde(default)]
    pub retries_exhausted: bool,
    /// Reply result, for actions that post one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyReceipt>,
    /// Thread state after a resolve/unresolve mutation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadState>,
}

impl OperationOutcome {
    /// Start an outcome for the given item; status defaults to success
    pub fn new(identifier: ThreadIdentifier, action: ActionKind) -> Self {
        Self {
            identifier,
            action,
            status: OutcomeStatus::Success,
            attempts: 0,
            reached: None,
            dry_run: false,
            retries_exhausted: false,
            reply: None,
            thread: None,
        }
    }

    /// Outcome for an item that failed without reaching any remote step
    pub fn failed(
        identifier: ThreadIdentifier,
        action: ActionKind,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        let mut outcome = Self::new(identifier, action);
        outcome.status = OutcomeStatus::Failed {
            kind,
            message: message.into(),
        };
        outcome
    }

    /// Whether the item fully succeeded
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success)
    }

    /// Whether the item partially completed
    pub fn is_partial(&self) -> bool {
        matches!(self.status, OutcomeStatus::PartiallyCompleted { .. })
    }
}

/// Where a tripped circuit breaker stopped the batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortPoint {
    /// Configured consecutive-failure threshold
    pub threshold: usize,
    /// Items processed (with a real attempt) before the breaker tripped
    pub processed: usize,
    /// Items marked aborted without a remote call
    pub skipped: usize,
}

/// Aggregate result of one batch run
///
/// `succeeded.len() + failed.len() + partial.len() == total` always holds.
/// Outcomes appear in completion order; use [`BatchReport::restore_order`]
/// to get input order back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Requested action
    pub action: ActionKind,
    /// Number of identifiers supplied by the caller
    pub requested: usize,
    /// Identifiers dropped as duplicates
    pub duplicates_removed: usize,
    /// Number of outcomes in this report
    pub total: usize,
    /// Fully successful items
    pub succeeded: Vec<OperationOutcome>,
    /// Failed items, including circuit-breaker aborts
    pub failed: Vec<OperationOutcome>,
    /// Partially completed items
    pub partial: Vec<OperationOutcome>,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Whether the caller cancelled the run
    pub cancelled: bool,
    /// Circuit breaker abort point, if it tripped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<AbortPoint>,
}

impl BatchReport {
    /// Whether any item failed or partially completed
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || !self.partial.is_empty()
    }

    /// All outcomes, succeeded first, then failed, then partial
    pub fn outcomes(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.succeeded
            .iter()
            .chain(self.failed.iter())
            .chain(self.partial.iter())
    }

    /// Find the outcome for an identifier
    pub fn outcome_for(&self, identifier: &ThreadIdentifier) -> Option<&OperationOutcome> {
        self.outcomes().find(|o| &o.identifier == identifier)
    }

    /// Sort each outcome list by the position of its identifier in `order`
    ///
    /// Identifiers missing from `order` sort last, in their current order.
    pub fn restore_order(&mut self, order: &[ThreadIdentifier]) {
        let positions: HashMap<&ThreadIdentifier, usize> =
            order.iter().enumerate().rev().map(|(i, id)| (id, i)).collect();
        let key = |o: &OperationOutcome| positions.get(&o.identifier).copied().unwrap_or(usize::MAX);
        self.succeeded.sort_by_key(key);
        self.failed.sort_by_key(key);
        self.partial.sort_by_key(key);
    }

    /// Wall-clock duration of the run
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Progress events emitted by the batch orchestrator
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// A batch started
    BatchStarted {
        /// Requested action
        action: ActionKind,
        /// Items to process after deduplication
        total: usize,
        /// Whether this is a dry run
        dry_run: bool,
    },

    /// A worker picked up an item
    ItemStarted {
        /// Item identifier
        identifier: ThreadIdentifier,
    },

    /// An item reached a terminal status
    ItemFinished {
        /// The item's outcome
        outcome: Box<OperationOutcome>,
    },

    /// The circuit breaker tripped
    CircuitOpened {
        /// Consecutive failures that tripped it
        consecutive_failures: usize,
        /// Items that will be skipped
        remaining: usize,
    },

    /// The caller cancelled the batch
    BatchCancelled {
        /// Items completed before cancellation
        processed: usize,
    },

    /// A batch finished
    BatchFinished {
        /// Items that succeeded
        succeeded: usize,
        /// Items that failed
        failed: usize,
        /// Items that partially completed
        partial: usize,
    },
}
