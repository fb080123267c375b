//! Single-item thread operations
//!
//! [`ThreadOperations`] turns one identifier plus one action into one
//! [`OperationOutcome`]. It checks that the identifier kind supports the
//! action, builds the remote operation, runs it under the retry policy, and
//! interprets the response. Per-item failures land in the outcome; only
//! caller input problems (an invalid reply body, bad fetch options) surface
//! as [`Error`].

use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, RepositoryRef};
use crate::error::{Error, ErrorKind, RemoteError, Result};
use crate::identifier::{NodeKind, ThreadIdentifier};
use crate::remote::{OperationSpec, RemoteCall};
use crate::retry::{Attempted, RetryFailure, RetryPolicy};
use crate::types::{ActionKind, OperationOutcome, OutcomeStatus, ReplyReceipt, ReviewThread, Step, ThreadState};

pub mod fetch;
mod mutations;

pub use fetch::FetchOptions;

/// Longest reply body the platform accepts, in characters
pub const MAX_REPLY_BODY_LENGTH: usize = 65_536;

/// Result of one logical remote step, with the attempts it took
pub(crate) type StepResult<T> = std::result::Result<Attempted<T>, RetryFailure<RemoteError>>;

/// Check a reply body before any remote call is made
pub fn validate_reply_body(body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Err(Error::InvalidInput {
            field: "reply body".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    let length = body.chars().count();
    if length > MAX_REPLY_BODY_LENGTH {
        return Err(Error::InvalidInput {
            field: "reply body".to_string(),
            message: format!("{length} characters exceeds the limit of {MAX_REPLY_BODY_LENGTH}"),
        });
    }
    Ok(())
}

/// Executes reply, resolve, unresolve, and fetch against a remote
#[derive(Clone)]
pub struct ThreadOperations {
    remote: Arc<dyn RemoteCall>,
    retry: RetryPolicy,
    repository: Option<RepositoryRef>,
}

impl std::fmt::Debug for ThreadOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadOperations")
            .field("remote", &self.remote.name())
            .field("retry", &self.retry)
            .field("repository", &self.repository)
            .finish()
    }
}

impl ThreadOperations {
    /// Create operations over a remote, using the retry settings and
    /// repository from `config`
    pub fn new(remote: Arc<dyn RemoteCall>, config: &Config) -> Self {
        Self {
            remote,
            retry: RetryPolicy::new(config.retry.clone()),
            repository: config.repository.clone(),
        }
    }

    /// Replace the repository used for numeric replies and fetches
    pub fn with_repository(mut self, repository: RepositoryRef) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Repository used for numeric replies and fetches
    pub fn repository(&self) -> Option<&RepositoryRef> {
        self.repository.as_ref()
    }

    /// Retry policy applied to every remote call
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Check that `identifier` can go through `step`
    ///
    /// Returns [`Error::UnsupportedIdentifierKind`] otherwise; no remote call
    /// is ever made for an incompatible identifier.
    pub fn check_step(&self, identifier: &ThreadIdentifier, step: Step) -> Result<()> {
        let reason = match (step, identifier) {
            (Step::Resolve | Step::Unresolve, id) if id.is_thread() => return Ok(()),
            (Step::Resolve | Step::Unresolve, _) => {
                "only review threads (RT_, PRT_, PRRT_) can change resolution state"
            }
            (Step::Reply, ThreadIdentifier::NodeId { kind, .. }) => match kind {
                NodeKind::ReviewThread | NodeKind::PullRequestReviewThread | NodeKind::ReviewComment => {
                    return Ok(());
                }
                NodeKind::IssueComment => "issue comments are not part of a review thread",
            },
            (Step::Reply, ThreadIdentifier::LegacyNumericId { .. }) if self.repository.is_some() => {
                return Ok(());
            }
            (Step::Reply, ThreadIdentifier::LegacyNumericId { .. }) => {
                "numeric comment ids need a configured repository"
            }
        };

        Err(Error::UnsupportedIdentifierKind {
            identifier: identifier.to_string(),
            kind: identifier.kind_label().to_string(),
            action: step.to_string(),
            reason: reason.to_string(),
        })
    }

    /// Check every step an action needs
    pub fn check_action(&self, identifier: &ThreadIdentifier, action: ActionKind) -> Result<()> {
        for step in steps_of(action) {
            self.check_step(identifier, *step)?;
        }
        Ok(())
    }

    /// Post a reply on a thread or comment
    ///
    /// Fails with [`Error::InvalidInput`] when the body is empty or too long.
    pub async fn reply(&self, identifier: &ThreadIdentifier, body: &str) -> Result<OperationOutcome> {
        validate_reply_body(body)?;
        Ok(self
            .reply_item(identifier, body, &CancellationToken::new())
            .await)
    }

    /// Mark a thread resolved; resolving a resolved thread succeeds
    pub async fn resolve(&self, identifier: &ThreadIdentifier) -> OperationOutcome {
        self.resolution_item(identifier, true, &CancellationToken::new())
            .await
    }

    /// Mark a thread unresolved; unresolving an open thread succeeds
    pub async fn unresolve(&self, identifier: &ThreadIdentifier) -> OperationOutcome {
        self.resolution_item(identifier, false, &CancellationToken::new())
            .await
    }

    /// List the review threads of a pull request in API order
    ///
    /// Resolved threads are dropped unless `options.include_resolved` is set.
    pub async fn fetch_threads(&self, pr_number: u64, options: &FetchOptions) -> Result<Vec<ReviewThread>> {
        options.validate()?;
        if pr_number == 0 {
            return Err(Error::InvalidInput {
                field: "pull request number".to_string(),
                message: "must be positive".to_string(),
            });
        }
        let repository = self.repository.as_ref().ok_or_else(|| Error::Config {
            message: "a repository is required to fetch review threads".to_string(),
            key: Some("repository".to_string()),
        })?;

        let cancel = CancellationToken::new();
        let mut threads = Vec::new();
        let mut examined = 0;
        let mut cursor: Option<String> = None;

        loop {
            let first = (options.limit - examined).min(fetch::MAX_PAGE_SIZE);
            let op = fetch::page_query(
                repository,
                pr_number,
                first,
                cursor.as_deref(),
                options.comment_limit,
            );
            let response = self
                .call(&op, &cancel)
                .await
                .map_err(|failure| Error::Remote(failure.into_error()))?;
            let page = fetch::parse_page(&op, &response.value, pr_number)?;

            if page.threads.is_empty() {
                break;
            }
            examined += page.threads.len();
            threads.extend(
                page.threads
                    .into_iter()
                    .filter(|t| options.include_resolved || !t.is_resolved),
            );

            match page.next_cursor {
                Some(next) if examined < options.limit => cursor = Some(next),
                _ => break,
            }
        }

        tracing::info!(
            repository = %repository,
            pr_number,
            examined,
            returned = threads.len(),
            include_resolved = options.include_resolved,
            "Fetched review threads"
        );

        Ok(threads)
    }

    /// Reply as one item of a batch; the body has already been validated
    pub(crate) async fn reply_item(
        &self,
        identifier: &ThreadIdentifier,
        body: &str,
        cancel: &CancellationToken,
    ) -> OperationOutcome {
        let mut outcome = OperationOutcome::new(identifier.clone(), ActionKind::Reply);
        if let Err(e) = self.check_step(identifier, Step::Reply) {
            return unsupported(outcome, &e);
        }

        outcome.reached = Some(Step::Reply);
        match self.post_reply(identifier, body, cancel).await {
            Ok(done) => {
                outcome.attempts = done.attempts;
                outcome.reply = Some(done.value);
            }
            Err(failure) => record_failure(&mut outcome, failure, None),
        }
        outcome
    }

    /// Resolve or unresolve as one item of a batch
    pub(crate) async fn resolution_item(
        &self,
        identifier: &ThreadIdentifier,
        resolved: bool,
        cancel: &CancellationToken,
    ) -> OperationOutcome {
        let (action, step) = if resolved {
            (ActionKind::Resolve, Step::Resolve)
        } else {
            (ActionKind::Unresolve, Step::Unresolve)
        };
        let mut outcome = OperationOutcome::new(identifier.clone(), action);
        if let Err(e) = self.check_step(identifier, step) {
            return unsupported(outcome, &e);
        }

        outcome.reached = Some(step);
        match self.set_resolution(identifier, resolved, cancel).await {
            Ok(done) => {
                outcome.attempts = done.attempts;
                outcome.thread = Some(done.value);
            }
            Err(failure) => record_failure(&mut outcome, failure, None),
        }
        outcome
    }

    /// Post a reply, routing by identifier kind
    pub(crate) async fn post_reply(
        &self,
        identifier: &ThreadIdentifier,
        body: &str,
        cancel: &CancellationToken,
    ) -> StepResult<ReplyReceipt> {
        let body = body.trim();
        match identifier {
            ThreadIdentifier::NodeId { id, kind } if kind.is_thread() => {
                let op = mutations::thread_reply(id, body);
                let done = self.call(&op, cancel).await?;
                parse_with(done, |data| mutations::parse_graphql_reply(&op, data))
            }
            ThreadIdentifier::NodeId { id, .. } => {
                let lookup = mutations::review_of_comment(id);
                let found = self.call(&lookup, cancel).await?;
                let prior = found.attempts;
                let review = parse_with(found, |data| mutations::parse_review_id(&lookup, data, id))?;

                let op = mutations::comment_reply(&review.value, id, body);
                let done = self
                    .call(&op, cancel)
                    .await
                    .map_err(|f| f.with_prior_attempts(prior))?;
                let mut posted = parse_with(done, |data| mutations::parse_graphql_reply(&op, data))
                    .map_err(|f| f.with_prior_attempts(prior))?;
                posted.attempts += prior;
                Ok(posted)
            }
            ThreadIdentifier::LegacyNumericId { id } => {
                let Some(repository) = self.repository.as_ref() else {
                    return Err(RetryFailure::Permanent {
                        error: RemoteError::new(
                            ErrorKind::UnsupportedIdentifierKind,
                            "numeric comment ids need a configured repository",
                        ),
                        attempts: 0,
                    });
                };
                let op = mutations::numeric_reply(repository, *id, body);
                let done = self.call(&op, cancel).await?;
                parse_with(done, |data| mutations::parse_rest_reply(&op, data))
            }
        }
    }

    /// Set a thread's resolution flag
    pub(crate) async fn set_resolution(
        &self,
        identifier: &ThreadIdentifier,
        resolved: bool,
        cancel: &CancellationToken,
    ) -> StepResult<ThreadState> {
        let op = mutations::set_resolution(&identifier.as_canonical(), resolved);
        let done = self.call(&op, cancel).await?;
        parse_with(done, |data| mutations::parse_resolution(&op, data, resolved))
    }

    async fn call(&self, op: &OperationSpec, cancel: &CancellationToken) -> StepResult<Value> {
        tracing::debug!(operation = %op.name, remote = self.remote.name(), "Calling remote");
        self.retry
            .execute_cancellable(cancel, || self.remote.call(op))
            .await
    }
}

/// Steps an action goes through, in order
pub(crate) fn steps_of(action: ActionKind) -> &'static [Step] {
    match action {
        ActionKind::Reply => &[Step::Reply],
        ActionKind::Resolve => &[Step::Resolve],
        ActionKind::Unresolve => &[Step::Unresolve],
        ActionKind::ReplyAndResolve => &[Step::Reply, Step::Resolve],
    }
}

/// Interpret a successful call; a malformed response is a permanent failure
fn parse_with<T>(
    done: Attempted<Value>,
    parse: impl FnOnce(&Value) -> std::result::Result<T, RemoteError>,
) -> StepResult<T> {
    match parse(&done.value) {
        Ok(value) => Ok(Attempted {
            value,
            attempts: done.attempts,
        }),
        Err(error) => Err(RetryFailure::Permanent {
            error,
            attempts: done.attempts,
        }),
    }
}

/// Mark an outcome as failed because the identifier kind cannot take the action
pub(crate) fn unsupported(mut outcome: OperationOutcome, error: &Error) -> OperationOutcome {
    outcome.status = OutcomeStatus::Failed {
        kind: ErrorKind::UnsupportedIdentifierKind,
        message: error.to_string(),
    };
    outcome
}

/// Fold a step failure into an outcome
///
/// With `completed` set, the outcome becomes `PartiallyCompleted` after that
/// step; otherwise it is `Failed`.
pub(crate) fn record_failure(
    outcome: &mut OperationOutcome,
    failure: RetryFailure<RemoteError>,
    completed: Option<Step>,
) {
    outcome.attempts += failure.attempts();
    outcome.retries_exhausted = failure.is_exhausted();
    let kind = if failure.is_cancelled() {
        ErrorKind::Cancelled
    } else {
        failure.error().kind
    };
    let message = failure.into_error().to_string();

    outcome.status = match completed {
        Some(completed_step) => OutcomeStatus::PartiallyCompleted {
            completed_step,
            kind,
            message,
        },
        None => OutcomeStatus::Failed { kind, message },
    };
}
