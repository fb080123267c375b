//! Batch orchestration over many review threads
//!
//! [`BatchOrchestrator`] takes a list of identifiers and one [`Action`],
//! deduplicates the list, and drives each item through
//! [`ThreadOperations`] on a bounded pool of workers. Every item ends in
//! exactly one [`OperationOutcome`](crate::types::OperationOutcome), collected
//! into a [`BatchReport`].
//!
//! Progress is published on a broadcast channel; see
//! [`BatchOrchestrator::subscribe`].
//!
//! Per-item failures never fail the batch. Only caller input problems
//! (invalid identifiers, an invalid reply body, out-of-range options) are
//! returned as [`Error`](crate::error::Error).

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{BatchConfig, Config, validate_breaker_threshold, validate_concurrency};
use crate::error::Result;
use crate::identifier::{ThreadIdentifier, classify_all};
use crate::operations::fetch::MAX_THREAD_LIMIT;
use crate::operations::{FetchOptions, ThreadOperations, validate_reply_body};
use crate::remote::RemoteCall;
use crate::types::{Action, BatchEvent, BatchReport};

mod combined;
mod report;
mod worker;

pub use combined::CombinedState;

/// Per-run knobs, seeded from [`BatchConfig`]
#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Items processed concurrently, 1..=32
    pub concurrency_limit: usize,

    /// Stop dispatching after this many consecutive non-success items
    pub stop_after_consecutive_failures: Option<usize>,

    /// Validate and classify only; never call the remote
    pub dry_run: bool,

    /// Cancels the run; in-flight items finish, queued items are dropped
    pub cancel: CancellationToken,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from(&BatchConfig::default())
    }
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            concurrency_limit: config.concurrency_limit,
            stop_after_consecutive_failures: config.stop_after_consecutive_failures,
            dry_run: config.dry_run,
            cancel: CancellationToken::new(),
        }
    }
}

impl BatchOptions {
    /// Set the concurrency limit
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Trip the circuit breaker after `threshold` consecutive failures
    pub fn circuit_breaker(mut self, threshold: usize) -> Self {
        self.stop_after_consecutive_failures = Some(threshold);
        self
    }

    /// Toggle dry-run mode
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Use `token` to cancel the run
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_concurrency(self.concurrency_limit)?;
        validate_breaker_threshold(self.stop_after_consecutive_failures)
    }
}

/// Runs one action over many identifiers with bounded concurrency
#[derive(Clone, Debug)]
pub struct BatchOrchestrator {
    operations: Arc<ThreadOperations>,
    config: BatchConfig,
    event_tx: broadcast::Sender<BatchEvent>,
}

impl BatchOrchestrator {
    /// Create an orchestrator over existing operations
    pub fn new(operations: ThreadOperations, config: &Config) -> Self {
        let (event_tx, _rx) = broadcast::channel(config.batch.event_capacity.max(1));
        Self {
            operations: Arc::new(operations),
            config: config.batch.clone(),
            event_tx,
        }
    }

    /// Validate `config` and build operations plus orchestrator over `remote`
    pub fn from_remote(remote: Arc<dyn RemoteCall>, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(ThreadOperations::new(remote, config), config))
    }

    /// The single-item operations this orchestrator drives
    pub fn operations(&self) -> &ThreadOperations {
        &self.operations
    }

    /// Options seeded from the configured batch defaults
    pub fn options(&self) -> BatchOptions {
        BatchOptions::from(&self.config)
    }

    /// Subscribe to progress events
    ///
    /// Events sent while nobody is subscribed are dropped. A slow subscriber
    /// that falls more than the channel capacity behind sees
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit_event(&self, event: BatchEvent) {
        self.event_tx.send(event).ok();
    }

    /// Apply `action` to every identifier
    ///
    /// Duplicates are dropped (first occurrence wins) before any work starts.
    /// Outcomes are reported in completion order.
    pub async fn run_batch(
        &self,
        identifiers: &[ThreadIdentifier],
        action: Action,
        options: BatchOptions,
    ) -> Result<BatchReport> {
        options.validate()?;
        if let Some(body) = action.reply_body() {
            validate_reply_body(body)?;
        }

        let (items, duplicates_removed) = dedupe(identifiers);
        if duplicates_removed > 0 {
            tracing::debug!(duplicates_removed, "Dropped duplicate identifiers");
        }

        Ok(self
            .execute(items, identifiers.len(), duplicates_removed, action, options)
            .await)
    }

    /// Classify raw identifier strings, then run the batch
    ///
    /// Any unparseable identifier fails the whole call before work starts.
    pub async fn run_batch_raw<S: AsRef<str>>(
        &self,
        raw: &[S],
        action: Action,
        options: BatchOptions,
    ) -> Result<BatchReport> {
        let identifiers = classify_all(raw)?;
        self.run_batch(&identifiers, action, options).await
    }

    /// Apply `action` to every unresolved thread of a pull request
    pub async fn run_for_unresolved(
        &self,
        pr_number: u64,
        action: Action,
        options: BatchOptions,
    ) -> Result<BatchReport> {
        let fetch = FetchOptions::default().limit(MAX_THREAD_LIMIT);
        let threads = self.operations.fetch_threads(pr_number, &fetch).await?;
        let identifiers: Vec<ThreadIdentifier> = threads.into_iter().map(|t| t.id).collect();

        tracing::info!(
            pr_number,
            threads = identifiers.len(),
            action = %action.kind(),
            "Running batch over unresolved threads"
        );

        self.run_batch(&identifiers, action, options).await
    }
}

/// Drop repeated identifiers, keeping the first occurrence
fn dedupe(identifiers: &[ThreadIdentifier]) -> (Vec<ThreadIdentifier>, usize) {
    let mut seen = HashSet::with_capacity(identifiers.len());
    let items: Vec<ThreadIdentifier> = identifiers
        .iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect();
    let removed = identifiers.len() - items.len();
    (items, removed)
}
