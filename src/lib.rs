//! # review-batch
//!
//! Batch reply and resolve orchestration for pull request review threads.
//!
//! ## Design Philosophy
//!
//! review-batch is designed to be:
//! - **Failure-isolating** - One bad thread never sinks the rest of a batch
//! - **Retry-aware** - Rate limits and flaky networks are retried with backoff
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to progress events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use review_batch::{Action, BatchOptions, BatchOrchestrator, Config, HttpTransport, RepositoryRef};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         repository: Some(RepositoryRef::new("octo", "widgets")),
//!         ..Default::default()
//!     };
//!     let remote = HttpTransport::new(&config.remote, "ghp_example")?;
//!     let batch = BatchOrchestrator::from_remote(Arc::new(remote), &config)?;
//!
//!     // Subscribe to events
//!     let mut events = batch.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = batch
//!         .run_batch_raw(
//!             &["PRRT_kwDOABcD12MAAAABcDE3fg", "PRRT_kwDOABcD12MAAAABcDE3fh"],
//!             Action::Resolve,
//!             BatchOptions::default(),
//!         )
//!         .await?;
//!
//!     println!("{} of {} resolved", report.succeeded.len(), report.total);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Batch orchestration and the reply-then-resolve workflow
pub mod batch;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Identifier classification
pub mod identifier;
/// Single-item thread operations
pub mod operations;
/// Remote call primitive and transports
pub mod remote;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use batch::{BatchOptions, BatchOrchestrator, CombinedState};
pub use config::{BatchConfig, Config, RemoteConfig, RepositoryRef, RetryConfig};
pub use error::{Error, ErrorKind, RemoteError, Result};
pub use identifier::{NodeKind, ThreadIdentifier, accepted_formats, classify, classify_all};
pub use operations::{FetchOptions, ThreadOperations};
pub use remote::{GhCliTransport, HttpTransport, OperationSpec, RemoteCall};
pub use retry::{IsRetryable, RetryPolicy};
pub use types::{
    AbortPoint, Action, ActionKind, BatchEvent, BatchReport, Comment, OperationOutcome,
    OutcomeStatus, ReplyReceipt, ReviewThread, Step, ThreadState,
};
