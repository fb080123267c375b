//! Read-only tests against the real GitHub API
//!
//! These tests use credentials from .env and are marked #[ignore] to keep
//! them out of normal CI. Nothing is written to the target pull request.
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --features live-tests --test live_github -- --ignored --nocapture
//! ```
//!
//! # Required environment variables (.env file)
//!
//! - `GITHUB_TOKEN` - Token with read access to the repository
//! - `REVIEW_BATCH_REPO` - Repository as `owner/name`
//! - `REVIEW_BATCH_PR` - Pull request number with review threads

#![cfg(feature = "live-tests")]

mod common;

use common::{has_live_credentials, load_live_target};
use review_batch::{
    Action, BatchOptions, BatchOrchestrator, Config, FetchOptions, HttpTransport, ThreadOperations,
};
use serial_test::serial;
use std::sync::Arc;

fn live_config() -> Option<(Config, String, u64)> {
    let target = load_live_target().ok()?;
    let config = Config {
        repository: Some(target.repository),
        ..Config::default()
    };
    Some((config, target.token, target.pr_number))
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_fetch_review_threads() {
    if !has_live_credentials() {
        eprintln!("Skipping: GitHub credentials not found in .env");
        return;
    }
    let (config, token, pr_number) = live_config().unwrap();
    let remote = Arc::new(HttpTransport::new(&config.remote, &token).unwrap());
    let ops = ThreadOperations::new(remote, &config);

    let threads = ops
        .fetch_threads(pr_number, &FetchOptions::default().include_resolved(true))
        .await
        .unwrap();

    println!("PR #{pr_number}: {} review threads", threads.len());
    for thread in &threads {
        assert!(thread.id.is_thread(), "{} is not a thread id", thread.id);
    }
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_dry_run_over_unresolved_threads() {
    if !has_live_credentials() {
        eprintln!("Skipping: GitHub credentials not found in .env");
        return;
    }
    let (config, token, pr_number) = live_config().unwrap();
    let remote = Arc::new(HttpTransport::new(&config.remote, &token).unwrap());
    let batch = BatchOrchestrator::from_remote(remote, &config).unwrap();

    let report = batch
        .run_for_unresolved(pr_number, Action::Resolve, BatchOptions::default().dry_run(true))
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.failed.len(), 0, "every fetched thread id can be resolved");
    assert!(report.succeeded.iter().all(|o| o.dry_run && o.attempts == 0));
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_invalid_token_is_permission_denied() {
    if !has_live_credentials() {
        eprintln!("Skipping: GitHub credentials not found in .env");
        return;
    }
    let (config, _, pr_number) = live_config().unwrap();
    let remote = Arc::new(HttpTransport::new(&config.remote, "invalid_token_12345").unwrap());
    let ops = ThreadOperations::new(remote, &config);

    let err = ops
        .fetch_threads(pr_number, &FetchOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(review_batch::ErrorKind::PermissionDenied));
}
