//! Test configuration helpers for loading .env credentials and building configs

use std::time::Duration;
use review_batch::{Config, RemoteConfig, RepositoryRef, RetryConfig};

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Credentials and target for read-only live tests
#[derive(Debug, Clone)]
pub struct LiveTarget {
    /// Bearer token
    pub token: String,
    /// Repository holding the pull request
    pub repository: RepositoryRef,
    /// Pull request with at least one review thread
    pub pr_number: u64,
}

/// Load the live GitHub target from environment variables
///
/// Required environment variables:
/// - `GITHUB_TOKEN` - Token with read access to the repository
/// - `REVIEW_BATCH_REPO` - Repository as `owner/name`
/// - `REVIEW_BATCH_PR` - Pull request number
pub fn load_live_target() -> Result<LiveTarget, ConfigError> {
    dotenvy::dotenv().ok();

    let token = std::env::var("GITHUB_TOKEN")
        .map_err(|_| ConfigError("GITHUB_TOKEN not set in environment".to_string()))?;

    let repository = std::env::var("REVIEW_BATCH_REPO")
        .map_err(|_| ConfigError("REVIEW_BATCH_REPO not set in environment".to_string()))?
        .parse::<RepositoryRef>()
        .map_err(|e| ConfigError(e.to_string()))?;

    let pr_number = std::env::var("REVIEW_BATCH_PR")
        .map_err(|_| ConfigError("REVIEW_BATCH_PR not set in environment".to_string()))?
        .parse::<u64>()
        .map_err(|e| ConfigError(format!("REVIEW_BATCH_PR: {e}")))?;

    Ok(LiveTarget {
        token,
        repository,
        pr_number,
    })
}

/// Check whether live credentials are available
pub fn has_live_credentials() -> bool {
    load_live_target().is_ok()
}

/// Retry settings that keep tests fast
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Config with fast retries and the `octo/widgets` repository
pub fn test_config() -> Config {
    Config {
        retry: fast_retry(),
        repository: Some(RepositoryRef::new("octo", "widgets")),
        ..Config::default()
    }
}

/// Config pointing the HTTP transport at a mock server
pub fn mock_server_config(uri: &str) -> Config {
    Config {
        remote: RemoteConfig {
            api_url: uri.to_string(),
            timeout: Duration::from_secs(5),
            ..RemoteConfig::default()
        },
        ..test_config()
    }
}
