//! Configuration types for review-batch
//!
//! Everything here is a plain constructor/call parameter. The library never
//! reads configuration from disk or the environment; callers build a
//! [`Config`] (or deserialize one from wherever they keep it) and hand it over.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, sync::LazyLock, time::Duration};

/// Upper bound for the batch worker pool
pub const MAX_CONCURRENCY: usize = 32;

/// Top-level configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API / transport settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Retry behavior for transient remote failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Batch orchestration defaults
    #[serde(default)]
    pub batch: BatchConfig,

    /// Repository the pull requests live in
    ///
    /// Needed for fetching threads and for replying to legacy numeric comment
    /// ids; node-id operations work without it.
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
}

impl Config {
    /// Check that every setting is within its accepted range
    pub fn validate(&self) -> Result<()> {
        self.remote.validate()?;
        self.retry.validate()?;
        self.batch.validate()?;
        Ok(())
    }
}

/// Remote API settings shared by the transports
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the REST API; GraphQL is served at `{api_url}/graphql`
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Per-call timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent by the HTTP transport
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Explicit path to the `gh` binary (None = search PATH)
    #[serde(default)]
    pub gh_binary: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            gh_binary: None,
        }
    }
}

impl RemoteConfig {
    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api_url).map_err(|e| Error::Config {
            message: format!("api_url {:?} is not a valid URL: {e}", self.api_url),
            key: Some("remote.api_url".to_string()),
        })?;
        if self.timeout.is_zero() {
            return Err(Error::Config {
                message: "timeout must be greater than zero".to_string(),
                key: Some("remote.timeout".to_string()),
            });
        }
        Ok(())
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_ms")]
    pub initial_delay: Duration,

    /// Maximum backoff delay between retries (default: 60 seconds)
    ///
    /// A server-supplied retry-after hint may exceed this cap.
    #[serde(default = "default_max_delay", with = "duration_ms")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".to_string(),
                key: Some("retry.max_attempts".to_string()),
            });
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(Error::Config {
                message: format!(
                    "backoff_multiplier must be a finite number >= 1.0, got {}",
                    self.backoff_multiplier
                ),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }
}

/// Batch orchestration defaults
///
/// These seed [`BatchOptions`](crate::batch::BatchOptions); every field can be
/// overridden per call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of items processed concurrently (default: 3, max: 32)
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Stop dispatching after this many consecutive failed items (None = never)
    #[serde(default)]
    pub stop_after_consecutive_failures: Option<usize>,

    /// Validate and classify only; never call the remote
    #[serde(default)]
    pub dry_run: bool,

    /// Capacity of the progress event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            stop_after_consecutive_failures: None,
            dry_run: false,
            event_capacity: default_event_capacity(),
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<()> {
        validate_concurrency(self.concurrency_limit)?;
        validate_breaker_threshold(self.stop_after_consecutive_failures)?;
        if self.event_capacity == 0 {
            return Err(Error::Config {
                message: "event_capacity must be at least 1".to_string(),
                key: Some("batch.event_capacity".to_string()),
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_concurrency(limit: usize) -> Result<()> {
    if limit == 0 || limit > MAX_CONCURRENCY {
        return Err(Error::Config {
            message: format!("concurrency_limit must be between 1 and {MAX_CONCURRENCY}, got {limit}"),
            key: Some("batch.concurrency_limit".to_string()),
        });
    }
    Ok(())
}

pub(crate) fn validate_breaker_threshold(threshold: Option<usize>) -> Result<()> {
    if threshold == Some(0) {
        return Err(Error::Config {
            message: "stop_after_consecutive_failures must be at least 1 when set".to_string(),
            key: Some("batch.stop_after_consecutive_failures".to_string()),
        });
    }
    Ok(())
}

/// Repository coordinates (`owner/name`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub name: String,
}

impl RepositoryRef {
    /// Create a repository reference
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// https://github.com/owner/repo(.git) and git@github.com:owner/repo.git
#[allow(clippy::expect_used)]
static REPOSITORY_URL: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"github\.com[:/]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$")
        .expect("Invalid repository URL regex")
});

#[allow(clippy::expect_used)]
static REPOSITORY_SHORT: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)$")
        .expect("Invalid repository regex")
});

impl FromStr for RepositoryRef {
    type Err = Error;

    /// Accepts `owner/repo`, HTTPS clone URLs and SSH clone URLs
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        for pattern in [&*REPOSITORY_URL, &*REPOSITORY_SHORT] {
            if let Some(caps) = pattern.captures(s) {
                let owner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                if !owner.is_empty() && !name.is_empty() {
                    return Ok(Self::new(owner, name));
                }
            }
        }
        Err(Error::Config {
            message: format!("invalid repository {s:?}, expected owner/repo or a GitHub URL"),
            key: Some("repository".to_string()),
        })
    }
}

// Default value functions
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("review-batch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_concurrency_limit() -> usize {
    3
}

fn default_event_capacity() -> usize {
    256
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for backoff delays)
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

// Optional Duration serialization helper (milliseconds)
pub(crate) mod optional_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => {
                serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}
