//! Shared test helpers: a scripted remote and ready-made operations.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{Config, RepositoryRef, RetryConfig};
use crate::error::{ErrorKind, RemoteError};
use crate::identifier::{ThreadIdentifier, classify};
use crate::operations::ThreadOperations;
use crate::remote::{OperationSpec, RemoteCall, RemoteRequest};

/// Remote stub that answers from per-target scripts
///
/// Responses are keyed by operation name and target id (the thread or
/// comment the operation acts on). Queued responses are consumed first, then
/// a sticky response if one is set, then a plausible default success.
#[derive(Default)]
pub(crate) struct ScriptedRemote {
    queued: Mutex<HashMap<(String, String), VecDeque<Result<Value, RemoteError>>>>,
    sticky: Mutex<HashMap<(String, String), Result<Value, RemoteError>>>,
    calls: Mutex<Vec<(String, String)>>,
    panics: Mutex<HashSet<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue one response for `operation` on `target`
    pub(crate) fn push(&self, operation: &str, target: &str, response: Result<Value, RemoteError>) {
        self.queued
            .lock()
            .unwrap()
            .entry((operation.to_string(), target.to_string()))
            .or_default()
            .push_back(response);
    }

    /// Answer every call of `operation` on `target` with `error`
    pub(crate) fn fail_always(&self, operation: &str, target: &str, error: RemoteError) {
        self.sticky
            .lock()
            .unwrap()
            .insert((operation.to_string(), target.to_string()), Err(error));
    }

    /// Panic inside any call that targets `target`
    pub(crate) fn panic_on(&self, target: &str) {
        self.panics.lock().unwrap().insert(target.to_string());
    }

    /// Total calls made
    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls made for one target, in order, as operation names
    pub(crate) fn calls_for(&self, target: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| t == target)
            .map(|(op, _)| op.clone())
            .collect()
    }

    /// Highest number of calls that were in flight at once
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn respond(&self, name: &str, target: &str) -> Result<Value, RemoteError> {
        let key = (name.to_string(), target.to_string());
        if let Some(response) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }
        if let Some(response) = self.sticky.lock().unwrap().get(&key) {
            return response.clone();
        }
        Ok(default_response(name, target))
    }
}

/// The id an operation acts on
pub(crate) fn target_of(op: &OperationSpec) -> String {
    match &op.request {
        RemoteRequest::GraphQl { variables, .. } => variables
            .get("threadId")
            .or_else(|| variables.get("commentId"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| op.name.clone()),
        RemoteRequest::Rest { path, .. } => path
            .split('/')
            .find(|segment| !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(path)
            .to_string(),
    }
}

/// A plausible success payload for each operation the crate issues
pub(crate) fn default_response(name: &str, target: &str) -> Value {
    let payload = match name {
        "resolveReviewThread" | "unresolveReviewThread" => json!({
            "thread": {"id": target, "isResolved": name == "resolveReviewThread"}
        }),
        "addPullRequestReviewThreadReply" | "addPullRequestReviewComment" => json!({
            "comment": {
                "id": format!("PRRC_reply{target}"),
                "body": "reply",
                "createdAt": "2024-05-01T10:00:00Z",
                "url": format!("https://github.com/o/r/pull/1#{target}"),
                "author": {"login": "bot"},
                "pullRequestReview": {"id": "PRR_kwDOReview"}
            }
        }),
        "reviewOfComment" => {
            return json!({"node": {"pullRequestReview": {"id": "PRR_kwDOReview"}}});
        }
        "createReplyForReviewComment" => {
            return json!({
                "id": 9001,
                "body": "reply",
                "html_url": format!("https://github.com/o/r/pull/1#discussion_r{target}"),
                "created_at": "2024-05-01T10:00:00Z",
                "user": {"login": "bot"}
            });
        }
        _ => return json!({}),
    };
    let mut data = serde_json::Map::new();
    data.insert(name.to_string(), payload);
    Value::Object(data)
}

#[async_trait]
impl RemoteCall for ScriptedRemote {
    async fn call(&self, op: &OperationSpec) -> Result<Value, RemoteError> {
        let target = target_of(op);
        self.calls
            .lock()
            .unwrap()
            .push((op.name.clone(), target.clone()));
        if self.panics.lock().unwrap().contains(&target) {
            panic!("scripted panic for {target}");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.respond(&op.name, &target)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Retry settings that keep tests fast
pub(crate) fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Operations over `remote` with fast retries and a repository configured
pub(crate) fn operations(remote: Arc<ScriptedRemote>) -> ThreadOperations {
    let config = Config {
        retry: fast_retry(),
        repository: Some(RepositoryRef::new("octo", "widgets")),
        ..Config::default()
    };
    ThreadOperations::new(remote, &config)
}

/// Classify a literal, panicking on invalid input
pub(crate) fn id(raw: &str) -> ThreadIdentifier {
    classify(raw).unwrap()
}

/// A transient error of the given kind
pub(crate) fn transient(kind: ErrorKind) -> RemoteError {
    assert!(kind.is_transient());
    RemoteError::new(kind, "scripted transient failure")
}

/// A permanent error of the given kind
pub(crate) fn permanent(kind: ErrorKind) -> RemoteError {
    assert!(!kind.is_transient());
    RemoteError::new(kind, "scripted permanent failure")
}
