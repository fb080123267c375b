//! Stub remote and response fixtures

use async_trait::async_trait;
use review_batch::remote::RemoteRequest;
use review_batch::{ErrorKind, OperationSpec, RemoteCall, RemoteError};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Thread ids with valid node-id encodings
pub const THREAD_A: &str = "PRRT_kwDOAAAAAAAAA";
pub const THREAD_B: &str = "PRRT_kwDOBBBBBBBBB";
pub const THREAD_C: &str = "PRRT_kwDOCCCCCCCCC";
pub const THREAD_D: &str = "PRRT_kwDODDDDDDDDD";

/// Remote stub that succeeds unless a failure is registered for the target
///
/// Resolution mutations echo the requested state; replies return a comment.
#[derive(Default)]
pub struct StubRemote {
    failures: Mutex<HashMap<(String, String), ErrorKind>>,
    calls: Mutex<Vec<(String, String)>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl StubRemote {
    /// A stub that answers every call immediately with success
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every `operation` on `target` with `kind`
    pub fn fail(&self, operation: &str, target: &str, kind: ErrorKind) {
        self.failures
            .lock()
            .unwrap()
            .insert((operation.to_string(), target.to_string()), kind);
    }

    /// Total number of calls
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Operation names called for `target`, in order
    pub fn calls_for(&self, target: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| t == target)
            .map(|(op, _)| op.clone())
            .collect()
    }

    /// Highest number of concurrent calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn target_of(op: &OperationSpec) -> String {
    match &op.request {
        RemoteRequest::GraphQl { variables, .. } => variables
            .get("threadId")
            .or_else(|| variables.get("commentId"))
            .and_then(Value::as_str)
            .unwrap_or(&op.name)
            .to_string(),
        RemoteRequest::Rest { path, .. } => path.clone(),
    }
}

#[async_trait]
impl RemoteCall for StubRemote {
    async fn call(&self, op: &OperationSpec) -> Result<Value, RemoteError> {
        let target = target_of(op);
        self.calls
            .lock()
            .unwrap()
            .push((op.name.clone(), target.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get(&(op.name.clone(), target.clone()))
            .copied();
        if let Some(kind) = failure {
            return Err(RemoteError::new(kind, format!("stubbed {kind} for {target}")));
        }

        Ok(match op.name.as_str() {
            "resolveReviewThread" => resolution_data("resolveReviewThread", &target, true),
            "unresolveReviewThread" => resolution_data("unresolveReviewThread", &target, false),
            "addPullRequestReviewThreadReply" => reply_data(&target),
            _ => json!({}),
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// `data` payload of a resolve/unresolve mutation
pub fn resolution_data(field: &str, thread_id: &str, resolved: bool) -> Value {
    let mut data = serde_json::Map::new();
    data.insert(
        field.to_string(),
        json!({"thread": {"id": thread_id, "isResolved": resolved}}),
    );
    Value::Object(data)
}

/// `data` payload of a thread reply mutation
pub fn reply_data(thread_id: &str) -> Value {
    json!({"addPullRequestReviewThreadReply": {"comment": {
        "id": format!("PRRC_reply_{thread_id}"),
        "body": "Thanks, fixed",
        "createdAt": "2024-05-01T10:00:00Z",
        "url": format!("https://github.com/octo/widgets/pull/7#{thread_id}"),
        "author": {"login": "maintainer"},
        "pullRequestReview": {"id": "PRR_kwDOReview01"}
    }}})
}

/// GraphQL envelope with `data`
pub fn graphql_ok(data: Value) -> Value {
    json!({ "data": data })
}

/// GraphQL envelope with one typed error and null data
pub fn graphql_error(error_type: &str, message: &str) -> Value {
    json!({
        "data": null,
        "errors": [{"type": error_type, "message": message}]
    })
}
