//! Transport that shells out to the `gh` CLI

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{OperationSpec, RemoteCall, RemoteRequest, classify_message, graphql_data};
use crate::config::RemoteConfig;
use crate::error::{Error, ErrorKind, RemoteError, Result};

#[allow(clippy::expect_used)]
static HTTP_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"HTTP (\d{3})").expect("Invalid HTTP status regex"));

/// Remote transport backed by the external `gh` binary
///
/// Authentication, host selection, and proxy settings all belong to `gh`.
/// The request body is fed on stdin (`--input -`) so reply bodies never
/// appear on a command line.
///
/// # Examples
///
/// ```no_run
/// use review_batch::remote::{GhCliTransport, RemoteCall};
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// // Create with explicit path
/// let transport = GhCliTransport::new(PathBuf::from("/usr/bin/gh"), Duration::from_secs(30));
///
/// // Or auto-discover from PATH
/// let transport = GhCliTransport::from_path().expect("gh not found in PATH");
/// assert_eq!(transport.name(), "gh-cli");
/// ```
#[derive(Clone, Debug)]
pub struct GhCliTransport {
    binary_path: PathBuf,
    timeout: Duration,
}

impl GhCliTransport {
    /// Create a transport with an explicit binary path and per-call timeout
    pub fn new(binary_path: PathBuf, timeout: Duration) -> Self {
        Self {
            binary_path,
            timeout,
        }
    }

    /// Attempt to find `gh` in PATH, using the default 30s timeout
    pub fn from_path() -> Option<Self> {
        which::which("gh")
            .ok()
            .map(|path| Self::new(path, RemoteConfig::default().timeout))
    }

    /// Build from configuration: the configured binary if set, otherwise PATH
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let binary_path = match &config.gh_binary {
            Some(path) => path.clone(),
            None => which::which("gh")
                .map_err(|e| Error::ExternalTool(format!("gh not found in PATH: {e}")))?,
        };
        Ok(Self::new(binary_path, config.timeout))
    }

    /// Path of the binary this transport runs
    pub fn binary_path(&self) -> &PathBuf {
        &self.binary_path
    }
}

/// Command-line arguments for an operation
fn command_args(op: &OperationSpec) -> Vec<String> {
    match &op.request {
        RemoteRequest::GraphQl { .. } => ["api", "graphql", "--input", "-"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        RemoteRequest::Rest { method, path, body } => {
            let mut args = vec![
                "api".to_string(),
                path.trim_start_matches('/').to_string(),
                "--method".to_string(),
                method.as_str().to_string(),
            ];
            if body.is_some() {
                args.push("--input".to_string());
                args.push("-".to_string());
            }
            args
        }
    }
}

/// JSON document written to stdin, if the operation has one
fn stdin_payload(op: &OperationSpec) -> Option<Value> {
    match &op.request {
        RemoteRequest::GraphQl {
            document,
            variables,
        } => Some(json!({ "query": document, "variables": variables })),
        RemoteRequest::Rest { body, .. } => body.clone(),
    }
}

/// Classify a failed `gh` invocation from its stderr
fn classify_stderr(operation: &str, stderr: &str) -> RemoteError {
    let raw = stderr.trim();
    let lower = raw.to_lowercase();
    let message = format!("{operation}: {raw}");

    if let Some(status) = HTTP_STATUS
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
    {
        return RemoteError::from_status(status, message, lower.contains("rate limit"));
    }

    let kind = if lower.contains("gh auth login") || lower.contains("authentication") {
        ErrorKind::PermissionDenied
    } else if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("no such host")
    {
        ErrorKind::Network
    } else {
        classify_message(&lower)
    };
    RemoteError::new(kind, message)
}

#[async_trait]
impl RemoteCall for GhCliTransport {
    async fn call(&self, op: &OperationSpec) -> std::result::Result<Value, RemoteError> {
        let payload = stdin_payload(op)
            .map(|v| serde_json::to_vec(&v))
            .transpose()
            .map_err(|e| RemoteError::new(ErrorKind::Validation, format!("{}: {e}", op.name)))?;

        tracing::debug!(operation = %op.name, transport = self.name(), "Running gh api");

        let mut child = Command::new(&self.binary_path)
            .args(command_args(op))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RemoteError::new(
                    ErrorKind::Validation,
                    format!("failed to execute {}: {e}", self.binary_path.display()),
                )
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Some(payload) = payload {
                stdin.write_all(&payload).await.map_err(|e| {
                    RemoteError::new(ErrorKind::Network, format!("{}: writing to gh: {e}", op.name))
                })?;
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                RemoteError::new(
                    ErrorKind::Timeout,
                    format!("{}: gh did not finish within {:?}", op.name, self.timeout),
                )
            })?
            .map_err(|e| RemoteError::new(ErrorKind::Network, format!("{}: {e}", op.name)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed = serde_json::from_str::<Value>(stdout.trim()).ok();

        if !output.status.success() {
            // gh exits non-zero on GraphQL errors but still prints the envelope
            if let (RemoteRequest::GraphQl { .. }, Some(envelope)) = (&op.request, parsed) {
                if envelope.get("errors").is_some() {
                    return graphql_data(&op.name, envelope);
                }
            }
            return Err(classify_stderr(&op.name, &String::from_utf8_lossy(&output.stderr)));
        }

        match (&op.request, parsed) {
            (RemoteRequest::GraphQl { .. }, Some(envelope)) => graphql_data(&op.name, envelope),
            (RemoteRequest::Rest { .. }, Some(body)) => Ok(body),
            (RemoteRequest::Rest { .. }, None) if stdout.trim().is_empty() => Ok(Value::Null),
            (_, None) => Err(RemoteError::new(
                ErrorKind::Validation,
                format!("{}: gh printed a non-JSON response", op.name),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "gh-cli"
    }
}
