//! Remote call primitive
//!
//! Everything that talks to the code-review platform goes through
//! [`RemoteCall`]: one query or mutation in, one JSON document (or a typed
//! [`RemoteError`]) out. Two transports ship with the crate:
//!
//! - [`HttpTransport`]: direct HTTPS calls with a caller-supplied token
//! - [`GhCliTransport`]: delegates to the `gh` CLI, which owns authentication

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, RemoteError};

pub mod gh_cli;
pub mod http;

pub use gh_cli::GhCliTransport;
pub use http::HttpTransport;

/// Whether an operation reads or changes remote state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Read-only
    Query,
    /// State-changing
    Mutation,
}

/// HTTP method for REST operations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Method name as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Request payload of an operation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum RemoteRequest {
    /// A GraphQL document with its variables
    GraphQl {
        /// Query or mutation text
        document: String,
        /// Variables object
        variables: Value,
    },
    /// A REST call relative to the API root
    Rest {
        /// HTTP method
        method: HttpMethod,
        /// Path relative to the API root, without a leading slash
        path: String,
        /// JSON body, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
}

/// One remote operation, ready to execute
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Operation name used in logs and error messages
    pub name: String,
    /// Query or mutation
    pub kind: OperationKind,
    /// What to send
    pub request: RemoteRequest,
}

impl OperationSpec {
    /// A GraphQL query
    pub fn query(name: impl Into<String>, document: impl Into<String>, variables: Value) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Query,
            request: RemoteRequest::GraphQl {
                document: document.into(),
                variables,
            },
        }
    }

    /// A GraphQL mutation
    pub fn mutation(name: impl Into<String>, document: impl Into<String>, variables: Value) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Mutation,
            request: RemoteRequest::GraphQl {
                document: document.into(),
                variables,
            },
        }
    }

    /// A REST call; anything but GET counts as a mutation
    pub fn rest(
        name: impl Into<String>,
        method: HttpMethod,
        path: impl Into<String>,
        body: Option<Value>,
    ) -> Self {
        let kind = if method == HttpMethod::Get {
            OperationKind::Query
        } else {
            OperationKind::Mutation
        };
        Self {
            name: name.into(),
            kind,
            request: RemoteRequest::Rest {
                method,
                path: path.into(),
                body,
            },
        }
    }

    /// Whether the operation changes remote state
    pub fn is_mutation(&self) -> bool {
        self.kind == OperationKind::Mutation
    }
}

/// Trait for executing remote operations
///
/// Implementations perform exactly one call per invocation; retrying is the
/// caller's concern.
///
/// # Examples
///
/// ```no_run
/// use review_batch::remote::{GhCliTransport, OperationSpec, RemoteCall};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let remote = GhCliTransport::from_path().ok_or("gh not found in PATH")?;
/// let op = OperationSpec::query("viewer", "query { viewer { login } }", json!({}));
/// let data = remote.call(&op).await?;
/// println!("{}", data["viewer"]["login"]);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait RemoteCall: Send + Sync {
    /// Execute the operation, returning the `data` document for GraphQL
    /// operations and the response body for REST operations
    async fn call(&self, op: &OperationSpec) -> Result<Value, RemoteError>;

    /// Name of this transport (for logging)
    fn name(&self) -> &'static str;
}

/// GraphQL request body
#[derive(Debug, Serialize)]
pub(crate) struct GraphQLRequest<'a> {
    pub query: &'a str,
    pub variables: &'a Value,
}

/// GraphQL response envelope
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQLResponse {
    pub data: Option<Value>,
    pub errors: Option<Vec<GraphQLError>>,
}

/// GraphQL error entry
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQLError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

/// Unwrap a GraphQL response envelope into its `data` document
///
/// Any entry in `errors` fails the whole call, even when partial data is
/// present; the first error decides the classification.
pub(crate) fn graphql_data(operation: &str, response: Value) -> Result<Value, RemoteError> {
    let envelope: GraphQLResponse = serde_json::from_value(response).map_err(|e| {
        RemoteError::new(
            ErrorKind::Validation,
            format!("{operation}: response is not a GraphQL envelope: {e}"),
        )
    })?;

    if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
        let kind = classify_graphql_error(&errors[0]);
        let message = errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(RemoteError::new(kind, format!("{operation}: {message}")));
    }

    match envelope.data {
        Some(Value::Null) | None => Err(RemoteError::new(
            ErrorKind::Validation,
            format!("{operation}: response has no data"),
        )),
        Some(data) => Ok(data),
    }
}

fn classify_graphql_error(error: &GraphQLError) -> ErrorKind {
    match error.error_type.as_deref() {
        Some("NOT_FOUND") => ErrorKind::NotFound,
        Some("FORBIDDEN") | Some("INSUFFICIENT_SCOPES") => ErrorKind::PermissionDenied,
        Some("RATE_LIMITED") => ErrorKind::RateLimited,
        _ => classify_message(&error.message),
    }
}

/// Classify a free-form error message from the platform
pub(crate) fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") {
        ErrorKind::RateLimited
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ErrorKind::Timeout
    } else if lower.contains("not found")
        || lower.contains("does not exist")
        || lower.contains("could not resolve to")
    {
        ErrorKind::NotFound
    } else if lower.contains("permission")
        || lower.contains("forbidden")
        || lower.contains("not accessible")
        || lower.contains("must have")
    {
        ErrorKind::PermissionDenied
    } else {
        ErrorKind::Validation
    }
}
