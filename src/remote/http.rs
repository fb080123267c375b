//! HTTPS transport for the GitHub API

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use serde_json::Value;
use std::time::Duration;

use super::{GraphQLRequest, HttpMethod, OperationSpec, RemoteCall, RemoteRequest, graphql_data};
use crate::config::RemoteConfig;
use crate::error::{Error, ErrorKind, RemoteError, Result};

/// Remote transport that talks to the API directly over HTTPS
///
/// GraphQL operations are POSTed to `{api_url}/graphql`; REST operations go
/// to `{api_url}/{path}`. The bearer token is supplied by the caller and is
/// never read from the environment.
///
/// # Examples
///
/// ```no_run
/// use review_batch::config::RemoteConfig;
/// use review_batch::remote::HttpTransport;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let token = std::env::var("GITHUB_TOKEN")?;
/// let transport = HttpTransport::new(&RemoteConfig::default(), &token)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
}

impl HttpTransport {
    /// Build a transport from configuration and a bearer token
    pub fn new(config: &RemoteConfig, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|e| Error::Config {
                message: format!("invalid user agent: {e}"),
                key: Some("remote.user_agent".to_string()),
            })?,
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim())).map_err(|_| {
            Error::InvalidInput {
                field: "token".to_string(),
                message: "contains characters not allowed in a header".to_string(),
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteCall for HttpTransport {
    async fn call(&self, op: &OperationSpec) -> std::result::Result<Value, RemoteError> {
        let request = match &op.request {
            RemoteRequest::GraphQl {
                document,
                variables,
            } => self
                .client
                .post(self.endpoint("graphql"))
                .json(&GraphQLRequest {
                    query: document,
                    variables,
                }),
            RemoteRequest::Rest { method, path, body } => {
                let builder = self.client.request(to_reqwest(*method), self.endpoint(path));
                match body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            }
        };

        tracing::debug!(operation = %op.name, transport = self.name(), "Sending request");

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let quota_exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0");
            let text = response.text().await.unwrap_or_default();
            let message = error_message(&text, status);
            let rate_limited = quota_exhausted || message.to_lowercase().contains("rate limit");

            return Err(
                RemoteError::from_status(status.as_u16(), format!("{}: {message}", op.name), rate_limited)
                    .with_retry_after(retry_after),
            );
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let body: Value = response.json().await.map_err(|e| {
            RemoteError::new(
                ErrorKind::Validation,
                format!("{}: response is not JSON: {e}", op.name),
            )
            .with_status(status.as_u16())
        })?;

        match op.request {
            RemoteRequest::GraphQl { .. } => graphql_data(&op.name, body),
            RemoteRequest::Rest { .. } => Ok(body),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    let kind = if e.is_timeout() {
        ErrorKind::Timeout
    } else {
        ErrorKind::Network
    };
    RemoteError::new(kind, e.to_string())
}

/// Prefer the `message` field of a JSON error body, fall back to raw text
fn error_message(text: &str, status: StatusCode) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .filter(|m| !m.is_empty())
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string())
}

/// Extract a wait hint from `Retry-After` (seconds or an HTTP date) or, when
/// the quota is exhausted, from `X-RateLimit-Reset` (epoch seconds)
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    if let Some(value) = retry_after {
        if let Ok(secs) = value.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
        if let Ok(at) = chrono::DateTime::parse_from_rfc2822(value) {
            let wait = at.timestamp().saturating_sub(chrono::Utc::now().timestamp()).max(0);
            return Some(Duration::from_secs(wait as u64));
        }
    }

    let remaining = headers.get("x-ratelimit-remaining").and_then(|v| v.to_str().ok());
    if remaining != Some("0") {
        return None;
    }
    let reset = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())?;
    let wait = reset.saturating_sub(chrono::Utc::now().timestamp()).max(0);
    Some(Duration::from_secs(wait as u64))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("0"));

        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn retry_after_accepts_http_dates() {
        let at = chrono::Utc::now() + chrono::Duration::seconds(30);
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_str(&at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()).unwrap(),
        );
        let wait = parse_retry_after(&headers).unwrap();
        assert!(wait <= Duration::from_secs(30));
        assert!(wait >= Duration::from_secs(25));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn unparseable_retry_after_falls_back_to_reset() {
        let reset = (chrono::Utc::now().timestamp() + 20).to_string();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_str(&reset).unwrap());

        let wait = parse_retry_after(&headers).unwrap();
        assert!(wait <= Duration::from_secs(20));
        assert!(wait >= Duration::from_secs(15));
    }

    #[test]
    fn reset_header_used_only_when_quota_is_exhausted() {
        let reset = (chrono::Utc::now().timestamp() + 60).to_string();
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", HeaderValue::from_str(&reset).unwrap());
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        let wait = parse_retry_after(&headers).unwrap();
        assert!(wait <= Duration::from_secs(60));
        assert!(wait >= Duration::from_secs(55));
    }

    #[test]
    fn reset_in_the_past_means_no_wait() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1000"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn error_message_prefers_json_message_field() {
        assert_eq!(
            error_message(r#"{"message":"Not Found","documentation_url":"x"}"#, StatusCode::NOT_FOUND),
            "Not Found"
        );
        assert_eq!(error_message("upstream exploded", StatusCode::BAD_GATEWAY), "upstream exploded");
        assert_eq!(error_message("", StatusCode::BAD_GATEWAY), "Bad Gateway");
    }

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let config = RemoteConfig {
            api_url: "http://127.0.0.1:9/api/v3/".to_string(),
            ..RemoteConfig::default()
        };
        let transport = HttpTransport::new(&config, "t0ken").unwrap();
        assert_eq!(transport.endpoint("graphql"), "http://127.0.0.1:9/api/v3/graphql");
        assert_eq!(
            transport.endpoint("/repos/o/r/pulls/comments/1/replies"),
            "http://127.0.0.1:9/api/v3/repos/o/r/pulls/comments/1/replies"
        );
    }

    #[test]
    fn token_with_newline_is_rejected() {
        let err = HttpTransport::new(&RemoteConfig::default(), "abc\ndef").unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }
}
