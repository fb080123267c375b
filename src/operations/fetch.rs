//! Listing a pull request's review threads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::RepositoryRef;
use crate::error::{Error, ErrorKind, RemoteError, Result};
use crate::identifier::classify;
use crate::remote::OperationSpec;
use crate::types::{Comment, ReviewThread};

/// Largest page the API serves
pub const MAX_PAGE_SIZE: usize = 100;

/// Upper bound on threads fetched in one call
pub const MAX_THREAD_LIMIT: usize = 1000;

/// Upper bound on comments fetched per thread
pub const MAX_COMMENT_LIMIT: u32 = 50;

const REVIEW_THREADS: &str = r#"query ReviewThreads($owner: String!, $repo: String!, $number: Int!, $first: Int!, $after: String, $comments: Int!) {
  repository(owner: $owner, name: $repo) {
    pullRequest(number: $number) {
      reviewThreads(first: $first, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes {
          id
          isResolved
          isOutdated
          line
          path
          comments(first: $comments) {
            nodes {
              id
              body
              createdAt
              updatedAt
              url
              author { login }
              replyTo { id }
            }
          }
        }
      }
    }
  }
}"#;

/// Options for [`fetch_threads`](super::ThreadOperations::fetch_threads)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Keep resolved threads in the result (default: false)
    #[serde(default)]
    pub include_resolved: bool,

    /// Maximum number of threads to examine, 1..=1000 (default: 100)
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Comments fetched per thread, 1..=50 (default: 10)
    #[serde(default = "default_comment_limit")]
    pub comment_limit: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            include_resolved: false,
            limit: default_limit(),
            comment_limit: default_comment_limit(),
        }
    }
}

fn default_limit() -> usize {
    100
}

fn default_comment_limit() -> u32 {
    10
}

impl FetchOptions {
    /// Include resolved threads
    pub fn include_resolved(mut self, include: bool) -> Self {
        self.include_resolved = include;
        self
    }

    /// Set the thread limit
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > MAX_THREAD_LIMIT {
            return Err(Error::InvalidInput {
                field: "limit".to_string(),
                message: format!("must be between 1 and {MAX_THREAD_LIMIT}, got {}", self.limit),
            });
        }
        if self.comment_limit == 0 || self.comment_limit > MAX_COMMENT_LIMIT {
            return Err(Error::InvalidInput {
                field: "comment_limit".to_string(),
                message: format!(
                    "must be between 1 and {MAX_COMMENT_LIMIT}, got {}",
                    self.comment_limit
                ),
            });
        }
        Ok(())
    }
}

/// One page of the review-threads query
pub(crate) fn page_query(
    repository: &RepositoryRef,
    pr_number: u64,
    first: usize,
    after: Option<&str>,
    comment_limit: u32,
) -> OperationSpec {
    OperationSpec::query(
        "reviewThreads",
        REVIEW_THREADS,
        json!({
            "owner": repository.owner,
            "repo": repository.name,
            "number": pr_number,
            "first": first,
            "after": after,
            "comments": comment_limit,
        }),
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct Nodes<T> {
    nodes: Vec<Option<T>>,
}

#[derive(Deserialize)]
struct Login {
    login: String,
}

#[derive(Deserialize)]
struct NodeRef {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentNode {
    id: String,
    #[serde(default)]
    body: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    url: String,
    author: Option<Login>,
    reply_to: Option<NodeRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadNode {
    id: String,
    is_resolved: bool,
    #[serde(default)]
    is_outdated: bool,
    line: Option<u32>,
    path: Option<String>,
    comments: Nodes<CommentNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadConnection {
    page_info: PageInfo,
    nodes: Vec<Option<ThreadNode>>,
}

/// A parsed page: threads in remote order plus the cursor for the next page
#[derive(Debug)]
pub(crate) struct ThreadPage {
    pub threads: Vec<ReviewThread>,
    pub next_cursor: Option<String>,
}

/// Parse one page of the review-threads query
pub(crate) fn parse_page(op: &OperationSpec, data: &Value, pr_number: u64) -> std::result::Result<ThreadPage, RemoteError> {
    let repository = data.get("repository").filter(|v| !v.is_null()).ok_or_else(|| {
        RemoteError::new(ErrorKind::NotFound, format!("{}: repository not found", op.name))
    })?;
    let connection = repository
        .get("pullRequest")
        .filter(|v| !v.is_null())
        .ok_or_else(|| {
            RemoteError::new(
                ErrorKind::NotFound,
                format!("{}: pull request #{pr_number} not found", op.name),
            )
        })?
        .get("reviewThreads")
        .cloned()
        .unwrap_or(Value::Null);

    let connection: ThreadConnection = serde_json::from_value(connection).map_err(|e| {
        RemoteError::new(
            ErrorKind::Validation,
            format!("{}: unexpected response: {e}", op.name),
        )
    })?;

    let mut threads = Vec::with_capacity(connection.nodes.len());
    for node in connection.nodes.into_iter().flatten() {
        threads.push(convert_thread(op, node)?);
    }

    let next_cursor = if connection.page_info.has_next_page {
        connection.page_info.end_cursor
    } else {
        None
    };

    Ok(ThreadPage {
        threads,
        next_cursor,
    })
}

fn convert_thread(op: &OperationSpec, node: ThreadNode) -> std::result::Result<ReviewThread, RemoteError> {
    let id = classify(&node.id).map_err(|e| {
        RemoteError::new(ErrorKind::Validation, format!("{}: thread id: {e}", op.name))
    })?;

    let mut comments = Vec::with_capacity(node.comments.nodes.len());
    for comment in node.comments.nodes.into_iter().flatten() {
        let comment_id = classify(&comment.id).map_err(|e| {
            RemoteError::new(ErrorKind::Validation, format!("{}: comment id: {e}", op.name))
        })?;
        comments.push(Comment {
            id: comment_id,
            body: comment.body,
            author: comment.author.map(|a| a.login).unwrap_or_default(),
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            url: comment.url,
            reply_to: comment.reply_to.map(|r| r.id),
        });
    }

    Ok(ReviewThread {
        id,
        is_resolved: node.is_resolved,
        is_outdated: node.is_outdated,
        file_path: node.path,
        line: node.line,
        comments,
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn thread_json(id: &str, resolved: bool) -> Value {
        json!({
            "id": id,
            "isResolved": resolved,
            "isOutdated": false,
            "line": 12,
            "path": "src/lib.rs",
            "comments": {"nodes": [{
                "id": "PRRC_kwDOComment1",
                "body": "Please rename this",
                "createdAt": "2024-05-01T10:00:00Z",
                "updatedAt": "2024-05-01T10:05:00Z",
                "url": "https://github.com/o/r/pull/7#discussion_r1",
                "author": {"login": "reviewer"},
                "replyTo": null
            }]}
        })
    }

    #[test]
    fn page_parses_threads_and_cursor() {
        let repo = RepositoryRef::new("o", "r");
        let op = page_query(&repo, 7, 100, None, 10);
        let data = json!({"repository": {"pullRequest": {"reviewThreads": {
            "pageInfo": {"hasNextPage": true, "endCursor": "Y3Vyc29yOjE="},
            "nodes": [thread_json("PRRT_kwDOThread1", false), null, thread_json("PRRT_kwDOThread2", true)]
        }}}});

        let page = parse_page(&op, &data, 7).unwrap();
        assert_eq!(page.threads.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("Y3Vyc29yOjE="));

        let first = &page.threads[0];
        assert_eq!(first.id.to_string(), "PRRT_kwDOThread1");
        assert_eq!(first.file_path.as_deref(), Some("src/lib.rs"));
        assert_eq!(first.line, Some(12));
        assert_eq!(first.comments[0].author, "reviewer");
        assert!(page.threads[1].is_resolved);
    }

    #[test]
    fn last_page_has_no_cursor() {
        let repo = RepositoryRef::new("o", "r");
        let op = page_query(&repo, 7, 100, Some("abc"), 10);
        let data = json!({"repository": {"pullRequest": {"reviewThreads": {
            "pageInfo": {"hasNextPage": false, "endCursor": "ignored"},
            "nodes": []
        }}}});

        let page = parse_page(&op, &data, 7).unwrap();
        assert!(page.threads.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn missing_pull_request_is_not_found() {
        let repo = RepositoryRef::new("o", "r");
        let op = page_query(&repo, 999, 100, None, 10);
        let err = parse_page(&op, &json!({"repository": {"pullRequest": null}}), 999).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(err.message.contains("#999"));
    }

    #[test]
    fn options_are_validated() {
        assert!(FetchOptions::default().validate().is_ok());
        assert!(FetchOptions::default().limit(0).validate().is_err());
        assert!(FetchOptions::default().limit(1001).validate().is_err());

        let options = FetchOptions {
            comment_limit: 51,
            ..FetchOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
