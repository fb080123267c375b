//! GraphQL documents and REST paths for thread mutations, plus response parsing

use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::RepositoryRef;
use crate::error::{ErrorKind, RemoteError};
use crate::remote::{HttpMethod, OperationSpec};
use crate::types::{ReplyReceipt, ThreadState};

const RESOLVE_THREAD: &str = r#"mutation ResolveReviewThread($threadId: ID!) {
  resolveReviewThread(input: {threadId: $threadId}) {
    thread { id isResolved }
  }
}"#;

const UNRESOLVE_THREAD: &str = r#"mutation UnresolveReviewThread($threadId: ID!) {
  unresolveReviewThread(input: {threadId: $threadId}) {
    thread { id isResolved }
  }
}"#;

const COMMENT_FIELDS: &str = "id body createdAt url author { login } pullRequestReview { id }";

const REVIEW_OF_COMMENT: &str = r#"query ReviewOfComment($commentId: ID!) {
  node(id: $commentId) {
    ... on PullRequestReviewComment {
      pullRequestReview { id }
    }
  }
}"#;

fn thread_reply_document() -> String {
    format!(
        "mutation AddPullRequestReviewThreadReply($threadId: ID!, $body: String!) {{\n  \
         addPullRequestReviewThreadReply(input: {{pullRequestReviewThreadId: $threadId, body: $body}}) {{\n    \
         comment {{ {COMMENT_FIELDS} }}\n  }}\n}}"
    )
}

fn comment_reply_document() -> String {
    format!(
        "mutation AddPullRequestReviewComment($reviewId: ID!, $commentId: ID!, $body: String!) {{\n  \
         addPullRequestReviewComment(input: {{pullRequestReviewId: $reviewId, inReplyTo: $commentId, body: $body}}) {{\n    \
         comment {{ {COMMENT_FIELDS} }}\n  }}\n}}"
    )
}

/// Mutation that sets a thread's resolution flag
pub(crate) fn set_resolution(thread_id: &str, resolved: bool) -> OperationSpec {
    let (name, document) = if resolved {
        ("resolveReviewThread", RESOLVE_THREAD)
    } else {
        ("unresolveReviewThread", UNRESOLVE_THREAD)
    };
    OperationSpec::mutation(name, document, json!({ "threadId": thread_id }))
}

/// Reply posted directly on a thread
pub(crate) fn thread_reply(thread_id: &str, body: &str) -> OperationSpec {
    OperationSpec::mutation(
        "addPullRequestReviewThreadReply",
        thread_reply_document(),
        json!({ "threadId": thread_id, "body": body }),
    )
}

/// Lookup of the review a comment belongs to
pub(crate) fn review_of_comment(comment_id: &str) -> OperationSpec {
    OperationSpec::query("reviewOfComment", REVIEW_OF_COMMENT, json!({ "commentId": comment_id }))
}

/// Reply posted in-review to a specific comment
pub(crate) fn comment_reply(review_id: &str, comment_id: &str, body: &str) -> OperationSpec {
    OperationSpec::mutation(
        "addPullRequestReviewComment",
        comment_reply_document(),
        json!({ "reviewId": review_id, "commentId": comment_id, "body": body }),
    )
}

/// REST reply to a comment addressed by its numeric id
pub(crate) fn numeric_reply(repository: &RepositoryRef, comment_id: u64, body: &str) -> OperationSpec {
    OperationSpec::rest(
        "createReplyForReviewComment",
        HttpMethod::Post,
        format!(
            "repos/{}/{}/pulls/comments/{comment_id}/replies",
            repository.owner, repository.name
        ),
        Some(json!({ "body": body })),
    )
}

fn invalid(operation: &str, message: impl std::fmt::Display) -> RemoteError {
    RemoteError::new(
        ErrorKind::Validation,
        format!("{operation}: unexpected response: {message}"),
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadPayload {
    is_resolved: bool,
}

/// Extract the thread state from a resolve/unresolve response
///
/// A thread whose flag contradicts the requested state is a validation
/// failure; an already-matching flag is success.
pub(crate) fn parse_resolution(
    op: &OperationSpec,
    data: &Value,
    resolved: bool,
) -> Result<ThreadState, RemoteError> {
    let thread = data
        .get(&op.name)
        .and_then(|payload| payload.get("thread"))
        .filter(|thread| !thread.is_null())
        .ok_or_else(|| RemoteError::new(ErrorKind::NotFound, format!("{}: thread not found", op.name)))?;

    let payload: ThreadPayload =
        serde_json::from_value(thread.clone()).map_err(|e| invalid(&op.name, e))?;

    if payload.is_resolved != resolved {
        return Err(RemoteError::new(
            ErrorKind::Validation,
            format!(
                "{}: remote reports isResolved={} after the mutation",
                op.name, payload.is_resolved
            ),
        ));
    }

    Ok(ThreadState {
        is_resolved: payload.is_resolved,
    })
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
struct CommentPayload {
    id: String,
    #[serde(default)]
    body: String,
    created_at: String,
    url: String,
    author: Option<Login>,
    pull_request_review: Option<NodeRef>,
}

/// Extract the new comment from a GraphQL reply mutation response
pub(crate) fn parse_graphql_reply(op: &OperationSpec, data: &Value) -> Result<ReplyReceipt, RemoteError> {
    let comment = data
        .get(&op.name)
        .and_then(|payload| payload.get("comment"))
        .filter(|comment| !comment.is_null())
        .ok_or_else(|| invalid(&op.name, "no comment in payload"))?;

    let payload: CommentPayload =
        serde_json::from_value(comment.clone()).map_err(|e| invalid(&op.name, e))?;

    Ok(ReplyReceipt {
        reply_id: payload.id,
        url: payload.url,
        author: payload.author.map(|a| a.login).unwrap_or_default(),
        created_at: payload.created_at,
        review_id: payload.pull_request_review.map(|r| r.id),
        body_preview: preview(&payload.body),
    })
}

#[derive(Deserialize)]
struct RestComment {
    id: u64,
    #[serde(default)]
    body: String,
    html_url: String,
    created_at: String,
    user: Option<Login>,
    pull_request_review_id: Option<u64>,
}

/// Extract the new comment from a REST reply response
pub(crate) fn parse_rest_reply(op: &OperationSpec, body: &Value) -> Result<ReplyReceipt, RemoteError> {
    let payload: RestComment =
        serde_json::from_value(body.clone()).map_err(|e| invalid(&op.name, e))?;

    Ok(ReplyReceipt {
        reply_id: payload.id.to_string(),
        url: payload.html_url,
        author: payload.user.map(|u| u.login).unwrap_or_default(),
        created_at: payload.created_at,
        review_id: payload.pull_request_review_id.map(|id| id.to_string()),
        body_preview: preview(&payload.body),
    })
}

/// Extract the review id from a review-of-comment lookup
pub(crate) fn parse_review_id(op: &OperationSpec, data: &Value, comment_id: &str) -> Result<String, RemoteError> {
    data.get("node")
        .and_then(|node| node.get("pullRequestReview"))
        .and_then(|review| review.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            RemoteError::new(
                ErrorKind::NotFound,
                format!("{}: no review found for comment {comment_id}", op.name),
            )
        })
}

fn preview(body: &str) -> String {
    body.chars().take(100).collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteRequest;

    #[test]
    fn resolution_response_matching_request_is_success() {
        let op = set_resolution("PRRT_kwDOABcD12", true);
        let data = json!({"resolveReviewThread": {"thread": {"id": "PRRT_kwDOABcD12", "isResolved": true}}});

        let state = parse_resolution(&op, &data, true).unwrap();
        assert!(state.is_resolved);
    }

    #[test]
    fn resolution_response_contradicting_request_is_validation_failure() {
        let op = set_resolution("PRRT_kwDOABcD12", false);
        let data = json!({"unresolveReviewThread": {"thread": {"id": "PRRT_kwDOABcD12", "isResolved": true}}});

        let err = parse_resolution(&op, &data, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn null_thread_is_not_found() {
        let op = set_resolution("PRRT_kwDOABcD12", true);
        let data = json!({"resolveReviewThread": {"thread": null}});

        let err = parse_resolution(&op, &data, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn thread_reply_carries_thread_and_body() {
        let op = thread_reply("PRRT_kwDOABcD12", "Fixed in abc123");
        match &op.request {
            RemoteRequest::GraphQl { document, variables } => {
                assert!(document.contains("addPullRequestReviewThreadReply("));
                assert!(document.contains("pullRequestReviewThreadId: $threadId"));
                assert_eq!(variables["threadId"], "PRRT_kwDOABcD12");
                assert_eq!(variables["body"], "Fixed in abc123");
            }
            other => panic!("expected GraphQL request, got {other:?}"),
        }
    }

    #[test]
    fn graphql_reply_parses_receipt() {
        let op = thread_reply("PRRT_kwDOABcD12", "ok");
        let data = json!({"addPullRequestReviewThreadReply": {"comment": {
            "id": "PRRC_kwDOReply1",
            "body": "ok",
            "createdAt": "2024-05-01T10:00:00Z",
            "url": "https://github.com/o/r/pull/1#discussion_r1",
            "author": {"login": "octocat"},
            "pullRequestReview": {"id": "PRR_kwDOReview"}
        }}});

        let receipt = parse_graphql_reply(&op, &data).unwrap();
        assert_eq!(receipt.reply_id, "PRRC_kwDOReply1");
        assert_eq!(receipt.author, "octocat");
        assert_eq!(receipt.review_id.as_deref(), Some("PRR_kwDOReview"));
    }

    #[test]
    fn rest_reply_parses_receipt_and_ghost_author() {
        let repo = RepositoryRef::new("octo", "widgets");
        let op = numeric_reply(&repo, 42, "thanks");
        match &op.request {
            RemoteRequest::Rest { path, .. } => {
                assert_eq!(path, "repos/octo/widgets/pulls/comments/42/replies");
            }
            other => panic!("expected REST request, got {other:?}"),
        }

        let body = json!({
            "id": 99,
            "body": "thanks",
            "html_url": "https://github.com/octo/widgets/pull/1#discussion_r99",
            "created_at": "2024-05-01T10:00:00Z",
            "user": null
        });
        let receipt = parse_rest_reply(&op, &body).unwrap();
        assert_eq!(receipt.reply_id, "99");
        assert_eq!(receipt.author, "");
        assert_eq!(receipt.review_id, None);
    }

    #[test]
    fn review_lookup_without_review_is_not_found() {
        let op = review_of_comment("PRRC_kwDOABcD12");
        let err = parse_review_id(&op, &json!({"node": null}), "PRRC_kwDOABcD12").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let id = parse_review_id(
            &op,
            &json!({"node": {"pullRequestReview": {"id": "PRR_kwDOReview"}}}),
            "PRRC_kwDOABcD12",
        )
        .unwrap();
        assert_eq!(id, "PRR_kwDOReview");
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let body = "é".repeat(150);
        assert_eq!(preview(&body).chars().count(), 100);
    }
}
