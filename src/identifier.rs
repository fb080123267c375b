//! Review-thread identifier classification
//!
//! Identifiers arrive as raw strings in one of two families:
//!
//! - legacy numeric REST comment ids (`123456789`)
//! - opaque GraphQL node ids whose prefix names the entity type
//!   (`PRRT_kwDOABcD12MAAAABcDE3fg`)
//!
//! [`classify`] turns a raw string into a [`ThreadIdentifier`] once, at the
//! boundary. Everything downstream matches on the resolved variant instead of
//! re-inspecting strings.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maximum number of digits accepted for a legacy numeric id
const MAX_NUMERIC_DIGITS: usize = 20;

/// Length bounds for the encoded part of a node id (after the prefix)
const MIN_NODE_BODY_LEN: usize = 5;
const MAX_NODE_BODY_LEN: usize = 100;

/// Entity kind encoded in a node id prefix
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Review thread (`RT_`, `PRT_`)
    ReviewThread,
    /// Pull request review thread (`PRRT_`)
    PullRequestReviewThread,
    /// Pull request review comment (`PRRC_`, `RP_`)
    ReviewComment,
    /// Issue / conversation comment (`IC_`)
    IssueComment,
}

impl NodeKind {
    /// All kinds, in prefix-table order
    pub const ALL: [NodeKind; 4] = [
        NodeKind::ReviewThread,
        NodeKind::PullRequestReviewThread,
        NodeKind::ReviewComment,
        NodeKind::IssueComment,
    ];

    /// Node id prefixes that encode this kind
    pub fn prefixes(&self) -> &'static [&'static str] {
        match self {
            NodeKind::ReviewThread => &["RT_", "PRT_"],
            NodeKind::PullRequestReviewThread => &["PRRT_"],
            NodeKind::ReviewComment => &["PRRC_", "RP_"],
            NodeKind::IssueComment => &["IC_"],
        }
    }

    /// Whether this kind addresses a thread (resolvable) rather than a comment
    pub fn is_thread(&self) -> bool {
        matches!(self, NodeKind::ReviewThread | NodeKind::PullRequestReviewThread)
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::ReviewThread => "review thread",
            NodeKind::PullRequestReviewThread => "pull request review thread",
            NodeKind::ReviewComment => "review comment",
            NodeKind::IssueComment => "issue comment",
        }
    }

    /// Find the kind (and matching prefix) a node id starts with
    fn detect(raw: &str) -> Option<(NodeKind, &'static str)> {
        NodeKind::ALL.iter().find_map(|kind| {
            kind.prefixes()
                .iter()
                .find(|prefix| raw.starts_with(**prefix))
                .map(|prefix| (*kind, *prefix))
        })
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A classified review-thread or comment identifier
///
/// Node ids can only be built through [`classify`] or [`ThreadIdentifier::node`],
/// both of which check the prefix against the claimed kind.
///
/// Deserialization goes through the same checks.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", try_from = "UncheckedIdentifier")]
pub enum ThreadIdentifier {
    /// Legacy numeric REST comment id
    LegacyNumericId {
        /// Numeric id value
        id: u64,
    },
    /// Opaque GraphQL node id
    NodeId {
        /// Canonical node id string
        id: String,
        /// Entity kind encoded in the prefix
        kind: NodeKind,
    },
}

/// Wire shape of [`ThreadIdentifier`] before validation
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum UncheckedIdentifier {
    LegacyNumericId { id: u64 },
    NodeId { id: String, kind: NodeKind },
}

impl TryFrom<UncheckedIdentifier> for ThreadIdentifier {
    type Error = Error;

    fn try_from(raw: UncheckedIdentifier) -> Result<Self> {
        match raw {
            UncheckedIdentifier::LegacyNumericId { id } => ThreadIdentifier::numeric(id),
            UncheckedIdentifier::NodeId { id, kind } => ThreadIdentifier::node(&id, kind),
        }
    }
}

impl ThreadIdentifier {
    /// Build a legacy numeric identifier
    pub fn numeric(id: u64) -> Result<Self> {
        if id == 0 {
            return Err(invalid("0", "numeric ids must be positive"));
        }
        Ok(ThreadIdentifier::LegacyNumericId { id })
    }

    /// Build a node identifier, checking that `raw` carries a prefix of `kind`
    pub fn node(raw: &str, kind: NodeKind) -> Result<Self> {
        match classify(raw)? {
            ThreadIdentifier::NodeId { id, kind: found } if found == kind => {
                Ok(ThreadIdentifier::NodeId { id, kind })
            }
            other => Err(invalid(
                raw,
                &format!(
                    "expected a {kind} id (prefix {}), found {}",
                    kind.prefixes().join(" or "),
                    other.kind_label()
                ),
            )),
        }
    }

    /// Node kind, or `None` for legacy numeric ids
    pub fn node_kind(&self) -> Option<NodeKind> {
        match self {
            ThreadIdentifier::LegacyNumericId { .. } => None,
            ThreadIdentifier::NodeId { kind, .. } => Some(*kind),
        }
    }

    /// Whether this identifier addresses a thread
    pub fn is_thread(&self) -> bool {
        self.node_kind().is_some_and(|k| k.is_thread())
    }

    /// Human-readable kind name
    pub fn kind_label(&self) -> &'static str {
        match self {
            ThreadIdentifier::LegacyNumericId { .. } => "legacy numeric comment id",
            ThreadIdentifier::NodeId { kind, .. } => kind.label(),
        }
    }

    /// Canonical string form
    pub fn as_canonical(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for ThreadIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadIdentifier::LegacyNumericId { id } => write!(f, "{id}"),
            ThreadIdentifier::NodeId { id, .. } => f.write_str(id),
        }
    }
}

impl std::str::FromStr for ThreadIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        classify(s)
    }
}

/// Human-readable list of accepted identifier formats
pub fn accepted_formats() -> String {
    let mut prefixes: Vec<&str> = NodeKind::ALL
        .iter()
        .flat_map(|k| k.prefixes().iter().copied())
        .collect();
    prefixes.sort_unstable();
    format!(
        "a numeric comment id (e.g., 123456789) or a node id starting with {} (e.g., PRRT_kwDOABcD12MAAAABcDE3fg)",
        prefixes.join(", ")
    )
}

fn invalid(raw: &str, reason: &str) -> Error {
    Error::InvalidIdentifier {
        raw: raw.to_string(),
        reason: reason.to_string(),
        hint: accepted_formats(),
    }
}

fn is_node_body_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '=' | '-')
}

/// Classify a raw identifier string
///
/// Pure and deterministic: surrounding whitespace is trimmed, then the value
/// is matched against the numeric form and the node id prefix table.
pub fn classify(raw: &str) -> Result<ThreadIdentifier> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(invalid(raw, "identifier cannot be empty"));
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        if value.len() > MAX_NUMERIC_DIGITS {
            return Err(invalid(
                raw,
                &format!("numeric ids must be between 1 and {MAX_NUMERIC_DIGITS} digits"),
            ));
        }
        let id: u64 = value
            .parse()
            .map_err(|_| invalid(raw, "numeric id is out of range"))?;
        return ThreadIdentifier::numeric(id).map_err(|_| invalid(raw, "numeric ids must be positive"));
    }

    let Some((kind, prefix)) = NodeKind::detect(value) else {
        return Err(invalid(raw, "unrecognized identifier prefix"));
    };

    let body = &value[prefix.len()..];
    if body.len() < MIN_NODE_BODY_LEN {
        return Err(invalid(
            raw,
            &format!(
                "node id is too short (minimum {} characters)",
                MIN_NODE_BODY_LEN + prefix.len()
            ),
        ));
    }
    if body.len() > MAX_NODE_BODY_LEN {
        return Err(invalid(
            raw,
            &format!(
                "node id is too long (maximum {} characters)",
                MAX_NODE_BODY_LEN + prefix.len()
            ),
        ));
    }
    if !body.chars().all(is_node_body_char) {
        return Err(invalid(
            raw,
            "node id may only contain letters, digits, '-', '_' and '='",
        ));
    }

    Ok(ThreadIdentifier::NodeId {
        id: value.to_string(),
        kind,
    })
}

/// Classify every raw identifier, failing on the first invalid one
pub fn classify_all<S: AsRef<str>>(raws: &[S]) -> Result<Vec<ThreadIdentifier>> {
    raws.iter().map(|raw| classify(raw.as_ref())).collect()
}
