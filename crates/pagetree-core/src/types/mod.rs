//! # Core Type Definitions
//!
//! This module contains the core types of the pagetree engine:
//! - Node identifiers and records (`NodeId`, `Node`, `NodeDraft`)
//! - Move placement (`Position`)
//! - Error types (`TreeError`)
//!
//! ## Ordering Guarantees
//!
//! All collections inside these types are `BTreeMap`s so that two nodes with
//! the same content serialize to the same bytes.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier for a node. Opaque to callers and immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// NODE
// =============================================================================

/// A page in the tree.
///
/// `path`, `level` and `rank` are derived fields owned by the engine:
/// - `path` is the slash-joined chain of ancestor slugs ending in `slug`
/// - `level` is the number of segments in `path` (root = 0)
/// - `rank` is the zero-based position among siblings
///
/// Everything else is content and is never interpreted by the tree
/// algorithms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub slug: String,
    pub path: String,
    pub level: u32,
    pub rank: u32,
    #[serde(rename = "type")]
    pub node_type: String,
    pub title: String,
    pub fields: BTreeMap<String, String>,
    pub published: bool,
    pub trash: bool,
    pub parked: bool,
}

impl Node {
    /// Look up a field by name for equality criteria.
    ///
    /// Built-in names map to the record itself: `id`, `type`, `title`,
    /// `slug`, `path`, `level`, `rank`, and the flags `published`, `trash`
    /// and `parked` (as `"true"`/`"false"`). Anything else is looked up in
    /// `fields`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "type" => Some(Cow::Borrowed(&self.node_type)),
            "title" => Some(Cow::Borrowed(&self.title)),
            "slug" => Some(Cow::Borrowed(&self.slug)),
            "path" => Some(Cow::Borrowed(&self.path)),
            "level" => Some(Cow::Owned(self.level.to_string())),
            "rank" => Some(Cow::Owned(self.rank.to_string())),
            "id" => Some(Cow::Owned(self.id.to_string())),
            "published" => Some(Cow::Borrowed(flag(self.published))),
            "trash" => Some(Cow::Borrowed(flag(self.trash))),
            "parked" => Some(Cow::Borrowed(flag(self.parked))),
            other => self.fields.get(other).map(|v| Cow::Borrowed(v.as_str())),
        }
    }

    /// The path of this node's parent, or `None` for the root.
    #[must_use]
    pub fn parent_path(&self) -> Option<String> {
        crate::path::parent(&self.path)
    }

    /// Whether `other` lives strictly below this node.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Node) -> bool {
        self.id != other.id && crate::path::is_within(&other.path, &self.path)
    }
}

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

// =============================================================================
// NODE DRAFT
// =============================================================================

/// The caller-supplied part of a new node.
///
/// The Inserter fills in `id`, `path`, `level`, `rank`, `trash` and `parked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDraft {
    pub slug: String,
    pub title: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub published: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl NodeDraft {
    /// A published draft of type `page` whose title defaults to the slug.
    #[must_use]
    pub fn new(slug: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            title: slug.clone(),
            slug,
            node_type: "page".to_string(),
            published: true,
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = node_type.into();
        self
    }

    #[must_use]
    pub fn published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }

    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// POSITION
// =============================================================================

/// Where a moved node lands relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Sibling of the target, immediately before it.
    Before,
    /// Sibling of the target, immediately after it.
    After,
    /// Last child of the target.
    Inside,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Before => "before",
            Self::After => "after",
            Self::Inside => "inside",
        };
        f.write_str(name)
    }
}

impl FromStr for Position {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            "inside" => Ok(Self::Inside),
            other => Err(TreeError::InvalidMove(format!(
                "unknown position '{}', expected before, after or inside",
                other
            ))),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the tree engine.
///
/// Every variant except `Store` and `PartialFailure` is raised before any
/// write happens, so the tree is unchanged and the call can be retried with
/// corrected input.
#[derive(Debug, Error)]
pub enum TreeError {
    /// An id, slug or path resolved to nothing.
    #[error("Node not found: {0}")]
    NotFound(String),

    /// The cursor configuration is malformed or contradictory.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The move target is the node itself or one of its descendants.
    #[error("Cannot move node {node} relative to {target}: target is inside the moved subtree")]
    CyclicMove { node: NodeId, target: NodeId },

    /// The node is a parked system fixture.
    #[error("Node {0} is parked and cannot be moved")]
    CannotMoveParked(NodeId),

    /// A sibling with the same slug already exists under the parent.
    #[error("Slug '{slug}' already exists under '{parent_path}'")]
    SlugConflict { parent_path: String, slug: String },

    /// The permission guard refused the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The underlying store is unavailable or rejected a call.
    #[error("Store error: {0}")]
    Store(String),

    /// A batched write landed only partly. The tree may be inconsistent.
    #[error(
        "Partial write: {} record(s) written, {} record(s) failed",
        written.len(),
        failed.len()
    )]
    PartialFailure {
        written: Vec<NodeId>,
        failed: Vec<(NodeId, String)>,
    },

    /// A draft or record failed validation (bad slug, empty type, ...).
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    /// The move cannot be expressed (no destination parent, bad position).
    #[error("Invalid move: {0}")]
    InvalidMove(String),

    /// A snapshot or record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TreeError {
    /// Whether the error was raised before any mutation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Self::Store(_) | Self::PartialFailure { .. } | Self::Serialization(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
