//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API and the mapping
//! from engine errors to HTTP status codes.

use axum::http::StatusCode;
use pagetree_core::{
    Ancestors, Criterion, CursorOptions, Filter, Node, NodeDraft, NodeId, PageView, Position,
    TreeError, TreeMetrics, Violation,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Tree status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_count: usize,
    pub max_depth: u32,
    pub trashed: usize,
    pub parked: usize,
    pub unpublished: usize,
    pub persistent: bool,
}

impl StatusResponse {
    pub fn from_metrics(metrics: &TreeMetrics, persistent: bool) -> Self {
        Self {
            node_count: metrics.nodes,
            max_depth: metrics.max_depth,
            trashed: metrics.trashed,
            parked: metrics.parked,
            unpublished: metrics.unpublished,
            persistent,
        }
    }
}

// =============================================================================
// PAGE JSON
// =============================================================================

/// JSON representation of a node, with optional attached relatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageJson {
    pub id: u64,
    pub slug: String,
    pub path: String,
    pub level: u32,
    pub rank: u32,
    #[serde(rename = "type")]
    pub node_type: String,
    pub title: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    pub published: bool,
    pub trash: bool,
    pub parked: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub ancestors: Vec<PageJson>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub children: Vec<PageJson>,
}

impl From<&Node> for PageJson {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.0,
            slug: node.slug.clone(),
            path: node.path.clone(),
            level: node.level,
            rank: node.rank,
            node_type: node.node_type.clone(),
            title: node.title.clone(),
            fields: node.fields.clone(),
            published: node.published,
            trash: node.trash,
            parked: node.parked,
            ancestors: vec![],
            children: vec![],
        }
    }
}

impl From<&PageView> for PageJson {
    fn from(view: &PageView) -> Self {
        let mut page = Self::from(&view.node);
        page.ancestors = view.ancestors.iter().map(Self::from).collect();
        page.children = view.children.iter().map(Self::from).collect();
        page
    }
}

// =============================================================================
// QUERY REQUEST/RESPONSE
// =============================================================================

/// A flag filter: `true`, `false`, or `"any"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterJson {
    Flag(bool),
    Keyword(String),
}

impl FilterJson {
    fn to_filter(&self, name: &str) -> Result<Filter, TreeError> {
        match self {
            Self::Flag(flag) => Ok(Filter::Only(*flag)),
            Self::Keyword(k) if k == "any" => Ok(Filter::Any),
            Self::Keyword(k) => Err(TreeError::InvalidQuery(format!(
                "{} must be true, false or \"any\", got \"{}\"",
                name, k
            ))),
        }
    }
}

/// Ancestor selection: `true` for all, `false` for none, or a depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AncestorsJson {
    Flag(bool),
    Depth(usize),
}

impl Default for AncestorsJson {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl From<&AncestorsJson> for Ancestors {
    fn from(json: &AncestorsJson) -> Self {
        match json {
            AncestorsJson::Flag(false) => Self::None,
            AncestorsJson::Flag(true) => Self::All,
            AncestorsJson::Depth(n) => Self::Depth(*n),
        }
    }
}

fn default_published() -> FilterJson {
    FilterJson::Flag(true)
}

fn default_trash() -> FilterJson {
    FilterJson::Flag(false)
}

/// Page query request.
///
/// Every criterion is optional and they combine with AND. `fields` holds
/// equality criteria on named fields such as `type` or `title`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default = "default_published")]
    pub published: FilterJson,
    #[serde(default = "default_trash")]
    pub trash: FilterJson,
    #[serde(default)]
    pub ancestors: AncestorsJson,
    #[serde(default)]
    pub ancestors_children: bool,
    #[serde(default)]
    pub children: bool,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Return at most one page (first match).
    #[serde(default)]
    pub single: bool,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            id: None,
            slug: None,
            path: None,
            fields: BTreeMap::new(),
            published: default_published(),
            trash: default_trash(),
            ancestors: AncestorsJson::default(),
            ancestors_children: false,
            children: false,
            skip: 0,
            limit: None,
            single: false,
        }
    }
}

impl QueryRequest {
    /// Convert to cursor options, validating them.
    pub fn to_options(&self) -> Result<CursorOptions, TreeError> {
        let mut criteria = Vec::new();
        if let Some(id) = self.id {
            criteria.push(Criterion::Id(NodeId(id)));
        }
        if let Some(slug) = &self.slug {
            criteria.push(Criterion::Slug(slug.clone()));
        }
        if let Some(path) = &self.path {
            criteria.push(Criterion::Path(path.clone()));
        }
        for (name, value) in &self.fields {
            criteria.push(Criterion::Field(name.clone(), value.clone()));
        }

        let options = CursorOptions {
            criteria,
            published: self.published.to_filter("published")?,
            trash: self.trash.to_filter("trash")?,
            ancestors: Ancestors::from(&self.ancestors),
            ancestors_children: self.ancestors_children,
            children: self.children,
            skip: self.skip,
            limit: self.limit,
        };
        options.validate()?;
        Ok(options)
    }
}

/// Page query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub found: bool,
    pub pages: Vec<PageJson>,
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn with_pages(views: &[PageView]) -> Self {
        Self {
            success: true,
            found: !views.is_empty(),
            pages: views.iter().map(PageJson::from).collect(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            found: false,
            pages: vec![],
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// WRITE REQUESTS
// =============================================================================

fn default_page_type() -> String {
    "page".to_string()
}

fn default_true() -> bool {
    true
}

/// Insert a new page as the last child of `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertRequest {
    pub parent: u64,
    pub slug: String,
    /// Defaults to the slug.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default = "default_page_type")]
    pub node_type: String,
    #[serde(default = "default_true")]
    pub published: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl InsertRequest {
    #[must_use]
    pub fn to_draft(&self) -> NodeDraft {
        let mut draft = NodeDraft::new(self.slug.clone())
            .node_type(self.node_type.clone())
            .published(self.published);
        if let Some(title) = &self.title {
            draft = draft.title(title.clone());
        }
        draft.fields = self.fields.clone();
        draft
    }
}

/// Move `node` before, after or inside `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub node: u64,
    pub target: u64,
    pub position: Position,
}

/// Move `node` into the trash container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashRequest {
    pub node: u64,
}

/// Result of a single-page write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse {
    pub success: bool,
    pub page: Option<PageJson>,
    pub error: Option<String>,
}

impl PageResponse {
    pub fn success(node: &Node) -> Self {
        Self {
            success: true,
            page: Some(PageJson::from(node)),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            page: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// CHECK RESPONSE
// =============================================================================

/// Integrity report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub success: bool,
    pub consistent: bool,
    pub violations: Vec<Violation>,
    pub error: Option<String>,
}

impl CheckResponse {
    pub fn success(violations: Vec<Violation>) -> Self {
        Self {
            success: true,
            consistent: violations.is_empty(),
            violations,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            consistent: false,
            violations: vec![],
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// EXPORT RESPONSE
// =============================================================================

/// Export response carrying a base64-encoded snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub data: Option<String>, // Base64 encoded
    pub node_count: Option<usize>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(data: &[u8], node_count: usize) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                data,
            )),
            node_count: Some(node_count),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            node_count: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// HTTP status for an engine error.
#[must_use]
pub fn status_for(err: &TreeError) -> StatusCode {
    match err {
        TreeError::NotFound(_) => StatusCode::NOT_FOUND,
        TreeError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        TreeError::SlugConflict { .. }
        | TreeError::CyclicMove { .. }
        | TreeError::CannotMoveParked(_) => StatusCode::CONFLICT,
        TreeError::InvalidQuery(_) | TreeError::InvalidNode(_) | TreeError::InvalidMove(_) => {
            StatusCode::BAD_REQUEST
        }
        TreeError::Store(_) | TreeError::PartialFailure { .. } | TreeError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
