//! # Query Cursor
//!
//! The read path of the engine.
//!
//! A `Cursor` collects an explicit, enumerated configuration
//! (`CursorOptions`), validates it eagerly, then materializes matching nodes
//! as `PageView`s: the node itself plus, on request, its ancestor chain
//! (root first) and immediate children.
//!
//! Every candidate, attached ancestor and attached child is passed through
//! the `PermissionGuard`. Nodes the actor may not view are dropped entirely.

use crate::guard::{PermissionGuard, RequestContext};
use crate::primitives::{MAX_CURSOR_LIMIT, ROOT_PATH};
use crate::store::{NodeStore, sort_by_rank};
use crate::{Node, NodeId, TreeError, path};
use std::collections::BTreeMap;

// =============================================================================
// OPTIONS
// =============================================================================

/// A boolean filter that can also be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Keep only nodes whose flag equals the value.
    Only(bool),
    /// Do not filter on this flag.
    Any,
}

impl Filter {
    /// Whether a node with the given flag passes.
    #[must_use]
    pub fn admits(self, flag: bool) -> bool {
        match self {
            Self::Only(expected) => flag == expected,
            Self::Any => true,
        }
    }
}

/// Which ancestors to attach to each result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ancestors {
    /// Attach nothing.
    #[default]
    None,
    /// Attach every ancestor, root first.
    All,
    /// Attach only the nearest `n` ancestors, still ordered root first.
    Depth(usize),
}

/// A single identity or field-equality criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    Id(NodeId),
    Slug(String),
    Path(String),
    /// Equality on a named field (see `Node::field`).
    Field(String, String),
}

impl Criterion {
    /// Key under which two criteria would contradict each other.
    fn key(&self) -> &str {
        match self {
            Self::Id(_) => "id",
            Self::Slug(_) => "slug",
            Self::Path(_) => "path",
            Self::Field(name, _) => name,
        }
    }

    fn value(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Slug(s) | Self::Path(s) | Self::Field(_, s) => s.clone(),
        }
    }

    /// Whether a node satisfies this criterion.
    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Self::Id(id) => node.id == *id,
            Self::Slug(slug) => node.slug == *slug,
            Self::Path(p) => node.path == *p,
            Self::Field(name, value) => node.field(name).as_deref() == Some(value.as_str()),
        }
    }
}

/// Full configuration of a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorOptions {
    pub criteria: Vec<Criterion>,
    /// Default: published nodes only.
    pub published: Filter,
    /// Default: non-trashed nodes only.
    pub trash: Filter,
    pub ancestors: Ancestors,
    /// Attach immediate children to every attached ancestor.
    pub ancestors_children: bool,
    /// Attach immediate children to every result.
    pub children: bool,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            criteria: Vec::new(),
            published: Filter::Only(true),
            trash: Filter::Only(false),
            ancestors: Ancestors::None,
            ancestors_children: false,
            children: false,
            skip: 0,
            limit: None,
        }
    }
}

impl CursorOptions {
    /// Reject malformed or contradictory configurations before any read.
    pub fn validate(&self) -> Result<(), TreeError> {
        let mut seen: BTreeMap<&str, String> = BTreeMap::new();
        for criterion in &self.criteria {
            let key = criterion.key();
            let value = criterion.value();
            if let Some(previous) = seen.get(key) {
                if *previous != value {
                    return Err(TreeError::InvalidQuery(format!(
                        "conflicting '{}' filters: '{}' and '{}'",
                        key, previous, value
                    )));
                }
            } else {
                seen.insert(key, value);
            }
        }

        if self.ancestors == Ancestors::Depth(0) {
            return Err(TreeError::InvalidQuery(
                "ancestor depth must be at least 1".to_string(),
            ));
        }
        if self.ancestors_children && self.ancestors == Ancestors::None {
            return Err(TreeError::InvalidQuery(
                "ancestor children requested without ancestors".to_string(),
            ));
        }
        if self.skip > MAX_CURSOR_LIMIT || self.limit.is_some_and(|l| l > MAX_CURSOR_LIMIT) {
            return Err(TreeError::InvalidQuery(format!(
                "skip and limit must not exceed {}",
                MAX_CURSOR_LIMIT
            )));
        }
        Ok(())
    }

    fn identity_id(&self) -> Option<NodeId> {
        self.criteria.iter().find_map(|c| match c {
            Criterion::Id(id) => Some(*id),
            _ => None,
        })
    }

    fn identity_path(&self) -> Option<&str> {
        self.criteria.iter().find_map(|c| match c {
            Criterion::Path(p) => Some(p.as_str()),
            Criterion::Field(name, p) if name == "path" => Some(p.as_str()),
            _ => None,
        })
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// A node as seen through a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub node: Node,
    /// Attached ancestors, root first. Empty unless requested.
    pub ancestors: Vec<PageView>,
    /// Attached immediate children, by rank. Empty unless requested.
    pub children: Vec<Node>,
}

impl PageView {
    fn bare(node: Node) -> Self {
        Self {
            node,
            ancestors: Vec::new(),
            children: Vec::new(),
        }
    }
}

// =============================================================================
// CURSOR
// =============================================================================

/// A composable, read-only query over a node store.
pub struct Cursor<'a> {
    store: &'a dyn NodeStore,
    guard: &'a dyn PermissionGuard,
    ctx: &'a RequestContext,
    options: CursorOptions,
}

impl<'a> Cursor<'a> {
    /// Create a cursor with default options (published, non-trashed, no attachments).
    pub fn new(
        store: &'a dyn NodeStore,
        guard: &'a dyn PermissionGuard,
        ctx: &'a RequestContext,
    ) -> Self {
        Self {
            store,
            guard,
            ctx,
            options: CursorOptions::default(),
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_options(mut self, options: CursorOptions) -> Self {
        self.options = options;
        self
    }

    /// The current configuration.
    #[must_use]
    pub fn options(&self) -> &CursorOptions {
        &self.options
    }

    #[must_use]
    pub fn id(mut self, id: NodeId) -> Self {
        self.options.criteria.push(Criterion::Id(id));
        self
    }

    #[must_use]
    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.options.criteria.push(Criterion::Slug(slug.into()));
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.options.criteria.push(Criterion::Path(path.into()));
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options
            .criteria
            .push(Criterion::Field(name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn published(mut self, filter: Filter) -> Self {
        self.options.published = filter;
        self
    }

    #[must_use]
    pub fn trash(mut self, filter: Filter) -> Self {
        self.options.trash = filter;
        self
    }

    #[must_use]
    pub fn ancestors(mut self, ancestors: Ancestors) -> Self {
        self.options.ancestors = ancestors;
        self
    }

    #[must_use]
    pub fn ancestors_children(mut self, enabled: bool) -> Self {
        self.options.ancestors_children = enabled;
        self
    }

    #[must_use]
    pub fn children(mut self, enabled: bool) -> Self {
        self.options.children = enabled;
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.options.skip = skip;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    /// The best match, or `None` when nothing visible matches.
    pub fn to_object(&self) -> Result<Option<PageView>, TreeError> {
        self.options.validate()?;
        let first = self.matching()?.into_iter().nth(self.options.skip);
        first.map(|node| self.shape(node)).transpose()
    }

    /// Every visible match, ordered by rank then path.
    pub fn to_vec(&self) -> Result<Vec<PageView>, TreeError> {
        self.options.validate()?;
        let limit = self.options.limit.unwrap_or(usize::MAX);
        self.matching()?
            .into_iter()
            .skip(self.options.skip)
            .take(limit)
            .map(|node| self.shape(node))
            .collect()
    }

    /// Number of visible matches, ignoring skip and limit.
    pub fn count(&self) -> Result<usize, TreeError> {
        self.options.validate()?;
        Ok(self.matching()?.len())
    }

    /// Filtered, ordered candidates without attachments.
    fn matching(&self) -> Result<Vec<Node>, TreeError> {
        let candidates = if let Some(id) = self.options.identity_id() {
            self.store.get(id)?.into_iter().collect()
        } else if let Some(p) = self.options.identity_path() {
            self.store.get_by_path(p)?.into_iter().collect()
        } else {
            self.store.scan_subtree(ROOT_PATH)?
        };

        let mut nodes: Vec<Node> = candidates
            .into_iter()
            .filter(|n| self.options.criteria.iter().all(|c| c.matches(n)))
            .filter(|n| self.options.trash.admits(n.trash))
            .filter(|n| self.visible(n))
            .collect();
        sort_by_rank(&mut nodes);
        Ok(nodes)
    }

    /// Published filter plus permission check. Shared by results and attachments.
    fn visible(&self, node: &Node) -> bool {
        self.options.published.admits(node.published) && self.guard.can_view(self.ctx, node)
    }

    fn shape(&self, node: Node) -> Result<PageView, TreeError> {
        let ancestors = match self.options.ancestors {
            Ancestors::None => Vec::new(),
            Ancestors::All => self.attach_ancestors(&node, usize::MAX)?,
            Ancestors::Depth(n) => self.attach_ancestors(&node, n)?,
        };
        let children = if self.options.children {
            self.visible_children(&node.path)?
        } else {
            Vec::new()
        };
        Ok(PageView {
            node,
            ancestors,
            children,
        })
    }

    /// Nearest `depth` ancestors, returned root first.
    ///
    /// Ancestors ignore the trash filter: the trash container is the parent
    /// of every trashed subtree.
    fn attach_ancestors(&self, node: &Node, depth: usize) -> Result<Vec<PageView>, TreeError> {
        let mut paths = path::ancestors(&node.path);
        let keep_from = paths.len().saturating_sub(depth);
        paths.drain(..keep_from);

        let mut out = Vec::with_capacity(paths.len());
        for ancestor_path in paths {
            let Some(ancestor) = self.store.get_by_path(&ancestor_path)? else {
                continue;
            };
            if !self.visible(&ancestor) {
                continue;
            }
            let mut view = PageView::bare(ancestor);
            if self.options.ancestors_children {
                view.children = self.visible_children(&view.node.path)?;
            }
            out.push(view);
        }
        Ok(out)
    }

    fn visible_children(&self, parent_path: &str) -> Result<Vec<Node>, TreeError> {
        Ok(self
            .store
            .children(parent_path)?
            .into_iter()
            .filter(|n| self.options.trash.admits(n.trash))
            .filter(|n| self.visible(n))
            .collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
