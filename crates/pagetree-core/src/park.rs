//! # Parking
//!
//! Bootstrap of the parked system fixtures: the home page at the root, the
//! trash container, and any configured parked pages under the root.
//!
//! Parking is idempotent. Fixtures that already exist are left alone, so it
//! is safe to run on every startup.

use crate::primitives::{HOME_TYPE, ROOT_PATH, TRASH_SLUG, TRASH_TYPE};
use crate::store::NodeStore;
use crate::{Node, TreeError, path};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// A parked page to create directly under the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkSpec {
    pub slug: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default = "default_page_type")]
    pub node_type: String,
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_page_type() -> String {
    "page".to_string()
}

fn default_published() -> bool {
    true
}

impl ParkSpec {
    #[must_use]
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: None,
            node_type: default_page_type(),
            published: true,
        }
    }
}

/// Create missing fixtures. Returns the nodes that were created.
///
/// Fixtures bypass the permission guard.
pub fn park(store: &mut dyn NodeStore, specs: &[ParkSpec]) -> Result<Vec<Node>, TreeError> {
    let mut created = Vec::new();

    let root = match store.get_by_path(ROOT_PATH)? {
        Some(root) => root,
        None => {
            let root = Node {
                id: store.allocate_id()?,
                slug: ROOT_PATH.to_string(),
                path: ROOT_PATH.to_string(),
                level: 0,
                rank: 0,
                node_type: HOME_TYPE.to_string(),
                title: "Home".to_string(),
                fields: BTreeMap::new(),
                published: true,
                trash: false,
                parked: true,
            };
            store.upsert_many(std::slice::from_ref(&root))?;
            info!(id = %root.id, "parked home page created");
            created.push(root.clone());
            root
        }
    };

    let trash = ParkSpec {
        slug: TRASH_SLUG.to_string(),
        title: Some("Trash".to_string()),
        node_type: TRASH_TYPE.to_string(),
        published: false,
    };
    if let Some(node) = park_child(store, &root, &trash, true)? {
        info!(id = %node.id, path = %node.path, "parked trash created");
        created.push(node);
    }

    for spec in specs {
        path::validate_slug(&spec.slug)?;
        if let Some(node) = park_child(store, &root, spec, false)? {
            info!(id = %node.id, path = %node.path, "parked page created");
            created.push(node);
        }
    }

    Ok(created)
}

/// Append a parked child under the root unless its path is taken.
fn park_child(
    store: &mut dyn NodeStore,
    root: &Node,
    spec: &ParkSpec,
    trash: bool,
) -> Result<Option<Node>, TreeError> {
    let child_path = path::join(&root.path, &spec.slug);
    if store.get_by_path(&child_path)?.is_some() {
        return Ok(None);
    }
    let rank = u32::try_from(store.children(&root.path)?.len())
        .map_err(|_| TreeError::InvalidNode("too many siblings".to_string()))?;
    let node = Node {
        id: store.allocate_id()?,
        slug: spec.slug.clone(),
        path: child_path,
        level: root.level.saturating_add(1),
        rank,
        node_type: spec.node_type.clone(),
        title: spec.title.clone().unwrap_or_else(|| spec.slug.clone()),
        fields: BTreeMap::new(),
        published: spec.published,
        trash,
        parked: true,
    };
    store.upsert_many(std::slice::from_ref(&node))?;
    Ok(Some(node))
}

// =============================================================================
// TESTS
// =============================================================================
