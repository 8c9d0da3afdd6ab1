//! # Integrity
//!
//! Whole-store checks of the tree invariants, a rank repair pass, and
//! summary metrics.
//!
//! Moves are not atomic on every backend. After a `PartialFailure` the tree
//! may carry rank gaps or orphaned descendants; `verify` finds them and
//! `renumber_ranks` closes rank gaps in place.

use crate::primitives::ROOT_PATH;
use crate::store::{NodeStore, sort_by_rank};
use crate::{Node, NodeId, TreeError, path};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, warn};

/// A single broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// `level` disagrees with the segment count of `path`.
    LevelMismatch { id: NodeId, path: String, level: u32 },
    /// The last segment of `path` is not the node's slug.
    SlugMismatch { id: NodeId, path: String, slug: String },
    /// Some stored records cannot be reached through the path index.
    Unreachable { stored: usize, reachable: usize },
    /// The parent path has no node.
    MissingParent { id: NodeId, path: String },
    /// A sibling group's ranks are not `0..n`.
    RankGap { parent_path: String, ranks: Vec<u32> },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LevelMismatch { id, path, level } => {
                write!(f, "node {} at '{}' has level {}", id, path, level)
            }
            Self::SlugMismatch { id, path, slug } => {
                write!(f, "node {} at '{}' has slug '{}'", id, path, slug)
            }
            Self::Unreachable { stored, reachable } => write!(
                f,
                "{} node(s) stored but only {} reachable by path",
                stored, reachable
            ),
            Self::MissingParent { id, path } => {
                write!(f, "node {} at '{}' has no parent", id, path)
            }
            Self::RankGap { parent_path, ranks } => {
                write!(f, "children of '{}' have ranks {:?}", parent_path, ranks)
            }
        }
    }
}

/// Check every node in the store. An empty result means the tree is consistent.
pub fn verify(store: &dyn NodeStore) -> Result<Vec<Violation>, TreeError> {
    let nodes = store.scan_subtree(ROOT_PATH)?;
    let mut violations = Vec::new();

    let stored = store.len()?;
    if stored != nodes.len() {
        violations.push(Violation::Unreachable {
            stored,
            reachable: nodes.len(),
        });
    }

    let by_path: BTreeSet<&str> = nodes.iter().map(|n| n.path.as_str()).collect();

    for node in &nodes {
        if node.level != path::level_of(&node.path) {
            violations.push(Violation::LevelMismatch {
                id: node.id,
                path: node.path.clone(),
                level: node.level,
            });
        }
        let last = path::segments(&node.path).last().unwrap_or(ROOT_PATH);
        if last != node.slug {
            violations.push(Violation::SlugMismatch {
                id: node.id,
                path: node.path.clone(),
                slug: node.slug.clone(),
            });
        }
        if let Some(parent) = node.parent_path()
            && !by_path.contains(parent.as_str())
        {
            violations.push(Violation::MissingParent {
                id: node.id,
                path: node.path.clone(),
            });
        }
    }

    for (parent_path, group) in sibling_groups(&nodes) {
        let mut ranks: Vec<u32> = group.iter().map(|n| n.rank).collect();
        ranks.sort_unstable();
        let contiguous = ranks
            .iter()
            .enumerate()
            .all(|(idx, rank)| u32::try_from(idx).is_ok_and(|i| i == *rank));
        if !contiguous {
            violations.push(Violation::RankGap { parent_path, ranks });
        }
    }

    if !violations.is_empty() {
        warn!(count = violations.len(), "tree integrity violations found");
    }
    Ok(violations)
}

/// Rewrite every sibling group to contiguous ranks, keeping the current
/// order (rank, then path). Returns how many records changed.
pub fn renumber_ranks(store: &mut dyn NodeStore) -> Result<usize, TreeError> {
    let nodes = store.scan_subtree(ROOT_PATH)?;
    let mut changed = Vec::new();

    for (_, mut group) in sibling_groups(&nodes) {
        sort_by_rank(&mut group);
        for (idx, mut node) in group.into_iter().enumerate() {
            let rank = u32::try_from(idx)
                .map_err(|_| TreeError::InvalidNode("too many siblings".to_string()))?;
            if node.rank != rank {
                node.rank = rank;
                changed.push(node);
            }
        }
    }

    if !changed.is_empty() {
        store.upsert_many(&changed)?;
        info!(records = changed.len(), "sibling ranks renumbered");
    }
    Ok(changed.len())
}

/// Group non-root nodes by parent path.
fn sibling_groups(nodes: &[Node]) -> BTreeMap<String, Vec<Node>> {
    let mut groups: BTreeMap<String, Vec<Node>> = BTreeMap::new();
    for node in nodes {
        if let Some(parent) = node.parent_path() {
            groups.entry(parent).or_default().push(node.clone());
        }
    }
    groups
}

// =============================================================================
// METRICS
// =============================================================================

/// Summary counters for a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMetrics {
    pub nodes: usize,
    pub max_depth: u32,
    pub trashed: usize,
    pub parked: usize,
    pub unpublished: usize,
    pub next_node_id: Option<u64>,
}

impl TreeMetrics {
    /// Collect metrics with one full scan.
    pub fn collect(store: &dyn NodeStore) -> Result<Self, TreeError> {
        let nodes = store.scan_subtree(ROOT_PATH)?;
        let mut metrics = Self {
            nodes: nodes.len(),
            ..Self::default()
        };
        let mut depths = BTreeSet::new();
        for node in &nodes {
            depths.insert(node.level);
            if node.trash {
                metrics.trashed += 1;
            }
            if node.parked {
                metrics.parked += 1;
            }
            if !node.published {
                metrics.unpublished += 1;
            }
        }
        metrics.max_depth = depths.last().copied().unwrap_or(0);
        Ok(metrics)
    }
}

// =============================================================================
// TESTS
// =============================================================================
