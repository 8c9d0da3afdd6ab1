//! # Mover
//!
//! Relocates a node and its whole subtree, keeping paths, levels and
//! sibling ranks consistent.
//!
//! A move runs in two phases:
//!
//! 1. **Plan**: read the affected records (one subtree prefix scan plus the
//!    origin and destination sibling groups) and compute every rewrite as a
//!    `MovePlan`. Planning is a pure function of those records.
//! 2. **Apply**: persist the plan with a single batched upsert.
//!
//! The store gives no multi-record atomicity. When the batch lands only
//! partly the error names the records that did and did not land, and the
//! tree needs a repair pass (see `integrity::renumber_ranks`).

use crate::guard::{PermissionGuard, RequestContext};
use crate::primitives::MAX_TREE_DEPTH;
use crate::store::{NodeStore, sort_by_rank};
use crate::{Node, NodeId, Position, TreeError, path};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

// =============================================================================
// PLAN
// =============================================================================

/// The side-effect-free outcome of planning a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    /// The moved node as it will look once the plan is applied.
    pub moved: Node,
    /// Every record whose stored version changes, in id order.
    pub writes: Vec<Node>,
}

impl MovePlan {
    /// Compute the rewrites for moving `node` under `dest`.
    ///
    /// - `subtree`: `node` and all of its descendants
    /// - `origin_siblings`: children of `node`'s current parent (including `node`)
    /// - `dest_siblings`: current children of `dest`
    /// - `anchor`: the target for `Before`/`After`; ignored for `Inside`
    ///
    /// `node.path` must be the stored path. `node.slug` may differ from the
    /// stored slug, in which case the node is renamed on the way.
    pub fn build(
        node: &Node,
        dest: &Node,
        position: Position,
        anchor: &Node,
        subtree: &[Node],
        origin_siblings: &[Node],
        dest_siblings: &[Node],
    ) -> Result<Self, TreeError> {
        let new_path = path::join(&dest.path, &node.slug);
        let new_level = dest.level.saturating_add(1);

        let mut originals: BTreeMap<NodeId, &Node> = BTreeMap::new();
        let mut staged: BTreeMap<NodeId, Node> = BTreeMap::new();

        // Rebase the subtree.
        for member in subtree {
            let rebased = path::rebase(&member.path, &node.path, &new_path).ok_or_else(|| {
                TreeError::InvalidMove(format!(
                    "'{}' is not inside '{}'",
                    member.path, node.path
                ))
            })?;
            let depth_below = member.level.saturating_sub(node.level);
            let level = new_level.saturating_add(depth_below);
            if level > MAX_TREE_DEPTH {
                return Err(TreeError::InvalidMove(format!(
                    "moved subtree would reach depth {}, maximum is {}",
                    level, MAX_TREE_DEPTH
                )));
            }
            let mut updated = member.clone();
            updated.path = rebased;
            updated.level = level;
            updated.trash = dest.trash;
            if member.id == node.id {
                updated.slug.clone_from(&node.slug);
            }
            originals.insert(member.id, member);
            staged.insert(member.id, updated);
        }

        // Destination sibling order, without the moved node.
        let mut order: Vec<&Node> = dest_siblings.iter().filter(|s| s.id != node.id).collect();
        order.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.path.cmp(&b.path)));
        let slot = match position {
            Position::Inside => order.len(),
            Position::Before | Position::After => {
                let idx = order.iter().position(|s| s.id == anchor.id).ok_or_else(|| {
                    TreeError::InvalidMove(format!(
                        "target {} is not a child of '{}'",
                        anchor.id, dest.path
                    ))
                })?;
                if position == Position::After {
                    idx.saturating_add(1)
                } else {
                    idx
                }
            }
        };
        let mut dest_ids: Vec<NodeId> = order.iter().map(|s| s.id).collect();
        dest_ids.insert(slot, node.id);
        for sibling in dest_siblings {
            originals.entry(sibling.id).or_insert(sibling);
        }
        renumber(&dest_ids, &originals, &mut staged)?;

        // Close the gap at the origin, unless the node stayed with its siblings.
        if node.parent_path().as_deref() != Some(dest.path.as_str()) {
            let mut remaining: Vec<&Node> =
                origin_siblings.iter().filter(|s| s.id != node.id).collect();
            remaining.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.path.cmp(&b.path)));
            let origin_ids: Vec<NodeId> = remaining.iter().map(|s| s.id).collect();
            for sibling in origin_siblings {
                originals.entry(sibling.id).or_insert(sibling);
            }
            renumber(&origin_ids, &originals, &mut staged)?;
        }

        let moved = staged
            .get(&node.id)
            .cloned()
            .ok_or_else(|| TreeError::InvalidMove("subtree does not contain the moved node".to_string()))?;

        let writes = staged
            .into_values()
            .filter(|n| originals.get(&n.id).is_none_or(|orig| *orig != n))
            .collect();

        Ok(Self { moved, writes })
    }

    /// Whether applying the plan would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Number of records the plan rewrites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }
}

/// Assign contiguous ranks following `ids`, staging a copy of each record.
fn renumber(
    ids: &[NodeId],
    originals: &BTreeMap<NodeId, &Node>,
    staged: &mut BTreeMap<NodeId, Node>,
) -> Result<(), TreeError> {
    for (idx, id) in ids.iter().enumerate() {
        let rank = u32::try_from(idx)
            .map_err(|_| TreeError::InvalidMove("too many siblings".to_string()))?;
        if let Some(record) = staged.get_mut(id) {
            record.rank = rank;
        } else if let Some(original) = originals.get(id) {
            let mut record = (*original).clone();
            record.rank = rank;
            staged.insert(*id, record);
        }
    }
    Ok(())
}

// =============================================================================
// MOVER
// =============================================================================

/// Validates, plans and applies moves.
pub struct Mover<'a> {
    store: &'a mut dyn NodeStore,
    guard: &'a dyn PermissionGuard,
}

impl<'a> Mover<'a> {
    pub fn new(store: &'a mut dyn NodeStore, guard: &'a dyn PermissionGuard) -> Self {
        Self { store, guard }
    }

    /// Validate a move and compute its plan without writing anything.
    pub fn plan(
        &self,
        ctx: &RequestContext,
        node_id: NodeId,
        target_id: NodeId,
        position: Position,
    ) -> Result<MovePlan, TreeError> {
        let node = self
            .store
            .get(node_id)?
            .ok_or_else(|| TreeError::NotFound(format!("node {}", node_id)))?;
        let target = self
            .store
            .get(target_id)?
            .ok_or_else(|| TreeError::NotFound(format!("target {}", target_id)))?;

        if node.parked {
            return Err(TreeError::CannotMoveParked(node.id));
        }
        if node.id == target.id || node.is_ancestor_of(&target) {
            return Err(TreeError::CyclicMove {
                node: node.id,
                target: target.id,
            });
        }

        let dest = match position {
            Position::Inside => target.clone(),
            Position::Before | Position::After => {
                let parent_path = target.parent_path().ok_or_else(|| {
                    TreeError::InvalidMove(format!(
                        "cannot place a node {} the root",
                        position
                    ))
                })?;
                self.store
                    .get_by_path(&parent_path)?
                    .ok_or_else(|| TreeError::NotFound(format!("parent '{}'", parent_path)))?
            }
        };

        if !self.guard.can_edit(ctx, &node) {
            return Err(TreeError::PermissionDenied(format!(
                "cannot move '{}'",
                node.path
            )));
        }
        if !self.guard.can_edit(ctx, &dest) {
            return Err(TreeError::PermissionDenied(format!(
                "cannot move into '{}'",
                dest.path
            )));
        }

        // Inside the trash a colliding slug gets a counter suffix, so a
        // page can always be soft-deleted.
        let dest_siblings = self.store.children(&dest.path)?;
        let taken: BTreeSet<&str> = dest_siblings
            .iter()
            .filter(|s| s.id != node.id)
            .map(|s| s.slug.as_str())
            .collect();
        let mut moving = node.clone();
        if taken.contains(node.slug.as_str()) {
            if !dest.trash {
                return Err(TreeError::SlugConflict {
                    parent_path: dest.path,
                    slug: node.slug,
                });
            }
            moving.slug = path::unique_slug(&node.slug, &taken);
            debug!(
                node = %node.id,
                from = %node.slug,
                to = %moving.slug,
                "slug taken in trash, renaming"
            );
        }

        let origin_siblings = match node.parent_path() {
            Some(p) if p != dest.path => self.store.children(&p)?,
            _ => Vec::new(),
        };
        let mut subtree = self.store.scan_subtree(&node.path)?;
        sort_by_rank(&mut subtree);

        MovePlan::build(
            &moving,
            &dest,
            position,
            &target,
            &subtree,
            &origin_siblings,
            &dest_siblings,
        )
    }

    /// Persist a plan with one batched write. Empty plans write nothing.
    pub fn apply(&mut self, plan: &MovePlan) -> Result<(), TreeError> {
        if plan.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.store.upsert_many(&plan.writes) {
            if let TreeError::PartialFailure { written, failed } = &e {
                error!(
                    node = %plan.moved.id,
                    written = written.len(),
                    failed = failed.len(),
                    "move landed partially; tree needs repair"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    /// Validate, plan and apply in one call. Returns the moved node.
    pub fn move_node(
        &mut self,
        ctx: &RequestContext,
        node_id: NodeId,
        target_id: NodeId,
        position: Position,
    ) -> Result<Node, TreeError> {
        let plan = self.plan(ctx, node_id, target_id, position)?;
        self.apply(&plan)?;
        info!(
            node = %plan.moved.id,
            path = %plan.moved.path,
            rank = plan.moved.rank,
            records = plan.len(),
            "node moved"
        );
        Ok(plan.moved)
    }
}

// =============================================================================
// TESTS
// =============================================================================
