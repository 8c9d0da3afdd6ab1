//! # Permission Guard
//!
//! The capability check the engine consumes.
//!
//! Deciding *who* a request is and *what* they may do belongs to the
//! surrounding application. The engine only asks yes/no questions about a
//! single node, at two points: result filtering in the cursor and
//! precondition checks in the Inserter and the Mover.

use crate::Node;

/// Identity carried by a request. Opaque to the engine beyond the guard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Who is acting, if anyone is logged in.
    pub actor: Option<String>,
    /// Whether the actor holds administrative rights.
    pub admin: bool,
}

impl RequestContext {
    /// A visitor with no identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A logged-in actor without administrative rights.
    #[must_use]
    pub fn user(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            admin: false,
        }
    }

    /// An actor with administrative rights.
    #[must_use]
    pub fn admin(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            admin: true,
        }
    }
}

/// Yes/no capability checks against a single node.
///
/// Implementations must be `Send + Sync` so a session can be shared across
/// server tasks. A `false` answer is an authorization denial, never a system
/// error.
pub trait PermissionGuard: Send + Sync {
    /// May the actor see this node at all?
    fn can_view(&self, ctx: &RequestContext, node: &Node) -> bool;

    /// May the actor modify this node or place children under it?
    fn can_edit(&self, ctx: &RequestContext, node: &Node) -> bool;
}

/// Default role-based guard.
///
/// - Admins view and edit everything.
/// - Everyone else views published, non-trashed nodes and edits nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleGuard;

impl PermissionGuard for RoleGuard {
    fn can_view(&self, ctx: &RequestContext, node: &Node) -> bool {
        ctx.admin || (node.published && !node.trash)
    }

    fn can_edit(&self, ctx: &RequestContext, _node: &Node) -> bool {
        ctx.admin
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::node;

    #[test]
    fn anonymous_sees_published_only() {
        let guard = RoleGuard;
        let anon = RequestContext::anonymous();
        let mut page = node(1, "/page", 0);
        assert!(guard.can_view(&anon, &page));
        assert!(!guard.can_edit(&anon, &page));

        page.published = false;
        assert!(!guard.can_view(&anon, &page));
    }

    #[test]
    fn trashed_nodes_hidden_from_users() {
        let guard = RoleGuard;
        let mut page = node(1, "/trash/page", 0);
        page.trash = true;
        assert!(!guard.can_view(&RequestContext::user("ann"), &page));
        assert!(guard.can_view(&RequestContext::admin("root"), &page));
    }

    #[test]
    fn admin_edits_everything() {
        let guard = RoleGuard;
        let page = node(1, "/page", 0);
        assert!(guard.can_edit(&RequestContext::admin("root"), &page));
        assert!(!guard.can_edit(&RequestContext::user("ann"), &page));
    }
}
