//! # Tree Primitives
//!
//! Hardcoded constants for the pagetree engine.
//!
//! These are compiled into the binary and are immutable at runtime.

/// Separator between path segments. The root's path is the separator alone.
pub const SEPARATOR: char = '/';

/// Path (and slug) of the parked home page.
pub const ROOT_PATH: &str = "/";

/// Slug of the parked trash container, a direct child of the root.
pub const TRASH_SLUG: &str = "trash";

/// Content type of the parked home page.
pub const HOME_TYPE: &str = "home";

/// Content type of the parked trash container.
pub const TRASH_TYPE: &str = "trash";

/// Magic bytes for the snapshot format header.
pub const MAGIC_BYTES: &[u8; 4] = b"PTRE";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a single slug, in bytes.
pub const MAX_SLUG_LENGTH: usize = 256;

/// Maximum length of a title, in bytes.
pub const MAX_TITLE_LENGTH: usize = 1024;

/// Maximum tree depth accepted by the Inserter and the Mover.
///
/// Keeps ancestor decomposition and path lengths bounded.
pub const MAX_TREE_DEPTH: u32 = 64;

/// Maximum `skip`/`limit` a cursor accepts.
pub const MAX_CURSOR_LIMIT: usize = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_is_separator() {
        assert_eq!(ROOT_PATH, SEPARATOR.to_string());
    }

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"PTRE");
    }
}
