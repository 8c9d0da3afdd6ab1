//! # Materialized Paths
//!
//! Pure string arithmetic over node paths. Nothing here touches a store.
//!
//! A path is the separator-joined chain of slugs from the root down to a
//! node. The root's path is the separator alone, so a child of the root is
//! `/slug`, not `//slug`.

use crate::primitives::{MAX_SLUG_LENGTH, ROOT_PATH, SEPARATOR};
use crate::TreeError;
use std::collections::BTreeSet;

/// Path of a child with the given slug under `parent`.
#[must_use]
pub fn join(parent: &str, slug: &str) -> String {
    if parent == ROOT_PATH {
        format!("{}{}", SEPARATOR, slug)
    } else {
        format!("{}{}{}", parent, SEPARATOR, slug)
    }
}

/// Path of the parent, or `None` for the root.
#[must_use]
pub fn parent(path: &str) -> Option<String> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind(SEPARATOR)? {
        0 => Some(ROOT_PATH.to_string()),
        idx => Some(path[..idx].to_string()),
    }
}

/// Non-empty segments of a path, root first.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Depth implied by a path: the number of segments.
#[must_use]
pub fn level_of(path: &str) -> u32 {
    segments(path).count() as u32
}

/// Whether `path` is `prefix` itself or lies anywhere below it.
#[must_use]
pub fn is_within(path: &str, prefix: &str) -> bool {
    if path == prefix {
        return true;
    }
    if prefix == ROOT_PATH {
        return path.starts_with(SEPARATOR);
    }
    path.len() > prefix.len()
        && path.starts_with(prefix)
        && path[prefix.len()..].starts_with(SEPARATOR)
}

/// Replace the `from` prefix of `path` with `to`.
///
/// Returns `None` when `path` is not within `from`.
#[must_use]
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if path == from {
        return Some(to.to_string());
    }
    if !is_within(path, from) {
        return None;
    }
    let rest = if from == ROOT_PATH {
        &path[1..]
    } else {
        &path[from.len() + 1..]
    };
    Some(join(to, rest))
}

/// Paths of every ancestor of `path`, root first. Empty for the root.
#[must_use]
pub fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        current = parent(&p);
        out.push(p);
    }
    out.reverse();
    out
}

/// Key range `[lower, upper)` covering every strict descendant of `prefix`
/// in a lexicographically ordered path index.
///
/// `'0'` is the byte right after the separator, so the range excludes
/// siblings such as `/parent-x` that sort between `/parent` and
/// `/parent/`.
#[must_use]
pub fn descendant_bounds(prefix: &str) -> (String, String) {
    let base = if prefix == ROOT_PATH { "" } else { prefix };
    (format!("{}/", base), format!("{}0", base))
}

/// Validate a slug supplied for a new or moved node.
pub fn validate_slug(slug: &str) -> Result<(), TreeError> {
    if slug.is_empty() {
        return Err(TreeError::InvalidNode("slug must not be empty".to_string()));
    }
    if slug.contains(SEPARATOR) {
        return Err(TreeError::InvalidNode(format!(
            "slug '{}' must not contain '{}'",
            slug, SEPARATOR
        )));
    }
    if slug.len() > MAX_SLUG_LENGTH {
        return Err(TreeError::InvalidNode(format!(
            "slug length {} exceeds maximum {} bytes",
            slug.len(),
            MAX_SLUG_LENGTH
        )));
    }
    if slug.chars().any(char::is_whitespace) {
        return Err(TreeError::InvalidNode(format!(
            "slug '{}' must not contain whitespace",
            slug
        )));
    }
    Ok(())
}

/// First of `slug`, `slug-1`, `slug-2`, ... not in `taken`.
///
/// The base is shortened when needed so the result stays within
/// `MAX_SLUG_LENGTH`.
#[must_use]
pub fn unique_slug(slug: &str, taken: &BTreeSet<&str>) -> String {
    if !taken.contains(slug) {
        return slug.to_string();
    }
    let mut n: u64 = 1;
    loop {
        let suffix = format!("-{}", n);
        let mut cut = MAX_SLUG_LENGTH.saturating_sub(suffix.len()).min(slug.len());
        while !slug.is_char_boundary(cut) {
            cut = cut.saturating_sub(1);
        }
        let candidate = format!("{}{}", slug.get(..cut).unwrap_or_default(), suffix);
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        n = n.saturating_add(1);
    }
}

// =============================================================================
// TESTS
// =============================================================================
