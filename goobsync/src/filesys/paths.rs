//! Containment checks for client-supplied paths
//!
//! Every path the server touches on behalf of a client goes through
//! [`resolve_within`]. A relative path is accepted only if it is made of plain
//! names, so the joined result cannot leave its root lexically; an existing
//! ancestor is additionally canonicalized so a symlink inside the root cannot
//! point the write elsewhere.

use std::path::{Component, Path, PathBuf};

use crate::errors::EngineError;

/// Normalize a posix-style relative path, rejecting anything that could
/// escape: absolute paths, `..`, backslashes, drive prefixes, NUL bytes.
/// `.` segments and repeated slashes are dropped.
pub fn normalize_rel_path(rel_path: &str) -> Result<String, EngineError> {
    if rel_path.contains('\0') || rel_path.contains('\\') || rel_path.starts_with('/') {
        return Err(EngineError::traversal(rel_path));
    }

    let mut segments = Vec::new();
    for segment in rel_path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(EngineError::traversal(rel_path)),
            s => {
                let mut components = Path::new(s).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => segments.push(s),
                    _ => return Err(EngineError::traversal(rel_path)),
                }
            }
        }
    }

    if segments.is_empty() {
        return Err(EngineError::traversal(rel_path));
    }
    Ok(segments.join("/"))
}

/// Join `rel_path` under `root`, failing with `PathTraversal` if the result
/// would resolve outside of it.
pub fn resolve_within(root: &Path, rel_path: &str) -> Result<PathBuf, EngineError> {
    let normalized = normalize_rel_path(rel_path)?;
    let joined = root.join(&normalized);
    if !joined.starts_with(root) {
        return Err(EngineError::traversal(rel_path));
    }

    if let Ok(canonical_root) = root.canonicalize() {
        let mut ancestor = joined.as_path();
        loop {
            if let Ok(canonical) = ancestor.canonicalize() {
                if !canonical.starts_with(&canonical_root) {
                    return Err(EngineError::traversal(rel_path));
                }
                break;
            }
            match ancestor.parent() {
                Some(parent) if parent.starts_with(root) => ancestor = parent,
                _ => break,
            }
        }
    }

    Ok(joined)
}
