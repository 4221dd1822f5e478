//! Path validation and prefix helpers.
//!
//! The tree never stores parent/child links; every relationship is derived
//! from the slash-delimited path string with the helpers below.

use crate::constants::PATH_SEPARATOR;
use crate::constants::ROOT_PATH;
use crate::KeeperError;

/// Rejects anything that is not an absolute, canonical znode path.
pub fn validate_path(path: &str) -> Result<(), KeeperError> {
    let invalid = |reason: &'static str| KeeperError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if path.is_empty() {
        return Err(invalid("path must not be empty"));
    }
    if !path.starts_with(PATH_SEPARATOR) {
        return Err(invalid("path must start with /"));
    }
    if path == ROOT_PATH {
        return Ok(());
    }
    if path.ends_with(PATH_SEPARATOR) {
        return Err(invalid("path must not end with /"));
    }
    if path.contains('\0') {
        return Err(invalid("null character not allowed"));
    }

    for segment in path[1..].split(PATH_SEPARATOR) {
        match segment {
            "" => return Err(invalid("empty node name")),
            "." | ".." => return Err(invalid("relative paths not allowed")),
            _ => {}
        }
    }

    Ok(())
}

/// Parent path of a non-root path. The root has no parent.
pub fn parent_of(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind(PATH_SEPARATOR) {
        Some(0) => Some(ROOT_PATH),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a path (empty for the root).
pub fn name_of(path: &str) -> &str {
    match path.rfind(PATH_SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Prefix shared by every descendant key of `path`.
pub(crate) fn child_prefix(path: &str) -> String {
    if path == ROOT_PATH {
        ROOT_PATH.to_string()
    } else {
        format!("{path}{PATH_SEPARATOR}")
    }
}

/// Strict ancestors of `path`, nearest first, ending with the root.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent_of(path), |&p| parent_of(p))
}
