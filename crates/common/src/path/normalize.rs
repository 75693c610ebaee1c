// Path canonicalization: `/`-separated layer names, root is `/`.

use thiserror::Error;

/// Path of the tree root.
pub const ROOT_PATH: &str = "/";

/// Maximum allowed path length in characters.
pub const MAX_PATH_CHARS: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path exceeds maximum length of {MAX_PATH_CHARS} characters")]
    TooLong,

    #[error("path contains directory traversal component: {0}")]
    Traversal(String),

    #[error("path contains null byte")]
    NullByte,

    #[error("path contains invalid component: {0}")]
    InvalidComponent(String),
}

/// Normalize a layer path into its canonical form.
///
/// Rules:
/// - Empty segments (leading, trailing or doubled `/`) are ignored
/// - Only slashes normalizes to the root path `/`
/// - Otherwise the result is `/seg1/seg2/...` with no trailing slash
/// - Reject `.` and `..` segments, null bytes and whitespace-only segments
/// - Reject the empty string
/// - Enforce max 512 character limit (after normalization)
pub fn normalize_path(input: &str) -> Result<String, PathError> {
    let parts = segments(input)?;
    if parts.is_empty() {
        return Ok(ROOT_PATH.to_string());
    }

    let result = format!("/{}", parts.join("/"));
    if result.chars().count() > MAX_PATH_CHARS {
        return Err(PathError::TooLong);
    }
    Ok(result)
}

/// Split a path into its validated segment names. The root path yields no
/// segments.
pub fn segments(input: &str) -> Result<Vec<&str>, PathError> {
    if input.is_empty() {
        return Err(PathError::Empty);
    }
    if input.contains('\0') {
        return Err(PathError::NullByte);
    }

    let parts: Vec<&str> = input.split('/').filter(|s| !s.is_empty()).collect();
    for part in &parts {
        if *part == "." || *part == ".." {
            return Err(PathError::Traversal((*part).to_string()));
        }
        if part.trim().is_empty() {
            return Err(PathError::InvalidComponent("(whitespace-only component)".to_string()));
        }
    }
    Ok(parts)
}

/// Append one segment to a canonical path.
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH || parent.is_empty() {
        format!("/{name}")
    } else {
        format!("{}/{name}", parent.trim_end_matches('/'))
    }
}

/// Parent of a canonical path; `None` for the root.
pub fn parent(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) | None => Some(ROOT_PATH.to_string()),
        Some(index) => Some(trimmed[..index].to_string()),
    }
}

/// Last segment of a canonical path; `None` for the root.
pub fn last_segment(path: &str) -> Option<&str> {
    path.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
}

/// Whether `path` equals `ancestor` or lies beneath it. Both must be
/// canonical.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT_PATH {
        return true;
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Replace the `from` prefix of `path` with `to`. Returns `None` when `path`
/// does not lie under `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !is_within(path, from) {
        return None;
    }
    let rest = if from == ROOT_PATH {
        path.trim_start_matches('/')
    } else {
        path[from.len()..].trim_start_matches('/')
    };
    if rest.is_empty() {
        Some(to.to_string())
    } else {
        Some(join(to, rest))
    }
}
