//! Path validation
//!
//! Logical path resolution against the session's working directory and the
//! physical check that a resolved path stays under the server root.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Maximum depth of a logical path
pub const MAX_DIRECTORY_DEPTH: usize = 64;

/// Join `arg` onto `cwd` and normalise to an absolute logical path.
///
/// `..` that would climb above `/` is an escape, never clamped.
pub fn resolve_virtual_path(cwd: &str, arg: &str) -> Result<String, StorageError> {
    if arg.contains('\0') || arg.contains('\\') {
        return Err(StorageError::InvalidPath(arg.to_string()));
    }

    let mut parts: Vec<&str> = Vec::new();
    let base = if arg.starts_with('/') { "" } else { cwd };

    for component in base.split('/').chain(arg.split('/')) {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(StorageError::PathEscapesRoot(arg.to_string()));
                }
            }
            name => parts.push(name),
        }
    }

    if parts.len() > MAX_DIRECTORY_DEPTH {
        return Err(StorageError::InvalidPath(arg.to_string()));
    }

    Ok(format!("/{}", parts.join("/")))
}

/// Map an already-normalised logical path onto the real root
pub fn virtual_to_real_path(root: &Path, virtual_path: &str) -> PathBuf {
    virtual_path
        .split('/')
        .filter(|c| !c.is_empty())
        .fold(root.to_path_buf(), |acc, c| acc.join(c))
}

/// Check that `real` stays under `root` once symlinks are followed.
///
/// `root` must already be canonical. The deepest existing ancestor of `real`
/// is canonicalised; a dangling symlink on the way counts as an escape since
/// writing through it would create a file wherever it points.
pub async fn ensure_within_root(
    root: &Path,
    real: &Path,
    virtual_path: &str,
) -> Result<(), StorageError> {
    for ancestor in real.ancestors() {
        match tokio::fs::symlink_metadata(ancestor).await {
            Ok(_) => {
                let canonical = match tokio::fs::canonicalize(ancestor).await {
                    Ok(path) => path,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        return Err(StorageError::PathEscapesRoot(virtual_path.to_string()));
                    }
                    Err(e) => return Err(StorageError::from_io(e, virtual_path)),
                };
                if canonical.starts_with(root) {
                    return Ok(());
                }
                return Err(StorageError::PathEscapesRoot(virtual_path.to_string()));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StorageError::from_io(e, virtual_path)),
        }
    }
    Err(StorageError::PathEscapesRoot(virtual_path.to_string()))
}

/// Last component of a logical path, `None` for `/`
pub fn file_name(virtual_path: &str) -> Option<&str> {
    virtual_path.rsplit('/').next().filter(|n| !n.is_empty())
}
