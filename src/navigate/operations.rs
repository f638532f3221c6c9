//! Navigation operations implementation

use crate::error::StorageError;
use crate::storage::Filesystem;

/// Changes the working directory, returning the new logical path
pub async fn change_directory(
    fs: &Filesystem,
    current_virtual_path: &str,
    target_path: &str,
) -> Result<String, StorageError> {
    if target_path.is_empty() {
        return Err(StorageError::InvalidPath("Empty path provided".into()));
    }

    let resolved = fs.resolve(current_virtual_path, target_path).await?;
    if !fs.is_dir(&resolved).await? {
        return Err(StorageError::NotADirectory(resolved.virtual_path().to_string()));
    }

    Ok(resolved.virtual_path().to_string())
}

/// CDUP: move to the parent directory. At `/` this is an escape like `CWD ..`.
pub async fn change_to_parent(
    fs: &Filesystem,
    current_virtual_path: &str,
) -> Result<String, StorageError> {
    change_directory(fs, current_virtual_path, "..").await
}
