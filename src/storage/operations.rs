//! Storage operations
//!
//! The filesystem adapter: every FTP path argument goes through
//! [`Filesystem::resolve`] before any real filesystem call is made.

use log::{debug, info, warn};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::StorageError;
use crate::storage::listing::DirEntry;
use crate::storage::validation::{
    ensure_within_root, file_name, resolve_virtual_path, virtual_to_real_path,
};

/// Upload temporaries start with this prefix and never show up in listings
pub const TEMP_PREFIX: &str = ".ftp-upload-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A path argument resolved and confined to the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    virtual_path: String,
    real_path: PathBuf,
}

impl ResolvedPath {
    pub fn virtual_path(&self) -> &str {
        &self.virtual_path
    }
}

/// Root-confined view of the server directory
#[derive(Debug, Clone)]
pub struct Filesystem {
    root: PathBuf,
}

impl Filesystem {
    /// `root` must exist; it is canonicalised once here.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root)
            .map_err(|e| StorageError::from_io(e, &root.display().to_string()))?;
        if !root.is_dir() {
            return Err(StorageError::NotADirectory(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `arg` relative to `cwd` and check it stays under the root
    pub async fn resolve(&self, cwd: &str, arg: &str) -> Result<ResolvedPath, StorageError> {
        let virtual_path = resolve_virtual_path(cwd, arg)?;
        let real_path = virtual_to_real_path(&self.root, &virtual_path);
        ensure_within_root(&self.root, &real_path, &virtual_path).await?;
        Ok(ResolvedPath {
            virtual_path,
            real_path,
        })
    }

    /// Snapshot of a directory, sorted by name. A file path lists just that file.
    pub async fn list(&self, path: &ResolvedPath) -> Result<Vec<DirEntry>, StorageError> {
        let metadata = fs::metadata(&path.real_path)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;

        if !metadata.is_dir() {
            let name = file_name(&path.virtual_path).unwrap_or_default().to_string();
            return Ok(vec![to_entry(name, &metadata)]);
        }

        let mut reader = fs::read_dir(&path.real_path)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            // One entry per line: a CR or LF in a name would forge extra entries
            if name.contains(char::is_control) {
                warn!("Skipping {name:?} in listing: control character in name");
                continue;
            }
            // Entries removed between read_dir and stat are skipped
            match fs::metadata(entry.path()).await {
                Ok(metadata) => entries.push(to_entry(name, &metadata)),
                Err(e) => debug!("Skipping {name} in listing: {e}"),
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Listed {} ({} entries)", path.virtual_path, entries.len());
        Ok(entries)
    }

    /// Open a regular file for reading, positioned at `offset`
    pub async fn open_read(&self, path: &ResolvedPath, offset: u64) -> Result<File, StorageError> {
        let metadata = fs::metadata(&path.real_path)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;
        if !metadata.is_file() {
            return Err(StorageError::NotAFile(path.virtual_path.clone()));
        }
        if offset > metadata.len() {
            return Err(StorageError::InvalidPath(format!(
                "{}: restart offset beyond end of file",
                path.virtual_path
            )));
        }

        let mut file = File::open(&path.real_path)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(file)
    }

    /// Prepare an upload sink.
    ///
    /// Without an offset the data goes to a hidden temporary next to the
    /// target and only replaces it on [`Upload::commit`]. With an offset the
    /// existing file is written in place from that position.
    pub async fn begin_upload(
        &self,
        path: &ResolvedPath,
        offset: Option<u64>,
    ) -> Result<Upload, StorageError> {
        let name = file_name(&path.virtual_path)
            .ok_or_else(|| StorageError::NotAFile(path.virtual_path.clone()))?;

        let parent = path
            .real_path
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(path.virtual_path.clone()))?;
        let parent_meta = fs::metadata(parent)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;
        if !parent_meta.is_dir() {
            return Err(StorageError::NotADirectory(path.virtual_path.clone()));
        }

        match fs::metadata(&path.real_path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(StorageError::NotAFile(path.virtual_path.clone()));
            }
            Ok(meta) => {
                if offset.is_some_and(|o| o > meta.len()) {
                    return Err(StorageError::InvalidPath(format!(
                        "{}: restart offset beyond end of file",
                        path.virtual_path
                    )));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if offset.is_some_and(|o| o > 0) {
                    return Err(StorageError::NotFound(path.virtual_path.clone()));
                }
            }
            Err(e) => return Err(StorageError::from_io(e, &path.virtual_path)),
        }

        if let Some(offset) = offset.filter(|&o| o > 0) {
            let mut file = OpenOptions::new()
                .write(true)
                .open(&path.real_path)
                .await
                .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;
            file.seek(SeekFrom::Start(offset)).await?;
            // Anything past the new end is replaced by the resumed data
            file.set_len(offset).await?;
            return Ok(Upload {
                file,
                temp: None,
                target: path.clone(),
            });
        }

        let temp_path = parent.join(format!(
            "{TEMP_PREFIX}{}-{}-{name}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;

        Ok(Upload {
            file,
            temp: Some(TempGuard { path: temp_path }),
            target: path.clone(),
        })
    }

    pub async fn remove(&self, path: &ResolvedPath) -> Result<(), StorageError> {
        let metadata = fs::symlink_metadata(&path.real_path)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;
        if metadata.is_dir() {
            return Err(StorageError::NotAFile(path.virtual_path.clone()));
        }
        fs::remove_file(&path.real_path)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;
        info!("Deleted file {}", path.virtual_path);
        Ok(())
    }

    pub async fn make_dir(&self, path: &ResolvedPath) -> Result<(), StorageError> {
        if path.virtual_path == "/" {
            return Err(StorageError::AlreadyExists(path.virtual_path.clone()));
        }
        fs::create_dir(&path.real_path)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;
        info!("Created directory {}", path.virtual_path);
        Ok(())
    }

    /// Remove an empty directory. The root itself can never be removed.
    pub async fn remove_dir(&self, path: &ResolvedPath) -> Result<(), StorageError> {
        if path.virtual_path == "/" {
            return Err(StorageError::PermissionDenied(path.virtual_path.clone()));
        }

        let metadata = fs::symlink_metadata(&path.real_path)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;
        if !metadata.is_dir() {
            return Err(StorageError::NotADirectory(path.virtual_path.clone()));
        }

        let mut reader = fs::read_dir(&path.real_path)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;
        if reader.next_entry().await?.is_some() {
            return Err(StorageError::DirectoryNotEmpty(path.virtual_path.clone()));
        }

        fs::remove_dir(&path.real_path)
            .await
            .map_err(|e| StorageError::from_io(e, &path.virtual_path))?;
        info!("Removed directory {}", path.virtual_path);
        Ok(())
    }

    /// Whether `path` names an existing directory
    pub async fn is_dir(&self, path: &ResolvedPath) -> Result<bool, StorageError> {
        match fs::metadata(&path.real_path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) => Err(StorageError::from_io(e, &path.virtual_path)),
        }
    }
}

fn to_entry(name: String, metadata: &std::fs::Metadata) -> DirEntry {
    DirEntry {
        name,
        is_dir: metadata.is_dir(),
        size: metadata.len(),
        readonly: metadata.permissions().readonly(),
        modified: metadata.modified().unwrap_or(std::time::UNIX_EPOCH),
    }
}

/// Removes an upload temporary unless it was committed
#[derive(Debug)]
struct TempGuard {
    path: PathBuf,
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove upload temporary {}: {e}", self.path.display());
            }
        }
    }
}

/// An upload in progress. Dropping it without `commit` discards the data
/// (for a fresh upload) or leaves the partially resumed file in place.
#[derive(Debug)]
pub struct Upload {
    file: File,
    temp: Option<TempGuard>,
    target: ResolvedPath,
}

impl Upload {
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Flush and move the data into place
    pub async fn commit(self) -> Result<(), StorageError> {
        let Upload {
            mut file,
            temp,
            target,
        } = self;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(temp) = temp {
            // On failure the guard still removes the temporary
            fs::rename(&temp.path, &target.real_path)
                .await
                .map_err(|e| StorageError::from_io(e, &target.virtual_path))?;
        }
        info!("Stored file {}", target.virtual_path);
        Ok(())
    }
}
