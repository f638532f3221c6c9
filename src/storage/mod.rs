//! File system storage management
//!
//! Handles path resolution, root confinement, listings and file operations.

pub mod listing;
pub mod operations;
pub mod validation;

pub use listing::{DirEntry, format_listing};
pub use operations::{Filesystem, ResolvedPath, TEMP_PREFIX, Upload};
pub use validation::{MAX_DIRECTORY_DEPTH, resolve_virtual_path, virtual_to_real_path};
