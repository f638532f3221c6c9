//! Navigate module
//!
//! Handles directory navigation for FTP sessions: changing directories
//! and moving to the parent.

mod operations;

// Re-export public types and functions
pub use operations::{change_directory, change_to_parent};
