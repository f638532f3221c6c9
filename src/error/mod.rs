//! Error handling
//!
//! Defines error types and their translation into FTP replies.

pub mod handlers;
pub mod types;

pub use handlers::to_reply;
pub use types::*;
