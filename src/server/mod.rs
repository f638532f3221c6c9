//! Server core functionality
//!
//! This module contains the accept loop, admission control and the context
//! shared by every session.

pub mod context;
pub mod core;

pub use context::ServerContext;
pub use core::Server;
