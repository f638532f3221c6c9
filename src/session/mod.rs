//! Session management
//!
//! Per-connection state and the loop serving one control connection.

pub mod handler;
pub mod state;

pub use handler::handle_client;
pub use state::{Session, SessionState};
