//! Logging middleware
//!
//! Connection lifecycle log lines, kept in one place so every session logs
//! them the same way.

use log::{info, warn};
use std::net::SocketAddr;

use super::admission::Refusal;

/// Log an admitted client connection
pub fn log_connection(peer: SocketAddr, active: usize) {
    info!("Client connected: {peer} ({active} active)");
}

/// Log a connection refused at accept time
pub fn log_refusal(peer: SocketAddr, reason: Refusal) {
    match reason {
        Refusal::ServerFull => warn!("Refused {peer}: connection limit reached"),
        Refusal::TooManyFromAddress => warn!("Refused {peer}: too many connections from address"),
    }
}

/// Log the end of a session
pub fn log_disconnect(peer: SocketAddr, user: Option<&str>) {
    match user {
        Some(user) => info!("Client {peer} ({user}) disconnected"),
        None => info!("Client {peer} disconnected"),
    }
}
