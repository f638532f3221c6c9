//! Module `state`
//!
//! Per-connection session state. Owned exclusively by the task serving the
//! control connection; the dispatcher mutates it, nothing else sees it.

use std::fmt;
use std::net::SocketAddr;

use crate::auth::{Access, Permissions};
use crate::transfer::{DataEndpoint, TransferType};

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no USER yet
    New,
    /// USER received, waiting for PASS
    Authenticating,
    /// Logged in, no data endpoint pending
    Authenticated,
    /// Logged in with a PASV/PORT endpoint waiting for a transfer command
    Idle,
    /// A LIST/RETR/STOR job is running
    Transferring,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::New => "new",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::Idle => "idle",
            SessionState::Transferring => "transferring",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
enum Login {
    Anonymous,
    UserGiven(String),
    LoggedIn {
        username: String,
        permissions: Permissions,
    },
}

/// Represents the state of one FTP control connection.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    local: SocketAddr,
    login: Login,
    failed_logins: u32,
    cwd: String,
    transfer_type: TransferType,
    pending_endpoint: Option<DataEndpoint>,
    restart_offset: Option<u64>,
    transferring: bool,
    closed: bool,
}

impl Session {
    pub fn new(peer: SocketAddr, local: SocketAddr) -> Self {
        Self {
            peer,
            local,
            login: Login::Anonymous,
            failed_logins: 0,
            cwd: "/".to_string(),
            transfer_type: TransferType::default(),
            pending_endpoint: None,
            restart_offset: None,
            transferring: false,
            closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.closed {
            return SessionState::Closed;
        }
        match self.login {
            Login::Anonymous if self.failed_logins > 0 => SessionState::Authenticating,
            Login::Anonymous => SessionState::New,
            Login::UserGiven(_) => SessionState::Authenticating,
            Login::LoggedIn { .. } if self.transferring => SessionState::Transferring,
            Login::LoggedIn { .. } if self.pending_endpoint.is_some() => SessionState::Idle,
            Login::LoggedIn { .. } => SessionState::Authenticated,
        }
    }

    // --------------------
    // Authentication
    // --------------------

    pub fn is_logged_in(&self) -> bool {
        matches!(self.login, Login::LoggedIn { .. })
    }

    /// Username given with USER, or the logged in user
    pub fn username(&self) -> Option<&str> {
        match &self.login {
            Login::Anonymous => None,
            Login::UserGiven(name) | Login::LoggedIn { username: name, .. } => Some(name),
        }
    }

    pub fn set_pending_user(&mut self, username: String) {
        self.login = Login::UserGiven(username);
    }

    /// Complete a login for the pending user
    pub fn log_in(&mut self, permissions: Permissions) {
        if let Login::UserGiven(username) = std::mem::replace(&mut self.login, Login::Anonymous) {
            self.login = Login::LoggedIn {
                username,
                permissions,
            };
            self.failed_logins = 0;
        }
    }

    /// Record a failed PASS and return the running count.
    ///
    /// The pending user is cleared so the next attempt starts with USER, but
    /// the session stays in `Authenticating` until it logs in or is closed.
    pub fn record_failed_login(&mut self) -> u32 {
        self.login = Login::Anonymous;
        self.failed_logins += 1;
        self.failed_logins
    }

    pub fn allows(&self, access: Access) -> bool {
        match &self.login {
            Login::LoggedIn { permissions, .. } => permissions.allows(access),
            _ => false,
        }
    }

    // --------------------
    // Navigation and transfer parameters
    // --------------------

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn set_cwd(&mut self, path: String) {
        self.cwd = path;
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    pub fn set_transfer_type(&mut self, transfer_type: TransferType) {
        self.transfer_type = transfer_type;
    }

    pub fn restart_offset(&self) -> Option<u64> {
        self.restart_offset
    }

    pub fn set_restart_offset(&mut self, offset: u64) {
        self.restart_offset = Some(offset);
    }

    pub fn take_restart_offset(&mut self) -> Option<u64> {
        self.restart_offset.take()
    }

    // --------------------
    // Data endpoint
    // --------------------

    /// Install a new endpoint. The previous one, if any, is returned so the
    /// caller decides when its listener goes away.
    pub fn replace_endpoint(&mut self, endpoint: DataEndpoint) -> Option<DataEndpoint> {
        self.pending_endpoint.replace(endpoint)
    }

    pub fn has_endpoint(&self) -> bool {
        self.pending_endpoint.is_some()
    }

    pub fn take_endpoint(&mut self) -> Option<DataEndpoint> {
        self.pending_endpoint.take()
    }

    // --------------------
    // Lifecycle
    // --------------------

    pub fn begin_transfer(&mut self) {
        self.transferring = true;
    }

    pub fn end_transfer(&mut self) {
        self.transferring = false;
    }

    pub fn is_transferring(&self) -> bool {
        self.transferring
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.pending_endpoint = None;
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local(&self) -> SocketAddr {
        self.local
    }
}
