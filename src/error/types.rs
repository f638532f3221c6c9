//! Error types
//!
//! Defines domain-specific error types for each module of the FTP engine.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Control connection framing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
    #[error("line contains control byte 0x{0:02x}")]
    ControlByte(u8),
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error("empty command")]
    Empty,
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

/// Authentication module errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Authentication failed for user: {0}")]
    AuthenticationFailed(String),
    #[error("Too many failed login attempts")]
    TooManyAttempts,
    #[error("User not logged in")]
    NotLoggedIn,
}

/// Session state machine errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Bad sequence of commands: {0}")]
    BadSequence(&'static str),
    #[error("Not allowed: transfer in progress")]
    TransferInProgress,
    #[error("Missing argument for {0}")]
    MissingArgument(&'static str),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unsupported parameter: {0}")]
    UnsupportedParameter(String),
    #[error("Use PASV or PORT first")]
    NoDataEndpoint,
}

/// Filesystem adapter errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Path escapes root: {0}")]
    PathEscapesRoot(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Not a regular file: {0}")]
    NotAFile(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Classify an OS error raised while operating on `path`.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_string()),
            io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_string()),
            io::ErrorKind::DirectoryNotEmpty => StorageError::DirectoryNotEmpty(path.to_string()),
            io::ErrorKind::NotADirectory => StorageError::NotADirectory(path.to_string()),
            _ => StorageError::Io(err),
        }
    }
}

/// Data connection errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("No available port for data connection")]
    ListenerExhausted,
    #[error("Passive mode needs an IPv4 address")]
    PassiveUnsupported,
    #[error("Timeout waiting for data connection")]
    ConnectTimeout,
    #[error("Failed to establish data connection to {0}: {1}")]
    ConnectFailed(SocketAddr, io::Error),
    #[error("Invalid PORT command: {0}")]
    InvalidPortCommand(String),
    #[error("IP mismatch: expected {expected}, got {provided}")]
    IpMismatch { expected: String, provided: String },
    #[error("Invalid port {0}: must be between 1024 and 65535")]
    InvalidPortRange(u16),
    #[error("Data connection idle for too long")]
    TransferTimeout,
    #[error("Data connection reset: {0}")]
    ConnectionReset(io::Error),
    #[error("Upload exceeds {0} bytes")]
    TooLarge(u64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Client engine errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Unexpected reply {code}: {text}")]
    UnexpectedReply { code: u16, text: String },
    #[error("Connection closed by server")]
    ConnectionClosed,
    #[error("Client is not connected")]
    NotConnected,
    #[error("Unparsable PASV reply: {0}")]
    BadPassiveReply(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// General FTP engine error that encompasses all error types
#[derive(Debug, Error)]
pub enum FtpError {
    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
