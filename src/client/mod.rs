//! FTP client engine
//!
//! The user-facing side of the protocol: an async client over the same
//! codec the server uses, and a best-effort LIST parser.

pub mod connection;
pub mod listing;

pub use connection::{ClientState, FtpClient};
pub use listing::{EntryKind, ListEntry, parse_list_line, parse_listing};
