//! FTP Protocol implementation
//!
//! Handles the control connection wire format, command parsing, reply
//! encoding and command dispatch.

pub mod codec;
pub mod commands;
pub mod handlers;
pub mod parser;
pub mod responses;

pub use codec::{CommandReader, LineReader, ReplyReader, ReplyWriter};
pub use commands::{Command, Verb};
pub use handlers::{Dispatch, handle_command};
pub use parser::parse_command;
pub use responses::{Reply, ReplyDecoder};
