//! FTP Transfer modes
//!
//! Representation types (TYPE) and data connection modes.

use std::fmt;

use crate::error::SessionError;

/// Representation type selected with TYPE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferType {
    /// `TYPE A`
    Ascii,
    /// `TYPE I`
    #[default]
    Binary,
}

impl TransferType {
    /// Parse a TYPE argument. Only non-print ASCII and image/8-bit local are supported.
    pub fn parse(arg: &str) -> Result<Self, SessionError> {
        let normalized = arg
            .split_whitespace()
            .map(str::to_ascii_uppercase)
            .collect::<Vec<_>>()
            .join(" ");

        match normalized.as_str() {
            "A" | "A N" => Ok(TransferType::Ascii),
            "I" | "L 8" => Ok(TransferType::Binary),
            "E" | "E N" | "A T" | "A C" | "E T" | "E C" => {
                Err(SessionError::UnsupportedParameter(arg.to_string()))
            }
            t if t.starts_with("L ") => Err(SessionError::UnsupportedParameter(arg.to_string())),
            _ => Err(SessionError::InvalidArgument(arg.to_string())),
        }
    }

    /// Argument to send with TYPE
    pub fn code(&self) -> &'static str {
        match self {
            TransferType::Ascii => "A",
            TransferType::Binary => "I",
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferType::Ascii => f.write_str("ASCII"),
            TransferType::Binary => f.write_str("Binary"),
        }
    }
}

/// Who opens the data connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// PORT: the server connects to the client
    Active,
    /// PASV: the client connects to the server
    #[default]
    Passive,
}
