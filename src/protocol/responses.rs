//! FTP Response handling
//!
//! Defines FTP reply codes, the `Reply` value and its wire encoding, and the
//! client-side decoder that reassembles (possibly multi-line) replies.

use crate::error::CodecError;

/// Standard FTP reply codes
pub const FILE_STATUS_OK: u16 = 150;
pub const OK: u16 = 200;
pub const SYSTEM_TYPE: u16 = 215;
pub const READY: u16 = 220;
pub const CLOSING: u16 = 221;
pub const ABORT_OK: u16 = 225;
pub const TRANSFER_COMPLETE: u16 = 226;
pub const ENTERING_PASSIVE: u16 = 227;
pub const LOGIN_SUCCESS: u16 = 230;
pub const FILE_ACTION_OK: u16 = 250;
pub const PATH_CREATED: u16 = 257;
pub const PASSWORD_REQUIRED: u16 = 331;
pub const PENDING_FURTHER_INFO: u16 = 350;
pub const SERVICE_NOT_AVAILABLE: u16 = 421;
pub const CANT_OPEN_DATA_CONNECTION: u16 = 425;
pub const TRANSFER_ABORTED: u16 = 426;
pub const LOCAL_ERROR: u16 = 451;
pub const SYNTAX_ERROR: u16 = 500;
pub const ARGUMENT_ERROR: u16 = 501;
pub const BAD_SEQUENCE: u16 = 503;
pub const PARAMETER_NOT_IMPLEMENTED: u16 = 504;
pub const NOT_LOGGED_IN: u16 = 530;
pub const FILE_UNAVAILABLE: u16 = 550;
pub const STORAGE_EXCEEDED: u16 = 552;

/// A reply on the control connection: a code, a text line and optional continuation lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    text: String,
    continuation: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        debug_assert!((100..600).contains(&code));
        Self {
            code,
            text: sanitize(&text.into()),
            continuation: Vec::new(),
        }
    }

    /// Build a multi-line reply. The first line is the reply text, the rest continue it.
    pub fn multiline<I, S>(code: u16, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut lines = lines.into_iter().map(|l| sanitize(&l.into()));
        let text = lines.next().unwrap_or_default();
        Self {
            code,
            text,
            continuation: lines.collect(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn continuation(&self) -> &[String] {
        &self.continuation
    }

    /// 1yz: the command was accepted, another reply will follow
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 2yz
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Encode to wire form.
    ///
    /// Single-line: `code SP text CRLF`. Multi-line: `code-text CRLF`, each
    /// middle line indented by one space so it can never be mistaken for the
    /// terminating line, then `code SP last CRLF`.
    pub fn encode(&self) -> Vec<u8> {
        if self.continuation.is_empty() {
            return format!("{} {}\r\n", self.code, self.text).into_bytes();
        }

        let mut out = format!("{}-{}\r\n", self.code, self.text);
        if let Some((last, middle)) = self.continuation.split_last() {
            for line in middle {
                out.push(' ');
                out.push_str(line);
                out.push_str("\r\n");
            }
            out.push_str(&format!("{} {}\r\n", self.code, last));
        }
        out.into_bytes()
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.text)?;
        for line in &self.continuation {
            write!(f, " | {line}")?;
        }
        Ok(())
    }
}

/// Keep reply text on a single line.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

/// Reassembles replies from the lines a server sends.
#[derive(Debug, Default)]
pub struct ReplyDecoder {
    pending: Option<(u16, Vec<String>)>,
}

impl ReplyDecoder {
    /// Feed one line (terminator stripped). Returns a reply once its last line arrives.
    pub fn feed(&mut self, line: &str) -> Result<Option<Reply>, CodecError> {
        if let Some((code, mut lines)) = self.pending.take() {
            if let Some((line_code, ' ', rest)) = split_status(line) {
                if line_code == code {
                    lines.push(rest.to_string());
                    return Ok(Some(Reply::multiline(code, lines)));
                }
            }
            lines.push(line.strip_prefix(' ').unwrap_or(line).to_string());
            self.pending = Some((code, lines));
            return Ok(None);
        }

        let (code, sep, rest) =
            split_status(line).ok_or_else(|| CodecError::MalformedReply(line.to_string()))?;
        match sep {
            ' ' => Ok(Some(Reply::new(code, rest))),
            '-' => {
                self.pending = Some((code, vec![rest.to_string()]));
                Ok(None)
            }
            _ => Err(CodecError::MalformedReply(line.to_string())),
        }
    }
}

/// Split `ddd<sep>rest`. A bare `ddd` counts as a single-line reply with empty text.
fn split_status(line: &str) -> Option<(u16, char, &str)> {
    let digits = line.get(..3)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) || digits.starts_with('0') {
        return None;
    }
    let code: u16 = digits.parse().ok()?;
    let mut rest = line[3..].chars();
    match rest.next() {
        None => Some((code, ' ', "")),
        Some(sep) => Some((code, sep, rest.as_str())),
    }
}
