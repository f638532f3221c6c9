//! FTP Command parsing
//!
//! Turns one raw control line into a [`Command`].

use crate::error::CodecError;
use crate::protocol::commands::{Command, Verb};

/// Decode a single command line.
///
/// `line` may still carry its CRLF (or bare LF) terminator. Any other C0
/// control byte, DEL, or invalid UTF-8 makes the line malformed.
pub fn parse_command(line: &[u8]) -> Result<Command, CodecError> {
    let line = strip_terminator(line);

    if let Some(&b) = line.iter().find(|&&b| b < 0x20 || b == 0x7f) {
        return Err(CodecError::ControlByte(b));
    }

    let text = std::str::from_utf8(line).map_err(|_| CodecError::InvalidUtf8)?;
    let text = text.trim_end();
    let text = text.trim_start_matches(' ');
    if text.is_empty() {
        return Err(CodecError::Empty);
    }

    let (token, arg) = match text.split_once(' ') {
        Some((token, rest)) => (token, rest),
        None => (text, ""),
    };

    Ok(Command::new(Verb::from_token(token), arg))
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Command {
        parse_command(s.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(parse("QUIT\r\n"), Command::new(Verb::Quit, ""));
        assert_eq!(parse("PWD\n"), Command::new(Verb::Pwd, ""));
        assert_eq!(parse("pasv\r\n"), Command::new(Verb::Pasv, ""));
    }

    #[test]
    fn test_parse_commands_with_args() {
        assert_eq!(parse("CWD /some/path\r\n"), Command::new(Verb::Cwd, "/some/path"));
        assert_eq!(parse("USER username\r\n"), Command::new(Verb::User, "username"));
        assert_eq!(parse("TYPE I\r\n"), Command::new(Verb::Type, "I"));
    }

    #[test]
    fn test_inner_spaces_are_preserved() {
        assert_eq!(
            parse("STOR my  holiday photo.jpg  \r\n"),
            Command::new(Verb::Stor, "my  holiday photo.jpg")
        );
        assert_eq!(parse("  LIST\r\n"), Command::new(Verb::List, ""));
    }

    #[test]
    fn test_only_the_separator_is_removed() {
        assert_eq!(parse("STOR  leading.txt\r\n"), Command::new(Verb::Stor, " leading.txt"));
        assert_eq!(parse("DELE   x\r\n"), Command::new(Verb::Dele, "  x"));
    }

    #[test]
    fn test_unknown_commands() {
        assert_eq!(parse("FOO bar\r\n"), Command::new(Verb::Unknown("FOO".into()), "bar"));
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(parse_command(b"\r\n"), Err(CodecError::Empty));
        assert_eq!(parse_command(b"   \r\n"), Err(CodecError::Empty));
        assert_eq!(parse_command(b"RETR a\0b\r\n"), Err(CodecError::ControlByte(0)));
        assert_eq!(parse_command(b"RETR a\rb\r\n"), Err(CodecError::ControlByte(b'\r')));
        assert_eq!(parse_command(b"RETR \x1b[2J\r\n"), Err(CodecError::ControlByte(0x1b)));
        assert_eq!(parse_command(b"RETR \xff\xfe\r\n"), Err(CodecError::InvalidUtf8));
    }
}
