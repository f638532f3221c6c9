//! Error handlers
//!
//! The single point where internal errors become FTP replies. Only the reply
//! code and a fixed text cross the wire; paths and OS detail stay in the log.

use crate::error::types::{
    AuthError, CodecError, FtpError, SessionError, StorageError, TransferError,
};
use crate::protocol::responses::{self as codes, Reply};
use log::{debug, error};

/// Convert an error to the reply sent on the control connection
pub fn to_reply(err: &FtpError) -> Reply {
    match err {
        FtpError::Codec(e) => codec_reply(e),
        FtpError::Auth(e) => auth_reply(e),
        FtpError::Session(e) => session_reply(e),
        FtpError::Storage(e) => storage_reply(e),
        FtpError::Transfer(e) => transfer_reply(e),
        FtpError::Io(e) => {
            error!("Local I/O failure: {e}");
            Reply::new(codes::LOCAL_ERROR, "Requested action aborted: local error in processing")
        }
    }
}

fn codec_reply(err: &CodecError) -> Reply {
    match err {
        CodecError::LineTooLong(_) => Reply::new(codes::SYNTAX_ERROR, "Command line too long"),
        _ => Reply::new(codes::SYNTAX_ERROR, "Syntax error, command unrecognized"),
    }
}

fn auth_reply(err: &AuthError) -> Reply {
    match err {
        AuthError::MalformedInput(_) => {
            Reply::new(codes::ARGUMENT_ERROR, "Syntax error in parameters or arguments")
        }
        AuthError::AuthenticationFailed(_) => Reply::new(codes::NOT_LOGGED_IN, "Login incorrect"),
        AuthError::TooManyAttempts => {
            Reply::new(codes::SERVICE_NOT_AVAILABLE, "Too many failed login attempts")
        }
        AuthError::NotLoggedIn => Reply::new(codes::NOT_LOGGED_IN, "Not logged in"),
    }
}

fn session_reply(err: &SessionError) -> Reply {
    match err {
        SessionError::UnknownCommand(_) => {
            Reply::new(codes::SYNTAX_ERROR, "Syntax error, command unrecognized")
        }
        SessionError::BadSequence(_) => Reply::new(codes::BAD_SEQUENCE, "Bad sequence of commands"),
        SessionError::TransferInProgress => {
            Reply::new(codes::BAD_SEQUENCE, "Not allowed: transfer in progress")
        }
        SessionError::MissingArgument(_) | SessionError::InvalidArgument(_) => {
            Reply::new(codes::ARGUMENT_ERROR, "Syntax error in parameters or arguments")
        }
        SessionError::UnsupportedParameter(_) => {
            Reply::new(
                codes::PARAMETER_NOT_IMPLEMENTED,
                "Command not implemented for that parameter",
            )
        }
        SessionError::NoDataEndpoint => {
            Reply::new(codes::CANT_OPEN_DATA_CONNECTION, "Use PASV or PORT first")
        }
    }
}

fn storage_reply(err: &StorageError) -> Reply {
    let text = match err {
        StorageError::PathEscapesRoot(_) => "Permission denied: path outside of root",
        StorageError::NotFound(_) => "No such file or directory",
        StorageError::DirectoryNotEmpty(_) => "Directory not empty",
        StorageError::PermissionDenied(_) => "Permission denied",
        StorageError::AlreadyExists(_) => "File exists",
        StorageError::NotADirectory(_) => "Not a directory",
        StorageError::NotAFile(_) => "Not a regular file",
        StorageError::InvalidPath(_) => "Invalid path",
        StorageError::Io(e) => {
            error!("Storage I/O failure: {e}");
            "Requested action not taken"
        }
    };
    debug!("Storage error translated to 550: {err}");
    Reply::new(codes::FILE_UNAVAILABLE, text)
}

fn transfer_reply(err: &TransferError) -> Reply {
    match err {
        TransferError::ListenerExhausted
        | TransferError::PassiveUnsupported
        | TransferError::ConnectTimeout
        | TransferError::ConnectFailed(..) => {
            Reply::new(codes::CANT_OPEN_DATA_CONNECTION, "Can't open data connection")
        }
        TransferError::InvalidPortCommand(_)
        | TransferError::IpMismatch { .. }
        | TransferError::InvalidPortRange(_) => {
            Reply::new(codes::ARGUMENT_ERROR, "Syntax error in parameters or arguments")
        }
        TransferError::TransferTimeout => {
            Reply::new(
                codes::TRANSFER_ABORTED,
                "Connection closed; transfer aborted (idle timeout)",
            )
        }
        TransferError::ConnectionReset(_) => {
            Reply::new(codes::TRANSFER_ABORTED, "Connection closed; transfer aborted")
        }
        TransferError::TooLarge(_) => {
            Reply::new(codes::STORAGE_EXCEEDED, "Requested file action aborted: file too large")
        }
        TransferError::Storage(StorageError::Io(e)) => {
            error!("Local I/O failure during transfer: {e}");
            Reply::new(codes::LOCAL_ERROR, "Requested action aborted: local error in processing")
        }
        TransferError::Storage(e) => storage_reply(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_storage_errors_map_to_550_without_paths() {
        let err = FtpError::from(StorageError::PathEscapesRoot("/etc/passwd".into()));
        let reply = to_reply(&err);
        assert_eq!(reply.code(), 550);
        assert!(!reply.text().contains("/etc/passwd"));

        let reply = to_reply(&StorageError::DirectoryNotEmpty("/a".into()).into());
        assert_eq!(reply.code(), 550);
        assert_eq!(reply.text(), "Directory not empty");
    }

    #[test]
    fn test_session_errors() {
        assert_eq!(to_reply(&SessionError::NoDataEndpoint.into()).code(), 425);
        assert_eq!(to_reply(&SessionError::BadSequence("PASS").into()).code(), 503);
        assert_eq!(to_reply(&SessionError::TransferInProgress.into()).code(), 503);
        assert_eq!(to_reply(&SessionError::MissingArgument("CWD").into()).code(), 501);
        assert_eq!(to_reply(&SessionError::UnknownCommand("XYZ".into()).into()).code(), 500);
    }

    #[test]
    fn test_transfer_errors() {
        assert_eq!(to_reply(&TransferError::ListenerExhausted.into()).code(), 425);
        assert_eq!(to_reply(&TransferError::TransferTimeout.into()).code(), 426);
        assert_eq!(
            to_reply(&TransferError::ConnectionReset(io::ErrorKind::BrokenPipe.into()).into())
                .code(),
            426
        );
        assert_eq!(to_reply(&TransferError::TooLarge(10).into()).code(), 552);
        let nested = TransferError::Storage(StorageError::NotFound("x".into()));
        assert_eq!(to_reply(&nested.into()).code(), 550);
    }

    #[test]
    fn test_auth_errors() {
        assert_eq!(to_reply(&AuthError::AuthenticationFailed("u".into()).into()).code(), 530);
        assert_eq!(to_reply(&AuthError::TooManyAttempts.into()).code(), 421);
        assert_eq!(to_reply(&AuthError::NotLoggedIn.into()).code(), 530);
    }
}
