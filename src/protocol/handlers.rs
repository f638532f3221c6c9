//! Command handlers
//!
//! Maps each parsed command to its handler after checking, in order:
//! authentication, verb, session state, argument, pending data endpoint
//! and permission. Every error is turned into a reply here; only the
//! connection loop decides when the control connection goes away.

use log::{debug, info, warn};

use crate::auth::{self, Access};
use crate::error::{AuthError, FtpError, SessionError, StorageError, to_reply};
use crate::navigate;
use crate::protocol::commands::{Command, Verb};
use crate::protocol::responses::{self as codes, Reply};
use crate::server::ServerContext;
use crate::session::Session;
use crate::storage::format_listing;
use crate::transfer::{
    DataTransferJob, JobIo, TransferType, format_host_port, open_active, open_passive,
};

/// What the connection loop should do with a command's outcome
#[derive(Debug)]
pub enum Dispatch {
    Reply(Reply),
    /// Send `preliminary`, then run `job` and send its completion reply
    Transfer {
        preliminary: Reply,
        job: DataTransferJob,
    },
    /// ABOR: cancel the running transfer, if any
    Abort,
    /// Send the reply and close the control connection
    Close(Reply),
}

/// Dispatches a received command and converts any failure to its reply.
pub async fn handle_command(
    session: &mut Session,
    command: &Command,
    ctx: &ServerContext,
) -> Dispatch {
    debug!("{} [{}] {}", session.peer(), session.state(), command);

    match dispatch(session, command, ctx).await {
        Ok(outcome) => outcome,
        Err(FtpError::Auth(AuthError::TooManyAttempts)) => {
            session.close();
            Dispatch::Close(to_reply(&AuthError::TooManyAttempts.into()))
        }
        Err(err) => {
            debug!("{} {} failed: {err}", session.peer(), command.verb);
            Dispatch::Reply(to_reply(&err))
        }
    }
}

async fn dispatch(
    session: &mut Session,
    command: &Command,
    ctx: &ServerContext,
) -> Result<Dispatch, FtpError> {
    let verb = &command.verb;

    if !session.is_logged_in() && !matches!(verb, Verb::User | Verb::Pass | Verb::Quit) {
        return Err(AuthError::NotLoggedIn.into());
    }

    if let Verb::Unknown(token) = verb {
        return Err(SessionError::UnknownCommand(token.clone()).into());
    }

    check_state(session, verb)?;
    let arg = check_argument(command)?;

    if verb.is_data_transfer() && !session.has_endpoint() {
        return Err(SessionError::NoDataEndpoint.into());
    }

    if let Some(access) = required_access(session, verb) {
        if !session.allows(access) {
            warn!(
                "{} denied {} for user {}",
                session.peer(),
                verb,
                session.username().unwrap_or("-")
            );
            return Err(StorageError::PermissionDenied(verb.to_string()).into());
        }
    }

    match verb {
        Verb::User => handle_cmd_user(session, arg),
        Verb::Pass => handle_cmd_pass(session, arg, ctx),
        Verb::Quit => handle_cmd_quit(session),
        Verb::Pwd => Ok(reply(
            codes::PATH_CREATED,
            format!("{} is the current directory", quote_path(session.cwd())),
        )),
        Verb::Cwd => handle_cmd_cwd(session, arg, ctx).await,
        Verb::Cdup => handle_cmd_cdup(session, ctx).await,
        Verb::List => handle_cmd_list(session, arg, ctx).await,
        Verb::Retr => handle_cmd_retr(session, arg, ctx).await,
        Verb::Stor => handle_cmd_stor(session, arg, ctx).await,
        Verb::Dele => handle_cmd_dele(session, arg, ctx).await,
        Verb::Mkd => handle_cmd_mkd(session, arg, ctx).await,
        Verb::Rmd => handle_cmd_rmd(session, arg, ctx).await,
        Verb::Pasv => handle_cmd_pasv(session, ctx).await,
        Verb::Port => handle_cmd_port(session, arg),
        Verb::Type => handle_cmd_type(session, arg),
        Verb::Rest => handle_cmd_rest(session, arg),
        Verb::Abor => Ok(Dispatch::Abort),
        Verb::Noop => Ok(reply(codes::OK, "NOOP ok")),
        Verb::Syst => Ok(reply(codes::SYSTEM_TYPE, "UNIX Type: L8")),
        Verb::Unknown(token) => Err(SessionError::UnknownCommand(token.clone()).into()),
    }
}

fn reply(code: u16, text: impl Into<String>) -> Dispatch {
    Dispatch::Reply(Reply::new(code, text))
}

/// 503 checks that depend on where the session is
fn check_state(session: &Session, verb: &Verb) -> Result<(), SessionError> {
    match verb {
        Verb::User if session.is_logged_in() => Err(SessionError::BadSequence("already logged in")),
        Verb::Pass if session.is_logged_in() => Err(SessionError::BadSequence("already logged in")),
        Verb::Pass if session.username().is_none() => {
            Err(SessionError::BadSequence("send USER first"))
        }
        Verb::Pasv | Verb::Port | Verb::List | Verb::Retr | Verb::Stor | Verb::Rest | Verb::Type
            if session.is_transferring() =>
        {
            Err(SessionError::TransferInProgress)
        }
        _ => Ok(()),
    }
}

/// The argument, when the verb needs one
fn check_argument(command: &Command) -> Result<&str, SessionError> {
    let required = matches!(
        command.verb,
        Verb::User
            | Verb::Pass
            | Verb::Cwd
            | Verb::Retr
            | Verb::Stor
            | Verb::Dele
            | Verb::Mkd
            | Verb::Rmd
            | Verb::Port
            | Verb::Type
            | Verb::Rest
    );

    match command.argument() {
        Some(arg) => Ok(arg),
        None if required => Err(SessionError::MissingArgument(static_verb(&command.verb))),
        None => Ok(""),
    }
}

fn static_verb(verb: &Verb) -> &'static str {
    match verb {
        Verb::User => "USER",
        Verb::Pass => "PASS",
        Verb::Cwd => "CWD",
        Verb::Retr => "RETR",
        Verb::Stor => "STOR",
        Verb::Dele => "DELE",
        Verb::Mkd => "MKD",
        Verb::Rmd => "RMD",
        Verb::Port => "PORT",
        Verb::Type => "TYPE",
        Verb::Rest => "REST",
        _ => "command",
    }
}

fn required_access(session: &Session, verb: &Verb) -> Option<Access> {
    match verb {
        Verb::Cwd | Verb::Cdup => Some(Access::ChangeDir),
        Verb::List => Some(Access::List),
        Verb::Retr => Some(Access::Read),
        Verb::Stor if session.restart_offset().is_some_and(|o| o > 0) => Some(Access::Append),
        Verb::Stor => Some(Access::Write),
        Verb::Dele | Verb::Rmd => Some(Access::Delete),
        Verb::Mkd => Some(Access::MakeDir),
        _ => None,
    }
}

/// RFC 959 quoting for 257 replies: embedded quotes are doubled
fn quote_path(path: &str) -> String {
    format!("\"{}\"", path.replace('"', "\"\""))
}

// --------------------
// Authentication
// --------------------

/// USER always asks for a password, so account names cannot be enumerated.
fn handle_cmd_user(session: &mut Session, username: &str) -> Result<Dispatch, FtpError> {
    auth::validate_user(username)?;
    session.set_pending_user(username.to_string());
    Ok(reply(codes::PASSWORD_REQUIRED, "User name okay, need password"))
}

fn handle_cmd_pass(
    session: &mut Session,
    password: &str,
    ctx: &ServerContext,
) -> Result<Dispatch, FtpError> {
    let username = session.username().unwrap_or_default().to_string();

    match auth::validate_password(&username, password, &ctx.credentials) {
        Ok(permissions) => {
            session.log_in(permissions);
            info!("User {username} logged in from {}", session.peer());
            Ok(reply(codes::LOGIN_SUCCESS, "Login successful"))
        }
        Err(err) => {
            let attempts = session.record_failed_login();
            warn!(
                "Failed login for {username} from {} ({attempts}/{})",
                session.peer(),
                ctx.config.max_login_attempts
            );
            if attempts >= ctx.config.max_login_attempts {
                return Err(AuthError::TooManyAttempts.into());
            }
            Err(err.into())
        }
    }
}

fn handle_cmd_quit(session: &mut Session) -> Result<Dispatch, FtpError> {
    session.close();
    Ok(Dispatch::Close(Reply::new(codes::CLOSING, "Goodbye")))
}

// --------------------
// Navigation and file management
// --------------------

async fn handle_cmd_cwd(
    session: &mut Session,
    path: &str,
    ctx: &ServerContext,
) -> Result<Dispatch, FtpError> {
    let new_cwd = navigate::change_directory(&ctx.fs, session.cwd(), path).await?;
    session.set_cwd(new_cwd);
    Ok(reply(codes::FILE_ACTION_OK, "Directory successfully changed"))
}

async fn handle_cmd_cdup(session: &mut Session, ctx: &ServerContext) -> Result<Dispatch, FtpError> {
    let new_cwd = navigate::change_to_parent(&ctx.fs, session.cwd()).await?;
    session.set_cwd(new_cwd);
    Ok(reply(codes::FILE_ACTION_OK, "Directory successfully changed"))
}

async fn handle_cmd_dele(
    session: &mut Session,
    path: &str,
    ctx: &ServerContext,
) -> Result<Dispatch, FtpError> {
    let resolved = ctx.fs.resolve(session.cwd(), path).await?;
    ctx.fs.remove(&resolved).await?;
    Ok(reply(codes::FILE_ACTION_OK, "File deleted"))
}

async fn handle_cmd_mkd(
    session: &mut Session,
    path: &str,
    ctx: &ServerContext,
) -> Result<Dispatch, FtpError> {
    let resolved = ctx.fs.resolve(session.cwd(), path).await?;
    ctx.fs.make_dir(&resolved).await?;
    Ok(reply(
        codes::PATH_CREATED,
        format!("{} created", quote_path(resolved.virtual_path())),
    ))
}

async fn handle_cmd_rmd(
    session: &mut Session,
    path: &str,
    ctx: &ServerContext,
) -> Result<Dispatch, FtpError> {
    let resolved = ctx.fs.resolve(session.cwd(), path).await?;
    ctx.fs.remove_dir(&resolved).await?;
    Ok(reply(codes::FILE_ACTION_OK, "Directory removed"))
}

// --------------------
// Data transfers
// --------------------

/// Clients often send `LIST -la [path]`; the flags are ignored.
fn strip_list_flags(arg: &str) -> &str {
    let mut rest = arg.trim_start();
    while rest.starts_with('-') {
        rest = match rest.split_once(' ') {
            Some((_, tail)) => tail.trim_start(),
            None => "",
        };
    }
    rest
}

async fn handle_cmd_list(
    session: &mut Session,
    arg: &str,
    ctx: &ServerContext,
) -> Result<Dispatch, FtpError> {
    let target = match strip_list_flags(arg) {
        "" => ".",
        path => path,
    };
    let resolved = ctx.fs.resolve(session.cwd(), target).await?;
    let listing = format_listing(&ctx.fs.list(&resolved).await?);

    start_transfer(
        session,
        resolved.virtual_path().to_string(),
        0,
        JobIo::Listing(listing),
        Reply::new(codes::FILE_STATUS_OK, "Here comes the directory listing"),
    )
}

async fn handle_cmd_retr(
    session: &mut Session,
    path: &str,
    ctx: &ServerContext,
) -> Result<Dispatch, FtpError> {
    let resolved = ctx.fs.resolve(session.cwd(), path).await?;
    let offset = session.restart_offset().unwrap_or(0);
    let file = ctx.fs.open_read(&resolved, offset).await?;
    session.take_restart_offset();

    let preliminary = Reply::new(
        codes::FILE_STATUS_OK,
        format!("Opening {} mode data connection", session.transfer_type()),
    );
    start_transfer(
        session,
        resolved.virtual_path().to_string(),
        offset,
        JobIo::Download(file),
        preliminary,
    )
}

async fn handle_cmd_stor(
    session: &mut Session,
    path: &str,
    ctx: &ServerContext,
) -> Result<Dispatch, FtpError> {
    let resolved = ctx.fs.resolve(session.cwd(), path).await?;
    let offset = session.restart_offset();
    let upload = ctx.fs.begin_upload(&resolved, offset).await?;
    session.take_restart_offset();

    let preliminary = Reply::new(
        codes::FILE_STATUS_OK,
        format!("Ok to send data in {} mode", session.transfer_type()),
    );
    start_transfer(
        session,
        resolved.virtual_path().to_string(),
        offset.unwrap_or(0),
        JobIo::Upload(upload),
        preliminary,
    )
}

fn start_transfer(
    session: &mut Session,
    path: String,
    offset: u64,
    io: JobIo,
    preliminary: Reply,
) -> Result<Dispatch, FtpError> {
    let endpoint = session.take_endpoint().ok_or(SessionError::NoDataEndpoint)?;
    let job = DataTransferJob::new(path, offset, session.transfer_type(), endpoint, io);
    Ok(Dispatch::Transfer { preliminary, job })
}

async fn handle_cmd_pasv(session: &mut Session, ctx: &ServerContext) -> Result<Dispatch, FtpError> {
    let (endpoint, advertised) = open_passive(
        &ctx.ports,
        session.local().ip(),
        ctx.config.passive_ip(),
        session.peer().ip(),
    )
    .await?;

    if session.replace_endpoint(endpoint).is_some() {
        debug!("{} replaced its pending data endpoint", session.peer());
    }

    Ok(reply(
        codes::ENTERING_PASSIVE,
        format!("Entering Passive Mode ({})", format_host_port(advertised)),
    ))
}

fn handle_cmd_port(session: &mut Session, arg: &str) -> Result<Dispatch, FtpError> {
    let endpoint = open_active(arg, session.peer().ip())?;
    if session.replace_endpoint(endpoint).is_some() {
        debug!("{} replaced its pending data endpoint", session.peer());
    }
    Ok(reply(codes::OK, "PORT command successful"))
}

fn handle_cmd_type(session: &mut Session, arg: &str) -> Result<Dispatch, FtpError> {
    let transfer_type = TransferType::parse(arg)?;
    session.set_transfer_type(transfer_type);
    Ok(reply(codes::OK, format!("Type set to {}", transfer_type.code())))
}

fn handle_cmd_rest(session: &mut Session, arg: &str) -> Result<Dispatch, FtpError> {
    let offset: u64 = arg
        .trim()
        .parse()
        .map_err(|_| SessionError::InvalidArgument(arg.to_string()))?;
    session.set_restart_offset(offset);
    Ok(reply(
        codes::PENDING_FURTHER_INFO,
        format!("Restarting at {offset}. Send STOR or RETR"),
    ))
}
