//! Control connection loop
//!
//! Reads commands, dispatches them and writes replies. A data transfer runs
//! on its own task; while it runs the loop keeps serving the control
//! connection so ABOR, QUIT and NOOP are answered promptly.

use log::{debug, error, info, warn};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::{JoinError, JoinHandle};

use crate::error::{CodecError, FtpError, TransferError, to_reply};
use crate::middleware::logging::log_disconnect;
use crate::protocol::Command;
use crate::protocol::codec::{CommandReader, ReplyWriter};
use crate::protocol::handlers::{Dispatch, handle_command};
use crate::protocol::responses::{self as codes, Reply};
use crate::server::ServerContext;
use crate::session::state::Session;

type TransferTask = JoinHandle<Result<u64, TransferError>>;

enum Event {
    Command(io::Result<Option<Result<Command, CodecError>>>),
    TransferDone(Result<Result<u64, TransferError>, JoinError>),
    IdleTimeout,
}

/// Serve one control connection until QUIT, a fatal error or disconnect.
///
/// The greeting has already been sent by the caller.
pub async fn handle_client<R, W>(
    reader: R,
    writer: W,
    mut session: Session,
    ctx: Arc<ServerContext>,
)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut commands = CommandReader::new(reader, ctx.config.max_command_length);
    let mut replies = ReplyWriter::new(writer);
    let mut transfer: Option<TransferTask> = None;
    let idle = ctx.config.control_idle_timeout();

    let served = serve(&mut session, &mut commands, &mut replies, &mut transfer, &ctx, idle).await;
    if let Err(e) = served {
        debug!("Control connection {} ended: {e}", session.peer());
    }

    if let Some(task) = transfer.take() {
        info!("Aborting transfer of disconnected client {}", session.peer());
        task.abort();
    }
    session.close();
    let _ = replies.shutdown().await;
    log_disconnect(session.peer(), session.username());
}

async fn serve<R, W>(
    session: &mut Session,
    commands: &mut CommandReader<R>,
    replies: &mut ReplyWriter<W>,
    transfer: &mut Option<TransferTask>,
    ctx: &ServerContext,
    idle: std::time::Duration,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let event = tokio::select! {
            result = wait_transfer(transfer), if transfer.is_some() => Event::TransferDone(result),
            command = commands.next_command() => Event::Command(command),
            _ = tokio::time::sleep(idle), if transfer.is_none() => Event::IdleTimeout,
        };

        match event {
            Event::TransferDone(result) => {
                *transfer = None;
                session.end_transfer();
                replies.send(&completion_reply(result)).await?;
            }
            Event::IdleTimeout => {
                warn!("Control connection {} idle for {idle:?}, closing", session.peer());
                replies
                    .send(&Reply::new(
                        codes::SERVICE_NOT_AVAILABLE,
                        "Timeout: closing control connection",
                    ))
                    .await?;
                return Ok(());
            }
            Event::Command(Err(e)) => return Err(e),
            Event::Command(Ok(None)) => {
                debug!("Client {} closed the control connection", session.peer());
                return Ok(());
            }
            Event::Command(Ok(Some(Err(codec_error)))) => {
                debug!("Malformed command from {}: {codec_error}", session.peer());
                replies.send(&to_reply(&FtpError::Codec(codec_error))).await?;
            }
            Event::Command(Ok(Some(Ok(command)))) => {
                match handle_command(session, &command, ctx).await {
                    Dispatch::Reply(reply) => replies.send(&reply).await?,
                    Dispatch::Transfer { preliminary, job } => {
                        replies.send(&preliminary).await?;
                        session.begin_transfer();
                        *transfer = Some(tokio::spawn(job.run(ctx.transfer_settings())));
                    }
                    Dispatch::Abort => match transfer.take() {
                        Some(task) if task.is_finished() => {
                            // Finished before ABOR arrived: report it as usual
                            session.end_transfer();
                            replies.send(&completion_reply(task.await)).await?;
                            replies
                                .send(&Reply::new(codes::ABORT_OK, "ABOR command successful"))
                                .await?;
                        }
                        Some(task) => {
                            task.abort();
                            let _ = task.await;
                            session.end_transfer();
                            info!("Transfer aborted by {}", session.peer());
                            replies
                                .send(&Reply::new(
                                    codes::TRANSFER_ABORTED,
                                    "Connection closed; transfer aborted",
                                ))
                                .await?;
                            replies
                                .send(&Reply::new(
                                    codes::TRANSFER_COMPLETE,
                                    "ABOR command successful",
                                ))
                                .await?;
                        }
                        None => {
                            replies
                                .send(&Reply::new(codes::ABORT_OK, "No transfer to abort"))
                                .await?;
                        }
                    },
                    Dispatch::Close(reply) => {
                        if let Some(task) = transfer.take() {
                            task.abort();
                        }
                        replies.send(&reply).await?;
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn wait_transfer(
    transfer: &mut Option<TransferTask>,
) -> Result<Result<u64, TransferError>, JoinError> {
    match transfer {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

fn completion_reply(result: Result<Result<u64, TransferError>, JoinError>) -> Reply {
    match result {
        Ok(Ok(_)) => Reply::new(codes::TRANSFER_COMPLETE, "Transfer complete"),
        Ok(Err(e)) => {
            warn!("Transfer failed: {e}");
            to_reply(&FtpError::Transfer(e))
        }
        Err(e) => {
            error!("Transfer task failed: {e}");
            Reply::new(
                codes::LOCAL_ERROR,
                "Requested action aborted: local error in processing",
            )
        }
    }
}
