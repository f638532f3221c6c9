//! FTP client engine
//!
//! Drives one control connection: sends commands, reads (multi-line)
//! replies, and opens a passive or active data connection per transfer.

use log::{debug, info};
use std::io;
use std::net::{IpAddr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::time::timeout;

use crate::client::listing::{ListEntry, parse_listing};
use crate::error::ClientError;
use crate::protocol::codec::{ReplyReader, ReplyWriter};
use crate::protocol::commands::{Command, Verb};
use crate::protocol::responses::{self as codes, Reply};
use crate::transfer::{TransferMode, TransferType, format_host_port, parse_passive_reply};

/// Longest reply line accepted from a server
const MAX_REPLY_LINE: usize = 8192;

/// Default wait for the data connection
const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connected,
    LoggedIn,
    Closed,
}

/// Data connection prepared before the transfer command is sent
enum PendingData {
    Passive(TcpStream),
    Active(TcpListener),
}

pub struct FtpClient {
    replies: ReplyReader<OwnedReadHalf>,
    commands: ReplyWriter<OwnedWriteHalf>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    greeting: Reply,
    mode: TransferMode,
    state: ClientState,
    data_timeout: Duration,
}

impl FtpClient {
    /// Open the control connection and read the 220 greeting
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let mut replies = ReplyReader::new(read_half, MAX_REPLY_LINE);
        let greeting = expect(replies.next_reply().await?, &[codes::READY])?;
        info!("Connected to {peer_addr}: {}", greeting.text());

        Ok(Self {
            replies,
            commands: ReplyWriter::new(write_half),
            local_addr,
            peer_addr,
            greeting,
            mode: TransferMode::default(),
            state: ClientState::Connected,
            data_timeout: DEFAULT_DATA_TIMEOUT,
        })
    }

    pub fn greeting(&self) -> &Reply {
        &self.greeting
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn set_mode(&mut self, mode: TransferMode) {
        self.mode = mode;
    }

    pub fn set_data_timeout(&mut self, data_timeout: Duration) {
        self.data_timeout = data_timeout;
    }

    /// Send one command and read its reply, whatever the code
    pub async fn command(&mut self, verb: Verb, arg: &str) -> Result<Reply, ClientError> {
        if self.state == ClientState::Closed {
            return Err(ClientError::NotConnected);
        }
        let command = Command::new(verb, arg);
        debug!("> {command}");
        self.commands.send_command(&command).await?;
        let reply = self.replies.next_reply().await?;
        debug!("< {reply}");
        Ok(reply)
    }

    async fn expect_command(
        &mut self,
        verb: Verb,
        arg: &str,
        accepted: &[u16],
    ) -> Result<Reply, ClientError> {
        let reply = self.command(verb, arg).await?;
        expect(reply, accepted)
    }

    // --------------------
    // Session
    // --------------------

    pub async fn login(&mut self, user: &str, password: &str) -> Result<(), ClientError> {
        let reply = self
            .expect_command(Verb::User, user, &[codes::LOGIN_SUCCESS, codes::PASSWORD_REQUIRED])
            .await?;
        if reply.code() == codes::PASSWORD_REQUIRED {
            self.expect_command(Verb::Pass, password, &[codes::LOGIN_SUCCESS])
                .await?;
        }
        self.state = ClientState::LoggedIn;
        info!("Logged in as {user}");
        Ok(())
    }

    pub async fn quit(&mut self) -> Result<(), ClientError> {
        let result = self.expect_command(Verb::Quit, "", &[codes::CLOSING]).await;
        self.state = ClientState::Closed;
        let _ = self.commands.shutdown().await;
        result.map(|_| ())
    }

    pub async fn noop(&mut self) -> Result<(), ClientError> {
        self.expect_command(Verb::Noop, "", &[codes::OK]).await.map(|_| ())
    }

    pub async fn set_type(&mut self, transfer_type: TransferType) -> Result<(), ClientError> {
        self.expect_command(Verb::Type, transfer_type.code(), &[codes::OK])
            .await
            .map(|_| ())
    }

    // --------------------
    // Navigation and file management
    // --------------------

    pub async fn pwd(&mut self) -> Result<String, ClientError> {
        let reply = self.expect_command(Verb::Pwd, "", &[codes::PATH_CREATED]).await?;
        parse_quoted_path(reply.text()).ok_or_else(|| unexpected(&reply))
    }

    pub async fn cwd(&mut self, path: &str) -> Result<(), ClientError> {
        self.expect_command(Verb::Cwd, path, &[codes::FILE_ACTION_OK])
            .await
            .map(|_| ())
    }

    pub async fn cdup(&mut self) -> Result<(), ClientError> {
        self.expect_command(Verb::Cdup, "", &[codes::OK, codes::FILE_ACTION_OK])
            .await
            .map(|_| ())
    }

    pub async fn delete(&mut self, path: &str) -> Result<(), ClientError> {
        self.expect_command(Verb::Dele, path, &[codes::FILE_ACTION_OK])
            .await
            .map(|_| ())
    }

    /// Returns the created directory's path as reported by the server
    pub async fn make_dir(&mut self, path: &str) -> Result<String, ClientError> {
        let reply = self.expect_command(Verb::Mkd, path, &[codes::PATH_CREATED]).await?;
        Ok(parse_quoted_path(reply.text()).unwrap_or_else(|| path.to_string()))
    }

    pub async fn remove_dir(&mut self, path: &str) -> Result<(), ClientError> {
        self.expect_command(Verb::Rmd, path, &[codes::FILE_ACTION_OK])
            .await
            .map(|_| ())
    }

    // --------------------
    // Transfers
    // --------------------

    /// Raw LIST lines
    pub async fn list(&mut self, path: Option<&str>) -> Result<Vec<String>, ClientError> {
        let mut data = self.begin_transfer(Verb::List, path.unwrap_or_default()).await?;
        let mut buf = Vec::new();
        let copied = data.read_to_end(&mut buf).await;
        drop(data);
        self.complete(copied).await?;

        Ok(String::from_utf8_lossy(&buf)
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    pub async fn list_entries(
        &mut self,
        path: Option<&str>,
    ) -> Result<Vec<ListEntry>, ClientError> {
        let lines = self.list(path).await?;
        Ok(parse_listing(&lines.join("\n")))
    }

    pub async fn retrieve(&mut self, path: &str) -> Result<Vec<u8>, ClientError> {
        let mut buf = Vec::new();
        self.retrieve_into(path, &mut buf).await?;
        Ok(buf)
    }

    pub async fn retrieve_into<W>(
        &mut self,
        path: &str,
        writer: &mut W,
    ) -> Result<u64, ClientError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut data = self.begin_transfer(Verb::Retr, path).await?;
        let copied = async {
            let bytes = tokio::io::copy(&mut data, writer).await?;
            writer.flush().await?;
            Ok::<_, io::Error>(bytes)
        }
        .await;
        drop(data);
        self.complete(copied).await
    }

    pub async fn store<R>(&mut self, path: &str, reader: &mut R) -> Result<u64, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        let mut data = self.begin_transfer(Verb::Stor, path).await?;
        let copied = async {
            let bytes = tokio::io::copy(reader, &mut data).await?;
            data.shutdown().await?;
            Ok::<_, io::Error>(bytes)
        }
        .await;
        drop(data);
        self.complete(copied).await
    }

    /// Set up the data connection, send the transfer command and wait for 150
    async fn begin_transfer(&mut self, verb: Verb, arg: &str) -> Result<TcpStream, ClientError> {
        let pending = self.prepare_data().await?;
        let reply = self.command(verb, arg).await?;
        if !reply.is_preliminary() {
            return Err(unexpected(&reply));
        }

        match pending {
            PendingData::Passive(stream) => Ok(stream),
            PendingData::Active(listener) => {
                let accepted = timeout(self.data_timeout, listener.accept())
                    .await
                    .unwrap_or_else(|_| {
                        let reason = "no data connection from server";
                        Err(io::Error::new(io::ErrorKind::TimedOut, reason))
                    });
                match accepted {
                    Ok((stream, from)) => {
                        debug!("Data connection from {from}");
                        Ok(stream)
                    }
                    // The server has already answered 150 and will send a final reply
                    Err(e) => self.complete(Err(e)).await,
                }
            }
        }
    }

    /// Read the final reply of a transfer whatever happened on the data side,
    /// so the control connection stays in step. The server's reply code takes
    /// precedence over a local I/O error.
    async fn complete<T>(&mut self, copied: io::Result<T>) -> Result<T, ClientError> {
        let finished = self.finish_transfer().await;
        match (copied, finished) {
            (Ok(value), Ok(())) => Ok(value),
            (_, Err(e @ ClientError::UnexpectedReply { .. })) => Err(e),
            (Err(e), _) => {
                debug!("Data connection failed: {e}");
                Err(e.into())
            }
            (Ok(_), Err(e)) => Err(e),
        }
    }

    async fn finish_transfer(&mut self) -> Result<(), ClientError> {
        let reply = self.replies.next_reply().await?;
        debug!("< {reply}");
        if reply.is_completion() {
            Ok(())
        } else {
            Err(unexpected(&reply))
        }
    }

    async fn prepare_data(&mut self) -> Result<PendingData, ClientError> {
        match self.mode {
            TransferMode::Passive => {
                let reply = self
                    .expect_command(Verb::Pasv, "", &[codes::ENTERING_PASSIVE])
                    .await?;
                let advertised = parse_passive_reply(reply.text())
                    .ok_or_else(|| ClientError::BadPassiveReply(reply.text().to_string()))?;

                // Servers behind NAT sometimes advertise an unroutable address
                let ip = if advertised.ip().is_unspecified() {
                    self.peer_addr.ip()
                } else {
                    IpAddr::V4(*advertised.ip())
                };
                let addr = SocketAddr::new(ip, advertised.port());
                let stream = timeout(self.data_timeout, TcpStream::connect(addr))
                    .await
                    .map_err(|_| {
                        io::Error::new(io::ErrorKind::TimedOut, "data connection timed out")
                    })??;
                Ok(PendingData::Passive(stream))
            }
            TransferMode::Active => {
                let IpAddr::V4(local_ip) = self.local_addr.ip().to_canonical() else {
                    return Err(ClientError::NotConnected);
                };
                let listener = TcpListener::bind((local_ip, 0)).await?;
                let port = listener.local_addr()?.port();
                let arg = format_host_port(SocketAddrV4::new(local_ip, port));
                self.expect_command(Verb::Port, &arg, &[codes::OK]).await?;
                Ok(PendingData::Active(listener))
            }
        }
    }
}

fn unexpected(reply: &Reply) -> ClientError {
    ClientError::UnexpectedReply {
        code: reply.code(),
        text: reply.text().to_string(),
    }
}

fn expect(reply: Reply, accepted: &[u16]) -> Result<Reply, ClientError> {
    if accepted.contains(&reply.code()) {
        Ok(reply)
    } else {
        Err(unexpected(&reply))
    }
}

/// Extract `"path"` from a 257 reply, undoing doubled quotes
fn parse_quoted_path(text: &str) -> Option<String> {
    let rest = text.strip_prefix('"')?;
    let mut path = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                path.push('"');
            } else {
                return Some(path);
            }
        } else {
            path.push(c);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted_path() {
        assert_eq!(
            parse_quoted_path("\"/docs\" is the current directory").as_deref(),
            Some("/docs")
        );
        assert_eq!(parse_quoted_path("\"/a \"\"b\"\"\" created").as_deref(), Some("/a \"b\""));
        assert_eq!(parse_quoted_path("no quotes"), None);
    }

    #[test]
    fn test_expect() {
        assert!(expect(Reply::new(230, "ok"), &[230]).is_ok());
        assert!(matches!(
            expect(Reply::new(530, "Login incorrect"), &[230]),
            Err(ClientError::UnexpectedReply { code: 530, .. })
        ));
    }
}
