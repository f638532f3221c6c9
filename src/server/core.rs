use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::error::FtpError;
use crate::middleware::logging::{log_connection, log_refusal};
use crate::middleware::{ConnectionLimiter, Refusal};
use crate::protocol::responses::{self as codes, Reply};
use crate::server::context::ServerContext;
use crate::session::{Session, handle_client};

pub struct Server {
    listener: TcpListener,
    limiter: ConnectionLimiter,
    context: Arc<ServerContext>,
}

impl Server {
    /// Create the root directory if needed and bind the control socket.
    pub async fn bind(config: ServerConfig) -> Result<Self, FtpError> {
        if let Err(e) = std::fs::create_dir_all(config.server_root_path()) {
            warn!("Failed to create server root directory: {e}");
        }
        let context = ServerContext::new(config)?;
        info!("Server root directory: {}", context.fs.root().display());
        if context.credentials.is_empty() {
            warn!("No user accounts configured, every login will fail");
        } else {
            info!("Loaded {} user accounts", context.credentials.len());
        }

        let address = context.config.control_socket();
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind to {address}: {e}");
                return Err(e.into());
            }
        };
        info!("Server bound to {}", listener.local_addr()?);

        let limiter = ConnectionLimiter::new(
            context.config.max_connections,
            context.config.max_connections_per_ip,
        );

        Ok(Self {
            listener,
            limiter,
            context: Arc::new(context),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) {
        info!(
            "Starting FTP server on {} (max {} clients, {} per address)",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| self.context.config.control_socket()),
            self.context.config.max_connections,
            self.context.config.max_connections_per_ip
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) => error!("Error accepting connection: {e}"),
            }
        }
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        match self.limiter.try_acquire(peer.ip()) {
            Ok(guard) => {
                log_connection(peer, self.limiter.active());
                let context = Arc::clone(&self.context);

                // Spawn a task for each client so accept loop doesn't block
                tokio::spawn(async move {
                    let _guard = guard;
                    if let Err(e) = handle_new_client(stream, peer, context).await {
                        warn!("Failed to handle client {peer}: {e}");
                    }
                });
            }
            Err(reason) => {
                log_refusal(peer, reason);
                tokio::spawn(refuse(stream, reason));
            }
        }
    }
}

/// Greet the client and hand the connection to the session loop
async fn handle_new_client(
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<ServerContext>,
) -> io::Result<()> {
    let local = stream.local_addr()?;
    let (read_half, mut write_half) = stream.into_split();

    let greeting = Reply::multiline(
        codes::READY,
        context
            .config
            .banner
            .lines()
            .chain(std::iter::once("Service ready")),
    );
    write_half.write_all(&greeting.encode()).await?;
    write_half.flush().await?;

    handle_client(read_half, write_half, Session::new(peer, local), context).await;
    Ok(())
}

/// Refused connections get a 421 and are closed straight away
async fn refuse(mut stream: TcpStream, reason: Refusal) {
    let text = match reason {
        Refusal::ServerFull => "Too many connections, try again later",
        Refusal::TooManyFromAddress => "Too many connections from your address",
    };
    let reply = Reply::new(codes::SERVICE_NOT_AVAILABLE, text);
    if let Err(e) = stream.write_all(&reply.encode()).await {
        debug!("Failed to send refusal: {e}");
    }
    let _ = stream.shutdown().await;
}
