//! Module `data_channel`
//!
//! Pending data endpoints set up by PASV and PORT, and the one-shot
//! connection each of them yields for a single transfer.

use log::{debug, info, warn};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, timeout, timeout_at};

use crate::error::TransferError;
use crate::transfer::ports::PassivePorts;

/// Where the next data connection comes from
#[derive(Debug)]
pub enum DataEndpoint {
    /// PASV: a listener waiting for exactly one connection from `peer`
    Passive { listener: TcpListener, peer: IpAddr },
    /// PORT: the server dials `addr` once
    Active { addr: SocketAddr },
}

impl DataEndpoint {
    /// Establish the data connection, consuming the endpoint.
    ///
    /// For passive endpoints the listener is dropped (and its port released)
    /// as soon as the first connection from the control peer is accepted or
    /// the wait times out.
    pub async fn connect(self, connect_timeout: Duration) -> Result<TcpStream, TransferError> {
        match self {
            DataEndpoint::Passive { listener, peer } => {
                let deadline = Instant::now() + connect_timeout;
                loop {
                    let (stream, from) = timeout_at(deadline, listener.accept())
                        .await
                        .map_err(|_| TransferError::ConnectTimeout)?
                        .map_err(TransferError::ConnectionReset)?;

                    if from.ip().to_canonical() == peer.to_canonical() {
                        debug!("Passive data connection accepted from {from}");
                        return Ok(stream);
                    }
                    warn!("Rejected data connection from {from}, expected {peer}");
                }
            }
            DataEndpoint::Active { addr } => {
                let stream = timeout(connect_timeout, TcpStream::connect(addr))
                    .await
                    .map_err(|_| TransferError::ConnectTimeout)?
                    .map_err(|e| TransferError::ConnectFailed(addr, e))?;
                debug!("Active data connection established to {addr}");
                Ok(stream)
            }
        }
    }
}

/// Bind a passive listener on `local_ip` and return it with the IPv4
/// address to advertise in the 227 reply.
pub async fn open_passive(
    ports: &PassivePorts,
    local_ip: IpAddr,
    advertised_ip: Option<IpAddr>,
    peer: IpAddr,
) -> Result<(DataEndpoint, SocketAddrV4), TransferError> {
    let advertised = match advertised_ip.unwrap_or(local_ip).to_canonical() {
        IpAddr::V4(ip) => ip,
        IpAddr::V6(_) => return Err(TransferError::PassiveUnsupported),
    };

    let listener = ports.bind(local_ip).await?;
    let port = listener
        .local_addr()
        .map_err(|_| TransferError::ListenerExhausted)?
        .port();

    info!("Passive listener on port {port} for {peer}");
    Ok((
        DataEndpoint::Passive { listener, peer },
        SocketAddrV4::new(advertised, port),
    ))
}

/// Validate a PORT argument against the control peer and build the endpoint
pub fn open_active(arg: &str, peer: IpAddr) -> Result<DataEndpoint, TransferError> {
    let addr = parse_port_argument(arg)?;

    if IpAddr::V4(*addr.ip()) != peer.to_canonical() {
        return Err(TransferError::IpMismatch {
            expected: peer.to_string(),
            provided: addr.ip().to_string(),
        });
    }

    if addr.port() < 1024 {
        return Err(TransferError::InvalidPortRange(addr.port()));
    }

    info!("Active data endpoint {addr} for {peer}");
    Ok(DataEndpoint::Active {
        addr: SocketAddr::V4(addr),
    })
}

/// Parse `h1,h2,h3,h4,p1,p2`
pub fn parse_port_argument(arg: &str) -> Result<SocketAddrV4, TransferError> {
    let fields = arg
        .split(',')
        .map(|f| f.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| TransferError::InvalidPortCommand(arg.to_string()))?;

    let [h1, h2, h3, h4, p1, p2] = fields[..] else {
        return Err(TransferError::InvalidPortCommand(arg.to_string()));
    };

    Ok(SocketAddrV4::new(
        Ipv4Addr::new(h1, h2, h3, h4),
        (u16::from(p1) << 8) | u16::from(p2),
    ))
}

/// Encode an address the way PASV replies and PORT arguments carry it
pub fn format_host_port(addr: SocketAddrV4) -> String {
    let [h1, h2, h3, h4] = addr.ip().octets();
    let port = addr.port();
    format!("{h1},{h2},{h3},{h4},{},{}", port >> 8, port & 0xff)
}

/// Pull the `(h1,h2,h3,h4,p1,p2)` group out of a 227 reply text
pub fn parse_passive_reply(text: &str) -> Option<SocketAddrV4> {
    let start = text.find('(')?;
    let end = start + text[start..].find(')')?;
    parse_port_argument(&text[start + 1..end]).ok()
}
