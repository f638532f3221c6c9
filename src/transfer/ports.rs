//! Passive port allocation
//!
//! Shared by every session. Each bind starts one port further into the
//! configured range so consecutive PASV commands do not fight over the
//! same port.

use log::debug;
use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;

use crate::error::TransferError;

#[derive(Debug)]
pub struct PassivePorts {
    range: Option<RangeInclusive<u16>>,
    next: AtomicUsize,
}

impl PassivePorts {
    /// `None` lets the OS pick an ephemeral port
    pub fn new(range: Option<RangeInclusive<u16>>) -> Self {
        Self {
            range,
            next: AtomicUsize::new(0),
        }
    }

    /// Bind a listener on `ip`, trying every port of the range once
    pub async fn bind(&self, ip: IpAddr) -> Result<TcpListener, TransferError> {
        let Some(range) = &self.range else {
            return TcpListener::bind((ip, 0)).await.map_err(|e| {
                debug!("Failed to bind ephemeral data port on {ip}: {e}");
                TransferError::ListenerExhausted
            });
        };

        let start = *range.start();
        let span = usize::from(range.end() - start) + 1;
        let offset = self.next.fetch_add(1, Ordering::Relaxed) % span;

        for i in 0..span {
            // offset + i < 2 * span, the modulo keeps it inside the range
            let port = start + ((offset + i) % span) as u16;
            match TcpListener::bind((ip, port)).await {
                Ok(listener) => return Ok(listener),
                Err(e) => debug!("Data port {port} unavailable: {e}"),
            }
        }

        Err(TransferError::ListenerExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_ephemeral_bind() {
        let ports = PassivePorts::new(None);
        let listener = ports.bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_range() {
        // Occupy one port, then offer a range containing only that port
        let held = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = held.local_addr().unwrap().port();
        let ports = PassivePorts::new(Some(port..=port));

        let result = ports.bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).await;
        assert!(matches!(result, Err(TransferError::ListenerExhausted)));

        drop(held);
        let listener = ports.bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), port);
    }
}
