//! Module `file_ops`
//!
//! Byte pumps between files and data connections. Every network read and
//! write is bounded by the data idle timeout; a stalled peer ends the
//! transfer with `TransferTimeout`.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{StorageError, TransferError};

/// Line-ending conversion applied to a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    None,
    /// Outbound ASCII: bare LF becomes CRLF
    ToNetwork,
    /// Inbound ASCII: CRLF becomes LF
    FromNetwork,
}

/// Limits shared by every transfer
#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    pub buffer_size: usize,
    pub idle_timeout: Duration,
}

/// Send everything `source` yields over `stream`, then close the write side.
/// Returns the number of source bytes sent.
pub async fn send_stream<R, S>(
    source: &mut R,
    stream: &mut S,
    options: CopyOptions,
    conversion: Conversion,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
    S: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; options.buffer_size];
    let mut converter = LineConverter::new(conversion);
    let mut converted = Vec::new();
    let mut total = 0u64;

    loop {
        let n = source
            .read(&mut buffer)
            .await
            .map_err(|e| TransferError::Storage(StorageError::Io(e)))?;
        if n == 0 {
            break;
        }
        total += n as u64;

        let chunk = converter.convert(&buffer[..n], &mut converted);
        with_idle_timeout(options.idle_timeout, stream.write_all(chunk)).await?;
    }

    with_idle_timeout(options.idle_timeout, stream.shutdown()).await?;
    Ok(total)
}

/// Read `stream` to EOF into `sink`, refusing more than `limit` bytes.
/// Returns the number of bytes received.
pub async fn receive_stream<S, W>(
    stream: &mut S,
    sink: &mut W,
    limit: u64,
    options: CopyOptions,
    conversion: Conversion,
) -> Result<u64, TransferError>
where
    S: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; options.buffer_size];
    let mut converter = LineConverter::new(conversion);
    let mut converted = Vec::new();
    let mut total = 0u64;

    loop {
        let n = with_idle_timeout(options.idle_timeout, stream.read(&mut buffer)).await?;
        if n == 0 {
            break;
        }

        total += n as u64;
        if total > limit {
            return Err(TransferError::TooLarge(limit));
        }

        let chunk = converter.convert(&buffer[..n], &mut converted);
        write_local(sink, chunk).await?;
    }

    converted.clear();
    if let Some(tail) = converter.finish(&mut converted) {
        write_local(sink, tail).await?;
    }
    sink.flush()
        .await
        .map_err(|e| TransferError::Storage(StorageError::Io(e)))?;
    Ok(total)
}

async fn write_local<W: AsyncWrite + Unpin>(
    sink: &mut W,
    bytes: &[u8],
) -> Result<(), TransferError> {
    sink.write_all(bytes)
        .await
        .map_err(|e| TransferError::Storage(StorageError::Io(e)))
}

async fn with_idle_timeout<T>(
    idle: Duration,
    op: impl Future<Output = std::io::Result<T>>,
) -> Result<T, TransferError> {
    timeout(idle, op)
        .await
        .map_err(|_| TransferError::TransferTimeout)?
        .map_err(TransferError::ConnectionReset)
}

/// Streaming CRLF conversion, carrying state across buffer boundaries
struct LineConverter {
    conversion: Conversion,
    pending_cr: bool,
}

impl LineConverter {
    fn new(conversion: Conversion) -> Self {
        Self {
            conversion,
            pending_cr: false,
        }
    }

    fn convert<'a>(&mut self, input: &'a [u8], out: &'a mut Vec<u8>) -> &'a [u8] {
        out.clear();
        match self.conversion {
            Conversion::None => return input,
            Conversion::ToNetwork => {
                for &b in input {
                    if b == b'\n' && !self.pending_cr {
                        out.push(b'\r');
                    }
                    out.push(b);
                    self.pending_cr = b == b'\r';
                }
            }
            Conversion::FromNetwork => {
                for &b in input {
                    if self.pending_cr {
                        self.pending_cr = false;
                        if b != b'\n' {
                            out.push(b'\r');
                        }
                    }
                    if b == b'\r' {
                        self.pending_cr = true;
                    } else {
                        out.push(b);
                    }
                }
            }
        }
        out
    }

    /// A CR held back at the very end of an inbound stream
    fn finish<'a>(&mut self, out: &'a mut Vec<u8>) -> Option<&'a [u8]> {
        if self.conversion == Conversion::FromNetwork && std::mem::take(&mut self.pending_cr) {
            out.push(b'\r');
            return Some(out.as_slice());
        }
        None
    }
}
