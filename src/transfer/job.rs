//! Data transfer jobs
//!
//! A job is everything one LIST, RETR or STOR needs once the control side
//! has accepted it: the pending endpoint, the opened source or sink, and the
//! restart offset. It runs on its own task and reports the bytes moved.

use log::info;
use std::time::Duration;
use tokio::fs::File;

use crate::error::TransferError;
use crate::storage::Upload;
use crate::transfer::data_channel::DataEndpoint;
use crate::transfer::file_ops::{Conversion, CopyOptions, receive_stream, send_stream};
use crate::transfer::modes::TransferType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
    List,
}

/// Local side of a transfer, opened before the 150 reply goes out
#[derive(Debug)]
pub enum JobIo {
    Listing(Vec<u8>),
    Download(File),
    Upload(Upload),
}

/// Per-server transfer limits
#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    pub buffer_size: usize,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_upload_bytes: u64,
    pub ascii_conversion: bool,
}

#[derive(Debug)]
pub struct DataTransferJob {
    pub direction: Direction,
    pub path: String,
    pub offset: u64,
    pub transfer_type: TransferType,
    endpoint: DataEndpoint,
    io: JobIo,
}

impl DataTransferJob {
    pub fn new(
        path: impl Into<String>,
        offset: u64,
        transfer_type: TransferType,
        endpoint: DataEndpoint,
        io: JobIo,
    ) -> Self {
        let direction = match io {
            JobIo::Listing(_) => Direction::List,
            JobIo::Download(_) => Direction::Download,
            JobIo::Upload(_) => Direction::Upload,
        };
        Self {
            direction,
            path: path.into(),
            offset,
            transfer_type,
            endpoint,
            io,
        }
    }

    /// Open the data connection, move the bytes, close it.
    pub async fn run(self, settings: TransferSettings) -> Result<u64, TransferError> {
        let mut stream = self.endpoint.connect(settings.connect_timeout).await?;
        let options = CopyOptions {
            buffer_size: settings.buffer_size,
            idle_timeout: settings.idle_timeout,
        };
        let ascii = settings.ascii_conversion && self.transfer_type == TransferType::Ascii;

        let bytes = match self.io {
            JobIo::Listing(listing) => {
                send_stream(&mut listing.as_slice(), &mut stream, options, Conversion::None).await?
            }
            JobIo::Download(mut file) => {
                let conversion = if ascii { Conversion::ToNetwork } else { Conversion::None };
                send_stream(&mut file, &mut stream, options, conversion).await?
            }
            JobIo::Upload(mut upload) => {
                let conversion = if ascii { Conversion::FromNetwork } else { Conversion::None };
                let received = receive_stream(
                    &mut stream,
                    upload.file_mut(),
                    settings.max_upload_bytes,
                    options,
                    conversion,
                )
                .await?;
                upload.commit().await?;
                received
            }
        };

        info!(
            "{:?} of {} complete: {} bytes ({}, offset {})",
            self.direction, self.path, bytes, self.transfer_type, self.offset
        );
        Ok(bytes)
    }
}
