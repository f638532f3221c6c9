//! Transfer module
//!
//! Handles the data connection lifecycle: passive listeners and active
//! connects, the byte pumps, and the per-command transfer job.

pub mod data_channel;
pub mod file_ops;
pub mod job;
pub mod modes;
pub mod ports;

// Re-export key types and functions
pub use data_channel::{
    DataEndpoint, format_host_port, open_active, open_passive, parse_passive_reply,
};
pub use job::{DataTransferJob, Direction, JobIo, TransferSettings};
pub use modes::{TransferMode, TransferType};
pub use ports::PassivePorts;
