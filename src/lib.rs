//! ftp-engine
//!
//! A minimal FTP protocol engine: an async server with root-confined storage
//! and admission control, and a client speaking the same wire format.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod navigate;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;
pub mod transfer;

pub use client::FtpClient;
pub use config::ServerConfig;
pub use server::Server;
