//! Shared server context
//!
//! Everything sessions share, built once at startup and read-only afterwards.

use crate::auth::CredentialStore;
use crate::config::ServerConfig;
use crate::error::StorageError;
use crate::storage::Filesystem;
use crate::transfer::{PassivePorts, TransferSettings};

#[derive(Debug)]
pub struct ServerContext {
    pub config: ServerConfig,
    pub fs: Filesystem,
    pub credentials: CredentialStore,
    pub ports: PassivePorts,
}

impl ServerContext {
    /// The root directory must already exist.
    pub fn new(config: ServerConfig) -> Result<Self, StorageError> {
        let fs = Filesystem::new(config.server_root_path())?;
        let credentials = CredentialStore::from_config(&config.users);
        let ports = PassivePorts::new(config.data_port_range());

        Ok(Self {
            config,
            fs,
            credentials,
            ports,
        })
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            buffer_size: self.config.buffer_size,
            idle_timeout: self.config.data_idle_timeout(),
            connect_timeout: self.config.data_connect_timeout(),
            max_upload_bytes: self.config.max_upload_bytes(),
            ascii_conversion: self.config.ascii_conversion,
        }
    }
}
