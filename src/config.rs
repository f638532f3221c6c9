//! Configuration management for the FTP engine
//!
//! Settings are loaded once at startup from a TOML file layered with
//! `FTP_ENGINE__*` environment overrides, validated, and then shared
//! read-only with every session for the lifetime of the process.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default configuration file name, resolved against the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Prefix for environment overrides, e.g. `FTP_ENGINE__CONTROL_PORT=2121`
const ENV_PREFIX: &str = "FTP_ENGINE";

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    // ═══ NETWORK ═══
    /// IP address to bind the FTP control connection
    pub bind_address: String,

    /// Port for the FTP control connection
    pub control_port: u16,

    /// Address advertised in PASV replies; defaults to the control connection's local IP
    pub passive_address: Option<String>,

    /// Port range for PASV data listeners. `0..0` lets the OS pick.
    pub data_port_min: u16,
    pub data_port_max: u16,

    // ═══ STORAGE ═══
    /// Root directory every session is confined to
    pub server_root: String,

    // ═══ ADMISSION ═══
    /// Maximum concurrent control connections
    pub max_connections: usize,

    /// Maximum concurrent control connections from one source address
    pub max_connections_per_ip: usize,

    // ═══ TIMEOUTS ═══
    /// Idle control connection timeout, applied while no transfer is running
    pub control_idle_timeout_secs: u64,

    /// Idle timeout on a data connection once established
    pub data_idle_timeout_secs: u64,

    /// How long to wait for a data connection to be established
    pub data_connect_timeout_secs: u64,

    // ═══ PROTOCOL LIMITS ═══
    /// Maximum FTP command line length in bytes, terminator included
    pub max_command_length: usize,

    /// Failed PASS attempts tolerated before the session is closed
    pub max_login_attempts: u32,

    /// Buffer size for file transfers
    pub buffer_size: usize,

    /// Maximum upload size in MB
    pub max_upload_mb: u64,

    /// Convert line endings for TYPE A transfers
    pub ascii_conversion: bool,

    /// Greeting sent on connect; each line becomes a line of the 220 reply
    pub banner: String,

    // ═══ ACCOUNTS ═══
    /// Static credential set, keyed by username
    pub users: HashMap<String, UserConfig>,
}

/// A configured account
#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub password: String,

    /// Permission letters, see [`crate::auth::Permissions`]
    #[serde(default = "default_perms")]
    pub perms: String,
}

fn default_perms() -> String {
    "elr".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut users = HashMap::new();
        users.insert(
            "user".to_string(),
            UserConfig {
                password: "12345".to_string(),
                perms: "elradfmwMT".to_string(),
            },
        );

        Self {
            bind_address: "127.0.0.1".to_string(),
            control_port: 2121,
            passive_address: None,
            data_port_min: 0,
            data_port_max: 0,
            server_root: "./ftp_root".to_string(),
            max_connections: 10,
            max_connections_per_ip: 5,
            control_idle_timeout_secs: 300,
            data_idle_timeout_secs: 30,
            data_connect_timeout_secs: 10,
            max_command_length: 512,
            max_login_attempts: 3,
            buffer_size: 8192,
            max_upload_mb: 100,
            ascii_conversion: false,
            banner: "Simple FTP server for file management".to_string(),
            users,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `path` (or `config.toml`) with environment overrides.
    ///
    /// A missing default file is not an error: the built-in defaults apply.
    /// A missing file that was asked for explicitly is.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let (path, required) = match path {
            Some(p) => (p, true),
            None => (DEFAULT_CONFIG_PATH, false),
        };

        let settings = Config::builder()
            .add_source(File::with_name(path).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(config::ConfigError::Message(format!(
                "bind_address is not an IP address: {}",
                self.bind_address
            )));
        }

        if let Some(addr) = &self.passive_address {
            if addr.parse::<IpAddr>().is_err() {
                return Err(config::ConfigError::Message(format!(
                    "passive_address is not an IP address: {addr}"
                )));
            }
        }

        let any_port = self.data_port_min == 0 && self.data_port_max == 0;
        if !any_port && self.data_port_min >= self.data_port_max {
            return Err(config::ConfigError::Message(
                "data_port_min must be less than data_port_max".into(),
            ));
        }

        if !any_port && self.data_port_min < 1024 {
            return Err(config::ConfigError::Message(
                "data_port_min must be at least 1024".into(),
            ));
        }

        if self.server_root.is_empty() {
            return Err(config::ConfigError::Message(
                "server_root cannot be empty".into(),
            ));
        }

        if self.max_connections == 0 || self.max_connections_per_ip == 0 {
            return Err(config::ConfigError::Message(
                "connection limits must be greater than 0".into(),
            ));
        }

        if self.control_idle_timeout_secs == 0
            || self.data_idle_timeout_secs == 0
            || self.data_connect_timeout_secs == 0
        {
            return Err(config::ConfigError::Message(
                "timeouts must be greater than 0".into(),
            ));
        }

        if self.max_command_length < 16 {
            return Err(config::ConfigError::Message(
                "max_command_length must be at least 16".into(),
            ));
        }

        if self.max_login_attempts == 0 {
            return Err(config::ConfigError::Message(
                "max_login_attempts must be greater than 0".into(),
            ));
        }

        if self.buffer_size == 0 || self.max_upload_mb == 0 {
            return Err(config::ConfigError::Message(
                "buffer_size and max_upload_mb must be greater than 0".into(),
            ));
        }

        for (name, user) in &self.users {
            if name.is_empty() || user.password.is_empty() {
                return Err(config::ConfigError::Message(
                    "users need a non-empty name and password".into(),
                ));
            }
        }

        Ok(())
    }

    /// Get bind address and control port as socket address
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    /// Get data port range for PASV mode, `None` when any port will do
    pub fn data_port_range(&self) -> Option<std::ops::RangeInclusive<u16>> {
        if self.data_port_min == 0 && self.data_port_max == 0 {
            None
        } else {
            Some(self.data_port_min..=self.data_port_max)
        }
    }

    /// Get server root as PathBuf
    pub fn server_root_path(&self) -> PathBuf {
        PathBuf::from(&self.server_root)
    }

    pub fn passive_ip(&self) -> Option<IpAddr> {
        self.passive_address.as_deref().and_then(|a| a.parse().ok())
    }

    pub fn control_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.control_idle_timeout_secs)
    }

    pub fn data_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.data_idle_timeout_secs)
    }

    pub fn data_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.data_connect_timeout_secs)
    }

    /// Get maximum upload size in bytes
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.control_socket(), "127.0.0.1:2121");
        assert!(config.data_port_range().is_none());
        assert_eq!(config.users["user"].perms, "elradfmwMT");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.data_port_min = 3000;
        config.data_port_max = 2000;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.server_root = String::new();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.passive_address = Some("not-an-ip".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = ServerConfig::default();
        config.control_idle_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.data_idle_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.data_connect_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_upload_bytes_saturates() {
        let mut config = ServerConfig::default();
        assert_eq!(config.max_upload_bytes(), 100 * 1024 * 1024);
        config.max_upload_mb = u64::MAX;
        assert_eq!(config.max_upload_bytes(), u64::MAX);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
control_port = 2200
server_root = "/srv/ftp"
data_port_min = 50000
data_port_max = 50100

[users.alice]
password = "secret"
perms = "elr"
"#
        )
        .unwrap();

        let config = ServerConfig::load(path.to_str()).unwrap();
        assert_eq!(config.control_port, 2200);
        assert_eq!(config.server_root, "/srv/ftp");
        assert_eq!(config.data_port_range(), Some(50000..=50100));
        assert_eq!(config.users["alice"].password, "secret");
        // untouched keys keep their defaults
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        assert!(ServerConfig::load(Some("/nonexistent/ftp-engine.toml")).is_err());
    }
}
