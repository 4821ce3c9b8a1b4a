use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::config::ssh_config::SshConfigHost;
use crate::error::{AppError, Result};
use crate::transfer::DEFAULT_BUFFER_SIZE;

/// Executor settings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Remote filename charset, reapplied on every connect
    pub charset: String,
    /// Transfer chunk size in bytes
    pub buffer_size: usize,
    /// Connect timeout in seconds
    pub connect_timeout: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            charset: "UTF-8".to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout: 20,
        }
    }
}

impl ExecutorSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.charset.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Charset cannot be empty".to_string(),
            ));
        }

        if self.buffer_size == 0 {
            return Err(AppError::ValidationError(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// How to authenticate against the SSH server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    Password(String),
    PublicKey {
        private_key_path: String,
        passphrase: Option<String>,
    },
}

/// Represents an SSH connection configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: None,
            private_key_path: None,
            passphrase: None,
        }
    }
}

impl Connection {
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public key wins over password when both are configured
    pub fn auth_method(&self) -> Result<AuthMethod> {
        if let Some(private_key_path) = &self.private_key_path {
            return Ok(AuthMethod::PublicKey {
                private_key_path: private_key_path.clone(),
                passphrase: self.passphrase.clone(),
            });
        }
        self.password
            .clone()
            .map(AuthMethod::Password)
            .ok_or_else(|| {
                AppError::ValidationError("Either password or private key is required".to_string())
            })
    }

    /// Fill in host, port, user and identity file from an `~/.ssh/config`
    /// entry. Values already set explicitly are kept, except the host which
    /// is replaced by the resolved host name.
    pub fn apply_ssh_config(&mut self, host: SshConfigHost) {
        self.host = host.hostname;
        if let Some(port) = host.port {
            self.port = port;
        }
        if self.username.is_empty()
            && let Some(user) = host.user
        {
            self.username = user;
        }
        if self.private_key_path.is_none() && self.password.is_none() {
            self.private_key_path = host.identity_file;
        }
    }

    /// Validates the connection parameters
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Host cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(AppError::ValidationError(
                "Port must be greater than 0".to_string(),
            ));
        }

        if self.username.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }

        self.auth_method().map(|_| ())
    }
}

/// Main configuration structure
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub executor: ExecutorSettings,
    pub connection: Connection,
}

/// Configuration manager for loading and persisting settings
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Load from the default location
    pub fn new() -> Result<Self> {
        Self::with_path(Self::get_config_path()?)
    }

    /// Create a configuration manager with a custom config path
    pub fn with_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Get the default configuration file path
    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            AppError::ConfigError("Could not determine the config directory".to_string())
        })?;
        Ok(config_dir.join("sftpx").join("config.toml"))
    }

    /// Load configuration from the specified path
    fn load_config_from_path(config_path: &Path) -> Result<Config> {
        if !config_path.exists() {
            // Return default config if file doesn't exist
            return Ok(Config::default());
        }

        let config_content = fs::read_to_string(config_path)
            .map_err(|e| AppError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.executor.validate()?;
        Ok(config)
    }

    /// Persist current config to disk
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.config_path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(|e| {
                AppError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }
        let toml = toml::to_string_pretty(&self.config)
            .map_err(|e| AppError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(&self.config_path, toml)
            .map_err(|e| AppError::ConfigError(format!("Failed to write config: {}", e)))?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }
}
