use std::io::BufReader;
use std::path::Path;

use ssh2_config::{ParseRule, SshConfig};

use crate::error::{AppError, Result};

/// Connection details resolved from an OpenSSH client config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfigHost {
    pub hostname: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub identity_file: Option<String>,
}

/// Resolve `host_pattern` through `~/.ssh/config`
pub fn query_ssh_config(host_pattern: &str) -> Result<SshConfigHost> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| AppError::ConfigError("Could not determine home directory".to_string()))?;
    query_ssh_config_from(&home_dir.join(".ssh").join("config"), host_pattern)
}

/// Resolve `host_pattern` through the OpenSSH config file at `config_path`
pub fn query_ssh_config_from(config_path: &Path, host_pattern: &str) -> Result<SshConfigHost> {
    if !config_path.exists() {
        return Err(AppError::ConfigError(format!(
            "SSH config file not found at {}",
            config_path.display()
        )));
    }

    let file = std::fs::File::open(config_path)
        .map_err(|e| AppError::ConfigError(format!("Failed to read SSH config file: {e}")))?;
    let mut reader = BufReader::new(file);

    let config = SshConfig::default()
        .parse(&mut reader, ParseRule::ALLOW_UNKNOWN_FIELDS)
        .map_err(|e| AppError::ConfigError(format!("Failed to parse SSH config: {e}")))?;

    let params = config.query(host_pattern);

    // HostName falls back to the pattern itself
    let hostname = params
        .host_name
        .clone()
        .unwrap_or_else(|| host_pattern.to_string());

    if hostname.is_empty() {
        return Err(AppError::ConfigError(format!(
            "No host found matching '{host_pattern}'"
        )));
    }

    let identity_file = params
        .identity_file
        .as_ref()
        .and_then(|files| files.first())
        .map(|path| {
            crate::utils::expand_tilde(&path.to_string_lossy())
                .to_string_lossy()
                .into_owned()
        });

    Ok(SshConfigHost {
        hostname,
        port: params.port,
        user: params.user,
        identity_file,
    })
}
