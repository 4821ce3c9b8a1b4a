pub mod manager;
pub mod ssh_config;

pub use manager::{AuthMethod, Config, ConfigManager, Connection, ExecutorSettings};
pub use ssh_config::{SshConfigHost, query_ssh_config};
