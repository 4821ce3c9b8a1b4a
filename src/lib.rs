mod async_ssh_client;
mod classify;
mod error;
mod filter;
mod remote_file;
mod utils;

pub mod config;
pub mod executor;
pub mod filesystem;
pub mod path;
pub mod transfer;

// Re-export commonly used types
pub use classify::{ErrorClass, classify};
pub use config::{AuthMethod, Config, ConfigManager, Connection, ExecutorSettings};
pub use error::{AppError, Result};
pub use executor::{Executor, ExecutorState, Lenient, SyncSummary};
pub use filesystem::{DirEntry, DirectoryPlan, MemorySession, RemoteSession, SftpFileSystem};
pub use filter::EntryFilter;
pub use remote_file::{AttrChanges, Attributes, RemoteFile};
pub use transfer::{TransferProgress, TransferRequest, WriteDisposition};
pub use utils::{expand_tilde, init_tracing};
