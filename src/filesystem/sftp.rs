//! SFTP session backend using `russh_sftp`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tracing::{debug, error, info};

use super::sftp_file::{self, SftpFile};
use super::{DirEntry, RemoteSession};
use crate::async_ssh_client::{self, SshHandle};
use crate::config::Connection;
use crate::error::{AppError, Result};
use crate::remote_file::{AttrChanges, Attributes};
use crate::transfer::WriteDisposition;

struct Connected {
    ssh: Option<SshHandle>,
    sftp: Arc<SftpSession>,
}

/// A session backend for SFTP operations using `russh_sftp`.
pub struct SftpFileSystem {
    connection: Option<Connection>,
    state: Mutex<Option<Connected>>,
}

impl SftpFileSystem {
    /// Create a backend that opens its own SSH connection on `connect`.
    pub fn new(connection: Connection) -> Self {
        Self {
            connection: Some(connection),
            state: Mutex::new(None),
        }
    }

    /// Wrap an SFTP session that is already established. `connect` is then a
    /// no-op and `close` only ends the SFTP channel.
    pub fn with_session(session: Arc<SftpSession>) -> Self {
        Self {
            connection: None,
            state: Mutex::new(Some(Connected {
                ssh: None,
                sftp: session,
            })),
        }
    }

    fn sftp(&self) -> Result<Arc<SftpSession>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| Arc::clone(&c.sftp))
            .ok_or(AppError::NotConnected)
    }

    fn take_state(&self) -> Option<Connected> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl From<FileAttributes> for Attributes {
    fn from(attrs: FileAttributes) -> Self {
        Self {
            size: attrs.size,
            uid: attrs.uid,
            gid: attrs.gid,
            permissions: attrs.permissions,
            atime: attrs.atime,
            mtime: attrs.mtime,
        }
    }
}

async fn shutdown(connected: Connected) -> Result<()> {
    if let Err(e) = connected.sftp.close().await {
        debug!("SFTP close failed: {}", e);
    }
    if let Some(ssh) = &connected.ssh {
        async_ssh_client::disconnect(ssh).await?;
    }
    Ok(())
}

impl RemoteSession for SftpFileSystem {
    type Reader = SftpFile;
    type Writer = SftpFile;

    async fn connect(&self, timeout: Option<Duration>) -> Result<()> {
        let Some(connection) = &self.connection else {
            return if self.sftp().is_ok() {
                Ok(())
            } else {
                Err(AppError::ConfigError(
                    "No connection settings to reconnect with".to_string(),
                ))
            };
        };

        // A reconnect replaces whatever channel was open before
        if let Some(previous) = self.take_state() {
            shutdown(previous).await?;
        }

        let (ssh, sftp) = async_ssh_client::open_sftp(connection, timeout).await?;
        info!("SFTP session open on {}", connection.host_port());
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(Connected {
            ssh: Some(ssh),
            sftp: Arc::new(sftp),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        match self.take_state() {
            Some(connected) => shutdown(connected).await,
            None => Ok(()),
        }
    }

    fn set_filename_charset(&self, charset: &str) -> Result<()> {
        // russh_sftp encodes every filename as UTF-8
        match charset.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "utf8" => Ok(()),
            _ => Err(AppError::Unsupported(format!(
                "Filename charset '{charset}' (only UTF-8 is available)"
            ))),
        }
    }

    async fn canonicalize(&self, path: &str) -> Result<String> {
        Ok(self.sftp()?.canonicalize(path).await?)
    }

    async fn stat(&self, path: &str, follow_symlink: bool) -> Result<Attributes> {
        debug!("SFTP stat: {} (follow: {})", path, follow_symlink);
        let sftp = self.sftp()?;
        let attrs = if follow_symlink {
            sftp.metadata(path).await?
        } else {
            sftp.symlink_metadata(path).await?
        };
        Ok(attrs.into())
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        debug!("SFTP read_link: {}", path);
        let sftp = self.sftp()?;
        match sftp.read_link(path).await {
            Ok(target) => Ok(target),
            Err(e) => {
                let err = AppError::from(e);
                if err.is_not_found() {
                    return Err(err);
                }
                // Servers answer READLINK on a non-link with a plain failure
                match sftp.symlink_metadata(path).await {
                    Ok(attrs) if !Attributes::from(attrs.clone()).is_symlink() => {
                        Err(AppError::BadReference(format!("not a link: {path}")))
                    }
                    _ => Err(err),
                }
            }
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        debug!("SFTP read_dir: {}", path);
        let read_dir = self.sftp()?.read_dir(path).await.map_err(|e| {
            error!("SFTP read_dir failed for '{}': {}", path, e);
            e
        })?;

        let entries: Vec<DirEntry> = read_dir
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| DirEntry {
                name: entry.file_name(),
                attrs: entry.metadata().into(),
            })
            .collect();

        debug!("SFTP read_dir completed for '{}': {} entries", path, entries.len());
        Ok(entries)
    }

    async fn open_read(&self, path: &str, skip: u64) -> Result<Self::Reader> {
        debug!("SFTP open for read: {} at {}", path, skip);
        sftp_file::open_for_read(&*self.sftp()?, path, skip).await
    }

    async fn open_write(&self, path: &str, disposition: WriteDisposition) -> Result<Self::Writer> {
        debug!("SFTP open for write: {} ({:?})", path, disposition);
        sftp_file::open_for_write(&*self.sftp()?, path, disposition).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        debug!("SFTP mkdir: {}", path);
        Ok(self.sftp()?.create_dir(path).await?)
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        debug!("SFTP deleting file: {}", path);
        Ok(self.sftp()?.remove_file(path).await?)
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        debug!("SFTP deleting directory: {}", path);
        Ok(self.sftp()?.remove_dir(path).await?)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        debug!("SFTP rename: {} -> {}", from, to);
        Ok(self.sftp()?.rename(from, to).await?)
    }

    async fn link(&self, source: &str, target: &str, hard: bool) -> Result<()> {
        if hard {
            return Err(AppError::Unsupported(
                "hard links over russh_sftp".to_string(),
            ));
        }
        debug!("SFTP symlink: {} -> {}", target, source);
        Ok(self.sftp()?.symlink(target, source).await?)
    }

    async fn set_attributes(&self, path: &str, changes: &AttrChanges) -> Result<()> {
        let sftp = self.sftp()?;

        // The protocol sets access and modify time as a pair
        let (mut atime, mut mtime) = (changes.atime, changes.mtime);
        if atime.is_some() != mtime.is_some() {
            let current = sftp.metadata(path).await?;
            atime = atime.or(current.atime);
            mtime = mtime.or(current.mtime);
        }

        let attrs = FileAttributes {
            uid: changes.uid,
            gid: changes.gid,
            permissions: changes.permissions,
            atime,
            mtime,
            ..FileAttributes::empty()
        };
        debug!("SFTP setstat: {} {:?}", path, changes);
        Ok(sftp.set_metadata(path, attrs).await?)
    }
}
