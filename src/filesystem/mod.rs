//! Session backends.
//!
//! [`RemoteSession`] is the primitive operation set the executor is built on.
//! Each backend translates its own errors into [`crate::AppError`] at this
//! boundary; classification happens in [`crate::classify`].

pub mod dir_walker;
pub mod memory;
pub mod sftp;
pub mod sftp_file;

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::remote_file::{AttrChanges, Attributes};
use crate::transfer::WriteDisposition;

pub use dir_walker::DirectoryPlan;
pub use memory::MemorySession;
pub use sftp::SftpFileSystem;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub attrs: Attributes,
}

/// A connected, stateful handle to a remote file system.
///
/// Not safe for concurrent logical operations: callers issue one operation
/// at a time per session.
pub trait RemoteSession: Send + Sync {
    type Reader: AsyncRead + Unpin + Send + 'static;
    type Writer: AsyncWrite + Unpin + Send + 'static;

    fn connect(&self, timeout: Option<Duration>) -> impl Future<Output = Result<()>> + Send;

    fn close(&self) -> impl Future<Output = Result<()>> + Send;

    fn set_filename_charset(&self, charset: &str) -> Result<()>;

    fn canonicalize(&self, path: &str) -> impl Future<Output = Result<String>> + Send;

    fn stat(
        &self,
        path: &str,
        follow_symlink: bool,
    ) -> impl Future<Output = Result<Attributes>> + Send;

    fn read_link(&self, path: &str) -> impl Future<Output = Result<String>> + Send;

    /// Entries of a directory, without `.` and `..`.
    fn list(&self, path: &str) -> impl Future<Output = Result<Vec<DirEntry>>> + Send;

    /// Open `path` for reading, positioned `skip` bytes in.
    fn open_read(&self, path: &str, skip: u64)
    -> impl Future<Output = Result<Self::Reader>> + Send;

    fn open_write(
        &self,
        path: &str,
        disposition: WriteDisposition,
    ) -> impl Future<Output = Result<Self::Writer>> + Send;

    fn mkdir(&self, path: &str) -> impl Future<Output = Result<()>> + Send;

    fn remove_file(&self, path: &str) -> impl Future<Output = Result<()>> + Send;

    fn remove_dir(&self, path: &str) -> impl Future<Output = Result<()>> + Send;

    fn rename(&self, from: &str, to: &str) -> impl Future<Output = Result<()>> + Send;

    /// Create `target` as a link to `source`.
    fn link(
        &self,
        source: &str,
        target: &str,
        hard: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_attributes(
        &self,
        path: &str,
        changes: &AttrChanges,
    ) -> impl Future<Output = Result<()>> + Send;

    fn chmod(&self, path: &str, mode: u32) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.set_attributes(path, &AttrChanges::default().permissions(mode))
                .await
        }
    }

    fn chown(&self, path: &str, uid: u32) -> impl Future<Output = Result<()>> + Send {
        async move { self.set_attributes(path, &AttrChanges::default().owner(uid)).await }
    }

    fn chgrp(&self, path: &str, gid: u32) -> impl Future<Output = Result<()>> + Send {
        async move { self.set_attributes(path, &AttrChanges::default().group(gid)).await }
    }
}
