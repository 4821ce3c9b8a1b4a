//! The remote file-transfer executor.
//!
//! [`Executor`] composes a [`RemoteSession`] with path resolution, error
//! classification and the transfer engine into the public operation set.
//! Absence is absorbed only where an operation's contract says so:
//!
//! - deletes treat a missing target as already done;
//! - lookups (`file`, `size`, `link_target`, `real_path`) return `None`;
//! - creation, mutation and writes always surface the error.

mod compat;
mod io;
mod listing;
mod sync;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::classify::ErrorClass;
use crate::config::ExecutorSettings;
use crate::error::{AppError, Result};
use crate::filesystem::RemoteSession;
use crate::path;
use crate::remote_file::{AttrChanges, RemoteFile};

pub use compat::Lenient;
pub use sync::SyncSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Disconnected,
    Connected,
    Closed,
}

/// Turn "not found" into `None`, keep every other error.
fn absent_as_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn unix_seconds(time: DateTime<Utc>) -> Result<u32> {
    u32::try_from(time.timestamp())
        .map_err(|_| AppError::ValidationError(format!("Timestamp out of range: {time}")))
}

/// File operations against one remote session.
///
/// Operations are meant to be awaited one at a time; the underlying channel
/// is not shared between concurrent logical operations.
pub struct Executor<S: RemoteSession> {
    session: Arc<S>,
    settings: ExecutorSettings,
    state: ExecutorState,
    cwd: String,
}

impl<S: RemoteSession> Executor<S> {
    pub fn new(session: Arc<S>, settings: ExecutorSettings) -> Self {
        Self {
            session,
            settings,
            state: ExecutorState::Disconnected,
            cwd: "/".to_string(),
        }
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Connect using the configured timeout.
    pub async fn connect(&mut self) -> Result<()> {
        let timeout = self.settings.connect_timeout();
        self.open(Some(timeout)).await
    }

    pub async fn connect_with_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.open(Some(timeout)).await
    }

    async fn open(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.session.connect(timeout).await?;
        // A fresh channel starts with the server default charset
        self.session.set_filename_charset(&self.settings.charset)?;
        self.cwd = self.session.canonicalize(".").await?;
        self.state = ExecutorState::Connected;
        info!("executor connected, working directory {}", self.cwd);
        Ok(())
    }

    /// Release the channel. The executor is not usable afterwards.
    pub async fn close(&mut self) -> Result<()> {
        self.state = ExecutorState::Closed;
        self.session.close().await?;
        info!("executor closed");
        Ok(())
    }

    pub fn pwd(&self) -> &str {
        &self.cwd
    }

    /// Change the directory relative paths are resolved against.
    pub async fn cd(&mut self, dir: &str) -> Result<()> {
        let target = self.resolve(dir);
        let attrs = self.session.stat(&target, true).await?;
        if !attrs.is_dir() {
            return Err(AppError::NotADirectory(target));
        }
        self.cwd = target;
        Ok(())
    }

    /// Absolute form of `p`, relative paths taken from the working directory.
    pub fn resolve(&self, p: &str) -> String {
        path::resolve(&self.cwd, p)
    }

    /// Whether `p` exists. Only "not found" yields `false`; any other
    /// failure is returned.
    pub async fn exists(&self, p: &str) -> Result<bool> {
        Ok(self.file(p).await?.is_some())
    }

    /// Metadata snapshot of `p` itself (links are not followed).
    pub async fn file(&self, p: &str) -> Result<Option<RemoteFile>> {
        let target = self.resolve(p);
        let attrs = absent_as_none(self.session.stat(&target, false).await)?;
        Ok(attrs.map(|attrs| RemoteFile::new(target, attrs)))
    }

    /// Metadata snapshot of whatever `p` points at.
    pub async fn stat(&self, p: &str) -> Result<RemoteFile> {
        let target = self.resolve(p);
        let attrs = self.session.stat(&target, true).await?;
        Ok(RemoteFile::new(target, attrs))
    }

    /// Byte size of a file or link target; `None` when absent or a directory.
    pub async fn size(&self, p: &str) -> Result<Option<u64>> {
        let target = self.resolve(p);
        let attrs = absent_as_none(self.session.stat(&target, true).await)?;
        Ok(attrs.and_then(|attrs| RemoteFile::new(target, attrs).size()))
    }

    pub async fn is_dir(&self, p: &str) -> Result<bool> {
        let target = self.resolve(p);
        let attrs = absent_as_none(self.session.stat(&target, true).await)?;
        Ok(attrs.is_some_and(|a| a.is_dir()))
    }

    pub async fn is_file(&self, p: &str) -> Result<bool> {
        let target = self.resolve(p);
        let attrs = absent_as_none(self.session.stat(&target, true).await)?;
        Ok(attrs.is_some_and(|a| a.is_regular()))
    }

    /// Target of the link at `p`; `None` when `p` is absent or not a link.
    pub async fn link_target(&self, p: &str) -> Result<Option<String>> {
        let target = self.resolve(p);
        let attrs = absent_as_none(self.session.stat(&target, false).await)?;
        if !attrs.is_some_and(|a| a.is_symlink()) {
            return Ok(None);
        }
        // The link can still vanish or be replaced before the readlink
        match self.session.read_link(&target).await {
            Ok(link) => Ok(Some(link)),
            Err(e) if matches!(e.class(), ErrorClass::NotFound | ErrorClass::BadReference) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Canonical absolute path of `p`, `None` when it does not exist.
    pub async fn real_path(&self, p: &str) -> Result<Option<String>> {
        let target = self.resolve(p);
        absent_as_none(self.session.canonicalize(&target).await)
    }

    /// Push attribute changes for an existing path.
    pub async fn set_attributes(&self, p: &str, changes: &AttrChanges) -> Result<()> {
        let target = self.resolve(p);
        // Mutation requires the entity to exist; surface that explicitly
        self.session.stat(&target, true).await?;
        if changes.is_empty() {
            return Ok(());
        }
        debug!("set attributes on {}: {:?}", target, changes);
        self.session.set_attributes(&target, changes).await
    }

    /// Set permission bits, e.g. `0o755`.
    pub async fn change_mode(&self, p: &str, mode: u32) -> Result<()> {
        let target = self.resolve(p);
        self.session.stat(&target, true).await?;
        self.session.chmod(&target, mode).await
    }

    pub async fn change_owner(&self, p: &str, uid: u32) -> Result<()> {
        let target = self.resolve(p);
        self.session.stat(&target, true).await?;
        self.session.chown(&target, uid).await
    }

    pub async fn change_group(&self, p: &str, gid: u32) -> Result<()> {
        let target = self.resolve(p);
        self.session.stat(&target, true).await?;
        self.session.chgrp(&target, gid).await
    }

    pub async fn set_modify_time(&self, p: &str, time: DateTime<Utc>) -> Result<()> {
        let changes = AttrChanges::default().modify_time(unix_seconds(time)?);
        self.set_attributes(p, &changes).await
    }

    pub async fn set_access_time(&self, p: &str, time: DateTime<Utc>) -> Result<()> {
        let changes = AttrChanges::default().access_time(unix_seconds(time)?);
        self.set_attributes(p, &changes).await
    }

    /// Create one directory. The parent must exist and so must not `p`.
    pub async fn make_directory(&self, p: &str) -> Result<()> {
        let target = self.resolve(p);
        debug!("mkdir {}", target);
        self.session.mkdir(&target).await
    }

    /// Create `p` and any missing ancestors. Existing directories are fine;
    /// an existing non-directory anywhere on the way is an error.
    pub async fn make_directories(&self, p: &str) -> Result<()> {
        let target = self.resolve(p);
        if self.dir_exists(&target).await? {
            return Ok(());
        }

        let chain = path::parent_chain(&target);
        for dir in chain.into_iter().chain(std::iter::once(target)) {
            match self.session.stat(&dir, true).await {
                Ok(attrs) if attrs.is_dir() => continue,
                Ok(_) => return Err(AppError::NotADirectory(dir)),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            if let Err(e) = self.session.mkdir(&dir).await {
                // Someone else may have created it in the meantime
                if !self.dir_exists(&dir).await? {
                    return Err(e);
                }
            }
            debug!("created directory {}", dir);
        }
        Ok(())
    }

    async fn dir_exists(&self, target: &str) -> Result<bool> {
        let attrs = absent_as_none(self.session.stat(target, true).await)?;
        Ok(attrs.is_some_and(|a| a.is_dir()))
    }

    async fn ensure_parent(&self, target: &str) -> Result<()> {
        match path::parent(target) {
            Some(parent) => self.make_directories(&parent).await,
            None => Ok(()),
        }
    }

    /// Delete a file or link. A missing target is not an error.
    pub async fn remove_file(&self, p: &str) -> Result<()> {
        let target = self.resolve(p);
        absent_as_none(self.session.remove_file(&target).await).map(|_| ())
    }

    /// Delete an empty directory. A missing target is not an error.
    pub async fn remove_dir(&self, p: &str) -> Result<()> {
        let target = self.resolve(p);
        absent_as_none(self.session.remove_dir(&target).await).map(|_| ())
    }

    /// Delete a file, link or empty directory. A missing target is not an
    /// error.
    pub async fn remove(&self, p: &str) -> Result<()> {
        match self.file(p).await? {
            Some(file) if file.is_directory() => self.remove_dir(file.path()).await,
            Some(file) => self.remove_file(file.path()).await,
            None => Ok(()),
        }
    }

    /// Delete `p` and everything below it. Links are removed, never followed.
    pub async fn remove_recursive(&self, p: &str) -> Result<()> {
        let Some(root) = self.file(p).await? else {
            return Ok(());
        };
        if !root.is_directory() {
            return self.remove_file(root.path()).await;
        }

        let mut dirs = vec![root.path().to_string()];
        let mut index = 0;
        while index < dirs.len() {
            let dir = dirs[index].clone();
            index += 1;
            let Some(entries) = absent_as_none(self.session.list(&dir).await)? else {
                continue;
            };
            for entry in entries {
                let child = path::resolve(&dir, &entry.name);
                if entry.attrs.is_dir() {
                    dirs.push(child);
                } else {
                    self.remove_file(&child).await?;
                }
            }
        }

        // Deepest directories first
        for dir in dirs.iter().rev() {
            self.remove_dir(dir).await?;
        }
        info!("removed {} recursively", root.path());
        Ok(())
    }

    /// Create the file if absent; with `truncate`, also empty it if present.
    /// Fails when `p` is a directory.
    pub async fn touch_with(&self, p: &str, truncate: bool) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let target = self.resolve(p);
        self.ensure_parent(&target).await?;
        let disposition = if truncate {
            crate::transfer::WriteDisposition::Overwrite
        } else {
            crate::transfer::WriteDisposition::Resume(0)
        };
        let mut writer = self.session.open_write(&target, disposition).await?;
        let flushed = writer.flush().await;
        let closed = writer.shutdown().await;
        flushed?;
        closed?;
        Ok(())
    }

    pub async fn touch(&self, p: &str) -> Result<()> {
        self.touch_with(p, false).await
    }

    /// Empty the file, creating it when absent.
    pub async fn clear(&self, p: &str) -> Result<()> {
        self.touch_with(p, true).await
    }

    /// Move `source` to `target`, replacing an existing file at `target`.
    ///
    /// A relative `target` is taken relative to the directory of `source`.
    /// When `target` is an existing directory the source moves into it.
    pub async fn move_to(&self, source: &str, target: &str) -> Result<()> {
        let source = self.resolve(source);
        self.session.stat(&source, false).await?;

        let base = path::parent(&source).unwrap_or_else(|| "/".to_string());
        let mut target = path::resolve(&base, target);

        if let Some(existing) = self.file(&target).await?
            && existing.is_directory()
            && target != source
        {
            let name = path::file_name(&source).unwrap_or_default();
            target = path::resolve(&target, &name);
        }
        if target == source {
            return Ok(());
        }

        match self.file(&target).await? {
            Some(existing) if existing.is_directory() => {
                return Err(AppError::AlreadyExists(target));
            }
            Some(_) => self.session.remove_file(&target).await?,
            None if !path::same_parent(&source, &target) => self.ensure_parent(&target).await?,
            None => {}
        }

        debug!("move {} -> {}", source, target);
        self.session.rename(&source, &target).await
    }

    /// Create `target` as a link to `source`. Both a missing source and an
    /// existing target are errors.
    pub async fn link(&self, source: &str, target: &str, hard: bool) -> Result<()> {
        let source = self.resolve(source);
        let target = self.resolve(target);
        self.session.stat(&source, false).await?;
        if self.file(&target).await?.is_some() {
            return Err(AppError::AlreadyExists(target));
        }
        if !path::same_parent(&source, &target) {
            self.ensure_parent(&target).await?;
        }
        debug!("link {} -> {} (hard: {})", target, source, hard);
        self.session.link(&source, &target, hard).await
    }

    /// Legacy boolean API over this executor.
    pub fn lenient(&self) -> Lenient<'_, S> {
        Lenient::new(self)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::filesystem::MemorySession;

    pub(crate) async fn executor() -> (Arc<MemorySession>, Executor<MemorySession>) {
        let session = Arc::new(MemorySession::new());
        let mut exec = Executor::new(Arc::clone(&session), ExecutorSettings::default());
        exec.connect().await.unwrap();
        (session, exec)
    }

    #[tokio::test]
    async fn test_lifecycle_reapplies_charset() {
        let session = Arc::new(MemorySession::new());
        let settings = ExecutorSettings {
            charset: "ISO-8859-1".to_string(),
            ..Default::default()
        };
        let mut exec = Executor::new(Arc::clone(&session), settings);
        assert_eq!(exec.state(), ExecutorState::Disconnected);

        exec.connect().await.unwrap();
        assert_eq!(exec.state(), ExecutorState::Connected);
        assert_eq!(session.charset().as_deref(), Some("ISO-8859-1"));
        assert_eq!(exec.pwd(), "/");

        exec.close().await.unwrap();
        assert_eq!(exec.state(), ExecutorState::Closed);
        assert!(!session.is_connected());

        exec.connect_with_timeout(Duration::from_secs(1)).await.unwrap();
        let calls = session.calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("charset")).count(), 2);
    }

    #[tokio::test]
    async fn test_closed_channel_is_transport_failure() {
        let (_session, mut exec) = executor().await;
        exec.close().await.unwrap();
        let err = exec.exists("/").await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transport);
    }

    #[tokio::test]
    async fn test_absent_paths() {
        let (_session, exec) = executor().await;
        assert!(!exec.exists("/nope").await.unwrap());
        assert_eq!(exec.file("/nope").await.unwrap(), None);
        assert_eq!(exec.size("/nope").await.unwrap(), None);
        assert_eq!(exec.link_target("/nope").await.unwrap(), None);
        assert_eq!(exec.real_path("/nope").await.unwrap(), None);
        exec.remove_file("/nope").await.unwrap();
        exec.remove_dir("/nope").await.unwrap();
        exec.remove("/nope").await.unwrap();
        exec.remove_recursive("/nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_size_and_types() {
        let (session, exec) = executor().await;
        session.put_file("/d/f.txt", "hello");
        assert_eq!(exec.size("/d/f.txt").await.unwrap(), Some(5));
        assert_eq!(exec.size("/d").await.unwrap(), None);
        assert!(exec.is_dir("/d").await.unwrap());
        assert!(exec.is_file("/d/f.txt").await.unwrap());
        assert!(!exec.is_file("/d").await.unwrap());

        let f = exec.file("/d/f.txt").await.unwrap().unwrap();
        assert!(f.is_regular_file());
        assert_eq!(f.permission(), 644);
    }

    #[tokio::test]
    async fn test_relative_paths_and_cd() {
        let (session, mut exec) = executor().await;
        session.put_file("/home/user/notes.txt", "n");
        exec.cd("/home/user").await.unwrap();
        assert_eq!(exec.pwd(), "/home/user");
        assert!(exec.exists("notes.txt").await.unwrap());
        assert_eq!(exec.resolve("../other"), "/home/other");

        let err = exec.cd("notes.txt").await.unwrap_err();
        assert!(matches!(err, AppError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_link_target() {
        let (session, exec) = executor().await;
        session.put_file("/data/real", "abc");
        exec.link("/data/real", "/data/alias", false).await.unwrap();
        assert_eq!(
            exec.link_target("/data/alias").await.unwrap().as_deref(),
            Some("/data/real")
        );
        // A regular file is "no link here"
        assert_eq!(exec.link_target("/data/real").await.unwrap(), None);
        assert!(exec.file("/data/alias").await.unwrap().unwrap().is_link_file());
    }

    #[tokio::test]
    async fn test_link_target_non_link_skips_readlink() {
        let (session, exec) = executor().await;
        session.put_file("/data/real", "abc");
        session.put_dir("/data/dir");
        session.clear_calls();

        assert_eq!(exec.link_target("/data/real").await.unwrap(), None);
        assert_eq!(exec.link_target("/data/dir").await.unwrap(), None);
        assert_eq!(exec.link_target("/data/missing").await.unwrap(), None);
        let calls = session.calls();
        assert!(!calls.iter().any(|c| c.starts_with("readlink")), "{calls:?}");
        assert!(calls.contains(&"lstat /data/real".to_string()));
    }

    #[tokio::test]
    async fn test_link_errors_and_parent_creation() {
        let (session, exec) = executor().await;
        session.put_file("/src/a", "a");

        let err = exec.link("/src/missing", "/dst/l", false).await.unwrap_err();
        assert!(err.is_not_found());

        exec.link("/src/a", "/deep/nested/l", true).await.unwrap();
        assert!(session.is_dir("/deep/nested"));
        assert_eq!(session.file_contents("/deep/nested/l").unwrap(), b"a");

        let err = exec.link("/src/a", "/deep/nested/l", false).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_same_parent_link_skips_directory_check() {
        let (session, exec) = executor().await;
        session.put_file("/d/a", "a");
        session.clear_calls();
        exec.link("/d/a", "/d/b", false).await.unwrap();
        assert!(!session.calls().iter().any(|c| c.starts_with("mkdir")));
        assert!(!session.calls().iter().any(|c| c == "stat /d"));
    }

    #[tokio::test]
    async fn test_make_directories() {
        let (session, exec) = executor().await;
        exec.make_directories("/a/b/c").await.unwrap();
        assert!(session.is_dir("/a/b/c"));
        // Idempotent
        exec.make_directories("/a/b/c").await.unwrap();

        session.put_file("/a/file", "x");
        let err = exec.make_directories("/a/file/sub").await.unwrap_err();
        assert!(matches!(err, AppError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_make_directory_single_level() {
        let (session, exec) = executor().await;
        let err = exec.make_directory("/x/y").await.unwrap_err();
        assert!(err.is_not_found());
        exec.make_directory("/x").await.unwrap();
        assert!(session.is_dir("/x"));
        assert!(exec.make_directory("/x").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_recursive() {
        let (session, exec) = executor().await;
        session.put_file("/t/a.txt", "a");
        session.put_file("/t/sub/b.txt", "b");
        session.put_file("/t/sub/deeper/c.txt", "c");
        session.put_file("/keep/k", "k");

        exec.remove_recursive("/t").await.unwrap();
        assert!(!session.paths().iter().any(|p| p.starts_with("/t")));
        assert!(session.file_contents("/keep/k").is_some());
    }

    #[tokio::test]
    async fn test_remove_non_empty_dir_fails() {
        let (session, exec) = executor().await;
        session.put_file("/t/a", "a");
        assert!(exec.remove("/t").await.is_err());
        exec.remove("/t/a").await.unwrap();
        exec.remove("/t").await.unwrap();
        assert!(!exec.exists("/t").await.unwrap());
    }

    #[tokio::test]
    async fn test_attributes() {
        let (session, exec) = executor().await;
        session.put_file("/f", "x");

        exec.change_mode("/f", 0o600).await.unwrap();
        exec.change_owner("/f", 0).await.unwrap();
        exec.change_group("/f", 50).await.unwrap();
        let when = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        exec.set_modify_time("/f", when).await.unwrap();

        let f = exec.file("/f").await.unwrap().unwrap();
        assert_eq!(f.permission_string(), "-rw-------");
        assert_eq!(f.uid(), Some(0));
        assert_eq!(f.gid(), Some(50));
        assert_eq!(f.modify_time(), Some(when));

        let err = exec.change_mode("/missing", 0o644).await.unwrap_err();
        assert!(err.is_not_found());
        let err = exec
            .set_attributes("/missing", &AttrChanges::default().owner(1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_touch() {
        let (session, exec) = executor().await;
        exec.touch("/new/file").await.unwrap();
        assert_eq!(session.file_contents("/new/file").unwrap(), b"");

        session.put_file("/new/file", "content");
        exec.touch("/new/file").await.unwrap();
        assert_eq!(session.file_contents("/new/file").unwrap(), b"content");

        exec.clear("/new/file").await.unwrap();
        assert_eq!(session.file_contents("/new/file").unwrap(), b"");

        let err = exec.touch("/new").await.unwrap_err();
        assert!(matches!(err, AppError::IsADirectory(_)));
    }

    #[tokio::test]
    async fn test_move_replaces_existing_target() {
        let (session, exec) = executor().await;
        session.put_file("/a/old.txt", "new content");
        session.put_file("/a/relative/new.txt", "stale");

        exec.move_to("/a/old.txt", "relative/new.txt").await.unwrap();
        assert_eq!(
            session.file_contents("/a/relative/new.txt").unwrap(),
            b"new content"
        );
        assert!(!exec.exists("/a/old.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_missing_source_and_into_directory() {
        let (session, exec) = executor().await;
        let err = exec.move_to("/nope", "/x").await.unwrap_err();
        assert!(err.is_not_found());

        session.put_file("/in/f", "f");
        session.put_dir("/out");
        exec.move_to("/in/f", "/out").await.unwrap();
        assert_eq!(session.file_contents("/out/f").unwrap(), b"f");

        exec.move_to("/out/f", "/fresh/parent/g").await.unwrap();
        assert_eq!(session.file_contents("/fresh/parent/g").unwrap(), b"f");
    }
}
