//! In-process remote file system.
//!
//! Behaves like an SFTP v3 server: rename onto an existing path fails, rmdir
//! requires an empty directory, opening a directory for writing fails. Every
//! primitive call is appended to a call log so callers can assert on the
//! order of remote operations.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tracing::debug;

use super::{DirEntry, RemoteSession};
use crate::error::{AppError, Result};
use crate::path;
use crate::remote_file::{AttrChanges, Attributes};
use crate::transfer::WriteDisposition;

const FILE_MODE: u32 = 0o100_644;
const DIR_MODE: u32 = 0o040_755;
const LINK_MODE: u32 = 0o120_777;
const MAX_LINK_HOPS: usize = 16;

#[derive(Debug, Clone)]
enum NodeKind {
    File(Vec<u8>),
    Dir,
    Symlink(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    attrs: Attributes,
}

impl Node {
    fn new(kind: NodeKind, now: u32) -> Self {
        let mode = match kind {
            NodeKind::File(_) => FILE_MODE,
            NodeKind::Dir => DIR_MODE,
            NodeKind::Symlink(_) => LINK_MODE,
        };
        Self {
            kind,
            attrs: Attributes {
                size: None,
                uid: Some(1000),
                gid: Some(1000),
                permissions: Some(mode),
                atime: Some(now),
                mtime: Some(now),
            },
        }
    }

    fn attributes(&self) -> Attributes {
        let size = match &self.kind {
            NodeKind::File(data) => data.len() as u64,
            NodeKind::Dir => 4096,
            NodeKind::Symlink(target) => target.len() as u64,
        };
        Attributes {
            size: Some(size),
            ..self.attrs.clone()
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }
}

#[derive(Debug)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    clock: u32,
}

impl Tree {
    fn new() -> Self {
        let clock = 1_700_000_000;
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::new(NodeKind::Dir, clock));
        Self { nodes, clock }
    }

    fn tick(&mut self) -> u32 {
        self.clock += 1;
        self.clock
    }

    /// Absolute, normalized form of `p`, following a final symlink when asked.
    fn resolve(&self, p: &str, follow: bool) -> Result<String> {
        let mut current = path::resolve("/", p);
        if !follow {
            return Ok(current);
        }
        for _ in 0..MAX_LINK_HOPS {
            match self.nodes.get(&current) {
                Some(Node {
                    kind: NodeKind::Symlink(target),
                    ..
                }) => {
                    let base = path::parent(&current).unwrap_or_else(|| "/".to_string());
                    current = path::resolve(&base, target);
                }
                _ => return Ok(current),
            }
        }
        Err(AppError::BadReference(format!("too many levels of links: {p}")))
    }

    fn require_parent_dir(&self, p: &str) -> Result<()> {
        let Some(parent) = path::parent(p) else {
            return Ok(());
        };
        match self.nodes.get(&parent) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(AppError::NotADirectory(parent)),
            None => Err(AppError::NotFound(parent)),
        }
    }

    fn children(&self, dir: &str) -> Vec<(String, &Node)> {
        self.nodes
            .iter()
            .filter(|(key, _)| key.as_str() != dir && path::parent(key).as_deref() == Some(dir))
            .map(|(key, node)| (key.clone(), node))
            .collect()
    }

    fn insert_dirs(&mut self, p: &str) {
        let now = self.tick();
        for dir in path::parent_chain(p).into_iter().chain([p.to_string()]) {
            self.nodes
                .entry(dir)
                .or_insert_with(|| Node::new(NodeKind::Dir, now));
        }
    }
}

/// A complete remote file system held in memory.
pub struct MemorySession {
    tree: Arc<Mutex<Tree>>,
    connected: AtomicBool,
    charset: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    /// An empty file system containing only `/`, not yet connected.
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::new())),
            connected: AtomicBool::new(false),
            charset: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, op: &str, p: &str) {
        debug!("memory session: {} {}", op, p);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("{op} {p}"));
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::NotConnected)
        }
    }

    /// Log of primitive calls, oldest first, formatted as `"<op> <path>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Charset last applied through [`RemoteSession::set_filename_charset`].
    pub fn charset(&self) -> Option<String> {
        self.charset
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Seed a file, creating missing parent directories. Not logged.
    pub fn put_file(&self, p: &str, data: impl Into<Vec<u8>>) {
        let p = path::resolve("/", p);
        let mut tree = self.tree();
        if let Some(parent) = path::parent(&p) {
            tree.insert_dirs(&parent);
        }
        let now = tree.tick();
        tree.nodes
            .insert(p, Node::new(NodeKind::File(data.into()), now));
    }

    /// Seed a directory and its parents. Not logged.
    pub fn put_dir(&self, p: &str) {
        let p = path::resolve("/", p);
        self.tree().insert_dirs(&p);
    }

    /// Contents of a regular file, `None` when absent or not a file.
    pub fn file_contents(&self, p: &str) -> Option<Vec<u8>> {
        let tree = self.tree();
        let p = tree.resolve(p, true).ok()?;
        match &tree.nodes.get(&p)?.kind {
            NodeKind::File(data) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, p: &str) -> bool {
        let p = path::resolve("/", p);
        self.tree().nodes.get(&p).is_some_and(Node::is_dir)
    }

    /// All paths in the tree, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.tree().nodes.keys().cloned().collect()
    }
}

impl RemoteSession for MemorySession {
    type Reader = Cursor<Vec<u8>>;
    type Writer = MemoryWriter;

    async fn connect(&self, _timeout: Option<Duration>) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        self.record("connect", "");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.record("close", "");
        Ok(())
    }

    fn set_filename_charset(&self, charset: &str) -> Result<()> {
        self.ensure_connected()?;
        self.record("charset", charset);
        *self.charset.lock().unwrap_or_else(PoisonError::into_inner) = Some(charset.to_string());
        Ok(())
    }

    async fn canonicalize(&self, p: &str) -> Result<String> {
        self.ensure_connected()?;
        self.record("canonicalize", p);
        let tree = self.tree();
        let resolved = tree.resolve(p, true)?;
        if tree.nodes.contains_key(&resolved) {
            Ok(resolved)
        } else {
            Err(AppError::NotFound(p.to_string()))
        }
    }

    async fn stat(&self, p: &str, follow_symlink: bool) -> Result<Attributes> {
        self.ensure_connected()?;
        self.record(if follow_symlink { "stat" } else { "lstat" }, p);
        let tree = self.tree();
        let resolved = tree.resolve(p, follow_symlink)?;
        tree.nodes
            .get(&resolved)
            .map(Node::attributes)
            .ok_or_else(|| AppError::NotFound(p.to_string()))
    }

    async fn read_link(&self, p: &str) -> Result<String> {
        self.ensure_connected()?;
        self.record("readlink", p);
        let tree = self.tree();
        let resolved = tree.resolve(p, false)?;
        match tree.nodes.get(&resolved) {
            Some(Node {
                kind: NodeKind::Symlink(target),
                ..
            }) => Ok(target.clone()),
            Some(_) => Err(AppError::BadReference(format!("not a link: {p}"))),
            None => Err(AppError::NotFound(p.to_string())),
        }
    }

    async fn list(&self, p: &str) -> Result<Vec<DirEntry>> {
        self.ensure_connected()?;
        self.record("list", p);
        let tree = self.tree();
        let dir = tree.resolve(p, true)?;
        match tree.nodes.get(&dir) {
            Some(node) if node.is_dir() => {}
            Some(_) => return Err(AppError::NotADirectory(p.to_string())),
            None => return Err(AppError::NotFound(p.to_string())),
        }
        Ok(tree
            .children(&dir)
            .into_iter()
            .map(|(key, node)| DirEntry {
                name: path::file_name(&key).unwrap_or(key),
                attrs: node.attributes(),
            })
            .collect())
    }

    async fn open_read(&self, p: &str, skip: u64) -> Result<Self::Reader> {
        self.ensure_connected()?;
        self.record("open_read", p);
        let tree = self.tree();
        let resolved = tree.resolve(p, true)?;
        match tree.nodes.get(&resolved).map(|n| &n.kind) {
            Some(NodeKind::File(data)) => {
                let start = usize::try_from(skip).unwrap_or(usize::MAX).min(data.len());
                Ok(Cursor::new(data[start..].to_vec()))
            }
            Some(_) => Err(AppError::IsADirectory(p.to_string())),
            None => Err(AppError::NotFound(p.to_string())),
        }
    }

    async fn open_write(&self, p: &str, disposition: WriteDisposition) -> Result<Self::Writer> {
        self.ensure_connected()?;
        self.record("open_write", p);
        let mut tree = self.tree();
        let resolved = tree.resolve(p, true)?;
        tree.require_parent_dir(&resolved)?;
        let now = tree.tick();

        let node = tree
            .nodes
            .entry(resolved.clone())
            .or_insert_with(|| Node::new(NodeKind::File(Vec::new()), now));
        let NodeKind::File(data) = &mut node.kind else {
            return Err(AppError::IsADirectory(p.to_string()));
        };

        let position = match disposition {
            WriteDisposition::Overwrite => {
                data.clear();
                0
            }
            WriteDisposition::Resume(offset) => offset,
            WriteDisposition::Append => data.len() as u64,
        };
        node.attrs.mtime = Some(now);

        Ok(MemoryWriter {
            tree: Arc::clone(&self.tree),
            path: resolved,
            position,
        })
    }

    async fn mkdir(&self, p: &str) -> Result<()> {
        self.ensure_connected()?;
        self.record("mkdir", p);
        let mut tree = self.tree();
        let resolved = tree.resolve(p, false)?;
        tree.require_parent_dir(&resolved)?;
        if tree.nodes.contains_key(&resolved) {
            return Err(AppError::AlreadyExists(p.to_string()));
        }
        let now = tree.tick();
        tree.nodes.insert(resolved, Node::new(NodeKind::Dir, now));
        Ok(())
    }

    async fn remove_file(&self, p: &str) -> Result<()> {
        self.ensure_connected()?;
        self.record("remove_file", p);
        let mut tree = self.tree();
        let resolved = tree.resolve(p, false)?;
        match tree.nodes.get(&resolved) {
            Some(node) if node.is_dir() => Err(AppError::IsADirectory(p.to_string())),
            Some(_) => {
                tree.nodes.remove(&resolved);
                Ok(())
            }
            None => Err(AppError::NotFound(p.to_string())),
        }
    }

    async fn remove_dir(&self, p: &str) -> Result<()> {
        self.ensure_connected()?;
        self.record("remove_dir", p);
        let mut tree = self.tree();
        let resolved = tree.resolve(p, false)?;
        match tree.nodes.get(&resolved) {
            Some(node) if !node.is_dir() => Err(AppError::NotADirectory(p.to_string())),
            Some(_) if !tree.children(&resolved).is_empty() => {
                Err(AppError::SftpError(format!("directory not empty: {p}")))
            }
            Some(_) => {
                tree.nodes.remove(&resolved);
                Ok(())
            }
            None => Err(AppError::NotFound(p.to_string())),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.ensure_connected()?;
        self.record("rename", &format!("{from} -> {to}"));
        let mut tree = self.tree();
        let from = tree.resolve(from, false)?;
        let to = tree.resolve(to, false)?;
        if !tree.nodes.contains_key(&from) {
            return Err(AppError::NotFound(from));
        }
        if tree.nodes.contains_key(&to) {
            return Err(AppError::AlreadyExists(to));
        }
        tree.require_parent_dir(&to)?;

        let prefix = format!("{}/", from.trim_end_matches('/'));
        let moved: Vec<String> = tree
            .nodes
            .keys()
            .filter(|key| **key == from || key.starts_with(&prefix))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = tree.nodes.remove(&key) {
                let new_key = format!("{to}{}", &key[from.len()..]);
                tree.nodes.insert(new_key, node);
            }
        }
        Ok(())
    }

    async fn link(&self, source: &str, target: &str, hard: bool) -> Result<()> {
        self.ensure_connected()?;
        self.record(if hard { "hardlink" } else { "symlink" }, target);
        let mut tree = self.tree();
        let target = tree.resolve(target, false)?;
        if tree.nodes.contains_key(&target) {
            return Err(AppError::AlreadyExists(target));
        }
        tree.require_parent_dir(&target)?;

        let node = if hard {
            let resolved = tree.resolve(source, true)?;
            match tree.nodes.get(&resolved) {
                Some(node) if !node.is_dir() => node.clone(),
                Some(_) => return Err(AppError::IsADirectory(source.to_string())),
                None => return Err(AppError::NotFound(source.to_string())),
            }
        } else {
            let now = tree.tick();
            Node::new(NodeKind::Symlink(source.to_string()), now)
        };
        tree.nodes.insert(target, node);
        Ok(())
    }

    async fn set_attributes(&self, p: &str, changes: &AttrChanges) -> Result<()> {
        self.ensure_connected()?;
        self.record("setstat", p);
        let mut tree = self.tree();
        let resolved = tree.resolve(p, true)?;
        let node = tree
            .nodes
            .get_mut(&resolved)
            .ok_or_else(|| AppError::NotFound(p.to_string()))?;
        changes.apply_to(&mut node.attrs);
        Ok(())
    }
}

/// Write handle into a [`MemorySession`] file. Bytes land in the tree as soon
/// as they are written.
#[derive(Debug)]
pub struct MemoryWriter {
    tree: Arc<Mutex<Tree>>,
    path: String,
    position: u64,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        let mut tree = this.tree.lock().unwrap_or_else(PoisonError::into_inner);
        let now = tree.tick();
        let Some(node) = tree.nodes.get_mut(&this.path) else {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file vanished: {}", this.path),
            )));
        };
        let NodeKind::File(data) = &mut node.kind else {
            return Poll::Ready(Err(std::io::Error::other(format!(
                "not a regular file: {}",
                this.path
            ))));
        };

        let start = this.position as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        node.attrs.mtime = Some(now);
        this.position = end as u64;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
