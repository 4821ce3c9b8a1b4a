//! Directory traversal for directory synchronization.
//!
//! Produces a [`DirectoryPlan`]: an ordered list of directories to create
//! followed by a flat list of files to copy. Directories are listed parents
//! before children, so replaying them front to back never targets a missing
//! parent.

use std::collections::VecDeque;
use std::io::Error;
use std::path::Path;

use tracing::debug;

use super::RemoteSession;
use crate::error::{AppError, Result};
use crate::filter::EntryFilter;
use crate::path;
use crate::remote_file::RemoteFile;

/// Result of walking a directory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryPlan {
    /// Directories to create on the destination, in BFS order (parents before children).
    pub directories: Vec<String>,
    /// Files to transfer: `(source_path, dest_path, file_size)`.
    pub files: Vec<(String, String, Option<u64>)>,
}

fn local_str(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "/")
}

fn map_dest(src: &str, source_root: &str, dest_root: &str) -> Result<String> {
    path::rebase(src, source_root, dest_root)
        .ok_or_else(|| AppError::ValidationError(format!("'{src}' is outside '{source_root}'")))
}

/// Walk a local directory tree using BFS.
///
/// `source_root` is the local directory being copied, `dest_root` the remote
/// directory it maps onto. With `recursive` unset only the files directly
/// under `source_root` are planned and no subdirectories.
pub async fn walk_local_dir(
    source_root: &Path,
    dest_root: &str,
    recursive: bool,
) -> Result<DirectoryPlan> {
    let source_root = tokio::fs::canonicalize(source_root).await.map_err(|e| {
        Error::new(
            e.kind(),
            format!("Failed to resolve local directory '{}': {e}", source_root.display()),
        )
    })?;
    let root = local_str(&source_root);
    let root = root.trim_end_matches('/');
    let root = if root.is_empty() { "/" } else { root };

    let mut plan = DirectoryPlan::default();
    // The root destination directory itself
    plan.directories.push(path::normalize(dest_root));

    let mut queue: VecDeque<std::path::PathBuf> = VecDeque::from([source_root.clone()]);

    while let Some(src_dir) = queue.pop_front() {
        let mut read_dir = tokio::fs::read_dir(&src_dir).await.map_err(|e| {
            Error::new(
                e.kind(),
                format!("Failed to read local directory '{}': {e}", src_dir.display()),
            )
        })?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(entry.path());
        }
        entries.sort();

        for src_path in entries {
            // Follow symlinks to determine actual type
            let metadata = tokio::fs::metadata(&src_path).await.map_err(|e| {
                Error::new(
                    e.kind(),
                    format!("Failed to get metadata for '{}': {e}", src_path.display()),
                )
            })?;
            let src = local_str(&src_path);

            if metadata.is_dir() {
                if recursive {
                    plan.directories.push(map_dest(&src, root, dest_root)?);
                    queue.push_back(src_path);
                }
            } else if metadata.is_file() {
                let dest = map_dest(&src, root, dest_root)?;
                plan.files.push((src, dest, Some(metadata.len())));
            }
            // Skip other file types (sockets, etc.)
        }
    }

    Ok(plan)
}

/// Walk a remote directory tree using BFS.
///
/// `source_root` must be an existing remote directory; `dest_root` is the
/// local directory it maps onto. `filter`, when given, selects which files
/// are planned; directories are always traversed. Links to files are copied
/// as the file they point at; links to directories are skipped.
pub async fn walk_remote_dir<S: RemoteSession>(
    session: &S,
    source_root: &str,
    dest_root: &Path,
    recursive: bool,
    filter: Option<&EntryFilter>,
) -> Result<DirectoryPlan> {
    let source_root = path::normalize(source_root);

    let mut plan = DirectoryPlan::default();
    plan.directories.push(local_str(dest_root));

    let mut queue: VecDeque<(String, std::path::PathBuf)> =
        VecDeque::from([(source_root, dest_root.to_path_buf())]);

    while let Some((src_dir, dst_dir)) = queue.pop_front() {
        let mut entries = session.list(&src_dir).await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in entries {
            let src_path = path::resolve(&src_dir, &entry.name);
            let dst_path = dst_dir.join(&entry.name);

            // Listings report links as links; look through them for files only
            let attrs = if entry.attrs.is_symlink() {
                match session.stat(&src_path, true).await {
                    Ok(attrs) if attrs.is_dir() => {
                        debug!("not descending into linked directory {}", src_path);
                        continue;
                    }
                    Ok(attrs) => attrs,
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e),
                }
            } else {
                entry.attrs
            };

            if attrs.is_dir() {
                if recursive {
                    plan.directories.push(local_str(&dst_path));
                    queue.push_back((src_path, dst_path));
                }
            } else if attrs.is_regular() {
                let file = RemoteFile::new(src_path, attrs);
                if filter.is_none_or(|f| f.matches(&file)) {
                    let size = file.size();
                    plan.files
                        .push((file.path().to_string(), local_str(&dst_path), size));
                }
            }
        }
    }

    Ok(plan)
}
