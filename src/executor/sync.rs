//! Directory synchronization in both directions.
//!
//! A sync first walks the source into a [`DirectoryPlan`], creates every
//! destination directory in plan order, then copies files. File copies never
//! create parents themselves: a missing parent at that point is a bug in the
//! plan and fails the sync.

use std::path::Path;

use tracing::info;

use super::Executor;
use crate::error::{AppError, Result};
use crate::filesystem::RemoteSession;
use crate::filesystem::dir_walker::{self, DirectoryPlan};
use crate::filter::EntryFilter;
use crate::transfer::WriteDisposition;

/// Counts of what a sync touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
}

impl<S: RemoteSession> Executor<S> {
    /// Mirror the local directory `local_root` onto `remote_root`.
    ///
    /// Existing remote files are overwritten and nothing is deleted, so
    /// running the same sync twice leaves the same tree.
    pub async fn upload_dir(
        &self,
        remote_root: &str,
        local_root: &Path,
        recursive: bool,
    ) -> Result<SyncSummary> {
        let metadata = tokio::fs::metadata(local_root).await?;
        if !metadata.is_dir() {
            return Err(AppError::NotADirectory(local_root.display().to_string()));
        }

        let remote_root = self.resolve(remote_root);
        let plan = dir_walker::walk_local_dir(local_root, &remote_root, recursive).await?;
        info!(
            "upload {} -> {}: {} directories, {} files",
            local_root.display(),
            remote_root,
            plan.directories.len(),
            plan.files.len()
        );

        let mut summary = SyncSummary::default();
        for dir in &plan.directories {
            self.make_directories(dir).await?;
            summary.directories += 1;
        }

        for (src, dest, _) in &plan.files {
            let mut file = tokio::fs::File::open(src).await?;
            summary.bytes += self
                .write_stream(&mut file, dest, WriteDisposition::Overwrite, None)
                .await?;
            summary.files += 1;
        }

        info!("upload to {} finished: {:?}", remote_root, summary);
        Ok(summary)
    }

    /// Mirror the remote directory `remote_root` into `local_root`.
    ///
    /// `filter` selects which files are copied; every directory in range is
    /// still created.
    pub async fn download_dir(
        &self,
        remote_root: &str,
        local_root: &Path,
        recursive: bool,
        filter: Option<&EntryFilter>,
    ) -> Result<SyncSummary> {
        let remote_root = self.resolve(remote_root);
        let attrs = self.session.stat(&remote_root, true).await?;
        if !attrs.is_dir() {
            return Err(AppError::NotADirectory(remote_root));
        }

        let plan: DirectoryPlan = dir_walker::walk_remote_dir(
            self.session.as_ref(),
            &remote_root,
            local_root,
            recursive,
            filter,
        )
        .await?;
        info!(
            "download {} -> {}: {} directories, {} files",
            remote_root,
            local_root.display(),
            plan.directories.len(),
            plan.files.len()
        );

        let mut summary = SyncSummary::default();
        for dir in &plan.directories {
            tokio::fs::create_dir_all(dir).await?;
            summary.directories += 1;
        }

        let request = self.transfer_request();
        for (src, dest, _) in &plan.files {
            let mut file = tokio::fs::File::create(dest).await?;
            summary.bytes += self.download_to(src, &mut file, &request).await?;
            summary.files += 1;
        }

        info!("download from {} finished: {:?}", remote_root, summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::executor::tests::executor;

    fn local_tree() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "hi").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("b.txt"), "yo").unwrap();
        tmp
    }

    #[tokio::test]
    async fn test_upload_dir() {
        let tmp = local_tree();
        let (session, exec) = executor().await;

        let summary = exec.upload_dir("/data", tmp.path(), true).await.unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.bytes, 4);
        assert!(session.is_dir("/data/sub"));
        assert_eq!(session.file_contents("/data/a.txt").unwrap(), b"hi");
        assert_eq!(session.file_contents("/data/sub/b.txt").unwrap(), b"yo");

        // Idempotent
        let before = session.paths();
        exec.upload_dir("/data", tmp.path(), true).await.unwrap();
        assert_eq!(session.paths(), before);
        assert_eq!(session.file_contents("/data/sub/b.txt").unwrap(), b"yo");
    }

    #[tokio::test]
    async fn test_upload_dir_flat() {
        let tmp = local_tree();
        let (session, exec) = executor().await;

        let summary = exec.upload_dir("/flat", tmp.path(), false).await.unwrap();
        assert_eq!(summary.files, 1);
        assert!(session.file_contents("/flat/a.txt").is_some());
        assert!(!session.is_dir("/flat/sub"));
    }

    #[tokio::test]
    async fn test_upload_dir_creates_directories_before_files() {
        let tmp = tempfile::tempdir().unwrap();
        let deep = tmp.path().join("l1").join("l2").join("l3");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("leaf.txt"), "leaf").unwrap();
        fs::write(tmp.path().join("top.txt"), "top").unwrap();

        let (session, exec) = executor().await;
        session.clear_calls();
        exec.upload_dir("/dst", tmp.path(), true).await.unwrap();

        let calls = session.calls();
        let last_mkdir = calls.iter().rposition(|c| c.starts_with("mkdir")).unwrap();
        let first_write = calls.iter().position(|c| c.starts_with("open_write")).unwrap();
        assert!(last_mkdir < first_write);

        let mkdirs: Vec<&String> = calls.iter().filter(|c| c.starts_with("mkdir")).collect();
        assert_eq!(
            mkdirs,
            vec![
                "mkdir /dst",
                "mkdir /dst/l1",
                "mkdir /dst/l1/l2",
                "mkdir /dst/l1/l2/l3"
            ]
        );
        assert_eq!(
            session.file_contents("/dst/l1/l2/l3/leaf.txt").unwrap(),
            b"leaf"
        );
    }

    #[tokio::test]
    async fn test_upload_dir_onto_file_fails() {
        let tmp = local_tree();
        let (session, exec) = executor().await;
        session.put_file("/data", "not a dir");
        let err = exec.upload_dir("/data", tmp.path(), true).await.unwrap_err();
        assert!(matches!(err, AppError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_download_dir() {
        let (session, exec) = executor().await;
        session.put_file("/srv/a.txt", "hi");
        session.put_file("/srv/notes.md", "md");
        session.put_file("/srv/sub/b.txt", "yo");
        session.put_dir("/srv/empty");

        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("mirror");
        let summary = exec.download_dir("/srv", &out, true, None).await.unwrap();
        assert_eq!(summary.files, 3);
        assert_eq!(fs::read_to_string(out.join("a.txt")).unwrap(), "hi");
        assert_eq!(fs::read_to_string(out.join("sub/b.txt")).unwrap(), "yo");
        assert!(out.join("empty").is_dir());

        // Twice is the same as once
        let again = exec.download_dir("/srv", &out, true, None).await.unwrap();
        assert_eq!(again, summary);
    }

    #[tokio::test]
    async fn test_download_dir_filtered() {
        let (session, exec) = executor().await;
        session.put_file("/srv/a.txt", "hi");
        session.put_file("/srv/notes.md", "md");
        session.put_file("/srv/sub/b.txt", "yo");

        let tmp = tempfile::tempdir().unwrap();
        let filter = EntryFilter::suffix(".txt");
        let summary = exec
            .download_dir("/srv", tmp.path(), true, Some(&filter))
            .await
            .unwrap();
        assert_eq!(summary.files, 2);
        assert!(!tmp.path().join("notes.md").exists());
        assert!(tmp.path().join("sub/b.txt").exists());
    }

    #[tokio::test]
    async fn test_download_dir_source_errors() {
        let (session, exec) = executor().await;
        let tmp = tempfile::tempdir().unwrap();

        let err = exec
            .download_dir("/absent", tmp.path(), true, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        session.put_file("/plain", "x");
        let err = exec
            .download_dir("/plain", tmp.path(), true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotADirectory(_)));
    }
}
