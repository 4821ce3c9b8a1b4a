use std::collections::VecDeque;

use super::Executor;
use crate::error::Result;
use crate::filesystem::RemoteSession;
use crate::filter::EntryFilter;
use crate::path;
use crate::remote_file::RemoteFile;

#[derive(Clone, Copy)]
struct Selection {
    files: bool,
    dirs: bool,
    recursive: bool,
}

impl<S: RemoteSession> Executor<S> {
    /// Direct children of `p`, directories first, then by name.
    pub async fn list(&self, p: &str) -> Result<Vec<RemoteFile>> {
        let dir = self.resolve(p);
        let mut entries: Vec<RemoteFile> = self
            .session
            .list(&dir)
            .await?
            .into_iter()
            .map(|entry| RemoteFile::new(path::resolve(&dir, &entry.name), entry.attrs))
            .collect();

        entries.sort_by(|a, b| match (a.is_directory(), b.is_directory()) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name().cmp(&b.name()),
        });
        Ok(entries)
    }

    /// Files under `p`, optionally with directories and descending into
    /// subdirectories. Results come in breadth-first order.
    pub async fn list_files(
        &self,
        p: &str,
        recursive: bool,
        include_dirs: bool,
    ) -> Result<Vec<RemoteFile>> {
        let selection = Selection {
            files: true,
            dirs: include_dirs,
            recursive,
        };
        self.walk(p, selection, None).await
    }

    /// Directories under `p`.
    pub async fn list_dirs(&self, p: &str, recursive: bool) -> Result<Vec<RemoteFile>> {
        let selection = Selection {
            files: false,
            dirs: true,
            recursive,
        };
        self.walk(p, selection, None).await
    }

    /// Like [`Executor::list_files`], keeping only entries accepted by
    /// `filter`. Traversal is never pruned by the filter.
    pub async fn list_files_filtered(
        &self,
        p: &str,
        filter: &EntryFilter,
        recursive: bool,
        include_dirs: bool,
    ) -> Result<Vec<RemoteFile>> {
        let selection = Selection {
            files: true,
            dirs: include_dirs,
            recursive,
        };
        self.walk(p, selection, Some(filter)).await
    }

    async fn walk(
        &self,
        p: &str,
        selection: Selection,
        filter: Option<&EntryFilter>,
    ) -> Result<Vec<RemoteFile>> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([self.resolve(p)]);

        while let Some(dir) = queue.pop_front() {
            for entry in self.list(&dir).await? {
                // Links are reported, never descended into
                let is_dir = entry.is_directory();
                if is_dir && selection.recursive {
                    queue.push_back(entry.path().to_string());
                }

                let wanted = if is_dir { selection.dirs } else { selection.files };
                if wanted && filter.is_none_or(|f| f.matches(&entry)) {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::executor;
    use crate::filesystem::MemorySession;

    fn names(files: &[RemoteFile]) -> Vec<&str> {
        files.iter().map(RemoteFile::path).collect()
    }

    fn seed(session: &MemorySession) {
        session.put_file("/w/b.txt", "b");
        session.put_file("/w/a.log", "a");
        session.put_file("/w/sub/c.txt", "c");
        session.put_file("/w/sub/deeper/d.txt", "d");
    }

    #[tokio::test]
    async fn test_list_orders_directories_first() {
        let (session, exec) = executor().await;
        seed(&session);
        let entries = exec.list("/w").await.unwrap();
        assert_eq!(names(&entries), vec!["/w/sub", "/w/a.log", "/w/b.txt"]);
    }

    #[tokio::test]
    async fn test_list_files() {
        let (session, exec) = executor().await;
        seed(&session);

        let flat = exec.list_files("/w", false, false).await.unwrap();
        assert_eq!(names(&flat), vec!["/w/a.log", "/w/b.txt"]);

        let all = exec.list_files("/w", true, false).await.unwrap();
        assert_eq!(
            names(&all),
            vec!["/w/a.log", "/w/b.txt", "/w/sub/c.txt", "/w/sub/deeper/d.txt"]
        );

        let with_dirs = exec.list_files("/w", true, true).await.unwrap();
        assert_eq!(with_dirs.len(), 6);
    }

    #[tokio::test]
    async fn test_list_dirs() {
        let (session, exec) = executor().await;
        seed(&session);
        let dirs = exec.list_dirs("/w", true).await.unwrap();
        assert_eq!(names(&dirs), vec!["/w/sub", "/w/sub/deeper"]);
        let top = exec.list_dirs("/w", false).await.unwrap();
        assert_eq!(names(&top), vec!["/w/sub"]);
    }

    #[tokio::test]
    async fn test_filtered_listing_still_descends() {
        let (session, exec) = executor().await;
        seed(&session);

        let txt = EntryFilter::suffix(".txt");
        let found = exec.list_files_filtered("/w", &txt, true, false).await.unwrap();
        assert_eq!(
            names(&found),
            vec!["/w/b.txt", "/w/sub/c.txt", "/w/sub/deeper/d.txt"]
        );

        let re = EntryFilter::regex(r"^[ad]\.").unwrap();
        let found = exec.list_files_filtered("/w", &re, true, false).await.unwrap();
        assert_eq!(names(&found), vec!["/w/a.log", "/w/sub/deeper/d.txt"]);

        let small = EntryFilter::predicate(|f| f.size() == Some(1));
        assert_eq!(
            exec.list_files_filtered("/w", &small, true, false)
                .await
                .unwrap()
                .len(),
            4
        );
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let (_session, exec) = executor().await;
        let err = exec.list_files("/none", true, false).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
