//! Boolean-returning variants of a few executor operations, for callers
//! that treat every failure as "no". Failures are logged, never raised.

use tracing::warn;

use super::Executor;
use crate::error::Result;
use crate::filesystem::RemoteSession;

pub struct Lenient<'a, S: RemoteSession> {
    executor: &'a Executor<S>,
}

fn swallow<T>(op: &str, p: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} {} failed ({:?}): {}", op, p, e.class(), e);
            None
        }
    }
}

impl<'a, S: RemoteSession> Lenient<'a, S> {
    pub fn new(executor: &'a Executor<S>) -> Self {
        Self { executor }
    }

    /// `false` both when `p` is absent and when the check itself fails.
    pub async fn exists(&self, p: &str) -> bool {
        swallow("exists", p, self.executor.exists(p).await).unwrap_or(false)
    }

    pub async fn remove(&self, p: &str) -> bool {
        swallow("remove", p, self.executor.remove_recursive(p).await).is_some()
    }

    pub async fn make_directories(&self, p: &str) -> bool {
        swallow("mkdirs", p, self.executor.make_directories(p).await).is_some()
    }

    pub async fn touch(&self, p: &str) -> bool {
        swallow("touch", p, self.executor.touch(p).await).is_some()
    }
}
