//! Listing filters.

use std::fmt;
use std::sync::Arc;

use grep_matcher::Matcher;
use grep_regex::RegexMatcher;

use crate::error::{AppError, Result};
use crate::remote_file::RemoteFile;

/// Predicate applied to listed entries. Name-based variants look at the
/// entry's file name only, never the full path.
#[derive(Clone)]
pub enum EntryFilter {
    Suffix(String),
    Contains(String),
    Regex(RegexMatcher),
    Predicate(Arc<dyn Fn(&RemoteFile) -> bool + Send + Sync>),
}

impl EntryFilter {
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Self::Suffix(suffix.into())
    }

    pub fn contains(needle: impl Into<String>) -> Self {
        Self::Contains(needle.into())
    }

    /// Unanchored regular expression over the file name.
    pub fn regex(pattern: &str) -> Result<Self> {
        let matcher = RegexMatcher::new(pattern)
            .map_err(|e| AppError::ValidationError(format!("Invalid pattern '{pattern}': {e}")))?;
        Ok(Self::Regex(matcher))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&RemoteFile) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn matches(&self, file: &RemoteFile) -> bool {
        match self {
            Self::Suffix(suffix) => file.name().ends_with(suffix.as_str()),
            Self::Contains(needle) => file.name().contains(needle.as_str()),
            Self::Regex(matcher) => matcher.is_match(file.name().as_bytes()).unwrap_or(false),
            Self::Predicate(f) => f(file),
        }
    }
}

impl fmt::Debug for EntryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suffix(s) => f.debug_tuple("Suffix").field(s).finish(),
            Self::Contains(s) => f.debug_tuple("Contains").field(s).finish(),
            Self::Regex(_) => f.write_str("Regex(..)"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_file::Attributes;

    fn file(path: &str, size: u64) -> RemoteFile {
        RemoteFile::new(
            path,
            Attributes {
                size: Some(size),
                permissions: Some(0o100_644),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_name_filters() {
        let f = file("/logs/app.log", 10);
        assert!(EntryFilter::suffix(".log").matches(&f));
        assert!(!EntryFilter::suffix(".txt").matches(&f));
        assert!(EntryFilter::contains("app").matches(&f));
        // Only the name is considered, not the directory
        assert!(!EntryFilter::contains("logs").matches(&f));
    }

    #[test]
    fn test_regex_filter() {
        let f = file("/data/report-2024.csv", 1);
        assert!(EntryFilter::regex(r"^report-\d{4}\.csv$").unwrap().matches(&f));
        assert!(!EntryFilter::regex(r"^\d+$").unwrap().matches(&f));
        assert!(EntryFilter::regex("(unclosed").is_err());
    }

    #[test]
    fn test_predicate_filter() {
        let big = EntryFilter::predicate(|f| f.size().unwrap_or(0) > 100);
        assert!(big.matches(&file("/a", 1000)));
        assert!(!big.matches(&file("/b", 10)));
    }
}
