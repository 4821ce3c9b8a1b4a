//! Remote path handling.
//!
//! Remote paths are always `/`-separated strings, independent of the local
//! platform. Nothing in here touches the network.

/// Normalize a remote path: collapse repeated separators, drop `.` segments,
/// fold `..` into its predecessor and strip any trailing slash.
///
/// `..` above the root of an absolute path stays at the root; leading `..`
/// segments of a relative path are preserved.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Join `fragment` onto `base` and normalize. An absolute fragment replaces
/// the base entirely.
pub fn resolve(base: &str, fragment: &str) -> String {
    if fragment.starts_with('/') || base.is_empty() {
        normalize(fragment)
    } else {
        normalize(&format!("{base}/{fragment}"))
    }
}

pub fn parent(path: &str) -> Option<String> {
    let path = normalize(path);
    // Root has no parent
    if path == "/" || path == "." {
        return None;
    }

    match path.rsplit_once('/') {
        Some(("", _)) => Some("/".to_string()),
        Some((parent, _)) => Some(parent.to_string()),
        None => Some(".".to_string()),
    }
}

/// Last segment of the path, `None` for the root.
pub fn file_name(path: &str) -> Option<String> {
    let path = normalize(path);
    if path == "/" || path == "." {
        return None;
    }
    path.rsplit('/').next().map(str::to_string)
}

/// Ancestors of `path` in root-to-leaf order, excluding `path` itself.
///
/// `/a/b/c` yields `["/", "/a", "/a/b"]`; the relative `a/b/c` yields
/// `["a", "a/b"]`.
pub fn parent_chain(path: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        if p == "." {
            break;
        }
        current = parent(&p);
        chain.push(p);
    }
    chain.reverse();
    chain
}

/// True when both paths live in the same directory.
pub fn same_parent(a: &str, b: &str) -> bool {
    parent_chain(a).last() == parent_chain(b).last()
}

/// Map `path`, which lives under `from_root`, onto the same relative location
/// under `to_root`. Backslashes are treated as separators so Windows local
/// paths map cleanly onto remote ones.
pub fn rebase(path: &str, from_root: &str, to_root: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    let from_root = normalize(&from_root.replace('\\', "/"));
    let path = normalize(&path);

    let relative = if path == from_root {
        ""
    } else if from_root == "." {
        // normalize() leaves ".." only as leading segments
        if path.starts_with('/') || path == ".." || path.starts_with("../") {
            return None;
        }
        path.as_str()
    } else if from_root == "/" {
        path.strip_prefix('/')?
    } else {
        path.strip_prefix(&from_root)?.strip_prefix('/')?
    };

    if relative.is_empty() {
        Some(normalize(to_root))
    } else {
        Some(resolve(to_root, relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a//b/./c/"), "/a/b/c");
        assert_eq!(normalize("/a/b/../c"), "/a/c");
        assert_eq!(normalize("/../.."), "/");
        assert_eq!(normalize("a/../../b"), "../b");
        assert_eq!(normalize(""), ".");
        assert_eq!(normalize("./"), ".");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve("/home/user", "docs/a.txt"), "/home/user/docs/a.txt");
        assert_eq!(resolve("/home/user", "/etc/hosts"), "/etc/hosts");
        assert_eq!(resolve("/home/user", "../other"), "/home/other");
        assert_eq!(resolve("/", "."), "/");
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a"), Some("/".to_string()));
        assert_eq!(parent("/a/b/"), Some("/a".to_string()));
        assert_eq!(parent("a"), Some(".".to_string()));
        assert_eq!(parent("a/b"), Some("a".to_string()));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/a/b.txt"), Some("b.txt".to_string()));
        assert_eq!(file_name("b.txt"), Some("b.txt".to_string()));
        assert_eq!(file_name("/"), None);
    }

    #[test]
    fn test_parent_chain() {
        assert_eq!(parent_chain("/a/b/c"), vec!["/", "/a", "/a/b"]);
        assert_eq!(parent_chain("/a"), vec!["/"]);
        assert!(parent_chain("/").is_empty());
        assert_eq!(parent_chain("a/b/c"), vec!["a", "a/b"]);
        assert!(parent_chain("a").is_empty());
    }

    #[test]
    fn test_same_parent() {
        assert!(same_parent("/a/x", "/a/y"));
        assert!(same_parent("/a/x", "/a/./y"));
        assert!(!same_parent("/a/x", "/b/x"));
        assert!(!same_parent("/a/x", "/a/sub/x"));
    }

    #[test]
    fn test_rebase() {
        assert_eq!(
            rebase("/tmp/src/sub/b.txt", "/tmp/src", "/data"),
            Some("/data/sub/b.txt".to_string())
        );
        assert_eq!(rebase("/tmp/src", "/tmp/src/", "/data"), Some("/data".to_string()));
        assert_eq!(
            rebase("C:\\work\\src\\a.txt", "C:\\work\\src", "/data"),
            Some("/data/a.txt".to_string())
        );
        assert_eq!(rebase("/tmp/srcx/a", "/tmp/src", "/data"), None);
        assert_eq!(rebase("/a/b", "/", "/data"), Some("/data/a/b".to_string()));
    }

    #[test]
    fn test_rebase_current_dir_root() {
        assert_eq!(rebase("./a.txt", ".", "/data"), Some("/data/a.txt".to_string()));
        assert_eq!(
            rebase("./sub/b.txt", "./", "/data"),
            Some("/data/sub/b.txt".to_string())
        );
        assert_eq!(rebase(".", ".", "/data"), Some("/data".to_string()));
        assert_eq!(rebase("../x", ".", "/data"), None);
        assert_eq!(rebase("/abs/x", ".", "/data"), None);
    }
}
