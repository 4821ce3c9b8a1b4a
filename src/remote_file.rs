//! Remote file metadata snapshots.

use chrono::{DateTime, Utc};

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFREG: u32 = 0o100_000;
const S_IFLNK: u32 = 0o120_000;

/// Raw attributes as reported by a session backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pub size: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Full `st_mode`, file type bits included.
    pub permissions: Option<u32>,
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
}

impl Attributes {
    pub fn is_dir(&self) -> bool {
        self.file_type_bits() == Some(S_IFDIR)
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type_bits() == Some(S_IFLNK)
    }

    pub fn is_regular(&self) -> bool {
        self.file_type_bits() == Some(S_IFREG)
    }

    fn file_type_bits(&self) -> Option<u32> {
        self.permissions.map(|mode| mode & S_IFMT)
    }
}

/// A set of attribute changes to push to the remote side. Unset fields are
/// left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrChanges {
    pub permissions: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
}

impl AttrChanges {
    /// Permission bits only (`0o755`), the file type is never changed.
    pub fn permissions(mut self, mode: u32) -> Self {
        self.permissions = Some(mode & 0o7777);
        self
    }

    pub fn owner(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn group(mut self, gid: u32) -> Self {
        self.gid = Some(gid);
        self
    }

    pub fn access_time(mut self, atime: u32) -> Self {
        self.atime = Some(atime);
        self
    }

    pub fn modify_time(mut self, mtime: u32) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the changes on top of an attribute snapshot.
    pub fn apply_to(&self, attrs: &mut Attributes) {
        if let Some(mode) = self.permissions {
            let file_type = attrs.permissions.unwrap_or(0) & S_IFMT;
            attrs.permissions = Some(file_type | mode);
        }
        if let Some(uid) = self.uid {
            attrs.uid = Some(uid);
        }
        if let Some(gid) = self.gid {
            attrs.gid = Some(gid);
        }
        if let Some(atime) = self.atime {
            attrs.atime = Some(atime);
        }
        if let Some(mtime) = self.mtime {
            attrs.mtime = Some(mtime);
        }
    }
}

/// Immutable metadata snapshot of one remote path.
///
/// Mutations go through [`crate::Executor::set_attributes`]; a snapshot is
/// never updated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    path: String,
    attrs: Attributes,
}

impl RemoteFile {
    pub fn new(path: impl Into<String>, attrs: Attributes) -> Self {
        Self {
            path: path.into(),
            attrs,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> String {
        crate::path::file_name(&self.path).unwrap_or_else(|| self.path.clone())
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    /// Byte size. Only defined for regular files and symlinks.
    pub fn size(&self) -> Option<u64> {
        if self.is_directory() {
            None
        } else {
            self.attrs.size
        }
    }

    pub fn uid(&self) -> Option<u32> {
        self.attrs.uid
    }

    pub fn gid(&self) -> Option<u32> {
        self.attrs.gid
    }

    pub fn access_time(&self) -> Option<DateTime<Utc>> {
        self.attrs
            .atime
            .and_then(|t| DateTime::from_timestamp(i64::from(t), 0))
    }

    pub fn modify_time(&self) -> Option<DateTime<Utc>> {
        self.attrs
            .mtime
            .and_then(|t| DateTime::from_timestamp(i64::from(t), 0))
    }

    /// Permission bits as a raw mode, e.g. `0o755`.
    pub fn mode(&self) -> u32 {
        self.attrs.permissions.unwrap_or(0) & 0o7777
    }

    /// Permission bits written out as octal digits read in decimal, e.g. `755`
    /// or `4755` with setuid.
    pub fn permission(&self) -> u32 {
        format!("{:o}", self.mode()).parse().unwrap_or(0)
    }

    /// `ls -l` style permission string, e.g. `drwxr-xr-x`.
    pub fn permission_string(&self) -> String {
        let mode = self.attrs.permissions.unwrap_or(0);
        let kind = match mode & S_IFMT {
            S_IFDIR => 'd',
            S_IFLNK => 'l',
            _ => '-',
        };

        let mut out = String::with_capacity(10);
        out.push(kind);
        for shift in [6u32, 3, 0] {
            let bits = (mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }

    pub fn is_directory(&self) -> bool {
        self.permission_string().starts_with('d')
    }

    pub fn is_link_file(&self) -> bool {
        self.permission_string().starts_with('l')
    }

    pub fn is_regular_file(&self) -> bool {
        self.permission_string().starts_with('-')
    }
}
