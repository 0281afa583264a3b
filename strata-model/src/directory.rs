use std::cmp::Ordering;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::id::{ObjectId, git_object_id};

/// Git-compatible permission bits for directory entries.
pub const PERMS_FILE: u32 = 0o100644;
pub const PERMS_EXECUTABLE: u32 = 0o100755;
pub const PERMS_SYMLINK: u32 = 0o120000;
pub const PERMS_DIRECTORY: u32 = 0o040000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    #[display("file")]
    File,
    #[display("dir")]
    Dir,
    #[display("rev")]
    Rev,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Raw entry name, no slashes.
    pub name: Vec<u8>,
    pub kind: EntryKind,
    pub perms: u32,
    pub target: ObjectId,
}

impl DirectoryEntry {
    /// Git sorts tree entries as if directory names carried a trailing
    /// slash.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.clone();
        if self.kind == EntryKind::Dir {
            key.push(b'/');
        }
        key
    }
}

/// A content-addressed directory: a sorted list of named entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    id: ObjectId,
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    /// Builds a directory from `entries`, sorting them canonically and
    /// computing the git-tree identifier.
    pub fn new(mut entries: Vec<DirectoryEntry>) -> Directory {
        entries.sort_by(|a, b| match a.sort_key().cmp(&b.sort_key()) {
            Ordering::Equal => a.name.cmp(&b.name),
            other => other,
        });

        let mut payload = Vec::new();
        for entry in &entries {
            payload.extend_from_slice(format!("{:o} ", entry.perms).as_bytes());
            payload.extend_from_slice(&entry.name);
            payload.push(0);
            payload.extend_from_slice(entry.target.as_bytes());
        }
        let id = git_object_id("tree", &payload);

        Directory { id, entries }
    }

    pub fn empty() -> Directory {
        Directory::new(Vec::new())
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }
}
