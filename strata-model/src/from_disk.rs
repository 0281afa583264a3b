//! Filesystem to Merkle-tree conversion.
//!
//! Walks a directory tree (or a single file) and produces the
//! content-addressed objects a load hands to storage: contents,
//! skipped contents and directories, plus the root identifier.
//! Deterministic for identical tree content regardless of on-disk
//! ordering.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use strata_hash::{Algorithm, Context};
use thiserror::Error;

use crate::content::{Content, SkippedContent};
use crate::directory::{
    Directory, DirectoryEntry, EntryKind, PERMS_DIRECTORY, PERMS_EXECUTABLE, PERMS_FILE,
    PERMS_SYMLINK,
};
use crate::id::ObjectId;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum FromDiskError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported file type at {0} (not a regular file, symlink or directory)")]
    UnsupportedEntryType(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> FromDiskError + '_ {
    move |source| FromDiskError::Io {
        path: path.to_owned(),
        source,
    }
}

/// A file converted from disk: either a full content or a skipped one.
#[derive(Debug, Clone)]
pub enum FileContent {
    Content(Content),
    Skipped(SkippedContent),
}

impl FileContent {
    pub fn id(&self) -> ObjectId {
        match self {
            FileContent::Content(c) => c.id(),
            FileContent::Skipped(s) => s.sha1_git,
        }
    }

    pub fn length(&self) -> u64 {
        match self {
            FileContent::Content(c) => c.length,
            FileContent::Skipped(s) => s.length,
        }
    }
}

/// Converts one regular file. Files larger than `max_content_size`
/// become [`SkippedContent`]: hashed by streaming, data not retained.
pub fn content_from_disk(
    path: &Path,
    max_content_size: Option<u64>,
) -> Result<FileContent, FromDiskError> {
    let metadata = path.symlink_metadata().map_err(io_err(path))?;
    if !metadata.is_file() {
        return Err(FromDiskError::UnsupportedEntryType(path.to_owned()));
    }
    let length = metadata.len();

    if let Some(max) = max_content_size {
        if length > max {
            let sha1_git = streamed_blob_id(path, length)?;
            tracing::info!(
                path = %path.display(),
                length,
                max_content_size = max,
                "content too large, skipping data"
            );
            return Ok(FileContent::Skipped(SkippedContent::too_large(
                sha1_git, length, max,
            )));
        }
    }

    let data = std::fs::read(path).map_err(io_err(path))?;
    Ok(FileContent::Content(Content::from_bytes(data)))
}

/// Computes the git blob id of a file without holding it in memory.
fn streamed_blob_id(path: &Path, length: u64) -> Result<ObjectId, FromDiskError> {
    let mut ctx = Context::new(Algorithm::Sha1);
    ctx.update(format!("blob {length}\0"));
    let mut file = File::open(path).map_err(io_err(path))?;
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(io_err(path))?;
        if n == 0 {
            break;
        }
        ctx.update(&buf[..n]);
    }
    let hash = ctx.finish();
    Ok(ObjectId::try_from(hash.digest_bytes()).expect("sha1 digest is 20 bytes"))
}

/// All objects produced by converting a directory tree.
#[derive(Debug, Clone)]
pub struct DiskTree {
    pub contents: Vec<Content>,
    pub skipped_contents: Vec<SkippedContent>,
    pub directories: Vec<Directory>,
    pub root: ObjectId,
}

/// Converts a whole directory tree, depth-first, entries in byte order.
pub fn directory_from_disk(
    path: &Path,
    max_content_size: Option<u64>,
) -> Result<DiskTree, FromDiskError> {
    let mut builder = TreeBuilder {
        contents: BTreeMap::new(),
        skipped_contents: BTreeMap::new(),
        directories: BTreeMap::new(),
        max_content_size,
    };
    let root = builder.walk_directory(path)?;
    Ok(DiskTree {
        contents: builder.contents.into_values().collect(),
        skipped_contents: builder.skipped_contents.into_values().collect(),
        directories: builder.directories.into_values().collect(),
        root,
    })
}

struct TreeBuilder {
    // keyed by object id so identical objects collapse
    contents: BTreeMap<ObjectId, Content>,
    skipped_contents: BTreeMap<ObjectId, SkippedContent>,
    directories: BTreeMap<ObjectId, Directory>,
    max_content_size: Option<u64>,
}

impl TreeBuilder {
    fn walk_directory(&mut self, path: &Path) -> Result<ObjectId, FromDiskError> {
        let mut names: Vec<PathBuf> = Vec::new();
        for entry in path.read_dir().map_err(io_err(path))? {
            names.push(entry.map_err(io_err(path))?.path());
        }
        names.sort_by(|a, b| {
            a.file_name()
                .map(OsStrExt::as_bytes)
                .cmp(&b.file_name().map(OsStrExt::as_bytes))
        });

        let mut entries = Vec::with_capacity(names.len());
        for child in names {
            let name = child
                .file_name()
                .map(|n| n.as_bytes().to_vec())
                .unwrap_or_default();
            let metadata = child.symlink_metadata().map_err(io_err(&child))?;
            let file_type = metadata.file_type();

            let entry = if file_type.is_dir() {
                let target = self.walk_directory(&child)?;
                DirectoryEntry {
                    name,
                    kind: EntryKind::Dir,
                    perms: PERMS_DIRECTORY,
                    target,
                }
            } else if file_type.is_symlink() {
                let target_path = child.read_link().map_err(io_err(&child))?;
                let content = Content::from_bytes(target_path.as_os_str().as_bytes().to_vec());
                let target = content.id();
                self.contents.insert(target, content);
                DirectoryEntry {
                    name,
                    kind: EntryKind::File,
                    perms: PERMS_SYMLINK,
                    target,
                }
            } else if file_type.is_file() {
                let perms = if metadata.permissions().mode() & 0o111 != 0 {
                    PERMS_EXECUTABLE
                } else {
                    PERMS_FILE
                };
                let target = match content_from_disk(&child, self.max_content_size)? {
                    FileContent::Content(content) => {
                        let id = content.id();
                        self.contents.insert(id, content);
                        id
                    }
                    FileContent::Skipped(skipped) => {
                        let id = skipped.sha1_git;
                        self.skipped_contents.insert(id, skipped);
                        id
                    }
                };
                DirectoryEntry {
                    name,
                    kind: EntryKind::File,
                    perms,
                    target,
                }
            } else {
                return Err(FromDiskError::UnsupportedEntryType(child));
            };
            entries.push(entry);
        }

        let directory = Directory::new(entries);
        let id = directory.id();
        self.directories.insert(id, directory);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::symlink;

    use super::*;

    #[test]
    fn tree_id_stable_across_copies() {
        let build = |root: &Path| {
            fs::write(root.join("hello.txt"), "hello world\n").unwrap();
            fs::create_dir(root.join("sub")).unwrap();
            fs::write(root.join("sub/e"), "").unwrap();
        };

        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        build(dir_a.path());
        build(dir_b.path());

        let tree_a = directory_from_disk(dir_a.path(), None).unwrap();
        let tree_b = directory_from_disk(dir_b.path(), None).unwrap();
        assert_eq!(tree_a.root, tree_b.root);
        // precomputed with git hash-object semantics
        assert_eq!(
            tree_a.root.to_hex(),
            "67903d24f5f2eb5bccf678da54c6ff338a274468"
        );
        assert_eq!(tree_a.contents.len(), 2);
        assert_eq!(tree_a.directories.len(), 2);
        assert!(tree_a.skipped_contents.is_empty());
    }

    #[test]
    fn max_content_size_produces_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big"), vec![b'x'; 1024]).unwrap();
        fs::write(dir.path().join("small"), b"ok").unwrap();

        let tree = directory_from_disk(dir.path(), Some(16)).unwrap();
        assert_eq!(tree.contents.len(), 1);
        assert_eq!(tree.skipped_contents.len(), 1);
        assert_eq!(tree.skipped_contents[0].length, 1024);
        // the skipped id still matches the full blob hash
        let full = Content::from_bytes(vec![b'x'; 1024]);
        assert_eq!(tree.skipped_contents[0].sha1_git, full.id());
    }

    #[test]
    fn symlink_is_archived_as_target_bytes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("target"), b"data").unwrap();
        symlink("target", dir.path().join("link")).unwrap();

        let tree = directory_from_disk(dir.path(), None).unwrap();
        let link_content = Content::from_bytes(&b"target"[..]);
        assert!(tree.contents.iter().any(|c| c.id() == link_content.id()));
    }
}
