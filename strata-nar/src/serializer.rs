use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use strata_hash::{Algorithm, Hash, MultiContext};
use thiserror::Error;
use tracing::trace;

const NAR_MAGIC: &[u8] = b"nix-archive-1";
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum NarError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported file type at {0} (not a regular file, symlink or directory)")]
    UnsupportedFileType(PathBuf),

    #[error("file {path} changed size during serialization (expected {expected}, read {actual})")]
    SizeChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

/// Version-control systems whose working-copy directories can be
/// excluded from serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsKind {
    Git,
    Mercurial,
    Subversion,
}

impl VcsKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            VcsKind::Git => ".git",
            VcsKind::Mercurial => ".hg",
            VcsKind::Subversion => ".svn",
        }
    }
}

/// Which entry names to skip at the first level of the serialized
/// root. Exclusion never applies below the first level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VcsExclusion {
    /// Serialize everything.
    #[default]
    None,
    /// Skip `.git`, `.hg` and `.svn`.
    All,
    /// Skip only the named VCS's directory.
    Only(VcsKind),
}

impl VcsExclusion {
    fn excludes(&self, name: &[u8]) -> bool {
        match self {
            VcsExclusion::None => false,
            VcsExclusion::All => matches!(name, b".git" | b".hg" | b".svn"),
            VcsExclusion::Only(kind) => name == kind.dir_name().as_bytes(),
        }
    }
}

/// Digests of one NAR encoding, keyed by algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarDigests(BTreeMap<Algorithm, Hash>);

impl NarDigests {
    pub fn get(&self, algorithm: Algorithm) -> Option<&Hash> {
        self.0.get(&algorithm)
    }

    pub fn hex(&self, algorithm: Algorithm) -> Option<String> {
        self.0.get(&algorithm).map(Hash::to_hex)
    }

    pub fn base32(&self, algorithm: Algorithm) -> Option<String> {
        self.0.get(&algorithm).map(Hash::to_base32)
    }

    pub fn base64(&self, algorithm: Algorithm) -> Option<String> {
        self.0.get(&algorithm).map(Hash::to_base64)
    }

    /// All digests as lowercase hex, keyed by algorithm.
    pub fn hex_digests(&self) -> BTreeMap<Algorithm, String> {
        self.0.iter().map(|(a, h)| (*a, h.to_hex())).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Algorithm, &Hash)> {
        self.0.iter().map(|(a, h)| (*a, h))
    }
}

/// One-shot NAR serializer and hasher.
///
/// A fresh instance serializes exactly one root path; `serialize`
/// consumes it and returns the accumulated digests.
#[derive(Debug)]
pub struct NarSerializer {
    multi: MultiContext,
    exclusion: VcsExclusion,
}

impl NarSerializer {
    pub fn new(algorithms: &[Algorithm]) -> NarSerializer {
        NarSerializer {
            multi: MultiContext::new(algorithms),
            exclusion: VcsExclusion::None,
        }
    }

    pub fn with_exclusion(mut self, exclusion: VcsExclusion) -> NarSerializer {
        self.exclusion = exclusion;
        self
    }

    /// Serializes `root` (file, symlink or directory), feeding every
    /// encoded token to all digest contexts, and returns the digests.
    pub fn serialize(mut self, root: &Path) -> Result<NarDigests, NarError> {
        self.write_token(NAR_MAGIC);
        self.serialize_node(root, true)?;
        Ok(NarDigests(self.multi.finish()))
    }

    /// Encodes one token: u64-LE length, bytes, zero padding to the
    /// next multiple of 8.
    fn write_token(&mut self, bytes: &[u8]) {
        self.multi.update((bytes.len() as u64).to_le_bytes());
        self.multi.update(bytes);
        self.write_padding(bytes.len() as u64);
    }

    fn write_padding(&mut self, length: u64) {
        let m = (length % 8) as usize;
        if m != 0 {
            self.multi.update(&[0u8; 8][..8 - m]);
        }
    }

    /// Encodes a file's contents token by streaming fixed-size chunks.
    fn write_file_contents(&mut self, path: &Path, length: u64) -> Result<(), NarError> {
        self.multi.update(length.to_le_bytes());

        let mut file = File::open(path).map_err(|source| NarError::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut buf = [0u8; CHUNK_SIZE];
        let mut read_total: u64 = 0;
        loop {
            let n = file.read(&mut buf).map_err(|source| NarError::Io {
                path: path.to_owned(),
                source,
            })?;
            if n == 0 {
                break;
            }
            read_total += n as u64;
            self.multi.update(&buf[..n]);
        }
        // the length prefix was already hashed; a file mutating under
        // us would silently corrupt the encoding
        if read_total != length {
            return Err(NarError::SizeChanged {
                path: path.to_owned(),
                expected: length,
                actual: read_total,
            });
        }

        self.write_padding(length);
        Ok(())
    }

    fn serialize_node(&mut self, path: &Path, first_level: bool) -> Result<(), NarError> {
        trace!(path = %path.display(), "serializing node");
        let metadata = path.symlink_metadata().map_err(|source| NarError::Io {
            path: path.to_owned(),
            source,
        })?;
        let file_type = metadata.file_type();

        self.write_token(b"(");

        if file_type.is_file() {
            self.write_token(b"type");
            self.write_token(b"regular");
            if metadata.permissions().mode() & 0o111 != 0 {
                self.write_token(b"executable");
                self.write_token(b"");
            }
            self.write_token(b"contents");
            self.write_file_contents(path, metadata.len())?;
        } else if file_type.is_symlink() {
            self.write_token(b"type");
            self.write_token(b"symlink");
            self.write_token(b"target");
            let target = path.read_link().map_err(|source| NarError::Io {
                path: path.to_owned(),
                source,
            })?;
            self.write_token(target.as_os_str().as_bytes());
        } else if file_type.is_dir() {
            self.write_token(b"type");
            self.write_token(b"directory");
            self.serialize_entries(path, first_level)?;
        } else {
            return Err(NarError::UnsupportedFileType(path.to_owned()));
        }

        self.write_token(b")");
        Ok(())
    }

    fn serialize_entries(&mut self, path: &Path, first_level: bool) -> Result<(), NarError> {
        let mut children: Vec<PathBuf> = Vec::new();
        for entry in path.read_dir().map_err(|source| NarError::Io {
            path: path.to_owned(),
            source,
        })? {
            let entry = entry.map_err(|source| NarError::Io {
                path: path.to_owned(),
                source,
            })?;
            children.push(entry.path());
        }
        children.sort_by(|a, b| {
            a.file_name()
                .map(OsStrExt::as_bytes)
                .cmp(&b.file_name().map(OsStrExt::as_bytes))
        });

        for child in children {
            let name = child
                .file_name()
                .map(|n| n.as_bytes().to_vec())
                .unwrap_or_default();
            if first_level && self.exclusion.excludes(&name) {
                trace!(path = %child.display(), "excluding VCS entry");
                continue;
            }
            self.write_token(b"entry");
            self.write_token(b"(");
            self.write_token(b"name");
            self.write_token(&name);
            self.write_token(b"node");
            self.serialize_node(&child, false)?;
            self.write_token(b")");
        }
        Ok(())
    }
}
