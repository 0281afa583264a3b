//! Download and extraction collaborator contracts.
//!
//! Real HTTP fetching and archive decompression live outside this
//! crate; loaders only depend on these traits. [`FileDownloader`]
//! resolves `file://` and plain-path URLs, which is enough for local
//! runs and tests.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use strata_hash::{Algorithm, Hash, MultiContext};
use thiserror::Error;
use tracing::debug;

/// Caller-supplied expected digests, keyed by algorithm.
pub type Checksums = BTreeMap<Algorithm, Hash>;

#[derive(Error, Debug)]
pub enum DownloadError {
    /// 404-class outcome: the mirror loop moves on to the next URL.
    #[error("{url} not found")]
    NotFound { url: String },

    /// Inline byte-hash verification failed for a standard-layout
    /// download.
    #[error("download of {url} failed verification: {algorithm} expected {expected}, got {actual}")]
    Mismatch {
        url: String,
        algorithm: Algorithm,
        expected: String,
        actual: String,
    },

    #[error("downloading {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: io::Error,
    },
}

/// A successfully fetched artifact.
#[derive(Debug)]
pub struct Downloaded {
    pub path: PathBuf,
    pub length: u64,
}

/// Fetches one URL to a local destination directory, verifying the
/// byte stream against `expected` when given.
pub trait Downloader {
    fn download(
        &self,
        url: &str,
        dest: &Path,
        expected: Option<&Checksums>,
    ) -> Result<Downloaded, DownloadError>;
}

/// Extracts an archive into a destination directory. Format sniffing
/// and decompression are the implementation's concern.
pub trait Extractor {
    fn extract(&self, archive: &Path, dest: &Path) -> io::Result<()>;
}

/// Resolves `file://` URLs and plain filesystem paths, hashing the
/// stream while copying it into place.
#[derive(Debug, Default)]
pub struct FileDownloader;

impl FileDownloader {
    pub fn new() -> FileDownloader {
        FileDownloader
    }

    fn source_path(url: &str) -> &Path {
        Path::new(url.strip_prefix("file://").unwrap_or(url))
    }
}

impl Downloader for FileDownloader {
    fn download(
        &self,
        url: &str,
        dest: &Path,
        expected: Option<&Checksums>,
    ) -> Result<Downloaded, DownloadError> {
        let source = Self::source_path(url);
        if !source.is_file() {
            return Err(DownloadError::NotFound {
                url: url.to_string(),
            });
        }

        let io_err = |source: io::Error| DownloadError::Io {
            url: url.to_string(),
            source,
        };

        let name = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("artifact"));
        let target = dest.join(name);

        let algorithms: Vec<Algorithm> = expected
            .map(|sums| sums.keys().copied().collect())
            .unwrap_or_default();
        let mut multi = MultiContext::new(&algorithms);

        let mut reader = File::open(source).map_err(io_err)?;
        let mut writer = File::create(&target).map_err(io_err)?;
        let mut length = 0u64;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf).map_err(io_err)?;
            if n == 0 {
                break;
            }
            multi.update(&buf[..n]);
            writer.write_all(&buf[..n]).map_err(io_err)?;
            length += n as u64;
        }
        writer.flush().map_err(io_err)?;

        if let Some(expected) = expected {
            let actual = multi.finish();
            for (algorithm, want) in expected {
                // every expected algorithm was fed into the context
                if let Some(got) = actual.get(algorithm) {
                    if got != want {
                        return Err(DownloadError::Mismatch {
                            url: url.to_string(),
                            algorithm: *algorithm,
                            expected: want.to_hex(),
                            actual: got.to_hex(),
                        });
                    }
                }
            }
        }

        debug!(url, length, "downloaded");
        Ok(Downloaded {
            path: target,
            length,
        })
    }
}
