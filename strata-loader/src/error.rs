use std::io;

use strata_hash::Algorithm;
use strata_nar::NarError;
use strata_storage::StorageError;
use thiserror::Error;

use crate::download::DownloadError;

/// Everything that can go wrong during a load.
///
/// Most variants never escape [`load()`](crate::Loader::load): the
/// state machine converts them into a stored visit status and a
/// returned task status. Only [`LoaderError::Interrupted`] and the
/// origin/visit bookkeeping failures propagate to the caller.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// The origin or artifact does not exist at any candidate location.
    #[error("not found: {0}")]
    NotFound(String),

    /// Structural (NAR-layout) digest verification failed.
    #[error("checksum mismatch on {url}: {algorithm} expected {expected}, got {actual}")]
    Mismatch {
        url: String,
        algorithm: Algorithm,
        expected: String,
        actual: String,
    },

    /// Rejected at loader construction time.
    #[error("unsupported checksum layout {0:?} (expected \"standard\" or \"nar\")")]
    UnsupportedChecksumLayout(String),

    /// Rejected at loader construction time.
    #[error("invalid lister identity: {0}")]
    InvalidLister(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Nar(#[from] NarError),

    #[error(transparent)]
    FromDisk(#[from] strata_model::from_disk::FromDiskError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    /// A process-control signal (interrupt or termination request).
    /// Re-propagated to the host runtime after flush and cleanup.
    #[error("load interrupted")]
    Interrupted,

    /// The success-path `post_load` hook failed, downgrading the load.
    #[error("post-load hook failed: {0}")]
    PostLoad(String),
}

impl LoaderError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> LoaderError {
        LoaderError::Io {
            context: context.into(),
            source,
        }
    }

    /// Maps to stored status `not_found` and task status `uneventful`.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LoaderError::NotFound(_) | LoaderError::Download(DownloadError::NotFound { .. })
        )
    }

    /// Never swallowed; re-raised after the unconditional flush/cleanup.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, LoaderError::Interrupted)
    }
}
