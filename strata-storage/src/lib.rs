//! Storage collaborator contract for loaders.
//!
//! The archive's persistence layer is an external system; loaders talk
//! to it exclusively through the [`Storage`] trait, in batches, and
//! expect idempotence when content-addressed objects are re-added.
//! [`MemoryStorage`] is the in-process implementation used by tests
//! and local runs.

mod error;
mod memory;

use strata_model::{
    Content, Directory, MetadataAuthority, MetadataFetcher, ObjectId, Origin, OriginVisit,
    OriginVisitStatus, RawExtrinsicMetadata, SkippedContent, Snapshot,
};

pub use error::StorageError;
pub use memory::MemoryStorage;

pub type Result<T> = std::result::Result<T, StorageError>;

/// The storage collaborator.
///
/// All methods accept batches (possibly of size 1) and must be
/// idempotent when identical content-addressed objects are re-added.
/// `origin_visit_add` is the only method that mutates its input
/// semantically: it assigns monotonically increasing visit numbers per
/// origin and returns the completed records.
pub trait Storage: Send + Sync {
    fn origin_add(&self, origins: &[Origin]) -> Result<()>;

    fn origin_visit_add(&self, visits: Vec<OriginVisit>) -> Result<Vec<OriginVisit>>;

    fn origin_visit_status_add(&self, statuses: &[OriginVisitStatus]) -> Result<()>;

    fn content_add(&self, contents: &[Content]) -> Result<()>;

    fn skipped_content_add(&self, contents: &[SkippedContent]) -> Result<()>;

    fn directory_add(&self, directories: &[Directory]) -> Result<()>;

    fn snapshot_add(&self, snapshots: &[Snapshot]) -> Result<()>;

    fn metadata_authority_add(&self, authorities: &[MetadataAuthority]) -> Result<()>;

    fn metadata_fetcher_add(&self, fetchers: &[MetadataFetcher]) -> Result<()>;

    fn raw_extrinsic_metadata_add(&self, metadata: &[RawExtrinsicMetadata]) -> Result<()>;

    /// Latest visit status recorded for `origin`, by visit number then
    /// record date.
    fn origin_visit_status_get_latest(&self, origin: &str) -> Result<Option<OriginVisitStatus>>;

    fn snapshot_get(&self, id: ObjectId) -> Result<Option<Snapshot>>;

    /// Flushes any buffered writes. A no-op for unbuffered backends.
    fn flush(&self) -> Result<()>;
}
