//! Data model for the Strata archive.
//!
//! Pure types only: content-addressed objects (contents, directories,
//! snapshots), origin/visit bookkeeping records, and extrinsic
//! metadata records, together with the canonical manifest hashing that
//! gives each object its identity. No I/O lives here except the
//! filesystem walk in [`from_disk`].

mod content;
mod directory;
pub mod from_disk;
mod id;
mod metadata;
mod snapshot;
mod visit;

pub use content::{Content, SkippedContent};
pub use directory::{Directory, DirectoryEntry, EntryKind, PERMS_DIRECTORY, PERMS_EXECUTABLE, PERMS_FILE, PERMS_SYMLINK};
pub use id::{FromHexError, ObjectId, git_object_id};
pub use metadata::{AuthorityKind, MetadataAuthority, MetadataFetcher, RawExtrinsicMetadata};
pub use snapshot::{Snapshot, SnapshotBranch, TargetType};
pub use visit::{
    LoadResult, LoadStatus, ModelError, Origin, OriginVisit, OriginVisitStatus, VisitStatus,
};
