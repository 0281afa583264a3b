use std::time::SystemTime;

use bytes::Bytes;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Who vouches for a piece of extrinsic metadata.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetadataAuthority {
    pub kind: AuthorityKind,
    pub url: String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityKind {
    #[display("forge")]
    Forge,
    #[display("registry")]
    Registry,
    #[display("deposit_client")]
    DepositClient,
}

/// The tool that produced a piece of extrinsic metadata.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetadataFetcher {
    pub name: String,
    pub version: String,
}

/// Provenance metadata about an origin, obtained from a third-party
/// authority rather than from the artifact itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExtrinsicMetadata {
    /// Origin URL this metadata is about.
    pub target: String,
    pub discovery_date: SystemTime,
    pub authority: MetadataAuthority,
    pub fetcher: MetadataFetcher,
    /// Format identifier for the payload (e.g. a media type).
    pub format: String,
    #[serde(skip, default)]
    pub metadata: Bytes,
}
