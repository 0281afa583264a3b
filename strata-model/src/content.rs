use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strata_hash::{Algorithm, Hash, MultiContext};

use crate::id::{ObjectId, git_object_id};

/// A content-addressed blob, held in memory for the duration of a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub sha1: Hash,
    pub sha1_git: ObjectId,
    pub sha256: Hash,
    pub length: u64,
    #[serde(skip, default)]
    pub data: Bytes,
}

impl Content {
    /// Builds a content object from raw bytes, computing every hash in
    /// one pass.
    pub fn from_bytes(data: impl Into<Bytes>) -> Content {
        let data = data.into();
        let mut multi = MultiContext::new(&[Algorithm::Sha1, Algorithm::Sha256]);
        multi.update(&data);
        let digests = multi.finish();
        Content {
            sha1: digests[&Algorithm::Sha1],
            sha1_git: git_object_id("blob", &data),
            sha256: digests[&Algorithm::Sha256],
            length: data.len() as u64,
            data,
        }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.sha1_git
    }
}

/// A content whose data was deliberately not archived (e.g. over the
/// size limit). The identity is still recorded so directory entries
/// referencing it stay resolvable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedContent {
    pub sha1_git: ObjectId,
    pub length: u64,
    pub reason: String,
}

impl SkippedContent {
    pub fn too_large(sha1_git: ObjectId, length: u64, max_content_size: u64) -> SkippedContent {
        SkippedContent {
            sha1_git,
            length,
            reason: format!("Content too large ({length} > {max_content_size})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hashes() {
        let content = Content::from_bytes(&b"hello world\n"[..]);
        assert_eq!(content.length, 12);
        assert_eq!(
            content.sha1_git.to_hex(),
            "3b18e512dba79e4c8300dd08aeb37f8e728b8dad"
        );
        assert_eq!(content.sha1, Algorithm::Sha1.digest(b"hello world\n"));
        assert_eq!(content.sha256, Algorithm::Sha256.digest(b"hello world\n"));
    }
}
