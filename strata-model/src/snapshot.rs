use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::id::{ObjectId, git_object_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    #[display("content")]
    Content,
    #[display("directory")]
    Directory,
    #[display("revision")]
    Revision,
    #[display("release")]
    Release,
    #[display("snapshot")]
    Snapshot,
    #[display("alias")]
    Alias,
}

/// One branch of a snapshot: a typed pointer to an archived object, or
/// to another branch for aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBranch {
    /// 20-byte object id for concrete targets, branch-name bytes for
    /// aliases.
    pub target: Vec<u8>,
    pub target_type: TargetType,
}

impl SnapshotBranch {
    pub fn object(target: ObjectId, target_type: TargetType) -> SnapshotBranch {
        SnapshotBranch {
            target: target.as_bytes().to_vec(),
            target_type,
        }
    }

    pub fn alias(branch_name: impl Into<Vec<u8>>) -> SnapshotBranch {
        SnapshotBranch {
            target: branch_name.into(),
            target_type: TargetType::Alias,
        }
    }
}

/// An immutable, content-addressed mapping from branch name to target,
/// capturing the state of an origin at visit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    id: ObjectId,
    branches: BTreeMap<Vec<u8>, SnapshotBranch>,
}

impl Snapshot {
    /// Builds a snapshot, deriving its identity from the canonical
    /// manifest of its branch set.
    pub fn new(branches: BTreeMap<Vec<u8>, SnapshotBranch>) -> Snapshot {
        let mut payload = Vec::new();
        for (name, branch) in &branches {
            payload.extend_from_slice(branch.target_type.to_string().as_bytes());
            payload.push(b' ');
            payload.extend_from_slice(name);
            payload.push(0);
            payload.extend_from_slice(branch.target.len().to_string().as_bytes());
            payload.push(b':');
            payload.extend_from_slice(&branch.target);
        }
        let id = git_object_id("snapshot", &payload);
        Snapshot { id, branches }
    }

    pub fn empty() -> Snapshot {
        Snapshot::new(BTreeMap::new())
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn branches(&self) -> &BTreeMap<Vec<u8>, SnapshotBranch> {
        &self.branches
    }
}
