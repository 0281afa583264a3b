use std::time::SystemTime;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::ObjectId;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ModelError {
    #[error("a not_found visit status cannot reference snapshot {0}")]
    NotFoundWithSnapshot(ObjectId),
}

/// The stable identity of a thing being archived: a URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub url: String,
}

impl Origin {
    pub fn new(url: impl Into<String>) -> Origin {
        Origin { url: url.into() }
    }
}

/// One timestamped attempt to load an origin.
///
/// The visit number is assigned by the storage collaborator; it is
/// `None` until `origin_visit_add` returns the completed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginVisit {
    pub origin: String,
    pub visit: Option<u64>,
    pub date: SystemTime,
    pub visit_type: String,
}

/// Stored terminal (or intermediate) state of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    #[display("full")]
    Full,
    #[display("partial")]
    Partial,
    #[display("not_found")]
    NotFound,
    #[display("failed")]
    Failed,
}

/// Append-only record of a visit's outcome. Consumers read the latest
/// record per visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginVisitStatus {
    pub origin: String,
    pub visit: u64,
    pub date: SystemTime,
    pub status: VisitStatus,
    pub snapshot: Option<ObjectId>,
    pub visit_type: String,
}

impl OriginVisitStatus {
    /// Validating constructor: a `not_found` status never references a
    /// snapshot.
    pub fn new(
        origin: impl Into<String>,
        visit: u64,
        date: SystemTime,
        status: VisitStatus,
        snapshot: Option<ObjectId>,
        visit_type: impl Into<String>,
    ) -> Result<OriginVisitStatus, ModelError> {
        if status == VisitStatus::NotFound {
            if let Some(snapshot) = snapshot {
                return Err(ModelError::NotFoundWithSnapshot(snapshot));
            }
        }
        Ok(OriginVisitStatus {
            origin: origin.into(),
            visit,
            date,
            status,
            snapshot,
            visit_type: visit_type.into(),
        })
    }
}

/// Task-level outcome of a load, as reported back to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    #[display("eventful")]
    Eventful,
    #[display("uneventful")]
    Uneventful,
    #[display("failed")]
    Failed,
}

/// What `load()` returns to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResult {
    pub status: LoadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<ObjectId>,
}

impl LoadResult {
    pub fn new(status: LoadStatus, snapshot_id: Option<ObjectId>) -> LoadResult {
        LoadResult {
            status,
            snapshot_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_rejects_snapshot() {
        let id = ObjectId::from_hex("3b18e512dba79e4c8300dd08aeb37f8e728b8dad").unwrap();
        let err = OriginVisitStatus::new(
            "https://example.org/repo",
            1,
            SystemTime::now(),
            VisitStatus::NotFound,
            Some(id),
            "content",
        )
        .unwrap_err();
        assert_eq!(err, ModelError::NotFoundWithSnapshot(id));
    }

    #[test]
    fn status_display() {
        assert_eq!(VisitStatus::NotFound.to_string(), "not_found");
        assert_eq!(VisitStatus::Full.to_string(), "full");
        assert_eq!(LoadStatus::Uneventful.to_string(), "uneventful");
    }
}
