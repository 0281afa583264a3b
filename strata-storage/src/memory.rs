use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use strata_model::{
    Content, Directory, MetadataAuthority, MetadataFetcher, ObjectId, Origin, OriginVisit,
    OriginVisitStatus, RawExtrinsicMetadata, SkippedContent, Snapshot,
};
use tracing::debug;

use crate::{Result, Storage, StorageError};

#[derive(Default)]
struct Inner {
    origins: BTreeSet<String>,
    visits: BTreeMap<(String, u64), OriginVisit>,
    visit_statuses: Vec<OriginVisitStatus>,
    contents: BTreeMap<ObjectId, Content>,
    skipped_contents: BTreeMap<ObjectId, SkippedContent>,
    directories: BTreeMap<ObjectId, Directory>,
    snapshots: BTreeMap<ObjectId, Snapshot>,
    authorities: BTreeSet<MetadataAuthority>,
    fetchers: BTreeSet<MetadataFetcher>,
    raw_metadata: Vec<RawExtrinsicMetadata>,
}

/// In-memory storage, the reference backend for tests and local runs.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // a poisoned lock only means another thread panicked mid-write;
        // the data is still usable for an append-only store
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn origin_exists(&self, url: &str) -> bool {
        self.inner().origins.contains(url)
    }

    pub fn content_get(&self, id: ObjectId) -> Option<Content> {
        self.inner().contents.get(&id).cloned()
    }

    pub fn directory_get(&self, id: ObjectId) -> Option<Directory> {
        self.inner().directories.get(&id).cloned()
    }

    /// Every status recorded for `origin`, in insertion order.
    pub fn visit_statuses(&self, origin: &str) -> Vec<OriginVisitStatus> {
        self.inner()
            .visit_statuses
            .iter()
            .filter(|s| s.origin == origin)
            .cloned()
            .collect()
    }

    pub fn raw_extrinsic_metadata_for(&self, target: &str) -> Vec<RawExtrinsicMetadata> {
        self.inner()
            .raw_metadata
            .iter()
            .filter(|m| m.target == target)
            .cloned()
            .collect()
    }

    pub fn metadata_authorities(&self) -> Vec<MetadataAuthority> {
        self.inner().authorities.iter().cloned().collect()
    }
}

impl Storage for MemoryStorage {
    fn origin_add(&self, origins: &[Origin]) -> Result<()> {
        let mut inner = self.inner();
        for origin in origins {
            inner.origins.insert(origin.url.clone());
        }
        Ok(())
    }

    fn origin_visit_add(&self, visits: Vec<OriginVisit>) -> Result<Vec<OriginVisit>> {
        let mut inner = self.inner();
        let mut out = Vec::with_capacity(visits.len());
        for mut visit in visits {
            if !inner.origins.contains(&visit.origin) {
                return Err(StorageError::UnknownOrigin(visit.origin));
            }
            let next = inner
                .visits
                .range((visit.origin.clone(), 0)..=(visit.origin.clone(), u64::MAX))
                .next_back()
                .map(|((_, n), _)| n + 1)
                .unwrap_or(1);
            visit.visit = Some(next);
            debug!(origin = %visit.origin, visit = next, "visit created");
            inner
                .visits
                .insert((visit.origin.clone(), next), visit.clone());
            out.push(visit);
        }
        Ok(out)
    }

    fn origin_visit_status_add(&self, statuses: &[OriginVisitStatus]) -> Result<()> {
        let mut inner = self.inner();
        for status in statuses {
            if !inner
                .visits
                .contains_key(&(status.origin.clone(), status.visit))
            {
                return Err(StorageError::UnknownVisit {
                    origin: status.origin.clone(),
                    visit: status.visit,
                });
            }
            inner.visit_statuses.push(status.clone());
        }
        Ok(())
    }

    fn content_add(&self, contents: &[Content]) -> Result<()> {
        let mut inner = self.inner();
        for content in contents {
            inner.contents.insert(content.id(), content.clone());
        }
        Ok(())
    }

    fn skipped_content_add(&self, contents: &[SkippedContent]) -> Result<()> {
        let mut inner = self.inner();
        for content in contents {
            inner
                .skipped_contents
                .insert(content.sha1_git, content.clone());
        }
        Ok(())
    }

    fn directory_add(&self, directories: &[Directory]) -> Result<()> {
        let mut inner = self.inner();
        for directory in directories {
            inner.directories.insert(directory.id(), directory.clone());
        }
        Ok(())
    }

    fn snapshot_add(&self, snapshots: &[Snapshot]) -> Result<()> {
        let mut inner = self.inner();
        for snapshot in snapshots {
            inner.snapshots.insert(snapshot.id(), snapshot.clone());
        }
        Ok(())
    }

    fn metadata_authority_add(&self, authorities: &[MetadataAuthority]) -> Result<()> {
        let mut inner = self.inner();
        for authority in authorities {
            inner.authorities.insert(authority.clone());
        }
        Ok(())
    }

    fn metadata_fetcher_add(&self, fetchers: &[MetadataFetcher]) -> Result<()> {
        let mut inner = self.inner();
        for fetcher in fetchers {
            inner.fetchers.insert(fetcher.clone());
        }
        Ok(())
    }

    fn raw_extrinsic_metadata_add(&self, metadata: &[RawExtrinsicMetadata]) -> Result<()> {
        let mut inner = self.inner();
        inner.raw_metadata.extend_from_slice(metadata);
        Ok(())
    }

    fn origin_visit_status_get_latest(&self, origin: &str) -> Result<Option<OriginVisitStatus>> {
        let inner = self.inner();
        Ok(inner
            .visit_statuses
            .iter()
            .filter(|s| s.origin == origin)
            .max_by_key(|s| (s.visit, s.date))
            .cloned())
    }

    fn snapshot_get(&self, id: ObjectId) -> Result<Option<Snapshot>> {
        Ok(self.inner().snapshots.get(&id).cloned())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
