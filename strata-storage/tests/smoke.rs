use std::time::{Duration, SystemTime};

use strata_model::{
    Content, Origin, OriginVisit, OriginVisitStatus, Snapshot, SnapshotBranch, VisitStatus,
};
use strata_storage::{MemoryStorage, Storage, StorageError};

fn visit(origin: &str) -> OriginVisit {
    OriginVisit {
        origin: origin.to_string(),
        visit: None,
        date: SystemTime::now(),
        visit_type: "tar".to_string(),
    }
}

#[test]
fn visit_numbers_are_monotonic_per_origin() {
    let storage = MemoryStorage::new();
    storage
        .origin_add(&[Origin::new("https://example.org/a"), Origin::new("https://example.org/b")])
        .unwrap();

    let added = storage
        .origin_visit_add(vec![visit("https://example.org/a"), visit("https://example.org/a")])
        .unwrap();
    assert_eq!(added[0].visit, Some(1));
    assert_eq!(added[1].visit, Some(2));

    let other = storage
        .origin_visit_add(vec![visit("https://example.org/b")])
        .unwrap();
    assert_eq!(other[0].visit, Some(1));
}

#[test]
fn visit_for_unknown_origin_is_rejected() {
    let storage = MemoryStorage::new();
    let err = storage
        .origin_visit_add(vec![visit("https://example.org/nowhere")])
        .unwrap_err();
    assert!(matches!(err, StorageError::UnknownOrigin(_)));
}

#[test]
fn status_for_unknown_visit_is_rejected() {
    let storage = MemoryStorage::new();
    storage.origin_add(&[Origin::new("https://example.org/a")]).unwrap();
    let status = OriginVisitStatus::new(
        "https://example.org/a",
        7,
        SystemTime::now(),
        VisitStatus::Full,
        None,
        "tar",
    )
    .unwrap();
    let err = storage.origin_visit_status_add(&[status]).unwrap_err();
    assert!(matches!(err, StorageError::UnknownVisit { visit: 7, .. }));
}

#[test]
fn latest_status_orders_by_visit_then_date() {
    let storage = MemoryStorage::new();
    let origin = "https://example.org/a";
    storage.origin_add(&[Origin::new(origin)]).unwrap();
    storage
        .origin_visit_add(vec![visit(origin), visit(origin)])
        .unwrap();

    let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    let t1 = t0 + Duration::from_secs(60);
    let partial =
        OriginVisitStatus::new(origin, 2, t0, VisitStatus::Partial, None, "tar").unwrap();
    let full = OriginVisitStatus::new(origin, 2, t1, VisitStatus::Full, None, "tar").unwrap();
    let older = OriginVisitStatus::new(origin, 1, t1, VisitStatus::Failed, None, "tar").unwrap();
    storage
        .origin_visit_status_add(&[older, partial, full])
        .unwrap();

    let latest = storage
        .origin_visit_status_get_latest(origin)
        .unwrap()
        .unwrap();
    assert_eq!(latest.visit, 2);
    assert_eq!(latest.status, VisitStatus::Full);

    assert!(storage
        .origin_visit_status_get_latest("https://example.org/other")
        .unwrap()
        .is_none());
}

#[test]
fn content_readds_are_idempotent() {
    let storage = MemoryStorage::new();
    let content = Content::from_bytes(&b"hello world\n"[..]);
    storage.content_add(&[content.clone()]).unwrap();
    storage.content_add(&[content.clone()]).unwrap();
    assert_eq!(storage.content_get(content.id()), Some(content));
}

#[test]
fn snapshots_are_retrievable_by_id() {
    let storage = MemoryStorage::new();
    let mut branches = std::collections::BTreeMap::new();
    branches.insert(
        b"HEAD".to_vec(),
        SnapshotBranch::alias(b"refs/heads/main".to_vec()),
    );
    let snapshot = Snapshot::new(branches);
    storage.snapshot_add(&[snapshot.clone()]).unwrap();
    assert_eq!(storage.snapshot_get(snapshot.id()).unwrap(), Some(snapshot));
    assert_eq!(
        storage.snapshot_get(Snapshot::empty().id()).unwrap(),
        None
    );
}
