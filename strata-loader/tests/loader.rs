use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use strata_hash::Algorithm;
use strata_loader::{
    Checksums, ContentLoader, DirectoryLoader, ErrorSink, Extractor, FetcherContext,
    FileDownloader, ListerIdentity, Loader, LoaderConfig, LoaderCore, LoaderError,
    MetadataFetcherRegistry, OriginMetadataFetcher,
};
use strata_model::{
    AuthorityKind, Content, Directory, LoadStatus, MetadataAuthority, MetadataFetcher, ObjectId,
    Origin, OriginVisit, OriginVisitStatus, RawExtrinsicMetadata, SkippedContent, Snapshot,
    TargetType, VisitStatus,
};
use strata_nar::NarSerializer;
use strata_storage::{MemoryStorage, Storage, StorageError};
use tempfile::TempDir;

fn sums(algorithm: Algorithm, data: &[u8]) -> Checksums {
    BTreeMap::from([(algorithm, algorithm.digest(data))])
}

fn core(storage: Arc<MemoryStorage>, origin: &str, visit_type: &str) -> LoaderCore {
    LoaderCore::builder(storage, origin, visit_type)
        .build()
        .unwrap()
}

fn fixture_file(dir: &TempDir, name: &str, data: &[u8]) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    format!("file://{}", path.display())
}

fn content_loader(
    storage: Arc<MemoryStorage>,
    origin: &str,
    urls: Vec<String>,
    checksums: Checksums,
    layout: &str,
) -> ContentLoader {
    let mut urls = urls;
    let primary = urls.remove(0);
    ContentLoader::new(
        core(storage, origin, "content"),
        primary,
        urls,
        checksums,
        layout,
        Box::new(FileDownloader::new()),
    )
    .unwrap()
}

#[test_log::test]
fn content_load_is_eventful_then_uneventful() {
    let dir = tempfile::tempdir().unwrap();
    let url = fixture_file(&dir, "artifact.txt", b"hello world\n");
    let origin = url.clone();
    let storage = Arc::new(MemoryStorage::new());
    let checksums = sums(Algorithm::Sha256, b"hello world\n");

    let mut loader = content_loader(
        storage.clone(),
        &origin,
        vec![url.clone()],
        checksums.clone(),
        "standard",
    );
    let first = loader.load().unwrap();
    assert_eq!(first.status, LoadStatus::Eventful);
    let snapshot_id = first.snapshot_id.unwrap();

    let latest = storage
        .origin_visit_status_get_latest(&origin)
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, VisitStatus::Full);
    assert_eq!(latest.snapshot, Some(snapshot_id));
    assert_eq!(latest.visit_type, "content");

    // the snapshot has a single HEAD branch pointing at the content
    let snapshot = storage.snapshot_get(snapshot_id).unwrap().unwrap();
    let head = &snapshot.branches()[b"HEAD".as_slice()];
    assert_eq!(head.target_type, TargetType::Content);
    let expected_content = Content::from_bytes(&b"hello world\n"[..]);
    assert_eq!(head.target, expected_content.id().as_bytes());
    assert!(storage.content_get(expected_content.id()).is_some());

    let mut again = content_loader(storage.clone(), &origin, vec![url], checksums, "standard");
    let second = again.load().unwrap();
    assert_eq!(second.status, LoadStatus::Uneventful);
    assert_eq!(second.snapshot_id, Some(snapshot_id));
}

#[test_log::test]
fn mirror_fallback_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let good = fixture_file(&dir, "artifact.txt", b"payload");
    let missing = format!("file://{}", dir.path().join("gone").display());
    let storage = Arc::new(MemoryStorage::new());

    let mut loader = content_loader(
        storage.clone(),
        "https://example.org/artifact",
        vec![missing, good],
        sums(Algorithm::Sha256, b"payload"),
        "standard",
    );
    let result = loader.load().unwrap();
    assert_eq!(result.status, LoadStatus::Eventful);
    let latest = storage
        .origin_visit_status_get_latest("https://example.org/artifact")
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, VisitStatus::Full);
}

#[test_log::test]
fn mirror_exhaustion_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let missing_a = format!("file://{}", dir.path().join("a").display());
    let missing_b = format!("file://{}", dir.path().join("b").display());
    let storage = Arc::new(MemoryStorage::new());

    let mut loader = content_loader(
        storage.clone(),
        "https://example.org/gone",
        vec![missing_a, missing_b],
        sums(Algorithm::Sha256, b"whatever"),
        "standard",
    );
    let result = loader.load().unwrap();
    assert_eq!(result.status, LoadStatus::Uneventful);
    assert_eq!(result.snapshot_id, None);

    let latest = storage
        .origin_visit_status_get_latest("https://example.org/gone")
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, VisitStatus::NotFound);
    assert_eq!(latest.snapshot, None);
}

#[test_log::test]
fn checksum_mismatch_fails_the_visit() {
    let dir = tempfile::tempdir().unwrap();
    let url = fixture_file(&dir, "artifact.txt", b"actual bytes");
    let storage = Arc::new(MemoryStorage::new());

    let mut loader = content_loader(
        storage.clone(),
        &url,
        vec![url.clone()],
        sums(Algorithm::Sha256, b"expected other bytes"),
        "standard",
    );
    let result = loader.load().unwrap();
    assert_eq!(result.status, LoadStatus::Failed);
    assert_eq!(result.snapshot_id, None);

    let latest = storage.origin_visit_status_get_latest(&url).unwrap().unwrap();
    assert_eq!(latest.status, VisitStatus::Failed);
    assert_eq!(latest.snapshot, None);
}

#[test]
fn nar_layout_verifies_structural_digest() {
    let dir = tempfile::tempdir().unwrap();
    let url = fixture_file(&dir, "artifact.txt", b"nar me\n");
    let artifact = dir.path().join("artifact.txt");
    let digests = NarSerializer::new(&[Algorithm::Sha256])
        .serialize(&artifact)
        .unwrap();
    let expected = *digests.get(Algorithm::Sha256).unwrap();

    let storage = Arc::new(MemoryStorage::new());
    let mut loader = content_loader(
        storage.clone(),
        &url,
        vec![url.clone()],
        BTreeMap::from([(Algorithm::Sha256, expected)]),
        "nar",
    );
    assert_eq!(loader.load().unwrap().status, LoadStatus::Eventful);

    // same artifact, corrupted expectation
    let wrong = Algorithm::Sha256.digest(b"not the nar encoding");
    let mut loader = content_loader(
        storage.clone(),
        "https://example.org/wrong-nar",
        vec![url],
        BTreeMap::from([(Algorithm::Sha256, wrong)]),
        "nar",
    );
    assert_eq!(loader.load().unwrap().status, LoadStatus::Failed);
}

#[test]
fn unsupported_checksum_layout_is_rejected_at_construction() {
    let storage = Arc::new(MemoryStorage::new());
    let err = ContentLoader::new(
        core(storage, "https://example.org/x", "content"),
        "file:///x",
        Vec::new(),
        Checksums::new(),
        "sha1-tree",
        Box::new(FileDownloader::new()),
    )
    .err();
    assert!(matches!(
        err,
        Some(LoaderError::UnsupportedChecksumLayout(_))
    ));
}

#[test]
fn oversize_content_is_skipped_but_visit_completes() {
    let dir = tempfile::tempdir().unwrap();
    let payload = vec![b'x'; 4096];
    let url = fixture_file(&dir, "big.bin", &payload);
    let storage = Arc::new(MemoryStorage::new());

    let config: LoaderConfig = toml::from_str("max_content_size = 16").unwrap();
    let core = LoaderCore::builder(storage.clone(), url.as_str(), "content")
        .config(config)
        .build()
        .unwrap();
    let mut loader = ContentLoader::new(
        core,
        url.clone(),
        Vec::new(),
        sums(Algorithm::Sha256, &payload),
        "standard",
        Box::new(FileDownloader::new()),
    )
    .unwrap();

    let result = loader.load().unwrap();
    assert_eq!(result.status, LoadStatus::Eventful);
    let latest = storage.origin_visit_status_get_latest(&url).unwrap().unwrap();
    assert_eq!(latest.status, VisitStatus::Full);
    // the data itself was not archived
    let full = Content::from_bytes(payload);
    assert!(storage.content_get(full.id()).is_none());
}

fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    for entry in src.read_dir()? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir(&target)?;
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Stands in for archive decompression: ignores the archive and
/// materializes a fixed source tree.
struct TreeExtractor {
    source: PathBuf,
}

impl Extractor for TreeExtractor {
    fn extract(&self, _archive: &Path, dest: &Path) -> io::Result<()> {
        copy_tree(&self.source, dest)
    }
}

#[test_log::test]
fn directory_load_archives_the_tree() {
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("hello.txt"), "hello world\n").unwrap();
    std::fs::create_dir(source.path().join("sub")).unwrap();
    std::fs::write(source.path().join("sub/e"), "").unwrap();

    let archive_dir = tempfile::tempdir().unwrap();
    let url = fixture_file(&archive_dir, "tree.tar", b"opaque archive bytes");

    let storage = Arc::new(MemoryStorage::new());
    let mut loader = DirectoryLoader::new(
        core(storage.clone(), &url, "directory"),
        url.clone(),
        Vec::new(),
        sums(Algorithm::Sha256, b"opaque archive bytes"),
        "standard",
        Box::new(FileDownloader::new()),
        Box::new(TreeExtractor {
            source: source.path().to_path_buf(),
        }),
    )
    .unwrap();

    let result = loader.load().unwrap();
    assert_eq!(result.status, LoadStatus::Eventful);

    let snapshot = storage
        .snapshot_get(result.snapshot_id.unwrap())
        .unwrap()
        .unwrap();
    let head = &snapshot.branches()[b"HEAD".as_slice()];
    assert_eq!(head.target_type, TargetType::Directory);
    // fixed tree, fixed root id
    let root = ObjectId::from_hex("67903d24f5f2eb5bccf678da54c6ff338a274468").unwrap();
    assert_eq!(head.target, root.as_bytes());
    assert!(storage.directory_get(root).is_some());
}

#[test]
fn directory_nar_layout_checks_the_extracted_tree() {
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("a.txt"), "contents\n").unwrap();

    let digests = NarSerializer::new(&[Algorithm::Sha256])
        .serialize(source.path())
        .unwrap();
    let expected = *digests.get(Algorithm::Sha256).unwrap();

    let archive_dir = tempfile::tempdir().unwrap();
    let url = fixture_file(&archive_dir, "tree.tar", b"archive");
    let storage = Arc::new(MemoryStorage::new());

    let mut loader = DirectoryLoader::new(
        core(storage.clone(), &url, "directory"),
        url.clone(),
        Vec::new(),
        BTreeMap::from([(Algorithm::Sha256, expected)]),
        "nar",
        Box::new(FileDownloader::new()),
        Box::new(TreeExtractor {
            source: source.path().to_path_buf(),
        }),
    )
    .unwrap();
    assert_eq!(loader.load().unwrap().status, LoadStatus::Eventful);
}

#[derive(Default)]
struct CollectingSink(Mutex<Vec<String>>);

impl ErrorSink for CollectingSink {
    fn capture(&self, origin: &str, error: &LoaderError) {
        self.0.lock().unwrap().push(format!("{origin}: {error}"));
    }
}

struct FlakyFetcher;

impl OriginMetadataFetcher for FlakyFetcher {
    fn name(&self) -> &str {
        "flaky"
    }

    fn get_origin_metadata(&self) -> Result<Vec<RawExtrinsicMetadata>, LoaderError> {
        Err(LoaderError::NotFound("metadata api down".into()))
    }
}

#[test_log::test]
fn metadata_fetcher_errors_do_not_affect_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let url = fixture_file(&dir, "artifact.txt", b"data");
    let storage = Arc::new(MemoryStorage::new());
    let sink = Arc::new(CollectingSink::default());

    let mut registry = MetadataFetcherRegistry::new();
    registry.register(
        "forge-lister",
        Box::new(|_ctx: &FetcherContext| {
            Ok(Box::new(FlakyFetcher) as Box<dyn OriginMetadataFetcher>)
        }),
    );

    let core = LoaderCore::builder(storage.clone(), url.as_str(), "content")
        .lister(ListerIdentity::new("forge-lister", "main").unwrap())
        .metadata_registry(Arc::new(registry))
        .error_sink(sink.clone())
        .build()
        .unwrap();
    let mut loader = ContentLoader::new(
        core,
        url.clone(),
        Vec::new(),
        sums(Algorithm::Sha256, b"data"),
        "standard",
        Box::new(FileDownloader::new()),
    )
    .unwrap();

    let result = loader.load().unwrap();
    assert_eq!(result.status, LoadStatus::Eventful);
    let captured = sink.0.lock().unwrap();
    assert!(captured.iter().any(|e| e.contains("metadata api down")));
}

struct AnsweringFetcher {
    origin: Origin,
}

impl OriginMetadataFetcher for AnsweringFetcher {
    fn name(&self) -> &str {
        "answering"
    }

    fn get_origin_metadata(&self) -> Result<Vec<RawExtrinsicMetadata>, LoaderError> {
        Ok(vec![RawExtrinsicMetadata {
            target: self.origin.url.clone(),
            discovery_date: std::time::SystemTime::now(),
            authority: MetadataAuthority {
                kind: AuthorityKind::Forge,
                url: "https://forge.example.org".into(),
            },
            fetcher: MetadataFetcher {
                name: "answering".into(),
                version: "1.0".into(),
            },
            format: "application/json".into(),
            metadata: b"{}".as_slice().into(),
        }])
    }

    fn get_parent_origins(&self) -> Result<Vec<Origin>, LoaderError> {
        Ok(vec![Origin::new("https://example.org/upstream")])
    }
}

#[test]
fn metadata_and_parent_origins_are_collected() {
    let dir = tempfile::tempdir().unwrap();
    let url = fixture_file(&dir, "artifact.txt", b"data");
    let storage = Arc::new(MemoryStorage::new());

    let mut registry = MetadataFetcherRegistry::new();
    registry.register(
        "forge-lister",
        Box::new(|ctx: &FetcherContext| {
            Ok(Box::new(AnsweringFetcher {
                origin: ctx.origin.clone(),
            }) as Box<dyn OriginMetadataFetcher>)
        }),
    );

    let core = LoaderCore::builder(storage.clone(), url.as_str(), "content")
        .lister(ListerIdentity::new("forge-lister", "main").unwrap())
        .metadata_registry(Arc::new(registry))
        .build()
        .unwrap();
    let mut loader = ContentLoader::new(
        core,
        url.clone(),
        Vec::new(),
        sums(Algorithm::Sha256, b"data"),
        "standard",
        Box::new(FileDownloader::new()),
    )
    .unwrap();
    loader.load().unwrap();

    assert_eq!(storage.raw_extrinsic_metadata_for(&url).len(), 1);
    assert_eq!(storage.metadata_authorities().len(), 1);
    assert_eq!(
        loader.core().parent_origins(),
        Some(&[Origin::new("https://example.org/upstream")][..])
    );
}

#[test]
fn empty_lister_name_is_rejected() {
    assert!(matches!(
        ListerIdentity::new("", "main"),
        Err(LoaderError::InvalidLister(_))
    ));
}

/// Delegates to an inner [`MemoryStorage`] while counting flushes.
struct CountingStorage {
    inner: Arc<MemoryStorage>,
    flushes: AtomicUsize,
}

impl CountingStorage {
    fn new(inner: Arc<MemoryStorage>) -> CountingStorage {
        CountingStorage {
            inner,
            flushes: AtomicUsize::new(0),
        }
    }
}

impl Storage for CountingStorage {
    fn origin_add(&self, origins: &[Origin]) -> strata_storage::Result<()> {
        self.inner.origin_add(origins)
    }
    fn origin_visit_add(
        &self,
        visits: Vec<OriginVisit>,
    ) -> strata_storage::Result<Vec<OriginVisit>> {
        self.inner.origin_visit_add(visits)
    }
    fn origin_visit_status_add(
        &self,
        statuses: &[OriginVisitStatus],
    ) -> strata_storage::Result<()> {
        self.inner.origin_visit_status_add(statuses)
    }
    fn content_add(&self, contents: &[Content]) -> strata_storage::Result<()> {
        self.inner.content_add(contents)
    }
    fn skipped_content_add(&self, contents: &[SkippedContent]) -> strata_storage::Result<()> {
        self.inner.skipped_content_add(contents)
    }
    fn directory_add(&self, directories: &[Directory]) -> strata_storage::Result<()> {
        self.inner.directory_add(directories)
    }
    fn snapshot_add(&self, snapshots: &[Snapshot]) -> strata_storage::Result<()> {
        self.inner.snapshot_add(snapshots)
    }
    fn metadata_authority_add(
        &self,
        authorities: &[MetadataAuthority],
    ) -> strata_storage::Result<()> {
        self.inner.metadata_authority_add(authorities)
    }
    fn metadata_fetcher_add(&self, fetchers: &[MetadataFetcher]) -> strata_storage::Result<()> {
        self.inner.metadata_fetcher_add(fetchers)
    }
    fn raw_extrinsic_metadata_add(
        &self,
        metadata: &[RawExtrinsicMetadata],
    ) -> strata_storage::Result<()> {
        self.inner.raw_extrinsic_metadata_add(metadata)
    }
    fn origin_visit_status_get_latest(
        &self,
        origin: &str,
    ) -> strata_storage::Result<Option<OriginVisitStatus>> {
        self.inner.origin_visit_status_get_latest(origin)
    }
    fn snapshot_get(&self, id: ObjectId) -> strata_storage::Result<Option<Snapshot>> {
        self.inner.snapshot_get(id)
    }
    fn flush(&self) -> strata_storage::Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        self.inner.flush()
    }
}

/// A loader whose hooks are scripted by the test.
struct ScriptedLoader {
    core: LoaderCore,
    interrupt_in_fetch: bool,
    store_error: bool,
    record_snapshot_before_error: bool,
    fail_success_post_load: bool,
    post_load_calls: Vec<bool>,
    cleanups: usize,
}

impl ScriptedLoader {
    fn new(core: LoaderCore) -> ScriptedLoader {
        ScriptedLoader {
            core,
            interrupt_in_fetch: false,
            store_error: false,
            record_snapshot_before_error: false,
            fail_success_post_load: false,
            post_load_calls: Vec::new(),
            cleanups: 0,
        }
    }
}

impl Loader for ScriptedLoader {
    fn core(&self) -> &LoaderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LoaderCore {
        &mut self.core
    }

    fn prepare(&mut self) -> Result<(), LoaderError> {
        Ok(())
    }

    fn fetch_data(&mut self) -> Result<bool, LoaderError> {
        if self.interrupt_in_fetch {
            return Err(LoaderError::Interrupted);
        }
        Ok(false)
    }

    fn store_data(&mut self) -> Result<(), LoaderError> {
        if self.record_snapshot_before_error {
            let snapshot = Snapshot::empty();
            self.core.storage().snapshot_add(&[snapshot.clone()])?;
            self.core.set_loaded_snapshot_id(snapshot.id());
        }
        if self.store_error {
            return Err(StorageError::Backend("disk on fire".into()).into());
        }
        Ok(())
    }

    fn post_load(&mut self, success: bool) -> Result<(), LoaderError> {
        self.post_load_calls.push(success);
        if success && self.fail_success_post_load {
            return Err(LoaderError::PostLoad("notification endpoint down".into()));
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), LoaderError> {
        self.cleanups += 1;
        Ok(())
    }
}

fn scripted(storage: Arc<dyn Storage>, origin: &str) -> ScriptedLoader {
    ScriptedLoader::new(
        LoaderCore::builder(storage, origin, "test")
            .build()
            .unwrap(),
    )
}

#[test_log::test]
fn failure_after_snapshot_is_partial() {
    let storage = Arc::new(MemoryStorage::new());
    let mut loader = scripted(storage.clone(), "https://example.org/partial");
    loader.store_error = true;
    loader.record_snapshot_before_error = true;

    let result = loader.load().unwrap();
    assert_eq!(result.status, LoadStatus::Failed);

    let latest = storage
        .origin_visit_status_get_latest("https://example.org/partial")
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, VisitStatus::Partial);
    assert_eq!(latest.snapshot, Some(Snapshot::empty().id()));
}

#[test_log::test]
fn failure_without_snapshot_is_failed() {
    let storage = Arc::new(MemoryStorage::new());
    let mut loader = scripted(storage.clone(), "https://example.org/broken");
    loader.store_error = true;

    let result = loader.load().unwrap();
    assert_eq!(result.status, LoadStatus::Failed);
    let latest = storage
        .origin_visit_status_get_latest("https://example.org/broken")
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, VisitStatus::Failed);
}

#[test_log::test]
fn post_load_error_downgrades_a_successful_load() {
    let storage = Arc::new(MemoryStorage::new());
    let mut loader = scripted(storage.clone(), "https://example.org/hooked");
    loader.fail_success_post_load = true;

    let result = loader.load().unwrap();
    assert_eq!(result.status, LoadStatus::Failed);
    // called once with success, then again on the failure path
    assert_eq!(loader.post_load_calls, vec![true, false]);

    let latest = storage
        .origin_visit_status_get_latest("https://example.org/hooked")
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, VisitStatus::Failed);
}

#[test]
fn flush_and_cleanup_run_exactly_once_on_success_and_failure() {
    for store_error in [false, true] {
        let inner = Arc::new(MemoryStorage::new());
        let counting = Arc::new(CountingStorage::new(inner));
        let mut loader = scripted(counting.clone(), "https://example.org/x");
        loader.store_error = store_error;

        loader.load().unwrap();
        assert_eq!(counting.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(loader.cleanups, 1);
    }
}

#[test_log::test]
fn interrupt_propagates_after_flush_and_cleanup() {
    let inner = Arc::new(MemoryStorage::new());
    let counting = Arc::new(CountingStorage::new(inner.clone()));
    let mut loader = scripted(counting.clone(), "https://example.org/stopme");
    loader.interrupt_in_fetch = true;

    let err = loader.load().unwrap_err();
    assert!(err.is_interrupt());
    // no terminal status was written, but flush and cleanup still ran
    assert!(
        inner
            .origin_visit_status_get_latest("https://example.org/stopme")
            .unwrap()
            .is_none()
    );
    assert_eq!(counting.flushes.load(Ordering::SeqCst), 1);
    assert_eq!(loader.cleanups, 1);
}
