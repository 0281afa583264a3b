//! Node loaders: ingestion of a single content or a single directory
//! identified by a URL, fallback mirrors, and caller-supplied
//! checksums.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use strata_hash::Algorithm;
use strata_model::from_disk::{DiskTree, FileContent, content_from_disk, directory_from_disk};
use strata_model::{LoadStatus, Snapshot, SnapshotBranch, TargetType, VisitStatus};
use strata_nar::NarSerializer;
use tracing::{debug, warn};

use crate::download::{Checksums, DownloadError, Downloader, Extractor};
use crate::error::LoaderError;
use crate::machine::{Loader, LoaderCore};

/// How the caller-supplied checksums apply to the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumLayout {
    /// Plain digests over the raw downloaded bytes, verified inline
    /// by the downloader.
    Standard,
    /// Structural digests over the NAR encoding of the artifact (the
    /// file itself, or the extracted tree).
    Nar,
}

impl FromStr for ChecksumLayout {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<ChecksumLayout, LoaderError> {
        match s {
            "standard" => Ok(ChecksumLayout::Standard),
            "nar" => Ok(ChecksumLayout::Nar),
            other => Err(LoaderError::UnsupportedChecksumLayout(other.to_string())),
        }
    }
}

/// Runs `attempt` against each URL in order, returning the first
/// success. 404-class outcomes move on silently; verification and I/O
/// errors are collected, and the first one is returned when every
/// mirror is exhausted. If no mirror answered at all, the result is
/// [`LoaderError::NotFound`].
fn fetch_over_mirrors<T>(
    urls: &[String],
    origin: &str,
    mut attempt: impl FnMut(&str) -> Result<T, LoaderError>,
) -> Result<T, LoaderError> {
    let mut first_error: Option<LoaderError> = None;
    for url in urls {
        match attempt(url) {
            Ok(value) => return Ok(value),
            Err(LoaderError::Download(DownloadError::NotFound { url })) => {
                debug!(%url, "mirror has no artifact, trying next");
            }
            Err(err) => {
                warn!(%url, %err, "mirror attempt failed, trying next");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }
    Err(first_error.unwrap_or_else(|| LoaderError::NotFound(origin.to_string())))
}

/// Structural verification: NAR-serialize `path` and compare against
/// every expected digest.
fn verify_nar(path: &Path, expected: &Checksums, url: &str) -> Result<(), LoaderError> {
    let algorithms: Vec<Algorithm> = expected.keys().copied().collect();
    let digests = NarSerializer::new(&algorithms).serialize(path)?;
    for (algorithm, want) in expected {
        if let Some(got) = digests.get(*algorithm) {
            if got != want {
                return Err(LoaderError::Mismatch {
                    url: url.to_string(),
                    algorithm: *algorithm,
                    expected: want.to_hex(),
                    actual: got.to_hex(),
                });
            }
        }
    }
    Ok(())
}

/// Best-effort copy of a fetched artifact into the configured save
/// directory. Failures never abort the load.
fn save_artifact(core: &LoaderCore, artifact: &Path) {
    match core.save_directory() {
        Ok(Some(dir)) => {
            let name = artifact.file_name().unwrap_or_default();
            if let Err(err) = fs::copy(artifact, dir.join(name)) {
                warn!(artifact = %artifact.display(), %err, "saving artifact copy failed");
            }
        }
        Ok(None) => {}
        Err(err) => warn!(%err, "resolving save directory failed"),
    }
}

fn head_snapshot(target: strata_model::ObjectId, target_type: TargetType) -> Snapshot {
    Snapshot::new(BTreeMap::from([(
        b"HEAD".to_vec(),
        SnapshotBranch::object(target, target_type),
    )]))
}

/// Loads a single file.
pub struct ContentLoader {
    core: LoaderCore,
    urls: Vec<String>,
    checksums: Checksums,
    layout: ChecksumLayout,
    downloader: Box<dyn Downloader>,
    last_snapshot: Option<Snapshot>,
    content: Option<FileContent>,
    snapshot: Option<Snapshot>,
}

impl ContentLoader {
    pub fn new(
        core: LoaderCore,
        url: impl Into<String>,
        mirror_urls: Vec<String>,
        checksums: Checksums,
        checksum_layout: &str,
        downloader: Box<dyn Downloader>,
    ) -> Result<ContentLoader, LoaderError> {
        let layout = checksum_layout.parse()?;
        let mut urls = vec![url.into()];
        urls.extend(mirror_urls);
        Ok(ContentLoader {
            core,
            urls,
            checksums,
            layout,
            downloader,
            last_snapshot: None,
            content: None,
            snapshot: None,
        })
    }
}

impl Loader for ContentLoader {
    fn core(&self) -> &LoaderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LoaderCore {
        &mut self.core
    }

    fn prepare(&mut self) -> Result<(), LoaderError> {
        let storage = self.core.storage();
        let latest = storage.origin_visit_status_get_latest(&self.core.origin().url)?;
        if let Some(snapshot_id) = latest.and_then(|status| status.snapshot) {
            self.last_snapshot = storage.snapshot_get(snapshot_id)?;
        }
        Ok(())
    }

    fn fetch_data(&mut self) -> Result<bool, LoaderError> {
        let origin = self.core.origin().url.clone();
        let max = self.core.max_content_size();
        let core = &self.core;
        let downloader = &self.downloader;
        let checksums = &self.checksums;
        let layout = self.layout;

        let content = fetch_over_mirrors(&self.urls, &origin, |url| {
            // scratch space lives for this one attempt
            let scratch = tempfile::tempdir()
                .map_err(|e| LoaderError::io("creating scratch directory", e))?;
            let expected = match layout {
                ChecksumLayout::Standard => Some(checksums),
                ChecksumLayout::Nar => None,
            };
            let downloaded = downloader.download(url, scratch.path(), expected)?;
            if layout == ChecksumLayout::Nar {
                verify_nar(&downloaded.path, checksums, url)?;
            }
            let content = content_from_disk(&downloaded.path, Some(max))?;
            save_artifact(core, &downloaded.path);
            Ok(content)
        })?;
        self.content = Some(content);
        Ok(false)
    }

    fn process_data(&mut self) -> Result<bool, LoaderError> {
        if let Some(content) = &self.content {
            self.snapshot = Some(head_snapshot(content.id(), TargetType::Content));
        }
        Ok(false)
    }

    fn store_data(&mut self) -> Result<(), LoaderError> {
        let storage = self.core.storage().clone();
        match &self.content {
            Some(FileContent::Content(content)) => {
                storage.content_add(std::slice::from_ref(content))?;
            }
            Some(FileContent::Skipped(skipped)) => {
                storage.skipped_content_add(std::slice::from_ref(skipped))?;
            }
            None => {}
        }
        if let Some(snapshot) = &self.snapshot {
            storage.snapshot_add(std::slice::from_ref(snapshot))?;
            self.core.set_loaded_snapshot_id(snapshot.id());
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), LoaderError> {
        Ok(())
    }

    fn visit_status(&self) -> VisitStatus {
        if self.content.is_some() && self.snapshot.is_some() {
            VisitStatus::Full
        } else {
            VisitStatus::Partial
        }
    }

    fn load_status(&self) -> LoadStatus {
        match (&self.snapshot, &self.last_snapshot) {
            (Some(new), Some(old)) if new.id() == old.id() => LoadStatus::Uneventful,
            _ => LoadStatus::Eventful,
        }
    }
}

/// Loads a single directory tree, fetched as an archive and extracted
/// by the [`Extractor`] collaborator.
pub struct DirectoryLoader {
    core: LoaderCore,
    urls: Vec<String>,
    checksums: Checksums,
    layout: ChecksumLayout,
    downloader: Box<dyn Downloader>,
    extractor: Box<dyn Extractor>,
    last_snapshot: Option<Snapshot>,
    tree: Option<DiskTree>,
    snapshot: Option<Snapshot>,
}

impl DirectoryLoader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        core: LoaderCore,
        url: impl Into<String>,
        mirror_urls: Vec<String>,
        checksums: Checksums,
        checksum_layout: &str,
        downloader: Box<dyn Downloader>,
        extractor: Box<dyn Extractor>,
    ) -> Result<DirectoryLoader, LoaderError> {
        let layout = checksum_layout.parse()?;
        let mut urls = vec![url.into()];
        urls.extend(mirror_urls);
        Ok(DirectoryLoader {
            core,
            urls,
            checksums,
            layout,
            downloader,
            extractor,
            last_snapshot: None,
            tree: None,
            snapshot: None,
        })
    }
}

impl Loader for DirectoryLoader {
    fn core(&self) -> &LoaderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LoaderCore {
        &mut self.core
    }

    fn prepare(&mut self) -> Result<(), LoaderError> {
        let storage = self.core.storage();
        let latest = storage.origin_visit_status_get_latest(&self.core.origin().url)?;
        if let Some(snapshot_id) = latest.and_then(|status| status.snapshot) {
            self.last_snapshot = storage.snapshot_get(snapshot_id)?;
        }
        Ok(())
    }

    fn fetch_data(&mut self) -> Result<bool, LoaderError> {
        let origin = self.core.origin().url.clone();
        let max = self.core.max_content_size();
        let core = &self.core;
        let downloader = &self.downloader;
        let extractor = &self.extractor;
        let checksums = &self.checksums;
        let layout = self.layout;

        let tree = fetch_over_mirrors(&self.urls, &origin, |url| {
            let scratch = tempfile::tempdir()
                .map_err(|e| LoaderError::io("creating scratch directory", e))?;
            let expected = match layout {
                // standard digests cover the archive bytes themselves
                ChecksumLayout::Standard => Some(checksums),
                ChecksumLayout::Nar => None,
            };
            let downloaded = downloader.download(url, scratch.path(), expected)?;

            let extracted = scratch.path().join("extracted");
            fs::create_dir(&extracted)
                .map_err(|e| LoaderError::io("creating extraction directory", e))?;
            extractor
                .extract(&downloaded.path, &extracted)
                .map_err(|e| LoaderError::io(format!("extracting {url}"), e))?;

            if layout == ChecksumLayout::Nar {
                verify_nar(&extracted, checksums, url)?;
            }
            let tree = directory_from_disk(&extracted, Some(max))?;
            save_artifact(core, &downloaded.path);
            Ok(tree)
        })?;
        self.tree = Some(tree);
        Ok(false)
    }

    fn process_data(&mut self) -> Result<bool, LoaderError> {
        if let Some(tree) = &self.tree {
            self.snapshot = Some(head_snapshot(tree.root, TargetType::Directory));
        }
        Ok(false)
    }

    fn store_data(&mut self) -> Result<(), LoaderError> {
        let storage = self.core.storage().clone();
        if let Some(tree) = &self.tree {
            storage.content_add(&tree.contents)?;
            if !tree.skipped_contents.is_empty() {
                storage.skipped_content_add(&tree.skipped_contents)?;
            }
            storage.directory_add(&tree.directories)?;
        }
        if let Some(snapshot) = &self.snapshot {
            storage.snapshot_add(std::slice::from_ref(snapshot))?;
            self.core.set_loaded_snapshot_id(snapshot.id());
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), LoaderError> {
        Ok(())
    }

    fn visit_status(&self) -> VisitStatus {
        if self.tree.is_some() && self.snapshot.is_some() {
            VisitStatus::Full
        } else {
            VisitStatus::Partial
        }
    }

    fn load_status(&self) -> LoadStatus {
        match (&self.snapshot, &self.last_snapshot) {
            (Some(new), Some(old)) if new.id() == old.id() => LoadStatus::Uneventful,
            _ => LoadStatus::Eventful,
        }
    }
}
