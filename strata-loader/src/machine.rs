//! The loader lifecycle state machine.
//!
//! [`Loader::load`] drives the fixed sequence every loader goes
//! through: pre-cleanup, origin/visit bookkeeping, extrinsic
//! metadata, prepare, the fetch/process/store loop, finalization,
//! and the unconditional flush/cleanup pair. Concrete loaders only
//! implement the hooks; they never re-implement the sequence.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use strata_model::{
    LoadResult, LoadStatus, ObjectId, Origin, OriginVisit, OriginVisitStatus, VisitStatus,
};
use strata_storage::{Storage, StorageError};
use tracing::{error, info, warn};

use crate::config::{LoaderConfig, save_directory};
use crate::error::LoaderError;
use crate::metadata::MetadataFetcherRegistry;
use crate::metrics::LoaderMetrics;
use crate::sink::{ErrorSink, LogSink};

/// Which lister discovered this origin. The pair selects the
/// extrinsic-metadata fetchers eligible for the load; it is one
/// struct so that name and instance are always supplied together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListerIdentity {
    pub name: String,
    pub instance_name: String,
}

impl ListerIdentity {
    pub fn new(
        name: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Result<ListerIdentity, LoaderError> {
        let name = name.into();
        if name.is_empty() {
            return Err(LoaderError::InvalidLister(
                "lister name must not be empty".into(),
            ));
        }
        Ok(ListerIdentity {
            name,
            instance_name: instance_name.into(),
        })
    }
}

/// Shared state and collaborators of one loader instance.
///
/// All parameters are fixed at construction; the only mutable state
/// is the recorded visit, the loaded snapshot id, and the parent
/// origins reported during the metadata phase.
pub struct LoaderCore {
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) origin: Origin,
    pub(crate) visit_type: String,
    visit_date: Option<SystemTime>,
    pub(crate) lister: Option<ListerIdentity>,
    pub(crate) registry: Arc<MetadataFetcherRegistry>,
    pub(crate) metrics: LoaderMetrics,
    pub(crate) sink: Arc<dyn ErrorSink>,
    pub(crate) max_content_size: u64,
    save_data_path: Option<PathBuf>,
    pub(crate) credentials: BTreeMap<String, String>,

    visit: Option<OriginVisit>,
    pub(crate) loaded_snapshot_id: Option<ObjectId>,
    pub(crate) parent_origins: Option<Vec<Origin>>,
}

impl LoaderCore {
    pub fn builder(
        storage: Arc<dyn Storage>,
        origin_url: impl Into<String>,
        visit_type: impl Into<String>,
    ) -> LoaderCoreBuilder {
        LoaderCoreBuilder {
            storage,
            origin_url: origin_url.into(),
            visit_type: visit_type.into(),
            visit_date: None,
            lister: None,
            registry: None,
            metrics: None,
            sink: None,
            config: LoaderConfig::default(),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn visit(&self) -> Option<&OriginVisit> {
        self.visit.as_ref()
    }

    pub fn loaded_snapshot_id(&self) -> Option<ObjectId> {
        self.loaded_snapshot_id
    }

    pub fn set_loaded_snapshot_id(&mut self, id: ObjectId) {
        self.loaded_snapshot_id = Some(id);
    }

    /// Parent origins reported by the metadata phase (fork
    /// provenance), if any fetcher answered.
    pub fn parent_origins(&self) -> Option<&[Origin]> {
        self.parent_origins.as_deref()
    }

    pub fn max_content_size(&self) -> u64 {
        self.max_content_size
    }

    /// Directory fetched artifacts should be copied into, when
    /// artifact saving is configured. Created on demand.
    pub fn save_directory(&self) -> io::Result<Option<PathBuf>> {
        match &self.save_data_path {
            Some(base) => save_directory(base, &self.origin.url).map(Some),
            None => Ok(None),
        }
    }

    fn record_origin_and_visit(&mut self) -> Result<(), LoaderError> {
        self.storage.origin_add(std::slice::from_ref(&self.origin))?;
        let visit = OriginVisit {
            origin: self.origin.url.clone(),
            visit: None,
            date: self.visit_date.unwrap_or_else(SystemTime::now),
            visit_type: self.visit_type.clone(),
        };
        let mut added = self.storage.origin_visit_add(vec![visit])?;
        let visit = added
            .pop()
            .ok_or_else(|| StorageError::Backend("storage returned no visit record".into()))?;
        info!(origin = %self.origin.url, visit = visit.visit, "visit recorded");
        self.visit = Some(visit);
        Ok(())
    }

    fn record_visit_status(&mut self, status: VisitStatus) -> Result<(), LoaderError> {
        let Some(visit) = self.visit.as_ref().and_then(|v| v.visit) else {
            return Err(StorageError::Backend("no visit recorded yet".into()).into());
        };
        // a not_found status never references a snapshot
        let snapshot = match status {
            VisitStatus::NotFound => None,
            _ => self.loaded_snapshot_id,
        };
        let record = OriginVisitStatus {
            origin: self.origin.url.clone(),
            visit,
            date: SystemTime::now(),
            status,
            snapshot,
            visit_type: self.visit_type.clone(),
        };
        self.storage
            .origin_visit_status_add(std::slice::from_ref(&record))?;
        Ok(())
    }
}

pub struct LoaderCoreBuilder {
    storage: Arc<dyn Storage>,
    origin_url: String,
    visit_type: String,
    visit_date: Option<SystemTime>,
    lister: Option<ListerIdentity>,
    registry: Option<Arc<MetadataFetcherRegistry>>,
    metrics: Option<LoaderMetrics>,
    sink: Option<Arc<dyn ErrorSink>>,
    config: LoaderConfig,
}

impl LoaderCoreBuilder {
    pub fn visit_date(mut self, date: SystemTime) -> Self {
        self.visit_date = Some(date);
        self
    }

    pub fn lister(mut self, lister: ListerIdentity) -> Self {
        self.lister = Some(lister);
        self
    }

    pub fn metadata_registry(mut self, registry: Arc<MetadataFetcherRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn metrics(mut self, metrics: LoaderMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<LoaderCore, LoaderError> {
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => LoaderMetrics::unregistered()?,
        };
        Ok(LoaderCore {
            storage: self.storage,
            origin: Origin::new(self.origin_url),
            visit_type: self.visit_type,
            visit_date: self.visit_date,
            lister: self.lister,
            registry: self.registry.unwrap_or_default(),
            metrics,
            sink: self.sink.unwrap_or_else(|| Arc::new(LogSink)),
            max_content_size: self.config.max_content_size,
            save_data_path: self.config.save_data_path,
            credentials: self.config.credentials,
            visit: None,
            loaded_snapshot_id: None,
            parent_origins: None,
        })
    }
}

/// One loading job for one origin.
///
/// Implementations provide the hooks; [`Loader::load`] provides the
/// sequence. `load()` never returns `Err` for ordinary failures (it
/// converts them into a stored visit status and a task status); it
/// does return `Err` for origin/visit bookkeeping failures and for
/// [`LoaderError::Interrupted`], which is re-raised after the
/// unconditional flush/cleanup pair.
pub trait Loader {
    fn core(&self) -> &LoaderCore;
    fn core_mut(&mut self) -> &mut LoaderCore;

    /// One-time setup before the fetch loop. May signal "origin not
    /// found" with [`LoaderError::NotFound`].
    fn prepare(&mut self) -> Result<(), LoaderError>;

    /// Fetches the next batch. Returns whether more data remains.
    fn fetch_data(&mut self) -> Result<bool, LoaderError>;

    /// Transforms the fetched batch into model objects. Returns
    /// whether more data remains to process.
    fn process_data(&mut self) -> Result<bool, LoaderError> {
        Ok(false)
    }

    /// Persists the current batch. Called on every loop iteration,
    /// including the final one.
    fn store_data(&mut self) -> Result<(), LoaderError>;

    /// Removes dangling state from a previous failed run.
    /// Best-effort: errors are logged and swallowed.
    fn pre_cleanup(&mut self) -> Result<(), LoaderError> {
        Ok(())
    }

    /// Releases loader-owned resources. Runs exactly once per load,
    /// on every path.
    fn cleanup(&mut self) -> Result<(), LoaderError>;

    /// Side-effect hook, called with `true` after a successful load
    /// and with `false` on the failure path. An error from the
    /// `true` call downgrades the load to failed.
    fn post_load(&mut self, _success: bool) -> Result<(), LoaderError> {
        Ok(())
    }

    /// Classifies a load that ran to completion.
    fn visit_status(&self) -> VisitStatus {
        VisitStatus::Full
    }

    /// Task-level outcome reported on the success path.
    fn load_status(&self) -> LoadStatus {
        LoadStatus::Eventful
    }

    /// Runs the whole lifecycle. See the module documentation for
    /// the sequence.
    fn load(&mut self) -> Result<LoadResult, LoaderError> {
        let metrics = self.core().metrics.clone();
        let sink = Arc::clone(&self.core().sink);
        let origin = self.core().origin.url.clone();

        let started = Instant::now();
        if let Err(err) = self.pre_cleanup() {
            warn!(%origin, %err, "pre-cleanup failed, continuing");
            sink.capture(&origin, &err);
        }
        metrics.observe("pre_cleanup", "", "", started.elapsed());

        // bookkeeping failures mean the storage collaborator itself
        // is broken: fatal, propagated raw
        self.core_mut().record_origin_and_visit()?;

        let started = Instant::now();
        crate::metadata::build_extrinsic_origin_metadata(self.core_mut());
        metrics.observe("build_extrinsic_origin_metadata", "", "", started.elapsed());

        let (result, success, status_label) = match run_main_phase(self, &metrics) {
            Ok(status) => {
                let result = LoadResult::new(self.load_status(), self.core().loaded_snapshot_id);
                info!(%origin, status = %status, task_status = %result.status, "load finished");
                (Ok(result), "true", status.to_string())
            }
            Err(err) if err.is_interrupt() => {
                error!(%origin, %err, "load interrupted");
                (Err(err), "false", String::new())
            }
            Err(err) => {
                let (result, status) = finalize_failure(self, &metrics, &sink, &origin, err);
                (Ok(result), "false", status.to_string())
            }
        };

        let started = Instant::now();
        if let Err(err) = self.core().storage.flush() {
            let err = LoaderError::from(err);
            error!(%origin, %err, "flushing storage failed");
            sink.capture(&origin, &err);
        }
        metrics.observe("flush", success, &status_label, started.elapsed());

        let started = Instant::now();
        if let Err(err) = self.cleanup() {
            error!(%origin, %err, "cleanup failed");
            sink.capture(&origin, &err);
        }
        metrics.observe("cleanup", success, &status_label, started.elapsed());

        result
    }
}

/// Steps 4 and 5: prepare, the fetch/process/store loop, and the
/// success-path finalization. Returns the stored visit status.
fn run_main_phase<L: Loader + ?Sized>(
    loader: &mut L,
    metrics: &LoaderMetrics,
) -> Result<VisitStatus, LoaderError> {
    let started = Instant::now();
    let prepared = loader.prepare();
    metrics.observe("prepare", "", "", started.elapsed());
    prepared?;

    loop {
        let started = Instant::now();
        let fetched = loader.fetch_data();
        metrics.observe("fetch_data", "", "", started.elapsed());
        let more_fetch = fetched?;

        let started = Instant::now();
        let processed = loader.process_data();
        metrics.observe("process_data", "", "", started.elapsed());
        let more_process = processed?;

        // every iteration's data is persisted, exit flag or not
        let started = Instant::now();
        let stored = loader.store_data();
        metrics.observe("store_data", "", "", started.elapsed());
        stored?;

        if !(more_fetch && more_process) {
            break;
        }
    }

    let status = loader.visit_status();
    loader.core_mut().record_visit_status(status)?;

    let started = Instant::now();
    let post = loader.post_load(true);
    metrics.observe("post_load", "true", &status.to_string(), started.elapsed());
    if let Err(err) = post {
        return Err(LoaderError::PostLoad(err.to_string()));
    }
    Ok(status)
}

/// Step 6: classify the failure, record the terminal status, and run
/// the failure-path `post_load`.
fn finalize_failure<L: Loader + ?Sized>(
    loader: &mut L,
    metrics: &LoaderMetrics,
    sink: &Arc<dyn ErrorSink>,
    origin: &str,
    err: LoaderError,
) -> (LoadResult, VisitStatus) {
    let (status, task_status) = if err.is_not_found() {
        (VisitStatus::NotFound, LoadStatus::Uneventful)
    } else if loader.core().loaded_snapshot_id.is_some() {
        (VisitStatus::Partial, LoadStatus::Failed)
    } else {
        (VisitStatus::Failed, LoadStatus::Failed)
    };
    error!(
        origin,
        lister = ?loader.core().lister,
        %err,
        status = %status,
        "loading failed"
    );
    sink.capture(origin, &err);

    if let Err(status_err) = loader.core_mut().record_visit_status(status) {
        error!(origin, %status_err, "recording terminal visit status failed");
        sink.capture(origin, &status_err);
    }

    let started = Instant::now();
    if let Err(post_err) = loader.post_load(false) {
        error!(origin, %post_err, "failure-path post_load hook failed");
        sink.capture(origin, &post_err);
    }
    metrics.observe("post_load", "false", &status.to_string(), started.elapsed());

    (LoadResult::new(task_status, None), status)
}
