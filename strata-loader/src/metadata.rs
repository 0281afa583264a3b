//! Extrinsic origin metadata collection.
//!
//! When the loaded origin was discovered by a lister, every metadata
//! fetcher registered for that lister is instantiated and asked for
//! metadata about the origin (and, optionally, its parent origins).
//! The whole phase is best-effort: any error is logged, reported to
//! the error sink, and swallowed; the load proceeds unaffected.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use strata_model::{MetadataAuthority, MetadataFetcher, Origin, RawExtrinsicMetadata};
use tracing::{debug, warn};

use crate::LoaderError;
use crate::machine::LoaderCore;

/// What a metadata fetcher is constructed from.
pub struct FetcherContext<'a> {
    pub origin: &'a Origin,
    pub lister_name: &'a str,
    pub lister_instance_name: &'a str,
    pub credentials: &'a BTreeMap<String, String>,
}

/// One source of extrinsic metadata about an origin (a forge API, a
/// package registry, a deposit client).
pub trait OriginMetadataFetcher {
    fn name(&self) -> &str;

    fn get_origin_metadata(&self) -> Result<Vec<RawExtrinsicMetadata>, LoaderError>;

    /// Fork provenance: the origins this origin was forked from.
    fn get_parent_origins(&self) -> Result<Vec<Origin>, LoaderError> {
        Ok(Vec::new())
    }
}

pub type FetcherFactory =
    Box<dyn Fn(&FetcherContext) -> Result<Box<dyn OriginMetadataFetcher>, LoaderError> + Send + Sync>;

/// Maps lister names to the fetcher factories eligible for origins
/// discovered by that lister. Built once at process start, read-only
/// afterwards.
#[derive(Default)]
pub struct MetadataFetcherRegistry {
    factories: BTreeMap<String, Vec<FetcherFactory>>,
}

impl MetadataFetcherRegistry {
    pub fn new() -> MetadataFetcherRegistry {
        MetadataFetcherRegistry::default()
    }

    pub fn register(&mut self, lister_name: impl Into<String>, factory: FetcherFactory) {
        self.factories.entry(lister_name.into()).or_default().push(factory);
    }

    pub fn factories_for(&self, lister_name: &str) -> &[FetcherFactory] {
        self.factories
            .get(lister_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Runs the metadata phase for one load. Never fails.
pub(crate) fn build_extrinsic_origin_metadata(core: &mut LoaderCore) {
    let Some(lister) = core.lister.clone() else {
        return;
    };
    let registry = Arc::clone(&core.registry);
    let sink = Arc::clone(&core.sink);
    let origin = core.origin.clone();

    let context = FetcherContext {
        origin: &origin,
        lister_name: &lister.name,
        lister_instance_name: &lister.instance_name,
        credentials: &core.credentials,
    };

    let mut metadata = Vec::new();
    for factory in registry.factories_for(&lister.name) {
        let fetcher = match factory(&context) {
            Ok(fetcher) => fetcher,
            Err(err) => {
                warn!(origin = %origin.url, %err, "metadata fetcher construction failed");
                sink.capture(&origin.url, &err);
                continue;
            }
        };
        core.metrics.metadata_fetchers.inc();

        match fetcher.get_origin_metadata() {
            Ok(batch) => {
                core.metrics.metadata_objects.inc_by(batch.len() as u64);
                metadata.extend(batch);
            }
            Err(err) => {
                warn!(origin = %origin.url, fetcher = fetcher.name(), %err, "metadata collection failed");
                sink.capture(&origin.url, &err);
            }
        }

        // first non-empty answer wins
        if core.parent_origins.is_none() {
            match fetcher.get_parent_origins() {
                Ok(parents) if !parents.is_empty() => {
                    core.metrics
                        .metadata_parent_origins
                        .with_label_values(&[fetcher.name()])
                        .inc_by(parents.len() as u64);
                    core.parent_origins = Some(parents);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(origin = %origin.url, fetcher = fetcher.name(), %err, "parent origin lookup failed");
                    sink.capture(&origin.url, &err);
                }
            }
        }
    }

    if metadata.is_empty() {
        debug!(origin = %origin.url, lister = %lister.name, "no extrinsic metadata collected");
        return;
    }

    let authorities: BTreeSet<MetadataAuthority> =
        metadata.iter().map(|m| m.authority.clone()).collect();
    let fetchers: BTreeSet<MetadataFetcher> = metadata.iter().map(|m| m.fetcher.clone()).collect();

    let store = |result: strata_storage::Result<()>| match result {
        Ok(()) => true,
        Err(err) => {
            let err = LoaderError::from(err);
            warn!(origin = %origin.url, %err, "storing extrinsic metadata failed");
            sink.capture(&origin.url, &err);
            false
        }
    };

    let authorities: Vec<_> = authorities.into_iter().collect();
    let fetchers: Vec<_> = fetchers.into_iter().collect();
    if store(core.storage.metadata_authority_add(&authorities))
        && store(core.storage.metadata_fetcher_add(&fetchers))
    {
        debug!(origin = %origin.url, objects = metadata.len(), "storing extrinsic metadata");
        store(core.storage.raw_extrinsic_metadata_add(&metadata));
    }
}
