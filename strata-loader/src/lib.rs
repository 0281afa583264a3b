//! Loader lifecycle for the Strata archive.
//!
//! A loader brings one origin (a URL) into the archive: it records
//! the visit, fetches the artifact(s), converts them into
//! content-addressed objects, and stores a snapshot describing what
//! was found. [`Loader`] defines the lifecycle, [`LoaderCore`] the
//! shared state; [`ContentLoader`] and [`DirectoryLoader`] ingest a
//! single checksummed artifact, and [`DvcsLoader`] is the shape for
//! whole-repository loaders.

mod config;
mod download;
mod dvcs;
mod error;
mod machine;
mod metadata;
mod metrics;
mod node;
mod sink;

pub use config::{ConfigError, LoaderConfig};
pub use download::{Checksums, DownloadError, Downloaded, Downloader, Extractor, FileDownloader};
pub use dvcs::DvcsLoader;
pub use error::LoaderError;
pub use machine::{Loader, LoaderCore, LoaderCoreBuilder, ListerIdentity};
pub use metadata::{
    FetcherContext, FetcherFactory, MetadataFetcherRegistry, OriginMetadataFetcher,
};
pub use metrics::LoaderMetrics;
pub use node::{ChecksumLayout, ContentLoader, DirectoryLoader};
pub use sink::{ErrorSink, LogSink};
