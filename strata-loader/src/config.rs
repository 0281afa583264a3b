use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use serde::Deserialize;
use strata_hash::Algorithm;
use thiserror::Error;

fn default_max_content_size() -> u64 {
    100 * 1024 * 1024
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Loader settings, usually read from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// Contents larger than this are recorded as skipped, without
    /// their data.
    #[serde(default = "default_max_content_size")]
    pub max_content_size: u64,

    /// When set, fetched artifacts are also copied under this
    /// directory, sharded by origin-URL hash and year.
    #[serde(default)]
    pub save_data_path: Option<PathBuf>,

    /// Opaque credential strings handed to metadata fetchers.
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

impl Default for LoaderConfig {
    fn default() -> LoaderConfig {
        LoaderConfig {
            max_content_size: default_max_content_size(),
            save_data_path: None,
            credentials: BTreeMap::new(),
        }
    }
}

impl LoaderConfig {
    pub fn from_file(path: &Path) -> Result<LoaderConfig, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Directory an origin's fetched artifacts are saved under:
/// `{base}/sha1:{h[0..2]}/{h}/{year}` where `h` is the sha1 of the
/// origin URL. Created on demand.
pub(crate) fn save_directory(base: &Path, origin_url: &str) -> io::Result<PathBuf> {
    let hash = Algorithm::Sha1.digest(origin_url.as_bytes()).to_hex();
    let dir = base
        .join(format!("sha1:{}", &hash[..2]))
        .join(&hash)
        .join(Utc::now().year().to_string());
    fs::create_dir_all(&dir)?;
    Ok(dir)
}
