//! The DVCS loader shape: fetch a whole repository once, then hand
//! over every object it contains plus a snapshot of its refs.
//!
//! Implementors only describe what was fetched; the blanket
//! [`Loader`] impl wires the hooks into the state machine as a
//! single-pass fetch/process/store cycle.

use strata_model::{Content, Directory, LoadStatus, Snapshot};

use crate::error::LoaderError;
use crate::machine::{Loader, LoaderCore};

pub trait DvcsLoader {
    fn core(&self) -> &LoaderCore;
    fn core_mut(&mut self) -> &mut LoaderCore;

    /// One-time setup. May signal [`LoaderError::NotFound`].
    fn prepare(&mut self) -> Result<(), LoaderError> {
        Ok(())
    }

    /// Clones or updates the repository. Called exactly once.
    fn fetch_repository(&mut self) -> Result<(), LoaderError>;

    fn get_contents(&self) -> Result<Vec<Content>, LoaderError>;

    fn get_directories(&self) -> Result<Vec<Directory>, LoaderError>;

    /// The state of the repository's refs at fetch time.
    fn get_snapshot(&self) -> Result<Snapshot, LoaderError>;

    /// Whether this visit brought anything new compared to the last.
    fn eventful(&self) -> bool;

    fn cleanup(&mut self) -> Result<(), LoaderError> {
        Ok(())
    }
}

impl<T: DvcsLoader> Loader for T {
    fn core(&self) -> &LoaderCore {
        DvcsLoader::core(self)
    }

    fn core_mut(&mut self) -> &mut LoaderCore {
        DvcsLoader::core_mut(self)
    }

    fn prepare(&mut self) -> Result<(), LoaderError> {
        DvcsLoader::prepare(self)
    }

    fn fetch_data(&mut self) -> Result<bool, LoaderError> {
        self.fetch_repository()?;
        Ok(false)
    }

    fn store_data(&mut self) -> Result<(), LoaderError> {
        let storage = DvcsLoader::core(self).storage().clone();
        storage.content_add(&self.get_contents()?)?;
        storage.directory_add(&self.get_directories()?)?;
        let snapshot = self.get_snapshot()?;
        storage.snapshot_add(std::slice::from_ref(&snapshot))?;
        storage.flush()?;
        DvcsLoader::core_mut(self).set_loaded_snapshot_id(snapshot.id());
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), LoaderError> {
        DvcsLoader::cleanup(self)
    }

    fn load_status(&self) -> LoadStatus {
        if self.eventful() {
            LoadStatus::Eventful
        } else {
            LoadStatus::Uneventful
        }
    }
}
