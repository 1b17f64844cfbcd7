//! Registry of open application stores.
//!
//! Each application gets one redb file, `<root>/<application>.redb`,
//! opened on first use and kept open until detached.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::constants::STORE_EXTENSION;
use crate::daemon::services::queue::{ChannelStore, StorageEngine};
use crate::error::{Error, Result};

struct RegistryInner {
    root: PathBuf,
    stores: DashMap<String, ChannelStore>,
}

/// Lazily opened stores, one per application.
///
/// `QueueRegistry` is `Clone`; clones share the same map.
///
/// # Example
///
/// ```rust
/// use tinyq::daemon::registry::QueueRegistry;
///
/// # fn main() -> tinyq::Result<()> {
/// # let temp_dir = tempfile::tempdir().unwrap();
/// let registry = QueueRegistry::new(temp_dir.path());
/// let store = registry.get("shop")?;
/// store.push("orders.1")?;
///
/// // Same application, same store
/// assert_eq!(registry.get("shop")?.count("orders")?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct QueueRegistry {
    inner: Arc<RegistryInner>,
}

impl QueueRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                root: root.into(),
                stores: DashMap::new(),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Store file for an application.
    pub fn store_path(&self, application: &str) -> PathBuf {
        self.inner
            .root
            .join(format!("{application}.{STORE_EXTENSION}"))
    }

    /// Returns the application's store, opening it on first use.
    ///
    /// Concurrent first requests for the same application open the file
    /// once; the others wait on the map entry and share the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidApplication`] for a name that isn't a safe
    /// file stem and [`Error::ApplicationOpenFailure`] if the store can't be
    /// opened. A failure affects only this application.
    pub fn get(&self, application: &str) -> Result<ChannelStore> {
        if let Some(store) = self.inner.stores.get(application) {
            return Ok(store.clone());
        }

        validate_application(application)?;

        match self.inner.stores.entry(application.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let path = self.store_path(application);
                let engine = StorageEngine::open(&path).map_err(|e| {
                    warn!(application, path = %path.display(), error = %e, "Failed to open application store");
                    Error::ApplicationOpenFailure {
                        application: application.to_string(),
                        path: path.clone(),
                        reason: e.to_string(),
                    }
                })?;

                info!(application, path = %path.display(), "Opened application store");
                let store = ChannelStore::new(engine);
                entry.insert(store.clone());
                Ok(store)
            },
        }
    }

    /// The application's store if it is already open. Never opens a file.
    pub fn get_open(&self, application: &str) -> Option<ChannelStore> {
        self.inner
            .stores
            .get(application)
            .map(|store| store.clone())
    }

    /// Closes and forgets an application's store. Its file stays on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the application isn't open.
    pub fn detach(&self, application: &str) -> Result<()> {
        let (_, store) = self
            .inner
            .stores
            .remove(application)
            .ok_or_else(|| Error::NotFound(format!("application '{application}'")))?;

        store.engine().close();
        info!(application, "Detached application store");
        Ok(())
    }

    pub fn is_open(&self, application: &str) -> bool {
        self.inner.stores.contains_key(application)
    }

    /// Names of applications with an open store, sorted.
    pub fn open_applications(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .stores
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Every known application: open stores plus store files under the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory exists but cannot be read.
    pub fn applications(&self) -> Result<Vec<String>> {
        let mut names = self.open_applications();

        match std::fs::read_dir(&self.inner.root) {
            Ok(entries) => {
                for entry in entries {
                    let path = entry
                        .map_err(|e| Error::io("reading store directory", e))?
                        .path();
                    if path.extension().and_then(|e| e.to_str()) == Some(STORE_EXTENSION)
                        && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                    {
                        names.push(stem.to_string());
                    }
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(Error::io("reading store directory", e)),
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Closes every open store.
    pub fn close_all(&self) {
        let names = self.open_applications();
        for name in names {
            if let Some((_, store)) = self.inner.stores.remove(&name) {
                store.engine().close();
            }
        }
        info!("Closed all application stores");
    }
}

/// Application names become file stems, so only a conservative character
/// set is accepted.
fn validate_application(application: &str) -> Result<()> {
    let valid = !application.is_empty()
        && application.len() <= 128
        && application
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidApplication {
            name: application.to_string(),
        })
    }
}
