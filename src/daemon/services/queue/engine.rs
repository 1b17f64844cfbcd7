//! Storage engine: one redb database per application.
//!
//! Wraps the database in a lock so it can be closed and reopened while
//! other handles to the engine are alive. Transactions hold the read side
//! of that lock, so `close` waits for in-flight work to finish.

use parking_lot::RwLock;
use redb::{Database, ReadTransaction, ReadableDatabase, TableHandle, WriteTransaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result, StorageContext};

struct EngineInner {
    path: PathBuf,
    db: RwLock<Option<Database>>,
}

/// Handle to an application's store.
///
/// `StorageEngine` is `Clone`; clones share the same database.
#[derive(Clone)]
pub struct StorageEngine {
    inner: Arc<EngineInner>,
}

impl StorageEngine {
    /// Opens or creates the store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Parent directory cannot be created
    /// - Database file cannot be opened or created (permissions, corruption,
    ///   already opened by another handle)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = open_database(&path)?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                path,
                db: RwLock::new(Some(db)),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn is_open(&self) -> bool {
        self.inner.db.read().is_some()
    }

    /// Reopens a closed store. No-op when already open.
    ///
    /// # Errors
    ///
    /// Returns an error if the database file cannot be opened.
    pub fn reopen(&self) -> Result<()> {
        let mut db = self.inner.db.write();
        if db.is_none() {
            *db = Some(open_database(&self.inner.path)?);
            debug!(path = %self.inner.path.display(), "Store reopened");
        }
        Ok(())
    }

    /// Releases the database file. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        let closed = self.inner.db.write().take().is_some();
        if closed {
            debug!(path = %self.inner.path.display(), "Store closed");
        }
        closed
    }

    /// Runs `f` inside one write transaction.
    ///
    /// The transaction commits only if `f` returns `Ok`; on `Err` it is
    /// aborted and none of its writes become visible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreClosed`] on a closed store, the error from `f`,
    /// or a storage error if the transaction cannot begin or commit.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&WriteTransaction) -> Result<T>,
    {
        let guard = self.inner.db.read();
        let db = guard.as_ref().ok_or_else(|| self.closed())?;

        let txn = db
            .begin_write()
            .storage("Failed to begin write transaction")?;

        match f(&txn) {
            Ok(value) => {
                txn.commit().storage("Failed to commit write transaction")?;
                Ok(value)
            },
            Err(e) => {
                // Nothing was committed; an abort failure adds nothing useful
                let _ = txn.abort();
                Err(e)
            },
        }
    }

    /// Runs `f` inside one read transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreClosed`] on a closed store, the error from `f`,
    /// or a storage error if the transaction cannot begin.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ReadTransaction) -> Result<T>,
    {
        let guard = self.inner.db.read();
        let db = guard.as_ref().ok_or_else(|| self.closed())?;

        let txn = db.begin_read().storage("Failed to begin read transaction")?;
        f(&txn)
    }

    /// Names of every table in the store, reserved ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the table list cannot be read.
    pub fn table_names(&self) -> Result<Vec<String>> {
        self.read(|txn| {
            Ok(txn
                .list_tables()
                .storage("Failed to list tables")?
                .map(|handle| handle.name().to_string())
                .collect())
        })
    }

    fn closed(&self) -> Error {
        Error::StoreClosed {
            path: self.inner.path.clone(),
        }
    }
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("path", &self.inner.path)
            .field("open", &self.is_open())
            .finish()
    }
}

fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::io(
                format!("creating store directory {}", parent.display()),
                e,
            )
        })?;
    }

    Database::create(path).with_storage(|| format!("opening store {}", path.display()))
}

/// Whether a table exists, checked inside a write transaction without
/// creating it.
pub(crate) fn write_table_exists(txn: &WriteTransaction, name: &str) -> Result<bool> {
    Ok(txn
        .list_tables()
        .storage("Failed to list tables")?
        .any(|handle| handle.name() == name))
}
