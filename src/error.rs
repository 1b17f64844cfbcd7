//! Error types for queue operations.
//!
//! Every fallible engine call returns [`Result`]. Two variants are not
//! faults: [`Error::ChannelPaused`] and [`Error::ChannelLocked`] are
//! rejections the caller is expected to branch on (see
//! [`Error::is_rejection`]).

use std::path::PathBuf;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Queue errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Item string is malformed (empty channel or key, too many fields,
    /// or a reserved channel name).
    #[error("invalid item '{item}': {reason}")]
    InvalidItem { item: String, reason: String },

    /// Application name cannot be used as a store file name.
    #[error("invalid application name '{name}'")]
    InvalidApplication { name: String },

    /// Channel table does not exist in the application's store.
    #[error("channel not found: {channel}")]
    ChannelNotFound { channel: String },

    /// Application store could not be opened or created.
    #[error("failed to open store for application '{application}' at {path:?}: {reason}")]
    ApplicationOpenFailure {
        application: String,
        path: PathBuf,
        reason: String,
    },

    /// Pop rejected because the channel is paused.
    #[error("channel '{channel}' is paused")]
    ChannelPaused { channel: String },

    /// Clear or delete rejected because the channel is locked.
    #[error("channel '{channel}' is locked")]
    ChannelLocked { channel: String },

    /// Requested entity is not registered.
    #[error("not found: {0}")]
    NotFound(String),

    /// Store was closed and has not been reopened.
    #[error("store is closed: {path:?}")]
    StoreClosed { path: PathBuf },

    /// redb error with context.
    #[error("storage error in {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: redb::Error,
    },

    /// Payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Blocking task failed to complete.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Create an invalid item error.
    pub fn invalid_item(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidItem {
            item: item.into(),
            reason: reason.into(),
        }
    }

    /// Create a channel not found error.
    pub fn channel_not_found(channel: impl Into<String>) -> Self {
        Self::ChannelNotFound {
            channel: channel.into(),
        }
    }

    /// Create a channel paused rejection.
    pub fn channel_paused(channel: impl Into<String>) -> Self {
        Self::ChannelPaused {
            channel: channel.into(),
        }
    }

    /// Create a channel locked rejection.
    pub fn channel_locked(channel: impl Into<String>) -> Self {
        Self::ChannelLocked {
            channel: channel.into(),
        }
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a storage error with context.
    pub fn storage(context: impl Into<String>, source: impl Into<redb::Error>) -> Self {
        Self::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Returns true for control-flow rejections (pause, lock) as opposed
    /// to faults.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::ChannelPaused { .. } | Self::ChannelLocked { .. })
    }
}

/// Attach a context string to redb results, the way `anyhow::Context`
/// does for the binary.
pub(crate) trait StorageContext<T> {
    fn storage(self, context: &str) -> Result<T>;

    fn with_storage<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<redb::Error>> StorageContext<T> for std::result::Result<T, E> {
    fn storage(self, context: &str) -> Result<T> {
        self.map_err(|e| Error::storage(context, e))
    }

    fn with_storage<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::storage(f(), e))
    }
}
