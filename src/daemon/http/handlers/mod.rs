//! HTTP API handlers grouped by concern.

pub mod admin;
pub mod channels;
pub mod queue;

pub(crate) use admin::{crud, databases, health, metrics, stats};
pub(crate) use channels::{
    channel_clear, channel_delete, channel_list, channel_lock, channel_lock_status,
    channel_pause, channel_resume, channel_status, channel_unlock,
};
pub(crate) use queue::{ack, count, keys, pop, push};

use super::AppError;

/// Required query parameter; a missing or empty value yields an error
/// envelope.
fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, AppError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Failed(format!("missing parameter '{name}'"))),
    }
}
