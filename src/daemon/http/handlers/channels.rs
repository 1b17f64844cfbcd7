//! Channel administration handlers.

use axum::{
    Json,
    extract::{Query, State},
};

use super::super::types::QueryParams;
use super::super::{AppError, SharedState, metrics};
use super::required;
use crate::constants::{MSG_LOCKED, MSG_OK, MSG_PAUSED};
use crate::protocol::Envelope;

/// GET /tinyq/channels - One `name|count|paused|locked` row per channel.
pub(crate) async fn channel_list(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    metrics::record_queue_operation("channels", "all");
    let rows = state.manager.channels(state.application(&params)).await?;
    let body = rows
        .iter()
        .map(|row| row.to_row())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Json(Envelope::ok(body)))
}

/// GET /tinyq/channels/pause?channel=
pub(crate) async fn channel_pause(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let channel = required(params.channel.as_deref(), "channel")?;
    metrics::record_queue_operation("pause", channel);
    state
        .manager
        .pause(state.application(&params), channel)
        .await?;
    Ok(Json(Envelope::ok(MSG_PAUSED)))
}

/// GET /tinyq/channels/resume?channel=
pub(crate) async fn channel_resume(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let channel = required(params.channel.as_deref(), "channel")?;
    metrics::record_queue_operation("resume", channel);
    state
        .manager
        .resume(state.application(&params), channel)
        .await?;
    Ok(Json(Envelope::ok("unpaused")))
}

/// GET /tinyq/channels/status?channel= - `true` when paused.
pub(crate) async fn channel_status(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let channel = required(params.channel.as_deref(), "channel")?;
    let paused = state
        .manager
        .is_paused(state.application(&params), channel)
        .await?;
    Ok(Json(Envelope::ok(paused.to_string())))
}

/// GET /tinyq/channels/lock?channel=
pub(crate) async fn channel_lock(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let channel = required(params.channel.as_deref(), "channel")?;
    metrics::record_queue_operation("lock", channel);
    state
        .manager
        .lock(state.application(&params), channel)
        .await?;
    Ok(Json(Envelope::ok(MSG_OK)))
}

/// GET /tinyq/channels/unlock?channel=
pub(crate) async fn channel_unlock(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let channel = required(params.channel.as_deref(), "channel")?;
    metrics::record_queue_operation("unlock", channel);
    state
        .manager
        .unlock(state.application(&params), channel)
        .await?;
    Ok(Json(Envelope::ok(MSG_OK)))
}

/// GET /tinyq/channels/lockstatus?channel= - `locked` or `unlocked`.
pub(crate) async fn channel_lock_status(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let channel = required(params.channel.as_deref(), "channel")?;
    let locked = state
        .manager
        .is_locked(state.application(&params), channel)
        .await?;
    let message = if locked { MSG_LOCKED } else { "unlocked" };
    Ok(Json(Envelope::ok(message)))
}

/// GET /tinyq/channels/clear?channel= - `locked` if the channel is locked.
pub(crate) async fn channel_clear(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let channel = required(params.channel.as_deref(), "channel")?;
    metrics::record_queue_operation("clear", channel);
    state
        .manager
        .clear(state.application(&params), channel)
        .await?;
    Ok(Json(Envelope::ok(MSG_OK)))
}

/// GET /tinyq/channels/delete?channel= - `locked` if the channel is locked.
pub(crate) async fn channel_delete(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let channel = required(params.channel.as_deref(), "channel")?;
    metrics::record_queue_operation("delete", channel);
    state
        .manager
        .delete(state.application(&params), channel)
        .await?;
    Ok(Json(Envelope::ok(MSG_OK)))
}
