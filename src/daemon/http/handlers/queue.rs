//! Item handlers: push, pop, ack and channel inspection.

use axum::{
    Json,
    extract::{Query, State},
};

use super::super::types::QueryParams;
use super::super::{AppError, SharedState, metrics};
use super::required;
use crate::constants::{FALLBACK_CHANNEL, MSG_EMPTY, MSG_OK};
use crate::protocol::Envelope;

/// GET /tinyq/push?item= - Upsert an item.
pub(crate) async fn push(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let raw = required(params.item.as_deref(), "item")?;
    let item = state.manager.push(state.application(&params), raw).await?;
    metrics::record_queue_operation("push", item.channel());
    Ok(Json(Envelope::ok(MSG_OK)))
}

/// GET /tinyq/pop?channel=&count= - Take up to `count` items.
///
/// A single item comes back as is; several are joined by newlines.
pub(crate) async fn pop(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let channel = match params.channel.as_deref() {
        Some(channel) if !channel.is_empty() => channel,
        _ => return Err(AppError::BadRequest("missing parameter 'channel'".to_string())),
    };
    metrics::record_queue_operation("pop", channel);

    let items = state
        .manager
        .pop(state.application(&params), channel, params.pop_count())
        .await?;

    if items.is_empty() {
        return Ok(Json(Envelope::ok(MSG_EMPTY)));
    }
    Ok(Json(Envelope::ok(items.join("\n"))))
}

/// GET /tinyq/ack?item= - Remove one item without popping.
pub(crate) async fn ack(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let raw = required(params.item.as_deref(), "item")?;
    state
        .manager
        .remove_item(state.application(&params), raw)
        .await?;
    let channel = raw.split_once('.').map_or(FALLBACK_CHANNEL, |(channel, _)| channel);
    metrics::record_queue_operation("ack", channel);
    Ok(Json(Envelope::ok(MSG_OK)))
}

/// GET /tinyq/count?channel= - Number of items in a channel.
pub(crate) async fn count(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let channel = required(params.channel.as_deref(), "channel")?;
    let count = state
        .manager
        .count(state.application(&params), channel)
        .await?;
    Ok(Json(Envelope::ok(count.to_string())))
}

/// GET /tinyq/keys?channel= - `channel.key` of every item, newline-joined.
pub(crate) async fn keys(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let channel = required(params.channel.as_deref(), "channel")?;
    let keys = state
        .manager
        .list_keys(state.application(&params), channel)
        .await?;
    Ok(Json(Envelope::ok(keys.join("\n"))))
}
