//! Channel endpoints for API versions 1 to 3

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::{AppState, Channel};
use crate::versioning::{Deprecation, HandlerGroup, Operation};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPatch {
    pub id: u64,
    pub name: Option<String>,
    pub group_id: Option<String>,
}

pub fn handler_group() -> HandlerGroup<AppState> {
    HandlerGroup::new("channels")
        .versions(["1", "2", "3"])
        .operation(Operation::get("list_channels", all_channels).path("/channels"))
        .operation(
            Operation::get("get_channel", get_channel_by_id)
                .arity(1)
                .path("/channels/:channel_id"),
        )
        .operation(
            Operation::get("channel_names", channel_names)
                .path("/channel-names")
                .versions(["1"])
                .deprecated(Deprecation {
                    deprecated: Some("2".to_string()),
                    removed: Some("4".to_string()),
                }),
        )
        // batch updates arrived in version 3 and were kept unchanged in 4
        .operation(
            Operation::patch("patch_channels_batch", patch_channels_batch)
                .arity(1)
                .path("/channels")
                .versions(["3", "4"]),
        )
}

#[tracing::instrument(name = "List channels", skip(state))]
pub async fn all_channels(State(state): State<AppState>) -> Json<Vec<Channel>> {
    Json(state.channels.read().await.clone())
}

#[tracing::instrument(name = "Get channel", skip(state))]
pub async fn get_channel_by_id(
    State(state): State<AppState>,
    Path(channel_id): Path<u64>,
) -> Result<Json<Channel>, StatusCode> {
    state
        .channels
        .read()
        .await
        .iter()
        .find(|channel| channel.id == channel_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[tracing::instrument(name = "List channel names", skip(state))]
pub async fn channel_names(State(state): State<AppState>) -> Json<Vec<String>> {
    let names = state
        .channels
        .read()
        .await
        .iter()
        .map(|channel| channel.name.clone())
        .collect();
    Json(names)
}

#[tracing::instrument(name = "Patch channels batch", skip(state, patches))]
pub async fn patch_channels_batch(
    State(state): State<AppState>,
    Json(patches): Json<Vec<ChannelPatch>>,
) -> Result<Json<Vec<Channel>>, StatusCode> {
    let mut channels = state.channels.write().await;

    if patches
        .iter()
        .any(|patch| !channels.iter().any(|channel| channel.id == patch.id))
    {
        return Err(StatusCode::NOT_FOUND);
    }

    for patch in patches {
        if let Some(channel) = channels.iter_mut().find(|channel| channel.id == patch.id) {
            if let Some(name) = patch.name {
                channel.name = name;
            }
            if patch.group_id.is_some() {
                channel.group_id = patch.group_id;
            }
        }
    }

    tracing::info!(count = channels.len(), "Patched channels");
    Ok(Json(channels.clone()))
}
