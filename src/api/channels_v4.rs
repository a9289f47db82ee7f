//! Channel endpoints from API version 4 on
//!
//! Every response is wrapped in [`ApiResponse`], errors included.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::common::ApiResponse;
use crate::api::{AppState, Channel};
use crate::versioning::{HandlerGroup, Operation};

pub fn handler_group() -> HandlerGroup<AppState> {
    HandlerGroup::new("channels_v4")
        .versions(["4"])
        .operation(Operation::get("list_channels", all_channels).path("/channels"))
        .operation(
            Operation::get("get_channel", get_channel_by_id)
                .arity(1)
                .path("/channels/:channel_id"),
        )
}

#[tracing::instrument(name = "List channels v4", skip(state))]
pub async fn all_channels(State(state): State<AppState>) -> Json<ApiResponse<Vec<Channel>>> {
    Json(ApiResponse::success(state.channels.read().await.clone()))
}

#[tracing::instrument(name = "Get channel v4", skip(state))]
pub async fn get_channel_by_id(
    State(state): State<AppState>,
    Path(channel_id): Path<u64>,
) -> (StatusCode, Json<ApiResponse<Channel>>) {
    let channel = state
        .channels
        .read()
        .await
        .iter()
        .find(|channel| channel.id == channel_id)
        .cloned();

    match channel {
        Some(channel) => (StatusCode::OK, Json(ApiResponse::success(channel))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Channel {channel_id} not found"))),
        ),
    }
}
