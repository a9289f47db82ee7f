//! Demo API served through the versioned router
//!
//! `channels` is served by one controller for versions 1 to 3 and by a
//! separate controller from version 4 on; clients pick one with the version
//! header or by calling `/{version}/channels` directly.

pub mod channels;
pub mod channels_v4;
pub mod common;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::system;
use crate::versioning::{HandlerGroup, HandlerSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: u64,
    pub name: String,
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub channels: Arc<RwLock<Vec<Channel>>>,
}

impl AppState {
    pub fn with_channels(channels: Vec<Channel>) -> Self {
        Self {
            channels: Arc::new(RwLock::new(channels)),
        }
    }

    pub fn seeded() -> Self {
        Self::with_channels(vec![
            Channel {
                id: 1,
                name: "Rust".to_string(),
                group_id: Some("programming".to_string()),
            },
            Channel {
                id: 2,
                name: "Axum".to_string(),
                group_id: Some("programming".to_string()),
            },
            Channel {
                id: 3,
                name: "Cooking".to_string(),
                group_id: None,
            },
        ])
    }
}

/// Every controller of the service.
pub struct ApiHandlers;

impl HandlerSource<AppState> for ApiHandlers {
    #[tracing::instrument(name = "enumerate_api_handlers", skip_all)]
    fn handler_groups(&self) -> Vec<HandlerGroup<AppState>> {
        tracing::info!("Registering API handler groups");

        vec![
            channels::handler_group(),
            channels_v4::handler_group(),
            system::handler_group(),
        ]
    }
}
