//! Dispatch substitution
//!
//! Every versioned route is served by a [`Dispatcher`] that knows which
//! operation key and label it was registered for. Once axum has matched the
//! route, the dispatcher looks up the implementation for that label and
//! forwards the unchanged request to it, so the substituted handler runs its
//! own extractors against the original path parameters.

use std::sync::Arc;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};

use super::handler::OperationKey;
use super::label::VersionLabel;
use super::registry::{Endpoint, VersionIndex};
use crate::errors::VersioningError;

/// The endpoint serving `key` under `version`.
pub fn substitute<'a>(
    index: &'a VersionIndex,
    version: &VersionLabel,
    key: &OperationKey,
) -> Result<&'a Arc<Endpoint>, VersioningError> {
    let endpoint = index.resolve(version, key)?;

    if let Some(deprecation) = &endpoint.operation.deprecation {
        tracing::warn!(
            endpoint = %endpoint,
            version = %version,
            deprecated = ?deprecation.deprecated,
            removed = ?deprecation.removed,
            "Serving deprecated operation"
        );
    }

    Ok(endpoint)
}

#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    index: Arc<VersionIndex>,
    key: OperationKey,
    version: VersionLabel,
}

impl Dispatcher {
    pub(crate) fn new(index: Arc<VersionIndex>, key: OperationKey, version: VersionLabel) -> Self {
        Self {
            index,
            key,
            version,
        }
    }

    pub(crate) async fn dispatch(self, request: Request) -> Response {
        let version = &self.version;

        match substitute(&self.index, version, &self.key) {
            Ok(endpoint) => {
                tracing::debug!(
                    operation = %self.key,
                    version = %version,
                    endpoint = %endpoint,
                    "Dispatching to versioned operation"
                );
                let endpoint = Arc::clone(endpoint);
                endpoint.call(request).await
            }
            Err(error) => error.into_response(),
        }
    }
}
