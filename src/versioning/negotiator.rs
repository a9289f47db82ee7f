//! Request version negotiation
//!
//! The version a client wants travels in a single header. Without it the
//! latest version is served. Depending on the [`RewritePolicy`] the request
//! path is prefixed with the negotiated version so that the versioned route
//! matches directly.

use std::fmt;
use std::str::FromStr;

use axum::extract::OriginalUri;
use axum::http::uri::{PathAndQuery, Uri};
use axum::http::{HeaderMap, HeaderName, Request};

use super::label::VersionLabel;
use super::registry::VersionIndex;
use crate::errors::VersioningError;

pub const DEFAULT_VERSION_HEADER: &str = "x-api-version";

/// When a request path gets the negotiated version prepended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RewritePolicy {
    /// Only when the negotiated version is not the latest one.
    Conditional,
    /// Whenever the version header is present.
    #[default]
    OnHeader,
}

impl FromStr for RewritePolicy {
    type Err = VersioningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conditional" => Ok(RewritePolicy::Conditional),
            "on-header" | "on_header" | "onheader" => Ok(RewritePolicy::OnHeader),
            other => Err(VersioningError::ConfigurationAbsent(format!(
                "unknown rewrite policy {other:?}"
            ))),
        }
    }
}

impl fmt::Display for RewritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewritePolicy::Conditional => f.write_str("conditional"),
            RewritePolicy::OnHeader => f.write_str("on-header"),
        }
    }
}

/// Version chosen for the current request, available as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedVersion(pub VersionLabel);

/// Marks a request whose path was prefixed with its negotiated version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rewritten;

#[derive(Debug, Clone)]
pub struct VersionNegotiator {
    header: HeaderName,
    policy: RewritePolicy,
}

impl Default for VersionNegotiator {
    fn default() -> Self {
        Self::new(
            HeaderName::from_static(DEFAULT_VERSION_HEADER),
            RewritePolicy::default(),
        )
    }
}

impl VersionNegotiator {
    pub fn new(header: HeaderName, policy: RewritePolicy) -> Self {
        Self { header, policy }
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub fn policy(&self) -> RewritePolicy {
        self.policy
    }

    /// Version requested through the header, if any.
    pub fn requested(&self, headers: &HeaderMap) -> Result<Option<VersionLabel>, VersioningError> {
        let Some(value) = headers.get(&self.header) else {
            return Ok(None);
        };

        let raw = value
            .to_str()
            .map_err(|_| VersioningError::InvalidVersionHeader(format!("{value:?}")))?;

        VersionLabel::parse(raw)
            .map(Some)
            .map_err(|e| VersioningError::InvalidVersionHeader(format!("{raw:?}: {e}")))
    }

    pub fn negotiate<B>(
        &self,
        index: &VersionIndex,
        request: &Request<B>,
    ) -> Result<VersionLabel, VersioningError> {
        Ok(self
            .requested(request.headers())?
            .unwrap_or_else(|| index.latest_version()))
    }

    pub fn should_rewrite<B>(
        &self,
        index: &VersionIndex,
        request: &Request<B>,
    ) -> Result<bool, VersioningError> {
        let requested = self.requested(request.headers())?;
        Ok(match self.policy {
            RewritePolicy::OnHeader => requested.is_some(),
            RewritePolicy::Conditional => {
                requested.is_some_and(|version| version != index.latest_version())
            }
        })
    }

    /// Prefixes the request path with `version`.
    ///
    /// Query string, scheme and authority are kept, so an absolute-form URI
    /// still describes the same resource under its new path. The URI before
    /// rewriting is recorded as [`OriginalUri`] unless one is already present.
    pub fn rewrite<B>(&self, request: Request<B>, version: &VersionLabel) -> Request<B> {
        prefix_version(request, version)
    }

    /// Negotiates, rewrites when the policy asks for it, and records the
    /// outcome as a [`NegotiatedVersion`] extension.
    pub fn prepare<B>(
        &self,
        index: &VersionIndex,
        request: Request<B>,
    ) -> Result<Request<B>, VersioningError> {
        let version = self.negotiate(index, &request)?;
        let mut request = if self.should_rewrite(index, &request)? {
            self.rewrite(request, &version)
        } else {
            request
        };

        request
            .extensions_mut()
            .insert(NegotiatedVersion(version));
        Ok(request)
    }
}

pub(crate) fn prefix_version<B>(request: Request<B>, version: &VersionLabel) -> Request<B> {
    let (mut parts, body) = request.into_parts();
    let original = parts.uri.clone();

    let path = match original.path() {
        "" | "/" => format!("/{version}"),
        path => format!("/{version}{path}"),
    };
    let path_and_query = match original.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };

    let mut uri_parts = original.clone().into_parts();
    match PathAndQuery::try_from(path_and_query) {
        Ok(path_and_query) => uri_parts.path_and_query = Some(path_and_query),
        Err(e) => {
            tracing::warn!(error = %e, uri = %original, "Could not rewrite request path");
            return Request::from_parts(parts, body);
        }
    }

    match Uri::from_parts(uri_parts) {
        Ok(uri) => {
            tracing::debug!(from = %original, to = %uri, "Rewrote request path");
            parts.uri = uri;
            if parts.extensions.get::<OriginalUri>().is_none() {
                parts.extensions.insert(OriginalUri(original));
            }
            parts.extensions.insert(Rewritten);
        }
        Err(e) => {
            tracing::warn!(error = %e, uri = %original, "Could not rewrite request path");
        }
    }

    Request::from_parts(parts, body)
}
