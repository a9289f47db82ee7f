//! Versioning settings read from the environment

use axum::http::HeaderName;

use crate::errors::VersioningError;
use crate::versioning::{RewritePolicy, DEFAULT_VERSION_HEADER};

#[derive(Debug, Clone)]
pub struct VersioningConfig {
    pub enabled: bool,
    pub header: HeaderName,
    pub rewrite_policy: RewritePolicy,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header: HeaderName::from_static(DEFAULT_VERSION_HEADER),
            rewrite_policy: RewritePolicy::default(),
        }
    }
}

impl VersioningConfig {
    /// Operations are mounted at their declared paths, no negotiation happens.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Reads `VERSIONING_ENABLED`, `VERSIONING_HEADER` and
    /// `VERSIONING_REWRITE_POLICY`.
    pub fn from_env() -> Result<Self, VersioningError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), but an unusable configuration turns
    /// versioning off instead of failing.
    pub fn from_env_or_disabled() -> Self {
        Self::from_env().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "API versioning disabled");
            Self::disabled()
        })
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, VersioningError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let enabled = match lookup("VERSIONING_ENABLED") {
            None => defaults.enabled,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(VersioningError::ConfigurationAbsent(format!(
                        "VERSIONING_ENABLED has invalid value {other:?}"
                    )))
                }
            },
        };

        let header = match lookup("VERSIONING_HEADER") {
            None => defaults.header,
            Some(raw) => HeaderName::try_from(raw.trim()).map_err(|e| {
                VersioningError::ConfigurationAbsent(format!(
                    "VERSIONING_HEADER {raw:?} is not a header name: {e}"
                ))
            })?,
        };

        let rewrite_policy = match lookup("VERSIONING_REWRITE_POLICY") {
            None => defaults.rewrite_policy,
            Some(raw) => raw.parse()?,
        };

        Ok(Self {
            enabled,
            header,
            rewrite_policy,
        })
    }
}
