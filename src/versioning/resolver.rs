//! Read-only queries against a built [`VersionIndex`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use super::handler::{Deprecation, OperationKey};
use super::label::VersionLabel;
use super::registry::{Endpoint, VersionIndex};
use crate::errors::VersioningError;

/// Serialisable summary of what each version exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionCatalog {
    pub latest: VersionLabel,
    pub versions: BTreeMap<VersionLabel, Vec<OperationKey>>,
}

impl VersionIndex {
    /// Highest numeric label in the index, or [`VersionLabel::zero`].
    pub fn latest_version(&self) -> VersionLabel {
        self.versions
            .keys()
            .filter(|label| label.is_numeric())
            .max()
            .cloned()
            .unwrap_or_else(VersionLabel::zero)
    }

    pub fn versions(&self) -> impl Iterator<Item = &VersionLabel> {
        self.versions.keys()
    }

    pub fn allowed_versions(&self, key: &OperationKey) -> BTreeSet<VersionLabel> {
        self.versions
            .iter()
            .filter(|(_, operations)| operations.contains_key(key))
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn resolve(
        &self,
        version: &VersionLabel,
        key: &OperationKey,
    ) -> Result<&Arc<Endpoint>, VersioningError> {
        self.versions
            .get(version)
            .and_then(|operations| operations.get(key))
            .ok_or_else(|| VersioningError::NoMatchingEndpoint {
                version: version.clone(),
                endpoint: key.to_string(),
            })
    }

    pub fn deprecation(&self, version: &VersionLabel, key: &OperationKey) -> Option<&Deprecation> {
        self.resolve(version, key)
            .ok()
            .and_then(|endpoint| endpoint.operation.deprecation.as_ref())
    }

    pub fn catalog(&self) -> VersionCatalog {
        let versions = self
            .versions
            .iter()
            .map(|(label, operations)| {
                let mut keys: Vec<OperationKey> = operations.keys().cloned().collect();
                keys.sort();
                (label.clone(), keys)
            })
            .collect();

        VersionCatalog {
            latest: self.latest_version(),
            versions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::{HandlerGroup, Operation};

    async fn ok() -> &'static str {
        "ok"
    }

    fn label(raw: &str) -> VersionLabel {
        VersionLabel::parse(raw).unwrap()
    }

    fn labels(raw: &[&str]) -> BTreeSet<VersionLabel> {
        raw.iter().map(|r| label(r)).collect()
    }

    fn scenario() -> VersionIndex {
        VersionIndex::from_groups(vec![HandlerGroup::new("test_controller")
            .versions(["1", "2", "3", "4"])
            .operation(Operation::get("test", ok).path("/test"))
            .operation(Operation::get("test3", ok).path("/test3").versions(["3"]))])
        .unwrap()
    }

    #[test]
    fn latest_of_empty_index_is_zero() {
        assert_eq!(VersionIndex::empty().latest_version(), VersionLabel::zero());
    }

    #[test]
    fn latest_is_the_numeric_maximum() {
        let index = VersionIndex::from_groups(vec![HandlerGroup::new("g")
            .versions(["2", "10", "9", "beta"])
            .operation(Operation::get("x", ok))])
        .unwrap();

        assert_eq!(index.latest_version(), label("10"));
    }

    #[test]
    fn latest_handles_labels_wider_than_u64() {
        let index = VersionIndex::from_groups(vec![HandlerGroup::new("g")
            .versions(["99999999999999999999", "100000000000000000000", "7"])
            .operation(Operation::get("x", ok))])
        .unwrap();

        assert_eq!(index.latest_version(), label("100000000000000000000"));
    }

    #[test]
    fn latest_ignores_non_numeric_labels() {
        let index = VersionIndex::from_groups(vec![HandlerGroup::new("g")
            .versions(["beta"])
            .operation(Operation::get("x", ok))])
        .unwrap();

        assert_eq!(index.latest_version(), VersionLabel::zero());
    }

    #[test]
    fn overrides_are_isolated_per_operation() {
        let index = scenario();

        assert_eq!(
            index.allowed_versions(&OperationKey::new("test", 0)),
            labels(&["1", "2", "3", "4"])
        );
        assert_eq!(
            index.allowed_versions(&OperationKey::new("test3", 0)),
            labels(&["3"])
        );
        assert!(index
            .allowed_versions(&OperationKey::new("missing", 0))
            .is_empty());

        let resolved = index
            .resolve(&label("3"), &OperationKey::new("test", 0))
            .unwrap();
        assert_eq!(resolved.key(), OperationKey::new("test", 0));
    }

    #[test]
    fn resolve_fails_for_unknown_version_or_key() {
        let index = scenario();

        assert!(matches!(
            index.resolve(&label("9"), &OperationKey::new("test", 0)),
            Err(VersioningError::NoMatchingEndpoint { .. })
        ));
        assert!(matches!(
            index.resolve(&label("1"), &OperationKey::new("test3", 0)),
            Err(VersioningError::NoMatchingEndpoint { .. })
        ));
        assert!(matches!(
            index.resolve(&label("1"), &OperationKey::new("test", 1)),
            Err(VersioningError::NoMatchingEndpoint { .. })
        ));
    }

    #[test]
    fn every_resolved_endpoint_supports_the_version_it_was_found_under() {
        let index = scenario();

        for (version, operations) in &index.versions {
            for key in operations.keys() {
                let endpoint = index.resolve(version, key).unwrap();
                assert!(endpoint.versions().contains(version));
            }
        }
    }

    #[test]
    fn deprecation_follows_the_resolved_operation() {
        let index = VersionIndex::from_groups(vec![
            HandlerGroup::new("old")
                .versions(["1"])
                .operation(Operation::get("list", ok).deprecated(Deprecation {
                    deprecated: Some("2024-01".to_string()),
                    removed: Some("2025-01".to_string()),
                })),
            HandlerGroup::new("new")
                .versions(["2"])
                .operation(Operation::get("list", ok)),
        ])
        .unwrap();

        let key = OperationKey::new("list", 0);
        let deprecation = index.deprecation(&label("1"), &key).unwrap();
        assert_eq!(deprecation.removed.as_deref(), Some("2025-01"));
        assert!(index.deprecation(&label("2"), &key).is_none());
    }

    #[test]
    fn catalog_lists_keys_per_version() {
        let catalog = scenario().catalog();

        assert_eq!(catalog.latest, label("4"));
        assert_eq!(catalog.versions.len(), 4);
        assert_eq!(
            catalog.versions[&label("3")],
            vec![OperationKey::new("test", 0), OperationKey::new("test3", 0)]
        );

        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(json["latest"], "4");
        assert_eq!(json["versions"]["1"][0]["name"], "test");
    }
}
