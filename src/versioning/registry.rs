//! Version registry builder
//!
//! Turns the declared handler population into an immutable [`VersionIndex`].
//! Collisions on `(version, name, arity)` are collected over the whole
//! population first and only then reported, so the diagnostic does not depend
//! on the order groups were declared in.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;
use tower::ServiceExt;

use super::handler::{HandlerGroup, Operation, OperationKey};
use super::label::{VersionLabel, VersionSet};
use crate::errors::VersioningError;

/// An operation bound to its owning group and effective version set.
#[derive(Debug)]
pub struct Endpoint {
    pub(crate) group: String,
    pub(crate) operation: Operation,
    pub(crate) versions: VersionSet,
}

impl Endpoint {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn key(&self) -> OperationKey {
        self.operation.key()
    }

    /// Effective version set; empty for unversioned operations.
    pub fn versions(&self) -> &VersionSet {
        &self.versions
    }

    pub fn is_versioned(&self) -> bool {
        !self.versions.is_empty()
    }

    /// Paths the operation declares, normalised to start with `/`.
    pub fn bare_paths(&self) -> Vec<String> {
        if self.operation.paths.is_empty() {
            return vec!["/".to_string()];
        }
        self.operation
            .paths
            .iter()
            .map(|path| {
                if path.starts_with('/') {
                    path.clone()
                } else {
                    format!("/{path}")
                }
            })
            .collect()
    }

    /// Invokes the operation; extractors run against the request as given.
    pub async fn call(&self, request: Request) -> Response {
        self.operation
            .handler
            .clone()
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {})
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.group, self.operation.key())
    }
}

fn parse_versions(owner: &str, declared: &[String]) -> Result<VersionSet, VersioningError> {
    declared
        .iter()
        .map(|raw| {
            VersionLabel::parse(raw).map_err(|source| VersioningError::InvalidVersionLabel {
                owner: owner.to_string(),
                label: raw.clone(),
                source,
            })
        })
        .collect()
}

/// Effective versions of `operation`: its own set when non-empty, else the group's.
pub fn effective_versions(
    group: &HandlerGroup,
    operation: &Operation,
) -> Result<VersionSet, VersioningError> {
    if operation.versions.is_empty() {
        parse_versions(&group.name, &group.versions)
    } else {
        let owner = format!("{}::{}", group.name, operation.key());
        parse_versions(&owner, &operation.versions)
    }
}

/// Binds every operation of every group to its effective version set.
#[tracing::instrument(name = "bind_handler_groups", skip_all)]
pub fn bind(groups: Vec<HandlerGroup>) -> Result<Vec<Arc<Endpoint>>, VersioningError> {
    let mut endpoints = Vec::new();

    for group in groups {
        let effective = group
            .operations
            .iter()
            .map(|operation| effective_versions(&group, operation))
            .collect::<Result<Vec<_>, _>>()?;

        for (operation, versions) in group.operations.into_iter().zip(effective) {
            endpoints.push(Arc::new(Endpoint {
                group: group.name.clone(),
                operation,
                versions,
            }));
        }
    }

    Ok(endpoints)
}

/// Version label → operation key → endpoint. Immutable once built.
#[derive(Debug, Default)]
pub struct VersionIndex {
    pub(crate) versions: BTreeMap<VersionLabel, HashMap<OperationKey, Arc<Endpoint>>>,
}

impl VersionIndex {
    /// An index with no versioned operation.
    pub fn empty() -> Self {
        Self::default()
    }

    #[tracing::instrument(name = "build_version_index", skip_all)]
    pub fn build(endpoints: &[Arc<Endpoint>]) -> Result<Self, VersioningError> {
        let mut candidates: BTreeMap<(VersionLabel, OperationKey), Vec<&Arc<Endpoint>>> =
            BTreeMap::new();

        for endpoint in endpoints.iter().filter(|endpoint| endpoint.is_versioned()) {
            for version in &endpoint.versions {
                candidates
                    .entry((version.clone(), endpoint.key()))
                    .or_default()
                    .push(endpoint);
            }
        }

        if let Some(((version, key), colliding)) =
            candidates.iter().find(|(_, colliding)| colliding.len() > 1)
        {
            let mut names: Vec<String> = colliding.iter().map(|e| e.to_string()).collect();
            names.sort();
            return Err(VersioningError::AmbiguousRegistration {
                version: version.clone(),
                key: key.clone(),
                first: names[0].clone(),
                second: names[1].clone(),
            });
        }

        let mut versions: BTreeMap<VersionLabel, HashMap<OperationKey, Arc<Endpoint>>> =
            BTreeMap::new();
        for ((version, key), mut colliding) in candidates {
            if let Some(endpoint) = colliding.pop() {
                versions
                    .entry(version)
                    .or_default()
                    .insert(key, Arc::clone(endpoint));
            }
        }

        tracing::info!(
            versions = versions.len(),
            operations = endpoints.iter().filter(|e| e.is_versioned()).count(),
            "Built version index"
        );

        Ok(Self { versions })
    }

    /// Builds the index straight from declarations.
    pub fn from_groups(groups: Vec<HandlerGroup>) -> Result<Self, VersioningError> {
        Self::build(&bind(groups)?)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok() -> &'static str {
        "ok"
    }

    fn label(raw: &str) -> VersionLabel {
        VersionLabel::parse(raw).unwrap()
    }

    fn set(raw: &[&str]) -> VersionSet {
        raw.iter().map(|r| label(r)).collect()
    }

    #[test]
    fn operation_without_override_inherits_group_versions() {
        let group = HandlerGroup::new("channels")
            .versions(["1", "2"])
            .operation(Operation::get("list", ok));

        let versions = effective_versions(&group, &group.operations[0]).unwrap();
        assert_eq!(versions, set(&["1", "2"]));
    }

    #[test]
    fn operation_override_wins_over_group_versions() {
        let group = HandlerGroup::new("channels")
            .versions(["1", "2"])
            .operation(Operation::get("list", ok).versions(["5"]));

        let versions = effective_versions(&group, &group.operations[0]).unwrap();
        assert_eq!(versions, set(&["5"]));
    }

    #[test]
    fn unversioned_operations_stay_out_of_the_index() {
        let index = VersionIndex::from_groups(vec![
            HandlerGroup::new("system").operation(Operation::get("health", ok).path("/health")),
            HandlerGroup::new("channels")
                .versions(["1"])
                .operation(Operation::get("list", ok)),
        ])
        .unwrap();

        assert_eq!(index.versions.len(), 1);
        let v1 = &index.versions[&label("1")];
        assert!(v1.contains_key(&OperationKey::new("list", 0)));
        assert!(!v1.contains_key(&OperationKey::new("health", 0)));
    }

    #[test]
    fn override_on_an_otherwise_unversioned_group_is_indexed() {
        let index = VersionIndex::from_groups(vec![HandlerGroup::new("misc")
            .operation(Operation::get("beta", ok).versions(["beta"]))
            .operation(Operation::get("plain", ok))])
        .unwrap();

        assert_eq!(index.versions.len(), 1);
        assert!(index.versions[&label("beta")].contains_key(&OperationKey::new("beta", 0)));
    }

    #[test]
    fn collision_on_version_name_and_arity_fails_the_build() {
        let error = VersionIndex::from_groups(vec![
            HandlerGroup::new("b_group")
                .versions(["1", "2"])
                .operation(Operation::get("test", ok)),
            HandlerGroup::new("a_group")
                .versions(["2", "3"])
                .operation(Operation::post("test", ok)),
        ])
        .unwrap_err();

        match error {
            VersioningError::AmbiguousRegistration {
                version,
                key,
                first,
                second,
            } => {
                assert_eq!(version, label("2"));
                assert_eq!(key, OperationKey::new("test", 0));
                assert_eq!(first, "a_group::test/0");
                assert_eq!(second, "b_group::test/0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn collision_report_does_not_depend_on_declaration_order() {
        let build = |flip: bool| {
            let mut groups = vec![
                HandlerGroup::new("a").versions(["1"]).operation(Operation::get("x", ok)),
                HandlerGroup::new("b").versions(["1"]).operation(Operation::get("x", ok)),
            ];
            if flip {
                groups.reverse();
            }
            VersionIndex::from_groups(groups).unwrap_err().to_string()
        };

        assert_eq!(build(false), build(true));
    }

    #[test]
    fn same_name_with_different_arity_does_not_collide() {
        let index = VersionIndex::from_groups(vec![HandlerGroup::new("channels")
            .versions(["1"])
            .operation(Operation::get("find", ok))
            .operation(Operation::get("find", ok).arity(1))])
        .unwrap();

        assert_eq!(index.versions[&label("1")].len(), 2);
    }

    #[test]
    fn invalid_declared_label_names_its_owner() {
        let error = VersionIndex::from_groups(vec![HandlerGroup::new("channels")
            .versions(["1"])
            .operation(Operation::get("list", ok).versions(["v/2"]))])
        .unwrap_err();

        match error {
            VersioningError::InvalidVersionLabel { owner, label, .. } => {
                assert_eq!(owner, "channels::list/0");
                assert_eq!(label, "v/2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn endpoint_is_shared_across_its_versions() {
        let index = VersionIndex::from_groups(vec![HandlerGroup::new("channels")
            .versions(["1", "2"])
            .operation(Operation::get("list", ok))])
        .unwrap();

        let key = OperationKey::new("list", 0);
        let v1 = &index.versions[&label("1")][&key];
        let v2 = &index.versions[&label("2")][&key];
        assert!(Arc::ptr_eq(v1, v2));
    }

    #[test]
    fn bare_paths_are_normalised() {
        let endpoints = bind(vec![HandlerGroup::new("g")
            .operation(Operation::get("root", ok))
            .operation(Operation::get("items", ok).path("items").path("/things"))])
        .unwrap();

        assert_eq!(endpoints[0].bare_paths(), vec!["/"]);
        assert_eq!(endpoints[1].bare_paths(), vec!["/items", "/things"]);
    }
}
