//! Route table expansion
//!
//! Each versioned endpoint is mounted once per label under `/{label}`; its bare
//! path is taken out of the route table. What remains of it is a negotiated
//! alias: a request on the bare path is re-routed to `/{negotiated}{path}`, so
//! the alias never serves an operation itself.
//!
//! Routes are slotted by their *shape*, the path with parameter names erased,
//! because axum treats `/items/:id` and `/items/:item_id` as the same route and
//! refuses to mount both.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use super::handler::OperationKey;
use super::label::VersionLabel;
use super::registry::Endpoint;
use crate::errors::VersioningError;

/// A path + method bound to exactly one endpoint.
#[derive(Debug, Clone)]
pub struct Route {
    pub path: String,
    pub method: Method,
    pub version: Option<VersionLabel>,
    pub endpoint: Arc<Endpoint>,
}

impl Route {
    /// Routes an endpoint is mounted at before expansion.
    pub fn bare(endpoint: &Arc<Endpoint>) -> Vec<Route> {
        endpoint
            .bare_paths()
            .into_iter()
            .map(|path| Route {
                path,
                method: endpoint.operation.method.clone(),
                version: None,
                endpoint: Arc::clone(endpoint),
            })
            .collect()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.method, self.path, self.endpoint)
    }
}

/// A bare path of versioned operations, served through negotiation.
///
/// One alias covers every version whose operation declares this path and
/// method, even when the operation was renamed between versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub path: String,
    pub method: Method,
    pub versions: BTreeMap<VersionLabel, OperationKey>,
}

impl Alias {
    /// The alias path with parameters named by position, so aliases whose
    /// operations name their parameters differently can share one router.
    pub fn mount_path(&self) -> String {
        positional_path(&self.path)
    }
}

/// Registration surface of the host router.
pub trait RouteTable {
    fn register(&mut self, route: Route) -> Result<(), VersioningError>;

    fn unregister(&mut self, path: &str, method: &Method) -> Option<Route>;
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}

fn is_param(segment: &str) -> bool {
    segment.starts_with(':')
}

fn is_catch_all(segment: &str) -> bool {
    segment.starts_with('*')
}

/// `path` with parameter names erased: `/items/:id` becomes `/items/:`.
pub fn path_shape(path: &str) -> String {
    segments(path)
        .map(|segment| {
            if is_param(segment) {
                ":"
            } else if is_catch_all(segment) {
                "*"
            } else {
                segment
            }
        })
        .fold(String::new(), |shape, segment| shape + "/" + segment)
}

fn positional_path(path: &str) -> String {
    segments(path)
        .enumerate()
        .map(|(position, segment)| {
            if is_param(segment) {
                format!(":param{position}")
            } else if is_catch_all(segment) {
                format!("*param{position}")
            } else {
                segment.to_string()
            }
        })
        .fold(String::new(), |path, segment| path + "/" + &segment)
}

/// Rejects patterns the axum router would refuse to mount.
pub fn check_pattern(path: &str) -> Result<(), VersioningError> {
    let invalid = |reason: &str| VersioningError::InvalidRoutePattern {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if !path.starts_with('/') {
        return Err(invalid("path must start with '/'"));
    }

    let segments: Vec<&str> = segments(path).collect();
    for (position, segment) in segments.iter().enumerate() {
        if is_param(segment) || is_catch_all(segment) {
            let name = &segment[1..];
            if name.is_empty() {
                return Err(invalid("parameter without a name"));
            }
            if name.contains(':') || name.contains('*') {
                return Err(invalid("parameters must span a whole segment"));
            }
            if is_catch_all(segment) && position + 1 != segments.len() {
                return Err(invalid("catch-all must be the last segment"));
            }
        } else if segment.contains(':') || segment.contains('*') {
            return Err(invalid("parameters must span a whole segment"));
        }
    }

    Ok(())
}

/// Whether two patterns can be mounted in the same axum router.
///
/// Where both are still on a common prefix, parameters at the same position
/// must carry the same name, and a catch-all tolerates no sibling segment.
pub fn compatible(a: &str, b: &str) -> bool {
    for (x, y) in segments(a).zip(segments(b)) {
        if x == y {
            continue;
        }
        if is_catch_all(x) || is_catch_all(y) {
            return false;
        }
        // two statics, or a static beside a parameter: the paths diverge here
        return !(is_param(x) && is_param(y));
    }
    true
}

type RouteSlot = (String, String);

fn slot(path: &str, method: &Method) -> RouteSlot {
    (path_shape(path), method.as_str().to_string())
}

/// In-memory route table, materialised into an axum router once complete.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: BTreeMap<RouteSlot, Route>,
    aliases: BTreeMap<RouteSlot, Alias>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The route matching the same requests as `path` under `method`.
    pub fn get(&self, path: &str, method: &Method) -> Option<&Route> {
        self.routes.get(&slot(path, method))
    }

    pub fn contains(&self, path: &str, method: &Method) -> bool {
        self.routes.contains_key(&slot(path, method))
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &Alias> {
        self.aliases.values()
    }

    /// Fails when `path` cannot join the routes already registered.
    pub fn check_path(
        &self,
        path: &str,
        method: &Method,
        owner: &str,
    ) -> Result<(), VersioningError> {
        check_pattern(path)?;

        if let Some(existing) = self.get(path, method) {
            return Err(VersioningError::RouteConflict {
                method: method.to_string(),
                path: path.to_string(),
                first: existing.endpoint.to_string(),
                second: owner.to_string(),
            });
        }

        match self.routes().find(|existing| !compatible(&existing.path, path)) {
            Some(existing) => Err(VersioningError::RouteConflict {
                method: method.to_string(),
                path: path.to_string(),
                first: existing.to_string(),
                second: owner.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Records that `key` answers on the bare `path` in `version`.
    ///
    /// A bare path already held by an unversioned route stays with that route;
    /// the versioned operation is then reachable through its versioned paths
    /// only.
    pub fn register_alias(
        &mut self,
        path: &str,
        method: &Method,
        version: &VersionLabel,
        key: &OperationKey,
    ) -> Result<(), VersioningError> {
        check_pattern(path)?;

        let shape = path_shape(path);
        if let Some(route) = self
            .routes
            .values()
            .find(|route| route.version.is_none() && path_shape(&route.path) == shape)
        {
            tracing::warn!(
                path = %path,
                operation = %key,
                route = %route,
                "Bare path held by an unversioned route, not negotiating it"
            );
            return Ok(());
        }

        let slot = slot(path, method);
        if let Some(alias) = self.aliases.get_mut(&slot) {
            return match alias.versions.get(version) {
                Some(existing) if existing != key => Err(VersioningError::RouteConflict {
                    method: method.to_string(),
                    path: path.to_string(),
                    first: format!("{existing} in version {version}"),
                    second: format!("{key} in version {version}"),
                }),
                _ => {
                    alias.versions.insert(version.clone(), key.clone());
                    Ok(())
                }
            };
        }

        let alias = Alias {
            path: path.to_string(),
            method: method.clone(),
            versions: BTreeMap::from([(version.clone(), key.clone())]),
        };
        let mount_path = alias.mount_path();
        if let Some(other) = self
            .aliases
            .values()
            .find(|other| !compatible(&other.mount_path(), &mount_path))
        {
            return Err(VersioningError::RouteConflict {
                method: method.to_string(),
                path: path.to_string(),
                first: format!("alias {} {}", other.method, other.path),
                second: format!("alias of {key}"),
            });
        }

        self.aliases.insert(slot, alias);
        Ok(())
    }
}

impl RouteTable for RouteRegistry {
    fn register(&mut self, route: Route) -> Result<(), VersioningError> {
        self.check_path(&route.path, &route.method, &route.endpoint.to_string())?;
        self.routes.insert(slot(&route.path, &route.method), route);
        Ok(())
    }

    fn unregister(&mut self, path: &str, method: &Method) -> Option<Route> {
        self.routes.remove(&slot(path, method))
    }
}

/// `/{label}` joined with `sub_path`, without doubling the separator.
pub fn versioned_path(label: &VersionLabel, sub_path: Option<&str>) -> String {
    match sub_path {
        None | Some("") | Some("/") => format!("/{label}"),
        Some(path) if path.starts_with('/') => format!("/{label}{path}"),
        Some(path) => format!("/{label}/{path}"),
    }
}

/// One route per effective version and declared sub-path, all bound to `endpoint`.
pub fn expand(endpoint: &Arc<Endpoint>) -> Vec<Route> {
    let paths = &endpoint.operation.paths;

    endpoint
        .versions
        .iter()
        .flat_map(|label| {
            let sub_paths: Vec<Option<&str>> = if paths.is_empty() {
                vec![None]
            } else {
                paths.iter().map(|path| Some(path.as_str())).collect()
            };

            sub_paths.into_iter().map(move |sub_path| Route {
                path: versioned_path(label, sub_path),
                method: endpoint.operation.method.clone(),
                version: Some(label.clone()),
                endpoint: Arc::clone(endpoint),
            })
        })
        .collect()
}

/// Swaps the endpoint's unversioned routes for its versioned ones.
#[tracing::instrument(name = "expand_routes", skip_all, fields(endpoint = %endpoint))]
pub fn apply<T: RouteTable>(
    table: &mut T,
    endpoint: &Arc<Endpoint>,
) -> Result<Vec<Route>, VersioningError> {
    for bare in Route::bare(endpoint) {
        if let Some(previous) = table.unregister(&bare.path, &bare.method) {
            if !Arc::ptr_eq(&previous.endpoint, endpoint) {
                // someone else's route; put it back
                table.register(previous)?;
            } else {
                tracing::debug!(path = %bare.path, "Unregistered unversioned route");
            }
        }
    }

    let routes = expand(endpoint);
    for route in &routes {
        tracing::debug!(route = %route, "Registering versioned route");
        table.register(route.clone())?;
    }

    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::registry::bind;
    use crate::versioning::{HandlerGroup, Operation};

    async fn ok() -> &'static str {
        "ok"
    }

    fn label(raw: &str) -> VersionLabel {
        VersionLabel::parse(raw).unwrap()
    }

    fn endpoint(group: HandlerGroup) -> Arc<Endpoint> {
        bind(vec![group]).unwrap().remove(0)
    }

    #[test]
    fn versioned_path_inserts_exactly_one_separator() {
        let v = label("2");
        assert_eq!(versioned_path(&v, Some("/test")), "/2/test");
        assert_eq!(versioned_path(&v, Some("test")), "/2/test");
        assert_eq!(versioned_path(&v, None), "/2");
        assert_eq!(versioned_path(&v, Some("")), "/2");
        assert_eq!(versioned_path(&v, Some("/")), "/2");
    }

    #[test]
    fn expansion_replaces_the_bare_route_with_one_route_per_version() {
        let endpoint = endpoint(
            HandlerGroup::new("test_controller")
                .versions(["0", "1", "2"])
                .operation(Operation::get("test", ok).path("/test")),
        );

        let mut table = RouteRegistry::new();
        for route in Route::bare(&endpoint) {
            table.register(route).unwrap();
        }
        assert!(table.contains("/test", &Method::GET));

        let routes = apply(&mut table, &endpoint).unwrap();

        let mut paths: Vec<&str> = routes.iter().map(|r| r.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["/0/test", "/1/test", "/2/test"]);
        assert!(routes.iter().all(|r| Arc::ptr_eq(&r.endpoint, &endpoint)));

        assert!(!table.contains("/test", &Method::GET));
        assert_eq!(table.routes().count(), 3);
        for path in ["/0/test", "/1/test", "/2/test"] {
            let route = table.get(path, &Method::GET).unwrap();
            assert!(Arc::ptr_eq(&route.endpoint, &endpoint));
        }
    }

    #[test]
    fn duplicate_labels_expand_once() {
        let endpoint = endpoint(
            HandlerGroup::new("g")
                .versions(["1", "01", "1"])
                .operation(Operation::get("x", ok).path("x")),
        );

        let routes = expand(&endpoint);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/1/x");
        assert_eq!(routes[0].version, Some(label("1")));
    }

    #[test]
    fn operation_without_sub_path_is_a_version_root() {
        let endpoint = endpoint(
            HandlerGroup::new("g")
                .versions(["1", "2"])
                .operation(Operation::get("index", ok)),
        );

        let paths: Vec<String> = expand(&endpoint).into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/1", "/2"]);
    }

    #[test]
    fn every_declared_sub_path_is_expanded() {
        let endpoint = endpoint(
            HandlerGroup::new("g")
                .versions(["1"])
                .operation(Operation::get("x", ok).path("/a").path("b")),
        );

        let paths: Vec<String> = expand(&endpoint).into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/1/a", "/1/b"]);
    }

    #[test]
    fn apply_leaves_routes_of_other_endpoints_alone() {
        let endpoints = bind(vec![
            HandlerGroup::new("plain").operation(Operation::get("other", ok).path("/test")),
            HandlerGroup::new("versioned")
                .versions(["1"])
                .operation(Operation::get("test", ok).path("/test")),
        ])
        .unwrap();

        let mut table = RouteRegistry::new();
        for route in Route::bare(&endpoints[0]) {
            table.register(route).unwrap();
        }

        apply(&mut table, &endpoints[1]).unwrap();

        let kept = table.get("/test", &Method::GET).unwrap();
        assert!(Arc::ptr_eq(&kept.endpoint, &endpoints[0]));
        assert!(table.contains("/1/test", &Method::GET));
    }

    #[test]
    fn registering_the_same_path_and_method_twice_conflicts() {
        let endpoints = bind(vec![HandlerGroup::new("g")
            .operation(Operation::get("a", ok).path("/x"))
            .operation(Operation::get("b", ok).path("/x"))
            .operation(Operation::post("c", ok).path("/x"))])
        .unwrap();

        let mut table = RouteRegistry::new();
        table.register(Route::bare(&endpoints[0]).remove(0)).unwrap();
        table.register(Route::bare(&endpoints[2]).remove(0)).unwrap();

        let error = table
            .register(Route::bare(&endpoints[1]).remove(0))
            .unwrap_err();
        assert!(matches!(error, VersioningError::RouteConflict { .. }));
    }

    #[test]
    fn aliases_collect_one_key_per_version() {
        let mut table = RouteRegistry::new();
        let (v1, v2) = (label("1"), label("2"));
        let get_user = OperationKey::new("get_user", 0);
        let fetch_user = OperationKey::new("fetch_user", 0);

        table.register_alias("/users", &Method::GET, &v1, &get_user).unwrap();
        table.register_alias("/users", &Method::GET, &v1, &get_user).unwrap();
        table.register_alias("/users", &Method::GET, &v2, &fetch_user).unwrap();

        let aliases: Vec<&Alias> = table.aliases().collect();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].versions.get(&v1), Some(&get_user));
        assert_eq!(aliases[0].versions.get(&v2), Some(&fetch_user));

        assert!(matches!(
            table.register_alias("/users", &Method::GET, &v2, &get_user),
            Err(VersioningError::RouteConflict { .. })
        ));
    }

    #[test]
    fn aliases_with_renamed_parameters_share_a_slot() {
        let mut table = RouteRegistry::new();
        let show = OperationKey::new("show", 1);

        table
            .register_alias("/items/:id", &Method::GET, &label("1"), &show)
            .unwrap();
        table
            .register_alias("/items/:item_id", &Method::GET, &label("2"), &show)
            .unwrap();
        table
            .register_alias("/items/:item_id", &Method::DELETE, &label("2"), &show)
            .unwrap();

        let mounts: Vec<String> = table.aliases().map(Alias::mount_path).collect();
        assert_eq!(mounts, vec!["/items/:param1", "/items/:param1"]);
    }

    #[test]
    fn unversioned_route_keeps_its_bare_path() {
        let endpoints = bind(vec![
            HandlerGroup::new("plain").operation(Operation::get("plain", ok).path("/x")),
        ])
        .unwrap();

        let mut table = RouteRegistry::new();
        table.register(Route::bare(&endpoints[0]).remove(0)).unwrap();
        table
            .register_alias("/x", &Method::POST, &label("1"), &OperationKey::new("x", 0))
            .unwrap();

        assert_eq!(table.aliases().count(), 0);
        assert!(table.contains("/x", &Method::GET));
    }

    #[test]
    fn parameter_names_must_agree_across_routes() {
        let endpoints = bind(vec![HandlerGroup::new("g")
            .operation(Operation::get("show", ok).path("/items/:id"))
            .operation(Operation::delete("remove", ok).path("/items/:item_id"))
            .operation(Operation::get("again", ok).path("/items/:item_id"))
            .operation(Operation::get("tags", ok).path("/items/:item_id/tags"))])
        .unwrap();

        let mut table = RouteRegistry::new();
        table.register(Route::bare(&endpoints[0]).remove(0)).unwrap();

        for endpoint in &endpoints[1..] {
            let error = table.register(Route::bare(endpoint).remove(0)).unwrap_err();
            assert!(matches!(error, VersioningError::RouteConflict { .. }));
        }
        assert_eq!(table.routes().count(), 1);
    }

    #[test]
    fn shapes_and_compatibility() {
        assert_eq!(path_shape("/items/:id/*rest"), "/items/:/*");
        assert_eq!(path_shape("/"), "/");

        assert!(compatible("/items/:id", "/items/:id/tags"));
        assert!(compatible("/items/:id", "/items/new"));
        assert!(compatible("/1/items/:id", "/2/items/:item_id"));
        assert!(!compatible("/items/:id", "/items/:item_id/tags"));
        assert!(!compatible("/files/*path", "/files/index"));
    }

    #[test]
    fn malformed_patterns_are_reported() {
        for path in ["items", "/items/:", "/files/*path/raw", "/items/x:id", "/items/:a:b"] {
            assert!(
                matches!(
                    check_pattern(path),
                    Err(VersioningError::InvalidRoutePattern { .. })
                ),
                "{path}"
            );
        }
        assert!(check_pattern("/items/:id/*rest").is_ok());
    }
}
