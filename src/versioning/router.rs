//! Versioned router
//!
//! [`VersionedRouterBuilder`] runs the whole startup sequence (bind, index,
//! expand, materialise) and produces a [`VersionedRouter`]: a tower service
//! that negotiates the version of each request before handing it to the axum
//! router built from the same index. Index and router live together in one
//! snapshot that a rebuild replaces in a single atomic swap.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::Request;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{self, IntoMakeService, MethodFilter, MethodRouter};
use axum::{Json, Router};
use futures::future::BoxFuture;
use tower::{Service, ServiceExt};
use tower_http::trace::TraceLayer;

use super::dispatch::Dispatcher;
use super::expander::{apply, path_shape, Route, RouteRegistry, RouteTable};
use super::handler::{HandlerGroup, HandlerSource};
use super::negotiator::{prefix_version, NegotiatedVersion, Rewritten, VersionNegotiator};
use super::registry::{bind, Endpoint, VersionIndex};
use crate::api::common::tracing::{
    make_custom_span, on_custom_failure, on_custom_request, on_custom_response,
};
use crate::config::VersioningConfig;
use crate::errors::VersioningError;

/// Collects handler groups and settings for a [`VersionedRouter`].
pub struct VersionedRouterBuilder<S = ()> {
    config: VersioningConfig,
    groups: Vec<HandlerGroup<S>>,
    catalog_path: Option<String>,
}

impl<S> VersionedRouterBuilder<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(config: VersioningConfig) -> Self {
        Self {
            config,
            groups: Vec::new(),
            catalog_path: None,
        }
    }

    pub fn group(mut self, group: HandlerGroup<S>) -> Self {
        self.groups.push(group);
        self
    }

    pub fn groups<I>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = HandlerGroup<S>>,
    {
        self.groups.extend(groups);
        self
    }

    pub fn source<H: HandlerSource<S>>(self, source: &H) -> Self {
        self.groups(source.handler_groups())
    }

    /// Serves the [`VersionCatalog`](super::VersionCatalog) as JSON at `path`.
    pub fn catalog(mut self, path: impl Into<String>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    pub fn build_with_state(self, state: S) -> Result<VersionedRouter, VersioningError> {
        let snapshot = self.snapshot(state)?;
        Ok(VersionedRouter {
            current: Arc::new(ArcSwap::from_pointee(snapshot)),
        })
    }

    #[tracing::instrument(name = "build_versioned_router", skip_all, fields(enabled = self.config.enabled))]
    fn snapshot(self, state: S) -> Result<Snapshot, VersioningError> {
        let groups: Vec<HandlerGroup> = self
            .groups
            .into_iter()
            .map(|group| group.with_state(state.clone()))
            .collect();
        let endpoints = bind(groups)?;
        let mut table = RouteRegistry::new();

        if !self.config.enabled {
            tracing::info!("API versioning disabled, mounting operations at their declared paths");
            // several versions of one operation usually share a bare path;
            // the first declaration serves it
            for endpoint in &endpoints {
                for route in Route::bare(endpoint) {
                    let description = route.to_string();
                    match table.register(route) {
                        Ok(()) => {}
                        Err(error @ VersioningError::RouteConflict { .. }) => {
                            tracing::warn!(
                                route = %description,
                                error = %error,
                                "Bare path already mounted, skipping"
                            );
                        }
                        Err(error) => return Err(error),
                    }
                }
            }
            let index = Arc::new(VersionIndex::empty());
            let router = materialize(&table, &index, self.catalog_path.as_deref())?;
            return Ok(Snapshot {
                index,
                negotiator: None,
                router,
            });
        }

        let index = Arc::new(VersionIndex::build(&endpoints)?);

        for endpoint in endpoints.iter().filter(|e| !e.is_versioned()) {
            for route in Route::bare(endpoint) {
                table.register(route)?;
            }
        }

        let versioned: Vec<&Arc<Endpoint>> =
            endpoints.iter().filter(|e| e.is_versioned()).collect();
        for endpoint in &versioned {
            apply(&mut table, endpoint)?;
        }
        for endpoint in &versioned {
            let key = endpoint.key();
            for path in endpoint.bare_paths() {
                for version in endpoint.versions() {
                    table.register_alias(&path, endpoint.operation().method(), version, &key)?;
                }
            }
        }

        tracing::info!(
            routes = table.routes().count(),
            aliases = table.aliases().count(),
            latest = %index.latest_version(),
            header = %self.config.header,
            policy = %self.config.rewrite_policy,
            "Built versioned router"
        );

        let router = materialize(&table, &index, self.catalog_path.as_deref())?;
        Ok(Snapshot {
            index,
            negotiator: Some(VersionNegotiator::new(
                self.config.header,
                self.config.rewrite_policy,
            )),
            router,
        })
    }
}

impl VersionedRouterBuilder<()> {
    pub fn build(self) -> Result<VersionedRouter, VersioningError> {
        self.build_with_state(())
    }
}

fn dispatch_route(dispatcher: Dispatcher, filter: MethodFilter) -> MethodRouter {
    routing::on(filter, move |request: Request| dispatcher.dispatch(request))
}

/// Serves a bare path by re-routing the request to `/{negotiated}{path}`.
fn alias_route(index: Arc<VersionIndex>, resolved: Router, filter: MethodFilter) -> MethodRouter {
    routing::on(filter, move |mut request: Request| async move {
        // a prefixed request that missed every versioned route
        if request.extensions().get::<Rewritten>().is_some() {
            return unmatched(request).await;
        }

        let negotiated = request
            .extensions()
            .get::<NegotiatedVersion>()
            .map(|negotiated| negotiated.0.clone());
        let version = match negotiated {
            Some(version) => version,
            None => {
                let latest = index.latest_version();
                request
                    .extensions_mut()
                    .insert(NegotiatedVersion(latest.clone()));
                latest
            }
        };

        tracing::debug!(
            path = %request.uri().path(),
            version = %version,
            "Routing negotiated alias"
        );
        resolved
            .oneshot(prefix_version(request, &version))
            .await
            .unwrap_or_else(|never| match never {})
    })
}

fn method_filter(method: &Method) -> Result<MethodFilter, VersioningError> {
    MethodFilter::try_from(method.clone()).map_err(|e| {
        VersioningError::ConfigurationAbsent(format!("method {method} cannot be routed: {e}"))
    })
}

async fn unmatched(request: Request) -> Response {
    let path = request.uri().path().to_string();

    if request.extensions().get::<Rewritten>().is_some() {
        if let Some(NegotiatedVersion(version)) = request.extensions().get::<NegotiatedVersion>() {
            return VersioningError::NoMatchingEndpoint {
                version: version.clone(),
                endpoint: path,
            }
            .into_response();
        }
    }

    VersioningError::NotFound(path).into_response()
}

/// Method routers keyed by path, merged when several methods share one.
#[derive(Default)]
struct Mounts(BTreeMap<String, MethodRouter>);

impl Mounts {
    fn mount(&mut self, path: String, method_router: MethodRouter) {
        let merged = match self.0.remove(&path) {
            Some(existing) => existing.merge(method_router),
            None => method_router,
        };
        self.0.insert(path, merged);
    }

    fn into_router(self) -> Router {
        self.0
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(&path, method_router)
            })
    }
}

/// Turns the route table into the serving router.
///
/// Versioned and unversioned routes form the primary router. Aliases live in a
/// second router consulted only when the primary one has no match; they
/// re-enter the primary router under the negotiated version.
fn materialize(
    table: &RouteRegistry,
    index: &Arc<VersionIndex>,
    catalog_path: Option<&str>,
) -> Result<Router, VersioningError> {
    let mut primary = Mounts::default();

    for route in table.routes() {
        let method_router = match &route.version {
            Some(version) => dispatch_route(
                Dispatcher::new(Arc::clone(index), route.endpoint.key(), version.clone()),
                route.endpoint.operation().filter,
            ),
            None => route.endpoint.operation().handler.clone(),
        };
        primary.mount(route.path.clone(), method_router);
    }

    if let Some(path) = catalog_path {
        table.check_path(path, &Method::GET, "version catalog")?;
        if let Some(alias) = table
            .aliases()
            .find(|alias| path_shape(&alias.path) == path_shape(path))
        {
            return Err(VersioningError::RouteConflict {
                method: Method::GET.to_string(),
                path: path.to_string(),
                first: format!("alias {} {}", alias.method, alias.path),
                second: "version catalog".to_string(),
            });
        }
        let catalog = index.catalog();
        primary.mount(
            path.to_string(),
            routing::get(move || async move { Json(catalog) }),
        );
    }

    let primary = primary.into_router();
    let resolved = primary.clone().fallback(unmatched);

    let router = if table.aliases().next().is_none() {
        resolved
    } else {
        let mut aliases = Mounts::default();
        for alias in table.aliases() {
            aliases.mount(
                alias.mount_path(),
                alias_route(Arc::clone(index), resolved.clone(), method_filter(&alias.method)?),
            );
        }
        primary.fallback_service(aliases.into_router().fallback(unmatched))
    };

    Ok(router.layer(
        TraceLayer::new_for_http()
            .make_span_with(make_custom_span::<Body>)
            .on_request(on_custom_request::<Body>)
            .on_response(on_custom_response::<Body>)
            .on_failure(on_custom_failure),
    ))
}

struct Snapshot {
    index: Arc<VersionIndex>,
    negotiator: Option<VersionNegotiator>,
    router: Router,
}

impl Snapshot {
    async fn handle(self: Arc<Self>, request: Request) -> Response {
        let request = match &self.negotiator {
            Some(negotiator) => match negotiator.prepare(&self.index, request) {
                Ok(request) => request,
                Err(error) => return error.into_response(),
            },
            None => request,
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {})
    }
}

/// Version-aware HTTP service.
///
/// Cloning is cheap; every clone serves from the same, swappable snapshot.
#[derive(Clone)]
pub struct VersionedRouter {
    current: Arc<ArcSwap<Snapshot>>,
}

impl VersionedRouter {
    /// Index of the snapshot currently serving requests.
    pub fn index(&self) -> Arc<VersionIndex> {
        Arc::clone(&self.current.load().index)
    }

    /// Replaces the serving snapshot after a topology change.
    ///
    /// The new snapshot is fully built before it is installed; if the build
    /// fails the current one keeps serving.
    pub fn rebuild_with_state<S>(
        &self,
        builder: VersionedRouterBuilder<S>,
        state: S,
    ) -> Result<(), VersioningError>
    where
        S: Clone + Send + Sync + 'static,
    {
        let snapshot = builder.snapshot(state)?;
        self.current.store(Arc::new(snapshot));
        tracing::info!("Installed rebuilt versioned router");
        Ok(())
    }

    pub fn rebuild(&self, builder: VersionedRouterBuilder<()>) -> Result<(), VersioningError> {
        self.rebuild_with_state(builder, ())
    }

    pub fn into_make_service(self) -> IntoMakeService<Self> {
        axum::ServiceExt::<Request>::into_make_service(self)
    }
}

impl Service<Request> for VersionedRouter {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let snapshot = self.current.load_full();
        Box::pin(async move { Ok(snapshot.handle(request).await) })
    }
}
