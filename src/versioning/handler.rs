//! Explicit handler registration
//!
//! Controllers describe themselves with a [`HandlerGroup`] holding one
//! [`Operation`] per endpoint. Versions are plain strings here and are parsed
//! into [`VersionLabel`](super::VersionLabel)s when the index is built.

use std::fmt;

use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{self, MethodFilter, MethodRouter};
use serde::Serialize;

/// Identity used to match an operation across versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OperationKey {
    pub name: String,
    pub arity: usize,
}

impl OperationKey {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// Deprecation metadata attached to an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Deprecation {
    /// When (or in which release) the operation was deprecated.
    pub deprecated: Option<String>,
    /// When (or in which release) the operation is going away.
    pub removed: Option<String>,
}

/// One invocable endpoint of a [`HandlerGroup`].
pub struct Operation<S = ()> {
    pub(crate) name: String,
    pub(crate) arity: usize,
    pub(crate) method: Method,
    pub(crate) filter: MethodFilter,
    pub(crate) paths: Vec<String>,
    pub(crate) versions: Vec<String>,
    pub(crate) deprecation: Option<Deprecation>,
    pub(crate) handler: MethodRouter<S>,
}

impl<S> Operation<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn on<H, T>(name: impl Into<String>, method: Method, filter: MethodFilter, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        Self {
            name: name.into(),
            arity: 0,
            method,
            filter,
            paths: Vec::new(),
            versions: Vec::new(),
            deprecation: None,
            handler: routing::on(filter, handler),
        }
    }

    pub fn get<H, T>(name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        Self::on(name, Method::GET, MethodFilter::GET, handler)
    }

    pub fn post<H, T>(name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        Self::on(name, Method::POST, MethodFilter::POST, handler)
    }

    pub fn put<H, T>(name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        Self::on(name, Method::PUT, MethodFilter::PUT, handler)
    }

    pub fn patch<H, T>(name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        Self::on(name, Method::PATCH, MethodFilter::PATCH, handler)
    }

    pub fn delete<H, T>(name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        Self::on(name, Method::DELETE, MethodFilter::DELETE, handler)
    }

    /// Number of parameters the operation takes; part of its [`OperationKey`].
    pub fn arity(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    /// Adds a sub-path. Without any, the operation is mounted at the version root.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Overrides the versions declared by the owning group.
    pub fn versions<I, V>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.versions = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn deprecated(mut self, deprecation: Deprecation) -> Self {
        self.deprecation = Some(deprecation);
        self
    }

    pub fn key(&self) -> OperationKey {
        OperationKey::new(self.name.clone(), self.arity)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub(crate) fn with_state(self, state: S) -> Operation {
        Operation {
            name: self.name,
            arity: self.arity,
            method: self.method,
            filter: self.filter,
            paths: self.paths,
            versions: self.versions,
            deprecation: self.deprecation,
            handler: self.handler.with_state(state),
        }
    }
}

impl<S> fmt::Debug for Operation<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("method", &self.method)
            .field("paths", &self.paths)
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}

/// A controller: a named set of operations sharing default versions.
#[derive(Debug)]
pub struct HandlerGroup<S = ()> {
    pub(crate) name: String,
    pub(crate) versions: Vec<String>,
    pub(crate) operations: Vec<Operation<S>>,
}

impl<S> HandlerGroup<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: Vec::new(),
            operations: Vec::new(),
        }
    }

    pub fn versions<I, V>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.versions = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn operation(mut self, operation: Operation<S>) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operations(&self) -> &[Operation<S>] {
        &self.operations
    }

    pub(crate) fn with_state(self, state: S) -> HandlerGroup {
        HandlerGroup {
            name: self.name,
            versions: self.versions,
            operations: self
                .operations
                .into_iter()
                .map(|operation| operation.with_state(state.clone()))
                .collect(),
        }
    }
}

/// Supplies the handler population at startup and on topology changes.
pub trait HandlerSource<S = ()> {
    fn handler_groups(&self) -> Vec<HandlerGroup<S>>;
}

impl<S, F> HandlerSource<S> for F
where
    F: Fn() -> Vec<HandlerGroup<S>>,
{
    fn handler_groups(&self) -> Vec<HandlerGroup<S>> {
        self()
    }
}
