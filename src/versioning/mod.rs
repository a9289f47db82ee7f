//! Versioned endpoint routing
//!
//! Handler groups declare the versions they serve; each operation is mounted
//! once per version under `/{version}` and requests are dispatched to the
//! implementation registered for the version they negotiated through the
//! version header.

pub mod dispatch;
pub mod expander;
pub mod handler;
pub mod label;
pub mod negotiator;
pub mod registry;
pub mod resolver;
pub mod router;

pub use dispatch::substitute;
pub use expander::{
    apply, check_pattern, compatible, expand, path_shape, versioned_path, Alias, Route,
    RouteRegistry, RouteTable,
};
pub use handler::{Deprecation, HandlerGroup, HandlerSource, Operation, OperationKey};
pub use label::{LabelError, VersionLabel, VersionSet};
pub use negotiator::{NegotiatedVersion, RewritePolicy, VersionNegotiator, DEFAULT_VERSION_HEADER};
pub use registry::{bind, effective_versions, Endpoint, VersionIndex};
pub use resolver::VersionCatalog;
pub use router::{VersionedRouter, VersionedRouterBuilder};
