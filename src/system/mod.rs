//! System-level routes

pub mod health_check;

use crate::api::AppState;
use crate::versioning::{HandlerGroup, Operation};

/// Unversioned endpoints; mounted at their own paths.
pub fn handler_group() -> HandlerGroup<AppState> {
    HandlerGroup::new("system")
        .operation(Operation::get("health_check", health_check::health_check).path("/health"))
}
