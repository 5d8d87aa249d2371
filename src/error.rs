//! Error type for route assembly.

use thiserror::Error;

use crate::mapbox::UpstreamError;
use crate::routing::RoutingError;

/// Why a route could not be produced.
///
/// Every failure is all-or-nothing: no variant carries a partial plan.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Fewer than two stops were selected. Raised before any network call.
    #[error("at least 2 stops are required to build a route (got {0})")]
    InsufficientStops(usize),

    /// A stop name is not in the site catalog.
    #[error("unknown tour site: {0}")]
    UnknownSite(String),

    /// A stop could not be placed on the road network.
    #[error("could not snap {0} to the road network")]
    SnapFailed(String),

    /// The road network itself could not be loaded.
    #[error("road network unavailable: {0}")]
    RoadGraph(#[from] RoutingError),

    /// The routing service failed (transport error or non-200 status).
    #[error("routing service unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),

    /// The routing service answered without a usable route.
    #[error("routing service returned no {key} for leg {leg}")]
    UpstreamEmptyResult { key: &'static str, leg: usize },
}

impl RouteError {
    /// Whether the caller's input was at fault (as opposed to a collaborator).
    pub fn is_client_error(&self) -> bool {
        matches!(self, RouteError::InsufficientStops(_) | RouteError::UnknownSite(_))
    }
}
