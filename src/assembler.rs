//! Multi-leg route assembly.
//!
//! Turns an ordered list of snapped stops into a [`RoutePlan`], either with
//! one trip optimization call (driving, three or more stops) or with one
//! directions call per consecutive pair of stops.
//!
//! Assembly is all-or-nothing: the first failed or empty response aborts the
//! whole route and no partial plan is returned.

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::domain::{RouteLeg, RoutePlan, Stop, TravelMode};
use crate::error::RouteError;
use crate::mapbox::{ApiWaypoint, DirectionsProvider};

/// Lifecycle of one route generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssemblyState {
    /// Nothing requested yet, or reset.
    #[default]
    Idle,
    /// Waiting on the routing service.
    Requesting,
    /// At least one leg received, more may follow.
    Accumulating,
    /// All legs received; a plan exists.
    Complete,
    /// Assembly aborted; no plan exists.
    Failed,
}

impl AssemblyState {
    pub fn as_str(self) -> &'static str {
        match self {
            AssemblyState::Idle => "IDLE",
            AssemblyState::Requesting => "REQUESTING",
            AssemblyState::Accumulating => "ACCUMULATING",
            AssemblyState::Complete => "COMPLETE",
            AssemblyState::Failed => "FAILED",
        }
    }
}

/// Progress notification emitted while assembling.
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyEvent {
    /// All stops were placed on the road network. Precedes any request.
    Snapped { stops: usize },
    State(AssemblyState),
    /// Leg `index` of `total` was received.
    LegReceived { index: usize, total: usize },
}

/// Assembles routes against a [`DirectionsProvider`].
pub struct RouteAssembler<'a, P> {
    provider: &'a P,
    concurrent_legs: bool,
}

impl<'a, P: DirectionsProvider> RouteAssembler<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            concurrent_legs: false,
        }
    }

    /// Issue pairwise leg requests concurrently instead of one after another.
    /// Leg order in the plan is unaffected.
    pub fn with_concurrent_legs(mut self, concurrent: bool) -> Self {
        self.concurrent_legs = concurrent;
        self
    }

    /// Assembles a route over `stops` in the given mode.
    pub async fn assemble(
        &self,
        stops: &[Stop],
        mode: TravelMode,
    ) -> Result<RoutePlan, RouteError> {
        self.assemble_with_progress(stops, mode, |_| {}).await
    }

    /// Assembles a route, reporting state transitions and received legs.
    ///
    /// The callback sees `Requesting` first and exactly one of `Complete` or
    /// `Failed` last. Fewer than two stops fail immediately without any
    /// request and without any event.
    pub async fn assemble_with_progress<F>(
        &self,
        stops: &[Stop],
        mode: TravelMode,
        mut on_event: F,
    ) -> Result<RoutePlan, RouteError>
    where
        F: FnMut(AssemblyEvent) + Send,
    {
        if stops.len() < 2 {
            return Err(RouteError::InsufficientStops(stops.len()));
        }

        on_event(AssemblyEvent::State(AssemblyState::Requesting));
        let result = if mode.uses_optimization(stops.len()) {
            self.assemble_optimized(stops, mode, &mut on_event).await
        } else if self.concurrent_legs {
            self.assemble_concurrent(stops, mode, &mut on_event).await
        } else {
            self.assemble_pairwise(stops, mode, &mut on_event).await
        };

        match &result {
            Ok(plan) => {
                info!(
                    "Route complete: {} stops, {} legs, {:.1} min, {:.2} km",
                    plan.visit_order().len(),
                    plan.legs().len(),
                    plan.total_duration_minutes(),
                    plan.total_distance_km()
                );
                on_event(AssemblyEvent::State(AssemblyState::Complete));
            }
            Err(e) => {
                warn!("Route generation failed: {}", e);
                on_event(AssemblyEvent::State(AssemblyState::Failed));
            }
        }
        result
    }

    async fn assemble_pairwise<F>(
        &self,
        stops: &[Stop],
        mode: TravelMode,
        on_event: &mut F,
    ) -> Result<RoutePlan, RouteError>
    where
        F: FnMut(AssemblyEvent) + Send,
    {
        let total = stops.len() - 1;
        let mut legs: Vec<RouteLeg> = Vec::with_capacity(total);

        for (index, pair) in stops.windows(2).enumerate() {
            let response = self
                .provider
                .directions(mode, pair[0].point, pair[1].point)
                .await?;
            let route = response
                .routes
                .into_iter()
                .next()
                .ok_or(RouteError::UpstreamEmptyResult {
                    key: "routes",
                    leg: index,
                })?;
            legs.push(route.into());

            if index == 0 {
                on_event(AssemblyEvent::State(AssemblyState::Accumulating));
            }
            on_event(AssemblyEvent::LegReceived { index, total });
        }

        Ok(RoutePlan::from_legs(legs, stop_names(stops), mode, false))
    }

    async fn assemble_concurrent<F>(
        &self,
        stops: &[Stop],
        mode: TravelMode,
        on_event: &mut F,
    ) -> Result<RoutePlan, RouteError>
    where
        F: FnMut(AssemblyEvent) + Send,
    {
        let total = stops.len() - 1;
        let requests = stops.windows(2).enumerate().map(|(index, pair)| async move {
            let response = self
                .provider
                .directions(mode, pair[0].point, pair[1].point)
                .await?;
            response
                .routes
                .into_iter()
                .next()
                .map(RouteLeg::from)
                .ok_or(RouteError::UpstreamEmptyResult {
                    key: "routes",
                    leg: index,
                })
        });

        let legs = try_join_all(requests).await?;

        on_event(AssemblyEvent::State(AssemblyState::Accumulating));
        for index in 0..total {
            on_event(AssemblyEvent::LegReceived { index, total });
        }

        Ok(RoutePlan::from_legs(legs, stop_names(stops), mode, false))
    }

    async fn assemble_optimized<F>(
        &self,
        stops: &[Stop],
        mode: TravelMode,
        on_event: &mut F,
    ) -> Result<RoutePlan, RouteError>
    where
        F: FnMut(AssemblyEvent) + Send,
    {
        let points: Vec<_> = stops.iter().map(|s| s.point).collect();
        let response = self.provider.optimized_trip(mode, &points).await?;

        let trip = response
            .trips
            .into_iter()
            .next()
            .ok_or(RouteError::UpstreamEmptyResult {
                key: "trips",
                leg: 0,
            })?;
        let order = visit_order(stops, &response.waypoints)?;

        on_event(AssemblyEvent::State(AssemblyState::Accumulating));
        on_event(AssemblyEvent::LegReceived { index: 0, total: 1 });

        Ok(RoutePlan::from_legs(vec![trip.into()], order, mode, true))
    }
}

fn stop_names(stops: &[Stop]) -> Vec<String> {
    stops.iter().map(|s| s.name.clone()).collect()
}

/// Re-sorts the submitted stop names by the `waypoint_index` returned for the
/// waypoint at the same submitted position.
///
/// The indices must be a permutation of `0..n` that keeps the first stop
/// first and the last stop last.
fn visit_order(stops: &[Stop], waypoints: &[ApiWaypoint]) -> Result<Vec<String>, RouteError> {
    let invalid = || RouteError::UpstreamEmptyResult {
        key: "waypoints",
        leg: 0,
    };
    let n = stops.len();
    if waypoints.len() != n
        || waypoints[0].waypoint_index != 0
        || waypoints[n - 1].waypoint_index != n - 1
    {
        return Err(invalid());
    }

    let mut order: Vec<Option<&str>> = vec![None; n];
    for (waypoint, stop) in waypoints.iter().zip(stops) {
        let slot = order.get_mut(waypoint.waypoint_index).ok_or_else(invalid)?;
        if slot.is_some() {
            return Err(invalid());
        }
        *slot = Some(stop.name.as_str());
    }

    Ok(order.into_iter().flatten().map(str::to_string).collect())
}
