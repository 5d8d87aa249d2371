//! End-to-end route generation for a list of site names.
//!
//! Resolves names against the catalog, loads the road network around the
//! configured center, snaps every stop and hands the snapped stops to the
//! [`RouteAssembler`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::assembler::{AssemblyEvent, RouteAssembler};
use crate::domain::{RoutePlan, Stop, TourSite, TravelMode};
use crate::error::RouteError;
use crate::mapbox::DirectionsProvider;
use crate::routing::{Center, RoadGraphProvider};
use crate::sites::SiteCatalog;
use crate::snap::snap_site;

/// Shared, read-only route generation context.
pub struct RoutePlanner<P> {
    catalog: Arc<SiteCatalog>,
    roads: RoadGraphProvider,
    center: Center,
    provider: P,
    concurrent_legs: bool,
}

impl<P: DirectionsProvider> RoutePlanner<P> {
    pub fn new(
        catalog: Arc<SiteCatalog>,
        roads: RoadGraphProvider,
        center: Center,
        provider: P,
    ) -> Self {
        Self {
            catalog,
            roads,
            center,
            provider,
            concurrent_legs: false,
        }
    }

    pub fn with_concurrent_legs(mut self, concurrent: bool) -> Self {
        self.concurrent_legs = concurrent;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn catalog(&self) -> &SiteCatalog {
        &self.catalog
    }

    /// Center of the road network.
    pub fn center(&self) -> Center {
        self.center
    }

    pub fn radius_m(&self) -> f64 {
        self.roads.radius_m()
    }

    /// Resolves every name, failing on the first unknown one.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<&TourSite>, RouteError> {
        names
            .iter()
            .map(|name| {
                self.catalog
                    .get(name)
                    .ok_or_else(|| RouteError::UnknownSite(name.clone()))
            })
            .collect()
    }

    /// Resolves and snaps the named sites, in the given order.
    pub async fn snap_stops(&self, names: &[String]) -> Result<Vec<Stop>, RouteError> {
        let sites = self.resolve(names)?;
        let network = self.roads.load(self.center).await?;
        debug!(
            "Snapping {} stops onto {} road edges",
            sites.len(),
            network.edge_count()
        );

        sites
            .into_iter()
            .map(|site| Ok(Stop::new(site.name.clone(), snap_site(&network, site)?)))
            .collect()
    }

    pub async fn plan(&self, names: &[String], mode: TravelMode) -> Result<RoutePlan, RouteError> {
        self.plan_with_progress(names, mode, |_| {}).await
    }

    /// Generates a route, reporting progress.
    ///
    /// Fewer than two names fail before the road network is loaded or any
    /// routing request is made.
    pub async fn plan_with_progress<F>(
        &self,
        names: &[String],
        mode: TravelMode,
        mut on_event: F,
    ) -> Result<RoutePlan, RouteError>
    where
        F: FnMut(AssemblyEvent) + Send,
    {
        if names.len() < 2 {
            return Err(RouteError::InsufficientStops(names.len()));
        }
        info!("Planning {} route over {} stops", mode, names.len());

        let stops = self.snap_stops(names).await?;
        on_event(AssemblyEvent::Snapped { stops: stops.len() });

        RouteAssembler::new(&self.provider)
            .with_concurrent_legs(self.concurrent_legs)
            .assemble_with_progress(&stops, mode, on_event)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tests::{ok_directions, Call, ScriptedProvider};
    use crate::assembler::AssemblyState;
    use crate::routing::tests::{seeded_provider, temp_cache_dir};

    fn catalog() -> Arc<SiteCatalog> {
        Arc::new(
            SiteCatalog::new(vec![
                TourSite::new("A", 127.482, 36.641),
                TourSite::new("B", 127.491, 36.645),
                TourSite::new("C", 127.498, 36.639),
            ])
            .unwrap(),
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_plan_snaps_then_routes() {
        let center = Center::new(36.63331, 127.43331);
        let roads = seeded_provider(center, 3101.0).await;
        let provider = ScriptedProvider::with_directions(vec![
            ok_directions(120.0, 900.0),
            ok_directions(180.0, 1100.0),
        ]);
        let planner = RoutePlanner::new(catalog(), roads, center, provider);

        let mut events = Vec::new();
        let plan = planner
            .plan_with_progress(&names(&["A", "B", "C"]), TravelMode::Walking, |e| events.push(e))
            .await
            .unwrap();

        assert_eq!(plan.visit_order(), &["A", "B", "C"]);
        assert_eq!(plan.total_duration_minutes(), 5.0);
        assert_eq!(events[0], AssemblyEvent::Snapped { stops: 3 });
        assert_eq!(events.last(), Some(&AssemblyEvent::State(AssemblyState::Complete)));

        let calls = planner.provider.calls.lock();
        let Call::Directions(_, from, to) = &calls[0] else {
            panic!("expected a directions call");
        };
        // A snaps onto the east-west street, B onto the north-south one
        assert!((from.y - 36.640).abs() < 1e-9);
        assert!((from.x - 127.482).abs() < 1e-9);
        assert!((to.x - 127.490).abs() < 1e-9);
        assert!((to.y - 36.645).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_too_few_names_skips_road_network() {
        // Nothing is cached and Overpass is unreachable, so any load would fail
        let roads = RoadGraphProvider::new("http://127.0.0.1:9/interpreter", temp_cache_dir(), 3102.0);
        let planner = RoutePlanner::new(
            catalog(),
            roads,
            Center::new(36.63332, 127.43332),
            ScriptedProvider::default(),
        );

        let result = planner.plan(&names(&["A"]), TravelMode::Driving).await;
        assert!(matches!(result, Err(RouteError::InsufficientStops(1))));
        assert_eq!(planner.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_site_rejected_before_routing() {
        let center = Center::new(36.63333, 127.43333);
        let roads = seeded_provider(center, 3103.0).await;
        let planner = RoutePlanner::new(catalog(), roads, center, ScriptedProvider::default());

        let result = planner.plan(&names(&["A", "Atlantis"]), TravelMode::Walking).await;
        assert!(matches!(result, Err(RouteError::UnknownSite(name)) if name == "Atlantis"));
        assert_eq!(planner.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_road_network_failure_surfaces() {
        let fallback = Center::new(36.63334, 127.43334);
        let roads = RoadGraphProvider::new("http://127.0.0.1:9/interpreter", temp_cache_dir(), 3104.0)
            .with_fallback(fallback);
        let planner = RoutePlanner::new(catalog(), roads, fallback, ScriptedProvider::default());

        let result = planner.plan(&names(&["A", "B"]), TravelMode::Walking).await;
        assert!(matches!(result, Err(RouteError::RoadGraph(_))));
        assert_eq!(planner.provider.call_count(), 0);
    }
}
