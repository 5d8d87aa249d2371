//! Domain model for tour route planning.
//!
//! # Overview
//!
//! - [`TourSite`]: a named point of interest from the site catalog
//! - [`SnappedPoint`]: a site coordinate projected onto the road network
//! - [`Stop`]: a named snapped point submitted for routing
//! - [`RouteLeg`]: one routing result (geometry, seconds, meters)
//! - [`RoutePlan`]: the assembled route with visit order and totals
//!
//! All coordinates are WGS84 and stored as `(longitude, latitude)`, the order
//! the routing API uses on the wire.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A named tourist site.
///
/// Names are unique within a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TourSite {
    /// Display name, unique within the catalog.
    pub name: String,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
}

impl TourSite {
    /// Creates a new site.
    pub fn new(name: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            name: name.into(),
            longitude,
            latitude,
        }
    }

    /// Raw (unsnapped) coordinate of this site.
    pub fn point(&self) -> SnappedPoint {
        SnappedPoint::new(self.longitude, self.latitude)
    }
}

/// A coordinate on (or near) the road network. `x` is longitude, `y` latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SnappedPoint {
    pub x: f64,
    pub y: f64,
}

impl SnappedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Formats as `lon,lat` for routing API paths.
    ///
    /// ```
    /// use tour_routing::domain::SnappedPoint;
    ///
    /// assert_eq!(SnappedPoint::new(127.48, 36.64).to_path_segment(), "127.48,36.64");
    /// ```
    pub fn to_path_segment(&self) -> String {
        format!("{},{}", self.x, self.y)
    }
}

impl From<SnappedPoint> for geo::Point<f64> {
    fn from(p: SnappedPoint) -> Self {
        geo::Point::new(p.x, p.y)
    }
}

impl From<geo::Point<f64>> for SnappedPoint {
    fn from(p: geo::Point<f64>) -> Self {
        SnappedPoint::new(p.x(), p.y())
    }
}

/// A stop submitted to the route assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub name: String,
    pub point: SnappedPoint,
}

impl Stop {
    pub fn new(name: impl Into<String>, point: SnappedPoint) -> Self {
        Self {
            name: name.into(),
            point,
        }
    }
}

/// Travel mode, mapped to the routing API profile name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
}

impl TravelMode {
    /// Routing profile name.
    ///
    /// ```
    /// use tour_routing::domain::TravelMode;
    ///
    /// assert_eq!(TravelMode::Driving.as_str(), "driving");
    /// assert_eq!(TravelMode::Walking.as_str(), "walking");
    /// ```
    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
        }
    }

    /// Whether a stop list of this length goes through trip optimization.
    ///
    /// Only driving routes with three or more stops are optimized; everything
    /// else is routed pairwise in submission order.
    pub fn uses_optimization(self, stop_count: usize) -> bool {
        self == TravelMode::Driving && stop_count >= 3
    }
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one routing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteLeg {
    /// Ordered `[lon, lat]` pairs.
    pub geometry: Vec<[f64; 2]>,
    /// Travel time in seconds.
    pub duration_seconds: f64,
    /// Distance in meters.
    pub distance_meters: f64,
}

/// An assembled route.
///
/// Immutable once built; totals are always the sums over `legs`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
    legs: Vec<RouteLeg>,
    visit_order: Vec<String>,
    mode: TravelMode,
    optimized: bool,
    total_duration_minutes: f64,
    total_distance_km: f64,
}

impl RoutePlan {
    /// Builds a plan from its legs, computing totals (sum-then-convert).
    ///
    /// # Examples
    ///
    /// ```
    /// use tour_routing::domain::{RouteLeg, RoutePlan, TravelMode};
    ///
    /// let leg = |s: f64, m: f64| RouteLeg { geometry: vec![], duration_seconds: s, distance_meters: m };
    /// let plan = RoutePlan::from_legs(
    ///     vec![leg(600.0, 1500.0), leg(300.0, 500.0)],
    ///     vec!["A".into(), "B".into(), "C".into()],
    ///     TravelMode::Walking,
    ///     false,
    /// );
    /// assert_eq!(plan.total_duration_minutes(), 15.0);
    /// assert_eq!(plan.total_distance_km(), 2.0);
    /// ```
    pub fn from_legs(
        legs: Vec<RouteLeg>,
        visit_order: Vec<String>,
        mode: TravelMode,
        optimized: bool,
    ) -> Self {
        let seconds: f64 = legs.iter().map(|l| l.duration_seconds).sum();
        let meters: f64 = legs.iter().map(|l| l.distance_meters).sum();
        Self {
            legs,
            visit_order,
            mode,
            optimized,
            total_duration_minutes: seconds / 60.0,
            total_distance_km: meters / 1000.0,
        }
    }

    pub fn legs(&self) -> &[RouteLeg] {
        &self.legs
    }

    /// Stop names in the order they are visited.
    pub fn visit_order(&self) -> &[String] {
        &self.visit_order
    }

    pub fn mode(&self) -> TravelMode {
        self.mode
    }

    /// Whether the visit order came from trip optimization.
    pub fn optimized(&self) -> bool {
        self.optimized
    }

    pub fn total_duration_minutes(&self) -> f64 {
        self.total_duration_minutes
    }

    pub fn total_distance_km(&self) -> f64 {
        self.total_distance_km
    }

    /// Full route geometry as `[lon, lat]` pairs.
    ///
    /// The first point of each subsequent leg repeats the last point of the
    /// previous one and is skipped.
    pub fn geometry(&self) -> Vec<[f64; 2]> {
        let mut coords: Vec<[f64; 2]> = Vec::new();
        for leg in &self.legs {
            let skip = match (coords.last(), leg.geometry.first()) {
                (Some(last), Some(first)) if last == first => 1,
                _ => 0,
            };
            coords.extend(leg.geometry.iter().skip(skip).copied());
        }
        coords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(geometry: Vec<[f64; 2]>, s: f64, m: f64) -> RouteLeg {
        RouteLeg {
            geometry,
            duration_seconds: s,
            distance_meters: m,
        }
    }

    #[test]
    fn test_totals_are_additive() {
        let legs = vec![
            leg(vec![], 125.0, 830.0),
            leg(vec![], 47.5, 212.0),
            leg(vec![], 903.0, 4100.0),
        ];
        let per_leg_minutes: f64 = legs.iter().map(|l| l.duration_seconds / 60.0).sum();
        let per_leg_km: f64 = legs.iter().map(|l| l.distance_meters / 1000.0).sum();

        let plan = RoutePlan::from_legs(legs, vec![], TravelMode::Driving, false);
        assert!((plan.total_duration_minutes() - per_leg_minutes).abs() < 1e-9);
        assert!((plan.total_distance_km() - per_leg_km).abs() < 1e-9);
    }

    #[test]
    fn test_geometry_skips_shared_joint() {
        let plan = RoutePlan::from_legs(
            vec![
                leg(vec![[0.0, 0.0], [1.0, 1.0]], 1.0, 1.0),
                leg(vec![[1.0, 1.0], [2.0, 2.0]], 1.0, 1.0),
            ],
            vec!["A".into(), "B".into(), "C".into()],
            TravelMode::Walking,
            false,
        );
        assert_eq!(plan.geometry(), vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]);
    }

    #[test]
    fn test_geometry_keeps_disjoint_points() {
        let plan = RoutePlan::from_legs(
            vec![
                leg(vec![[0.0, 0.0], [1.0, 1.0]], 1.0, 1.0),
                leg(vec![[1.5, 1.5], [2.0, 2.0]], 1.0, 1.0),
            ],
            vec![],
            TravelMode::Walking,
            false,
        );
        assert_eq!(plan.geometry().len(), 4);
    }

    #[test]
    fn test_uses_optimization() {
        assert!(!TravelMode::Driving.uses_optimization(2));
        assert!(TravelMode::Driving.uses_optimization(3));
        assert!(!TravelMode::Walking.uses_optimization(5));
    }

    #[test]
    fn test_travel_mode_serde() {
        let mode: TravelMode = serde_json::from_str("\"walking\"").unwrap();
        assert_eq!(mode, TravelMode::Walking);
        assert_eq!(serde_json::to_string(&TravelMode::Driving).unwrap(), "\"driving\"");
    }
}
