//! Snapping tour sites onto the road network.
//!
//! Distances are planar Euclidean on raw longitude/latitude degrees. That is
//! not geodesic (a degree of longitude is shorter than a degree of latitude
//! away from the equator) but the ranking is close enough at the few-kilometer
//! scale of a single road graph.

use geo::{Distance, Euclidean, LineInterpolatePoint, LineLocatePoint, LineString, Point};
use ordered_float::OrderedFloat;
use tracing::{debug, warn};

use crate::domain::{SnappedPoint, TourSite};
use crate::error::RouteError;
use crate::routing::RoadNetwork;

/// Result of snapping a point to an edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snap {
    /// Index of the chosen edge in the edge collection.
    pub edge: usize,
    /// Projected point on that edge.
    pub point: SnappedPoint,
    /// Planar distance from the query point, in degrees.
    pub distance: f64,
}

/// Projects `point` onto `edge` by locating its fraction along the line and
/// interpolating at that fraction.
///
/// ```
/// use geo::{LineString, Point};
/// use tour_routing::snap::project_onto;
///
/// let edge = LineString::from(vec![(0.0, 0.0), (10.0, 0.0)]);
/// let p = project_onto(&edge, Point::new(4.0, 3.0)).unwrap();
/// assert!((p.x() - 4.0).abs() < 1e-12);
/// assert_eq!(p.y(), 0.0);
/// ```
pub fn project_onto(edge: &LineString<f64>, point: Point<f64>) -> Option<Point<f64>> {
    let fraction = edge.line_locate_point(&point)?;
    edge.line_interpolate_point(fraction)
}

/// Finds the nearest edge to `point` and the projection onto it.
///
/// Scans every edge. When several edges are equally close the first one in
/// scan order wins. Returns `None` for an empty collection or when no edge
/// yields a projection.
pub fn nearest_edge(edges: &[LineString<f64>], point: SnappedPoint) -> Option<Snap> {
    let query: Point<f64> = point.into();
    edges
        .iter()
        .enumerate()
        .filter_map(|(idx, edge)| {
            let projected = project_onto(edge, query)?;
            let distance = Euclidean.distance(&query, &projected);
            distance.is_finite().then_some(Snap {
                edge: idx,
                point: projected.into(),
                distance,
            })
        })
        .min_by_key(|snap| OrderedFloat(snap.distance))
}

/// Snaps `point`, falling back to the raw coordinate when no edge is usable.
pub fn snap_or_raw(edges: &[LineString<f64>], point: SnappedPoint) -> SnappedPoint {
    match nearest_edge(edges, point) {
        Some(snap) => snap.point,
        None => {
            warn!(
                "No road edge found near ({}, {}), using raw coordinate",
                point.x, point.y
            );
            point
        }
    }
}

/// Snaps a catalog site onto the road network.
///
/// Non-finite site coordinates cannot be snapped or routed and are rejected.
pub fn snap_site(network: &RoadNetwork, site: &TourSite) -> Result<SnappedPoint, RouteError> {
    if !site.longitude.is_finite() || !site.latitude.is_finite() {
        return Err(RouteError::SnapFailed(site.name.clone()));
    }
    let snapped = snap_or_raw(network.edges(), site.point());
    debug!(
        "Snapped {} ({:.6}, {:.6}) -> ({:.6}, {:.6})",
        site.name, site.longitude, site.latitude, snapped.x, snapped.y
    );
    Ok(snapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::tests::SMALL_OSM;

    fn line(coords: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(coords.to_vec())
    }

    #[test]
    fn test_projects_onto_nearest_edge() {
        let edges = vec![
            line(&[(0.0, 0.0), (10.0, 0.0)]),
            line(&[(0.0, 5.0), (10.0, 5.0)]),
        ];
        let snap = nearest_edge(&edges, SnappedPoint::new(3.0, 4.0)).unwrap();
        assert_eq!(snap.edge, 1);
        assert!((snap.point.x - 3.0).abs() < 1e-12);
        assert!((snap.point.y - 5.0).abs() < 1e-12);
        assert!((snap.distance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_projection_clamps_to_endpoint() {
        let edges = vec![line(&[(0.0, 0.0), (1.0, 0.0)])];
        let snap = nearest_edge(&edges, SnappedPoint::new(5.0, 1.0)).unwrap();
        assert!((snap.point.x - 1.0).abs() < 1e-12);
        assert!(snap.point.y.abs() < 1e-12);
    }

    #[test]
    fn test_projection_along_multi_segment_edge() {
        let edges = vec![line(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0)])];
        let snap = nearest_edge(&edges, SnappedPoint::new(3.0, 1.0)).unwrap();
        assert!((snap.point.x - 2.0).abs() < 1e-12);
        assert!((snap.point.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tie_takes_first_edge() {
        let edges = vec![
            line(&[(0.0, 1.0), (10.0, 1.0)]),
            line(&[(0.0, -1.0), (10.0, -1.0)]),
        ];
        let snap = nearest_edge(&edges, SnappedPoint::new(5.0, 0.0)).unwrap();
        assert_eq!(snap.edge, 0);
    }

    #[test]
    fn test_empty_edges_fall_back_to_raw() {
        let raw = SnappedPoint::new(127.48, 36.64);
        assert!(nearest_edge(&[], raw).is_none());
        assert_eq!(snap_or_raw(&[], raw), raw);
    }

    #[test]
    fn test_snap_is_idempotent() {
        let network = RoadNetwork::from_overpass_json(SMALL_OSM).unwrap();
        let site = TourSite::new("Museum", 127.4861, 36.6420);

        let first = snap_site(&network, &site).unwrap();
        let second = snap_site(&network, &site).unwrap();
        assert_eq!(first, second);
        // Lands on the east-west street at latitude 36.640
        assert!((first.y - 36.640).abs() < 1e-9);
        assert!((first.x - 127.4861).abs() < 1e-9);
    }

    #[test]
    fn test_snapped_point_is_fixed_point() {
        let network = RoadNetwork::from_overpass_json(SMALL_OSM).unwrap();
        let once = snap_or_raw(network.edges(), SnappedPoint::new(127.4953, 36.6478));
        let twice = snap_or_raw(network.edges(), once);
        assert!((once.x - twice.x).abs() < 1e-12);
        assert!((once.y - twice.y).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_site_fails() {
        let network = RoadNetwork::from_overpass_json(SMALL_OSM).unwrap();
        let site = TourSite::new("Nowhere", f64::NAN, 36.64);
        assert!(matches!(
            snap_site(&network, &site),
            Err(RouteError::SnapFailed(name)) if name == "Nowhere"
        ));
    }
}
