//! Tour site catalog and municipal boundary loading.
//!
//! Sites come from a GeoJSON file of point features with a `name` property,
//! or from the built-in catalog in [`crate::demo_data`]. The catalog is loaded
//! once at startup and never changes afterwards.

use std::collections::HashMap;
use std::path::Path;

use geo::{Centroid, MultiPolygon};
use geojson::{Feature, GeoJson};
use rstar::primitives::GeomWithData;
use rstar::{PointDistance, RTree};
use thiserror::Error;
use tracing::{info, warn};

use crate::demo_data;
use crate::domain::TourSite;
use crate::routing::{Center, FALLBACK_CENTER};

/// Maximum planar distance, in degrees, between a clicked coordinate and the
/// site it selects (about 100 m).
pub const CLICK_RADIUS_DEG: f64 = 0.001;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("duplicate site name: {0}")]
    DuplicateName(String),

    #[error("catalog contains no usable sites")]
    Empty,
}

type SiteEntry = GeomWithData<[f64; 2], usize>;

/// Immutable set of named tour sites with a nearest-site index.
pub struct SiteCatalog {
    sites: Vec<TourSite>,
    by_name: HashMap<String, usize>,
    index: RTree<SiteEntry>,
}

impl SiteCatalog {
    /// Builds a catalog, rejecting duplicate names.
    pub fn new(sites: Vec<TourSite>) -> Result<Self, CatalogError> {
        if sites.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut by_name = HashMap::with_capacity(sites.len());
        for (idx, site) in sites.iter().enumerate() {
            if by_name.insert(site.name.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateName(site.name.clone()));
            }
        }

        let index = RTree::bulk_load(
            sites
                .iter()
                .enumerate()
                .filter(|(_, s)| s.longitude.is_finite() && s.latitude.is_finite())
                .map(|(idx, s)| SiteEntry::new([s.longitude, s.latitude], idx))
                .collect(),
        );

        Ok(Self {
            sites,
            by_name,
            index,
        })
    }

    /// The built-in Cheongju catalog.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::new(demo_data::cheongju_sites())
    }

    /// Parses a GeoJSON document of point features.
    ///
    /// Features without a string `name` property or without point geometry
    /// are skipped with a warning.
    pub fn from_geojson_str(text: &str) -> Result<Self, CatalogError> {
        let geojson: GeoJson = text.parse()?;
        let features = features_of(geojson);

        let mut sites = Vec::with_capacity(features.len());
        for (idx, feature) in features.into_iter().enumerate() {
            let Some(name) = feature_name(&feature) else {
                warn!("Skipping site feature {} without a name", idx);
                continue;
            };
            let point = feature
                .geometry
                .and_then(|g| geo::Geometry::<f64>::try_from(g).ok())
                .and_then(|g| match g {
                    geo::Geometry::Point(p) => Some(p),
                    _ => None,
                });
            match point {
                Some(p) => sites.push(TourSite::new(name, p.x(), p.y())),
                None => warn!("Skipping site {} without point geometry", name),
            }
        }

        Self::new(sites)
    }

    /// Loads a GeoJSON site file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        let catalog = Self::from_geojson_str(&text)?;
        info!("Loaded {} tour sites from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&TourSite> {
        self.by_name.get(name).map(|&idx| &self.sites[idx])
    }

    /// All sites in catalog order.
    pub fn all(&self) -> &[TourSite] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Mean position of all sites, used to center map views.
    pub fn center(&self) -> Center {
        let n = self.sites.len() as f64;
        let (lat, lon) = self
            .sites
            .iter()
            .fold((0.0, 0.0), |(lat, lon), s| (lat + s.latitude, lon + s.longitude));
        Center::new(lat / n, lon / n)
    }

    /// Site closest to a clicked coordinate, if within [`CLICK_RADIUS_DEG`].
    ///
    /// Distance is planar on degrees.
    pub fn nearest_site(&self, lon: f64, lat: f64) -> Option<&TourSite> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        let query = [lon, lat];
        let entry = self.index.nearest_neighbor(&query)?;
        if entry.distance_2(&query) <= CLICK_RADIUS_DEG * CLICK_RADIUS_DEG {
            Some(&self.sites[entry.data])
        } else {
            None
        }
    }
}

fn features_of(geojson: GeoJson) -> Vec<Feature> {
    match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![Feature::from(g)],
    }
}

fn feature_name(feature: &Feature) -> Option<String> {
    feature
        .properties
        .as_ref()?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// Centroid of every polygon in a GeoJSON boundary document.
///
/// Returns `Ok(None)` when the document has no polygons.
pub fn boundary_centroid_from_str(text: &str) -> Result<Option<Center>, CatalogError> {
    let geojson: GeoJson = text.parse()?;
    let mut polygons = Vec::new();
    for feature in features_of(geojson) {
        match feature.geometry.map(geo::Geometry::<f64>::try_from) {
            Some(Ok(geo::Geometry::Polygon(p))) => polygons.push(p),
            Some(Ok(geo::Geometry::MultiPolygon(mp))) => polygons.extend(mp.0),
            _ => {}
        }
    }
    Ok(MultiPolygon::new(polygons)
        .centroid()
        .map(|p| Center::new(p.y(), p.x())))
}

/// Substitutes the fallback center for a missing or non-finite centroid.
///
/// ```
/// use tour_routing::routing::{Center, FALLBACK_CENTER};
/// use tour_routing::sites::resolve_center;
///
/// assert_eq!(resolve_center(Some(Center::new(f64::NAN, 127.0))), FALLBACK_CENTER);
/// assert_eq!(resolve_center(None), FALLBACK_CENTER);
/// assert_eq!(resolve_center(Some(Center::new(36.6, 127.5))), Center::new(36.6, 127.5));
/// ```
pub fn resolve_center(centroid: Option<Center>) -> Center {
    match centroid {
        Some(c) if c.is_finite() => c,
        _ => FALLBACK_CENTER,
    }
}

/// Loads the boundary file and resolves the road graph center.
///
/// Read or parse failures are logged and fall back like a missing centroid.
pub fn load_boundary_center(path: Option<&Path>) -> Center {
    let Some(path) = path else {
        info!("No boundary file configured, using fallback center");
        return FALLBACK_CENTER;
    };
    let centroid = std::fs::read_to_string(path)
        .map_err(CatalogError::from)
        .and_then(|text| boundary_centroid_from_str(&text));
    match centroid {
        Ok(c) => {
            let center = resolve_center(c);
            info!(
                "Boundary center ({:.5}, {:.5}) from {}",
                center.lat,
                center.lon,
                path.display()
            );
            center
        }
        Err(e) => {
            warn!("Failed to read boundary {}: {}, using fallback center", path.display(), e);
            FALLBACK_CENTER
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITES_GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "Museum"},
             "geometry": {"type": "Point", "coordinates": [127.4706, 36.6369]}},
            {"type": "Feature", "properties": {"name": "Fortress"},
             "geometry": {"type": "Point", "coordinates": [127.5319, 36.6542]}},
            {"type": "Feature", "properties": {"id": 7},
             "geometry": {"type": "Point", "coordinates": [127.0, 36.0]}},
            {"type": "Feature", "properties": {"name": "Trail"},
             "geometry": {"type": "LineString", "coordinates": [[127.0, 36.0], [127.1, 36.1]]}}
        ]
    }"#;

    #[test]
    fn test_load_point_features() {
        let catalog = SiteCatalog::from_geojson_str(SITES_GEOJSON).unwrap();
        assert_eq!(catalog.len(), 2);
        let museum = catalog.get("Museum").unwrap();
        assert_eq!(museum.longitude, 127.4706);
        assert_eq!(museum.latitude, 36.6369);
        assert!(catalog.get("Trail").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let sites = vec![
            TourSite::new("A", 127.0, 36.0),
            TourSite::new("A", 127.1, 36.1),
        ];
        assert!(matches!(
            SiteCatalog::new(sites),
            Err(CatalogError::DuplicateName(name)) if name == "A"
        ));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(matches!(SiteCatalog::new(vec![]), Err(CatalogError::Empty)));
    }

    #[test]
    fn test_invalid_geojson() {
        assert!(matches!(
            SiteCatalog::from_geojson_str("not json"),
            Err(CatalogError::GeoJson(_))
        ));
    }

    #[test]
    fn test_nearest_site_within_radius() {
        let catalog = SiteCatalog::from_geojson_str(SITES_GEOJSON).unwrap();
        let hit = catalog.nearest_site(127.4710, 36.6372).unwrap();
        assert_eq!(hit.name, "Museum");
    }

    #[test]
    fn test_nearest_site_too_far() {
        let catalog = SiteCatalog::from_geojson_str(SITES_GEOJSON).unwrap();
        assert!(catalog.nearest_site(127.4730, 36.6369).is_none());
        assert!(catalog.nearest_site(f64::NAN, 36.6369).is_none());
    }

    #[test]
    fn test_center_is_mean() {
        let catalog = SiteCatalog::new(vec![
            TourSite::new("A", 127.0, 36.0),
            TourSite::new("B", 128.0, 37.0),
        ])
        .unwrap();
        let c = catalog.center();
        assert!((c.lat - 36.5).abs() < 1e-12);
        assert!((c.lon - 127.5).abs() < 1e-12);
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = SiteCatalog::builtin().unwrap();
        assert!(catalog.get("Sangdangsanseong Fortress").is_some());
    }

    #[test]
    fn test_boundary_centroid() {
        let boundary = r#"{
            "type": "Feature",
            "properties": {"name": "city"},
            "geometry": {"type": "Polygon", "coordinates": [[
                [127.40, 36.60], [127.60, 36.60], [127.60, 36.70], [127.40, 36.70], [127.40, 36.60]
            ]]}
        }"#;
        let center = boundary_centroid_from_str(boundary).unwrap().unwrap();
        assert!((center.lat - 36.65).abs() < 1e-9);
        assert!((center.lon - 127.50).abs() < 1e-9);
    }

    #[test]
    fn test_boundary_without_polygons_falls_back() {
        let points_only = boundary_centroid_from_str(SITES_GEOJSON).unwrap();
        assert!(points_only.is_none());
        assert_eq!(resolve_center(points_only), FALLBACK_CENTER);
    }

    #[test]
    fn test_missing_boundary_file_falls_back() {
        let center = load_boundary_center(Some(Path::new("/nonexistent/boundary.geojson")));
        assert_eq!(center, FALLBACK_CENTER);
        assert_eq!(load_boundary_center(None), FALLBACK_CENTER);
    }
}
