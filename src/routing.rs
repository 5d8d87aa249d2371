//! Road network loading from OpenStreetMap via the Overpass API.
//!
//! Downloads every `highway=*` way within a fixed radius of a center point,
//! builds a petgraph graph plus a flat edge collection used for snapping.
//! Results are memoized in memory (per-process, keyed by the exact center)
//! and persisted under the road cache directory.

use geo::LineString;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// In-memory cache of road networks, keyed by exact center and radius.
/// Lives for the whole process and is shared by every session.
static NETWORK_CACHE: OnceLock<RwLock<HashMap<CenterKey, Arc<RoadNetwork>>>> = OnceLock::new();

fn network_cache() -> &'static RwLock<HashMap<CenterKey, Arc<RoadNetwork>>> {
    NETWORK_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Default Overpass API URL.
pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Default radius of the loaded road network, in meters.
pub const DEFAULT_RADIUS_M: f64 = 3000.0;

/// Center used when the municipal centroid is unavailable (Cheongju city hall).
pub const FALLBACK_CENTER: Center = Center {
    lat: 36.6424,
    lon: 127.4890,
};

/// Error type for road network operations.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Network request failed.
    #[error("network error: {0}")]
    Network(String),
    /// Failed to parse OSM or cache data.
    #[error("parse error: {0}")]
    Parse(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Center coordinate is NaN or infinite.
    #[error("invalid center ({lat}, {lon})")]
    InvalidCenter { lat: f64, lon: f64 },
}

/// A geographic center point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

impl Center {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Cache key: bit patterns of the exact arguments, no rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CenterKey {
    lat: u64,
    lon: u64,
    radius: u64,
}

impl CenterKey {
    fn new(center: Center, radius_m: f64) -> Self {
        Self {
            lat: center.lat.to_bits(),
            lon: center.lon.to_bits(),
            radius: radius_m.to_bits(),
        }
    }
}

/// Node data in the road graph.
#[derive(Debug, Clone)]
struct NodeData {
    lat: f64,
    lng: f64,
}

/// Edge data in the road graph.
#[derive(Debug, Clone)]
struct EdgeData {
    /// Distance in meters.
    distance_m: f64,
    /// Position of this segment in the flat edge collection.
    segment: usize,
}

/// Road network graph built from OSM data.
pub struct RoadNetwork {
    /// Directed graph; two-way roads carry an edge in each direction.
    graph: DiGraph<NodeData, EdgeData>,
    /// Map from (lat_e7, lng_e7) to node index.
    coord_to_node: HashMap<(i64, i64), NodeIndex>,
    /// One line per road segment, in insertion order. Snapping scans this.
    edges: Vec<LineString<f64>>,
}

/// Loads road networks for a center point, with memoization and a single
/// retry against [`FALLBACK_CENTER`].
#[derive(Debug, Clone)]
pub struct RoadGraphProvider {
    overpass_url: String,
    cache_dir: PathBuf,
    radius_m: f64,
    fallback: Center,
    timeout: Duration,
}

impl RoadGraphProvider {
    pub fn new(
        overpass_url: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        radius_m: f64,
    ) -> Self {
        Self {
            overpass_url: overpass_url.into(),
            cache_dir: cache_dir.into(),
            radius_m,
            fallback: FALLBACK_CENTER,
            timeout: Duration::from_secs(180),
        }
    }

    /// Overrides the fallback center.
    pub fn with_fallback(mut self, fallback: Center) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Loads or fetches the road network around `center`.
    ///
    /// Uses three-tier caching:
    /// 1. In-memory cache (instant, per-process)
    /// 2. File cache (fast, persists across restarts)
    /// 3. Overpass API download (slow, ~5-30s)
    ///
    /// If the download fails and `center` is not the fallback center, the
    /// fallback center is tried once and its network is returned (and cached
    /// under both keys). Concurrent requests for the same center wait for the
    /// first download instead of repeating it.
    pub async fn load(&self, center: Center) -> Result<Arc<RoadNetwork>, RoutingError> {
        if !center.is_finite() {
            return Err(RoutingError::InvalidCenter {
                lat: center.lat,
                lon: center.lon,
            });
        }
        let key = CenterKey::new(center, self.radius_m);

        {
            let cache = network_cache().read().await;
            if let Some(network) = cache.get(&key) {
                debug!("Using in-memory cached road network for {:?}", center);
                return Ok(Arc::clone(network));
            }
        }

        let mut cache = network_cache().write().await;
        if let Some(network) = cache.get(&key) {
            debug!("Using in-memory cached road network for {:?}", center);
            return Ok(Arc::clone(network));
        }

        let network = match self.load_uncached(center).await {
            Ok(n) => Arc::new(n),
            Err(e) if center != self.fallback => {
                warn!(
                    "Road network for ({:.5}, {:.5}) failed ({}), retrying at fallback center",
                    center.lat, center.lon, e
                );
                let fallback_key = CenterKey::new(self.fallback, self.radius_m);
                let n = match cache.get(&fallback_key) {
                    Some(n) => Arc::clone(n),
                    None => Arc::new(self.load_uncached(self.fallback).await?),
                };
                cache.insert(fallback_key, Arc::clone(&n));
                n
            }
            Err(e) => return Err(e),
        };

        cache.insert(key, Arc::clone(&network));
        Ok(network)
    }

    /// File cache, then Overpass.
    async fn load_uncached(&self, center: Center) -> Result<RoadNetwork, RoutingError> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let cache_path = self.cache_path(center);

        if tokio::fs::try_exists(&cache_path).await.unwrap_or(false) {
            info!("Loading road network from file cache: {:?}", cache_path);
            match RoadNetwork::load_from_cache(&cache_path).await {
                Ok(n) => return Ok(n),
                Err(e) => info!("File cache invalid ({}), downloading fresh", e),
            }
        }

        info!("Downloading road network from Overpass API");
        let network = self.fetch(center).await?;
        network.save_to_cache(&cache_path).await?;
        info!("Saved road network to file cache: {:?}", cache_path);
        Ok(network)
    }

    /// Path of the file cache entry for a center.
    pub fn cache_path(&self, center: Center) -> PathBuf {
        self.cache_dir.join(format!(
            "{:.7}_{:.7}_{}.json",
            center.lat, center.lon, self.radius_m as i64
        ))
    }

    /// Downloads and builds the road network from Overpass API.
    async fn fetch(&self, center: Center) -> Result<RoadNetwork, RoutingError> {
        let query = overpass_query(center, self.radius_m);
        debug!("Overpass query:\n{}", query);

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(self.timeout)
            .user_agent(concat!("tour-routing/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RoutingError::Network(e.to_string()))?;

        info!(
            "Sending Overpass request for {:.0}m around ({:.4}, {:.4})",
            self.radius_m, center.lat, center.lon
        );

        let response = client
            .post(&self.overpass_url)
            .body(query)
            .header("Content-Type", "text/plain")
            .send()
            .await
            .map_err(|e| {
                error!("Overpass request failed: {}", e);
                RoutingError::Network(e.to_string())
            })?;

        info!("Received response: status={}", response.status());

        if !response.status().is_success() {
            return Err(RoutingError::Network(format!(
                "Overpass API returned status {}",
                response.status()
            )));
        }

        let osm_data: OverpassResponse = response
            .json()
            .await
            .map_err(|e| RoutingError::Parse(e.to_string()))?;

        info!("Downloaded {} OSM elements", osm_data.elements.len());

        let network = RoadNetwork::build_from_osm(&osm_data);
        if network.edge_count() == 0 {
            return Err(RoutingError::Parse(format!(
                "no roads within {:.0}m of ({:.5}, {:.5})",
                self.radius_m, center.lat, center.lon
            )));
        }
        Ok(network)
    }
}

/// Overpass QL for the "all" network type: every highway except ones that
/// are not (yet) roads or are private.
fn overpass_query(center: Center, radius_m: f64) -> String {
    format!(
        r#"[out:json][timeout:180];
(
  way["highway"]["area"!~"yes"]["highway"!~"abandoned|construction|no|planned|platform|proposed|raceway|razed"]["service"!~"private"]["access"!~"private"]
    (around:{},{},{});
);
(._;>;);
out body;"#,
        radius_m, center.lat, center.lon
    )
}

impl RoadNetwork {
    /// Creates an empty road network.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            coord_to_node: HashMap::new(),
            edges: Vec::new(),
        }
    }

    /// Builds a network from an Overpass JSON document.
    pub fn from_overpass_json(json: &str) -> Result<Self, RoutingError> {
        let osm: OverpassResponse =
            serde_json::from_str(json).map_err(|e| RoutingError::Parse(e.to_string()))?;
        Ok(Self::build_from_osm(&osm))
    }

    /// Builds the road network from parsed OSM data.
    fn build_from_osm(osm: &OverpassResponse) -> Self {
        let mut network = Self::new();

        // First pass: collect all nodes
        let mut nodes: HashMap<i64, (f64, f64)> = HashMap::new();
        for elem in &osm.elements {
            if elem.elem_type == "node" {
                if let (Some(lat), Some(lon)) = (elem.lat, elem.lon) {
                    nodes.insert(elem.id, (lat, lon));
                }
            }
        }

        debug!("Parsed {} nodes", nodes.len());

        // Second pass: ways become segments between consecutive nodes
        let mut way_count = 0;
        for elem in &osm.elements {
            if elem.elem_type != "way" {
                continue;
            }
            let Some(ref node_ids) = elem.nodes else {
                continue;
            };
            let oneway = elem.tags.as_ref().and_then(|t| t.oneway.as_deref());
            let is_oneway = matches!(oneway, Some("yes") | Some("1") | Some("true"));

            for window in node_ids.windows(2) {
                let Some(&(lat1, lng1)) = nodes.get(&window[0]) else {
                    continue;
                };
                let Some(&(lat2, lng2)) = nodes.get(&window[1]) else {
                    continue;
                };
                network.add_segment((lat1, lng1), (lat2, lng2), is_oneway);
            }
            way_count += 1;
        }

        info!(
            "Built graph with {} nodes and {} segments from {} ways",
            network.graph.node_count(),
            network.edges.len(),
            way_count
        );

        network
    }

    /// Adds a road segment between two `(lat, lng)` points.
    pub fn add_segment(&mut self, from: (f64, f64), to: (f64, f64), oneway: bool) {
        let idx1 = self.get_or_create_node(from.0, from.1);
        let idx2 = self.get_or_create_node(to.0, to.1);

        let segment = self.edges.len();
        self.edges
            .push(LineString::from(vec![(from.1, from.0), (to.1, to.0)]));

        let edge_data = EdgeData {
            distance_m: haversine_distance(from.0, from.1, to.0, to.1),
            segment,
        };
        self.graph.add_edge(idx1, idx2, edge_data.clone());
        if !oneway {
            self.graph.add_edge(idx2, idx1, edge_data);
        }
    }

    /// Gets or creates a node for the given coordinates.
    fn get_or_create_node(&mut self, lat: f64, lng: f64) -> NodeIndex {
        let key = coord_key(lat, lng);
        if let Some(&idx) = self.coord_to_node.get(&key) {
            idx
        } else {
            let idx = self.graph.add_node(NodeData { lat, lng });
            self.coord_to_node.insert(key, idx);
            idx
        }
    }

    /// Road segments as `(lon, lat)` line strings, in insertion order.
    pub fn edges(&self) -> &[LineString<f64>] {
        &self.edges
    }

    /// Returns the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of road segments.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Total length of all road segments, counting two-way roads once.
    pub fn total_length_km(&self) -> f64 {
        let mut seen = vec![false; self.edges.len()];
        let mut meters = 0.0;
        for edge in self.graph.edge_weights() {
            if !std::mem::replace(&mut seen[edge.segment], true) {
                meters += edge.distance_m;
            }
        }
        meters / 1000.0
    }

    /// Loads road network from cache file.
    async fn load_from_cache(path: &Path) -> Result<Self, RoutingError> {
        let data = tokio::fs::read_to_string(path).await?;

        // Parse cached data, handling corrupted files
        let cached: CachedNetwork = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                info!("Cache file corrupted, will re-download: {}", e);
                let _ = tokio::fs::remove_file(path).await;
                return Err(RoutingError::Parse(e.to_string()));
            }
        };

        if cached.version != CACHE_VERSION {
            info!(
                "Cache version mismatch (got {}, need {}), will re-download",
                cached.version, CACHE_VERSION
            );
            let _ = tokio::fs::remove_file(path).await;
            return Err(RoutingError::Parse("cache version mismatch".into()));
        }

        let mut network = Self::new();
        for edge in &cached.segments {
            let (Some(from), Some(to)) = (cached.nodes.get(edge.from), cached.nodes.get(edge.to))
            else {
                let _ = tokio::fs::remove_file(path).await;
                return Err(RoutingError::Parse("cache references missing node".into()));
            };
            network.add_segment((from.lat, from.lng), (to.lat, to.lng), edge.oneway);
        }

        Ok(network)
    }

    /// Saves road network to cache file.
    async fn save_to_cache(&self, path: &Path) -> Result<(), RoutingError> {
        let nodes: Vec<CachedNode> = self
            .graph
            .node_indices()
            .filter_map(|idx| {
                self.graph.node_weight(idx).map(|n| CachedNode {
                    lat: n.lat,
                    lng: n.lng,
                })
            })
            .collect();

        // One entry per segment; a segment is one-way when it has a single
        // directed edge.
        let mut segments: Vec<Option<CachedSegment>> = vec![None; self.edges.len()];
        for idx in self.graph.edge_indices() {
            let (Some((from, to)), Some(weight)) =
                (self.graph.edge_endpoints(idx), self.graph.edge_weight(idx))
            else {
                continue;
            };
            match segments[weight.segment].as_mut() {
                Some(existing) => existing.oneway = false,
                None => {
                    segments[weight.segment] = Some(CachedSegment {
                        from: from.index(),
                        to: to.index(),
                        oneway: true,
                    })
                }
            }
        }

        let cached = CachedNetwork {
            version: CACHE_VERSION,
            nodes,
            segments: segments.into_iter().flatten().collect(),
        };
        let data =
            serde_json::to_string(&cached).map_err(|e| RoutingError::Parse(e.to_string()))?;
        tokio::fs::write(path, data).await?;

        Ok(())
    }
}

impl Default for RoadNetwork {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// OSM Data Structures (Overpass API)
// ============================================================================

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OsmElement>,
}

#[derive(Debug, Deserialize)]
struct OsmElement {
    #[serde(rename = "type")]
    elem_type: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    nodes: Option<Vec<i64>>,
    tags: Option<OsmTags>,
}

#[derive(Debug, Deserialize)]
struct OsmTags {
    oneway: Option<String>,
}

// ============================================================================
// Cache Data Structures
// ============================================================================

/// Cache format version. Bump this when changing the cache structure.
const CACHE_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct CachedNetwork {
    /// Cache format version for automatic invalidation.
    version: u32,
    nodes: Vec<CachedNode>,
    segments: Vec<CachedSegment>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedNode {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedSegment {
    from: usize,
    to: usize,
    oneway: bool,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Converts coordinates to a hash key (7 decimal places precision).
fn coord_key(lat: f64, lng: f64) -> (i64, i64) {
    ((lat * 1e7).round() as i64, (lng * 1e7).round() as i64)
}

/// Haversine distance between two points in meters.
fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const R: f64 = 6_371_000.0; // Earth radius in meters

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    R * c
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two ways sharing node 2: a two-way east-west street and a one-way
    /// street heading north.
    pub(crate) const SMALL_OSM: &str = r#"{
        "elements": [
            {"type": "node", "id": 1, "lat": 36.640, "lon": 127.480},
            {"type": "node", "id": 2, "lat": 36.640, "lon": 127.490},
            {"type": "node", "id": 3, "lat": 36.650, "lon": 127.490},
            {"type": "node", "id": 4, "lat": 36.640, "lon": 127.500},
            {"type": "way", "id": 10, "nodes": [1, 2, 4], "tags": {"highway": "residential"}},
            {"type": "way", "id": 11, "nodes": [2, 3], "tags": {"highway": "footway", "oneway": "yes"}},
            {"type": "way", "id": 12, "nodes": [3, 99], "tags": {"highway": "path"}}
        ]
    }"#;

    pub(crate) fn temp_cache_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tour-routing-test-{}", uuid::Uuid::new_v4()))
    }

    /// Provider with an unreachable Overpass whose only road data is
    /// `SMALL_OSM`, file-cached for `center`. Callers pick a radius no other
    /// test uses so the process-wide memory cache cannot interfere.
    pub(crate) async fn seeded_provider(center: Center, radius_m: f64) -> RoadGraphProvider {
        let dir = temp_cache_dir();
        let provider = RoadGraphProvider::new("http://127.0.0.1:9/interpreter", &dir, radius_m);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        RoadNetwork::from_overpass_json(SMALL_OSM)
            .unwrap()
            .save_to_cache(&provider.cache_path(center))
            .await
            .unwrap();
        provider
    }

    #[test]
    fn test_haversine_distance() {
        // 0.01 degree of latitude is about 1.1 km
        let dist = haversine_distance(36.640, 127.480, 36.650, 127.480);
        assert!((dist - 1112.0).abs() < 5.0);
    }

    #[test]
    fn test_coord_key() {
        let key = coord_key(36.6424, 127.489);
        assert_eq!(key, (366424000, 1274890000));
    }

    #[test]
    fn test_empty_network() {
        let network = RoadNetwork::new();
        assert_eq!(network.node_count(), 0);
        assert_eq!(network.edge_count(), 0);
        assert!(network.edges().is_empty());
    }

    #[test]
    fn test_build_from_osm() {
        let network = RoadNetwork::from_overpass_json(SMALL_OSM).unwrap();
        // Way 12 references a missing node and contributes nothing
        assert_eq!(network.node_count(), 4);
        assert_eq!(network.edge_count(), 3);
        // Two two-way segments plus one one-way segment
        assert_eq!(network.graph.edge_count(), 5);

        let first = &network.edges()[0];
        assert_eq!(first.0[0].x, 127.480);
        assert_eq!(first.0[0].y, 36.640);
    }

    #[test]
    fn test_total_length_counts_two_way_once() {
        let network = RoadNetwork::from_overpass_json(SMALL_OSM).unwrap();
        let km = network.total_length_km();
        // 2 * ~0.895 km east-west plus ~1.11 km north
        assert!(km > 2.8 && km < 3.0, "got {}", km);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            RoadNetwork::from_overpass_json("{not json"),
            Err(RoutingError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_roundtrip_preserves_segments() {
        let dir = temp_cache_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("net.json");

        let network = RoadNetwork::from_overpass_json(SMALL_OSM).unwrap();
        network.save_to_cache(&path).await.unwrap();
        let restored = RoadNetwork::load_from_cache(&path).await.unwrap();

        assert_eq!(restored.edge_count(), network.edge_count());
        assert_eq!(restored.graph.edge_count(), network.graph.edge_count());
        assert_eq!(restored.edges(), network.edges());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_removed() {
        let dir = temp_cache_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("net.json");
        tokio::fs::write(&path, "garbage").await.unwrap();

        assert!(RoadNetwork::load_from_cache(&path).await.is_err());
        assert!(!path.exists());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_load_is_memoized_per_center() {
        let dir = temp_cache_dir();
        // Unreachable Overpass: only the file cache can satisfy the request
        let provider = RoadGraphProvider::new("http://127.0.0.1:9/interpreter", &dir, 1234.5);
        let center = Center::new(36.61111, 127.41111);

        tokio::fs::create_dir_all(&dir).await.unwrap();
        RoadNetwork::from_overpass_json(SMALL_OSM)
            .unwrap()
            .save_to_cache(&provider.cache_path(center))
            .await
            .unwrap();

        let first = provider.load(center).await.unwrap();
        // Removing the file proves the second call never touches disk
        tokio::fs::remove_dir_all(&dir).await.unwrap();
        let second = provider.load(center).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.edge_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_load_retries_fallback_center() {
        let dir = temp_cache_dir();
        let fallback = Center::new(36.62222, 127.42222);
        let provider = RoadGraphProvider::new("http://127.0.0.1:9/interpreter", &dir, 2345.5)
            .with_fallback(fallback);

        tokio::fs::create_dir_all(&dir).await.unwrap();
        RoadNetwork::from_overpass_json(SMALL_OSM)
            .unwrap()
            .save_to_cache(&provider.cache_path(fallback))
            .await
            .unwrap();

        // Nothing cached for this center and Overpass is unreachable
        let network = provider.load(Center::new(10.0, 10.0)).await.unwrap();
        assert_eq!(network.edge_count(), 3);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_invalid_center_rejected() {
        let provider = RoadGraphProvider::new(OVERPASS_URL, temp_cache_dir(), DEFAULT_RADIUS_M);
        let result = provider.load(Center::new(f64::NAN, 127.0)).await;
        assert!(matches!(result, Err(RoutingError::InvalidCenter { .. })));
    }
}
