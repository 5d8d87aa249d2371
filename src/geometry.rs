//! Geometry export for route visualization.
//!
//! Implements Google Polyline encoding for compact route transmission and a
//! GeoJSON export for map clients.
//! See: <https://developers.google.com/maps/documentation/utilities/polylinealgorithm>

use geo::{LineString, Point};
use geojson::{Feature, FeatureCollection, Geometry, Value as GeoJsonValue};
use serde_json::{json, Map, Value as JsonValue};
use utoipa::ToSchema;

use crate::domain::{RoutePlan, TourSite};

/// Encodes `(lat, lng)` pairs using the Google Polyline Algorithm.
///
/// Each coordinate is the difference from the previous point, at 5 decimal
/// places of precision.
///
/// # Examples
///
/// ```
/// use tour_routing::geometry::encode_polyline;
///
/// let encoded = encode_polyline(&[(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)]);
/// assert_eq!(encoded, "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
/// assert!(encode_polyline(&[]).is_empty());
/// ```
pub fn encode_polyline(coords: &[(f64, f64)]) -> String {
    let mut result = String::new();
    let mut prev_lat = 0i64;
    let mut prev_lng = 0i64;

    for &(lat, lng) in coords {
        let lat_e5 = (lat * 1e5).round() as i64;
        let lng_e5 = (lng * 1e5).round() as i64;

        encode_value(lat_e5 - prev_lat, &mut result);
        encode_value(lng_e5 - prev_lng, &mut result);

        prev_lat = lat_e5;
        prev_lng = lng_e5;
    }

    result
}

fn encode_value(value: i64, output: &mut String) {
    let mut encoded = if value < 0 { !(value << 1) } else { value << 1 };

    // 5-bit chunks, 0x20 set while more chunks follow
    while encoded >= 0x20 {
        output.push((((encoded & 0x1f) | 0x20) as u8 + 63) as char);
        encoded >>= 5;
    }
    output.push((encoded as u8 + 63) as char);
}

/// Decodes a Google Polyline string back to `(lat, lng)` pairs.
///
/// A trailing latitude without its longitude is ignored.
pub fn decode_polyline(encoded: &str) -> Vec<(f64, f64)> {
    let mut coords = Vec::new();
    let mut lat = 0i64;
    let mut lng = 0i64;
    let bytes = encoded.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let (lat_delta, consumed) = decode_value(&bytes[i..]);
        i += consumed;
        lat += lat_delta;

        if i >= bytes.len() {
            break;
        }

        let (lng_delta, consumed) = decode_value(&bytes[i..]);
        i += consumed;
        lng += lng_delta;

        coords.push((lat as f64 / 1e5, lng as f64 / 1e5));
    }

    coords
}

/// Decodes a single value, returning (value, bytes_consumed).
fn decode_value(bytes: &[u8]) -> (i64, usize) {
    let mut result = 0i64;
    let mut shift = 0;
    let mut consumed = 0;

    for &b in bytes {
        consumed += 1;
        let chunk = (b as i64) - 63;
        result |= (chunk & 0x1f) << shift;
        shift += 5;

        if chunk < 0x20 {
            break;
        }
    }

    if result & 1 != 0 {
        result = !(result >> 1);
    } else {
        result >>= 1;
    }

    (result, consumed)
}

/// Converts `[lon, lat]` pairs to the `(lat, lng)` order polylines use.
fn to_lat_lng(coords: &[[f64; 2]]) -> Vec<(f64, f64)> {
    coords.iter().map(|&[lon, lat]| (lat, lon)).collect()
}

/// Encoded polyline of one leg.
#[derive(Debug, Clone, PartialEq, serde::Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncodedLeg {
    pub leg_idx: usize,
    pub polyline: String,
    pub point_count: usize,
}

/// Encoded polylines for a whole plan.
#[derive(Debug, Clone, PartialEq, serde::Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncodedRoute {
    /// The full route, legs joined without repeating shared joints.
    pub polyline: String,
    pub point_count: usize,
    pub legs: Vec<EncodedLeg>,
}

/// Encodes the full route and each leg.
pub fn encode_plan(plan: &RoutePlan) -> EncodedRoute {
    let full = to_lat_lng(&plan.geometry());
    let legs = plan
        .legs()
        .iter()
        .enumerate()
        .map(|(leg_idx, leg)| {
            let coords = to_lat_lng(&leg.geometry);
            EncodedLeg {
                leg_idx,
                polyline: encode_polyline(&coords),
                point_count: coords.len(),
            }
        })
        .collect();

    EncodedRoute {
        polyline: encode_polyline(&full),
        point_count: full.len(),
        legs,
    }
}

fn feature(geometry: GeoJsonValue, properties: Map<String, JsonValue>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn properties(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}

/// GeoJSON for a plan: one LineString per leg, then one Point per stop.
///
/// `stops` are listed in visit order and numbered from 1.
pub fn plan_to_geojson(plan: &RoutePlan, stops: &[TourSite]) -> FeatureCollection {
    let mut features = Vec::with_capacity(plan.legs().len() + stops.len());

    for (idx, leg) in plan.legs().iter().enumerate() {
        let line: LineString<f64> = leg.geometry.iter().map(|&[x, y]| (x, y)).collect();
        features.push(feature(
            GeoJsonValue::from(&line),
            properties(json!({
                "kind": "leg",
                "leg": idx,
                "mode": plan.mode().as_str(),
                "durationSeconds": leg.duration_seconds,
                "distanceMeters": leg.distance_meters,
            })),
        ));
    }

    for (idx, site) in stops.iter().enumerate() {
        let point = Point::new(site.longitude, site.latitude);
        features.push(feature(
            GeoJsonValue::from(&point),
            properties(json!({
                "kind": "stop",
                "order": idx + 1,
                "name": site.name,
            })),
        ));
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
