//! Client for the Mapbox Directions and Optimized Trips APIs.
//!
//! The assembler talks to routing through [`DirectionsProvider`] so it can be
//! driven by [`MapboxClient`] in production and by a scripted provider in
//! tests.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{RouteLeg, SnappedPoint, TravelMode};

pub const MAPBOX_BASE_URL: &str = "https://api.mapbox.com";
pub const DIRECTIONS_API_PATH: &str = "/directions/v5/mapbox";
pub const OPTIMIZED_TRIPS_API_PATH: &str = "/optimized-trips/v1/mapbox";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// Response of the pairwise directions endpoint.
///
/// A missing `routes` key deserializes as an empty list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectionsResponse {
    #[serde(default)]
    pub routes: Vec<ApiRoute>,
}

/// Response of the trip optimization endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptimizedTripResponse {
    #[serde(default)]
    pub trips: Vec<ApiRoute>,
    /// One entry per submitted coordinate, in submission order.
    #[serde(default)]
    pub waypoints: Vec<ApiWaypoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRoute {
    pub geometry: ApiGeometry,
    /// Seconds.
    pub duration: f64,
    /// Meters.
    pub distance: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiGeometry {
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiWaypoint {
    /// Position of this waypoint in the optimized visit order.
    pub waypoint_index: usize,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

// Request URLs carry the access token.
impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Request(e.without_url())
    }
}

impl From<ApiRoute> for RouteLeg {
    fn from(route: ApiRoute) -> Self {
        RouteLeg {
            geometry: route.geometry.coordinates,
            duration_seconds: route.duration,
            distance_meters: route.distance,
        }
    }
}

/// Source of routing results.
pub trait DirectionsProvider: Send + Sync {
    /// Route between two points.
    fn directions(
        &self,
        mode: TravelMode,
        from: SnappedPoint,
        to: SnappedPoint,
    ) -> impl Future<Output = Result<DirectionsResponse, UpstreamError>> + Send;

    /// Optimized visit order over all points, first fixed as source and last
    /// as destination, not returning to the start.
    fn optimized_trip(
        &self,
        mode: TravelMode,
        points: &[SnappedPoint],
    ) -> impl Future<Output = Result<OptimizedTripResponse, UpstreamError>> + Send;
}

pub struct MapboxClientParams {
    pub base_url: String,
    pub access_token: String,
    pub timeout: Duration,
}

pub struct MapboxClient {
    params: MapboxClientParams,
    client: reqwest::Client,
}

impl MapboxClient {
    pub fn new(params: MapboxClientParams) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(params.timeout)
            .build()?;
        Ok(Self { params, client })
    }

    fn url(&self, api_path: &str, mode: TravelMode, points: &[SnappedPoint]) -> String {
        let coords = points
            .iter()
            .map(SnappedPoint::to_path_segment)
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "{}{}/{}/{}",
            self.params.base_url.trim_end_matches('/'),
            api_path,
            mode.as_str(),
            coords
        )
    }

    async fn get<T>(&self, url: String, extra: &[(&str, &str)]) -> Result<T, UpstreamError>
    where
        T: for<'de> Deserialize<'de>,
    {
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("geometries", "geojson"),
                ("overview", "full"),
                ("access_token", self.params.access_token.as_str()),
            ])
            .query(extra)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        info!("Routing API responded: status={}", status);

        if status != reqwest::StatusCode::OK {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(text);
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

impl DirectionsProvider for MapboxClient {
    async fn directions(
        &self,
        mode: TravelMode,
        from: SnappedPoint,
        to: SnappedPoint,
    ) -> Result<DirectionsResponse, UpstreamError> {
        let url = self.url(DIRECTIONS_API_PATH, mode, &[from, to]);
        self.get(url, &[]).await
    }

    async fn optimized_trip(
        &self,
        mode: TravelMode,
        points: &[SnappedPoint],
    ) -> Result<OptimizedTripResponse, UpstreamError> {
        let url = self.url(OPTIMIZED_TRIPS_API_PATH, mode, points);
        self.get(
            url,
            &[
                ("source", "first"),
                ("destination", "last"),
                ("roundtrip", "false"),
            ],
        )
        .await
    }
}
