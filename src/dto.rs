//! DTOs for REST API requests/responses.

use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::assembler::AssemblyState;
use crate::domain::{RouteLeg, RoutePlan, TourSite, TravelMode};
use crate::geometry::{encode_plan, EncodedRoute};
use crate::routing::Center;
use crate::session::PlannerSession;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Status indicator ("UP" when healthy).
    pub status: &'static str,
}

/// Application info response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    /// Center of the road network.
    pub center: Center,
    /// Radius of the road network in meters.
    pub radius_m: f64,
    pub site_count: usize,
    /// Whether `/guide` is configured.
    pub guide_enabled: bool,
}

/// Error body for every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Click coordinate for nearest-site lookup.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NearestQuery {
    /// Longitude of the click.
    pub lon: f64,
    /// Latitude of the click.
    pub lat: f64,
}

/// One-shot route request.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    /// Site names in submission order; the first is the start point.
    pub stops: Vec<String>,
    #[serde(default)]
    pub mode: TravelMode,
}

/// Assembled route.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlanDto {
    /// Stop names in visit order.
    pub visit_order: Vec<String>,
    pub mode: TravelMode,
    /// Whether the order came from trip optimization.
    pub optimized: bool,
    pub total_duration_minutes: f64,
    pub total_distance_km: f64,
    pub legs: Vec<RouteLeg>,
    /// Full route as a Google encoded polyline.
    pub polyline: String,
}

impl RoutePlanDto {
    pub fn from_plan(plan: &RoutePlan) -> Self {
        Self {
            visit_order: plan.visit_order().to_vec(),
            mode: plan.mode(),
            optimized: plan.optimized(),
            total_duration_minutes: plan.total_duration_minutes(),
            total_distance_km: plan.total_distance_km(),
            legs: plan.legs().to_vec(),
            polyline: encode_plan(plan).polyline,
        }
    }
}

/// Session state.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub id: String,
    /// Selected site names in selection order.
    pub stops: Vec<String>,
    pub mode: TravelMode,
    pub state: AssemblyState,
    /// Present when `state` is `COMPLETE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<RoutePlanDto>,
    /// Present when `state` is `FAILED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionDto {
    pub fn from_session(session: &PlannerSession) -> Self {
        Self {
            id: session.id.clone(),
            stops: session.stops().to_vec(),
            mode: session.mode(),
            state: session.state(),
            plan: session.plan().map(RoutePlanDto::from_plan),
            error: session.last_error().map(str::to_string),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Stop to add: a site name, or a clicked coordinate resolved to the
/// nearest site.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AddStopRequest {
    ByName { name: String },
    ByClick { lon: f64, lat: f64 },
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddStopResponse {
    pub site: TourSite,
    /// False when the site was already selected.
    pub added: bool,
    pub session: SessionDto,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModeRequest {
    pub mode: TravelMode,
}

/// Route geometry for map rendering.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeometryResponse {
    pub encoded: EncodedRoute,
    /// Legs as LineStrings and stops as Points.
    #[schema(value_type = Object)]
    pub geojson: FeatureCollection,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GuideRequest {
    /// Site names to describe, in order.
    pub sites: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GuideResponse {
    pub text: String,
}
