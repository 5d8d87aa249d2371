//! REST API for tour route planning.
//!
//! Provides endpoints for:
//! - Tour site listing and click-to-select lookup
//! - One-shot route generation
//! - Planner sessions (stop selection, mode, generation, reset)
//! - Route geometry for map visualization
//! - Site descriptions from the chat guide
//! - Swagger UI at /q/swagger-ui

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::assembler::{AssemblyEvent, AssemblyState};
use crate::console::RouteTimer;
use crate::domain::{RouteLeg, RoutePlan, TourSite, TravelMode};
use crate::dto::{
    AddStopRequest, AddStopResponse, ErrorResponse, GeometryResponse, GuideRequest,
    GuideResponse, HealthResponse, InfoResponse, ModeRequest, NearestQuery, RoutePlanDto,
    RouteRequest, SessionDto,
};
use crate::error::RouteError;
use crate::geometry::{encode_plan, plan_to_geojson, EncodedLeg, EncodedRoute};
use crate::guide::{ChatClient, GuideError};
use crate::mapbox::MapboxClient;
use crate::planner::RoutePlanner;
use crate::routing::Center;
use crate::session::{generate, PlannerSession, Selection, SessionStore};
use crate::sites::CLICK_RADIUS_DEG;

/// Application state shared across handlers.
pub struct AppState {
    pub planner: RoutePlanner<MapboxClient>,
    pub sessions: SessionStore,
    /// `None` when no chat credential is configured.
    pub guide: Option<ChatClient>,
}

impl AppState {
    pub fn new(planner: RoutePlanner<MapboxClient>, guide: Option<ChatClient>) -> Self {
        Self {
            planner,
            sessions: SessionStore::new(),
            guide,
        }
    }
}

/// Creates the API router with CORS and Swagger UI enabled.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & Info
        .route("/health", get(health))
        .route("/info", get(info))
        // Sites
        .route("/sites", get(list_sites))
        .route("/sites/nearest", get(nearest_site))
        // One-shot routing
        .route("/routes", post(create_route))
        // Sessions
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/sessions/{id}/stops", post(add_stop).delete(reset_stops))
        .route("/sessions/{id}/mode", put(set_mode))
        .route("/sessions/{id}/route", post(generate_route))
        .route("/sessions/{id}/route/stream", get(generate_route_stream))
        .route("/sessions/{id}/geometry", get(get_geometry))
        // Guide
        .route("/guide", post(describe_sites))
        // Swagger UI at /q/swagger-ui (Quarkus-style path)
        .merge(SwaggerUi::new("/q/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Handler error, mapped to a status code and an [`ErrorResponse`] body.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Route(RouteError),
    Guide(GuideError),
    GuideDisabled,
}

impl From<RouteError> for ApiError {
    fn from(e: RouteError) -> Self {
        ApiError::Route(e)
    }
}

impl From<GuideError> for ApiError {
    fn from(e: GuideError) -> Self {
        ApiError::Guide(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Route(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Route(RouteError::SnapFailed(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Route(RouteError::RoadGraph(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Route(_) => StatusCode::BAD_GATEWAY,
            ApiError::Guide(GuideError::NoSites) => StatusCode::BAD_REQUEST,
            ApiError::Guide(_) => StatusCode::BAD_GATEWAY,
            ApiError::GuideDisabled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::NotFound(what) => format!("{} not found", what),
            ApiError::Route(e) => e.to_string(),
            ApiError::Guide(e) => e.to_string(),
            ApiError::GuideDisabled => "guide is not configured".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self.message());
        }
        (status, Json(ErrorResponse { error: self.message() })).into_response()
    }
}

fn find_session(
    state: &AppState,
    id: &str,
) -> Result<Arc<parking_lot::RwLock<PlannerSession>>, ApiError> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("session {}", id)))
}

// ============================================================================
// Health & Info
// ============================================================================

/// GET /health - Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

/// GET /info - Application info endpoint.
#[utoipa::path(
    get,
    path = "/info",
    responses((status = 200, description = "Application info", body = InfoResponse))
)]
async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "Tour Routing",
        version: env!("CARGO_PKG_VERSION"),
        center: state.planner.center(),
        radius_m: state.planner.radius_m(),
        site_count: state.planner.catalog().len(),
        guide_enabled: state.guide.is_some(),
    })
}

// ============================================================================
// Sites
// ============================================================================

/// GET /sites - List all tour sites.
#[utoipa::path(
    get,
    path = "/sites",
    responses((status = 200, description = "All tour sites", body = Vec<TourSite>))
)]
async fn list_sites(State(state): State<Arc<AppState>>) -> Json<Vec<TourSite>> {
    Json(state.planner.catalog().all().to_vec())
}

/// GET /sites/nearest - Site closest to a clicked coordinate.
#[utoipa::path(
    get,
    path = "/sites/nearest",
    params(NearestQuery),
    responses(
        (status = 200, description = "Site within click radius", body = TourSite),
        (status = 404, description = "No site close enough", body = ErrorResponse)
    )
)]
async fn nearest_site(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearestQuery>,
) -> Result<Json<TourSite>, ApiError> {
    state
        .planner
        .catalog()
        .nearest_site(query.lon, query.lat)
        .cloned()
        .map(Json)
        .ok_or_else(|| click_miss(query.lon, query.lat))
}

fn click_miss(lon: f64, lat: f64) -> ApiError {
    ApiError::NotFound(format!(
        "tour site within {}° of ({}, {})",
        CLICK_RADIUS_DEG, lon, lat
    ))
}

// ============================================================================
// One-shot Routing
// ============================================================================

/// POST /routes - Generate a route for the given stops.
#[utoipa::path(
    post,
    path = "/routes",
    request_body = RouteRequest,
    responses(
        (status = 200, description = "Route generated", body = RoutePlanDto),
        (status = 400, description = "Too few or unknown stops", body = ErrorResponse),
        (status = 502, description = "Routing service failed", body = ErrorResponse),
        (status = 503, description = "Road network unavailable", body = ErrorResponse)
    )
)]
async fn create_route(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RouteRequest>,
) -> Result<Json<RoutePlanDto>, ApiError> {
    let timer = RouteTimer::start(request.mode, request.stops.len());
    let result = state.planner.plan(&request.stops, request.mode).await;
    timer.finish(&result);
    Ok(Json(RoutePlanDto::from_plan(&result?)))
}

// ============================================================================
// Sessions
// ============================================================================

/// POST /sessions - Create an empty session.
#[utoipa::path(
    post,
    path = "/sessions",
    responses((status = 201, description = "Session created", body = SessionDto))
)]
async fn create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SessionDto>) {
    let session = state.sessions.create();
    let dto = SessionDto::from_session(&session.read());
    (StatusCode::CREATED, Json(dto))
}

/// GET /sessions - List all session IDs.
#[utoipa::path(
    get,
    path = "/sessions",
    responses((status = 200, description = "List of session IDs", body = Vec<String>))
)]
async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.sessions.list())
}

/// GET /sessions/{id} - Get session state.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session retrieved", body = SessionDto),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionDto>, ApiError> {
    let session = find_session(&state, &id)?;
    let dto = SessionDto::from_session(&session.read());
    Ok(Json(dto))
}

/// DELETE /sessions/{id} - Remove a session.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session removed", body = SessionDto),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionDto>, ApiError> {
    let session = state
        .sessions
        .remove(&id)
        .ok_or_else(|| ApiError::NotFound(format!("session {}", id)))?;
    let dto = SessionDto::from_session(&session.read());
    Ok(Json(dto))
}

/// POST /sessions/{id}/stops - Add a stop by name or by clicked coordinate.
#[utoipa::path(
    post,
    path = "/sessions/{id}/stops",
    params(("id" = String, Path, description = "Session ID")),
    request_body = AddStopRequest,
    responses(
        (status = 200, description = "Stop added (or already selected)", body = AddStopResponse),
        (status = 400, description = "Unknown site", body = ErrorResponse),
        (status = 404, description = "Session not found or click too far", body = ErrorResponse)
    )
)]
async fn add_stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<AddStopRequest>,
) -> Result<Json<AddStopResponse>, ApiError> {
    let session = find_session(&state, &id)?;
    let catalog = state.planner.catalog();
    let site = match request {
        AddStopRequest::ByName { name } => catalog.get(&name).ok_or(RouteError::UnknownSite(name))?,
        AddStopRequest::ByClick { lon, lat } => {
            catalog.nearest_site(lon, lat).ok_or_else(|| click_miss(lon, lat))?
        }
    }
    .clone();

    let mut guard = session.write();
    let added = guard.select(&site.name) == Selection::Added;
    Ok(Json(AddStopResponse {
        site,
        added,
        session: SessionDto::from_session(&guard),
    }))
}

/// DELETE /sessions/{id}/stops - Clear the selection and any result.
#[utoipa::path(
    delete,
    path = "/sessions/{id}/stops",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session reset", body = SessionDto),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn reset_stops(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionDto>, ApiError> {
    let session = find_session(&state, &id)?;
    let mut guard = session.write();
    guard.reset();
    Ok(Json(SessionDto::from_session(&guard)))
}

/// PUT /sessions/{id}/mode - Set the travel mode.
#[utoipa::path(
    put,
    path = "/sessions/{id}/mode",
    params(("id" = String, Path, description = "Session ID")),
    request_body = ModeRequest,
    responses(
        (status = 200, description = "Mode updated", body = SessionDto),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn set_mode(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<SessionDto>, ApiError> {
    let session = find_session(&state, &id)?;
    let mut guard = session.write();
    guard.set_mode(request.mode);
    Ok(Json(SessionDto::from_session(&guard)))
}

/// POST /sessions/{id}/route - Generate a route for the session's stops.
#[utoipa::path(
    post,
    path = "/sessions/{id}/route",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Route generated", body = RoutePlanDto),
        (status = 400, description = "Too few stops", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 502, description = "Routing service failed", body = ErrorResponse),
        (status = 503, description = "Road network unavailable", body = ErrorResponse)
    )
)]
async fn generate_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RoutePlanDto>, ApiError> {
    let session = find_session(&state, &id)?;
    let (mode, stop_count) = session_shape(&session);

    let timer = RouteTimer::start(mode, stop_count);
    let result = generate(&session, &state.planner, |_| {}).await;
    timer.finish(&result);
    Ok(Json(RoutePlanDto::from_plan(&result?)))
}

fn session_shape(session: &parking_lot::RwLock<PlannerSession>) -> (TravelMode, usize) {
    let guard = session.read();
    (guard.mode(), guard.stops().len())
}

enum StreamMessage {
    Event(AssemblyEvent),
    Done(Result<RoutePlan, RouteError>),
}

fn sse_data(value: serde_json::Value) -> String {
    format!("data: {}\n\n", value)
}

fn stream_message_json(message: &StreamMessage) -> serde_json::Value {
    match message {
        StreamMessage::Event(AssemblyEvent::Snapped { stops }) => {
            json!({"event": "progress", "phase": "snapped", "stops": stops})
        }
        StreamMessage::Event(AssemblyEvent::State(state)) => {
            json!({"event": "progress", "phase": "state", "state": state})
        }
        StreamMessage::Event(AssemblyEvent::LegReceived { index, total }) => {
            json!({"event": "progress", "phase": "leg", "index": index, "total": total})
        }
        StreamMessage::Done(Ok(plan)) => {
            json!({"event": "complete", "route": RoutePlanDto::from_plan(plan)})
        }
        StreamMessage::Done(Err(e)) => {
            json!({"event": "error", "state": AssemblyState::Failed, "message": e.to_string()})
        }
    }
}

/// GET /sessions/{id}/route/stream - Generate a route with SSE progress.
///
/// Emits progress events (snapped, state changes, legs received) and ends
/// with either a `complete` event carrying the route or an `error` event.
/// Compatible with the browser EventSource API.
async fn generate_route_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let session = find_session(&state, &id)?;
    let (mode, stop_count) = session_shape(&session);
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let timer = RouteTimer::start(mode, stop_count);
        let result = generate(&session, &state.planner, |event| {
            let _ = tx.send(StreamMessage::Event(event));
        })
        .await;
        timer.finish(&result);
        if tx.send(StreamMessage::Done(result)).is_err() {
            warn!("Route stream client disconnected before completion");
        }
    });

    let stream = async_stream::stream! {
        while let Some(message) = rx.recv().await {
            yield Ok::<_, Infallible>(sse_data(stream_message_json(&message)));
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// GET /sessions/{id}/geometry - Encoded polylines and GeoJSON of the route.
#[utoipa::path(
    get,
    path = "/sessions/{id}/geometry",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Geometry retrieved", body = GeometryResponse),
        (status = 404, description = "Session or route not found", body = ErrorResponse)
    )
)]
async fn get_geometry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GeometryResponse>, ApiError> {
    let session = find_session(&state, &id)?;
    let guard = session.read();
    let plan = guard
        .plan()
        .ok_or_else(|| ApiError::NotFound(format!("route for session {}", id)))?;

    let catalog = state.planner.catalog();
    let stops: Vec<TourSite> = plan
        .visit_order()
        .iter()
        .filter_map(|name| catalog.get(name).cloned())
        .collect();

    Ok(Json(GeometryResponse {
        encoded: encode_plan(plan),
        geojson: plan_to_geojson(plan, &stops),
    }))
}

// ============================================================================
// Guide
// ============================================================================

/// POST /guide - Describe tour sites.
#[utoipa::path(
    post,
    path = "/guide",
    request_body = GuideRequest,
    responses(
        (status = 200, description = "Descriptions", body = GuideResponse),
        (status = 400, description = "No or unknown sites", body = ErrorResponse),
        (status = 502, description = "Chat service failed", body = ErrorResponse),
        (status = 503, description = "Guide not configured", body = ErrorResponse)
    )
)]
async fn describe_sites(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GuideRequest>,
) -> Result<Json<GuideResponse>, ApiError> {
    let guide = state.guide.as_ref().ok_or(ApiError::GuideDisabled)?;
    state.planner.resolve(&request.sites)?;
    let text = guide.describe_sites(&request.sites).await?;
    Ok(Json(GuideResponse { text }))
}

// ============================================================================
// OpenAPI Documentation
// ============================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        info,
        list_sites,
        nearest_site,
        create_route,
        create_session,
        list_sessions,
        get_session,
        delete_session,
        add_stop,
        reset_stops,
        set_mode,
        generate_route,
        get_geometry,
        describe_sites,
    ),
    components(schemas(
        HealthResponse,
        InfoResponse,
        ErrorResponse,
        Center,
        TourSite,
        TravelMode,
        RouteLeg,
        AssemblyState,
        RouteRequest,
        RoutePlanDto,
        SessionDto,
        AddStopRequest,
        AddStopResponse,
        ModeRequest,
        EncodedLeg,
        EncodedRoute,
        GeometryResponse,
        GuideRequest,
        GuideResponse,
    ))
)]
struct ApiDoc;
