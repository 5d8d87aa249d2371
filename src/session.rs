//! Planner sessions: one user's stop selection, travel mode and last result.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::assembler::{AssemblyEvent, AssemblyState};
use crate::domain::{RoutePlan, TravelMode};
use crate::error::RouteError;
use crate::mapbox::DirectionsProvider;
use crate::planner::RoutePlanner;

/// Outcome of adding a stop to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Added,
    /// The site was already selected; the selection is unchanged.
    AlreadySelected,
}

/// A user's planning session.
///
/// Any change to the stops or mode discards the previous result and returns
/// the session to [`AssemblyState::Idle`].
#[derive(Debug, Clone)]
pub struct PlannerSession {
    pub id: String,
    stops: Vec<String>,
    mode: TravelMode,
    state: AssemblyState,
    plan: Option<RoutePlan>,
    last_error: Option<String>,
    /// Bumped on every change; results of a generation started before the
    /// latest change are dropped.
    revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlannerSession {
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            stops: Vec::new(),
            mode: TravelMode::default(),
            state: AssemblyState::Idle,
            plan: None,
            last_error: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stops(&self) -> &[String] {
        &self.stops
    }

    pub fn mode(&self) -> TravelMode {
        self.mode
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// The plan, present only in [`AssemblyState::Complete`].
    pub fn plan(&self) -> Option<&RoutePlan> {
        self.plan.as_ref()
    }

    /// Failure message, present only in [`AssemblyState::Failed`].
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Appends a stop unless it is already selected.
    pub fn select(&mut self, name: &str) -> Selection {
        if self.stops.iter().any(|s| s == name) {
            return Selection::AlreadySelected;
        }
        self.stops.push(name.to_string());
        self.invalidate();
        Selection::Added
    }

    pub fn set_mode(&mut self, mode: TravelMode) {
        if self.mode != mode {
            self.mode = mode;
            self.invalidate();
        }
    }

    /// Clears the selection and any result.
    pub fn reset(&mut self) {
        self.stops.clear();
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.revision += 1;
        self.state = AssemblyState::Idle;
        self.plan = None;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// Records a state transition for the given revision.
    fn transition(&mut self, revision: u64, state: AssemblyState) {
        if self.revision == revision && self.state != state {
            debug!("Session {} {} -> {}", self.id, self.state.as_str(), state.as_str());
            self.state = state;
            self.updated_at = Utc::now();
        }
    }

    fn finish(&mut self, revision: u64, result: &Result<RoutePlan, RouteError>) {
        if self.revision != revision {
            debug!("Session {} changed during generation, dropping result", self.id);
            return;
        }
        match result {
            Ok(plan) => {
                self.state = AssemblyState::Complete;
                self.plan = Some(plan.clone());
                self.last_error = None;
            }
            Err(e) => {
                self.state = AssemblyState::Failed;
                self.plan = None;
                self.last_error = Some(e.to_string());
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Generates a route for the session's current stops and mode.
///
/// The session leaves its previous result immediately and reports
/// `Requesting` while the road network loads and stops are snapped. A newer
/// generation supersedes this one. The session lock is not held across
/// upstream calls. `on_event` sees the same progress events the session
/// state is updated from.
pub async fn generate<P, F>(
    session: &Arc<RwLock<PlannerSession>>,
    planner: &RoutePlanner<P>,
    mut on_event: F,
) -> Result<RoutePlan, RouteError>
where
    P: DirectionsProvider,
    F: FnMut(AssemblyEvent) + Send,
{
    let (stops, mode, revision) = {
        let mut guard = session.write();
        guard.revision += 1;
        guard.state = AssemblyState::Requesting;
        guard.plan = None;
        guard.last_error = None;
        guard.updated_at = Utc::now();
        (guard.stops.clone(), guard.mode, guard.revision)
    };

    let tracked = Arc::clone(session);
    let result = planner
        .plan_with_progress(&stops, mode, |event| {
            if let AssemblyEvent::State(state) = &event {
                tracked.write().transition(revision, *state);
            }
            on_event(event);
        })
        .await;

    session.write().finish(revision, &result);
    result
}

/// Manages planner sessions keyed by UUID.
///
/// # Examples
///
/// ```
/// use tour_routing::session::SessionStore;
/// use tour_routing::assembler::AssemblyState;
///
/// let store = SessionStore::new();
/// let session = store.create();
/// let id = session.read().id.clone();
/// assert_eq!(store.get(&id).unwrap().read().state(), AssemblyState::Idle);
/// ```
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<RwLock<PlannerSession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Creates an empty session with a fresh id.
    pub fn create(&self) -> Arc<RwLock<PlannerSession>> {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(RwLock::new(PlannerSession::new(id.clone())));
        self.sessions.write().insert(id.clone(), Arc::clone(&session));
        info!("Created session {}", id);
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<RwLock<PlannerSession>>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<RwLock<PlannerSession>>> {
        self.sessions.write().remove(id)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tests::{ok_directions, ScriptedProvider};
    use crate::domain::TourSite;
    use crate::mapbox::{DirectionsResponse, UpstreamError};
    use crate::routing::tests::seeded_provider;
    use crate::routing::Center;
    use crate::sites::SiteCatalog;

    async fn planner(radius_m: f64, provider: ScriptedProvider) -> RoutePlanner<ScriptedProvider> {
        let center = Center::new(36.64441, 127.44441);
        let catalog = SiteCatalog::new(vec![
            TourSite::new("A", 127.482, 36.641),
            TourSite::new("B", 127.491, 36.645),
            TourSite::new("C", 127.498, 36.639),
        ])
        .unwrap();
        RoutePlanner::new(
            Arc::new(catalog),
            seeded_provider(center, radius_m).await,
            center,
            provider,
        )
    }

    #[test]
    fn test_select_skips_duplicates() {
        let mut session = PlannerSession::new("s".into());
        assert_eq!(session.select("A"), Selection::Added);
        assert_eq!(session.select("B"), Selection::Added);
        assert_eq!(session.select("A"), Selection::AlreadySelected);
        assert_eq!(session.stops(), &["A", "B"]);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut session = PlannerSession::new("s".into());
        session.select("A");
        session.state = AssemblyState::Failed;
        session.last_error = Some("boom".into());

        session.reset();
        assert!(session.stops().is_empty());
        assert_eq!(session.state(), AssemblyState::Idle);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_store_crud() {
        let store = SessionStore::new();
        let id = store.create().read().id.clone();
        assert_eq!(store.list(), vec![id.clone()]);
        assert!(store.remove(&id).is_some());
        assert!(store.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_generate_completes_with_plan() {
        let planner = planner(
            3201.0,
            ScriptedProvider::with_directions(vec![ok_directions(60.0, 500.0), ok_directions(60.0, 500.0)]),
        )
        .await;
        let store = SessionStore::new();
        let session = store.create();
        {
            let mut guard = session.write();
            for name in ["A", "B", "C"] {
                guard.select(name);
            }
            guard.set_mode(TravelMode::Walking);
        }

        let plan = generate(&session, &planner, |_| {}).await.unwrap();

        let guard = session.read();
        assert_eq!(guard.state(), AssemblyState::Complete);
        assert_eq!(guard.plan(), Some(&plan));
        assert_eq!(plan.total_distance_km(), 1.0);
    }

    #[tokio::test]
    async fn test_generate_failure_keeps_no_plan() {
        let planner = planner(
            3202.0,
            ScriptedProvider::with_directions(vec![
                ok_directions(60.0, 500.0),
                Err(UpstreamError::Api {
                    status: 422,
                    message: "Invalid coordinates".into(),
                }),
            ]),
        )
        .await;
        let session = Arc::new(RwLock::new(PlannerSession::new("s".into())));
        {
            let mut guard = session.write();
            guard.select("A");
            guard.select("B");
            guard.select("C");
            guard.set_mode(TravelMode::Walking);
        }

        assert!(generate(&session, &planner, |_| {}).await.is_err());

        let guard = session.read();
        assert_eq!(guard.state(), AssemblyState::Failed);
        assert!(guard.plan().is_none());
        assert!(guard.last_error().unwrap().contains("Invalid coordinates"));
    }

    #[tokio::test]
    async fn test_generate_with_one_stop_fails_without_requests() {
        let planner = planner(3203.0, ScriptedProvider::default()).await;
        let session = Arc::new(RwLock::new(PlannerSession::new("s".into())));
        session.write().select("A");

        let result = generate(&session, &planner, |_| {}).await;
        assert!(matches!(result, Err(RouteError::InsufficientStops(1))));
        assert_eq!(session.read().state(), AssemblyState::Failed);
        assert_eq!(planner_calls(&planner), 0);
    }

    #[tokio::test]
    async fn test_change_during_generation_drops_result() {
        let planner = planner(
            3204.0,
            ScriptedProvider::with_directions(vec![Ok(DirectionsResponse::default())]),
        )
        .await;
        let session = Arc::new(RwLock::new(PlannerSession::new("s".into())));
        {
            let mut guard = session.write();
            guard.select("A");
            guard.select("B");
        }

        let observer = Arc::clone(&session);
        let _ = generate(&session, &planner, move |event| {
            if event == AssemblyEvent::State(AssemblyState::Requesting) {
                observer.write().reset();
            }
        })
        .await;

        let guard = session.read();
        assert_eq!(guard.state(), AssemblyState::Idle);
        assert!(guard.last_error().is_none());
    }

    #[tokio::test]
    async fn test_regenerate_leaves_complete_state_before_requests() {
        let planner = planner(
            3205.0,
            ScriptedProvider::with_directions(vec![
                ok_directions(60.0, 500.0),
                ok_directions(60.0, 500.0),
            ]),
        )
        .await;
        let session = Arc::new(RwLock::new(PlannerSession::new("s".into())));
        {
            let mut guard = session.write();
            guard.select("A");
            guard.select("B");
        }
        generate(&session, &planner, |_| {}).await.unwrap();
        assert_eq!(session.read().state(), AssemblyState::Complete);

        let observer = Arc::clone(&session);
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let seen_in_callback = Arc::clone(&seen);
        let _ = generate(&session, &planner, move |event| {
            if let AssemblyEvent::Snapped { .. } = event {
                let guard = observer.read();
                *seen_in_callback.lock() = Some((guard.state(), guard.plan().is_some()));
            }
        })
        .await;

        assert_eq!(*seen.lock(), Some((AssemblyState::Requesting, false)));
    }

    fn planner_calls(planner: &RoutePlanner<ScriptedProvider>) -> usize {
        planner.provider().call_count()
    }
}
