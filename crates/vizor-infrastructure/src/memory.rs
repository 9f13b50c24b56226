//! In-memory implementations of the ports.
//!
//! These stand in for Redis, the proxy and the launcher when exercising the
//! workflow and the reaper: they keep the same observable semantics
//! (idempotent routes, inactive-since filtering, atomic layer append, writes
//! to a missing record failing) and record every call so tests can count
//! them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use vizor_core::idle::Clock;
use vizor_core::provisioner::Provisioner;
use vizor_core::registry::SessionRegistry;
use vizor_core::route::{RouteInfo, RouteMap, RouteTable, normalize_path};
use vizor_core::session::{
    LayerKind, LayerRecord, Lifecycle, SessionName, SessionRecord, ViewerInfo,
};
use vizor_core::{Result, VizorError};

// ============================================================================
// Clock
// ============================================================================

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
struct RegistryState {
    records: HashMap<SessionName, SessionRecord>,
    teardown: BTreeSet<SessionName>,
}

/// [`SessionRegistry`] kept in process memory.
#[derive(Default)]
pub struct InMemorySessionRegistry {
    state: Mutex<RegistryState>,
    unreachable: AtomicBool,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail as if the store were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.records.len()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(VizorError::registry("connection refused"))
        } else {
            Ok(())
        }
    }
}

fn missing(name: &SessionName) -> VizorError {
    VizorError::registry(format!("no record for session '{name}'"))
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn create_session(&self, name: &SessionName) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        state
            .records
            .insert(name.clone(), SessionRecord::new(name.clone()));
        Ok(())
    }

    async fn append_layer(
        &self,
        name: &SessionName,
        container_name: &str,
        display_name: &str,
        kind: LayerKind,
    ) -> Result<u32> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        let record = state.records.get_mut(name).ok_or_else(|| missing(name))?;
        let index = record.layers.len() as u32 + 1;
        record.layers.push(LayerRecord {
            index,
            container_name: container_name.to_string(),
            display_name: display_name.to_string(),
            kind,
        });
        Ok(index)
    }

    async fn set_viewer(&self, name: &SessionName, container_name: &str) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        let record = state.records.get_mut(name).ok_or_else(|| missing(name))?;
        record.viewer_container_name = Some(container_name.to_string());
        Ok(())
    }

    async fn get_session(&self, name: &SessionName) -> Result<Option<SessionRecord>> {
        self.check_reachable()?;
        Ok(self.state.lock().await.records.get(name).cloned())
    }

    async fn publish_viewer_token(&self, name: &SessionName, viewer: &ViewerInfo) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        let record = state.records.get_mut(name).ok_or_else(|| missing(name))?;
        record.viewer = Some(viewer.clone());
        Ok(())
    }

    async fn set_lifecycle(&self, name: &SessionName, lifecycle: Lifecycle) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        let record = state.records.get_mut(name).ok_or_else(|| missing(name))?;
        record.lifecycle = Some(lifecycle);
        if lifecycle.is_reaping() {
            state.teardown.insert(name.clone());
        } else {
            state.teardown.remove(name);
        }
        Ok(())
    }

    async fn delete_session(&self, name: &SessionName) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        state.records.remove(name);
        state.teardown.remove(name);
        Ok(())
    }

    async fn sessions_in_teardown(&self) -> Result<Vec<SessionName>> {
        self.check_reachable()?;
        Ok(self.state.lock().await.teardown.iter().cloned().collect())
    }
}

// ============================================================================
// Route table
// ============================================================================

/// One call received by [`InMemoryRouteTable`].
#[derive(Debug, Clone, PartialEq)]
pub enum RouteCall {
    Add { path: String, upstream: String },
    Delete(String),
    List(Option<DateTime<Utc>>),
}

/// [`RouteTable`] that behaves like the proxy: adding a route stamps it as
/// active now, and [`InMemoryRouteTable::record_traffic`] plays the part of
/// real requests.
pub struct InMemoryRouteTable {
    routes: Mutex<RouteMap>,
    clock: Arc<dyn Clock>,
    calls: Mutex<Vec<RouteCall>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl InMemoryRouteTable {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            routes: Mutex::new(RouteMap::new()),
            clock,
            calls: Mutex::new(Vec::new()),
            failing_deletes: Mutex::new(HashSet::new()),
        }
    }

    /// Marks `path` as having just served a request.
    pub async fn record_traffic(&self, path: &str) {
        let now = self.clock.now();
        if let Some(route) = self.routes.lock().await.get_mut(&normalize_path(path)) {
            route.last_activity = Some(now);
        }
    }

    /// Makes deletes of `path` fail until [`InMemoryRouteTable::heal`].
    pub async fn fail_deletes_of(&self, path: &str) {
        self.failing_deletes
            .lock()
            .await
            .insert(normalize_path(path));
    }

    pub async fn heal(&self) {
        self.failing_deletes.lock().await.clear();
    }

    pub async fn routes(&self) -> RouteMap {
        self.routes.lock().await.clone()
    }

    pub async fn calls(&self) -> Vec<RouteCall> {
        self.calls.lock().await.clone()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    pub async fn added_paths(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                RouteCall::Add { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn deleted_paths(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                RouteCall::Delete(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RouteTable for InMemoryRouteTable {
    async fn add_route(&self, path: &str, upstream: &str) -> Result<()> {
        let path = normalize_path(path);
        self.calls.lock().await.push(RouteCall::Add {
            path: path.clone(),
            upstream: upstream.to_string(),
        });
        let now = self.clock.now();
        self.routes.lock().await.insert(
            path,
            RouteInfo {
                target: upstream.to_string(),
                last_activity: Some(now),
            },
        );
        Ok(())
    }

    async fn delete_route(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        self.calls.lock().await.push(RouteCall::Delete(path.clone()));
        if self.failing_deletes.lock().await.contains(&path) {
            return Err(VizorError::route_table(Some(500), format!("cannot delete {path}"), true));
        }
        self.routes.lock().await.remove(&path);
        Ok(())
    }

    async fn list_routes(&self, inactive_since: Option<DateTime<Utc>>) -> Result<RouteMap> {
        self.calls.lock().await.push(RouteCall::List(inactive_since));
        let routes = self.routes.lock().await;
        Ok(routes
            .iter()
            .filter(|(_, info)| match (inactive_since, info.last_activity) {
                (None, _) => true,
                (Some(_), None) => true,
                (Some(since), Some(last)) => last < since,
            })
            .map(|(path, info)| (path.clone(), info.clone()))
            .collect())
    }
}

// ============================================================================
// Provisioner
// ============================================================================

/// One call received by [`RecordingProvisioner`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionerCall {
    StartData {
        path: String,
        container_name: String,
        display_name: String,
        kind: LayerKind,
        session: SessionName,
    },
    StartViewer {
        session: SessionName,
        public_host: String,
        container_name: String,
    },
    Terminate(Vec<String>),
}

/// Plays the launched viewer: publishes a token after a delay.
struct ViewerSimulation {
    registry: Arc<dyn SessionRegistry>,
    token: String,
    delay: Duration,
}

/// [`Provisioner`] that records requests instead of starting containers.
#[derive(Default)]
pub struct RecordingProvisioner {
    calls: Mutex<Vec<ProvisionerCall>>,
    failing_containers: Mutex<HashSet<String>>,
    terminate_failures: AtomicU32,
    viewer: Mutex<Option<ViewerSimulation>>,
}

impl RecordingProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every started viewer publishes `token` into `registry` after `delay`,
    /// the way the real viewer container does once it is serving.
    pub async fn with_viewer(
        self,
        registry: Arc<dyn SessionRegistry>,
        token: impl Into<String>,
        delay: Duration,
    ) -> Self {
        *self.viewer.lock().await = Some(ViewerSimulation {
            registry,
            token: token.into(),
            delay,
        });
        self
    }

    /// Rejects data-container requests for `container_name`.
    pub async fn fail_data_container(&self, container_name: &str) {
        self.failing_containers
            .lock()
            .await
            .insert(container_name.to_string());
    }

    /// Rejects the next `count` terminate requests.
    pub fn fail_next_terminates(&self, count: u32) {
        self.terminate_failures.store(count, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<ProvisionerCall> {
        self.calls.lock().await.clone()
    }

    pub async fn data_starts(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                ProvisionerCall::StartData { container_name, .. } => Some(container_name.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn viewer_starts(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| matches!(call, ProvisionerCall::StartViewer { .. }))
            .count()
    }

    pub async fn terminations(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                ProvisionerCall::Terminate(names) => Some(names.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn start_data_container(
        &self,
        path: &str,
        container_name: &str,
        display_name: &str,
        kind: LayerKind,
        session: &SessionName,
    ) -> Result<()> {
        self.calls.lock().await.push(ProvisionerCall::StartData {
            path: path.to_string(),
            container_name: container_name.to_string(),
            display_name: display_name.to_string(),
            kind,
            session: session.clone(),
        });
        if self.failing_containers.lock().await.contains(container_name) {
            return Err(VizorError::provisioner(
                Some(500),
                format!("cannot start {container_name}"),
                false,
            ));
        }
        Ok(())
    }

    async fn start_viewer_container(
        &self,
        session: &SessionName,
        public_host: &str,
        container_name: &str,
    ) -> Result<()> {
        self.calls.lock().await.push(ProvisionerCall::StartViewer {
            session: session.clone(),
            public_host: public_host.to_string(),
            container_name: container_name.to_string(),
        });

        if let Some(sim) = self.viewer.lock().await.as_ref() {
            let registry = Arc::clone(&sim.registry);
            let info = ViewerInfo::new(sim.token.clone())
                .with_field("host", "nglancer")
                .with_field("port", "8080");
            let delay = sim.delay;
            let session = session.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = registry.publish_viewer_token(&session, &info).await {
                    tracing::warn!("[SimulatedViewer] Failed to publish token: {}", e);
                }
            });
        }
        Ok(())
    }

    async fn terminate_containers(&self, container_names: &[String]) -> Result<()> {
        self.calls
            .lock()
            .await
            .push(ProvisionerCall::Terminate(container_names.to_vec()));
        let pending = self.terminate_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.terminate_failures.store(pending - 1, Ordering::SeqCst);
            return Err(VizorError::provisioner(Some(502), "launcher unavailable", true));
        }
        Ok(())
    }
}
