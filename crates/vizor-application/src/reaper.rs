//! Idle session reaper.
//!
//! One sweep finds sessions whose viewer has seen no traffic for the idle
//! threshold, removes their proxy routes and has the launcher kill their
//! containers. Teardown progress is persisted as [`Lifecycle::Reaping`] so a
//! sweep that stops part-way is finished by the next one.

use chrono::TimeDelta;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use vizor_core::idle::{Clock, IdleDetector};
use vizor_core::provisioner::Provisioner;
use vizor_core::registry::SessionRegistry;
use vizor_core::route::RouteTable;
use vizor_core::session::{Lifecycle, SessionName, SessionRecord, naming};
use vizor_core::{Result, VizorError};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReapReport {
    /// Candidates looked at: idle sessions plus unfinished teardowns
    pub examined: usize,
    pub reaped: Vec<SessionName>,
    /// Sessions whose teardown stopped, with the error; retried next sweep
    pub failed: Vec<(SessionName, String)>,
}

impl ReapReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct SessionReaper {
    idle: Arc<dyn IdleDetector>,
    registry: Arc<dyn SessionRegistry>,
    provisioner: Arc<dyn Provisioner>,
    routes: Arc<dyn RouteTable>,
    clock: Arc<dyn Clock>,
    idle_threshold: Duration,
}

impl SessionReaper {
    pub fn new(
        idle: Arc<dyn IdleDetector>,
        registry: Arc<dyn SessionRegistry>,
        provisioner: Arc<dyn Provisioner>,
        routes: Arc<dyn RouteTable>,
        clock: Arc<dyn Clock>,
        idle_threshold: Duration,
    ) -> Self {
        Self {
            idle,
            registry,
            provisioner,
            routes,
            clock,
            idle_threshold,
        }
    }

    /// Runs one sweep.
    ///
    /// Fails only when the candidate list or the route listing cannot be
    /// fetched; per-session failures are reported in [`ReapReport::failed`].
    pub async fn reap_idle(&self) -> Result<ReapReport> {
        let threshold = TimeDelta::from_std(self.idle_threshold)
            .map_err(|e| VizorError::config(format!("idle threshold out of range: {e}")))?;
        let since = self.clock.now() - threshold;

        let mut candidates: BTreeSet<SessionName> =
            self.idle.idle_sessions(since).await?.into_iter().collect();
        let resumed = self.registry.sessions_in_teardown().await?;
        if !resumed.is_empty() {
            tracing::info!(
                target: "vizor::reaper",
                "[Reaper] Resuming {} unfinished teardowns",
                resumed.len()
            );
        }
        candidates.extend(resumed);

        let mut report = ReapReport {
            examined: candidates.len(),
            ..ReapReport::default()
        };
        if candidates.is_empty() {
            tracing::debug!(target: "vizor::reaper", "[Reaper] No idle sessions");
            return Ok(report);
        }

        let listed = self.list_all_paths().await?;
        for session in candidates {
            match self.teardown(&session, &listed).await {
                Ok(()) => {
                    tracing::info!(target: "vizor::reaper", "[Reaper] Reaped session {}", session);
                    report.reaped.push(session);
                }
                Err(e) => {
                    tracing::error!(
                        target: "vizor::reaper",
                        "[Reaper] Teardown of {} stopped: {}",
                        session,
                        e
                    );
                    report.failed.push((session, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Tears down one session, skipping phases a previous sweep finished.
    pub async fn reap_session(&self, session: &SessionName) -> Result<()> {
        let listed = self.list_all_paths().await?;
        self.teardown(session, &listed).await
    }

    /// Every route path currently known to the proxy.
    async fn list_all_paths(&self) -> Result<BTreeSet<String>> {
        Ok(self.routes.list_routes(None).await?.into_keys().collect())
    }

    /// `listed` is a route listing taken at the start of the sweep.
    async fn teardown(&self, session: &SessionName, listed: &BTreeSet<String>) -> Result<()> {
        let record = self.registry.get_session(session).await?;

        let (mut routes_done, mut containers_done) = (false, false);
        if let Some(record) = &record {
            match record.lifecycle {
                Some(Lifecycle::Reaping {
                    routes_done: r,
                    containers_done: c,
                }) => {
                    routes_done = r;
                    containers_done = c;
                }
                Some(Lifecycle::Provisioning) => {
                    tracing::warn!(
                        target: "vizor::reaper",
                        "[Reaper] Session {} is still provisioning; reaping anyway",
                        session
                    );
                    self.registry.set_lifecycle(session, Lifecycle::reaping()).await?;
                }
                Some(Lifecycle::Live) | None => {
                    self.registry.set_lifecycle(session, Lifecycle::reaping()).await?;
                }
            }
        }

        if !routes_done {
            self.delete_routes(session, record.as_ref(), listed).await?;
            routes_done = true;
            if record.is_some() {
                self.registry
                    .set_lifecycle(
                        session,
                        Lifecycle::Reaping {
                            routes_done,
                            containers_done,
                        },
                    )
                    .await?;
            }
        }

        if !containers_done {
            if let Some(record) = &record {
                let containers = record.container_names();
                if !containers.is_empty() {
                    self.provisioner.terminate_containers(&containers).await?;
                }
                self.registry
                    .set_lifecycle(
                        session,
                        Lifecycle::Reaping {
                            routes_done,
                            containers_done: true,
                        },
                    )
                    .await?;
            }
        }

        self.registry.delete_session(session).await
    }

    /// Deletes the viewer route, then every layer route of the session.
    ///
    /// Layer routes are the union of the proxy listing and the paths derived
    /// from the registry record; each is deleted once.
    async fn delete_routes(
        &self,
        session: &SessionName,
        record: Option<&SessionRecord>,
        listed: &BTreeSet<String>,
    ) -> Result<()> {
        self.routes
            .delete_route(&naming::viewer_route_path(session))
            .await?;

        let mut layer_paths: BTreeSet<String> = listed
            .iter()
            .filter(|path| naming::is_layer_route_of(path, session))
            .cloned()
            .collect();
        if let Some(record) = record {
            layer_paths.extend(
                record
                    .layers
                    .iter()
                    .map(|layer| naming::layer_route_path(session, &layer.display_name)),
            );
        }

        for path in &layer_paths {
            self.routes.delete_route(path).await?;
        }
        tracing::debug!(
            target: "vizor::reaper",
            "[Reaper] Removed {} routes of {}",
            layer_paths.len() + 1,
            session
        );
        Ok(())
    }
}
