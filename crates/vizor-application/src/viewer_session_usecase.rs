//! Session creation use case.
//!
//! `ViewerSessionUseCase` stands up one visualization session: a data
//! container and a proxy route per selected layer, then the viewer container
//! and its route, and finally waits for the viewer to publish its access
//! token into the registry.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vizor_core::config::ViewerConfig;
use vizor_core::provisioner::Provisioner;
use vizor_core::registry::SessionRegistry;
use vizor_core::route::RouteTable;
use vizor_core::session::naming;
use vizor_core::session::{
    LayerFailure, LayerRecord, Lifecycle, NameGenerator, RandomNameGenerator, SessionName,
    VisualizationRequest,
};
use vizor_core::{Result, VizorError};

/// Viewer-facing settings of the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerSettings {
    /// Host name placed in the returned URL and handed to the viewer
    pub public_host: String,
    pub token_poll_interval: Duration,
    pub token_timeout: Duration,
}

impl ViewerSettings {
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            public_host: config.public_host.clone(),
            token_poll_interval: config.token_poll_interval(),
            token_timeout: config.token_timeout(),
        }
    }
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self::from_config(&ViewerConfig::default())
    }
}

/// Result of a successful creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionCreated {
    pub session: SessionName,
    /// Public viewer URL, carrying the viewer's token
    pub url: String,
    /// Layers that are up and routed, in request order
    pub layers: Vec<LayerRecord>,
    /// Layers the launcher refused; the session went live without them
    pub failed_layers: Vec<LayerFailure>,
}

/// Use case for creating visualization sessions.
///
/// # Failure behavior
///
/// - A launcher failure on one layer is recorded in
///   [`SessionCreated::failed_layers`] and the remaining layers proceed.
///   Already started containers are not rolled back.
/// - Registry and route-table failures abort the workflow.
/// - If no layer could be started the workflow fails with
///   [`VizorError::NoLayersProvisioned`] and the record is queued for
///   teardown, so the next sweep removes it.
/// - A viewer that does not publish its token in time yields
///   [`VizorError::ViewerFailedToStart`]; the reaper cleans up afterwards.
pub struct ViewerSessionUseCase {
    registry: Arc<dyn SessionRegistry>,
    provisioner: Arc<dyn Provisioner>,
    routes: Arc<dyn RouteTable>,
    names: Arc<dyn NameGenerator>,
    settings: ViewerSettings,
}

impl ViewerSessionUseCase {
    pub fn new(
        registry: Arc<dyn SessionRegistry>,
        provisioner: Arc<dyn Provisioner>,
        routes: Arc<dyn RouteTable>,
        settings: ViewerSettings,
    ) -> Self {
        Self {
            registry,
            provisioner,
            routes,
            names: Arc::new(RandomNameGenerator),
            settings,
        }
    }

    /// Replaces the session name source.
    pub fn with_name_generator(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    /// Creates a session for `request` and returns its viewer URL.
    pub async fn create_session(&self, request: &VisualizationRequest) -> Result<SessionCreated> {
        request.validate()?;

        let session = self.names.next_name();
        tracing::info!(
            target: "vizor::create",
            "[CreateSession] Creating session {} with {} layers",
            session,
            request.selections.len()
        );
        self.registry.create_session(&session).await?;

        let mut layers = Vec::with_capacity(request.selections.len());
        let mut failed_layers = Vec::new();

        for selection in &request.selections {
            let names = naming::layer_names(&session, selection);
            let kind = selection.kind();

            if let Err(e) = self
                .provisioner
                .start_data_container(
                    selection.path(),
                    &names.container_name,
                    &names.display_name,
                    kind,
                    &session,
                )
                .await
            {
                tracing::warn!(
                    target: "vizor::create",
                    "[CreateSession] Layer {} of session {} failed to start: {}",
                    names.display_name,
                    session,
                    e
                );
                failed_layers.push(LayerFailure {
                    display_name: names.display_name,
                    container_name: names.container_name,
                    error: e.to_string(),
                });
                continue;
            }

            let index = self
                .registry
                .append_layer(&session, &names.container_name, &names.display_name, kind)
                .await?;
            self.routes
                .add_route(
                    &naming::layer_route_path(&session, &names.display_name),
                    &naming::layer_upstream(&names.container_name),
                )
                .await?;

            tracing::debug!(
                target: "vizor::create",
                "[CreateSession] Layer {} ({}) routed for session {}",
                index,
                names.display_name,
                session
            );
            layers.push(LayerRecord {
                index,
                container_name: names.container_name,
                display_name: names.display_name,
                kind,
            });
        }

        if layers.is_empty() {
            // Nothing routes to this session, so idle detection never finds
            // it; the teardown set is the only way the reaper sees it.
            self.registry
                .set_lifecycle(&session, Lifecycle::reaping())
                .await?;
            return Err(VizorError::NoLayersProvisioned {
                session: session.to_string(),
                failures: failed_layers,
            });
        }

        let viewer_container = naming::viewer_container_name(&session);
        self.provisioner
            .start_viewer_container(&session, &self.settings.public_host, &viewer_container)
            .await?;
        self.registry.set_viewer(&session, &viewer_container).await?;
        self.routes
            .add_route(
                &naming::viewer_route_path(&session),
                &naming::viewer_upstream(&viewer_container),
            )
            .await?;

        let token = self.await_viewer_token(&session).await?;
        self.registry.set_lifecycle(&session, Lifecycle::Live).await?;

        let url = naming::viewer_url(&self.settings.public_host, &session, &token);
        tracing::info!(
            target: "vizor::create",
            "[CreateSession] Session {} live ({} layers, {} failed)",
            session,
            layers.len(),
            failed_layers.len()
        );

        Ok(SessionCreated {
            session,
            url,
            layers,
            failed_layers,
        })
    }

    /// Polls the registry until the viewer has published its token.
    async fn await_viewer_token(&self, session: &SessionName) -> Result<String> {
        let started = Instant::now();
        loop {
            let token = self
                .registry
                .get_session(session)
                .await?
                .and_then(|record| record.viewer.map(|viewer| viewer.token));
            if let Some(token) = token {
                tracing::debug!(
                    target: "vizor::create",
                    "[CreateSession] Viewer token for {} after {:?}",
                    session,
                    started.elapsed()
                );
                return Ok(token);
            }

            let waited = started.elapsed();
            if waited >= self.settings.token_timeout {
                tracing::error!(
                    target: "vizor::create",
                    "[CreateSession] Viewer for {} published no token within {:?}",
                    session,
                    self.settings.token_timeout
                );
                return Err(VizorError::ViewerFailedToStart {
                    session: session.to_string(),
                    waited,
                });
            }
            tokio::time::sleep(self.settings.token_poll_interval).await;
        }
    }
}
