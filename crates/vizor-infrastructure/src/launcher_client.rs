//! HTTP client for the viewer launcher service.
//!
//! The launcher runs next to the container runtime and starts or kills
//! containers on our behalf. Its endpoints take small JSON bodies and answer
//! with a plain-text acknowledgement.
//!
//! Start requests create containers under fixed names, so a repeat of a start
//! that reached the launcher fails on the name already being taken. They are
//! only retried when the connection itself could not be made. Kill requests
//! are repeated on any transient failure.

use crate::http::{Collaborator, Replay, status_error_with, transport_error_with};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use vizor_core::config::LauncherConfig;
use vizor_core::provisioner::Provisioner;
use vizor_core::session::{LayerKind, SessionName};
use vizor_core::{Result, VizorError};

#[derive(Debug, Serialize)]
struct DataContainerRequest<'a> {
    cv_path: &'a str,
    cv_name: &'a str,
    cv_container_name: &'a str,
    layer_type: &'a str,
    session_name: &'a str,
}

#[derive(Debug, Serialize)]
struct ViewerContainerRequest<'a> {
    hosturl: &'a str,
    ng_container_name: &'a str,
    session_name: &'a str,
}

#[derive(Debug, Serialize)]
struct TerminateRequest<'a> {
    list_of_container_names: &'a [String],
}

/// [`Provisioner`] backed by the launcher's HTTP API.
#[derive(Clone)]
pub struct HttpProvisioner {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpProvisioner {
    /// Creates a client for the launcher at `config.base_url`.
    pub fn new(config: &LauncherConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| VizorError::config(format!("Failed to build launcher client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn post<B: Serialize + Sync>(&self, endpoint: &str, body: &B, replay: Replay) -> Result<()> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let url = url.as_str();
        self.retry
            .run(endpoint, move || async move {
                let response = self
                    .client
                    .post(url)
                    .json(body)
                    .send()
                    .await
                    .map_err(|e| transport_error_with(Collaborator::Launcher, endpoint, e, replay))?;

                if !response.status().is_success() {
                    return Err(
                        status_error_with(Collaborator::Launcher, endpoint, response, replay).await
                    );
                }
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn start_data_container(
        &self,
        path: &str,
        container_name: &str,
        display_name: &str,
        kind: LayerKind,
        session: &SessionName,
    ) -> Result<()> {
        tracing::debug!(
            target: "vizor::launcher",
            "[Launcher] Requesting data container {} for {}",
            container_name,
            path
        );
        let body = DataContainerRequest {
            cv_path: path,
            cv_name: display_name,
            cv_container_name: container_name,
            layer_type: kind.as_str(),
            session_name: session.as_str(),
        };
        self.post("cvlauncher", &body, Replay::UnsentOnly).await
    }

    async fn start_viewer_container(
        &self,
        session: &SessionName,
        public_host: &str,
        container_name: &str,
    ) -> Result<()> {
        tracing::debug!(
            target: "vizor::launcher",
            "[Launcher] Requesting viewer container {}",
            container_name
        );
        let body = ViewerContainerRequest {
            hosturl: public_host,
            ng_container_name: container_name,
            session_name: session.as_str(),
        };
        self.post("nglauncher", &body, Replay::UnsentOnly).await
    }

    async fn terminate_containers(&self, container_names: &[String]) -> Result<()> {
        if container_names.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            target: "vizor::launcher",
            "[Launcher] Terminating {} containers",
            container_names.len()
        );
        let body = TerminateRequest {
            list_of_container_names: container_names,
        };
        self.post("container_killer", &body, Replay::Idempotent).await
    }
}
