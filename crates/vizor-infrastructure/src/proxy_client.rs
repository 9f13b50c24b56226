//! HTTP client for the reverse proxy's route API.
//!
//! The proxy exposes `/api/routes` (configurable-http-proxy style): routes
//! are keyed by path with a leading `/`, each carrying its `target` and the
//! `last_activity` timestamp the proxy maintains from real traffic.

use crate::http::{Collaborator, status_error, transport_error};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use vizor_core::config::ProxyConfig;
use vizor_core::route::{RouteMap, RouteTable, normalize_path};
use vizor_core::{Result, VizorError};

#[derive(Debug, Serialize)]
struct AddRouteRequest<'a> {
    target: &'a str,
}

/// [`RouteTable`] backed by the proxy's REST API.
#[derive(Clone)]
pub struct ProxyRouteTable {
    client: Client,
    api_url: String,
    auth_header: String,
    retry: RetryPolicy,
}

impl ProxyRouteTable {
    pub fn new(config: &ProxyConfig, retry: RetryPolicy) -> Result<Self> {
        if config.auth_token.is_empty() {
            tracing::warn!(
                target: "vizor::proxy",
                "[Proxy] No auth token configured; the proxy API will likely reject requests"
            );
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| VizorError::config(format!("Failed to build proxy client: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            auth_header: format!("token {}", config.auth_token),
            retry,
        })
    }

    fn route_url(&self, path: &str) -> String {
        format!("{}/api/routes/{}", self.api_url, normalize_path(path))
    }
}

#[async_trait]
impl RouteTable for ProxyRouteTable {
    async fn add_route(&self, path: &str, upstream: &str) -> Result<()> {
        tracing::debug!(target: "vizor::proxy", "[Proxy] Adding route {} -> {}", path, upstream);
        let url = self.route_url(path);
        let url = url.as_str();
        let body = AddRouteRequest { target: upstream };
        let body = &body;

        self.retry
            .run("add route", move || async move {
                let response = self
                    .client
                    .post(url)
                    .header("Authorization", &self.auth_header)
                    .json(body)
                    .send()
                    .await
                    .map_err(|e| transport_error(Collaborator::Proxy, "add route", e))?;

                if !response.status().is_success() {
                    return Err(status_error(Collaborator::Proxy, "add route", response).await);
                }
                Ok(())
            })
            .await
    }

    async fn delete_route(&self, path: &str) -> Result<()> {
        tracing::debug!(target: "vizor::proxy", "[Proxy] Removing route {}", path);
        let url = self.route_url(path);
        let url = url.as_str();

        self.retry
            .run("delete route", move || async move {
                let response = self
                    .client
                    .delete(url)
                    .header("Authorization", &self.auth_header)
                    .send()
                    .await
                    .map_err(|e| transport_error(Collaborator::Proxy, "delete route", e))?;

                let status = response.status();
                if status.is_success() || status == StatusCode::NOT_FOUND {
                    return Ok(());
                }
                Err(status_error(Collaborator::Proxy, "delete route", response).await)
            })
            .await
    }

    async fn list_routes(&self, inactive_since: Option<DateTime<Utc>>) -> Result<RouteMap> {
        let url = format!("{}/api/routes", self.api_url);
        let url = url.as_str();
        let since = inactive_since.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true));
        let since = since.as_deref();

        let raw: RouteMap = self
            .retry
            .run("list routes", move || async move {
                let mut request = self
                    .client
                    .get(url)
                    .header("Authorization", &self.auth_header);
                if let Some(since) = since {
                    request = request.query(&[("inactive_since", since)]);
                }

                let response = request
                    .send()
                    .await
                    .map_err(|e| transport_error(Collaborator::Proxy, "list routes", e))?;

                if !response.status().is_success() {
                    return Err(status_error(Collaborator::Proxy, "list routes", response).await);
                }

                response.json::<RouteMap>().await.map_err(|e| {
                    VizorError::route_table(None, format!("Failed to parse route listing: {e}"), false)
                })
            })
            .await?;

        Ok(raw
            .into_iter()
            .map(|(path, info)| (normalize_path(&path), info))
            .collect())
    }
}
