//! Provisioner port: the launcher service that owns the container runtime.

use crate::error::Result;
use crate::session::{LayerKind, SessionName};
use async_trait::async_trait;

/// Starts and stops the backend containers of a session.
///
/// Every call is fire-and-forget: `Ok(())` means the launcher accepted the
/// request, not that the container is serving yet.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Starts one data-serving container over `path`.
    async fn start_data_container(
        &self,
        path: &str,
        container_name: &str,
        display_name: &str,
        kind: LayerKind,
        session: &SessionName,
    ) -> Result<()>;

    /// Starts the viewer; it will read the registry and publish its token.
    async fn start_viewer_container(
        &self,
        session: &SessionName,
        public_host: &str,
        container_name: &str,
    ) -> Result<()>;

    /// Kills the named containers in one request.
    async fn terminate_containers(&self, container_names: &[String]) -> Result<()>;
}
