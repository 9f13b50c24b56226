//! Session registry port.
//!
//! Defines the interface for the shared store that both the creation
//! workflow and the independently launched viewer read and write.

use crate::error::Result;
use crate::session::{LayerKind, Lifecycle, SessionName, SessionRecord, ViewerInfo};
use async_trait::async_trait;

/// The shared per-session record store.
///
/// Writers touch disjoint fields: the creation workflow owns the layer and
/// viewer-container fields, the lifecycle is advanced by the workflow and
/// then the reaper, and only the viewer ever calls [`SessionRegistry::publish_viewer_token`].
///
/// # Implementation Notes
///
/// - `append_layer` must increment the count and write the new layer's
///   fields as one step; readers must never see a count without its layer.
/// - No call is retried; an unreachable store is reported as
///   `VizorError::Registry`.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Creates an empty record (zero layers, lifecycle `Provisioning`).
    async fn create_session(&self, name: &SessionName) -> Result<()>;

    /// Registers the next layer and returns its 1-based index.
    async fn append_layer(
        &self,
        name: &SessionName,
        container_name: &str,
        display_name: &str,
        kind: LayerKind,
    ) -> Result<u32>;

    /// Records the viewer container requested for the session.
    async fn set_viewer(&self, name: &SessionName, container_name: &str) -> Result<()>;

    /// Reads a snapshot of the record.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: record found
    /// - `Ok(None)`: no record under that name
    /// - `Err(_)`: store unreachable or record malformed
    async fn get_session(&self, name: &SessionName) -> Result<Option<SessionRecord>>;

    /// Publishes the viewer's handoff blob. Only the viewer calls this.
    async fn publish_viewer_token(&self, name: &SessionName, viewer: &ViewerInfo) -> Result<()>;

    /// Persists the lifecycle state.
    ///
    /// Entering or leaving `Reaping` also updates the teardown index read by
    /// [`SessionRegistry::sessions_in_teardown`].
    async fn set_lifecycle(&self, name: &SessionName, lifecycle: Lifecycle) -> Result<()>;

    /// Removes the record (and any teardown index entry). Absent is not an error.
    async fn delete_session(&self, name: &SessionName) -> Result<()>;

    /// Names of sessions whose teardown started but did not finish.
    async fn sessions_in_teardown(&self) -> Result<Vec<SessionName>>;
}
