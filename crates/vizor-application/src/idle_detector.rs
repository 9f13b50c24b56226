//! Idle detection from proxy traffic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use vizor_core::Result;
use vizor_core::idle::IdleDetector;
use vizor_core::route::RouteTable;
use vizor_core::session::SessionName;
use vizor_core::session::naming::session_from_viewer_path;

/// [`IdleDetector`] asking the proxy which viewer routes went quiet.
///
/// Only viewer routes count: layer routes are fetched by the viewer itself,
/// so they stay busy exactly as long as someone is looking.
pub struct RouteIdleDetector {
    routes: Arc<dyn RouteTable>,
}

impl RouteIdleDetector {
    pub fn new(routes: Arc<dyn RouteTable>) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl IdleDetector for RouteIdleDetector {
    async fn idle_sessions(&self, since: DateTime<Utc>) -> Result<Vec<SessionName>> {
        let inactive = self.routes.list_routes(Some(since)).await?;
        let sessions: BTreeSet<SessionName> = inactive
            .keys()
            .filter_map(|path| session_from_viewer_path(path))
            .collect();
        Ok(sessions.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use std::time::Duration;
    use vizor_core::idle::Clock;
    use vizor_infrastructure::{InMemoryRouteTable, ManualClock};

    #[tokio::test]
    async fn test_only_quiet_viewer_routes_are_idle() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let table = Arc::new(InMemoryRouteTable::new(clock.clone()));

        table.add_route("viewers/aaaa", "http://aaaa_ng_container:8080/").await.unwrap();
        table.add_route("viewers/bbbb", "http://bbbb_ng_container:8080/").await.unwrap();
        table
            .add_route("cloudvols/aaaa/channel488_left_lightsheet", "http://aaaa_ch488_left_container:1337")
            .await
            .unwrap();
        table.add_route("", "http://portal:5000").await.unwrap();

        clock.advance(Duration::from_secs(120));
        table.record_traffic("viewers/bbbb").await;

        let detector = RouteIdleDetector::new(table.clone());
        let idle = detector
            .idle_sessions(clock.now() - TimeDelta::seconds(30))
            .await
            .unwrap();

        assert_eq!(idle, vec![SessionName::new("aaaa").unwrap()]);
    }
}
