//! Idle detection port and the clock it is measured against.

use crate::error::Result;
use crate::session::SessionName;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Reports sessions that have gone idle.
///
/// The orchestrator keeps no activity clock of its own; implementations ask
/// whoever observes real traffic.
#[async_trait]
pub trait IdleDetector: Send + Sync {
    /// Sessions with no traffic since `since`.
    async fn idle_sessions(&self, since: DateTime<Utc>) -> Result<Vec<SessionName>>;
}

/// Wall clock, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
