//! Route table port: the reverse proxy's path map.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the proxy knows about one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Upstream address requests are forwarded to
    pub target: String,
    /// Last time the proxy forwarded traffic on this route
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
}

/// Routes keyed by path, without the leading `/`.
pub type RouteMap = BTreeMap<String, RouteInfo>;

/// Manages routes on the shared reverse proxy.
///
/// `add_route` and `delete_route` are idempotent, which makes retrying them
/// safe.
#[async_trait]
pub trait RouteTable: Send + Sync {
    /// Points `path` at `upstream`, replacing any previous target.
    async fn add_route(&self, path: &str, upstream: &str) -> Result<()>;

    /// Removes `path`. Removing an absent path succeeds.
    async fn delete_route(&self, path: &str) -> Result<()>;

    /// Lists routes; with `inactive_since`, only those whose last traffic is
    /// older than that instant.
    async fn list_routes(&self, inactive_since: Option<DateTime<Utc>>) -> Result<RouteMap>;
}

/// Normalises a proxy path to the form used as [`RouteMap`] key.
pub fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/viewers/abc"), "viewers/abc");
        assert_eq!(normalize_path("viewers/abc"), "viewers/abc");
    }

    #[test]
    fn test_route_info_tolerates_missing_activity() {
        let info: RouteInfo = serde_json::from_str(r#"{"target":"http://x:1337"}"#).unwrap();
        assert_eq!(info.last_activity, None);
    }
}
