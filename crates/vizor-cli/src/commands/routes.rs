use crate::context;
use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use vizor_core::config::VizorConfig;
use vizor_core::route::RouteTable;

pub async fn run(config: VizorConfig, inactive_secs: Option<u64>) -> Result<()> {
    let routes = context::route_table(&config)?;
    let since = match inactive_secs {
        Some(secs) => {
            let secs = i64::try_from(secs).context("--inactive-secs is too large")?;
            Some(Utc::now() - TimeDelta::seconds(secs))
        }
        None => None,
    };

    let listing = routes.list_routes(since).await.context("Failed to list routes")?;
    for (path, info) in &listing {
        let activity = info
            .last_activity
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("/{path} -> {} (last activity {activity})", info.target);
    }
    Ok(())
}
