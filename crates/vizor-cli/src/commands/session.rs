use crate::context;
use anyhow::{Context, Result};
use vizor_core::config::VizorConfig;
use vizor_core::registry::SessionRegistry;
use vizor_core::session::SessionName;

pub async fn run(config: VizorConfig, name: &str) -> Result<()> {
    let name = SessionName::new(name)?;
    let registry = context::registry(&config).await?;

    let record = registry
        .get_session(&name)
        .await
        .with_context(|| format!("Failed to read session {name}"))?
        .with_context(|| format!("No session named {name}"))?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
