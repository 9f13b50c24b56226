use crate::context::AppContext;
use anyhow::{Context, Result};
use std::path::Path;
use vizor_core::config::VizorConfig;
use vizor_core::session::VisualizationRequest;

pub async fn run(config: VizorConfig, request_path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(request_path)
        .with_context(|| format!("Failed to read {}", request_path.display()))?;
    let request: VisualizationRequest = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as a request", request_path.display()))?;

    let ctx = AppContext::connect(config).await?;
    let created = ctx
        .usecase()
        .create_session(&request)
        .await
        .context("Session creation failed")?;

    println!("{}", serde_json::to_string_pretty(&created)?);
    Ok(())
}
