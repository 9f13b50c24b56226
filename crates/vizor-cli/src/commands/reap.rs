use crate::context::AppContext;
use anyhow::{Context, Result};
use vizor_core::config::VizorConfig;

pub async fn run(config: VizorConfig) -> Result<()> {
    let ctx = AppContext::connect(config).await?;
    let report = ctx.reaper().reap_idle().await.context("Reaper sweep failed")?;

    println!("examined: {}", report.examined);
    for session in &report.reaped {
        println!("reaped:   {session}");
    }
    for (session, error) in &report.failed {
        println!("failed:   {session}: {error}");
    }

    if !report.is_clean() {
        anyhow::bail!("{} teardowns left for the next sweep", report.failed.len());
    }
    Ok(())
}
