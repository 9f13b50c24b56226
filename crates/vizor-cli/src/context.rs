//! Wiring of config into concrete adapters and use cases.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use vizor_application::{
    ReaperScheduler, RouteIdleDetector, SessionReaper, ViewerSessionUseCase, ViewerSettings,
};
use vizor_core::config::VizorConfig;
use vizor_core::idle::SystemClock;
use vizor_core::provisioner::Provisioner;
use vizor_core::registry::SessionRegistry;
use vizor_core::route::RouteTable;
use vizor_infrastructure::{
    ConfigService, HttpProvisioner, ProxyRouteTable, RedisSessionRegistry, RetryPolicy,
};

pub fn load_config(path: Option<PathBuf>) -> Result<VizorConfig> {
    let service = ConfigService::new(path);
    let config = service.load().with_context(|| match service.path() {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })?;
    Ok(config)
}

pub fn route_table(config: &VizorConfig) -> Result<Arc<dyn RouteTable>> {
    let routes = ProxyRouteTable::new(&config.proxy, RetryPolicy::from_config(&config.retry))
        .context("Failed to create proxy client")?;
    Ok(Arc::new(routes))
}

pub async fn registry(config: &VizorConfig) -> Result<Arc<dyn SessionRegistry>> {
    let registry = RedisSessionRegistry::connect(&config.registry.url)
        .await
        .with_context(|| format!("Failed to connect to registry at {}", config.registry.url))?;
    Ok(Arc::new(registry))
}

/// Every collaborator, connected.
pub struct AppContext {
    pub config: VizorConfig,
    pub registry: Arc<dyn SessionRegistry>,
    pub provisioner: Arc<dyn Provisioner>,
    pub routes: Arc<dyn RouteTable>,
}

impl AppContext {
    pub async fn connect(config: VizorConfig) -> Result<Self> {
        let registry = registry(&config).await?;
        let provisioner = HttpProvisioner::new(&config.launcher, RetryPolicy::from_config(&config.retry))
            .context("Failed to create launcher client")?;
        let routes = route_table(&config)?;
        Ok(Self {
            config,
            registry,
            provisioner: Arc::new(provisioner),
            routes,
        })
    }

    pub fn usecase(&self) -> ViewerSessionUseCase {
        ViewerSessionUseCase::new(
            self.registry.clone(),
            self.provisioner.clone(),
            self.routes.clone(),
            ViewerSettings::from_config(&self.config.viewer),
        )
    }

    pub fn reaper(&self) -> SessionReaper {
        SessionReaper::new(
            Arc::new(RouteIdleDetector::new(self.routes.clone())),
            self.registry.clone(),
            self.provisioner.clone(),
            self.routes.clone(),
            Arc::new(SystemClock),
            self.config.reaper.idle_threshold(),
        )
    }

    pub fn scheduler(&self) -> Arc<ReaperScheduler> {
        Arc::new(ReaperScheduler::new(
            Arc::new(self.reaper()),
            self.config.reaper.interval(),
        ))
    }
}
