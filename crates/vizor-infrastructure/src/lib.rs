//! Adapters for the ports defined in `vizor-core`.
//!
//! - [`redis_registry`]: the shared session registry
//! - [`launcher_client`]: container provisioning over the launcher's HTTP API
//! - [`proxy_client`]: the reverse proxy's route API
//! - [`memory`]: in-process doubles with the same semantics

pub mod config_service;
mod http;
pub mod launcher_client;
pub mod memory;
pub mod proxy_client;
pub mod record_schema;
pub mod redis_registry;
pub mod retry;

pub use config_service::ConfigService;
pub use launcher_client::HttpProvisioner;
pub use memory::{
    InMemoryRouteTable, InMemorySessionRegistry, ManualClock, ProvisionerCall, RecordingProvisioner,
    RouteCall,
};
pub use proxy_client::ProxyRouteTable;
pub use redis_registry::RedisSessionRegistry;
pub use retry::RetryPolicy;
