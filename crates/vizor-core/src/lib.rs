//! Domain layer for vizor.
//!
//! Holds the session model, the naming rules shared with the launched
//! containers, and the ports (registry, provisioner, route table, idle
//! detection) that the application layer drives.

pub mod config;
pub mod error;
pub mod idle;
pub mod provisioner;
pub mod registry;
pub mod route;
pub mod session;

pub use error::{Result, VizorError};
