//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: session record, layers, viewer handoff blob, lifecycle
//! - `request`: what the user selected on the visualization form
//! - `naming`: container names, route paths and the public URL

mod model;
pub mod naming;
mod request;

pub use model::{
    LayerFailure, LayerKind, LayerRecord, Lifecycle, NameGenerator, RandomNameGenerator,
    SessionName, SessionRecord, ViewerInfo,
};
pub use request::{LayerSelection, LightsheetSide, VisualizationRequest};
