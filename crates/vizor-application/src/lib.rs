//! Application layer for vizor.
//!
//! Use cases that drive the ports from `vizor-core`: session creation, idle
//! detection and the reaper with its scheduler.

pub mod idle_detector;
pub mod reaper;
pub mod scheduler;
pub mod viewer_session_usecase;

pub use idle_detector::RouteIdleDetector;
pub use reaper::{ReapReport, SessionReaper};
pub use scheduler::ReaperScheduler;
pub use viewer_session_usecase::{SessionCreated, ViewerSessionUseCase, ViewerSettings};
