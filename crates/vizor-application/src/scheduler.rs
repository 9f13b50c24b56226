//! Periodic and on-demand reaper runs.

use crate::reaper::{ReapReport, SessionReaper};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use vizor_core::Result;

/// Runs [`SessionReaper`] sweeps, never more than one at a time.
///
/// A tick or trigger that finds a sweep in flight is skipped rather than
/// queued.
pub struct ReaperScheduler {
    reaper: Arc<SessionReaper>,
    in_flight: Mutex<()>,
    interval: Duration,
}

impl ReaperScheduler {
    pub fn new(reaper: Arc<SessionReaper>, interval: Duration) -> Self {
        Self {
            reaper,
            in_flight: Mutex::new(()),
            interval,
        }
    }

    /// Runs one sweep now, or returns `None` if one is already running.
    pub async fn run_once(&self) -> Option<Result<ReapReport>> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::info!(target: "vizor::scheduler", "[ReaperScheduler] Sweep already running, skipping");
            return None;
        };
        Some(self.reaper.reap_idle().await)
    }

    /// Starts a sweep in the background and returns immediately.
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.sweep_and_log().await;
        })
    }

    /// Starts the periodic loop. The first sweep runs immediately.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(
                target: "vizor::scheduler",
                "[ReaperScheduler] Started ({:?} interval)",
                scheduler.interval
            );

            loop {
                ticker.tick().await;
                scheduler.sweep_and_log().await;
            }
        })
    }

    async fn sweep_and_log(&self) {
        match self.run_once().await {
            Some(Ok(report)) if report.examined > 0 => {
                tracing::info!(
                    target: "vizor::scheduler",
                    "[ReaperScheduler] Examined {}, reaped {}, failed {}",
                    report.examined,
                    report.reaped.len(),
                    report.failed.len()
                );
            }
            Some(Ok(_)) | None => {}
            Some(Err(e)) => {
                tracing::error!(target: "vizor::scheduler", "[ReaperScheduler] Sweep failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idle_detector::RouteIdleDetector;
    use chrono::Utc;
    use vizor_infrastructure::memory::RouteCall;
    use vizor_infrastructure::{
        InMemoryRouteTable, InMemorySessionRegistry, ManualClock, RecordingProvisioner,
    };

    fn build_scheduler(interval: Duration) -> (Arc<ReaperScheduler>, Arc<InMemoryRouteTable>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let routes = Arc::new(InMemoryRouteTable::new(clock.clone()));
        let reaper = SessionReaper::new(
            Arc::new(RouteIdleDetector::new(routes.clone())),
            Arc::new(InMemorySessionRegistry::new()),
            Arc::new(RecordingProvisioner::new()),
            routes.clone(),
            clock,
            Duration::from_secs(30),
        );
        (
            Arc::new(ReaperScheduler::new(Arc::new(reaper), interval)),
            routes,
        )
    }

    fn listings(calls: &[RouteCall]) -> usize {
        calls
            .iter()
            .filter(|call| matches!(call, RouteCall::List(Some(_))))
            .count()
    }

    #[tokio::test]
    async fn test_sweep_skipped_while_one_is_in_flight() {
        let (scheduler, routes) = build_scheduler(Duration::from_secs(60));

        let held = scheduler.in_flight.lock().await;
        assert!(scheduler.run_once().await.is_none());
        drop(held);

        let report = scheduler.run_once().await.unwrap().unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(listings(&routes.calls().await), 1);
    }

    #[tokio::test]
    async fn test_trigger_runs_a_sweep() {
        let (scheduler, routes) = build_scheduler(Duration::from_secs(60));
        scheduler.trigger().await.unwrap();
        assert_eq!(listings(&routes.calls().await), 1);
    }

    #[tokio::test]
    async fn test_periodic_loop_keeps_sweeping() {
        let (scheduler, routes) = build_scheduler(Duration::from_millis(10));
        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(listings(&routes.calls().await) >= 2);
    }
}
