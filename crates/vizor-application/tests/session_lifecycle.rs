//! Creation and reaping against the in-memory collaborators.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use vizor_application::{RouteIdleDetector, SessionReaper, ViewerSessionUseCase, ViewerSettings};
use vizor_core::registry::SessionRegistry;
use vizor_core::route::RouteTable;
use vizor_core::session::{
    LayerKind, LightsheetSide, Lifecycle, NameGenerator, SessionName, VisualizationRequest,
};
use vizor_core::VizorError;
use vizor_infrastructure::memory::RouteCall;
use vizor_infrastructure::{
    InMemoryRouteTable, InMemorySessionRegistry, ManualClock, RecordingProvisioner,
};

const IDLE: Duration = Duration::from_secs(30);

/// Names sessions `sess0001`, `sess0002`, ...
#[derive(Default)]
struct SequentialNames {
    next: AtomicU32,
}

impl NameGenerator for SequentialNames {
    fn next_name(&self) -> SessionName {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        SessionName::new(format!("sess{n:04}")).unwrap()
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    registry: Arc<InMemorySessionRegistry>,
    routes: Arc<InMemoryRouteTable>,
    provisioner: Arc<RecordingProvisioner>,
    usecase: ViewerSessionUseCase,
    reaper: SessionReaper,
}

impl Harness {
    async fn new() -> Self {
        Self::with_viewer_delay(Some(Duration::from_millis(20))).await
    }

    /// `None` means the viewer never publishes a token.
    async fn with_viewer_delay(delay: Option<Duration>) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let registry = Arc::new(InMemorySessionRegistry::new());
        let routes = Arc::new(InMemoryRouteTable::new(clock.clone()));
        let provisioner = match delay {
            Some(delay) => {
                RecordingProvisioner::new()
                    .with_viewer(registry.clone(), "tok-1", delay)
                    .await
            }
            None => RecordingProvisioner::new(),
        };
        let provisioner = Arc::new(provisioner);

        let settings = ViewerSettings {
            public_host: "viz.test".to_string(),
            token_poll_interval: Duration::from_millis(5),
            token_timeout: Duration::from_millis(300),
        };
        let usecase = ViewerSessionUseCase::new(
            registry.clone(),
            provisioner.clone(),
            routes.clone(),
            settings,
        )
        .with_name_generator(Arc::new(SequentialNames::default()));

        let reaper = SessionReaper::new(
            Arc::new(RouteIdleDetector::new(routes.clone())),
            registry.clone(),
            provisioner.clone(),
            routes.clone(),
            clock.clone(),
            IDLE,
        );

        Self {
            clock,
            registry,
            routes,
            provisioner,
            usecase,
            reaper,
        }
    }

    /// Lets the idle threshold pass without viewer traffic.
    fn go_idle(&self) {
        self.clock.advance(IDLE * 2);
    }
}

fn data_path(channel: &str, side: LightsheetSide) -> String {
    format!(
        "/jukebox/LightSheetData/lightserv/demo/rawdata/resolution_3.6x/channel_{channel}_{}_raw",
        side.as_str()
    )
}

fn three_layer_request() -> VisualizationRequest {
    VisualizationRequest::from_channels(
        &["488"],
        &[LightsheetSide::Left, LightsheetSide::Right],
        data_path,
    )
    .with_overlay("/jukebox/atlas/princeton_mouse_atlas", "allen")
}

fn session(name: &str) -> SessionName {
    SessionName::new(name).unwrap()
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_two_channels_two_sheets_and_overlay() {
    let h = Harness::with_viewer_delay(Some(Duration::from_millis(40))).await;
    let request = VisualizationRequest::from_channels(
        &["488", "647"],
        &[LightsheetSide::Right, LightsheetSide::Left],
        data_path,
    )
    .with_overlay("/jukebox/atlas/princeton_mouse_atlas", "allen");

    let started = Instant::now();
    let created = h.usecase.create_session(&request).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(created.url, "https://viz.test/nglancer/sess0001/v/tok-1/");
    assert!(created.failed_layers.is_empty());

    assert_eq!(
        h.provisioner.data_starts().await,
        vec![
            "sess0001_ch488_left_container",
            "sess0001_ch488_right_container",
            "sess0001_ch647_left_container",
            "sess0001_ch647_right_container",
            "sess0001_allen_overlay_container",
        ]
    );
    assert_eq!(h.provisioner.viewer_starts().await, 1);

    let added = h.routes.added_paths().await;
    assert_eq!(
        added,
        vec![
            "cloudvols/sess0001/channel488_left_lightsheet",
            "cloudvols/sess0001/channel488_right_lightsheet",
            "cloudvols/sess0001/channel647_left_lightsheet",
            "cloudvols/sess0001/channel647_right_lightsheet",
            "cloudvols/sess0001/allen_overlay",
            "viewers/sess0001",
        ]
    );
    let routes = h.routes.routes().await;
    assert_eq!(
        routes["cloudvols/sess0001/allen_overlay"].target,
        "http://sess0001_allen_overlay_container:1337"
    );
    assert_eq!(routes["viewers/sess0001"].target, "http://sess0001_ng_container:8080/");

    let record = h.registry.get_session(&session("sess0001")).await.unwrap().unwrap();
    assert_eq!(record.layer_count(), 5);
    assert_eq!(record.layers[4].kind, LayerKind::Segmentation);
    assert_eq!(record.layers[4].display_name, "allen_overlay");
    assert_eq!(record.viewer_container_name.as_deref(), Some("sess0001_ng_container"));
    assert_eq!(record.lifecycle, Some(Lifecycle::Live));
}

#[tokio::test]
async fn test_sessions_get_distinct_records() {
    let h = Harness::new().await;

    let first = h.usecase.create_session(&three_layer_request()).await.unwrap();
    let second = h
        .usecase
        .create_session(&VisualizationRequest::new().with_channel(
            data_path("555", LightsheetSide::Left),
            "555",
            LightsheetSide::Left,
        ))
        .await
        .unwrap();

    assert_ne!(first.session, second.session);
    let a = h.registry.get_session(&first.session).await.unwrap().unwrap();
    let b = h.registry.get_session(&second.session).await.unwrap().unwrap();
    assert_eq!(a.name, first.session);
    assert_eq!(a.layer_count(), 3);
    assert_eq!(b.name, second.session);
    assert_eq!(b.layer_count(), 1);
}

#[tokio::test]
async fn test_failed_layer_is_reported_and_skipped() {
    let h = Harness::new().await;
    h.provisioner
        .fail_data_container("sess0001_ch488_right_container")
        .await;

    let created = h.usecase.create_session(&three_layer_request()).await.unwrap();

    assert_eq!(created.layers.len(), 2);
    assert_eq!(created.failed_layers.len(), 1);
    assert_eq!(created.failed_layers[0].display_name, "channel488_right_lightsheet");
    assert!(
        !h.routes
            .added_paths()
            .await
            .contains(&"cloudvols/sess0001/channel488_right_lightsheet".to_string())
    );

    let record = h.registry.get_session(&created.session).await.unwrap().unwrap();
    assert_eq!(record.layer_count(), 2);
    assert_eq!(record.layers[1].display_name, "allen_overlay");
    assert_eq!(record.layers[1].index, 2);
}

#[tokio::test]
async fn test_no_viewer_when_every_layer_fails() {
    let h = Harness::new().await;
    for container in [
        "sess0001_ch488_left_container",
        "sess0001_ch488_right_container",
        "sess0001_allen_overlay_container",
    ] {
        h.provisioner.fail_data_container(container).await;
    }

    let err = h.usecase.create_session(&three_layer_request()).await.unwrap_err();

    match err {
        VizorError::NoLayersProvisioned { session, failures } => {
            assert_eq!(session, "sess0001");
            assert_eq!(failures.len(), 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.provisioner.viewer_starts().await, 0);
    assert!(h.routes.added_paths().await.is_empty());
}

#[tokio::test]
async fn test_session_without_layers_is_removed_by_next_sweep() {
    let h = Harness::new().await;
    let request = VisualizationRequest::new().with_overlay("/jukebox/atlas/missing", "allen");
    h.provisioner
        .fail_data_container("sess0001_allen_overlay_container")
        .await;

    let err = h.usecase.create_session(&request).await.unwrap_err();
    assert!(matches!(err, VizorError::NoLayersProvisioned { .. }));
    assert_eq!(
        h.registry.sessions_in_teardown().await.unwrap(),
        vec![session("sess0001")]
    );

    let report = h.reaper.reap_idle().await.unwrap();

    assert_eq!(report.reaped, vec![session("sess0001")]);
    assert!(h.registry.get_session(&session("sess0001")).await.unwrap().is_none());
    assert!(h.registry.sessions_in_teardown().await.unwrap().is_empty());
    assert!(h.provisioner.terminations().await.is_empty());
}

#[tokio::test]
async fn test_empty_request_has_no_side_effects() {
    let h = Harness::new().await;

    let err = h
        .usecase
        .create_session(&VisualizationRequest::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VizorError::InvalidRequest(_)));
    assert_eq!(h.registry.session_count().await, 0);
    assert!(h.provisioner.calls().await.is_empty());
}

#[tokio::test]
async fn test_viewer_without_token_times_out() {
    let h = Harness::with_viewer_delay(None).await;

    let err = h.usecase.create_session(&three_layer_request()).await.unwrap_err();

    assert!(err.is_viewer_timeout());
    match err {
        VizorError::ViewerFailedToStart { session, waited } => {
            assert_eq!(session, "sess0001");
            assert!(waited >= Duration::from_millis(300));
        }
        other => panic!("unexpected error: {other}"),
    }
    let record = h.registry.get_session(&session("sess0001")).await.unwrap().unwrap();
    assert_eq!(record.lifecycle, Some(Lifecycle::Provisioning));
}

#[tokio::test]
async fn test_unreachable_registry_aborts_creation() {
    let h = Harness::new().await;
    h.registry.set_unreachable(true);

    let err = h.usecase.create_session(&three_layer_request()).await.unwrap_err();

    assert!(err.is_registry());
    assert!(h.provisioner.calls().await.is_empty());
    assert!(h.routes.calls().await.is_empty());
}

// ============================================================================
// Reaping
// ============================================================================

#[tokio::test]
async fn test_nothing_idle_means_no_teardown_calls() {
    let h = Harness::new().await;
    h.usecase.create_session(&three_layer_request()).await.unwrap();
    h.routes.clear_calls().await;

    let report = h.reaper.reap_idle().await.unwrap();

    assert_eq!(report.examined, 0);
    assert!(h.routes.deleted_paths().await.is_empty());
    assert!(h.provisioner.terminations().await.is_empty());
    assert_eq!(h.registry.session_count().await, 1);
}

#[tokio::test]
async fn test_idle_session_is_torn_down_once() {
    let h = Harness::new().await;
    let created = h.usecase.create_session(&three_layer_request()).await.unwrap();
    h.routes.clear_calls().await;
    h.go_idle();

    let report = h.reaper.reap_idle().await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.reaped, vec![created.session.clone()]);
    assert!(report.is_clean());

    let deleted = h.routes.deleted_paths().await;
    assert_eq!(deleted.len(), 1 + 3);
    assert_eq!(deleted[0], "viewers/sess0001");
    assert!(deleted.contains(&"cloudvols/sess0001/allen_overlay".to_string()));

    assert_eq!(
        h.provisioner.terminations().await,
        vec![vec![
            "sess0001_ch488_left_container".to_string(),
            "sess0001_ch488_right_container".to_string(),
            "sess0001_allen_overlay_container".to_string(),
            "sess0001_ng_container".to_string(),
        ]]
    );
    assert!(h.routes.routes().await.is_empty());
    assert!(h.registry.get_session(&created.session).await.unwrap().is_none());
}

#[tokio::test]
async fn test_second_sweep_only_lists() {
    let h = Harness::new().await;
    h.usecase.create_session(&three_layer_request()).await.unwrap();
    h.go_idle();
    h.reaper.reap_idle().await.unwrap();
    h.routes.clear_calls().await;
    let terminations_before = h.provisioner.terminations().await.len();

    let report = h.reaper.reap_idle().await.unwrap();

    assert_eq!(report.examined, 0);
    let calls = h.routes.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], RouteCall::List(Some(_))));
    assert_eq!(h.provisioner.terminations().await.len(), terminations_before);
}

#[tokio::test]
async fn test_busy_session_survives_sweep() {
    let h = Harness::new().await;
    let quiet = h.usecase.create_session(&three_layer_request()).await.unwrap();
    let busy = h.usecase.create_session(&three_layer_request()).await.unwrap();
    h.go_idle();
    h.routes.record_traffic(&format!("viewers/{}", busy.session)).await;

    let report = h.reaper.reap_idle().await.unwrap();

    assert_eq!(report.reaped, vec![quiet.session]);
    assert!(h.registry.get_session(&busy.session).await.unwrap().is_some());
    assert_eq!(h.routes.routes().await.len(), 4);
}

#[tokio::test]
async fn test_sweep_lists_all_routes_once() {
    let h = Harness::new().await;
    for _ in 0..3 {
        h.usecase.create_session(&three_layer_request()).await.unwrap();
    }
    h.routes.clear_calls().await;
    h.go_idle();

    let report = h.reaper.reap_idle().await.unwrap();

    assert_eq!(report.reaped.len(), 3);
    let full_listings = h
        .routes
        .calls()
        .await
        .iter()
        .filter(|call| matches!(call, RouteCall::List(None)))
        .count();
    assert_eq!(full_listings, 1);
    assert_eq!(h.routes.deleted_paths().await.len(), 3 * (1 + 3));
    assert!(h.routes.routes().await.is_empty());
}

#[tokio::test]
async fn test_interrupted_teardown_resumes() {
    let h = Harness::new().await;
    let created = h.usecase.create_session(&three_layer_request()).await.unwrap();
    h.go_idle();
    h.provisioner.fail_next_terminates(1);

    let first = h.reaper.reap_idle().await.unwrap();

    assert!(first.reaped.is_empty());
    assert_eq!(first.failed.len(), 1);
    assert_eq!(first.failed[0].0, created.session);
    let record = h.registry.get_session(&created.session).await.unwrap().unwrap();
    assert_eq!(
        record.lifecycle,
        Some(Lifecycle::Reaping {
            routes_done: true,
            containers_done: false,
        })
    );
    assert_eq!(
        h.registry.sessions_in_teardown().await.unwrap(),
        vec![created.session.clone()]
    );

    h.routes.clear_calls().await;
    let second = h.reaper.reap_idle().await.unwrap();

    assert_eq!(second.reaped, vec![created.session.clone()]);
    assert!(h.routes.deleted_paths().await.is_empty());
    assert_eq!(h.provisioner.terminations().await.len(), 2);
    assert!(h.registry.get_session(&created.session).await.unwrap().is_none());
    assert!(h.registry.sessions_in_teardown().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_route_delete_leaves_session_for_next_sweep() {
    let h = Harness::new().await;
    let created = h.usecase.create_session(&three_layer_request()).await.unwrap();
    h.go_idle();
    h.routes
        .fail_deletes_of("cloudvols/sess0001/channel488_right_lightsheet")
        .await;

    let first = h.reaper.reap_idle().await.unwrap();
    assert_eq!(first.failed.len(), 1);
    assert!(h.provisioner.terminations().await.is_empty());

    h.routes.heal().await;
    let second = h.reaper.reap_idle().await.unwrap();

    assert_eq!(second.reaped, vec![created.session]);
    assert_eq!(h.provisioner.terminations().await.len(), 1);
    assert!(h.routes.routes().await.is_empty());
}

#[tokio::test]
async fn test_session_still_provisioning_is_reaped() {
    let h = Harness::new().await;
    let s = session("halfdone");
    h.registry.create_session(&s).await.unwrap();
    h.registry
        .append_layer(&s, "halfdone_ch488_left_container", "channel488_left_lightsheet", LayerKind::Image)
        .await
        .unwrap();
    h.routes
        .add_route("viewers/halfdone", "http://halfdone_ng_container:8080/")
        .await
        .unwrap();
    h.go_idle();

    let report = h.reaper.reap_idle().await.unwrap();

    assert_eq!(report.reaped, vec![s.clone()]);
    assert_eq!(
        h.routes.deleted_paths().await,
        vec!["viewers/halfdone", "cloudvols/halfdone/channel488_left_lightsheet"]
    );
    assert_eq!(
        h.provisioner.terminations().await,
        vec![vec!["halfdone_ch488_left_container".to_string()]]
    );
}

#[tokio::test]
async fn test_routes_without_record_are_still_removed() {
    let h = Harness::new().await;
    h.routes
        .add_route("viewers/orphan", "http://orphan_ng_container:8080/")
        .await
        .unwrap();
    h.routes
        .add_route("cloudvols/orphan/channel488_left_lightsheet", "http://orphan_ch488_left_container:1337")
        .await
        .unwrap();
    h.go_idle();

    let report = h.reaper.reap_idle().await.unwrap();

    assert_eq!(report.reaped, vec![session("orphan")]);
    assert!(h.routes.routes().await.is_empty());
    assert!(h.provisioner.terminations().await.is_empty());
}

#[tokio::test]
async fn test_unreachable_registry_fails_the_sweep() {
    let h = Harness::new().await;
    h.usecase.create_session(&three_layer_request()).await.unwrap();
    h.go_idle();
    h.registry.set_unreachable(true);

    let err = h.reaper.reap_idle().await.unwrap_err();

    assert!(err.is_registry());
    assert!(h.routes.deleted_paths().await.is_empty());
}
