//! Naming rules shared with the launched containers and the proxy.
//!
//! Container names, layer names, route paths and the public viewer URL are
//! all derived from the session name; the data and viewer containers rely on
//! these exact shapes, so they are kept in one place.

use super::model::SessionName;
use super::request::LayerSelection;

/// Route prefix of data-serving layers: `cloudvols/{session}/{layer}`.
pub const LAYER_ROUTE_ROOT: &str = "cloudvols";
/// Route prefix of viewers: `viewers/{session}`.
pub const VIEWER_ROUTE_ROOT: &str = "viewers";
/// Port the data containers listen on.
pub const DATA_CONTAINER_PORT: u16 = 1337;
/// Port the viewer container listens on.
pub const VIEWER_CONTAINER_PORT: u16 = 8080;

/// Names derived for one selected layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerNames {
    pub container_name: String,
    pub display_name: String,
}

/// Layer name as shown in the viewer.
pub fn display_name(selection: &LayerSelection) -> String {
    match selection {
        LayerSelection::Channel { channel, side, .. } => {
            format!("channel{channel}_{side}_lightsheet")
        }
        LayerSelection::Overlay { atlas, .. } => format!("{atlas}_overlay"),
    }
}

/// Container and display names of one layer in a session.
pub fn layer_names(session: &SessionName, selection: &LayerSelection) -> LayerNames {
    let container_name = match selection {
        LayerSelection::Channel { channel, side, .. } => {
            format!("{session}_ch{channel}_{side}_container")
        }
        LayerSelection::Overlay { atlas, .. } => format!("{session}_{atlas}_overlay_container"),
    };
    LayerNames {
        container_name,
        display_name: display_name(selection),
    }
}

pub fn viewer_container_name(session: &SessionName) -> String {
    format!("{session}_ng_container")
}

pub fn layer_route_path(session: &SessionName, display_name: &str) -> String {
    format!("{LAYER_ROUTE_ROOT}/{session}/{display_name}")
}

/// Prefix shared by every layer route of a session (trailing `/` included).
pub fn layer_route_prefix(session: &SessionName) -> String {
    format!("{LAYER_ROUTE_ROOT}/{session}/")
}

pub fn viewer_route_path(session: &SessionName) -> String {
    format!("{VIEWER_ROUTE_ROOT}/{session}")
}

pub fn layer_upstream(container_name: &str) -> String {
    format!("http://{container_name}:{DATA_CONTAINER_PORT}")
}

pub fn viewer_upstream(container_name: &str) -> String {
    format!("http://{container_name}:{VIEWER_CONTAINER_PORT}/")
}

/// Public URL of a live viewer.
pub fn viewer_url(public_host: &str, session: &SessionName, token: &str) -> String {
    format!("https://{public_host}/nglancer/{session}/v/{token}/")
}

/// Session embedded in a viewer route path, if `path` is one.
///
/// Accepts paths with or without a leading `/`.
pub fn session_from_viewer_path(path: &str) -> Option<SessionName> {
    let rest = path
        .trim_start_matches('/')
        .strip_prefix(VIEWER_ROUTE_ROOT)?
        .strip_prefix('/')?;
    let rest = rest.trim_end_matches('/');
    if rest.contains('/') {
        return None;
    }
    SessionName::new(rest).ok()
}

/// Whether `path` is a layer route of `session`.
pub fn is_layer_route_of(path: &str, session: &SessionName) -> bool {
    path.trim_start_matches('/')
        .starts_with(&layer_route_prefix(session))
}
