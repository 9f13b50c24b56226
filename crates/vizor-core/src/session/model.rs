//! Session domain model.
//!
//! This module contains the typed view of one session record as it lives in
//! the registry. Field-name conventions of the wire format are the registry
//! implementation's business; everything here is already decoded.

use crate::error::{Result, VizorError};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, high-entropy identifier of one visualization session.
///
/// The name ends up inside proxy paths and container names, so only ASCII
/// alphanumerics, `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    /// Validates and wraps a session name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(name))
        } else {
            Err(VizorError::InvalidSessionName(name))
        }
    }

    /// Generates a fresh name: 6 random bytes rendered as 12 hex characters.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionName {
    type Error = VizorError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SessionName> for String {
    fn from(value: SessionName) -> Self {
        value.0
    }
}

/// Source of session names for the creation workflow.
///
/// Production uses [`RandomNameGenerator`]; tests plug in deterministic
/// sequences.
pub trait NameGenerator: Send + Sync {
    fn next_name(&self) -> SessionName;
}

/// Default generator backed by [`SessionName::generate`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNameGenerator;

impl NameGenerator for RandomNameGenerator {
    fn next_name(&self) -> SessionName {
        SessionName::generate()
    }
}

/// How the viewer should render a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    #[default]
    Image,
    Segmentation,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Image => "image",
            LayerKind::Segmentation => "segmentation",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "image" => Ok(LayerKind::Image),
            "segmentation" => Ok(LayerKind::Segmentation),
            other => Err(format!("unknown layer type '{other}'")),
        }
    }
}

/// One provisioned data-serving layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRecord {
    /// 1-based position in the session, in provisioning order
    pub index: u32,
    pub container_name: String,
    /// Layer name shown by the viewer and used in the layer's route
    pub display_name: String,
    pub kind: LayerKind,
}

/// The blob the viewer publishes once it is serving.
///
/// Only `token` is part of the contract; whatever else the viewer writes
/// (host, port, ...) is preserved untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerInfo {
    pub token: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ViewerInfo {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Adds an auxiliary field such as `host` or `port`.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Where a session is in its life, persisted next to the record.
///
/// `Reaping` records which teardown phases already completed so an
/// interrupted sweep can be resumed without repeating finished work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    Provisioning,
    Live,
    Reaping {
        routes_done: bool,
        containers_done: bool,
    },
}

impl Lifecycle {
    /// Start of a teardown, nothing done yet.
    pub fn reaping() -> Self {
        Lifecycle::Reaping {
            routes_done: false,
            containers_done: false,
        }
    }

    pub fn is_reaping(&self) -> bool {
        matches!(self, Lifecycle::Reaping { .. })
    }
}

/// Snapshot of one session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub name: SessionName,
    /// Layers in provisioning order; the length is the record's layer count
    pub layers: Vec<LayerRecord>,
    pub viewer_container_name: Option<String>,
    /// Present once the viewer has published itself
    pub viewer: Option<ViewerInfo>,
    /// Absent for records written by tools that predate lifecycle tracking
    pub lifecycle: Option<Lifecycle>,
}

impl SessionRecord {
    /// A freshly created record: no layers, no viewer.
    pub fn new(name: SessionName) -> Self {
        Self {
            name,
            layers: Vec::new(),
            viewer_container_name: None,
            viewer: None,
            lifecycle: Some(Lifecycle::Provisioning),
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn viewer_token(&self) -> Option<&str> {
        self.viewer.as_ref().map(|v| v.token.as_str())
    }

    /// Every backing container: layer containers in order, then the viewer.
    pub fn container_names(&self) -> Vec<String> {
        self.layers
            .iter()
            .map(|layer| layer.container_name.clone())
            .chain(self.viewer_container_name.clone())
            .collect()
    }
}

/// A layer the creation workflow could not provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerFailure {
    pub display_name: String,
    pub container_name: String,
    pub error: String,
}
