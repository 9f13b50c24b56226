//! Visualization request types.
//!
//! A request is the ordered list of layers a user picked on the
//! visualization form. Order matters: layers are provisioned and shown in
//! exactly this order.

use super::model::LayerKind;
use super::naming;
use crate::error::{Result, VizorError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Which light sheet a channel was imaged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightsheetSide {
    Left,
    Right,
}

impl LightsheetSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightsheetSide::Left => "left",
            LightsheetSide::Right => "right",
        }
    }
}

impl fmt::Display for LightsheetSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One layer picked on the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSelection {
    /// A channel imaged with one light sheet
    Channel {
        /// Precomputed volume directory handed to the data container
        path: String,
        channel: String,
        side: LightsheetSide,
        #[serde(default)]
        kind: LayerKind,
    },
    /// An atlas annotation overlay; always rendered as segmentation
    Overlay { path: String, atlas: String },
}

impl LayerSelection {
    pub fn path(&self) -> &str {
        match self {
            LayerSelection::Channel { path, .. } | LayerSelection::Overlay { path, .. } => path,
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            LayerSelection::Channel { kind, .. } => *kind,
            LayerSelection::Overlay { .. } => LayerKind::Segmentation,
        }
    }
}

/// Everything the creation workflow needs from the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualizationRequest {
    pub selections: Vec<LayerSelection>,
}

impl VisualizationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an image layer for one channel/light-sheet combination.
    pub fn with_channel(
        mut self,
        path: impl Into<String>,
        channel: impl Into<String>,
        side: LightsheetSide,
    ) -> Self {
        self.selections.push(LayerSelection::Channel {
            path: path.into(),
            channel: channel.into(),
            side,
            kind: LayerKind::Image,
        });
        self
    }

    /// Appends an atlas overlay layer.
    pub fn with_overlay(mut self, path: impl Into<String>, atlas: impl Into<String>) -> Self {
        self.selections.push(LayerSelection::Overlay {
            path: path.into(),
            atlas: atlas.into(),
        });
        self
    }

    /// Builds the channel-major expansion the form produces:
    /// for each channel, every requested light sheet, left before right.
    ///
    /// `path_for` resolves the data directory of one combination.
    pub fn from_channels<F>(channels: &[&str], sides: &[LightsheetSide], path_for: F) -> Self
    where
        F: Fn(&str, LightsheetSide) -> String,
    {
        let mut ordered_sides = sides.to_vec();
        ordered_sides.sort_by_key(|side| matches!(side, LightsheetSide::Right));
        ordered_sides.dedup();

        let mut request = Self::new();
        for channel in channels {
            for side in &ordered_sides {
                request = request.with_channel(path_for(channel, *side), *channel, *side);
            }
        }
        request
    }

    /// Rejects requests that would produce no layers or colliding routes.
    pub fn validate(&self) -> Result<()> {
        if self.selections.is_empty() {
            return Err(VizorError::invalid_request("no layers selected"));
        }

        let mut seen = HashSet::new();
        for selection in &self.selections {
            if selection.path().trim().is_empty() {
                return Err(VizorError::invalid_request("layer with empty data path"));
            }
            let display = naming::display_name(selection);
            if !seen.insert(display.clone()) {
                return Err(VizorError::invalid_request(format!(
                    "layer '{display}' selected more than once"
                )));
            }
        }
        Ok(())
    }
}
