//! Field layout of a session hash in the registry.
//!
//! The viewer container reads these exact field names, so they must not
//! change: `cv_count`, `cv{n}_container_name`, `cv{n}_name`,
//! `layer{n}_type`, `ng_container_name` and the `viewer` JSON blob. The
//! `lifecycle` field is ours and ignored by the viewer.

use std::collections::HashMap;
use vizor_core::session::{LayerKind, LayerRecord, Lifecycle, SessionName, SessionRecord, ViewerInfo};
use vizor_core::{Result, VizorError};

pub const LAYER_COUNT_FIELD: &str = "cv_count";
pub const VIEWER_CONTAINER_FIELD: &str = "ng_container_name";
pub const VIEWER_FIELD: &str = "viewer";
pub const LIFECYCLE_FIELD: &str = "lifecycle";

/// A per-layer field, named `{prefix}{index}{suffix}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerField {
    prefix: &'static str,
    suffix: &'static str,
}

impl LayerField {
    pub fn name(&self, index: u32) -> String {
        format!("{}{index}{}", self.prefix, self.suffix)
    }
}

pub const LAYER_CONTAINER_FIELD: LayerField = LayerField {
    prefix: "cv",
    suffix: "_container_name",
};
pub const LAYER_NAME_FIELD: LayerField = LayerField {
    prefix: "cv",
    suffix: "_name",
};
pub const LAYER_TYPE_FIELD: LayerField = LayerField {
    prefix: "layer",
    suffix: "_type",
};

/// Fields written by `create_session`.
pub fn initial_fields() -> Result<Vec<(String, String)>> {
    Ok(vec![
        (LAYER_COUNT_FIELD.to_string(), "0".to_string()),
        (LIFECYCLE_FIELD.to_string(), encode_lifecycle(Lifecycle::Provisioning)?),
    ])
}

/// Arguments of the registry's append script: the count field, then a
/// `(prefix, suffix, value)` triple per layer field. The script names each
/// field with the index it allocates.
pub fn append_layer_args(container_name: &str, display_name: &str, kind: LayerKind) -> Vec<String> {
    let mut args = vec![LAYER_COUNT_FIELD.to_string()];
    for (field, value) in [
        (LAYER_CONTAINER_FIELD, container_name),
        (LAYER_NAME_FIELD, display_name),
        (LAYER_TYPE_FIELD, kind.as_str()),
    ] {
        args.extend([
            field.prefix.to_string(),
            field.suffix.to_string(),
            value.to_string(),
        ]);
    }
    args
}

pub fn encode_lifecycle(lifecycle: Lifecycle) -> Result<String> {
    Ok(serde_json::to_string(&lifecycle)?)
}

pub fn encode_viewer(viewer: &ViewerInfo) -> Result<String> {
    Ok(serde_json::to_string(viewer)?)
}

/// Decodes the result of `HGETALL`. An empty hash means no record.
pub fn decode_record(
    name: &SessionName,
    fields: &HashMap<String, String>,
) -> Result<Option<SessionRecord>> {
    if fields.is_empty() {
        return Ok(None);
    }

    let count = fields
        .get(LAYER_COUNT_FIELD)
        .ok_or_else(|| VizorError::decode(name.as_str(), "missing cv_count"))?
        .parse::<u32>()
        .map_err(|e| VizorError::decode(name.as_str(), format!("cv_count is not a count: {e}")))?;

    let mut layers = Vec::with_capacity(count as usize);
    for index in 1..=count {
        let kind = required(name, fields, LAYER_TYPE_FIELD.name(index))?
            .parse::<LayerKind>()
            .map_err(|e| VizorError::decode(name.as_str(), e))?;
        layers.push(LayerRecord {
            index,
            container_name: required(name, fields, LAYER_CONTAINER_FIELD.name(index))?.clone(),
            display_name: required(name, fields, LAYER_NAME_FIELD.name(index))?.clone(),
            kind,
        });
    }

    let viewer = fields
        .get(VIEWER_FIELD)
        .map(|raw| serde_json::from_str::<ViewerInfo>(raw))
        .transpose()
        .map_err(|e| VizorError::decode(name.as_str(), format!("viewer blob: {e}")))?;

    let lifecycle = fields
        .get(LIFECYCLE_FIELD)
        .map(|raw| serde_json::from_str::<Lifecycle>(raw))
        .transpose()
        .map_err(|e| VizorError::decode(name.as_str(), format!("lifecycle: {e}")))?;

    Ok(Some(SessionRecord {
        name: name.clone(),
        layers,
        viewer_container_name: fields.get(VIEWER_CONTAINER_FIELD).cloned(),
        viewer,
        lifecycle,
    }))
}

fn required<'a>(
    name: &SessionName,
    fields: &'a HashMap<String, String>,
    field: String,
) -> Result<&'a String> {
    fields
        .get(&field)
        .ok_or_else(|| VizorError::decode(name.as_str(), format!("missing {field}")))
}
