//! Shared node value types: status, labels, property maps.

use serde::{Deserialize, Serialize};

/// A dynamic, emulator-specific property bag.
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

/// Run state of a node, as last reported by its compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Not running.
    #[default]
    Stopped,
    /// Running.
    Started,
    /// Paused in place.
    Suspended,
}

const DEFAULT_LABEL_STYLE: &str =
    "font-family: TypeWriter;font-size: 10.0;font-weight: bold;fill: #000000;fill-opacity: 1.0;";

/// On-canvas text label attached to a node.
///
/// `text` always mirrors the node name; the node re-pins it after every
/// rename and after every label patch. The remaining sub-fields persist
/// until explicitly reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Displayed text. Kept equal to the node name.
    pub text: String,
    /// Horizontal offset; `None` means centered on the symbol.
    pub x: Option<i32>,
    /// Vertical offset relative to the symbol.
    pub y: i32,
    /// Rotation in degrees.
    pub rotation: i32,
    /// SVG style string.
    pub style: String,
}

impl Label {
    /// The default label for a freshly built node.
    #[must_use]
    pub fn for_name(name: &str) -> Self {
        Self {
            text: name.to_string(),
            x: None,
            y: -25,
            rotation: 0,
            style: DEFAULT_LABEL_STYLE.to_string(),
        }
    }

    /// Apply the provided sub-fields, leaving the rest intact.
    ///
    /// `text` is accepted here but immediately overwritten by the node,
    /// which pins it to the node name.
    pub fn merge(&mut self, patch: &LabelPatch) {
        if let Some(text) = &patch.text {
            self.text.clone_from(text);
        }
        if let Some(x) = patch.x {
            self.x = Some(x);
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(rotation) = patch.rotation {
            self.rotation = rotation;
        }
        if let Some(style) = &patch.style {
            self.style.clone_from(style);
        }
    }
}

/// Partial reassignment of label sub-fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPatch {
    /// New text (ignored in practice: the node pins text to its name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// New horizontal offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    /// New vertical offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    /// New rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<i32>,
    /// New style string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}
