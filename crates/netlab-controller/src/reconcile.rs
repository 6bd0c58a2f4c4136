//! Pure diff engine for node updates.
//!
//! Given the node's current state and a requested patch, this module
//! decides which changes stay controller-side, which must be dispatched to
//! the compute, and what the minimal dispatch payload looks like. No I/O
//! happens here; the node applies the result.

use serde_json::json;

use crate::schema::NodeTypeSchema;
use crate::types::{Label, LabelPatch, PropertyMap};

/// A requested change set for a node. Absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    /// New node name.
    pub name: Option<String>,
    /// New console port.
    pub console: Option<u16>,
    /// New console type (telnet, vnc, ...).
    pub console_type: Option<String>,
    /// New canvas coordinates.
    pub x: Option<i32>,
    /// See `x`.
    pub y: Option<i32>,
    /// See `x`.
    pub z: Option<i32>,
    /// New rendered width.
    pub width: Option<u32>,
    /// New rendered height.
    pub height: Option<u32>,
    /// New symbol path.
    pub symbol: Option<String>,
    /// Partial label reassignment.
    pub label: Option<LabelPatch>,
    /// Emulator-specific properties. Only the keys present here are
    /// considered; a null value means "not specified" and is skipped.
    pub properties: PropertyMap,
}

/// The node state a patch is diffed against.
#[derive(Debug, Clone, Copy)]
pub struct NodeSnapshot<'a> {
    /// Current name.
    pub name: &'a str,
    /// Current console port.
    pub console: Option<u16>,
    /// Current console type.
    pub console_type: Option<&'a str>,
    /// Current canvas coordinates.
    pub x: i32,
    /// See `x`.
    pub y: i32,
    /// See `x`.
    pub z: i32,
    /// Current rendered width.
    pub width: u32,
    /// Current rendered height.
    pub height: u32,
    /// Current symbol path.
    pub symbol: &'a str,
    /// Current label.
    pub label: &'a Label,
    /// Current property bag.
    pub properties: &'a PropertyMap,
}

/// Controller-only changes that actually differ from current state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalChanges {
    /// New x coordinate, if changed.
    pub x: Option<i32>,
    /// New y coordinate, if changed.
    pub y: Option<i32>,
    /// New z coordinate, if changed.
    pub z: Option<i32>,
    /// New width, if changed.
    pub width: Option<u32>,
    /// New height, if changed.
    pub height: Option<u32>,
    /// New symbol, if changed.
    pub symbol: Option<String>,
    /// Label patch, if it changes anything.
    pub label: Option<LabelPatch>,
    /// Changed properties the compute does not care about.
    pub properties: PropertyMap,
}

impl LocalChanges {
    /// True when nothing controller-side changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_none()
            && self.y.is_none()
            && self.z.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.symbol.is_none()
            && self.label.is_none()
            && self.properties.is_empty()
    }
}

/// Compute-dispatched top-level values the caller requested.
///
/// Applied to the node's shadow state only after the compute confirms the
/// update; response echoes then take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteChanges {
    /// New name, if changed.
    pub name: Option<String>,
    /// New console port, if changed.
    pub console: Option<u16>,
    /// New console type, if changed.
    pub console_type: Option<String>,
}

/// The outcome of diffing a patch against current state.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Controller-only changes to apply locally.
    pub local: LocalChanges,
    /// Compute-side top-level values to apply after a confirmed dispatch.
    pub accepted: RemoteChanges,
    /// The dispatch body. Only meaningful when `compute_dirty` is set:
    /// the changed allow-listed properties plus `name`, `console` and
    /// `console_type`, which always ride along.
    pub payload: PropertyMap,
    /// True iff at least one compute-dispatched field changed.
    pub compute_dirty: bool,
}

impl Reconciliation {
    /// True when the patch changes nothing at all.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.compute_dirty && self.local.is_empty()
    }
}

/// Diff `patch` against `current` under the given type schema.
#[must_use]
pub fn reconcile(
    schema: &NodeTypeSchema,
    current: &NodeSnapshot<'_>,
    patch: &NodePatch,
) -> Reconciliation {
    let mut recon = Reconciliation::default();

    if let Some(name) = &patch.name {
        if name != current.name {
            recon.accepted.name = Some(name.clone());
            recon.compute_dirty = true;
        }
    }
    if let Some(console) = patch.console {
        if Some(console) != current.console {
            recon.accepted.console = Some(console);
            recon.compute_dirty = true;
        }
    }
    if let Some(console_type) = &patch.console_type {
        if Some(console_type.as_str()) != current.console_type {
            recon.accepted.console_type = Some(console_type.clone());
            recon.compute_dirty = true;
        }
    }

    diff_geometry(current, patch, &mut recon.local);

    if let Some(label_patch) = &patch.label {
        let mut merged = current.label.clone();
        merged.merge(label_patch);
        // The node pins label text to its name, so a text-only patch is
        // not an observable change.
        merged.text.clone_from(&current.label.text);
        if merged != *current.label {
            recon.local.label = Some(label_patch.clone());
        }
    }

    for (key, value) in &patch.properties {
        if value.is_null() {
            // Null means "not specified": compute-side defaults apply.
            continue;
        }
        if current.properties.get(key) == Some(value) {
            continue;
        }
        if schema.compute_properties.contains(&key.as_str()) {
            recon.payload.insert(key.clone(), value.clone());
            recon.compute_dirty = true;
        } else {
            recon.local.properties.insert(key.clone(), value.clone());
        }
    }

    if recon.compute_dirty {
        let name = recon.accepted.name.as_deref().unwrap_or(current.name);
        recon.payload.insert("name".to_string(), json!(name));
        if let Some(console) = recon.accepted.console.or(current.console) {
            recon.payload.insert("console".to_string(), json!(console));
        }
        if let Some(console_type) = recon
            .accepted
            .console_type
            .as_deref()
            .or(current.console_type)
        {
            recon
                .payload
                .insert("console_type".to_string(), json!(console_type));
        }
    }

    recon
}

fn diff_geometry(current: &NodeSnapshot<'_>, patch: &NodePatch, local: &mut LocalChanges) {
    if let Some(x) = patch.x {
        if x != current.x {
            local.x = Some(x);
        }
    }
    if let Some(y) = patch.y {
        if y != current.y {
            local.y = Some(y);
        }
    }
    if let Some(z) = patch.z {
        if z != current.z {
            local.z = Some(z);
        }
    }
    if let Some(width) = patch.width {
        if width != current.width {
            local.width = Some(width);
        }
    }
    if let Some(height) = patch.height {
        if height != current.height {
            local.height = Some(height);
        }
    }
    if let Some(symbol) = &patch.symbol {
        if symbol != current.symbol {
            local.symbol = Some(symbol.clone());
        }
    }
}
