//! Document model: canvas objects, sparse patches, and the ordered document.
//!
//! This module defines what is on the canvas (`CanvasObject`, `ObjectKind`,
//! `Style`), a sparse-update type for incremental edits (`ObjectPatch`), and
//! the ordered container that owns all live objects plus the local selection
//! (`CanvasDocument`).
//!
//! Vector order is paint order. `z_order` mirrors the index and is renumbered
//! after every structural change, so a peer receiving a `z_order` can place
//! the object at the same index.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a canvas object within one document.
pub type ObjectId = String;

/// Generate a fresh object id.
#[must_use]
pub fn new_object_id() -> ObjectId {
    Uuid::new_v4().to_string()
}

// =============================================================================
// ERRORS
// =============================================================================

/// A command or inbound mutation that cannot be applied as requested.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown object: {0}")]
    UnknownObject(ObjectId),
    #[error("duplicate object id: {0}")]
    DuplicateObject(ObjectId),
    #[error("object id must not be empty")]
    EmptyId,
    #[error("field `{0}` must be a finite number")]
    NonFinite(&'static str),
    #[error("field `{0}` must not be negative")]
    Negative(&'static str),
    #[error("opacity {0} outside 0..=1")]
    Opacity(f64),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("malformed `{field}`: {reason}")]
    Malformed { field: &'static str, reason: String },
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
}

// =============================================================================
// OBJECT
// =============================================================================

/// The kind of a canvas object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Axis-aligned rectangle.
    Rectangle,
    /// Ellipse inscribed within the bounding box.
    Ellipse,
    /// Diamond with vertices at bounding-box edge midpoints.
    Diamond,
    /// Five-point star inscribed within the bounding box.
    Star,
    /// Straight line across the bounding box diagonal.
    Line,
    /// Line with an arrowhead at its end.
    Arrow,
    /// Text block.
    Text,
}

/// Visual style of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    /// Fill color as `#rrggbb`.
    pub fill: String,
    /// Stroke color as `#rrggbb`.
    pub stroke: String,
    /// Stroke width in world units.
    pub stroke_width: f64,
    /// Opacity in `0.0..=1.0`.
    pub opacity: f64,
    /// Text content, for kinds that carry text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Font family for text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    /// Font size in world units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fill: "#d94b4b".to_owned(),
            stroke: "#1f1a17".to_owned(),
            stroke_width: 1.0,
            opacity: 1.0,
            text: None,
            font_family: None,
            font_size: None,
        }
    }
}

/// One visual element with identity, geometry, and style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasObject {
    /// Unique identifier within the document.
    pub id: ObjectId,
    /// Shape type.
    pub kind: ObjectKind,
    /// Left edge of the bounding box in world coordinates.
    pub x: f64,
    /// Top edge of the bounding box in world coordinates.
    pub y: f64,
    /// Horizontal scale factor.
    pub scale_x: f64,
    /// Vertical scale factor.
    pub scale_y: f64,
    /// Clockwise rotation in degrees around the bounding-box center.
    pub rotation: f64,
    /// Unscaled width in world units.
    pub width: f64,
    /// Unscaled height in world units.
    pub height: f64,
    /// Fill, stroke, opacity and text attributes.
    #[serde(default)]
    pub style: Style,
    /// Paint order; mirrors the index in the owning document.
    #[serde(default)]
    pub z_order: i64,
}

impl CanvasObject {
    /// Create an object at `(x, y)` with unit scale, no rotation and default style.
    pub fn new(id: impl Into<ObjectId>, kind: ObjectKind, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            x,
            y,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            width,
            height,
            style: Style::default(),
            z_order: 0,
        }
    }

    /// Builder-style style override.
    #[must_use]
    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Check that the object could be placed in a document.
    ///
    /// # Errors
    ///
    /// Returns the first field that is empty, non-finite, negative or out of range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        finite("x", self.x)?;
        finite("y", self.y)?;
        finite("scale_x", self.scale_x)?;
        finite("scale_y", self.scale_y)?;
        finite("rotation", self.rotation)?;
        non_negative("width", self.width)?;
        non_negative("height", self.height)?;
        non_negative("stroke_width", self.style.stroke_width)?;
        opacity(self.style.opacity)?;
        if let Some(size) = self.style.font_size {
            non_negative("font_size", size)?;
        }
        Ok(())
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() { Ok(()) } else { Err(ValidationError::NonFinite(field)) }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::Negative(field));
    }
    Ok(())
}

fn opacity(value: f64) -> Result<(), ValidationError> {
    finite("opacity", value)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::Opacity(value));
    }
    Ok(())
}

// =============================================================================
// PATCH
// =============================================================================

/// Sparse update for a canvas object. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    /// Target paint index. Applied as a reorder, not a raw field write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_order: Option<i64>,
}

impl ObjectPatch {
    /// Patch that moves an object to `(x, y)`.
    #[must_use]
    pub fn position(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    /// True when no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check every present field before anything is written.
    ///
    /// # Errors
    ///
    /// Returns the first present field that is non-finite, negative or out of range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let finite_fields = [
            ("x", self.x),
            ("y", self.y),
            ("scale_x", self.scale_x),
            ("scale_y", self.scale_y),
            ("rotation", self.rotation),
        ];
        for (field, value) in finite_fields {
            if let Some(v) = value {
                finite(field, v)?;
            }
        }
        let sized_fields = [
            ("width", self.width),
            ("height", self.height),
            ("stroke_width", self.stroke_width),
            ("font_size", self.font_size),
        ];
        for (field, value) in sized_fields {
            if let Some(v) = value {
                non_negative(field, v)?;
            }
        }
        if let Some(v) = self.opacity {
            opacity(v)?;
        }
        Ok(())
    }

    /// Write present fields into `obj`. `z_order` is left to the document.
    fn write_into(&self, obj: &mut CanvasObject) {
        if let Some(x) = self.x {
            obj.x = x;
        }
        if let Some(y) = self.y {
            obj.y = y;
        }
        if let Some(sx) = self.scale_x {
            obj.scale_x = sx;
        }
        if let Some(sy) = self.scale_y {
            obj.scale_y = sy;
        }
        if let Some(r) = self.rotation {
            obj.rotation = r;
        }
        if let Some(w) = self.width {
            obj.width = w;
        }
        if let Some(h) = self.height {
            obj.height = h;
        }
        if let Some(ref fill) = self.fill {
            obj.style.fill.clone_from(fill);
        }
        if let Some(ref stroke) = self.stroke {
            obj.style.stroke.clone_from(stroke);
        }
        if let Some(sw) = self.stroke_width {
            obj.style.stroke_width = sw;
        }
        if let Some(o) = self.opacity {
            obj.style.opacity = o;
        }
        if let Some(ref text) = self.text {
            obj.style.text = Some(text.clone());
        }
        if let Some(ref family) = self.font_family {
            obj.style.font_family = Some(family.clone());
        }
        if let Some(size) = self.font_size {
            obj.style.font_size = Some(size);
        }
    }
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// The full editable scene: ordered objects plus the local selection.
///
/// Object ids are unique at all times. Selection only ever names objects
/// that exist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasDocument {
    objects: Vec<CanvasObject>,
    selection: BTreeSet<ObjectId>,
}

impl CanvasDocument {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from objects in paint order.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateObject` when two objects share an id, or the first
    /// object-level validation failure.
    pub fn from_objects(objects: Vec<CanvasObject>) -> Result<Self, ValidationError> {
        {
            let mut seen = BTreeSet::new();
            for obj in &objects {
                obj.validate()?;
                if !seen.insert(obj.id.as_str()) {
                    return Err(ValidationError::DuplicateObject(obj.id.clone()));
                }
            }
        }
        let mut doc = Self { objects, selection: BTreeSet::new() };
        doc.renumber();
        Ok(doc)
    }

    /// Objects in paint order.
    #[must_use]
    pub fn objects(&self) -> &[CanvasObject] {
        &self.objects
    }

    /// Return a reference to an object by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CanvasObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// Returns `true` when an object with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Paint index of an object.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.objects.iter().position(|o| o.id == id)
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if the document contains no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Currently selected ids.
    #[must_use]
    pub fn selection(&self) -> &BTreeSet<ObjectId> {
        &self.selection
    }

    /// Replace the selection. Unknown ids are dropped.
    pub fn set_selection<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<ObjectId>,
    {
        let mut selection = BTreeSet::new();
        for id in ids {
            let id = id.into();
            if self.contains(&id) {
                selection.insert(id);
            }
        }
        self.selection = selection;
    }

    /// Selected objects in paint order.
    #[must_use]
    pub fn selected_objects(&self) -> Vec<&CanvasObject> {
        self.objects
            .iter()
            .filter(|o| self.selection.contains(&o.id))
            .collect()
    }

    /// Append a new object on top of the paint order.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateObject` if the id is taken, or a field-level failure.
    pub fn insert(&mut self, obj: CanvasObject) -> Result<&CanvasObject, ValidationError> {
        let index = self.objects.len();
        self.insert_at(obj, index)
    }

    fn insert_at(&mut self, mut obj: CanvasObject, index: usize) -> Result<&CanvasObject, ValidationError> {
        obj.validate()?;
        if self.contains(&obj.id) {
            return Err(ValidationError::DuplicateObject(obj.id));
        }
        let index = index.min(self.objects.len());
        obj.z_order = 0;
        self.objects.insert(index, obj);
        self.renumber();
        Ok(&self.objects[index])
    }

    /// Insert or wholesale-replace an object.
    ///
    /// A new object is placed at its `z_order` (clamped). An existing object
    /// keeps its paint index and takes every other field from `obj`.
    ///
    /// # Errors
    ///
    /// Returns a field-level validation failure; the document is untouched.
    pub fn upsert(&mut self, obj: CanvasObject) -> Result<(), ValidationError> {
        obj.validate()?;
        if let Some(index) = self.position(&obj.id) {
            let slot = &mut self.objects[index];
            *slot = obj;
            slot.z_order = index_to_z(index);
            return Ok(());
        }
        let index = z_to_index(obj.z_order, self.objects.len());
        self.insert_at(obj, index).map(|_| ())
    }

    /// Apply a sparse patch. A present `z_order` moves the object.
    ///
    /// # Errors
    ///
    /// Returns `UnknownObject` for a missing id or the first invalid field.
    /// Nothing is written unless the whole patch is valid.
    pub fn apply_patch(&mut self, id: &str, patch: &ObjectPatch) -> Result<(), ValidationError> {
        patch.validate()?;
        let Some(index) = self.position(id) else {
            return Err(ValidationError::UnknownObject(id.to_owned()));
        };
        patch.write_into(&mut self.objects[index]);
        if let Some(z) = patch.z_order {
            let target = z_to_index(z, self.objects.len().saturating_sub(1));
            self.move_index(index, target);
        }
        Ok(())
    }

    /// Remove an object, dropping it from the selection too.
    pub fn remove(&mut self, id: &str) -> Option<CanvasObject> {
        let index = self.position(id)?;
        let obj = self.objects.remove(index);
        self.selection.remove(id);
        self.renumber();
        Some(obj)
    }

    /// Move an object to `to_index` (clamped). Returns the final index.
    ///
    /// # Errors
    ///
    /// Returns `UnknownObject` when `id` is not present.
    pub fn move_to(&mut self, id: &str, to_index: usize) -> Result<usize, ValidationError> {
        let Some(from) = self.position(id) else {
            return Err(ValidationError::UnknownObject(id.to_owned()));
        };
        let target = to_index.min(self.objects.len().saturating_sub(1));
        self.move_index(from, target);
        Ok(target)
    }

    fn move_index(&mut self, from: usize, to: usize) {
        if from != to {
            let obj = self.objects.remove(from);
            self.objects.insert(to, obj);
        }
        self.renumber();
    }

    fn renumber(&mut self) {
        for (index, obj) in self.objects.iter_mut().enumerate() {
            obj.z_order = index_to_z(index);
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
fn index_to_z(index: usize) -> i64 {
    index as i64
}

/// Clamp a wire `z_order` into `0..=max`.
fn z_to_index(z: i64, max: usize) -> usize {
    usize::try_from(z.max(0)).map_or(max, |i| i.min(max))
}

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;
