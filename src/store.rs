//! Canvas document store: local editing commands.
//!
//! DESIGN
//! ======
//! Each command mutates the owned `CanvasDocument` immediately and returns
//! the `ObjectMutation`s describing what changed. The session commits the
//! result to history and hands the mutations to the sync channel, so the
//! local document always reflects an edit before its broadcast is sent.
//! An empty mutation list means nothing changed: no commit, no broadcast.
//!
//! Selection changes return nothing; they are never committed or shared.

use std::collections::HashMap;

use tracing::warn;

use crate::doc::{CanvasDocument, CanvasObject, ObjectId, ObjectPatch, ValidationError, new_object_id};
use crate::sync::ObjectMutation;

/// Deep copies taken by the last `copy`, plus how many times they were pasted.
#[derive(Debug, Clone, Default)]
struct Clipboard {
    objects: Vec<CanvasObject>,
    pastes: u32,
}

/// Owner of the live document and the local clipboard.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    doc: CanvasDocument,
    clipboard: Clipboard,
    paste_offset: f64,
}

impl DocumentStore {
    #[must_use]
    pub fn new(doc: CanvasDocument, paste_offset: f64) -> Self {
        Self { doc, clipboard: Clipboard::default(), paste_offset }
    }

    #[must_use]
    pub fn document(&self) -> &CanvasDocument {
        &self.doc
    }

    pub(crate) fn document_mut(&mut self) -> &mut CanvasDocument {
        &mut self.doc
    }

    #[must_use]
    pub fn into_document(self) -> CanvasDocument {
        self.doc
    }

    /// Add an object on top of the paint order.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateObject` or a field-level failure; nothing changes.
    pub fn add_object(&mut self, obj: CanvasObject) -> Result<Vec<ObjectMutation>, ValidationError> {
        let inserted = self.doc.insert(obj)?.clone();
        Ok(vec![ObjectMutation::Created(inserted)])
    }

    /// Apply a sparse update to one object.
    ///
    /// # Errors
    ///
    /// Returns `UnknownObject` or the first invalid field; nothing changes.
    pub fn update_object(&mut self, id: &str, changes: ObjectPatch) -> Result<Vec<ObjectMutation>, ValidationError> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        self.doc.apply_patch(id, &changes)?;
        Ok(vec![ObjectMutation::Updated { object_id: id.to_owned(), changes }])
    }

    /// Remove every listed object that exists. Unknown ids are skipped.
    pub fn remove_objects<I, S>(&mut self, ids: I) -> Vec<ObjectMutation>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .filter_map(|id| self.doc.remove(id.as_ref()))
            .map(|obj| ObjectMutation::Removed { object_id: obj.id })
            .collect()
    }

    /// Move an object to a new paint index (clamped).
    ///
    /// # Errors
    ///
    /// Returns `UnknownObject` when `id` is not present.
    pub fn reorder(&mut self, id: &str, to_index: usize) -> Result<Vec<ObjectMutation>, ValidationError> {
        let before = self.doc.position(id);
        let index = self.doc.move_to(id, to_index)?;
        if before == Some(index) {
            return Ok(Vec::new());
        }
        let z_order = self.doc.get(id).map(|o| o.z_order);
        let changes = ObjectPatch { z_order, ..ObjectPatch::default() };
        Ok(vec![ObjectMutation::Updated { object_id: id.to_owned(), changes }])
    }

    /// Replace the local selection. Never committed, never broadcast.
    pub fn set_selection<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<ObjectId>,
    {
        self.doc.set_selection(ids);
    }

    /// Deep-copy the selection into the clipboard. Returns how many were copied.
    pub fn copy_selection(&mut self) -> usize {
        let objects: Vec<CanvasObject> = self.doc.selected_objects().into_iter().cloned().collect();
        if objects.is_empty() {
            return 0;
        }
        let count = objects.len();
        self.clipboard = Clipboard { objects, pastes: 0 };
        count
    }

    /// Number of objects currently on the clipboard.
    #[must_use]
    pub fn clipboard_len(&self) -> usize {
        self.clipboard.objects.len()
    }

    /// Insert fresh clones of the clipboard, each paste offset one step
    /// further than the last, and select them.
    pub fn paste(&mut self) -> Vec<ObjectMutation> {
        if self.clipboard.objects.is_empty() {
            return Vec::new();
        }
        self.clipboard.pastes += 1;
        let delta = self.paste_offset * f64::from(self.clipboard.pastes);

        let mut mutations = Vec::with_capacity(self.clipboard.objects.len());
        let mut pasted_ids = Vec::with_capacity(self.clipboard.objects.len());
        for source in &self.clipboard.objects {
            let mut clone = source.clone();
            clone.id = new_object_id();
            clone.x += delta;
            clone.y += delta;
            match self.doc.insert(clone) {
                Ok(inserted) => {
                    pasted_ids.push(inserted.id.clone());
                    mutations.push(ObjectMutation::Created(inserted.clone()));
                }
                Err(e) => warn!(source = %source.id, error = %e, "store: pasted clone rejected"),
            }
        }
        self.doc.set_selection(pasted_ids);
        mutations
    }

    /// Remove the selected objects and clear the selection.
    pub fn delete_selection(&mut self) -> Vec<ObjectMutation> {
        let ids: Vec<ObjectId> = self.doc.selection().iter().cloned().collect();
        let mutations = self.remove_objects(&ids);
        self.doc.set_selection(Vec::<ObjectId>::new());
        mutations
    }

    /// Adopt a whole document (undo/redo) and describe the difference.
    ///
    /// Removals come first, then objects in ascending paint order. Unseen
    /// objects go out as `Created`. An object whose fields changed is also
    /// sent as `Created`, which peers apply as a wholesale replace, so
    /// attributes the snapshot lacks are cleared. Anything that changed or
    /// moved then gets a `z_order` patch. A peer applying them in order ends
    /// with the same objects and order.
    pub fn adopt(&mut self, next: CanvasDocument) -> Vec<ObjectMutation> {
        let previous: HashMap<&str, &CanvasObject> =
            self.doc.objects().iter().map(|o| (o.id.as_str(), o)).collect();

        let mut mutations: Vec<ObjectMutation> = self
            .doc
            .objects()
            .iter()
            .filter(|o| !next.contains(&o.id))
            .map(|o| ObjectMutation::Removed { object_id: o.id.clone() })
            .collect();

        for obj in next.objects() {
            let Some(old) = previous.get(obj.id.as_str()) else {
                mutations.push(ObjectMutation::Created(obj.clone()));
                continue;
            };
            if *old == obj {
                continue;
            }
            if !same_fields(old, obj) {
                mutations.push(ObjectMutation::Created(obj.clone()));
            }
            let changes = ObjectPatch { z_order: Some(obj.z_order), ..ObjectPatch::default() };
            mutations.push(ObjectMutation::Updated { object_id: obj.id.clone(), changes });
        }

        self.doc = next;
        mutations
    }
}

/// Equal apart from paint position.
fn same_fields(a: &CanvasObject, b: &CanvasObject) -> bool {
    CanvasObject { z_order: b.z_order, ..a.clone() } == *b
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
