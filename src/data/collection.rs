//! Ordered set of top-level data objects flowing through the pipeline.
//!
//! Objects are addressed by class plus a slash-separated identifier path.
//! Lookup rules, per hierarchy level:
//!
//! - empty path: the first object of the requested class; objects with an
//!   empty identifier are transparent and their children are searched too
//! - `"name"`: an object of the requested class whose identifier is `name`
//! - `"a/b"`: an object with identifier `a` (any class), then `"b"` below it

use super::object::{DataObject, DataObjectRef};
use super::payload::{AttributeValue, DataPayload};
use super::shared::SharedRef;
use crate::id::{ClassId, NodeId};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::registry::TypeRegistry;
use std::collections::{BTreeMap, HashSet};

/// Attribute recording which source frame a collection was loaded from.
pub const SOURCE_FRAME_ATTRIBUTE: &str = "SourceFrame";

/// Index path from the top-level list down to an object.
pub type ObjectPath = Vec<usize>;

#[derive(Debug, Clone, Default)]
pub struct DataCollection {
    objects: Vec<DataObjectRef>,
}

impl DataCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objects(&self) -> &[DataObjectRef] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// True if this exact object instance is a top-level member.
    pub fn contains(&self, obj: &DataObjectRef) -> bool {
        self.objects.iter().any(|o| SharedRef::ptr_eq(o, obj))
    }

    // ── Top-level list mutation ─────────────────────────────────────────

    pub fn add_object(&mut self, obj: impl Into<DataObjectRef>) {
        let obj = obj.into();
        debug_assert!(!self.contains(&obj), "object added twice");
        self.objects.push(obj);
    }

    /// Insert at `index`, clamped to the end of the list.
    pub fn insert_object(&mut self, index: usize, obj: impl Into<DataObjectRef>) {
        let index = index.min(self.objects.len());
        self.objects.insert(index, obj.into());
    }

    /// Replace `old` (by identity) with `new`; `None` removes it.
    ///
    /// Returns false if `old` is not a top-level member.
    pub fn replace_object(&mut self, old: &DataObjectRef, new: Option<DataObjectRef>) -> bool {
        match self.objects.iter().position(|o| SharedRef::ptr_eq(o, old)) {
            Some(index) => {
                match new {
                    Some(new) => self.objects[index] = new,
                    None => {
                        self.objects.remove(index);
                    }
                }
                true
            }
            None => false,
        }
    }

    pub fn remove_object(&mut self, obj: &DataObjectRef) -> bool {
        self.replace_object(obj, None)
    }

    pub fn remove_object_at(&mut self, index: usize) -> Option<DataObjectRef> {
        (index < self.objects.len()).then(|| self.objects.remove(index))
    }

    /// Apply a batch of removals and insertions as one step.
    ///
    /// Fails without touching the collection if the same identifier is both
    /// removed and inserted.
    pub fn apply_edit(&mut self, registry: &TypeRegistry, edit: CollectionEdit) -> PipelineResult<()> {
        let removed: HashSet<&str> = edit.removals.iter().map(|(_, id)| id.as_str()).collect();
        if let Some(clash) = edit
            .insertions
            .iter()
            .find(|o| removed.contains(o.identifier()))
        {
            return Err(PipelineError::ConflictingEdit(clash.identifier().to_string()));
        }

        for (class, identifier) in &edit.removals {
            self.objects
                .retain(|o| !(o.is_member(registry, *class) && o.identifier() == identifier));
        }
        for obj in edit.insertions {
            self.objects.push(SharedRef::new(obj));
        }
        Ok(())
    }

    // ── Path lookup ─────────────────────────────────────────────────────

    /// Index path to the object of `class` at `path`.
    pub fn find_path(&self, registry: &TypeRegistry, class: ClassId, path: &str) -> Option<ObjectPath> {
        self.objects.iter().enumerate().find_map(|(i, obj)| {
            find_path_below(registry, class, path, obj).map(|mut rest| {
                rest.insert(0, i);
                rest
            })
        })
    }

    pub fn get_object(&self, registry: &TypeRegistry, class: ClassId, path: &str) -> Option<&DataObject> {
        let indices = self.find_path(registry, class, path)?;
        self.object_at(&indices)
    }

    /// Like [`get_object`](Self::get_object) but fails with `MissingData`.
    pub fn expect_object(
        &self,
        registry: &TypeRegistry,
        class: ClassId,
        path: &str,
    ) -> PipelineResult<&DataObject> {
        self.get_object(registry, class, path)
            .ok_or_else(|| missing_data(registry, class, path))
    }

    /// Object at an index path.
    pub fn object_at(&self, indices: &[usize]) -> Option<&DataObject> {
        let (first, rest) = indices.split_first()?;
        let mut current: &DataObject = &**self.objects.get(*first)?;
        for &i in rest {
            current = &**current.sub_objects().get(i)?;
        }
        Some(current)
    }

    /// Resolve `path` and make the object and all its parents exclusively owned.
    pub fn get_mutable_object(
        &mut self,
        registry: &TypeRegistry,
        class: ClassId,
        path: &str,
    ) -> Option<&mut DataObject> {
        let indices = self.find_path(registry, class, path)?;
        self.make_mutable_path(&indices)
    }

    pub fn expect_mutable_object(
        &mut self,
        registry: &TypeRegistry,
        class: ClassId,
        path: &str,
    ) -> PipelineResult<&mut DataObject> {
        let indices = self
            .find_path(registry, class, path)
            .ok_or_else(|| missing_data(registry, class, path))?;
        self.make_mutable_path(&indices)
            .ok_or_else(|| missing_data(registry, class, path))
    }

    /// Make the top-level object at `index` safe to modify.
    ///
    /// Returns the object itself if this collection holds the only reference,
    /// otherwise replaces it in place with a private copy.
    pub fn make_mutable(&mut self, index: usize) -> Option<&mut DataObject> {
        self.objects.get_mut(index).map(SharedRef::make_mut)
    }

    /// Copy-on-write along an index path: every object on the way becomes exclusive.
    pub fn make_mutable_path(&mut self, indices: &[usize]) -> Option<&mut DataObject> {
        let (first, rest) = indices.split_first()?;
        let mut current = self.make_mutable(*first)?;
        for &i in rest {
            current = current.make_mutable_sub_object(i)?;
        }
        Some(current)
    }

    /// Make every object in the collection exclusively owned, recursively.
    pub fn make_all_mutable_recursive(&mut self) {
        for obj in &mut self.objects {
            obj.make_mut().make_all_mutable_recursive();
        }
    }

    /// Top-level object of `class` produced by `source` whose identifier is
    /// `identifier` or `identifier` plus a `.N` disambiguation suffix.
    pub fn get_object_by(
        &self,
        registry: &TypeRegistry,
        class: ClassId,
        source: NodeId,
        identifier: &str,
    ) -> Option<&DataObject> {
        let prefix = format!("{}.", identifier);
        self.objects
            .iter()
            .map(|o| &**o)
            .find(|o| {
                o.is_member(registry, class)
                    && o.data_source() == Some(source)
                    && (o.identifier() == identifier || o.identifier().starts_with(&prefix))
            })
    }

    /// True if any object in the hierarchy is of `class`.
    pub fn contains_object_recursive(&self, registry: &TypeRegistry, class: ClassId) -> bool {
        !self.get_objects_recursive(registry, class).is_empty()
    }

    /// Every object of `class` anywhere in the hierarchy, depth-first.
    pub fn get_objects_recursive(&self, registry: &TypeRegistry, class: ClassId) -> Vec<&DataObject> {
        let mut found = Vec::new();
        for obj in &self.objects {
            obj.visit(&mut |o| {
                if o.is_member(registry, class) {
                    found.push(o);
                }
            });
        }
        found
    }

    // ── Object creation ─────────────────────────────────────────────────

    /// Identifier based on `base` that no top-level object of `class` uses yet.
    pub fn generate_unique_identifier(&self, registry: &TypeRegistry, base: &str, class: ClassId) -> String {
        let taken = |id: &str| {
            self.objects
                .iter()
                .any(|o| o.is_member(registry, class) && o.identifier() == id)
        };

        if !taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|i| format!("{}.{}", base, i))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Append a new top-level object with a unique identifier derived from `base`.
    pub fn create_object(
        &mut self,
        registry: &TypeRegistry,
        class: ClassId,
        source: Option<NodeId>,
        base: &str,
        payload: impl DataPayload,
    ) -> &mut DataObject {
        let identifier = self.generate_unique_identifier(registry, base, class);
        let mut obj = DataObject::new(class, payload).with_identifier(identifier);
        obj.set_data_source(source);
        self.objects.push(SharedRef::new(obj));
        let last = self.objects.len() - 1;
        self.objects[last].make_mut()
    }

    // ── Global attributes ───────────────────────────────────────────────

    /// Add a global attribute object of class `attribute_class`.
    pub fn add_attribute(
        &mut self,
        registry: &TypeRegistry,
        attribute_class: ClassId,
        key: &str,
        value: impl Into<AttributeValue>,
        source: Option<NodeId>,
    ) -> &mut DataObject {
        self.create_object(registry, attribute_class, source, key, value.into())
    }

    /// Value of the first attribute whose identifier is `key`.
    pub fn get_attribute_value(&self, key: &str) -> Option<&AttributeValue> {
        self.objects
            .iter()
            .filter(|o| o.identifier() == key)
            .find_map(|o| o.payload::<AttributeValue>())
    }

    /// All attributes by key; repeated keys get `.2`, `.3`, ... suffixes.
    pub fn build_attributes_map(&self) -> BTreeMap<String, AttributeValue> {
        let mut map = BTreeMap::new();
        for obj in &self.objects {
            let Some(value) = obj.payload::<AttributeValue>() else {
                continue;
            };
            let key = if !map.contains_key(obj.identifier()) {
                obj.identifier().to_string()
            } else {
                (2..)
                    .map(|i| format!("{}.{}", obj.identifier(), i))
                    .find(|k| !map.contains_key(k))
                    .unwrap_or_default()
            };
            map.insert(key, value.clone());
        }
        map
    }

    /// Source frame this collection was loaded from, if recorded.
    pub fn source_frame(&self) -> Option<i64> {
        self.get_attribute_value(SOURCE_FRAME_ATTRIBUTE)
            .and_then(AttributeValue::as_int)
    }
}

/// Removals and insertions applied together by [`DataCollection::apply_edit`].
#[derive(Debug, Default)]
pub struct CollectionEdit {
    removals: Vec<(ClassId, String)>,
    insertions: Vec<DataObject>,
}

impl CollectionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every top-level object of `class` with this identifier.
    pub fn remove(mut self, class: ClassId, identifier: impl Into<String>) -> Self {
        self.removals.push((class, identifier.into()));
        self
    }

    pub fn insert(mut self, obj: DataObject) -> Self {
        self.insertions.push(obj);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.insertions.is_empty()
    }
}

fn missing_data(registry: &TypeRegistry, class: ClassId, path: &str) -> PipelineError {
    PipelineError::MissingData {
        class: registry.class_name(class).to_string(),
        path: path.to_string(),
    }
}

fn find_path_below(
    registry: &TypeRegistry,
    class: ClassId,
    path: &str,
    obj: &DataObject,
) -> Option<ObjectPath> {
    let search_children = |sub_path: &str| {
        obj.sub_objects().iter().enumerate().find_map(|(i, child)| {
            find_path_below(registry, class, sub_path, child).map(|mut rest| {
                rest.insert(0, i);
                rest
            })
        })
    };

    if path.is_empty() {
        if obj.is_member(registry, class) {
            return Some(Vec::new());
        }
        if !obj.identifier().is_empty() {
            return None;
        }
        return search_children("");
    }

    match path.split_once('/') {
        None => (obj.is_member(registry, class) && obj.identifier() == path).then(Vec::new),
        Some((head, tail)) if obj.identifier() == head => search_children(tail),
        Some(_) => None,
    }
}
