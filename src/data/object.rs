//! Typed, named payload node of the data hierarchy.

use super::payload::DataPayload;
use super::shared::SharedRef;
use crate::id::{ClassId, NodeId};
use crate::registry::TypeRegistry;

/// Shared handle to a data object.
pub type DataObjectRef = SharedRef<DataObject>;

/// A node of the data hierarchy.
///
/// Data objects are shared between collections through [`DataObjectRef`]
/// handles. Cloning a data object copies its payload and shares its
/// sub-objects; sub-objects are only copied when they are themselves made
/// mutable.
#[derive(Debug, Clone)]
pub struct DataObject {
    class: ClassId,
    identifier: String,
    data_source: Option<NodeId>,
    revision: u64,
    payload: Box<dyn DataPayload>,
    sub_objects: Vec<DataObjectRef>,
}

impl DataObject {
    pub fn new(class: ClassId, payload: impl DataPayload) -> Self {
        Self {
            class,
            identifier: String::new(),
            data_source: None,
            revision: 0,
            payload: Box::new(payload),
            sub_objects: Vec::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_source(mut self, source: NodeId) -> Self {
        self.data_source = Some(source);
        self
    }

    pub fn with_sub_object(mut self, child: DataObject) -> Self {
        self.sub_objects.push(SharedRef::new(child));
        self
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    /// True if this object's class is `class` or derives from it.
    pub fn is_member(&self, registry: &TypeRegistry, class: ClassId) -> bool {
        registry.is_derived_from(self.class, class)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier = identifier.into();
        self.touch();
    }

    /// Pipeline node that produced this object.
    pub fn data_source(&self) -> Option<NodeId> {
        self.data_source
    }

    pub fn set_data_source(&mut self, source: Option<NodeId>) {
        self.data_source = source;
    }

    /// Incremented on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    // ── Payload ─────────────────────────────────────────────────────────

    pub fn payload<T: DataPayload>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref::<T>()
    }

    /// Mutable payload access. Bumps the revision.
    pub fn payload_mut<T: DataPayload>(&mut self) -> Option<&mut T> {
        if self.payload.as_any().is::<T>() {
            self.touch();
        }
        self.payload.as_any_mut().downcast_mut::<T>()
    }

    pub fn set_payload(&mut self, payload: impl DataPayload) {
        self.payload = Box::new(payload);
        self.touch();
    }

    // ── Sub-objects ─────────────────────────────────────────────────────

    pub fn sub_objects(&self) -> &[DataObjectRef] {
        &self.sub_objects
    }

    /// First direct child with the given identifier.
    pub fn sub_object(&self, identifier: &str) -> Option<&DataObject> {
        self.sub_objects
            .iter()
            .find(|c| c.identifier() == identifier)
            .map(|c| &**c)
    }

    pub fn sub_object_index(&self, identifier: &str) -> Option<usize> {
        self.sub_objects
            .iter()
            .position(|c| c.identifier() == identifier)
    }

    pub fn add_sub_object(&mut self, child: impl Into<DataObjectRef>) {
        self.sub_objects.push(child.into());
        self.touch();
    }

    /// Replace the child at `index`; `None` removes it. Returns false if out of range.
    pub fn replace_sub_object(&mut self, index: usize, child: Option<DataObjectRef>) -> bool {
        if index >= self.sub_objects.len() {
            return false;
        }
        match child {
            Some(child) => self.sub_objects[index] = child,
            None => {
                self.sub_objects.remove(index);
            }
        }
        self.touch();
        true
    }

    /// Mutable access to a child, copying it first if it is shared.
    pub fn make_mutable_sub_object(&mut self, index: usize) -> Option<&mut DataObject> {
        if index >= self.sub_objects.len() {
            return None;
        }
        self.touch();
        Some(self.sub_objects[index].make_mut())
    }

    /// Make this object's whole sub-tree exclusively owned.
    pub fn make_all_mutable_recursive(&mut self) {
        for child in &mut self.sub_objects {
            child.make_mut().make_all_mutable_recursive();
        }
    }

    /// Visit this object and all descendants depth-first.
    pub fn visit<'a>(&'a self, visitor: &mut impl FnMut(&'a DataObject)) {
        visitor(self);
        for child in &self.sub_objects {
            child.visit(visitor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{EmptyPayload, PropertyArray};

    fn container() -> DataObject {
        DataObject::new(ClassId(1), EmptyPayload)
            .with_identifier("particles")
            .with_sub_object(
                DataObject::new(ClassId(2), PropertyArray::scalar(vec![1.0, 2.0]))
                    .with_identifier("Mass"),
            )
    }

    #[test]
    fn test_payload_downcast() {
        let mut obj = DataObject::new(ClassId(2), PropertyArray::scalar(vec![1.0]));
        assert!(obj.payload::<PropertyArray>().is_some());
        assert!(obj.payload::<EmptyPayload>().is_none());

        let rev = obj.revision();
        obj.payload_mut::<PropertyArray>().unwrap().values_mut()[0] = 5.0;
        assert_eq!(obj.revision(), rev + 1);
        assert!(obj.payload_mut::<EmptyPayload>().is_none());
        assert_eq!(obj.revision(), rev + 1);
    }

    #[test]
    fn test_clone_shares_children_until_mutated() {
        let original = container();
        let mut copy = original.clone();
        assert!(SharedRef::ptr_eq(
            &original.sub_objects()[0],
            &copy.sub_objects()[0]
        ));

        let mass = copy.make_mutable_sub_object(0).unwrap();
        mass.payload_mut::<PropertyArray>().unwrap().values_mut()[0] = 9.0;

        let orig_mass = original.sub_object("Mass").unwrap();
        assert_eq!(orig_mass.payload::<PropertyArray>().unwrap().values()[0], 1.0);
        let new_mass = copy.sub_object("Mass").unwrap();
        assert_eq!(new_mass.payload::<PropertyArray>().unwrap().values()[0], 9.0);
    }

    #[test]
    fn test_replace_sub_object_none_removes() {
        let mut obj = container();
        assert!(obj.replace_sub_object(0, None));
        assert!(obj.sub_objects().is_empty());
        assert!(!obj.replace_sub_object(3, None));
    }

    #[test]
    fn test_visit_depth_first() {
        let obj = container();
        let mut names = Vec::new();
        obj.visit(&mut |o| names.push(o.identifier().to_string()));
        assert_eq!(names, vec!["particles", "Mass"]);
    }
}
