//! Versioned, copy-on-write data model.
//!
//! - [`SharedRef`]: reference-counted handle with explicit `make_mut`
//! - [`DataObject`]: typed payload node with sub-objects and a revision counter
//! - [`DataCollection`]: ordered top-level objects addressed by class and path
//!
//! A data object may be referenced by many collections (and therefore by many
//! cached pipeline states) at once. It is only ever mutated through a handle
//! that has been made exclusive first.

pub mod collection;
pub mod object;
pub mod payload;
pub mod shared;

pub use collection::{CollectionEdit, DataCollection, ObjectPath, SOURCE_FRAME_ATTRIBUTE};
pub use object::{DataObject, DataObjectRef};
pub use payload::{AttributeValue, DataPayload, DataTable, EmptyPayload, PropertyArray};
pub use shared::SharedRef;
