//! Keyed, named resources and the ordered collection that owns them.

mod collection;
mod core;

pub use collection::{RenameEvent, ResourceCollection, ResourceEvent};
pub use core::{Item, Lookup, RenameToken, Resource, ResourceKey};
