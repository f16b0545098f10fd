//! Pool managers and the library layer above them.
//!
//! A [`PoolManager`] owns pools and keeps an item key -> pool index current.
//! A [`MetaPoolManager`] composes several managers, one per library, and
//! resolves unqualified lookups against a default library.

mod config;
mod manager;
mod meta;

pub use config::ManagerConfig;
pub use manager::{PoolEvent, PoolManager};
pub use meta::{LibraryId, LibraryPoolEvent, MergedPools, MetaPoolManager};

use crate::pool::Pool;
use crate::resource::{Resource, ResourceKey};

/// Query and reset surface shared by both manager tiers.
pub trait PoolIndex<I: Resource> {
    /// The pool that owns `key`. Absence is a normal outcome.
    fn pool_from_item_key(&self, key: &ResourceKey) -> Option<Pool<I>>;

    fn contains(&self, key: &ResourceKey) -> bool;

    fn keys(&self) -> Vec<ResourceKey>;

    /// Clears derived state without destroying the manager.
    fn reset(&self);
}
