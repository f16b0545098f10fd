//! Synchronous event plumbing used by collections and managers.
//!
//! Handlers run to completion inside the call that emitted the event.
//! Dropping the [`Subscription`] returned at registration removes the
//! handler; [`SubscriptionTable`] groups subscriptions per owned child so a
//! parent can drop exactly one child's handlers when it leaves.

mod core;
mod table;

pub use core::{EventHub, GuardHub, Subscription};
pub use table::SubscriptionTable;

/// Priority used by handlers that keep derived indexes current. It sorts
/// ahead of the default priority so user handlers see a consistent index.
pub const INDEX_PRIORITY: i32 = -100;

/// Priority assigned by the plain `subscribe` calls.
pub const DEFAULT_PRIORITY: i32 = 0;
