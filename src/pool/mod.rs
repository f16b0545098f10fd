//! Pools: resources that own a sub-collection of items.

mod core;

pub use core::Pool;
