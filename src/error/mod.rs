//! Error surface shared by every registry component.

mod types;

pub use types::{PoolError, Result};
