//! Resource pool indexing for editor models.
//!
//! Pools own collections of named, uniquely keyed items. A [`PoolManager`]
//! owns pools and keeps an item key -> pool index consistent as pools and
//! items change through any mutation path. A [`MetaPoolManager`] composes
//! several managers ("libraries") into one view with a default library for
//! unqualified lookups.
//!
//! Everything is single-threaded and synchronous: index maintenance runs
//! inside the call that changed the model, ahead of user handlers.

pub mod audit;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod resource;

pub use audit::{
    BufferedIndexAudit, IndexAudit, IndexAuditEvent, IndexAuditEventBuilder, IndexAuditStage,
    NullIndexAudit,
};
pub use error::{PoolError, Result};
pub use events::{EventHub, GuardHub, INDEX_PRIORITY, Subscription, SubscriptionTable};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink,
};
pub use metrics::{IndexMetrics, MetricSnapshot};
pub use pool::Pool;
pub use registry::{
    LibraryId, LibraryPoolEvent, ManagerConfig, MergedPools, MetaPoolManager, PoolEvent,
    PoolIndex, PoolManager,
};
pub use resource::{
    Item, Lookup, RenameEvent, RenameToken, Resource, ResourceCollection, ResourceEvent,
    ResourceKey,
};
