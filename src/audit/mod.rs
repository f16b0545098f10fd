//! Audit hooks for registry state transitions.
//!
//! Records capture a stage identifier plus structured details so callers can
//! log, buffer, or replay how a manager's index evolved without touching the
//! index code itself.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde_json::Value;

/// Distinct checkpoints emitted by pool managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAuditStage {
    /// A pool joined a manager and its items were indexed.
    PoolAdded,
    /// A pool left a manager and its index entries were dropped.
    PoolRemoved,
    /// A managed pool was renamed or modified.
    PoolModified,
    /// A mutation was refused before any state changed.
    MutationRejected,
    /// A manager dropped all pools and index entries in one step.
    IndexReset,
    /// A library manager was registered with a meta manager.
    LibraryRegistered,
    /// A library manager was unregistered.
    LibraryUnregistered,
    /// The default library changed (set explicitly or implicitly).
    DefaultLibraryChanged,
    /// The default library was cleared because it was unregistered.
    DefaultLibraryCleared,
}

/// Structured audit entry.
#[derive(Debug, Clone)]
pub struct IndexAuditEvent {
    pub timestamp: SystemTime,
    pub stage: IndexAuditStage,
    pub details: Vec<(String, Value)>,
}

impl IndexAuditEvent {
    fn new(stage: IndexAuditStage) -> Self {
        Self {
            timestamp: SystemTime::now(),
            stage,
            details: Vec::new(),
        }
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }
}

/// Builder helper to append fields ergonomically.
pub struct IndexAuditEventBuilder {
    event: IndexAuditEvent,
}

impl IndexAuditEventBuilder {
    pub fn new(stage: IndexAuditStage) -> Self {
        Self {
            event: IndexAuditEvent::new(stage),
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event.details.push((key.into(), value.into()));
        self
    }

    pub fn finish(self) -> IndexAuditEvent {
        self.event
    }
}

/// Trait implemented by any audit sink.
pub trait IndexAudit: Send + Sync {
    fn record(&self, event: IndexAuditEvent);
}

/// Default no-op implementation used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullIndexAudit;

impl IndexAudit for NullIndexAudit {
    fn record(&self, _event: IndexAuditEvent) {}
}

/// Buffers audit records. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct BufferedIndexAudit {
    events: Arc<Mutex<Vec<IndexAuditEvent>>>,
}

impl BufferedIndexAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<IndexAuditEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn stages(&self) -> Vec<IndexAuditStage> {
        self.events().into_iter().map(|event| event.stage).collect()
    }
}

impl IndexAudit for BufferedIndexAudit {
    fn record(&self, event: IndexAuditEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_collects_details() {
        let event = IndexAuditEventBuilder::new(IndexAuditStage::PoolAdded)
            .detail("pool", "terrain")
            .detail("items", 2)
            .finish();
        assert_eq!(event.stage, IndexAuditStage::PoolAdded);
        assert_eq!(event.detail("items"), Some(&json!(2)));
        assert_eq!(event.detail("missing"), None);
    }

    #[test]
    fn buffered_audit_keeps_order() {
        let audit = BufferedIndexAudit::new();
        let sink: Arc<dyn IndexAudit> = Arc::new(audit.clone());
        sink.record(IndexAuditEventBuilder::new(IndexAuditStage::LibraryRegistered).finish());
        sink.record(IndexAuditEventBuilder::new(IndexAuditStage::DefaultLibraryChanged).finish());
        assert_eq!(
            audit.stages(),
            vec![
                IndexAuditStage::LibraryRegistered,
                IndexAuditStage::DefaultLibraryChanged
            ]
        );
    }
}
