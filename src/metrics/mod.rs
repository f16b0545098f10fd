use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;

/// Counters describing how much work a manager's index has absorbed.
#[derive(Debug, Default, Clone)]
pub struct IndexMetrics {
    pools_added: u64,
    pools_removed: u64,
    items_indexed: u64,
    items_unindexed: u64,
    resets: u64,
    rejected: u64,
    log_failures: u64,
}

impl IndexMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pool_added(&mut self, items: usize) {
        self.pools_added = self.pools_added.saturating_add(1);
        self.record_items_indexed(items);
    }

    pub fn record_pool_removed(&mut self, items: usize) {
        self.pools_removed = self.pools_removed.saturating_add(1);
        self.record_items_unindexed(items);
    }

    pub fn record_items_indexed(&mut self, count: usize) {
        if count > 0 {
            self.items_indexed = self.items_indexed.saturating_add(count as u64);
        }
    }

    pub fn record_items_unindexed(&mut self, count: usize) {
        if count > 0 {
            self.items_unindexed = self.items_unindexed.saturating_add(count as u64);
        }
    }

    pub fn record_reset(&mut self) {
        self.resets = self.resets.saturating_add(1);
    }

    pub fn record_rejection(&mut self) {
        self.rejected = self.rejected.saturating_add(1);
    }

    /// A log sink refused a record. Index mutations never fail on logging.
    pub fn record_log_failure(&mut self) {
        self.log_failures = self.log_failures.saturating_add(1);
    }

    pub fn snapshot(&self, pools: usize, indexed: usize) -> MetricSnapshot {
        MetricSnapshot {
            pools,
            indexed,
            pools_added: self.pools_added,
            pools_removed: self.pools_removed,
            items_indexed: self.items_indexed,
            items_unindexed: self.items_unindexed,
            resets: self.resets,
            rejected: self.rejected,
            log_failures: self.log_failures,
        }
    }
}

/// Point-in-time view of [`IndexMetrics`] plus the live sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub pools: usize,
    pub indexed: usize,
    pub pools_added: u64,
    pub pools_removed: u64,
    pub items_indexed: u64,
    pub items_unindexed: u64,
    pub resets: u64,
    pub rejected: u64,
    pub log_failures: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "index_metrics", self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("pools".to_string(), json!(self.pools));
        map.insert("indexed".to_string(), json!(self.indexed));
        map.insert("pools_added".to_string(), json!(self.pools_added));
        map.insert("pools_removed".to_string(), json!(self.pools_removed));
        map.insert("items_indexed".to_string(), json!(self.items_indexed));
        map.insert("items_unindexed".to_string(), json!(self.items_unindexed));
        map.insert("resets".to_string(), json!(self.resets));
        map.insert("rejected".to_string(), json!(self.rejected));
        map.insert("log_failures".to_string(), json!(self.log_failures));
        map
    }
}
