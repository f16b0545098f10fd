use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::audit::{IndexAudit, IndexAuditEvent};
use crate::logging::{LogLevel, Logger, MANAGER_TARGET, event_with_fields};
use crate::metrics::IndexMetrics;

/// Observability knobs shared by [`PoolManager`](super::PoolManager) and
/// [`MetaPoolManager`](super::MetaPoolManager).
#[derive(Clone)]
pub struct ManagerConfig {
    /// Optional structured logger.
    pub logger: Option<Logger>,
    /// Counters updated as the index changes. `None` disables collection.
    pub metrics: Option<Arc<Mutex<IndexMetrics>>>,
    /// Optional audit sink receiving state transition records.
    pub audit: Option<Arc<dyn IndexAudit>>,
    /// Target field stamped on every log record.
    pub log_target: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            logger: None,
            metrics: None,
            audit: None,
            log_target: MANAGER_TARGET.to_string(),
        }
    }
}

impl ManagerConfig {
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_audit<A>(mut self, audit: A) -> Self
    where
        A: IndexAudit + 'static,
    {
        self.audit = Some(Arc::new(audit));
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.log_target = target.into();
        self
    }

    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(IndexMetrics::new())));
        }
    }

    /// Disable metrics collection.
    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    /// Access the shared metrics handle if metrics are enabled.
    pub fn metrics_handle(&self) -> Option<Arc<Mutex<IndexMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }

    pub(crate) fn log<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(logger) = self.logger.as_ref() {
            if !logger.enabled(level) {
                return;
            }
            let event = event_with_fields(level, &self.log_target, message, fields);
            // Sink errors are counted, never surfaced to the mutation.
            if logger.log_event(event).is_err() {
                self.update_metrics(|metrics| metrics.record_log_failure());
            }
        }
    }

    pub(crate) fn record(&self, event: IndexAuditEvent) {
        if let Some(audit) = self.audit.as_ref() {
            audit.record(event);
        }
    }

    pub(crate) fn update_metrics(&self, update: impl FnOnce(&mut IndexMetrics)) {
        if let Some(metrics) = self.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                update(&mut guard);
            }
        }
    }
}
