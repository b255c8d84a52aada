//! Audit trail for bulk operations

use log::{info, warn};
use std::sync::Mutex;

use crate::models::AuditRecord;

/// Destination for per-target bulk audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Writes each record as one JSON log line
#[derive(Debug, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, record: &AuditRecord) {
        match serde_json::to_string(record) {
            Ok(line) => info!("[AUDIT] {}", line),
            Err(e) => warn!("[AUDIT] Failed to serialize record for {}: {}", record.email_id, e),
        }
    }
}

/// Keeps records in memory for inspection
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
    }
}
