//! Audit trail for admin actions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use spike_types::ErrorCode;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Init,
    Recover,
    RotateRootKey,
    ChangePassword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub trail_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl AuditEntry {
    pub fn success(action: AuditAction) -> Self {
        Self::new(action, AuditOutcome::Success, None)
    }

    pub fn failure(action: AuditAction, code: ErrorCode) -> Self {
        Self::new(action, AuditOutcome::Failure, Some(code))
    }

    /// Build an entry from the result of an action.
    pub fn from_result<T>(action: AuditAction, result: &Result<T, ErrorCode>) -> Self {
        match result {
            Ok(_) => Self::success(action),
            Err(code) => Self::failure(action, *code),
        }
    }

    fn new(action: AuditAction, outcome: AuditOutcome, error_code: Option<ErrorCode>) -> Self {
        Self {
            trail_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            outcome,
            error_code,
        }
    }
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Writes audit entries as structured tracing events on `spike::audit`.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        info!(
            target: "spike::audit",
            trail_id = %entry.trail_id,
            timestamp = %entry.timestamp.to_rfc3339(),
            action = ?entry.action,
            outcome = ?entry.outcome,
            error_code = entry.error_code.map(|c| c.as_str()),
            "audit"
        );
    }
}

/// Keeps entries in memory. Used by tests to assert on the trail.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(entry);
        }
    }
}
