//! Audit trail adapter emitting structured tracing events.

use async_trait::async_trait;
use tracing::info;

use mailroom_dispatch::{AuditEvent, AuditLog};

/// Audit log that writes each event as a structured log line under the
/// `audit` target. Recording never fails; a serialization problem is logged
/// and dropped rather than affecting dispatch outcomes.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditLog;

impl TracingAuditLog {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn record(&self, event: AuditEvent) {
        match serde_json::to_value(&event) {
            Ok(payload) => info!(target: "audit", %payload, "audit event"),
            Err(err) => info!(target: "audit", error = %err, ?event, "unserializable audit event"),
        }
    }
}
