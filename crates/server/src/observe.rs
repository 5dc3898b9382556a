use serde_json::json;
use tracing::info;

use crewflow_core::audit::{AuditEvent, AuditSink};
use crewflow_core::notify::{Notifier, WorkflowEvent};

/// Notification dispatch backed by the structured log stream. Downstream
/// delivery (mail, chat) tails these events; the engine itself never
/// talks to a delivery channel.
#[derive(Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: WorkflowEvent) {
        let payload = serde_json::to_value(&event).unwrap_or_else(|_| json!({}));
        info!(
            event_name = "notification.dispatched",
            kind = event.kind(),
            payload = %payload,
            "workflow notification"
        );
    }
}

/// Audit trail emitted as structured log events, one line per record.
#[derive(Clone, Copy, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_value(&event.metadata).unwrap_or_else(|_| json!({}));
        info!(
            event_name = "audit.recorded",
            audit_event_id = %event.event_id,
            correlation_id = %event.correlation_id,
            event_type = %event.event_type,
            category = ?event.category,
            actor = %event.actor,
            outcome = ?event.outcome,
            request_id = event.request_id.as_ref().map(|id| id.0.as_str()).unwrap_or("-"),
            metadata = %metadata,
            "audit event"
        );
    }
}
