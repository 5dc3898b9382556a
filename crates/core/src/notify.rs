use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::domain::delegation::DelegationId;
use crate::domain::request::{DecisionAction, RequestId, RequestType};
use crate::domain::settings::NotificationSettings;

/// Events the engine hands to the external notifier. The engine decides
/// *that* a notification is due; delivery channels are someone else's job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowEvent {
    RequestSubmitted {
        request_id: RequestId,
        requester_id: String,
        request_type: RequestType,
        approver_id: Option<String>,
    },
    RequestAutoApproved {
        request_id: RequestId,
        requester_id: String,
        request_type: RequestType,
    },
    RequestDecided {
        request_id: RequestId,
        actor_id: String,
        action: DecisionAction,
    },
    RequestEscalated {
        request_id: RequestId,
        escalation_level: u32,
        approver_id: Option<String>,
    },
    RequestExpired {
        request_id: RequestId,
    },
    DelegationRequested {
        delegation_id: DelegationId,
        delegator_id: String,
        delegate_id: String,
        approver_id: Option<String>,
    },
    DelegationActivated {
        delegation_id: DelegationId,
        delegator_id: String,
        delegate_id: String,
    },
    DelegationRejected {
        delegation_id: DelegationId,
    },
    DelegationRevoked {
        delegation_id: DelegationId,
    },
}

impl WorkflowEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestSubmitted { .. } => "request.submitted",
            Self::RequestAutoApproved { .. } => "request.auto_approved",
            Self::RequestDecided { .. } => "request.decided",
            Self::RequestEscalated { .. } => "request.escalated",
            Self::RequestExpired { .. } => "request.expired",
            Self::DelegationRequested { .. } => "delegation.requested",
            Self::DelegationActivated { .. } => "delegation.activated",
            Self::DelegationRejected { .. } => "delegation.rejected",
            Self::DelegationRevoked { .. } => "delegation.revoked",
        }
    }

    /// Whether the tenant's notification toggles allow this event out.
    pub fn enabled_by(&self, settings: &NotificationSettings) -> bool {
        match self {
            Self::RequestSubmitted { .. } | Self::RequestAutoApproved { .. } => {
                settings.on_submitted
            }
            Self::RequestDecided { .. } => settings.on_decided,
            Self::RequestEscalated { .. } | Self::RequestExpired { .. } => settings.on_escalated,
            Self::DelegationRequested { .. }
            | Self::DelegationActivated { .. }
            | Self::DelegationRejected { .. }
            | Self::DelegationRevoked { .. } => settings.on_delegation,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: WorkflowEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    events: Arc<Mutex<Vec<WorkflowEvent>>>,
}

impl InMemoryNotifier {
    pub fn events(&self) -> Vec<WorkflowEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, event: WorkflowEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
