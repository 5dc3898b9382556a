pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod orgchart;
pub mod workflow;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::delegation::{Delegation, DelegationId, DelegationScope, DelegationStatus};
pub use domain::request::{
    ApprovalRequest, DecisionAction, DecisionEvent, RequestId, RequestPriority, RequestStatus,
    RequestType,
};
pub use domain::settings::{
    ApprovalSettings, AutoApprovalSettings, DelegationSettings, EscalationSettings,
    NotificationSettings, WhoApprovesDelegation, WhoCanBeDelegated,
};
pub use errors::{ApplicationError, InterfaceError, WorkflowError};
pub use notify::{InMemoryNotifier, Notifier, WorkflowEvent};
pub use orgchart::{InMemoryOrgDirectory, OrgDirectory, OrgMember};
pub use workflow::auto_approval::{AutoApprovalOutcome, AutoApprovalRefusal};
pub use workflow::delegation_rules::{
    DelegationApprover, DelegationDisposition, DelegationProposal,
};
pub use workflow::escalation::EscalationOutcome;
pub use workflow::resolution::ApproverResolution;
