use thiserror::Error;

use crate::domain::delegation::DelegationStatus;
use crate::domain::request::RequestStatus;

/// Domain-level failures. Every kind is surfaced to the caller; nothing here
/// is retried by the engine itself.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("unrecognized request type `{value}`")]
    InvalidRequestType { value: String },
    #[error("invalid settings: {reason}")]
    InvalidSettings { reason: String },
    #[error("an identical open request `{existing_id}` already exists inside the dedup window")]
    DuplicateSubmission { existing_id: String },
    #[error("self-approval is disabled by policy for `{actor_id}`")]
    SelfApprovalForbidden { actor_id: String },
    #[error("stale version: supplied {supplied}, current {current}")]
    StaleRequestVersion { supplied: u32, current: u32 },
    #[error("actor `{actor_id}` may not {action}")]
    Forbidden { actor_id: String, action: String },
    #[error("delegation scope violation: {reason}")]
    DelegationScopeViolation { reason: String },
    #[error("delegation limit exceeded: {reason}")]
    DelegationLimitExceeded { reason: String },
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("request `{id}` is terminal ({status:?}) and immutable")]
    TerminalState { id: String, status: RequestStatus },
    #[error("request `{id}` is still open and cannot be archived")]
    RequestStillOpen { id: String },
    #[error("delegation `{id}` is {status:?} and does not accept this transition")]
    InvalidDelegationState { id: String, status: DelegationStatus },
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn forbidden(actor_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Forbidden { actor_id: actor_id.into(), action: action.into() }
    }

    /// `StaleRequestVersion` is the expected recoverable concurrency signal:
    /// callers re-read and retry, and it is never logged as an application
    /// error.
    pub fn is_recoverable_conflict(&self) -> bool {
        matches!(self, Self::StaleRequestVersion { .. })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] WorkflowError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        mapped.set_correlation_id(correlation_id);
        mapped
    }
}

/// HTTP-facing error shape. The message is safe to show an end user; the
/// correlation id links back to the structured logs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    fn set_correlation_id(&mut self, correlation_id: String) {
        match self {
            Self::BadRequest { correlation_id: id, .. }
            | Self::Forbidden { correlation_id: id, .. }
            | Self::NotFound { correlation_id: id, .. }
            | Self::Conflict { correlation_id: id, .. }
            | Self::ServiceUnavailable { correlation_id: id, .. }
            | Self::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. } => message,
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(domain) => {
                let message = domain.to_string();
                match domain {
                    WorkflowError::InvalidRequestType { .. }
                    | WorkflowError::InvalidSettings { .. } => {
                        Self::BadRequest { message, correlation_id: unassigned }
                    }
                    WorkflowError::SelfApprovalForbidden { .. }
                    | WorkflowError::Forbidden { .. }
                    | WorkflowError::DelegationScopeViolation { .. } => {
                        Self::Forbidden { message, correlation_id: unassigned }
                    }
                    WorkflowError::NotFound { .. } => {
                        Self::NotFound { message, correlation_id: unassigned }
                    }
                    WorkflowError::DuplicateSubmission { .. }
                    | WorkflowError::StaleRequestVersion { .. }
                    | WorkflowError::DelegationLimitExceeded { .. }
                    | WorkflowError::TerminalState { .. }
                    | WorkflowError::RequestStillOpen { .. }
                    | WorkflowError::InvalidDelegationState { .. } => {
                        Self::Conflict { message, correlation_id: unassigned }
                    }
                }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
        }
    }
}
