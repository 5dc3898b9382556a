use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crewflow_core::domain::delegation::{Delegation, DelegationId, DelegationStatus};
use crewflow_core::domain::request::{
    ApprovalRequest, DecisionEvent, RequestId, RequestStatus, RequestType,
};
use crewflow_core::domain::settings::ApprovalSettings;

pub mod delegation;
pub mod memory;
pub mod request;
pub mod settings;

pub use delegation::SqlDelegationRepository;
pub use memory::{InMemoryDelegationRepository, InMemoryRequestRepository, InMemorySettingsRepository};
pub use request::SqlRequestRepository;
pub use settings::SqlSettingsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Listing criteria for approval requests. `None` fields are unconstrained;
/// archived rows are hidden unless asked for.
#[derive(Clone, Debug, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub requester_id: Option<String>,
    pub approver_id: Option<String>,
    pub include_archived: bool,
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, RepositoryError>;

    async fn insert(&self, request: &ApprovalRequest) -> Result<(), RepositoryError>;

    /// Compare-and-swap update. Persists the request only if the stored row
    /// still carries `expected_version`; returns `false` when another writer
    /// got there first. A decision event committed alongside the update lands
    /// in the same transaction, keyed by the new version.
    async fn update_versioned(
        &self,
        request: &ApprovalRequest,
        expected_version: u32,
        decision: Option<&DecisionEvent>,
    ) -> Result<bool, RepositoryError>;

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<ApprovalRequest>, RepositoryError>;

    /// Open, non-archived request of the same type from the same requester
    /// created at or after `since`, if any. Used for duplicate suppression.
    async fn find_open_duplicate(
        &self,
        requester_id: &str,
        request_type: RequestType,
        since: DateTime<Utc>,
    ) -> Result<Option<RequestId>, RepositoryError>;

    /// Every open, non-archived request, for the escalation sweep.
    async fn list_open(&self) -> Result<Vec<ApprovalRequest>, RepositoryError>;
}

#[async_trait]
pub trait DelegationRepository: Send + Sync {
    async fn find_by_id(&self, id: &DelegationId) -> Result<Option<Delegation>, RepositoryError>;

    /// Insert-or-replace keyed by id.
    async fn save(&self, delegation: &Delegation) -> Result<(), RepositoryError>;

    async fn list_for_delegator(
        &self,
        delegator_id: &str,
    ) -> Result<Vec<Delegation>, RepositoryError>;

    async fn list_by_status(
        &self,
        status: DelegationStatus,
    ) -> Result<Vec<Delegation>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Delegation>, RepositoryError>;

    /// Retention purge: delete delegations whose window ended before `cutoff`.
    /// Returns the number of rows removed.
    async fn delete_ended_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn load(&self) -> Result<Option<ApprovalSettings>, RepositoryError>;

    /// Compare-and-swap write of the settings document. `expected_version` is
    /// the version the caller read; `settings.version` is what gets stored.
    /// Returns `false` on a lost race. An `expected_version` of 0 means the
    /// singleton row does not exist yet and should be created.
    async fn save_versioned(
        &self,
        settings: &ApprovalSettings,
        expected_version: u32,
    ) -> Result<bool, RepositoryError>;
}
