use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crewflow_core::domain::delegation::{Delegation, DelegationId, DelegationStatus};
use crewflow_core::domain::request::{
    ApprovalRequest, DecisionEvent, RequestId, RequestType,
};
use crewflow_core::domain::settings::ApprovalSettings;

use super::{
    DelegationRepository, RepositoryError, RequestFilter, RequestRepository, SettingsRepository,
};

/// In-memory mirrors of the SQL repositories, with the same versioning
/// semantics. Used by unit tests and anywhere a database is overkill.
#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, ApprovalRequest>>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn insert(&self, request: &ApprovalRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn update_versioned(
        &self,
        request: &ApprovalRequest,
        expected_version: u32,
        decision: Option<&DecisionEvent>,
    ) -> Result<bool, RepositoryError> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(&request.id.0) {
            Some(stored) if stored.version == expected_version => {
                let mut updated = request.clone();
                updated.decision_history = stored.decision_history.clone();
                if let Some(decision) = decision {
                    updated.decision_history.push(decision.clone());
                }
                *stored = updated;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matched: Vec<ApprovalRequest> = requests
            .values()
            .filter(|request| filter.include_archived || !request.archived)
            .filter(|request| filter.status.map_or(true, |status| request.status == status))
            .filter(|request| {
                filter
                    .requester_id
                    .as_ref()
                    .map_or(true, |requester| &request.requester_id == requester)
            })
            .filter(|request| {
                filter
                    .approver_id
                    .as_ref()
                    .map_or(true, |approver| request.current_approver_id.as_ref() == Some(approver))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        Ok(matched)
    }

    async fn find_open_duplicate(
        &self,
        requester_id: &str,
        request_type: RequestType,
        since: DateTime<Utc>,
    ) -> Result<Option<RequestId>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut candidates: Vec<&ApprovalRequest> = requests
            .values()
            .filter(|request| {
                !request.archived
                    && request.status.is_open()
                    && request.requester_id == requester_id
                    && request.request_type == request_type
                    && request.created_at >= since
            })
            .collect();
        candidates.sort_by_key(|request| request.created_at);
        Ok(candidates.first().map(|request| request.id.clone()))
    }

    async fn list_open(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut open: Vec<ApprovalRequest> = requests
            .values()
            .filter(|request| !request.archived && request.status.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|request| request.created_at);
        Ok(open)
    }
}

#[derive(Default)]
pub struct InMemoryDelegationRepository {
    delegations: RwLock<HashMap<String, Delegation>>,
}

#[async_trait::async_trait]
impl DelegationRepository for InMemoryDelegationRepository {
    async fn find_by_id(&self, id: &DelegationId) -> Result<Option<Delegation>, RepositoryError> {
        let delegations = self.delegations.read().await;
        Ok(delegations.get(&id.0).cloned())
    }

    async fn save(&self, delegation: &Delegation) -> Result<(), RepositoryError> {
        let mut delegations = self.delegations.write().await;
        delegations.insert(delegation.id.0.clone(), delegation.clone());
        Ok(())
    }

    async fn list_for_delegator(
        &self,
        delegator_id: &str,
    ) -> Result<Vec<Delegation>, RepositoryError> {
        let delegations = self.delegations.read().await;
        let mut matched: Vec<Delegation> = delegations
            .values()
            .filter(|delegation| delegation.delegator_id == delegator_id)
            .cloned()
            .collect();
        matched.sort_by_key(|delegation| delegation.created_at);
        Ok(matched)
    }

    async fn list_by_status(
        &self,
        status: DelegationStatus,
    ) -> Result<Vec<Delegation>, RepositoryError> {
        let delegations = self.delegations.read().await;
        let mut matched: Vec<Delegation> = delegations
            .values()
            .filter(|delegation| delegation.status == status)
            .cloned()
            .collect();
        matched.sort_by_key(|delegation| delegation.created_at);
        Ok(matched)
    }

    async fn list_all(&self) -> Result<Vec<Delegation>, RepositoryError> {
        let delegations = self.delegations.read().await;
        let mut all: Vec<Delegation> = delegations.values().cloned().collect();
        all.sort_by_key(|delegation| delegation.created_at);
        Ok(all)
    }

    async fn delete_ended_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut delegations = self.delegations.write().await;
        let before = delegations.len();
        delegations.retain(|_, delegation| delegation.ends_at >= cutoff);
        Ok((before - delegations.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    settings: RwLock<Option<ApprovalSettings>>,
}

#[async_trait::async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn load(&self) -> Result<Option<ApprovalSettings>, RepositoryError> {
        let settings = self.settings.read().await;
        Ok(settings.clone())
    }

    async fn save_versioned(
        &self,
        settings: &ApprovalSettings,
        expected_version: u32,
    ) -> Result<bool, RepositoryError> {
        let mut stored = self.settings.write().await;
        match (&*stored, expected_version) {
            (None, 0) => {
                *stored = Some(settings.clone());
                Ok(true)
            }
            (Some(current), expected) if current.version == expected && expected > 0 => {
                *stored = Some(settings.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
