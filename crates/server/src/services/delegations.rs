use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crewflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crewflow_core::domain::delegation::{
    Delegation, DelegationId, DelegationScope, DelegationStatus,
};
use crewflow_core::domain::settings::ApprovalSettings;
use crewflow_core::errors::{ApplicationError, WorkflowError};
use crewflow_core::notify::{Notifier, WorkflowEvent};
use crewflow_core::orgchart::OrgDirectory;
use crewflow_core::workflow::delegation_rules::{
    self, DelegationApprover, DelegationDisposition, DelegationProposal,
};
use crewflow_db::{DelegationRepository, SettingsRepository};

use super::persistence;

#[derive(Clone, Debug)]
pub struct CreateDelegationInput {
    pub delegate_id: String,
    pub scope: DelegationScope,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: String,
}

/// Delegation lifecycle: proposal, approval routing, revocation.
pub struct DelegationService {
    delegations: Arc<dyn DelegationRepository>,
    settings: Arc<dyn SettingsRepository>,
    directory: Arc<dyn OrgDirectory>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
}

impl DelegationService {
    pub fn new(
        delegations: Arc<dyn DelegationRepository>,
        settings: Arc<dyn SettingsRepository>,
        directory: Arc<dyn OrgDirectory>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { delegations, settings, directory, notifier, audit }
    }

    async fn effective_settings(&self) -> Result<ApprovalSettings, ApplicationError> {
        Ok(self.settings.load().await.map_err(persistence)?.unwrap_or_default())
    }

    fn notify(&self, settings: &ApprovalSettings, event: WorkflowEvent) {
        if event.enabled_by(&settings.notifications) {
            self.notifier.notify(event);
        }
    }

    /// Propose a delegation on behalf of `actor_id` (the delegator).
    pub async fn create(
        &self,
        actor_id: &str,
        input: CreateDelegationInput,
        correlation_id: &str,
    ) -> Result<Delegation, ApplicationError> {
        let settings = self.effective_settings().await?;
        let now = Utc::now();

        let proposal = DelegationProposal {
            delegator_id: actor_id.to_owned(),
            delegate_id: input.delegate_id.clone(),
            scope: input.scope.clone(),
            starts_at: input.starts_at,
            ends_at: input.ends_at,
        };
        let existing = self.delegations.list_for_delegator(actor_id).await.map_err(persistence)?;
        let disposition = delegation_rules::validate_proposal(
            self.directory.as_ref(),
            &settings,
            &proposal,
            &existing,
            now,
        )?;

        let status = match disposition {
            DelegationDisposition::ActivateImmediately => DelegationStatus::Active,
            DelegationDisposition::AwaitApproval { .. } => DelegationStatus::PendingApproval,
        };
        let delegation = Delegation {
            id: DelegationId(format!("DLG-{}", Uuid::new_v4())),
            delegator_id: actor_id.to_owned(),
            delegate_id: input.delegate_id,
            scope: input.scope,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            status,
            approved_by: None,
            reason: input.reason,
            created_at: now,
            updated_at: now,
        };
        self.delegations.save(&delegation).await.map_err(persistence)?;

        match &disposition {
            DelegationDisposition::ActivateImmediately => {
                self.notify(
                    &settings,
                    WorkflowEvent::DelegationActivated {
                        delegation_id: delegation.id.clone(),
                        delegator_id: delegation.delegator_id.clone(),
                        delegate_id: delegation.delegate_id.clone(),
                    },
                );
            }
            DelegationDisposition::AwaitApproval { approver } => {
                let approver_id = match approver {
                    DelegationApprover::User { user_id } => Some(user_id.clone()),
                    DelegationApprover::AnyAdmin => None,
                };
                self.notify(
                    &settings,
                    WorkflowEvent::DelegationRequested {
                        delegation_id: delegation.id.clone(),
                        delegator_id: delegation.delegator_id.clone(),
                        delegate_id: delegation.delegate_id.clone(),
                        approver_id,
                    },
                );
            }
        }

        self.audit.emit(
            AuditEvent::new(
                None,
                correlation_id,
                "delegation.created",
                AuditCategory::Delegation,
                actor_id,
                AuditOutcome::Success,
            )
            .with_metadata("delegation_id", delegation.id.0.clone())
            .with_metadata("status", delegation.status.as_str()),
        );
        info!(
            event_name = "delegation.created",
            correlation_id,
            delegation_id = %delegation.id.0,
            status = delegation.status.as_str(),
            "delegation proposed"
        );

        Ok(delegation)
    }

    /// Approve or reject a pending delegation.
    pub async fn decide(
        &self,
        id: &DelegationId,
        actor_id: &str,
        approve: bool,
        correlation_id: &str,
    ) -> Result<Delegation, ApplicationError> {
        let settings = self.effective_settings().await?;
        let mut delegation = self
            .delegations
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| WorkflowError::not_found("delegation", id.0.clone()))?;

        if delegation.status != DelegationStatus::PendingApproval {
            return Err(WorkflowError::InvalidDelegationState {
                id: delegation.id.0.clone(),
                status: delegation.status,
            }
            .into());
        }
        if !delegation_rules::may_decide_delegation(
            self.directory.as_ref(),
            &settings,
            &delegation,
            actor_id,
        ) {
            return Err(WorkflowError::forbidden(
                actor_id,
                format!("decide delegation `{}`", delegation.id.0),
            )
            .into());
        }

        delegation.status =
            if approve { DelegationStatus::Active } else { DelegationStatus::Rejected };
        delegation.approved_by = approve.then(|| actor_id.to_owned());
        delegation.updated_at = Utc::now();
        self.delegations.save(&delegation).await.map_err(persistence)?;

        if approve {
            self.notify(
                &settings,
                WorkflowEvent::DelegationActivated {
                    delegation_id: delegation.id.clone(),
                    delegator_id: delegation.delegator_id.clone(),
                    delegate_id: delegation.delegate_id.clone(),
                },
            );
        } else {
            self.notify(
                &settings,
                WorkflowEvent::DelegationRejected { delegation_id: delegation.id.clone() },
            );
        }

        self.audit.emit(
            AuditEvent::new(
                None,
                correlation_id,
                "delegation.decided",
                AuditCategory::Delegation,
                actor_id,
                if approve { AuditOutcome::Success } else { AuditOutcome::Rejected },
            )
            .with_metadata("delegation_id", delegation.id.0.clone()),
        );
        info!(
            event_name = "delegation.decided",
            correlation_id,
            delegation_id = %delegation.id.0,
            approved = approve,
            "delegation decided"
        );

        Ok(delegation)
    }

    /// Revoke a live or pending delegation. Only the delegator or an admin
    /// may revoke.
    pub async fn revoke(
        &self,
        id: &DelegationId,
        actor_id: &str,
        correlation_id: &str,
    ) -> Result<Delegation, ApplicationError> {
        let settings = self.effective_settings().await?;
        let mut delegation = self
            .delegations
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| WorkflowError::not_found("delegation", id.0.clone()))?;

        if actor_id != delegation.delegator_id && !self.directory.is_admin(actor_id) {
            return Err(WorkflowError::forbidden(
                actor_id,
                format!("revoke delegation `{}`", delegation.id.0),
            )
            .into());
        }
        if !matches!(
            delegation.status,
            DelegationStatus::Requested
                | DelegationStatus::PendingApproval
                | DelegationStatus::Active
        ) {
            return Err(WorkflowError::InvalidDelegationState {
                id: delegation.id.0.clone(),
                status: delegation.status,
            }
            .into());
        }

        delegation.status = DelegationStatus::Revoked;
        delegation.updated_at = Utc::now();
        self.delegations.save(&delegation).await.map_err(persistence)?;

        self.notify(
            &settings,
            WorkflowEvent::DelegationRevoked { delegation_id: delegation.id.clone() },
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                correlation_id,
                "delegation.revoked",
                AuditCategory::Delegation,
                actor_id,
                AuditOutcome::Success,
            )
            .with_metadata("delegation_id", delegation.id.0.clone()),
        );
        info!(
            event_name = "delegation.revoked",
            correlation_id,
            delegation_id = %delegation.id.0,
            "delegation revoked"
        );

        Ok(delegation)
    }

    pub async fn get(&self, id: &DelegationId) -> Result<Delegation, ApplicationError> {
        self.delegations
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| WorkflowError::not_found("delegation", id.0.clone()).into())
    }

    pub async fn list(&self) -> Result<Vec<Delegation>, ApplicationError> {
        self.delegations.list_all().await.map_err(persistence)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use crewflow_core::audit::InMemoryAuditSink;
    use crewflow_core::domain::delegation::{DelegationScope, DelegationStatus};
    use crewflow_core::domain::settings::{ApprovalSettings, WhoApprovesDelegation};
    use crewflow_core::errors::{ApplicationError, WorkflowError};
    use crewflow_core::notify::InMemoryNotifier;
    use crewflow_core::orgchart::{InMemoryOrgDirectory, OrgMember};
    use crewflow_db::{InMemoryDelegationRepository, InMemorySettingsRepository, SettingsRepository};

    use super::{CreateDelegationInput, DelegationService};

    struct Harness {
        service: DelegationService,
        notifier: InMemoryNotifier,
    }

    async fn harness(settings: ApprovalSettings) -> Harness {
        let settings_repo = Arc::new(InMemorySettingsRepository::default());
        settings_repo.save_versioned(&settings, 0).await.expect("seed settings");

        let directory = Arc::new(InMemoryOrgDirectory::new(vec![
            OrgMember {
                user_id: "u-lead".to_string(),
                manager_id: Some("u-head".to_string()),
                team: "ops".to_string(),
                admin: false,
            },
            OrgMember {
                user_id: "u-peer".to_string(),
                manager_id: Some("u-head".to_string()),
                team: "ops".to_string(),
                admin: false,
            },
            OrgMember {
                user_id: "u-head".to_string(),
                manager_id: None,
                team: "hq".to_string(),
                admin: true,
            },
        ]));
        let notifier = InMemoryNotifier::default();

        let service = DelegationService::new(
            Arc::new(InMemoryDelegationRepository::default()),
            settings_repo,
            directory,
            Arc::new(notifier.clone()),
            Arc::new(InMemoryAuditSink::default()),
        );
        Harness { service, notifier }
    }

    fn week_long(delegate: &str) -> CreateDelegationInput {
        let now = Utc::now();
        CreateDelegationInput {
            delegate_id: delegate.to_string(),
            scope: DelegationScope::default(),
            starts_at: now,
            ends_at: now + Duration::days(7),
            reason: "vacation cover".to_string(),
        }
    }

    #[tokio::test]
    async fn proposal_waits_for_the_upper_leader_by_default() {
        let h = harness(ApprovalSettings::default()).await;

        let delegation =
            h.service.create("u-lead", week_long("u-peer"), "c-1").await.expect("create");

        assert_eq!(delegation.status, DelegationStatus::PendingApproval);
        assert_eq!(delegation.approved_by, None);
        assert_eq!(h.notifier.events()[0].kind(), "delegation.requested");
    }

    #[tokio::test]
    async fn no_approval_policy_activates_immediately() {
        let mut settings = ApprovalSettings::default();
        settings.delegation.require_approval = false;
        let h = harness(settings).await;

        let delegation =
            h.service.create("u-lead", week_long("u-peer"), "c-1").await.expect("create");

        assert_eq!(delegation.status, DelegationStatus::Active);
        assert_eq!(h.notifier.events()[0].kind(), "delegation.activated");
    }

    #[tokio::test]
    async fn approval_and_rejection_settle_a_pending_delegation() {
        let h = harness(ApprovalSettings::default()).await;
        let delegation =
            h.service.create("u-lead", week_long("u-peer"), "c-1").await.expect("create");

        // u-peer is not the resolved approver (u-head is).
        let error = h
            .service
            .decide(&delegation.id, "u-peer", true, "c-2")
            .await
            .expect_err("wrong party");
        assert!(matches!(error, ApplicationError::Domain(WorkflowError::Forbidden { .. })));

        let approved =
            h.service.decide(&delegation.id, "u-head", true, "c-3").await.expect("approve");
        assert_eq!(approved.status, DelegationStatus::Active);
        assert_eq!(approved.approved_by.as_deref(), Some("u-head"));

        // A settled delegation cannot be decided again.
        let error = h
            .service
            .decide(&delegation.id, "u-head", false, "c-4")
            .await
            .expect_err("already settled");
        assert!(matches!(
            error,
            ApplicationError::Domain(WorkflowError::InvalidDelegationState { .. })
        ));
    }

    #[tokio::test]
    async fn delegate_accepts_when_policy_routes_to_the_delegate() {
        let mut settings = ApprovalSettings::default();
        settings.delegation.who_approves = WhoApprovesDelegation::Delegate;
        let h = harness(settings).await;

        let delegation =
            h.service.create("u-lead", week_long("u-peer"), "c-1").await.expect("create");
        let accepted =
            h.service.decide(&delegation.id, "u-peer", true, "c-2").await.expect("accept");
        assert_eq!(accepted.status, DelegationStatus::Active);
    }

    #[tokio::test]
    async fn revocation_is_limited_to_the_delegator_or_an_admin() {
        let mut settings = ApprovalSettings::default();
        settings.delegation.require_approval = false;
        let h = harness(settings).await;
        let delegation =
            h.service.create("u-lead", week_long("u-peer"), "c-1").await.expect("create");

        let error = h
            .service
            .revoke(&delegation.id, "u-peer", "c-2")
            .await
            .expect_err("delegate may not revoke");
        assert!(matches!(error, ApplicationError::Domain(WorkflowError::Forbidden { .. })));

        let revoked = h.service.revoke(&delegation.id, "u-lead", "c-3").await.expect("revoke");
        assert_eq!(revoked.status, DelegationStatus::Revoked);

        let error = h
            .service
            .revoke(&delegation.id, "u-head", "c-4")
            .await
            .expect_err("already revoked");
        assert!(matches!(
            error,
            ApplicationError::Domain(WorkflowError::InvalidDelegationState { .. })
        ));
    }

    #[tokio::test]
    async fn disabled_delegation_policy_blocks_creation() {
        let mut settings = ApprovalSettings::default();
        settings.allow_delegation = false;
        let h = harness(settings).await;

        let error =
            h.service.create("u-lead", week_long("u-peer"), "c-1").await.expect_err("disabled");
        assert!(matches!(error, ApplicationError::Domain(WorkflowError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn second_overlapping_delegation_is_blocked_by_default() {
        let mut settings = ApprovalSettings::default();
        settings.delegation.require_approval = false;
        let h = harness(settings).await;

        h.service.create("u-lead", week_long("u-peer"), "c-1").await.expect("first");
        let error = h
            .service
            .create("u-lead", week_long("u-peer"), "c-2")
            .await
            .expect_err("overlap");
        assert!(matches!(
            error,
            ApplicationError::Domain(WorkflowError::DelegationLimitExceeded { .. })
        ));
    }
}
