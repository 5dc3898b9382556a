use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crewflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crewflow_core::domain::request::{
    ApprovalRequest, DecisionAction, DecisionEvent, RequestId, RequestPriority, RequestStatus,
    RequestType,
};
use crewflow_core::domain::settings::ApprovalSettings;
use crewflow_core::errors::{ApplicationError, WorkflowError};
use crewflow_core::notify::{Notifier, WorkflowEvent};
use crewflow_core::orgchart::OrgDirectory;
use crewflow_core::workflow::{auto_approval, resolution};
use crewflow_db::{
    DelegationRepository, RequestFilter, RequestRepository, SettingsRepository,
};

use super::persistence;

#[derive(Clone, Debug)]
pub struct SubmitRequestInput {
    pub requester_id: String,
    pub request_type: String,
    pub priority: Option<RequestPriority>,
    pub amount: Option<Decimal>,
    pub days: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct DecideRequestInput {
    pub actor_id: String,
    pub action: DecisionAction,
    pub comment: Option<String>,
    /// The request version the actor saw; the decision only lands if the
    /// store still holds it.
    pub expected_version: u32,
}

/// Request lifecycle orchestration: submission, decisions, archival.
pub struct RequestService {
    requests: Arc<dyn RequestRepository>,
    delegations: Arc<dyn DelegationRepository>,
    settings: Arc<dyn SettingsRepository>,
    directory: Arc<dyn OrgDirectory>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
}

impl RequestService {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        delegations: Arc<dyn DelegationRepository>,
        settings: Arc<dyn SettingsRepository>,
        directory: Arc<dyn OrgDirectory>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { requests, delegations, settings, directory, notifier, audit }
    }

    async fn effective_settings(&self) -> Result<ApprovalSettings, ApplicationError> {
        Ok(self.settings.load().await.map_err(persistence)?.unwrap_or_default())
    }

    fn notify(&self, settings: &ApprovalSettings, event: WorkflowEvent) {
        if event.enabled_by(&settings.notifications) {
            self.notifier.notify(event);
        }
    }

    pub async fn submit(
        &self,
        input: SubmitRequestInput,
        correlation_id: &str,
    ) -> Result<ApprovalRequest, ApplicationError> {
        let settings = self.effective_settings().await?;
        let request_type = RequestType::parse(&input.request_type).ok_or_else(|| {
            WorkflowError::InvalidRequestType { value: input.request_type.clone() }
        })?;
        let now = Utc::now();

        // Identity is checked before any branch commits a request, so an
        // unknown requester cannot slip through the auto-approval path.
        if !self.directory.is_member(&input.requester_id) {
            return Err(WorkflowError::not_found("requester", input.requester_id.clone()).into());
        }

        if settings.duplicate_window_hours > 0 {
            let since = now - Duration::hours(i64::from(settings.duplicate_window_hours));
            if let Some(existing) = self
                .requests
                .find_open_duplicate(&input.requester_id, request_type, since)
                .await
                .map_err(persistence)?
            {
                return Err(WorkflowError::DuplicateSubmission { existing_id: existing.0 }.into());
            }
        }

        let id = RequestId(format!("REQ-{}", Uuid::new_v4()));
        let priority = input.priority.unwrap_or(RequestPriority::Medium);
        let outcome =
            auto_approval::evaluate(&settings.auto_approval, request_type, input.amount, input.days);

        let request = if outcome.eligible {
            let decision = DecisionEvent {
                actor_id: "system".to_owned(),
                action: DecisionAction::AutoApprove,
                comment: Some(outcome.reason.clone()),
                escalation_level: 0,
                version: 1,
                occurred_at: now,
            };
            ApprovalRequest {
                id: id.clone(),
                request_type,
                requester_id: input.requester_id.clone(),
                status: RequestStatus::AutoApproved,
                priority,
                amount: input.amount,
                days: input.days,
                current_approver_id: None,
                escalation_level: 0,
                decision_history: vec![decision],
                version: 1,
                archived: false,
                created_at: now,
                last_state_change_at: now,
                updated_at: now,
            }
        } else {
            let delegations = self.delegations.list_all().await.map_err(persistence)?;
            let resolution = resolution::resolve_effective_approver(
                self.directory.as_ref(),
                &input.requester_id,
                request_type,
                0,
                &delegations,
                now,
            )?;
            ApprovalRequest {
                id: id.clone(),
                request_type,
                requester_id: input.requester_id.clone(),
                status: RequestStatus::Pending,
                priority,
                amount: input.amount,
                days: input.days,
                current_approver_id: Some(resolution.effective_approver_id),
                escalation_level: 0,
                decision_history: Vec::new(),
                version: 1,
                archived: false,
                created_at: now,
                last_state_change_at: now,
                updated_at: now,
            }
        };

        self.requests.insert(&request).await.map_err(persistence)?;

        if request.status == RequestStatus::AutoApproved {
            self.notify(
                &settings,
                WorkflowEvent::RequestAutoApproved {
                    request_id: request.id.clone(),
                    requester_id: request.requester_id.clone(),
                    request_type,
                },
            );
        } else {
            self.notify(
                &settings,
                WorkflowEvent::RequestSubmitted {
                    request_id: request.id.clone(),
                    requester_id: request.requester_id.clone(),
                    request_type,
                    approver_id: request.current_approver_id.clone(),
                },
            );
        }

        self.audit.emit(
            AuditEvent::new(
                Some(request.id.clone()),
                correlation_id,
                "request.submitted",
                AuditCategory::Request,
                &input.requester_id,
                AuditOutcome::Success,
            )
            .with_metadata("request_type", request_type.as_str())
            .with_metadata("status", request.status.as_str()),
        );
        info!(
            event_name = "request.submitted",
            correlation_id,
            request_id = %request.id.0,
            status = request.status.as_str(),
            "approval request submitted"
        );

        Ok(request)
    }

    pub async fn decide(
        &self,
        id: &RequestId,
        input: DecideRequestInput,
        correlation_id: &str,
    ) -> Result<ApprovalRequest, ApplicationError> {
        if !matches!(input.action, DecisionAction::Approve | DecisionAction::Reject) {
            return Err(WorkflowError::forbidden(
                input.actor_id,
                format!("record the system-only action `{}`", input.action.as_str()),
            )
            .into());
        }

        let settings = self.effective_settings().await?;
        let request = self
            .requests
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| WorkflowError::not_found("request", id.0.clone()))?;

        if request.status.is_terminal() {
            return Err(WorkflowError::TerminalState {
                id: request.id.0.clone(),
                status: request.status,
            }
            .into());
        }

        if input.expected_version != request.version {
            return Err(WorkflowError::StaleRequestVersion {
                supplied: input.expected_version,
                current: request.version,
            }
            .into());
        }

        if input.actor_id == request.requester_id && !settings.allow_self_approval {
            return Err(WorkflowError::SelfApprovalForbidden { actor_id: input.actor_id }.into());
        }

        // Authority is re-resolved at decision time, so a delegation that
        // activated or lapsed since submission is honored without any
        // background rewrite of the request.
        let delegations = self.delegations.list_all().await.map_err(persistence)?;
        let now = Utc::now();
        let resolution = resolution::resolve_effective_approver(
            self.directory.as_ref(),
            &request.requester_id,
            request.request_type,
            request.escalation_level,
            &delegations,
            now,
        )?;
        let authorized = input.actor_id == resolution.effective_approver_id
            || input.actor_id == resolution.nominal_approver_id
            || self.directory.is_admin(&input.actor_id);
        if !authorized {
            return Err(WorkflowError::forbidden(
                input.actor_id,
                format!("decide request `{}`", request.id.0),
            )
            .into());
        }

        let mut updated = request.clone();
        updated.status = match input.action {
            DecisionAction::Approve => RequestStatus::Approved,
            _ => RequestStatus::Rejected,
        };
        updated.version = request.version + 1;
        updated.last_state_change_at = now;
        updated.updated_at = now;
        let decision = DecisionEvent {
            actor_id: input.actor_id.clone(),
            action: input.action,
            comment: input.comment,
            escalation_level: request.escalation_level,
            version: updated.version,
            occurred_at: now,
        };
        updated.decision_history.push(decision.clone());

        let won = self
            .requests
            .update_versioned(&updated, request.version, Some(&decision))
            .await
            .map_err(persistence)?;
        if !won {
            let current = self
                .requests
                .find_by_id(id)
                .await
                .map_err(persistence)?
                .map(|stored| stored.version)
                .unwrap_or(request.version);
            return Err(WorkflowError::StaleRequestVersion {
                supplied: input.expected_version,
                current,
            }
            .into());
        }

        self.notify(
            &settings,
            WorkflowEvent::RequestDecided {
                request_id: updated.id.clone(),
                actor_id: input.actor_id.clone(),
                action: input.action,
            },
        );
        self.audit.emit(
            AuditEvent::new(
                Some(updated.id.clone()),
                correlation_id,
                "request.decided",
                AuditCategory::Request,
                &input.actor_id,
                AuditOutcome::Success,
            )
            .with_metadata("action", input.action.as_str())
            .with_metadata("version", updated.version.to_string()),
        );
        info!(
            event_name = "request.decided",
            correlation_id,
            request_id = %updated.id.0,
            action = input.action.as_str(),
            delegated = resolution.is_delegated(),
            "approval request decided"
        );

        Ok(updated)
    }

    pub async fn get(&self, id: &RequestId) -> Result<ApprovalRequest, ApplicationError> {
        self.requests
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| WorkflowError::not_found("request", id.0.clone()).into())
    }

    pub async fn list(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<ApprovalRequest>, ApplicationError> {
        self.requests.list(filter).await.map_err(persistence)
    }

    /// Archive a terminal request. Admin-only; archiving an already-archived
    /// request is a no-op success.
    pub async fn archive(
        &self,
        id: &RequestId,
        actor_id: &str,
        correlation_id: &str,
    ) -> Result<ApprovalRequest, ApplicationError> {
        if !self.directory.is_admin(actor_id) {
            return Err(WorkflowError::forbidden(actor_id, "archive requests").into());
        }

        let request = self
            .requests
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| WorkflowError::not_found("request", id.0.clone()))?;

        if request.archived {
            return Ok(request);
        }
        if !request.status.is_terminal() {
            return Err(WorkflowError::RequestStillOpen { id: request.id.0.clone() }.into());
        }

        let mut updated = request.clone();
        updated.archived = true;
        updated.version = request.version + 1;
        updated.updated_at = Utc::now();

        let won = self
            .requests
            .update_versioned(&updated, request.version, None)
            .await
            .map_err(persistence)?;
        if !won {
            let current = self
                .requests
                .find_by_id(id)
                .await
                .map_err(persistence)?
                .map(|stored| stored.version)
                .unwrap_or(request.version);
            return Err(WorkflowError::StaleRequestVersion {
                supplied: request.version,
                current,
            }
            .into());
        }

        self.audit.emit(AuditEvent::new(
            Some(updated.id.clone()),
            correlation_id,
            "request.archived",
            AuditCategory::Request,
            actor_id,
            AuditOutcome::Success,
        ));
        info!(
            event_name = "request.archived",
            correlation_id,
            request_id = %updated.id.0,
            "approval request archived"
        );

        Ok(updated)
    }
}
