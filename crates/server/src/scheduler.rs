use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crewflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crewflow_core::domain::delegation::DelegationStatus;
use crewflow_core::domain::request::{
    ApprovalRequest, DecisionAction, DecisionEvent, RequestStatus,
};
use crewflow_core::domain::settings::ApprovalSettings;
use crewflow_core::errors::ApplicationError;
use crewflow_core::notify::{Notifier, WorkflowEvent};
use crewflow_core::orgchart::OrgDirectory;
use crewflow_core::workflow::escalation::{self, EscalationOutcome};
use crewflow_core::workflow::resolution;
use crewflow_db::{DelegationRepository, RequestFilter, RequestRepository, SettingsRepository};

use crate::services::persistence;

/// What one sweep pass did. Conflicts are requests a concurrent manual
/// decision won; the scheduler drops them and re-evaluates next pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub escalated: u32,
    pub expired: u32,
    pub conflicts: u32,
    pub requests_archived: u32,
    pub delegations_expired: u32,
    pub delegations_purged: u64,
}

/// Periodic bookkeeping: escalation timeouts, delegation expiry, retention.
pub struct EscalationScheduler {
    requests: Arc<dyn RequestRepository>,
    delegations: Arc<dyn DelegationRepository>,
    settings: Arc<dyn SettingsRepository>,
    directory: Arc<dyn OrgDirectory>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
}

impl EscalationScheduler {
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

    pub async fn run(self: Arc<Self>, sweep_interval_secs: u64) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(sweep_interval_secs.max(1)));
        loop {
            ticker.tick().await;
            match self.sweep_at(Utc::now()).await {
                Ok(report) => info!(
                    event_name = "scheduler.sweep.completed",
                    escalated = report.escalated,
                    expired = report.expired,
                    conflicts = report.conflicts,
                    requests_archived = report.requests_archived,
                    delegations_expired = report.delegations_expired,
                    delegations_purged = report.delegations_purged,
                    "sweep completed"
                ),
                Err(error) => warn!(
                    event_name = "scheduler.sweep.failed",
                    error = %error,
                    "sweep failed; will retry next interval"
                ),
            }
        }
    }

    /// One full pass, evaluated against `now`. Taking the instant as an
    /// argument keeps timeout behavior testable without waiting.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, ApplicationError> {
        let settings = self.settings.load().await.map_err(persistence)?.unwrap_or_default();
        let mut report = SweepReport::default();

        for request in self.requests.list_open().await.map_err(persistence)? {
            match escalation::evaluate(&request, &settings.escalation, now) {
                EscalationOutcome::Hold => {}
                EscalationOutcome::Escalate { next_level } => {
                    self.escalate(&request, &settings, next_level, now, &mut report).await?;
                }
                EscalationOutcome::Expire => {
                    self.expire(&request, &settings, now, &mut report).await?;
                }
            }
        }

        for delegation in
            self.delegations.list_by_status(DelegationStatus::Active).await.map_err(persistence)?
        {
            if delegation.ends_at <= now {
                let mut expired = delegation.clone();
                expired.status = DelegationStatus::Expired;
                expired.updated_at = now;
                self.delegations.save(&expired).await.map_err(persistence)?;
                report.delegations_expired += 1;
            }
        }

        let retention = Duration::days(i64::from(settings.delegation.retention_days));
        let cutoff = now - retention;
        report.delegations_purged =
            self.delegations.delete_ended_before(cutoff).await.map_err(persistence)?;

        // Terminal requests past the retention window are archived in place;
        // nothing is ever deleted.
        let filter = RequestFilter {
            status: None,
            requester_id: None,
            approver_id: None,
            include_archived: false,
        };
        for request in self.requests.list(&filter).await.map_err(persistence)? {
            if !request.status.is_terminal() || request.last_state_change_at > cutoff {
                continue;
            }
            let mut archived = request.clone();
            archived.archived = true;
            archived.version = request.version + 1;
            archived.updated_at = now;
            let won = self
                .requests
                .update_versioned(&archived, request.version, None)
                .await
                .map_err(persistence)?;
            if won {
                report.requests_archived += 1;
            } else {
                report.conflicts += 1;
            }
        }

        Ok(report)
    }

    async fn escalate(
        &self,
        request: &ApprovalRequest,
        settings: &ApprovalSettings,
        next_level: u32,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<(), ApplicationError> {
        let delegations = self.delegations.list_all().await.map_err(persistence)?;
        let approver = match resolution::resolve_effective_approver(
            self.directory.as_ref(),
            &request.requester_id,
            request.request_type,
            next_level,
            &delegations,
            now,
        ) {
            Ok(resolution) => Some(resolution.effective_approver_id),
            Err(error) => {
                warn!(
                    event_name = "scheduler.escalation.unresolved_approver",
                    request_id = %request.id.0,
                    error = %error,
                    "keeping previous approver for escalated request"
                );
                request.current_approver_id.clone()
            }
        };

        let mut updated = request.clone();
        // An escalated request re-enters pending at the next level.
        updated.status = RequestStatus::Pending;
        updated.escalation_level = next_level;
        updated.current_approver_id = approver;
        updated.version = request.version + 1;
        updated.last_state_change_at = now;
        updated.updated_at = now;
        let decision = DecisionEvent {
            actor_id: "system".to_owned(),
            action: DecisionAction::Escalate,
            comment: None,
            escalation_level: next_level,
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
            report.conflicts += 1;
            return Ok(());
        }
        report.escalated += 1;

        if settings.notifications.on_escalated {
            self.notifier.notify(WorkflowEvent::RequestEscalated {
                request_id: updated.id.clone(),
                escalation_level: next_level,
                approver_id: updated.current_approver_id.clone(),
            });
        }
        self.audit.emit(
            AuditEvent::new(
                Some(updated.id.clone()),
                "scheduler",
                "request.escalated",
                AuditCategory::Scheduler,
                "system",
                AuditOutcome::Success,
            )
            .with_metadata("escalation_level", next_level.to_string()),
        );

        Ok(())
    }

    async fn expire(
        &self,
        request: &ApprovalRequest,
        settings: &ApprovalSettings,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<(), ApplicationError> {
        let mut updated = request.clone();
        updated.status = RequestStatus::Expired;
        updated.version = request.version + 1;
        updated.last_state_change_at = now;
        updated.updated_at = now;
        let decision = DecisionEvent {
            actor_id: "system".to_owned(),
            action: DecisionAction::Expire,
            comment: None,
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
            report.conflicts += 1;
            return Ok(());
        }
        report.expired += 1;

        if settings.notifications.on_escalated {
            self.notifier.notify(WorkflowEvent::RequestExpired { request_id: updated.id.clone() });
        }
        self.audit.emit(AuditEvent::new(
            Some(updated.id.clone()),
            "scheduler",
            "request.expired",
            AuditCategory::Scheduler,
            "system",
            AuditOutcome::Success,
        ));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use crewflow_core::audit::InMemoryAuditSink;
    use crewflow_core::domain::delegation::{
        Delegation, DelegationId, DelegationScope, DelegationStatus,
    };
    use crewflow_core::domain::request::{
        ApprovalRequest, DecisionAction, RequestId, RequestPriority, RequestStatus, RequestType,
    };
    use crewflow_core::domain::settings::ApprovalSettings;
    use crewflow_core::notify::InMemoryNotifier;
    use crewflow_core::orgchart::{InMemoryOrgDirectory, OrgMember};
    use crewflow_db::{
        DelegationRepository, InMemoryDelegationRepository, InMemoryRequestRepository,
        InMemorySettingsRepository, RequestRepository, SettingsRepository,
    };

    use super::EscalationScheduler;

    struct Harness {
        scheduler: EscalationScheduler,
        requests: Arc<InMemoryRequestRepository>,
        delegations: Arc<InMemoryDelegationRepository>,
        notifier: InMemoryNotifier,
    }

    async fn harness(settings: ApprovalSettings) -> Harness {
        let requests = Arc::new(InMemoryRequestRepository::default());
        let delegations = Arc::new(InMemoryDelegationRepository::default());
        let settings_repo = Arc::new(InMemorySettingsRepository::default());
        settings_repo.save_versioned(&settings, 0).await.expect("seed settings");

        let directory = Arc::new(InMemoryOrgDirectory::new(vec![
            OrgMember {
                user_id: "u-emp".to_string(),
                manager_id: Some("u-lead".to_string()),
                team: "ops".to_string(),
                admin: false,
            },
            OrgMember {
                user_id: "u-lead".to_string(),
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

        let scheduler = EscalationScheduler::new(
            requests.clone(),
            delegations.clone(),
            settings_repo,
            directory,
            Arc::new(notifier.clone()),
            Arc::new(InMemoryAuditSink::default()),
        );
        Harness { scheduler, requests, delegations, notifier }
    }

    fn stale_request(id: &str, level: u32, hours_old: i64) -> ApprovalRequest {
        let then = Utc::now() - Duration::hours(hours_old);
        ApprovalRequest {
            id: RequestId(id.to_string()),
            request_type: RequestType::Leave,
            requester_id: "u-emp".to_string(),
            status: RequestStatus::Pending,
            priority: RequestPriority::Medium,
            amount: None,
            days: Some(5),
            current_approver_id: Some("u-lead".to_string()),
            escalation_level: level,
            decision_history: Vec::new(),
            version: 1,
            archived: false,
            created_at: then,
            last_state_change_at: then,
            updated_at: then,
        }
    }

    async fn age(requests: &InMemoryRequestRepository, id: &RequestId, hours: i64) {
        let mut request = requests.find_by_id(id).await.expect("find").expect("present");
        let version = request.version;
        request.last_state_change_at = Utc::now() - Duration::hours(hours);
        requests.update_versioned(&request, version, None).await.expect("age");
    }

    #[tokio::test]
    async fn timed_out_request_climbs_the_ladder_and_then_expires() {
        let h = harness(ApprovalSettings::default()).await;
        let request = stale_request("REQ-1", 0, 49);
        h.requests.insert(&request).await.expect("insert");

        let report = h.scheduler.sweep_at(Utc::now()).await.expect("sweep");
        assert_eq!(report.escalated, 1);

        let stored = h.requests.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(stored.escalation_level, 1);
        assert_eq!(stored.status, RequestStatus::Pending, "escalation re-enters pending");
        assert_eq!(stored.current_approver_id.as_deref(), Some("u-head"));
        assert_eq!(stored.decision_history.last().map(|d| d.action), Some(DecisionAction::Escalate));

        age(&h.requests, &request.id, 49).await;
        let report = h.scheduler.sweep_at(Utc::now()).await.expect("sweep");
        assert_eq!(report.escalated, 1);
        let stored = h.requests.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(stored.escalation_level, 2);

        age(&h.requests, &request.id, 49).await;
        let report = h.scheduler.sweep_at(Utc::now()).await.expect("sweep");
        assert_eq!(report.expired, 1);
        let stored = h.requests.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(stored.status, RequestStatus::Expired);
        assert_eq!(h.notifier.events().last().map(|e| e.kind()), Some("request.expired"));
    }

    #[tokio::test]
    async fn fresh_requests_and_disabled_escalation_are_left_alone() {
        let h = harness(ApprovalSettings::default()).await;
        h.requests.insert(&stale_request("REQ-FRESH", 0, 1)).await.expect("insert");

        let report = h.scheduler.sweep_at(Utc::now()).await.expect("sweep");
        assert_eq!(report.escalated + report.expired, 0);

        let mut settings = ApprovalSettings::default();
        settings.escalation.enabled = false;
        let h = harness(settings).await;
        h.requests.insert(&stale_request("REQ-OLD", 0, 10_000)).await.expect("insert");

        let report = h.scheduler.sweep_at(Utc::now()).await.expect("sweep");
        assert_eq!(report.escalated + report.expired, 0);
    }

    #[tokio::test]
    async fn ended_active_delegations_are_marked_expired_and_old_ones_purged() {
        let h = harness(ApprovalSettings::default()).await;
        let now = Utc::now();

        let make = |id: &str, start_days_ago: i64, end_days_ago: i64| Delegation {
            id: DelegationId(id.to_string()),
            delegator_id: "u-lead".to_string(),
            delegate_id: "u-emp".to_string(),
            scope: DelegationScope::default(),
            starts_at: now - Duration::days(start_days_ago),
            ends_at: now - Duration::days(end_days_ago),
            status: DelegationStatus::Active,
            approved_by: None,
            reason: String::new(),
            created_at: now - Duration::days(start_days_ago),
            updated_at: now - Duration::days(start_days_ago),
        };

        h.delegations.save(&make("DLG-ENDED", 10, 1)).await.expect("save");
        h.delegations.save(&make("DLG-ANCIENT", 500, 400)).await.expect("save");

        let report = h.scheduler.sweep_at(now).await.expect("sweep");
        assert_eq!(report.delegations_expired, 2);
        assert_eq!(report.delegations_purged, 1, "only the one past retention is removed");

        let stored = h
            .delegations
            .find_by_id(&DelegationId("DLG-ENDED".to_string()))
            .await
            .expect("find")
            .expect("kept");
        assert_eq!(stored.status, DelegationStatus::Expired);
        assert!(h
            .delegations
            .find_by_id(&DelegationId("DLG-ANCIENT".to_string()))
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn terminal_requests_past_retention_are_archived_in_place() {
        let h = harness(ApprovalSettings::default()).await;
        let mut old = stale_request("REQ-OLD-DONE", 0, 400 * 24);
        old.status = RequestStatus::Rejected;
        h.requests.insert(&old).await.expect("insert");
        let mut recent = stale_request("REQ-RECENT-DONE", 0, 24);
        recent.status = RequestStatus::Approved;
        h.requests.insert(&recent).await.expect("insert");

        let report = h.scheduler.sweep_at(Utc::now()).await.expect("sweep");
        assert_eq!(report.requests_archived, 1);

        let stored = h.requests.find_by_id(&old.id).await.expect("find").expect("kept");
        assert!(stored.archived, "retention archives, never deletes");
        assert_eq!(stored.status, RequestStatus::Rejected);
        assert_eq!(stored.version, 2);

        let stored = h.requests.find_by_id(&recent.id).await.expect("find").expect("present");
        assert!(!stored.archived);
    }

    #[tokio::test]
    async fn terminal_requests_are_never_swept() {
        let h = harness(ApprovalSettings::default()).await;
        let mut request = stale_request("REQ-DONE", 0, 500);
        request.status = RequestStatus::Approved;
        h.requests.insert(&request).await.expect("insert");

        let report = h.scheduler.sweep_at(Utc::now()).await.expect("sweep");
        assert_eq!(report.escalated + report.expired, 0);

        let stored = h.requests.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(stored.status, RequestStatus::Approved);
        assert_eq!(stored.version, 1);
    }
}
