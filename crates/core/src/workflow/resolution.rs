use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::delegation::{Delegation, DelegationId};
use crate::domain::request::RequestType;
use crate::errors::WorkflowError;
use crate::orgchart::OrgDirectory;

/// Result of effective-approver resolution for one request at one level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverResolution {
    pub effective_approver_id: String,
    pub nominal_approver_id: String,
    /// Set when an active delegation redirected authority to a delegate.
    pub delegation_id: Option<DelegationId>,
}

impl ApproverResolution {
    pub fn is_delegated(&self) -> bool {
        self.delegation_id.is_some()
    }
}

/// Resolve who may decide a request right now.
///
/// The nominal approver comes from the org chart. If an active delegation
/// (checked lazily against `now`, never trusting a stale `active` status)
/// covers this request type and level with the nominal approver as
/// delegator, the delegate becomes the effective approver. Expired or
/// non-covering delegations fall back to the nominal approver.
pub fn resolve_effective_approver<D>(
    directory: &D,
    requester_id: &str,
    request_type: RequestType,
    escalation_level: u32,
    delegations: &[Delegation],
    now: DateTime<Utc>,
) -> Result<ApproverResolution, WorkflowError>
where
    D: OrgDirectory + ?Sized,
{
    let nominal = directory
        .approver_for(requester_id, escalation_level)
        .ok_or_else(|| WorkflowError::not_found("approver", requester_id))?;

    let delegated = delegations
        .iter()
        .filter(|delegation| delegation.delegator_id == nominal)
        .filter(|delegation| delegation.is_active_at(now))
        .find(|delegation| delegation.scope.covers(request_type, escalation_level));

    match delegated {
        Some(delegation) => Ok(ApproverResolution {
            effective_approver_id: delegation.delegate_id.clone(),
            nominal_approver_id: nominal,
            delegation_id: Some(delegation.id.clone()),
        }),
        None => Ok(ApproverResolution {
            effective_approver_id: nominal.clone(),
            nominal_approver_id: nominal,
            delegation_id: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::resolve_effective_approver;
    use crate::domain::delegation::{Delegation, DelegationId, DelegationScope, DelegationStatus};
    use crate::domain::request::RequestType;
    use crate::errors::WorkflowError;
    use crate::orgchart::{InMemoryOrgDirectory, OrgMember};

    fn directory() -> InMemoryOrgDirectory {
        InMemoryOrgDirectory::new(vec![
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
        ])
    }

    fn leave_delegation(status: DelegationStatus, start_days: i64, end_days: i64) -> Delegation {
        let now = Utc::now();
        Delegation {
            id: DelegationId("DLG-1".to_string()),
            delegator_id: "u-lead".to_string(),
            delegate_id: "u-peer".to_string(),
            scope: DelegationScope {
                request_types: vec![RequestType::Leave],
                max_escalation_level: None,
            },
            starts_at: now + Duration::days(start_days),
            ends_at: now + Duration::days(end_days),
            status,
            approved_by: None,
            reason: "vacation cover".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn without_delegations_the_nominal_approver_is_effective() {
        let resolution = resolve_effective_approver(
            &directory(),
            "u-emp",
            RequestType::Leave,
            0,
            &[],
            Utc::now(),
        )
        .expect("resolution");

        assert_eq!(resolution.effective_approver_id, "u-lead");
        assert_eq!(resolution.nominal_approver_id, "u-lead");
        assert!(!resolution.is_delegated());
    }

    #[test]
    fn active_covering_delegation_redirects_to_the_delegate() {
        let delegation = leave_delegation(DelegationStatus::Active, -1, 10);
        let resolution = resolve_effective_approver(
            &directory(),
            "u-emp",
            RequestType::Leave,
            0,
            &[delegation],
            Utc::now(),
        )
        .expect("resolution");

        assert_eq!(resolution.effective_approver_id, "u-peer");
        assert_eq!(resolution.nominal_approver_id, "u-lead");
        assert_eq!(resolution.delegation_id, Some(DelegationId("DLG-1".to_string())));
    }

    #[test]
    fn ended_delegation_falls_back_to_the_nominal_even_if_status_still_reads_active() {
        // The bookkeeping sweep has not yet marked this one expired.
        let delegation = leave_delegation(DelegationStatus::Active, -10, -1);
        let resolution = resolve_effective_approver(
            &directory(),
            "u-emp",
            RequestType::Leave,
            0,
            &[delegation],
            Utc::now(),
        )
        .expect("resolution");

        assert_eq!(resolution.effective_approver_id, "u-lead");
        assert!(!resolution.is_delegated());
    }

    #[test]
    fn delegation_outside_scope_does_not_apply() {
        let delegation = leave_delegation(DelegationStatus::Active, -1, 10);
        let resolution = resolve_effective_approver(
            &directory(),
            "u-emp",
            RequestType::Expense,
            0,
            &[delegation],
            Utc::now(),
        )
        .expect("resolution");

        assert_eq!(resolution.effective_approver_id, "u-lead");
    }

    #[test]
    fn pending_delegation_confers_no_authority() {
        let delegation = leave_delegation(DelegationStatus::PendingApproval, -1, 10);
        let resolution = resolve_effective_approver(
            &directory(),
            "u-emp",
            RequestType::Leave,
            0,
            &[delegation],
            Utc::now(),
        )
        .expect("resolution");

        assert_eq!(resolution.effective_approver_id, "u-lead");
    }

    #[test]
    fn escalated_level_resolves_against_the_higher_approver() {
        // The delegation covers u-lead; at level 1 the nominal is u-head,
        // so the delegation no longer matches.
        let delegation = leave_delegation(DelegationStatus::Active, -1, 10);
        let resolution = resolve_effective_approver(
            &directory(),
            "u-emp",
            RequestType::Leave,
            1,
            &[delegation],
            Utc::now(),
        )
        .expect("resolution");

        assert_eq!(resolution.effective_approver_id, "u-head");
    }

    #[test]
    fn unknown_requester_fails_with_not_found() {
        let error = resolve_effective_approver(
            &directory(),
            "u-ghost",
            RequestType::Leave,
            0,
            &[],
            Utc::now(),
        )
        .expect_err("no approver");

        assert!(matches!(error, WorkflowError::NotFound { entity: "approver", .. }));
    }
}
