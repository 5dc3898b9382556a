use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::delegation::{Delegation, DelegationScope, DelegationStatus};
use crate::domain::settings::{ApprovalSettings, WhoApprovesDelegation, WhoCanBeDelegated};
use crate::errors::WorkflowError;
use crate::orgchart::OrgDirectory;

/// A delegation request before it exists in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationProposal {
    pub delegator_id: String,
    pub delegate_id: String,
    pub scope: DelegationScope,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// How a validated proposal enters the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelegationDisposition {
    /// Policy lets the delegation activate immediately.
    ActivateImmediately,
    /// The delegation waits for the resolved approving party.
    AwaitApproval { approver: DelegationApprover },
}

/// The party allowed to decide a pending delegation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelegationApprover {
    User { user_id: String },
    AnyAdmin,
}

/// Validate a proposal against policy and the delegator's existing
/// delegations, and decide how it enters the store.
pub fn validate_proposal<D>(
    directory: &D,
    settings: &ApprovalSettings,
    proposal: &DelegationProposal,
    existing: &[Delegation],
    now: DateTime<Utc>,
) -> Result<DelegationDisposition, WorkflowError>
where
    D: OrgDirectory + ?Sized,
{
    if !settings.allow_delegation {
        return Err(WorkflowError::forbidden(
            proposal.delegator_id.clone(),
            "delegate approval authority: delegation is disabled by policy",
        ));
    }

    if proposal.delegator_id == proposal.delegate_id {
        return Err(WorkflowError::DelegationScopeViolation {
            reason: "delegator and delegate must be different users".to_owned(),
        });
    }

    check_delegate_scope(directory, settings, proposal)?;
    check_duration(settings, proposal)?;
    check_overlap(settings, proposal, existing, now)?;

    let policy = &settings.delegation;
    if !policy.require_approval {
        return Ok(DelegationDisposition::ActivateImmediately);
    }

    if policy.auto_approve_for_upper_leaders
        && directory.is_upper_leader(&proposal.delegate_id, &proposal.delegator_id)
    {
        return Ok(DelegationDisposition::ActivateImmediately);
    }

    let approver = match policy.who_approves {
        WhoApprovesDelegation::Delegate => {
            DelegationApprover::User { user_id: proposal.delegate_id.clone() }
        }
        WhoApprovesDelegation::UpperLeader => match directory.manager_of(&proposal.delegator_id) {
            Some(manager) => DelegationApprover::User { user_id: manager },
            None => DelegationApprover::AnyAdmin,
        },
        WhoApprovesDelegation::TopLeader => {
            match directory.top_leader_for(&proposal.delegator_id) {
                Some(leader) => DelegationApprover::User { user_id: leader },
                None => DelegationApprover::AnyAdmin,
            }
        }
        WhoApprovesDelegation::Admin => DelegationApprover::AnyAdmin,
    };

    Ok(DelegationDisposition::AwaitApproval { approver })
}

/// Re-resolve who may decide an already-stored pending delegation.
pub fn resolve_delegation_approver<D>(
    directory: &D,
    settings: &ApprovalSettings,
    delegation: &Delegation,
) -> DelegationApprover
where
    D: OrgDirectory + ?Sized,
{
    match settings.delegation.who_approves {
        WhoApprovesDelegation::Delegate => {
            DelegationApprover::User { user_id: delegation.delegate_id.clone() }
        }
        WhoApprovesDelegation::UpperLeader => match directory.manager_of(&delegation.delegator_id)
        {
            Some(manager) => DelegationApprover::User { user_id: manager },
            None => DelegationApprover::AnyAdmin,
        },
        WhoApprovesDelegation::TopLeader => {
            match directory.top_leader_for(&delegation.delegator_id) {
                Some(leader) => DelegationApprover::User { user_id: leader },
                None => DelegationApprover::AnyAdmin,
            }
        }
        WhoApprovesDelegation::Admin => DelegationApprover::AnyAdmin,
    }
}

/// Whether an actor may approve or reject a pending delegation.
pub fn may_decide_delegation<D>(
    directory: &D,
    settings: &ApprovalSettings,
    delegation: &Delegation,
    actor_id: &str,
) -> bool
where
    D: OrgDirectory + ?Sized,
{
    match resolve_delegation_approver(directory, settings, delegation) {
        DelegationApprover::User { user_id } => user_id == actor_id || directory.is_admin(actor_id),
        DelegationApprover::AnyAdmin => directory.is_admin(actor_id),
    }
}

fn check_delegate_scope<D>(
    directory: &D,
    settings: &ApprovalSettings,
    proposal: &DelegationProposal,
) -> Result<(), WorkflowError>
where
    D: OrgDirectory + ?Sized,
{
    let allowed = match settings.delegation.who_can_be_delegated {
        WhoCanBeDelegated::Anyone => true,
        WhoCanBeDelegated::SameTeam => {
            directory.same_team(&proposal.delegator_id, &proposal.delegate_id)
        }
        WhoCanBeDelegated::UpperLeader => {
            directory.is_upper_leader(&proposal.delegate_id, &proposal.delegator_id)
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::DelegationScopeViolation {
            reason: format!(
                "delegate `{}` is outside the `{}` scope for `{}`",
                proposal.delegate_id,
                settings.delegation.who_can_be_delegated.as_str(),
                proposal.delegator_id
            ),
        })
    }
}

fn check_duration(
    settings: &ApprovalSettings,
    proposal: &DelegationProposal,
) -> Result<(), WorkflowError> {
    if proposal.ends_at <= proposal.starts_at {
        return Err(WorkflowError::DelegationLimitExceeded {
            reason: "delegation must end after it starts".to_owned(),
        });
    }

    let max = Duration::days(i64::from(settings.delegation.max_duration_days));
    if proposal.ends_at - proposal.starts_at > max {
        return Err(WorkflowError::DelegationLimitExceeded {
            reason: format!(
                "duration exceeds the {}-day maximum",
                settings.delegation.max_duration_days
            ),
        });
    }

    Ok(())
}

fn check_overlap(
    settings: &ApprovalSettings,
    proposal: &DelegationProposal,
    existing: &[Delegation],
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    if settings.delegation.allow_multiple {
        return Ok(());
    }

    // A stored delegation conflicts whenever its window could still hold
    // authority at the same instant as the proposal, including windows that
    // only begin in the future. Lapsed records are skipped even when the
    // bookkeeping sweep has not yet marked them expired.
    let conflict = existing
        .iter()
        .filter(|delegation| delegation.delegator_id == proposal.delegator_id)
        .filter(|delegation| {
            matches!(
                delegation.status,
                DelegationStatus::Active | DelegationStatus::PendingApproval
            )
        })
        .filter(|delegation| delegation.ends_at > now)
        .filter(|delegation| delegation.window_overlaps(proposal.starts_at, proposal.ends_at))
        .find(|delegation| delegation.scope.overlaps(&proposal.scope));

    match conflict {
        Some(delegation) => Err(WorkflowError::DelegationLimitExceeded {
            reason: format!(
                "an active delegation `{}` with overlapping scope already exists",
                delegation.id.0
            ),
        }),
        None => Ok(()),
    }
}
