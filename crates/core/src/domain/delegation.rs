use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestType;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Requested,
    PendingApproval,
    Active,
    Rejected,
    Expired,
    Revoked,
}

impl DelegationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::PendingApproval => "pending_approval",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "requested" => Some(Self::Requested),
            "pending_approval" => Some(Self::PendingApproval),
            "active" => Some(Self::Active),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

/// What a delegation covers: a set of request types (empty = all) and an
/// optional ceiling on the escalation level it applies at.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationScope {
    pub request_types: Vec<RequestType>,
    pub max_escalation_level: Option<u32>,
}

impl DelegationScope {
    pub fn covers(&self, request_type: RequestType, escalation_level: u32) -> bool {
        let type_covered =
            self.request_types.is_empty() || self.request_types.contains(&request_type);
        let level_covered =
            self.max_escalation_level.map_or(true, |max| escalation_level <= max);
        type_covered && level_covered
    }

    /// Two scopes overlap when any request type is covered by both at some
    /// shared level. Empty type lists are wildcards and overlap everything.
    pub fn overlaps(&self, other: &DelegationScope) -> bool {
        let types_overlap = self.request_types.is_empty()
            || other.request_types.is_empty()
            || self.request_types.iter().any(|t| other.request_types.contains(t));
        // Level ranges both start at 0, so they always share level 0.
        types_overlap
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub id: DelegationId,
    pub delegator_id: String,
    pub delegate_id: String,
    pub scope: DelegationScope,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: DelegationStatus,
    pub approved_by: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delegation {
    /// Lazy-expiration predicate: a delegation only confers authority while
    /// its stored status is `active` AND `now` falls inside its window. Read
    /// paths must use this rather than trusting the stored status, since the
    /// bookkeeping sweep marks `expired` only periodically.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == DelegationStatus::Active && self.starts_at <= now && now < self.ends_at
    }

    /// Whether two delegations would hold authority at the same instant.
    pub fn window_overlaps(&self, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
        self.starts_at < ends_at && starts_at < self.ends_at
    }
}
