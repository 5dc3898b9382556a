use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Request categories recognized by the engine. The set is open at the API
/// boundary: unknown strings are rejected with `InvalidRequestType` before a
/// request is ever created, and `Other` exists for requests that need manual
/// review but fit no named category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Leave,
    ScheduleChange,
    Expense,
    Other,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::ScheduleChange => "schedule_change",
            Self::Expense => "expense",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leave" => Some(Self::Leave),
            "schedule_change" => Some(Self::ScheduleChange),
            "expense" => Some(Self::Expense),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl RequestPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Submitted,
    Pending,
    Approved,
    Rejected,
    Escalated,
    AutoApproved,
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Escalated => "escalated",
            Self::AutoApproved => "auto_approved",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "escalated" => Some(Self::Escalated),
            "auto_approved" => Some(Self::AutoApproved),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Terminal requests are immutable: no decision, escalation, or expiry
    /// may touch them again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::AutoApproved | Self::Expired)
    }

    /// Open requests are awaiting a decision.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Submitted | Self::Pending | Self::Escalated)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approve,
    Reject,
    AutoApprove,
    Escalate,
    Expire,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::AutoApprove => "auto_approve",
            Self::Escalate => "escalate",
            Self::Expire => "expire",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "auto_approve" => Some(Self::AutoApprove),
            "escalate" => Some(Self::Escalate),
            "expire" => Some(Self::Expire),
            _ => None,
        }
    }
}

/// One entry in a request's decision history. `version` is the request
/// version the entry was committed under; the store enforces uniqueness per
/// (request, version), so a double decision can never be recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub actor_id: String,
    pub action: DecisionAction,
    pub comment: Option<String>,
    pub escalation_level: u32,
    pub version: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub request_type: RequestType,
    pub requester_id: String,
    pub status: RequestStatus,
    pub priority: RequestPriority,
    /// Monetary magnitude for expense-like requests.
    pub amount: Option<Decimal>,
    /// Day count for leave-like requests.
    pub days: Option<u32>,
    pub current_approver_id: Option<String>,
    pub escalation_level: u32,
    pub decision_history: Vec<DecisionEvent>,
    /// Optimistic-concurrency counter; starts at 1, bumped on every commit.
    pub version: u32,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub last_state_change_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalRequest {
    /// Magnitude relevant to auto-approval day ceilings.
    pub fn day_magnitude(&self) -> Option<u32> {
        self.days
    }

    /// Magnitude relevant to auto-approval amount ceilings.
    pub fn amount_magnitude(&self) -> Option<Decimal> {
        self.amount
    }
}
