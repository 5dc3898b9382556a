use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestType;

/// Who is allowed to receive a delegation, relative to the delegator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhoCanBeDelegated {
    /// Anyone in the delegator's own team.
    SameTeam,
    /// Only someone above the delegator in the reporting chain.
    UpperLeader,
    /// Any user in the directory.
    Anyone,
}

impl WhoCanBeDelegated {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameTeam => "same_team",
            Self::UpperLeader => "upper_leader",
            Self::Anyone => "anyone",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "same_team" => Some(Self::SameTeam),
            "upper_leader" => Some(Self::UpperLeader),
            "anyone" => Some(Self::Anyone),
            _ => None,
        }
    }
}

/// Which party approves a delegation when `require_approval` is set.
///
/// `Delegate` means the delegate themselves must accept the delegation
/// before it activates; the other values route to a supervising party.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhoApprovesDelegation {
    Delegate,
    UpperLeader,
    TopLeader,
    Admin,
}

impl WhoApprovesDelegation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delegate => "delegate",
            Self::UpperLeader => "upper_leader",
            Self::TopLeader => "top_leader",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "delegate" => Some(Self::Delegate),
            "upper_leader" => Some(Self::UpperLeader),
            "top_leader" => Some(Self::TopLeader),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationSettings {
    pub who_can_be_delegated: WhoCanBeDelegated,
    pub require_approval: bool,
    pub who_approves: WhoApprovesDelegation,
    /// When set, a delegation whose delegate sits above the delegator in the
    /// reporting chain activates without approval.
    pub auto_approve_for_upper_leaders: bool,
    pub allow_multiple: bool,
    pub max_duration_days: u32,
    /// Delegation records whose window ended more than this many days ago
    /// are purged by the bookkeeping sweep.
    pub retention_days: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoApprovalSettings {
    pub enabled: bool,
    pub allowed_types: Vec<RequestType>,
    pub max_amount: Option<Decimal>,
    pub max_days: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationSettings {
    pub enabled: bool,
    pub timeout_hours: u32,
    /// Number of escalation levels, including level 0.
    pub levels: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub on_submitted: bool,
    pub on_decided: bool,
    pub on_escalated: bool,
    pub on_delegation: bool,
}

/// The tenant-wide policy record. Exactly one exists per deployment; updates
/// are whole-record replacements guarded by the `version` counter, so a
/// half-configured state can never be observed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSettings {
    pub allow_self_approval: bool,
    pub allow_delegation: bool,
    pub delegation: DelegationSettings,
    pub auto_approval: AutoApprovalSettings,
    pub escalation: EscalationSettings,
    pub notifications: NotificationSettings,
    /// Open requests from the same requester with the same type within this
    /// window are duplicates. Zero disables the check.
    pub duplicate_window_hours: u32,
    pub version: u32,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            allow_self_approval: false,
            allow_delegation: true,
            delegation: DelegationSettings {
                who_can_be_delegated: WhoCanBeDelegated::SameTeam,
                require_approval: true,
                who_approves: WhoApprovesDelegation::UpperLeader,
                auto_approve_for_upper_leaders: false,
                allow_multiple: false,
                max_duration_days: 30,
                retention_days: 365,
            },
            auto_approval: AutoApprovalSettings {
                enabled: false,
                allowed_types: Vec::new(),
                max_amount: None,
                max_days: None,
            },
            escalation: EscalationSettings { enabled: true, timeout_hours: 48, levels: 3 },
            notifications: NotificationSettings {
                on_submitted: true,
                on_decided: true,
                on_escalated: true,
                on_delegation: true,
            },
            duplicate_window_hours: 24,
            version: 1,
        }
    }
}

impl ApprovalSettings {
    /// Structural validation applied before a replacement is accepted.
    pub fn validate(&self) -> Result<(), String> {
        if self.escalation.enabled && self.escalation.levels == 0 {
            return Err("escalation.levels must be at least 1 when escalation is enabled".into());
        }
        if self.escalation.enabled && self.escalation.timeout_hours == 0 {
            return Err("escalation.timeout_hours must be positive when escalation is enabled".into());
        }
        if self.allow_delegation && self.delegation.max_duration_days == 0 {
            return Err("delegation.max_duration_days must be positive when delegation is enabled".into());
        }
        if self.auto_approval.enabled && self.auto_approval.allowed_types.is_empty() {
            return Err("auto_approval.allowed_types must not be empty when auto-approval is enabled".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ApprovalSettings, WhoApprovesDelegation, WhoCanBeDelegated};
    use crate::domain::request::RequestType;

    #[test]
    fn default_settings_are_valid() {
        assert_eq!(ApprovalSettings::default().validate(), Ok(()));
    }

    #[test]
    fn enabled_escalation_requires_positive_timeout_and_levels() {
        let mut settings = ApprovalSettings::default();
        settings.escalation.levels = 0;
        assert!(settings.validate().is_err());

        let mut settings = ApprovalSettings::default();
        settings.escalation.timeout_hours = 0;
        assert!(settings.validate().is_err());

        let mut settings = ApprovalSettings::default();
        settings.escalation.enabled = false;
        settings.escalation.timeout_hours = 0;
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn enabled_auto_approval_requires_at_least_one_allowed_type() {
        let mut settings = ApprovalSettings::default();
        settings.auto_approval.enabled = true;
        assert!(settings.validate().is_err());

        settings.auto_approval.allowed_types = vec![RequestType::Leave];
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn policy_enums_round_trip_from_storage_encoding() {
        for value in [
            WhoCanBeDelegated::SameTeam,
            WhoCanBeDelegated::UpperLeader,
            WhoCanBeDelegated::Anyone,
        ] {
            assert_eq!(WhoCanBeDelegated::parse(value.as_str()), Some(value));
        }

        for value in [
            WhoApprovesDelegation::Delegate,
            WhoApprovesDelegation::UpperLeader,
            WhoApprovesDelegation::TopLeader,
            WhoApprovesDelegation::Admin,
        ] {
            assert_eq!(WhoApprovesDelegation::parse(value.as_str()), Some(value));
        }
    }
}
