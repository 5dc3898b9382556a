use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestType;
use crate::domain::settings::AutoApprovalSettings;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AutoApprovalRefusal {
    Disabled,
    TypeNotAllowed { request_type: RequestType },
    AmountAboveCeiling { amount: Decimal, max_amount: Decimal },
    DaysAboveCeiling { days: u32, max_days: u32 },
}

impl AutoApprovalRefusal {
    fn reason(&self) -> String {
        match self {
            Self::Disabled => "auto-approval is disabled".to_owned(),
            Self::TypeNotAllowed { request_type } => {
                format!("request type `{}` is not auto-approvable", request_type.as_str())
            }
            Self::AmountAboveCeiling { amount, max_amount } => {
                format!("amount {amount} exceeds auto-approval ceiling {max_amount}")
            }
            Self::DaysAboveCeiling { days, max_days } => {
                format!("{days} days exceeds auto-approval ceiling {max_days}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoApprovalOutcome {
    pub eligible: bool,
    pub reason: String,
    pub refusal: Option<AutoApprovalRefusal>,
}

impl AutoApprovalOutcome {
    fn allow(reason: impl Into<String>) -> Self {
        Self { eligible: true, reason: reason.into(), refusal: None }
    }

    fn deny(refusal: AutoApprovalRefusal) -> Self {
        Self { eligible: false, reason: refusal.reason(), refusal: Some(refusal) }
    }
}

/// Auto-approval is evaluated once, at submission time. A later policy change
/// never re-runs it against in-flight requests.
pub fn evaluate(
    settings: &AutoApprovalSettings,
    request_type: RequestType,
    amount: Option<Decimal>,
    days: Option<u32>,
) -> AutoApprovalOutcome {
    if !settings.enabled {
        return AutoApprovalOutcome::deny(AutoApprovalRefusal::Disabled);
    }

    if !settings.allowed_types.contains(&request_type) {
        return AutoApprovalOutcome::deny(AutoApprovalRefusal::TypeNotAllowed { request_type });
    }

    if let (Some(amount), Some(max_amount)) = (amount, settings.max_amount) {
        if amount > max_amount {
            return AutoApprovalOutcome::deny(AutoApprovalRefusal::AmountAboveCeiling {
                amount,
                max_amount,
            });
        }
    }

    if let (Some(days), Some(max_days)) = (days, settings.max_days) {
        if days > max_days {
            return AutoApprovalOutcome::deny(AutoApprovalRefusal::DaysAboveCeiling {
                days,
                max_days,
            });
        }
    }

    AutoApprovalOutcome::allow(format!(
        "`{}` within policy ceilings, no human decision required",
        request_type.as_str()
    ))
}
