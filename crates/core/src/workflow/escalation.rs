use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::ApprovalRequest;
use crate::domain::settings::EscalationSettings;

/// What the scheduler should do with one pending request at one instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// Timeout not reached, or escalation disabled: leave the request alone.
    Hold,
    /// Advance to the next level and re-resolve the approver.
    Escalate { next_level: u32 },
    /// Already at the top level and the timeout elapsed again: terminal.
    Expire,
}

/// Pure timeout evaluation. The escalation path is derived from the settings
/// at evaluation time, so policy changes affect in-flight requests going
/// forward without rewriting their history.
pub fn evaluate(
    request: &ApprovalRequest,
    settings: &EscalationSettings,
    now: DateTime<Utc>,
) -> EscalationOutcome {
    if !settings.enabled || !request.status.is_open() {
        return EscalationOutcome::Hold;
    }

    let timeout = Duration::hours(i64::from(settings.timeout_hours));
    if now - request.last_state_change_at < timeout {
        return EscalationOutcome::Hold;
    }

    let max_level = settings.levels.saturating_sub(1);
    if request.escalation_level < max_level {
        EscalationOutcome::Escalate { next_level: request.escalation_level + 1 }
    } else {
        EscalationOutcome::Expire
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{evaluate, EscalationOutcome};
    use crate::domain::request::{
        ApprovalRequest, RequestId, RequestPriority, RequestStatus, RequestType,
    };
    use crate::domain::settings::EscalationSettings;

    fn pending_request(level: u32, hours_since_change: i64) -> ApprovalRequest {
        let now = Utc::now();
        ApprovalRequest {
            id: RequestId("REQ-1".to_string()),
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
            created_at: now - Duration::hours(hours_since_change),
            last_state_change_at: now - Duration::hours(hours_since_change),
            updated_at: now - Duration::hours(hours_since_change),
        }
    }

    fn settings() -> EscalationSettings {
        EscalationSettings { enabled: true, timeout_hours: 48, levels: 3 }
    }

    #[test]
    fn fresh_request_holds() {
        let outcome = evaluate(&pending_request(0, 1), &settings(), Utc::now());
        assert_eq!(outcome, EscalationOutcome::Hold);
    }

    #[test]
    fn timed_out_request_below_max_level_escalates_one_level() {
        let outcome = evaluate(&pending_request(0, 49), &settings(), Utc::now());
        assert_eq!(outcome, EscalationOutcome::Escalate { next_level: 1 });

        let outcome = evaluate(&pending_request(1, 49), &settings(), Utc::now());
        assert_eq!(outcome, EscalationOutcome::Escalate { next_level: 2 });
    }

    #[test]
    fn timed_out_request_at_max_level_expires() {
        let outcome = evaluate(&pending_request(2, 49), &settings(), Utc::now());
        assert_eq!(outcome, EscalationOutcome::Expire);
    }

    #[test]
    fn disabled_escalation_holds_indefinitely() {
        let mut settings = settings();
        settings.enabled = false;

        let outcome = evaluate(&pending_request(0, 10_000), &settings, Utc::now());
        assert_eq!(outcome, EscalationOutcome::Hold);
    }

    #[test]
    fn terminal_request_is_never_touched() {
        let mut request = pending_request(0, 49);
        request.status = RequestStatus::Approved;

        assert_eq!(evaluate(&request, &settings(), Utc::now()), EscalationOutcome::Hold);
    }

    #[test]
    fn single_level_ladder_expires_on_first_timeout() {
        let mut settings = settings();
        settings.levels = 1;

        let outcome = evaluate(&pending_request(0, 49), &settings, Utc::now());
        assert_eq!(outcome, EscalationOutcome::Expire);
    }
}
