use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use crewflow_core::domain::delegation::{
    Delegation, DelegationId, DelegationScope, DelegationStatus,
};
use crewflow_core::domain::request::{
    ApprovalRequest, DecisionAction, DecisionEvent, RequestId, RequestPriority, RequestStatus,
    RequestType,
};
use crewflow_core::config::DatabaseConfig;
use crewflow_core::domain::settings::ApprovalSettings;
use crewflow_db::{
    connect, migrations, DelegationRepository, RequestFilter, RequestRepository,
    SettingsRepository, SqlDelegationRepository, SqlRequestRepository, SqlSettingsRepository,
};

async fn pool() -> crewflow_db::DbPool {
    let database = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        timeout_secs: 30,
    };
    let pool = connect(&database).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    pool
}

fn expense_request(id: &str) -> ApprovalRequest {
    let now = Utc::now();
    ApprovalRequest {
        id: RequestId(id.to_string()),
        request_type: RequestType::Expense,
        requester_id: "u-emp".to_string(),
        status: RequestStatus::Pending,
        priority: RequestPriority::High,
        amount: Some(Decimal::new(12550, 2)),
        days: None,
        current_approver_id: Some("u-lead".to_string()),
        escalation_level: 0,
        decision_history: Vec::new(),
        version: 1,
        archived: false,
        created_at: now,
        last_state_change_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn request_round_trip_preserves_amount_and_history() {
    let pool = pool().await;
    let repo = SqlRequestRepository::new(pool);

    let request = expense_request("REQ-1");
    repo.insert(&request).await.expect("insert");

    let stored = repo.find_by_id(&request.id).await.expect("find").expect("present");
    assert_eq!(stored.amount, Some(Decimal::new(12550, 2)));
    assert_eq!(stored.status, RequestStatus::Pending);
    assert!(stored.decision_history.is_empty());
}

#[tokio::test]
async fn versioned_update_admits_exactly_one_writer() {
    let pool = pool().await;
    let repo = SqlRequestRepository::new(pool);

    let request = expense_request("REQ-1");
    repo.insert(&request).await.expect("insert");

    let decide = |action: DecisionAction, actor: &str| {
        let mut updated = request.clone();
        updated.status = match action {
            DecisionAction::Approve => RequestStatus::Approved,
            _ => RequestStatus::Rejected,
        };
        updated.version = 2;
        updated.updated_at = Utc::now();
        updated.last_state_change_at = Utc::now();
        let decision = DecisionEvent {
            actor_id: actor.to_string(),
            action,
            comment: None,
            escalation_level: 0,
            version: 2,
            occurred_at: Utc::now(),
        };
        (updated, decision)
    };

    let (approved, approval) = decide(DecisionAction::Approve, "u-lead");
    let won = repo.update_versioned(&approved, 1, Some(&approval)).await.expect("update");
    assert!(won);

    let (rejected, rejection) = decide(DecisionAction::Reject, "u-head");
    let lost = repo.update_versioned(&rejected, 1, Some(&rejection)).await.expect("update");
    assert!(!lost, "second writer against version 1 must lose");

    let stored = repo.find_by_id(&request.id).await.expect("find").expect("present");
    assert_eq!(stored.status, RequestStatus::Approved);
    assert_eq!(stored.version, 2);
    assert_eq!(stored.decision_history.len(), 1);
    assert_eq!(stored.decision_history[0].actor_id, "u-lead");
}

#[tokio::test]
async fn listing_filters_by_status_and_hides_archived_rows() {
    let pool = pool().await;
    let repo = SqlRequestRepository::new(pool);

    let open = expense_request("REQ-OPEN");
    repo.insert(&open).await.expect("insert");

    let mut archived = expense_request("REQ-ARCH");
    archived.status = RequestStatus::Approved;
    archived.archived = true;
    repo.insert(&archived).await.expect("insert");

    let visible = repo.list(&RequestFilter::default()).await.expect("list");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, open.id);

    let all = repo
        .list(&RequestFilter { include_archived: true, ..RequestFilter::default() })
        .await
        .expect("list");
    assert_eq!(all.len(), 2);

    let open_only = repo.list_open().await.expect("list open");
    assert_eq!(open_only.len(), 1);
}

#[tokio::test]
async fn duplicate_probe_sees_only_open_requests_inside_the_window() {
    let pool = pool().await;
    let repo = SqlRequestRepository::new(pool);

    let mut decided = expense_request("REQ-DONE");
    decided.status = RequestStatus::Approved;
    repo.insert(&decided).await.expect("insert");

    let since = Utc::now() - Duration::hours(24);
    let dup = repo
        .find_open_duplicate("u-emp", RequestType::Expense, since)
        .await
        .expect("probe");
    assert_eq!(dup, None, "terminal requests never count as duplicates");

    repo.insert(&expense_request("REQ-LIVE")).await.expect("insert");
    let dup = repo
        .find_open_duplicate("u-emp", RequestType::Expense, since)
        .await
        .expect("probe");
    assert_eq!(dup, Some(RequestId("REQ-LIVE".to_string())));
}

#[tokio::test]
async fn delegation_round_trip_and_retention() {
    let pool = pool().await;
    let repo = SqlDelegationRepository::new(pool);
    let now = Utc::now();

    let delegation = Delegation {
        id: DelegationId("DLG-1".to_string()),
        delegator_id: "u-lead".to_string(),
        delegate_id: "u-peer".to_string(),
        scope: DelegationScope {
            request_types: vec![RequestType::Leave, RequestType::Expense],
            max_escalation_level: Some(1),
        },
        starts_at: now - Duration::days(1),
        ends_at: now + Duration::days(6),
        status: DelegationStatus::Active,
        approved_by: Some("u-head".to_string()),
        reason: "vacation cover".to_string(),
        created_at: now,
        updated_at: now,
    };
    repo.save(&delegation).await.expect("save");

    let stored = repo.find_by_id(&delegation.id).await.expect("find").expect("present");
    assert_eq!(stored, delegation);

    let by_delegator = repo.list_for_delegator("u-lead").await.expect("list");
    assert_eq!(by_delegator.len(), 1);

    let mut ancient = delegation.clone();
    ancient.id = DelegationId("DLG-OLD".to_string());
    ancient.starts_at = now - Duration::days(500);
    ancient.ends_at = now - Duration::days(400);
    ancient.status = DelegationStatus::Expired;
    repo.save(&ancient).await.expect("save");

    let purged = repo.delete_ended_before(now - Duration::days(365)).await.expect("purge");
    assert_eq!(purged, 1);
    assert!(repo.find_by_id(&delegation.id).await.expect("find").is_some());
}

#[tokio::test]
async fn settings_document_is_versioned() {
    let pool = pool().await;
    let repo = SqlSettingsRepository::new(pool);

    assert_eq!(repo.load().await.expect("load"), None);

    let settings = ApprovalSettings::default();
    assert!(repo.save_versioned(&settings, 0).await.expect("create"));
    assert!(!repo.save_versioned(&settings, 0).await.expect("create"), "second create loses");

    let mut next = repo.load().await.expect("load").expect("present");
    next.duplicate_window_hours = 48;
    next.version = 2;
    assert!(repo.save_versioned(&next, 1).await.expect("update"));
    assert!(!repo.save_versioned(&next, 1).await.expect("update"), "stale update loses");

    let stored = repo.load().await.expect("load").expect("present");
    assert_eq!(stored.duplicate_window_hours, 48);
    assert_eq!(stored.version, 2);
}
