use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use crewflow_core::domain::request::{
    ApprovalRequest, DecisionAction, DecisionEvent, RequestId, RequestPriority, RequestStatus,
    RequestType,
};

use super::{RepositoryError, RequestFilter, RequestRepository};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id,
    request_type,
    requester_id,
    status,
    priority,
    amount,
    days,
    current_approver_id,
    escalation_level,
    version,
    archived,
    created_at,
    last_state_change_at,
    updated_at";

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_history(&self, id: &RequestId) -> Result<Vec<DecisionEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT actor_id, action, comment, escalation_level, version, occurred_at
             FROM request_decision
             WHERE request_id = ?
             ORDER BY version ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decision_from_row).collect()
    }

    async fn hydrate(&self, row: SqliteRow) -> Result<ApprovalRequest, RepositoryError> {
        let mut request = request_from_row(row)?;
        request.decision_history = self.load_history(&request.id).await?;
        Ok(request)
    }
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM approval_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, request: &ApprovalRequest) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO approval_request (
                id,
                request_type,
                requester_id,
                status,
                priority,
                amount,
                days,
                current_approver_id,
                escalation_level,
                version,
                archived,
                created_at,
                last_state_change_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(request.request_type.as_str())
        .bind(&request.requester_id)
        .bind(request.status.as_str())
        .bind(request.priority.as_str())
        .bind(request.amount.map(|value| value.to_string()))
        .bind(request.days.map(i64::from))
        .bind(request.current_approver_id.as_deref())
        .bind(i64::from(request.escalation_level))
        .bind(i64::from(request.version))
        .bind(request.archived)
        .bind(request.created_at.to_rfc3339())
        .bind(request.last_state_change_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for decision in &request.decision_history {
            insert_decision(&mut tx, &request.id, decision).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_versioned(
        &self,
        request: &ApprovalRequest,
        expected_version: u32,
        decision: Option<&DecisionEvent>,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE approval_request SET
                status = ?,
                priority = ?,
                current_approver_id = ?,
                escalation_level = ?,
                version = ?,
                archived = ?,
                last_state_change_at = ?,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(request.status.as_str())
        .bind(request.priority.as_str())
        .bind(request.current_approver_id.as_deref())
        .bind(i64::from(request.escalation_level))
        .bind(i64::from(request.version))
        .bind(request.archived)
        .bind(request.last_state_change_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(decision) = decision {
            insert_decision(&mut tx, &request.id, decision).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let mut sql =
            format!("SELECT {REQUEST_COLUMNS} FROM approval_request WHERE 1 = 1");
        if !filter.include_archived {
            sql.push_str(" AND archived = 0");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.requester_id.is_some() {
            sql.push_str(" AND requester_id = ?");
        }
        if filter.approver_id.is_some() {
            sql.push_str(" AND current_approver_id = ?");
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(requester_id) = &filter.requester_id {
            query = query.bind(requester_id);
        }
        if let Some(approver_id) = &filter.approver_id {
            query = query.bind(approver_id);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            requests.push(self.hydrate(row).await?);
        }
        Ok(requests)
    }

    async fn find_open_duplicate(
        &self,
        requester_id: &str,
        request_type: RequestType,
        since: DateTime<Utc>,
    ) -> Result<Option<RequestId>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id FROM approval_request
             WHERE requester_id = ?
               AND request_type = ?
               AND archived = 0
               AND status IN ('submitted', 'pending', 'escalated')
               AND created_at >= ?
             ORDER BY created_at ASC
             LIMIT 1",
        )
        .bind(requester_id)
        .bind(request_type.as_str())
        .bind(since.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| RequestId(row.get("id"))))
    }

    async fn list_open(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM approval_request
             WHERE archived = 0 AND status IN ('submitted', 'pending', 'escalated')
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            requests.push(self.hydrate(row).await?);
        }
        Ok(requests)
    }
}

async fn insert_decision(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    request_id: &RequestId,
    decision: &DecisionEvent,
) -> Result<(), RepositoryError> {
    // (request_id, version) is unique, so the key doubles as the row id.
    sqlx::query(
        "INSERT INTO request_decision (
            id,
            request_id,
            actor_id,
            action,
            comment,
            escalation_level,
            version,
            occurred_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(format!("{}:{}", request_id.0, decision.version))
    .bind(&request_id.0)
    .bind(&decision.actor_id)
    .bind(decision.action.as_str())
    .bind(decision.comment.as_deref())
    .bind(i64::from(decision.escalation_level))
    .bind(i64::from(decision.version))
    .bind(decision.occurred_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn request_from_row(row: SqliteRow) -> Result<ApprovalRequest, RepositoryError> {
    let type_raw = row.try_get::<String, _>("request_type")?;
    let request_type = RequestType::parse(&type_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request type `{type_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_raw}`")))?;

    let priority_raw = row.try_get::<String, _>("priority")?;
    let priority = RequestPriority::parse(&priority_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown request priority `{priority_raw}`"))
    })?;

    Ok(ApprovalRequest {
        id: RequestId(row.try_get("id")?),
        request_type,
        requester_id: row.try_get("requester_id")?,
        status,
        priority,
        amount: parse_optional_decimal("amount", row.try_get("amount")?)?,
        days: row
            .try_get::<Option<i64>, _>("days")?
            .map(|value| parse_u32("days", value))
            .transpose()?,
        current_approver_id: row.try_get("current_approver_id")?,
        escalation_level: parse_u32("escalation_level", row.try_get("escalation_level")?)?,
        decision_history: Vec::new(),
        version: parse_u32("version", row.try_get("version")?)?,
        archived: row.try_get("archived")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        last_state_change_at: parse_timestamp(
            "last_state_change_at",
            row.try_get("last_state_change_at")?,
        )?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn decision_from_row(row: SqliteRow) -> Result<DecisionEvent, RepositoryError> {
    let action_raw = row.try_get::<String, _>("action")?;
    let action = DecisionAction::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown decision action `{action_raw}`")))?;

    Ok(DecisionEvent {
        actor_id: row.try_get("actor_id")?,
        action,
        comment: row.try_get("comment")?,
        escalation_level: parse_u32("escalation_level", row.try_get("escalation_level")?)?,
        version: parse_u32("version", row.try_get("version")?)?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value
        .map(|raw| {
            raw.parse::<Decimal>().map_err(|error| {
                RepositoryError::Decode(format!("invalid decimal in `{column}`: `{raw}` ({error})"))
            })
        })
        .transpose()
}
