use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use crewflow_core::domain::delegation::{
    Delegation, DelegationId, DelegationScope, DelegationStatus,
};
use crewflow_core::domain::request::RequestType;

use super::request::{parse_timestamp, parse_u32};
use super::{DelegationRepository, RepositoryError};
use crate::DbPool;

const DELEGATION_COLUMNS: &str = "id,
    delegator_id,
    delegate_id,
    request_types_json,
    max_escalation_level,
    starts_at,
    ends_at,
    status,
    approved_by,
    reason,
    created_at,
    updated_at";

pub struct SqlDelegationRepository {
    pool: DbPool,
}

impl SqlDelegationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DelegationRepository for SqlDelegationRepository {
    async fn find_by_id(&self, id: &DelegationId) -> Result<Option<Delegation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DELEGATION_COLUMNS} FROM delegation WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(delegation_from_row).transpose()
    }

    async fn save(&self, delegation: &Delegation) -> Result<(), RepositoryError> {
        let request_types_json =
            serde_json::to_string(&delegation.scope.request_types).map_err(|error| {
                RepositoryError::Decode(format!("could not encode request types: {error}"))
            })?;

        sqlx::query(
            "INSERT INTO delegation (
                id,
                delegator_id,
                delegate_id,
                request_types_json,
                max_escalation_level,
                starts_at,
                ends_at,
                status,
                approved_by,
                reason,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                delegator_id = excluded.delegator_id,
                delegate_id = excluded.delegate_id,
                request_types_json = excluded.request_types_json,
                max_escalation_level = excluded.max_escalation_level,
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at,
                status = excluded.status,
                approved_by = excluded.approved_by,
                reason = excluded.reason,
                updated_at = excluded.updated_at",
        )
        .bind(&delegation.id.0)
        .bind(&delegation.delegator_id)
        .bind(&delegation.delegate_id)
        .bind(request_types_json)
        .bind(delegation.scope.max_escalation_level.map(i64::from))
        .bind(delegation.starts_at.to_rfc3339())
        .bind(delegation.ends_at.to_rfc3339())
        .bind(delegation.status.as_str())
        .bind(delegation.approved_by.as_deref())
        .bind(&delegation.reason)
        .bind(delegation.created_at.to_rfc3339())
        .bind(delegation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_delegator(
        &self,
        delegator_id: &str,
    ) -> Result<Vec<Delegation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DELEGATION_COLUMNS} FROM delegation
             WHERE delegator_id = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(delegator_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(delegation_from_row).collect()
    }

    async fn list_by_status(
        &self,
        status: DelegationStatus,
    ) -> Result<Vec<Delegation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DELEGATION_COLUMNS} FROM delegation
             WHERE status = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(delegation_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<Delegation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DELEGATION_COLUMNS} FROM delegation ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(delegation_from_row).collect()
    }

    async fn delete_ended_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM delegation WHERE ends_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn delegation_from_row(row: SqliteRow) -> Result<Delegation, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = DelegationStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown delegation status `{status_raw}`"))
    })?;

    let types_raw = row.try_get::<String, _>("request_types_json")?;
    let request_types: Vec<RequestType> = serde_json::from_str(&types_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid request types `{types_raw}` ({error})"))
    })?;

    Ok(Delegation {
        id: DelegationId(row.try_get("id")?),
        delegator_id: row.try_get("delegator_id")?,
        delegate_id: row.try_get("delegate_id")?,
        scope: DelegationScope {
            request_types,
            max_escalation_level: row
                .try_get::<Option<i64>, _>("max_escalation_level")?
                .map(|value| parse_u32("max_escalation_level", value))
                .transpose()?,
        },
        starts_at: parse_timestamp("starts_at", row.try_get("starts_at")?)?,
        ends_at: parse_timestamp("ends_at", row.try_get("ends_at")?)?,
        status,
        approved_by: row.try_get("approved_by")?,
        reason: row.try_get("reason")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
