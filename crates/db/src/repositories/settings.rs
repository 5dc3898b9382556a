use chrono::Utc;
use sqlx::Row;

use crewflow_core::domain::settings::ApprovalSettings;

use super::request::parse_u32;
use super::{RepositoryError, SettingsRepository};
use crate::DbPool;

/// Settings live in a single-row table as a JSON document plus a version
/// counter for optimistic concurrency. The document keeps its own copy of
/// the version so callers can echo it back on update.
pub struct SqlSettingsRepository {
    pool: DbPool,
}

impl SqlSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SettingsRepository for SqlSettingsRepository {
    async fn load(&self) -> Result<Option<ApprovalSettings>, RepositoryError> {
        let row = sqlx::query("SELECT document, version FROM approval_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let document = row.try_get::<String, _>("document")?;
        let mut settings: ApprovalSettings = serde_json::from_str(&document).map_err(|error| {
            RepositoryError::Decode(format!("invalid settings document: {error}"))
        })?;
        settings.version = parse_u32("version", row.try_get("version")?)?;

        Ok(Some(settings))
    }

    async fn save_versioned(
        &self,
        settings: &ApprovalSettings,
        expected_version: u32,
    ) -> Result<bool, RepositoryError> {
        let document = serde_json::to_string(settings).map_err(|error| {
            RepositoryError::Decode(format!("could not encode settings document: {error}"))
        })?;
        let now = Utc::now().to_rfc3339();

        if expected_version == 0 {
            let result = sqlx::query(
                "INSERT INTO approval_settings (id, document, version, updated_at)
                 VALUES (1, ?, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(&document)
            .bind(i64::from(settings.version))
            .bind(&now)
            .execute(&self.pool)
            .await?;

            return Ok(result.rows_affected() == 1);
        }

        let result = sqlx::query(
            "UPDATE approval_settings
             SET document = ?, version = ?, updated_at = ?
             WHERE id = 1 AND version = ?",
        )
        .bind(&document)
        .bind(i64::from(settings.version))
        .bind(&now)
        .bind(i64::from(expected_version))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
