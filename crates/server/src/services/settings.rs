use std::sync::Arc;

use tracing::info;

use crewflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crewflow_core::domain::settings::ApprovalSettings;
use crewflow_core::errors::{ApplicationError, WorkflowError};
use crewflow_core::orgchart::OrgDirectory;
use crewflow_db::SettingsRepository;

use super::persistence;

/// Tenant policy reads and versioned replacement.
pub struct SettingsService {
    settings: Arc<dyn SettingsRepository>,
    directory: Arc<dyn OrgDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl SettingsService {
    pub fn new(
        settings: Arc<dyn SettingsRepository>,
        directory: Arc<dyn OrgDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { settings, directory, audit }
    }

    /// Current settings, creating the default record on first read.
    pub async fn get(&self) -> Result<ApprovalSettings, ApplicationError> {
        if let Some(settings) = self.settings.load().await.map_err(persistence)? {
            return Ok(settings);
        }

        let defaults = ApprovalSettings::default();
        // A concurrent first reader may win the creation race; either way
        // the stored record is what we return.
        self.settings.save_versioned(&defaults, 0).await.map_err(persistence)?;
        self.settings
            .load()
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::Configuration("settings record vanished".to_owned()))
    }

    /// Whole-record replacement guarded by the version the caller read.
    pub async fn update(
        &self,
        actor_id: &str,
        mut replacement: ApprovalSettings,
        expected_version: u32,
        correlation_id: &str,
    ) -> Result<ApprovalSettings, ApplicationError> {
        if !self.directory.is_admin(actor_id) {
            return Err(WorkflowError::forbidden(actor_id, "change approval settings").into());
        }
        if let Err(reason) = replacement.validate() {
            return Err(WorkflowError::InvalidSettings { reason }.into());
        }

        let current = self.get().await?;
        if expected_version != current.version {
            return Err(WorkflowError::StaleRequestVersion {
                supplied: expected_version,
                current: current.version,
            }
            .into());
        }

        replacement.version = expected_version + 1;
        let won = self
            .settings
            .save_versioned(&replacement, expected_version)
            .await
            .map_err(persistence)?;
        if !won {
            let current = self.get().await?;
            return Err(WorkflowError::StaleRequestVersion {
                supplied: expected_version,
                current: current.version,
            }
            .into());
        }

        self.audit.emit(
            AuditEvent::new(
                None,
                correlation_id,
                "settings.updated",
                AuditCategory::Policy,
                actor_id,
                AuditOutcome::Success,
            )
            .with_metadata("version", replacement.version.to_string()),
        );
        info!(
            event_name = "settings.updated",
            correlation_id,
            version = replacement.version,
            "approval settings replaced"
        );

        Ok(replacement)
    }
}
