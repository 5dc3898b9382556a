use std::sync::Arc;

use crewflow_core::config::{AppConfig, ConfigError, LoadOptions};
use crewflow_db::{
    connect, load_org_directory, migrations, DbPool, SqlDelegationRepository,
    SqlRequestRepository, SqlSettingsRepository,
};
use thiserror::Error;
use tracing::info;

use crate::api::AppState;
use crate::observe::{LogAuditSink, LogNotifier};
use crate::scheduler::EscalationScheduler;
use crate::services::{DelegationService, RequestService, SettingsService};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
    pub scheduler: Arc<EscalationScheduler>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("org directory load failed: {0}")]
    OrgDirectory(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let directory = Arc::new(
        load_org_directory(&db_pool)
            .await
            .map_err(|error| BootstrapError::OrgDirectory(error.to_string()))?,
    );
    info!(
        event_name = "system.bootstrap.org_directory_loaded",
        correlation_id = "bootstrap",
        "org hierarchy snapshot loaded"
    );

    let requests = Arc::new(SqlRequestRepository::new(db_pool.clone()));
    let delegations = Arc::new(SqlDelegationRepository::new(db_pool.clone()));
    let settings = Arc::new(SqlSettingsRepository::new(db_pool.clone()));
    let notifier = Arc::new(LogNotifier);
    let audit = Arc::new(LogAuditSink);

    let state = AppState {
        requests: Arc::new(RequestService::new(
            requests.clone(),
            delegations.clone(),
            settings.clone(),
            directory.clone(),
            notifier.clone(),
            audit.clone(),
        )),
        delegations: Arc::new(DelegationService::new(
            delegations.clone(),
            settings.clone(),
            directory.clone(),
            notifier.clone(),
            audit.clone(),
        )),
        settings: Arc::new(SettingsService::new(
            settings.clone(),
            directory.clone(),
            audit.clone(),
        )),
    };

    let scheduler = Arc::new(EscalationScheduler::new(
        requests,
        delegations,
        settings,
        directory,
        notifier,
        audit,
    ));

    Ok(Application { config, db_pool, state, scheduler })
}
