pub mod connection;
pub mod migrations;
pub mod orgdata;
pub mod repositories;

pub use connection::{connect, DbPool};
pub use orgdata::{load_org_directory, upsert_member};
pub use repositories::{
    DelegationRepository, InMemoryDelegationRepository, InMemoryRequestRepository,
    InMemorySettingsRepository, RepositoryError, RequestFilter, RequestRepository,
    SettingsRepository, SqlDelegationRepository, SqlRequestRepository, SqlSettingsRepository,
};
