pub mod delegations;
pub mod requests;
pub mod settings;

pub use delegations::{CreateDelegationInput, DelegationService};
pub use requests::{DecideRequestInput, RequestService, SubmitRequestInput};
pub use settings::SettingsService;

use crewflow_core::errors::ApplicationError;
use crewflow_db::RepositoryError;

pub(crate) fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
