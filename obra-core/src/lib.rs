pub mod calculations;
pub mod db;
pub mod lifecycle;
pub mod models;
pub mod workflow;

pub use db::repository::{CertificationFilter, ObraRepository, RepositoryError, SettlementFilter};
pub use lifecycle::{CertificationAction, InvalidStateError, Lifecycle, SettlementAction};
pub use models::*;
pub use workflow::WorkflowError;
