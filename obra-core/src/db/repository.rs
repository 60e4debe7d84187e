use async_trait::async_trait;
use thiserror::Error;

use crate::lifecycle::{CertificationStatus, SettlementStatus};
use crate::models::{Certification, NewCertification, NewSettlement, Settlement};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("A record with code '{0}' already exists")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Optional criteria for listing settlements. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementFilter {
    pub worker_ref: Option<String>,
    pub project_ref: Option<String>,
    pub period_year: Option<i32>,
    pub period_month: Option<u32>,
    pub status: Option<SettlementStatus>,
}

/// Optional criteria for listing certifications. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificationFilter {
    pub project_ref: Option<String>,
    pub status: Option<CertificationStatus>,
}

/// Persistence for settlement and certification aggregates.
///
/// Aggregates are written whole: updating a settlement replaces its entry
/// rows, updating a certification replaces its lines.
#[async_trait]
pub trait ObraRepository: Send + Sync {
    // Settlements
    async fn create_settlement(
        &self,
        settlement: NewSettlement,
    ) -> Result<Settlement, RepositoryError>;

    async fn get_settlement(&self, id: i64) -> Result<Settlement, RepositoryError>;

    async fn get_settlement_by_code(&self, code: &str) -> Result<Settlement, RepositoryError>;

    async fn update_settlement(&self, settlement: &Settlement) -> Result<(), RepositoryError>;

    async fn delete_settlement(&self, id: i64) -> Result<(), RepositoryError>;

    async fn list_settlements(
        &self,
        filter: &SettlementFilter,
    ) -> Result<Vec<Settlement>, RepositoryError>;

    // Certifications
    async fn create_certification(
        &self,
        certification: NewCertification,
    ) -> Result<Certification, RepositoryError>;

    async fn get_certification(&self, id: i64) -> Result<Certification, RepositoryError>;

    async fn get_certification_by_code(
        &self,
        code: &str,
    ) -> Result<Certification, RepositoryError>;

    async fn update_certification(
        &self,
        certification: &Certification,
    ) -> Result<(), RepositoryError>;

    async fn delete_certification(&self, id: i64) -> Result<(), RepositoryError>;

    async fn list_certifications(
        &self,
        filter: &CertificationFilter,
    ) -> Result<Vec<Certification>, RepositoryError>;
}
