//! Process-local backend holding aggregates in a mutex-guarded map.
//!
//! Nothing survives the process. Useful for dry runs and tests that should
//! not depend on a database engine.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use super::factory::{DbConfig, RepositoryFactory};
use super::repository::{CertificationFilter, ObraRepository, RepositoryError, SettlementFilter};
use crate::lifecycle::{CertificationStatus, SettlementStatus};
use crate::models::{Certification, NewCertification, NewSettlement, Settlement};

#[derive(Default)]
struct Store {
    next_id: i64,
    settlements: BTreeMap<i64, Settlement>,
    certifications: BTreeMap<i64, Certification>,
}

impl Store {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    store: Mutex<Store>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, RepositoryError> {
        self.store
            .lock()
            .map_err(|e| RepositoryError::Database(format!("memory store poisoned: {e}")))
    }
}

fn matches_settlement(s: &Settlement, filter: &SettlementFilter) -> bool {
    filter.worker_ref.as_ref().is_none_or(|w| &s.worker_ref == w)
        && filter
            .project_ref
            .as_ref()
            .is_none_or(|p| s.project_ref.as_ref() == Some(p))
        && filter.period_year.is_none_or(|y| s.period_year == y)
        && filter.period_month.is_none_or(|m| s.period_month == m)
        && filter.status.is_none_or(|st| s.status == st)
}

fn matches_certification(c: &Certification, filter: &CertificationFilter) -> bool {
    filter.project_ref.as_ref().is_none_or(|p| &c.project_ref == p)
        && filter.status.is_none_or(|st| c.status == st)
}

#[async_trait]
impl ObraRepository for MemoryRepository {
    async fn create_settlement(
        &self,
        settlement: NewSettlement,
    ) -> Result<Settlement, RepositoryError> {
        if let Err(e) = settlement.validate() {
            warn!(code = %settlement.code, error = %e, "settlement rejected before insert");
            return Err(RepositoryError::Database(e.to_string()));
        }
        let mut store = self.lock()?;
        if store.settlements.values().any(|s| s.code == settlement.code) {
            return Err(RepositoryError::Duplicate(settlement.code));
        }

        let id = store.allocate_id();
        let now = Utc::now();
        let created = Settlement {
            id,
            totals: settlement.totals(),
            code: settlement.code,
            worker_ref: settlement.worker_ref,
            project_ref: settlement.project_ref,
            period_month: settlement.period_month,
            period_year: settlement.period_year,
            base_salary: settlement.base_salary,
            status: SettlementStatus::Draft,
            notes: settlement.notes,
            entries: settlement.entries,
            created_at: now,
            updated_at: now,
        };
        store.settlements.insert(id, created.clone());
        debug!(id, code = %created.code, "settlement stored in memory");
        Ok(created)
    }

    async fn get_settlement(&self, id: i64) -> Result<Settlement, RepositoryError> {
        self.lock()?
            .settlements
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_settlement_by_code(&self, code: &str) -> Result<Settlement, RepositoryError> {
        self.lock()?
            .settlements
            .values()
            .find(|s| s.code == code)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_settlement(&self, settlement: &Settlement) -> Result<(), RepositoryError> {
        let mut store = self.lock()?;
        if store
            .settlements
            .values()
            .any(|s| s.id != settlement.id && s.code == settlement.code)
        {
            return Err(RepositoryError::Duplicate(settlement.code.clone()));
        }
        let slot = store
            .settlements
            .get_mut(&settlement.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = Settlement {
            updated_at: Utc::now(),
            created_at: slot.created_at,
            ..settlement.clone()
        };
        Ok(())
    }

    async fn delete_settlement(&self, id: i64) -> Result<(), RepositoryError> {
        self.lock()?
            .settlements
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_settlements(
        &self,
        filter: &SettlementFilter,
    ) -> Result<Vec<Settlement>, RepositoryError> {
        Ok(self
            .lock()?
            .settlements
            .values()
            .filter(|s| matches_settlement(s, filter))
            .cloned()
            .collect())
    }

    async fn create_certification(
        &self,
        certification: NewCertification,
    ) -> Result<Certification, RepositoryError> {
        if let Err(e) = certification.validate() {
            warn!(code = %certification.code, error = %e, "certification rejected before insert");
            return Err(RepositoryError::Database(e.to_string()));
        }
        let mut store = self.lock()?;
        if store
            .certifications
            .values()
            .any(|c| c.code == certification.code)
        {
            return Err(RepositoryError::Duplicate(certification.code));
        }

        let id = store.allocate_id();
        let now = Utc::now();
        let lines = certification.refreshed_lines();
        let created = Certification {
            id,
            totals: certification.totals(),
            code: certification.code,
            project_ref: certification.project_ref,
            number: certification.number,
            certification_date: certification.certification_date,
            retention_percentage: certification.retention_percentage,
            discount_amount: certification.discount_amount,
            status: CertificationStatus::Draft,
            notes: certification.notes,
            lines,
            created_at: now,
            updated_at: now,
        };
        store.certifications.insert(id, created.clone());
        debug!(id, code = %created.code, "certification stored in memory");
        Ok(created)
    }

    async fn get_certification(&self, id: i64) -> Result<Certification, RepositoryError> {
        self.lock()?
            .certifications
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_certification_by_code(
        &self,
        code: &str,
    ) -> Result<Certification, RepositoryError> {
        self.lock()?
            .certifications
            .values()
            .find(|c| c.code == code)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_certification(
        &self,
        certification: &Certification,
    ) -> Result<(), RepositoryError> {
        if let Err(e) = certification.check_contents() {
            warn!(code = %certification.code, error = %e, "certification update rejected");
            return Err(RepositoryError::Database(e.to_string()));
        }
        let mut store = self.lock()?;
        if store
            .certifications
            .values()
            .any(|c| c.id != certification.id && c.code == certification.code)
        {
            return Err(RepositoryError::Duplicate(certification.code.clone()));
        }
        let slot = store
            .certifications
            .get_mut(&certification.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = Certification {
            updated_at: Utc::now(),
            created_at: slot.created_at,
            ..certification.clone()
        };
        Ok(())
    }

    async fn delete_certification(&self, id: i64) -> Result<(), RepositoryError> {
        self.lock()?
            .certifications
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_certifications(
        &self,
        filter: &CertificationFilter,
    ) -> Result<Vec<Certification>, RepositoryError> {
        Ok(self
            .lock()?
            .certifications
            .values()
            .filter(|c| matches_certification(c, filter))
            .cloned()
            .collect())
    }
}

/// Registers the `memory` backend. The connection string is ignored.
pub struct MemoryRepositoryFactory;

#[async_trait]
impl RepositoryFactory for MemoryRepositoryFactory {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create(
        &self,
        _config: &DbConfig,
    ) -> Result<Box<dyn ObraRepository>, RepositoryError> {
        Ok(Box::new(MemoryRepository::new()))
    }
}
