//! Lifecycle actions that persist their result.
//!
//! Every workflow works on a clone of the caller's aggregate: the action is
//! applied to the clone, the clone is written through the repository, and
//! only a successful write hands the new state back. On any error the
//! caller's value is unchanged and the operation can simply be re-submitted.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::repository::{ObraRepository, RepositoryError};
use crate::lifecycle::{CertificationAction, SettlementAction};
use crate::models::{
    Certification, CertificationError, CertificationLineItem, Settlement, SettlementEntries,
    SettlementError,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    Certification(#[from] CertificationError),

    #[error("persistence failed: {0}")]
    Repository(#[from] RepositoryError),
}

async fn persist_settlement(
    repo: &dyn ObraRepository,
    current: &Settlement,
    action: impl FnOnce(&mut Settlement) -> Result<(), SettlementError>,
) -> Result<Settlement, WorkflowError> {
    let mut next = current.clone();
    action(&mut next)?;

    if let Err(e) = repo.update_settlement(&next).await {
        warn!(code = %current.code, error = %e, "settlement not saved");
        return Err(e.into());
    }
    Ok(next)
}

async fn persist_certification(
    repo: &dyn ObraRepository,
    current: &Certification,
    action: impl FnOnce(&mut Certification) -> Result<(), CertificationError>,
) -> Result<Certification, WorkflowError> {
    let mut next = current.clone();
    action(&mut next)?;

    if let Err(e) = repo.update_certification(&next).await {
        warn!(code = %current.code, error = %e, "certification not saved");
        return Err(e.into());
    }
    Ok(next)
}

/// Applies an edit to a draft settlement's entries and stores it.
pub async fn edit_settlement(
    repo: &dyn ObraRepository,
    current: &Settlement,
    edit: impl FnOnce(&mut SettlementEntries),
) -> Result<Settlement, WorkflowError> {
    persist_settlement(repo, current, |s| s.edit(edit)).await
}

pub async fn set_settlement_base_salary(
    repo: &dyn ObraRepository,
    current: &Settlement,
    base_salary: Decimal,
) -> Result<Settlement, WorkflowError> {
    persist_settlement(repo, current, |s| s.set_base_salary(base_salary)).await
}

/// Recomputes totals and moves a draft settlement to `calculated`.
pub async fn save_settlement(
    repo: &dyn ObraRepository,
    current: &Settlement,
) -> Result<Settlement, WorkflowError> {
    let saved = persist_settlement(repo, current, |s| s.apply(SettlementAction::Calculate)).await?;
    info!(
        code = %saved.code,
        period = %saved.period_label(),
        net = %saved.totals.net_amount,
        "settlement calculated"
    );
    Ok(saved)
}

pub async fn approve_settlement(
    repo: &dyn ObraRepository,
    current: &Settlement,
) -> Result<Settlement, WorkflowError> {
    let approved = persist_settlement(repo, current, |s| s.apply(SettlementAction::Approve)).await?;
    info!(code = %approved.code, "settlement approved");
    Ok(approved)
}

pub async fn mark_settlement_paid(
    repo: &dyn ObraRepository,
    current: &Settlement,
) -> Result<Settlement, WorkflowError> {
    let paid = persist_settlement(repo, current, |s| s.apply(SettlementAction::MarkPaid)).await?;
    info!(code = %paid.code, net = %paid.totals.net_amount, "settlement paid");
    Ok(paid)
}

/// Applies an edit to a draft certification's lines and stores it.
pub async fn edit_certification(
    repo: &dyn ObraRepository,
    current: &Certification,
    edit: impl FnOnce(&mut Vec<CertificationLineItem>),
) -> Result<Certification, WorkflowError> {
    persist_certification(repo, current, |c| c.edit(edit)).await
}

/// Records this period's quantity for one line of a draft certification.
pub async fn set_certification_quantity(
    repo: &dyn ObraRepository,
    current: &Certification,
    line_code: &str,
    quantity: Decimal,
) -> Result<Certification, WorkflowError> {
    persist_certification(repo, current, |c| c.set_line_quantity(line_code, quantity)).await
}

/// Changes the retention percentage and discount of a draft certification.
pub async fn adjust_certification(
    repo: &dyn ObraRepository,
    current: &Certification,
    retention_percentage: Decimal,
    discount_amount: Decimal,
) -> Result<Certification, WorkflowError> {
    persist_certification(repo, current, |c| {
        c.set_adjustments(retention_percentage, discount_amount)
    })
    .await
}

pub async fn validate_certification(
    repo: &dyn ObraRepository,
    current: &Certification,
) -> Result<Certification, WorkflowError> {
    let validated =
        persist_certification(repo, current, |c| c.apply(CertificationAction::Validate)).await?;
    info!(code = %validated.code, "certification validated");
    Ok(validated)
}

pub async fn certify_certification(
    repo: &dyn ObraRepository,
    current: &Certification,
) -> Result<Certification, WorkflowError> {
    let certified =
        persist_certification(repo, current, |c| c.apply(CertificationAction::Certify)).await?;
    info!(
        code = %certified.code,
        total = %certified.totals.total_amount,
        net = %certified.totals.net_amount,
        "certification certified"
    );
    Ok(certified)
}

pub async fn reject_certification(
    repo: &dyn ObraRepository,
    current: &Certification,
) -> Result<Certification, WorkflowError> {
    let rejected =
        persist_certification(repo, current, |c| c.apply(CertificationAction::Reject)).await?;
    info!(code = %rejected.code, "certification rejected");
    Ok(rejected)
}

/// Creates the next period's certification from `source`.
///
/// The source itself is not modified.
pub async fn duplicate_certification(
    repo: &dyn ObraRepository,
    source: &Certification,
    new_code: &str,
    certification_date: NaiveDate,
) -> Result<Certification, WorkflowError> {
    let next = source.duplicate(new_code, certification_date);
    next.validate()?;

    let created = repo.create_certification(next).await?;
    info!(
        from = %source.code,
        code = %created.code,
        number = created.number,
        "certification duplicated"
    );
    Ok(created)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db::memory::MemoryRepository;
    use crate::db::repository::{CertificationFilter, SettlementFilter};
    use crate::lifecycle::{CertificationStatus, SettlementStatus};
    use crate::models::{
        HourCategory, IncidentCategory, IncidentEntry, NewCertification, NewSettlement,
        WorkedHourEntry,
    };

    /// Delegates to a memory store but fails updates while `fail` is set.
    #[derive(Default)]
    struct FlakyRepository {
        inner: MemoryRepository,
        fail: AtomicBool,
    }

    impl FlakyRepository {
        fn go_offline(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), RepositoryError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(RepositoryError::Connection("backend unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ObraRepository for FlakyRepository {
        async fn create_settlement(&self, s: NewSettlement) -> Result<Settlement, RepositoryError> {
            self.check()?;
            self.inner.create_settlement(s).await
        }
        async fn get_settlement(&self, id: i64) -> Result<Settlement, RepositoryError> {
            self.inner.get_settlement(id).await
        }
        async fn get_settlement_by_code(&self, code: &str) -> Result<Settlement, RepositoryError> {
            self.inner.get_settlement_by_code(code).await
        }
        async fn update_settlement(&self, s: &Settlement) -> Result<(), RepositoryError> {
            self.check()?;
            self.inner.update_settlement(s).await
        }
        async fn delete_settlement(&self, id: i64) -> Result<(), RepositoryError> {
            self.inner.delete_settlement(id).await
        }
        async fn list_settlements(
            &self,
            filter: &SettlementFilter,
        ) -> Result<Vec<Settlement>, RepositoryError> {
            self.inner.list_settlements(filter).await
        }
        async fn create_certification(
            &self,
            c: NewCertification,
        ) -> Result<Certification, RepositoryError> {
            self.check()?;
            self.inner.create_certification(c).await
        }
        async fn get_certification(&self, id: i64) -> Result<Certification, RepositoryError> {
            self.inner.get_certification(id).await
        }
        async fn get_certification_by_code(
            &self,
            code: &str,
        ) -> Result<Certification, RepositoryError> {
            self.inner.get_certification_by_code(code).await
        }
        async fn update_certification(&self, c: &Certification) -> Result<(), RepositoryError> {
            self.check()?;
            self.inner.update_certification(c).await
        }
        async fn delete_certification(&self, id: i64) -> Result<(), RepositoryError> {
            self.inner.delete_certification(id).await
        }
        async fn list_certifications(
            &self,
            filter: &CertificationFilter,
        ) -> Result<Vec<Certification>, RepositoryError> {
            self.inner.list_certifications(filter).await
        }
    }

    async fn seeded_settlement(repo: &dyn ObraRepository) -> Settlement {
        repo.create_settlement(NewSettlement {
            code: "LIQ-2025-03-001".to_string(),
            worker_ref: "W-017".to_string(),
            project_ref: Some("OB-12".to_string()),
            period_month: 3,
            period_year: 2025,
            base_salary: dec!(1800.00),
            notes: None,
            entries: SettlementEntries {
                worked_hours: vec![WorkedHourEntry {
                    category: HourCategory::Normal,
                    hours: dec!(160),
                    rate: dec!(11.25),
                    description: String::new(),
                }],
                ..Default::default()
            },
        })
        .await
        .unwrap()
    }

    async fn seeded_certification(repo: &dyn ObraRepository) -> Certification {
        repo.create_certification(NewCertification {
            code: "CERT-OB12-01".to_string(),
            project_ref: "OB-12".to_string(),
            number: 1,
            certification_date: NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
            retention_percentage: dec!(5),
            discount_amount: dec!(0),
            notes: None,
            lines: vec![CertificationLineItem::new(
                "01.01",
                "Excavation",
                "m3",
                dec!(10),
                dec!(100),
                dec!(40),
            )],
        })
        .await
        .unwrap()
    }

    // =========================================================================
    // settlement workflows
    // =========================================================================

    #[tokio::test]
    async fn settlement_full_lifecycle() {
        let repo = MemoryRepository::new();
        let draft = seeded_settlement(&repo).await;

        let edited = edit_settlement(&repo, &draft, |e| {
            e.incidents.push(IncidentEntry {
                category: IncidentCategory::Absence,
                date: NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
                days: dec!(1),
                hours: dec!(8),
                affects_payment: true,
                discount_amount: dec!(50),
                description: String::new(),
            })
        })
        .await
        .unwrap();
        let saved = save_settlement(&repo, &edited).await.unwrap();
        let approved = approve_settlement(&repo, &saved).await.unwrap();
        let paid = mark_settlement_paid(&repo, &approved).await.unwrap();

        assert_eq!(saved.status, SettlementStatus::Calculated);
        assert_eq!(saved.totals.net_amount, dec!(3550.00));
        assert_eq!(paid.status, SettlementStatus::Paid);

        let stored = repo.get_settlement(draft.id).await.unwrap();
        assert_eq!(stored.status, SettlementStatus::Paid);
        assert_eq!(stored.totals, saved.totals);
    }

    #[tokio::test]
    async fn paid_settlement_cannot_be_edited() {
        let repo = MemoryRepository::new();
        let draft = seeded_settlement(&repo).await;
        let saved = save_settlement(&repo, &draft).await.unwrap();
        let approved = approve_settlement(&repo, &saved).await.unwrap();
        let paid = mark_settlement_paid(&repo, &approved).await.unwrap();

        let err = edit_settlement(&repo, &paid, |e| e.worked_hours.clear())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "cannot edit settlement in status 'paid'");
        let stored = repo.get_settlement(paid.id).await.unwrap();
        assert_eq!(stored.entries.worked_hours.len(), 1);
    }

    #[tokio::test]
    async fn failed_save_leaves_caller_state_untouched() {
        let repo = FlakyRepository::default();
        let draft = seeded_settlement(&repo).await;
        repo.go_offline();

        let err = save_settlement(&repo, &draft).await.unwrap_err();

        assert_eq!(
            err,
            WorkflowError::Repository(RepositoryError::Connection(
                "backend unreachable".to_string()
            ))
        );
        assert_eq!(draft.status, SettlementStatus::Draft);
        let stored = repo.get_settlement(draft.id).await.unwrap();
        assert_eq!(stored.status, SettlementStatus::Draft);
    }

    #[tokio::test]
    async fn base_salary_change_recomputes_gross() {
        let repo = MemoryRepository::new();
        let draft = seeded_settlement(&repo).await;

        let raised = set_settlement_base_salary(&repo, &draft, dec!(2000.00))
            .await
            .unwrap();

        assert_eq!(raised.totals.gross_amount, dec!(3800.00));
        assert_eq!(draft.base_salary, dec!(1800.00));
        let stored = repo.get_settlement(draft.id).await.unwrap();
        assert_eq!(stored.base_salary, dec!(2000.00));
    }

    #[tokio::test]
    async fn approve_before_save_is_rejected_without_writing() {
        let repo = FlakyRepository::default();
        let draft = seeded_settlement(&repo).await;
        repo.go_offline();

        let err = approve_settlement(&repo, &draft).await.unwrap_err();

        assert!(matches!(err, WorkflowError::Settlement(SettlementError::InvalidState(_))));
    }

    // =========================================================================
    // certification workflows
    // =========================================================================

    #[tokio::test]
    async fn certification_full_lifecycle_and_duplicate() {
        let repo = MemoryRepository::new();
        let draft = seeded_certification(&repo).await;

        let measured = set_certification_quantity(&repo, &draft, "01.01", dec!(20))
            .await
            .unwrap();
        let validated = validate_certification(&repo, &measured).await.unwrap();
        let certified = certify_certification(&repo, &validated).await.unwrap();
        let next = duplicate_certification(
            &repo,
            &certified,
            "CERT-OB12-02",
            NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(certified.status, CertificationStatus::Certified);
        assert_eq!(certified.totals.total_amount, dec!(200));
        assert_eq!(certified.totals.net_amount, dec!(190));
        assert_eq!(next.status, CertificationStatus::Draft);
        assert_eq!(next.number, 2);
        assert_eq!(next.lines[0].previous_quantity, dec!(60));
        assert_eq!(next.totals.total_amount, dec!(0));

        let all = repo
            .list_certifications(&CertificationFilter {
                project_ref: Some("OB-12".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn adjustments_recompute_net() {
        let repo = MemoryRepository::new();
        let draft = seeded_certification(&repo).await;
        let measured = set_certification_quantity(&repo, &draft, "01.01", dec!(20))
            .await
            .unwrap();

        let adjusted = adjust_certification(&repo, &measured, dec!(10), dec!(20))
            .await
            .unwrap();

        assert_eq!(adjusted.totals.retention_amount, dec!(20));
        assert_eq!(adjusted.totals.net_amount, dec!(160));
        let stored = repo.get_certification(draft.id).await.unwrap();
        assert_eq!(stored.discount_amount, dec!(20));
    }

    #[tokio::test]
    async fn rejected_certification_is_terminal() {
        let repo = MemoryRepository::new();
        let draft = seeded_certification(&repo).await;
        let rejected = reject_certification(&repo, &draft).await.unwrap();

        let err = set_certification_quantity(&repo, &rejected, "01.01", dec!(1))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "cannot edit certification in status 'rejected'");
        assert!(validate_certification(&repo, &rejected).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_with_existing_code_fails() {
        let repo = MemoryRepository::new();
        let draft = seeded_certification(&repo).await;

        let err = duplicate_certification(
            &repo,
            &draft,
            "CERT-OB12-01",
            NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
        )
        .await
        .unwrap_err();

        assert_eq!(
            err,
            WorkflowError::Repository(RepositoryError::Duplicate("CERT-OB12-01".to_string()))
        );
    }

    #[tokio::test]
    async fn failed_certify_keeps_validated_status() {
        let repo = FlakyRepository::default();
        let draft = seeded_certification(&repo).await;
        let validated = validate_certification(&repo, &draft).await.unwrap();
        repo.go_offline();

        assert!(certify_certification(&repo, &validated).await.is_err());

        assert_eq!(validated.status, CertificationStatus::Validated);
        let stored = repo.get_certification(draft.id).await.unwrap();
        assert_eq!(stored.status, CertificationStatus::Validated);
    }
}
