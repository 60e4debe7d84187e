use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::common::within_input_limit;
use crate::calculations::settlement::{SettlementTotals, compute_totals};
use crate::lifecycle::{InvalidStateError, Lifecycle, SettlementAction, SettlementStatus};
use crate::models::{DeductionCategory, HourCategory, IncidentCategory, IncomeCategory};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    /// A settlement cannot be calculated without the worker it pays.
    #[error("settlement '{0}' has no worker assigned")]
    MissingWorker(String),

    #[error("period month must be between 1 and 12, got {0}")]
    InvalidPeriodMonth(u32),

    #[error("{field} {value} exceeds the accepted magnitude of 1000000000000")]
    OutOfRange { field: &'static str, value: Decimal },
}

fn check_limit(field: &'static str, value: Decimal) -> Result<(), SettlementError> {
    if within_input_limit(value) {
        Ok(())
    } else {
        Err(SettlementError::OutOfRange { field, value })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkedHourEntry {
    pub category: HourCategory,
    pub hours: Decimal,
    /// Currency per hour.
    pub rate: Decimal,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentEntry {
    pub category: IncidentCategory,
    pub date: NaiveDate,
    pub days: Decimal,
    pub hours: Decimal,
    /// Only incidents that affect payment subtract `discount_amount`.
    pub affects_payment: bool,
    pub discount_amount: Decimal,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionEntry {
    pub category: DeductionCategory,
    pub amount: Decimal,
    /// Informational rate the amount was derived from, if any.
    pub percentage: Option<Decimal>,
    pub description: String,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalIncomeEntry {
    pub category: IncomeCategory,
    pub amount: Decimal,
    pub description: String,
}

/// The four editable collections of a settlement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEntries {
    pub worked_hours: Vec<WorkedHourEntry>,
    pub incidents: Vec<IncidentEntry>,
    pub deductions: Vec<DeductionEntry>,
    pub additional_income: Vec<AdditionalIncomeEntry>,
}

impl SettlementEntries {
    pub fn totals(&self, base_salary: Decimal) -> SettlementTotals {
        compute_totals(
            base_salary,
            &self.worked_hours,
            &self.incidents,
            &self.deductions,
            &self.additional_income,
        )
    }

    /// Rejects any hours, rate or amount beyond
    /// [`INPUT_LIMIT`](crate::calculations::common::INPUT_LIMIT).
    pub fn check_limits(&self) -> Result<(), SettlementError> {
        for entry in &self.worked_hours {
            check_limit("hours", entry.hours)?;
            check_limit("rate", entry.rate)?;
        }
        for entry in &self.incidents {
            check_limit("incident days", entry.days)?;
            check_limit("incident hours", entry.hours)?;
            check_limit("incident discount", entry.discount_amount)?;
        }
        for entry in &self.deductions {
            check_limit("deduction amount", entry.amount)?;
            if let Some(percentage) = entry.percentage {
                check_limit("deduction percentage", percentage)?;
            }
        }
        for entry in &self.additional_income {
            check_limit("income amount", entry.amount)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.worked_hours.is_empty()
            && self.incidents.is_empty()
            && self.deductions.is_empty()
            && self.additional_income.is_empty()
    }
}

/// A worker's payroll computation for one month/year period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: i64,
    pub code: String,
    pub worker_ref: String,
    pub project_ref: Option<String>,
    pub period_month: u32,
    pub period_year: i32,
    pub base_salary: Decimal,
    pub status: SettlementStatus,
    pub notes: Option<String>,
    pub entries: SettlementEntries,
    pub totals: SettlementTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Settlement {
    /// Applies `edit` to the entry collections and recomputes the totals.
    ///
    /// # Errors
    ///
    /// [`SettlementError::InvalidState`] unless the settlement is a draft.
    /// [`SettlementError::OutOfRange`] if the edited entries carry a value
    /// beyond [`INPUT_LIMIT`](crate::calculations::common::INPUT_LIMIT); the
    /// settlement is unchanged in that case.
    pub fn edit<R>(
        &mut self,
        edit: impl FnOnce(&mut SettlementEntries) -> R,
    ) -> Result<R, SettlementError> {
        self.status.transition(SettlementAction::Edit)?;
        let mut entries = self.entries.clone();
        let out = edit(&mut entries);
        entries.check_limits()?;
        self.entries = entries;
        self.recalculate();
        Ok(out)
    }

    pub fn set_base_salary(&mut self, base_salary: Decimal) -> Result<(), SettlementError> {
        self.status.transition(SettlementAction::Edit)?;
        check_limit("base salary", base_salary)?;
        self.base_salary = base_salary;
        self.recalculate();
        Ok(())
    }

    /// Moves a draft to `calculated` with freshly computed totals.
    pub fn calculate(&mut self) -> Result<(), SettlementError> {
        let next = self.status.transition(SettlementAction::Calculate)?;
        if self.worker_ref.trim().is_empty() {
            return Err(SettlementError::MissingWorker(self.code.clone()));
        }
        self.recalculate();
        self.status = next;
        Ok(())
    }

    pub fn approve(&mut self) -> Result<(), SettlementError> {
        self.status = self.status.transition(SettlementAction::Approve)?;
        Ok(())
    }

    pub fn mark_paid(&mut self) -> Result<(), SettlementError> {
        self.status = self.status.transition(SettlementAction::MarkPaid)?;
        Ok(())
    }

    /// Runs a lifecycle action by value; used by the persistence workflows.
    pub fn apply(&mut self, action: SettlementAction) -> Result<(), SettlementError> {
        match action {
            SettlementAction::Edit => self.edit(|_| ()),
            SettlementAction::Calculate => self.calculate(),
            SettlementAction::Approve => self.approve(),
            SettlementAction::MarkPaid => self.mark_paid(),
        }
    }

    /// `YYYY-MM` label of the pay period.
    pub fn period_label(&self) -> String {
        format!("{:04}-{:02}", self.period_year, self.period_month)
    }

    fn recalculate(&mut self) {
        self.totals = self.entries.totals(self.base_salary);
    }
}

/// For creating new settlements (no id, status or timestamps)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSettlement {
    pub code: String,
    pub worker_ref: String,
    pub project_ref: Option<String>,
    pub period_month: u32,
    pub period_year: i32,
    pub base_salary: Decimal,
    pub notes: Option<String>,
    pub entries: SettlementEntries,
}

impl NewSettlement {
    pub fn validate(&self) -> Result<(), SettlementError> {
        if !(1..=12).contains(&self.period_month) {
            return Err(SettlementError::InvalidPeriodMonth(self.period_month));
        }
        check_limit("base salary", self.base_salary)?;
        self.entries.check_limits()
    }

    pub fn totals(&self) -> SettlementTotals {
        self.entries.totals(self.base_salary)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::calculations::common::INPUT_LIMIT;

    fn draft() -> Settlement {
        let entries = SettlementEntries {
            worked_hours: vec![WorkedHourEntry {
                category: HourCategory::Normal,
                hours: dec!(160),
                rate: dec!(11.25),
                description: "March".to_string(),
            }],
            ..Default::default()
        };
        let now = Utc::now();
        Settlement {
            id: 1,
            code: "LIQ-2025-03-001".to_string(),
            worker_ref: "W-017".to_string(),
            project_ref: Some("OB-12".to_string()),
            period_month: 3,
            period_year: 2025,
            base_salary: dec!(1800.00),
            status: SettlementStatus::Draft,
            notes: None,
            totals: entries.totals(dec!(1800.00)),
            entries,
            created_at: now,
            updated_at: now,
        }
    }

    fn advance_to(settlement: &mut Settlement, status: SettlementStatus) {
        let path = [
            SettlementAction::Calculate,
            SettlementAction::Approve,
            SettlementAction::MarkPaid,
        ];
        for action in path {
            if settlement.status == status {
                break;
            }
            settlement.apply(action).unwrap();
        }
        assert_eq!(settlement.status, status);
    }

    #[test]
    fn edit_recomputes_totals() {
        let mut settlement = draft();

        settlement
            .edit(|e| {
                e.deductions.push(DeductionEntry {
                    category: DeductionCategory::Advance,
                    amount: dec!(120.00),
                    percentage: None,
                    description: "Advance".to_string(),
                    reference: None,
                })
            })
            .unwrap();

        assert_eq!(settlement.totals.gross_amount, dec!(3600.00));
        assert_eq!(settlement.totals.net_amount, dec!(3480.00));
    }

    #[test]
    fn set_base_salary_recomputes_totals() {
        let mut settlement = draft();

        settlement.set_base_salary(dec!(2000.00)).unwrap();

        assert_eq!(settlement.totals.gross_amount, dec!(3800.00));
    }

    #[test]
    fn paid_settlement_rejects_edits() {
        let mut settlement = draft();
        advance_to(&mut settlement, SettlementStatus::Paid);
        let before = settlement.clone();

        let result = settlement.edit(|e| e.worked_hours.clear());

        assert_eq!(
            result,
            Err(SettlementError::InvalidState(InvalidStateError {
                aggregate: "settlement",
                status: "paid",
                action: "edit",
            }))
        );
        assert_eq!(settlement, before);
    }

    #[test]
    fn calculated_settlement_rejects_base_salary_change() {
        let mut settlement = draft();
        advance_to(&mut settlement, SettlementStatus::Calculated);

        let result = settlement.set_base_salary(dec!(1.00));

        assert!(matches!(result, Err(SettlementError::InvalidState(_))));
        assert_eq!(settlement.base_salary, dec!(1800.00));
    }

    #[test]
    fn calculate_requires_worker() {
        let mut settlement = draft();
        settlement.worker_ref = "  ".to_string();

        let result = settlement.calculate();

        assert_eq!(
            result,
            Err(SettlementError::MissingWorker("LIQ-2025-03-001".to_string()))
        );
        assert_eq!(settlement.status, SettlementStatus::Draft);
    }

    #[test]
    fn calculate_refreshes_stale_totals() {
        let mut settlement = draft();
        settlement.totals = SettlementTotals::default();

        settlement.calculate().unwrap();

        assert_eq!(settlement.status, SettlementStatus::Calculated);
        assert_eq!(settlement.totals.net_amount, dec!(3600.00));
    }

    #[test]
    fn approve_requires_calculated() {
        let mut settlement = draft();

        assert!(settlement.approve().is_err());
        assert_eq!(settlement.status, SettlementStatus::Draft);
    }

    #[test]
    fn period_label_is_zero_padded() {
        assert_eq!(draft().period_label(), "2025-03");
    }

    #[test]
    fn new_settlement_rejects_month_thirteen() {
        let new = NewSettlement {
            code: "LIQ-X".to_string(),
            worker_ref: "W-1".to_string(),
            project_ref: None,
            period_month: 13,
            period_year: 2025,
            base_salary: dec!(0),
            notes: None,
            entries: SettlementEntries::default(),
        };

        assert_eq!(new.validate(), Err(SettlementError::InvalidPeriodMonth(13)));
    }

    #[test]
    fn edit_rejects_oversized_rate_and_keeps_entries() {
        let mut settlement = draft();
        let before = settlement.clone();

        let result = settlement.edit(|e| {
            e.worked_hours.push(WorkedHourEntry {
                category: HourCategory::Overtime,
                hours: dec!(2),
                rate: Decimal::MAX,
                description: String::new(),
            })
        });

        assert_eq!(
            result,
            Err(SettlementError::OutOfRange {
                field: "rate",
                value: Decimal::MAX,
            })
        );
        assert_eq!(settlement, before);
    }

    #[test]
    fn base_salary_beyond_limit_is_refused() {
        let mut settlement = draft();

        let result = settlement.set_base_salary(dec!(-1000000000000.01));

        assert!(matches!(
            result,
            Err(SettlementError::OutOfRange { field: "base salary", .. })
        ));
        assert_eq!(settlement.base_salary, dec!(1800.00));
    }

    #[test]
    fn largest_accepted_entries_total_without_overflow() {
        let mut settlement = draft();
        let limit = Decimal::from(INPUT_LIMIT);

        settlement
            .edit(|e| {
                for _ in 0..3 {
                    e.worked_hours.push(WorkedHourEntry {
                        category: HourCategory::Normal,
                        hours: limit,
                        rate: limit,
                        description: String::new(),
                    });
                }
            })
            .unwrap();

        assert!(settlement.totals.gross_amount > limit * limit);
    }

    #[test]
    fn new_settlement_checks_entry_limits() {
        let new = NewSettlement {
            code: "LIQ-X".to_string(),
            worker_ref: "W-1".to_string(),
            project_ref: None,
            period_month: 3,
            period_year: 2025,
            base_salary: dec!(0),
            notes: None,
            entries: SettlementEntries {
                additional_income: vec![AdditionalIncomeEntry {
                    category: IncomeCategory::Bonus,
                    amount: Decimal::MIN,
                    description: String::new(),
                }],
                ..Default::default()
            },
        };

        assert!(matches!(
            new.validate(),
            Err(SettlementError::OutOfRange { field: "income amount", .. })
        ));
    }
}
