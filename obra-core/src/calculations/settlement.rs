//! Payroll totals for a worker settlement.
//!
//! | Total                     | Formula |
//! |---------------------------|---------|
//! | `hours_total`             | Σ hours × rate |
//! | `incidents_discount`      | Σ discount of incidents that affect payment |
//! | `deductions_total`        | Σ deduction amounts |
//! | `additional_income_total` | Σ additional income amounts |
//! | `gross_amount`            | base salary + hours total + additional income total |
//! | `net_amount`              | gross − incidents discount − deductions total |
//!
//! Sums and products are exact decimals; nothing is rounded here.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//! use obra_core::calculations::settlement::compute_totals;
//! use obra_core::models::{
//!     DeductionCategory, DeductionEntry, HourCategory, IncidentCategory, IncidentEntry,
//!     WorkedHourEntry,
//! };
//!
//! let hours = vec![WorkedHourEntry {
//!     category: HourCategory::Normal,
//!     hours: dec!(160),
//!     rate: dec!(11.25),
//!     description: String::new(),
//! }];
//! let incidents = vec![IncidentEntry {
//!     category: IncidentCategory::Absence,
//!     date: NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
//!     days: dec!(1),
//!     hours: dec!(8),
//!     affects_payment: true,
//!     discount_amount: dec!(50),
//!     description: String::new(),
//! }];
//! let deductions = vec![DeductionEntry {
//!     category: DeductionCategory::TaxWithholding,
//!     amount: dec!(120.00),
//!     percentage: None,
//!     description: String::new(),
//!     reference: None,
//! }];
//!
//! let totals = compute_totals(dec!(1800.00), &hours, &incidents, &deductions, &[]);
//!
//! assert_eq!(totals.hours_total, dec!(1800.00));
//! assert_eq!(totals.gross_amount, dec!(3600.00));
//! assert_eq!(totals.net_amount, dec!(3430.00));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{AdditionalIncomeEntry, DeductionEntry, IncidentEntry, WorkedHourEntry};

/// Derived totals of a settlement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTotals {
    pub hours_total: Decimal,
    pub incidents_discount: Decimal,
    pub deductions_total: Decimal,
    pub additional_income_total: Decimal,
    pub gross_amount: Decimal,
    pub net_amount: Decimal,
}

impl SettlementTotals {
    /// Everything subtracted from gross: deductions plus paid-affecting incidents.
    pub fn total_deductions(&self) -> Decimal {
        self.deductions_total + self.incidents_discount
    }
}

/// Computes the derived totals of a settlement from its entry collections.
///
/// Negative values are accepted as-is; validating input belongs to the caller.
/// Inputs within [`INPUT_LIMIT`](crate::calculations::common::INPUT_LIMIT)
/// cannot overflow.
pub fn compute_totals(
    base_salary: Decimal,
    hours: &[WorkedHourEntry],
    incidents: &[IncidentEntry],
    deductions: &[DeductionEntry],
    additional_income: &[AdditionalIncomeEntry],
) -> SettlementTotals {
    let hours_total: Decimal = hours.iter().map(|h| h.hours * h.rate).sum();

    let incidents_discount: Decimal = incidents
        .iter()
        .filter(|i| i.affects_payment)
        .map(|i| i.discount_amount)
        .sum();

    let deductions_total: Decimal = deductions.iter().map(|d| d.amount).sum();

    let additional_income_total: Decimal = additional_income.iter().map(|a| a.amount).sum();

    let gross_amount = base_salary + hours_total + additional_income_total;
    let net_amount = gross_amount - incidents_discount - deductions_total;

    debug!(
        %base_salary,
        %hours_total,
        %incidents_discount,
        %deductions_total,
        %additional_income_total,
        %gross_amount,
        %net_amount,
        "settlement totals computed"
    );

    SettlementTotals {
        hours_total,
        incidents_discount,
        deductions_total,
        additional_income_total,
        gross_amount,
        net_amount,
    }
}
