//! Line and document totals of a work certification.
//!
//! A certification bills, for one period, the quantity of each contract line
//! executed since the previous certification. Quantities accumulate across
//! periods: each new certification starts from the accumulated quantity of
//! the one it was duplicated from (see [`duplicate_lines`]).
//!
//! # Line values
//!
//! | Value                 | Formula |
//! |-----------------------|---------|
//! | `accumulated_quantity`| previous + current |
//! | `current_amount`      | current × unit price |
//! | `accumulated_amount`  | accumulated × unit price |
//! | `percent_executed`    | accumulated × 100 / budgeted, unrounded; 0 unless budgeted > 0 |
//!
//! # Document values
//!
//! | Value              | Formula |
//! |--------------------|---------|
//! | `total_amount`     | Σ line current amount |
//! | `retention_amount` | total × retention percentage / 100 |
//! | `net_amount`       | total − retention − discount |
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use obra_core::calculations::certification::{apply_quantity, compute_document_totals};
//! use obra_core::models::CertificationLineItem;
//!
//! let mut line = CertificationLineItem::new("01.02", "Brick wall", "m2", dec!(10), dec!(100), dec!(40));
//! apply_quantity(&mut line, dec!(20));
//!
//! assert_eq!(line.accumulated_quantity, dec!(60));
//! assert_eq!(line.percent_executed, dec!(60.00));
//! assert_eq!(line.current_amount, dec!(200));
//! assert_eq!(line.accumulated_amount, dec!(600));
//!
//! let totals = compute_document_totals(&[line], dec!(5), dec!(0));
//! assert_eq!(totals.retention_amount, dec!(10));
//! assert_eq!(totals.net_amount, dec!(190));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::calculations::common::{percent_of, share_percent};
use crate::models::CertificationLineItem;

/// Derived totals of a certification document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationTotals {
    /// Amount certified in this period.
    pub total_amount: Decimal,
    pub retention_amount: Decimal,
    pub net_amount: Decimal,
    /// Amount certified to date, this period included.
    pub accumulated_amount: Decimal,
    /// Contract value of all lines.
    pub budgeted_amount: Decimal,
}

/// Sets the quantity executed this period and refreshes the derived values.
///
/// Over-execution is allowed; it is logged and shows as a percentage above 100.
pub fn apply_quantity(line: &mut CertificationLineItem, current_quantity: Decimal) {
    line.current_quantity = current_quantity;
    line.accumulated_quantity = line.previous_quantity + current_quantity;
    line.current_amount = current_quantity * line.unit_price;
    line.accumulated_amount = line.accumulated_quantity * line.unit_price;
    line.percent_executed = share_percent(line.accumulated_quantity, line.budgeted_quantity);

    if line.is_over_executed() {
        warn!(
            line = %line.code,
            accumulated = %line.accumulated_quantity,
            budgeted = %line.budgeted_quantity,
            "line executed beyond its budgeted quantity"
        );
    }
}

/// Recomputes derived values of a line from its stored quantities.
pub fn refresh_line(line: &mut CertificationLineItem) {
    apply_quantity(line, line.current_quantity);
}

pub fn compute_document_totals(
    lines: &[CertificationLineItem],
    retention_percentage: Decimal,
    discount_amount: Decimal,
) -> CertificationTotals {
    let total_amount: Decimal = lines.iter().map(|l| l.current_amount).sum();
    let accumulated_amount: Decimal = lines.iter().map(|l| l.accumulated_amount).sum();
    let budgeted_amount: Decimal = lines.iter().map(|l| l.budgeted_amount()).sum();

    let retention_amount = percent_of(total_amount, retention_percentage);
    let net_amount = total_amount - retention_amount - discount_amount;

    debug!(
        lines = lines.len(),
        %total_amount,
        %retention_amount,
        %discount_amount,
        %net_amount,
        "certification totals computed"
    );

    CertificationTotals {
        total_amount,
        retention_amount,
        net_amount,
        accumulated_amount,
        budgeted_amount,
    }
}

/// Lines for the next period's certification.
///
/// The running total carries forward: each new line's previous quantity is
/// the source line's accumulated quantity, and the current quantity is reset.
pub fn duplicate_lines(lines: &[CertificationLineItem]) -> Vec<CertificationLineItem> {
    lines
        .iter()
        .map(|source| {
            let mut line = source.clone();
            line.previous_quantity = source.accumulated_quantity;
            apply_quantity(&mut line, Decimal::ZERO);
            line
        })
        .collect()
}
