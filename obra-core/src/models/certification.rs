use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::certification::{
    CertificationTotals, apply_quantity, compute_document_totals, duplicate_lines, refresh_line,
};
use crate::calculations::common::within_input_limit;
use crate::lifecycle::{CertificationAction, CertificationStatus, InvalidStateError, Lifecycle};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CertificationError {
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    #[error("certification '{certification}' has no line '{line}'")]
    UnknownLine { certification: String, line: String },

    #[error("line code '{0}' appears more than once")]
    DuplicateLine(String),

    #[error("certification number must be at least 1, got {0}")]
    InvalidNumber(i32),

    #[error("{field} {value} exceeds the accepted magnitude of 1000000000000")]
    OutOfRange { field: &'static str, value: Decimal },
}

fn check_limit(field: &'static str, value: Decimal) -> Result<(), CertificationError> {
    if within_input_limit(value) {
        Ok(())
    } else {
        Err(CertificationError::OutOfRange { field, value })
    }
}

/// Rejects repeated line codes, and quantities or prices beyond
/// [`INPUT_LIMIT`](crate::calculations::common::INPUT_LIMIT).
fn check_lines(lines: &[CertificationLineItem]) -> Result<(), CertificationError> {
    let mut seen = std::collections::HashSet::new();
    for line in lines {
        if !seen.insert(line.code.as_str()) {
            return Err(CertificationError::DuplicateLine(line.code.clone()));
        }
        check_limit("unit price", line.unit_price)?;
        check_limit("budgeted quantity", line.budgeted_quantity)?;
        check_limit("previous quantity", line.previous_quantity)?;
        check_limit("current quantity", line.current_quantity)?;
    }
    Ok(())
}

fn check_header(
    number: i32,
    retention_percentage: Decimal,
    discount_amount: Decimal,
) -> Result<(), CertificationError> {
    if number < 1 {
        return Err(CertificationError::InvalidNumber(number));
    }
    check_limit("retention percentage", retention_percentage)?;
    check_limit("discount", discount_amount)
}

/// One contract line of a certification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationLineItem {
    pub code: String,
    pub description: String,
    pub unit_of_measure: String,
    pub unit_price: Decimal,
    pub budgeted_quantity: Decimal,
    /// Accumulated from prior certifications.
    pub previous_quantity: Decimal,
    /// Executed this period.
    pub current_quantity: Decimal,
    pub accumulated_quantity: Decimal,
    pub percent_executed: Decimal,
    pub current_amount: Decimal,
    pub accumulated_amount: Decimal,
}

impl CertificationLineItem {
    /// Builds a line with nothing executed this period.
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        unit_of_measure: impl Into<String>,
        unit_price: Decimal,
        budgeted_quantity: Decimal,
        previous_quantity: Decimal,
    ) -> Self {
        let mut line = Self {
            code: code.into(),
            description: description.into(),
            unit_of_measure: unit_of_measure.into(),
            unit_price,
            budgeted_quantity,
            previous_quantity,
            current_quantity: Decimal::ZERO,
            accumulated_quantity: Decimal::ZERO,
            percent_executed: Decimal::ZERO,
            current_amount: Decimal::ZERO,
            accumulated_amount: Decimal::ZERO,
        };
        apply_quantity(&mut line, Decimal::ZERO);
        line
    }

    pub fn budgeted_amount(&self) -> Decimal {
        self.budgeted_quantity * self.unit_price
    }

    /// Quantity still to execute; negative once over-executed.
    pub fn pending_quantity(&self) -> Decimal {
        self.budgeted_quantity - self.accumulated_quantity
    }

    pub fn is_over_executed(&self) -> bool {
        self.accumulated_quantity > self.budgeted_quantity
    }
}

/// A periodic billing document for executed contract work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
    pub id: i64,
    pub code: String,
    pub project_ref: String,
    /// Sequence number within the project, starting at 1.
    pub number: i32,
    pub certification_date: NaiveDate,
    pub retention_percentage: Decimal,
    pub discount_amount: Decimal,
    pub status: CertificationStatus,
    pub notes: Option<String>,
    pub lines: Vec<CertificationLineItem>,
    pub totals: CertificationTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certification {
    /// Applies `edit` to the lines, then refreshes every line and the totals.
    ///
    /// # Errors
    ///
    /// [`CertificationError::InvalidState`] unless the certification is a draft.
    /// [`CertificationError::DuplicateLine`] or [`CertificationError::OutOfRange`]
    /// if the edited lines repeat a code or carry an oversized value; the
    /// certification is unchanged in that case.
    pub fn edit<R>(
        &mut self,
        edit: impl FnOnce(&mut Vec<CertificationLineItem>) -> R,
    ) -> Result<R, CertificationError> {
        self.status.transition(CertificationAction::Edit)?;
        let mut lines = self.lines.clone();
        let out = edit(&mut lines);
        check_lines(&lines)?;
        lines.iter_mut().for_each(refresh_line);
        self.lines = lines;
        self.recalculate();
        Ok(out)
    }

    /// Sets this period's quantity of the line identified by `line_code`.
    pub fn set_line_quantity(
        &mut self,
        line_code: &str,
        current_quantity: Decimal,
    ) -> Result<(), CertificationError> {
        self.status.transition(CertificationAction::Edit)?;
        check_limit("current quantity", current_quantity)?;
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.code == line_code)
            .ok_or_else(|| CertificationError::UnknownLine {
                certification: self.code.clone(),
                line: line_code.to_string(),
            })?;
        apply_quantity(line, current_quantity);
        self.recalculate();
        Ok(())
    }

    pub fn set_adjustments(
        &mut self,
        retention_percentage: Decimal,
        discount_amount: Decimal,
    ) -> Result<(), CertificationError> {
        self.status.transition(CertificationAction::Edit)?;
        check_limit("retention percentage", retention_percentage)?;
        check_limit("discount", discount_amount)?;
        self.retention_percentage = retention_percentage;
        self.discount_amount = discount_amount;
        self.recalculate();
        Ok(())
    }

    pub fn validate(&mut self) -> Result<(), CertificationError> {
        self.status = self.status.transition(CertificationAction::Validate)?;
        Ok(())
    }

    pub fn certify(&mut self) -> Result<(), CertificationError> {
        self.status = self.status.transition(CertificationAction::Certify)?;
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), CertificationError> {
        self.status = self.status.transition(CertificationAction::Reject)?;
        Ok(())
    }

    pub fn apply(&mut self, action: CertificationAction) -> Result<(), CertificationError> {
        match action {
            CertificationAction::Edit => self.edit(|_| ()),
            CertificationAction::Validate => self.validate(),
            CertificationAction::Certify => self.certify(),
            CertificationAction::Reject => self.reject(),
        }
    }

    /// Next period's certification, carrying accumulated quantities forward.
    ///
    /// The project, retention percentage and line catalogue are kept; the
    /// number advances by one and the discount starts at zero.
    pub fn duplicate(
        &self,
        new_code: impl Into<String>,
        certification_date: NaiveDate,
    ) -> NewCertification {
        NewCertification {
            code: new_code.into(),
            project_ref: self.project_ref.clone(),
            number: self.number + 1,
            certification_date,
            retention_percentage: self.retention_percentage,
            discount_amount: Decimal::ZERO,
            notes: None,
            lines: duplicate_lines(&self.lines),
        }
    }

    /// Checks the number, adjustments and line catalogue of a stored document.
    pub fn check_contents(&self) -> Result<(), CertificationError> {
        check_header(self.number, self.retention_percentage, self.discount_amount)?;
        check_lines(&self.lines)
    }

    pub fn line(&self, line_code: &str) -> Option<&CertificationLineItem> {
        self.lines.iter().find(|l| l.code == line_code)
    }

    fn recalculate(&mut self) {
        self.totals =
            compute_document_totals(&self.lines, self.retention_percentage, self.discount_amount);
    }
}

/// For creating new certifications (no id, status or timestamps)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCertification {
    pub code: String,
    pub project_ref: String,
    pub number: i32,
    pub certification_date: NaiveDate,
    pub retention_percentage: Decimal,
    pub discount_amount: Decimal,
    pub notes: Option<String>,
    pub lines: Vec<CertificationLineItem>,
}

impl NewCertification {
    /// Rejects numbers below 1, repeated line codes and oversized values.
    pub fn validate(&self) -> Result<(), CertificationError> {
        check_header(self.number, self.retention_percentage, self.discount_amount)?;
        check_lines(&self.lines)
    }

    /// Lines with derived values refreshed from their quantities.
    pub fn refreshed_lines(&self) -> Vec<CertificationLineItem> {
        let mut lines = self.lines.clone();
        lines.iter_mut().for_each(refresh_line);
        lines
    }

    pub fn totals(&self) -> CertificationTotals {
        compute_document_totals(
            &self.refreshed_lines(),
            self.retention_percentage,
            self.discount_amount,
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, day).unwrap()
    }

    fn draft() -> Certification {
        let lines = vec![
            CertificationLineItem::new("01.01", "Excavation", "m3", dec!(10), dec!(100), dec!(40)),
            CertificationLineItem::new("01.02", "Formwork", "m2", dec!(22.5), dec!(0), dec!(0)),
        ];
        let now = Utc::now();
        Certification {
            id: 7,
            code: "CERT-OB12-03".to_string(),
            project_ref: "OB-12".to_string(),
            number: 3,
            certification_date: date(30),
            retention_percentage: dec!(5),
            discount_amount: dec!(0),
            status: CertificationStatus::Draft,
            notes: None,
            totals: compute_document_totals(&lines, dec!(5), dec!(0)),
            lines,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn set_line_quantity_updates_line_and_totals() {
        let mut cert = draft();

        cert.set_line_quantity("01.01", dec!(20)).unwrap();

        let line = cert.line("01.01").unwrap();
        assert_eq!(line.accumulated_quantity, dec!(60));
        assert_eq!(cert.totals.total_amount, dec!(200));
        assert_eq!(cert.totals.retention_amount, dec!(10));
        assert_eq!(cert.totals.net_amount, dec!(190));
    }

    #[test]
    fn set_line_quantity_unknown_line() {
        let mut cert = draft();

        let result = cert.set_line_quantity("99.99", dec!(1));

        assert_eq!(
            result,
            Err(CertificationError::UnknownLine {
                certification: "CERT-OB12-03".to_string(),
                line: "99.99".to_string(),
            })
        );
    }

    #[test]
    fn validated_certification_rejects_line_edits() {
        let mut cert = draft();
        cert.validate().unwrap();

        let result = cert.set_line_quantity("01.01", dec!(5));

        assert!(matches!(result, Err(CertificationError::InvalidState(_))));
        assert_eq!(cert.line("01.01").unwrap().current_quantity, dec!(0));
    }

    #[test]
    fn rejected_certification_rejects_everything() {
        let mut cert = draft();
        cert.reject().unwrap();

        assert!(cert.edit(|lines| lines.clear()).is_err());
        assert!(cert.set_adjustments(dec!(0), dec!(0)).is_err());
        assert!(cert.validate().is_err());
        assert!(cert.certify().is_err());
        assert!(cert.reject().is_err());
        assert_eq!(cert.lines.len(), 2);
    }

    #[test]
    fn edit_refreshes_hand_modified_lines() {
        let mut cert = draft();

        cert.edit(|lines| {
            lines[1].budgeted_quantity = dec!(8);
            lines[1].current_quantity = dec!(4);
        })
        .unwrap();

        let line = cert.line("01.02").unwrap();
        assert_eq!(line.percent_executed, dec!(50.00));
        assert_eq!(line.current_amount, dec!(90.0));
        assert_eq!(cert.totals.total_amount, dec!(90.0));
    }

    #[test]
    fn adjustments_recompute_net() {
        let mut cert = draft();
        cert.set_line_quantity("01.01", dec!(60)).unwrap();

        cert.set_adjustments(dec!(10), dec!(25)).unwrap();

        assert_eq!(cert.totals.retention_amount, dec!(60));
        assert_eq!(cert.totals.net_amount, dec!(515));
    }

    #[test]
    fn duplicate_starts_next_period() {
        let mut cert = draft();
        cert.set_line_quantity("01.01", dec!(20)).unwrap();
        cert.set_adjustments(dec!(5), dec!(40)).unwrap();
        cert.validate().unwrap();
        cert.certify().unwrap();

        let next = cert.duplicate("CERT-OB12-04", date(30));

        assert_eq!(next.number, 4);
        assert_eq!(next.project_ref, "OB-12");
        assert_eq!(next.retention_percentage, dec!(5));
        assert_eq!(next.discount_amount, dec!(0));
        assert_eq!(next.lines[0].previous_quantity, dec!(60));
        assert_eq!(next.lines[0].current_quantity, dec!(0));
        assert_eq!(next.totals().total_amount, dec!(0));
    }

    #[test]
    fn new_certification_rejects_repeated_line_codes() {
        let cert = draft();
        let mut new = cert.duplicate("CERT-X", date(1));
        new.lines.push(new.lines[0].clone());

        assert_eq!(
            new.validate(),
            Err(CertificationError::DuplicateLine("01.01".to_string()))
        );
    }

    #[test]
    fn new_certification_number_starts_at_one() {
        let mut new = draft().duplicate("CERT-X", date(1));

        new.number = 0;
        assert_eq!(new.validate(), Err(CertificationError::InvalidNumber(0)));
        new.number = -3;
        assert_eq!(new.validate(), Err(CertificationError::InvalidNumber(-3)));
        new.number = 1;
        assert_eq!(new.validate(), Ok(()));
    }

    #[test]
    fn edit_refuses_repeated_line_code_and_keeps_lines() {
        let mut cert = draft();
        let before = cert.clone();

        let result = cert.edit(|lines| {
            let copy = lines[0].clone();
            lines.push(copy);
        });

        assert_eq!(result, Err(CertificationError::DuplicateLine("01.01".to_string())));
        assert_eq!(cert, before);
    }

    #[test]
    fn edit_refuses_oversized_unit_price() {
        let mut cert = draft();

        let result = cert.edit(|lines| lines[0].unit_price = Decimal::MAX);

        assert_eq!(
            result,
            Err(CertificationError::OutOfRange {
                field: "unit price",
                value: Decimal::MAX,
            })
        );
        assert_eq!(cert.line("01.01").unwrap().unit_price, dec!(10));
    }

    #[test]
    fn oversized_quantity_and_adjustments_are_refused() {
        let mut cert = draft();

        assert!(matches!(
            cert.set_line_quantity("01.01", dec!(79228162514264337593543950335)),
            Err(CertificationError::OutOfRange { field: "current quantity", .. })
        ));
        assert!(matches!(
            cert.set_adjustments(dec!(5), dec!(-2000000000000)),
            Err(CertificationError::OutOfRange { field: "discount", .. })
        ));
        assert_eq!(cert.line("01.01").unwrap().current_quantity, dec!(0));
        assert_eq!(cert.discount_amount, dec!(0));
    }

    #[test]
    fn check_contents_flags_stored_duplicates() {
        let mut cert = draft();
        assert_eq!(cert.check_contents(), Ok(()));

        cert.lines[1].code = "01.01".to_string();

        assert_eq!(
            cert.check_contents(),
            Err(CertificationError::DuplicateLine("01.01".to_string()))
        );
    }

    #[test]
    fn line_helpers() {
        let line = CertificationLineItem::new("01.01", "Excavation", "m3", dec!(10), dec!(100), dec!(40));

        assert_eq!(line.budgeted_amount(), dec!(1000));
        assert_eq!(line.pending_quantity(), dec!(60));
        assert!(!line.is_over_executed());
        assert_eq!(line.percent_executed, dec!(40.00));
    }
}
