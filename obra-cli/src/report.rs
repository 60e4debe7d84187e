//! Plain-text rendering of settlements and certifications.
//!
//! Amounts and percentages are shown rounded half-up to two places; stored
//! values stay exact.
use std::fmt::Write;

use obra_core::calculations::common::round_half_up;
use obra_core::{Certification, Settlement};
use rust_decimal::Decimal;

fn money(value: Decimal) -> String {
    let mut rounded = round_half_up(value);
    rounded.rescale(2);
    rounded.to_string()
}

fn percent(value: Decimal) -> String {
    money(value)
}

fn optional(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

// ─── settlements ─────────────────────────────────────────────────────────────

pub fn settlement(s: &Settlement) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_settlement(&mut out, s);
    out
}

fn write_settlement(out: &mut String, s: &Settlement) -> std::fmt::Result {
    writeln!(out, "Settlement {} [{}]", s.code, s.status)?;
    writeln!(out, "  Worker       {}", s.worker_ref)?;
    writeln!(out, "  Project      {}", optional(s.project_ref.as_deref()))?;
    writeln!(out, "  Period       {}", s.period_label())?;
    writeln!(out, "  Base salary  {}", money(s.base_salary))?;
    if let Some(notes) = &s.notes {
        writeln!(out, "  Notes        {notes}")?;
    }

    let entries = &s.entries;
    if !entries.worked_hours.is_empty() {
        writeln!(out, "\nWorked hours")?;
        writeln!(out, "  {:<16} {:>8} {:>10} {:>12}  Description", "Category", "Hours", "Rate", "Amount")?;
        for h in &entries.worked_hours {
            writeln!(
                out,
                "  {:<16} {:>8} {:>10} {:>12}  {}",
                h.category.label(),
                h.hours,
                h.rate,
                h.hours
                    .checked_mul(h.rate)
                    .map_or_else(|| "overflow".to_string(), money),
                h.description
            )?;
        }
    }

    if !entries.incidents.is_empty() {
        writeln!(out, "\nIncidents")?;
        writeln!(out, "  {:<16} {:<10} {:>6} {:>6} {:>12}  Description", "Category", "Date", "Days", "Hours", "Discount")?;
        for i in &entries.incidents {
            let discount = if i.affects_payment {
                money(i.discount_amount)
            } else {
                "-".to_string()
            };
            writeln!(
                out,
                "  {:<16} {:<10} {:>6} {:>6} {:>12}  {}",
                i.category.label(),
                i.date,
                i.days,
                i.hours,
                discount,
                i.description
            )?;
        }
    }

    if !entries.deductions.is_empty() {
        writeln!(out, "\nDeductions")?;
        writeln!(out, "  {:<22} {:>12} {:>8}  Reference", "Category", "Amount", "%")?;
        for d in &entries.deductions {
            let percentage = d.percentage.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
            writeln!(
                out,
                "  {:<22} {:>12} {:>8}  {}",
                d.category.label(),
                money(d.amount),
                percentage,
                optional(d.reference.as_deref())
            )?;
        }
    }

    if !entries.additional_income.is_empty() {
        writeln!(out, "\nAdditional income")?;
        writeln!(out, "  {:<22} {:>12}  Description", "Category", "Amount")?;
        for a in &entries.additional_income {
            writeln!(out, "  {:<22} {:>12}  {}", a.category.label(), money(a.amount), a.description)?;
        }
    }

    let t = &s.totals;
    writeln!(out, "\nTotals")?;
    writeln!(out, "  {:<22} {:>12}", "Hours", money(t.hours_total))?;
    writeln!(out, "  {:<22} {:>12}", "Additional income", money(t.additional_income_total))?;
    writeln!(out, "  {:<22} {:>12}", "Gross", money(t.gross_amount))?;
    writeln!(out, "  {:<22} {:>12}", "Incident discounts", money(t.incidents_discount))?;
    writeln!(out, "  {:<22} {:>12}", "Deductions", money(t.deductions_total))?;
    writeln!(out, "  {:<22} {:>12}", "Net", money(t.net_amount))
}

pub fn settlement_list(settlements: &[Settlement]) -> String {
    if settlements.is_empty() {
        return "No settlements found.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<18} {:<12} {:<10} {:<8} {:<11} {:>12} {:>12}",
        "Code", "Worker", "Project", "Period", "Status", "Gross", "Net"
    );
    for s in settlements {
        let _ = writeln!(
            out,
            "{:<18} {:<12} {:<10} {:<8} {:<11} {:>12} {:>12}",
            s.code,
            s.worker_ref,
            optional(s.project_ref.as_deref()),
            s.period_label(),
            s.status.as_str(),
            money(s.totals.gross_amount),
            money(s.totals.net_amount)
        );
    }
    out
}

// ─── certifications ──────────────────────────────────────────────────────────

pub fn certification(c: &Certification) -> String {
    let mut out = String::new();
    let _ = write_certification(&mut out, c);
    out
}

fn write_certification(out: &mut String, c: &Certification) -> std::fmt::Result {
    writeln!(out, "Certification {} [{}]", c.code, c.status)?;
    writeln!(out, "  Project    {}", c.project_ref)?;
    writeln!(out, "  Number     {}", c.number)?;
    writeln!(out, "  Date       {}", c.certification_date)?;
    writeln!(out, "  Retention  {}%", c.retention_percentage)?;
    if let Some(notes) = &c.notes {
        writeln!(out, "  Notes      {notes}")?;
    }

    if !c.lines.is_empty() {
        writeln!(out)?;
        writeln!(
            out,
            "  {:<8} {:<24} {:<4} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8} {:>12} {:>12}",
            "Line", "Description", "Unit", "Price", "Budgeted", "Previous", "Current", "To date", "%", "Current amt", "To date amt"
        )?;
        for l in &c.lines {
            let flag = if l.is_over_executed() { " !" } else { "" };
            writeln!(
                out,
                "  {:<8} {:<24} {:<4} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8} {:>12} {:>12}{}",
                l.code,
                l.description,
                l.unit_of_measure,
                l.unit_price,
                l.budgeted_quantity,
                l.previous_quantity,
                l.current_quantity,
                l.accumulated_quantity,
                percent(l.percent_executed),
                money(l.current_amount),
                money(l.accumulated_amount),
                flag
            )?;
        }
    }

    let t = &c.totals;
    writeln!(out, "\nTotals")?;
    writeln!(out, "  {:<22} {:>12}", "Certified this period", money(t.total_amount))?;
    writeln!(out, "  {:<22} {:>12}", "Retention", money(t.retention_amount))?;
    writeln!(out, "  {:<22} {:>12}", "Discount", money(c.discount_amount))?;
    writeln!(out, "  {:<22} {:>12}", "Net", money(t.net_amount))?;
    writeln!(out, "  {:<22} {:>12}", "Certified to date", money(t.accumulated_amount))?;
    writeln!(out, "  {:<22} {:>12}", "Budget", money(t.budgeted_amount))
}

pub fn certification_list(certifications: &[Certification]) -> String {
    if certifications.is_empty() {
        return "No certifications found.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16} {:<10} {:>3} {:<10} {:<10} {:>12} {:>12} {:>12}",
        "Code", "Project", "No", "Date", "Status", "Period", "Net", "To date"
    );
    for c in certifications {
        let _ = writeln!(
            out,
            "{:<16} {:<10} {:>3} {:<10} {:<10} {:>12} {:>12} {:>12}",
            c.code,
            c.project_ref,
            c.number,
            c.certification_date,
            c.status.as_str(),
            money(c.totals.total_amount),
            money(c.totals.net_amount),
            money(c.totals.accumulated_amount)
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use obra_core::{
        CertificationLineItem, CertificationStatus, DeductionCategory, DeductionEntry,
        HourCategory, IncidentCategory, IncidentEntry, NewCertification, SettlementEntries,
        SettlementStatus, WorkedHourEntry,
    };
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    fn worked_example() -> Settlement {
        let entries = SettlementEntries {
            worked_hours: vec![WorkedHourEntry {
                category: HourCategory::Normal,
                hours: dec!(160),
                rate: dec!(11.25),
                description: "March".to_string(),
            }],
            incidents: vec![IncidentEntry {
                category: IncidentCategory::Absence,
                date: NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
                days: dec!(1),
                hours: dec!(0),
                affects_payment: true,
                discount_amount: dec!(50),
                description: String::new(),
            }],
            deductions: vec![DeductionEntry {
                category: DeductionCategory::Advance,
                amount: dec!(120.00),
                percentage: None,
                description: "March advance".to_string(),
                reference: Some("ANT-7".to_string()),
            }],
            additional_income: vec![],
        };
        let totals = entries.totals(dec!(1800.00));
        Settlement {
            id: 1,
            code: "LIQ-2025-03".to_string(),
            worker_ref: "W-001".to_string(),
            project_ref: None,
            period_month: 3,
            period_year: 2025,
            base_salary: dec!(1800.00),
            status: SettlementStatus::Calculated,
            notes: None,
            entries,
            totals,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn certification_fixture() -> Certification {
        let mut line =
            CertificationLineItem::new("01.01", "Excavation", "m3", dec!(10), dec!(100), dec!(40));
        obra_core::calculations::apply_quantity(&mut line, dec!(70));
        let new = NewCertification {
            code: "CERT-1".to_string(),
            project_ref: "OB-12".to_string(),
            number: 2,
            certification_date: NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
            retention_percentage: dec!(5),
            discount_amount: dec!(0),
            notes: None,
            lines: vec![line],
        };
        Certification {
            id: 1,
            code: new.code.clone(),
            project_ref: new.project_ref.clone(),
            number: new.number,
            certification_date: new.certification_date,
            retention_percentage: new.retention_percentage,
            discount_amount: new.discount_amount,
            status: CertificationStatus::Draft,
            notes: None,
            totals: new.totals(),
            lines: new.lines,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_money_is_two_places_half_up() {
        assert_eq!(money(dec!(3430)), "3430.00");
        assert_eq!(money(dec!(222.49375)), "222.49");
        assert_eq!(money(dec!(0.125)), "0.13");
        assert_eq!(money(dec!(-0.125)), "-0.13");
    }

    #[test]
    fn test_settlement_shows_totals() {
        let text = settlement(&worked_example());

        assert!(text.starts_with("Settlement LIQ-2025-03 ["));
        assert!(text.contains("Period       2025-03"));
        assert!(text.contains("ANT-7"));
        let net = text.lines().last().unwrap();
        assert!(net.trim_start().starts_with("Net"));
        assert!(net.ends_with("3430.00"));
        assert!(text.lines().any(|l| l.trim_start().starts_with("Gross") && l.ends_with("3600.00")));
    }

    #[test]
    fn test_settlement_without_entries_skips_sections() {
        let mut s = worked_example();
        s.entries = SettlementEntries::default();

        let text = settlement(&s);

        assert!(!text.contains("Worked hours"));
        assert!(!text.contains("Incidents"));
        assert!(text.contains("Totals"));
    }

    #[test]
    fn test_settlement_list() {
        let text = settlement_list(&[worked_example()]);
        let rows: Vec<_> = text.lines().collect();

        assert_eq!(rows.len(), 2);
        assert!(rows[1].starts_with("LIQ-2025-03"));
        assert!(rows[1].contains("calculated"));
        assert!(rows[1].ends_with("3430.00"));
        assert_eq!(settlement_list(&[]), "No settlements found.\n");
    }

    #[test]
    fn test_certification_flags_over_execution() {
        let text = certification(&certification_fixture());

        // 40 previous + 70 current against a budget of 100
        let row = text.lines().find(|l| l.trim_start().starts_with("01.01")).unwrap();
        assert!(row.ends_with(" !"));
        assert!(row.contains(" 110.00 "));
        assert!(row.contains("1100.00"));
        assert!(text.lines().any(|l| l.contains("Certified this period") && l.ends_with("700.00")));
        assert!(text.lines().any(|l| l.trim_start().starts_with("Net") && l.ends_with("665.00")));
    }

    #[test]
    fn test_certification_rounds_percent_for_display() {
        let mut c = certification_fixture();
        c.lines[0] = CertificationLineItem::new("01.01", "Excavation", "m3", dec!(10), dec!(3), dec!(0));
        obra_core::calculations::apply_quantity(&mut c.lines[0], dec!(2));

        let text = certification(&c);

        let row = text.lines().find(|l| l.trim_start().starts_with("01.01")).unwrap();
        assert!(row.contains(" 66.67 "));
        assert!(!row.contains("66.666"));
    }

    #[test]
    fn test_unrepresentable_hour_amount_is_shown_not_panicked() {
        let mut s = worked_example();
        s.entries.worked_hours[0].hours = Decimal::MAX;
        s.entries.worked_hours[0].rate = dec!(2);

        let text = settlement(&s);

        assert!(text.lines().any(|l| l.contains("overflow")));
    }

    #[test]
    fn test_certification_list() {
        let text = certification_list(&[certification_fixture()]);

        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("CERT-1"));
        assert_eq!(certification_list(&[]), "No certifications found.\n");
    }
}
