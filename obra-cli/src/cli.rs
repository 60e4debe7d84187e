use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use obra_core::calculations::common::{INPUT_LIMIT, within_input_limit};
use obra_core::{
    CertificationStatus, DeductionCategory, HourCategory, IncidentCategory, IncomeCategory,
    SettlementStatus,
};
use rust_decimal::Decimal;

use crate::config::{ConfigOverrides, DEFAULT_CONFIG_FILE};

// ─── top level ───────────────────────────────────────────────────────────────

/// Payroll settlements and progress certifications for construction works.
///
/// Settings are read from `obra.toml` when present; the flags below
/// override it.
#[derive(Debug, Parser)]
#[command(name = "obra", version)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Database backend (`sqlite` or `memory`).
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Database connection string, e.g. `obra.db` or `:memory:`.
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Log level or EnvFilter directive.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also append log records to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Do not print log records on stderr.
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            backend: self.backend.clone(),
            db: self.db.clone(),
            log_level: self.log_level.clone(),
            log_file: self.log_file.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Monthly payroll settlements.
    #[command(subcommand)]
    Settlement(SettlementCommand),

    /// Progress certifications against the contract budget.
    #[command(subcommand)]
    Certification(CertificationCommand),
}

// ─── settlements ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum SettlementCommand {
    /// Open a draft settlement for a worker and month.
    Create(CreateSettlementArgs),

    /// Change the base salary of a draft.
    SetSalary {
        code: String,
        #[arg(long, value_parser = bounded_decimal)]
        amount: Decimal,
    },

    /// Add a worked-hours line.
    AddHours {
        code: String,
        #[arg(long, value_parser = hour_category)]
        category: HourCategory,
        #[arg(long, value_parser = bounded_decimal)]
        hours: Decimal,
        #[arg(long, value_parser = bounded_decimal)]
        rate: Decimal,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Record an absence, leave or vacation.
    AddIncident {
        code: String,
        #[arg(long, value_parser = incident_category)]
        category: IncidentCategory,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, default_value_t = Decimal::ZERO, value_parser = bounded_decimal)]
        days: Decimal,
        #[arg(long, default_value_t = Decimal::ZERO, value_parser = bounded_decimal)]
        hours: Decimal,
        /// The incident reduces pay by `--discount`.
        #[arg(long)]
        affects_payment: bool,
        #[arg(long, default_value_t = Decimal::ZERO, value_parser = bounded_decimal)]
        discount: Decimal,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Add a deduction (tax withholding, social security, advance...).
    AddDeduction {
        code: String,
        #[arg(long, value_parser = deduction_category)]
        category: DeductionCategory,
        #[arg(long, value_parser = bounded_decimal)]
        amount: Decimal,
        /// Informational rate the amount was derived from.
        #[arg(long, value_parser = bounded_decimal)]
        percentage: Option<Decimal>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        reference: Option<String>,
    },

    /// Add a bonus, allowance or other extra income.
    AddIncome {
        code: String,
        #[arg(long, value_parser = income_category)]
        category: IncomeCategory,
        #[arg(long, value_parser = bounded_decimal)]
        amount: Decimal,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Compute the totals and move the draft to `calculated`.
    Save { code: String },

    Approve { code: String },

    Pay { code: String },

    Show { code: String },

    List(ListSettlementsArgs),
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct CreateSettlementArgs {
    pub code: String,
    #[arg(long)]
    pub worker: String,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: u32,
    #[arg(long)]
    pub year: i32,
    #[arg(long, default_value_t = Decimal::ZERO, value_parser = bounded_decimal)]
    pub base_salary: Decimal,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Args)]
pub struct ListSettlementsArgs {
    #[arg(long)]
    pub worker: Option<String>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub year: Option<i32>,
    #[arg(long)]
    pub month: Option<u32>,
    #[arg(long, value_parser = settlement_status)]
    pub status: Option<SettlementStatus>,
}

// ─── certifications ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum CertificationCommand {
    /// Open a draft certification, optionally importing a budget CSV.
    Create(CreateCertificationArgs),

    /// Add a budget line to a draft.
    AddLine {
        code: String,
        #[arg(long)]
        line: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "ud")]
        unit: String,
        #[arg(long, value_parser = bounded_decimal)]
        unit_price: Decimal,
        #[arg(long, value_parser = bounded_decimal)]
        budgeted: Decimal,
        #[arg(long, default_value_t = Decimal::ZERO, value_parser = bounded_decimal)]
        previous: Decimal,
    },

    /// Record this period's executed quantity for a line.
    SetQuantity {
        code: String,
        #[arg(long)]
        line: String,
        #[arg(long, value_parser = bounded_decimal)]
        quantity: Decimal,
    },

    /// Change retention percentage and discount of a draft.
    Adjust {
        code: String,
        #[arg(long, value_parser = bounded_decimal)]
        retention: Option<Decimal>,
        #[arg(long, value_parser = bounded_decimal)]
        discount: Option<Decimal>,
    },

    Validate { code: String },

    Certify { code: String },

    Reject { code: String },

    /// Start the next period from an existing certification.
    Duplicate {
        code: String,
        #[arg(long)]
        new_code: String,
        /// Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    Show { code: String },

    List(ListCertificationsArgs),
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct CreateCertificationArgs {
    pub code: String,
    #[arg(long)]
    pub project: String,
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(i32).range(1..))]
    pub number: i32,
    /// Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
    /// Defaults to `default_retention_percentage` from the config file.
    #[arg(long, value_parser = bounded_decimal)]
    pub retention: Option<Decimal>,
    #[arg(long, default_value_t = Decimal::ZERO, value_parser = bounded_decimal)]
    pub discount: Decimal,
    #[arg(long)]
    pub notes: Option<String>,
    /// Budget CSV whose lines become the certification lines.
    #[arg(long)]
    pub budget: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Args)]
pub struct ListCertificationsArgs {
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long, value_parser = certification_status)]
    pub status: Option<CertificationStatus>,
}

// ─── value parsers ───────────────────────────────────────────────────────────

/// A decimal within the magnitude the calculators accept.
fn bounded_decimal(value: &str) -> Result<Decimal, String> {
    let parsed: Decimal = value.parse().map_err(|e| format!("invalid decimal '{value}': {e}"))?;
    if within_input_limit(parsed) {
        Ok(parsed)
    } else {
        Err(format!("{value} exceeds the accepted magnitude of {INPUT_LIMIT}"))
    }
}

fn parse_code<T>(
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
    known: impl Iterator<Item = &'static str>,
) -> Result<T, String> {
    parse(value).ok_or_else(|| {
        let known: Vec<_> = known.collect();
        format!("unknown value '{value}', expected one of: {}", known.join(", "))
    })
}

fn hour_category(value: &str) -> Result<HourCategory, String> {
    parse_code(value, HourCategory::parse, HourCategory::ALL.iter().map(|c| c.as_str()))
}

fn incident_category(value: &str) -> Result<IncidentCategory, String> {
    parse_code(
        value,
        IncidentCategory::parse,
        IncidentCategory::ALL.iter().map(|c| c.as_str()),
    )
}

fn deduction_category(value: &str) -> Result<DeductionCategory, String> {
    parse_code(
        value,
        DeductionCategory::parse,
        DeductionCategory::ALL.iter().map(|c| c.as_str()),
    )
}

fn income_category(value: &str) -> Result<IncomeCategory, String> {
    parse_code(value, IncomeCategory::parse, IncomeCategory::ALL.iter().map(|c| c.as_str()))
}

fn settlement_status(value: &str) -> Result<SettlementStatus, String> {
    parse_code(
        value,
        SettlementStatus::parse,
        SettlementStatus::ALL.iter().map(|s| s.as_str()),
    )
}

fn certification_status(value: &str) -> Result<CertificationStatus, String> {
    parse_code(
        value,
        CertificationStatus::parse,
        CertificationStatus::ALL.iter().map(|s| s.as_str()),
    )
}
