use std::collections::HashSet;
use std::io::Read;

use chrono::NaiveDate;
use obra_core::{
    Certification, CertificationLineItem, NewCertification, ObraRepository, RepositoryError,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur when loading a budget into a certification.
#[derive(Debug, Error)]
pub enum BudgetLineLoaderError {
    #[error("CSV parse error: {0}")]
    CsvParse(String),

    #[error("The budget has no lines")]
    EmptyBudget,

    #[error("Line code '{0}' appears more than once in the budget")]
    DuplicateLine(String),

    #[error("Line '{code}' is invalid: {reason}")]
    InvalidLine { code: String, reason: String },

    #[error("Certification '{0}' already exists")]
    CertificationExists(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<csv::Error> for BudgetLineLoaderError {
    fn from(err: csv::Error) -> Self {
        BudgetLineLoaderError::CsvParse(err.to_string())
    }
}

/// A single record from a budget CSV file.
///
/// - `code`: Line code within the contract budget (e.g., `01.02`)
/// - `description`: Work item description
/// - `unit_of_measure`: Unit the quantities are expressed in (m2, m3, ud...)
/// - `unit_price`: Contract price per unit
/// - `budgeted_quantity`: Contracted quantity
/// - `previous_quantity`: Quantity certified before this document (optional,
///   empty or missing for a first certification)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BudgetLineRecord {
    pub code: String,
    pub description: String,
    pub unit_of_measure: String,
    pub unit_price: Decimal,
    pub budgeted_quantity: Decimal,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub previous_quantity: Option<Decimal>,
}

impl BudgetLineRecord {
    fn check(&self) -> Result<(), BudgetLineLoaderError> {
        let invalid = |reason: &str| BudgetLineLoaderError::InvalidLine {
            code: self.code.clone(),
            reason: reason.to_string(),
        };

        if self.code.trim().is_empty() {
            return Err(invalid("code is empty"));
        }
        if self.unit_price.is_sign_negative() {
            return Err(invalid("unit price is negative"));
        }
        if self.budgeted_quantity.is_sign_negative() {
            return Err(invalid("budgeted quantity is negative"));
        }
        if self.previous_quantity.is_some_and(|q| q.is_sign_negative()) {
            return Err(invalid("previous quantity is negative"));
        }
        Ok(())
    }

    fn to_line(&self) -> CertificationLineItem {
        CertificationLineItem::new(
            self.code.trim(),
            self.description.trim(),
            self.unit_of_measure.trim(),
            self.unit_price,
            self.budgeted_quantity,
            self.previous_quantity.unwrap_or(Decimal::ZERO),
        )
    }
}

fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Document-level data for the certification a budget is loaded into.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCertificationHeader {
    pub code: String,
    pub project_ref: String,
    pub number: i32,
    pub certification_date: NaiveDate,
    pub retention_percentage: Decimal,
    pub notes: Option<String>,
}

/// Loader for contract budgets from CSV files.
///
/// The budget becomes the line catalogue of a new draft certification, stored
/// through the `ObraRepository` trait so any backend can be used.
pub struct BudgetLineLoader;

impl BudgetLineLoader {
    /// Parse budget records from a CSV reader.
    ///
    /// Returns a vector of parsed records. The reader can be any type that
    /// implements `Read`, such as a file or a string slice.
    pub fn parse<R: Read>(reader: R) -> Result<Vec<BudgetLineRecord>, BudgetLineLoaderError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut records = Vec::new();

        for result in csv_reader.deserialize() {
            let record: BudgetLineRecord = result?;
            records.push(record);
        }

        debug!(records = records.len(), "budget CSV parsed");
        Ok(records)
    }

    /// Turn records into certification lines, checking the whole budget first.
    pub fn lines(
        records: &[BudgetLineRecord],
    ) -> Result<Vec<CertificationLineItem>, BudgetLineLoaderError> {
        if records.is_empty() {
            return Err(BudgetLineLoaderError::EmptyBudget);
        }

        let mut seen = HashSet::new();
        for record in records {
            record.check()?;
            if !seen.insert(record.code.trim()) {
                return Err(BudgetLineLoaderError::DuplicateLine(record.code.trim().to_string()));
            }
        }

        Ok(records.iter().map(BudgetLineRecord::to_line).collect())
    }

    /// Create a draft certification holding the budget lines.
    ///
    /// Nothing is written unless every record is valid.
    pub async fn load<R: ObraRepository + ?Sized>(
        repo: &R,
        header: NewCertificationHeader,
        records: &[BudgetLineRecord],
    ) -> Result<Certification, BudgetLineLoaderError> {
        let lines = Self::lines(records)?;

        let new = NewCertification {
            code: header.code,
            project_ref: header.project_ref,
            number: header.number,
            certification_date: header.certification_date,
            retention_percentage: header.retention_percentage,
            discount_amount: Decimal::ZERO,
            notes: header.notes,
            lines,
        };

        let created = repo.create_certification(new).await.map_err(|e| match e {
            RepositoryError::Duplicate(code) => BudgetLineLoaderError::CertificationExists(code),
            other => BudgetLineLoaderError::Repository(other),
        })?;

        info!(
            code = %created.code,
            lines = created.lines.len(),
            budgeted = %created.totals.budgeted_amount,
            "budget loaded"
        );
        Ok(created)
    }
}
