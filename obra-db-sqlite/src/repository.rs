use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use obra_core::{
    AdditionalIncomeEntry, Certification, CertificationFilter, CertificationLineItem,
    CertificationStatus, CertificationTotals, DeductionCategory, DeductionEntry, HourCategory,
    IncidentCategory, IncidentEntry, IncomeCategory, NewCertification, NewSettlement,
    ObraRepository, RepositoryError, Settlement, SettlementEntries, SettlementFilter,
    SettlementStatus, SettlementTotals, WorkedHourEntry,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::{debug, warn};

use crate::decimal::{decimal_to_text, get_decimal, get_optional_decimal};

const SETTLEMENT_COLUMNS: &str = "id, code, worker_ref, project_ref, period_month, period_year, \
     base_salary, status, notes, hours_total, incidents_discount, deductions_total, \
     additional_income_total, gross_amount, net_amount, created_at, updated_at";

const CERTIFICATION_COLUMNS: &str = "id, code, project_ref, number, certification_date, \
     retention_percentage, discount_amount, status, notes, total_amount, retention_amount, \
     net_amount, accumulated_amount, budgeted_amount, created_at, updated_at";

pub struct SqliteRepository {
    pool: SqlitePool,
}

fn is_memory(connection_string: &str) -> bool {
    matches!(connection_string, ":memory:" | "sqlite::memory:")
}

/// Accepts a bare file path, `:memory:`, or a sqlx-style `sqlite:` URL.
fn connect_options(connection_string: &str) -> Result<SqliteConnectOptions> {
    let options = if is_memory(connection_string) {
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else if connection_string.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(connection_string)
            .with_context(|| format!("Invalid SQLite URL: {}", connection_string))?
    } else {
        SqliteConnectOptions::new().filename(connection_string)
    };
    Ok(options.create_if_missing(true).foreign_keys(true))
}

impl SqliteRepository {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let options = connect_options(connection_string)?;

        // Every connection to `:memory:` opens a separate database, so the
        // pool must hold exactly one connection for its whole lifetime.
        let pool_options = if is_memory(connection_string) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database: {}", connection_string))?;
        Ok(Self { pool })
    }

    pub fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// error and column helpers
// ─────────────────────────────────────────────────────────────────────────────

fn db_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

/// Maps a unique-code violation on an aggregate table to `Duplicate`.
fn write_err(e: sqlx::Error, code: &str) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e {
        let message = db.message();
        if db.is_unique_violation()
            && (message.contains("settlement.code") || message.contains("certification.code"))
        {
            return RepositoryError::Duplicate(code.to_string());
        }
    }
    db_err(e)
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| RepositoryError::Database(format!("Failed to get {}: {}", name, e)))
}

fn code_column<T>(
    row: &SqliteRow,
    name: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    let raw: String = column(row, name)?;
    parse(&raw)
        .ok_or_else(|| RepositoryError::Database(format!("Invalid {} code: {}", name, raw)))
}

fn month_column(row: &SqliteRow) -> Result<u32, RepositoryError> {
    let raw: i64 = column(row, "period_month")?;
    u32::try_from(raw)
        .map_err(|_| RepositoryError::Database(format!("Invalid period_month: {}", raw)))
}

// ─────────────────────────────────────────────────────────────────────────────
// row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn row_to_settlement(row: &SqliteRow, entries: SettlementEntries) -> Result<Settlement, RepositoryError> {
    Ok(Settlement {
        id: column(row, "id")?,
        code: column(row, "code")?,
        worker_ref: column(row, "worker_ref")?,
        project_ref: column(row, "project_ref")?,
        period_month: month_column(row)?,
        period_year: column(row, "period_year")?,
        base_salary: get_decimal(row, "base_salary")?,
        status: code_column(row, "status", SettlementStatus::parse)?,
        notes: column(row, "notes")?,
        entries,
        totals: SettlementTotals {
            hours_total: get_decimal(row, "hours_total")?,
            incidents_discount: get_decimal(row, "incidents_discount")?,
            deductions_total: get_decimal(row, "deductions_total")?,
            additional_income_total: get_decimal(row, "additional_income_total")?,
            gross_amount: get_decimal(row, "gross_amount")?,
            net_amount: get_decimal(row, "net_amount")?,
        },
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
        updated_at: column::<DateTime<Utc>>(row, "updated_at")?,
    })
}

fn row_to_certification(
    row: &SqliteRow,
    lines: Vec<CertificationLineItem>,
) -> Result<Certification, RepositoryError> {
    Ok(Certification {
        id: column(row, "id")?,
        code: column(row, "code")?,
        project_ref: column(row, "project_ref")?,
        number: column(row, "number")?,
        certification_date: column::<NaiveDate>(row, "certification_date")?,
        retention_percentage: get_decimal(row, "retention_percentage")?,
        discount_amount: get_decimal(row, "discount_amount")?,
        status: code_column(row, "status", CertificationStatus::parse)?,
        notes: column(row, "notes")?,
        lines,
        totals: CertificationTotals {
            total_amount: get_decimal(row, "total_amount")?,
            retention_amount: get_decimal(row, "retention_amount")?,
            net_amount: get_decimal(row, "net_amount")?,
            accumulated_amount: get_decimal(row, "accumulated_amount")?,
            budgeted_amount: get_decimal(row, "budgeted_amount")?,
        },
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
        updated_at: column::<DateTime<Utc>>(row, "updated_at")?,
    })
}

fn row_to_line(row: &SqliteRow) -> Result<CertificationLineItem, RepositoryError> {
    Ok(CertificationLineItem {
        code: column(row, "code")?,
        description: column(row, "description")?,
        unit_of_measure: column(row, "unit_of_measure")?,
        unit_price: get_decimal(row, "unit_price")?,
        budgeted_quantity: get_decimal(row, "budgeted_quantity")?,
        previous_quantity: get_decimal(row, "previous_quantity")?,
        current_quantity: get_decimal(row, "current_quantity")?,
        accumulated_quantity: get_decimal(row, "accumulated_quantity")?,
        percent_executed: get_decimal(row, "percent_executed")?,
        current_amount: get_decimal(row, "current_amount")?,
        accumulated_amount: get_decimal(row, "accumulated_amount")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// child rows
// ─────────────────────────────────────────────────────────────────────────────

async fn load_settlement_entries(
    pool: &SqlitePool,
    settlement_id: i64,
) -> Result<SettlementEntries, RepositoryError> {
    let hour_rows = sqlx::query(
        "SELECT category, hours, rate, description
         FROM settlement_worked_hours WHERE settlement_id = ? ORDER BY position",
    )
    .bind(settlement_id)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let incident_rows = sqlx::query(
        "SELECT category, incident_date, days, hours, affects_payment, discount_amount, description
         FROM settlement_incident WHERE settlement_id = ? ORDER BY position",
    )
    .bind(settlement_id)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let deduction_rows = sqlx::query(
        "SELECT category, amount, percentage, description, reference
         FROM settlement_deduction WHERE settlement_id = ? ORDER BY position",
    )
    .bind(settlement_id)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let income_rows = sqlx::query(
        "SELECT category, amount, description
         FROM settlement_additional_income WHERE settlement_id = ? ORDER BY position",
    )
    .bind(settlement_id)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    Ok(SettlementEntries {
        worked_hours: hour_rows
            .iter()
            .map(|row| {
                Ok(WorkedHourEntry {
                    category: code_column(row, "category", HourCategory::parse)?,
                    hours: get_decimal(row, "hours")?,
                    rate: get_decimal(row, "rate")?,
                    description: column(row, "description")?,
                })
            })
            .collect::<Result<_, RepositoryError>>()?,
        incidents: incident_rows
            .iter()
            .map(|row| {
                Ok(IncidentEntry {
                    category: code_column(row, "category", IncidentCategory::parse)?,
                    date: column::<NaiveDate>(row, "incident_date")?,
                    days: get_decimal(row, "days")?,
                    hours: get_decimal(row, "hours")?,
                    affects_payment: column(row, "affects_payment")?,
                    discount_amount: get_decimal(row, "discount_amount")?,
                    description: column(row, "description")?,
                })
            })
            .collect::<Result<_, RepositoryError>>()?,
        deductions: deduction_rows
            .iter()
            .map(|row| {
                Ok(DeductionEntry {
                    category: code_column(row, "category", DeductionCategory::parse)?,
                    amount: get_decimal(row, "amount")?,
                    percentage: get_optional_decimal(row, "percentage")?,
                    description: column(row, "description")?,
                    reference: column(row, "reference")?,
                })
            })
            .collect::<Result<_, RepositoryError>>()?,
        additional_income: income_rows
            .iter()
            .map(|row| {
                Ok(AdditionalIncomeEntry {
                    category: code_column(row, "category", IncomeCategory::parse)?,
                    amount: get_decimal(row, "amount")?,
                    description: column(row, "description")?,
                })
            })
            .collect::<Result<_, RepositoryError>>()?,
    })
}

async fn delete_settlement_entries(
    conn: &mut SqliteConnection,
    settlement_id: i64,
) -> Result<(), RepositoryError> {
    for table in [
        "settlement_worked_hours",
        "settlement_incident",
        "settlement_deduction",
        "settlement_additional_income",
    ] {
        sqlx::query(&format!("DELETE FROM {} WHERE settlement_id = ?", table))
            .bind(settlement_id)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
    }
    Ok(())
}

async fn insert_settlement_entries(
    conn: &mut SqliteConnection,
    settlement_id: i64,
    entries: &SettlementEntries,
) -> Result<(), RepositoryError> {
    for (position, h) in entries.worked_hours.iter().enumerate() {
        sqlx::query(
            "INSERT INTO settlement_worked_hours
                (settlement_id, position, category, hours, rate, description)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(settlement_id)
        .bind(position as i64)
        .bind(h.category.as_str())
        .bind(decimal_to_text(h.hours))
        .bind(decimal_to_text(h.rate))
        .bind(&h.description)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }

    for (position, i) in entries.incidents.iter().enumerate() {
        sqlx::query(
            "INSERT INTO settlement_incident
                (settlement_id, position, category, incident_date, days, hours,
                 affects_payment, discount_amount, description)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(settlement_id)
        .bind(position as i64)
        .bind(i.category.as_str())
        .bind(i.date)
        .bind(decimal_to_text(i.days))
        .bind(decimal_to_text(i.hours))
        .bind(i.affects_payment)
        .bind(decimal_to_text(i.discount_amount))
        .bind(&i.description)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }

    for (position, d) in entries.deductions.iter().enumerate() {
        sqlx::query(
            "INSERT INTO settlement_deduction
                (settlement_id, position, category, amount, percentage, description, reference)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(settlement_id)
        .bind(position as i64)
        .bind(d.category.as_str())
        .bind(decimal_to_text(d.amount))
        .bind(d.percentage.map(decimal_to_text))
        .bind(&d.description)
        .bind(&d.reference)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }

    for (position, a) in entries.additional_income.iter().enumerate() {
        sqlx::query(
            "INSERT INTO settlement_additional_income
                (settlement_id, position, category, amount, description)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(settlement_id)
        .bind(position as i64)
        .bind(a.category.as_str())
        .bind(decimal_to_text(a.amount))
        .bind(&a.description)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }

    Ok(())
}

async fn load_certification_lines(
    pool: &SqlitePool,
    certification_id: i64,
) -> Result<Vec<CertificationLineItem>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT code, description, unit_of_measure, unit_price, budgeted_quantity,
                previous_quantity, current_quantity, accumulated_quantity,
                percent_executed, current_amount, accumulated_amount
         FROM certification_line WHERE certification_id = ? ORDER BY position",
    )
    .bind(certification_id)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    rows.iter().map(row_to_line).collect()
}

async fn replace_certification_lines(
    conn: &mut SqliteConnection,
    certification_id: i64,
    lines: &[CertificationLineItem],
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM certification_line WHERE certification_id = ?")
        .bind(certification_id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

    for (position, line) in lines.iter().enumerate() {
        sqlx::query(
            "INSERT INTO certification_line
                (certification_id, position, code, description, unit_of_measure, unit_price,
                 budgeted_quantity, previous_quantity, current_quantity, accumulated_quantity,
                 percent_executed, current_amount, accumulated_amount)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(certification_id)
        .bind(position as i64)
        .bind(&line.code)
        .bind(&line.description)
        .bind(&line.unit_of_measure)
        .bind(decimal_to_text(line.unit_price))
        .bind(decimal_to_text(line.budgeted_quantity))
        .bind(decimal_to_text(line.previous_quantity))
        .bind(decimal_to_text(line.current_quantity))
        .bind(decimal_to_text(line.accumulated_quantity))
        .bind(decimal_to_text(line.percent_executed))
        .bind(decimal_to_text(line.current_amount))
        .bind(decimal_to_text(line.accumulated_amount))
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            RepositoryError::Database(format!("Failed to store line '{}': {}", line.code, e))
        })?;
    }
    Ok(())
}

impl SqliteRepository {
    async fn settlement_from_row(&self, row: &SqliteRow) -> Result<Settlement, RepositoryError> {
        let id: i64 = column(row, "id")?;
        let entries = load_settlement_entries(&self.pool, id).await?;
        row_to_settlement(row, entries)
    }

    async fn certification_from_row(
        &self,
        row: &SqliteRow,
    ) -> Result<Certification, RepositoryError> {
        let id: i64 = column(row, "id")?;
        let lines = load_certification_lines(&self.pool, id).await?;
        row_to_certification(row, lines)
    }
}

#[async_trait]
impl ObraRepository for SqliteRepository {
    // =========================================================================
    // Settlements
    // =========================================================================

    async fn create_settlement(
        &self,
        settlement: NewSettlement,
    ) -> Result<Settlement, RepositoryError> {
        if let Err(e) = settlement.validate() {
            warn!(code = %settlement.code, error = %e, "settlement rejected before insert");
            return Err(RepositoryError::Database(e.to_string()));
        }

        let totals = settlement.totals();
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let id = sqlx::query(
            "INSERT INTO settlement (
                code, worker_ref, project_ref, period_month, period_year, base_salary,
                status, notes, hours_total, incidents_discount, deductions_total,
                additional_income_total, gross_amount, net_amount, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&settlement.code)
        .bind(&settlement.worker_ref)
        .bind(&settlement.project_ref)
        .bind(i64::from(settlement.period_month))
        .bind(settlement.period_year)
        .bind(decimal_to_text(settlement.base_salary))
        .bind(SettlementStatus::Draft.as_str())
        .bind(&settlement.notes)
        .bind(decimal_to_text(totals.hours_total))
        .bind(decimal_to_text(totals.incidents_discount))
        .bind(decimal_to_text(totals.deductions_total))
        .bind(decimal_to_text(totals.additional_income_total))
        .bind(decimal_to_text(totals.gross_amount))
        .bind(decimal_to_text(totals.net_amount))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_err(e, &settlement.code))?
        .last_insert_rowid();

        insert_settlement_entries(&mut tx, id, &settlement.entries).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(id, code = %settlement.code, "settlement created");
        self.get_settlement(id).await
    }

    async fn get_settlement(&self, id: i64) -> Result<Settlement, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM settlement WHERE id = ?",
            SETTLEMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepositoryError::NotFound)?;

        self.settlement_from_row(&row).await
    }

    async fn get_settlement_by_code(&self, code: &str) -> Result<Settlement, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM settlement WHERE code = ?",
            SETTLEMENT_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepositoryError::NotFound)?;

        self.settlement_from_row(&row).await
    }

    async fn update_settlement(&self, settlement: &Settlement) -> Result<(), RepositoryError> {
        let totals = settlement.totals;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query(
            "UPDATE settlement SET
                code = ?, worker_ref = ?, project_ref = ?, period_month = ?, period_year = ?,
                base_salary = ?, status = ?, notes = ?, hours_total = ?,
                incidents_discount = ?, deductions_total = ?, additional_income_total = ?,
                gross_amount = ?, net_amount = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&settlement.code)
        .bind(&settlement.worker_ref)
        .bind(&settlement.project_ref)
        .bind(i64::from(settlement.period_month))
        .bind(settlement.period_year)
        .bind(decimal_to_text(settlement.base_salary))
        .bind(settlement.status.as_str())
        .bind(&settlement.notes)
        .bind(decimal_to_text(totals.hours_total))
        .bind(decimal_to_text(totals.incidents_discount))
        .bind(decimal_to_text(totals.deductions_total))
        .bind(decimal_to_text(totals.additional_income_total))
        .bind(decimal_to_text(totals.gross_amount))
        .bind(decimal_to_text(totals.net_amount))
        .bind(Utc::now())
        .bind(settlement.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_err(e, &settlement.code))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        delete_settlement_entries(&mut tx, settlement.id).await?;
        insert_settlement_entries(&mut tx, settlement.id, &settlement.entries).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(id = settlement.id, status = %settlement.status.as_str(), "settlement updated");
        Ok(())
    }

    async fn delete_settlement(&self, id: i64) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        delete_settlement_entries(&mut tx, id).await?;

        let result = sqlx::query("DELETE FROM settlement WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list_settlements(
        &self,
        filter: &SettlementFilter,
    ) -> Result<Vec<Settlement>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM settlement WHERE 1 = 1",
            SETTLEMENT_COLUMNS
        ));
        if let Some(worker_ref) = &filter.worker_ref {
            query.push(" AND worker_ref = ").push_bind(worker_ref.clone());
        }
        if let Some(project_ref) = &filter.project_ref {
            query.push(" AND project_ref = ").push_bind(project_ref.clone());
        }
        if let Some(year) = filter.period_year {
            query.push(" AND period_year = ").push_bind(year);
        }
        if let Some(month) = filter.period_month {
            query.push(" AND period_month = ").push_bind(i64::from(month));
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY period_year DESC, period_month DESC, code");

        let rows = query.build().fetch_all(&self.pool).await.map_err(db_err)?;

        let mut settlements = Vec::with_capacity(rows.len());
        for row in &rows {
            settlements.push(self.settlement_from_row(row).await?);
        }
        Ok(settlements)
    }

    // =========================================================================
    // Certifications
    // =========================================================================

    async fn create_certification(
        &self,
        certification: NewCertification,
    ) -> Result<Certification, RepositoryError> {
        if let Err(e) = certification.validate() {
            warn!(code = %certification.code, error = %e, "certification rejected before insert");
            return Err(RepositoryError::Database(e.to_string()));
        }

        let lines = certification.refreshed_lines();
        let totals = certification.totals();
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let id = sqlx::query(
            "INSERT INTO certification (
                code, project_ref, number, certification_date, retention_percentage,
                discount_amount, status, notes, total_amount, retention_amount, net_amount,
                accumulated_amount, budgeted_amount, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&certification.code)
        .bind(&certification.project_ref)
        .bind(certification.number)
        .bind(certification.certification_date)
        .bind(decimal_to_text(certification.retention_percentage))
        .bind(decimal_to_text(certification.discount_amount))
        .bind(CertificationStatus::Draft.as_str())
        .bind(&certification.notes)
        .bind(decimal_to_text(totals.total_amount))
        .bind(decimal_to_text(totals.retention_amount))
        .bind(decimal_to_text(totals.net_amount))
        .bind(decimal_to_text(totals.accumulated_amount))
        .bind(decimal_to_text(totals.budgeted_amount))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_err(e, &certification.code))?
        .last_insert_rowid();

        replace_certification_lines(&mut tx, id, &lines).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(id, code = %certification.code, lines = lines.len(), "certification created");
        self.get_certification(id).await
    }

    async fn get_certification(&self, id: i64) -> Result<Certification, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM certification WHERE id = ?",
            CERTIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepositoryError::NotFound)?;

        self.certification_from_row(&row).await
    }

    async fn get_certification_by_code(
        &self,
        code: &str,
    ) -> Result<Certification, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM certification WHERE code = ?",
            CERTIFICATION_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepositoryError::NotFound)?;

        self.certification_from_row(&row).await
    }

    async fn update_certification(
        &self,
        certification: &Certification,
    ) -> Result<(), RepositoryError> {
        if let Err(e) = certification.check_contents() {
            warn!(code = %certification.code, error = %e, "certification update rejected");
            return Err(RepositoryError::Database(e.to_string()));
        }

        let totals = certification.totals;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query(
            "UPDATE certification SET
                code = ?, project_ref = ?, number = ?, certification_date = ?,
                retention_percentage = ?, discount_amount = ?, status = ?, notes = ?,
                total_amount = ?, retention_amount = ?, net_amount = ?,
                accumulated_amount = ?, budgeted_amount = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&certification.code)
        .bind(&certification.project_ref)
        .bind(certification.number)
        .bind(certification.certification_date)
        .bind(decimal_to_text(certification.retention_percentage))
        .bind(decimal_to_text(certification.discount_amount))
        .bind(certification.status.as_str())
        .bind(&certification.notes)
        .bind(decimal_to_text(totals.total_amount))
        .bind(decimal_to_text(totals.retention_amount))
        .bind(decimal_to_text(totals.net_amount))
        .bind(decimal_to_text(totals.accumulated_amount))
        .bind(decimal_to_text(totals.budgeted_amount))
        .bind(Utc::now())
        .bind(certification.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_err(e, &certification.code))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        replace_certification_lines(&mut tx, certification.id, &certification.lines).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(id = certification.id, status = %certification.status.as_str(), "certification updated");
        Ok(())
    }

    async fn delete_certification(&self, id: i64) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM certification_line WHERE certification_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let result = sqlx::query("DELETE FROM certification WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list_certifications(
        &self,
        filter: &CertificationFilter,
    ) -> Result<Vec<Certification>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM certification WHERE 1 = 1",
            CERTIFICATION_COLUMNS
        ));
        if let Some(project_ref) = &filter.project_ref {
            query.push(" AND project_ref = ").push_bind(project_ref.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY project_ref, number, code");

        let rows = query.build().fetch_all(&self.pool).await.map_err(db_err)?;

        let mut certifications = Vec::with_capacity(rows.len());
        for row in &rows {
            certifications.push(self.certification_from_row(row).await?);
        }
        Ok(certifications)
    }
}
