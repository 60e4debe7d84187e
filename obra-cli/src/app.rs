//! Command dispatch for the `obra` binary.
//!
//! Each handler loads the aggregate by code, runs the matching workflow and
//! returns the text to print. Nothing here writes to stdout, so the handlers
//! can be driven directly from tests.
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use obra_core::db::{MemoryRepositoryFactory, RepositoryRegistry};
use obra_core::workflow::{
    adjust_certification, approve_settlement, certify_certification, duplicate_certification,
    edit_certification, edit_settlement, mark_settlement_paid, reject_certification,
    save_settlement, set_certification_quantity, set_settlement_base_salary,
    validate_certification,
};
use obra_core::{
    AdditionalIncomeEntry, Certification, CertificationError, CertificationFilter,
    CertificationLineItem, DeductionEntry, IncidentEntry, NewCertification, NewSettlement,
    ObraRepository, Settlement, SettlementEntries, SettlementFilter, WorkedHourEntry,
};
use obra_data::{BudgetLineLoader, NewCertificationHeader};
use obra_db_sqlite::SqliteRepositoryFactory;
use tracing::debug;

use crate::cli::{
    CertificationCommand, Command, CreateCertificationArgs, CreateSettlementArgs,
    SettlementCommand,
};
use crate::config::ObraConfig;
use crate::report;

/// Every backend this binary can open.
pub fn build_registry() -> RepositoryRegistry {
    let mut registry = RepositoryRegistry::new();
    registry.register(Box::new(SqliteRepositoryFactory));
    registry.register(Box::new(MemoryRepositoryFactory));
    registry
}

pub async fn run(repo: &dyn ObraRepository, command: Command, config: &ObraConfig) -> Result<String> {
    match command {
        Command::Settlement(cmd) => run_settlement(repo, cmd).await,
        Command::Certification(cmd) => run_certification(repo, cmd, config).await,
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// ─── settlements ─────────────────────────────────────────────────────────────

async fn load_settlement(repo: &dyn ObraRepository, code: &str) -> Result<Settlement> {
    repo.get_settlement_by_code(code)
        .await
        .with_context(|| format!("cannot load settlement '{code}'"))
}

async fn add_entry(
    repo: &dyn ObraRepository,
    code: &str,
    edit: impl FnOnce(&mut SettlementEntries),
) -> Result<Settlement> {
    let current = load_settlement(repo, code).await?;
    edit_settlement(repo, &current, edit)
        .await
        .with_context(|| format!("cannot edit settlement '{code}'"))
}

async fn create_settlement(repo: &dyn ObraRepository, args: CreateSettlementArgs) -> Result<Settlement> {
    let new = NewSettlement {
        code: args.code,
        worker_ref: args.worker,
        project_ref: args.project,
        period_month: args.month,
        period_year: args.year,
        base_salary: args.base_salary,
        notes: args.notes,
        entries: SettlementEntries::default(),
    };
    new.validate()?;

    let code = new.code.clone();
    repo.create_settlement(new)
        .await
        .with_context(|| format!("cannot create settlement '{code}'"))
}

async fn run_settlement(repo: &dyn ObraRepository, cmd: SettlementCommand) -> Result<String> {
    debug!(?cmd, "settlement command");

    let settlement = match cmd {
        SettlementCommand::Create(args) => create_settlement(repo, args).await?,
        SettlementCommand::SetSalary { code, amount } => {
            let current = load_settlement(repo, &code).await?;
            set_settlement_base_salary(repo, &current, amount)
                .await
                .with_context(|| format!("cannot edit settlement '{code}'"))?
        }
        SettlementCommand::AddHours {
            code,
            category,
            hours,
            rate,
            description,
        } => {
            add_entry(repo, &code, |e| {
                e.worked_hours.push(WorkedHourEntry {
                    category,
                    hours,
                    rate,
                    description,
                })
            })
            .await?
        }
        SettlementCommand::AddIncident {
            code,
            category,
            date,
            days,
            hours,
            affects_payment,
            discount,
            description,
        } => {
            add_entry(repo, &code, |e| {
                e.incidents.push(IncidentEntry {
                    category,
                    date,
                    days,
                    hours,
                    affects_payment,
                    discount_amount: discount,
                    description,
                })
            })
            .await?
        }
        SettlementCommand::AddDeduction {
            code,
            category,
            amount,
            percentage,
            description,
            reference,
        } => {
            add_entry(repo, &code, |e| {
                e.deductions.push(DeductionEntry {
                    category,
                    amount,
                    percentage,
                    description,
                    reference,
                })
            })
            .await?
        }
        SettlementCommand::AddIncome {
            code,
            category,
            amount,
            description,
        } => {
            add_entry(repo, &code, |e| {
                e.additional_income.push(AdditionalIncomeEntry {
                    category,
                    amount,
                    description,
                })
            })
            .await?
        }
        SettlementCommand::Save { code } => {
            let current = load_settlement(repo, &code).await?;
            save_settlement(repo, &current)
                .await
                .with_context(|| format!("cannot save settlement '{code}'"))?
        }
        SettlementCommand::Approve { code } => {
            let current = load_settlement(repo, &code).await?;
            approve_settlement(repo, &current)
                .await
                .with_context(|| format!("cannot approve settlement '{code}'"))?
        }
        SettlementCommand::Pay { code } => {
            let current = load_settlement(repo, &code).await?;
            mark_settlement_paid(repo, &current)
                .await
                .with_context(|| format!("cannot mark settlement '{code}' as paid"))?
        }
        SettlementCommand::Show { code } => load_settlement(repo, &code).await?,
        SettlementCommand::List(args) => {
            let filter = SettlementFilter {
                worker_ref: args.worker,
                project_ref: args.project,
                period_year: args.year,
                period_month: args.month,
                status: args.status,
            };
            let settlements = repo
                .list_settlements(&filter)
                .await
                .context("cannot list settlements")?;
            return Ok(report::settlement_list(&settlements));
        }
    };

    Ok(report::settlement(&settlement))
}

// ─── certifications ──────────────────────────────────────────────────────────

async fn load_certification(repo: &dyn ObraRepository, code: &str) -> Result<Certification> {
    repo.get_certification_by_code(code)
        .await
        .with_context(|| format!("cannot load certification '{code}'"))
}

async fn create_certification(
    repo: &dyn ObraRepository,
    args: CreateCertificationArgs,
    config: &ObraConfig,
) -> Result<Certification> {
    let retention_percentage = args
        .retention
        .unwrap_or(config.certification.default_retention_percentage);
    let certification_date = args.date.unwrap_or_else(today);

    let Some(budget) = args.budget else {
        let new = NewCertification {
            code: args.code.clone(),
            project_ref: args.project,
            number: args.number,
            certification_date,
            retention_percentage,
            discount_amount: args.discount,
            notes: args.notes,
            lines: Vec::new(),
        };
        return repo
            .create_certification(new)
            .await
            .with_context(|| format!("cannot create certification '{}'", args.code));
    };

    let file = std::fs::File::open(&budget)
        .with_context(|| format!("cannot open budget '{}'", budget.display()))?;
    let records = BudgetLineLoader::parse(file)
        .with_context(|| format!("cannot read budget '{}'", budget.display()))?;
    let header = NewCertificationHeader {
        code: args.code.clone(),
        project_ref: args.project,
        number: args.number,
        certification_date,
        retention_percentage,
        notes: args.notes,
    };
    let created = BudgetLineLoader::load(repo, header, &records)
        .await
        .with_context(|| format!("cannot create certification '{}'", args.code))?;

    if args.discount.is_zero() {
        return Ok(created);
    }
    adjust_certification(repo, &created, retention_percentage, args.discount)
        .await
        .with_context(|| format!("cannot apply discount to '{}'", args.code))
}

async fn run_certification(
    repo: &dyn ObraRepository,
    cmd: CertificationCommand,
    config: &ObraConfig,
) -> Result<String> {
    debug!(?cmd, "certification command");

    let certification = match cmd {
        CertificationCommand::Create(args) => create_certification(repo, args, config).await?,
        CertificationCommand::AddLine {
            code,
            line,
            description,
            unit,
            unit_price,
            budgeted,
            previous,
        } => {
            let current = load_certification(repo, &code).await?;
            if current.line(&line).is_some() {
                return Err(CertificationError::DuplicateLine(line).into());
            }
            let item =
                CertificationLineItem::new(line, description, unit, unit_price, budgeted, previous);
            edit_certification(repo, &current, |lines| lines.push(item))
                .await
                .with_context(|| format!("cannot edit certification '{code}'"))?
        }
        CertificationCommand::SetQuantity {
            code,
            line,
            quantity,
        } => {
            let current = load_certification(repo, &code).await?;
            set_certification_quantity(repo, &current, &line, quantity)
                .await
                .with_context(|| format!("cannot edit certification '{code}'"))?
        }
        CertificationCommand::Adjust {
            code,
            retention,
            discount,
        } => {
            let current = load_certification(repo, &code).await?;
            adjust_certification(
                repo,
                &current,
                retention.unwrap_or(current.retention_percentage),
                discount.unwrap_or(current.discount_amount),
            )
            .await
            .with_context(|| format!("cannot edit certification '{code}'"))?
        }
        CertificationCommand::Validate { code } => {
            let current = load_certification(repo, &code).await?;
            validate_certification(repo, &current)
                .await
                .with_context(|| format!("cannot validate certification '{code}'"))?
        }
        CertificationCommand::Certify { code } => {
            let current = load_certification(repo, &code).await?;
            certify_certification(repo, &current)
                .await
                .with_context(|| format!("cannot certify certification '{code}'"))?
        }
        CertificationCommand::Reject { code } => {
            let current = load_certification(repo, &code).await?;
            reject_certification(repo, &current)
                .await
                .with_context(|| format!("cannot reject certification '{code}'"))?
        }
        CertificationCommand::Duplicate {
            code,
            new_code,
            date,
        } => {
            let source = load_certification(repo, &code).await?;
            duplicate_certification(repo, &source, &new_code, date.unwrap_or_else(today))
                .await
                .with_context(|| format!("cannot duplicate certification '{code}'"))?
        }
        CertificationCommand::Show { code } => load_certification(repo, &code).await?,
        CertificationCommand::List(args) => {
            let filter = CertificationFilter {
                project_ref: args.project,
                status: args.status,
            };
            let certifications = repo
                .list_certifications(&filter)
                .await
                .context("cannot list certifications")?;
            return Ok(report::certification_list(&certifications));
        }
    };

    Ok(report::certification(&certification))
}
