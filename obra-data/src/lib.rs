//! Bulk import of contract budgets into certifications.

pub mod loader;

pub use loader::{BudgetLineLoader, BudgetLineLoaderError, BudgetLineRecord, NewCertificationHeader};
