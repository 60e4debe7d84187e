mod categories;
mod certification;
mod settlement;

pub use categories::{DeductionCategory, HourCategory, IncidentCategory, IncomeCategory};
pub use certification::{
    Certification, CertificationError, CertificationLineItem, NewCertification,
};
pub use settlement::{
    AdditionalIncomeEntry, DeductionEntry, IncidentEntry, NewSettlement, Settlement,
    SettlementEntries, SettlementError, WorkedHourEntry,
};

pub use crate::calculations::{CertificationTotals, SettlementTotals};
pub use crate::lifecycle::{CertificationStatus, SettlementStatus};
