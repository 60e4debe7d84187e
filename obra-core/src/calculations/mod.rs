//! Settlement and certification calculators.
//!
//! Both calculators are pure reducers over in-memory entry collections: the
//! caller passes the full collection on every change and gets the derived
//! totals back. They hold no state and perform no I/O.

pub mod certification;
pub mod common;
pub mod settlement;

pub use certification::{
    CertificationTotals, apply_quantity, compute_document_totals, duplicate_lines,
};
pub use settlement::{SettlementTotals, compute_totals};
