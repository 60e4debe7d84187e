//! Forward-only lifecycles for settlements and certifications.
//!
//! Every status change and every edit goes through [`Lifecycle::transition`],
//! which looks the `(status, action)` pair up in a single transition table per
//! aggregate. Pairs missing from the table fail with [`InvalidStateError`].
//!
//! | Aggregate     | From                  | Action      | To          |
//! |---------------|-----------------------|-------------|-------------|
//! | settlement    | draft                 | edit        | draft       |
//! | settlement    | draft                 | calculate   | calculated  |
//! | settlement    | calculated            | approve     | approved    |
//! | settlement    | approved              | mark_paid   | paid        |
//! | certification | draft                 | edit        | draft       |
//! | certification | draft                 | validate    | validated   |
//! | certification | validated             | certify     | certified   |
//! | certification | draft, validated      | reject      | rejected    |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An action was attempted on an aggregate whose status does not allow it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot {action} {aggregate} in status '{status}'")]
pub struct InvalidStateError {
    pub aggregate: &'static str,
    pub status: &'static str,
    pub action: &'static str,
}

/// A status enum with a transition table.
pub trait Lifecycle: Copy + Eq + fmt::Debug {
    type Action: Copy + Eq + fmt::Debug;

    /// Aggregate name used in error messages.
    const AGGREGATE: &'static str;

    /// The action that edits content without changing status.
    const EDIT: Self::Action;

    /// The transition table. `None` means the action is not allowed.
    fn next(self, action: Self::Action) -> Option<Self>;

    fn status_code(self) -> &'static str;

    fn action_code(action: Self::Action) -> &'static str;

    fn transition(self, action: Self::Action) -> Result<Self, InvalidStateError> {
        self.next(action).ok_or(InvalidStateError {
            aggregate: Self::AGGREGATE,
            status: self.status_code(),
            action: Self::action_code(action),
        })
    }

    fn allows_edit(self) -> bool {
        self.next(Self::EDIT).is_some()
    }

    fn is_terminal(self) -> bool;
}

// ─────────────────────────────────────────────────────────────────────────────
// settlement
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    #[default]
    Draft,
    Calculated,
    Approved,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettlementAction {
    Edit,
    Calculate,
    Approve,
    MarkPaid,
}

impl SettlementStatus {
    pub const ALL: [SettlementStatus; 4] = [
        Self::Draft,
        Self::Calculated,
        Self::Approved,
        Self::Paid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Calculated => "calculated",
            Self::Approved => "approved",
            Self::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "calculated" => Some(Self::Calculated),
            "approved" => Some(Self::Approved),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Calculated => "Calculated",
            Self::Approved => "Approved",
            Self::Paid => "Paid",
        }
    }
}

impl SettlementAction {
    pub const ALL: [SettlementAction; 4] = [
        Self::Edit,
        Self::Calculate,
        Self::Approve,
        Self::MarkPaid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Calculate => "calculate",
            Self::Approve => "approve",
            Self::MarkPaid => "mark_paid",
        }
    }
}

impl Lifecycle for SettlementStatus {
    type Action = SettlementAction;

    const AGGREGATE: &'static str = "settlement";
    const EDIT: SettlementAction = SettlementAction::Edit;

    fn next(self, action: SettlementAction) -> Option<Self> {
        use SettlementAction as A;
        use SettlementStatus as S;

        match (self, action) {
            (S::Draft, A::Edit) => Some(S::Draft),
            (S::Draft, A::Calculate) => Some(S::Calculated),
            (S::Calculated, A::Approve) => Some(S::Approved),
            (S::Approved, A::MarkPaid) => Some(S::Paid),
            _ => None,
        }
    }

    fn status_code(self) -> &'static str {
        self.as_str()
    }

    fn action_code(action: SettlementAction) -> &'static str {
        action.as_str()
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Paid)
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// certification
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationStatus {
    #[default]
    Draft,
    Validated,
    Certified,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificationAction {
    Edit,
    Validate,
    Certify,
    Reject,
}

impl CertificationStatus {
    pub const ALL: [CertificationStatus; 4] = [
        Self::Draft,
        Self::Validated,
        Self::Certified,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Validated => "validated",
            Self::Certified => "certified",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "validated" => Some(Self::Validated),
            "certified" => Some(Self::Certified),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Validated => "Validated",
            Self::Certified => "Certified",
            Self::Rejected => "Rejected",
        }
    }
}

impl CertificationAction {
    pub const ALL: [CertificationAction; 4] = [
        Self::Edit,
        Self::Validate,
        Self::Certify,
        Self::Reject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Validate => "validate",
            Self::Certify => "certify",
            Self::Reject => "reject",
        }
    }
}

impl Lifecycle for CertificationStatus {
    type Action = CertificationAction;

    const AGGREGATE: &'static str = "certification";
    const EDIT: CertificationAction = CertificationAction::Edit;

    fn next(self, action: CertificationAction) -> Option<Self> {
        use CertificationAction as A;
        use CertificationStatus as S;

        match (self, action) {
            (S::Draft, A::Edit) => Some(S::Draft),
            (S::Draft, A::Validate) => Some(S::Validated),
            (S::Validated, A::Certify) => Some(S::Certified),
            (S::Draft | S::Validated, A::Reject) => Some(S::Rejected),
            _ => None,
        }
    }

    fn status_code(self) -> &'static str {
        self.as_str()
    }

    fn action_code(action: CertificationAction) -> &'static str {
        action.as_str()
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Certified | Self::Rejected)
    }
}

impl fmt::Display for CertificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
