//! Expense reports submitted by consultants

use super::lead::LeadId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type ExpenseId = u64;

/// Position of an expense in the approval workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseState {
    #[default]
    Requested,
    NeedsInformation,
    ValidatedByManager,
    Controlled,
    Paid,
    Rejected,
}

impl ExpenseState {
    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExpenseState::Paid | ExpenseState::Rejected)
    }

    /// The requester may still edit the expense
    pub fn is_editable(&self) -> bool {
        matches!(self, ExpenseState::Requested | ExpenseState::NeedsInformation)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExpenseState::Requested => "Requested",
            ExpenseState::NeedsInformation => "Needs information",
            ExpenseState::ValidatedByManager => "Validated by manager",
            ExpenseState::Controlled => "Controlled",
            ExpenseState::Paid => "Paid",
            ExpenseState::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for ExpenseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    /// Username of the requester
    pub user: String,
    #[serde(default)]
    pub lead_id: Option<LeadId>,
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub amount: f64,
    /// Re-billed to the client
    #[serde(default)]
    pub chargeable: bool,
    pub creation_date: NaiveDate,
    pub expense_date: NaiveDate,
    pub update_date: NaiveDate,
    /// Path of the receipt file, relative to the data directory
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default = "default_true")]
    pub workflow_in_progress: bool,
    #[serde(default)]
    pub state: ExpenseState,
}

fn default_true() -> bool {
    true
}

/// Fields a requester fills in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    #[serde(default)]
    pub lead_id: Option<LeadId>,
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub chargeable: bool,
    pub expense_date: NaiveDate,
    #[serde(default)]
    pub receipt: Option<String>,
}
