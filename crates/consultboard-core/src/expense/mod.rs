//! Expense reports: dashboard, submission, history and workflow transitions
//!
//! Expenses are held by the store outside of [`Dataset`]; functions here take
//! a snapshot of them and return the updated expense for the store to persist.

pub mod workflow;

pub use workflow::{available_transitions, may_fire, ExpenseTransition};

use crate::error::CoreError;
use crate::models::people::roles;
use crate::models::{Dataset, Expense, ExpenseDraft, ExpenseId, ExpenseState, MissionId, User};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Group a user must belong to before filing expenses
pub const EXPENSE_REQUESTER_GROUP: &str = "expense_requester";

/// Days after which an expense in a terminal state leaves the dashboard
pub const PRUNE_AFTER_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseRow {
    #[serde(flatten)]
    pub expense: Expense,
    pub state_label: &'static str,
    /// `None` on the user's own expenses
    pub transitions: Option<Vec<ExpenseTransition>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpensesDashboard {
    pub user_expenses: Vec<ExpenseRow>,
    pub managed_expenses: Vec<ExpenseRow>,
}

/// Usernames of the user's hierarchical team, the user included
fn team_usernames(ds: &Dataset, user: &User) -> Vec<String> {
    let Some(consultant) = ds.consultant_for_user(user) else {
        return Vec::new();
    };
    ds.team(consultant.id, false, false, false)
        .into_iter()
        .map(|c| c.trigramme.to_lowercase())
        .collect()
}

fn in_team(team: &[String], username: &str) -> bool {
    team.iter().any(|member| member.eq_ignore_ascii_case(username))
}

fn is_paymaster(user: &User) -> bool {
    user.has_role(roles::EXPENSE_PAYMASTER)
}

/// Expenses in a terminal state not touched for [`PRUNE_AFTER_DAYS`]
pub fn expenses_to_prune(expenses: &[Arc<Expense>], today: NaiveDate) -> Vec<ExpenseId> {
    let limit = today - Duration::days(PRUNE_AFTER_DAYS);
    expenses
        .iter()
        .filter(|e| e.workflow_in_progress && e.state.is_terminal() && e.update_date < limit)
        .map(|e| e.id)
        .collect()
}

/// The user's own expenses in progress and the ones they can act on
///
/// A paymaster manages every other expense; anybody else manages their team's.
pub fn expenses_dashboard(
    ds: &Dataset,
    expenses: &[Arc<Expense>],
    username: &str,
) -> Result<ExpensesDashboard, CoreError> {
    let user = ds.user(username)?;
    if !user.in_group(EXPENSE_REQUESTER_GROUP) {
        return Err(CoreError::permission_denied(username, "file expenses"));
    }
    let team = team_usernames(ds, user);
    let paymaster = is_paymaster(user);

    let in_progress = expenses.iter().filter(|e| e.workflow_in_progress);
    let mut user_expenses: Vec<ExpenseRow> = in_progress
        .clone()
        .filter(|e| e.user == username)
        .map(|e| ExpenseRow {
            expense: Expense::clone(e),
            state_label: e.state.label(),
            transitions: None,
        })
        .collect();
    user_expenses.sort_by_key(|row| (row.expense.state, row.expense.id));

    let mut managed_expenses: Vec<ExpenseRow> = in_progress
        .filter(|e| e.user != username)
        .filter(|e| paymaster || in_team(&team, &e.user))
        .map(|e| ExpenseRow {
            expense: Expense::clone(e),
            state_label: e.state.label(),
            transitions: Some(available_transitions(e, user)),
        })
        .collect();
    managed_expenses.sort_by(|a, b| {
        a.expense
            .user
            .cmp(&b.expense.user)
            .then(a.expense.state.cmp(&b.expense.state))
    });

    debug!(
        user = username,
        own = user_expenses.len(),
        managed = managed_expenses.len(),
        "Expense dashboard built"
    );
    Ok(ExpensesDashboard {
        user_expenses,
        managed_expenses,
    })
}

fn validate_draft(ds: &Dataset, draft: &ExpenseDraft) -> Result<(), CoreError> {
    if draft.description.trim().is_empty() {
        return Err(CoreError::invalid_value("description", "an expense needs a description"));
    }
    if !draft.amount.is_finite() || draft.amount < 0.0 {
        return Err(CoreError::invalid_value(
            "amount",
            format!("{} is not a valid amount", draft.amount),
        ));
    }
    if let Some(lead_id) = draft.lead_id {
        ds.lead(lead_id)?;
    }
    Ok(())
}

/// Create an expense, or edit `existing` on behalf of its owner or a team manager
///
/// Saving restarts the workflow from its initial state.
pub fn submit_expense(
    ds: &Dataset,
    username: &str,
    draft: &ExpenseDraft,
    existing: Option<&Expense>,
    new_id: ExpenseId,
    today: NaiveDate,
) -> Result<Expense, CoreError> {
    let user = ds.user(username)?;
    if !user.in_group(EXPENSE_REQUESTER_GROUP) {
        return Err(CoreError::permission_denied(username, "file expenses"));
    }
    validate_draft(ds, draft)?;

    let (id, owner) = match existing {
        Some(expense) => {
            let team = team_usernames(ds, user);
            let related = expense.user == username || in_team(&team, &expense.user);
            if !(related && expense.state.is_editable()) {
                return Err(CoreError::permission_denied(
                    username,
                    format!("edit expense {}", expense.id),
                ));
            }
            (expense.id, expense.user.clone())
        }
        None => (new_id, username.to_string()),
    };

    let expense = Expense {
        id,
        user: owner,
        lead_id: draft.lead_id,
        description: draft.description.trim().to_string(),
        category: draft.category.clone(),
        amount: draft.amount,
        chargeable: draft.chargeable,
        creation_date: today,
        expense_date: draft.expense_date,
        update_date: today,
        receipt: draft
            .receipt
            .clone()
            .or_else(|| existing.and_then(|e| e.receipt.clone())),
        workflow_in_progress: true,
        state: ExpenseState::Requested,
    };
    info!(user = username, expense = id, amount = expense.amount, edit = existing.is_some(), "Expense saved");
    Ok(expense)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptInfo {
    /// Relative to the data directory
    pub path: String,
    pub content_type: String,
}

/// Receipt of an expense, readable by its owner, paymasters and expense managers
pub fn expense_receipt(
    ds: &Dataset,
    username: &str,
    expense: &Expense,
) -> Result<Option<ReceiptInfo>, CoreError> {
    let user = ds.user(username)?;
    let allowed =
        expense.user == username || is_paymaster(user) || user.has_role(roles::EXPENSE_MANAGER);
    if !allowed {
        return Err(CoreError::permission_denied(
            username,
            format!("read receipt of expense {}", expense.id),
        ));
    }
    Ok(expense.receipt.as_ref().map(|path| ReceiptInfo {
        path: path.clone(),
        content_type: mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }))
}

/// Every expense for a paymaster, own and team expenses for anybody else
pub fn expenses_history(
    ds: &Dataset,
    expenses: &[Arc<Expense>],
    username: &str,
) -> Result<Vec<Arc<Expense>>, CoreError> {
    let user = ds.user(username)?;
    let mut history: Vec<Arc<Expense>> = if is_paymaster(user) {
        expenses.to_vec()
    } else {
        let team = team_usernames(ds, user);
        expenses
            .iter()
            .filter(|e| e.user == username || in_team(&team, &e.user))
            .cloned()
            .collect()
    };
    history.sort_by_key(|e| std::cmp::Reverse((e.expense_date, e.id)));
    Ok(history)
}

/// Expenses filed on the mission's lead; none for a mission without lead
pub fn mission_expenses(
    ds: &Dataset,
    expenses: &[Arc<Expense>],
    mission_id: MissionId,
) -> Vec<Arc<Expense>> {
    let Some(lead_id) = ds.missions.get(&mission_id).and_then(|m| m.lead_id) else {
        return Vec::new();
    };
    let mut related: Vec<Arc<Expense>> = expenses
        .iter()
        .filter(|e| e.lead_id == Some(lead_id))
        .cloned()
        .collect();
    related.sort_by_key(|e| (e.expense_date, e.id));
    related
}

/// Fire a workflow transition, returning the updated expense
pub fn update_expense_state(
    ds: &Dataset,
    username: &str,
    expense: &Expense,
    transition: &str,
    today: NaiveDate,
) -> Result<Expense, CoreError> {
    let user = ds.user(username)?;
    if expense.user == username && !user.has_role(roles::EXPENSE_ADMINISTRATOR) {
        return Err(CoreError::permission_denied(
            username,
            format!("manage own expense {}", expense.id),
        ));
    }
    let invalid = || CoreError::InvalidTransition {
        transition: transition.to_string(),
        state: expense.state.label().to_string(),
    };
    let parsed = ExpenseTransition::parse(transition).ok_or_else(invalid)?;
    let target = parsed.target(expense.state).ok_or_else(invalid)?;
    if may_fire(expense, user, parsed) != Some(true) {
        return Err(CoreError::permission_denied(
            username,
            format!("{parsed} expense {}", expense.id),
        ));
    }

    let mut updated = expense.clone();
    updated.state = target;
    updated.update_date = today;
    info!(
        user = username,
        expense = expense.id,
        from = %expense.state,
        to = %target,
        "Expense state updated"
    );
    Ok(updated)
}
