//! Expense approval workflow
//!
//! Requested → ValidatedByManager → Controlled → Paid. An expense can be rejected
//! until it is controlled, and a manager can send it back to its owner for more
//! information.

use crate::models::people::roles;
use crate::models::{Expense, ExpenseState, User};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseTransition {
    Validate,
    RequestInformation,
    /// Owner only. Acting on one's own expense also requires the administrator
    /// role, so other owners leave `NeedsInformation` by resubmitting the expense.
    ProvideInformation,
    Control,
    Pay,
    Reject,
}

/// Who may fire a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actor {
    Owner,
    /// Expense manager or paymaster
    Manager,
    Paymaster,
}

const TRANSITIONS: [(ExpenseState, ExpenseTransition, ExpenseState, Actor); 7] = [
    (ExpenseState::Requested, ExpenseTransition::Validate, ExpenseState::ValidatedByManager, Actor::Manager),
    (ExpenseState::Requested, ExpenseTransition::Reject, ExpenseState::Rejected, Actor::Manager),
    (ExpenseState::Requested, ExpenseTransition::RequestInformation, ExpenseState::NeedsInformation, Actor::Manager),
    (ExpenseState::NeedsInformation, ExpenseTransition::ProvideInformation, ExpenseState::Requested, Actor::Owner),
    (ExpenseState::ValidatedByManager, ExpenseTransition::Control, ExpenseState::Controlled, Actor::Paymaster),
    (ExpenseState::ValidatedByManager, ExpenseTransition::Reject, ExpenseState::Rejected, Actor::Paymaster),
    (ExpenseState::Controlled, ExpenseTransition::Pay, ExpenseState::Paid, Actor::Paymaster),
];

impl ExpenseTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseTransition::Validate => "validate",
            ExpenseTransition::RequestInformation => "request_information",
            ExpenseTransition::ProvideInformation => "provide_information",
            ExpenseTransition::Control => "control",
            ExpenseTransition::Pay => "pay",
            ExpenseTransition::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "validate" => Some(ExpenseTransition::Validate),
            "request_information" => Some(ExpenseTransition::RequestInformation),
            "provide_information" => Some(ExpenseTransition::ProvideInformation),
            "control" => Some(ExpenseTransition::Control),
            "pay" => Some(ExpenseTransition::Pay),
            "reject" => Some(ExpenseTransition::Reject),
            _ => None,
        }
    }

    /// State reached from `from`, if the transition leaves it
    pub fn target(&self, from: ExpenseState) -> Option<ExpenseState> {
        TRANSITIONS
            .iter()
            .find(|(state, transition, _, _)| *state == from && transition == self)
            .map(|(_, _, to, _)| *to)
    }
}

impl std::fmt::Display for ExpenseTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn actor_allowed(actor: Actor, expense: &Expense, user: &User) -> bool {
    let paymaster = user.has_role(roles::EXPENSE_PAYMASTER);
    match actor {
        Actor::Owner => expense.user == user.username,
        Actor::Manager => paymaster || user.has_role(roles::EXPENSE_MANAGER),
        Actor::Paymaster => paymaster,
    }
}

/// Transitions `user` may fire on the expense in its current state
pub fn available_transitions(expense: &Expense, user: &User) -> Vec<ExpenseTransition> {
    TRANSITIONS
        .iter()
        .filter(|(state, _, _, actor)| {
            *state == expense.state && actor_allowed(*actor, expense, user)
        })
        .map(|(_, transition, _, _)| *transition)
        .collect()
}

/// Whether `user` may fire `transition` on the expense; `None` when the
/// current state has no such transition
pub fn may_fire(expense: &Expense, user: &User, transition: ExpenseTransition) -> Option<bool> {
    TRANSITIONS
        .iter()
        .find(|(state, t, _, _)| *state == expense.state && *t == transition)
        .map(|(_, _, _, actor)| actor_allowed(*actor, expense, user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{expense, sample_dataset};

    #[test]
    fn test_targets() {
        assert_eq!(
            ExpenseTransition::Validate.target(ExpenseState::Requested),
            Some(ExpenseState::ValidatedByManager)
        );
        assert_eq!(
            ExpenseTransition::Reject.target(ExpenseState::ValidatedByManager),
            Some(ExpenseState::Rejected)
        );
        assert_eq!(ExpenseTransition::Pay.target(ExpenseState::Requested), None);
        for state in [ExpenseState::Paid, ExpenseState::Rejected] {
            assert!(state.is_terminal());
            assert!(TRANSITIONS.iter().all(|(from, _, _, _)| *from != state));
        }
    }

    #[test]
    fn test_parse_round_trip() {
        for (_, transition, _, _) in TRANSITIONS {
            assert_eq!(ExpenseTransition::parse(transition.as_str()), Some(transition));
        }
        assert_eq!(ExpenseTransition::parse("approve"), None);
    }

    #[test]
    fn test_available_transitions_by_role() {
        let ds = sample_dataset();
        let requested = expense(1, "bdu", Some(10), ExpenseState::Requested);

        let manager = &ds.users["ama"];
        assert_eq!(
            available_transitions(&requested, manager),
            vec![
                ExpenseTransition::Validate,
                ExpenseTransition::Reject,
                ExpenseTransition::RequestInformation
            ]
        );
        assert!(available_transitions(&requested, &ds.users["cpe"]).is_empty());

        let validated = expense(2, "bdu", None, ExpenseState::ValidatedByManager);
        assert!(available_transitions(&validated, manager).is_empty());
        assert_eq!(
            available_transitions(&validated, &ds.users["dad"]),
            vec![ExpenseTransition::Control, ExpenseTransition::Reject]
        );

        let pending = expense(3, "bdu", None, ExpenseState::NeedsInformation);
        assert_eq!(
            available_transitions(&pending, &ds.users["bdu"]),
            vec![ExpenseTransition::ProvideInformation]
        );
        assert_eq!(may_fire(&pending, manager, ExpenseTransition::ProvideInformation), Some(false));
        assert_eq!(may_fire(&pending, manager, ExpenseTransition::Pay), None);
    }
}
