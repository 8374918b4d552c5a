//! Data models for consultboard

pub mod billing;
pub mod dataset;
pub mod expense;
pub mod lead;
pub mod mission;
pub mod people;

pub use billing::{BillDetail, BillExpense, BillId, BillState, ClientBill};
pub use dataset::{Dataset, MarginMode, WorkFilter};
pub use expense::{Expense, ExpenseDraft, ExpenseId, ExpenseState};
pub use lead::{Lead, LeadId, LeadState};
pub use mission::{
    BillingMode, FinancialCondition, Holiday, LunchTicket, Mission, MissionId, MissionNature,
    Staffing, Timesheet, PROBABILITIES,
};
pub use people::{
    Consultant, ConsultantId, ConsultantProfile, RateObjective, RateObjectiveType, Subsidiary,
    SubsidiaryId, User,
};
