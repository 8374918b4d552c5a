//! Consultants, subsidiaries, profiles and application users

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type ConsultantId = u64;
pub type SubsidiaryId = u64;

/// Company of the group employing consultants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subsidiary {
    pub id: SubsidiaryId,
    pub name: String,
    #[serde(default)]
    pub code: String,
}

/// Seniority profile ("Junior", "Senior", "Manager"...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultantProfile {
    pub id: u64,
    pub name: String,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultant {
    pub id: ConsultantId,
    pub name: String,
    pub trigramme: String,
    /// Employing subsidiary
    pub company_id: SubsidiaryId,
    pub profil_id: u64,
    #[serde(default)]
    pub manager_id: Option<ConsultantId>,
    /// Team leader for staffing purposes
    #[serde(default)]
    pub staffing_manager_id: Option<ConsultantId>,
    #[serde(default = "default_true")]
    pub productive: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub subcontractor: bool,
}

fn default_true() -> bool {
    true
}

impl std::fmt::Display for Consultant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateObjectiveType {
    DailyRate,
    ProdRate,
}

/// Objective valid from `start_date` until the next objective of the same type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateObjective {
    pub consultant_id: ConsultantId,
    pub start_date: NaiveDate,
    /// Euros per day for [`RateObjectiveType::DailyRate`], percent for
    /// [`RateObjectiveType::ProdRate`]
    pub rate: f64,
    pub rate_type: RateObjectiveType,
}

/// Permission codenames checked by the business rules
pub mod perms {
    pub const ADD_TIMESHEET: &str = "staffing.add_timesheet";
    pub const CHANGE_TIMESHEET: &str = "staffing.change_timesheet";
    pub const DELETE_TIMESHEET: &str = "staffing.delete_timesheet";
    pub const ADD_FINANCIAL_CONDITION: &str = "staffing.add_financialcondition";
    pub const CHANGE_FINANCIAL_CONDITION: &str = "staffing.change_financialcondition";
    pub const ADD_MISSION: &str = "staffing.add_mission";
    pub const CHANGE_MISSION: &str = "staffing.change_mission";
    pub const ADD_STAFFING: &str = "staffing.add_staffing";
    pub const ADD_BILL: &str = "billing.add_clientbill";
}

/// Feature flags granted to users
pub mod features {
    pub const TIMESHEET_ALL: &str = "timesheet_all";
    pub const TIMESHEET_CURRENT_MONTH: &str = "timesheet_current_month";
    pub const TIMESHEET_SUBCONTRACTOR: &str = "timesheet_subcontractor";
    pub const STAFFING_MASS: &str = "staffing_mass";
    pub const REPORTS: &str = "reports";
    pub const MANAGEMENT: &str = "management";
}

/// Expense workflow roles
pub mod roles {
    pub const EXPENSE_PAYMASTER: &str = "expense paymaster";
    pub const EXPENSE_ADMINISTRATOR: &str = "expense administrator";
    pub const EXPENSE_MANAGER: &str = "expense manager";
}

/// Application account; linked to a consultant through its trigramme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    #[serde(default)]
    pub features: BTreeSet<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            permissions: BTreeSet::new(),
            features: BTreeSet::new(),
            roles: BTreeSet::new(),
            groups: BTreeSet::new(),
        }
    }

    pub fn has_perm(&self, perm: &str) -> bool {
        self.permissions.contains(perm)
    }

    pub fn has_perms(&self, perms: &[&str]) -> bool {
        perms.iter().all(|p| self.has_perm(p))
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    pub fn trigramme(&self) -> String {
        self.username.to_uppercase()
    }
}
