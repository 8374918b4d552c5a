//! Missions and the time records attached to them

use super::lead::{Lead, LeadId};
use super::people::{ConsultantId, SubsidiaryId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type MissionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionNature {
    Prod,
    #[serde(rename = "NONPROD")]
    NonProd,
    Holidays,
}

impl MissionNature {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionNature::Prod => "PROD",
            MissionNature::NonProd => "NONPROD",
            MissionNature::Holidays => "HOLIDAYS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "PROD" => Some(MissionNature::Prod),
            "NONPROD" => Some(MissionNature::NonProd),
            "HOLIDAYS" => Some(MissionNature::Holidays),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode {
    FixedPrice,
    TimeSpent,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMode::FixedPrice => "FIXED_PRICE",
            BillingMode::TimeSpent => "TIME_SPENT",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BillingMode::FixedPrice => "Fixed price",
            BillingMode::TimeSpent => "Time spent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "FIXED_PRICE" => Some(BillingMode::FixedPrice),
            "TIME_SPENT" => Some(BillingMode::TimeSpent),
            _ => None,
        }
    }
}

/// Allowed mission probabilities, in percent
pub const PROBABILITIES: [u8; 5] = [0, 25, 50, 75, 100];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    #[serde(default)]
    pub lead_id: Option<LeadId>,
    /// Suffix appended to the lead deal id
    #[serde(default)]
    pub deal_id: String,
    #[serde(default)]
    pub description: String,
    pub nature: MissionNature,
    pub billing_mode: BillingMode,
    #[serde(default = "default_probability")]
    pub probability: u8,
    #[serde(default = "default_true")]
    pub probability_auto: bool,
    /// Sold price in k€
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default = "default_true")]
    pub active: bool,
    pub subsidiary_id: SubsidiaryId,
    #[serde(default)]
    pub responsible_id: Option<ConsultantId>,
}

fn default_probability() -> u8 {
    50
}

fn default_true() -> bool {
    true
}

impl Mission {
    /// Full commercial reference, lead deal id followed by the mission suffix
    pub fn mission_id(&self, lead: Option<&Lead>) -> String {
        match lead {
            Some(lead) => format!("{}{}", lead.deal_id, self.deal_id),
            None => self.deal_id.clone(),
        }
    }

    pub fn short_name(&self, lead: Option<&Lead>) -> String {
        match lead {
            Some(lead) if self.description.is_empty() => lead.name.clone(),
            Some(lead) => format!("{} {}", lead.name, self.description),
            None => self.description.clone(),
        }
    }

    pub fn full_name(&self, lead: Option<&Lead>) -> String {
        match lead {
            Some(lead) if self.description.is_empty() => {
                format!("{} : {}", lead.client_company, lead.name)
            }
            Some(lead) => format!(
                "{} : {} - {}",
                lead.client_company, lead.name, self.description
            ),
            None => self.description.clone(),
        }
    }

    pub fn is_fixed_price(&self) -> bool {
        self.billing_mode == BillingMode::FixedPrice
    }
}

/// A worked day (or fraction of day) on a mission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timesheet {
    pub consultant_id: ConsultantId,
    pub mission_id: MissionId,
    pub working_date: NaiveDate,
    pub charge: f64,
}

/// Forecasted days of a consultant on a mission for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Staffing {
    pub consultant_id: ConsultantId,
    pub mission_id: MissionId,
    /// Always the first day of the month
    pub staffing_date: NaiveDate,
    pub charge: f64,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub update_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_user: Option<String>,
}

/// Sold (and for subcontractors bought) daily rate of a consultant on a mission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialCondition {
    pub consultant_id: ConsultantId,
    pub mission_id: MissionId,
    pub daily_rate: f64,
    #[serde(default)]
    pub bought_daily_rate: Option<f64>,
}

/// Public holiday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub day: NaiveDate,
    #[serde(default)]
    pub description: String,
}

/// Day on which the consultant does not get a lunch ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LunchTicket {
    pub consultant_id: ConsultantId,
    pub lunch_date: NaiveDate,
    #[serde(default = "default_true")]
    pub no_ticket: bool,
}
