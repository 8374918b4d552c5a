//! Commercial leads

use super::people::{ConsultantId, SubsidiaryId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type LeadId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadState {
    #[default]
    Qualif,
    WrittenOffer,
    OfferSent,
    Negotiation,
    Won,
    Lost,
    Forgiven,
    Sleeping,
}

/// A sales opportunity for a client; missions hang off won leads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    /// Commercial reference, prefix of mission ids
    #[serde(default)]
    pub deal_id: String,
    #[serde(default)]
    pub client_organisation: String,
    pub client_company: String,
    #[serde(default)]
    pub business_broker: Option<String>,
    pub subsidiary_id: SubsidiaryId,
    #[serde(default)]
    pub responsible_id: Option<ConsultantId>,
    #[serde(default)]
    pub state: LeadState,
    /// Sold price in k€
    #[serde(default)]
    pub sales: Option<f64>,
    pub creation_date: NaiveDate,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Consultants foreseen on the lead
    #[serde(default)]
    pub staffing: Vec<ConsultantId>,
}

impl std::fmt::Display for Lead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.client_company, self.name)
    }
}
