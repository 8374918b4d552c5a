//! Staffing and mission mutations: mass staffing, rates, mission attributes,
//! mission creation and automatic staffing of fixed price missions

use crate::calendar::{add_months, month_start, next_month, working_days};
use crate::error::CoreError;
use crate::models::people::{features, perms};
use crate::models::{
    BillingMode, ConsultantId, Dataset, FinancialCondition, LeadId, Mission, MissionId,
    Staffing, PROBABILITIES,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Comment put on staffing generated by [`compute_automatic_staffing`]
pub const AUTOMATIC_STAFFING_COMMENT: &str = "automatic staffing";

#[allow(clippy::too_many_arguments)]
fn upsert_staffing(
    ds: &mut Dataset,
    consultant_id: ConsultantId,
    mission_id: MissionId,
    month: NaiveDate,
    charge: f64,
    comment: Option<String>,
    username: &str,
    now: DateTime<Utc>,
) {
    let month = month_start(month);
    let index = match ds.staffings.iter().position(|s| {
        s.consultant_id == consultant_id && s.mission_id == mission_id && s.staffing_date == month
    }) {
        Some(i) => i,
        None => {
            ds.staffings.push(Staffing {
                consultant_id,
                mission_id,
                staffing_date: month,
                charge: 0.0,
                comment: None,
                update_date: None,
                last_user: None,
            });
            ds.staffings.len() - 1
        }
    };
    let staffing = &mut ds.staffings[index];
    staffing.charge = charge;
    staffing.comment = comment;
    staffing.update_date = Some(now);
    staffing.last_user = Some(username.to_string());
}

/// Mass staffing form content
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MassStaffingRequest {
    pub missions: Vec<MissionId>,
    #[serde(default)]
    pub consultants: Vec<ConsultantId>,
    /// Staff every active productive employee instead of `consultants`
    #[serde(default)]
    pub all_consultants: bool,
    pub months: Vec<NaiveDate>,
    pub charge: f64,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Set the same charge for every (mission, consultant, month) combination
///
/// Returns the number of staffing lines written.
pub fn mass_staffing(
    ds: &mut Dataset,
    username: &str,
    request: &MassStaffingRequest,
    now: DateTime<Utc>,
) -> Result<usize, CoreError> {
    if !ds.user(username)?.has_feature(features::STAFFING_MASS) {
        return Err(CoreError::permission_denied(username, "mass staffing"));
    }
    if !request.charge.is_finite() || request.charge < 0.0 {
        return Err(CoreError::invalid_value(
            "charge",
            format!("{} is not a valid charge", request.charge),
        ));
    }
    for mission_id in &request.missions {
        ds.mission(*mission_id)?;
    }
    let consultants: Vec<ConsultantId> = if request.all_consultants {
        ds.productive_consultants().iter().map(|c| c.id).collect()
    } else {
        for consultant_id in &request.consultants {
            ds.consultant(*consultant_id)?;
        }
        request.consultants.clone()
    };

    let mut written = 0;
    for mission_id in &request.missions {
        for consultant_id in &consultants {
            for month in &request.months {
                upsert_staffing(
                    ds,
                    *consultant_id,
                    *mission_id,
                    *month,
                    request.charge,
                    request.comment.clone(),
                    username,
                    now,
                );
                written += 1;
            }
        }
    }
    info!(user = username, lines = written, charge = request.charge, "Mass staffing saved");
    Ok(written)
}

/// Which rate of a financial condition is edited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateKind {
    Sold,
    Bought,
}

/// Parse an inline edit target of the form `sold-{mission}-{consultant}`
pub fn parse_rate_target(target: &str) -> Result<(RateKind, MissionId, ConsultantId), CoreError> {
    let invalid = || CoreError::invalid_value("id", format!("{target} is not a rate target"));
    let mut parts = target.split('-');
    let (Some(kind), Some(mission), Some(consultant), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };
    let kind = match kind {
        "sold" => RateKind::Sold,
        "bought" => RateKind::Bought,
        _ => return Err(invalid()),
    };
    let mission = mission.parse().map_err(|_| invalid())?;
    let consultant = consultant.parse().map_err(|_| invalid())?;
    Ok((kind, mission, consultant))
}

/// Set the sold or bought daily rate of a consultant on a mission, creating the
/// financial condition when missing
pub fn mission_consultant_rate(
    ds: &mut Dataset,
    username: &str,
    target: &str,
    value: &str,
) -> Result<f64, CoreError> {
    let user = ds.user(username)?;
    if !user.has_perms(&[perms::ADD_FINANCIAL_CONDITION, perms::CHANGE_FINANCIAL_CONDITION]) {
        return Err(CoreError::permission_denied(username, "change daily rates"));
    }
    let (kind, mission_id, consultant_id) = parse_rate_target(target)?;
    ds.mission(mission_id)?;
    ds.consultant(consultant_id)?;
    let rate = value
        .replace(' ', "")
        .parse::<f64>()
        .ok()
        .filter(|r| r.is_finite())
        .ok_or_else(|| CoreError::invalid_value("value", format!("{value} is not a rate")))?;

    let index = match ds
        .financial_conditions
        .iter()
        .position(|fc| fc.mission_id == mission_id && fc.consultant_id == consultant_id)
    {
        Some(i) => i,
        None => {
            ds.financial_conditions.push(FinancialCondition {
                consultant_id,
                mission_id,
                daily_rate: 0.0,
                bought_daily_rate: None,
            });
            ds.financial_conditions.len() - 1
        }
    };
    let condition = &mut ds.financial_conditions[index];
    match kind {
        RateKind::Sold => {
            info!(
                user = username,
                mission = mission_id,
                consultant = consultant_id,
                old = condition.daily_rate,
                new = rate,
                "Sold daily rate changed"
            );
            condition.daily_rate = rate;
        }
        RateKind::Bought => {
            info!(
                user = username,
                mission = mission_id,
                consultant = consultant_id,
                old = ?condition.bought_daily_rate,
                new = rate,
                "Bought daily rate changed"
            );
            condition.bought_daily_rate = Some(rate);
        }
    }
    Ok(rate)
}

/// Mission attributes editable inline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionAttribute {
    BillingMode,
    Probability,
}

impl MissionAttribute {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "billing_mode" => Some(MissionAttribute::BillingMode),
            "probability" => Some(MissionAttribute::Probability),
            _ => None,
        }
    }
}

fn probability_label(probability: u8) -> &'static str {
    match probability {
        0 => "Null",
        25 => "Low",
        50 => "Normal",
        75 => "High",
        _ => "Certain",
    }
}

/// Allowed values of an attribute with their display label
pub fn mission_update_values(attribute: MissionAttribute) -> Vec<(String, String)> {
    match attribute {
        MissionAttribute::BillingMode => [BillingMode::FixedPrice, BillingMode::TimeSpent]
            .iter()
            .map(|m| (m.as_str().to_string(), m.label().to_string()))
            .collect(),
        MissionAttribute::Probability => PROBABILITIES
            .iter()
            .map(|p| (p.to_string(), probability_label(*p).to_string()))
            .collect(),
    }
}

/// Update one mission attribute, returning the label of the new value
///
/// A manual probability stops the lead state from driving it.
pub fn mission_update(
    ds: &mut Dataset,
    username: &str,
    attribute: MissionAttribute,
    mission_id: MissionId,
    value: &str,
) -> Result<String, CoreError> {
    if !ds.user(username)?.has_perm(perms::CHANGE_MISSION) {
        return Err(CoreError::permission_denied(username, "change mission"));
    }
    let mission = ds
        .missions
        .get_mut(&mission_id)
        .ok_or(CoreError::MissionNotFound { id: mission_id })?;
    let label = match attribute {
        MissionAttribute::BillingMode => {
            let mode = BillingMode::parse(value).ok_or_else(|| {
                CoreError::invalid_value("billing_mode", format!("{value} is not a billing mode"))
            })?;
            mission.billing_mode = mode;
            mode.label().to_string()
        }
        MissionAttribute::Probability => {
            let probability = value
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|p| PROBABILITIES.contains(p))
                .ok_or_else(|| {
                    CoreError::invalid_value("probability", format!("{value} is not a probability"))
                })?;
            mission.probability = probability;
            mission.probability_auto = false;
            probability_label(probability).to_string()
        }
    };
    info!(user = username, mission = mission_id, ?attribute, value, "Mission updated");
    Ok(label)
}

/// Add a mission to a lead that already has one, modelled on its first mission
///
/// Consultants staffed on the lead get an empty staffing line for the current month.
pub fn create_new_mission_from_lead(
    ds: &mut Dataset,
    username: &str,
    lead_id: LeadId,
    now: DateTime<Utc>,
) -> Result<MissionId, CoreError> {
    if !ds.user(username)?.has_perm(perms::ADD_MISSION) {
        return Err(CoreError::permission_denied(username, "add mission"));
    }
    let lead = ds.lead(lead_id)?.clone();
    let model = ds
        .missions
        .values()
        .find(|m| m.lead_id == Some(lead_id))
        .ok_or_else(|| {
            CoreError::invalid_value("lead", format!("lead {} has no mission defined", lead.deal_id))
        })?;

    let id = ds.missions.keys().next_back().map_or(1, |last| last + 1);
    let mission = Mission {
        id,
        lead_id: Some(lead_id),
        deal_id: String::new(),
        description: String::new(),
        nature: model.nature,
        billing_mode: BillingMode::TimeSpent,
        probability: model.probability,
        probability_auto: true,
        price: None,
        active: true,
        subsidiary_id: lead.subsidiary_id,
        responsible_id: lead.responsible_id,
    };
    ds.missions.insert(id, mission);

    let month = month_start(now.date_naive());
    for consultant_id in &lead.staffing {
        upsert_staffing(ds, *consultant_id, id, month, 0.0, None, username, now);
    }
    info!(user = username, lead = lead_id, mission = id, "Mission created from lead");
    Ok(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeactivateOutcome {
    pub error: bool,
    pub id: MissionId,
}

pub fn deactivate_mission(ds: &mut Dataset, mission_id: MissionId) -> DeactivateOutcome {
    match ds.missions.get_mut(&mission_id) {
        Some(mission) => {
            mission.active = false;
            info!(mission = mission_id, "Mission deactivated");
            DeactivateOutcome {
                error: false,
                id: mission_id,
            }
        }
        None => DeactivateOutcome {
            error: true,
            id: mission_id,
        },
    }
}

/// How automatic staffing treats the forecast already in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoStaffingMode {
    /// Keep the forecast and staff the remaining budget after its last month
    After,
    /// Drop the forecast from the current month and staff the whole remaining budget
    Replace,
}

impl AutoStaffingMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "after" => Some(AutoStaffingMode::After),
            "replace" => Some(AutoStaffingMode::Replace),
            _ => None,
        }
    }
}

fn quarter_day(days: f64) -> f64 {
    (days * 4.0).round() / 4.0
}

/// Spread the remaining budget of a fixed price mission over `duration` months
///
/// Every consultant with a sold rate gets the same number of days each month,
/// capped at the month's working days. Returns the number of staffing lines written.
pub fn compute_automatic_staffing(
    ds: &mut Dataset,
    username: &str,
    mission_id: MissionId,
    mode: AutoStaffingMode,
    duration: u32,
    now: DateTime<Utc>,
) -> Result<usize, CoreError> {
    if !ds.user(username)?.has_perm(perms::ADD_STAFFING) {
        return Err(CoreError::permission_denied(username, "add staffing"));
    }
    let mission = ds.mission(mission_id)?.clone();
    let price = mission
        .price
        .filter(|_| mission.is_fixed_price())
        .ok_or_else(|| {
            CoreError::invalid_value("mission", "automatic staffing needs a fixed price mission with a price")
        })?;
    if duration == 0 {
        return Err(CoreError::invalid_value("duration", "at least one month is needed"));
    }
    let rates: Vec<(ConsultantId, f64)> = ds
        .consultant_rates(mission_id)
        .into_iter()
        .filter(|(_, (rate, _))| *rate > 0.0)
        .map(|(id, (rate, _))| (id, rate))
        .collect();
    if rates.is_empty() {
        return Err(CoreError::invalid_value("mission", "no consultant has a daily rate"));
    }

    let today = now.date_naive();
    let current = month_start(today);
    let done = ds.done_work(&mission).1;
    let (start, remaining) = match mode {
        AutoStaffingMode::Replace => {
            ds.staffings
                .retain(|s| !(s.mission_id == mission_id && s.staffing_date >= current));
            (current, price * 1000.0 - done)
        }
        AutoStaffingMode::After => {
            let forecast = ds.forecasted_work(&mission, today).1 * 1000.0;
            let start = ds
                .staffings
                .iter()
                .filter(|s| s.mission_id == mission_id && s.staffing_date >= current)
                .map(|s| s.staffing_date)
                .max()
                .map_or(current, next_month);
            (start, price * 1000.0 - done - forecast)
        }
    };
    if remaining <= 0.0 {
        info!(mission = mission_id, remaining, "Nothing left to staff");
        return Ok(0);
    }

    let rate_sum: f64 = rates.iter().map(|(_, rate)| rate).sum();
    let days = remaining / (rate_sum * duration as f64);
    let holidays = ds.holiday_days();
    let mut written = 0;
    for i in 0..duration as i32 {
        let month = add_months(start, i);
        let charge = quarter_day(days.min(working_days(month, &holidays, None) as f64));
        if charge <= 0.0 {
            continue;
        }
        for (consultant_id, _) in &rates {
            upsert_staffing(
                ds,
                *consultant_id,
                mission_id,
                month,
                charge,
                Some(AUTOMATIC_STAFFING_COMMENT.to_string()),
                username,
                now,
            );
            written += 1;
        }
    }
    info!(user = username, mission = mission_id, ?mode, duration, lines = written, "Automatic staffing computed");
    Ok(written)
}
