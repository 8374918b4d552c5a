//! Chart series for timesheet rates, profile daily rates and consultant rates

use crate::calendar::{add_months, month_start, next_month, round_to, working_days};
use crate::error::CoreError;
use crate::models::{
    Consultant, ConsultantId, Dataset, MissionNature, RateObjectiveType, SubsidiaryId,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Team (staffing manager) or subsidiary restriction; team wins when both are set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct GraphScope {
    pub team: Option<ConsultantId>,
    pub subsidiary: Option<SubsidiaryId>,
}

impl GraphScope {
    fn includes(&self, consultant: &Consultant) -> bool {
        match (self.team, self.subsidiary) {
            (Some(team), _) => consultant.staffing_manager_id == Some(team),
            (None, Some(subsidiary)) => consultant.company_id == subsidiary,
            (None, None) => true,
        }
    }
}

fn history_start(today: NaiveDate, days: i64) -> NaiveDate {
    month_start(today - Duration::days(days))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimesheetRatesGraph {
    pub months: Vec<NaiveDate>,
    /// Percent of available days, per nature
    pub prod: Vec<f64>,
    pub nonprod: Vec<f64>,
    pub holidays: Vec<f64>,
    /// prod / (prod + nonprod), percent
    pub production_rate: Vec<f64>,
}

/// Share of working days spent per mission nature over the last three years
///
/// Only productive employees count; `None` without any timesheet.
pub fn timesheet_rates_bar(
    ds: &Dataset,
    scope: GraphScope,
    today: NaiveDate,
) -> Option<TimesheetRatesGraph> {
    let start = history_start(today, 3 * 365);
    let end = next_month(today);

    let mut days: BTreeMap<NaiveDate, HashMap<MissionNature, f64>> = BTreeMap::new();
    let mut staff: BTreeMap<NaiveDate, BTreeSet<ConsultantId>> = BTreeMap::new();
    for t in ds
        .timesheets
        .iter()
        .filter(|t| t.working_date >= start && t.working_date < end)
    {
        let Some(consultant) = ds.consultants.get(&t.consultant_id) else {
            continue;
        };
        if consultant.subcontractor || !consultant.productive || !scope.includes(consultant) {
            continue;
        }
        let Some(mission) = ds.missions.get(&t.mission_id) else {
            continue;
        };
        let month = month_start(t.working_date);
        *days.entry(month).or_default().entry(mission.nature).or_default() += t.charge;
        staff.entry(month).or_default().insert(consultant.id);
    }
    if days.is_empty() {
        return None;
    }

    let holidays = ds.holiday_days();
    let mut graph = TimesheetRatesGraph {
        months: Vec::new(),
        prod: Vec::new(),
        nonprod: Vec::new(),
        holidays: Vec::new(),
        production_rate: Vec::new(),
    };
    for (month, natures) in days {
        let consultants = staff.get(&month).map_or(0, |s| s.len());
        let available = working_days(month, &holidays, None) as f64 * consultants as f64;
        let rate = |nature: MissionNature| {
            let charge = natures.get(&nature).copied().unwrap_or(0.0);
            if available > 0.0 {
                round_to(100.0 * charge / available, 1)
            } else {
                0.0
            }
        };
        let prod = natures.get(&MissionNature::Prod).copied().unwrap_or(0.0);
        let nonprod = natures.get(&MissionNature::NonProd).copied().unwrap_or(0.0);

        graph.prod.push(rate(MissionNature::Prod));
        graph.nonprod.push(rate(MissionNature::NonProd));
        graph.holidays.push(rate(MissionNature::Holidays));
        graph.production_rate.push(if prod + nonprod > 0.0 {
            round_to(100.0 * prod / (prod + nonprod), 1)
        } else {
            0.0
        });
        graph.months.push(month);
    }
    Some(graph)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRateSeries {
    pub profile: String,
    /// Average daily rate (€) per month, absent when nothing was produced
    pub rates: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRatesGraph {
    pub months: Vec<NaiveDate>,
    pub profiles: Vec<ProfileRateSeries>,
    pub global: Vec<Option<f64>>,
}

/// Average daily rate per consultant profile, month by month over three years
pub fn profile_rates(
    ds: &Dataset,
    scope: GraphScope,
    today: NaiveDate,
) -> Option<ProfileRatesGraph> {
    let start = history_start(today, 3 * 365);
    let end = next_month(today);

    // (profile, month) -> (days, turnover)
    let mut produced: HashMap<(u64, NaiveDate), (f64, f64)> = HashMap::new();
    for t in ds
        .timesheets
        .iter()
        .filter(|t| t.working_date >= start && t.working_date < end)
    {
        let Some(consultant) = ds.consultants.get(&t.consultant_id) else {
            continue;
        };
        if consultant.subcontractor || !consultant.productive || !scope.includes(consultant) {
            continue;
        }
        if ds.missions.get(&t.mission_id).map(|m| m.nature) != Some(MissionNature::Prod) {
            continue;
        }
        let entry = produced
            .entry((consultant.profil_id, month_start(t.working_date)))
            .or_default();
        entry.0 += t.charge;
        entry.1 += t.charge * ds.daily_rate(t.mission_id, consultant.id);
    }

    let mut months = Vec::new();
    let mut month = start;
    while month < end {
        months.push(month);
        month = add_months(month, 1);
    }

    let average = |days: f64, turnover: f64| (days > 0.0).then(|| (turnover / days).round());
    let profiles: Vec<ProfileRateSeries> = ds
        .profiles
        .values()
        .map(|profile| ProfileRateSeries {
            profile: profile.name.clone(),
            rates: months
                .iter()
                .map(|m| {
                    produced
                        .get(&(profile.id, *m))
                        .and_then(|(days, turnover)| average(*days, *turnover))
                })
                .collect(),
        })
        .collect();
    let global: Vec<Option<f64>> = months
        .iter()
        .map(|m| {
            let (days, turnover) = produced
                .iter()
                .filter(|((_, month), _)| month == m)
                .fold((0.0, 0.0), |acc, (_, (d, t))| (acc.0 + d, acc.1 + t));
            average(days, turnover)
        })
        .collect();

    if global.iter().all(Option::is_none) {
        return None;
    }
    Some(ProfileRatesGraph {
        months,
        profiles,
        global,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsultantRatesGraph {
    pub daily_rate_dates: Vec<NaiveDate>,
    /// €, truncated
    pub daily_rates: Vec<f64>,
    pub prod_rate_dates: Vec<NaiveDate>,
    /// Percent
    pub prod_rates: Vec<f64>,
    pub daily_rate_objective_dates: Vec<NaiveDate>,
    pub daily_rate_objectives: Vec<f64>,
    pub prod_rate_objective_dates: Vec<NaiveDate>,
    /// Percent
    pub prod_rate_objectives: Vec<f64>,
}

/// Monthly daily rate and production rate of a consultant over two years, with objectives
pub fn consultant_rates(
    ds: &Dataset,
    consultant_id: ConsultantId,
    today: NaiveDate,
) -> Result<ConsultantRatesGraph, CoreError> {
    let consultant = ds.consultant(consultant_id)?;
    let start = history_start(today, 720);
    let end = next_month(today);
    let months: BTreeSet<NaiveDate> = ds
        .timesheets
        .iter()
        .filter(|t| {
            t.consultant_id == consultant.id
                && t.charge > 0.0
                && t.working_date >= start
                && t.working_date < end
        })
        .map(|t| month_start(t.working_date))
        .collect();

    let mut graph = ConsultantRatesGraph::default();
    for month in months {
        let next = next_month(month);
        if let Some(rate) = ds
            .production_rate(consultant.id, month, next)
            .filter(|r| *r > 0.0)
        {
            graph.prod_rate_dates.push(month);
            graph.prod_rates.push(round_to(100.0 * rate, 1));
        }

        let prod_days = ds
            .consultant_days_by_nature(consultant.id, month, next)
            .get(&MissionNature::Prod)
            .copied()
            .unwrap_or(0.0);
        if prod_days <= 0.0 {
            continue;
        }
        let turnover = ds.consultant_turnover(consultant.id, month, next);
        graph.daily_rate_dates.push(month);
        graph.daily_rates.push((turnover / prod_days).trunc());

        if let Some(objective) = ds.rate_objective(consultant.id, month, RateObjectiveType::DailyRate) {
            graph.daily_rate_objective_dates.push(month);
            graph.daily_rate_objectives.push(objective);
        }
        if let Some(objective) = ds.rate_objective(consultant.id, month, RateObjectiveType::ProdRate) {
            graph.prod_rate_objective_dates.push(month);
            graph.prod_rate_objectives.push(round_to(objective, 1));
        }
    }
    Ok(graph)
}
