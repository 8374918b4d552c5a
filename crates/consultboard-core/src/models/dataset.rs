//! In-memory reference tables and the domain queries built on them
//!
//! Every report reads a `&Dataset`; ids are resolved through the keyed maps.

use super::lead::{Lead, LeadId};
use super::mission::{
    FinancialCondition, Holiday, LunchTicket, Mission, MissionId, MissionNature, Staffing,
    Timesheet,
};
use super::people::{
    Consultant, ConsultantId, ConsultantProfile, RateObjective, RateObjectiveType, Subsidiary,
    SubsidiaryId, User,
};
use crate::calendar::{month_start, next_month};
use crate::error::CoreError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// All reference tables except bills and expenses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub subsidiaries: BTreeMap<SubsidiaryId, Subsidiary>,
    pub profiles: BTreeMap<u64, ConsultantProfile>,
    pub consultants: BTreeMap<ConsultantId, Consultant>,
    pub rate_objectives: Vec<RateObjective>,
    pub users: BTreeMap<String, User>,
    pub leads: BTreeMap<LeadId, Lead>,
    pub missions: BTreeMap<MissionId, Mission>,
    pub timesheets: Vec<Timesheet>,
    pub staffings: Vec<Staffing>,
    pub financial_conditions: Vec<FinancialCondition>,
    pub holidays: Vec<Holiday>,
    pub lunch_tickets: Vec<LunchTicket>,
}

/// Which consultants count in done work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkFilter {
    /// Consultants flagged as subcontractors
    pub include_external_subcontractor: bool,
    /// Consultants employed by another subsidiary than the mission's
    pub include_internal_subcontractor: bool,
    pub subsidiary: Option<SubsidiaryId>,
    pub consultant: Option<ConsultantId>,
}

impl Default for WorkFilter {
    fn default() -> Self {
        Self {
            include_external_subcontractor: true,
            include_internal_subcontractor: true,
            subsidiary: None,
            consultant: None,
        }
    }
}

impl WorkFilter {
    pub fn own_work() -> Self {
        Self {
            include_external_subcontractor: false,
            include_internal_subcontractor: false,
            ..Self::default()
        }
    }

    pub fn for_consultant(consultant: ConsultantId) -> Self {
        Self {
            consultant: Some(consultant),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginMode {
    /// Price minus done work
    Current,
    /// Price minus done work and remaining forecast
    Target,
}

impl Dataset {
    // ===================
    // Lookups
    // ===================

    pub fn consultant(&self, id: ConsultantId) -> Result<&Consultant, CoreError> {
        self.consultants
            .get(&id)
            .ok_or(CoreError::ConsultantNotFound { id })
    }

    pub fn mission(&self, id: MissionId) -> Result<&Mission, CoreError> {
        self.missions.get(&id).ok_or(CoreError::MissionNotFound { id })
    }

    pub fn lead(&self, id: LeadId) -> Result<&Lead, CoreError> {
        self.leads.get(&id).ok_or(CoreError::LeadNotFound { id })
    }

    pub fn user(&self, username: &str) -> Result<&User, CoreError> {
        self.users.get(username).ok_or_else(|| CoreError::UserNotFound {
            username: username.to_string(),
        })
    }

    pub fn mission_lead(&self, mission: &Mission) -> Option<&Lead> {
        mission.lead_id.and_then(|id| self.leads.get(&id))
    }

    pub fn mission_code(&self, mission: &Mission) -> String {
        mission.mission_id(self.mission_lead(mission))
    }

    pub fn mission_short_name(&self, mission: &Mission) -> String {
        mission.short_name(self.mission_lead(mission))
    }

    pub fn mission_full_name(&self, mission: &Mission) -> String {
        mission.full_name(self.mission_lead(mission))
    }

    pub fn profile(&self, consultant: &Consultant) -> Option<&ConsultantProfile> {
        self.profiles.get(&consultant.profil_id)
    }

    pub fn profile_level(&self, consultant: &Consultant) -> u32 {
        self.profile(consultant).map(|p| p.level).unwrap_or(0)
    }

    pub fn subsidiary_name(&self, id: SubsidiaryId) -> String {
        self.subsidiaries
            .get(&id)
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    pub fn holiday_days(&self) -> HashSet<NaiveDate> {
        self.holidays.iter().map(|h| h.day).collect()
    }

    /// Consultant matching a user account, by trigramme
    pub fn consultant_for_user(&self, user: &User) -> Option<&Consultant> {
        let trigramme = user.trigramme();
        self.consultants.values().find(|c| c.trigramme == trigramme)
    }

    /// User account of a consultant, by trigramme
    pub fn user_for_consultant(&self, consultant: &Consultant) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.trigramme() == consultant.trigramme)
    }

    /// Consultants managed by `manager_id`
    ///
    /// `staffing` selects the staffing manager link instead of the hierarchical one.
    pub fn team(
        &self,
        manager_id: ConsultantId,
        exclude_self: bool,
        only_active: bool,
        staffing: bool,
    ) -> Vec<&Consultant> {
        let mut team: Vec<&Consultant> = self
            .consultants
            .values()
            .filter(|c| {
                let link = if staffing {
                    c.staffing_manager_id
                } else {
                    c.manager_id
                };
                link == Some(manager_id) || (!exclude_self && c.id == manager_id)
            })
            .filter(|c| !only_active || c.active)
            .collect();
        team.sort_by(|a, b| a.name.cmp(&b.name));
        team.dedup_by_key(|c| c.id);
        team
    }

    /// Whether `member` belongs to the staffing or hierarchical team of `manager`
    pub fn is_in_team(&self, manager: ConsultantId, member: &Consultant) -> bool {
        member.id != manager
            && (member.staffing_manager_id == Some(manager) || member.manager_id == Some(manager))
    }

    // ===================
    // Rates
    // ===================

    pub fn financial_condition(
        &self,
        mission_id: MissionId,
        consultant_id: ConsultantId,
    ) -> Option<&FinancialCondition> {
        self.financial_conditions
            .iter()
            .find(|fc| fc.mission_id == mission_id && fc.consultant_id == consultant_id)
    }

    /// Sold daily rate, 0 when undefined
    pub fn daily_rate(&self, mission_id: MissionId, consultant_id: ConsultantId) -> f64 {
        self.financial_condition(mission_id, consultant_id)
            .map(|fc| fc.daily_rate)
            .unwrap_or(0.0)
    }

    /// (daily rate, bought daily rate) for every consultant of the mission
    pub fn consultant_rates(&self, mission_id: MissionId) -> BTreeMap<ConsultantId, (f64, f64)> {
        let mut rates: BTreeMap<ConsultantId, (f64, f64)> = self
            .mission_consultant_ids(mission_id)
            .into_iter()
            .map(|id| (id, (0.0, 0.0)))
            .collect();
        for fc in self
            .financial_conditions
            .iter()
            .filter(|fc| fc.mission_id == mission_id)
        {
            rates.insert(
                fc.consultant_id,
                (fc.daily_rate, fc.bought_daily_rate.unwrap_or(0.0)),
            );
        }
        rates
    }

    /// Objective in force at `date`
    pub fn rate_objective(
        &self,
        consultant_id: ConsultantId,
        date: NaiveDate,
        rate_type: RateObjectiveType,
    ) -> Option<f64> {
        self.rate_objectives
            .iter()
            .filter(|o| {
                o.consultant_id == consultant_id && o.rate_type == rate_type && o.start_date <= date
            })
            .max_by_key(|o| o.start_date)
            .map(|o| o.rate)
    }

    // ===================
    // Mission work
    // ===================

    fn mission_consultant_ids(&self, mission_id: MissionId) -> BTreeSet<ConsultantId> {
        self.timesheets
            .iter()
            .filter(|t| t.mission_id == mission_id)
            .map(|t| t.consultant_id)
            .chain(
                self.staffings
                    .iter()
                    .filter(|s| s.mission_id == mission_id)
                    .map(|s| s.consultant_id),
            )
            .collect()
    }

    /// Consultants with timesheet or staffing on the mission, by profile level then name
    pub fn mission_consultants(&self, mission_id: MissionId) -> Vec<&Consultant> {
        let mut consultants: Vec<&Consultant> = self
            .mission_consultant_ids(mission_id)
            .into_iter()
            .filter_map(|id| self.consultants.get(&id))
            .collect();
        consultants.sort_by(|a, b| {
            self.profile_level(a)
                .cmp(&self.profile_level(b))
                .then_with(|| a.name.cmp(&b.name))
        });
        consultants
    }

    fn work_counts(&self, mission: &Mission, consultant: &Consultant, filter: &WorkFilter) -> bool {
        if let Some(id) = filter.consultant {
            if consultant.id != id {
                return false;
            }
        }
        if consultant.subcontractor && !filter.include_external_subcontractor {
            return false;
        }
        match filter.subsidiary {
            Some(subsidiary) => consultant.company_id == subsidiary,
            None => {
                filter.include_internal_subcontractor
                    || consultant.subcontractor
                    || consultant.company_id == mission.subsidiary_id
            }
        }
    }

    /// Done days and amount (€) on the mission between `start` (inclusive) and `end` (exclusive)
    pub fn done_work_period(
        &self,
        mission: &Mission,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        filter: &WorkFilter,
    ) -> (f64, f64) {
        let mut rates: HashMap<ConsultantId, f64> = HashMap::new();
        let mut days = 0.0;
        let mut amount = 0.0;
        for timesheet in self.timesheets.iter().filter(|t| {
            t.mission_id == mission.id
                && start.map_or(true, |s| t.working_date >= s)
                && end.map_or(true, |e| t.working_date < e)
        }) {
            let Some(consultant) = self.consultants.get(&timesheet.consultant_id) else {
                continue;
            };
            if !self.work_counts(mission, consultant, filter) {
                continue;
            }
            let rate = *rates
                .entry(consultant.id)
                .or_insert_with(|| self.daily_rate(mission.id, consultant.id));
            days += timesheet.charge;
            amount += timesheet.charge * rate;
        }
        (days, amount)
    }

    /// All done work, amount in €
    pub fn done_work(&self, mission: &Mission) -> (f64, f64) {
        self.done_work_period(mission, None, None, &WorkFilter::default())
    }

    /// All done work, amount in k€
    pub fn done_work_k(&self, mission: &Mission) -> (f64, f64) {
        let (days, amount) = self.done_work(mission);
        (days, amount / 1000.0)
    }

    /// Remaining forecast from the current month, amount in k€
    ///
    /// Days already entered in the current month are deducted from its forecast.
    pub fn forecasted_work(&self, mission: &Mission, today: NaiveDate) -> (f64, f64) {
        let current = month_start(today);
        let next = next_month(current);
        let mut days = 0.0;
        let mut amount = 0.0;
        for staffing in self
            .staffings
            .iter()
            .filter(|s| s.mission_id == mission.id && s.staffing_date >= current)
        {
            let mut charge = staffing.charge;
            if staffing.staffing_date == current {
                let done: f64 = self
                    .timesheets
                    .iter()
                    .filter(|t| {
                        t.mission_id == mission.id
                            && t.consultant_id == staffing.consultant_id
                            && t.working_date >= current
                            && t.working_date < next
                    })
                    .map(|t| t.charge)
                    .sum();
                charge = (charge - done).max(0.0);
            }
            days += charge;
            amount += charge * self.daily_rate(mission.id, staffing.consultant_id);
        }
        (days, amount / 1000.0)
    }

    /// Margin in k€; only fixed price missions with a price have one
    pub fn margin(&self, mission: &Mission, mode: MarginMode, today: NaiveDate) -> f64 {
        let Some(price) = mission.price.filter(|_| mission.is_fixed_price()) else {
            return 0.0;
        };
        let (_, done) = self.done_work_k(mission);
        let forecast = match mode {
            MarginMode::Current => 0.0,
            MarginMode::Target => self.forecasted_work(mission, today).1,
        };
        price - done - forecast
    }

    /// Margin (€) per consultant over their daily rate objective, for months before `end`
    ///
    /// Subcontractors are measured against their bought rate instead.
    pub fn objective_margin(
        &self,
        mission: &Mission,
        end: NaiveDate,
    ) -> BTreeMap<ConsultantId, f64> {
        let mut result = BTreeMap::new();
        if mission.nature != MissionNature::Prod {
            return result;
        }
        for (consultant_id, (rate, bought)) in self.consultant_rates(mission.id) {
            let Some(consultant) = self.consultants.get(&consultant_id) else {
                continue;
            };
            let mut per_month: BTreeMap<NaiveDate, f64> = BTreeMap::new();
            for t in self.timesheets.iter().filter(|t| {
                t.mission_id == mission.id
                    && t.consultant_id == consultant_id
                    && t.working_date < end
            }) {
                *per_month.entry(month_start(t.working_date)).or_default() += t.charge;
            }
            let margin: f64 = per_month
                .into_iter()
                .map(|(month, days)| {
                    if consultant.subcontractor {
                        days * (rate - bought)
                    } else {
                        let objective = self
                            .rate_objective(consultant_id, month, RateObjectiveType::DailyRate)
                            .unwrap_or(0.0);
                        days * (rate - objective)
                    }
                })
                .sum();
            result.insert(consultant_id, margin);
        }
        result
    }

    // ===================
    // Consultant activity
    // ===================

    fn nature_of(&self, mission_id: MissionId) -> Option<MissionNature> {
        self.missions.get(&mission_id).map(|m| m.nature)
    }

    /// Timesheet charge per nature between `start` (inclusive) and `end` (exclusive)
    pub fn consultant_days_by_nature(
        &self,
        consultant_id: ConsultantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> HashMap<MissionNature, f64> {
        let mut days = HashMap::new();
        for t in self.timesheets.iter().filter(|t| {
            t.consultant_id == consultant_id && t.working_date >= start && t.working_date < end
        }) {
            if let Some(nature) = self.nature_of(t.mission_id) {
                *days.entry(nature).or_insert(0.0) += t.charge;
            }
        }
        days
    }

    /// Turnover (€) produced on PROD missions in the period
    pub fn consultant_turnover(
        &self,
        consultant_id: ConsultantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> f64 {
        self.timesheets
            .iter()
            .filter(|t| {
                t.consultant_id == consultant_id && t.working_date >= start && t.working_date < end
            })
            .filter(|t| self.nature_of(t.mission_id) == Some(MissionNature::Prod))
            .map(|t| t.charge * self.daily_rate(t.mission_id, consultant_id))
            .sum()
    }

    /// prod / (prod + nonprod); `None` without any such day
    pub fn production_rate(
        &self,
        consultant_id: ConsultantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<f64> {
        let days = self.consultant_days_by_nature(consultant_id, start, end);
        let prod = days.get(&MissionNature::Prod).copied().unwrap_or(0.0);
        let nonprod = days.get(&MissionNature::NonProd).copied().unwrap_or(0.0);
        if prod + nonprod == 0.0 {
            None
        } else {
            Some(prod / (prod + nonprod))
        }
    }

    /// Active missions the consultant is staffed on for the month
    pub fn forecasted_missions(
        &self,
        consultant_id: ConsultantId,
        month: NaiveDate,
    ) -> Vec<&Mission> {
        let month = month_start(month);
        let ids: BTreeSet<MissionId> = self
            .staffings
            .iter()
            .filter(|s| s.consultant_id == consultant_id && s.staffing_date == month)
            .map(|s| s.mission_id)
            .collect();
        let mut missions: Vec<&Mission> = ids
            .into_iter()
            .filter_map(|id| self.missions.get(&id))
            .filter(|m| m.active)
            .collect();
        self.sort_missions(&mut missions);
        missions
    }

    /// Missions the consultant entered time on during the month
    pub fn timesheet_missions(&self, consultant_id: ConsultantId, month: NaiveDate) -> Vec<&Mission> {
        let start = month_start(month);
        let end = next_month(start);
        let ids: BTreeSet<MissionId> = self
            .timesheets
            .iter()
            .filter(|t| {
                t.consultant_id == consultant_id && t.working_date >= start && t.working_date < end
            })
            .map(|t| t.mission_id)
            .collect();
        let mut missions: Vec<&Mission> = ids
            .into_iter()
            .filter_map(|id| self.missions.get(&id))
            .collect();
        self.sort_missions(&mut missions);
        missions
    }

    /// Production missions first, then by mission id and description
    pub fn sort_missions(&self, missions: &mut Vec<&Mission>) {
        missions.sort_by(|a, b| {
            a.nature
                .cmp(&b.nature)
                .then_with(|| self.mission_code(a).cmp(&self.mission_code(b)))
                .then_with(|| a.description.cmp(&b.description))
                .then_with(|| a.id.cmp(&b.id))
        });
        missions.dedup_by_key(|m| m.id);
    }

    /// Productive, active, non subcontractor consultants
    pub fn productive_consultants(&self) -> Vec<&Consultant> {
        self.consultants
            .values()
            .filter(|c| c.productive && c.active && !c.subcontractor)
            .collect()
    }

    /// Record count over every table, for load reporting
    pub fn record_count(&self) -> usize {
        self.subsidiaries.len()
            + self.profiles.len()
            + self.consultants.len()
            + self.rate_objectives.len()
            + self.users.len()
            + self.leads.len()
            + self.missions.len()
            + self.timesheets.len()
            + self.staffings.len()
            + self.financial_conditions.len()
            + self.holidays.len()
            + self.lunch_tickets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{d, sample_dataset, today};

    #[test]
    fn test_done_work_includes_every_consultant_by_default() {
        let ds = sample_dataset();
        let mission = ds.mission(100).unwrap();
        let (days, amount) = ds.done_work(mission);
        assert_eq!(days, 8.5);
        assert_eq!(amount, 6000.0);
        assert_eq!(ds.done_work_k(mission).1, 6.0);
    }

    #[test]
    fn test_done_work_excludes_internal_subcontractor() {
        let ds = sample_dataset();
        let mission = ds.mission(100).unwrap();
        let (days, amount) = ds.done_work_period(mission, None, None, &WorkFilter::own_work());
        assert_eq!(days, 7.5);
        assert_eq!(amount, 5300.0);

        let beta = WorkFilter {
            subsidiary: Some(2),
            ..WorkFilter::default()
        };
        assert_eq!(ds.done_work_period(mission, None, None, &beta), (1.0, 700.0));
    }

    #[test]
    fn test_done_work_period_bounds() {
        let ds = sample_dataset();
        let mission = ds.mission(100).unwrap();
        let (days, _) = ds.done_work_period(
            mission,
            Some(d(2024, 5, 1)),
            Some(d(2024, 6, 1)),
            &WorkFilter::for_consultant(2),
        );
        assert_eq!(days, 1.5);
    }

    #[test]
    fn test_forecast_deducts_current_month_timesheet() {
        let ds = sample_dataset();
        let mission = ds.mission(100).unwrap();
        let (days, amount_k) = ds.forecasted_work(mission, today());
        assert_eq!(days, 15.5);
        assert!((amount_k - 10.1).abs() < 1e-9);
    }

    #[test]
    fn test_margin_modes() {
        let ds = sample_dataset();
        let fixed = ds.mission(100).unwrap();
        assert!((ds.margin(fixed, MarginMode::Current, today()) - 24.0).abs() < 1e-9);
        assert!((ds.margin(fixed, MarginMode::Target, today()) - 13.9).abs() < 1e-9);
        let time_spent = ds.mission(101).unwrap();
        assert_eq!(ds.margin(time_spent, MarginMode::Current, today()), 0.0);
    }

    #[test]
    fn test_objective_margin_uses_objective_in_force() {
        let ds = sample_dataset();
        let mission = ds.mission(100).unwrap();
        let margins = ds.objective_margin(mission, d(2024, 6, 1));
        assert_eq!(margins[&1], 200.0);
        assert_eq!(margins[&2], 0.0);
        assert_eq!(margins[&3], 700.0);

        let run = ds.mission(101).unwrap();
        let margins = ds.objective_margin(run, d(2024, 6, 1));
        // subcontractor: 2 days at 800 sold, 500 bought
        assert_eq!(margins[&4], 600.0);
    }

    #[test]
    fn test_consultant_rates_default_to_zero() {
        let ds = sample_dataset();
        let rates = ds.consultant_rates(102);
        assert_eq!(rates.get(&2), Some(&(0.0, 0.0)));
        let rates = ds.consultant_rates(101);
        assert_eq!(rates.get(&4), Some(&(800.0, 500.0)));
    }

    #[test]
    fn test_rate_objective_picks_latest_started() {
        let ds = sample_dataset();
        assert_eq!(
            ds.rate_objective(2, d(2024, 3, 31), RateObjectiveType::DailyRate),
            Some(550.0)
        );
        assert_eq!(
            ds.rate_objective(2, d(2024, 4, 1), RateObjectiveType::DailyRate),
            Some(600.0)
        );
        assert_eq!(
            ds.rate_objective(2, d(2023, 12, 31), RateObjectiveType::DailyRate),
            None
        );
    }

    #[test]
    fn test_consultant_activity() {
        let ds = sample_dataset();
        let start = d(2024, 5, 1);
        let end = d(2024, 6, 1);
        assert_eq!(ds.consultant_turnover(2, start, end), 900.0);
        assert_eq!(ds.production_rate(2, start, end), Some(0.75));
        assert_eq!(ds.production_rate(5, start, end), None);
    }

    #[test]
    fn test_mission_lists_are_sorted_by_nature() {
        let ds = sample_dataset();
        let ids: Vec<u64> = ds.timesheet_missions(2, d(2024, 5, 1)).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![100, 201, 200]);
        let ids: Vec<u64> = ds.forecasted_missions(2, d(2024, 6, 1)).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![100, 102, 200]);
    }

    #[test]
    fn test_team_and_user_links() {
        let ds = sample_dataset();
        let team: Vec<u64> = ds.team(1, true, true, true).iter().map(|c| c.id).collect();
        assert_eq!(team, vec![2, 3, 4]);
        let user = ds.user("bdu").unwrap();
        assert_eq!(ds.consultant_for_user(user).map(|c| c.id), Some(2));
        assert_eq!(ds.mission_consultants(100).first().map(|c| c.id), Some(2));
    }
}
