//! Consultant timesheets: monthly view, input, and the firm-wide exports

use super::access::{check_user_timesheet_access, TimesheetAccess};
use crate::calendar::{
    days_of_month, is_weekend, month_start, month_week_number, next_month, next_week,
    number_format, previous_month, previous_week, to_int_or_round, working_days,
};
use crate::error::CoreError;
use crate::models::{
    BillingMode, ConsultantId, Dataset, LunchTicket, MissionId, MissionNature, SubsidiaryId,
    Timesheet,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Tolerance on the one day per day rule
const DAY_EPSILON: f64 = 1e-6;

/// Target of a previous/next link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimesheetPeriod {
    pub month: NaiveDate,
    pub week: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimesheetMissionRow {
    pub mission_id: MissionId,
    pub mission: String,
    pub mission_code: String,
    pub nature: MissionNature,
    /// Staffed days for the month, 0 when not staffed
    pub forecast: f64,
    /// Charge per displayed day
    pub charges: Vec<f64>,
    /// Month total
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultantTimesheet {
    pub consultant_id: ConsultantId,
    pub consultant: String,
    pub month: NaiveDate,
    pub week: Option<u32>,
    pub days: Vec<NaiveDate>,
    pub missions: Vec<TimesheetMissionRow>,
    /// Per displayed day, true when the consultant had no lunch ticket
    pub no_ticket_days: Vec<bool>,
    /// Days without lunch ticket over the whole month
    pub ticket_total: f64,
    pub day_totals: Vec<f64>,
    /// Per displayed day, true when more than one day is charged
    pub warnings: Vec<bool>,
    pub working_days: u32,
    pub working_days_balance: f64,
    pub previous: TimesheetPeriod,
    pub next: TimesheetPeriod,
}

impl ConsultantTimesheet {
    pub fn has_warnings(&self) -> bool {
        self.warnings.iter().any(|w| *w)
    }
}

fn in_month(date: NaiveDate, month: NaiveDate) -> bool {
    date >= month && date < next_month(month)
}

fn navigation(month: NaiveDate, week: Option<u32>, days: &[NaiveDate]) -> (TimesheetPeriod, TimesheetPeriod) {
    match (week, days.first()) {
        (Some(_), Some(first)) => {
            let previous = previous_week(*first);
            let next = next_week(*first);
            (
                TimesheetPeriod {
                    month: month_start(previous),
                    week: Some(month_week_number(previous)),
                },
                TimesheetPeriod {
                    month: month_start(next),
                    week: Some(month_week_number(next)),
                },
            )
        }
        _ => (
            TimesheetPeriod {
                month: previous_month(month),
                week: None,
            },
            TimesheetPeriod {
                month: next_month(month),
                week: None,
            },
        ),
    }
}

/// Timesheet and forecast of a consultant for a month, optionally sliced to one week
///
/// Totals and the working days balance always cover the whole month.
pub fn consultant_timesheet(
    ds: &Dataset,
    consultant_id: ConsultantId,
    month: NaiveDate,
    week: Option<u32>,
) -> Result<ConsultantTimesheet, CoreError> {
    let consultant = ds.consultant(consultant_id)?;
    let month = month_start(month);
    let days = days_of_month(month, week);
    let day_index: HashMap<NaiveDate, usize> =
        days.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut forecasts: HashMap<MissionId, f64> = HashMap::new();
    for s in ds
        .staffings
        .iter()
        .filter(|s| s.consultant_id == consultant_id && s.staffing_date == month)
    {
        *forecasts.entry(s.mission_id).or_default() += s.charge;
    }

    let mut missions = ds.forecasted_missions(consultant_id, month);
    missions.extend(ds.timesheet_missions(consultant_id, month));
    ds.sort_missions(&mut missions);

    let mut rows: Vec<TimesheetMissionRow> = missions
        .iter()
        .map(|m| TimesheetMissionRow {
            mission_id: m.id,
            mission: ds.mission_short_name(m),
            mission_code: ds.mission_code(m),
            nature: m.nature,
            forecast: forecasts.get(&m.id).copied().unwrap_or(0.0),
            charges: vec![0.0; days.len()],
            total: 0.0,
        })
        .collect();
    let row_index: HashMap<MissionId, usize> =
        rows.iter().enumerate().map(|(i, r)| (r.mission_id, i)).collect();

    let mut day_totals = vec![0.0; days.len()];
    for t in ds
        .timesheets
        .iter()
        .filter(|t| t.consultant_id == consultant_id && in_month(t.working_date, month))
    {
        let Some(&row) = row_index.get(&t.mission_id) else {
            continue;
        };
        rows[row].total += t.charge;
        if let Some(&i) = day_index.get(&t.working_date) {
            rows[row].charges[i] += t.charge;
            day_totals[i] += t.charge;
        }
    }

    let mut no_ticket_days = vec![false; days.len()];
    let mut ticket_total = 0.0;
    for ticket in ds.lunch_tickets.iter().filter(|l| {
        l.consultant_id == consultant_id && l.no_ticket && in_month(l.lunch_date, month)
    }) {
        ticket_total += 1.0;
        if let Some(&i) = day_index.get(&ticket.lunch_date) {
            no_ticket_days[i] = true;
        }
    }

    let warnings = day_totals.iter().map(|t| *t > 1.0 + DAY_EPSILON).collect();
    let wdays = working_days(month, &ds.holiday_days(), None);
    let charged: f64 = rows.iter().map(|r| r.total).sum();
    let (previous, next) = navigation(month, week, &days);

    Ok(ConsultantTimesheet {
        consultant_id,
        consultant: consultant.name.clone(),
        month,
        week,
        days,
        missions: rows,
        no_ticket_days,
        ticket_total,
        day_totals,
        warnings,
        working_days: wdays,
        working_days_balance: wdays as f64 - charged,
        previous,
        next,
    })
}

/// One cell of timesheet input; a zero charge removes the cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimesheetEntry {
    pub mission_id: MissionId,
    pub day: NaiveDate,
    pub charge: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimesheetInput {
    #[serde(default)]
    pub charges: Vec<TimesheetEntry>,
    /// Days without lunch ticket; replaces the month's list when present
    #[serde(default)]
    pub lunch_tickets: Option<Vec<NaiveDate>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimesheetSaveSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub lunch_tickets: usize,
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::TimesheetValidation {
        message: message.into(),
    }
}

/// Validate and apply timesheet input for a consultant's month
///
/// Nothing is written unless every entry is valid.
pub fn save_timesheet(
    ds: &mut Dataset,
    username: &str,
    consultant_id: ConsultantId,
    month: NaiveDate,
    input: &TimesheetInput,
    today: NaiveDate,
) -> Result<TimesheetSaveSummary, CoreError> {
    let month = month_start(month);
    let access = {
        let user = ds.user(username)?;
        let consultant = ds.consultant(consultant_id)?;
        check_user_timesheet_access(ds, user, consultant, month, today)
    };
    if access != TimesheetAccess::ReadWrite {
        return Err(CoreError::permission_denied(
            username,
            format!("write timesheet of consultant {consultant_id} for {}", month.format("%Y-%m")),
        ));
    }

    let mut cells: BTreeMap<(MissionId, NaiveDate), f64> = BTreeMap::new();
    for entry in &input.charges {
        ds.mission(entry.mission_id)?;
        if !in_month(entry.day, month) {
            return Err(invalid(format!("{} is outside {}", entry.day, month.format("%Y-%m"))));
        }
        if !entry.charge.is_finite() || entry.charge < 0.0 || entry.charge > 1.0 {
            return Err(invalid(format!(
                "charge {} on {} must be between 0 and 1",
                entry.charge, entry.day
            )));
        }
        cells.insert((entry.mission_id, entry.day), entry.charge);
    }

    let mut day_totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for t in ds.timesheets.iter().filter(|t| {
        t.consultant_id == consultant_id
            && in_month(t.working_date, month)
            && !cells.contains_key(&(t.mission_id, t.working_date))
    }) {
        *day_totals.entry(t.working_date).or_default() += t.charge;
    }
    for ((_, day), charge) in &cells {
        *day_totals.entry(*day).or_default() += charge;
    }
    if let Some((day, total)) = day_totals.iter().find(|(_, t)| **t > 1.0 + DAY_EPSILON) {
        return Err(invalid(format!("{total} days charged on {day}, more than one day")));
    }

    if let Some(tickets) = &input.lunch_tickets {
        if let Some(day) = tickets.iter().find(|d| !in_month(**d, month)) {
            return Err(invalid(format!("lunch ticket day {day} is outside the month")));
        }
    }

    let mut summary = TimesheetSaveSummary::default();
    for ((mission_id, day), charge) in cells {
        let existing = ds.timesheets.iter().position(|t| {
            t.consultant_id == consultant_id && t.mission_id == mission_id && t.working_date == day
        });
        match (existing, charge == 0.0) {
            (Some(i), true) => {
                ds.timesheets.swap_remove(i);
                summary.deleted += 1;
            }
            (Some(i), false) => {
                if ds.timesheets[i].charge != charge {
                    ds.timesheets[i].charge = charge;
                    summary.updated += 1;
                }
            }
            (None, false) => {
                ds.timesheets.push(Timesheet {
                    consultant_id,
                    mission_id,
                    working_date: day,
                    charge,
                });
                summary.created += 1;
            }
            (None, true) => {}
        }
    }

    if let Some(tickets) = &input.lunch_tickets {
        ds.lunch_tickets
            .retain(|l| !(l.consultant_id == consultant_id && in_month(l.lunch_date, month)));
        let days: BTreeSet<NaiveDate> = tickets.iter().copied().collect();
        summary.lunch_tickets = days.len();
        ds.lunch_tickets.extend(days.into_iter().map(|lunch_date| LunchTicket {
            consultant_id,
            lunch_date,
            no_ticket: true,
        }));
    }

    info!(
        consultant_id,
        month = %month.format("%Y-%m"),
        created = summary.created,
        updated = summary.updated,
        deleted = summary.deleted,
        "Timesheet saved"
    );
    Ok(summary)
}

// ===================
// Firm-wide views
// ===================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultantColumn {
    pub id: ConsultantId,
    pub name: String,
    pub trigramme: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllTimesheetRow {
    pub mission_id: MissionId,
    pub mission: String,
    pub mission_code: String,
    /// Charge per consultant column
    pub charges: Vec<f64>,
}

/// Mission × consultant charge matrix of a month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllTimesheet {
    pub month: NaiveDate,
    pub consultants: Vec<ConsultantColumn>,
    pub rows: Vec<AllTimesheetRow>,
    pub totals: Vec<f64>,
    pub no_ticket_days: Vec<f64>,
}

/// Everything charged during the month, `None` when nothing was
pub fn all_timesheet(
    ds: &Dataset,
    month: NaiveDate,
    subsidiary: Option<SubsidiaryId>,
) -> Option<AllTimesheet> {
    let month = month_start(month);
    let timesheets: Vec<&Timesheet> = ds
        .timesheets
        .iter()
        .filter(|t| in_month(t.working_date, month))
        .filter(|t| {
            subsidiary.map_or(true, |s| {
                ds.consultants
                    .get(&t.consultant_id)
                    .is_some_and(|c| c.company_id == s)
            })
        })
        .collect();
    if timesheets.is_empty() {
        return None;
    }

    let mut consultants: Vec<ConsultantColumn> = timesheets
        .iter()
        .map(|t| t.consultant_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter_map(|id| ds.consultants.get(&id))
        .map(|c| ConsultantColumn {
            id: c.id,
            name: c.name.clone(),
            trigramme: c.trigramme.clone(),
        })
        .collect();
    consultants.sort_by(|a, b| a.name.cmp(&b.name));
    let column: HashMap<ConsultantId, usize> =
        consultants.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

    let mission_ids: BTreeSet<MissionId> = timesheets.iter().map(|t| t.mission_id).collect();
    let mut missions: Vec<_> = mission_ids
        .into_iter()
        .filter_map(|id| ds.missions.get(&id))
        .collect();
    ds.sort_missions(&mut missions);

    let mut rows: Vec<AllTimesheetRow> = missions
        .iter()
        .map(|m| AllTimesheetRow {
            mission_id: m.id,
            mission: ds.mission_full_name(m),
            mission_code: ds.mission_code(m),
            charges: vec![0.0; consultants.len()],
        })
        .collect();
    let row_index: HashMap<MissionId, usize> =
        rows.iter().enumerate().map(|(i, r)| (r.mission_id, i)).collect();

    let mut totals = vec![0.0; consultants.len()];
    for t in &timesheets {
        let (Some(&row), Some(&col)) = (row_index.get(&t.mission_id), column.get(&t.consultant_id))
        else {
            continue;
        };
        rows[row].charges[col] += t.charge;
        totals[col] += t.charge;
    }

    let mut no_ticket_days = vec![0.0; consultants.len()];
    for ticket in ds
        .lunch_tickets
        .iter()
        .filter(|l| l.no_ticket && in_month(l.lunch_date, month))
    {
        if let Some(&col) = column.get(&ticket.consultant_id) {
            no_ticket_days[col] += 1.0;
        }
    }

    Some(AllTimesheet {
        month,
        consultants,
        rows,
        totals,
        no_ticket_days,
    })
}

/// Accounting view of one consultant on one mission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedTimesheetRow {
    pub lead: String,
    pub deal_id: String,
    /// k€
    pub lead_price: Option<f64>,
    pub mission: String,
    pub mission_id: String,
    pub billing_mode: BillingMode,
    /// k€
    pub mission_price: Option<f64>,
    pub consultant: String,
    pub daily_rate: f64,
    pub bought_daily_rate: f64,
    pub past_done_days: f64,
    pub done_days: f64,
    pub days_to_be_done: f64,
}

/// One row per (mission, consultant) for missions charged during the month
pub fn detailed_timesheet(ds: &Dataset, month: NaiveDate) -> Vec<DetailedTimesheetRow> {
    let month = month_start(month);
    let next = next_month(month);
    let mission_ids: BTreeSet<MissionId> = ds
        .timesheets
        .iter()
        .filter(|t| in_month(t.working_date, month))
        .map(|t| t.mission_id)
        .collect();
    let mut missions: Vec<_> = mission_ids
        .into_iter()
        .filter_map(|id| ds.missions.get(&id))
        .collect();
    ds.sort_missions(&mut missions);

    let mut rows = Vec::new();
    for mission in missions {
        let lead = ds.mission_lead(mission);
        let rates = ds.consultant_rates(mission.id);
        for consultant in ds.mission_consultants(mission.id) {
            let mut past = 0.0;
            let mut done = 0.0;
            for t in ds
                .timesheets
                .iter()
                .filter(|t| t.mission_id == mission.id && t.consultant_id == consultant.id)
            {
                if t.working_date < month {
                    past += t.charge;
                } else if t.working_date < next {
                    done += t.charge;
                }
            }
            let to_be_done: f64 = ds
                .staffings
                .iter()
                .filter(|s| {
                    s.mission_id == mission.id
                        && s.consultant_id == consultant.id
                        && s.staffing_date >= next
                })
                .map(|s| s.charge)
                .sum();
            if past == 0.0 && done == 0.0 && to_be_done == 0.0 {
                continue;
            }
            let (daily_rate, bought_daily_rate) =
                rates.get(&consultant.id).copied().unwrap_or((0.0, 0.0));
            rows.push(DetailedTimesheetRow {
                lead: lead.map(|l| l.name.clone()).unwrap_or_default(),
                deal_id: lead.map(|l| l.deal_id.clone()).unwrap_or_default(),
                lead_price: lead.and_then(|l| l.sales),
                mission: ds.mission_short_name(mission),
                mission_id: ds.mission_code(mission),
                billing_mode: mission.billing_mode,
                mission_price: mission.price,
                consultant: consultant.name.clone(),
                daily_rate,
                bought_daily_rate,
                past_done_days: past,
                done_days: done,
                days_to_be_done: to_be_done,
            });
        }
    }
    debug!(month = %month.format("%Y-%m"), rows = rows.len(), "Detailed timesheet computed");
    rows
}

/// Day columns of a full month once padded
const PADDED_DAYS: usize = 31;

/// CSV-ready rows of a mission timesheet, one block per month
///
/// With `padding`, totals land in the same column whatever the month length.
pub fn timesheet_report_data(
    ds: &Dataset,
    mission_id: MissionId,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    padding: bool,
    separator: &str,
) -> Result<Vec<Vec<String>>, CoreError> {
    ds.mission(mission_id)?;
    let timesheets: Vec<&Timesheet> = ds
        .timesheets
        .iter()
        .filter(|t| t.mission_id == mission_id)
        .collect();
    let months: BTreeSet<NaiveDate> = timesheets
        .iter()
        .map(|t| month_start(t.working_date))
        .collect();
    let consultants = ds.mission_consultants(mission_id);

    let mut data = Vec::new();
    for month in months {
        if start.is_some_and(|s| month < month_start(s)) {
            continue;
        }
        if end.is_some_and(|e| month > month_start(e)) {
            break;
        }
        let days = days_of_month(month, None);
        let pad = if padding {
            PADDED_DAYS.saturating_sub(days.len())
        } else {
            0
        };

        data.push(vec![String::new()]);
        data.push(vec![month.format("%B %Y").to_string()]);
        let mut header = vec![String::new()];
        header.extend(days.iter().map(|d| d.format("%-d").to_string()));
        header.extend(std::iter::repeat(String::new()).take(pad));
        header.push("total".to_string());
        data.push(header);

        for consultant in &consultants {
            let charges: HashMap<NaiveDate, f64> = timesheets
                .iter()
                .filter(|t| t.consultant_id == consultant.id && in_month(t.working_date, month))
                .fold(HashMap::new(), |mut acc, t| {
                    *acc.entry(t.working_date).or_insert(0.0) += t.charge;
                    acc
                });
            let mut total = 0.0;
            let mut row = vec![consultant.name.clone()];
            for day in &days {
                match charges.get(day).copied().filter(|c| *c != 0.0) {
                    Some(charge) => {
                        row.push(number_format(to_int_or_round(charge, 2), separator));
                        total += charge;
                    }
                    None => row.push(String::new()),
                }
            }
            row.extend(std::iter::repeat(String::new()).take(pad));
            row.push(number_format(to_int_or_round(total, 2), separator));
            if total > 0.0 {
                data.push(row);
            }
        }
    }
    Ok(data)
}

// ===================
// Holidays planning
// ===================

pub const COLOR_CLOSED: &str = "lightgrey";
pub const COLOR_HOLIDAY: &str = "#56160C";
pub const COLOR_WORKED: &str = "#F6F6F6";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolidaysPlanningRow {
    pub consultant_id: ConsultantId,
    pub consultant: String,
    pub colors: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolidaysPlanning {
    pub month: NaiveDate,
    pub days: Vec<NaiveDate>,
    pub rows: Vec<HolidaysPlanningRow>,
    /// Today, when it falls in the month
    pub today: Option<NaiveDate>,
    pub previous: NaiveDate,
    pub next: NaiveDate,
}

/// Holidays taken by active employees, one colour per day
pub fn holidays_planning(ds: &Dataset, month: NaiveDate, today: NaiveDate) -> HolidaysPlanning {
    let month = month_start(month);
    let days = days_of_month(month, None);
    let public_holidays = ds.holiday_days();

    let mut taken: HashMap<ConsultantId, HashSet<NaiveDate>> = HashMap::new();
    for t in ds.timesheets.iter().filter(|t| {
        in_month(t.working_date, month)
            && t.charge > 0.0
            && ds
                .missions
                .get(&t.mission_id)
                .is_some_and(|m| m.nature == MissionNature::Holidays)
    }) {
        taken.entry(t.consultant_id).or_default().insert(t.working_date);
    }

    let mut consultants: Vec<_> = ds
        .consultants
        .values()
        .filter(|c| c.active && !c.subcontractor)
        .collect();
    consultants.sort_by(|a, b| a.name.cmp(&b.name));

    let rows = consultants
        .into_iter()
        .map(|c| {
            let holidays = taken.get(&c.id);
            let colors = days
                .iter()
                .map(|day| {
                    if is_weekend(*day) || public_holidays.contains(day) {
                        COLOR_CLOSED
                    } else if holidays.is_some_and(|h| h.contains(day)) {
                        COLOR_HOLIDAY
                    } else {
                        COLOR_WORKED
                    }
                })
                .collect();
            HolidaysPlanningRow {
                consultant_id: c.id,
                consultant: c.name.clone(),
                colors,
            }
        })
        .collect();

    HolidaysPlanning {
        month,
        days,
        rows,
        today: in_month(today, month).then_some(today),
        previous: previous_month(month),
        next: next_month(month),
    }
}
