//! Mission views: forecast versus done reconciliation, fixed price margins, mission list

use crate::calendar::{cumulate, month_start, next_month, previous_month, round_to, to_int_or_round};
use crate::error::CoreError;
use crate::models::{
    BillingMode, ConsultantId, Dataset, MarginMode, MissionId, MissionNature, SubsidiaryId,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionConsultantLine {
    pub consultant_id: ConsultantId,
    pub consultant: String,
    pub daily_rate: f64,
    pub bought_daily_rate: f64,
    /// Days per timesheet month
    pub timesheet: Vec<f64>,
    pub timesheet_total: f64,
    pub timesheet_total_k: f64,
    /// Days per staffing month
    pub staffing: Vec<f64>,
    pub staffing_total: f64,
    pub staffing_total_k: f64,
    pub estimated_days: f64,
    pub estimated_k: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MissionTimesheetTotals {
    pub timesheet: Vec<f64>,
    pub timesheet_total: f64,
    pub timesheet_total_k: f64,
    pub staffing: Vec<f64>,
    pub staffing_total: f64,
    pub staffing_total_k: f64,
    pub estimated_days: f64,
    pub estimated_k: f64,
    /// k€ per timesheet month
    pub timesheet_amounts: Vec<f64>,
    /// k€ per staffing month
    pub staffing_amounts: Vec<f64>,
    /// € per day for each timesheet month, then overall
    pub timesheet_average_rates: Vec<f64>,
    /// € per day for each staffing month, then overall
    pub staffing_average_rates: Vec<f64>,
}

/// Cumulated k€ series, done then forecasted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionGraph {
    pub dates: Vec<NaiveDate>,
    pub timesheet: Vec<f64>,
    pub staffing: Vec<f64>,
    pub min_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionTimesheet {
    pub mission_id: MissionId,
    pub mission: String,
    pub billing_mode: BillingMode,
    pub price: Option<f64>,
    pub timesheet_months: Vec<NaiveDate>,
    pub staffing_months: Vec<NaiveDate>,
    pub consultants: Vec<MissionConsultantLine>,
    pub totals: MissionTimesheetTotals,
    /// Fixed price only, k€
    pub margin: f64,
    /// Fixed price only, price over estimated days
    pub avg_daily_rate: f64,
    /// Time spent only, k€
    pub current_unused: f64,
    /// Time spent only, k€
    pub forecasted_unused: f64,
    pub objective_margin: BTreeMap<ConsultantId, f64>,
    pub objective_margin_total: f64,
    pub graph: MissionGraph,
}

fn average_rates(amounts_k: &[f64], days: &[f64]) -> Vec<f64> {
    amounts_k
        .iter()
        .zip(days)
        .map(|(amount, days)| if *days != 0.0 { 1000.0 * amount / days } else { 0.0 })
        .collect()
}

fn add_columns(total: &mut [f64], values: &[f64]) {
    for (t, v) in total.iter_mut().zip(values) {
        *t += v;
    }
}

/// Done days (up to the current month) against forecast (from the current month)
pub fn mission_timesheet(
    ds: &Dataset,
    mission_id: MissionId,
    today: NaiveDate,
) -> Result<MissionTimesheet, CoreError> {
    let mission = ds.mission(mission_id)?;
    let current = month_start(today);
    let horizon = next_month(current);
    let rates = ds.consultant_rates(mission_id);

    let timesheet_months: Vec<NaiveDate> = ds
        .timesheets
        .iter()
        .filter(|t| t.mission_id == mission_id && t.working_date < horizon)
        .map(|t| month_start(t.working_date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let staffing_months: Vec<NaiveDate> = ds
        .staffings
        .iter()
        .filter(|s| s.mission_id == mission_id && s.staffing_date >= current)
        .map(|s| s.staffing_date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let overlap_current = timesheet_months.last() == Some(&current);

    let mut consultants = Vec::new();
    for consultant in ds.mission_consultants(mission_id) {
        let (daily_rate, bought_daily_rate) =
            rates.get(&consultant.id).copied().unwrap_or((0.0, 0.0));

        let mut timesheet = vec![0.0; timesheet_months.len()];
        for t in ds.timesheets.iter().filter(|t| {
            t.mission_id == mission_id && t.consultant_id == consultant.id && t.working_date < horizon
        }) {
            if let Ok(i) = timesheet_months.binary_search(&month_start(t.working_date)) {
                timesheet[i] += t.charge;
            }
        }

        let mut staffing = vec![0.0; staffing_months.len()];
        for s in ds.staffings.iter().filter(|s| {
            s.mission_id == mission_id && s.consultant_id == consultant.id && s.staffing_date >= current
        }) {
            if let Ok(i) = staffing_months.binary_search(&s.staffing_date) {
                staffing[i] += s.charge;
            }
        }
        if overlap_current {
            if let (Some(first), Some(done)) = (staffing_months.first(), timesheet.last()) {
                if *first == current {
                    staffing[0] = (staffing[0] - done).max(0.0);
                }
            }
        }

        let timesheet_total: f64 = timesheet.iter().sum();
        let staffing_total: f64 = staffing.iter().sum();
        let timesheet_total_k = timesheet_total * daily_rate / 1000.0;
        let staffing_total_k = staffing_total * daily_rate / 1000.0;
        consultants.push(MissionConsultantLine {
            consultant_id: consultant.id,
            consultant: consultant.name.clone(),
            daily_rate,
            bought_daily_rate,
            timesheet,
            timesheet_total,
            timesheet_total_k,
            staffing,
            staffing_total,
            staffing_total_k,
            estimated_days: timesheet_total + staffing_total,
            estimated_k: timesheet_total_k + staffing_total_k,
        });
    }

    let mut totals = MissionTimesheetTotals {
        timesheet: vec![0.0; timesheet_months.len()],
        staffing: vec![0.0; staffing_months.len()],
        timesheet_amounts: vec![0.0; timesheet_months.len()],
        staffing_amounts: vec![0.0; staffing_months.len()],
        ..MissionTimesheetTotals::default()
    };
    for line in &consultants {
        add_columns(&mut totals.timesheet, &line.timesheet);
        add_columns(&mut totals.staffing, &line.staffing);
        let valued = |days: &Vec<f64>| -> Vec<f64> {
            days.iter().map(|d| d * line.daily_rate / 1000.0).collect()
        };
        add_columns(&mut totals.timesheet_amounts, &valued(&line.timesheet));
        add_columns(&mut totals.staffing_amounts, &valued(&line.staffing));
        totals.timesheet_total += line.timesheet_total;
        totals.timesheet_total_k += line.timesheet_total_k;
        totals.staffing_total += line.staffing_total;
        totals.staffing_total_k += line.staffing_total_k;
    }
    totals.estimated_days = totals.timesheet_total + totals.staffing_total;
    totals.estimated_k = totals.timesheet_total_k + totals.staffing_total_k;

    let mut amounts = totals.timesheet_amounts.clone();
    amounts.push(totals.timesheet_total_k);
    let mut days = totals.timesheet.clone();
    days.push(totals.timesheet_total);
    totals.timesheet_average_rates = average_rates(&amounts, &days);
    let mut amounts = totals.staffing_amounts.clone();
    amounts.push(totals.staffing_total_k);
    let mut days = totals.staffing.clone();
    days.push(totals.staffing_total);
    totals.staffing_average_rates = average_rates(&amounts, &days);

    let has_lines = !consultants.is_empty();
    let (margin, avg_daily_rate) = match mission.price {
        Some(price) if has_lines && mission.billing_mode == BillingMode::FixedPrice => {
            let margin = round_to(price - totals.timesheet_total_k - totals.staffing_total_k, 3);
            let avg = if totals.estimated_days > 0.0 {
                (1000.0 * price / totals.estimated_days).trunc()
            } else {
                0.0
            };
            (margin, avg)
        }
        _ => (0.0, 0.0),
    };
    let (current_unused, forecasted_unused) = match mission.price {
        Some(price) if has_lines && mission.billing_mode == BillingMode::TimeSpent => (
            to_int_or_round(price - totals.timesheet_total_k, 1),
            to_int_or_round(price - totals.timesheet_total_k - totals.staffing_total_k, 1),
        ),
        _ => (0.0, 0.0),
    };

    let objective_margin = ds.objective_margin(mission, horizon);
    let objective_margin_total = objective_margin.values().sum();
    let graph = mission_graph(&timesheet_months, &staffing_months, &totals, today);

    debug!(
        mission_id,
        consultants = consultants.len(),
        timesheet_months = timesheet_months.len(),
        staffing_months = staffing_months.len(),
        "Mission timesheet computed"
    );

    Ok(MissionTimesheet {
        mission_id,
        mission: ds.mission_full_name(mission),
        billing_mode: mission.billing_mode,
        price: mission.price,
        timesheet_months,
        staffing_months,
        consultants,
        totals,
        margin,
        avg_daily_rate,
        current_unused,
        forecasted_unused,
        objective_margin,
        objective_margin_total,
        graph,
    })
}

/// Aligns done and forecasted amounts on one date axis
///
/// When the last done month is also the first forecast month, it appears once.
fn mission_graph(
    timesheet_months: &[NaiveDate],
    staffing_months: &[NaiveDate],
    totals: &MissionTimesheetTotals,
    today: NaiveDate,
) -> MissionGraph {
    let min_date = previous_month(timesheet_months.first().copied().unwrap_or(today));
    let overlap = matches!(
        (timesheet_months.last(), staffing_months.first()),
        (Some(last), Some(first)) if last == first
    );
    let skip = usize::from(overlap);

    let mut dates = timesheet_months.to_vec();
    dates.extend(staffing_months.iter().skip(skip));

    let mut timesheet = totals.timesheet_amounts.clone();
    timesheet.resize(dates.len(), 0.0);
    let mut staffing = vec![0.0; timesheet_months.len() - skip.min(timesheet_months.len())];
    staffing.extend(&totals.staffing_amounts);
    staffing.resize(dates.len(), 0.0);

    let rounded = |values: Vec<f64>| -> Vec<f64> {
        values.into_iter().map(|v| to_int_or_round(v, 1)).collect()
    };
    MissionGraph {
        dates,
        timesheet: rounded(cumulate(&timesheet)),
        staffing: rounded(cumulate(&staffing)),
        min_date,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixedPriceMissionRow {
    pub mission_id: MissionId,
    pub mission: String,
    pub mission_code: String,
    pub done_k: f64,
    /// Current margin plus margin over objectives, k€
    pub current_margin: f64,
    pub target_margin: f64,
}

/// Margins of active fixed price production missions
pub fn fixed_price_missions_report(
    ds: &Dataset,
    subsidiary: Option<SubsidiaryId>,
    today: NaiveDate,
) -> Vec<FixedPriceMissionRow> {
    let mut missions: Vec<_> = ds
        .missions
        .values()
        .filter(|m| {
            m.active
                && m.nature == MissionNature::Prod
                && m.billing_mode == BillingMode::FixedPrice
                && subsidiary.map_or(true, |s| m.subsidiary_id == s)
        })
        .collect();
    ds.sort_missions(&mut missions);

    missions
        .into_iter()
        .map(|m| {
            let objective: f64 = ds.objective_margin(m, NaiveDate::MAX).values().sum();
            FixedPriceMissionRow {
                mission_id: m.id,
                mission: ds.mission_full_name(m),
                mission_code: ds.mission_code(m),
                done_k: round_to(ds.done_work_k(m).1, 1),
                current_margin: round_to(
                    ds.margin(m, MarginMode::Current, today) + objective / 1000.0,
                    1,
                ),
                target_margin: round_to(ds.margin(m, MarginMode::Target, today), 1),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionListRow {
    pub id: MissionId,
    pub mission_code: String,
    pub mission: String,
    pub nature: MissionNature,
    pub billing_mode: BillingMode,
    pub probability: u8,
    pub active: bool,
    pub subsidiary: String,
    pub responsible: Option<String>,
    /// k€
    pub price: Option<f64>,
    pub done_days: f64,
    pub done_k: f64,
}

/// Missions sorted by nature then mission id
pub fn missions(ds: &Dataset, only_active: bool) -> Vec<MissionListRow> {
    let mut missions: Vec<_> = ds
        .missions
        .values()
        .filter(|m| !only_active || m.active)
        .collect();
    ds.sort_missions(&mut missions);
    missions
        .into_iter()
        .map(|m| {
            let (done_days, done_k) = ds.done_work_k(m);
            MissionListRow {
                id: m.id,
                mission_code: ds.mission_code(m),
                mission: ds.mission_full_name(m),
                nature: m.nature,
                billing_mode: m.billing_mode,
                probability: m.probability,
                active: m.active,
                subsidiary: ds.subsidiary_name(m.subsidiary_id),
                responsible: m
                    .responsible_id
                    .and_then(|id| ds.consultants.get(&id))
                    .map(|c| c.name.clone()),
                price: m.price,
                done_days,
                done_k: round_to(done_k, 3),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{d, sample_dataset, today};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_mission_timesheet_fixed_price() {
        let ds = sample_dataset();
        let report = mission_timesheet(&ds, 100, today()).unwrap();

        assert_eq!(report.timesheet_months, vec![d(2024, 4, 1), d(2024, 5, 1)]);
        assert_eq!(report.staffing_months, vec![d(2024, 5, 1), d(2024, 6, 1)]);
        let ids: Vec<u64> = report.consultants.iter().map(|c| c.consultant_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let bob = &report.consultants[0];
        assert_eq!(bob.timesheet, vec![4.0, 1.5]);
        // May forecast minus the days already entered in May
        assert_eq!(bob.staffing, vec![3.5, 10.0]);
        assert!(close(bob.timesheet_total_k, 3.3));
        assert!(close(bob.estimated_days, 19.0));

        let alice = &report.consultants[2];
        assert_eq!(alice.staffing, vec![0.0, 2.0]);

        let totals = &report.totals;
        assert_eq!(totals.timesheet, vec![4.0, 4.5]);
        assert_eq!(totals.staffing_total, 15.5);
        assert!(close(totals.timesheet_total_k, 6.0));
        assert!(close(totals.staffing_total_k, 10.1));
        assert!(close(totals.timesheet_average_rates[0], 600.0));
        assert!(close(totals.timesheet_average_rates[1], 800.0));
        assert_eq!(totals.timesheet_average_rates.len(), 3);

        assert!(close(report.margin, 13.9));
        assert_eq!(report.avg_daily_rate, 1250.0);
        assert_eq!(report.current_unused, 0.0);
        assert_eq!(report.objective_margin_total, 900.0);
    }

    #[test]
    fn test_mission_graph_handles_overlap() {
        let ds = sample_dataset();
        let graph = mission_timesheet(&ds, 100, today()).unwrap().graph;
        assert_eq!(graph.dates, vec![d(2024, 4, 1), d(2024, 5, 1), d(2024, 6, 1)]);
        assert_eq!(graph.timesheet, vec![2.4, 6.0, 6.0]);
        assert_eq!(graph.staffing, vec![0.0, 2.1, 10.1]);
        assert_eq!(graph.min_date, d(2024, 3, 1));
    }

    #[test]
    fn test_mission_timesheet_time_spent() {
        let ds = sample_dataset();
        let report = mission_timesheet(&ds, 101, today()).unwrap();
        assert_eq!(report.margin, 0.0);
        assert_eq!(report.current_unused, 48.4);
        assert_eq!(report.forecasted_unused, 42.0);
        assert!(mission_timesheet(&ds, 999, today()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_fixed_price_report() {
        let ds = sample_dataset();
        let rows = fixed_price_missions_report(&ds, None, today());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mission_id, 100);
        assert_eq!(rows[0].done_k, 6.0);
        assert_eq!(rows[0].current_margin, 24.9);
        assert_eq!(rows[0].target_margin, 13.9);
        assert!(fixed_price_missions_report(&ds, Some(2), today()).is_empty());
    }

    #[test]
    fn test_missions_list() {
        let mut ds = sample_dataset();
        ds.missions.get_mut(&102).unwrap().active = false;
        let active: Vec<u64> = missions(&ds, true).iter().map(|m| m.id).collect();
        assert_eq!(active, vec![100, 101, 201, 200]);
        let all = missions(&ds, false);
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].responsible.as_deref(), Some("Alice Martin"));
        assert_eq!(all[0].subsidiary, "Alpha Conseil");
    }
}
