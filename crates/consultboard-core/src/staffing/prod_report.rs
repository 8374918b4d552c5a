//! Monthly production of consultants against their objectives

use crate::calendar::{add_months, month_start, next_month, working_days};
use crate::models::{ConsultantId, Dataset, MissionNature, RateObjectiveType, SubsidiaryId};
use chrono::NaiveDate;
use serde::Serialize;

/// Months covered by the report, ending with the selected one
pub const PROD_REPORT_MONTHS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProdStatus {
    Ok,
    Ko,
    OkButDailyRate,
    OkButProdRate,
    KoButDailyRate,
    KoButProdRate,
}

impl ProdStatus {
    pub fn color(&self) -> &'static str {
        match self {
            ProdStatus::Ok => "#43E707",
            ProdStatus::Ko => "#E76F6F",
            ProdStatus::OkButDailyRate => "#CCE7B2",
            ProdStatus::OkButProdRate => "#A2E774",
            ProdStatus::KoButDailyRate => "#E7E36D",
            ProdStatus::KoButProdRate => "#F99E9E",
        }
    }

    /// Turnover compared to forecast, then which of the two rates explains it
    pub fn evaluate(
        turnover: f64,
        forecast: f64,
        prod_rate: f64,
        prod_rate_obj: f64,
        daily_rate: f64,
        daily_rate_obj: f64,
    ) -> Self {
        if turnover >= forecast {
            if prod_rate < prod_rate_obj {
                ProdStatus::OkButProdRate
            } else if daily_rate < daily_rate_obj {
                ProdStatus::OkButDailyRate
            } else {
                ProdStatus::Ok
            }
        } else if prod_rate >= prod_rate_obj {
            ProdStatus::KoButProdRate
        } else if daily_rate >= daily_rate_obj {
            ProdStatus::KoButDailyRate
        } else {
            ProdStatus::Ko
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProdCell {
    pub status: ProdStatus,
    pub color: &'static str,
    /// €, truncated
    pub turnover: f64,
    /// €, truncated
    pub forecast: f64,
    pub daily_rate: f64,
    pub daily_rate_obj: f64,
    /// Percent
    pub prod_rate: f64,
    /// Percent
    pub prod_rate_obj: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProdReportRow {
    pub consultant_id: ConsultantId,
    pub consultant: String,
    pub months: Vec<ProdCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProdTotalCell {
    pub status: ProdStatus,
    pub color: &'static str,
    pub turnover: f64,
    pub forecast: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProdReport {
    pub end: NaiveDate,
    pub months: Vec<NaiveDate>,
    pub rows: Vec<ProdReportRow>,
    pub totals: Vec<ProdTotalCell>,
    pub previous_slice: NaiveDate,
    pub next_slice: NaiveDate,
}

/// Production of a consultant for one month, measured up to today
fn prod_cell(
    ds: &Dataset,
    consultant_id: ConsultantId,
    month: NaiveDate,
    today: NaiveDate,
) -> ProdCell {
    let upper = today.min(next_month(month));
    let holidays = ds.holiday_days();
    let month_days = working_days(month, &holidays, Some(today)) as f64;
    let days = ds.consultant_days_by_nature(consultant_id, month, upper);
    let day_count = |nature: MissionNature| days.get(&nature).copied().unwrap_or(0.0);
    let prod = day_count(MissionNature::Prod);
    let nonprod = day_count(MissionNature::NonProd);

    let objectives = ds
        .rate_objective(consultant_id, month, RateObjectiveType::DailyRate)
        .zip(ds.rate_objective(consultant_id, month, RateObjectiveType::ProdRate));
    // production rate objectives are stored in percent
    let (daily_rate_obj, prod_rate_obj, forecast) = match objectives {
        Some((daily, prod_obj)) => (
            daily,
            prod_obj / 100.0,
            (daily * prod_obj / 100.0 * (month_days - day_count(MissionNature::Holidays))).trunc(),
        ),
        None => (0.0, 0.0, 0.0),
    };

    let turnover = ds.consultant_turnover(consultant_id, month, upper).trunc();
    let prod_rate = if prod + nonprod > 0.0 {
        prod / (prod + nonprod)
    } else {
        0.0
    };
    let daily_rate = if prod > 0.0 { turnover / prod } else { 0.0 };

    let status = ProdStatus::evaluate(
        turnover,
        forecast,
        prod_rate,
        prod_rate_obj,
        daily_rate,
        daily_rate_obj,
    );
    ProdCell {
        status,
        color: status.color(),
        turnover,
        forecast,
        daily_rate,
        daily_rate_obj,
        prod_rate: prod_rate * 100.0,
        prod_rate_obj: prod_rate_obj * 100.0,
    }
}

/// Production report for the months ending at `end` (never after the current month)
pub fn prod_report(
    ds: &Dataset,
    end: Option<NaiveDate>,
    team: Option<ConsultantId>,
    subsidiary: Option<SubsidiaryId>,
    today: NaiveDate,
) -> ProdReport {
    let current = month_start(today);
    let end = end.map(month_start).unwrap_or(current).min(current);
    let months: Vec<NaiveDate> = (1 - PROD_REPORT_MONTHS..=0)
        .map(|i| add_months(end, i))
        .collect();

    let mut consultants: Vec<_> = ds
        .productive_consultants()
        .into_iter()
        .filter(|c| team.map_or(true, |t| c.staffing_manager_id == Some(t)))
        .filter(|c| subsidiary.map_or(true, |s| c.company_id == s))
        .collect();
    consultants.sort_by(|a, b| a.name.cmp(&b.name));

    let mut done = vec![0.0; months.len()];
    let mut forecasted = vec![0.0; months.len()];
    let rows = consultants
        .into_iter()
        .map(|c| {
            let cells: Vec<ProdCell> = months
                .iter()
                .enumerate()
                .map(|(i, month)| {
                    let cell = prod_cell(ds, c.id, *month, today);
                    done[i] += cell.turnover;
                    forecasted[i] += cell.forecast;
                    cell
                })
                .collect();
            ProdReportRow {
                consultant_id: c.id,
                consultant: c.name.clone(),
                months: cells,
            }
        })
        .collect();

    let totals = done
        .iter()
        .zip(&forecasted)
        .map(|(turnover, forecast)| {
            let status = if forecast > turnover {
                ProdStatus::Ko
            } else {
                ProdStatus::Ok
            };
            ProdTotalCell {
                status,
                color: status.color(),
                turnover: *turnover,
                forecast: *forecast,
            }
        })
        .collect();

    ProdReport {
        end,
        months,
        rows,
        totals,
        previous_slice: add_months(end, -PROD_REPORT_MONTHS),
        next_slice: add_months(end, PROD_REPORT_MONTHS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{d, sample_dataset, today};

    fn cell<'a>(report: &'a ProdReport, consultant: ConsultantId, month: usize) -> &'a ProdCell {
        &report
            .rows
            .iter()
            .find(|r| r.consultant_id == consultant)
            .unwrap()
            .months[month]
    }

    #[test]
    fn test_status_evaluation() {
        assert_eq!(ProdStatus::evaluate(10.0, 5.0, 0.9, 0.8, 600.0, 500.0), ProdStatus::Ok);
        assert_eq!(ProdStatus::evaluate(10.0, 5.0, 0.7, 0.8, 600.0, 500.0), ProdStatus::OkButProdRate);
        assert_eq!(ProdStatus::evaluate(10.0, 5.0, 0.9, 0.8, 400.0, 500.0), ProdStatus::OkButDailyRate);
        assert_eq!(ProdStatus::evaluate(1.0, 5.0, 0.9, 0.8, 400.0, 500.0), ProdStatus::KoButProdRate);
        assert_eq!(ProdStatus::evaluate(1.0, 5.0, 0.7, 0.8, 600.0, 500.0), ProdStatus::KoButDailyRate);
        assert_eq!(ProdStatus::evaluate(1.0, 5.0, 0.7, 0.8, 400.0, 500.0), ProdStatus::Ko);
        assert_eq!(ProdStatus::Ko.color(), "#E76F6F");
    }

    #[test]
    fn test_prod_report_months_are_clamped() {
        let ds = sample_dataset();
        let report = prod_report(&ds, Some(d(2024, 9, 1)), None, None, today());
        assert_eq!(report.end, d(2024, 5, 1));
        assert_eq!(report.months.first(), Some(&d(2024, 1, 1)));
        assert_eq!(report.months.last(), Some(&d(2024, 5, 1)));
        assert_eq!(report.previous_slice, d(2023, 12, 1));
    }

    #[test]
    fn test_prod_report_current_month() {
        let ds = sample_dataset();
        let report = prod_report(&ds, None, None, None, today());
        let may = report.months.len() - 1;

        let bob = cell(&report, 2, may);
        assert_eq!(bob.turnover, 900.0);
        // 9 open days up to the 15th, minus one day off
        assert_eq!(bob.forecast, 4320.0);
        assert_eq!(bob.prod_rate, 75.0);
        assert_eq!(bob.daily_rate, 600.0);
        assert_eq!(bob.status, ProdStatus::KoButDailyRate);

        let alice = cell(&report, 1, may);
        assert_eq!(alice.turnover, 2000.0);
        assert_eq!(alice.status, ProdStatus::KoButProdRate);

        // no objective: nothing expected
        let chloe = cell(&report, 3, may);
        assert_eq!(chloe.forecast, 0.0);
        assert_eq!(chloe.status, ProdStatus::Ok);

        assert_eq!(report.totals[may].turnover, 3600.0);
        assert_eq!(report.totals[may].status, ProdStatus::Ko);
        // nothing done in January against the objectives
        assert_eq!(report.totals[0].turnover, 0.0);
        assert_eq!(report.totals[0].status, ProdStatus::Ko);
    }

    #[test]
    fn test_prod_rate_objective_is_a_percentage() {
        let ds = sample_dataset();
        let report = prod_report(&ds, None, None, None, today());
        let may = report.months.len() - 1;

        let bob = cell(&report, 2, may);
        assert_eq!(bob.prod_rate_obj, 90.0);
        // 600 €/day at 90% over 8 days
        assert_eq!(bob.forecast, 4320.0);
        let alice = cell(&report, 1, may);
        assert_eq!(alice.prod_rate_obj, 80.0);
    }

    #[test]
    fn test_prod_report_scope() {
        let ds = sample_dataset();
        let team = prod_report(&ds, None, Some(1), None, today());
        let ids: Vec<u64> = team.rows.iter().map(|r| r.consultant_id).collect();
        assert_eq!(ids, vec![2, 3]);
        let beta = prod_report(&ds, None, None, Some(2), today());
        assert_eq!(beta.rows.len(), 1);
    }
}
