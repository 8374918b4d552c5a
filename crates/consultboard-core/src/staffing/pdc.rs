//! Staffing plan review ("plan de charge") over the coming months

use crate::calendar::{add_months, month_start, next_month, safe_ratio, to_int_or_round, working_days};
use crate::error::CoreError;
use crate::models::{ConsultantId, Dataset, MissionId, MissionNature, SubsidiaryId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Months displayed when the caller does not choose
pub const DEFAULT_PDC_MONTHS: u32 = 4;
/// Upper bound on displayed months
pub const MAX_PDC_MONTHS: u32 = 12;

/// How staffing on missions not yet won is counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    /// Only missions at 100%
    None,
    /// Charge weighted by the mission probability
    #[default]
    Balanced,
    /// Raw charge of every mission with a non-zero probability
    Full,
}

impl Projection {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Projection::None),
            "balanced" => Some(Projection::Balanced),
            "full" => Some(Projection::Full),
            _ => None,
        }
    }

    /// Days counted for a staffing charge, `None` when the mission is left out
    fn weight(&self, charge: f64, probability: u8) -> Option<f64> {
        match self {
            Projection::None if probability == 100 => Some(charge),
            Projection::None => None,
            _ if probability == 0 => None,
            Projection::Balanced => Some(charge * probability as f64 / 100.0),
            Projection::Full => Some(charge),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Manager,
    Level,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdcReviewParams {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub n_month: Option<u32>,
    #[serde(default)]
    pub projection: Projection,
    #[serde(default)]
    pub groupby: GroupBy,
    /// Staffing manager whose team is displayed
    #[serde(default)]
    pub team: Option<ConsultantId>,
    #[serde(default)]
    pub subsidiary: Option<SubsidiaryId>,
}

/// Days for one consultant (or the whole scope) in one month
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PdcCell {
    pub prod: f64,
    pub unprod: f64,
    pub holidays: f64,
    pub available: f64,
}

impl PdcCell {
    pub fn as_array(&self) -> [f64; 4] {
        [self.prod, self.unprod, self.holidays, self.available]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdcConsultantRow {
    pub consultant_id: ConsultantId,
    pub consultant: String,
    pub staffing_manager: String,
    pub level: u32,
    pub months: Vec<PdcCell>,
    /// Client companies of the production missions staffed over the period
    pub clients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdcReview {
    pub start: NaiveDate,
    pub months: Vec<NaiveDate>,
    pub projection: Projection,
    pub groupby: GroupBy,
    pub rows: Vec<PdcConsultantRow>,
    pub totals: Vec<PdcCell>,
    /// Percentages; holidays over all days, the others over days minus holidays
    pub rates: Vec<PdcCell>,
    pub previous_slice: NaiveDate,
    pub next_slice: NaiveDate,
}

/// Forecasted load of productive employees, month by month
pub fn pdc_review(
    ds: &Dataset,
    params: &PdcReviewParams,
    today: NaiveDate,
) -> Result<PdcReview, CoreError> {
    let mut consultants: Vec<_> = ds
        .productive_consultants()
        .into_iter()
        .filter(|c| params.team.map_or(true, |t| c.staffing_manager_id == Some(t)))
        .filter(|c| params.subsidiary.map_or(true, |s| c.company_id == s))
        .collect();
    if consultants.is_empty() {
        return Err(CoreError::NoProductiveConsultant);
    }

    let n_month = params
        .n_month
        .unwrap_or(DEFAULT_PDC_MONTHS)
        .clamp(1, MAX_PDC_MONTHS);
    let start = month_start(params.start.unwrap_or(today));
    let months: Vec<NaiveDate> = (0..n_month as i32).map(|i| add_months(start, i)).collect();
    let end = next_month(*months.last().unwrap_or(&start));

    let holidays = ds.holiday_days();
    let available: Vec<f64> = months
        .iter()
        .map(|m| working_days(*m, &holidays, None) as f64)
        .collect();
    let month_index: HashMap<NaiveDate, usize> =
        months.iter().enumerate().map(|(i, m)| (*m, i)).collect();

    let mut raw_totals = vec![PdcCell::default(); months.len()];
    let mut rows = Vec::with_capacity(consultants.len());

    consultants.sort_by(|a, b| a.name.cmp(&b.name));
    for consultant in &consultants {
        let mut cells = vec![PdcCell::default(); months.len()];
        let mut prod_missions: BTreeSet<MissionId> = BTreeSet::new();

        for s in ds.staffings.iter().filter(|s| {
            s.consultant_id == consultant.id && s.staffing_date >= start && s.staffing_date < end
        }) {
            let (Some(&i), Some(mission)) =
                (month_index.get(&s.staffing_date), ds.missions.get(&s.mission_id))
            else {
                continue;
            };
            let Some(days) = params.projection.weight(s.charge, mission.probability) else {
                continue;
            };
            match mission.nature {
                MissionNature::Prod => {
                    prod_missions.insert(mission.id);
                    cells[i].prod += days;
                }
                MissionNature::NonProd => cells[i].unprod += days,
                MissionNature::Holidays => cells[i].holidays += days,
            }
        }

        let displayed: Vec<PdcCell> = cells
            .iter()
            .zip(&available)
            .enumerate()
            .map(|(i, (cell, available))| {
                let total = &mut raw_totals[i];
                total.prod += cell.prod;
                total.unprod += cell.unprod;
                total.holidays += cell.holidays;
                total.available += available - (cell.prod + cell.unprod + cell.holidays);
                rounded_cell(cell, *available)
            })
            .collect();

        let clients: BTreeSet<String> = prod_missions
            .iter()
            .filter_map(|id| ds.missions.get(id))
            .filter_map(|m| ds.mission_lead(m))
            .map(|l| l.client_company.clone())
            .collect();

        rows.push(PdcConsultantRow {
            consultant_id: consultant.id,
            consultant: consultant.name.clone(),
            staffing_manager: consultant
                .staffing_manager_id
                .and_then(|id| ds.consultants.get(&id))
                .map(|m| m.name.clone())
                .unwrap_or_default(),
            level: ds.profile_level(consultant),
            months: displayed,
            clients: clients.into_iter().collect(),
        });
    }

    // stable sorts: the name order survives inside each group
    match params.groupby {
        GroupBy::Manager => rows.sort_by(|a, b| a.staffing_manager.cmp(&b.staffing_manager)),
        GroupBy::Level => rows.sort_by_key(|r| r.level),
    }

    let people = consultants.len() as f64;
    let rates = raw_totals
        .iter()
        .zip(&available)
        .map(|(total, available)| {
            let ndays = people * available;
            let worked = ndays - total.holidays;
            PdcCell {
                prod: to_int_or_round(100.0 * safe_ratio(total.prod, worked), 1),
                unprod: to_int_or_round(100.0 * safe_ratio(total.unprod, worked), 1),
                holidays: to_int_or_round(100.0 * safe_ratio(total.holidays, ndays), 1),
                available: to_int_or_round(100.0 * safe_ratio(total.available, worked), 1),
            }
        })
        .collect();
    let totals = raw_totals
        .iter()
        .zip(&available)
        .map(|(total, available)| rounded_cell(total, people * available))
        .collect();

    debug!(
        consultants = rows.len(),
        months = months.len(),
        projection = ?params.projection,
        "PDC review computed"
    );

    Ok(PdcReview {
        start,
        months,
        projection: params.projection,
        groupby: params.groupby,
        rows,
        totals,
        rates,
        previous_slice: add_months(start, -(n_month as i32)),
        next_slice: add_months(start, n_month as i32),
    })
}

/// Round each figure; available days are derived from the rounded ones
fn rounded_cell(cell: &PdcCell, available: f64) -> PdcCell {
    let prod = to_int_or_round(cell.prod, 1);
    let unprod = to_int_or_round(cell.unprod, 1);
    let holidays = to_int_or_round(cell.holidays, 1);
    PdcCell {
        prod,
        unprod,
        holidays,
        available: to_int_or_round(available - (prod + unprod + holidays), 1),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdcDetailRow {
    pub mission_id: MissionId,
    pub mission: String,
    pub mission_code: String,
    pub probability: u8,
    pub charge: f64,
    pub comment: Option<String>,
}

/// Parse the compact "YYYYMM" form used in links
pub fn parse_staffing_date(value: &str) -> Result<NaiveDate, CoreError> {
    let invalid = || CoreError::invalid_value("staffing_date", format!("'{value}' is not YYYYMM"));
    if value.len() != 6 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let year: i32 = value[..4].parse().map_err(|_| invalid())?;
    let month: u32 = value[4..].parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)
}

/// Staffing of a consultant on active missions for one month
pub fn pdc_detail(
    ds: &Dataset,
    consultant_id: ConsultantId,
    staffing_date: &str,
) -> Result<Vec<PdcDetailRow>, CoreError> {
    ds.consultant(consultant_id)?;
    let month = parse_staffing_date(staffing_date)?;

    let mut rows: Vec<PdcDetailRow> = ds
        .staffings
        .iter()
        .filter(|s| s.consultant_id == consultant_id && s.staffing_date == month)
        .filter_map(|s| {
            let mission = ds.missions.get(&s.mission_id).filter(|m| m.active)?;
            Some(PdcDetailRow {
                mission_id: mission.id,
                mission: ds.mission_full_name(mission),
                mission_code: ds.mission_code(mission),
                probability: mission.probability,
                charge: s.charge,
                comment: s.comment.clone(),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.mission_code.cmp(&b.mission_code));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{d, sample_dataset, today};

    fn params(projection: Projection) -> PdcReviewParams {
        PdcReviewParams {
            start: Some(d(2024, 6, 1)),
            n_month: Some(2),
            projection,
            ..PdcReviewParams::default()
        }
    }

    fn row<'a>(review: &'a PdcReview, id: ConsultantId) -> &'a PdcConsultantRow {
        review.rows.iter().find(|r| r.consultant_id == id).unwrap()
    }

    #[test]
    fn test_pdc_review_balanced() {
        let ds = sample_dataset();
        let review = pdc_review(&ds, &params(Projection::Balanced), today()).unwrap();

        assert_eq!(review.months, vec![d(2024, 6, 1), d(2024, 7, 1)]);
        // employees only: Dan is not productive, Sam is a subcontractor
        assert_eq!(review.rows.len(), 3);
        assert_eq!(row(&review, 2).months[0].as_array(), [12.0, 0.0, 1.0, 7.0]);
        assert_eq!(row(&review, 1).months[0].as_array(), [2.0, 0.0, 0.0, 18.0]);
        assert_eq!(row(&review, 3).months[0].as_array(), [0.0, 0.0, 0.0, 20.0]);
        assert_eq!(row(&review, 2).clients, vec!["Acme", "Globex"]);

        assert_eq!(review.totals[0].as_array(), [14.0, 0.0, 1.0, 45.0]);
        assert_eq!(review.rates[0].as_array(), [23.7, 0.0, 1.7, 76.3]);
        assert_eq!(review.previous_slice, d(2024, 4, 1));
        assert_eq!(review.next_slice, d(2024, 8, 1));
    }

    #[test]
    fn test_pdc_review_projections() {
        let ds = sample_dataset();
        let none = pdc_review(&ds, &params(Projection::None), today()).unwrap();
        assert_eq!(row(&none, 2).months[0].prod, 10.0);
        let full = pdc_review(&ds, &params(Projection::Full), today()).unwrap();
        assert_eq!(row(&full, 2).months[0].prod, 14.0);
    }

    #[test]
    fn test_pdc_review_grouping_and_scope() {
        let ds = sample_dataset();
        let by_manager = pdc_review(&ds, &params(Projection::Balanced), today()).unwrap();
        let ids: Vec<u64> = by_manager.rows.iter().map(|r| r.consultant_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let by_level = PdcReviewParams {
            groupby: GroupBy::Level,
            ..params(Projection::Balanced)
        };
        let review = pdc_review(&ds, &by_level, today()).unwrap();
        let ids: Vec<u64> = review.rows.iter().map(|r| r.consultant_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let team = PdcReviewParams {
            team: Some(1),
            ..params(Projection::Balanced)
        };
        assert_eq!(pdc_review(&ds, &team, today()).unwrap().rows.len(), 2);

        let beta = PdcReviewParams {
            subsidiary: Some(2),
            ..params(Projection::Balanced)
        };
        assert_eq!(pdc_review(&ds, &beta, today()).unwrap().rows.len(), 1);
    }

    #[test]
    fn test_pdc_review_defaults_and_errors() {
        let ds = sample_dataset();
        let review = pdc_review(&ds, &PdcReviewParams::default(), today()).unwrap();
        assert_eq!(review.start, d(2024, 5, 1));
        assert_eq!(review.months.len(), DEFAULT_PDC_MONTHS as usize);

        let many = PdcReviewParams {
            n_month: Some(40),
            ..PdcReviewParams::default()
        };
        assert_eq!(pdc_review(&ds, &many, today()).unwrap().months.len(), 12);

        let nobody = PdcReviewParams {
            team: Some(5),
            ..PdcReviewParams::default()
        };
        assert!(matches!(
            pdc_review(&ds, &nobody, today()),
            Err(CoreError::NoProductiveConsultant)
        ));
    }

    #[test]
    fn test_pdc_detail() {
        let ds = sample_dataset();
        let rows = pdc_detail(&ds, 2, "202406").unwrap();
        let missions: Vec<u64> = rows.iter().map(|r| r.mission_id).collect();
        assert_eq!(missions, vec![100, 102, 200]);
        assert_eq!(rows[0].charge, 10.0);

        assert!(matches!(
            pdc_detail(&ds, 2, "2024-6"),
            Err(CoreError::InvalidValue { .. })
        ));
        assert!(pdc_detail(&ds, 2, "202413").is_err());
        assert!(pdc_detail(&ds, 42, "202406").unwrap_err().is_not_found());
    }
}
