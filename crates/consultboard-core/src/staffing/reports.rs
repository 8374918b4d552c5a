//! Pivot table data: time spent per mission nature and turnover per mission

use crate::calendar::{fiscal_year, fiscal_year_bounds, fiscal_years, month_start, next_month};
use crate::models::{Dataset, LeadState, MissionNature, WorkFilter};
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Fiscal year selection of pivot reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearFilter {
    All,
    Year(i32),
}

impl YearFilter {
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("all") {
            return Some(YearFilter::All);
        }
        value.trim().parse().ok().map(YearFilter::Year)
    }
}

impl Serialize for YearFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            YearFilter::All => serializer.serialize_str("all"),
            YearFilter::Year(year) => serializer.serialize_i32(*year),
        }
    }
}

impl std::fmt::Display for YearFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YearFilter::All => f.write_str("all"),
            YearFilter::Year(year) => write!(f, "{year}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionsReportRow {
    /// "YYYY-MM"
    pub month: String,
    /// Mission description
    #[serde(rename = "type")]
    pub kind: String,
    pub consultant: String,
    pub subsidiary: String,
    pub profil: String,
    pub days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionsReport {
    pub nature: MissionNature,
    pub years: Vec<i32>,
    pub selected_year: Option<YearFilter>,
    pub rows: Vec<MissionsReportRow>,
}

/// Days spent on missions of one nature, per month, mission and consultant
///
/// Without an explicit year the latest fiscal year is used.
pub fn missions_report(
    ds: &Dataset,
    nature: MissionNature,
    year: Option<YearFilter>,
    fiscal_year_month: u32,
    today: NaiveDate,
) -> MissionsReport {
    let timesheets: Vec<_> = ds
        .timesheets
        .iter()
        .filter(|t| t.working_date <= today)
        .filter(|t| {
            ds.missions
                .get(&t.mission_id)
                .is_some_and(|m| m.nature == nature)
        })
        .collect();
    let years = fiscal_years(timesheets.iter().map(|t| t.working_date), fiscal_year_month);
    let Some(&latest) = years.last() else {
        return MissionsReport {
            nature,
            years,
            selected_year: None,
            rows: Vec::new(),
        };
    };
    let selected = year.unwrap_or(YearFilter::Year(latest));
    let bounds = match selected {
        YearFilter::Year(y) => Some(fiscal_year_bounds(y, fiscal_year_month)),
        YearFilter::All => None,
    };

    let mut grouped: BTreeMap<(NaiveDate, String, String, String, String), f64> = BTreeMap::new();
    for t in timesheets {
        if let Some((start, end)) = bounds {
            if t.working_date < start || t.working_date >= end {
                continue;
            }
        }
        let (Some(mission), Some(consultant)) =
            (ds.missions.get(&t.mission_id), ds.consultants.get(&t.consultant_id))
        else {
            continue;
        };
        let key = (
            month_start(t.working_date),
            mission.description.clone(),
            consultant.name.clone(),
            ds.profile(consultant).map(|p| p.name.clone()).unwrap_or_default(),
            ds.subsidiary_name(consultant.company_id),
        );
        *grouped.entry(key).or_default() += t.charge;
    }

    let rows = grouped
        .into_iter()
        .map(|((month, kind, consultant, profil, subsidiary), days)| MissionsReportRow {
            month: month.format("%Y-%m").to_string(),
            kind,
            consultant,
            subsidiary,
            profil,
            days,
        })
        .collect();

    MissionsReport {
        nature,
        years,
        selected_year: Some(selected),
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnoverRow {
    pub deal_id: String,
    pub name: String,
    pub client_organisation: String,
    pub client_company: String,
    pub responsible: String,
    pub billing_mode: String,
    pub broker: String,
    pub subsidiary: String,
    /// ISO date of the month start
    pub month: String,
    pub fiscal_year: i32,
    /// €; absent on rows of other subsidiaries
    pub turnover: Option<f64>,
    pub external_subcontractor_turnover: Option<f64>,
    pub internal_subcontractor_turnover: Option<f64>,
    pub own_turnover: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnoverPivot {
    pub years: Vec<i32>,
    pub selected_year: Option<YearFilter>,
    pub rows: Vec<TurnoverRow>,
}

/// Monthly turnover of won production missions, split by who did the work
///
/// Work done by consultants of another subsidiary also yields one row for that subsidiary.
pub fn turnover_pivotable(
    ds: &Dataset,
    year: Option<YearFilter>,
    fiscal_year_month: u32,
    today: NaiveDate,
) -> TurnoverPivot {
    let missions: Vec<_> = ds
        .missions
        .values()
        .filter(|m| m.nature == MissionNature::Prod)
        .filter_map(|m| {
            ds.mission_lead(m)
                .filter(|l| l.state == LeadState::Won)
                .map(|l| (m, l))
        })
        .collect();
    let years = fiscal_years(missions.iter().map(|(_, l)| l.creation_date), fiscal_year_month);
    let Some(&latest) = years.last() else {
        return TurnoverPivot {
            years,
            selected_year: None,
            rows: Vec::new(),
        };
    };
    let selected = year.unwrap_or(YearFilter::Year(latest));
    let bounds = match selected {
        YearFilter::Year(y) => {
            let (start, end) = fiscal_year_bounds(y, fiscal_year_month);
            Some((start, end.min(today)))
        }
        YearFilter::All => None,
    };

    let own_filter = WorkFilter::own_work();
    let with_external = WorkFilter {
        include_external_subcontractor: true,
        include_internal_subcontractor: false,
        ..WorkFilter::default()
    };
    let with_internal = WorkFilter {
        include_external_subcontractor: false,
        include_internal_subcontractor: true,
        ..WorkFilter::default()
    };

    let mut rows = Vec::new();
    for (mission, lead) in missions {
        let months: BTreeSet<NaiveDate> = ds
            .timesheets
            .iter()
            .filter(|t| t.mission_id == mission.id)
            .map(|t| month_start(t.working_date))
            .collect();
        let base = TurnoverRow {
            deal_id: lead.deal_id.clone(),
            name: ds.mission_short_name(mission),
            client_organisation: lead.client_organisation.clone(),
            client_company: lead.client_company.clone(),
            responsible: mission
                .responsible_id
                .and_then(|id| ds.consultants.get(&id))
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            billing_mode: mission.billing_mode.label().to_string(),
            broker: lead
                .business_broker
                .clone()
                .unwrap_or_else(|| "Direct".to_string()),
            subsidiary: ds.subsidiary_name(mission.subsidiary_id),
            month: String::new(),
            fiscal_year: 0,
            turnover: None,
            external_subcontractor_turnover: None,
            internal_subcontractor_turnover: None,
            own_turnover: 0.0,
        };

        for month in months {
            if let Some((start, end)) = bounds {
                if month < start || month >= end {
                    continue;
                }
            }
            let next = next_month(month);
            let period = |filter: &WorkFilter| {
                ds.done_work_period(mission, Some(month), Some(next), filter)
                    .1
                    .trunc()
            };
            let own = period(&own_filter);
            let external = period(&with_external);
            let internal = period(&with_internal);
            let fy = fiscal_year(month, fiscal_year_month);

            rows.push(TurnoverRow {
                month: month.to_string(),
                fiscal_year: fy,
                turnover: Some(external + internal - own),
                external_subcontractor_turnover: Some(external - own),
                internal_subcontractor_turnover: Some(internal - own),
                own_turnover: own,
                ..base.clone()
            });

            for subsidiary in ds
                .subsidiaries
                .values()
                .filter(|s| s.id != mission.subsidiary_id)
            {
                let filter = WorkFilter {
                    include_external_subcontractor: false,
                    subsidiary: Some(subsidiary.id),
                    ..WorkFilter::default()
                };
                let subsidiary_turnover = period(&filter);
                if subsidiary_turnover > 0.0 {
                    rows.push(TurnoverRow {
                        subsidiary: subsidiary.name.clone(),
                        month: month.to_string(),
                        fiscal_year: fy,
                        own_turnover: subsidiary_turnover,
                        ..base.clone()
                    });
                }
            }
        }
    }

    debug!(rows = rows.len(), year = %selected, "Turnover pivot computed");
    TurnoverPivot {
        years,
        selected_year: Some(selected),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{d, sample_dataset, today};

    #[test]
    fn test_year_filter_parse() {
        assert_eq!(YearFilter::parse("all"), Some(YearFilter::All));
        assert_eq!(YearFilter::parse("2023"), Some(YearFilter::Year(2023)));
        assert_eq!(YearFilter::parse("last"), None);
        assert_eq!(serde_json::to_string(&YearFilter::All).unwrap(), "\"all\"");
        assert_eq!(serde_json::to_string(&YearFilter::Year(2024)).unwrap(), "2024");
    }

    #[test]
    fn test_missions_report_holidays() {
        let ds = sample_dataset();
        let report = missions_report(&ds, MissionNature::Holidays, None, 4, today());
        assert_eq!(report.years, vec![2024]);
        assert_eq!(report.selected_year, Some(YearFilter::Year(2024)));
        assert_eq!(report.rows.len(), 1);
        let row = &report.rows[0];
        assert_eq!(row.month, "2024-05");
        assert_eq!(row.kind, "Holidays");
        assert_eq!(row.consultant, "Bob Durand");
        assert_eq!(row.profil, "Junior");
        assert_eq!(row.subsidiary, "Alpha Conseil");
        assert_eq!(row.days, 1.0);

        let json = serde_json::to_value(row).unwrap();
        assert_eq!(json["type"], "Holidays");
    }

    #[test]
    fn test_missions_report_year_selection() {
        let ds = sample_dataset();
        let prod = missions_report(&ds, MissionNature::Prod, Some(YearFilter::Year(2023)), 4, today());
        assert!(prod.rows.is_empty());
        let all = missions_report(&ds, MissionNature::Prod, Some(YearFilter::All), 4, today());
        // Bob in April; Alice, Bob, Chloe and Sam in May
        assert_eq!(all.rows.len(), 5);
        assert_eq!(all.rows[0].month, "2024-04");

        let empty = missions_report(&ds, MissionNature::Holidays, None, 4, d(2024, 5, 9));
        assert!(empty.years.is_empty());
        assert!(empty.rows.is_empty());
    }

    #[test]
    fn test_turnover_pivotable_splits_turnover() {
        let ds = sample_dataset();
        let pivot = turnover_pivotable(&ds, Some(YearFilter::All), 4, today());
        assert_eq!(pivot.years, vec![2023]);
        assert_eq!(pivot.rows.len(), 4);

        let may = pivot
            .rows
            .iter()
            .find(|r| r.deal_id == "ACM01" && r.month == "2024-05-01" && r.turnover.is_some())
            .unwrap();
        assert_eq!(may.own_turnover, 2900.0);
        assert_eq!(may.internal_subcontractor_turnover, Some(700.0));
        assert_eq!(may.external_subcontractor_turnover, Some(0.0));
        assert_eq!(may.turnover, Some(3600.0));
        assert_eq!(may.fiscal_year, 2024);
        assert_eq!(may.broker, "Direct");
        assert_eq!(may.billing_mode, "Fixed price");

        let beta = pivot.rows.iter().find(|r| r.subsidiary == "Beta Partners").unwrap();
        assert_eq!(beta.own_turnover, 700.0);
        assert_eq!(beta.turnover, None);

        let run = pivot.rows.iter().find(|r| r.deal_id == "GLX02").unwrap();
        assert_eq!(run.external_subcontractor_turnover, Some(1600.0));
        assert_eq!(run.own_turnover, 0.0);
    }

    #[test]
    fn test_turnover_pivotable_fiscal_year() {
        let ds = sample_dataset();
        // defaults to the latest fiscal year of lead creation, which has no timesheet
        let default = turnover_pivotable(&ds, None, 4, today());
        assert_eq!(default.selected_year, Some(YearFilter::Year(2023)));
        assert!(default.rows.is_empty());
        let current = turnover_pivotable(&ds, Some(YearFilter::Year(2024)), 4, today());
        assert_eq!(current.rows.len(), 4);
    }
}
