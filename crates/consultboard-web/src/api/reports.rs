//! Pivot reports and rate graphs

use super::today;
use crate::error::ApiError;
use crate::user::ActingUser;
use axum::extract::{Path, Query, State};
use axum::Json;
use consultboard_core::models::{ConsultantId, MissionNature, SubsidiaryId};
use consultboard_core::staffing::graphs::{
    self, ConsultantRatesGraph, ProfileRatesGraph, TimesheetRatesGraph,
};
use consultboard_core::staffing::{
    self, FixedPriceMissionRow, GraphScope, MissionsReport, TurnoverPivot, YearFilter,
};
use consultboard_core::DataStore;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct SubsidiaryQuery {
    pub subsidiary: Option<SubsidiaryId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct YearQuery {
    /// Fiscal year, or "all"
    pub year: Option<String>,
}

impl YearQuery {
    fn filter(&self) -> Result<Option<YearFilter>, ApiError> {
        self.year
            .as_deref()
            .map(|value| {
                YearFilter::parse(value)
                    .ok_or_else(|| ApiError::bad_request(format!("Invalid year: {value}")))
            })
            .transpose()
    }
}

pub async fn fixed_price(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Query(query): Query<SubsidiaryQuery>,
) -> Json<Vec<FixedPriceMissionRow>> {
    Json(staffing::fixed_price_missions_report(
        &store.dataset(),
        query.subsidiary,
        today(),
    ))
}

pub async fn missions(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path(nature): Path<String>,
    Query(query): Query<YearQuery>,
) -> Result<Json<MissionsReport>, ApiError> {
    let nature = MissionNature::parse(&nature)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown mission nature: {nature}")))?;
    let year = query.filter()?;
    let fiscal_year_month = store.settings().fiscal_year_month;
    Ok(Json(staffing::missions_report(
        &store.dataset(),
        nature,
        year,
        fiscal_year_month,
        today(),
    )))
}

pub async fn turnover(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Query(query): Query<YearQuery>,
) -> Result<Json<TurnoverPivot>, ApiError> {
    let year = query.filter()?;
    let fiscal_year_month = store.settings().fiscal_year_month;
    Ok(Json(staffing::turnover_pivotable(
        &store.dataset(),
        year,
        fiscal_year_month,
        today(),
    )))
}

/// `null` when no timesheet was ever recorded
pub async fn timesheet_rates(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Query(scope): Query<GraphScope>,
) -> Json<Option<TimesheetRatesGraph>> {
    Json(graphs::timesheet_rates_bar(&store.dataset(), scope, today()))
}

pub async fn profile_rates(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Query(scope): Query<GraphScope>,
) -> Json<Option<ProfileRatesGraph>> {
    Json(graphs::profile_rates(&store.dataset(), scope, today()))
}

pub async fn consultant_rates(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path(id): Path<ConsultantId>,
) -> Result<Json<ConsultantRatesGraph>, ApiError> {
    Ok(Json(graphs::consultant_rates(&store.dataset(), id, today())?))
}
