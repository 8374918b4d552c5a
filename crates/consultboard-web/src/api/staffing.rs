//! Forecast, production and timesheet routes

use super::{csv_response, month_from_path, today, CsvQuery};
use crate::error::ApiError;
use crate::user::ActingUser;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use consultboard_core::calendar::parse_month;
use consultboard_core::export::{
    all_timesheet_rows, consultant_timesheet_rows, detailed_timesheet_rows,
};
use consultboard_core::models::{ConsultantId, SubsidiaryId};
use consultboard_core::staffing::{
    self, check_user_timesheet_access, AllTimesheet, ConsultantTimesheet, DetailedTimesheetRow,
    HolidaysPlanning, MassStaffingRequest, PdcReview, PdcReviewParams, ProdReport, TimesheetInput,
    TimesheetSaveSummary,
};
use consultboard_core::staffing::pdc::PdcDetailRow;
use consultboard_core::{CoreError, DataStore};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn pdc_review(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Query(params): Query<PdcReviewParams>,
) -> Result<Json<PdcReview>, ApiError> {
    let review = staffing::pdc_review(&store.dataset(), &params, today())?;
    Ok(Json(review))
}

pub async fn pdc_detail(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path((consultant, staffing_date)): Path<(ConsultantId, String)>,
) -> Result<Json<Vec<PdcDetailRow>>, ApiError> {
    let rows = staffing::pdc_detail(&store.dataset(), consultant, &staffing_date)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ProdReportQuery {
    /// Last month of the report, "YYYY-MM"
    pub end: Option<String>,
    pub team: Option<ConsultantId>,
    pub subsidiary: Option<SubsidiaryId>,
}

pub async fn prod_report(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Query(query): Query<ProdReportQuery>,
) -> Result<Json<ProdReport>, ApiError> {
    let end = match query.end.as_deref() {
        Some(value) => Some(
            parse_month(value).ok_or_else(|| ApiError::bad_request(format!("Invalid month: {value}")))?,
        ),
        None => None,
    };
    let report = staffing::prod_report(&store.dataset(), end, query.team, query.subsidiary, today());
    Ok(Json(report))
}

pub async fn mass_staffing(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
    Json(request): Json<MassStaffingRequest>,
) -> Result<Json<Value>, ApiError> {
    let updated = store.mass_staffing(user.name(), &request, Utc::now()).await?;
    Ok(Json(json!({ "updated": updated })))
}

#[derive(Debug, Default, Deserialize)]
pub struct TimesheetQuery {
    #[serde(default)]
    pub csv: Option<String>,
    /// Week of the month, starting at 1
    pub week: Option<u32>,
}

pub async fn consultant_timesheet(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
    Path((id, year, month)): Path<(ConsultantId, i32, u32)>,
    Query(query): Query<TimesheetQuery>,
) -> Result<Response, ApiError> {
    let month = month_from_path(year, month)?;
    let settings = store.settings();
    let ds = store.dataset();

    let consultant = ds.consultant(id)?;
    let access = check_user_timesheet_access(&ds, ds.user(user.name())?, consultant, month, today());
    if !access.can_read() {
        return Err(CoreError::permission_denied(
            user.name(),
            format!("read timesheet of {}", consultant.trigramme),
        )
        .into());
    }

    let sheet: ConsultantTimesheet = staffing::consultant_timesheet(&ds, id, month, query.week)?;
    if query.csv.is_some() {
        let filename = match query.week {
            Some(week) => format!("{}_{}_w{week}.csv", consultant.trigramme, month.format("%Y-%m")),
            None => format!("{}_{}.csv", consultant.trigramme, month.format("%Y-%m")),
        };
        return Ok(csv_response(&filename, &consultant_timesheet_rows(&sheet, &settings)));
    }

    Ok(Json(json!({ "access": access, "timesheet": sheet })).into_response())
}

pub async fn save_timesheet(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
    Path((id, year, month)): Path<(ConsultantId, i32, u32)>,
    Json(input): Json<TimesheetInput>,
) -> Result<Json<TimesheetSaveSummary>, ApiError> {
    let month = month_from_path(year, month)?;
    let summary = store
        .save_timesheet(user.name(), id, month, &input, today())
        .await?;
    Ok(Json(summary))
}

#[derive(Debug, Default, Deserialize)]
pub struct AllTimesheetQuery {
    #[serde(default)]
    pub csv: Option<String>,
    pub subsidiary: Option<SubsidiaryId>,
}

pub async fn all_timesheet(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path((year, month)): Path<(i32, u32)>,
    Query(query): Query<AllTimesheetQuery>,
) -> Result<Response, ApiError> {
    let month = month_from_path(year, month)?;
    let separator = store.settings().decimal_separator;
    let sheet: Option<AllTimesheet> = staffing::all_timesheet(&store.dataset(), month, query.subsidiary);
    let Some(sheet) = sheet else {
        return Err(ApiError::NotFound(format!(
            "No timesheet for {}",
            month.format("%Y-%m")
        )));
    };

    if query.csv.is_some() {
        let filename = format!("timesheet_{}.csv", month.format("%Y-%m"));
        return Ok(csv_response(&filename, &all_timesheet_rows(&sheet, &separator)));
    }
    Ok(Json(sheet).into_response())
}

pub async fn detailed_timesheet(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path((year, month)): Path<(i32, u32)>,
    Query(query): Query<CsvQuery>,
) -> Result<Response, ApiError> {
    let month = month_from_path(year, month)?;
    let separator = store.settings().decimal_separator;
    let lines: Vec<DetailedTimesheetRow> = staffing::detailed_timesheet(&store.dataset(), month);

    if query.wants_csv() {
        let filename = format!("timesheet_detailed_{}.csv", month.format("%Y-%m"));
        return Ok(csv_response(&filename, &detailed_timesheet_rows(&lines, &separator)));
    }
    Ok(Json(lines).into_response())
}

pub async fn holidays_planning(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<Json<HolidaysPlanning>, ApiError> {
    let month = month_from_path(year, month)?;
    Ok(Json(staffing::holidays_planning(&store.dataset(), month, today())))
}
