//! Mission follow-up and edition routes

use super::{csv_response, today, CsvQuery};
use crate::error::ApiError;
use crate::user::ActingUser;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use consultboard_core::models::{LeadId, MissionId};
use consultboard_core::staffing::{
    self, mission_update_values, timesheet_report_data, AutoStaffingMode, DeactivateOutcome,
    MissionAttribute, MissionListRow,
};
use consultboard_core::{DataStore, MissionTotals};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Include archived missions
    #[serde(default)]
    pub all: Option<String>,
}

pub async fn list(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Query(query): Query<ListQuery>,
) -> Json<Vec<MissionListRow>> {
    Json(staffing::missions(&store.dataset(), query.all.is_none()))
}

pub async fn timesheet(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path(id): Path<MissionId>,
    Query(query): Query<CsvQuery>,
) -> Result<Response, ApiError> {
    let separator = store.settings().decimal_separator;
    let ds = store.dataset();

    if query.wants_csv() {
        let mission = ds.mission(id)?;
        let rows = timesheet_report_data(&ds, id, None, None, true, &separator)?;
        let filename = format!("{}_timesheet.csv", ds.mission_code(mission));
        return Ok(csv_response(&filename, &rows));
    }
    Ok(Json(staffing::mission_timesheet(&ds, id, today())?).into_response())
}

pub async fn totals(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path(id): Path<MissionId>,
) -> Result<Json<MissionTotals>, ApiError> {
    Ok(Json(store.mission_totals(id, today()).await?))
}

pub async fn deactivate(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path(id): Path<MissionId>,
) -> Result<Json<DeactivateOutcome>, ApiError> {
    Ok(Json(store.deactivate_mission(id).await?))
}

fn parse_attribute(value: &str) -> Result<MissionAttribute, ApiError> {
    MissionAttribute::parse(value)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown mission attribute: {value}")))
}

/// Choices offered when editing a mission attribute inline
pub async fn attribute_values(
    _user: ActingUser,
    Path(attribute): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let values: Vec<Value> = mission_update_values(parse_attribute(&attribute)?)
        .into_iter()
        .map(|(value, label)| json!({ "value": value, "label": label }))
        .collect();
    Ok(Json(Value::Array(values)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub attribute: String,
    pub mission_id: MissionId,
    pub value: String,
}

pub async fn update(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<Value>, ApiError> {
    let attribute = parse_attribute(&request.attribute)?;
    let label = store
        .mission_update(user.name(), attribute, request.mission_id, &request.value)
        .await?;
    Ok(Json(json!({ "label": label })))
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    /// `sold-{mission}-{consultant}` or `bought-{mission}-{consultant}`
    pub target: String,
    pub value: String,
}

pub async fn rate(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
    Json(request): Json<RateRequest>,
) -> Result<Json<Value>, ApiError> {
    let value = store
        .mission_consultant_rate(user.name(), &request.target, &request.value)
        .await?;
    Ok(Json(json!({ "value": value })))
}

#[derive(Debug, Deserialize)]
pub struct AutoStaffingRequest {
    pub mode: String,
    /// Months to spread the remaining budget over
    pub duration: u32,
}

pub async fn automatic_staffing(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
    Path(id): Path<MissionId>,
    Json(request): Json<AutoStaffingRequest>,
) -> Result<Json<Value>, ApiError> {
    let mode = AutoStaffingMode::parse(&request.mode)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown staffing mode: {}", request.mode)))?;
    let created = store
        .compute_automatic_staffing(user.name(), id, mode, request.duration, Utc::now())
        .await?;
    Ok(Json(json!({ "created": created })))
}

pub async fn create_from_lead(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
    Path(lead_id): Path<LeadId>,
) -> Result<impl IntoResponse, ApiError> {
    let mission_id = store.create_mission_from_lead(user.name(), lead_id, Utc::now())?;
    Ok((StatusCode::CREATED, Json(json!({ "mission_id": mission_id }))))
}
