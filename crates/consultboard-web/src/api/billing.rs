//! Client billing routes

use super::{month_from_path, today};
use crate::error::ApiError;
use crate::user::ActingUser;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use consultboard_core::billing::{
    self, bill_pdf_filename, billing_info, month_prod_charges, BillingControlFilter,
    BillingControlRow, LeadBilling,
};
use consultboard_core::calendar::parse_month;
use consultboard_core::models::{BillId, MissionId};
use consultboard_core::{CoreError, DataStore};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn control(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Query(filter): Query<BillingControlFilter>,
) -> Json<Vec<BillingControlRow>> {
    let bills = store.bills();
    let expenses = store.expenses();
    Json(billing::client_billing_control_pivotable_data(
        &store.dataset(),
        &bills,
        &expenses,
        &filter,
    ))
}

/// What should be billed for the month, per lead, mission and consultant
pub async fn info(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<Json<Vec<LeadBilling>>, ApiError> {
    let month = month_from_path(year, month)?;
    let ds = store.dataset();
    let charges = month_prod_charges(&ds, month);
    Ok(Json(billing_info(&ds, &charges)))
}

pub async fn bill(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path(id): Path<BillId>,
) -> Result<Json<Value>, ApiError> {
    let bill = store.bill(id).ok_or(CoreError::BillNotFound { id })?;
    let pdf = bill_pdf_filename(&store.dataset(), &bill);
    Ok(Json(json!({ "bill": bill, "pdf_filename": pdf })))
}

#[derive(Debug, Deserialize)]
pub struct FromTimesheetRequest {
    pub mission_id: MissionId,
    /// "YYYY-MM"
    pub month: String,
}

pub async fn from_timesheet(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Json(request): Json<FromTimesheetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let month = parse_month(&request.month)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid month: {}", request.month)))?;
    let bill = store.create_bill_from_timesheet(request.mission_id, month, today())?;
    Ok((StatusCode::CREATED, Json(bill)))
}

#[derive(Debug, Deserialize)]
pub struct FromProportionRequest {
    pub mission_id: MissionId,
    /// Share of the mission price, between 0 and 1
    pub proportion: f64,
}

pub async fn from_proportion(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Json(request): Json<FromProportionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bill = store.create_bill_from_proportion(request.mission_id, request.proportion, today())?;
    Ok((StatusCode::CREATED, Json(bill)))
}
