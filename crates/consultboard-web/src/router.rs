//! Web router using Axum

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use consultboard_core::DataStore;
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::api::{billing, expenses, missions, people, reports, staffing};
use crate::sse;

/// Create the web router
pub fn create_router(store: Arc<DataStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/events", get(sse_handler))
        // staffing and timesheets
        .route("/api/staffing/pdc-review", get(staffing::pdc_review))
        .route(
            "/api/staffing/pdc-detail/{consultant}/{staffing_date}",
            get(staffing::pdc_detail),
        )
        .route("/api/staffing/prod-report", get(staffing::prod_report))
        .route("/api/staffing/mass", post(staffing::mass_staffing))
        .route(
            "/api/consultants/{id}/timesheet/{year}/{month}",
            get(staffing::consultant_timesheet).post(staffing::save_timesheet),
        )
        .route("/api/timesheets/all/{year}/{month}", get(staffing::all_timesheet))
        .route(
            "/api/timesheets/detailed/{year}/{month}",
            get(staffing::detailed_timesheet),
        )
        .route(
            "/api/holidays-planning/{year}/{month}",
            get(staffing::holidays_planning),
        )
        // missions and leads
        .route("/api/missions", get(missions::list))
        .route("/api/missions/attributes/{attribute}", get(missions::attribute_values))
        .route("/api/missions/update", post(missions::update))
        .route("/api/missions/rate", post(missions::rate))
        .route("/api/missions/{id}/timesheet", get(missions::timesheet))
        .route("/api/missions/{id}/totals", get(missions::totals))
        .route("/api/missions/{id}/deactivate", post(missions::deactivate))
        .route(
            "/api/missions/{id}/automatic-staffing",
            post(missions::automatic_staffing),
        )
        .route("/api/missions/{id}/expenses", get(expenses::mission_expenses))
        .route("/api/leads/{id}/missions", post(missions::create_from_lead))
        // reports and graphs
        .route("/api/reports/fixed-price", get(reports::fixed_price))
        .route("/api/reports/missions/{nature}", get(reports::missions))
        .route("/api/reports/turnover", get(reports::turnover))
        .route("/api/graphs/timesheet-rates", get(reports::timesheet_rates))
        .route("/api/graphs/profile-rates", get(reports::profile_rates))
        .route("/api/graphs/consultant-rates/{id}", get(reports::consultant_rates))
        // billing
        .route("/api/billing/control", get(billing::control))
        .route("/api/billing/info/{year}/{month}", get(billing::info))
        .route("/api/billing/bills/{id}", get(billing::bill))
        .route("/api/billing/bills/from-timesheet", post(billing::from_timesheet))
        .route("/api/billing/bills/from-proportion", post(billing::from_proportion))
        // expenses
        .route("/api/expenses", get(expenses::dashboard).post(expenses::submit))
        .route("/api/expenses/history", get(expenses::history))
        .route("/api/expenses/{id}/receipt", get(expenses::receipt))
        .route(
            "/api/expenses/{id}/transition/{transition}",
            post(expenses::transition),
        )
        // people
        .route("/api/consultants/{id}/similar", get(people::similar))
        .layer(cors)
        .with_state(store)
}

async fn health_handler(State(store): State<Arc<DataStore>>) -> Json<Value> {
    let state = store.degraded_state();
    Json(json!({
        "status": if state.is_healthy() { "healthy" } else { "degraded" },
        "read_only": state.is_read_only(),
        "summary": store.summary(),
        "subscribers": store.event_bus().subscriber_count(),
    }))
}

/// SSE endpoint for live updates
async fn sse_handler(
    State(store): State<Arc<DataStore>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    sse::create_sse_stream(store.event_bus())
}
