//! Shared fixtures for router tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use consultboard_core::DataStore;
use consultboard_web::USER_HEADER;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

fn write(dir: &Path, table: &str, value: Value) {
    std::fs::write(dir.join(format!("{table}.json")), value.to_string()).unwrap();
}

/// Alice manages Bob; both work on mission 100 of lead 10
pub fn seed(dir: &Path) {
    write(dir, "subsidiaries", json!([{"id": 1, "name": "Alpha Conseil", "code": "A"}]));
    write(
        dir,
        "profiles",
        json!([{"id": 1, "name": "Junior", "level": 1}, {"id": 2, "name": "Manager", "level": 3}]),
    );
    write(
        dir,
        "consultants",
        json!([
            {"id": 1, "name": "Alice Martin", "trigramme": "AMA", "company_id": 1, "profil_id": 2},
            {"id": 2, "name": "Bob Durand", "trigramme": "BDU", "company_id": 1, "profil_id": 1,
             "manager_id": 1, "staffing_manager_id": 1}
        ]),
    );
    write(
        dir,
        "users",
        json!([
            {"username": "ama", "roles": ["expense manager"], "groups": ["expense_requester"],
             "permissions": ["staffing.change_mission"]},
            {"username": "bdu", "groups": ["expense_requester"]}
        ]),
    );
    write(
        dir,
        "leads",
        json!([{"id": 10, "name": "ERP migration", "deal_id": "ACM01", "client_company": "Acme",
                "subsidiary_id": 1, "responsible_id": 1, "state": "WON", "sales": 60.0,
                "creation_date": "2024-01-10", "tags": ["erp"]}]),
    );
    write(
        dir,
        "missions",
        json!([{"id": 100, "lead_id": 10, "deal_id": "A", "description": "Build", "nature": "PROD",
                "billing_mode": "TIME_SPENT", "price": 60.0, "subsidiary_id": 1}]),
    );
    write(
        dir,
        "financial_conditions",
        json!([
            {"consultant_id": 1, "mission_id": 100, "daily_rate": 900.0},
            {"consultant_id": 2, "mission_id": 100, "daily_rate": 600.0}
        ]),
    );
    write(
        dir,
        "timesheets",
        json!([
            {"consultant_id": 1, "mission_id": 100, "working_date": "2024-05-02", "charge": 1.0},
            {"consultant_id": 2, "mission_id": 100, "working_date": "2024-05-02", "charge": 1.0},
            {"consultant_id": 2, "mission_id": 100, "working_date": "2024-05-03", "charge": 0.5}
        ]),
    );
    write(dir, "holidays", json!([{"day": "2024-05-01", "description": "Labour day"}]));
    write(dir, "bills", json!([]));
    write(dir, "expenses", json!([]));
}

pub async fn app(dir: &Path) -> (Router, Arc<DataStore>) {
    seed(dir);
    let store = Arc::new(DataStore::with_defaults(dir.to_path_buf()));
    store.initial_load().await;
    (consultboard_web::create_router(Arc::clone(&store)), store)
}

pub fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, user: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(USER_HEADER, user)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
