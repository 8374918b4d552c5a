//! Consultant similarity

use super::today;
use crate::error::ApiError;
use crate::user::ActingUser;
use axum::extract::{Path, State};
use axum::Json;
use consultboard_core::models::ConsultantId;
use consultboard_core::DataStore;
use serde_json::{json, Value};
use std::sync::Arc;

/// Closest consultants by experience, nearest first; empty while too few
/// consultants are known to fit a model
pub async fn similar(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path(id): Path<ConsultantId>,
) -> Result<Json<Value>, ApiError> {
    store.dataset().consultant(id)?;
    let ids = store.similar_consultants(id, today()).await?;

    let ds = store.dataset();
    let consultants: Vec<Value> = ids
        .into_iter()
        .filter_map(|id| ds.consultant(id).ok())
        .map(|c| json!({ "id": c.id, "name": c.name, "trigramme": c.trigramme }))
        .collect();
    Ok(Json(Value::Array(consultants)))
}
