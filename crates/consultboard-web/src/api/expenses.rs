//! Expense requests and their validation workflow

use super::today;
use crate::error::ApiError;
use crate::user::ActingUser;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use consultboard_core::expense::ExpensesDashboard;
use consultboard_core::models::{Expense, ExpenseDraft, ExpenseId, MissionId};
use consultboard_core::{CoreError, DataStore};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

pub async fn dashboard(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
) -> Result<Json<ExpensesDashboard>, ApiError> {
    Ok(Json(store.expenses_dashboard(user.name(), today())?))
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Expense to edit; a new one is created when absent
    #[serde(default)]
    pub id: Option<ExpenseId>,
    #[serde(flatten)]
    pub draft: ExpenseDraft,
}

pub async fn submit(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
    Json(request): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let expense = store.submit_expense(user.name(), &request.draft, request.id, today())?;
    let status = if request.id.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(expense)))
}

pub async fn history(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
) -> Result<Json<Vec<Arc<Expense>>>, ApiError> {
    Ok(Json(store.expenses_history(user.name())?))
}

pub async fn mission_expenses(
    State(store): State<Arc<DataStore>>,
    _user: ActingUser,
    Path(id): Path<MissionId>,
) -> Result<Json<Vec<Arc<Expense>>>, ApiError> {
    store.dataset().mission(id)?;
    Ok(Json(store.mission_expenses(id)))
}

pub async fn transition(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
    Path((id, transition)): Path<(ExpenseId, String)>,
) -> Result<Json<Arc<Expense>>, ApiError> {
    Ok(Json(store.update_expense_state(
        user.name(),
        id,
        &transition,
        today(),
    )?))
}

/// Receipt file, served with its guessed content type
pub async fn receipt(
    State(store): State<Arc<DataStore>>,
    user: ActingUser,
    Path(id): Path<ExpenseId>,
) -> Result<Response, ApiError> {
    let Some((path, info)) = store.expense_receipt(user.name(), id)? else {
        return Err(ApiError::NotFound(format!("Expense {id} has no receipt")));
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), expense = id, "Receipt file is missing");
            return Err(CoreError::FileNotFound { path }.into());
        }
        Err(e) => return Err(ApiError::Internal(format!("Failed to read receipt: {e}"))),
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| info.path.clone());
    Ok((
        [
            (header::CONTENT_TYPE, info.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
