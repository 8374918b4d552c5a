//! Acting user extraction

use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use consultboard_core::DataStore;
use std::sync::Arc;

/// Header carrying the username of the caller
pub const USER_HEADER: &str = "x-consultboard-user";

/// Username of a known user, taken from [`USER_HEADER`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingUser(pub String);

impl ActingUser {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl FromRequestParts<Arc<DataStore>> for ActingUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        store: &Arc<DataStore>,
    ) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {USER_HEADER} header")))?;

        if store.dataset().user(username).is_err() {
            return Err(ApiError::Unauthorized(format!("Unknown user: {username}")));
        }
        Ok(ActingUser(username.to_string()))
    }
}
