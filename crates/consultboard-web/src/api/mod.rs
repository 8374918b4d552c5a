//! Route handlers, grouped by domain
//!
//! Every handler except health and events requires an [`ActingUser`](crate::ActingUser).

pub mod billing;
pub mod expenses;
pub mod missions;
pub mod people;
pub mod reports;
pub mod staffing;

use crate::error::ApiError;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::{Local, NaiveDate};
use consultboard_core::csv_string;
use serde::Deserialize;

/// `?csv` switches a report to a CSV download
#[derive(Debug, Default, Deserialize)]
pub struct CsvQuery {
    #[serde(default)]
    pub csv: Option<String>,
}

impl CsvQuery {
    pub fn wants_csv(&self) -> bool {
        self.csv.is_some()
    }
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// First day of the month named by `{year}/{month}` path segments
pub(crate) fn month_from_path(year: i32, month: u32) -> Result<NaiveDate, ApiError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid month {year}/{month}")))
}

pub(crate) fn csv_response(filename: &str, rows: &[Vec<String>]) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv_string(rows),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_from_path() {
        assert_eq!(
            month_from_path(2024, 5).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
        assert!(month_from_path(2024, 13).is_err());
    }

    #[test]
    fn test_csv_response_headers() {
        let response = csv_response("report.csv", &[vec!["a".into(), "b".into()]]);
        let headers = response.headers();
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"report.csv\""
        );
    }
}
