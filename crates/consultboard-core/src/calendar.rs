//! Calendar and number helpers shared by reports
//!
//! Months are always represented by their first day.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::{BTreeSet, HashSet};

/// First day of the month containing `day`
pub fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

/// Shift a month by `n` months (negative goes back); returns the first day
pub fn add_months(month: NaiveDate, n: i32) -> NaiveDate {
    let index = month.year() * 12 + month.month0() as i32 + n;
    let year = index.div_euclid(12);
    let month0 = index.rem_euclid(12) as u32;
    NaiveDate::from_ymd_opt(year, month0 + 1, 1).unwrap_or(month)
}

pub fn next_month(day: NaiveDate) -> NaiveDate {
    add_months(month_start(day), 1)
}

pub fn previous_month(day: NaiveDate) -> NaiveDate {
    add_months(month_start(day), -1)
}

/// Number of months between two month starts (`to - from`)
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32
}

/// Parse "YYYY-MM", "YYYYMM" or "YYYY-MM-DD" into a month start
pub fn parse_month(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(month_start(date));
    }
    let (year, month) = if let Some((y, m)) = value.split_once('-') {
        (y, m)
    } else if value.len() == 6 && value.is_ascii() {
        value.split_at(4)
    } else {
        return None;
    };
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

/// Week index of `day` inside its month; week 1 contains the first day, weeks start on Monday
pub fn month_week_number(day: NaiveDate) -> u32 {
    let offset = month_start(day).weekday().num_days_from_monday();
    (day.day0() + offset) / 7 + 1
}

/// Days of the month, optionally restricted to one week of that month
pub fn days_of_month(month: NaiveDate, week: Option<u32>) -> Vec<NaiveDate> {
    let start = month_start(month);
    let end = next_month(start);
    start
        .iter_days()
        .take_while(|d| *d < end)
        .filter(|d| week.map_or(true, |w| month_week_number(*d) == w))
        .collect()
}

fn monday_of(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

/// Monday of the week preceding `day`
pub fn previous_week(day: NaiveDate) -> NaiveDate {
    monday_of(day) - Duration::days(7)
}

/// Monday of the week following `day`
pub fn next_week(day: NaiveDate) -> NaiveDate {
    monday_of(day) + Duration::days(7)
}

pub fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Open days of the month (weekdays that are not holidays)
///
/// With `up_to`, counting stops after that day.
pub fn working_days(
    month: NaiveDate,
    holidays: &HashSet<NaiveDate>,
    up_to: Option<NaiveDate>,
) -> u32 {
    days_of_month(month, None)
        .into_iter()
        .filter(|d| up_to.map_or(true, |limit| *d <= limit))
        .filter(|d| !is_weekend(*d) && !holidays.contains(d))
        .count() as u32
}

/// Fiscal year a date belongs to, named after the calendar year it starts in
pub fn fiscal_year(date: NaiveDate, fiscal_year_month: u32) -> i32 {
    if date.month() >= fiscal_year_month {
        date.year()
    } else {
        date.year() - 1
    }
}

/// First day of fiscal year and first day of the following one
pub fn fiscal_year_bounds(year: i32, fiscal_year_month: u32) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(year, fiscal_year_month, 1)
        .unwrap_or(NaiveDate::MIN);
    (start, add_months(start, 12))
}

/// Sorted distinct fiscal years covered by the dates
pub fn fiscal_years<I>(dates: I, fiscal_year_month: u32) -> Vec<i32>
where
    I: IntoIterator<Item = NaiveDate>,
{
    dates
        .into_iter()
        .map(|d| fiscal_year(d, fiscal_year_month))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// `n` month starts beginning with the current month
pub fn staffing_dates(today: NaiveDate, n: u32) -> Vec<NaiveDate> {
    let current = month_start(today);
    (0..n as i32).map(|i| add_months(current, i)).collect()
}

pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Keep integral values as-is, round the others
pub fn to_int_or_round(value: f64, precision: u32) -> f64 {
    if value.fract() == 0.0 {
        value
    } else {
        round_to(value, precision)
    }
}

/// Running sum
pub fn cumulate(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

/// Render a day fraction as hours and minutes ("3:30" for half a 7 hour day)
pub fn time_string_for_day_percent(charge: f64, day_duration: u32) -> String {
    let minutes = (charge * day_duration as f64 * 60.0).round() as i64;
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

/// Display number without trailing zeros, using the given decimal separator
pub fn number_format(value: f64, separator: &str) -> String {
    let value = to_int_or_round(value, 2);
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.2}", value);
        let text = text.trim_end_matches('0');
        text.replace('.', separator)
    }
}

/// Divide, returning 0 when the divisor is 0
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_navigation_crosses_years() {
        assert_eq!(next_month(d(2023, 12, 15)), d(2024, 1, 1));
        assert_eq!(previous_month(d(2024, 1, 31)), d(2023, 12, 1));
        assert_eq!(add_months(d(2024, 3, 1), -15), d(2022, 12, 1));
        assert_eq!(months_between(d(2023, 11, 1), d(2024, 2, 1)), 3);
    }

    #[test]
    fn test_parse_month_variants() {
        assert_eq!(parse_month("2024-05"), Some(d(2024, 5, 1)));
        assert_eq!(parse_month("202405"), Some(d(2024, 5, 1)));
        assert_eq!(parse_month("2024-05-17"), Some(d(2024, 5, 1)));
        assert_eq!(parse_month("2024-13"), None);
        assert_eq!(parse_month("may"), None);
    }

    #[test]
    fn test_week_numbers() {
        // 2024-05-01 is a Wednesday
        assert_eq!(month_week_number(d(2024, 5, 1)), 1);
        assert_eq!(month_week_number(d(2024, 5, 5)), 1);
        assert_eq!(month_week_number(d(2024, 5, 6)), 2);
        assert_eq!(days_of_month(d(2024, 5, 1), Some(1)).len(), 5);
        assert_eq!(days_of_month(d(2024, 5, 1), None).len(), 31);
        assert_eq!(next_week(d(2024, 5, 1)), d(2024, 5, 6));
        assert_eq!(previous_week(d(2024, 5, 8)), d(2024, 4, 29));
    }

    #[test]
    fn test_working_days_with_holidays_and_limit() {
        let holidays: HashSet<_> = [d(2024, 5, 1), d(2024, 5, 8)].into_iter().collect();
        assert_eq!(working_days(d(2024, 5, 1), &HashSet::new(), None), 23);
        assert_eq!(working_days(d(2024, 5, 1), &holidays, None), 21);
        // 2, 3, 6, 7, 9, 10
        assert_eq!(working_days(d(2024, 5, 1), &holidays, Some(d(2024, 5, 10))), 6);
    }

    #[test]
    fn test_fiscal_year() {
        assert_eq!(fiscal_year(d(2024, 3, 31), 4), 2023);
        assert_eq!(fiscal_year(d(2024, 4, 1), 4), 2024);
        assert_eq!(fiscal_year(d(2024, 1, 1), 1), 2024);
        assert_eq!(
            fiscal_years(vec![d(2024, 5, 1), d(2024, 2, 1), d(2023, 6, 1)], 4),
            vec![2023, 2024]
        );
        assert_eq!(fiscal_year_bounds(2023, 4), (d(2023, 4, 1), d(2024, 4, 1)));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(to_int_or_round(3.0, 1), 3.0);
        assert_eq!(to_int_or_round(3.14159, 1), 3.1);
        assert_eq!(cumulate(&[1.0, 2.0, 0.5]), vec![1.0, 3.0, 3.5]);
        assert_eq!(number_format(2.0, ","), "2");
        assert_eq!(number_format(0.25, ","), "0,25");
        assert_eq!(number_format(1.5, "."), "1.5");
        assert_eq!(safe_ratio(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_time_string() {
        assert_eq!(time_string_for_day_percent(0.5, 7), "3:30");
        assert_eq!(time_string_for_day_percent(1.0, 8), "8:00");
        assert_eq!(time_string_for_day_percent(0.0, 7), "0:00");
    }

    #[test]
    fn test_staffing_dates() {
        let dates = staffing_dates(d(2024, 11, 20), 3);
        assert_eq!(dates, vec![d(2024, 11, 1), d(2024, 12, 1), d(2025, 1, 1)]);
    }
}
