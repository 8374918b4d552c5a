//! Who may read or write a consultant's timesheet

use crate::calendar::{month_start, next_month};
use crate::models::people::{features, perms};
use crate::models::{Consultant, Dataset, User};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimesheetAccess {
    NotAllowed,
    ReadOnly,
    ReadWrite,
}

impl TimesheetAccess {
    pub fn can_read(&self) -> bool {
        *self != TimesheetAccess::NotAllowed
    }

    pub fn can_write(&self) -> bool {
        *self == TimesheetAccess::ReadWrite
    }
}

/// Days after the end of the month during which it stays editable
const LATE_EDITING_DAYS: i64 = 3;

/// Current or future month, or a month that ended at most a few days ago
pub fn is_ontime_editing(month: NaiveDate, today: NaiveDate) -> bool {
    month_start(month) == month_start(today)
        || (today - next_month(month)).num_days() <= LATE_EDITING_DAYS
}

fn on_time(month: NaiveDate, today: NaiveDate) -> TimesheetAccess {
    if is_ontime_editing(month, today) {
        TimesheetAccess::ReadWrite
    } else {
        TimesheetAccess::ReadOnly
    }
}

/// Access level of `user` on `consultant`'s timesheet for `month`
pub fn check_user_timesheet_access(
    ds: &Dataset,
    user: &User,
    consultant: &Consultant,
    month: NaiveDate,
    today: NaiveDate,
) -> TimesheetAccess {
    if user.has_perms(&[
        perms::ADD_TIMESHEET,
        perms::CHANGE_TIMESHEET,
        perms::DELETE_TIMESHEET,
    ]) {
        return TimesheetAccess::ReadWrite;
    }

    let Some(user_consultant) = ds.consultant_for_user(user) else {
        return TimesheetAccess::NotAllowed;
    };

    if user_consultant.id == consultant.id || ds.is_in_team(user_consultant.id, consultant) {
        return on_time(month, today);
    }

    if user_consultant.subcontractor {
        return TimesheetAccess::NotAllowed;
    }

    if consultant.subcontractor && user.has_feature(features::TIMESHEET_SUBCONTRACTOR) {
        return on_time(month, today);
    }

    if user.has_feature(features::TIMESHEET_ALL) {
        return TimesheetAccess::ReadOnly;
    }

    if user.has_feature(features::TIMESHEET_CURRENT_MONTH) {
        if month_start(month) >= month_start(today) {
            return TimesheetAccess::ReadOnly;
        }
        return TimesheetAccess::NotAllowed;
    }

    TimesheetAccess::NotAllowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{d, sample_dataset, today};

    fn access(
        ds: &Dataset,
        username: &str,
        consultant: u64,
        month: NaiveDate,
        today: NaiveDate,
    ) -> TimesheetAccess {
        check_user_timesheet_access(
            ds,
            ds.user(username).unwrap(),
            ds.consultant(consultant).unwrap(),
            month,
            today,
        )
    }

    #[test]
    fn test_ontime_editing_window() {
        assert!(is_ontime_editing(d(2024, 5, 1), d(2024, 5, 31)));
        assert!(is_ontime_editing(d(2024, 6, 1), d(2024, 5, 31)));
        assert!(is_ontime_editing(d(2024, 4, 1), d(2024, 5, 4)));
        assert!(!is_ontime_editing(d(2024, 4, 1), d(2024, 5, 5)));
        assert!(!is_ontime_editing(d(2024, 3, 1), d(2024, 5, 2)));
    }

    #[test]
    fn test_timesheet_permissions_grant_read_write() {
        let ds = sample_dataset();
        assert_eq!(
            access(&ds, "dad", 2, d(2023, 1, 1), today()),
            TimesheetAccess::ReadWrite
        );
    }

    #[test]
    fn test_own_timesheet_depends_on_month() {
        let ds = sample_dataset();
        assert_eq!(access(&ds, "bdu", 2, d(2024, 5, 1), today()), TimesheetAccess::ReadWrite);
        assert_eq!(access(&ds, "bdu", 2, d(2024, 3, 1), today()), TimesheetAccess::ReadOnly);
    }

    #[test]
    fn test_manager_sees_team() {
        let ds = sample_dataset();
        assert_eq!(access(&ds, "ama", 2, d(2024, 5, 1), today()), TimesheetAccess::ReadWrite);
        assert_eq!(access(&ds, "ama", 2, d(2024, 1, 1), today()), TimesheetAccess::ReadOnly);
    }

    #[test]
    fn test_other_timesheets_are_closed() {
        let ds = sample_dataset();
        assert_eq!(access(&ds, "bdu", 1, d(2024, 5, 1), today()), TimesheetAccess::NotAllowed);
    }

    #[test]
    fn test_subcontractor_user_cannot_see_others() {
        let mut ds = sample_dataset();
        ds.users
            .get_mut("sco")
            .unwrap()
            .features
            .insert(features::TIMESHEET_ALL.to_string());
        assert_eq!(access(&ds, "sco", 2, d(2024, 5, 1), today()), TimesheetAccess::NotAllowed);
        assert_eq!(access(&ds, "sco", 4, d(2024, 5, 1), today()), TimesheetAccess::ReadWrite);
    }

    #[test]
    fn test_features() {
        let mut ds = sample_dataset();
        // cpe is not a manager; grant features one at a time
        let cpe = ds.users.get_mut("cpe").unwrap();
        cpe.features.insert(features::TIMESHEET_SUBCONTRACTOR.to_string());
        assert_eq!(access(&ds, "cpe", 4, d(2024, 5, 1), today()), TimesheetAccess::ReadWrite);
        assert_eq!(access(&ds, "cpe", 4, d(2024, 1, 1), today()), TimesheetAccess::ReadOnly);
        assert_eq!(access(&ds, "cpe", 2, d(2024, 5, 1), today()), TimesheetAccess::NotAllowed);

        let cpe = ds.users.get_mut("cpe").unwrap();
        cpe.features.insert(features::TIMESHEET_CURRENT_MONTH.to_string());
        assert_eq!(access(&ds, "cpe", 2, d(2024, 5, 1), today()), TimesheetAccess::ReadOnly);
        assert_eq!(access(&ds, "cpe", 2, d(2024, 4, 1), today()), TimesheetAccess::NotAllowed);

        let cpe = ds.users.get_mut("cpe").unwrap();
        cpe.features.insert(features::TIMESHEET_ALL.to_string());
        assert_eq!(access(&ds, "cpe", 2, d(2024, 1, 1), today()), TimesheetAccess::ReadOnly);
    }

    #[test]
    fn test_unknown_consultant_user() {
        let mut ds = sample_dataset();
        ds.users.insert("ghost".to_string(), User::new("ghost"));
        assert_eq!(access(&ds, "ghost", 2, d(2024, 5, 1), today()), TimesheetAccess::NotAllowed);
    }
}
