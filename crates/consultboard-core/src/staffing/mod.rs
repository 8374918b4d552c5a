//! Staffing: timesheets, forecast (plan de charge), production reports and
//! mission follow-up
//!
//! Read operations take a `&Dataset` and the current day; mutations take a
//! `&mut Dataset` and the acting username, and check permissions themselves.

pub mod access;
pub mod graphs;
pub mod mission;
pub mod pdc;
pub mod planning;
pub mod prod_report;
pub mod reports;
pub mod timesheet;

pub use access::{check_user_timesheet_access, is_ontime_editing, TimesheetAccess};
pub use graphs::GraphScope;
pub use mission::{
    fixed_price_missions_report, mission_timesheet, missions, FixedPriceMissionRow,
    MissionListRow, MissionTimesheet,
};
pub use pdc::{pdc_detail, pdc_review, GroupBy, PdcReview, PdcReviewParams, Projection};
pub use planning::{
    compute_automatic_staffing, create_new_mission_from_lead, deactivate_mission, mass_staffing,
    mission_consultant_rate, mission_update, mission_update_values, AutoStaffingMode,
    DeactivateOutcome, MassStaffingRequest, MissionAttribute,
};
pub use prod_report::{prod_report, ProdReport, ProdStatus};
pub use reports::{missions_report, turnover_pivotable, MissionsReport, TurnoverPivot, YearFilter};
pub use timesheet::{
    all_timesheet, consultant_timesheet, detailed_timesheet, holidays_planning, save_timesheet,
    timesheet_report_data, AllTimesheet, ConsultantTimesheet, DetailedTimesheetRow, HolidaysPlanning, TimesheetEntry,
    TimesheetInput, TimesheetSaveSummary,
};
