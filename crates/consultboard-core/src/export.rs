//! CSV and JSON exports of timesheets and reports
//!
//! CSV output is semicolon-delimited and starts with a UTF-8 byte order mark so
//! spreadsheets pick the right encoding. Numbers use the configured decimal
//! separator.

use anyhow::{Context, Result};
use serde::Serialize;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::calendar::{number_format, time_string_for_day_percent};
use crate::config::{Settings, TimesheetInputMethod};
use crate::models::{Dataset, MissionId};
use crate::staffing::timesheet::{timesheet_report_data, DetailedTimesheetRow};
use crate::staffing::{AllTimesheet, ConsultantTimesheet};

pub const CSV_BOM: &str = "\u{feff}";
pub const CSV_DELIMITER: char = ';';

/// Quote a field holding the delimiter, a quote or a line break
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([CSV_DELIMITER, '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Write rows as CSV, BOM first
pub fn write_csv<W: Write>(writer: &mut W, rows: &[Vec<String>]) -> std::io::Result<()> {
    writer.write_all(CSV_BOM.as_bytes())?;
    for row in rows {
        let line: Vec<Cow<'_, str>> = row.iter().map(|f| csv_field(f)).collect();
        writer.write_all(line.join(";").as_bytes())?;
        writer.write_all(b"\r\n")?;
    }
    Ok(())
}

/// CSV document as a string, for HTTP responses
pub fn csv_string(rows: &[Vec<String>]) -> String {
    let mut buffer = Vec::new();
    // writing to a Vec cannot fail
    let _ = write_csv(&mut buffer, rows);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Write rows to a CSV file, creating parent directories
pub fn write_csv_file(rows: &[Vec<String>], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    write_csv(&mut writer, rows)
        .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
    writer.flush().context("Failed to flush CSV writer")?;

    Ok(())
}

/// Serialize any report as pretty JSON, creating parent directories
pub fn export_to_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(value).context("Failed to serialize report to JSON")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write JSON file: {}", path.display()))?;

    Ok(())
}

fn format_charge(charge: f64, settings: &Settings) -> String {
    if charge == 0.0 {
        return String::new();
    }
    match settings.timesheet_input_method {
        TimesheetInputMethod::Cycle => number_format(charge, &settings.decimal_separator),
        TimesheetInputMethod::Keyboard => {
            time_string_for_day_percent(charge, settings.timesheet_day_duration)
        }
    }
}

// ============================================================================
// Timesheet rows
// ============================================================================

/// Consultant timesheet: title, day numbers, weekdays, then one row per mission
pub fn consultant_timesheet_rows(sheet: &ConsultantTimesheet, settings: &Settings) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(sheet.missions.len() + 4);
    rows.push(vec![format!("{} - {}", sheet.consultant, sheet.month.format("%B %Y"))]);

    let mut days = vec![String::new(), String::new()];
    days.extend(sheet.days.iter().map(|d| d.format("%-d").to_string()));
    rows.push(days);

    let mut weekdays = vec!["Mission".to_string(), "Deal id".to_string()];
    weekdays.extend(sheet.days.iter().map(|d| d.format("%a").to_string()));
    weekdays.push("Total".to_string());
    rows.push(weekdays);

    for mission in &sheet.missions {
        let mut row = vec![mission.mission.clone(), mission.mission_code.clone()];
        row.extend(mission.charges.iter().map(|c| format_charge(*c, settings)));
        row.push(number_format(mission.total, &settings.decimal_separator));
        rows.push(row);
    }

    let mut tickets = vec!["Days without lunch ticket".to_string(), String::new()];
    tickets.extend(
        sheet
            .no_ticket_days
            .iter()
            .map(|no_ticket| if *no_ticket { "1".to_string() } else { String::new() }),
    );
    tickets.push(number_format(sheet.ticket_total, &settings.decimal_separator));
    rows.push(tickets);

    rows
}

/// Mission by consultant matrix of a month
pub fn all_timesheet_rows(sheet: &AllTimesheet, separator: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(sheet.rows.len() + 3);

    let mut header = vec![String::new()];
    header.extend(sheet.consultants.iter().map(|c| c.name.clone()));
    rows.push(header);

    for line in &sheet.rows {
        let mut row = vec![format!("{} ({})", line.mission, line.mission_code)];
        row.extend(line.charges.iter().map(|c| number_format(*c, separator)));
        rows.push(row);
    }

    let mut totals = vec!["Total".to_string()];
    totals.extend(sheet.totals.iter().map(|c| number_format(*c, separator)));
    rows.push(totals);

    let mut tickets = vec!["Days without lunch ticket".to_string()];
    tickets.extend(sheet.no_ticket_days.iter().map(|c| number_format(*c, separator)));
    rows.push(tickets);

    rows
}

const DETAILED_HEADER: [&str; 13] = [
    "Lead",
    "Deal id",
    "Lead price (k€)",
    "Mission",
    "Mission id",
    "Billing mode",
    "Mission price (k€)",
    "Consultant",
    "Daily rate",
    "Bought daily rate",
    "Past done days",
    "Done days",
    "Days to be done",
];

/// Accounting export: one row per mission and consultant
pub fn detailed_timesheet_rows(lines: &[DetailedTimesheetRow], separator: &str) -> Vec<Vec<String>> {
    let price = |p: Option<f64>| p.map(|p| number_format(p, separator)).unwrap_or_default();
    let mut rows = vec![DETAILED_HEADER.iter().map(|h| h.to_string()).collect()];
    for line in lines {
        rows.push(vec![
            line.lead.clone(),
            line.deal_id.clone(),
            price(line.lead_price),
            line.mission.clone(),
            line.mission_id.clone(),
            line.billing_mode.label().to_string(),
            price(line.mission_price),
            line.consultant.clone(),
            number_format(line.daily_rate, separator),
            number_format(line.bought_daily_rate, separator),
            number_format(line.past_done_days, separator),
            number_format(line.done_days, separator),
            number_format(line.days_to_be_done, separator),
        ]);
    }
    rows
}

// ============================================================================
// File exports
// ============================================================================

pub fn export_consultant_timesheet_to_csv(
    sheet: &ConsultantTimesheet,
    settings: &Settings,
    path: &Path,
) -> Result<()> {
    write_csv_file(&consultant_timesheet_rows(sheet, settings), path)
}

/// Whole mission history, month blocks padded to the same width
pub fn export_mission_timesheet_to_csv(
    ds: &Dataset,
    mission_id: MissionId,
    separator: &str,
    path: &Path,
) -> Result<()> {
    let rows = timesheet_report_data(ds, mission_id, None, None, true, separator)
        .with_context(|| format!("Failed to build timesheet of mission {}", mission_id))?;
    write_csv_file(&rows, path)
}

pub fn export_all_timesheet_to_csv(sheet: &AllTimesheet, separator: &str, path: &Path) -> Result<()> {
    write_csv_file(&all_timesheet_rows(sheet, separator), path)
}

pub fn export_detailed_timesheet_to_csv(
    lines: &[DetailedTimesheetRow],
    separator: &str,
    path: &Path,
) -> Result<()> {
    write_csv_file(&detailed_timesheet_rows(lines, separator), path)
}
