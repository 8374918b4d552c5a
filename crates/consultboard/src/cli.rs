//! Terminal rendering of reports
//!
//! Every formatter returns either pretty JSON or a comfy-table string.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Row, Table};
use consultboard_core::billing::BillingControlRow;
use consultboard_core::calendar::parse_month;
use consultboard_core::error::LoadReport;
use consultboard_core::models::{ClientBill, Consultant, Dataset};
use consultboard_core::staffing::{PdcReview, ProdReport, ProdStatus};
use consultboard_core::StoreSummary;
use serde::Serialize;

/// Parse a "YYYY-MM" argument
pub fn parse_month_arg(value: &str) -> Result<NaiveDate> {
    parse_month(value).with_context(|| format!("Invalid month '{value}' (expected YYYY-MM)"))
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

fn new_table(headers: Vec<String>, no_color: bool) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if no_color {
        table.set_header(headers);
    } else {
        table.set_header(
            headers
                .into_iter()
                .map(|h| Cell::new(h).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }
    table
}

fn month_header(month: &NaiveDate) -> String {
    month.format("%b %Y").to_string()
}

fn days(value: f64) -> String {
    format!("{value:.1}")
}

pub fn format_summary(summary: &StoreSummary, report: &LoadReport, json: bool) -> String {
    if json {
        return to_json(summary);
    }

    let mut table = Table::new();
    table.set_header(vec!["Table", "Records"]);
    for (name, count) in [
        ("consultants", summary.consultants),
        ("leads", summary.leads),
        ("missions", summary.missions),
        ("timesheets", summary.timesheets),
        ("staffings", summary.staffings),
        ("bills", summary.bills),
        ("expenses", summary.expenses),
    ] {
        table.add_row(vec![name.to_string(), count.to_string()]);
    }

    let mut out = table.to_string();
    let warnings: Vec<String> = report
        .warnings()
        .map(|w| format!("  - {}: {}", w.source, w.message))
        .collect();
    if !warnings.is_empty() {
        out.push_str("\n\nWarnings:\n");
        out.push_str(&warnings.join("\n"));
    }
    out
}

/// Forecast table: one "prod (available)" cell per consultant and month
pub fn format_pdc_review(review: &PdcReview, json: bool, no_color: bool) -> String {
    if json {
        return to_json(review);
    }
    if review.rows.is_empty() {
        return "No productive consultant.".to_string();
    }

    let mut headers = vec!["Consultant".to_string(), "Manager".to_string()];
    headers.extend(review.months.iter().map(month_header));
    let mut table = new_table(headers, no_color);

    for row in &review.rows {
        let mut cells = vec![Cell::new(&row.consultant), Cell::new(&row.staffing_manager)];
        cells.extend(row.months.iter().map(|cell| {
            let text = format!("{} ({})", days(cell.prod), days(cell.available));
            let c = Cell::new(text).set_alignment(CellAlignment::Right);
            if !no_color && cell.available < 0.0 {
                c.fg(Color::Red)
            } else {
                c
            }
        }));
        table.add_row(Row::from(cells));
    }

    let mut totals = vec!["Total".to_string(), String::new()];
    totals.extend(
        review
            .totals
            .iter()
            .map(|cell| format!("{} ({})", days(cell.prod), days(cell.available))),
    );
    table.add_row(totals);

    let mut rates = vec!["Prod rate".to_string(), String::new()];
    rates.extend(review.rates.iter().map(|cell| format!("{:.0}%", cell.prod)));
    table.add_row(rates);

    table.to_string()
}

fn status_color(status: ProdStatus) -> Color {
    match status {
        ProdStatus::Ok | ProdStatus::OkButDailyRate | ProdStatus::OkButProdRate => Color::Green,
        ProdStatus::KoButDailyRate | ProdStatus::KoButProdRate => Color::Yellow,
        ProdStatus::Ko => Color::Red,
    }
}

/// Turnover against forecast, in k€
pub fn format_prod_report(report: &ProdReport, json: bool, no_color: bool) -> String {
    if json {
        return to_json(report);
    }
    if report.rows.is_empty() {
        return "No productive consultant.".to_string();
    }

    let mut headers = vec!["Consultant".to_string()];
    headers.extend(report.months.iter().map(month_header));
    let mut table = new_table(headers, no_color);

    let k = |value: f64| format!("{:.1}", value / 1000.0);
    for row in &report.rows {
        let mut cells = vec![Cell::new(&row.consultant)];
        cells.extend(row.months.iter().map(|cell| {
            let c = Cell::new(format!("{} / {}", k(cell.turnover), k(cell.forecast)))
                .set_alignment(CellAlignment::Right);
            if no_color {
                c
            } else {
                c.fg(status_color(cell.status))
            }
        }));
        table.add_row(Row::from(cells));
    }

    let mut totals = vec![Cell::new("Total")];
    totals.extend(report.totals.iter().map(|cell| {
        let c = Cell::new(format!("{} / {}", k(cell.turnover), k(cell.forecast)))
            .set_alignment(CellAlignment::Right);
        if no_color {
            c
        } else {
            c.fg(status_color(cell.status))
        }
    }));
    table.add_row(Row::from(totals));

    table.to_string()
}

/// Rows whose first line is the header, as produced by the CSV exports
pub fn format_rows(rows: &[Vec<String>], no_color: bool) -> String {
    let Some((header, body)) = rows.split_first() else {
        return "Nothing to display.".to_string();
    };
    let mut table = new_table(header.clone(), no_color);
    for row in body {
        table.add_row(row.clone());
    }
    table.to_string()
}

pub fn format_billing_control(rows: &[BillingControlRow], json: bool, no_color: bool) -> String {
    if json {
        return to_json(rows);
    }
    if rows.is_empty() {
        return "Nothing to bill or billed.".to_string();
    }

    let headers = ["Deal", "Client", "Consultant", "Month", "Type", "Amount"]
        .map(String::from)
        .to_vec();
    let mut table = new_table(headers, no_color);
    for row in rows {
        let amount = Cell::new(format!("{:.2}", row.amount)).set_alignment(CellAlignment::Right);
        let amount = if !no_color && row.amount < 0.0 {
            amount.fg(Color::Green)
        } else {
            amount
        };
        table.add_row(Row::from(vec![
            Cell::new(&row.deal_id),
            Cell::new(&row.client_company),
            Cell::new(&row.consultant),
            Cell::new(&row.month),
            Cell::new(&row.kind),
            amount,
        ]));
    }
    table.to_string()
}

pub fn format_bill(ds: &Dataset, bill: &ClientBill, pdf_filename: &str, json: bool) -> String {
    if json {
        return to_json(&serde_json::json!({ "bill": bill, "pdf_filename": pdf_filename }));
    }

    let mut lines = vec![format!("Bill {} (lead {})", bill.id, bill.lead_id)];
    for detail in &bill.details {
        let label = detail
            .consultant_id
            .and_then(|id| ds.consultant(id).ok())
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("mission {}", detail.mission_id));
        lines.push(format!(
            "  {:<30} {:>6} x {:>9.2} = {:>10.2}",
            label,
            detail.quantity,
            detail.unit_price,
            detail.amount.unwrap_or_default()
        ));
    }
    lines.push(format!(
        "Amount:           {:.2}",
        bill.amount.unwrap_or_default()
    ));
    lines.push(format!(
        "Amount with VAT:  {:.2} ({}%)",
        bill.amount_with_vat.unwrap_or_default(),
        bill.vat
    ));
    lines.push(format!("Document:         {pdf_filename}"));
    lines.join("\n")
}

pub fn format_consultants(consultants: &[&Consultant], json: bool, no_color: bool) -> String {
    if json {
        return to_json(consultants);
    }
    if consultants.is_empty() {
        return "No similar consultant (not enough consultants to compare).".to_string();
    }

    let headers = ["Rank", "Trigramme", "Name"].map(String::from).to_vec();
    let mut table = new_table(headers, no_color);
    for (rank, consultant) in consultants.iter().enumerate() {
        table.add_row(vec![
            (rank + 1).to_string(),
            consultant.trigramme.clone(),
            consultant.name.clone(),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_month_arg() {
        assert_eq!(
            parse_month_arg("2024-05").unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
        assert!(parse_month_arg("May 2024").is_err());
    }

    #[test]
    fn test_format_rows() {
        let rows = vec![
            vec!["Consultant".to_string(), "Days".to_string()],
            vec!["Bob Durand".to_string(), "1,5".to_string()],
        ];
        let out = format_rows(&rows, true);
        assert!(out.contains("Consultant"));
        assert!(out.contains("Bob Durand"));
        assert_eq!(format_rows(&[], true), "Nothing to display.");
    }

    #[test]
    fn test_format_summary() {
        let summary = StoreSummary {
            consultants: 3,
            missions: 2,
            ..Default::default()
        };
        let mut report = LoadReport::new();
        report.add_warning("bills", "File not found");

        let table = format_summary(&summary, &report, false);
        assert!(table.contains("consultants"));
        assert!(table.contains("bills: File not found"));

        let json: serde_json::Value =
            serde_json::from_str(&format_summary(&summary, &report, true)).unwrap();
        assert_eq!(json["consultants"], 3);
    }

    #[test]
    fn test_format_billing_control_empty() {
        assert_eq!(format_billing_control(&[], false, true), "Nothing to bill or billed.");
        assert_eq!(format_billing_control(&[], true, true), "[]");
    }
}
