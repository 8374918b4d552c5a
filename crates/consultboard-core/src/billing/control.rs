//! Billing control: done work versus invoiced amounts, as flat pivot rows

use crate::calendar::{month_start, next_month};
use crate::models::{
    BillingMode, ClientBill, Dataset, Expense, Lead, LeadId, SubsidiaryId, WorkFilter,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingControlFilter {
    #[serde(default)]
    pub subsidiary: Option<SubsidiaryId>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub lead: Option<LeadId>,
    /// Only leads with at least one active mission
    #[serde(default)]
    pub only_active: bool,
}

/// One pivot table record; positive amounts are due, negative ones invoiced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingControlRow {
    #[serde(rename = "deal id")]
    pub deal_id: String,
    #[serde(rename = "client organisation")]
    pub client_organisation: String,
    #[serde(rename = "client company")]
    pub client_company: String,
    pub broker: String,
    pub subsidiary: String,
    pub responsible: String,
    pub consultant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mission: Option<String>,
    #[serde(rename = "billing mode", skip_serializing_if = "Option::is_none")]
    pub billing_mode: Option<String>,
    pub month: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
}

fn lead_row(ds: &Dataset, lead: &Lead) -> BillingControlRow {
    BillingControlRow {
        deal_id: lead.deal_id.clone(),
        client_organisation: lead.client_organisation.clone(),
        client_company: lead.client_company.clone(),
        broker: lead
            .business_broker
            .clone()
            .unwrap_or_else(|| "Direct".to_string()),
        subsidiary: ds.subsidiary_name(lead.subsidiary_id),
        responsible: responsible_name(ds, lead.responsible_id),
        consultant: "-".to_string(),
        mission: None,
        billing_mode: None,
        month: String::new(),
        kind: String::new(),
        amount: 0.0,
    }
}

fn responsible_name(ds: &Dataset, id: Option<u64>) -> String {
    id.and_then(|id| ds.consultants.get(&id))
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "-".to_string())
}

fn month_key(date: NaiveDate) -> String {
    month_start(date).to_string()
}

/// Reconcile done work, chargeable expenses and issued bills per lead
///
/// Only sent or paid bills count. Legacy bills without detail lines are attributed to the
/// billing mode of the lead's first mission.
pub fn client_billing_control_pivotable_data(
    ds: &Dataset,
    bills: &[Arc<ClientBill>],
    expenses: &[Arc<Expense>],
    filter: &BillingControlFilter,
) -> Vec<BillingControlRow> {
    let mut rows = Vec::new();

    let leads = ds.leads.values().filter(|lead| {
        filter.subsidiary.map_or(true, |s| lead.subsidiary_id == s)
            && filter
                .company
                .as_ref()
                .map_or(true, |c| &lead.client_company == c)
            && filter.lead.map_or(true, |id| lead.id == id)
            && (!filter.only_active
                || ds
                    .missions
                    .values()
                    .any(|m| m.lead_id == Some(lead.id) && m.active))
    });

    for lead in leads {
        let base = lead_row(ds, lead);
        let lead_bills: Vec<&ClientBill> = bills
            .iter()
            .map(|b| b.as_ref())
            .filter(|b| b.lead_id == lead.id)
            .collect();
        let first_mission = ds.missions.values().find(|m| m.lead_id == Some(lead.id));

        for bill in lead_bills
            .iter()
            .filter(|b| b.state.is_issued() && b.details.is_empty())
        {
            rows.push(BillingControlRow {
                amount: -bill.amount.unwrap_or(0.0),
                month: month_key(bill.creation_date),
                kind: "Service bill".to_string(),
                mission: Some("-".to_string()),
                billing_mode: first_mission.map(|m| m.billing_mode.label().to_string()),
                ..base.clone()
            });
        }

        let mut chargeable: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for expense in expenses
            .iter()
            .filter(|e| e.lead_id == Some(lead.id) && e.chargeable)
        {
            *chargeable.entry(month_start(expense.expense_date)).or_default() += expense.amount;
        }
        let mut billed_expenses: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for expense in lead_bills.iter().flat_map(|b| b.expenses.iter()) {
            if let Some(date) = expense.expense_date {
                *billed_expenses.entry(month_start(date)).or_default() += expense.amount;
            }
        }
        for (amounts, label, way) in [
            (chargeable, "Expense", 1.0),
            (billed_expenses, "Expense bill", -1.0),
        ] {
            for (month, amount) in amounts {
                rows.push(BillingControlRow {
                    month: month.to_string(),
                    kind: label.to_string(),
                    billing_mode: Some("Chargeable expense".to_string()),
                    amount: amount * way,
                    ..base.clone()
                });
            }
        }

        for mission in ds.missions.values().filter(|m| m.lead_id == Some(lead.id)) {
            let mission_base = BillingControlRow {
                mission: Some(ds.mission_short_name(mission)),
                responsible: responsible_name(ds, mission.responsible_id.or(lead.responsible_id)),
                billing_mode: Some(mission.billing_mode.label().to_string()),
                ..base.clone()
            };
            let issued_details = || {
                lead_bills
                    .iter()
                    .filter(|b| b.state.is_issued())
                    .flat_map(|b| b.details.iter().map(move |d| (*b, d)))
                    .filter(|(_, d)| d.mission_id == mission.id)
            };

            if mission.billing_mode == BillingMode::FixedPrice {
                for (bill, detail) in issued_details() {
                    rows.push(BillingControlRow {
                        month: month_key(bill.creation_date),
                        kind: "Service bill".to_string(),
                        amount: -detail.amount.unwrap_or(0.0),
                        ..mission_base.clone()
                    });
                }
            }

            let months: BTreeSet<NaiveDate> = ds
                .timesheets
                .iter()
                .filter(|t| t.mission_id == mission.id)
                .map(|t| month_start(t.working_date))
                .collect();
            let consultants: BTreeSet<u64> = ds
                .timesheets
                .iter()
                .filter(|t| t.mission_id == mission.id)
                .map(|t| t.consultant_id)
                .collect();

            for month in months {
                for &consultant_id in &consultants {
                    let (_, turnover) = ds.done_work_period(
                        mission,
                        Some(month),
                        Some(next_month(month)),
                        &WorkFilter::for_consultant(consultant_id),
                    );
                    let done = BillingControlRow {
                        consultant: ds
                            .consultants
                            .get(&consultant_id)
                            .map(|c| c.name.clone())
                            .unwrap_or_default(),
                        month: month.to_string(),
                        kind: "Done work".to_string(),
                        amount: turnover,
                        ..mission_base.clone()
                    };
                    if mission.billing_mode == BillingMode::TimeSpent {
                        let billed: f64 = issued_details()
                            .filter(|(_, d)| {
                                d.consultant_id == Some(consultant_id) && d.month == Some(month)
                            })
                            .map(|(_, d)| d.amount.unwrap_or(0.0))
                            .sum();
                        let bill_row = BillingControlRow {
                            kind: "Service bill".to_string(),
                            amount: -billed,
                            ..done.clone()
                        };
                        rows.push(done);
                        rows.push(bill_row);
                    } else {
                        rows.push(done);
                    }
                }
            }
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{compute_bill, create_client_bill_from_timesheet};
    use crate::fixtures::{d, sample_dataset, today};
    use crate::models::{BillDetail, BillExpense, BillState, ExpenseState};

    fn sent_bill_from_timesheet(ds: &Dataset, mission: u64, month: NaiveDate, id: u64) -> Arc<ClientBill> {
        let mut bill = create_client_bill_from_timesheet(ds, mission, month, id, 20.0, today()).unwrap();
        bill.state = BillState::Sent;
        Arc::new(bill)
    }

    fn rows_of<'a>(rows: &'a [BillingControlRow], kind: &str) -> Vec<&'a BillingControlRow> {
        rows.iter().filter(|r| r.kind == kind).collect()
    }

    #[test]
    fn test_done_work_rows_per_month_and_consultant() {
        let ds = sample_dataset();
        let filter = BillingControlFilter {
            lead: Some(10),
            ..Default::default()
        };
        let rows = client_billing_control_pivotable_data(&ds, &[], &[], &filter);
        let done = rows_of(&rows, "Done work");
        // two months, three consultants
        assert_eq!(done.len(), 6);
        let total: f64 = done.iter().map(|r| r.amount).sum();
        assert_eq!(total, 6000.0);
        assert!(rows_of(&rows, "Service bill").is_empty());
    }

    #[test]
    fn test_time_spent_bills_offset_done_work() {
        let ds = sample_dataset();
        let bill = sent_bill_from_timesheet(&ds, 101, d(2024, 5, 1), 1);
        let filter = BillingControlFilter {
            lead: Some(11),
            ..Default::default()
        };
        let rows = client_billing_control_pivotable_data(&ds, &[bill], &[], &filter);
        let balance: f64 = rows.iter().map(|r| r.amount).sum();
        assert_eq!(balance, 0.0);
        let bills = rows_of(&rows, "Service bill");
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].amount, -1600.0);
        assert_eq!(bills[0].billing_mode.as_deref(), Some("Time spent"));
    }

    #[test]
    fn test_fixed_price_and_legacy_bills() {
        let ds = sample_dataset();
        let mut fixed = ClientBill::new_draft(2, 10, 20.0, d(2024, 5, 20));
        fixed.details.push(BillDetail {
            mission_id: 100,
            month: None,
            consultant_id: None,
            quantity: 0.5,
            unit_price: 30000.0,
            amount: None,
            amount_with_vat: None,
        });
        compute_bill(&mut fixed);
        fixed.state = BillState::Paid;

        let mut legacy = ClientBill::new_draft(3, 10, 20.0, d(2024, 3, 12));
        legacy.state = BillState::Sent;
        legacy.amount = Some(1200.0);

        let mut draft = legacy.clone();
        draft.id = 4;
        draft.state = BillState::Draft;

        let bills = vec![Arc::new(fixed), Arc::new(legacy), Arc::new(draft)];
        let filter = BillingControlFilter {
            lead: Some(10),
            ..Default::default()
        };
        let rows = client_billing_control_pivotable_data(&ds, &bills, &[], &filter);
        let service: Vec<_> = rows_of(&rows, "Service bill");
        assert_eq!(service.len(), 2);
        assert!(service
            .iter()
            .any(|r| r.amount == -15000.0 && r.month == "2024-05-01"));
        assert!(service
            .iter()
            .any(|r| r.amount == -1200.0 && r.month == "2024-03-01" && r.mission.as_deref() == Some("-")));
    }

    #[test]
    fn test_legacy_bill_with_expenses_only() {
        let ds = sample_dataset();
        let mut bill = ClientBill::new_draft(5, 10, 20.0, d(2024, 4, 30));
        bill.expenses.push(BillExpense {
            expense_id: None,
            expense_date: Some(d(2024, 4, 12)),
            description: "Train".to_string(),
            amount: 90.0,
            amount_with_vat: None,
        });
        bill.state = BillState::Sent;
        bill.amount = Some(590.0);

        let filter = BillingControlFilter {
            lead: Some(10),
            ..Default::default()
        };
        let rows = client_billing_control_pivotable_data(&ds, &[Arc::new(bill)], &[], &filter);

        let service = rows_of(&rows, "Service bill");
        assert_eq!(service.len(), 1);
        assert_eq!(service[0].amount, -590.0);
        assert_eq!(service[0].month, "2024-04-01");
        let billed = rows_of(&rows, "Expense bill");
        assert_eq!(billed.len(), 1);
        assert_eq!(billed[0].amount, -90.0);
    }

    #[test]
    fn test_expense_rows() {
        let ds = sample_dataset();
        let expense = Expense {
            id: 1,
            user: "bdu".to_string(),
            lead_id: Some(10),
            description: "Hotel".to_string(),
            category: "lodging".to_string(),
            amount: 120.0,
            chargeable: true,
            creation_date: d(2024, 5, 4),
            expense_date: d(2024, 5, 3),
            update_date: d(2024, 5, 4),
            receipt: None,
            workflow_in_progress: true,
            state: ExpenseState::Requested,
        };
        let filter = BillingControlFilter {
            lead: Some(10),
            ..Default::default()
        };
        let rows = client_billing_control_pivotable_data(&ds, &[], &[Arc::new(expense)], &filter);
        let expense_rows = rows_of(&rows, "Expense");
        assert_eq!(expense_rows.len(), 1);
        assert_eq!(expense_rows[0].amount, 120.0);
        assert_eq!(expense_rows[0].month, "2024-05-01");
        assert!(expense_rows[0].mission.is_none());
    }

    #[test]
    fn test_filters() {
        let mut ds = sample_dataset();
        let all = client_billing_control_pivotable_data(&ds, &[], &[], &BillingControlFilter::default());
        assert!(all.iter().any(|r| r.deal_id == "GLX02"));

        let acme = BillingControlFilter {
            company: Some("Acme".to_string()),
            ..Default::default()
        };
        let rows = client_billing_control_pivotable_data(&ds, &[], &[], &acme);
        assert!(rows.iter().all(|r| r.client_company == "Acme"));

        for m in ds.missions.values_mut().filter(|m| m.lead_id == Some(11)) {
            m.active = false;
        }
        let active = BillingControlFilter {
            only_active: true,
            ..Default::default()
        };
        let rows = client_billing_control_pivotable_data(&ds, &[], &[], &active);
        assert!(rows.iter().all(|r| r.deal_id == "ACM01"));
    }

    #[test]
    fn test_row_serialization_uses_pivot_labels() {
        let ds = sample_dataset();
        let filter = BillingControlFilter {
            lead: Some(10),
            ..Default::default()
        };
        let rows = client_billing_control_pivotable_data(&ds, &[], &[], &filter);
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert!(json.get("deal id").is_some());
        assert!(json.get("billing mode").is_some());
        assert_eq!(json["type"], "Done work");
    }
}
