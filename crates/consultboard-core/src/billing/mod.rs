//! Client billing: bill totals, billing summaries and bill generation
//!
//! Bills are plain values; the store persists whatever these functions return.

pub mod control;

pub use control::{client_billing_control_pivotable_data, BillingControlFilter, BillingControlRow};

use crate::calendar::{month_start, next_month, to_int_or_round};
use crate::error::CoreError;
use crate::models::{
    BillDetail, BillId, ClientBill, ConsultantId, Dataset, Mission, MissionId, MissionNature,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Recompute detail lines and bill totals
///
/// Draft and proposed bills take their totals from their lines and expenses.
/// Any bill with an amount but no amount with VAT gets one from its VAT rate.
pub fn compute_bill(bill: &mut ClientBill) {
    let vat = bill.vat;
    if bill.state.is_editable() {
        for detail in bill.details.iter_mut() {
            detail.compute(vat);
        }

        let amount: f64 = bill
            .details
            .iter()
            .map(|d| d.amount.unwrap_or(0.0))
            .sum::<f64>()
            + bill.expenses_total();
        let amount_with_vat: f64 = bill
            .details
            .iter()
            .map(|d| d.amount_with_vat.unwrap_or(0.0))
            .sum::<f64>()
            + bill.expenses_total_with_taxes();

        if amount != 0.0 {
            bill.amount = Some(amount);
        }
        if amount_with_vat != 0.0 {
            bill.amount_with_vat = Some(amount_with_vat);
        }
    }

    if bill.amount_with_vat.map_or(true, |v| v == 0.0) {
        if let Some(amount) = bill.amount {
            bill.amount_with_vat = Some(amount * (1.0 + vat / 100.0));
        }
    }
}

/// One consultant line of a billing summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultantBilling {
    pub consultant_id: ConsultantId,
    pub consultant: String,
    pub days: f64,
    pub daily_rate: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionBilling {
    pub mission_id: MissionId,
    pub mission: String,
    pub total: f64,
    pub consultants: Vec<ConsultantBilling>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadBilling {
    pub lead_id: u64,
    pub lead: String,
    pub deal_id: String,
    pub total: f64,
    pub missions: Vec<MissionBilling>,
}

/// Charges per (mission, consultant) on production missions for the month
pub fn month_prod_charges(ds: &Dataset, month: NaiveDate) -> Vec<(MissionId, ConsultantId, f64)> {
    let start = month_start(month);
    let end = next_month(start);
    let mut charges: BTreeMap<(MissionId, ConsultantId), f64> = BTreeMap::new();
    for t in ds
        .timesheets
        .iter()
        .filter(|t| t.working_date >= start && t.working_date < end)
    {
        let is_prod = ds
            .missions
            .get(&t.mission_id)
            .is_some_and(|m| m.nature == MissionNature::Prod);
        if is_prod {
            *charges.entry((t.mission_id, t.consultant_id)).or_default() += t.charge;
        }
    }
    charges
        .into_iter()
        .map(|((mission, consultant), charge)| (mission, consultant, charge))
        .collect()
}

/// Group (mission, consultant, charge) rows into lead and mission totals, sorted by deal id
///
/// Missions without a lead are skipped.
pub fn billing_info(ds: &Dataset, rows: &[(MissionId, ConsultantId, f64)]) -> Vec<LeadBilling> {
    let mut leads: Vec<LeadBilling> = Vec::new();

    for &(mission_id, consultant_id, charge) in rows {
        let Some(mission) = ds.missions.get(&mission_id) else {
            warn!(mission_id, "Billing row references an unknown mission");
            continue;
        };
        let Some(lead) = ds.mission_lead(mission) else {
            warn!(mission_id, "Production mission without lead skipped from billing");
            continue;
        };
        let consultant = ds
            .consultants
            .get(&consultant_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| consultant_id.to_string());
        let daily_rate = ds.daily_rate(mission_id, consultant_id);
        let total = charge * daily_rate;

        let lead_pos = match leads.iter().position(|l| l.lead_id == lead.id) {
            Some(pos) => pos,
            None => {
                leads.push(LeadBilling {
                    lead_id: lead.id,
                    lead: lead.to_string(),
                    deal_id: lead.deal_id.clone(),
                    total: 0.0,
                    missions: Vec::new(),
                });
                leads.len() - 1
            }
        };
        let lead_billing = &mut leads[lead_pos];
        lead_billing.total += total;

        let mission_pos = match lead_billing
            .missions
            .iter()
            .position(|m| m.mission_id == mission_id)
        {
            Some(pos) => pos,
            None => {
                lead_billing.missions.push(MissionBilling {
                    mission_id,
                    mission: ds.mission_short_name(mission),
                    total: 0.0,
                    consultants: Vec::new(),
                });
                lead_billing.missions.len() - 1
            }
        };
        let mission_billing = &mut lead_billing.missions[mission_pos];
        mission_billing.total += total;
        mission_billing.consultants.push(ConsultantBilling {
            consultant_id,
            consultant,
            days: to_int_or_round(charge, 2),
            daily_rate,
            total,
        });
    }

    leads.sort_by(|a, b| a.deal_id.cmp(&b.deal_id));
    leads
}

fn lead_of<'a>(ds: &'a Dataset, mission: &Mission) -> Result<&'a crate::models::Lead, CoreError> {
    ds.mission_lead(mission)
        .ok_or(CoreError::MissionWithoutLead { id: mission.id })
}

/// Draft bill with one line per consultant for the days entered in the month
pub fn create_client_bill_from_timesheet(
    ds: &Dataset,
    mission_id: MissionId,
    month: NaiveDate,
    id: BillId,
    vat: f64,
    today: NaiveDate,
) -> Result<ClientBill, CoreError> {
    let mission = ds.mission(mission_id)?;
    let lead = lead_of(ds, mission)?;
    let month = month_start(month);
    let end = next_month(month);

    let mut charges: BTreeMap<ConsultantId, f64> = BTreeMap::new();
    for t in ds.timesheets.iter().filter(|t| {
        t.mission_id == mission_id && t.working_date >= month && t.working_date < end
    }) {
        *charges.entry(t.consultant_id).or_default() += t.charge;
    }

    let mut bill = ClientBill::new_draft(id, lead.id, vat, today);
    for (consultant_id, quantity) in charges {
        bill.details.push(BillDetail {
            mission_id,
            month: Some(month),
            consultant_id: Some(consultant_id),
            quantity,
            unit_price: ds.daily_rate(mission_id, consultant_id),
            amount: None,
            amount_with_vat: None,
        });
    }
    compute_bill(&mut bill);

    debug!(
        mission_id,
        month = %month,
        lines = bill.details.len(),
        amount = bill.amount.unwrap_or(0.0),
        "Bill created from timesheet"
    );
    Ok(bill)
}

/// Draft bill for a share of the mission price (price is in k€)
pub fn create_client_bill_from_proportion(
    ds: &Dataset,
    mission_id: MissionId,
    proportion: f64,
    id: BillId,
    vat: f64,
    today: NaiveDate,
) -> Result<ClientBill, CoreError> {
    if !(0.0..=1.0).contains(&proportion) {
        return Err(CoreError::invalid_value(
            "proportion",
            format!("{} is not between 0 and 1", proportion),
        ));
    }
    let mission = ds.mission(mission_id)?;
    let lead = lead_of(ds, mission)?;

    let mut bill = ClientBill::new_draft(id, lead.id, vat, today);
    bill.details.push(BillDetail {
        mission_id,
        month: None,
        consultant_id: None,
        quantity: proportion,
        unit_price: mission.price.unwrap_or(0.0) * 1000.0,
        amount: None,
        amount_with_vat: None,
    });
    compute_bill(&mut bill);
    Ok(bill)
}

/// Name of the generated invoice document
pub fn bill_pdf_filename(ds: &Dataset, bill: &ClientBill) -> String {
    match ds.leads.get(&bill.lead_id) {
        Some(lead) if !bill.bill_id.is_empty() => format!("{}-{}.pdf", bill.bill_id, lead.deal_id),
        _ => "bill.pdf".to_string(),
    }
}
