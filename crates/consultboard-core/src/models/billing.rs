//! Client bills with their detail lines and re-billed expenses

use super::lead::LeadId;
use super::mission::MissionId;
use super::people::ConsultantId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type BillId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum BillState {
    #[default]
    #[serde(rename = "0_DRAFT")]
    Draft,
    #[serde(rename = "0_PROPOSED")]
    Proposed,
    #[serde(rename = "1_SENT")]
    Sent,
    #[serde(rename = "2_PAID")]
    Paid,
    #[serde(rename = "3_LITIGIOUS")]
    Litigious,
    #[serde(rename = "4_CANCELED")]
    Canceled,
}

impl BillState {
    /// Draft and proposed bills still derive their totals from their lines
    pub fn is_editable(&self) -> bool {
        matches!(self, BillState::Draft | BillState::Proposed)
    }

    /// Bills that count as invoiced for billing control
    pub fn is_issued(&self) -> bool {
        matches!(self, BillState::Sent | BillState::Paid)
    }
}

/// One invoiced line: a quantity of days (or a proportion) at a unit price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillDetail {
    pub mission_id: MissionId,
    #[serde(default)]
    pub month: Option<NaiveDate>,
    #[serde(default)]
    pub consultant_id: Option<ConsultantId>,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub amount_with_vat: Option<f64>,
}

impl BillDetail {
    /// Recompute amounts from quantity, unit price and the bill VAT rate
    pub fn compute(&mut self, vat: f64) {
        let amount = self.quantity * self.unit_price;
        self.amount = Some(amount);
        self.amount_with_vat = Some(amount * (1.0 + vat / 100.0));
    }
}

/// Expense re-billed to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillExpense {
    #[serde(default)]
    pub expense_id: Option<u64>,
    #[serde(default)]
    pub expense_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub amount_with_vat: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientBill {
    pub id: BillId,
    /// Printed invoice number; empty until the bill is issued
    #[serde(default)]
    pub bill_id: String,
    pub lead_id: LeadId,
    #[serde(default)]
    pub state: BillState,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub amount_with_vat: Option<f64>,
    pub vat: f64,
    pub creation_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub details: Vec<BillDetail>,
    #[serde(default)]
    pub expenses: Vec<BillExpense>,
    #[serde(default)]
    pub bill_file: Option<String>,
}

impl ClientBill {
    pub fn new_draft(id: BillId, lead_id: LeadId, vat: f64, creation_date: NaiveDate) -> Self {
        Self {
            id,
            bill_id: String::new(),
            lead_id,
            state: BillState::Draft,
            amount: None,
            amount_with_vat: None,
            vat,
            creation_date,
            due_date: None,
            payment_date: None,
            details: Vec::new(),
            expenses: Vec::new(),
            bill_file: None,
        }
    }

    pub fn expenses_total(&self) -> f64 {
        self.expenses.iter().map(|e| e.amount).sum()
    }

    pub fn expenses_total_with_taxes(&self) -> f64 {
        self.expenses
            .iter()
            .map(|e| e.amount_with_vat.unwrap_or(e.amount))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_state_wire_names() {
        let json = serde_json::to_string(&BillState::Sent).unwrap();
        assert_eq!(json, "\"1_SENT\"");
        let state: BillState = serde_json::from_str("\"0_PROPOSED\"").unwrap();
        assert!(state.is_editable());
        assert!(!state.is_issued());
    }

    #[test]
    fn test_detail_compute() {
        let mut detail = BillDetail {
            mission_id: 1,
            month: None,
            consultant_id: None,
            quantity: 2.5,
            unit_price: 800.0,
            amount: None,
            amount_with_vat: None,
        };
        detail.compute(20.0);
        assert_eq!(detail.amount, Some(2000.0));
        assert_eq!(detail.amount_with_vat, Some(2400.0));
    }
}
