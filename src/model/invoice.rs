//! Shapes exchanged with the payment gateway.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::model::customer::Customer;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLine {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub quantity: i32,
    pub tax_id: String,
    pub discount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDraft {
    pub customer: Customer,
    pub date: DateTime<Utc>,
    pub invoice_number: String,
    pub items: Vec<InvoiceLine>,
    /// Discount amount, not percentage.
    pub discount: Decimal,
    pub total: Decimal,
    pub duration: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInvoice {
    pub id: String,
    pub pdf_url: Option<String>,
    pub payment_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemotePaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
    Overdue,
    Other(String),
}

impl From<&str> for RemotePaymentStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace('_', " ").as_str() {
            "unpaid" => RemotePaymentStatus::Unpaid,
            "partially paid" => RemotePaymentStatus::PartiallyPaid,
            "paid" => RemotePaymentStatus::Paid,
            "overdue" => RemotePaymentStatus::Overdue,
            other => RemotePaymentStatus::Other(other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for RemotePaymentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(RemotePaymentStatus::from(raw.as_str()))
    }
}

/// Authoritative invoice state as read back from the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInvoiceState {
    pub id: String,
    pub number: Option<String>,
    pub payment_status: RemotePaymentStatus,
}

/// Customer counterpart in the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingProfile {
    pub id: String,
    pub number: String,
}
