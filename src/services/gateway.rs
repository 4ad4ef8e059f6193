//! Payment gateway adapter.
//!
//! The gateway is the system of record for invoices and their settlement.
//! Invoice creation is keyed by the invoice number, so repeating a create
//! with the same number never yields a second remote invoice.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::model::customer::Customer;
use crate::model::invoice::{BillingProfile, InvoiceDraft, RemoteInvoice, RemoteInvoiceState};

const PARTNER_MISMATCH: &str = "Failed partner doesn't match";
const NOT_LINKED: &str = "unable to Single link invoice";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The customer's remote profile differs from what the invoice references.
    #[error("Failed partner doesn't match")]
    PartnerMismatch,

    /// The invoice is no longer linked on the gateway side.
    #[error("unable to Single link invoice")]
    NotLinked,

    #[error("gateway responded {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected gateway payload: {0}")]
    Decode(String),
}

/// Maps a failed response onto an error. An unreadable body still counts as
/// a rejection, with the read error in place of the body.
pub fn classify_failure(status: StatusCode, body: Result<String, String>) -> GatewayError {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            warn!(%status, error = %e, "gateway error body unreadable");
            return GatewayError::Rejected {
                status,
                body: format!("<unreadable body: {}>", e),
            };
        }
    };

    if body.contains(PARTNER_MISMATCH) {
        return GatewayError::PartnerMismatch;
    }
    if body.contains(NOT_LINKED) {
        return GatewayError::NotLinked;
    }

    warn!(%status, %body, "gateway rejected request");
    GatewayError::Rejected { status, body }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<RemoteInvoice, GatewayError>;

    async fn update_invoice(
        &self,
        external_id: &str,
        draft: &InvoiceDraft,
    ) -> Result<RemoteInvoice, GatewayError>;

    /// Fails with [`GatewayError::NotLinked`] when the invoice was already unlinked.
    async fn delete_invoice(&self, external_id: &str) -> Result<(), GatewayError>;

    async fn get_invoice(&self, external_id: &str) -> Result<RemoteInvoiceState, GatewayError>;

    async fn find_invoice_by_number(&self, number: &str) -> Result<Option<RemoteInvoice>, GatewayError>;

    async fn create_partner(&self, customer: &Customer) -> Result<BillingProfile, GatewayError>;

    async fn update_partner(&self, customer: &Customer) -> Result<(), GatewayError>;
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        warn!(error = %e, "payment gateway call failed");
        AppError::Conflict {
            code: "payment_gateway_error",
            message: e.to_string(),
        }
    }
}

// Bentuk response dari gateway
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct InvoicePayload {
    id: String,
    #[serde(default)]
    pdf_url: Option<String>,
    #[serde(default)]
    payment_url: Option<String>,
}

impl From<InvoicePayload> for RemoteInvoice {
    fn from(p: InvoicePayload) -> Self {
        RemoteInvoice {
            id: p.id,
            pdf_url: p.pdf_url,
            payment_url: p.payment_url,
        }
    }
}

pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.api_key)
    }

    fn invoice_body(draft: &InvoiceDraft) -> serde_json::Value {
        json!({
            "invoice_date": draft.date,
            "number": draft.invoice_number,
            "customer": {
                "id": draft.customer.billing_id,
                "number": draft.customer.billing_number,
                "name": draft.customer.name,
                "email": draft.customer.email(),
                "phone": draft.customer.phone(),
            },
            "items": draft.items,
            "discount": draft.discount,
            "total": draft.total,
            "due_days": draft.duration,
        })
    }

    fn partner_body(customer: &Customer) -> serde_json::Value {
        json!({
            "name": customer.name,
            "email": customer.email(),
            "phone": customer.phone(),
            "is_customer": true,
        })
    }

    /// Classifies a non-success response by its message body.
    async fn check(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.map_err(|e| e.to_string());
        Err(classify_failure(status, body))
    }

    async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, GatewayError> {
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<RemoteInvoice, GatewayError> {
        debug!(invoice_number = %draft.invoice_number, "creating remote invoice");
        let response = self
            .authorized(self.client.post(self.url("/sales-invoices")))
            .header("Idempotency-Key", &draft.invoice_number)
            .json(&Self::invoice_body(draft))
            .send()
            .await?;

        let payload: InvoicePayload = Self::decode(Self::check(response).await?).await?;
        Ok(payload.into())
    }

    async fn update_invoice(
        &self,
        external_id: &str,
        draft: &InvoiceDraft,
    ) -> Result<RemoteInvoice, GatewayError> {
        let response = self
            .authorized(self.client.put(self.url(&format!("/sales-invoices/{}", external_id))))
            .json(&Self::invoice_body(draft))
            .send()
            .await?;

        let payload: InvoicePayload = Self::decode(Self::check(response).await?).await?;
        Ok(payload.into())
    }

    async fn delete_invoice(&self, external_id: &str) -> Result<(), GatewayError> {
        let response = self
            .authorized(self.client.delete(self.url(&format!("/sales-invoices/{}", external_id))))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn get_invoice(&self, external_id: &str) -> Result<RemoteInvoiceState, GatewayError> {
        let response = self
            .authorized(self.client.get(self.url(&format!("/sales-invoices/{}", external_id))))
            .send()
            .await?;

        Self::decode(Self::check(response).await?).await
    }

    async fn find_invoice_by_number(&self, number: &str) -> Result<Option<RemoteInvoice>, GatewayError> {
        let response = self
            .authorized(self.client.get(self.url("/sales-invoices")))
            .query(&[("number", number)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let found: Vec<InvoicePayload> = Self::decode(Self::check(response).await?).await?;
        Ok(found.into_iter().next().map(RemoteInvoice::from))
    }

    async fn create_partner(&self, customer: &Customer) -> Result<BillingProfile, GatewayError> {
        let response = self
            .authorized(self.client.post(self.url("/partners")))
            .json(&Self::partner_body(customer))
            .send()
            .await?;

        Self::decode(Self::check(response).await?).await
    }

    async fn update_partner(&self, customer: &Customer) -> Result<(), GatewayError> {
        let Some(billing_id) = customer.billing_id.as_deref() else {
            return Err(GatewayError::Decode(format!(
                "customer {} has no billing profile",
                customer.id
            )));
        };

        let response = self
            .authorized(self.client.put(self.url(&format!("/partners/{}", billing_id))))
            .json(&Self::partner_body(customer))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
