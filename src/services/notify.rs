//! Outbound customer / operations notifications.
//!
//! Delivery is best effort: every send runs on its own task and failures are
//! only logged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MailConfig;
use crate::model::booking::Booking;
use crate::model::customer::Customer;
use crate::model::fleet::Asset;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub template: &'static str,
    pub to: String,
    pub subject: String,
    pub customer_name: String,
    pub message: String,
    pub button_name: String,
    pub button_link: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail relay error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail relay rejected message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Posts notifications to a mail relay, or just logs them when no relay is set.
pub struct MailNotifier {
    client: Client,
    relay_url: Option<String>,
}

impl MailNotifier {
    pub fn new(relay_url: Option<String>) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self { client, relay_url })
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        let Some(url) = &self.relay_url else {
            info!(
                template = notification.template,
                to = %notification.to,
                subject = %notification.subject,
                "mail relay not configured, notification logged only"
            );
            return Ok(());
        };

        let response = self.client.post(url).json(&notification).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => format!("<unreadable body: {}>", e),
            };
            return Err(NotifyError::Rejected(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

/// Builds the booking messages and dispatches them without blocking the caller.
#[derive(Clone)]
pub struct BookingNotifications {
    notifier: Arc<dyn Notifier>,
    mail: MailConfig,
    tz: Tz,
}

impl BookingNotifications {
    pub fn new(notifier: Arc<dyn Notifier>, mail: MailConfig, tz: Tz) -> Self {
        Self { notifier, mail, tz }
    }

    fn customer_link(&self, booking_id: i64) -> String {
        format!("{}/sewa/riwayat/{}/detail", self.mail.frontend_url, booking_id)
    }

    fn dispatch(&self, notification: Notification) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let template = notification.template;
            if let Err(e) = notifier.send(notification).await {
                warn!(template, error = %e, "notification delivery failed");
            }
        });
    }

    pub fn accepted(&self, booking: &Booking, asset: &Asset, customer: &Customer) {
        let Some(to) = customer.email() else { return };
        self.dispatch(Notification {
            template: "booking.accepted",
            to: to.to_string(),
            subject: "Permintaan Sewa Anda Telah Disetujui Oleh Admin!".to_string(),
            customer_name: customer.name.clone(),
            message: format!(
                "Permintaan sewa {} {} selama {} hari telah disetujui.",
                asset.kind.label(),
                asset.name,
                booking.duration
            ),
            button_name: "Lihat Detail Sewa".to_string(),
            button_link: self.customer_link(booking.id),
        });
    }

    pub fn rejected(&self, booking: &Booking, asset: &Asset, customer: &Customer, reason: Option<&str>) {
        let Some(to) = customer.email() else { return };
        let mut message = format!(
            "Permintaan sewa {} {} selama {} hari ditolak.",
            asset.kind.label(),
            asset.name,
            booking.duration
        );
        if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
            message.push_str(&format!(" Alasan: {}", reason));
        }
        self.dispatch(Notification {
            template: "booking.rejected",
            to: to.to_string(),
            subject: "Permintaan Sewa Anda Telah Ditolak Oleh Admin!".to_string(),
            customer_name: customer.name.clone(),
            message,
            button_name: "Lihat Detail Sewa".to_string(),
            button_link: self.customer_link(booking.id),
        });
    }

    /// Nothing is sent when `changes` is empty.
    pub fn changed(&self, booking: &Booking, customer: &Customer, changes: &[String]) {
        if changes.is_empty() {
            return;
        }
        let Some(to) = customer.email() else { return };
        self.dispatch(Notification {
            template: "booking.changed",
            to: to.to_string(),
            subject: "Detail Permintaan Sewa Anda Telah Diubah oleh Admin!".to_string(),
            customer_name: customer.name.clone(),
            message: changes.join("\n"),
            button_name: "Lihat Permintaan Sewa".to_string(),
            button_link: self.customer_link(booking.id),
        });
    }

    pub fn payment_received(&self, booking: &Booking, asset: &Asset, customer: &Customer) {
        self.dispatch(Notification {
            template: "booking.paid",
            to: self.mail.operations_recipient.clone(),
            subject: format!(
                "{} Telah Melakukan Transfer Atas Sewa {} #{}",
                customer.name, asset.name, booking.invoice_number
            ),
            customer_name: "Admin".to_string(),
            message: format!(
                "{} telah membayar sewa {} {} selama {} hari.",
                customer.name,
                asset.kind.label(),
                asset.name,
                booking.duration
            ),
            button_name: "Lihat Detail Sewa".to_string(),
            button_link: format!("{}/dashboard/orders/{}/detail", self.mail.admin_url, booking.id),
        });
    }

    /// Human-readable summary of what an update changed for the customer.
    pub fn describe_changes(
        &self,
        before: &Booking,
        old_asset: &Asset,
        after_start: DateTime<Utc>,
        new_asset: &Asset,
    ) -> Vec<String> {
        let mut changes = Vec::new();

        if old_asset.id != new_asset.id {
            changes.push(format!(
                "Pergantian armada dari {} ke {}",
                old_asset.name, new_asset.name
            ));
        }

        if before.start_date != after_start {
            let fmt = "%d %B %Y %H:%M";
            changes.push(format!(
                "Pergantian jadwal dari {} ke {}",
                before.start_date.with_timezone(&self.tz).format(fmt),
                after_start.with_timezone(&self.tz).format(fmt)
            ));
        }

        changes
    }
}
