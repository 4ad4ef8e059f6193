//! Payment reconciliation.
//!
//! A gateway callback is only a hint that something changed. The handler
//! waits for the gateway to settle, then re-reads the invoice (with backoff
//! while the read is still stale) and moves the local payment status to
//! match. Applying the same remote state twice is a no-op.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ReconcileConfig;
use crate::error::{AppError, AppResult};
use crate::model::booking::{Booking, PaymentStatus};
use crate::model::customer::Scope;
use crate::model::invoice::{RemoteInvoiceState, RemotePaymentStatus};
use crate::services::collaborators::{AssetCatalog, CustomerDirectory, Ledger};
use crate::services::gateway::{GatewayError, PaymentGateway};
use crate::services::notify::BookingNotifications;
use crate::services::status_cache::StatusCountCache;
use crate::store::BookingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub succeed: bool,
    pub changes: bool,
}

/// Local payment status implied by a remote invoice state, if any.
pub fn target_status(remote: &RemotePaymentStatus) -> Option<PaymentStatus> {
    match remote {
        RemotePaymentStatus::PartiallyPaid => Some(PaymentStatus::PartiallyPaid),
        RemotePaymentStatus::Paid => Some(PaymentStatus::Done),
        RemotePaymentStatus::Overdue => Some(PaymentStatus::Failed),
        RemotePaymentStatus::Unpaid | RemotePaymentStatus::Other(_) => None,
    }
}

pub struct PaymentReconciler {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn BookingStore>,
    assets: Arc<dyn AssetCatalog>,
    directory: Arc<dyn CustomerDirectory>,
    ledger: Arc<dyn Ledger>,
    notifications: BookingNotifications,
    cache: Arc<StatusCountCache>,
    config: ReconcileConfig,
}

impl PaymentReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn BookingStore>,
        assets: Arc<dyn AssetCatalog>,
        directory: Arc<dyn CustomerDirectory>,
        ledger: Arc<dyn Ledger>,
        notifications: BookingNotifications,
        cache: Arc<StatusCountCache>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            assets,
            directory,
            ledger,
            notifications,
            cache,
            config,
        }
    }

    pub async fn reconcile(
        &self,
        external_id: Option<&str>,
        invoice_number: Option<&str>,
    ) -> AppResult<ReconcileOutcome> {
        let external_id = external_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::invalid("External ID is required."))?;
        let invoice_number = invoice_number.map(str::trim).filter(|n| !n.is_empty());

        tokio::time::sleep(self.config.settle_delay()).await;

        let (booking, remote) = self.observe(external_id, invoice_number).await?;
        let mut booking = booking.ok_or_else(|| {
            warn!(external_id, ?invoice_number, "callback for unknown order");
            AppError::not_found("Order not found.")
        })?;

        let previous = booking.payment_status;
        let changes = match target_status(&remote.payment_status) {
            Some(next) if previous.can_settle_to(next) => {
                let won = self.store.set_payment_status(booking.id, previous, next).await?;
                if won {
                    booking.payment_status = next;
                } else {
                    // Callback lain sudah duluan, pakai status terbaru
                    debug!(booking_id = booking.id, "payment status moved concurrently");
                    if let Some(record) = self.store.find(booking.id, Scope::All).await? {
                        booking = record.booking;
                    }
                }
                won
            }
            _ => false,
        };

        let asset = self.assets.find_asset(booking.asset_id).await?;

        if changes && booking.payment_status == PaymentStatus::Done {
            match self.directory.find_customer(booking.customer_id).await {
                Ok(customer) => self.notifications.payment_received(&booking, &asset, &customer),
                Err(e) => warn!(booking_id = booking.id, error = %e, "payment notice skipped"),
            }
        }

        self.ledger.update_for_booking(&booking, &asset).await?;
        self.cache.invalidate();

        info!(
            booking_id = booking.id,
            external_id,
            remote = ?remote.payment_status,
            from = previous.as_str(),
            to = booking.payment_status.as_str(),
            changes,
            "payment reconciled"
        );

        Ok(ReconcileOutcome {
            succeed: true,
            changes,
        })
    }

    /// Reads remote and local state until both are usable or retries run out.
    ///
    /// A read counts as stale while the booking is not yet stored locally or
    /// the gateway still reports the invoice as unpaid. The last successful
    /// read is returned either way.
    async fn observe(
        &self,
        external_id: &str,
        invoice_number: Option<&str>,
    ) -> AppResult<(Option<Booking>, RemoteInvoiceState)> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.retry_min_delay())
            .with_max_delay(self.config.retry_max_delay())
            .with_max_times(self.config.max_retries)
            .build();

        let mut observed = None;
        let mut last_error: Option<GatewayError> = None;

        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            let remote = match self.gateway.get_invoice(external_id).await {
                Ok(remote) => remote,
                Err(e) => {
                    warn!(attempt = attempt + 1, external_id, error = %e, "invoice read failed");
                    last_error = Some(e);
                    continue;
                }
            };

            let booking = self.store.find_by_invoice(external_id, invoice_number).await?;
            let settled = booking.is_some() && remote.payment_status != RemotePaymentStatus::Unpaid;
            observed = Some((booking, remote));
            if settled {
                break;
            }
            debug!(attempt = attempt + 1, external_id, "invoice state not settled yet");
        }

        match (observed, last_error) {
            (Some(observed), _) => Ok(observed),
            (None, Some(e)) => Err(e.into()),
            (None, None) => Err(AppError::Internal("invoice was never read".to_string())),
        }
    }
}
