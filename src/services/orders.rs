//! Order lifecycle: create, update, accept, reject, remove and the read side.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::booking::{
    ApprovalStatus, Booking, BookingDetail, BookingFields, BookingListResponse, BookingQuery,
    BookingRequest, BookingWindow, CustomerBookingRequest, NewBooking, StatusChange, StatusCount,
};
use crate::model::customer::{Customer, Role, Scope, Viewer};
use crate::model::fleet::Asset;
use crate::model::invoice::{InvoiceDraft, RemoteInvoice, RemotePaymentStatus};
use crate::model::leg::{LegDirection, LegView};
use crate::model::price::{PriceBreakdown, PriceQuery};
use crate::services::availability::AvailabilityValidator;
use crate::services::collaborators::{AssetCatalog, CustomerDirectory, Ledger, LegRequests};
use crate::services::gateway::{GatewayError, PaymentGateway};
use crate::services::notify::BookingNotifications;
use crate::services::pricing::{invoice_lines, PricingCalculator};
use crate::services::reconcile::PaymentReconciler;
use crate::services::status_cache::StatusCountCache;
use crate::store::{BookingRecord, BookingStore};

/// Extra invoice attempts after a partner mismatch.
const MAX_PARTNER_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub succeed: bool,
}

impl Ack {
    fn ok() -> Self {
        Self { succeed: true }
    }
}

/// What an update has to do with the remote invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceAction {
    /// No remote invoice yet.
    Create,
    /// Same customer, billable items changed.
    Revise(String),
    /// Customer changed: the old invoice goes, a new one is issued.
    Replace(String),
    Keep,
}

pub fn classify_invoice_action(
    external_id: Option<&str>,
    items_changed: bool,
    customer_changed: bool,
) -> InvoiceAction {
    match external_id {
        None => InvoiceAction::Create,
        Some(id) if customer_changed => InvoiceAction::Replace(id.to_string()),
        Some(id) if items_changed => InvoiceAction::Revise(id.to_string()),
        Some(_) => InvoiceAction::Keep,
    }
}

/// Whether the recomputed price differs from what the booking was billed for.
pub fn items_changed(
    before: &Booking,
    old_asset: &Asset,
    price: &PriceBreakdown,
    start: DateTime<Utc>,
    duration: i32,
) -> bool {
    before.total_price != price.grand_total
        || price.rent_price != old_asset.daily_rate
        || before.asset_id != price.asset.id
        || before.start_date != start
        || before.service_price != price.service_price
        || before.out_of_town_price != price.out_of_town_price
        || before.additional_services.len() != price.additional_services.len()
        || before.duration != duration
        || before.discount != price.discount_percentage
}

/// `INV-<local date>-<random>`; also used as the gateway idempotency key.
pub fn invoice_number(now: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "INV-{}-{}",
        now.with_timezone(&tz).format("%Y%m%d"),
        Uuid::new_v4().simple().to_string().to_uppercase()
    )
}

fn ensure_contact(customer: &Customer) -> AppResult<()> {
    if customer.phone().is_none() {
        return Err(AppError::invalid("Customer phone number is required."));
    }
    if customer.email().is_none() {
        return Err(AppError::invalid("Customer email is required."));
    }
    Ok(())
}

// Salin snapshot harga ke booking
fn apply_price(booking: &mut Booking, price: &PriceBreakdown) {
    booking.rent_price = price.rent_price;
    booking.service_price = price.service_price;
    booking.insurance_price = price.insurance_price;
    booking.driver_price = price.total_driver_price;
    booking.out_of_town_price = price.out_of_town_price;
    booking.weekend_price = price.total_weekend_price;
    booking.additional_services = price.additional_services.clone();
    booking.sub_total_price = price.sub_total;
    booking.discount = price.discount_percentage;
    booking.total_tax = price.tax;
    booking.total_price = price.grand_total;
}

fn apply_remote(booking: &mut Booking, remote: RemoteInvoice) {
    booking.external_id = Some(remote.id);
    booking.payment_link = remote.payment_url;
    booking.payment_pdf_url = remote.pdf_url;
}

/// Booking detail with legs projected at `now`.
pub fn detail_view(record: BookingRecord, asset: Option<Asset>, now: DateTime<Utc>) -> BookingDetail {
    let mut start_request = None;
    let mut end_request = None;
    for (leg, logs) in record.legs {
        let direction = leg.direction;
        let view = LegView::project(leg, logs, now);
        match direction {
            LegDirection::Delivery => start_request = Some(view),
            LegDirection::PickUp => end_request = Some(view),
        }
    }

    BookingDetail {
        end_date: record.booking.end_date(),
        booking: record.booking,
        customer_name: record.customer_name,
        asset,
        start_request,
        end_request,
        status_logs: record.status_logs,
    }
}

pub struct OrderService {
    store: Arc<dyn BookingStore>,
    legs: Arc<dyn LegRequests>,
    assets: Arc<dyn AssetCatalog>,
    directory: Arc<dyn CustomerDirectory>,
    ledger: Arc<dyn Ledger>,
    gateway: Arc<dyn PaymentGateway>,
    pricing: Arc<PricingCalculator>,
    availability: AvailabilityValidator,
    notifications: BookingNotifications,
    cache: Arc<StatusCountCache>,
    reconciler: Arc<PaymentReconciler>,
    tax_id: String,
    tz: Tz,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn BookingStore>,
        legs: Arc<dyn LegRequests>,
        assets: Arc<dyn AssetCatalog>,
        directory: Arc<dyn CustomerDirectory>,
        ledger: Arc<dyn Ledger>,
        gateway: Arc<dyn PaymentGateway>,
        pricing: Arc<PricingCalculator>,
        notifications: BookingNotifications,
        cache: Arc<StatusCountCache>,
        reconciler: Arc<PaymentReconciler>,
        tax_id: String,
        tz: Tz,
    ) -> Self {
        Self {
            availability: AvailabilityValidator::new(store.clone(), tz),
            store,
            legs,
            assets,
            directory,
            ledger,
            gateway,
            pricing,
            notifications,
            cache,
            reconciler,
            tax_id,
            tz,
        }
    }

    pub async fn calculate_price(&self, query: &PriceQuery) -> AppResult<PriceBreakdown> {
        self.pricing.calculate(query).await
    }

    /// Customers cannot set their own discount or service charge.
    pub async fn calculate_customer_price(&self, query: &PriceQuery) -> AppResult<PriceBreakdown> {
        let query = PriceQuery {
            discount: None,
            service_price: None,
            ..query.clone()
        };
        self.pricing.calculate(&query).await
    }

    /// Booking from the public rental form. Starts PENDING without a remote invoice;
    /// the invoice is issued when an admin accepts it.
    pub async fn create_customer_booking(
        &self,
        viewer: Option<Viewer>,
        request: CustomerBookingRequest,
    ) -> AppResult<Booking> {
        let CustomerBookingRequest {
            new_customer,
            mut fields,
        } = request;
        fields.discount = None;
        fields.service_price = None;

        if viewer.is_none() && new_customer.is_none() {
            return Err(AppError::invalid("User is required."));
        }
        fields.validate()?;

        self.availability
            .check(&BookingWindow::new(fields.asset_id, fields.date, fields.duration, None))
            .await?;

        let customer_id = match (viewer, new_customer) {
            (Some(viewer), _) => viewer.id,
            (None, Some(new_customer)) => self.directory.create_customer(&new_customer).await?.id,
            (None, None) => return Err(AppError::invalid("User is required.")),
        };

        self.create_booking(fields, customer_id, ApprovalStatus::Pending, false)
            .await
    }

    /// Booking entered by an admin: accepted right away and invoiced.
    pub async fn create_admin_booking(&self, request: BookingRequest) -> AppResult<Booking> {
        let fields = request.fields;
        fields.validate()?;
        self.availability
            .check(&BookingWindow::new(fields.asset_id, fields.date, fields.duration, None))
            .await?;

        self.create_booking(fields, request.customer_id, ApprovalStatus::Accepted, true)
            .await
    }

    async fn create_booking(
        &self,
        fields: BookingFields,
        customer_id: i64,
        status: ApprovalStatus,
        issue_invoice: bool,
    ) -> AppResult<Booking> {
        self.validate_participants(customer_id, &fields.driver_ids()).await?;

        let price = self.pricing.calculate(&fields.price_query()).await?;

        let customer = self.directory.ensure_billing_profile(customer_id).await?;
        ensure_contact(&customer)?;

        let number = invoice_number(Utc::now(), self.tz);

        let remote = if issue_invoice {
            Some(self.issue_invoice(&customer, &fields, &price, &number).await?)
        } else {
            None
        };

        let booking = self
            .store
            .insert(NewBooking {
                invoice_number: number,
                description: fields.description.clone(),
                customer_id,
                asset_id: price.asset.id,
                insurance_id: price.insurance.as_ref().map(|i| i.id),
                start_date: fields.date,
                duration: fields.duration,
                status,
                rent_price: price.rent_price,
                service_price: price.service_price,
                insurance_price: price.insurance_price,
                driver_price: price.total_driver_price,
                out_of_town_price: price.out_of_town_price,
                weekend_price: price.total_weekend_price,
                additional_services: price.additional_services.clone(),
                sub_total_price: price.sub_total,
                discount: price.discount_percentage,
                total_tax: price.tax,
                total_price: price.grand_total,
                external_id: remote.as_ref().map(|r| r.id.clone()),
                payment_link: remote.as_ref().and_then(|r| r.payment_url.clone()),
                payment_pdf_url: remote.as_ref().and_then(|r| r.pdf_url.clone()),
                delivery: fields.start_request.clone(),
                pickup: fields.end_request.clone(),
            })
            .await?;

        if status == ApprovalStatus::Accepted {
            self.notifications.accepted(&booking, &price.asset, &customer);
        }

        self.ledger.record_for_booking(&booking, &price.asset).await?;
        self.cache.invalidate();

        info!(
            booking_id = booking.id,
            invoice_number = %booking.invoice_number,
            status = status.as_str(),
            total = %booking.total_price,
            "order created"
        );
        Ok(booking)
    }

    fn invoice_draft(
        &self,
        customer: &Customer,
        fields: &BookingFields,
        price: &PriceBreakdown,
        number: &str,
    ) -> InvoiceDraft {
        InvoiceDraft {
            customer: customer.clone(),
            date: fields.date,
            invoice_number: number.to_string(),
            items: invoice_lines(price, fields.duration, fields.is_out_of_town, &self.tax_id),
            discount: price.discount,
            total: price.grand_total,
            duration: fields.duration,
        }
    }

    /// Creates the remote invoice, repairing the customer's partner profile and
    /// retrying on a mismatch. Retries first look for an invoice that an earlier
    /// attempt may already have created under the same number.
    async fn issue_invoice(
        &self,
        customer: &Customer,
        fields: &BookingFields,
        price: &PriceBreakdown,
        number: &str,
    ) -> AppResult<RemoteInvoice> {
        let draft = self.invoice_draft(customer, fields, price, number);

        for attempt in 0..=MAX_PARTNER_RETRIES {
            if attempt > 0 {
                if let Some(existing) = self.gateway.find_invoice_by_number(number).await? {
                    info!(invoice_number = number, attempt, "reusing invoice from earlier attempt");
                    return Ok(existing);
                }
            }

            match self.gateway.create_invoice(&draft).await {
                Ok(remote) => return Ok(remote),
                Err(GatewayError::PartnerMismatch) => {
                    warn!(
                        customer_id = customer.id,
                        invoice_number = number,
                        attempt,
                        "partner mismatch, repairing billing profile"
                    );
                    self.directory.repair_billing_profile(customer).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(customer_id = customer.id, invoice_number = number, "invoice retries exhausted");
        Err(AppError::conflict("Failed to create order."))
    }

    async fn validate_participants(&self, customer_id: i64, driver_ids: &[i64]) -> AppResult<()> {
        if !self.directory.has_role(customer_id, Role::Customer).await? {
            return Err(AppError::invalid("Could not find customer."));
        }
        for driver_id in driver_ids {
            if !self.directory.has_role(*driver_id, Role::Driver).await? {
                return Err(AppError::invalid("Could not find driver."));
            }
        }
        Ok(())
    }

    async fn load(&self, id: i64, scope: Scope) -> AppResult<BookingRecord> {
        self.store
            .find(id, scope)
            .await?
            .ok_or_else(|| AppError::not_found("Could not find order."))
    }

    /// Overwrites the booking from `request` and brings the remote invoice in line.
    ///
    /// `status` is only set when the call is an explicit approval transition;
    /// only then is a status log appended.
    pub async fn update(
        &self,
        id: i64,
        request: BookingRequest,
        status: Option<ApprovalStatus>,
    ) -> AppResult<Booking> {
        let record = self.load(id, Scope::All).await?;
        let before = record.booking.clone();

        if let Some(next) = status {
            if !before.status.can_transition_to(next) {
                return Err(AppError::conflict("Order already accepted/rejected."));
            }
        }

        let fields = &request.fields;
        fields.validate()?;

        self.validate_participants(request.customer_id, &fields.driver_ids())
            .await?;
        if !self.directory.is_verified(request.customer_id).await? {
            return Err(AppError::invalid("Customer is not verified."));
        }

        self.availability
            .check(&BookingWindow::new(fields.asset_id, fields.date, fields.duration, Some(id)))
            .await?;

        let customer = self
            .directory
            .ensure_billing_profile(request.customer_id)
            .await?;
        ensure_contact(&customer)?;

        let price = self.pricing.calculate(&fields.price_query()).await?;
        let old_asset = self.assets.find_asset(before.asset_id).await?;

        let action = classify_invoice_action(
            before.external_id.as_deref(),
            items_changed(&before, &old_asset, &price, fields.date, fields.duration),
            request.customer_id != before.customer_id,
        );

        let mut booking = before.clone();
        let mut revised = false;

        match &action {
            InvoiceAction::Create => {
                let remote = self
                    .issue_invoice(&customer, fields, &price, &before.invoice_number)
                    .await?;
                apply_remote(&mut booking, remote);
            }
            InvoiceAction::Revise(external_id) => {
                if price.grand_total < before.total_price {
                    return Err(AppError::conflict(
                        "Harga sewa tidak boleh kurang dari harga sebelumnya.",
                    ));
                }
                let draft = self.invoice_draft(&customer, fields, &price, &before.invoice_number);
                let remote = self.gateway.update_invoice(external_id, &draft).await?;
                apply_remote(&mut booking, remote);
                revised = true;
            }
            InvoiceAction::Replace(external_id) => {
                match self.gateway.delete_invoice(external_id).await {
                    Ok(()) | Err(GatewayError::NotLinked) => {}
                    Err(e) => return Err(e.into()),
                }
                let remote = self
                    .issue_invoice(&customer, fields, &price, &before.invoice_number)
                    .await?;
                apply_remote(&mut booking, remote);
            }
            InvoiceAction::Keep => {}
        }

        booking.description = fields.description.clone();
        booking.customer_id = request.customer_id;
        booking.asset_id = price.asset.id;
        booking.insurance_id = price.insurance.as_ref().map(|i| i.id);
        booking.start_date = fields.date;
        booking.duration = fields.duration;
        apply_price(&mut booking, &price);
        if let Some(next) = status {
            booking.status = next;
        }

        let change = status.map(|status| StatusChange {
            status,
            reason: None,
        });
        self.store.save(&booking, change).await?;

        for (leg, _) in &record.legs {
            let input = match leg.direction {
                LegDirection::Delivery => &fields.start_request,
                LegDirection::PickUp => &fields.end_request,
            };
            self.legs.update_leg(leg.id, input).await?;
        }

        self.ledger.update_for_booking(&booking, &price.asset).await?;
        self.cache.invalidate();

        if revised {
            if let Some(external_id) = booking.external_id.clone() {
                let reconciler = self.reconciler.clone();
                let number = booking.invoice_number.clone();
                tokio::spawn(async move {
                    if let Err(e) = reconciler
                        .reconcile(Some(external_id.as_str()), Some(number.as_str()))
                        .await
                    {
                        warn!(external_id = %external_id, error = %e, "reconcile after invoice update failed");
                    }
                });
            }

            let changes =
                self.notifications
                    .describe_changes(&before, &old_asset, fields.date, &price.asset);
            self.notifications.changed(&booking, &customer, &changes);
        }

        if status == Some(ApprovalStatus::Accepted) {
            self.notifications.accepted(&booking, &price.asset, &customer);
        }

        info!(booking_id = id, action = ?action, status = booking.status.as_str(), "order updated");
        Ok(booking)
    }

    pub async fn accept(&self, id: i64, request: BookingRequest) -> AppResult<Booking> {
        self.update(id, request, Some(ApprovalStatus::Accepted)).await
    }

    pub async fn reject(&self, id: i64, reason: Option<String>) -> AppResult<Ack> {
        let record = self.load(id, Scope::All).await?;
        let booking = record.booking;

        if booking.status != ApprovalStatus::Pending {
            return Err(AppError::conflict("Order already accepted/rejected."));
        }

        self.store
            .transition(
                id,
                ApprovalStatus::Pending,
                StatusChange {
                    status: ApprovalStatus::Rejected,
                    reason: reason.clone(),
                },
            )
            .await?;

        match (
            self.assets.find_asset(booking.asset_id).await,
            self.directory.find_customer(booking.customer_id).await,
        ) {
            (Ok(asset), Ok(customer)) => {
                self.notifications
                    .rejected(&booking, &asset, &customer, reason.as_deref())
            }
            _ => warn!(booking_id = id, "rejection notice skipped, asset or customer missing"),
        }

        self.cache.invalidate();
        info!(booking_id = id, "order rejected");
        Ok(Ack::ok())
    }

    pub async fn remove(&self, id: i64) -> AppResult<Ack> {
        let record = self.load(id, Scope::All).await?;

        if let Some(external_id) = record.booking.external_id.as_deref() {
            match self.gateway.get_invoice(external_id).await {
                Ok(remote) if remote.payment_status == RemotePaymentStatus::Paid => {
                    return Err(AppError::conflict("Order already paid, cannot be updated."));
                }
                Ok(_) | Err(GatewayError::NotLinked) => {}
                Err(e) => return Err(e.into()),
            }

            match self.gateway.delete_invoice(external_id).await {
                Ok(()) => {}
                Err(GatewayError::NotLinked) => {
                    info!(booking_id = id, external_id, "invoice already unlinked");
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.store.soft_delete(id).await?;
        self.legs.remove_by_booking(id).await?;
        self.ledger.remove_for_booking(id).await?;
        self.cache.invalidate();

        info!(booking_id = id, "order removed");
        Ok(Ack::ok())
    }

    pub async fn find_all(&self, viewer: Viewer, query: &BookingQuery) -> AppResult<BookingListResponse> {
        let (data, total) = self.store.list(query, viewer.scope()).await?;
        Ok(BookingListResponse {
            data,
            total,
            page: query.page(),
            limit: query.limit(),
        })
    }

    pub async fn find_one(&self, viewer: Viewer, id: i64) -> AppResult<BookingDetail> {
        let record = self.load(id, viewer.scope()).await?;

        let asset = match self.assets.find_asset(record.booking.asset_id).await {
            Ok(asset) => Some(asset),
            Err(AppError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(detail_view(record, asset, Utc::now()))
    }

    pub async fn status_counts(&self) -> AppResult<Vec<StatusCount>> {
        self.cache.get_counts().await
    }
}
