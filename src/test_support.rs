//! In-memory stand-ins for the database, gateway and other collaborators.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, TimeZone, Utc};
use chrono_tz::Asia::Jakarta;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::config::{AppConfig, ReconcileConfig};
use crate::error::{AppError, AppResult};
use crate::model::booking::{
    ApprovalStatus, Booking, BookingListItem, BookingQuery, BookingWindow, NewBooking,
    PaymentStatus, StatusBucket, StatusChange, StatusLog,
};
use crate::model::customer::{Customer, NewCustomer, Role, Scope};
use crate::model::fleet::{Asset, AssetKind, Insurance};
use crate::model::invoice::{
    BillingProfile, InvoiceDraft, RemoteInvoice, RemoteInvoiceState, RemotePaymentStatus,
};
use crate::model::leg::{LegDirection, LegInput, LegRequest, LegStatus};
use crate::services::collaborators::{
    AssetCatalog, CustomerDirectory, InsuranceCatalog, Ledger, LegRequests,
};
use crate::services::gateway::{GatewayError, PaymentGateway};
use crate::services::notify::{Notification, Notifier, NotifyError};
use crate::services::orders::OrderService;
use crate::services::reconcile::PaymentReconciler;
use crate::services::{Collaborators, Services};
use crate::store::{BookingRecord, BookingStore};

pub const CUSTOMER: i64 = 1;
pub const OTHER_CUSTOMER: i64 = 2;
pub const DRIVER: i64 = 50;
pub const OWNER: i64 = 60;
pub const ADMIN: i64 = 100;

/// 10:00 in Jakarta, `days` from today.
pub fn jakarta_day(days: u64) -> DateTime<Utc> {
    let today = Utc::now().with_timezone(&Jakarta).date_naive();
    let day = today.checked_add_days(Days::new(days)).unwrap();
    Jakarta
        .from_local_datetime(&day.and_hms_opt(10, 0, 0).unwrap())
        .unwrap()
        .with_timezone(&Utc)
}

pub fn booking_fixture(
    id: i64,
    asset_id: i64,
    start: DateTime<Utc>,
    duration: i32,
    status: ApprovalStatus,
) -> Booking {
    let rent = Decimal::from(300_000);
    let sub_total = rent * Decimal::from(duration);
    Booking {
        id,
        invoice_number: format!("INV-TEST-{}", id),
        description: None,
        customer_id: CUSTOMER,
        asset_id,
        insurance_id: None,
        start_date: start,
        duration,
        status,
        payment_status: PaymentStatus::Pending,
        rent_price: rent,
        service_price: Decimal::ZERO,
        insurance_price: Decimal::ZERO,
        driver_price: Decimal::ZERO,
        out_of_town_price: Decimal::ZERO,
        weekend_price: Decimal::ZERO,
        additional_services: vec![],
        sub_total_price: sub_total,
        discount: Decimal::ZERO,
        total_tax: Decimal::ZERO,
        total_price: sub_total,
        external_id: None,
        payment_link: None,
        payment_pdf_url: None,
        created_at: start,
        updated_at: start,
    }
}

fn leg(id: i64, booking_id: i64, direction: LegDirection, input: &LegInput, status: LegStatus) -> LegRequest {
    LegRequest {
        id,
        booking_id,
        direction,
        is_self_pickup: input.is_self_pickup,
        address: input.address.clone(),
        distance: input.distance,
        driver_id: input.driver_id,
        status,
    }
}

struct Stored {
    booking: Booking,
    deleted: bool,
    legs: Vec<LegRequest>,
    status_logs: Vec<StatusLog>,
}

impl Stored {
    fn pickup_status(&self) -> Option<LegStatus> {
        self.legs
            .iter()
            .find(|l| l.direction == LegDirection::PickUp)
            .map(|l| l.status)
    }
}

#[derive(Default)]
struct MemoryState {
    bookings: BTreeMap<i64, Stored>,
    asset_owners: HashMap<i64, i64>,
    next_id: i64,
    next_leg_id: i64,
    next_log_id: i64,
}

// Aturan yang sama dengan query overlap di Postgres
fn holds_asset(status: ApprovalStatus, pickup: Option<LegStatus>) -> bool {
    status != ApprovalStatus::Rejected && pickup != Some(LegStatus::Done)
}

impl MemoryState {
    fn overlapping(&self, window: &BookingWindow) -> i64 {
        self.bookings
            .values()
            .filter(|s| !s.deleted)
            .filter(|s| s.booking.asset_id == window.asset_id)
            .filter(|s| Some(s.booking.id) != window.exclude_id)
            .filter(|s| holds_asset(s.booking.status, s.pickup_status()))
            .filter(|s| window.overlaps(s.booking.start_date, s.booking.end_date()))
            .count() as i64
    }

    fn log(&mut self, booking_id: i64, change: &StatusChange) -> AppResult<()> {
        self.next_log_id += 1;
        let id = self.next_log_id;
        let stored = self
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::not_found("Order not found."))?;
        stored.status_logs.push(StatusLog {
            id,
            booking_id,
            status: change.status,
            description: change.reason.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn visible(&self, stored: &Stored, scope: Scope) -> bool {
        match scope {
            Scope::All => true,
            Scope::Customer(id) => stored.booking.customer_id == id,
            Scope::Owner(id) => self.asset_owners.get(&stored.booking.asset_id) == Some(&id),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Stores a booking as-is with a pending delivery leg and a pickup leg in `pickup`.
    pub fn seed(&self, booking: Booking, pickup: LegStatus) {
        let mut state = self.state.lock();
        state.next_id = state.next_id.max(booking.id);
        state.next_leg_id += 2;
        let leg_id = state.next_leg_id;
        let legs = vec![
            leg(leg_id - 1, booking.id, LegDirection::Delivery, &LegInput::default(), LegStatus::Pending),
            leg(leg_id, booking.id, LegDirection::PickUp, &LegInput::default(), pickup),
        ];
        state.bookings.insert(
            booking.id,
            Stored {
                booking,
                deleted: false,
                legs,
                status_logs: vec![],
            },
        );
    }

    pub fn booking(&self, id: i64) -> Booking {
        self.state.lock().bookings[&id].booking.clone()
    }

    pub fn record(&self, id: i64) -> BookingRecord {
        let state = self.state.lock();
        let stored = &state.bookings[&id];
        BookingRecord {
            booking: stored.booking.clone(),
            customer_name: None,
            legs: stored.legs.iter().map(|l| (l.clone(), vec![])).collect(),
            status_logs: stored.status_logs.clone(),
        }
    }

    pub fn exists(&self, id: i64) -> bool {
        self.state
            .lock()
            .bookings
            .get(&id)
            .map(|s| !s.deleted)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.state.lock().bookings.values().filter(|s| !s.deleted).count()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn count_overlapping(&self, window: &BookingWindow) -> AppResult<i64> {
        Ok(self.state.lock().overlapping(window))
    }

    async fn insert(&self, new: NewBooking) -> AppResult<Booking> {
        let mut state = self.state.lock();
        if state.overlapping(&new.window()) > 0 {
            return Err(AppError::asset_unavailable());
        }

        state.next_id += 1;
        let id = state.next_id;
        state.next_leg_id += 2;
        let leg_id = state.next_leg_id;
        let now = Utc::now();

        let booking = Booking {
            id,
            invoice_number: new.invoice_number,
            description: new.description,
            customer_id: new.customer_id,
            asset_id: new.asset_id,
            insurance_id: new.insurance_id,
            start_date: new.start_date,
            duration: new.duration,
            status: new.status,
            payment_status: PaymentStatus::Pending,
            rent_price: new.rent_price,
            service_price: new.service_price,
            insurance_price: new.insurance_price,
            driver_price: new.driver_price,
            out_of_town_price: new.out_of_town_price,
            weekend_price: new.weekend_price,
            additional_services: new.additional_services,
            sub_total_price: new.sub_total_price,
            discount: new.discount,
            total_tax: new.total_tax,
            total_price: new.total_price,
            external_id: new.external_id,
            payment_link: new.payment_link,
            payment_pdf_url: new.payment_pdf_url,
            created_at: now,
            updated_at: now,
        };

        let legs = vec![
            leg(leg_id - 1, id, LegDirection::Delivery, &new.delivery, LegStatus::Pending),
            leg(leg_id, id, LegDirection::PickUp, &new.pickup, LegStatus::Pending),
        ];
        state.bookings.insert(
            id,
            Stored {
                booking: booking.clone(),
                deleted: false,
                legs,
                status_logs: vec![],
            },
        );
        state.log(
            id,
            &StatusChange {
                status: booking.status,
                reason: None,
            },
        )?;
        Ok(booking)
    }

    async fn find(&self, id: i64, scope: Scope) -> AppResult<Option<BookingRecord>> {
        let state = self.state.lock();
        let Some(stored) = state.bookings.get(&id).filter(|s| !s.deleted) else {
            return Ok(None);
        };
        if !state.visible(stored, scope) {
            return Ok(None);
        }
        Ok(Some(BookingRecord {
            booking: stored.booking.clone(),
            customer_name: None,
            legs: stored.legs.iter().map(|l| (l.clone(), vec![])).collect(),
            status_logs: stored.status_logs.clone(),
        }))
    }

    async fn find_by_invoice(
        &self,
        external_id: &str,
        invoice_number: Option<&str>,
    ) -> AppResult<Option<Booking>> {
        let state = self.state.lock();
        let found = state
            .bookings
            .values()
            .filter(|s| !s.deleted)
            .find(|s| match invoice_number {
                Some(number) => s.booking.invoice_number == number,
                None => s.booking.external_id.as_deref() == Some(external_id),
            })
            .map(|s| s.booking.clone());
        Ok(found)
    }

    async fn save(&self, booking: &Booking, change: Option<StatusChange>) -> AppResult<()> {
        let mut state = self.state.lock();
        let window = BookingWindow::new(booking.asset_id, booking.start_date, booking.duration, Some(booking.id));
        if state.overlapping(&window) > 0 {
            return Err(AppError::asset_unavailable());
        }

        let stored = state
            .bookings
            .get_mut(&booking.id)
            .filter(|s| !s.deleted)
            .ok_or_else(|| AppError::not_found("Order not found."))?;
        let status = match &change {
            Some(change) if !stored.booking.status.can_transition_to(change.status) => {
                return Err(AppError::conflict("Order already accepted/rejected."));
            }
            Some(change) => change.status,
            None => stored.booking.status,
        };
        stored.booking = Booking {
            status,
            payment_status: stored.booking.payment_status,
            updated_at: Utc::now(),
            ..booking.clone()
        };

        if let Some(change) = change {
            state.log(booking.id, &change)?;
        }
        Ok(())
    }

    async fn transition(&self, id: i64, from: ApprovalStatus, change: StatusChange) -> AppResult<()> {
        let mut state = self.state.lock();
        let stored = state
            .bookings
            .get_mut(&id)
            .filter(|s| !s.deleted)
            .ok_or_else(|| AppError::not_found("Order not found."))?;
        if stored.booking.status != from {
            return Err(AppError::conflict("Order status changed."));
        }
        stored.booking.status = change.status;
        state.log(id, &change)
    }

    async fn set_payment_status(
        &self,
        id: i64,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> AppResult<bool> {
        // Yield first so concurrent reconciles really interleave
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        match state.bookings.get_mut(&id) {
            Some(stored) if stored.booking.payment_status == from => {
                stored.booking.payment_status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn soft_delete(&self, id: i64) -> AppResult<()> {
        let mut state = self.state.lock();
        let stored = state
            .bookings
            .get_mut(&id)
            .filter(|s| !s.deleted)
            .ok_or_else(|| AppError::not_found("Order not found."))?;
        stored.deleted = true;
        Ok(())
    }

    async fn list(&self, query: &BookingQuery, scope: Scope) -> AppResult<(Vec<BookingListItem>, i64)> {
        let state = self.state.lock();
        let mut matching: Vec<&Stored> = state
            .bookings
            .values()
            .filter(|s| !s.deleted && state.visible(s, scope))
            .filter(|s| match query.status {
                Some(bucket) => StatusBucket::of(s.booking.status, s.pickup_status()) == Some(bucket),
                None => true,
            })
            .filter(|s| query.start_date.map_or(true, |from| s.booking.start_date >= from))
            .filter(|s| query.end_date.map_or(true, |until| s.booking.start_date <= until))
            .collect();
        matching.sort_by(|a, b| b.booking.id.cmp(&a.booking.id));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .map(|s| BookingListItem {
                booking: s.booking.clone(),
                customer_name: None,
                fleet_name: None,
            })
            .collect();
        Ok((items, total))
    }

    async fn count_bucket(&self, bucket: StatusBucket) -> AppResult<i64> {
        let state = self.state.lock();
        Ok(state
            .bookings
            .values()
            .filter(|s| !s.deleted)
            .filter(|s| StatusBucket::of(s.booking.status, s.pickup_status()) == Some(bucket))
            .count() as i64)
    }
}

pub struct FakeCatalog;

#[async_trait]
impl AssetCatalog for FakeCatalog {
    async fn find_asset(&self, id: i64) -> AppResult<Asset> {
        let (name, kind) = match id {
            1 => ("Avanza", AssetKind::Car),
            2 => ("Xenia", AssetKind::Car),
            3 => ("NMax", AssetKind::Motorcycle),
            4 => ("Vario", AssetKind::Motorcycle),
            _ => return Err(AppError::not_found("Fleet not found.")),
        };
        Ok(Asset {
            id,
            name: name.to_string(),
            kind,
            daily_rate: Decimal::from(300_000),
            owner_id: Some(OWNER),
        })
    }
}

#[async_trait]
impl InsuranceCatalog for FakeCatalog {
    async fn find_insurance(&self, id: i64) -> AppResult<Insurance> {
        if id != 1 {
            return Err(AppError::not_found("Insurance not found."));
        }
        Ok(Insurance {
            id,
            name: "All Risk".to_string(),
            price: Decimal::from(75_000),
        })
    }
}

struct Person {
    customer: Customer,
    role: Role,
    verified: bool,
}

fn person(id: i64, name: &str, role: Role) -> Person {
    Person {
        customer: Customer {
            id,
            name: name.to_string(),
            email: Some(format!("{}@example.id", name.to_lowercase())),
            phone_number: Some("081234567890".to_string()),
            billing_id: None,
            billing_number: None,
        },
        role,
        verified: true,
    }
}

pub struct FakeDirectory {
    people: Mutex<HashMap<i64, Person>>,
    repairs: Mutex<usize>,
}

impl Default for FakeDirectory {
    fn default() -> Self {
        let people = [
            person(CUSTOMER, "Budi", Role::Customer),
            person(OTHER_CUSTOMER, "Sari", Role::Customer),
            person(DRIVER, "Joko", Role::Driver),
            person(OWNER, "Hendra", Role::Owner),
            person(ADMIN, "Admin", Role::Admin),
        ];
        Self {
            people: Mutex::new(people.into_iter().map(|p| (p.customer.id, p)).collect()),
            repairs: Mutex::new(0),
        }
    }
}

impl FakeDirectory {
    pub fn clear_phone(&self, id: i64) {
        if let Some(p) = self.people.lock().get_mut(&id) {
            p.customer.phone_number = None;
        }
    }

    pub fn repairs(&self) -> usize {
        *self.repairs.lock()
    }
}

#[async_trait]
impl CustomerDirectory for FakeDirectory {
    async fn find_customer(&self, id: i64) -> AppResult<Customer> {
        self.people
            .lock()
            .get(&id)
            .map(|p| p.customer.clone())
            .ok_or_else(|| AppError::not_found("Customer not found."))
    }

    async fn has_role(&self, id: i64, role: Role) -> AppResult<bool> {
        Ok(self.people.lock().get(&id).map_or(false, |p| p.role == role))
    }

    async fn is_verified(&self, id: i64) -> AppResult<bool> {
        Ok(self.people.lock().get(&id).map_or(false, |p| p.verified))
    }

    async fn create_customer(&self, new: &NewCustomer) -> AppResult<Customer> {
        let mut people = self.people.lock();
        let id = people.keys().max().copied().unwrap_or(0) + 1;
        let customer = Customer {
            id,
            name: new.name.clone(),
            email: Some(new.email.clone()),
            phone_number: Some(new.phone_number.clone()),
            billing_id: None,
            billing_number: None,
        };
        people.insert(
            id,
            Person {
                customer: customer.clone(),
                role: Role::Customer,
                verified: false,
            },
        );
        Ok(customer)
    }

    async fn ensure_billing_profile(&self, customer_id: i64) -> AppResult<Customer> {
        let mut people = self.people.lock();
        let p = people
            .get_mut(&customer_id)
            .ok_or_else(|| AppError::not_found("Customer not found."))?;
        if p.customer.billing_id.is_none() {
            p.customer.billing_id = Some(format!("partner-{}", customer_id));
            p.customer.billing_number = Some(format!("C-{:04}", customer_id));
        }
        Ok(p.customer.clone())
    }

    async fn repair_billing_profile(&self, _customer: &Customer) -> AppResult<()> {
        *self.repairs.lock() += 1;
        Ok(())
    }
}

struct FakeInvoice {
    number: String,
    deleted: bool,
}

#[derive(Default)]
struct GatewayState {
    invoices: HashMap<String, FakeInvoice>,
    statuses: HashMap<String, RemotePaymentStatus>,
    reads: HashMap<String, usize>,
    unlinked: HashSet<String>,
    mismatches: usize,
    mismatches_after_create: usize,
    created: usize,
    updated: usize,
    deleted: usize,
}

impl GatewayState {
    fn store_invoice(&mut self, number: &str) -> RemoteInvoice {
        self.created += 1;
        let id = format!("ext-{}", self.created);
        self.invoices.insert(
            id.clone(),
            FakeInvoice {
                number: number.to_string(),
                deleted: false,
            },
        );
        RemoteInvoice {
            payment_url: Some(format!("https://pay.example.id/{}", id)),
            pdf_url: Some(format!("https://pay.example.id/{}.pdf", id)),
            id,
        }
    }
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn set_status(&self, external_id: &str, status: RemotePaymentStatus) {
        self.state.lock().statuses.insert(external_id.to_string(), status);
    }

    pub fn unlink(&self, external_id: &str) {
        self.state.lock().unlinked.insert(external_id.to_string());
    }

    /// The next `n` creates fail with a partner mismatch.
    pub fn fail_with_mismatch(&self, n: usize) {
        self.state.lock().mismatches = n;
    }

    /// The next `n` creates store the invoice but still report a mismatch.
    pub fn fail_with_mismatch_after_create(&self, n: usize) {
        self.state.lock().mismatches_after_create = n;
    }

    pub fn created(&self) -> usize {
        self.state.lock().created
    }

    pub fn updated(&self) -> usize {
        self.state.lock().updated
    }

    pub fn deleted(&self) -> usize {
        self.state.lock().deleted
    }

    pub fn reads(&self, external_id: &str) -> usize {
        self.state.lock().reads.get(external_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<RemoteInvoice, GatewayError> {
        let mut state = self.state.lock();
        if state.mismatches_after_create > 0 {
            state.mismatches_after_create -= 1;
            state.store_invoice(&draft.invoice_number);
            return Err(GatewayError::PartnerMismatch);
        }
        if state.mismatches > 0 {
            state.mismatches -= 1;
            return Err(GatewayError::PartnerMismatch);
        }
        Ok(state.store_invoice(&draft.invoice_number))
    }

    async fn update_invoice(
        &self,
        external_id: &str,
        _draft: &InvoiceDraft,
    ) -> Result<RemoteInvoice, GatewayError> {
        let mut state = self.state.lock();
        if state.unlinked.contains(external_id) {
            return Err(GatewayError::NotLinked);
        }
        state.updated += 1;
        Ok(RemoteInvoice {
            id: external_id.to_string(),
            pdf_url: Some(format!("https://pay.example.id/{}.pdf", external_id)),
            payment_url: Some(format!("https://pay.example.id/{}", external_id)),
        })
    }

    async fn delete_invoice(&self, external_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        if state.unlinked.contains(external_id) {
            return Err(GatewayError::NotLinked);
        }
        if let Some(invoice) = state.invoices.get_mut(external_id) {
            invoice.deleted = true;
        }
        state.deleted += 1;
        Ok(())
    }

    async fn get_invoice(&self, external_id: &str) -> Result<RemoteInvoiceState, GatewayError> {
        let mut state = self.state.lock();
        *state.reads.entry(external_id.to_string()).or_insert(0) += 1;
        let payment_status = state
            .statuses
            .get(external_id)
            .cloned()
            .unwrap_or(RemotePaymentStatus::Unpaid);
        Ok(RemoteInvoiceState {
            id: external_id.to_string(),
            number: state.invoices.get(external_id).map(|i| i.number.clone()),
            payment_status,
        })
    }

    async fn find_invoice_by_number(&self, number: &str) -> Result<Option<RemoteInvoice>, GatewayError> {
        let state = self.state.lock();
        Ok(state
            .invoices
            .iter()
            .find(|(_, inv)| !inv.deleted && inv.number == number)
            .map(|(id, _)| RemoteInvoice {
                id: id.clone(),
                pdf_url: None,
                payment_url: None,
            }))
    }

    async fn create_partner(&self, customer: &Customer) -> Result<BillingProfile, GatewayError> {
        Ok(BillingProfile {
            id: format!("partner-{}", customer.id),
            number: format!("C-{:04}", customer.id),
        })
    }

    async fn update_partner(&self, _customer: &Customer) -> Result<(), GatewayError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLegs {
    updates: Mutex<usize>,
    removed: Mutex<Vec<i64>>,
}

impl FakeLegs {
    pub fn updates(&self) -> usize {
        *self.updates.lock()
    }

    pub fn removed(&self) -> Vec<i64> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl LegRequests for FakeLegs {
    async fn update_leg(&self, _id: i64, input: &LegInput) -> AppResult<()> {
        input.validate()?;
        *self.updates.lock() += 1;
        Ok(())
    }

    async fn remove_by_booking(&self, booking_id: i64) -> AppResult<()> {
        self.removed.lock().push(booking_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLedger {
    records: Mutex<usize>,
    updates: Mutex<usize>,
    removed: Mutex<Vec<i64>>,
}

impl FakeLedger {
    pub fn records(&self) -> usize {
        *self.records.lock()
    }

    pub fn updates(&self) -> usize {
        *self.updates.lock()
    }

    pub fn removed(&self) -> Vec<i64> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn record_for_booking(&self, _booking: &Booking, _asset: &Asset) -> AppResult<()> {
        *self.records.lock() += 1;
        Ok(())
    }

    async fn update_for_booking(&self, _booking: &Booking, _asset: &Asset) -> AppResult<()> {
        *self.updates.lock() += 1;
        Ok(())
    }

    async fn remove_for_booking(&self, booking_id: i64) -> AppResult<()> {
        self.removed.lock().push(booking_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Lets spawned deliveries finish before counting.
    pub async fn count(&self, template: &str) -> usize {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        self.sent.lock().iter().filter(|n| n.template == template).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().push(notification);
        Ok(())
    }
}

/// Fully wired services over the fakes above.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub directory: Arc<FakeDirectory>,
    pub legs: Arc<FakeLegs>,
    pub ledger: Arc<FakeLedger>,
    pub notifier: Arc<RecordingNotifier>,
    pub orders: Arc<OrderService>,
    pub reconciler: Arc<PaymentReconciler>,
    config: AppConfig,
}

impl Harness {
    pub fn new() -> Self {
        let config = AppConfig {
            reconcile: ReconcileConfig {
                settle_delay_secs: 0,
                max_retries: 2,
                retry_min_delay_ms: 1,
                retry_max_delay_ms: 2,
            },
            ..AppConfig::default()
        };

        let store = Arc::new(MemoryStore::default());
        let gateway = Arc::new(FakeGateway::default());
        let directory = Arc::new(FakeDirectory::default());
        let legs = Arc::new(FakeLegs::default());
        let ledger = Arc::new(FakeLedger::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let catalog = Arc::new(FakeCatalog);

        let services = Services::build(
            Collaborators {
                store: store.clone(),
                legs: legs.clone(),
                assets: catalog.clone(),
                insurances: catalog,
                directory: directory.clone(),
                ledger: ledger.clone(),
                gateway: gateway.clone(),
                notifier: notifier.clone(),
            },
            &config,
        )
        .unwrap();

        Self {
            store,
            gateway,
            directory,
            legs,
            ledger,
            notifier,
            orders: services.orders,
            reconciler: services.reconciler,
            config,
        }
    }

    pub fn reconcile_retries(&self) -> usize {
        self.config.reconcile.max_retries
    }
}
