use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::model::customer::NewCustomer;
use crate::model::fleet::Asset;
use crate::model::leg::{LegInput, LegStatus, LegView};
use crate::model::price::{AdditionalService, PriceQuery};

/// Longest rental a single booking may cover.
pub const MAX_RENTAL_DAYS: i32 = 365;

pub fn validate_duration(duration: i32) -> AppResult<()> {
    if !(1..=MAX_RENTAL_DAYS).contains(&duration) {
        return Err(AppError::invalid(format!(
            "Duration must be between 1 and {} days.",
            MAX_RENTAL_DAYS
        )));
    }
    Ok(())
}

// Tanggal akhir sewa, mentok di batas chrono kalau kelewatan
fn rental_end(start: DateTime<Utc>, duration: i32) -> DateTime<Utc> {
    start
        .checked_add_signed(Duration::days(i64::from(duration)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Accepted => "accepted",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    /// Accepted and rejected are final.
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        matches!(
            (self, next),
            (ApprovalStatus::Pending, ApprovalStatus::Accepted)
                | (ApprovalStatus::Pending, ApprovalStatus::Rejected)
        )
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "accepted" => Ok(ApprovalStatus::Accepted),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(format!("unknown approval status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    PartiallyPaid,
    Done,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::PartiallyPaid => "partially_paid",
            PaymentStatus::Done => "done",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Settled payments never move again; every other state follows the gateway.
    pub fn can_settle_to(&self, next: PaymentStatus) -> bool {
        *self != PaymentStatus::Done && *self != next
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "partially_paid" => Ok(PaymentStatus::PartiallyPaid),
            "done" => Ok(PaymentStatus::Done),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Coarse dashboard bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBucket {
    Pending,
    OnProgress,
    Done,
}

impl StatusBucket {
    pub const ALL: [StatusBucket; 3] = [StatusBucket::Pending, StatusBucket::OnProgress, StatusBucket::Done];

    /// Bucket of a booking given its pickup leg; rejected bookings have none.
    pub fn of(status: ApprovalStatus, pickup: Option<LegStatus>) -> Option<StatusBucket> {
        match (status, pickup) {
            (ApprovalStatus::Pending, _) => Some(StatusBucket::Pending),
            (ApprovalStatus::Accepted, Some(LegStatus::Done)) => Some(StatusBucket::Done),
            (ApprovalStatus::Accepted, _) => Some(StatusBucket::OnProgress),
            (ApprovalStatus::Rejected, _) => None,
        }
    }
}

// Model utama untuk booking (sesuai dengan tabel bookings)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub invoice_number: String,
    pub description: Option<String>,
    pub customer_id: i64,
    #[serde(rename = "fleet_id")]
    pub asset_id: i64,
    pub insurance_id: Option<i64>,
    pub start_date: DateTime<Utc>,
    /// Whole days.
    pub duration: i32,
    pub status: ApprovalStatus,
    pub payment_status: PaymentStatus,

    // Snapshot harga saat booking disimpan
    pub rent_price: Decimal,
    pub service_price: Decimal,
    pub insurance_price: Decimal,
    pub driver_price: Decimal,
    pub out_of_town_price: Decimal,
    pub weekend_price: Decimal,
    pub additional_services: Vec<AdditionalService>,
    pub sub_total_price: Decimal,
    /// Percentage.
    pub discount: Decimal,
    pub total_tax: Decimal,
    pub total_price: Decimal,

    // Data payment gateway
    pub external_id: Option<String>,
    pub payment_link: Option<String>,
    pub payment_pdf_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Exclusive end of the occupied interval.
    pub fn end_date(&self) -> DateTime<Utc> {
        rental_end(self.start_date, self.duration)
    }
}

/// Append-only audit row for approval transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusLog {
    pub id: i64,
    pub booking_id: i64,
    pub status: ApprovalStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: ApprovalStatus,
    pub reason: Option<String>,
}

/// Candidate occupation of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingWindow {
    pub asset_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub exclude_id: Option<i64>,
}

impl BookingWindow {
    pub fn new(asset_id: i64, start: DateTime<Utc>, duration: i32, exclude_id: Option<i64>) -> Self {
        Self {
            asset_id,
            start,
            end: rental_end(start, duration),
            exclude_id,
        }
    }

    /// Half-open intersection.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

/// Everything needed to persist a fresh booking with its legs.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub invoice_number: String,
    pub description: Option<String>,
    pub customer_id: i64,
    pub asset_id: i64,
    pub insurance_id: Option<i64>,
    pub start_date: DateTime<Utc>,
    pub duration: i32,
    pub status: ApprovalStatus,
    pub rent_price: Decimal,
    pub service_price: Decimal,
    pub insurance_price: Decimal,
    pub driver_price: Decimal,
    pub out_of_town_price: Decimal,
    pub weekend_price: Decimal,
    pub additional_services: Vec<AdditionalService>,
    pub sub_total_price: Decimal,
    pub discount: Decimal,
    pub total_tax: Decimal,
    pub total_price: Decimal,
    pub external_id: Option<String>,
    pub payment_link: Option<String>,
    pub payment_pdf_url: Option<String>,
    pub delivery: LegInput,
    pub pickup: LegInput,
}

impl NewBooking {
    pub fn window(&self) -> BookingWindow {
        BookingWindow::new(self.asset_id, self.start_date, self.duration, None)
    }
}

// Field booking yang sama untuk admin dan customer
#[derive(Debug, Clone, Deserialize)]
pub struct BookingFields {
    #[serde(alias = "fleet_id")]
    pub asset_id: i64,
    pub insurance_id: Option<i64>,
    pub date: DateTime<Utc>,
    pub duration: i32,
    #[serde(default)]
    pub is_with_driver: bool,
    #[serde(default)]
    pub is_out_of_town: bool,
    #[serde(default)]
    pub additional_services: Vec<AdditionalService>,
    pub discount: Option<Decimal>,
    pub service_price: Option<Decimal>,
    pub description: Option<String>,
    pub start_request: LegInput,
    pub end_request: LegInput,
}

impl BookingFields {
    /// Request-only checks, run before anything touches storage.
    pub fn validate(&self) -> AppResult<()> {
        validate_duration(self.duration)?;
        self.start_request.validate()?;
        self.end_request.validate()
    }

    pub fn price_query(&self) -> PriceQuery {
        PriceQuery {
            asset_id: self.asset_id,
            insurance_id: self.insurance_id.filter(|id| *id != 0),
            date: Some(self.date),
            duration: Some(self.duration),
            is_with_driver: self.is_with_driver,
            is_out_of_town: self.is_out_of_town,
            additional_services: self.additional_services.clone(),
            discount: self.discount,
            service_price: self.service_price,
        }
    }

    pub fn driver_ids(&self) -> Vec<i64> {
        [self.start_request.driver_id, self.end_request.driver_id]
            .into_iter()
            .flatten()
            .collect()
    }
}

// Request admin untuk create / update / accept
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub customer_id: i64,
    #[serde(flatten)]
    pub fields: BookingFields,
}

// Request customer dari form sewa
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerBookingRequest {
    pub new_customer: Option<NewCustomer>,
    #[serde(flatten)]
    pub fields: BookingFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

/// Full booking as returned by the detail endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BookingDetail {
    #[serde(flatten)]
    pub booking: Booking,
    pub end_date: DateTime<Utc>,
    pub customer_name: Option<String>,
    #[serde(rename = "fleet")]
    pub asset: Option<Asset>,
    pub start_request: Option<LegView>,
    pub end_request: Option<LegView>,
    pub status_logs: Vec<StatusLog>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Id,
    StartDate,
    Duration,
    TotalPrice,
    Status,
    PaymentStatus,
    CreatedAt,
}

impl SortColumn {
    pub fn column(&self) -> &'static str {
        match self {
            SortColumn::Id => "b.id",
            SortColumn::StartDate => "b.start_date",
            SortColumn::Duration => "b.duration",
            SortColumn::TotalPrice => "b.total_price",
            SortColumn::Status => "b.status",
            SortColumn::PaymentStatus => "b.payment_status",
            SortColumn::CreatedAt => "b.created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingQuery {
    pub q: Option<String>,
    pub status: Option<StatusBucket>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub order_column: Option<SortColumn>,
    pub order_by: Option<SortDirection>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl BookingQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingListItem {
    #[serde(flatten)]
    pub booking: Booking,
    pub customer_name: Option<String>,
    pub fleet_name: Option<String>,
}

// List response dengan pagination
#[derive(Debug, Serialize)]
pub struct BookingListResponse {
    pub data: Vec<BookingListItem>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: StatusBucket,
    pub count: i64,
}
