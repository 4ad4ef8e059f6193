//! Booking persistence.

pub mod catalog;
pub mod postgres;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::model::booking::{
    ApprovalStatus, Booking, BookingListItem, BookingQuery, BookingWindow, NewBooking,
    PaymentStatus, StatusBucket, StatusChange, StatusLog,
};
use crate::model::customer::Scope;
use crate::model::leg::{LegLog, LegRequest};

/// A booking with everything it owns, as loaded from storage.
#[derive(Debug, Clone)]
pub struct BookingRecord {
    pub booking: Booking,
    pub customer_name: Option<String>,
    pub legs: Vec<(LegRequest, Vec<LegLog>)>,
    pub status_logs: Vec<StatusLog>,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Bookings still holding the window's asset over an overlapping interval.
    async fn count_overlapping(&self, window: &BookingWindow) -> AppResult<i64>;

    /// Persists the booking, both legs and the initial status log atomically.
    ///
    /// The overlap rule is re-checked inside the same serializable unit and a
    /// clash fails with Conflict.
    async fn insert(&self, new: NewBooking) -> AppResult<Booking>;

    async fn find(&self, id: i64, scope: Scope) -> AppResult<Option<BookingRecord>>;

    /// Looks up by invoice number when given, otherwise by gateway id.
    async fn find_by_invoice(
        &self,
        external_id: &str,
        invoice_number: Option<&str>,
    ) -> AppResult<Option<Booking>>;

    /// Overwrites the booking row, optionally appending a status log in the
    /// same unit. The overlap rule is re-checked excluding the booking itself.
    ///
    /// Approval status only moves through `change`, and only when the stored
    /// status still allows it; otherwise Conflict. Payment status is left alone.
    async fn save(&self, booking: &Booking, change: Option<StatusChange>) -> AppResult<()>;

    /// Moves approval status from `from` to `change.status` and appends the log.
    /// Fails with Conflict when the stored status is no longer `from`.
    async fn transition(&self, id: i64, from: ApprovalStatus, change: StatusChange) -> AppResult<()>;

    /// Compare-and-set on payment status. Returns false when the stored status
    /// was no longer `from`, i.e. another writer got there first.
    async fn set_payment_status(&self, id: i64, from: PaymentStatus, to: PaymentStatus)
        -> AppResult<bool>;

    async fn soft_delete(&self, id: i64) -> AppResult<()>;

    async fn list(&self, query: &BookingQuery, scope: Scope) -> AppResult<(Vec<BookingListItem>, i64)>;

    async fn count_bucket(&self, bucket: StatusBucket) -> AppResult<i64>;
}
