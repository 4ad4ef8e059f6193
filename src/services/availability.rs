//! Asset double-booking guard.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::model::booking::BookingWindow;
use crate::store::BookingStore;

pub struct AvailabilityValidator {
    store: Arc<dyn BookingStore>,
    tz: Tz,
}

impl AvailabilityValidator {
    pub fn new(store: Arc<dyn BookingStore>, tz: Tz) -> Self {
        Self { store, tz }
    }

    pub async fn check(&self, window: &BookingWindow) -> AppResult<()> {
        let today = Utc::now().with_timezone(&self.tz).date_naive();
        self.check_on(window, today).await
    }

    /// Same as [`check`](Self::check) with "today" supplied by the caller.
    pub async fn check_on(&self, window: &BookingWindow, today: NaiveDate) -> AppResult<()> {
        let clashes = self.store.count_overlapping(window).await?;
        if clashes > 0 {
            debug!(asset_id = window.asset_id, clashes, "asset already booked");
            return Err(AppError::asset_unavailable());
        }

        // Existing bookings may keep a start date that is already behind us
        if window.exclude_id.is_none() {
            let start_day = window.start.with_timezone(&self.tz).date_naive();
            if start_day < today {
                return Err(AppError::invalid(
                    "Tidak bisa memesan armada di hari yang sudah lewat.",
                ));
            }
        }

        Ok(())
    }
}
