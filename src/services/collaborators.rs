//! Contracts of the systems the booking engine leans on but does not own.

use async_trait::async_trait;

use crate::error::AppResult;
use crate::model::booking::Booking;
use crate::model::customer::{Customer, NewCustomer, Role};
use crate::model::fleet::{Asset, Insurance};
use crate::model::leg::LegInput;

#[async_trait]
pub trait AssetCatalog: Send + Sync {
    /// Fails with NotFound when the asset does not exist.
    async fn find_asset(&self, id: i64) -> AppResult<Asset>;
}

#[async_trait]
pub trait InsuranceCatalog: Send + Sync {
    async fn find_insurance(&self, id: i64) -> AppResult<Insurance>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn find_customer(&self, id: i64) -> AppResult<Customer>;

    async fn has_role(&self, id: i64, role: Role) -> AppResult<bool>;

    async fn is_verified(&self, id: i64) -> AppResult<bool>;

    async fn create_customer(&self, new: &NewCustomer) -> AppResult<Customer>;

    /// Returns the customer with its gateway counterpart, creating it when absent.
    async fn ensure_billing_profile(&self, customer_id: i64) -> AppResult<Customer>;

    /// Pushes local customer data to the existing gateway counterpart.
    async fn repair_billing_profile(&self, customer: &Customer) -> AppResult<()>;
}

#[async_trait]
pub trait LegRequests: Send + Sync {
    async fn update_leg(&self, id: i64, input: &LegInput) -> AppResult<()>;

    async fn remove_by_booking(&self, booking_id: i64) -> AppResult<()>;
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn record_for_booking(&self, booking: &Booking, asset: &Asset) -> AppResult<()>;

    async fn update_for_booking(&self, booking: &Booking, asset: &Asset) -> AppResult<()>;

    async fn remove_for_booking(&self, booking_id: i64) -> AppResult<()>;
}
