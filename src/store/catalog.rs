//! Postgres-backed collaborators: fleet/insurance catalog, customer
//! directory and ledger.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::model::booking::Booking;
use crate::model::customer::{Customer, NewCustomer, Role};
use crate::model::fleet::{Asset, Insurance};
use crate::services::collaborators::{
    AssetCatalog, CustomerDirectory, InsuranceCatalog, Ledger,
};
use crate::services::gateway::PaymentGateway;

const UNIQUE_VIOLATION: &str = "23505";

fn customer_from_row(row: &PgRow) -> AppResult<Customer> {
    Ok(Customer {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone_number: row.try_get("phone_number")?,
        billing_id: row.try_get("billing_id")?,
        billing_number: row.try_get("billing_number")?,
    })
}

pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetCatalog for PgCatalog {
    async fn find_asset(&self, id: i64) -> AppResult<Asset> {
        let row = sqlx::query(
            "SELECT id, name, type, price, owner_id FROM fleets WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Fleet not found."))?;

        let kind: String = row.try_get("type")?;
        Ok(Asset {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            kind: kind.parse().map_err(AppError::Internal)?,
            daily_rate: row.try_get("price")?,
            owner_id: row.try_get("owner_id")?,
        })
    }
}

#[async_trait]
impl InsuranceCatalog for PgCatalog {
    async fn find_insurance(&self, id: i64) -> AppResult<Insurance> {
        let row = sqlx::query("SELECT id, name, price FROM insurances WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Insurance not found."))?;

        Ok(Insurance {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
        })
    }
}

/// Users table plus the gateway partner each customer is billed as.
pub struct PgDirectory {
    pool: PgPool,
    gateway: Arc<dyn PaymentGateway>,
}

impl PgDirectory {
    pub fn new(pool: PgPool, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { pool, gateway }
    }
}

#[async_trait]
impl CustomerDirectory for PgDirectory {
    async fn find_customer(&self, id: i64) -> AppResult<Customer> {
        let row = sqlx::query(
            "SELECT id, name, email, phone_number, billing_id, billing_number
             FROM users WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Customer not found."))?;

        customer_from_row(&row)
    }

    async fn has_role(&self, id: i64, role: Role) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND role = $2 AND deleted_at IS NULL) AS found",
        )
        .bind(id)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("found")?)
    }

    async fn is_verified(&self, id: i64) -> AppResult<bool> {
        let row = sqlx::query("SELECT is_verified FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get("is_verified")?),
            None => Ok(false),
        }
    }

    async fn create_customer(&self, new: &NewCustomer) -> AppResult<Customer> {
        let result = sqlx::query(
            "INSERT INTO users
                (name, email, phone_number, emergency_phone_number, id_cards, role, is_verified, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, 'customer', FALSE, NOW(), NOW())
             RETURNING id, name, email, phone_number, billing_id, billing_number",
        )
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.phone_number)
        .bind(new.emergency_phone_number.as_deref())
        .bind(Json(&new.id_cards))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => {
                let customer = customer_from_row(&row)?;
                info!(customer_id = customer.id, "customer registered from booking form");
                Ok(customer)
            }
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(AppError::conflict("Email already registered."))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_billing_profile(&self, customer_id: i64) -> AppResult<Customer> {
        let customer = self.find_customer(customer_id).await?;
        if customer.billing_id.is_some() {
            return Ok(customer);
        }

        let profile = self.gateway.create_partner(&customer).await?;
        sqlx::query(
            "UPDATE users SET billing_id = $2, billing_number = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(customer_id)
        .bind(&profile.id)
        .bind(&profile.number)
        .execute(&self.pool)
        .await?;

        info!(customer_id, billing_id = %profile.id, "billing profile created");
        Ok(Customer {
            billing_id: Some(profile.id),
            billing_number: Some(profile.number),
            ..customer
        })
    }

    async fn repair_billing_profile(&self, customer: &Customer) -> AppResult<()> {
        self.gateway.update_partner(customer).await?;
        Ok(())
    }
}

// Ledger pemasukan per booking
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, booking: &Booking, asset: &Asset) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO ledgers (booking_id, fleet_id, owner_id, amount, payment_status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
             ON CONFLICT (booking_id) DO UPDATE SET
                fleet_id = EXCLUDED.fleet_id,
                owner_id = EXCLUDED.owner_id,
                amount = EXCLUDED.amount,
                payment_status = EXCLUDED.payment_status,
                deleted_at = NULL,
                updated_at = NOW()",
        )
        .bind(booking.id)
        .bind(asset.id)
        .bind(asset.owner_id)
        .bind(booking.total_price)
        .bind(booking.payment_status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn record_for_booking(&self, booking: &Booking, asset: &Asset) -> AppResult<()> {
        self.upsert(booking, asset).await
    }

    async fn update_for_booking(&self, booking: &Booking, asset: &Asset) -> AppResult<()> {
        self.upsert(booking, asset).await
    }

    async fn remove_for_booking(&self, booking_id: i64) -> AppResult<()> {
        sqlx::query("UPDATE ledgers SET deleted_at = NOW() WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
