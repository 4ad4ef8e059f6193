use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, Row};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::model::booking::{
    ApprovalStatus, Booking, BookingListItem, BookingQuery, BookingWindow, NewBooking,
    PaymentStatus, SortColumn, SortDirection, StatusBucket, StatusChange, StatusLog,
};
use crate::model::customer::Scope;
use crate::model::leg::{LegDirection, LegInput, LegLog, LegRequest};
use crate::model::price::AdditionalService;
use crate::services::collaborators::LegRequests;
use crate::store::{BookingRecord, BookingStore};

const PICKUP_JOIN: &str = "LEFT JOIN leg_requests p \
     ON p.booking_id = b.id AND p.type = 'pick_up' AND p.deleted_at IS NULL";

const BOOKING_COLUMNS: &str = "b.id, b.invoice_number, b.description, b.customer_id, b.fleet_id, \
     b.insurance_id, b.start_date, b.duration, b.status, b.payment_status, b.rent_price, \
     b.service_price, b.insurance_price, b.driver_price, b.out_of_town_price, b.weekend_price, \
     b.additional_services, b.sub_total_price, b.discount, b.total_tax, b.total_price, \
     b.external_id, b.payment_link, b.payment_pdf_url, b.created_at, b.updated_at";

const SERIALIZATION_FAILURE: &str = "40001";

// Parameter untuk query dinamis (list), di-bind sesuai urutan placeholder
enum Param {
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [Param],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Param::Int(v) => query.bind(*v),
            Param::Text(v) => query.bind(v.as_str()),
            Param::Time(v) => query.bind(*v),
        };
    }
    query
}

fn parse_column<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> AppResult<T> {
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(AppError::Internal)
}

fn booking_from_row(row: &PgRow) -> AppResult<Booking> {
    let Json(additional_services): Json<Vec<AdditionalService>> = row.try_get("additional_services")?;

    Ok(Booking {
        id: row.try_get("id")?,
        invoice_number: row.try_get("invoice_number")?,
        description: row.try_get("description")?,
        customer_id: row.try_get("customer_id")?,
        asset_id: row.try_get("fleet_id")?,
        insurance_id: row.try_get("insurance_id")?,
        start_date: row.try_get("start_date")?,
        duration: row.try_get("duration")?,
        status: parse_column(row, "status")?,
        payment_status: parse_column(row, "payment_status")?,
        rent_price: row.try_get("rent_price")?,
        service_price: row.try_get("service_price")?,
        insurance_price: row.try_get("insurance_price")?,
        driver_price: row.try_get("driver_price")?,
        out_of_town_price: row.try_get("out_of_town_price")?,
        weekend_price: row.try_get("weekend_price")?,
        additional_services,
        sub_total_price: row.try_get("sub_total_price")?,
        discount: row.try_get("discount")?,
        total_tax: row.try_get("total_tax")?,
        total_price: row.try_get("total_price")?,
        external_id: row.try_get("external_id")?,
        payment_link: row.try_get("payment_link")?,
        payment_pdf_url: row.try_get("payment_pdf_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn leg_from_row(row: &PgRow) -> AppResult<LegRequest> {
    Ok(LegRequest {
        id: row.try_get("id")?,
        booking_id: row.try_get("booking_id")?,
        direction: parse_column(row, "type")?,
        is_self_pickup: row.try_get("is_self_pickup")?,
        address: row.try_get("address")?,
        distance: row.try_get("distance")?,
        driver_id: row.try_get("driver_id")?,
        status: parse_column(row, "status")?,
    })
}

fn status_log_from_row(row: &PgRow) -> AppResult<StatusLog> {
    Ok(StatusLog {
        id: row.try_get("id")?,
        booking_id: row.try_get("booking_id")?,
        status: parse_column(row, "status")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

/// SQL predicate selecting one dashboard bucket. Expects the pickup leg joined as `p`.
fn bucket_clause(bucket: StatusBucket) -> &'static str {
    match bucket {
        StatusBucket::Pending => "b.status = 'pending'",
        StatusBucket::OnProgress => {
            "b.status = 'accepted' AND (p.status IS NULL OR p.status <> 'done')"
        }
        StatusBucket::Done => "b.status = 'accepted' AND p.status = 'done'",
    }
}

/// Serialization failures mean a concurrent writer won; the caller may resubmit.
fn classify_write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some(SERIALIZATION_FAILURE) {
            warn!(error = %db, "serializable booking write aborted");
            return AppError::asset_unavailable();
        }
    }
    AppError::Database(e)
}

async fn count_overlapping_on(conn: &mut PgConnection, window: &BookingWindow) -> AppResult<i64> {
    let sql = format!(
        "SELECT COUNT(*) AS total FROM bookings b {}
         WHERE b.fleet_id = $1
           AND b.deleted_at IS NULL
           AND b.status <> 'rejected'
           AND (p.status IS NULL OR p.status <> 'done')
           AND b.start_date < $3
           AND b.start_date + make_interval(days => b.duration) > $2
           AND ($4::BIGINT IS NULL OR b.id <> $4)",
        PICKUP_JOIN
    );

    let row = sqlx::query(&sql)
        .bind(window.asset_id)
        .bind(window.start)
        .bind(window.end)
        .bind(window.exclude_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(row.try_get("total")?)
}

async fn append_status_log(
    conn: &mut PgConnection,
    booking_id: i64,
    change: &StatusChange,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO booking_status_logs (booking_id, status, description, created_at)
         VALUES ($1, $2, $3, NOW())",
    )
    .bind(booking_id)
    .bind(change.status.as_str())
    .bind(change.reason.as_deref())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_leg(
    conn: &mut PgConnection,
    booking_id: i64,
    direction: LegDirection,
    input: &LegInput,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO leg_requests
            (booking_id, type, is_self_pickup, address, distance, driver_id, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, 'pending', NOW(), NOW())",
    )
    .bind(booking_id)
    .bind(direction.as_str())
    .bind(input.is_self_pickup)
    .bind(input.address.as_deref())
    .bind(input.distance)
    .bind(input.driver_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_tx(&self, new: &NewBooking) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        if count_overlapping_on(&mut *tx, &new.window()).await? > 0 {
            return Err(AppError::asset_unavailable());
        }

        let sql = format!(
            "INSERT INTO bookings
                (invoice_number, description, customer_id, fleet_id, insurance_id, start_date,
                 duration, status, payment_status, rent_price, service_price, insurance_price,
                 driver_price, out_of_town_price, weekend_price, additional_services,
                 sub_total_price, discount, total_tax, total_price, external_id, payment_link,
                 payment_pdf_url, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10, $11, $12, $13, $14, $15,
                     $16, $17, $18, $19, $20, $21, $22, NOW(), NOW())
             RETURNING {}",
            BOOKING_COLUMNS.replace("b.", "")
        );

        let row = sqlx::query(&sql)
            .bind(&new.invoice_number)
            .bind(new.description.as_deref())
            .bind(new.customer_id)
            .bind(new.asset_id)
            .bind(new.insurance_id)
            .bind(new.start_date)
            .bind(new.duration)
            .bind(new.status.as_str())
            .bind(new.rent_price)
            .bind(new.service_price)
            .bind(new.insurance_price)
            .bind(new.driver_price)
            .bind(new.out_of_town_price)
            .bind(new.weekend_price)
            .bind(Json(&new.additional_services))
            .bind(new.sub_total_price)
            .bind(new.discount)
            .bind(new.total_tax)
            .bind(new.total_price)
            .bind(new.external_id.as_deref())
            .bind(new.payment_link.as_deref())
            .bind(new.payment_pdf_url.as_deref())
            .fetch_one(&mut *tx)
            .await?;
        let booking = booking_from_row(&row)?;

        insert_leg(&mut *tx, booking.id, LegDirection::Delivery, &new.delivery).await?;
        insert_leg(&mut *tx, booking.id, LegDirection::PickUp, &new.pickup).await?;

        let initial = StatusChange {
            status: new.status,
            reason: None,
        };
        append_status_log(&mut *tx, booking.id, &initial).await?;

        tx.commit().await?;
        Ok(booking)
    }

    async fn save_tx(&self, booking: &Booking, change: Option<&StatusChange>) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        // Kunci baris dulu supaya reject yang jalan bersamaan tidak tertimpa
        let stored: Option<String> = sqlx::query_scalar(
            "SELECT status FROM bookings WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(booking.id)
        .fetch_optional(&mut *tx)
        .await?;
        let stored: ApprovalStatus = stored
            .ok_or_else(|| AppError::not_found("Order not found."))?
            .parse()
            .map_err(AppError::Internal)?;

        let status = match change {
            Some(change) if !stored.can_transition_to(change.status) => {
                debug!(booking_id = booking.id, from = stored.as_str(), "status moved concurrently");
                return Err(AppError::conflict("Order already accepted/rejected."));
            }
            Some(change) => change.status,
            None => stored,
        };

        let window = BookingWindow::new(
            booking.asset_id,
            booking.start_date,
            booking.duration,
            Some(booking.id),
        );
        if count_overlapping_on(&mut *tx, &window).await? > 0 {
            return Err(AppError::asset_unavailable());
        }

        // payment_status hanya diubah lewat set_payment_status
        sqlx::query(
            "UPDATE bookings SET
                description = $2, customer_id = $3, fleet_id = $4, insurance_id = $5,
                start_date = $6, duration = $7, status = $8,
                rent_price = $9, service_price = $10, insurance_price = $11, driver_price = $12,
                out_of_town_price = $13, weekend_price = $14, additional_services = $15,
                sub_total_price = $16, discount = $17, total_tax = $18, total_price = $19,
                external_id = $20, payment_link = $21, payment_pdf_url = $22, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(booking.id)
        .bind(booking.description.as_deref())
        .bind(booking.customer_id)
        .bind(booking.asset_id)
        .bind(booking.insurance_id)
        .bind(booking.start_date)
        .bind(booking.duration)
        .bind(status.as_str())
        .bind(booking.rent_price)
        .bind(booking.service_price)
        .bind(booking.insurance_price)
        .bind(booking.driver_price)
        .bind(booking.out_of_town_price)
        .bind(booking.weekend_price)
        .bind(Json(&booking.additional_services))
        .bind(booking.sub_total_price)
        .bind(booking.discount)
        .bind(booking.total_tax)
        .bind(booking.total_price)
        .bind(booking.external_id.as_deref())
        .bind(booking.payment_link.as_deref())
        .bind(booking.payment_pdf_url.as_deref())
        .execute(&mut *tx)
        .await?;

        if let Some(change) = change {
            append_status_log(&mut *tx, booking.id, change).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn count_overlapping(&self, window: &BookingWindow) -> AppResult<i64> {
        let mut conn = self.pool.acquire().await?;
        count_overlapping_on(&mut conn, window).await
    }

    async fn insert(&self, new: NewBooking) -> AppResult<Booking> {
        match self.insert_tx(&new).await {
            Err(AppError::Database(e)) => Err(classify_write_error(e)),
            other => other,
        }
    }

    async fn find(&self, id: i64, scope: Scope) -> AppResult<Option<BookingRecord>> {
        let (scope_clause, scope_id) = match scope {
            Scope::All => ("", None),
            Scope::Customer(cid) => (" AND b.customer_id = $2", Some(cid)),
            Scope::Owner(oid) => (" AND f.owner_id = $2", Some(oid)),
        };

        let sql = format!(
            "SELECT {}, u.name AS customer_name
             FROM bookings b
             LEFT JOIN users u ON u.id = b.customer_id
             LEFT JOIN fleets f ON f.id = b.fleet_id
             WHERE b.id = $1 AND b.deleted_at IS NULL{}",
            BOOKING_COLUMNS, scope_clause
        );

        let mut query = sqlx::query(&sql).bind(id);
        if let Some(scope_id) = scope_id {
            query = query.bind(scope_id);
        }

        let Some(row) = query.fetch_optional(&self.pool).await? else {
            return Ok(None);
        };
        let booking = booking_from_row(&row)?;
        let customer_name: Option<String> = row.try_get("customer_name")?;

        let leg_rows = sqlx::query(
            "SELECT id, booking_id, type, is_self_pickup, address, distance, driver_id, status
             FROM leg_requests WHERE booking_id = $1 AND deleted_at IS NULL ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut legs = Vec::with_capacity(leg_rows.len());
        for leg_row in &leg_rows {
            let leg = leg_from_row(leg_row)?;
            let log_rows = sqlx::query(
                "SELECT type, created_at FROM leg_logs
                 WHERE leg_request_id = $1 ORDER BY created_at ASC",
            )
            .bind(leg.id)
            .fetch_all(&self.pool)
            .await?;

            let logs = log_rows
                .iter()
                .map(|r| {
                    Ok(LegLog {
                        kind: parse_column(r, "type")?,
                        created_at: r.try_get("created_at")?,
                    })
                })
                .collect::<AppResult<Vec<_>>>()?;
            legs.push((leg, logs));
        }

        let status_logs = sqlx::query(
            "SELECT id, booking_id, status, description, created_at
             FROM booking_status_logs WHERE booking_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(status_log_from_row)
        .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(BookingRecord {
            booking,
            customer_name,
            legs,
            status_logs,
        }))
    }

    async fn find_by_invoice(
        &self,
        external_id: &str,
        invoice_number: Option<&str>,
    ) -> AppResult<Option<Booking>> {
        let (column, key) = match invoice_number {
            Some(number) => ("invoice_number", number),
            None => ("external_id", external_id),
        };
        let sql = format!(
            "SELECT {} FROM bookings b WHERE b.{} = $1 AND b.deleted_at IS NULL",
            BOOKING_COLUMNS, column
        );

        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await?;
        row.as_ref().map(booking_from_row).transpose()
    }

    async fn save(&self, booking: &Booking, change: Option<StatusChange>) -> AppResult<()> {
        match self.save_tx(booking, change.as_ref()).await {
            Err(AppError::Database(e)) => Err(classify_write_error(e)),
            other => other,
        }
    }

    async fn transition(&self, id: i64, from: ApprovalStatus, change: StatusChange) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE bookings SET status = $2, updated_at = NOW()
             WHERE id = $1 AND status = $3 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(change.status.as_str())
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            debug!(booking_id = id, from = from.as_str(), "status moved concurrently");
            return Err(AppError::conflict(format!(
                "Order status is no longer {}.",
                from.as_str()
            )));
        }

        append_status_log(&mut *tx, id, &change).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_payment_status(
        &self,
        id: i64,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE bookings SET payment_status = $3, updated_at = NOW()
             WHERE id = $1 AND payment_status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE bookings SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Order not found."));
        }
        Ok(())
    }

    async fn list(&self, query: &BookingQuery, scope: Scope) -> AppResult<(Vec<BookingListItem>, i64)> {
        let mut where_clauses = vec!["b.deleted_at IS NULL".to_string()];
        let mut params = Vec::new();

        match scope {
            Scope::All => {}
            Scope::Customer(id) => {
                params.push(Param::Int(id));
                where_clauses.push(format!("b.customer_id = ${}", params.len()));
            }
            Scope::Owner(id) => {
                params.push(Param::Int(id));
                where_clauses.push(format!("f.owner_id = ${}", params.len()));
            }
        }

        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            params.push(Param::Text(format!("%{}%", q)));
            let n = params.len();
            where_clauses.push(format!("(u.name ILIKE ${n} OR f.name ILIKE ${n})"));
        }

        if let Some(bucket) = query.status {
            where_clauses.push(bucket_clause(bucket).to_string());
        }

        if let Some(from) = query.start_date {
            params.push(Param::Time(from));
            where_clauses.push(format!("b.start_date >= ${}", params.len()));
        }

        if let Some(until) = query.end_date {
            params.push(Param::Time(until));
            where_clauses.push(format!("b.start_date <= ${}", params.len()));
        }

        let from_clause = format!(
            "FROM bookings b
             LEFT JOIN users u ON u.id = b.customer_id
             LEFT JOIN fleets f ON f.id = b.fleet_id
             {}
             WHERE {}",
            PICKUP_JOIN,
            where_clauses.join(" AND ")
        );

        // Count total records
        let count_sql = format!("SELECT COUNT(*) AS total {}", from_clause);
        let total: i64 = bind_params(sqlx::query(&count_sql), &params)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let column = query.order_column.unwrap_or(SortColumn::CreatedAt).column();
        let direction = query.order_by.unwrap_or(SortDirection::Desc).keyword();
        let fetch_sql = format!(
            "SELECT {}, u.name AS customer_name, f.name AS fleet_name {}
             ORDER BY {} {}, b.id DESC LIMIT ${} OFFSET ${}",
            BOOKING_COLUMNS,
            from_clause,
            column,
            direction,
            params.len() + 1,
            params.len() + 2
        );

        let rows = bind_params(sqlx::query(&fetch_sql), &params)
            .bind(query.limit())
            .bind(query.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(|row| {
                Ok(BookingListItem {
                    booking: booking_from_row(row)?,
                    customer_name: row.try_get("customer_name")?,
                    fleet_name: row.try_get("fleet_name")?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok((items, total))
    }

    async fn count_bucket(&self, bucket: StatusBucket) -> AppResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS total FROM bookings b {} WHERE b.deleted_at IS NULL AND {}",
            PICKUP_JOIN,
            bucket_clause(bucket)
        );
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.try_get("total")?)
    }
}

pub struct PgLegRequests {
    pool: PgPool,
}

impl PgLegRequests {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LegRequests for PgLegRequests {
    async fn update_leg(&self, id: i64, input: &LegInput) -> AppResult<()> {
        sqlx::query(
            "UPDATE leg_requests SET
                is_self_pickup = $2, address = $3, distance = $4, driver_id = $5, updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(input.is_self_pickup)
        .bind(input.address.as_deref())
        .bind(input.distance)
        .bind(input.driver_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_by_booking(&self, booking_id: i64) -> AppResult<()> {
        sqlx::query(
            "UPDATE leg_requests SET deleted_at = NOW() WHERE booking_id = $1 AND deleted_at IS NULL",
        )
        .bind(booking_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
