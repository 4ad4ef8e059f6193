use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::Json as RespJson,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;

use crate::error::AppResult;
use crate::model::booking::{
    Booking, BookingDetail, BookingListResponse, BookingQuery, BookingRequest,
    CustomerBookingRequest, RejectRequest, StatusCount,
};
use crate::model::customer::{Role, Viewer};
use crate::model::price::{PriceBreakdown, PriceQuery};
use crate::routes::auth::{require_role, Admin};
use crate::services::orders::Ack;
use crate::services::reconcile::ReconcileOutcome;
use crate::services::Services;

pub fn order_router() -> Router {
    Router::new()
        .route("/api/orders", post(create_booking).get(list_bookings))
        .route("/api/orders/customer", post(create_customer_booking))
        .route("/api/orders/calculate-price", post(calculate_price))
        .route("/api/orders/calculate-price/customer", post(calculate_customer_price))
        .route("/api/orders/status/count", get(status_count))
        .route(
            "/api/orders/:id",
            get(get_booking).patch(update_booking).delete(delete_booking),
        )
        .route("/api/orders/:id/accept", post(accept_booking))
        .route("/api/orders/:id/reject", post(reject_booking))
        .route("/api/orders/pg/callback/invoice-paid", post(invoice_paid_callback))
        .route("/api/orders/pg/callback/payment", post(payment_callback))
}

// Booking dari admin, langsung accepted dan dibuatkan invoice
async fn create_booking(
    Admin(_): Admin,
    Extension(services): Extension<Services>,
    Json(payload): Json<BookingRequest>,
) -> AppResult<(StatusCode, RespJson<Booking>)> {
    let booking = services.orders.create_admin_booking(payload).await?;
    Ok((StatusCode::CREATED, RespJson(booking)))
}

// Booking dari form sewa customer, boleh tanpa login jika membawa new_customer
async fn create_customer_booking(
    viewer: Option<Viewer>,
    Extension(services): Extension<Services>,
    Json(payload): Json<CustomerBookingRequest>,
) -> AppResult<(StatusCode, RespJson<Booking>)> {
    let booking = services
        .orders
        .create_customer_booking(viewer, payload)
        .await?;
    Ok((StatusCode::CREATED, RespJson(booking)))
}

async fn calculate_price(
    viewer: Viewer,
    Extension(services): Extension<Services>,
    Json(payload): Json<PriceQuery>,
) -> AppResult<RespJson<PriceBreakdown>> {
    require_role(&viewer, &[Role::Admin, Role::Customer, Role::Owner])?;
    Ok(RespJson(services.orders.calculate_price(&payload).await?))
}

async fn calculate_customer_price(
    Extension(services): Extension<Services>,
    Json(payload): Json<PriceQuery>,
) -> AppResult<RespJson<PriceBreakdown>> {
    Ok(RespJson(services.orders.calculate_customer_price(&payload).await?))
}

async fn accept_booking(
    Admin(_): Admin,
    Extension(services): Extension<Services>,
    Path(id): Path<i64>,
    Json(payload): Json<BookingRequest>,
) -> AppResult<RespJson<Booking>> {
    Ok(RespJson(services.orders.accept(id, payload).await?))
}

async fn reject_booking(
    Admin(_): Admin,
    Extension(services): Extension<Services>,
    Path(id): Path<i64>,
    Json(payload): Json<RejectRequest>,
) -> AppResult<RespJson<Ack>> {
    Ok(RespJson(services.orders.reject(id, payload.reason).await?))
}

async fn list_bookings(
    viewer: Viewer,
    Extension(services): Extension<Services>,
    Query(query): Query<BookingQuery>,
) -> AppResult<RespJson<BookingListResponse>> {
    require_role(&viewer, &[Role::Admin, Role::Customer, Role::Owner])?;
    Ok(RespJson(services.orders.find_all(viewer, &query).await?))
}

async fn get_booking(
    viewer: Viewer,
    Extension(services): Extension<Services>,
    Path(id): Path<i64>,
) -> AppResult<RespJson<BookingDetail>> {
    require_role(&viewer, &[Role::Admin, Role::Customer, Role::Owner])?;
    Ok(RespJson(services.orders.find_one(viewer, id).await?))
}

async fn status_count(
    Admin(_): Admin,
    Extension(services): Extension<Services>,
) -> AppResult<RespJson<Vec<StatusCount>>> {
    Ok(RespJson(services.orders.status_counts().await?))
}

async fn update_booking(
    Admin(_): Admin,
    Extension(services): Extension<Services>,
    Path(id): Path<i64>,
    Json(payload): Json<BookingRequest>,
) -> AppResult<RespJson<Booking>> {
    Ok(RespJson(services.orders.update(id, payload, None).await?))
}

async fn delete_booking(
    Admin(_): Admin,
    Extension(services): Extension<Services>,
    Path(id): Path<i64>,
) -> AppResult<RespJson<Ack>> {
    Ok(RespJson(services.orders.remove(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceRef {
    pub id: Option<String>,
    pub number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoicePaid {
    pub invoice: Option<InvoiceRef>,
}

/// The gateway sends the event either bare or wrapped in `data`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InvoicePaidBody {
    Wrapped { data: InvoicePaid },
    Bare(InvoicePaid),
}

impl InvoicePaidBody {
    pub fn into_invoice(self) -> InvoiceRef {
        let event = match self {
            InvoicePaidBody::Wrapped { data } => data,
            InvoicePaidBody::Bare(event) => event,
        };
        event.invoice.unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentEvent {
    pub transaction_id: Option<String>,
}

async fn invoice_paid_callback(
    Extension(services): Extension<Services>,
    Json(payload): Json<InvoicePaidBody>,
) -> AppResult<RespJson<ReconcileOutcome>> {
    let invoice = payload.into_invoice();
    info!(external_id = ?invoice.id, invoice_number = ?invoice.number, "invoice callback received");

    let outcome = services
        .reconciler
        .reconcile(invoice.id.as_deref(), invoice.number.as_deref())
        .await?;
    Ok(RespJson(outcome))
}

async fn payment_callback(
    Extension(services): Extension<Services>,
    Json(payload): Json<PaymentEvent>,
) -> AppResult<RespJson<ReconcileOutcome>> {
    info!(transaction_id = ?payload.transaction_id, "payment callback received");

    let outcome = services
        .reconciler
        .reconcile(payload.transaction_id.as_deref(), None)
        .await?;
    Ok(RespJson(outcome))
}
