use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::fleet::{Asset, Insurance};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalService {
    pub name: String,
    pub price: Decimal,
}

// Input kalkulasi harga
#[derive(Debug, Clone, Deserialize)]
pub struct PriceQuery {
    #[serde(alias = "fleet_id")]
    pub asset_id: i64,
    pub insurance_id: Option<i64>,
    pub date: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    #[serde(default)]
    pub is_with_driver: bool,
    #[serde(default)]
    pub is_out_of_town: bool,
    #[serde(default)]
    pub additional_services: Vec<AdditionalService>,
    /// Percentage, 0..=100.
    pub discount: Option<Decimal>,
    pub service_price: Option<Decimal>,
}

/// Itemized price, recomputed on every request and never stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBreakdown {
    /// Daily rate of the asset.
    pub rent_price: Decimal,
    pub total_rent_price: Decimal,
    pub service_price: Decimal,
    pub insurance_price: Decimal,
    /// Daily driver fee for the chosen zone.
    pub driver_price: Decimal,
    pub total_driver_price: Decimal,
    pub out_of_town_price: Decimal,
    pub weekend_days: Vec<NaiveDate>,
    pub weekend_price: Decimal,
    pub total_weekend_price: Decimal,
    pub additional_services: Vec<AdditionalService>,
    pub sub_total: Decimal,
    pub discount_percentage: Decimal,
    pub discount: Decimal,
    /// Taxable amount, sub total minus discount.
    pub total: Decimal,
    pub tax: Decimal,
    pub grand_total: Decimal,
    #[serde(rename = "fleet")]
    pub asset: Asset,
    pub insurance: Option<Insurance>,
}
