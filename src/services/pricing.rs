//! Price calculation.
//!
//! [`compute`] is pure; [`PricingCalculator`] only resolves the catalog
//! records it needs and then delegates.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use rust_decimal::prelude::*;

use crate::config::PriceRates;
use crate::error::{AppError, AppResult};
use crate::model::booking::validate_duration;
use crate::model::fleet::{Asset, AssetKind, Insurance};
use crate::model::invoice::InvoiceLine;
use crate::model::price::{PriceBreakdown, PriceQuery};
use crate::services::collaborators::{AssetCatalog, InsuranceCatalog};

const TAX_DECIMAL_PLACES: u32 = 2;

fn out_of_range() -> AppError {
    AppError::invalid("Price is out of range.")
}

fn add(a: Decimal, b: Decimal) -> AppResult<Decimal> {
    a.checked_add(b).ok_or_else(out_of_range)
}

fn mul(a: Decimal, b: Decimal) -> AppResult<Decimal> {
    a.checked_mul(b).ok_or_else(out_of_range)
}

/// Saturdays and Sundays among the civil dates `[start, start + duration)` in `tz`.
pub fn weekend_days(start: DateTime<Utc>, duration: i32, tz: Tz) -> Vec<NaiveDate> {
    let first = start.with_timezone(&tz).date_naive();
    (0..duration.max(0))
        .filter_map(|i| first.checked_add_days(Days::new(i as u64)))
        .filter(|d| matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// Itemized price for already-resolved catalog records.
pub fn compute(
    asset: &Asset,
    insurance: Option<&Insurance>,
    query: &PriceQuery,
    start: DateTime<Utc>,
    rates: &PriceRates,
    tz: Tz,
) -> AppResult<PriceBreakdown> {
    let duration = query.duration.unwrap_or(1);
    validate_duration(duration)?;

    let discount_percentage = query.discount.unwrap_or(Decimal::ZERO);
    if discount_percentage < Decimal::ZERO || discount_percentage > Decimal::ONE_HUNDRED {
        return Err(AppError::invalid("Discount must be between 0 and 100."));
    }

    let service_price = query.service_price.unwrap_or(Decimal::ZERO);
    if service_price < Decimal::ZERO {
        return Err(AppError::invalid("Service price cannot be negative."));
    }
    if query.additional_services.iter().any(|s| s.price < Decimal::ZERO) {
        return Err(AppError::invalid("Additional service price cannot be negative."));
    }

    let days = Decimal::from(duration);

    let rent_price = asset.daily_rate;
    let total_rent_price = mul(days, rent_price)?;
    let insurance_price = insurance.map(|i| i.price).unwrap_or(Decimal::ZERO);

    let driver_price = if query.is_out_of_town {
        rates.out_town_daily_driver_fee
    } else {
        rates.in_town_daily_driver_fee
    };
    let total_driver_price = if query.is_with_driver {
        mul(days, driver_price)?
    } else {
        Decimal::ZERO
    };

    let out_of_town_price = match (query.is_out_of_town, asset.kind) {
        (false, _) => Decimal::ZERO,
        (true, AssetKind::Car) => rates.car_out_of_town_fee,
        (true, AssetKind::Motorcycle) => rates.motorcycle_out_of_town_fee,
    };

    let weekend_days = weekend_days(start, duration, tz);
    let weekend_price = match asset.kind {
        AssetKind::Car => rates.car_weekend_rate,
        AssetKind::Motorcycle => rates.motorcycle_weekend_rate,
    };
    let total_weekend_price = mul(Decimal::from(weekend_days.len()), weekend_price)?;

    let additional = query
        .additional_services
        .iter()
        .try_fold(Decimal::ZERO, |acc, s| add(acc, s.price))?;

    let sub_total = [
        service_price,
        insurance_price,
        total_driver_price,
        out_of_town_price,
        total_weekend_price,
        additional,
    ]
    .into_iter()
    .try_fold(total_rent_price, add)?;

    let discount = mul(sub_total, discount_percentage)? / Decimal::ONE_HUNDRED;
    let total = sub_total - discount;
    let tax = mul(total, rates.tax_rate)?
        .round_dp_with_strategy(TAX_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
    let grand_total = add(total, tax)?;

    Ok(PriceBreakdown {
        rent_price,
        total_rent_price,
        service_price,
        insurance_price,
        driver_price,
        total_driver_price,
        out_of_town_price,
        weekend_days,
        weekend_price,
        total_weekend_price,
        additional_services: query.additional_services.clone(),
        sub_total,
        discount_percentage,
        discount,
        total,
        tax,
        grand_total,
        asset: asset.clone(),
        insurance: insurance.cloned(),
    })
}

/// Maps a breakdown onto gateway invoice lines. Zero-valued charges are left out.
pub fn invoice_lines(
    price: &PriceBreakdown,
    duration: i32,
    is_out_of_town: bool,
    tax_id: &str,
) -> Vec<InvoiceLine> {
    // Every line carries the booking-wide discount percentage
    let discount = price.discount_percentage;
    let line = |name: &str, description: &str, amount: Decimal, quantity: i32| InvoiceLine {
        name: name.to_string(),
        description: description.to_string(),
        price: amount,
        quantity,
        tax_id: tax_id.to_string(),
        discount,
    };

    let mut lines = vec![line("Rental Charge", "Rental Charge", price.rent_price, duration)];

    if let Some(insurance) = &price.insurance {
        if !price.insurance_price.is_zero() {
            lines.push(line("Insurance Charge", &insurance.name, price.insurance_price, 1));
        }
    }

    if !price.service_price.is_zero() {
        lines.push(line("Service Charge", "Tambahan biaya layanan", price.service_price, 1));
    }

    if !price.total_weekend_price.is_zero() {
        lines.push(line(
            "Weekend Charge",
            "Tambahan biaya weekend",
            price.weekend_price,
            price.weekend_days.len() as i32,
        ));
    }

    if !price.total_driver_price.is_zero() {
        let description = if is_out_of_town {
            "Tambahan biaya driver luar kota"
        } else {
            "Tambahan biaya driver"
        };
        lines.push(line("Driver Charge", description, price.driver_price, duration));
    }

    if !price.out_of_town_price.is_zero() {
        lines.push(line("Out of Town Charge", "Tambahan biaya luar kota", price.out_of_town_price, 1));
    }

    for service in &price.additional_services {
        lines.push(line("Biaya Layanan", &service.name, service.price, 1));
    }

    lines
}

pub struct PricingCalculator {
    assets: Arc<dyn AssetCatalog>,
    insurances: Arc<dyn InsuranceCatalog>,
    rates: PriceRates,
    tz: Tz,
}

impl PricingCalculator {
    pub fn new(
        assets: Arc<dyn AssetCatalog>,
        insurances: Arc<dyn InsuranceCatalog>,
        rates: PriceRates,
        tz: Tz,
    ) -> Self {
        Self {
            assets,
            insurances,
            rates,
            tz,
        }
    }

    /// Missing `date` means "starting now".
    pub async fn calculate(&self, query: &PriceQuery) -> AppResult<PriceBreakdown> {
        let asset = self.assets.find_asset(query.asset_id).await?;
        let insurance = match query.insurance_id.filter(|id| *id != 0) {
            Some(id) => Some(self.insurances.find_insurance(id).await?),
            None => None,
        };
        let start = query.date.unwrap_or_else(Utc::now);

        compute(&asset, insurance.as_ref(), query, start, &self.rates, self.tz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::price::AdditionalService;
    use chrono::TimeZone;
    use chrono_tz::Asia::Jakarta;

    fn car(rate: i64) -> Asset {
        Asset {
            id: 1,
            name: "Avanza".to_string(),
            kind: AssetKind::Car,
            daily_rate: Decimal::from(rate),
            owner_id: None,
        }
    }

    fn query(duration: i32) -> PriceQuery {
        PriceQuery {
            asset_id: 1,
            insurance_id: None,
            date: None,
            duration: Some(duration),
            is_with_driver: false,
            is_out_of_town: false,
            additional_services: vec![],
            discount: None,
            service_price: None,
        }
    }

    // 2026-05-01 is a Friday; 09:00 in Jakarta
    fn friday_morning() -> DateTime<Utc> {
        Jakarta
            .with_ymd_and_hms(2026, 5, 1, 9, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn friday_for_three_days_covers_saturday_and_sunday() {
        let days = weekend_days(friday_morning(), 3, Jakarta);
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
                NaiveDate::from_ymd_opt(2026, 5, 3).unwrap(),
            ]
        );
        // End is exclusive: Friday + 1 day is only Friday
        assert!(weekend_days(friday_morning(), 1, Jakarta).is_empty());
    }

    #[test]
    fn weekend_count_uses_local_calendar() {
        // Friday 20:00 UTC is already Saturday 03:00 in Jakarta
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 20, 0, 0).unwrap();
        assert_eq!(weekend_days(start, 1, Jakarta).len(), 1);
        assert!(weekend_days(start, 1, chrono_tz::UTC).is_empty());
    }

    #[test]
    fn plain_rental_totals() {
        let rates = PriceRates::default();
        let price = compute(&car(100_000), None, &query(3), friday_morning(), &rates, Jakarta).unwrap();

        assert_eq!(price.total_rent_price, Decimal::from(300_000));
        assert_eq!(price.weekend_days.len(), 2);
        assert_eq!(price.total_weekend_price, rates.car_weekend_rate * Decimal::from(2));
        assert_eq!(price.sub_total, Decimal::from(300_000) + price.total_weekend_price);
        assert_eq!(price.discount, Decimal::ZERO);
        assert_eq!(price.tax, Decimal::from(10_240));
        assert_eq!(price.grand_total, price.sub_total + price.tax);
    }

    #[test]
    fn every_term_is_reflected_in_totals() {
        let rates = PriceRates::default();
        let insurance = Insurance {
            id: 2,
            name: "All Risk".to_string(),
            price: Decimal::from(75_000),
        };
        let mut q = query(2);
        q.is_with_driver = true;
        q.is_out_of_town = true;
        q.service_price = Some(Decimal::from(10_000));
        q.discount = Some(Decimal::from(10));
        q.additional_services = vec![AdditionalService {
            name: "Baby seat".to_string(),
            price: Decimal::from(20_000),
        }];

        // Monday start: no weekend
        let monday = Jakarta.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap().with_timezone(&Utc);
        let p = compute(&car(100_000), Some(&insurance), &q, monday, &rates, Jakarta).unwrap();

        assert_eq!(p.total_driver_price, rates.out_town_daily_driver_fee * Decimal::from(2));
        assert_eq!(p.out_of_town_price, rates.car_out_of_town_fee);
        let expected_sub = Decimal::from(200_000)
            + Decimal::from(10_000)
            + Decimal::from(75_000)
            + p.total_driver_price
            + p.out_of_town_price
            + Decimal::from(20_000);
        assert_eq!(p.sub_total, expected_sub);
        assert_eq!(p.discount, expected_sub / Decimal::from(10));
        assert_eq!(p.grand_total, p.sub_total - p.discount + p.tax);
        assert!(p.tax.scale() <= 2);
    }

    #[test]
    fn identical_inputs_identical_breakdown() {
        let rates = PriceRates::default();
        let a = compute(&car(123_457), None, &query(4), friday_morning(), &rates, Jakarta).unwrap();
        let b = compute(&car(123_457), None, &query(4), friday_morning(), &rates, Jakarta).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_duration_and_discount() {
        let rates = PriceRates::default();
        assert!(compute(&car(1), None, &query(0), friday_morning(), &rates, Jakarta).is_err());

        let mut q = query(1);
        q.discount = Some(Decimal::from(101));
        assert!(matches!(
            compute(&car(1), None, &q, friday_morning(), &rates, Jakarta),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn overlong_rental_is_refused_before_counting_days() {
        let rates = PriceRates::default();
        for duration in [crate::model::booking::MAX_RENTAL_DAYS + 1, 200_000_000] {
            assert!(matches!(
                compute(&car(1), None, &query(duration), friday_morning(), &rates, Jakarta),
                Err(AppError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn oversized_line_prices_are_invalid_not_a_panic() {
        let rates = PriceRates::default();
        let mut q = query(1);
        q.additional_services = vec![
            AdditionalService {
                name: "A".to_string(),
                price: Decimal::MAX,
            },
            AdditionalService {
                name: "B".to_string(),
                price: Decimal::MAX,
            },
        ];
        assert!(matches!(
            compute(&car(1), None, &q, friday_morning(), &rates, Jakarta),
            Err(AppError::InvalidInput(_))
        ));

        let mut q = query(1);
        q.service_price = Some(Decimal::MAX);
        q.discount = Some(Decimal::from(50));
        assert!(matches!(
            compute(&car(100_000), None, &q, friday_morning(), &rates, Jakarta),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn negative_line_prices_are_invalid() {
        let rates = PriceRates::default();
        let mut q = query(1);
        q.additional_services = vec![AdditionalService {
            name: "Voucher".to_string(),
            price: Decimal::from(-50_000),
        }];
        assert!(matches!(
            compute(&car(100_000), None, &q, friday_morning(), &rates, Jakarta),
            Err(AppError::InvalidInput(_))
        ));

        let mut q = query(1);
        q.service_price = Some(Decimal::from(-1));
        assert!(matches!(
            compute(&car(100_000), None, &q, friday_morning(), &rates, Jakarta),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn invoice_lines_skip_zero_charges() {
        let rates = PriceRates::default();
        let mut q = query(3);
        q.is_with_driver = true;
        q.discount = Some(Decimal::from(5));
        let p = compute(&car(100_000), None, &q, friday_morning(), &rates, Jakarta).unwrap();

        let lines = invoice_lines(&p, 3, false, "tax-1");
        let names: Vec<&str> = lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Rental Charge", "Weekend Charge", "Driver Charge"]);
        assert_eq!(lines[1].quantity, 2);
        assert_eq!(lines[2].description, "Tambahan biaya driver");
        assert!(lines.iter().all(|l| l.discount == Decimal::from(5) && l.tax_id == "tax-1"));
    }
}
