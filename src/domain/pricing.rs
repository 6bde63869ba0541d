//! Price arithmetic shared by quotes, transactions and offline fee records.
//!
//! Every amount is a [`Decimal`]. Totals are quantized to two places with
//! banker's rounding so quotes shown to a student and the amount charged by
//! the gateway never drift apart.

use crate::config::FeeConfig;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

pub fn quantize(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// `price - price * discount%`, or the plain price when either side is zero.
pub fn course_effective_price(price: Option<Decimal>, discount_percent: Decimal) -> Option<Decimal> {
    match price {
        Some(p) if !p.is_zero() && !discount_percent.is_zero() => {
            Some(quantize(p - p * (discount_percent / HUNDRED)))
        }
        other => other,
    }
}

/// Test series carry a sale price rather than a percentage.
pub fn test_series_effective_price(price: Decimal, discounted_price: Decimal) -> Decimal {
    if !price.is_zero() && !discounted_price.is_zero() {
        discounted_price
    } else {
        price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub original_price: Decimal,
    pub discount_applied: Decimal,
    pub price_after_coupon: Decimal,
    pub gst_percentage: Decimal,
    pub gst_amount: Decimal,
    pub internet_charges: Decimal,
    pub platform_fees: Decimal,
    pub total_amount: Decimal,
}

/// Price an item: the (possibly discounted) base plus internet and platform
/// charges, with GST levied on all three.
///
/// `gst_percentage = None` falls back to the configured default rate; an
/// explicit zero is honoured.
pub fn fee_breakdown(
    original_price: Decimal,
    discount_applied: Decimal,
    gst_percentage: Option<Decimal>,
    fees: &FeeConfig,
) -> FeeBreakdown {
    let discount_applied = discount_applied.max(Decimal::ZERO).min(original_price);
    let base = original_price - discount_applied;
    let gst_percentage = gst_percentage.unwrap_or(fees.gst_percentage);

    let taxable = base + fees.internet_charges + fees.platform_fee;
    let gst_amount = taxable * gst_percentage / HUNDRED;
    let total = base + gst_amount + fees.internet_charges + fees.platform_fee;

    FeeBreakdown {
        original_price,
        discount_applied,
        price_after_coupon: base,
        gst_percentage,
        gst_amount: quantize(gst_amount),
        internet_charges: fees.internet_charges,
        platform_fees: fees.platform_fee,
        total_amount: quantize(total),
    }
}

/// Gateway amounts are integer paise; fractions of a paisa are dropped.
pub fn to_minor_units(amount: Decimal) -> i64 {
    (amount * HUNDRED).trunc().to_i64().unwrap_or(0)
}
