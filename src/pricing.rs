//! Pure pricing rules shared by checkout and order presentation.
//!
//! All amounts are integer minor units (cents). Every function here is
//! referentially transparent so order totals can be reproduced in tests
//! and audits.

use chrono::{DateTime, Duration, Utc};

use crate::models::ShippingMethod;

/// Orders strictly above this subtotal ship free with the standard method.
pub const FREE_SHIPPING_THRESHOLD: i64 = 100_00;
pub const STANDARD_SHIPPING_COST: i64 = 10_00;
pub const EXPRESS_SHIPPING_COST: i64 = 20_00;
pub const NEXT_DAY_SHIPPING_COST: i64 = 30_00;

/// Flat tax rate, applied as subtotal / TAX_DIVISOR (10%).
const TAX_DIVISOR: i64 = 10;

pub fn shipping_cost(method: ShippingMethod, subtotal: i64) -> i64 {
    match method {
        ShippingMethod::Standard => {
            // Strict comparison: a subtotal of exactly 100.00 still pays.
            if subtotal > FREE_SHIPPING_THRESHOLD {
                0
            } else {
                STANDARD_SHIPPING_COST
            }
        }
        ShippingMethod::Express => EXPRESS_SHIPPING_COST,
        ShippingMethod::NextDay => NEXT_DAY_SHIPPING_COST,
    }
}

pub fn tax(subtotal: i64) -> i64 {
    subtotal / TAX_DIVISOR
}

pub fn delivery_days(method: ShippingMethod) -> i64 {
    match method {
        ShippingMethod::Standard => 5,
        ShippingMethod::Express => 2,
        ShippingMethod::NextDay => 1,
    }
}

pub fn estimated_delivery_date(method: ShippingMethod, from: DateTime<Utc>) -> DateTime<Utc> {
    from + Duration::days(delivery_days(method))
}

/// Order total invariant: subtotal + tax + shipping - discount.
pub fn order_total(subtotal: i64, tax: i64, shipping_cost: i64, discount: i64) -> i64 {
    subtotal + tax + shipping_cost - discount
}
