//! Server-side totals. Client-supplied totals are never trusted.

use rust_decimal::Decimal;

use crate::common::round_money;
use crate::config::PricingConfig;
use crate::domains::orders::models::OrderTotals;

/// `round2((unit price + Σ modifier prices) × quantity)`. `None` when the
/// amount leaves the decimal range.
pub fn line_total(unit_price: Decimal, modifier_prices: &[Decimal], quantity: u32) -> Option<Decimal> {
    let per_unit = checked_sum(std::iter::once(unit_price).chain(modifier_prices.iter().copied()))?;
    per_unit.checked_mul(Decimal::from(quantity)).map(round_money)
}

/// Every term is rounded to 2 places, and the total is rounded again after
/// summing so `total == subtotal + tax + serviceFee + deliveryFee + tip - discount`.
/// `None` when any term overflows.
pub fn compute_totals(
    line_totals: &[Decimal],
    pricing: &PricingConfig,
    tip: Decimal,
    discount: Decimal,
) -> Option<OrderTotals> {
    let subtotal = round_money(checked_sum(line_totals.iter().copied())?);
    let tax = round_money(subtotal.checked_mul(pricing.tax_rate)?);
    let service_fee = round_money(subtotal.checked_mul(pricing.service_fee_rate)?);
    let delivery_fee = round_money(pricing.delivery_fee);
    let tip = round_money(tip);
    let discount = round_money(discount);
    let total = checked_sum([subtotal, tax, service_fee, delivery_fee, tip].into_iter())?
        .checked_sub(discount)
        .map(round_money)?;

    Some(OrderTotals {
        subtotal,
        tax,
        service_fee,
        delivery_fee,
        tip,
        discount,
        total,
    })
}

fn checked_sum(mut terms: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    terms.try_fold(Decimal::ZERO, |acc, term| acc.checked_add(term))
}
