//! Pure price computation. No I/O, no state: every amount on a quote or an
//! appointment request comes from here.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::PriceBreakdown;

const MONEY_DP: u32 = 2;

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Composes the full price breakdown for a checkout.
///
/// The discount is clamped to the subtotal, so `final_amount` can never go
/// negative regardless of what the offer collaborator returned.
pub fn compute_breakdown(
    subtotal: Decimal,
    discount_amount: Decimal,
    extra_fee: Decimal,
    payment_fee: Decimal,
    vat_rate: Decimal,
) -> PriceBreakdown {
    let discount_amount = discount_amount.max(Decimal::ZERO).min(subtotal);
    let final_amount = (subtotal - discount_amount).max(Decimal::ZERO);
    let payable_before_vat = final_amount + extra_fee + payment_fee;
    let vat = round_money(payable_before_vat * vat_rate);
    let total_to_pay = payable_before_vat + vat;

    PriceBreakdown {
        subtotal,
        discount_amount,
        final_amount,
        extra_fee,
        payment_fee,
        payable_before_vat,
        vat,
        total_to_pay,
    }
}

/// Resolves a percentage or fixed discount value against a subtotal.
pub fn discount_for(
    discount_type: crate::models::DiscountType,
    discount_value: Decimal,
    subtotal: Decimal,
) -> Decimal {
    let raw = match discount_type {
        crate::models::DiscountType::Percentage => {
            round_money(subtotal * discount_value / Decimal::from(100))
        }
        crate::models::DiscountType::Fixed => discount_value,
    };
    raw.max(Decimal::ZERO).min(subtotal)
}

/// Per-month display amount for installment plans. Purely derived, never
/// persisted as authoritative.
pub fn monthly_installment(total_to_pay: Decimal, months: u32) -> Option<Decimal> {
    if months == 0 {
        return None;
    }
    Some(round_money(total_to_pay / Decimal::from(months)))
}
