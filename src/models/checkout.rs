use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::cart::Cart;

/// A service address chosen in step 2.
///
/// Addresses are opaque references to records owned by the address
/// collaborator; the checkout never infers one, the user always picks
/// explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: String,
    pub label: Option<String>,
    pub line_one: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_two: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Address and schedule selections, written by steps 2 and 3.
///
/// Cross-field slot availability is the availability collaborator's concern;
/// the tracker only guarantees a `time` is never stored without its `date`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub address: Option<Address>,
    pub date: Option<String>,
    pub time: Option<String>,
    #[serde(default)]
    pub extra_fee: Decimal,
}

impl Selection {
    pub fn address_complete(&self) -> bool {
        self.address.is_some()
    }

    pub fn schedule_complete(&self) -> bool {
        self.date.is_some() && self.time.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// A discount code resolved against a specific subtotal.
///
/// `computed_discount_amount` is bound to `applied_subtotal`; if the cart
/// changes afterwards the offer is void and must be re-validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub computed_discount_amount: Decimal,
    pub applied_subtotal: Decimal,
}

/// The four checkout stages, in wizard order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckoutStep {
    ItemSelection,
    Address,
    Schedule,
    ReviewAndPay,
}

impl CheckoutStep {
    pub fn number(self) -> u8 {
        match self {
            CheckoutStep::ItemSelection => 1,
            CheckoutStep::Address => 2,
            CheckoutStep::Schedule => 3,
            CheckoutStep::ReviewAndPay => 4,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(CheckoutStep::ItemSelection),
            2 => Some(CheckoutStep::Address),
            3 => Some(CheckoutStep::Schedule),
            4 => Some(CheckoutStep::ReviewAndPay),
            _ => None,
        }
    }

    pub fn succ(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn pred(self) -> Option<Self> {
        self.number().checked_sub(1).and_then(Self::from_number)
    }
}

/// How a payment method is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizationStrategy {
    /// Submit the appointment immediately; the booking is confirmed in-process.
    Direct,
    /// Create the appointment pending, then hand control to the external
    /// payment gateway.
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    CardRedirect,
    CashOnDelivery,
    Installment,
}

impl PaymentMethod {
    pub fn strategy(self) -> FinalizationStrategy {
        match self {
            PaymentMethod::CashOnDelivery => FinalizationStrategy::Direct,
            PaymentMethod::CardRedirect | PaymentMethod::Installment => {
                FinalizationStrategy::Redirect
            }
        }
    }

    /// Flat fee addend for this method; `cash_surcharge` comes from config.
    pub fn surcharge(self, cash_surcharge: Decimal) -> Decimal {
        match self {
            PaymentMethod::CashOnDelivery => cash_surcharge,
            PaymentMethod::CardRedirect | PaymentMethod::Installment => Decimal::ZERO,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::CardRedirect => "Card (online)",
            PaymentMethod::CashOnDelivery => "Cash on delivery",
            PaymentMethod::Installment => "Monthly installments",
        }
    }
}

/// Submission progress as a tagged union so invalid combinations (for
/// example a second submit while one is in flight) are unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    InFlight,
    RedirectPending {
        appointment_id: String,
        payment_url: String,
    },
    Done {
        appointment_id: String,
        booking_reference: String,
    },
    Failed {
        message: String,
    },
}

impl Default for SubmissionState {
    fn default() -> Self {
        SubmissionState::Idle
    }
}

/// Full price composition for a checkout, produced by the pricing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
    pub extra_fee: Decimal,
    pub payment_fee: Decimal,
    pub payable_before_vat: Decimal,
    pub vat: Decimal,
    pub total_to_pay: Decimal,
}

/// The fully materialized order, submitted exactly once per successful
/// checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub booking_reference: String,
    pub service_summary: String,
    pub line_items: Vec<super::cart::CartLineItem>,
    pub date: String,
    pub time: String,
    pub address: Address,
    pub totals: PriceBreakdown,
    pub payment_method_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
}

/// What the Session Continuity Guard persists: cart and selection, nothing
/// else. Applied offers are deliberately not part of the snapshot; a
/// restored session must re-validate its code against the restored subtotal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSnapshot {
    pub cart: Cart,
    pub selection: Selection,
    pub saved_at: DateTime<Utc>,
}
