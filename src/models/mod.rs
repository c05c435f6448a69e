pub mod cart;
pub mod checkout;

pub use cart::{Cart, CartLineItem, ServiceOffering};
pub use checkout::{
    Address, AppointmentRequest, CheckoutSnapshot, CheckoutStep, DiscountType,
    FinalizationStrategy, Offer, PaymentMethod, PriceBreakdown, Selection, SubmissionState,
};
