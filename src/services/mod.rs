pub mod booking;
pub mod checkout;
pub mod continuity;
pub mod offers;
pub mod pricing;

pub use booking::BookingFinalizer;
pub use checkout::dispatch::{FinalizeOutcome, PaymentDispatcher};
pub use checkout::CheckoutService;
pub use continuity::{RestoredState, SessionContinuityGuard};
pub use offers::OfferService;
