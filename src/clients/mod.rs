//! HTTP clients for the external collaborators the checkout depends on.
//! Services depend on the traits, never on the transports, so collaborators
//! can be doubled in tests.

pub mod appointments;
pub mod offer_rules;
pub mod payment_gateway;

use std::time::Duration;

pub use appointments::{AppointmentStatus, AppointmentsApi, CreatedAppointment, HttpAppointmentsClient};
pub use offer_rules::{HttpOfferRulesClient, OfferGrant, OfferRulesApi};
pub use payment_gateway::{
    HttpPaymentGatewayClient, PaymentGatewayApi, PaymentSessionHandle, PaymentSessionRequest,
};

/// Shared reqwest client with the collaborator timeout applied. Collaborator
/// calls must fail with a typed error instead of hanging.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}
