pub mod checkout;
pub mod common;

use std::sync::Arc;
use std::time::Duration;

use crate::auth::HttpAuthClient;
use crate::cache::CacheBackend;
use crate::clients::{self, HttpAppointmentsClient, HttpOfferRulesClient, HttpPaymentGatewayClient};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    BookingFinalizer, CheckoutService, OfferService, PaymentDispatcher, SessionContinuityGuard,
};

/// Aggregated services used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    /// Wires collaborator clients and services from configuration.
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Result<Self, ServiceError> {
        let http = clients::http_client(Duration::from_secs(config.http_timeout_secs))
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        let guard = SessionContinuityGuard::new(cache.clone(), None);

        let offers = OfferService::new(Arc::new(HttpOfferRulesClient::new(
            http.clone(),
            config.offer_rules_base_url.clone(),
        )));

        let appointments = Arc::new(HttpAppointmentsClient::new(
            http.clone(),
            config.appointments_base_url.clone(),
        ));
        let finalizer = Arc::new(BookingFinalizer::new(appointments, guard.clone()));

        let gateway = Arc::new(HttpPaymentGatewayClient::new(
            http.clone(),
            config.payment_gateway_base_url.clone(),
        ));
        let dispatcher = Arc::new(PaymentDispatcher::new(finalizer, gateway, config.clone()));

        let auth = Arc::new(HttpAuthClient::new(http, config.auth_base_url.clone()));

        let checkout = Arc::new(CheckoutService::new(
            cache,
            guard,
            offers,
            dispatcher,
            auth,
            event_sender,
            config,
        ));

        Ok(Self { checkout })
    }
}
