//! Shared harness: a fully wired `CheckoutService` talking to wiremock
//! collaborator doubles.

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use homebook_api::cache::{CacheBackend, InMemoryCache};
use homebook_api::config::{load_config, AppConfig};
use homebook_api::events::EventSender;
use homebook_api::handlers::AppServices;
use homebook_api::models::{Address, ServiceOffering};
use homebook_api::services::{CheckoutService, SessionContinuityGuard};

pub const BEARER: &str = "tok-test-1";

pub struct TestHarness {
    pub checkout: Arc<CheckoutService>,
    pub guard: SessionContinuityGuard,
    pub cache: Arc<InMemoryCache>,
    pub offer_server: MockServer,
    pub appointment_server: MockServer,
    pub gateway_server: MockServer,
    pub auth_server: MockServer,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    // Held so event sends don't hit a closed channel
    _event_rx: mpsc::Receiver<homebook_api::events::Event>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let offer_server = MockServer::start().await;
        let appointment_server = MockServer::start().await;
        let gateway_server = MockServer::start().await;
        let auth_server = MockServer::start().await;

        let mut cfg = load_config().expect("default config");
        cfg.offer_rules_base_url = offer_server.uri();
        cfg.appointments_base_url = appointment_server.uri();
        cfg.payment_gateway_base_url = gateway_server.uri();
        cfg.auth_base_url = auth_server.uri();
        let config = Arc::new(cfg);

        let cache = Arc::new(InMemoryCache::new());
        let store: Arc<dyn CacheBackend> = cache.clone();

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let services = AppServices::new(
            store,
            Arc::new(event_sender.clone()),
            config.clone(),
        )
        .expect("service wiring");

        let guard = SessionContinuityGuard::new(cache.clone(), None);

        Self {
            checkout: services.checkout,
            guard,
            cache,
            offer_server,
            appointment_server,
            gateway_server,
            auth_server,
            config,
            event_sender,
            _event_rx: event_rx,
        }
    }

    /// Full application router over this harness's services.
    pub fn router(&self) -> axum::Router {
        let state = Arc::new(homebook_api::AppState {
            config: (*self.config).clone(),
            event_sender: self.event_sender.clone(),
            services: AppServices {
                checkout: self.checkout.clone(),
            },
        });
        homebook_api::app_router(state)
    }

    /// The auth collaborator recognizes `BEARER` as a signed-in user.
    pub async fn stub_authenticated_user(&self) {
        Mock::given(method("GET"))
            .and(path("/v1/me"))
            .and(header("authorization", format!("Bearer {}", BEARER)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "user-1",
                "name": "Test User",
                "email": "user@example.com",
                "phone": "+971500000001"
            })))
            .mount(&self.auth_server)
            .await;
    }

    /// Offer rules collaborator accepts `SAVE10` as 10% off.
    pub async fn stub_save10_offer(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/offers/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "offer": {
                    "discount_type": "percentage",
                    "discount_value": 10,
                    "name": "Save 10"
                },
                "discount_amount": 20.00
            })))
            .mount(&self.offer_server)
            .await;
    }

    pub async fn stub_offer_rejection(&self, message: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/offers/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": message
            })))
            .mount(&self.offer_server)
            .await;
    }

    /// Appointment collaborator creates `apt-1`; `expected` bounds how many
    /// create calls may happen.
    pub async fn stub_appointment_created(&self, status: &str, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "appointment_id": "apt-1",
                "appointment": { "status": status }
            })))
            .expect(expected)
            .mount(&self.appointment_server)
            .await;
    }

    pub async fn stub_appointment_failure(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/appointments"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&self.appointment_server)
            .await;
    }

    pub async fn stub_appointment_update(&self) {
        Mock::given(method("PUT"))
            .and(path("/v1/appointments/apt-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&self.appointment_server)
            .await;
    }

    pub async fn stub_payment_session(&self, payment_url: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/payment-sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment_url": payment_url
            })))
            .mount(&self.gateway_server)
            .await;
    }

    pub async fn stub_payment_session_failure(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/payment-sessions"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&self.gateway_server)
            .await;
    }
}

pub fn offering(id: &str, name: &str, price: Decimal) -> ServiceOffering {
    ServiceOffering {
        service_id: id.to_string(),
        display_name: name.to_string(),
        unit_price: price,
        discounted_unit_price: None,
        room_type_slug: "full-home".to_string(),
        property_type_slug: "apartment".to_string(),
        category_slug: "cleaning".to_string(),
        max_quantity: None,
    }
}

pub fn capped_offering(id: &str, name: &str, price: Decimal, max: u32) -> ServiceOffering {
    ServiceOffering {
        max_quantity: Some(max),
        ..offering(id, name, price)
    }
}

pub fn address() -> Address {
    Address {
        id: "addr-1".to_string(),
        label: Some("Home".to_string()),
        line_one: "Villa 12, Palm Street".to_string(),
        line_two: None,
        city: "Dubai".to_string(),
        phone: Some("+971500000001".to_string()),
    }
}
