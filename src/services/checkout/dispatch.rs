//! Payment dispatch: the single place where the two finalization paths
//! branch. Callers get a discriminated outcome instead of re-implementing
//! the direct-vs-redirect decision.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::clients::{PaymentGatewayApi, PaymentSessionRequest};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::models::{AppointmentRequest, FinalizationStrategy, PaymentMethod};
use crate::services::booking::BookingFinalizer;

/// Discriminated result of `PaymentDispatcher::finalize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// The appointment is already confirmed; checkout is done in-process.
    Confirmed {
        appointment_id: String,
        booking_reference: String,
    },
    /// A payment session exists; the user must be sent to `payment_url` and
    /// control does not return to this process.
    RedirectPending {
        appointment_id: String,
        payment_url: String,
    },
}

#[derive(Clone)]
pub struct PaymentDispatcher {
    finalizer: Arc<BookingFinalizer>,
    gateway: Arc<dyn PaymentGatewayApi>,
    config: Arc<AppConfig>,
}

impl PaymentDispatcher {
    pub fn new(
        finalizer: Arc<BookingFinalizer>,
        gateway: Arc<dyn PaymentGatewayApi>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            finalizer,
            gateway,
            config,
        }
    }

    /// Submits a fully priced appointment request using the chosen method.
    ///
    /// Direct methods confirm immediately. Redirect methods create the
    /// appointment `pending`, request a gateway session scoped to its id and
    /// the exact total, and clear persisted checkout state before handing
    /// control away. A gateway failure leaves the pending appointment in
    /// place and surfaces a typed error naming it.
    #[instrument(skip(self, request), fields(booking_reference = %request.booking_reference, method = %method))]
    pub async fn finalize(
        &self,
        scope: &str,
        request: &AppointmentRequest,
        method: PaymentMethod,
    ) -> Result<FinalizeOutcome, ServiceError> {
        match method.strategy() {
            FinalizationStrategy::Direct => {
                let created = self.finalizer.commit_confirmed(scope, request).await?;
                info!(appointment_id = %created.appointment_id, "booking confirmed directly");
                Ok(FinalizeOutcome::Confirmed {
                    appointment_id: created.appointment_id,
                    booking_reference: request.booking_reference.clone(),
                })
            }
            FinalizationStrategy::Redirect => {
                let created = self.finalizer.commit_pending(request).await?;

                let session_request = PaymentSessionRequest {
                    amount: request.totals.total_to_pay,
                    currency: self.config.currency.clone(),
                    description: request.service_summary.clone(),
                    order_id: created.appointment_id.clone(),
                    customer_email: request.customer_email.clone(),
                    customer_phone: request.customer_phone.clone(),
                    return_url: self.config.payment_return_url.clone(),
                    cancel_url: self.config.payment_cancel_url.clone(),
                };

                match self.gateway.create_session(&session_request).await {
                    Ok(handle) => {
                        // Control does not return after the redirect, so the
                        // persisted checkout state must be gone before we
                        // hand out the URL.
                        self.finalizer.clear_session_state(scope).await?;
                        info!(
                            appointment_id = %created.appointment_id,
                            "payment session created, checkout state cleared"
                        );
                        Ok(FinalizeOutcome::RedirectPending {
                            appointment_id: created.appointment_id,
                            payment_url: handle.payment_url,
                        })
                    }
                    Err(err) => {
                        self.finalizer
                            .flag_payment_failure(&created.appointment_id)
                            .await;
                        Err(ServiceError::PaymentGateway {
                            appointment_id: created.appointment_id,
                            message: err.to_string(),
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::clients::{
        AppointmentStatus, AppointmentsApi, CreatedAppointment, PaymentSessionHandle,
    };
    use crate::models::{Address, PriceBreakdown};
    use crate::services::continuity::SessionContinuityGuard;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAppointments {
        created: Mutex<Vec<AppointmentStatus>>,
        updates: Mutex<Vec<(String, serde_json::Value)>>,
        fail_create: bool,
    }

    #[async_trait]
    impl AppointmentsApi for RecordingAppointments {
        async fn create(
            &self,
            _request: &AppointmentRequest,
            status: AppointmentStatus,
        ) -> Result<CreatedAppointment, ServiceError> {
            if self.fail_create {
                return Err(ServiceError::ExternalServiceError(
                    "appointment service returned 503".to_string(),
                ));
            }
            self.created.lock().unwrap().push(status);
            Ok(CreatedAppointment {
                appointment_id: "apt-1".to_string(),
                status: match status {
                    AppointmentStatus::Pending => "pending".to_string(),
                    AppointmentStatus::Confirmed => "confirmed".to_string(),
                },
            })
        }

        async fn update(
            &self,
            id: &str,
            fields: &serde_json::Value,
        ) -> Result<(), ServiceError> {
            self.updates
                .lock()
                .unwrap()
                .push((id.to_string(), fields.clone()));
            Ok(())
        }
    }

    struct StubGateway {
        response: Result<PaymentSessionHandle, String>,
        seen: Mutex<Option<PaymentSessionRequest>>,
    }

    #[async_trait]
    impl PaymentGatewayApi for StubGateway {
        async fn create_session(
            &self,
            request: &PaymentSessionRequest,
        ) -> Result<PaymentSessionHandle, ServiceError> {
            *self.seen.lock().unwrap() = Some(request.clone());
            self.response
                .clone()
                .map_err(ServiceError::ExternalServiceError)
        }
    }

    fn sample_request() -> AppointmentRequest {
        AppointmentRequest {
            booking_reference: "BK-12345678".to_string(),
            service_summary: "1× Deep Cleaning".to_string(),
            line_items: vec![],
            date: "2026-08-20".to_string(),
            time: "10:00-12:00".to_string(),
            address: Address {
                id: "addr-1".to_string(),
                label: None,
                line_one: "Villa 12".to_string(),
                line_two: None,
                city: "Dubai".to_string(),
                phone: None,
            },
            totals: PriceBreakdown {
                subtotal: dec!(200.00),
                discount_amount: dec!(20.00),
                final_amount: dec!(180.00),
                extra_fee: dec!(15),
                payment_fee: dec!(5),
                payable_before_vat: dec!(200.00),
                vat: dec!(10.00),
                total_to_pay: dec!(210.00),
            },
            payment_method_label: "Cash on delivery".to_string(),
            notes: None,
            customer_email: Some("user@example.com".to_string()),
            customer_phone: None,
        }
    }

    struct Harness {
        dispatcher: PaymentDispatcher,
        appointments: Arc<RecordingAppointments>,
        gateway: Arc<StubGateway>,
        guard: SessionContinuityGuard,
    }

    fn harness(
        fail_create: bool,
        gateway_response: Result<PaymentSessionHandle, String>,
    ) -> Harness {
        let appointments = Arc::new(RecordingAppointments {
            fail_create,
            ..Default::default()
        });
        let gateway = Arc::new(StubGateway {
            response: gateway_response,
            seen: Mutex::new(None),
        });
        let guard =
            SessionContinuityGuard::new(Arc::new(InMemoryCache::new()), None);
        let finalizer = Arc::new(BookingFinalizer::new(
            appointments.clone(),
            guard.clone(),
        ));
        let config = Arc::new(crate::config::load_config().expect("default config"));
        let dispatcher = PaymentDispatcher::new(finalizer, gateway.clone(), config);
        Harness {
            dispatcher,
            appointments,
            gateway,
            guard,
        }
    }

    async fn guard_is_empty(guard: &SessionContinuityGuard) -> bool {
        matches!(
            guard.load_on_init("scope").await.unwrap(),
            crate::services::continuity::RestoredState::Empty
        )
    }

    #[tokio::test]
    async fn direct_method_confirms_and_clears_state() {
        let h = harness(
            false,
            Ok(PaymentSessionHandle {
                payment_url: "unused".to_string(),
            }),
        );
        // Seed persisted state so the clear is observable
        h.guard
            .save("scope", &crate::models::Cart::new(), &Default::default())
            .await
            .unwrap();

        let outcome = h
            .dispatcher
            .finalize("scope", &sample_request(), PaymentMethod::CashOnDelivery)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FinalizeOutcome::Confirmed {
                appointment_id: "apt-1".to_string(),
                booking_reference: "BK-12345678".to_string(),
            }
        );
        assert_eq!(
            *h.appointments.created.lock().unwrap(),
            vec![AppointmentStatus::Confirmed]
        );
        // Gateway never involved on the direct path
        assert!(h.gateway.seen.lock().unwrap().is_none());
        assert!(guard_is_empty(&h.guard).await);
    }

    #[tokio::test]
    async fn redirect_method_creates_pending_then_session_with_exact_total() {
        let h = harness(
            false,
            Ok(PaymentSessionHandle {
                payment_url: "https://pay.example/s/abc".to_string(),
            }),
        );
        h.guard
            .save("scope", &crate::models::Cart::new(), &Default::default())
            .await
            .unwrap();

        let outcome = h
            .dispatcher
            .finalize("scope", &sample_request(), PaymentMethod::CardRedirect)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FinalizeOutcome::RedirectPending {
                appointment_id: "apt-1".to_string(),
                payment_url: "https://pay.example/s/abc".to_string(),
            }
        );
        assert_eq!(
            *h.appointments.created.lock().unwrap(),
            vec![AppointmentStatus::Pending]
        );

        let seen = h.gateway.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.amount, dec!(210.00));
        assert_eq!(seen.order_id, "apt-1");

        // State cleared before the URL is handed out
        assert!(guard_is_empty(&h.guard).await);
    }

    #[tokio::test]
    async fn gateway_failure_leaves_pending_appointment_and_state() {
        let h = harness(false, Err("gateway timeout".to_string()));
        h.guard
            .save("scope", &crate::models::Cart::new(), &Default::default())
            .await
            .unwrap();

        let err = h
            .dispatcher
            .finalize("scope", &sample_request(), PaymentMethod::CardRedirect)
            .await
            .unwrap_err();

        match err {
            ServiceError::PaymentGateway {
                appointment_id, ..
            } => assert_eq!(appointment_id, "apt-1"),
            other => panic!("expected PaymentGateway error, got {:?}", other),
        }

        // The pending appointment was flagged, not rolled back
        let updates = h.appointments.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "apt-1");
        assert_eq!(updates[0].1["payment_status"], "failed");

        // Persisted checkout state survives so the user can retry
        assert!(!guard_is_empty(&h.guard).await);
    }

    #[tokio::test]
    async fn appointment_creation_failure_is_a_submission_error() {
        let h = harness(true, Err("unused".to_string()));

        let err = h
            .dispatcher
            .finalize("scope", &sample_request(), PaymentMethod::CashOnDelivery)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Submission(_)));
        assert!(h.gateway.seen.lock().unwrap().is_none());
    }
}
