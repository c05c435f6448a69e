//! Checkout orchestration: cache-stored sessions guarded by per-session
//! locks, so every mutation is serialized and submission is at-most-once.

pub mod dispatch;
pub mod session;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::{AuthApi, AuthContext};
use crate::cache::CacheBackend;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    Address, AppointmentRequest, Cart, CheckoutStep, PaymentMethod, PriceBreakdown,
    ServiceOffering, SubmissionState,
};
use crate::services::continuity::{RestoredState, SessionContinuityGuard};
use crate::services::offers::OfferService;
use crate::services::pricing;

use dispatch::{FinalizeOutcome, PaymentDispatcher};
use session::{CheckoutSession, SessionStatus, StepAdvance, StepRetreat};

/// Input for the schedule step.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleInput {
    pub date: Option<String>,
    pub time: Option<String>,
    pub extra_fee: Option<Decimal>,
}

/// Input for booking submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitBookingInput {
    pub notes: Option<String>,
}

/// Price breakdown plus derived installment display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    #[serde(flatten)]
    pub breakdown: PriceBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_installment: Option<Decimal>,
}

#[derive(Clone)]
pub struct CheckoutService {
    cache: Arc<dyn CacheBackend>,
    guard: SessionContinuityGuard,
    offers: OfferService,
    dispatcher: Arc<PaymentDispatcher>,
    auth: Arc<dyn AuthApi>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    session_locks: Arc<AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        guard: SessionContinuityGuard,
        offers: OfferService,
        dispatcher: Arc<PaymentDispatcher>,
        auth: Arc<dyn AuthApi>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            cache,
            guard,
            offers,
            dispatcher,
            auth,
            event_sender,
            config,
            session_locks: Arc::new(AsyncMutex::new(HashMap::new())),
        }
    }

    fn session_ttl(&self) -> Duration {
        Duration::seconds(self.config.session_ttl_secs as i64)
    }

    fn session_cache_ttl(&self) -> Option<StdDuration> {
        Some(StdDuration::from_secs(self.config.session_ttl_secs))
    }

    fn session_cache_key(session_id: Uuid) -> String {
        format!("checkout_session:{}", session_id)
    }

    async fn acquire_session_lock(&self, session_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn release_session_lock(&self, session_id: Uuid, lock: Arc<AsyncMutex<()>>) {
        if Arc::strong_count(&lock) == 1 {
            let mut locks = self.session_locks.lock().await;
            let key = session_id.to_string();
            if let Some(existing) = locks.get(&key) {
                if Arc::ptr_eq(existing, &lock) {
                    locks.remove(&key);
                }
            }
        }
    }

    async fn save_session(&self, session: &CheckoutSession) -> Result<(), ServiceError> {
        let payload = serde_json::to_string(session)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
        self.cache
            .set(
                &Self::session_cache_key(session.id),
                &payload,
                self.session_cache_ttl(),
            )
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))
    }

    /// Loads a session by id.
    #[instrument(skip(self))]
    pub async fn get_session(&self, session_id: Uuid) -> Result<CheckoutSession, ServiceError> {
        let cached = self
            .cache
            .get(&Self::session_cache_key(session_id))
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?;

        match cached {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| ServiceError::SerializationError(e.to_string())),
            None => Err(ServiceError::NotFound(format!(
                "Checkout session {} not found",
                session_id
            ))),
        }
    }

    /// Starts a checkout session for a continuity scope, restoring any
    /// persisted cart/selection state (handoff snapshot first, then the
    /// normal one, unless a clear-marker consumed them).
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        scope: Option<String>,
    ) -> Result<CheckoutSession, ServiceError> {
        let scope = scope
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut session = CheckoutSession::new(scope.clone(), self.session_ttl());

        let restored = match self.guard.load_on_init(&scope).await? {
            RestoredState::Restored { snapshot, from_handoff } => {
                session.cart = snapshot.cart;
                session.selection = snapshot.selection;
                if from_handoff {
                    info!(session_id = %session.id, "restored handoff snapshot after authentication");
                }
                true
            }
            RestoredState::Empty => false,
        };

        self.save_session(&session).await?;
        self.event_sender
            .send_or_log(Event::CheckoutSessionCreated {
                session_id: session.id,
                restored_from_snapshot: restored,
            })
            .await;

        info!(session_id = %session.id, restored, "created checkout session");
        Ok(session)
    }

    /// Persists a cart/selection mutation: durable snapshot plus the session
    /// record itself.
    async fn persist_mutation(&self, session: &mut CheckoutSession) -> Result<(), ServiceError> {
        session.touch(self.session_ttl());
        self.guard
            .save(&session.scope, &session.cart, &session.selection)
            .await?;
        self.save_session(session).await
    }

    /// An applied offer is bound to the cart it was validated against; any
    /// composition change voids it.
    async fn revoke_offer_for_mutation(&self, session: &mut CheckoutSession) {
        if let Some(offer) = session.offer.take() {
            self.event_sender
                .send_or_log(Event::OfferRevoked {
                    session_id: session.id,
                    code: offer.code,
                })
                .await;
        }
    }

    /// Adds one unit of a service. Exceeding the service's max quantity is a
    /// silent no-op.
    #[instrument(skip(self, offering), fields(service_id = %offering.service_id))]
    pub async fn add_item(
        &self,
        session_id: Uuid,
        offering: ServiceOffering,
    ) -> Result<CheckoutSession, ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let mut session = self.get_session(session_id).await?;
            session.ensure_mutable()?;

            if session.cart.add_item(&offering) {
                self.revoke_offer_for_mutation(&mut session).await;
                self.persist_mutation(&mut session).await?;
                self.event_sender
                    .send_or_log(Event::CartItemAdded {
                        session_id,
                        service_id: offering.service_id.clone(),
                    })
                    .await;
            } else {
                info!(
                    service_id = %offering.service_id,
                    "add ignored: max quantity reached"
                );
            }
            Ok(session)
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    /// Removes one unit; the line disappears when its quantity reaches zero.
    #[instrument(skip(self))]
    pub async fn remove_one_unit(
        &self,
        session_id: Uuid,
        service_id: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let mut session = self.get_session(session_id).await?;
            session.ensure_mutable()?;

            if session.cart.remove_one_unit(service_id) {
                self.revoke_offer_for_mutation(&mut session).await;
                self.persist_mutation(&mut session).await?;
                self.event_sender
                    .send_or_log(Event::CartItemRemoved {
                        session_id,
                        service_id: service_id.to_string(),
                    })
                    .await;
            }
            Ok(session)
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    /// Removes a line entirely regardless of quantity.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        session_id: Uuid,
        service_id: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let mut session = self.get_session(session_id).await?;
            session.ensure_mutable()?;

            if session.cart.remove_item(service_id) {
                self.revoke_offer_for_mutation(&mut session).await;
                self.persist_mutation(&mut session).await?;
                self.event_sender
                    .send_or_log(Event::CartItemRemoved {
                        session_id,
                        service_id: service_id.to_string(),
                    })
                    .await;
            }
            Ok(session)
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    /// Sets the service address (step 2).
    #[instrument(skip(self, address), fields(address_id = %address.id))]
    pub async fn set_address(
        &self,
        session_id: Uuid,
        address: Address,
    ) -> Result<CheckoutSession, ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let mut session = self.get_session(session_id).await?;
            session.ensure_mutable()?;

            session.selection.address = Some(address);
            self.persist_mutation(&mut session).await?;
            self.event_sender
                .send_or_log(Event::AddressSelected(session_id))
                .await;
            Ok(session)
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    /// Sets date/time/extra fee (step 3). A time slot is only accepted
    /// together with its date; choosing a different date drops a previously
    /// chosen time.
    #[instrument(skip(self, input))]
    pub async fn set_schedule(
        &self,
        session_id: Uuid,
        input: ScheduleInput,
    ) -> Result<CheckoutSession, ServiceError> {
        if input.time.is_some() && input.date.is_none() {
            return Err(ServiceError::ValidationError(
                "A time slot must be accompanied by its date".to_string(),
            ));
        }

        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let mut session = self.get_session(session_id).await?;
            session.ensure_mutable()?;

            if let Some(date) = input.date {
                if session.selection.date.as_deref() != Some(date.as_str()) {
                    session.selection.time = None;
                }
                session.selection.date = Some(date);
            }
            if let Some(time) = input.time {
                session.selection.time = Some(time);
            }
            if let Some(extra_fee) = input.extra_fee {
                if extra_fee < Decimal::ZERO {
                    return Err(ServiceError::InvalidInput(
                        "Extra fee cannot be negative".to_string(),
                    ));
                }
                session.selection.extra_fee = extra_fee;
            }

            self.persist_mutation(&mut session).await?;
            self.event_sender
                .send_or_log(Event::ScheduleSelected(session_id))
                .await;
            Ok(session)
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    /// Selects the payment method (step 4).
    #[instrument(skip(self))]
    pub async fn set_payment_method(
        &self,
        session_id: Uuid,
        method: PaymentMethod,
    ) -> Result<CheckoutSession, ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let mut session = self.get_session(session_id).await?;
            session.ensure_mutable()?;

            session.payment_method = Some(method);
            session.touch(self.session_ttl());
            self.save_session(&session).await?;
            self.event_sender
                .send_or_log(Event::PaymentMethodSelected {
                    session_id,
                    method: method.to_string(),
                })
                .await;
            Ok(session)
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    /// Validates and applies an offer code against the current subtotal.
    ///
    /// A validation response computed against a subtotal that no longer
    /// matches the session is discarded instead of applied.
    #[instrument(skip(self))]
    pub async fn apply_offer(
        &self,
        session_id: Uuid,
        code: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let session = self.get_session(session_id).await?;
            session.ensure_mutable()?;

            if session.cart.is_empty() {
                return Err(ServiceError::ValidationError(
                    "Cannot apply an offer to an empty cart".to_string(),
                ));
            }

            let subtotal = session.cart.subtotal();
            let service_ids = session.cart.service_ids();
            let offer = self.offers.validate(code, subtotal, &service_ids).await?;

            let mut session = self.get_session(session_id).await?;
            if session.cart.subtotal() != offer.applied_subtotal {
                return Err(ServiceError::Conflict(
                    "Cart changed while the offer was being validated".to_string(),
                ));
            }

            let discount = offer.computed_discount_amount;
            let offer_code = offer.code.clone();
            session.offer = Some(offer);
            session.touch(self.session_ttl());
            self.save_session(&session).await?;

            self.event_sender
                .send_or_log(Event::OfferApplied {
                    session_id,
                    code: offer_code,
                    discount_amount: discount,
                })
                .await;
            Ok(session)
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    /// Unconditionally clears an applied offer.
    #[instrument(skip(self))]
    pub async fn revoke_offer(&self, session_id: Uuid) -> Result<CheckoutSession, ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let mut session = self.get_session(session_id).await?;
            session.ensure_mutable()?;

            self.revoke_offer_for_mutation(&mut session).await;
            session.touch(self.session_ttl());
            self.save_session(&session).await?;
            Ok(session)
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    fn price_session(
        &self,
        session: &CheckoutSession,
        method: Option<PaymentMethod>,
    ) -> PriceBreakdown {
        let discount = session
            .offer
            .as_ref()
            .map(|o| o.computed_discount_amount)
            .unwrap_or(Decimal::ZERO);
        let payment_fee = method
            .map(|m| m.surcharge(self.config.cash_surcharge_decimal()))
            .unwrap_or(Decimal::ZERO);

        pricing::compute_breakdown(
            session.cart.subtotal(),
            discount,
            session.selection.extra_fee,
            payment_fee,
            self.config.vat_rate_decimal(),
        )
    }

    /// Read-only price breakdown for the review step.
    #[instrument(skip(self))]
    pub async fn quote(&self, session_id: Uuid) -> Result<Quote, ServiceError> {
        let session = self.get_session(session_id).await?;
        let breakdown = self.price_session(&session, session.payment_method);

        let monthly_installment = match session.payment_method {
            Some(PaymentMethod::Installment) => pricing::monthly_installment(
                breakdown.total_to_pay,
                self.config.installment_months,
            ),
            _ => None,
        };

        Ok(Quote {
            breakdown,
            monthly_installment,
        })
    }

    /// Forward navigation. Unauthenticated users on step 1 get
    /// `AuthRequired` after their state is parked in the handoff snapshot.
    #[instrument(skip(self, bearer))]
    pub async fn next_step(
        &self,
        session_id: Uuid,
        bearer: Option<&str>,
    ) -> Result<(CheckoutSession, StepAdvance), ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let mut session = self.get_session(session_id).await?;
            // Only the step-1 gate consults the authentication collaborator;
            // later steps validate locally.
            let auth = if session.step == CheckoutStep::ItemSelection {
                self.auth.current_context(bearer).await?
            } else {
                AuthContext::anonymous()
            };
            let from = session.step;
            let outcome = session.advance(&auth)?;

            match &outcome {
                StepAdvance::AuthRequired => {
                    self.guard
                        .save_handoff(&session.scope, &session.cart, &session.selection)
                        .await?;
                    self.event_sender
                        .send_or_log(Event::AuthHandoffStarted(session_id))
                        .await;
                }
                StepAdvance::Moved { step } => {
                    self.event_sender
                        .send_or_log(Event::StepChanged {
                            session_id,
                            from: from.number(),
                            to: step.number(),
                        })
                        .await;
                }
                StepAdvance::ReadyToSubmit => {}
            }

            session.touch(self.session_ttl());
            self.save_session(&session).await?;
            Ok((session, outcome))
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    /// Backward navigation; from step 1 it exits the wizard without
    /// clearing anything.
    #[instrument(skip(self))]
    pub async fn prev_step(
        &self,
        session_id: Uuid,
    ) -> Result<(CheckoutSession, StepRetreat), ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let mut session = self.get_session(session_id).await?;
            let from = session.step;
            let outcome = session.retreat()?;

            if let StepRetreat::Moved { step } = &outcome {
                self.event_sender
                    .send_or_log(Event::StepChanged {
                        session_id,
                        from: from.number(),
                        to: step.number(),
                    })
                    .await;
            }

            session.touch(self.session_ttl());
            self.save_session(&session).await?;
            Ok((session, outcome))
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    /// Direct navigation to a visited step or back to step 1.
    #[instrument(skip(self))]
    pub async fn go_to_step(
        &self,
        session_id: Uuid,
        step_number: u8,
    ) -> Result<CheckoutSession, ServiceError> {
        let target = CheckoutStep::from_number(step_number).ok_or_else(|| {
            ServiceError::InvalidInput(format!("{} is not a checkout step", step_number))
        })?;

        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let mut session = self.get_session(session_id).await?;
            let from = session.step;
            session.go_to(target)?;

            if from != session.step {
                self.event_sender
                    .send_or_log(Event::StepChanged {
                        session_id,
                        from: from.number(),
                        to: session.step.number(),
                    })
                    .await;
            }

            session.touch(self.session_ttl());
            self.save_session(&session).await?;
            Ok(session)
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    /// Parks the current cart/selection in the single-use handoff snapshot
    /// ahead of an authentication redirect.
    #[instrument(skip(self))]
    pub async fn begin_auth_handoff(&self, session_id: Uuid) -> Result<(), ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let session = self.get_session(session_id).await?;
            session.ensure_open()?;
            self.guard
                .save_handoff(&session.scope, &session.cart, &session.selection)
                .await?;
            self.event_sender
                .send_or_log(Event::AuthHandoffStarted(session_id))
                .await;
            Ok(())
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    /// Explicit abandonment: the one path besides successful submission that
    /// clears the cart, and it clears it atomically.
    #[instrument(skip(self))]
    pub async fn abandon(&self, session_id: Uuid) -> Result<CheckoutSession, ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = async {
            let mut session = self.get_session(session_id).await?;
            session.ensure_mutable()?;

            self.guard.clear_all(&session.scope).await?;
            session.cart = Cart::new();
            session.selection = Default::default();
            session.offer = None;
            session.status = SessionStatus::Canceled;
            session.canceled_at = Some(chrono::Utc::now());
            self.save_session(&session).await?;

            self.event_sender
                .send_or_log(Event::CartCleared(session_id))
                .await;
            self.event_sender
                .send_or_log(Event::CheckoutAbandoned(session_id))
                .await;

            info!(session_id = %session_id, "checkout abandoned");
            Ok(session)
        }
        .await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    fn service_summary(cart: &Cart) -> String {
        cart.items()
            .iter()
            .map(|i| format!("{}× {}", i.quantity, i.display_name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn build_appointment_request(
        &self,
        session: &CheckoutSession,
        method: PaymentMethod,
        notes: Option<String>,
        customer_email: Option<String>,
        customer_phone: Option<String>,
    ) -> Result<AppointmentRequest, ServiceError> {
        let address = session.selection.address.clone().ok_or_else(|| {
            ServiceError::ValidationError("Service address is required".to_string())
        })?;
        let date = session.selection.date.clone().ok_or_else(|| {
            ServiceError::ValidationError("Service date is required".to_string())
        })?;
        let time = session.selection.time.clone().ok_or_else(|| {
            ServiceError::ValidationError("Service time is required".to_string())
        })?;

        let booking_reference = format!(
            "BK-{}",
            Uuid::new_v4().to_string()[..8].to_uppercase()
        );

        Ok(AppointmentRequest {
            booking_reference,
            service_summary: Self::service_summary(&session.cart),
            line_items: session.cart.items().to_vec(),
            date,
            time,
            address,
            totals: self.price_session(session, Some(method)),
            payment_method_label: method.label().to_string(),
            notes,
            customer_email,
            customer_phone,
        })
    }

    /// Submits the booking. At-most-once: a submission already in flight,
    /// redirected, or completed rejects further attempts; only a failed one
    /// may retry.
    #[instrument(skip(self, input, bearer))]
    pub async fn submit(
        &self,
        session_id: Uuid,
        input: SubmitBookingInput,
        bearer: Option<&str>,
    ) -> Result<(CheckoutSession, FinalizeOutcome), ServiceError> {
        let lock = self.acquire_session_lock(session_id).await;
        let guard = lock.lock().await;

        let result = self.submit_locked(session_id, input, bearer).await;

        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    async fn submit_locked(
        &self,
        session_id: Uuid,
        input: SubmitBookingInput,
        bearer: Option<&str>,
    ) -> Result<(CheckoutSession, FinalizeOutcome), ServiceError> {
        let mut session = self.get_session(session_id).await?;
        session.ensure_open()?;

        match &session.submission {
            SubmissionState::InFlight => {
                return Err(ServiceError::Conflict(
                    "A submission is already in progress".to_string(),
                ));
            }
            SubmissionState::RedirectPending { .. } => {
                return Err(ServiceError::Conflict(
                    "A payment session has already been created".to_string(),
                ));
            }
            SubmissionState::Done { .. } => {
                return Err(ServiceError::Conflict(
                    "This booking was already submitted".to_string(),
                ));
            }
            SubmissionState::Idle | SubmissionState::Failed { .. } => {}
        }

        if session.step != CheckoutStep::ReviewAndPay {
            return Err(ServiceError::InvalidOperation(
                "Booking can only be submitted from the review step".to_string(),
            ));
        }
        if session.cart.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }
        let Some(method) = session.payment_method else {
            return Err(ServiceError::ValidationError(
                "A payment method must be selected".to_string(),
            ));
        };

        // An offer whose subtotal binding no longer matches the cart is
        // void; drop it rather than price against a stale discount.
        if let Some(offer) = &session.offer {
            if offer.applied_subtotal != session.cart.subtotal() {
                warn!(code = %offer.code, "dropping stale offer at submission");
                self.revoke_offer_for_mutation(&mut session).await;
            }
        }

        let auth = self.auth.current_context(bearer).await?;
        if !auth.is_authenticated {
            return Err(ServiceError::Unauthorized(
                "Sign in to submit a booking".to_string(),
            ));
        }
        let (customer_email, customer_phone) = auth
            .user
            .map(|u| (u.email, u.phone))
            .unwrap_or((None, None));

        let request = self.build_appointment_request(
            &session,
            method,
            input.notes,
            customer_email,
            customer_phone,
        )?;
        let booking_reference = request.booking_reference.clone();

        session.submission = SubmissionState::InFlight;
        session.touch(self.session_ttl());
        self.save_session(&session).await?;

        match self
            .dispatcher
            .finalize(&session.scope, &request, method)
            .await
        {
            Ok(FinalizeOutcome::Confirmed { appointment_id, .. }) => {
                session.submission = SubmissionState::Done {
                    appointment_id: appointment_id.clone(),
                    booking_reference: booking_reference.clone(),
                };
                session.status = SessionStatus::Completed;
                session.completed_at = Some(chrono::Utc::now());
                session.cart = Cart::new();
                session.offer = None;
                self.save_session(&session).await?;

                self.event_sender
                    .send_or_log(Event::AppointmentSubmitted {
                        session_id,
                        appointment_id: appointment_id.clone(),
                    })
                    .await;
                self.event_sender
                    .send_or_log(Event::CartCleared(session_id))
                    .await;
                self.event_sender
                    .send_or_log(Event::BookingConfirmed {
                        session_id,
                        appointment_id: appointment_id.clone(),
                        booking_reference: booking_reference.clone(),
                    })
                    .await;

                Ok((
                    session,
                    FinalizeOutcome::Confirmed {
                        appointment_id,
                        booking_reference,
                    },
                ))
            }
            Ok(FinalizeOutcome::RedirectPending {
                appointment_id,
                payment_url,
            }) => {
                session.submission = SubmissionState::RedirectPending {
                    appointment_id: appointment_id.clone(),
                    payment_url: payment_url.clone(),
                };
                self.save_session(&session).await?;

                self.event_sender
                    .send_or_log(Event::AppointmentSubmitted {
                        session_id,
                        appointment_id: appointment_id.clone(),
                    })
                    .await;
                self.event_sender
                    .send_or_log(Event::PaymentSessionCreated {
                        session_id,
                        appointment_id: appointment_id.clone(),
                    })
                    .await;

                Ok((
                    session,
                    FinalizeOutcome::RedirectPending {
                        appointment_id,
                        payment_url,
                    },
                ))
            }
            Err(err) => {
                // The cart is deliberately kept so the user can retry.
                session.submission = SubmissionState::Failed {
                    message: err.response_message(),
                };
                self.save_session(&session).await?;

                self.event_sender
                    .send_or_log(Event::BookingSubmissionFailed {
                        session_id,
                        message: err.response_message(),
                    })
                    .await;

                Err(err)
            }
        }
    }
}
