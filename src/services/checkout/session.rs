//! The checkout session aggregate: one user's trip through the four-step
//! wizard, modeled so invalid combinations (submitting from step 1, moving
//! while a redirect payment is pending) are unrepresentable or rejected.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::errors::ServiceError;
use crate::models::{
    Cart, CheckoutStep, Offer, PaymentMethod, Selection, SubmissionState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Completed,
    Canceled,
}

/// Result of a forward navigation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepAdvance {
    /// The wizard moved to a new step.
    Moved { step: CheckoutStep },
    /// Forward progress is blocked on authentication; the caller must save a
    /// handoff snapshot and send the user through the auth flow.
    AuthRequired,
    /// Step 4 with a payment method selected: the session is ready for
    /// `submit`, there is no fifth step to move to.
    ReadyToSubmit,
}

/// Result of a backward navigation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepRetreat {
    Moved { step: CheckoutStep },
    /// Backward from step 1 leaves the wizard. The cart stays persisted;
    /// only explicit abandonment clears it.
    ExitCheckout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: Uuid,
    /// Continuity scope the durable snapshots are keyed by.
    pub scope: String,
    pub status: SessionStatus,
    pub step: CheckoutStep,
    pub cart: Cart,
    pub selection: Selection,
    pub offer: Option<Offer>,
    pub payment_method: Option<PaymentMethod>,
    pub submission: SubmissionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl CheckoutSession {
    pub fn new(scope: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            scope,
            status: SessionStatus::Open,
            step: CheckoutStep::ItemSelection,
            cart: Cart::new(),
            selection: Selection::default(),
            offer: None,
            payment_method: None,
            submission: SubmissionState::Idle,
            created_at: now,
            updated_at: None,
            expires_at: now + ttl,
            completed_at: None,
            canceled_at: None,
        }
    }

    pub fn touch(&mut self, ttl: Duration) {
        let now = Utc::now();
        self.updated_at = Some(now);
        self.expires_at = now + ttl;
    }

    /// The wizard locks once a submission has been dispatched: in flight,
    /// redirected to the gateway, or completed. A failed submission unlocks
    /// so the user can retry.
    pub fn navigation_locked(&self) -> bool {
        !matches!(
            self.submission,
            SubmissionState::Idle | SubmissionState::Failed { .. }
        )
    }

    pub fn ensure_open(&self) -> Result<(), ServiceError> {
        match self.status {
            SessionStatus::Completed => Err(ServiceError::InvalidOperation(
                "Session already completed".to_string(),
            )),
            SessionStatus::Canceled => Err(ServiceError::InvalidOperation(
                "Session is canceled".to_string(),
            )),
            SessionStatus::Open => {
                if self.expires_at <= Utc::now() {
                    Err(ServiceError::InvalidOperation(
                        "Checkout session has expired".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn ensure_unlocked(&self) -> Result<(), ServiceError> {
        if self.navigation_locked() {
            return Err(ServiceError::InvalidOperation(
                "Checkout is locked while a submission is in progress".to_string(),
            ));
        }
        Ok(())
    }

    /// Gate for cart/selection/offer mutations.
    pub fn ensure_mutable(&self) -> Result<(), ServiceError> {
        self.ensure_open()?;
        self.ensure_unlocked()
    }

    /// Forward navigation, gated on the current step's completeness.
    pub fn advance(&mut self, auth: &AuthContext) -> Result<StepAdvance, ServiceError> {
        self.ensure_open()?;
        self.ensure_unlocked()?;

        match self.step {
            CheckoutStep::ItemSelection => {
                if self.cart.is_empty() {
                    return Err(ServiceError::ValidationError(
                        "Cart is empty".to_string(),
                    ));
                }
                if !auth.is_authenticated {
                    // Blocked, not failed: the caller persists a handoff
                    // snapshot and resumes after authentication.
                    return Ok(StepAdvance::AuthRequired);
                }
                self.step = CheckoutStep::Address;
                Ok(StepAdvance::Moved { step: self.step })
            }
            CheckoutStep::Address => {
                if !self.selection.address_complete() {
                    return Err(ServiceError::ValidationError(
                        "Service address is required".to_string(),
                    ));
                }
                self.step = CheckoutStep::Schedule;
                Ok(StepAdvance::Moved { step: self.step })
            }
            CheckoutStep::Schedule => {
                if !self.selection.schedule_complete() {
                    return Err(ServiceError::ValidationError(
                        "Service date and time are required".to_string(),
                    ));
                }
                self.step = CheckoutStep::ReviewAndPay;
                Ok(StepAdvance::Moved { step: self.step })
            }
            CheckoutStep::ReviewAndPay => {
                if self.payment_method.is_none() {
                    return Err(ServiceError::ValidationError(
                        "A payment method must be selected".to_string(),
                    ));
                }
                Ok(StepAdvance::ReadyToSubmit)
            }
        }
    }

    /// Backward navigation; always allowed while the wizard is unlocked.
    pub fn retreat(&mut self) -> Result<StepRetreat, ServiceError> {
        self.ensure_open()?;
        self.ensure_unlocked()?;

        match self.step.pred() {
            Some(prev) => {
                self.step = prev;
                Ok(StepRetreat::Moved { step: prev })
            }
            None => Ok(StepRetreat::ExitCheckout),
        }
    }

    /// Direct navigation: any visited step, or a restart at step 1. Skipping
    /// ahead is never allowed.
    pub fn go_to(&mut self, target: CheckoutStep) -> Result<CheckoutStep, ServiceError> {
        self.ensure_open()?;
        self.ensure_unlocked()?;

        if target > self.step && target != CheckoutStep::ItemSelection {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot skip ahead to step {} from step {}",
                target.number(),
                self.step.number()
            )));
        }
        self.step = target;
        Ok(self.step)
    }
}
