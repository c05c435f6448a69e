use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::clients::{AppointmentStatus, AppointmentsApi, CreatedAppointment};
use crate::errors::ServiceError;
use crate::models::AppointmentRequest;
use crate::services::continuity::SessionContinuityGuard;

/// Commits finalized orders to the appointment collaborator and clears
/// durable checkout state once a booking can no longer be lost.
#[derive(Clone)]
pub struct BookingFinalizer {
    appointments: Arc<dyn AppointmentsApi>,
    guard: SessionContinuityGuard,
}

impl BookingFinalizer {
    pub fn new(appointments: Arc<dyn AppointmentsApi>, guard: SessionContinuityGuard) -> Self {
        Self {
            appointments,
            guard,
        }
    }

    fn submission_error(err: ServiceError) -> ServiceError {
        match err {
            ServiceError::ExternalServiceError(msg) => ServiceError::Submission(msg),
            other => other,
        }
    }

    /// Direct path: the appointment is confirmed at creation, and the
    /// persisted checkout state is cleared immediately after.
    #[instrument(skip(self, request), fields(booking_reference = %request.booking_reference))]
    pub async fn commit_confirmed(
        &self,
        scope: &str,
        request: &AppointmentRequest,
    ) -> Result<CreatedAppointment, ServiceError> {
        let created = self
            .appointments
            .create(request, AppointmentStatus::Confirmed)
            .await
            .map_err(Self::submission_error)?;

        self.guard.clear_all(scope).await?;

        info!(
            appointment_id = %created.appointment_id,
            "booking committed and session state cleared"
        );
        Ok(created)
    }

    /// Redirect path, first leg: the appointment is created pending and the
    /// durable checkout state is left untouched until a payment session
    /// exists.
    #[instrument(skip(self, request), fields(booking_reference = %request.booking_reference))]
    pub async fn commit_pending(
        &self,
        request: &AppointmentRequest,
    ) -> Result<CreatedAppointment, ServiceError> {
        self.appointments
            .create(request, AppointmentStatus::Pending)
            .await
            .map_err(Self::submission_error)
    }

    /// Clears durable checkout state; the redirect path calls this before
    /// control leaves the process.
    pub async fn clear_session_state(&self, scope: &str) -> Result<(), ServiceError> {
        self.guard.clear_all(scope).await
    }

    /// Best-effort annotation of a pending appointment whose payment session
    /// could not be created. The appointment itself is left for
    /// reconciliation.
    pub async fn flag_payment_failure(&self, appointment_id: &str) {
        let fields = serde_json::json!({ "payment_status": "failed" });
        if let Err(e) = self.appointments.update(appointment_id, &fields).await {
            warn!(
                %appointment_id,
                "could not flag payment failure on pending appointment: {}",
                e
            );
        }
    }
}
