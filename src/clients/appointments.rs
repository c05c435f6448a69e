use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::ServiceError;
use crate::models::AppointmentRequest;

/// Status an appointment is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Awaiting external payment confirmation.
    Pending,
    /// Confirmed at creation time (direct payment methods).
    Confirmed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedAppointment {
    pub appointment_id: String,
    pub status: String,
}

/// Appointment service collaborator contract.
#[async_trait]
pub trait AppointmentsApi: Send + Sync {
    async fn create(
        &self,
        request: &AppointmentRequest,
        status: AppointmentStatus,
    ) -> Result<CreatedAppointment, ServiceError>;

    async fn update(&self, id: &str, fields: &serde_json::Value) -> Result<(), ServiceError>;
}

#[derive(Serialize)]
struct CreateAppointmentBody<'a> {
    status: AppointmentStatus,
    #[serde(flatten)]
    request: &'a AppointmentRequest,
}

#[derive(Deserialize)]
struct CreateAppointmentResponse {
    appointment_id: String,
    appointment: AppointmentSummary,
}

#[derive(Deserialize)]
struct AppointmentSummary {
    status: String,
}

#[derive(Debug, Clone)]
pub struct HttpAppointmentsClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAppointmentsClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AppointmentsApi for HttpAppointmentsClient {
    #[instrument(skip(self, request), fields(booking_reference = %request.booking_reference))]
    async fn create(
        &self,
        request: &AppointmentRequest,
        status: AppointmentStatus,
    ) -> Result<CreatedAppointment, ServiceError> {
        let url = format!("{}/v1/appointments", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&CreateAppointmentBody { status, request })
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "appointment service returned {}",
                response.status()
            )));
        }

        let body: CreateAppointmentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        Ok(CreatedAppointment {
            appointment_id: body.appointment_id,
            status: body.appointment.status,
        })
    }

    #[instrument(skip(self, fields))]
    async fn update(&self, id: &str, fields: &serde_json::Value) -> Result<(), ServiceError> {
        let url = format!("{}/v1/appointments/{}", self.base_url, id);
        let response = self
            .http
            .put(&url)
            .json(fields)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "appointment service returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
