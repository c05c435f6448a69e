use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::ServiceError;

/// Input for an external payment session, scoped to one appointment and the
/// exact amount the user owes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSessionRequest {
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSessionHandle {
    pub payment_url: String,
}

/// Payment gateway collaborator contract.
#[async_trait]
pub trait PaymentGatewayApi: Send + Sync {
    async fn create_session(
        &self,
        request: &PaymentSessionRequest,
    ) -> Result<PaymentSessionHandle, ServiceError>;
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    payment_url: String,
}

#[derive(Debug, Clone)]
pub struct HttpPaymentGatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPaymentGatewayClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PaymentGatewayApi for HttpPaymentGatewayClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(
        &self,
        request: &PaymentSessionRequest,
    ) -> Result<PaymentSessionHandle, ServiceError> {
        let url = format!("{}/v1/payment-sessions", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "payment gateway returned {}",
                response.status()
            )));
        }

        let body: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        Ok(PaymentSessionHandle {
            payment_url: body.payment_url,
        })
    }
}
