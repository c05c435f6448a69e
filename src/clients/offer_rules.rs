use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::errors::OfferError;
use crate::models::DiscountType;

/// Resolved discount as returned by the offer rules collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferGrant {
    pub name: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub discount_amount: Decimal,
}

/// Offer rules collaborator contract.
#[async_trait]
pub trait OfferRulesApi: Send + Sync {
    async fn validate(
        &self,
        code: &str,
        order_amount: Decimal,
        service_ids: &[String],
    ) -> Result<OfferGrant, OfferError>;
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    code: &'a str,
    order_amount: Decimal,
    service_ids: &'a [String],
}

#[derive(Deserialize)]
struct ValidateResponse {
    success: bool,
    #[serde(default)]
    offer: Option<OfferPayload>,
    #[serde(default)]
    discount_amount: Option<Decimal>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct OfferPayload {
    discount_type: String,
    discount_value: Decimal,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpOfferRulesClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpOfferRulesClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Maps a collaborator rejection message onto the typed taxonomy.
    fn rejection_from_message(message: Option<String>) -> OfferError {
        let message = message.unwrap_or_default().to_lowercase();
        if message.contains("expired") {
            OfferError::Expired
        } else if message.contains("invalid") || message.contains("not found") {
            OfferError::InvalidCode
        } else {
            OfferError::NotApplicable
        }
    }
}

#[async_trait]
impl OfferRulesApi for HttpOfferRulesClient {
    #[instrument(skip(self, service_ids))]
    async fn validate(
        &self,
        code: &str,
        order_amount: Decimal,
        service_ids: &[String],
    ) -> Result<OfferGrant, OfferError> {
        let url = format!("{}/v1/offers/validate", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&ValidateRequest {
                code,
                order_amount,
                service_ids,
            })
            .send()
            .await
            .map_err(|e| OfferError::Network(e.to_string()))?;

        if !response.status().is_success() {
            warn!("Offer rules service returned {}", response.status());
            return Err(OfferError::Network(format!(
                "offer rules service returned {}",
                response.status()
            )));
        }

        let body: ValidateResponse = response
            .json()
            .await
            .map_err(|e| OfferError::Network(e.to_string()))?;

        if !body.success {
            return Err(Self::rejection_from_message(body.message));
        }

        let offer = body.offer.ok_or(OfferError::NotApplicable)?;
        let discount_type = match offer.discount_type.as_str() {
            "percentage" => DiscountType::Percentage,
            "fixed" => DiscountType::Fixed,
            other => {
                warn!("Unknown discount type from offer rules service: {}", other);
                return Err(OfferError::NotApplicable);
            }
        };

        Ok(OfferGrant {
            name: offer.name,
            discount_type,
            discount_value: offer.discount_value,
            discount_amount: body.discount_amount.unwrap_or(Decimal::ZERO),
        })
    }
}
