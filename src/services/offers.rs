use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::clients::OfferRulesApi;
use crate::errors::OfferError;
use crate::models::Offer;
use crate::services::pricing;

/// Validates discount codes against the offer rules collaborator and binds
/// the resolved discount to the subtotal it was computed for.
#[derive(Clone)]
pub struct OfferService {
    rules: Arc<dyn OfferRulesApi>,
}

impl OfferService {
    pub fn new(rules: Arc<dyn OfferRulesApi>) -> Self {
        Self { rules }
    }

    /// Resolves a code into an `Offer` for the given subtotal.
    ///
    /// The code is trimmed and uppercased before submission. The returned
    /// discount is already bound to `subtotal`; callers must not reuse it
    /// against a different amount without re-validating.
    #[instrument(skip(self, service_ids))]
    pub async fn validate(
        &self,
        code: &str,
        subtotal: Decimal,
        service_ids: &[String],
    ) -> Result<Offer, OfferError> {
        let normalized = code.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(OfferError::InvalidCode);
        }

        let grant = self
            .rules
            .validate(&normalized, subtotal, service_ids)
            .await?;

        // The collaborator reports an absolute amount; when it doesn't,
        // derive one from the grant terms. Either way the discount is
        // clamped to the subtotal it was computed against.
        let reported = grant.discount_amount.max(Decimal::ZERO).min(subtotal);
        let computed_discount_amount = if reported > Decimal::ZERO {
            reported
        } else {
            pricing::discount_for(grant.discount_type, grant.discount_value, subtotal)
        };

        info!(
            code = %normalized,
            %subtotal,
            discount = %computed_discount_amount,
            "offer validated"
        );

        Ok(Offer {
            code: normalized,
            name: grant.name,
            discount_type: grant.discount_type,
            discount_value: grant.discount_value,
            computed_discount_amount,
            applied_subtotal: subtotal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::OfferGrant;
    use crate::models::DiscountType;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct StubRules {
        result: Mutex<Option<Result<OfferGrant, OfferError>>>,
        seen_code: Mutex<Option<String>>,
    }

    impl StubRules {
        fn returning(result: Result<OfferGrant, OfferError>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                seen_code: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl OfferRulesApi for StubRules {
        async fn validate(
            &self,
            code: &str,
            _order_amount: Decimal,
            _service_ids: &[String],
        ) -> Result<OfferGrant, OfferError> {
            *self.seen_code.lock().unwrap() = Some(code.to_string());
            self.result.lock().unwrap().take().expect("single use stub")
        }
    }

    fn percentage_grant(value: Decimal, amount: Decimal) -> OfferGrant {
        OfferGrant {
            name: Some("Save".to_string()),
            discount_type: DiscountType::Percentage,
            discount_value: value,
            discount_amount: amount,
        }
    }

    #[tokio::test]
    async fn code_is_trimmed_and_uppercased_before_submission() {
        let rules = StubRules::returning(Ok(percentage_grant(dec!(10), dec!(20.00))));
        let service = OfferService::new(rules.clone());

        let offer = service
            .validate("  save10 ", dec!(200.00), &[])
            .await
            .unwrap();

        assert_eq!(rules.seen_code.lock().unwrap().as_deref(), Some("SAVE10"));
        assert_eq!(offer.code, "SAVE10");
    }

    #[tokio::test]
    async fn percentage_offer_binds_discount_to_subtotal() {
        let rules = StubRules::returning(Ok(percentage_grant(dec!(10), dec!(20.00))));
        let service = OfferService::new(rules);

        let offer = service.validate("SAVE10", dec!(200.00), &[]).await.unwrap();

        assert_eq!(offer.computed_discount_amount, dec!(20.00));
        assert_eq!(offer.applied_subtotal, dec!(200.00));
    }

    #[tokio::test]
    async fn discount_never_exceeds_subtotal() {
        let rules = StubRules::returning(Ok(OfferGrant {
            name: None,
            discount_type: DiscountType::Fixed,
            discount_value: dec!(500.00),
            discount_amount: dec!(500.00),
        }));
        let service = OfferService::new(rules);

        let offer = service.validate("BIG", dec!(120.00), &[]).await.unwrap();
        assert_eq!(offer.computed_discount_amount, dec!(120.00));
    }

    #[tokio::test]
    async fn empty_code_is_rejected_without_a_network_call() {
        let rules = StubRules::returning(Err(OfferError::InvalidCode));
        let service = OfferService::new(rules.clone());

        let err = service.validate("   ", dec!(100.00), &[]).await.unwrap_err();
        assert_eq!(err, OfferError::InvalidCode);
        // The stub was never consumed
        assert!(rules.seen_code.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn collaborator_failure_passes_through_typed() {
        let rules = StubRules::returning(Err(OfferError::Expired));
        let service = OfferService::new(rules);

        let err = service.validate("OLD", dec!(100.00), &[]).await.unwrap_err();
        assert_eq!(err, OfferError::Expired);
    }
}
