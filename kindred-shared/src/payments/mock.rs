//! In-process gateway for development and tests
//!
//! Every initialized payment succeeds on verification unless the donor email
//! contains `+decline`, which makes it fail. Sessions live in memory, so a
//! restart forgets them.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    PaymentError, PaymentGateway, PaymentProvider, PaymentRequest, PaymentSession,
    PaymentVerification, VerificationStatus,
};

#[derive(Debug, Clone)]
struct MockPayment {
    amount_minor: i64,
    currency: String,
    declined: bool,
}

#[derive(Debug, Default)]
pub struct MockGateway {
    payments: Mutex<HashMap<String, MockPayment>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn payments(&self) -> std::sync::MutexGuard<'_, HashMap<String, MockPayment>> {
        // A poisoned map is still usable; a panicking test already failed
        self.payments.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Mock
    }

    fn supports_currency(&self, _currency: &str) -> bool {
        true
    }

    async fn initialize(&self, request: &PaymentRequest) -> Result<PaymentSession, PaymentError> {
        let reference = format!("mock_{}", request.reference.trim_start_matches("knd_"));
        let declined = request.donor_email.contains("+decline");

        self.payments().insert(
            reference.clone(),
            MockPayment {
                amount_minor: request.amount_minor,
                currency: request.currency.clone(),
                declined,
            },
        );

        let base = request.callback_url.as_deref().unwrap_or("/mock-checkout");
        let separator = if base.contains('?') { '&' } else { '?' };

        Ok(PaymentSession {
            provider: PaymentProvider::Mock,
            authorization_url: Some(format!("{}{}reference={}", base, separator, reference)),
            client_secret: None,
            raw: json!({ "reference": reference, "declined": declined }),
            reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, PaymentError> {
        let payment = self
            .payments()
            .get(reference)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(reference.to_string()))?;

        let (status, failure_reason) = if payment.declined {
            (VerificationStatus::Failed, Some("Card declined".to_string()))
        } else {
            (VerificationStatus::Succeeded, None)
        };

        Ok(PaymentVerification {
            provider: PaymentProvider::Mock,
            reference: reference.to_string(),
            status,
            amount_minor: payment.amount_minor,
            currency: payment.currency,
            failure_reason,
            raw: json!({ "reference": reference, "status": status }),
        })
    }
}
