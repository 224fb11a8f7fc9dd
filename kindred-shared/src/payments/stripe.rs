//! Stripe PaymentIntents
//!
//! Stripe has no hosted page in this flow: `initialize` creates a
//! PaymentIntent and hands its `client_secret` to the browser, which confirms
//! the card with Stripe.js. The PaymentIntent id is the reference.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

use super::{
    api_error, PaymentError, PaymentGateway, PaymentProvider, PaymentRequest, PaymentSession,
    PaymentVerification, VerificationStatus,
};

const SUPPORTED_CURRENCIES: &[&str] = &["USD", "EUR", "GBP", "ZAR", "KES", "NGN"];

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,

    /// `whsec_...` signing secret for webhook events
    pub webhook_secret: Option<String>,

    pub api_base: String,
    pub timeout_seconds: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: None,
            api_base: "https://api.stripe.com".to_string(),
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug)]
pub struct StripeGateway {
    http: reqwest::Client,
    api_base: String,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        if config.secret_key.is_empty() {
            return Err(PaymentError::Config("Stripe secret key is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.secret_key))
            .map_err(|_| PaymentError::Config("Invalid Stripe key format".into()))?;
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn read_intent(
        &self,
        resp: reqwest::Response,
    ) -> Result<(PaymentIntent, JsonValue), PaymentError> {
        if !resp.status().is_success() {
            return Err(api_error(PaymentProvider::Stripe, &resp));
        }

        let raw: JsonValue = resp.json().await?;
        let intent: PaymentIntent = serde_json::from_value(raw.clone()).map_err(|e| {
            PaymentError::Rejected {
                provider: PaymentProvider::Stripe,
                message: format!("Unexpected PaymentIntent shape: {}", e),
            }
        })?;

        Ok((intent, raw))
    }
}

/// Maps a PaymentIntent status onto ours
pub(crate) fn intent_status(status: &str) -> VerificationStatus {
    match status {
        "succeeded" => VerificationStatus::Succeeded,
        "canceled" => VerificationStatus::Failed,
        _ => VerificationStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    fn supports_currency(&self, currency: &str) -> bool {
        SUPPORTED_CURRENCIES.contains(&currency)
    }

    async fn initialize(&self, request: &PaymentRequest) -> Result<PaymentSession, PaymentError> {
        let amount = request.amount_minor.to_string();
        let currency = request.currency.to_ascii_lowercase();
        let form = [
            ("amount", amount.as_str()),
            ("currency", currency.as_str()),
            ("description", request.description.as_str()),
            ("receipt_email", request.donor_email.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
            ("metadata[reference]", request.reference.as_str()),
            ("metadata[donor_name]", request.donor_name.as_str()),
        ];

        let resp = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .header("Idempotency-Key", request.reference.as_str())
            .form(&form)
            .send()
            .await?;

        let (intent, raw) = self.read_intent(resp).await?;
        debug!(reference = %intent.id, "Created Stripe PaymentIntent");

        Ok(PaymentSession {
            provider: PaymentProvider::Stripe,
            reference: intent.id,
            authorization_url: None,
            client_secret: intent.client_secret,
            raw,
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, PaymentError> {
        let resp = self
            .http
            .get(format!("{}/v1/payment_intents/{}", self.api_base, reference))
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::NotFound(reference.to_string()));
        }

        let (intent, raw) = self.read_intent(resp).await?;
        let status = intent_status(&intent.status);
        let failure_reason = match status {
            VerificationStatus::Failed => Some(
                intent
                    .last_payment_error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| format!("PaymentIntent {}", intent.status)),
            ),
            _ => None,
        };

        Ok(PaymentVerification {
            provider: PaymentProvider::Stripe,
            reference: intent.id,
            status,
            amount_minor: intent.amount,
            currency: intent.currency.to_ascii_uppercase(),
            failure_reason,
            raw,
        })
    }
}
