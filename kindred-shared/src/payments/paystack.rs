//! Paystack transactions
//!
//! `initialize` returns a hosted checkout URL for our reference;
//! `verify` reads `/transaction/verify/{reference}`. Paystack amounts are
//! already in minor units (kobo, pesewas, cents).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use super::{
    api_error, PaymentError, PaymentGateway, PaymentProvider, PaymentRequest, PaymentSession,
    PaymentVerification, VerificationStatus,
};

const SUPPORTED_CURRENCIES: &[&str] = &["NGN", "GHS", "KES", "ZAR", "USD"];

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    /// Secret key; also signs webhooks
    pub secret_key: String,
    pub api_base: String,
    pub timeout_seconds: u64,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            api_base: "https://api.paystack.co".to_string(),
            timeout_seconds: 15,
        }
    }
}

/// Paystack wraps every response in `{ status, message, data }`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    gateway_response: Option<String>,
}

#[derive(Debug)]
pub struct PaystackGateway {
    http: reqwest::Client,
    api_base: String,
}

impl PaystackGateway {
    pub fn new(config: &PaystackConfig) -> Result<Self, PaymentError> {
        if config.secret_key.is_empty() {
            return Err(PaymentError::Config("Paystack secret key is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.secret_key))
            .map_err(|_| PaymentError::Config("Invalid Paystack key format".into()))?;
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
}

/// Decodes an envelope, turning `status: false` into a rejection
fn open_envelope<T: for<'de> Deserialize<'de>>(raw: &JsonValue) -> Result<T, PaymentError> {
    let envelope: Envelope<T> =
        serde_json::from_value(raw.clone()).map_err(|e| PaymentError::Rejected {
            provider: PaymentProvider::Paystack,
            message: format!("Unexpected response shape: {}", e),
        })?;

    match (envelope.status, envelope.data) {
        (true, Some(data)) => Ok(data),
        _ => Err(PaymentError::Rejected {
            provider: PaymentProvider::Paystack,
            message: envelope.message,
        }),
    }
}

pub(crate) fn transaction_status(status: &str) -> VerificationStatus {
    match status {
        "success" => VerificationStatus::Succeeded,
        "failed" | "abandoned" | "reversed" => VerificationStatus::Failed,
        _ => VerificationStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Paystack
    }

    fn supports_currency(&self, currency: &str) -> bool {
        SUPPORTED_CURRENCIES.contains(&currency)
    }

    async fn initialize(&self, request: &PaymentRequest) -> Result<PaymentSession, PaymentError> {
        let mut body = json!({
            "email": request.donor_email,
            "amount": request.amount_minor,
            "currency": request.currency,
            "reference": request.reference,
            "metadata": {
                "donor_name": request.donor_name,
                "description": request.description,
                "extra": request.metadata,
            },
        });
        if let Some(callback) = &request.callback_url {
            body["callback_url"] = json!(callback);
        }

        let resp = self
            .http
            .post(format!("{}/transaction/initialize", self.api_base))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(PaymentProvider::Paystack, &resp));
        }

        let raw: JsonValue = resp.json().await?;
        let data: InitializeData = open_envelope(&raw)?;

        Ok(PaymentSession {
            provider: PaymentProvider::Paystack,
            reference: data.reference,
            authorization_url: Some(data.authorization_url),
            client_secret: None,
            raw,
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, PaymentError> {
        let resp = self
            .http
            .get(format!("{}/transaction/verify/{}", self.api_base, reference))
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::NotFound(reference.to_string()));
        }
        if !resp.status().is_success() {
            return Err(api_error(PaymentProvider::Paystack, &resp));
        }

        let raw: JsonValue = resp.json().await?;
        let data: VerifyData = open_envelope(&raw)?;
        let status = transaction_status(&data.status);
        let failure_reason = (status == VerificationStatus::Failed)
            .then(|| data.gateway_response.clone().unwrap_or_else(|| data.status.clone()));

        Ok(PaymentVerification {
            provider: PaymentProvider::Paystack,
            reference: data.reference,
            status,
            amount_minor: data.amount,
            currency: data.currency.to_ascii_uppercase(),
            failure_reason,
            raw,
        })
    }
}
