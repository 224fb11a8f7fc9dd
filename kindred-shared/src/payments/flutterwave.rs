//! Flutterwave Standard (hosted payments)
//!
//! Flutterwave takes and reports amounts in major units, so values are
//! converted at this boundary. Every currency accepted here has two decimal
//! places.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use super::{
    api_error, PaymentError, PaymentGateway, PaymentProvider, PaymentRequest, PaymentSession,
    PaymentVerification, VerificationStatus,
};

const SUPPORTED_CURRENCIES: &[&str] = &["NGN", "GHS", "KES", "ZAR", "USD", "EUR", "GBP"];

#[derive(Debug, Clone)]
pub struct FlutterwaveConfig {
    pub secret_key: String,

    /// Value Flutterwave sends back in the `verif-hash` webhook header
    pub webhook_hash: Option<String>,

    pub api_base: String,
    pub timeout_seconds: u64,
}

impl Default for FlutterwaveConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_hash: None,
            api_base: "https://api.flutterwave.com".to_string(),
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaymentLink {
    link: String,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    status: String,
    tx_ref: String,
    amount: f64,
    currency: String,
    #[serde(default)]
    processor_response: Option<String>,
}

#[derive(Debug)]
pub struct FlutterwaveGateway {
    http: reqwest::Client,
    api_base: String,
}

impl FlutterwaveGateway {
    pub fn new(config: &FlutterwaveConfig) -> Result<Self, PaymentError> {
        if config.secret_key.is_empty() {
            return Err(PaymentError::Config("Flutterwave secret key is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.secret_key))
            .map_err(|_| PaymentError::Config("Invalid Flutterwave key format".into()))?;
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

fn open_envelope<T: for<'de> Deserialize<'de>>(raw: &JsonValue) -> Result<T, PaymentError> {
    let envelope: Envelope<T> =
        serde_json::from_value(raw.clone()).map_err(|e| PaymentError::Rejected {
            provider: PaymentProvider::Flutterwave,
            message: format!("Unexpected response shape: {}", e),
        })?;

    match (envelope.status.as_str(), envelope.data) {
        ("success", Some(data)) => Ok(data),
        _ => Err(PaymentError::Rejected {
            provider: PaymentProvider::Flutterwave,
            message: envelope.message,
        }),
    }
}

pub(crate) fn to_major(amount_minor: i64) -> f64 {
    amount_minor as f64 / 100.0
}

pub(crate) fn to_minor(amount_major: f64) -> i64 {
    (amount_major * 100.0).round() as i64
}

pub(crate) fn transaction_status(status: &str) -> VerificationStatus {
    match status {
        "successful" => VerificationStatus::Succeeded,
        "failed" | "cancelled" => VerificationStatus::Failed,
        _ => VerificationStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for FlutterwaveGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Flutterwave
    }

    fn supports_currency(&self, currency: &str) -> bool {
        SUPPORTED_CURRENCIES.contains(&currency)
    }

    async fn initialize(&self, request: &PaymentRequest) -> Result<PaymentSession, PaymentError> {
        let mut body = json!({
            "tx_ref": request.reference,
            "amount": to_major(request.amount_minor),
            "currency": request.currency,
            "customer": {
                "email": request.donor_email,
                "name": request.donor_name,
            },
            "customizations": {
                "title": request.description,
            },
            "meta": request.metadata,
        });
        if let Some(callback) = &request.callback_url {
            body["redirect_url"] = json!(callback);
        }

        let resp = self
            .http
            .post(format!("{}/v3/payments", self.api_base))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(PaymentProvider::Flutterwave, &resp));
        }

        let raw: JsonValue = resp.json().await?;
        let data: PaymentLink = open_envelope(&raw)?;

        Ok(PaymentSession {
            provider: PaymentProvider::Flutterwave,
            reference: request.reference.clone(),
            authorization_url: Some(data.link),
            client_secret: None,
            raw,
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, PaymentError> {
        let resp = self
            .http
            .get(format!("{}/v3/transactions/verify_by_reference", self.api_base))
            .query(&[("tx_ref", reference)])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::NotFound(reference.to_string()));
        }
        if !resp.status().is_success() {
            return Err(api_error(PaymentProvider::Flutterwave, &resp));
        }

        let raw: JsonValue = resp.json().await?;
        let tx: Transaction = open_envelope(&raw)?;
        let status = transaction_status(&tx.status);
        let failure_reason = (status == VerificationStatus::Failed)
            .then(|| tx.processor_response.clone().unwrap_or_else(|| tx.status.clone()));

        Ok(PaymentVerification {
            provider: PaymentProvider::Flutterwave,
            reference: tx.tx_ref,
            status,
            amount_minor: to_minor(tx.amount),
            currency: tx.currency.to_ascii_uppercase(),
            failure_reason,
            raw,
        })
    }
}
