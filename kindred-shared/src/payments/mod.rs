//! Payment gateways
//!
//! Every provider implements [`PaymentGateway`]: `initialize` opens a hosted
//! checkout (or a Stripe PaymentIntent) and returns the reference that later
//! identifies the payment, `verify` asks the provider for the payment's
//! current state. Webhooks are only a trigger; the handler always re-verifies
//! with the provider before fulfilling.
//!
//! # Example
//!
//! ```no_run
//! use kindred_shared::payments::{GatewayRegistry, MockGateway, PaymentProvider};
//! use std::sync::Arc;
//!
//! let mut registry = GatewayRegistry::new();
//! registry.register(Arc::new(MockGateway::new()));
//! assert!(registry.get(PaymentProvider::Mock).is_ok());
//! ```

pub mod flutterwave;
pub mod mock;
pub mod paystack;
pub mod stripe;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use flutterwave::{FlutterwaveConfig, FlutterwaveGateway};
pub use mock::MockGateway;
pub use paystack::{PaystackConfig, PaystackGateway};
pub use stripe::{StripeConfig, StripeGateway};

/// Supported payment providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    Paystack,
    Flutterwave,
    Mock,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Paystack => "paystack",
            PaymentProvider::Flutterwave => "flutterwave",
            PaymentProvider::Mock => "mock",
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Ok(PaymentProvider::Stripe),
            "paystack" => Ok(PaymentProvider::Paystack),
            "flutterwave" => Ok(PaymentProvider::Flutterwave),
            "mock" => Ok(PaymentProvider::Mock),
            _ => Err(PaymentError::UnknownProvider(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: PaymentProvider,
        status: u16,
        message: String,
    },

    #[error("{provider} rejected the request: {message}")]
    Rejected {
        provider: PaymentProvider,
        message: String,
    },

    #[error("Unknown payment provider: {0}")]
    UnknownProvider(String),

    #[error("Payment provider {0} is not configured")]
    NotConfigured(PaymentProvider),

    #[error("{provider} does not accept {currency}")]
    UnsupportedCurrency {
        provider: PaymentProvider,
        currency: String,
    },

    #[error("Payment not found: {0}")]
    NotFound(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// What a donor is paying for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Our reference; Stripe replaces it with the PaymentIntent id
    pub reference: String,

    pub amount_minor: i64,

    /// ISO 4217, upper case
    pub currency: String,

    pub donor_name: String,
    pub donor_email: String,

    /// Shown on the checkout page
    pub description: String,

    /// Where hosted checkouts send the donor afterwards
    pub callback_url: Option<String>,

    pub metadata: JsonValue,
}

/// A started payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub provider: PaymentProvider,

    /// Identifier to verify the payment with later
    pub reference: String,

    /// Hosted checkout page (Paystack, Flutterwave, mock)
    pub authorization_url: Option<String>,

    /// Client-side confirmation secret (Stripe)
    pub client_secret: Option<String>,

    pub raw: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Succeeded,
    Pending,
    Failed,
}

/// The provider's view of a payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub provider: PaymentProvider,
    pub reference: String,
    pub status: VerificationStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub failure_reason: Option<String>,
    pub raw: JsonValue,
}

impl PaymentVerification {
    pub fn is_success(&self) -> bool {
        self.status == VerificationStatus::Succeeded
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Whether the provider settles in `currency` (ISO 4217, upper case)
    fn supports_currency(&self, currency: &str) -> bool;

    async fn initialize(&self, request: &PaymentRequest) -> Result<PaymentSession, PaymentError>;

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, PaymentError>;
}

/// Generates a reference for a new payment attempt
pub fn generate_reference() -> String {
    format!("knd_{}", Uuid::new_v4().simple())
}

/// Configured gateways, keyed by provider
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a gateway, replacing any previous one for the same provider
    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.provider(), gateway);
    }

    pub fn get(&self, provider: PaymentProvider) -> Result<Arc<dyn PaymentGateway>, PaymentError> {
        self.gateways
            .get(&provider)
            .cloned()
            .ok_or(PaymentError::NotConfigured(provider))
    }

    pub fn is_enabled(&self, provider: PaymentProvider) -> bool {
        self.gateways.contains_key(&provider)
    }

    /// Enabled providers in a stable order
    pub fn providers(&self) -> Vec<PaymentProvider> {
        let mut providers: Vec<_> = self.gateways.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}

/// Builds the error for a non-2xx gateway response
pub(crate) fn api_error(provider: PaymentProvider, resp: &reqwest::Response) -> PaymentError {
    let status = resp.status();
    PaymentError::Api {
        provider,
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("Unknown").into(),
    }
}
