//! Webhook authentication and parsing
//!
//! Signatures are checked against the raw request body before it is parsed.
//! A verified webhook only yields a payment reference; the caller still
//! re-verifies the payment with the provider before fulfilling it.
//!
//! - Stripe: `Stripe-Signature: t=<unix>,v1=<hex>`, HMAC-SHA256 over
//!   `"{t}.{body}"` with the endpoint secret, timestamps within 5 minutes
//! - Paystack: `x-paystack-signature`, hex HMAC-SHA512 of the body keyed with
//!   the secret key
//! - Flutterwave: `verif-hash` must equal the configured hash

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde_json::Value as JsonValue;
use sha2::{Sha256, Sha512};

use super::{PaymentError, PaymentProvider};

/// Allowed clock skew for Stripe signature timestamps
pub const STRIPE_TOLERANCE_SECONDS: i64 = 300;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";
pub const FLUTTERWAVE_HASH_HEADER: &str = "verif-hash";

/// Per-provider webhook secrets; `None` disables that provider's webhook
#[derive(Debug, Clone, Default)]
pub struct WebhookSecrets {
    pub stripe: Option<String>,
    pub paystack: Option<String>,
    pub flutterwave: Option<String>,
}

fn invalid(message: impl Into<String>) -> PaymentError {
    PaymentError::InvalidSignature(message.into())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn verify_stripe_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    now: i64,
) -> Result<(), PaymentError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| invalid("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(invalid("missing v1 signature"));
    }
    if (now - timestamp).abs() > STRIPE_TOLERANCE_SECONDS {
        return Err(invalid("timestamp outside tolerance"));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(invalid("signature mismatch"))
    }
}

pub fn verify_paystack_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
) -> Result<(), PaymentError> {
    let expected = hex::decode(header.trim()).map_err(|_| invalid("signature is not hex"))?;

    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(e.to_string()))?;
    mac.update(payload);

    mac.verify_slice(&expected)
        .map_err(|_| invalid("signature mismatch"))
}

pub fn verify_flutterwave_hash(header: &str, expected: &str) -> Result<(), PaymentError> {
    if constant_time_eq(header.trim().as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(invalid("verif-hash mismatch"))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, PaymentError> {
    headers
        .get(name)
        .ok_or_else(|| invalid(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| invalid(format!("unreadable {} header", name)))
}

/// Authenticates a webhook request for `provider`
///
/// Mock webhooks carry no signature; callers only accept them when the mock
/// gateway is enabled.
pub fn verify_webhook(
    provider: PaymentProvider,
    headers: &HeaderMap,
    payload: &[u8],
    secrets: &WebhookSecrets,
    now: i64,
) -> Result<(), PaymentError> {
    match provider {
        PaymentProvider::Stripe => {
            let secret = secrets
                .stripe
                .as_deref()
                .ok_or(PaymentError::NotConfigured(provider))?;
            verify_stripe_signature(header(headers, STRIPE_SIGNATURE_HEADER)?, payload, secret, now)
        }
        PaymentProvider::Paystack => {
            let secret = secrets
                .paystack
                .as_deref()
                .ok_or(PaymentError::NotConfigured(provider))?;
            verify_paystack_signature(header(headers, PAYSTACK_SIGNATURE_HEADER)?, payload, secret)
        }
        PaymentProvider::Flutterwave => {
            let expected = secrets
                .flutterwave
                .as_deref()
                .ok_or(PaymentError::NotConfigured(provider))?;
            verify_flutterwave_hash(header(headers, FLUTTERWAVE_HASH_HEADER)?, expected)
        }
        PaymentProvider::Mock => Ok(()),
    }
}

/// Extracts the payment reference from a settlement event
///
/// Returns `None` for events that don't settle a payment (subscriptions,
/// transfers, intent creation), which are acknowledged and ignored.
pub fn webhook_reference(provider: PaymentProvider, payload: &JsonValue) -> Option<String> {
    let event = payload.get("type").or_else(|| payload.get("event"));
    let event = event.and_then(JsonValue::as_str).unwrap_or_default();

    let reference = match provider {
        PaymentProvider::Stripe => match event {
            "payment_intent.succeeded" | "payment_intent.payment_failed"
            | "payment_intent.canceled" => payload.pointer("/data/object/id"),
            _ => None,
        },
        PaymentProvider::Paystack => match event {
            "charge.success" | "charge.failed" => payload.pointer("/data/reference"),
            _ => None,
        },
        PaymentProvider::Flutterwave => match event {
            "charge.completed" => payload.pointer("/data/tx_ref"),
            _ => None,
        },
        PaymentProvider::Mock => payload.get("reference"),
    };

    reference
        .and_then(JsonValue::as_str)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}
