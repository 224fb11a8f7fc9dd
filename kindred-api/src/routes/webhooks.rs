/// Payment provider webhooks
///
/// `POST /v1/webhooks/:provider`
///
/// The signature is checked against the raw body before anything is
/// parsed. The payload itself is never trusted for amounts or status: the
/// reference it names is re-verified with the provider's API and settled the
/// same way as `POST /v1/donations/verify`.
///
/// Events that don't settle a payment, references we never issued and
/// payments that can't be applied are acknowledged with `200` so the
/// provider stops retrying. Upstream failures return `502` so it tries
/// again later.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::client_ip::ClientIp,
    routes::donations::settle_verification,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use kindred_shared::{
    fulfillment::Settlement,
    payments::{
        webhook::{verify_webhook, webhook_reference},
        PaymentError, PaymentProvider,
    },
};
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,

    /// Present when the event settled a payment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<Settlement>,
}

impl WebhookAck {
    fn ignored() -> Self {
        Self {
            received: true,
            settlement: None,
        }
    }
}

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    client_ip: ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let provider: PaymentProvider = provider
        .parse()
        .map_err(|_| ApiError::NotFound(format!("No webhook for {}", provider)))?;

    // Unsigned mock events are only meaningful when the mock gateway runs
    if provider == PaymentProvider::Mock && !state.gateways.is_enabled(provider) {
        return Err(ApiError::NotFound("No webhook for mock".to_string()));
    }

    verify_webhook(
        provider,
        &headers,
        &body,
        &state.webhook_secrets,
        Utc::now().timestamp(),
    )
    .map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "Rejected webhook");
        ApiError::from(e)
    })?;

    let payload: JsonValue = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Webhook body is not JSON: {}", e)))?;

    let Some(reference) = webhook_reference(provider, &payload) else {
        tracing::debug!(provider = %provider, "Ignoring webhook event");
        return Ok(Json(WebhookAck::ignored()));
    };

    let gateway = state.gateways.get(provider)?;
    let verification = match gateway.verify(&reference).await {
        Ok(verification) => verification,
        Err(PaymentError::NotFound(_)) => {
            tracing::warn!(provider = %provider, reference = %reference, "Webhook for unknown payment");
            return Ok(Json(WebhookAck::ignored()));
        }
        Err(e) => return Err(e.into()),
    };

    let settlement = match settle_verification(&state, &verification, None, client_ip.to_audit()).await {
        Ok(settlement) => settlement,
        // Unknown, refunded or mismatched payments won't change on retry
        Err(ApiError::NotFound(message) | ApiError::Conflict(message)) => {
            tracing::warn!(provider = %provider, reference = %reference, %message, "Webhook not applied");
            return Ok(Json(WebhookAck::ignored()));
        }
        Err(e) => return Err(e),
    };

    tracing::info!(provider = %provider, reference = %reference, "Webhook processed");

    Ok(Json(WebhookAck {
        received: true,
        settlement: Some(settlement),
    }))
}
