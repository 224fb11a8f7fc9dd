/// Donation endpoints
///
/// A donation starts a payment with one of the configured gateways and
/// records a `pending` payment log. Access to the course is granted only
/// after the payment is verified with the provider, either by the donor's
/// client calling `/verify` or by the provider's webhook.
///
/// # Endpoints
///
/// - `POST /v1/donations` - Start a donation
/// - `POST /v1/donations/verify` - Verify and fulfill a donation

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::client_ip::ClientIp,
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use kindred_shared::{
    audit::AuditEvent,
    auth::middleware::AuthContext,
    donation::validate_donation,
    fulfillment::{settle, Settlement},
    models::payment_log::{CreatePaymentLog, PaymentLog},
    payments::{generate_reference, PaymentError, PaymentProvider, PaymentRequest, PaymentVerification},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

/// Start donation request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDonationRequest {
    /// Course the donation unlocks
    #[validate(length(min = 1, max = 200, message = "course_slug is required"))]
    pub course_slug: String,

    pub provider: PaymentProvider,

    /// Custom amount in minor units; defaults to the course's suggestion
    pub amount_minor: Option<i64>,

    /// ISO 4217 code; defaults to the course's currency
    pub currency: Option<String>,

    /// Donation tier slug, replacing amount and currency
    pub tier: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub donor_name: String,

    #[validate(email(message = "Invalid email format"))]
    pub donor_email: String,

    /// Where the hosted checkout returns the donor
    #[validate(url(message = "callback_url must be a URL"))]
    pub callback_url: Option<String>,
}

/// Started donation
#[derive(Debug, Serialize)]
pub struct DonationResponse {
    pub reference: String,
    pub provider: PaymentProvider,
    pub course_slug: String,
    pub amount_minor: i64,
    pub currency: String,

    /// Hosted checkout to redirect the donor to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,

    /// Stripe client secret for in-page confirmation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyDonationRequest {
    pub provider: PaymentProvider,
    pub reference: String,
}

/// Start a donation
///
/// # Errors
///
/// - `404 Not Found`: Unknown course
/// - `422 Unprocessable Entity`: Invalid amount, currency or tier
/// - `400 Bad Request`: Provider not enabled or doesn't take the currency
/// - `502 Bad Gateway`: Provider failed
pub async fn create_donation(
    State(state): State<AppState>,
    auth: Option<Extension<AuthContext>>,
    client_ip: ClientIp,
    Json(req): Json<CreateDonationRequest>,
) -> ApiResult<(StatusCode, Json<DonationResponse>)> {
    req.validate()?;

    let course = state
        .content
        .course(&req.course_slug)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Course {} not found", req.course_slug)))?;

    let tier = match req.tier.as_deref() {
        Some(slug) => Some(
            state
                .content
                .donation_tier(slug)
                .await
                .ok_or_else(|| ApiError::invalid_field("tier", format!("Unknown donation tier {}", slug)))?,
        ),
        None => None,
    };

    let currency = req.currency.as_deref().unwrap_or(&course.currency);
    let amount_minor = req
        .amount_minor
        .or(Some(course.suggested_donation_minor).filter(|a| *a > 0));
    let amount = validate_donation(amount_minor, currency, tier.as_ref())?;

    let gateway = state.gateways.get(req.provider)?;
    if !gateway.supports_currency(&amount.currency) {
        return Err(PaymentError::UnsupportedCurrency {
            provider: req.provider,
            currency: amount.currency,
        }
        .into());
    }

    let user_id = auth.map(|Extension(auth)| auth.user_id);
    let donor_email = req.donor_email.trim().to_string();

    let request = PaymentRequest {
        reference: generate_reference(),
        amount_minor: amount.amount_minor,
        currency: amount.currency.clone(),
        donor_name: req.donor_name.trim().to_string(),
        donor_email: donor_email.clone(),
        description: format!("Donation for {}", course.title),
        callback_url: req
            .callback_url
            .clone()
            .or_else(|| state.config.payments.callback_url.clone()),
        metadata: json!({
            "course_slug": course.slug,
            "user_id": user_id,
            "tier": req.tier,
        }),
    };

    let session = gateway.initialize(&request).await?;

    let payment = PaymentLog::create(
        &state.db,
        CreatePaymentLog {
            provider: req.provider,
            reference: session.reference.clone(),
            amount_minor: amount.amount_minor,
            currency: amount.currency.clone(),
            donor_name: request.donor_name,
            donor_email,
            course_slug: course.slug.clone(),
            user_id,
            gateway_response: session.raw.clone(),
        },
    )
    .await?;

    tracing::info!(
        payment_id = %payment.id,
        provider = %req.provider,
        reference = %payment.reference,
        amount_minor = payment.amount_minor,
        currency = %payment.currency,
        "Donation started"
    );
    state.audit.record(
        AuditEvent::new("donation.initialized")
            .with_actor(user_id)
            .with_subject("payment", payment.id)
            .with_metadata(json!({
                "provider": req.provider,
                "reference": payment.reference,
                "amount_minor": payment.amount_minor,
                "currency": payment.currency,
                "course_slug": payment.course_slug,
            }))
            .with_ip(client_ip.to_audit()),
    );

    Ok((
        StatusCode::CREATED,
        Json(DonationResponse {
            reference: payment.reference,
            provider: req.provider,
            course_slug: payment.course_slug,
            amount_minor: payment.amount_minor,
            currency: payment.currency,
            authorization_url: session.authorization_url,
            client_secret: session.client_secret,
        }),
    ))
}

/// Verify a donation with its provider and settle it
///
/// Safe to call repeatedly: once fulfilled, the same enrollment comes back
/// with `created: false`.
///
/// # Response
///
/// ```json
/// { "status": "fulfilled", "enrollment": { ... }, "created": true }
/// { "status": "failed", "reason": "Card declined" }
/// { "status": "pending" }
/// ```
pub async fn verify_donation(
    State(state): State<AppState>,
    auth: Option<Extension<AuthContext>>,
    client_ip: ClientIp,
    Json(req): Json<VerifyDonationRequest>,
) -> ApiResult<Json<Settlement>> {
    let reference = req.reference.trim();
    if reference.is_empty() {
        return Err(ApiError::invalid_field("reference", "reference is required"));
    }

    let gateway = state.gateways.get(req.provider)?;
    let verification = gateway.verify(reference).await?;

    let actor = auth.map(|Extension(auth)| auth.user_id);
    let settlement = settle_verification(&state, &verification, actor, client_ip.to_audit()).await?;

    Ok(Json(settlement))
}

/// Applies a verification and records the outcome
///
/// Shared by the verify endpoint and provider webhooks.
pub(crate) async fn settle_verification(
    state: &AppState,
    verification: &PaymentVerification,
    actor: Option<uuid::Uuid>,
    ip: Option<String>,
) -> ApiResult<Settlement> {
    let settlement = settle(&state.db, &state.content, verification).await?;

    let event = match &settlement {
        Settlement::Fulfilled { enrollment, created: true } => Some(
            AuditEvent::new("donation.fulfilled")
                .with_subject("enrollment", enrollment.id)
                .with_metadata(json!({
                    "provider": verification.provider,
                    "reference": verification.reference,
                    "course_slug": enrollment.course_slug,
                })),
        ),
        Settlement::Failed { reason } => Some(
            AuditEvent::new("donation.failed")
                .with_subject("payment", &verification.reference)
                .with_metadata(json!({
                    "provider": verification.provider,
                    "reason": reason,
                })),
        ),
        Settlement::Fulfilled { created: false, .. } | Settlement::Pending => None,
    };

    if let Some(event) = event {
        state.audit.record(event.with_actor(actor).with_ip(ip));
    }

    Ok(settlement)
}
