//! Integration tests for the Kindred API
//!
//! Tests without `#[ignore]` drive the router against an unreachable
//! database: they cover everything decided before a query runs (routing,
//! authentication, role checks, validation, content, exchange rates and
//! webhook signatures).
//!
//! `#[ignore]`d tests need PostgreSQL at `DATABASE_URL`:
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/kindred_test cargo test -p kindred-api -- --ignored
//! ```

mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{request, token_for, TestApp};
use kindred_shared::models::user::Role;
use serde_json::{json, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Health and middleware
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_reports_degraded_without_database() {
    let app = TestApp::offline();

    let response = app.get("/health", None).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    let body = response.json();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["payment_providers"], json!(["mock"]));
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = TestApp::offline();

    let response = app.get("/v1/certificates/nope", None).await;

    assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
    assert_eq!(response.header("x-frame-options"), Some("DENY"));
    assert_eq!(response.header("cache-control"), Some("no-store"));
    assert!(response.header("strict-transport-security").is_none());
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = TestApp::offline();

    let response = app.get("/v1/does-not-exist", None).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_courses_served_from_static_content() {
    let app = TestApp::offline();

    let response = app.get("/v1/content/courses", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("cache-control"), Some("public, max-age=60"));

    let courses = response.json();
    let slugs: Vec<&str> = courses
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["slug"].as_str())
        .collect();
    assert!(slugs.contains(&"digital-literacy"));
}

#[tokio::test]
async fn test_get_course_by_slug() {
    let app = TestApp::offline();

    let response = app.get("/v1/content/courses/digital-literacy", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["title"], "Digital Literacy Foundations");

    let missing = app.get("/v1/content/courses/underwater-basket-weaving", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.json()["error"], "not_found");
}

#[tokio::test]
async fn test_public_content_collections() {
    let app = TestApp::offline();

    for path in ["team", "events", "careers", "testimonials"] {
        let response = app.get(&format!("/v1/content/{}", path), None).await;
        assert_eq!(response.status, StatusCode::OK, "GET /v1/content/{}", path);
        assert!(response.json().is_array());
    }

    let tiers = app.get("/v1/content/donation-tiers", None).await.json();
    let amounts: Vec<i64> = tiers
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["amount_minor"].as_i64())
        .collect();
    assert_eq!(amounts, vec![2_500, 10_000, 50_000]);
}

// ---------------------------------------------------------------------------
// Exchange rates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_latest_rates_normalizes_base() {
    let app = TestApp::offline();

    let response = app.get("/v1/exchange-rates/usd", None).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["base"], "USD");
    assert_eq!(body["rates"]["NGN"], 1500.0);
}

#[tokio::test]
async fn test_convert_between_currencies() {
    let app = TestApp::offline();

    let response = app
        .get("/v1/exchange-rates/convert?amount_minor=1000&from=usd&to=NGN", None)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["from"], "USD");
    assert_eq!(body["to"], "NGN");
    assert_eq!(body["converted_minor"], 1_500_000);
}

#[tokio::test]
async fn test_convert_errors() {
    let app = TestApp::offline();

    let invalid = app.get("/v1/exchange-rates/dollars", None).await;
    assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);

    let missing = app
        .get("/v1/exchange-rates/convert?amount_minor=100&from=EUR&to=GHS", None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let no_amount = app.get("/v1/exchange-rates/convert?from=USD&to=EUR", None).await;
    assert_eq!(no_amount.status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Authentication and authorization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = TestApp::offline();

    for path in ["/v1/auth/me", "/v1/enrollments", "/v1/admin/payments"] {
        let response = app.get(path, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "GET {}", path);
        assert_eq!(response.json()["error"], "unauthorized");
    }
}

#[tokio::test]
async fn test_invalid_tokens_are_rejected() {
    let app = TestApp::offline();

    let garbage = app.get("/v1/enrollments", Some("not.a.jwt")).await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);

    let basic = app
        .send(
            axum::http::Request::builder()
                .uri("/v1/enrollments")
                .header("authorization", "Basic dXNlcjpwYXNz")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(basic.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_rejects_invalid_token() {
    let app = TestApp::offline();

    let response = app
        .post("/v1/auth/refresh", json!({ "refresh_token": "nope" }), None)
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let app = TestApp::offline();
    let access = token_for(Uuid::new_v4(), Role::Student);

    let response = app
        .post("/v1/auth/refresh", json!({ "refresh_token": access }), None)
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_validates_input() {
    let app = TestApp::offline();

    let response = app
        .post(
            "/v1/auth/register",
            json!({ "email": "not-an-email", "password": "short" }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.json();
    assert_eq!(body["error"], "validation_error");
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["field"].as_str())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"password"));
}

#[tokio::test]
async fn test_register_rejects_weak_password() {
    let app = TestApp::offline();

    let response = app
        .post(
            "/v1/auth/register",
            json!({ "email": "ada@example.org", "password": "onlyletters" }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["details"][0]["field"], "password");
}

#[tokio::test]
async fn test_students_cannot_use_admin_routes() {
    let app = TestApp::offline();
    let student = token_for(Uuid::new_v4(), Role::Student);

    for path in [
        "/v1/admin/enrollments",
        "/v1/admin/payments",
        "/v1/admin/users",
        "/v1/admin/audit-logs",
    ] {
        let response = app.get(path, Some(&student)).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN, "GET {}", path);
    }

    let invalidate = app
        .post("/v1/admin/content/invalidate", json!({}), Some(&student))
        .await;
    assert_eq!(invalidate.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_instructors_cannot_refund() {
    let app = TestApp::offline();
    let instructor = token_for(Uuid::new_v4(), Role::Instructor);

    let response = app
        .post(
            &format!("/v1/admin/payments/{}/refund", Uuid::new_v4()),
            json!({}),
            Some(&instructor),
        )
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_cannot_change_own_role() {
    let app = TestApp::offline();
    let admin_id = Uuid::new_v4();
    let admin = token_for(admin_id, Role::Admin);

    let response = app
        .send(request(
            Method::PATCH,
            &format!("/v1/admin/users/{}/role", admin_id),
            Some(json!({ "role": "student" })),
            Some(&admin),
        ))
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_can_invalidate_content() {
    let app = TestApp::offline();
    let admin = token_for(Uuid::new_v4(), Role::Admin);

    let response = app
        .post("/v1/admin/content/invalidate", json!({}), Some(&admin))
        .await;

    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

// ---------------------------------------------------------------------------
// Donations and webhooks
// ---------------------------------------------------------------------------

fn donation(overrides: Value) -> Value {
    let mut body = json!({
        "course_slug": "digital-literacy",
        "provider": "mock",
        "donor_name": "Ada Obi",
        "donor_email": "ada@example.org",
    });

    if let (Some(body), Some(overrides)) = (body.as_object_mut(), overrides.as_object()) {
        for (key, value) in overrides {
            body.insert(key.clone(), value.clone());
        }
    }
    body
}

#[tokio::test]
async fn test_donation_validation() {
    let app = TestApp::offline();

    let bad_email = app
        .post("/v1/donations", donation(json!({ "donor_email": "nope" })), None)
        .await;
    assert_eq!(bad_email.status, StatusCode::UNPROCESSABLE_ENTITY);

    let too_small = app
        .post("/v1/donations", donation(json!({ "amount_minor": 50 })), None)
        .await;
    assert_eq!(too_small.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(too_small.json()["details"][0]["field"], "amount_minor");

    let unknown_tier = app
        .post("/v1/donations", donation(json!({ "tier": "platinum" })), None)
        .await;
    assert_eq!(unknown_tier.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(unknown_tier.json()["details"][0]["field"], "tier");

    let bad_currency = app
        .post("/v1/donations", donation(json!({ "currency": "XYZ", "amount_minor": 1000 })), None)
        .await;
    assert_eq!(bad_currency.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_donation_for_unknown_course() {
    let app = TestApp::offline();

    let response = app
        .post("/v1/donations", donation(json!({ "course_slug": "no-such-course" })), None)
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_donation_with_disabled_provider() {
    let app = TestApp::offline();

    let response = app
        .post("/v1/donations", donation(json!({ "provider": "stripe" })), None)
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_for_unknown_provider() {
    let app = TestApp::offline();

    let response = app.post("/v1/webhooks/bitcoin", json!({}), None).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mock_webhook_requires_mock_gateway() {
    let app = TestApp::builder().without_mock_payments().build_offline();

    let response = app
        .post("/v1/webhooks/mock", json!({ "reference": "mock_1" }), None)
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stripe_webhook_signature_is_checked() {
    let app = TestApp::offline();
    let payload = json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_123" } }
    });

    let unsigned = app.post("/v1/webhooks/stripe", payload.clone(), None).await;
    assert_eq!(unsigned.status, StatusCode::UNAUTHORIZED);

    let mut forged = request(Method::POST, "/v1/webhooks/stripe", Some(payload), None);
    forged.headers_mut().insert(
        "stripe-signature",
        format!("t={},v1={}", Utc::now().timestamp(), "ab".repeat(32))
            .parse()
            .unwrap(),
    );
    let response = app.send(forged).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_paystack_webhook_without_secret_is_rejected() {
    let app = TestApp::offline();

    let response = app
        .post("/v1/webhooks/paystack", json!({ "event": "charge.success" }), None)
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mock_webhook_ignores_events_without_reference() {
    let app = TestApp::offline();

    let response = app
        .post("/v1/webhooks/mock", json!({ "event": "ping" }), None)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "received": true }));
}

// ---------------------------------------------------------------------------
// Progress and certificates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_progress_update_requires_updates() {
    let app = TestApp::offline();
    let student = token_for(Uuid::new_v4(), Role::Student);

    let response = app
        .post(
            &format!("/v1/enrollments/{}/progress", Uuid::new_v4()),
            json!({ "updates": [] }),
            Some(&student),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["details"][0]["field"], "updates");
}

#[tokio::test]
async fn test_malformed_certificate_code_is_not_found() {
    let app = TestApp::offline();

    let response = app.get("/v1/certificates/KND-0000-0000", None).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// End-to-end (PostgreSQL)
// ---------------------------------------------------------------------------

/// Starts a mock donation and returns its reference
async fn start_donation(app: &TestApp, email: &str, token: Option<&str>) -> String {
    let response = app
        .post(
            "/v1/donations",
            donation(json!({ "donor_email": email, "callback_url": "https://kindred.test/thanks" })),
            token,
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", String::from_utf8_lossy(&response.body));

    let body = response.json();
    assert_eq!(body["amount_minor"], 2_500);
    assert_eq!(body["currency"], "USD");
    assert!(body["authorization_url"]
        .as_str()
        .unwrap()
        .starts_with("https://kindred.test/thanks?reference=mock_"));

    body["reference"].as_str().unwrap().to_string()
}

async fn verify_donation(app: &TestApp, reference: &str) -> Value {
    let response = app
        .post(
            "/v1/donations/verify",
            json!({ "provider": "mock", "reference": reference }),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", String::from_utf8_lossy(&response.body));
    response.json()
}

fn lesson(module: &str, lesson: &str) -> Value {
    json!({
        "module_key": module,
        "lesson_key": lesson,
        "completed": true,
        "time_spent_seconds": 600
    })
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn test_donation_to_certificate_flow() {
    let app = TestApp::with_database().await.unwrap();
    let (user, token) = app.create_user(Role::Student).await.unwrap();

    let reference = start_donation(&app, &user.email, Some(&token)).await;

    let settlement = verify_donation(&app, &reference).await;
    assert_eq!(settlement["status"], "fulfilled");
    assert_eq!(settlement["created"], true);
    let enrollment_id = settlement["enrollment"]["id"].as_str().unwrap().to_string();

    // Verifying again is idempotent
    let again = verify_donation(&app, &reference).await;
    assert_eq!(again["created"], false);
    assert_eq!(again["enrollment"]["id"], enrollment_id.as_str());

    let mine = app.get("/v1/enrollments", Some(&token)).await.json();
    assert!(mine
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["id"] == enrollment_id.as_str()));

    // Too early for a certificate
    let early = app
        .post(&format!("/v1/enrollments/{}/certificate", enrollment_id), json!({}), Some(&token))
        .await;
    assert_eq!(early.status, StatusCode::CONFLICT);

    let partial = app
        .post(
            &format!("/v1/enrollments/{}/progress", enrollment_id),
            json!({ "updates": [lesson("getting-started", "using-a-computer")] }),
            Some(&token),
        )
        .await;
    assert_eq!(partial.status, StatusCode::OK);
    assert_eq!(partial.json()["overall_progress"], 25);

    let unknown = app
        .post(
            &format!("/v1/enrollments/{}/progress", enrollment_id),
            json!({ "updates": [lesson("getting-started", "juggling")] }),
            Some(&token),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::UNPROCESSABLE_ENTITY);

    let complete = app
        .post(
            &format!("/v1/enrollments/{}/progress", enrollment_id),
            json!({ "updates": [
                lesson("getting-started", "files-and-folders"),
                lesson("online-safety", "passwords"),
                lesson("online-safety", "spotting-scams"),
            ] }),
            Some(&token),
        )
        .await
        .json();
    assert_eq!(complete["overall_progress"], 100);
    assert_eq!(complete["certificate_eligible"], true);
    assert_eq!(complete["total_time_spent_seconds"], 2_400);

    let issued = app
        .post(&format!("/v1/enrollments/{}/certificate", enrollment_id), json!({}), Some(&token))
        .await;
    assert_eq!(issued.status, StatusCode::CREATED);
    let code = issued.json()["certificate_code"].as_str().unwrap().to_string();
    assert!(code.starts_with("KND-"));

    let reissued = app
        .post(&format!("/v1/enrollments/{}/certificate", enrollment_id), json!({}), Some(&token))
        .await;
    assert_eq!(reissued.status, StatusCode::OK);
    assert_eq!(reissued.json()["certificate_code"], code.as_str());

    let pdf = app
        .get(&format!("/v1/enrollments/{}/certificate.pdf", enrollment_id), Some(&token))
        .await;
    assert_eq!(pdf.status, StatusCode::OK);
    assert_eq!(pdf.header("content-type"), Some("application/pdf"));
    assert!(pdf.body.starts_with(b"%PDF-"));

    let public = app
        .get(&format!("/v1/certificates/{}", code.to_lowercase()), None)
        .await;
    assert_eq!(public.status, StatusCode::OK);
    let public = public.json();
    assert_eq!(public["valid"], true);
    assert_eq!(public["course_slug"], "digital-literacy");
    assert!(public.get("donor_email").is_none());

    // Another student can't read it
    let (_, other) = app.create_user(Role::Student).await.unwrap();
    let forbidden = app
        .get(&format!("/v1/enrollments/{}", enrollment_id), Some(&other))
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn test_registration_claims_earlier_donations() {
    let app = TestApp::with_database().await.unwrap();
    let email = format!("donor-{}@kindred.test", Uuid::new_v4());

    let reference = start_donation(&app, &email, None).await;
    let settlement = verify_donation(&app, &reference).await;
    assert_eq!(settlement["status"], "fulfilled");

    let registered = app
        .post(
            "/v1/auth/register",
            json!({ "email": email, "password": "Str0ngPassw0rd", "name": "Ada Obi" }),
            None,
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED);
    let body = registered.json();
    assert_eq!(body["claimed_enrollments"], 1);
    assert!(body["user"].get("password_hash").is_none());

    let token = body["access_token"].as_str().unwrap();
    let mine = app.get("/v1/enrollments", Some(token)).await.json();
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let duplicate = app
        .post(
            "/v1/auth/register",
            json!({ "email": email, "password": "Str0ngPassw0rd" }),
            None,
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let login = app
        .post(
            "/v1/auth/login",
            json!({ "email": email, "password": "Str0ngPassw0rd" }),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);

    let wrong = app
        .post(
            "/v1/auth/login",
            json!({ "email": email, "password": "Wr0ngPassword" }),
            None,
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn test_password_reset_token_is_single_use() {
    let app = TestApp::with_database().await.unwrap();
    let email = format!("reset-{}@kindred.test", Uuid::new_v4());

    let registered = app
        .post(
            "/v1/auth/register",
            json!({ "email": email, "password": "0riginalPass" }),
            None,
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED);

    let forgot = app
        .post("/v1/auth/forgot-password", json!({ "email": email }), None)
        .await;
    assert_eq!(forgot.status, StatusCode::ACCEPTED);
    let reset_token = forgot.json()["reset_token"].as_str().unwrap().to_string();

    let unknown = app
        .post(
            "/v1/auth/forgot-password",
            json!({ "email": "nobody@kindred.test" }),
            None,
        )
        .await;
    assert_eq!(unknown.status, StatusCode::ACCEPTED);
    assert!(unknown.json().get("reset_token").is_none());

    let reset = app
        .post(
            "/v1/auth/reset-password",
            json!({ "token": reset_token, "password": "N3wPassword" }),
            None,
        )
        .await;
    assert_eq!(reset.status, StatusCode::NO_CONTENT);

    let reused = app
        .post(
            "/v1/auth/reset-password",
            json!({ "token": reset_token, "password": "An0therPassword" }),
            None,
        )
        .await;
    assert_eq!(reused.status, StatusCode::BAD_REQUEST);

    let login = app
        .post(
            "/v1/auth/login",
            json!({ "email": email, "password": "N3wPassword" }),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn test_webhook_fulfills_and_refund_cancels() {
    let app = TestApp::with_database().await.unwrap();
    let (_, admin) = app.create_user(Role::Admin).await.unwrap();
    let email = format!("webhook-{}@kindred.test", Uuid::new_v4());

    let reference = start_donation(&app, &email, None).await;

    let webhook = app
        .post("/v1/webhooks/mock", json!({ "reference": reference }), None)
        .await;
    assert_eq!(webhook.status, StatusCode::OK);
    let ack = webhook.json();
    assert_eq!(ack["settlement"]["status"], "fulfilled");
    let enrollment_id = ack["settlement"]["enrollment"]["id"].as_str().unwrap().to_string();

    let payments = app
        .get("/v1/admin/payments?status=success&limit=200", Some(&admin))
        .await
        .json();
    let payment_id = payments
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["reference"] == reference.as_str())
        .and_then(|p| p["id"].as_str())
        .unwrap()
        .to_string();

    let refund = app
        .post(&format!("/v1/admin/payments/{}/refund", payment_id), json!({}), Some(&admin))
        .await;
    assert_eq!(refund.status, StatusCode::OK);
    let refund = refund.json();
    assert_eq!(refund["payment"]["status"], "refunded");
    assert_eq!(refund["enrollment"]["status"], "cancelled");
    assert_eq!(refund["enrollment"]["id"], enrollment_id.as_str());

    let twice = app
        .post(&format!("/v1/admin/payments/{}/refund", payment_id), json!({}), Some(&admin))
        .await;
    assert_eq!(twice.status, StatusCode::CONFLICT);

    // Redelivered webhook is acknowledged but changes nothing
    let redelivered = app
        .post("/v1/webhooks/mock", json!({ "reference": reference }), None)
        .await;
    assert_eq!(redelivered.status, StatusCode::OK);

    let verify = app
        .post(
            "/v1/donations/verify",
            json!({ "provider": "mock", "reference": reference }),
            None,
        )
        .await;
    assert_eq!(verify.status, StatusCode::CONFLICT);

    let audit = app
        .get("/v1/admin/audit-logs?action=payment.refunded", Some(&admin))
        .await;
    assert_eq!(audit.status, StatusCode::OK);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn test_admin_status_transitions() {
    let app = TestApp::with_database().await.unwrap();
    let (_, admin) = app.create_user(Role::Admin).await.unwrap();
    let (_, instructor) = app.create_user(Role::Instructor).await.unwrap();
    let email = format!("status-{}@kindred.test", Uuid::new_v4());

    let reference = start_donation(&app, &email, None).await;
    let settlement = verify_donation(&app, &reference).await;
    let enrollment_id = settlement["enrollment"]["id"].as_str().unwrap().to_string();

    let listed = app
        .get("/v1/admin/enrollments?status=active", Some(&instructor))
        .await;
    assert_eq!(listed.status, StatusCode::OK);

    let bad_filter = app
        .get("/v1/admin/enrollments?status=archived", Some(&instructor))
        .await;
    assert_eq!(bad_filter.status, StatusCode::UNPROCESSABLE_ENTITY);

    let patch = |status: &'static str| {
        request(
            Method::PATCH,
            &format!("/v1/admin/enrollments/{}/status", enrollment_id),
            Some(json!({ "status": status })),
            Some(&admin),
        )
    };

    let expired = app.send(patch("expired")).await;
    assert_eq!(expired.status, StatusCode::OK);
    assert_eq!(expired.json()["status"], "expired");

    let backwards = app.send(patch("pending")).await;
    assert_eq!(backwards.status, StatusCode::UNPROCESSABLE_ENTITY);

    let renewed = app.send(patch("active")).await;
    assert_eq!(renewed.status, StatusCode::OK);

    let users = app.get("/v1/admin/users?limit=1", Some(&admin)).await.json();
    assert_eq!(users["users"].as_array().unwrap().len(), 1);
    assert!(users["total"].as_i64().unwrap() >= 2);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn test_email_matching_ignores_case() {
    let app = TestApp::with_database().await.unwrap();
    let local = format!("mixed-{}", Uuid::new_v4().simple());
    let donated_as = format!("{}@kindred.test", local);
    let registered_as = format!("{}@KINDRED.TEST", local.to_uppercase());

    let reference = start_donation(&app, &donated_as, None).await;
    let settlement = verify_donation(&app, &reference).await;
    assert_eq!(settlement["status"], "fulfilled");

    let registered = app
        .post(
            "/v1/auth/register",
            json!({ "email": registered_as, "password": "Str0ngPassw0rd" }),
            None,
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED);
    assert_eq!(registered.json()["claimed_enrollments"], 1);

    let login = app
        .post(
            "/v1/auth/login",
            json!({ "email": donated_as, "password": "Str0ngPassw0rd" }),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);

    let token = login.json()["access_token"].as_str().unwrap().to_string();
    let mine = app.get("/v1/enrollments", Some(&token)).await.json();
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let duplicate = app
        .post(
            "/v1/auth/register",
            json!({ "email": donated_as, "password": "Str0ngPassw0rd" }),
            None,
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn test_refund_cancels_expired_enrollment() {
    let app = TestApp::with_database().await.unwrap();
    let (_, admin) = app.create_user(Role::Admin).await.unwrap();
    let email = format!("lapsed-{}@kindred.test", Uuid::new_v4());

    let reference = start_donation(&app, &email, None).await;
    let settlement = verify_donation(&app, &reference).await;
    let enrollment_id = settlement["enrollment"]["id"].as_str().unwrap().to_string();

    let expired = app
        .send(request(
            Method::PATCH,
            &format!("/v1/admin/enrollments/{}/status", enrollment_id),
            Some(json!({ "status": "expired" })),
            Some(&admin),
        ))
        .await;
    assert_eq!(expired.json()["status"], "expired");

    let payments = app
        .get("/v1/admin/payments?status=success&limit=200", Some(&admin))
        .await
        .json();
    let payment_id = payments
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["reference"] == reference.as_str())
        .and_then(|p| p["id"].as_str())
        .unwrap()
        .to_string();

    let refund = app
        .post(&format!("/v1/admin/payments/{}/refund", payment_id), json!({}), Some(&admin))
        .await;
    assert_eq!(refund.status, StatusCode::OK);
    let refund = refund.json();
    assert_eq!(refund["payment"]["status"], "refunded");
    assert_eq!(refund["enrollment"]["status"], "cancelled");
}
