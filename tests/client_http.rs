//! # Integration tests for the HTTP client
//!
//! Runs `LicenseKitClient` against wiremock servers to check request
//! construction, response parsing, status classification and retries.
//!
//! ## Note on `spawn_blocking`
//!
//! The client is blocking (reqwest's blocking client spins up its own
//! runtime), so it must be built, used and dropped outside the test's Tokio
//! context. Every call is wrapped in `tokio::task::spawn_blocking`.

use licensekit::protocol::models::{
    LicenseFilter, LicenseStatus, LicenseUpdate, ListParams, NewApplication,
};
use licensekit::{LicenseKitClient, LicenseKitConfig, LicenseKitError, RetryPolicy, ValidationRules};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    }
}

fn config(server: &MockServer) -> LicenseKitConfig {
    LicenseKitConfig::new(format!("{}/v1", server.uri()))
        .with_api_key("test-api-key")
        .with_retry(fast_retry())
}

/// Build a client and run `f` on a blocking thread.
async fn with_client<T, F>(config: LicenseKitConfig, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce(&LicenseKitClient) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let client = LicenseKitClient::new(config).expect("client build");
        f(&client)
    })
    .await
    .expect("task")
}

fn license_json(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "key": "ABCD-EFGH-IJKL",
        "applicationId": "app_1",
        "status": status,
        "features": ["pro"],
        "expiresAt": "2099-01-01T00:00:00Z",
        "maxActivations": 3,
        "activations": 1
    })
}

// ── Auth ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_stores_token_for_later_calls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/login"))
        .and(body_json(json!({"email": "dev@example.com", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "session-token",
            "refreshToken": "refresh-token",
            "expiresIn": 3600,
            "user": {"id": "usr_1", "email": "dev@example.com"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/me"))
        .and(header("Authorization", "Bearer session-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "usr_1",
            "email": "dev@example.com",
            "name": "Dev"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = LicenseKitConfig::new(format!("{}/v1", server.uri()));
    let (session, user) = with_client(cfg, |client| {
        let session = client.login("dev@example.com", "hunter2").expect("login");
        let user = client.current_user().expect("me");
        (session, user)
    })
    .await;

    assert_eq!(session.expires_in, Some(3600));
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-token"));
    assert_eq!(user.id, "usr_1");
    assert_eq!(user.name.as_deref(), Some("Dev"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logout_clears_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/logout"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let authenticated = with_client(config(&server), |client| {
        client.logout().expect("logout");
        client.transport().has_access_token()
    })
    .await;

    assert!(!authenticated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_credentials_are_authentication_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = with_client(config(&server), |client| {
        client.login("dev@example.com", "wrong")
    })
    .await;

    match result {
        Err(LicenseKitError::Authentication { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("expected Authentication error, got {:?}", other),
    }
}

// ── Applications ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_application_posts_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/applications"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_json(json!({"name": "Desktop Pro"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "app_9",
            "name": "Desktop Pro"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = with_client(config(&server), |client| {
        client.create_application(&NewApplication {
            name: "Desktop Pro".into(),
            ..Default::default()
        })
    })
    .await
    .expect("create");

    assert_eq!(app.id, "app_9");
    assert!(app.metadata.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_applications_sends_paging() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/applications"))
        .and(query_param("page", "2"))
        .and(query_param("perPage", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "app_2", "name": "Second"}],
            "total": 3,
            "page": 2,
            "perPage": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = with_client(config(&server), |client| {
        client.list_applications(ListParams {
            page: Some(2),
            per_page: Some(1),
        })
    })
    .await
    .expect("list");

    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].name, "Second");
    assert!(page.has_more());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_application_accepts_empty_body() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1/applications/app_1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result = with_client(config(&server), |client| client.delete_application("app_1")).await;
    assert!(result.is_ok());
}

// ── Licenses ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_licenses_sends_filter() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/licenses"))
        .and(query_param("applicationId", "app_1"))
        .and(query_param("status", "active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [license_json("lic_1", "active")],
            "total": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = with_client(config(&server), |client| {
        client.list_licenses(&LicenseFilter {
            application_id: Some("app_1".into()),
            status: Some(LicenseStatus::Active),
            page: ListParams::default(),
        })
    })
    .await
    .expect("list");

    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].features, vec!["pro"]);
    assert!(!page.has_more());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn license_ids_are_percent_encoded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/licenses/lic%2F1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(license_json("lic/1", "active")))
        .expect(1)
        .mount(&server)
        .await;

    let license = with_client(config(&server), |client| client.get_license("lic/1"))
        .await
        .expect("get");
    assert_eq!(license.id, "lic/1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn update_and_revoke_license() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1/licenses/lic_1"))
        .and(body_json(json!({"maxActivations": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(license_json("lic_1", "active")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/licenses/lic_1/revoke"))
        .and(body_json(json!({"reason": "chargeback"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(license_json("lic_1", "revoked")))
        .expect(1)
        .mount(&server)
        .await;

    let (updated, revoked) = with_client(config(&server), |client| {
        let updated = client.update_license(
            "lic_1",
            &LicenseUpdate {
                max_activations: Some(5),
                ..Default::default()
            },
        );
        let revoked = client.revoke_license("lic_1", Some("chargeback"));
        (updated, revoked)
    })
    .await;

    assert_eq!(updated.expect("update").status, LicenseStatus::Active);
    assert_eq!(revoked.expect("revoke").status, LicenseStatus::Revoked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_license_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/licenses/lic_404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("License not found"))
        .expect(1)
        .mount(&server)
        .await;

    let result = with_client(config(&server), |client| client.get_license("lic_404")).await;
    assert!(matches!(result, Err(LicenseKitError::NotFound { message }) if message == "License not found"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn validate_license_returns_server_verdict() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/licenses/validate"))
        .and(body_json(json!({"key": "ABCD-EFGH-IJKL", "fingerprint": "machine-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "valid": true,
            "code": "VALID",
            "license": license_json("lic_1", "active")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let verdict = with_client(config(&server), |client| {
        client.validate_license("ABCD-EFGH-IJKL", Some("machine-1"))
    })
    .await
    .expect("validate");

    assert!(verdict.valid);
    assert_eq!(verdict.code.as_deref(), Some("VALID"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn check_license_applies_local_rules() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/licenses/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "valid": true,
            "code": "VALID",
            "license": license_json("lic_1", "active")
        })))
        .expect(2)
        .mount(&server)
        .await;

    let (ok, missing) = with_client(config(&server), |client| {
        let ok = client.check_license("ABCD-EFGH-IJKL", &ValidationRules::requiring(["pro"]));
        let missing =
            client.check_license("ABCD-EFGH-IJKL", &ValidationRules::requiring(["enterprise"]));
        (ok, missing)
    })
    .await;

    assert!(ok.expect("check").valid);
    assert!(matches!(missing, Err(LicenseKitError::FeatureMissing { code }) if code == "enterprise"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn check_license_passes_through_server_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/licenses/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "valid": false,
            "code": "NOT_FOUND"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let verdict = with_client(config(&server), |client| {
        client.check_license("NOPE", &ValidationRules::requiring(["pro"]))
    })
    .await
    .expect("check");

    assert!(!verdict.valid);
    assert_eq!(verdict.code.as_deref(), Some("NOT_FOUND"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unprocessable_entity_is_validation_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/applications"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"error": "name already taken"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = with_client(config(&server), |client| {
        client.create_application(&NewApplication {
            name: "Dup".into(),
            ..Default::default()
        })
    })
    .await;

    assert!(matches!(result, Err(LicenseKitError::Validation { status: Some(422), message }) if message == "name already taken"));
}

// ── Analytics ────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn license_usage_report() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/analytics/licenses/lic_1"))
        .and(query_param("granularity", "day"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalValidations": 12,
            "failedValidations": 1,
            "series": [
                {"timestamp": "2025-01-01T00:00:00Z", "validations": 7},
                {"timestamp": "2025-01-02T00:00:00Z", "validations": 5, "failures": 1}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let report = with_client(config(&server), |client| {
        client.license_usage(
            "lic_1",
            &licensekit::protocol::models::AnalyticsQuery {
                granularity: Some(licensekit::protocol::models::Granularity::Day),
                ..Default::default()
            },
        )
    })
    .await
    .expect("usage");

    assert_eq!(report.total_validations, 12);
    assert_eq!(report.series.len(), 2);
    assert_eq!(report.series[1].failures, 1);
}

// ── Retries ──────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_errors_retried_until_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/licenses/lic_1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(4)
        .mount(&server)
        .await;

    let result = with_client(config(&server), |client| client.get_license("lic_1")).await;
    assert!(matches!(result, Err(LicenseKitError::Server { status: 503, .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_error_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/licenses/lic_1"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/licenses/lic_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(license_json("lic_1", "active")))
        .expect(1)
        .mount(&server)
        .await;

    let license = with_client(config(&server), |client| client.get_license("lic_1"))
        .await
        .expect("eventually succeeds");
    assert_eq!(license.id, "lic_1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_errors_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/licenses/lic_1"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let result = with_client(config(&server), |client| client.get_license("lic_1")).await;
    assert!(matches!(result, Err(LicenseKitError::Authentication { status: 403, .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rate_limit_headers_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/licenses/lic_1"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "7")
                .insert_header("X-RateLimit-Limit", "60")
                .insert_header("X-RateLimit-Remaining", "0")
                .insert_header("X-RateLimit-Reset", "1736942400"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server).with_retry(RetryPolicy::none());
    let result = with_client(cfg, |client| client.get_license("lic_1")).await;

    match result {
        Err(LicenseKitError::RateLimit(info)) => {
            assert_eq!(info.retry_after, Some(Duration::from_secs(7)));
            assert_eq!(info.limit, Some(60));
            assert_eq!(info.remaining, Some(0));
            assert_eq!(info.reset, Some(1_736_942_400));
        }
        other => panic!("expected RateLimit, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_server_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let cfg = config(&server)
        .with_timeout(Duration::from_millis(100))
        .with_retry(RetryPolicy::none());
    let result = with_client(cfg, |client| client.current_user()).await;

    assert!(matches!(result, Err(LicenseKitError::Timeout { status: None, .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_server_is_network_error() {
    // Nothing listens on the discard port.
    let cfg = LicenseKitConfig::new("http://127.0.0.1:9").with_retry(RetryPolicy::none());
    let result = with_client(cfg, |client| client.current_user()).await;

    assert!(matches!(result, Err(LicenseKitError::Network(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_success_body_is_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/licenses/lic_1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let result = with_client(config(&server), |client| client.get_license("lic_1")).await;
    assert!(matches!(result, Err(LicenseKitError::Protocol(_))));
}
