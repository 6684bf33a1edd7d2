use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use pktracker_api::AppConfig;
use pktracker_api::app::services::AppServices;

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let mut config = AppConfig::default();
        config.seed_demo_users = true;
        Self::spawn_with(config).await
    }

    async fn spawn_with(config: AppConfig) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let (app, services) = pktracker_api::build_app(config).expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });

        Self {
            base_url,
            services,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self, client: &reqwest::Client, email: &str, password: &str) -> String {
        let res = client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "login failed for {email}");
        let body: Value = res.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn super_admin(&self, client: &reqwest::Client) -> String {
        self.login(client, "super@admin.com", "SuperAdmin123!").await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
        self.services.shutdown();
    }
}

fn forge_jwt(secret: &str) -> String {
    let now = Utc::now();
    let claims = json!({
        "sub": uuid::Uuid::new_v4(),
        "jti": uuid::Uuid::new_v4(),
        "iat": now.timestamp(),
        "exp": (now + ChronoDuration::minutes(10)).timestamp(),
        "name": "forged",
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn create_user(srv: &TestServer, client: &reqwest::Client, token: &str, email: &str) -> Value {
    let res = client
        .post(srv.url("/api/v1/users"))
        .bearer_auth(token)
        .json(&json!({
            "name": "Gary Oak",
            "email": email,
            "password": "Rival!Pass9",
            "password_confirmation": "Rival!Pass9",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    body["data"].clone()
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_carries_security_and_version_headers() {
    let srv = TestServer::spawn_with(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/api/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let headers = res.headers().clone();
    assert_eq!(headers["x-api-version"], "v1");
    assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["cross-origin-resource-policy"], "same-origin");
    assert!(headers["content-security-policy"].to_str().unwrap().starts_with("default-src 'self'"));
    assert!(headers["x-request-id"].to_str().unwrap().starts_with("req_"));
    assert!(headers["x-response-time"].to_str().unwrap().ends_with("ms"));
    assert!(headers.get("strict-transport-security").is_none());

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["environment"], "production");

    assert!(headers.get("x-powered-by").is_none());
    assert!(headers.get("server").is_none());

    let res = client
        .get(srv.url("/api/health"))
        .header("x-forwarded-proto", "https")
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.headers()["strict-transport-security"],
        "max-age=31536000; includeSubDomains"
    );
}

#[tokio::test]
async fn unsupported_version_and_unknown_endpoint() {
    let srv = TestServer::spawn_with(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/api/v2/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Unsupported API version");
    assert_eq!(body["supported_versions"], json!(["v1"]));

    let res = client.get(srv.url("/api/v1/nope")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Endpoint not found");
    assert_eq!(body["available_versions"], json!(["v1"]));
}

#[tokio::test]
async fn protected_endpoints_require_a_valid_token() {
    let srv = TestServer::spawn_with(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/api/v1/auth/user")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/api/v1/users"))
        .bearer_auth(forge_jwt("not-the-server-secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Correct signature, but the token id was never issued.
    let res = client
        .get(srv.url("/api/v1/users"))
        .bearer_auth(forge_jwt(&srv.services.config.auth.jwt_secret))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auth_routes_are_rate_limited_per_ip() {
    let srv = TestServer::spawn_with(AppConfig::default()).await;
    let client = reqwest::Client::new();

    for _ in 0..5 {
        let res = client
            .post(srv.url("/api/v1/auth/login"))
            .json(&json!({ "email": "ghost@example.com", "password": "whatever" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(res.headers().get("x-ratelimit-limit").is_some());
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "Invalid credentials");
    }

    let res = client
        .post(srv.url("/api/v1/auth/login"))
        .json(&json!({ "email": "ghost@example.com", "password": "whatever" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["x-ratelimit-remaining"], "0");
    assert!(res.headers().get("retry-after").is_some());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Too many requests");
    assert!(body["retry_after"].as_u64().unwrap() <= 60);
}

#[tokio::test]
async fn retry_after_counts_down() {
    let srv = TestServer::spawn_with(AppConfig::default()).await;
    let client = reqwest::Client::new();
    let attempt = || {
        client
            .post(srv.url("/api/v1/auth/login"))
            .json(&json!({ "email": "ghost@example.com", "password": "whatever" }))
            .send()
    };

    for _ in 0..5 {
        attempt().await.unwrap();
    }
    let first = attempt().await.unwrap();
    assert_eq!(first.status(), StatusCode::TOO_MANY_REQUESTS);
    let first: u64 = first.headers()["retry-after"].to_str().unwrap().parse().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let second = attempt().await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let second: u64 = second.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(second < first, "retry-after went from {first} to {second}");
}

#[tokio::test]
async fn forwarded_headers_from_untrusted_peers_are_ignored() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut statuses = Vec::new();
    for i in 0..8 {
        let res = client
            .post(srv.url("/api/v1/auth/login"))
            .header("x-forwarded-for", format!("10.0.0.{i}"))
            .header("x-real-ip", format!("10.0.1.{i}"))
            .json(&json!({ "email": "super@admin.com", "password": "wrong-password" }))
            .send()
            .await
            .unwrap();
        statuses.push(res.status());
    }

    assert_eq!(&statuses[..5], &[StatusCode::UNAUTHORIZED; 5]);
    assert!(statuses[5..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
    // Every attempt was attributed to the loopback peer.
    assert!(srv.services.limiter.tracked_keys() <= 2);
}

#[tokio::test]
async fn trusted_proxies_forward_the_client_address() {
    let mut config = AppConfig::default();
    config.auth.trusted_proxies = vec!["127.0.0.1".parse().unwrap()];
    let srv = TestServer::spawn_with(config).await;
    let client = reqwest::Client::new();

    // Each forwarded client gets its own budget.
    for i in 0..8 {
        let res = client
            .post(srv.url("/api/v1/auth/login"))
            .header("x-forwarded-for", format!("203.0.113.{i}, 127.0.0.1"))
            .json(&json!({ "email": "ghost@example.com", "password": "whatever" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn soft_deleted_accounts_look_unknown_at_login() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = srv.super_admin(&client).await;

    let user = create_user(&srv, &client, &admin, "trashed@viridian.gym").await;
    let id = user["id"].as_str().unwrap();
    let res = client
        .delete(srv.url(&format!("/api/v1/users/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    for password in ["Rival!Pass9", "not-the-password"] {
        let res = client
            .post(srv.url("/api/v1/auth/login"))
            .json(&json!({ "email": "trashed@viridian.gym", "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "Invalid credentials");
    }

    // Both attempts counted against the login throttle.
    let key = pktracker_infra::limiter_key("login", None, "127.0.0.1");
    assert_eq!(srv.services.limiter.attempts(&key), 2);
}

#[tokio::test]
async fn refreshing_does_not_grow_the_token_store() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let mut token = srv.super_admin(&client).await;

    for _ in 0..20 {
        let res = client
            .post(srv.url("/api/v1/auth/refresh"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        token = body["access_token"].as_str().unwrap().to_string();
    }

    assert_eq!(srv.services.tokens.len().unwrap(), 1);
}

#[tokio::test]
async fn register_refresh_logout_lifecycle() {
    let srv = TestServer::spawn_with(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/v1/auth/register"))
        .json(&json!({
            "name": "Ash Ketchum",
            "email": "  Ash@Pallet.Town ",
            "password": "Pikachu!2024",
            "password_confirmation": "Pikachu!2024",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["email"], "ash@pallet.town");
    assert_eq!(body["user"]["roles"], json!(["user"]));
    let first = body["access_token"].as_str().unwrap().to_string();

    let res = client
        .get(srv.url("/api/v1/auth/user"))
        .bearer_auth(&first)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["permissions"], json!(["access-api"]));

    let res = client
        .post(srv.url("/api/v1/auth/refresh"))
        .bearer_auth(&first)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let second = body["access_token"].as_str().unwrap().to_string();

    let res = client
        .get(srv.url("/api/v1/auth/user"))
        .bearer_auth(&first)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/api/v1/auth/logout"))
        .bearer_auth(&second)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url("/api/v1/auth/user"))
        .bearer_auth(&second)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let token = srv.login(&client, "ash@pallet.town", "Pikachu!2024").await;
    let res = client
        .post(srv.url("/api/v1/auth/logout-all"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["revoked_tokens"], 1);
}

#[tokio::test]
async fn registration_reports_field_errors() {
    let srv = TestServer::spawn_with(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/v1/auth/register"))
        .json(&json!({
            "name": "R2-D2",
            "email": "not-an-email",
            "password": "short",
            "password_confirmation": "different",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
    for field in ["name", "email", "password"] {
        assert!(body["errors"][field].is_array(), "missing errors for {field}");
    }
}

#[tokio::test]
async fn deactivated_accounts_cannot_log_in_or_use_tokens() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let admin = srv.super_admin(&client).await;
    let user_token = srv.login(&client, "user@example.com", "User123!").await;

    let res = client
        .get(srv.url("/api/v1/users?search=user@example.com"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    let id = body["data"]["users"][0]["id"].as_str().unwrap().to_string();

    let res = client
        .patch(srv.url(&format!("/api/v1/users/{id}/toggle-status")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["status"], "inactive");

    let res = client
        .get(srv.url("/api/v1/profile"))
        .bearer_auth(&user_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "account_disabled");

    let res = client
        .post(srv.url("/api/v1/auth/login"))
        .json(&json!({ "email": "user@example.com", "password": "User123!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Account disabled");
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn regular_users_are_forbidden_from_user_admin() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.login(&client, "user@example.com", "User123!").await;

    let res = client
        .get(srv.url("/api/v1/users"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/api/v1/rbac/explain?permission=view-users"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["explanation"]["granted"], false);
    assert_eq!(body["explanation"]["denial_reason"]["kind"], "missing_permission");

    let res = client
        .get(srv.url("/api/v1/profile/premium"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Premium subscription required");
}

#[tokio::test]
async fn user_soft_delete_restore_and_purge() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.super_admin(&client).await;

    let created = create_user(&srv, &client, &token, "gary@viridian.gym").await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["roles"], json!(["user"]));
    assert_eq!(created["initials"], "GO");
    // view-permissions is seeded for super-admin; view-sensitive-data is not
    assert!(created.get("last_login_ip").is_none());
    assert_eq!(created["permissions"], json!(["access-api"]));

    let res = client
        .patch(srv.url(&format!("/api/v1/users/{id}")))
        .bearer_auth(&token)
        .json(&json!({ "name": "Blue Oak", "roles": ["moderator"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["name"], "Blue Oak");
    assert_eq!(body["data"]["roles"], json!(["moderator"]));

    let user_url = srv.url(&format!("/api/v1/users/{id}"));
    let res = client.delete(&user_url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(&user_url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(srv.url(&format!("/api/v1/users/{id}/restore")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(&user_url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Purging requires a soft delete first.
    let force_url = srv.url(&format!("/api/v1/users/{id}/force"));
    let res = client.delete(&force_url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    client.delete(&user_url).bearer_auth(&token).send().await.unwrap();
    let res = client.delete(&force_url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url(&format!("/api/v1/users/{id}/restore")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_listing_filters_and_self_protection() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.super_admin(&client).await;

    let res = client
        .get(srv.url("/api/v1/users?per_page=2&sort_by=email&sort_order=asc"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["meta"]["total"], 4);
    assert_eq!(body["meta"]["last_page"], 2);
    assert_eq!(body["data"]["users"][0]["email"], "admin@admin.com");

    let res = client
        .get(srv.url("/api/v1/users?per_page=500&role=ghost"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert!(body["errors"]["per_page"].is_array());
    assert!(body["errors"]["role"].is_array());

    let res = client
        .get(srv.url("/api/v1/auth/user"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    let me = body["user"]["id"].as_str().unwrap().to_string();

    let res = client
        .delete(srv.url(&format!("/api/v1/users/{me}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// ─────────────────────────────────────────────────────────────────────────────
// Master data
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn role_deletion_rules() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.super_admin(&client).await;

    let res = client
        .post(srv.url("/api/v1/roles"))
        .bearer_auth(&token)
        .json(&json!({ "name": "editor", "permissions": ["view-users", "edit-users"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["guard_name"], "api");
    let editor_id = body["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url("/api/v1/roles"))
        .bearer_auth(&token)
        .json(&json!({ "name": "broken", "permissions": ["fly"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = client
        .get(srv.url("/api/v1/roles?search=super"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    let super_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let res = client
        .delete(srv.url(&format!("/api/v1/roles/{super_id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Cannot delete super-admin role");

    let user = create_user(&srv, &client, &token, "misty@cerulean.gym").await;
    let user_id = user["id"].as_str().unwrap();
    let res = client
        .post(srv.url(&format!("/api/v1/users/{user_id}/roles")))
        .bearer_auth(&token)
        .json(&json!({ "roles": ["editor"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let editor_url = srv.url(&format!("/api/v1/roles/{editor_id}"));
    let res = client.delete(&editor_url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = client
        .delete(srv.url(&format!("/api/v1/users/{user_id}/roles")))
        .bearer_auth(&token)
        .json(&json!({ "roles": ["editor"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.delete(&editor_url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url("/api/v1/master-data/statistics"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["total_roles"], 4);
}

#[tokio::test]
async fn permissions_in_use_cannot_be_deleted() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.super_admin(&client).await;

    let res = client
        .post(srv.url("/api/v1/permissions"))
        .bearer_auth(&token)
        .json(&json!({ "name": "export-reports" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url("/api/v1/permissions"))
        .bearer_auth(&token)
        .json(&json!({ "name": "export-reports" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let user = create_user(&srv, &client, &token, "brock@pewter.gym").await;
    let user_id = user["id"].as_str().unwrap();
    let res = client
        .post(srv.url(&format!("/api/v1/users/{user_id}/permissions")))
        .bearer_auth(&token)
        .json(&json!({ "permissions": ["export-reports"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let url = srv.url(&format!("/api/v1/permissions/{id}"));
    let res = client.delete(&url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = client
        .delete(srv.url(&format!("/api/v1/users/{user_id}/permissions")))
        .bearer_auth(&token)
        .json(&json!({ "permissions": ["export-reports"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.delete(&url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn logins_reach_the_audit_trail() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.super_admin(&client).await;

    // The audit worker runs on its own thread; poll briefly until it catches up.
    for _ in 0..50 {
        let res = client
            .get(srv.url("/api/v1/audit?limit=10"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        let seen = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["event_type"] == "auth.user.logged_in");
        if seen {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    panic!("login did not reach the audit trail within timeout");
}
