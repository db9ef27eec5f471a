//! Handler tests for the Users domain
//!
//! These drive the users router end to end (JWT guard, extractors, policy,
//! service, in-memory store) without the outer application:
//! - HTTP status codes and bodies
//! - transactional rollback on invalid role ids
//! - projections never leak the password

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum_helpers::{JwtAuth, JwtConfig};
use domain_users::password::verify_password;
use domain_users::*;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt; // For oneshot()

const SECRET: &str = "handler-test-secret-with-at-least-32-chars";
const ADMIN_ID: &str = "1000";

struct TestApp {
    router: Router,
    repo: InMemoryUserRepository,
    auth: JwtAuth,
}

impl TestApp {
    fn new() -> Self {
        let repo = InMemoryUserRepository::new();
        let auth = JwtAuth::new(&JwtConfig::new(SECRET).unwrap());
        let router = handlers::router(UserService::new(repo.clone()), auth.clone());
        Self { router, repo, auth }
    }

    fn token(&self, user_id: &str, roles: &[&str]) -> String {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        self.auth
            .create_access_token(user_id, "someone@example.com", "Someone", &roles)
            .unwrap()
    }

    fn admin_token(&self) -> String {
        self.token(ADMIN_ID, &["admin"])
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn create(&self, body: Value) -> StatusCode {
        let token = self.admin_token();
        self.send("POST", "/", Some(&token), Some(body)).await.0
    }
}

fn json_of(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

fn alice() -> Value {
    json!({"name": "A", "email": "a@x.com", "password": "secret", "roles": [1]})
}

#[tokio::test]
async fn test_create_returns_201_with_empty_body_and_show_has_roles() {
    let app = TestApp::new();
    let token = app.admin_token();

    let (status, body) = app.send("POST", "/", Some(&token), Some(alice())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.is_empty());

    let (status, body) = app.send("GET", "/1", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let user = json_of(&body);
    assert_eq!(user["id"], 1);
    assert_eq!(user["name"], "A");
    assert_eq!(user["email"], "a@x.com");
    assert_eq!(user["roles"], json!([{"id": 1, "name": "admin"}]));
    assert!(user.get("password").is_none());
    assert!(user.get("password_hash").is_none());
}

#[tokio::test]
async fn test_stored_password_is_hashed() {
    let app = TestApp::new();
    assert_eq!(app.create(alice()).await, StatusCode::CREATED);

    let stored = app.repo.find(1).await.unwrap().unwrap();
    assert_ne!(stored.password_hash, "secret");
    assert!(verify_password("secret", &stored.password_hash).unwrap());
}

#[tokio::test]
async fn test_list_never_includes_password_or_roles() {
    let app = TestApp::new();
    app.create(alice()).await;
    app.create(json!({"name": "B", "email": "b@x.com", "password": "secret", "roles": [1, 2]}))
        .await;

    let (status, body) = app.send("GET", "/", Some(&app.admin_token()), None).await;
    assert_eq!(status, StatusCode::OK);

    let users = json_of(&body);
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["id"], 1);
    assert_eq!(users[1]["id"], 2);
    for user in users {
        let obj = user.as_object().unwrap();
        assert!(!obj.contains_key("password"));
        assert!(!obj.contains_key("password_hash"));
        assert!(!obj.contains_key("roles"));
        for key in ["id", "name", "email", "created_at", "updated_at"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
    }
}

#[tokio::test]
async fn test_create_with_invalid_role_rolls_back() {
    let app = TestApp::new();
    let token = app.admin_token();

    let (status, body) = app
        .send(
            "POST",
            "/",
            Some(&token),
            Some(json!({"name": "A", "email": "a@x.com", "password": "secret", "roles": [999]})),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let error = json_of(&body);
    assert_eq!(error["error"], "UNPROCESSABLE_ENTITY");
    assert!(error["message"].as_str().unwrap().contains("999"));

    assert!(app.repo.list().await.unwrap().is_empty());
    assert_eq!(app.repo.assignment_count().await, 0);

    // The email is still free, so nothing was half-written
    assert_eq!(app.create(alice()).await, StatusCode::CREATED);
}

#[tokio::test]
async fn test_update_with_invalid_role_changes_nothing() {
    let app = TestApp::new();
    let token = app.admin_token();
    app.create(alice()).await;

    let (status, _) = app
        .send(
            "PUT",
            "/1",
            Some(&token),
            Some(json!({"name": "Changed", "email": "changed@x.com", "roles": [2, 999]})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = app.send("GET", "/1", Some(&token), None).await;
    let user = json_of(&body);
    assert_eq!(user["name"], "A");
    assert_eq!(user["email"], "a@x.com");
    assert_eq!(user["roles"], json!([{"id": 1, "name": "admin"}]));
}

#[tokio::test]
async fn test_update_returns_204_and_applies_fields() {
    let app = TestApp::new();
    let token = app.admin_token();
    app.create(alice()).await;

    let (status, body) = app
        .send("PUT", "/1", Some(&token), Some(json!({"name": "Alice", "roles": [1, 2]})))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, _) = app
        .send("PATCH", "/1", Some(&token), Some(json!({"email": "alice@x.com", "password": ""})))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app.send("GET", "/1", Some(&token), None).await;
    let user = json_of(&body);
    assert_eq!(user["name"], "Alice");
    assert_eq!(user["email"], "alice@x.com");
    assert_eq!(user["roles"].as_array().unwrap().len(), 2);

    // Blank password kept the original
    let stored = app.repo.find(1).await.unwrap().unwrap();
    assert!(verify_password("secret", &stored.password_hash).unwrap());
}

#[tokio::test]
async fn test_update_missing_user_is_404() {
    let app = TestApp::new();

    let (status, body) = app
        .send("PUT", "/42", Some(&app.admin_token()), Some(json!({"name": "Nobody"})))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_of(&body)["error"], "NOT_FOUND");
    assert!(app.repo.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_then_show_is_404() {
    let app = TestApp::new();
    let token = app.admin_token();
    app.create(alice()).await;

    let (status, body) = app.send("DELETE", "/1", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, _) = app.send("GET", "/1", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.repo.assignment_count().await, 0);

    let (status, _) = app.send("DELETE", "/1", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_every_route_requires_a_token() {
    let app = TestApp::new();

    let cases = [
        ("GET", "/", None),
        ("POST", "/", Some(alice())),
        ("GET", "/1", None),
        ("PUT", "/1", Some(json!({"name": "x"}))),
        ("PATCH", "/1", Some(json!({"name": "x"}))),
        ("DELETE", "/1", None),
    ];

    for (method, uri, body) in cases {
        let (status, body) = app.send(method, uri, None, body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(json_of(&body)["error"], "UNAUTHORIZED");
    }

    let (status, _) = app.send("GET", "/", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_from_another_secret_is_rejected() {
    let app = TestApp::new();
    let other = JwtAuth::new(&JwtConfig::new("another-secret-that-is-32-chars-long!!").unwrap());
    let token = other
        .create_access_token(ADMIN_ID, "a@x.com", "A", &["admin".to_string()])
        .unwrap();

    let (status, _) = app.send("GET", "/", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_cookie_is_accepted() {
    let app = TestApp::new();

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .header(header::COOKIE, format!("access_token={}", app.admin_token()))
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_regular_user_policy() {
    let app = TestApp::new();
    app.create(alice()).await;
    app.create(json!({"name": "B", "email": "b@x.com", "password": "secret", "roles": [2]}))
        .await;

    let bob = app.token("2", &["user"]);

    let (status, body) = app.send("GET", "/", Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json_of(&body)["error"], "FORBIDDEN");

    let (status, _) = app
        .send(
            "POST",
            "/",
            Some(&bob),
            Some(json!({"name": "C", "email": "c@x.com", "password": "secret", "roles": []})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Own record: show and update allowed, destroy denied
    let (status, _) = app.send("GET", "/2", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .send("PATCH", "/2", Some(&bob), Some(json!({"name": "Bobby"})))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send("DELETE", "/2", Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Someone else's record
    let (status, _) = app.send("GET", "/1", Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .send("PUT", "/1", Some(&bob), Some(json!({"name": "Hacked"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Missing record the caller could not act on: forbidden, not 404
    let (status, _) = app.send("GET", "/99", Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_regular_user_cannot_change_own_roles() {
    let app = TestApp::new();
    app.create(alice()).await;
    app.create(json!({"name": "B", "email": "b@x.com", "password": "secret", "roles": [2]}))
        .await;

    let bob = app.token("2", &["user"]);
    let (status, _) = app
        .send("PATCH", "/2", Some(&bob), Some(json!({"name": "Bobby", "roles": [1]})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.admin_token();
    let (_, body) = app.send("GET", "/2", Some(&admin), None).await;
    let shown = json_of(&body);
    assert_eq!(shown["name"], "B");
    assert_eq!(shown["roles"], json!([{"id": 2, "name": "user"}]));
}

#[tokio::test]
async fn test_validation_errors_are_400_with_details() {
    let app = TestApp::new();
    let token = app.admin_token();

    let (status, body) = app
        .send(
            "POST",
            "/",
            Some(&token),
            Some(json!({"name": "", "email": "not-an-email", "password": "secret", "roles": []})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = json_of(&body);
    assert_eq!(error["error"], "VALIDATION_ERROR");
    assert!(error["details"].get("name").is_some());
    assert!(error["details"].get("email").is_some());

    // Fields outside the allow-list are rejected
    let (status, _) = app
        .send(
            "POST",
            "/",
            Some(&token),
            Some(json!({"name": "A", "email": "a@x.com", "password": "secret", "roles": [], "id": 7})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.send("GET", "/abc", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_of(&body)["error"], "INVALID_ID");

    assert!(app.repo.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_email_is_rejected_without_side_effects() {
    let app = TestApp::new();
    app.create(alice()).await;

    let status = app
        .create(json!({"name": "Other", "email": "a@x.com", "password": "secret", "roles": [2]}))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.repo.list().await.unwrap().len(), 1);
    assert_eq!(app.repo.assignment_count().await, 1);
}
