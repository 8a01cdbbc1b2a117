//! API integration tests
//!
//! Each test drives the full router in process against the in-memory store.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use library_server::{config::AppConfig, repository::Repository, AppState};

const ADMIN_EMAIL: &str = "admin@library.test";
const ADMIN_PASSWORD: &str = "admin-password";

async fn app() -> Router {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "integration-secret-integration-secret".to_string();
    config.auth.bootstrap_admin_email = Some(ADMIN_EMAIL.to_string());
    config.auth.bootstrap_admin_password = Some(ADMIN_PASSWORD.to_string());
    config.lending.overdue_sweep_interval_secs = 0;

    let state = AppState::new(config, Repository::in_memory());
    state
        .services
        .users
        .ensure_bootstrap_admin()
        .await
        .expect("bootstrap admin");
    library_server::api::create_router(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["data"]["token"].as_str().unwrap().to_string()
}

/// Returns (user id, token)
async fn register(app: &Router, name: &str, email: &str) -> (i64, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({
            "name": name,
            "email": email,
            "password": "member-pass",
            "phone": "081298765432",
            "role": "admin"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    (
        body["data"]["user"]["id"].as_i64().unwrap(),
        body["data"]["token"].as_str().unwrap().to_string(),
    )
}

async fn create_book(app: &Router, token: &str, isbn: &str, stock: i64) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/books",
        Some(token),
        Some(json!({
            "title": "Cantik Itu Luka",
            "author": "Eka Kurniawan",
            "isbn": isbn,
            "category": "Novel",
            "stock": stock
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create book failed: {}", body);
    body["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/api/v1/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["status"], "healthy");
}

#[tokio::test]
async fn test_unknown_route_uses_the_envelope() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/api/v1/magazines", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/api/v1/books", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "NotAuthenticated");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/auth/me",
        Some("not.a.token"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": ADMIN_EMAIL, "password": "wrong" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_registration_ignores_requested_role() {
    let app = app().await;
    let (id, token) = register(&app, "Rina Wulandari", "rina@example.com").await;

    let (status, body) = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);
    assert_eq!(body["data"]["role"], "member");
    assert!(body["data"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_members_cannot_manage_the_catalog() {
    let app = app().await;
    let (_, token) = register(&app, "Rina Wulandari", "rina@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(&token),
        Some(json!({
            "title": "Saman",
            "author": "Ayu Utami",
            "isbn": "9789799023179",
            "category": "Novel"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");

    let (status, _) = send(&app, Method::GET, "/api/v1/borrows", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_malformed_input_uses_the_envelope() {
    let app = app().await;
    let token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (status, body) = send(&app, Method::GET, "/api/v1/books/abc", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "BadValue");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(&token),
        Some(json!({ "title": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/books/search",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

async fn borrow(app: &Router, token: &str, user_id: i64, book_id: i64) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/v1/borrows",
        Some(token),
        Some(json!({ "user_id": user_id, "book_id": book_id })),
    )
    .await
}

#[tokio::test]
async fn test_borrow_and_return_flow() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (rina, rina_token) = register(&app, "Rina Wulandari", "rina@example.com").await;
    let (joko, joko_token) = register(&app, "Joko Susilo", "joko@example.com").await;
    let (sari, _) = register(&app, "Sari Handayani", "sari@example.com").await;
    let book = create_book(&app, &admin, "9789792294460", 2).await;

    let (status, body) = borrow(&app, &admin, rina, book).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["status"], "borrowed");
    assert_eq!(body["data"]["book"]["id"], book);
    let rina_borrow = body["data"]["id"].as_i64().unwrap();

    // Same member again while a copy is still on the shelf
    let (status, body) = borrow(&app, &admin, rina, book).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "DuplicateActiveBorrow");

    let (status, body) = borrow(&app, &admin, joko, book).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let joko_borrow = body["data"]["id"].as_i64().unwrap();

    // Last copy is out
    let (status, body) = borrow(&app, &admin, sari, book).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BookUnavailable");

    // The borrower sees it, another member does not
    let uri = format!("/api/v1/borrows/{}", rina_borrow);
    let (status, _) = send(&app, Method::GET, &uri, Some(&rina_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &uri, Some(&joko_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Copies on loan block deletion
    let book_uri = format!("/api/v1/books/{}", book);
    let (status, body) = send(&app, Method::DELETE, &book_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "HasActiveBorrows");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/borrows/{}/return", rina_borrow),
        Some(&admin),
        Some(json!({ "fine": "2500.00", "notes": "cover torn" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "returned");
    assert_eq!(body["data"]["fine"], "2500.00");
    assert_eq!(body["data"]["notes"], "cover torn");
    assert!(body["data"]["return_date"].is_string());

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/v1/books/isbn/9789792294460",
        Some(&rina_token),
        None,
    )
    .await;
    assert_eq!(body["data"]["id"], book);
    assert_eq!(body["data"]["available"], 1);
    assert_eq!(body["data"]["stock"], 2);

    // Returning twice is a state error
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/borrows/{}/return", rina_borrow),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "NotCurrentlyBorrowed");

    // No body at all means no fine
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/borrows/{}/return", joko_borrow),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "returned");
    assert_eq!(body["data"]["fine"], "0");

    let (status, _) = send(&app, Method::DELETE, &book_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, Method::GET, &book_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "BookNotFound");
}

#[tokio::test]
async fn test_malformed_return_body_leaves_the_loan_open() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (rina, _) = register(&app, "Rina Wulandari", "rina@example.com").await;
    let book = create_book(&app, &admin, "9789792294460", 1).await;

    let (status, body) = borrow(&app, &admin, rina, book).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let id = body["data"]["id"].as_i64().unwrap();
    let return_uri = format!("/api/v1/borrows/{}/return", id);

    let (status, body) = send(
        &app,
        Method::PUT,
        &return_uri,
        Some(&admin),
        Some(json!({ "fine": "twenty thousand", "notes": "damaged" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "BadValue");

    // Not JSON at all
    let request = Request::builder()
        .method(Method::PUT)
        .uri(&return_uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", admin))
        .body(Body::from("fine=20000"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/borrows/{}", id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "borrowed");
    assert!(body["data"]["return_date"].is_null());

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/books/{}", book),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(body["data"]["available"], 0);
}

#[tokio::test]
async fn test_member_history_is_self_or_staff() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (rina, rina_token) = register(&app, "Rina Wulandari", "rina@example.com").await;
    let (joko, _) = register(&app, "Joko Susilo", "joko@example.com").await;
    let book = create_book(&app, &admin, "9789792294460", 2).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/borrows",
        Some(&admin),
        Some(json!({ "user_id": rina, "book_id": book, "notes": "reading club" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/borrows/user/{}/history", rina),
        Some(&rina_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["notes"], "reading club");

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/v1/borrows/user/{}", joko),
        Some(&rina_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_overdue_refresh_reports_transitions() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (rina, _) = register(&app, "Rina Wulandari", "rina@example.com").await;
    let book = create_book(&app, &admin, "9789792294460", 1).await;

    let yesterday = (chrono::Utc::now() - chrono::Duration::days(1)).to_rfc3339();
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/borrows",
        Some(&admin),
        Some(json!({ "user_id": rina, "book_id": book, "due_date": yesterday })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/borrows/overdue/refresh",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["marked_overdue"], 1);

    let (_, body) = send(&app, Method::GET, "/api/v1/borrows/overdue", Some(&admin), None).await;
    assert_eq!(body["data"][0]["status"], "overdue");
    assert_eq!(body["data"][0]["is_overdue"], true);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/api-docs/openapi.json", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/borrows/{id}/return"].is_object());
}
