//! API integration tests, driving the router in-process over the in-memory store

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use libris_server::{
    auth::TokenCodec,
    create_router,
    models::user::{NewUser, Role, User},
    repository::{memory::MemoryStore, Stores, UserStore},
    services::Services,
    AppConfig, AppError, AppResult, AppState,
};

struct TestApp {
    router: Router,
    store: MemoryStore,
    tokens: TokenCodec,
}

impl TestApp {
    fn new() -> Self {
        let store = MemoryStore::new();
        Self::with_stores(store.clone(), store.stores())
    }

    fn with_stores(store: MemoryStore, stores: Stores) -> Self {
        let config = AppConfig::default();
        let services = Services::new(stores, &config).expect("services");
        let tokens = TokenCodec::new(&config.auth.jwt_secret).expect("codec");

        let router = create_router(AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        });

        Self { router, store, tokens }
    }

    fn token_for(&self, username: &str, role: Role) -> String {
        self.tokens.encode(username, role, Duration::minutes(5)).expect("token")
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }
}

/// Account store whose lookups by id always fail
struct UnreachableUserIds(MemoryStore);

#[async_trait]
impl UserStore for UnreachableUserIds {
    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        self.0.get_by_username(username).await
    }

    async fn get_by_id(&self, _id: i64) -> AppResult<Option<User>> {
        Err(AppError::StoreUnavailable("user lookup timed out".to_string()))
    }

    async fn username_exists(&self, username: &str) -> AppResult<bool> {
        self.0.username_exists(username).await
    }

    async fn email_exists(&self, email: &str) -> AppResult<bool> {
        self.0.email_exists(email).await
    }

    async fn insert(&self, user: &NewUser) -> AppResult<User> {
        UserStore::insert(&self.0, user).await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, body) = app.send("GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send("GET", "/api/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_public_catalogue_needs_no_token() {
    let app = TestApp::new();
    let book = app.store.add_book("War and Peace", "978-5-389-06256-6").await;

    let (status, body) = app.send("GET", "/api/books/public?page=0&size=5", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["size"], 5);
    assert_eq!(body["items"][0]["title"], "War and Peace");

    let (status, body) = app
        .send("GET", &format!("/api/books/public/{}", book.id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);

    let (status, body) = app.send("GET", "/api/books/public/999", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NoSuchItem");
}

#[tokio::test]
async fn test_borrow_requires_authentication() {
    let app = TestApp::new();
    let book = app.store.add_book("War and Peace", "978-5-389-06256-6").await;
    let uri = format!("/api/books/{}/borrow", book.id);

    let (status, _) = app.send("POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send("POST", &uri, Some("not.a.token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(app.store.book(book.id).await.unwrap().available);
}

#[tokio::test]
async fn test_expired_token_is_anonymous() {
    let app = TestApp::new();
    app.store.add_user("alice", "x", Role::Reader).await;
    let book = app.store.add_book("War and Peace", "978-5-389-06256-6").await;

    let expired = app
        .tokens
        .encode_at("alice", Role::Reader, Duration::minutes(1), Utc::now() - Duration::hours(1))
        .unwrap();

    let (status, _) = app.send("GET", "/api/books/public", Some(&expired), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send("POST", &format!("/api/books/{}/borrow", book.id), Some(&expired), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_login_borrow_return() {
    let app = TestApp::new();
    let book = app.store.add_book("War and Peace", "978-5-389-06256-6").await;

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": "alice", "password": "secret123", "email": "alice@library.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "READER");

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app.send("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject"], "alice");
    assert_eq!(body["role"], "READER");

    let (status, body) = app
        .send("POST", &format!("/api/books/{}/borrow", book.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);
    assert_eq!(body["borrowed_by"]["username"], "alice");
    assert!(body["borrow_date"].is_string());

    let (status, body) = app
        .send("POST", &format!("/api/books/{}/return", book.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);
    assert!(body["return_date"].is_string());
    assert!(body["borrowed_by"].is_null());
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let app = TestApp::new();
    app.send(
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": "alice", "password": "secret123", "email": "alice@library.com" })),
    )
    .await;

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn test_only_the_holder_may_return() {
    let app = TestApp::new();
    app.store.add_user("alice", "x", Role::Reader).await;
    app.store.add_user("bob", "x", Role::Reader).await;
    let book = app.store.add_book("War and Peace", "978-5-389-06256-6").await;
    let alice = app.token_for("alice", Role::Reader);
    let bob = app.token_for("bob", Role::Reader);

    let (status, _) = app
        .send("POST", &format!("/api/books/{}/borrow", book.id), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send("POST", &format!("/api/books/{}/borrow", book.id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ItemNotAvailable");

    let (status, body) = app
        .send("POST", &format!("/api/books/{}/return", book.id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NotHolder");

    let (status, _) = app
        .send("POST", &format!("/api/books/{}/return", book.id), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send("POST", &format!("/api/books/{}/return", book.id), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ItemNotBorrowed");
}

#[tokio::test]
async fn test_borrow_succeeds_when_borrower_details_are_unavailable() {
    let store = MemoryStore::new();
    let stores = Stores {
        users: Arc::new(UnreachableUserIds(store.clone())),
        ..store.stores()
    };
    let app = TestApp::with_stores(store, stores);
    app.store.add_user("alice", "x", Role::Reader).await;
    let book = app.store.add_book("War and Peace", "978-5-389-06256-6").await;
    let alice = app.token_for("alice", Role::Reader);

    let (status, body) = app
        .send("POST", &format!("/api/books/{}/borrow", book.id), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);
    assert!(body["borrowed_by"].is_null());

    let stored = app.store.book(book.id).await.unwrap();
    assert_eq!(stored.holder_id, Some(1));

    // The loan is visible to its holder, who can return it
    let (status, _) = app
        .send("POST", &format!("/api/books/{}/return", book.id), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_holder_is_unauthorized() {
    let app = TestApp::new();
    let book = app.store.add_book("War and Peace", "978-5-389-06256-6").await;
    let ghost = app.token_for("ghost", Role::Reader);

    let (status, _) = app
        .send("POST", &format!("/api/books/{}/borrow", book.id), Some(&ghost), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app.store.book(book.id).await.unwrap().available);
}

#[tokio::test]
async fn test_admin_routes_check_roles() {
    let app = TestApp::new();
    app.store.add_user("root", "x", Role::Admin).await;
    app.store.add_user("alice", "x", Role::Reader).await;
    let admin = app.token_for("root", Role::Admin);
    let reader = app.token_for("alice", Role::Reader);
    let request = json!({
        "title": "Crime and Punishment",
        "author": "Fyodor Dostoevsky",
        "isbn": "978-5-17-090539-2",
        "publication_year": 1866
    });

    let (status, _) = app.send("POST", "/api/admin/books", None, Some(request.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send("POST", "/api/admin/books", Some(&reader), Some(request.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NotAuthorized");

    let (status, body) = app
        .send("POST", "/api/admin/books", Some(&admin), Some(request.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["isbn"], "978-5-17-090539-2");

    let (status, _) = app.send("POST", "/api/admin/books", Some(&admin), Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Admins cannot borrow
    let (status, _) = app
        .send("POST", &format!("/api/books/{}/borrow", body["id"]), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_demoted_admin_loses_admin_routes() {
    let app = TestApp::new();
    app.store.add_user("root", "x", Role::Admin).await;
    let token = app.token_for("root", Role::Admin);
    let book = |isbn: &str| {
        json!({
            "title": "Crime and Punishment",
            "author": "Fyodor Dostoevsky",
            "isbn": isbn,
            "publication_year": 1866
        })
    };

    let (status, _) = app
        .send("POST", "/api/admin/books", Some(&token), Some(book("978-5-17-090539-2")))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // The token still claims ADMIN, the directory no longer does
    app.store.set_role("root", Role::Reader).await;

    let (status, body) = app
        .send("POST", "/api/admin/books", Some(&token), Some(book("978-5-389-06256-6")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NotAuthorized");

    let (status, body) = app.send("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "READER");
}

#[tokio::test]
async fn test_labelled_isbn_is_catalogued_bare() {
    let app = TestApp::new();
    app.store.add_user("root", "x", Role::Admin).await;
    let admin = app.token_for("root", Role::Admin);
    let book = |isbn: &str| {
        json!({ "title": "Crime and Punishment", "author": "Fyodor Dostoevsky", "isbn": isbn, "publication_year": 1866 })
    };

    let (status, body) = app
        .send("POST", "/api/admin/books", Some(&admin), Some(book("ISBN-13: 978-5-17-090539-2")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["isbn"], "978-5-17-090539-2");

    let (status, _) = app
        .send("POST", "/api/admin/books", Some(&admin), Some(book("978-5-17-090539-2")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_book_lists_fields() {
    let app = TestApp::new();
    app.store.add_user("root", "x", Role::Admin).await;
    let admin = app.token_for("root", Role::Admin);

    let (status, body) = app
        .send(
            "POST",
            "/api/admin/books",
            Some(&admin),
            Some(json!({ "title": " ", "author": "Tolstoy", "isbn": "12345", "publication_year": 1869 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f["field"].as_str())
        .collect();
    assert!(fields.contains(&"title"));
    assert!(fields.contains(&"isbn"));
}
