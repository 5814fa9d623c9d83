//! End-to-end tests of the HTTP surface over in-memory backends.

use api_lib::{config::Config, web};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use listings_core::testing::{InMemoryDatabase, InMemoryKeyValueStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// ============================================================================
// HARNESS
// ============================================================================

struct TestApp {
    db: Arc<InMemoryDatabase>,
    kv: Arc<InMemoryKeyValueStore>,
    router: Router,
}

fn test_app() -> TestApp {
    let config = Config::from_lookup(|name| match name {
        "DATABASE_URL" => Some("postgres://unused/listings".to_string()),
        _ => None,
    })
    .expect("test config");
    let db = Arc::new(InMemoryDatabase::new());
    let kv = Arc::new(InMemoryKeyValueStore::new());
    let state = Arc::new(web::AppState::new(Arc::new(config), db.clone(), kv.clone()));
    TestApp {
        db,
        kv,
        router: web::router(state),
    }
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
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
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    async fn dummy_login(&self, user_type: &str) -> String {
        let (status, body) = self
            .get(&format!("/dummyLogin?user_type={user_type}"), None)
            .await;
        assert_eq!(status, StatusCode::OK, "dummy login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn create_house(&self, token: &str) -> i64 {
        let (status, body) = self
            .post(
                "/house/create",
                Some(token),
                json!({ "address": "Lenina 1", "year": 2000, "developer": "Builder" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create house failed: {body}");
        body["house"]["id"].as_i64().unwrap()
    }

    async fn create_flat(&self, token: &str, house_id: i64, number: i32) -> (StatusCode, Value) {
        self.post(
            "/flat/create",
            Some(token),
            json!({ "house_id": house_id, "id": number, "price": 1000, "rooms": 2 }),
        )
        .await
    }
}

fn statuses(body: &Value) -> Vec<(i64, String)> {
    body["flats"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| {
            (
                f["id"].as_i64().unwrap(),
                f["status"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

// ============================================================================
// SESSIONS
// ============================================================================

#[tokio::test]
async fn health_is_public() {
    let app = test_app();
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_reject_missing_or_unknown_tokens() {
    let app = test_app();
    let (status, _) = app.get("/house/1", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.get("/house/1", Some("not-a-session")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn session_store_outage_is_a_server_error_not_a_401() {
    let app = test_app();
    let token = app.dummy_login("client").await;
    app.kv.set_available(false);

    let (status, body) = app.get("/house/1", Some(&token)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");
}

#[tokio::test]
async fn unknown_user_type_is_rejected() {
    let app = test_app();
    let (status, _) = app.get("/dummyLogin?user_type=admin", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// MODERATION FLOW
// ============================================================================

#[tokio::test]
async fn flat_becomes_public_only_after_approval() {
    let app = test_app();
    let moderator = app.dummy_login("moderator").await;
    let client = app.dummy_login("client").await;
    let house = app.create_house(&moderator).await;

    let (status, body) = app.create_flat(&client, house, 7).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flat"]["status"], "created");

    let (_, body) = app.get(&format!("/house/{house}"), Some(&client)).await;
    assert!(statuses(&body).is_empty());

    // The moderator's listing drains the new flat into moderation, twice over.
    for _ in 0..2 {
        let (status, body) = app.get(&format!("/house/{house}"), Some(&moderator)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(statuses(&body), vec![(7, "on_moderation".to_string())]);
    }

    let (status, body) = app
        .post(
            "/flat/update",
            Some(&moderator),
            json!({ "house_id": house, "id": 7, "price": 1200, "rooms": 2, "status": "approved" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["flat"]["price"], 1200);

    let (_, body) = app.get(&format!("/house/{house}"), Some(&client)).await;
    assert_eq!(statuses(&body), vec![(7, "approved".to_string())]);
}

#[tokio::test]
async fn clients_cannot_create_houses() {
    let app = test_app();
    let client = app.dummy_login("client").await;
    let (status, _) = app
        .post(
            "/house/create",
            Some(&client),
            json!({ "address": "Lenina 1", "year": 2000 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_flat_number_conflicts() {
    let app = test_app();
    let moderator = app.dummy_login("moderator").await;
    let house = app.create_house(&moderator).await;

    assert_eq!(app.create_flat(&moderator, house, 1).await.0, StatusCode::OK);
    assert_eq!(app.create_flat(&moderator, house, 1).await.0, StatusCode::CONFLICT);
    assert_eq!(app.db.flat(house, 1).unwrap().price, 1000);
}

#[tokio::test]
async fn unknown_house_is_404() {
    let app = test_app();
    let client = app.dummy_login("client").await;
    let (status, _) = app.get("/house/999", Some(&client)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.create_flat(&client, 999, 1).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_requests_are_400() {
    let app = test_app();
    let moderator = app.dummy_login("moderator").await;
    let house = app.create_house(&moderator).await;
    app.create_flat(&moderator, house, 1).await;

    let (status, _) = app
        .post(
            "/flat/update",
            Some(&moderator),
            json!({ "house_id": house, "id": 1, "price": 10, "rooms": 1, "status": "pending" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/flat/create",
            Some(&moderator),
            json!({ "house_id": house, "id": 2, "price": 0, "rooms": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/house/create",
            Some(&moderator),
            json!({ "address": "", "year": 2000 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn database_outage_during_listing_is_500() {
    let app = test_app();
    let client = app.dummy_login("client").await;
    app.db.set_available(false);
    let (status, body) = app.get("/house/1", Some(&client)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");
}

// ============================================================================
// ACCOUNTS
// ============================================================================

#[tokio::test]
async fn register_then_login_issues_a_working_session() {
    let app = test_app();
    let creds = json!({ "email": "mod@example.com", "password": "hunter22", "user_type": "moderator" });

    let (status, body) = app.post("/register", None, creds.clone()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["user_id"].as_str().is_some_and(|id| !id.is_empty()));

    let (status, _) = app.post("/register", None, creds).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post("/login", None, json!({ "email": "mod@example.com", "password": "wrong-one" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/login", None, json!({ "email": "nobody@example.com", "password": "hunter22" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .post("/login", None, json!({ "email": "mod@example.com", "password": "hunter22" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    // A registered moderator can create a house and becomes its reviewer.
    let house = app.create_house(&token).await;
    assert_eq!(
        app.db.home(house).unwrap().reviewer_id,
        body_user_id(&app, "mod@example.com").await
    );
}

#[tokio::test]
async fn only_the_house_reviewer_may_update_its_flats() {
    let app = test_app();
    let owner = app.dummy_login("moderator").await;
    let house = app.create_house(&owner).await;
    app.create_flat(&owner, house, 3).await;

    app.post(
        "/register",
        None,
        json!({ "email": "other@example.com", "password": "secret1", "user_type": "moderator" }),
    )
    .await;
    let (_, body) = app
        .post("/login", None, json!({ "email": "other@example.com", "password": "secret1" }))
        .await;
    let other = body["token"].as_str().unwrap().to_string();

    let update = json!({ "house_id": house, "id": 3, "price": 10, "rooms": 1, "status": "declined" });
    let (status, _) = app.post("/flat/update", Some(&other), update.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let client = app.dummy_login("client").await;
    let (status, _) = app.post("/flat/update", Some(&client), update.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.post("/flat/update", Some(&owner), update).await;
    assert_eq!(status, StatusCode::OK);
}

async fn body_user_id(app: &TestApp, email: &str) -> String {
    use listings_core::DatabaseService;
    app.db.get_user_by_email(email).await.unwrap().user.id
}
