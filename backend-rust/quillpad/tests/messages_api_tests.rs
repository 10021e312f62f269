use actix_web::{http::header, test, web, App};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use quillpad::api::{self, AppState};
use quillpad::auth::AuthService;
use quillpad::media::MediaStore;
use quillpad::store::Store;

/// Helper to create AppState with all required components
fn create_app_state(store: Arc<Store>, auth_service: Arc<AuthService>, upload_dir: &Path) -> AppState {
    let media = MediaStore::new(upload_dir, 1024 * 1024).unwrap();
    AppState::new(store, auth_service, media, None)
}

fn setup() -> (Arc<Store>, Arc<AuthService>, tempfile::TempDir) {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(
        AuthService::new("test_secret".to_string(), store.clone()).with_hash_cost(4),
    );
    (store, auth_service, tempfile::tempdir().unwrap())
}

macro_rules! init_app {
    ($store:expr, $auth_service:expr, $dir:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($auth_service.clone()))
                .app_data(web::Data::new(create_app_state(
                    $store.clone(),
                    $auth_service.clone(),
                    $dir.path(),
                )))
                .configure(api::configure_routes),
        )
        .await
    };
}

/// Register, log in, and return (token, user_id)
macro_rules! register_and_login {
    ($app:expr, $username:expr) => {{
        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(json!({ "username": $username, "password": "password123" }))
            .to_request();
        assert_eq!(test::call_service(&$app, req).await.status(), 201);

        let req = test::TestRequest::post()
            .uri("/login")
            .set_json(json!({ "username": $username, "password": "password123" }))
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&$app, req).await;
        let token = resp["data"]["token"].as_str().unwrap().to_string();
        let user_id = resp["data"]["user"]["id"].as_str().unwrap().to_string();
        (token, user_id)
    }};
}

macro_rules! post {
    ($app:expr, $token:expr, $uri:expr) => {{
        let req = test::TestRequest::post()
            .uri(&$uri)
            .insert_header(bearer(&$token))
            .to_request();
        test::call_service(&$app, req).await
    }};
    ($app:expr, $token:expr, $uri:expr, $body:expr) => {{
        let req = test::TestRequest::post()
            .uri(&$uri)
            .insert_header(bearer(&$token))
            .set_json($body)
            .to_request();
        test::call_service(&$app, req).await
    }};
}

macro_rules! get_json {
    ($app:expr, $token:expr, $uri:expr) => {{
        let req = test::TestRequest::get()
            .uri(&$uri)
            .insert_header(bearer(&$token))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&$app, req).await;
        body
    }};
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

// ==================== Direct Message Tests ====================

#[actix_web::test]
async fn test_send_message_validation() {
    let (store, auth_service, dir) = setup();
    let app = init_app!(store, auth_service, dir);
    let (alice, alice_id) = register_and_login!(app, "alice");
    let (_, bob_id) = register_and_login!(app, "bob");

    let resp = post!(app, alice, format!("/api/send_message/{}", bob_id), json!({ "body": "  " }));
    assert_eq!(resp.status(), 400);
    let resp = post!(app, alice, format!("/api/send_message/{}", alice_id), json!({ "body": "me" }));
    assert_eq!(resp.status(), 400);
    let resp = post!(app, alice, "/api/send_message/nobody".to_string(), json!({ "body": "hi" }));
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_conversation_marks_read() {
    let (store, auth_service, dir) = setup();
    let app = init_app!(store, auth_service, dir);
    let (alice, alice_id) = register_and_login!(app, "alice");
    let (bob, bob_id) = register_and_login!(app, "bob");

    post!(app, alice, format!("/api/send_message/{}", bob_id), json!({ "body": "hello" }));
    post!(app, alice, format!("/api/send_message/{}", bob_id), json!({ "body": "are you there?" }));

    let body = get_json!(app, bob, "/api/messages/unread_count".to_string());
    assert_eq!(body["data"]["count"], 2);

    let body = get_json!(app, bob, "/messages".to_string());
    let inbox = body["data"].as_array().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["counterpart_username"], "alice");
    assert_eq!(inbox[0]["unread_count"], 2);
    assert_eq!(inbox[0]["last_message"]["body"], "are you there?");

    let body = get_json!(app, bob, format!("/messages/{}", alice_id));
    assert_eq!(body["data"]["counterpart"]["username"], "alice");
    let messages = body["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["body"], "hello");

    let body = get_json!(app, bob, "/api/messages/unread_count".to_string());
    assert_eq!(body["data"]["count"], 0);

    // Alice's own sent messages are untouched by her opening the thread
    post!(app, bob, format!("/api/send_message/{}", alice_id), json!({ "body": "yes" }));
    let body = get_json!(app, alice, "/api/messages/unread_count".to_string());
    assert_eq!(body["data"]["count"], 1);
}

#[actix_web::test]
async fn test_conversation_with_unknown_user() {
    let (store, auth_service, dir) = setup();
    let app = init_app!(store, auth_service, dir);
    let (alice, _) = register_and_login!(app, "alice");

    let req = test::TestRequest::get()
        .uri("/messages/nobody")
        .insert_header(bearer(&alice))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

// ==================== Notification Tests ====================

#[actix_web::test]
async fn test_notifications_read_flow() {
    let (store, auth_service, dir) = setup();
    let app = init_app!(store, auth_service, dir);
    let (alice, alice_id) = register_and_login!(app, "alice");
    let (bob, _) = register_and_login!(app, "bob");
    let (carol, _) = register_and_login!(app, "carol");

    post!(app, bob, format!("/follow/{}", alice_id));
    post!(app, carol, format!("/follow/{}", alice_id));

    let body = get_json!(app, alice, "/api/notifications/unread_count".to_string());
    assert_eq!(body["data"]["count"], 2);

    let body = get_json!(app, alice, "/api/notifications".to_string());
    assert_eq!(body["data"]["page"], 1);
    assert_eq!(body["data"]["page_size"], 20);
    let first = body["data"]["items"][0]["id"].as_str().unwrap().to_string();

    // Someone else's notification cannot be marked
    let resp = post!(app, bob, format!("/api/notifications/{}/read", first));
    assert_eq!(resp.status(), 404);

    let resp = post!(app, alice, format!("/api/notifications/{}/read", first));
    assert_eq!(resp.status(), 200);
    let body = get_json!(app, alice, "/api/notifications/unread_count".to_string());
    assert_eq!(body["data"]["count"], 1);

    let resp = post!(app, alice, "/api/notifications/read_all".to_string());
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["marked"], 1);
    let body = get_json!(app, alice, "/api/notifications/unread_count".to_string());
    assert_eq!(body["data"]["count"], 0);
}

#[actix_web::test]
async fn test_notifications_paginate() {
    let (store, auth_service, dir) = setup();
    let app = init_app!(store, auth_service, dir);
    let (alice, alice_id) = register_and_login!(app, "alice");

    let resp = post!(app, alice, "/create_post".to_string(), json!({ "title": "Popular" }));
    let body: serde_json::Value = test::read_body_json(resp).await;
    let post_id = body["data"]["id"].as_str().unwrap().to_string();

    for i in 0..22 {
        let (token, _) = register_and_login!(app, format!("fan{:02}", i));
        post!(app, token, format!("/api/like/{}", post_id));
    }
    // Liking your own post notifies nobody
    post!(app, alice, format!("/api/like/{}", post_id));

    let body = get_json!(app, alice, "/api/notifications".to_string());
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 20);
    let body = get_json!(app, alice, "/api/notifications?page=2".to_string());
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["type"], "like");
    assert_eq!(items[0]["post_id"], post_id.as_str());
    assert_ne!(items[0]["actor_id"], alice_id.as_str());
}
