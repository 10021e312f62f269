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

/// Register, log in, and return the token
macro_rules! register_and_get_token {
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
        resp["data"]["token"].as_str().unwrap().to_string()
    }};
}

macro_rules! create_post {
    ($app:expr, $token:expr, $body:expr) => {{
        let req = test::TestRequest::post()
            .uri("/create_post")
            .insert_header(bearer(&$token))
            .set_json($body)
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&$app, req).await;
        body["data"]["id"].as_str().unwrap().to_string()
    }};
}

/// Public GET without credentials
macro_rules! anon_json {
    ($app:expr, $uri:expr) => {{
        let req = test::TestRequest::get().uri($uri).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&$app, req).await;
        body
    }};
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

fn titles(body: &serde_json::Value) -> Vec<String> {
    body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap().to_string())
        .collect()
}

#[actix_web::test]
async fn test_home_feed_pages() {
    let (store, auth_service, dir) = setup();
    let app = init_app!(store, auth_service, dir);
    let alice = register_and_get_token!(app, "alice");

    for i in 0..12 {
        create_post!(app, alice, json!({ "title": format!("Post {:02}", i) }));
    }

    let req = test::TestRequest::get()
        .uri("/")
        .insert_header(bearer(&alice))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["page"], 1);
    assert_eq!(body["data"]["page_size"], 10);
    let first = titles(&body);
    assert_eq!(first.len(), 10);
    assert_eq!(first[0], "Post 11");

    let req = test::TestRequest::get()
        .uri("/?page=2")
        .insert_header(bearer(&alice))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(titles(&body), vec!["Post 01", "Post 00"]);

    // Nonsense pages fall back to the first
    let req = test::TestRequest::get()
        .uri("/?page=-3")
        .insert_header(bearer(&alice))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["page"], 1);

    // Far past the end is an empty page, not an error
    let req = test::TestRequest::get()
        .uri(&format!("/?page={}", i64::MAX))
        .insert_header(bearer(&alice))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(titles(&body).is_empty());
}

#[actix_web::test]
async fn test_search_and_tags_are_public() {
    let (store, auth_service, dir) = setup();
    let app = init_app!(store, auth_service, dir);
    let alice = register_and_get_token!(app, "alice");

    create_post!(app, alice, json!({ "title": "Borrow checker", "content": "rust lifetimes", "tags": "rust" }));
    create_post!(app, alice, json!({ "title": "Async", "content": "futures in Rust", "tags": "rust, async" }));
    create_post!(app, alice, json!({ "title": "Gardening", "content": "tomatoes", "tags": "life" }));
    create_post!(app, alice, json!({ "title": "Rust draft", "tags": "rust", "draft": true }));

    let body = anon_json!(app, "/search?q=rust");
    let mut found = titles(&body);
    found.sort();
    assert_eq!(found, vec!["Async", "Borrow checker"]);

    // LIKE wildcards are matched literally
    let body = anon_json!(app, "/search?q=%25");
    assert!(titles(&body).is_empty());

    let body = anon_json!(app, "/search?q=");
    assert!(titles(&body).is_empty());

    create_post!(app, alice, json!({ "title": "Café society" }));
    let body = anon_json!(app, "/search?q=CAF%C3%89");
    assert_eq!(titles(&body), vec!["Café society"]);

    let body = anon_json!(app, "/tag/async");
    assert_eq!(titles(&body), vec!["Async"]);

    let body = anon_json!(app, "/api/tags");
    assert_eq!(body["data"][0]["name"], "rust");
    assert_eq!(body["data"][0]["count"], 2);
}

#[actix_web::test]
async fn test_trending_orders_by_likes() {
    let (store, auth_service, dir) = setup();
    let app = init_app!(store, auth_service, dir);
    let alice = register_and_get_token!(app, "alice");
    let bob = register_and_get_token!(app, "bob");

    let quiet = create_post!(app, alice, json!({ "title": "Quiet" }));
    let loud = create_post!(app, alice, json!({ "title": "Loud" }));
    create_post!(app, alice, json!({ "title": "Newest" }));

    for (token, post_id) in [(&alice, &loud), (&bob, &loud), (&bob, &quiet)] {
        let req = test::TestRequest::post()
            .uri(&format!("/api/like/{}", post_id))
            .insert_header(bearer(token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }

    let body = anon_json!(app, "/trending");
    assert_eq!(titles(&body), vec!["Loud", "Quiet", "Newest"]);
    assert_eq!(body["data"]["items"][0]["like_count"], 2);
    assert_eq!(body["data"]["items"][0]["liked"], false);
}

#[actix_web::test]
async fn test_summary_flags_follow_viewer() {
    let (store, auth_service, dir) = setup();
    let app = init_app!(store, auth_service, dir);
    let alice = register_and_get_token!(app, "alice");
    let bob = register_and_get_token!(app, "bob");
    let post_id = create_post!(app, alice, json!({ "title": "Flags" }));

    for action in ["like", "bookmark"] {
        let req = test::TestRequest::post()
            .uri(&format!("/api/{}/{}", action, post_id))
            .insert_header(bearer(&bob))
            .to_request();
        test::call_service(&app, req).await;
    }

    let req = test::TestRequest::get()
        .uri("/")
        .insert_header(bearer(&bob))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["items"][0]["liked"], true);
    assert_eq!(body["data"]["items"][0]["bookmarked"], true);

    let req = test::TestRequest::get()
        .uri("/")
        .insert_header(bearer(&alice))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["items"][0]["liked"], false);
    assert_eq!(body["data"]["items"][0]["like_count"], 1);
}
