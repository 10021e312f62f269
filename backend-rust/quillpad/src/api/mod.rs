use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{AuthError, AuthService};
use crate::events::EventProcessor;
use crate::media::{AvatarProvider, MediaStore};
use crate::metrics;
use crate::models::*;
use crate::store::{Store, StoreError};

mod auth;
mod collections;
mod engagement;
mod feed;
mod messages;
mod posts;
mod social;

pub struct AppState {
    pub store: Arc<Store>,
    pub auth_service: Arc<AuthService>,
    pub event_processor: Arc<EventProcessor>,
    pub media: MediaStore,
    pub avatars: AvatarProvider,
    /// Username allowed to run administrative sweeps
    pub admin_username: Option<String>,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        auth_service: Arc<AuthService>,
        media: MediaStore,
        admin_username: Option<String>,
    ) -> Self {
        Self {
            event_processor: Arc::new(EventProcessor::new(store.clone())),
            store,
            auth_service,
            media,
            avatars: AvatarProvider::Uploads {
                base_url: "/uploads".to_string(),
            },
            admin_username,
        }
    }

    pub fn with_avatars(mut self, avatars: AvatarProvider) -> Self {
        self.avatars = avatars;
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

/// Map a store failure onto the JSON envelope and its status code
pub(crate) fn error_response(e: StoreError) -> HttpResponse {
    match e {
        StoreError::NotFound(msg) => HttpResponse::NotFound().json(ApiResponse::<()>::error(msg)),
        StoreError::Conflict(msg) => HttpResponse::Conflict().json(ApiResponse::<()>::error(msg)),
        StoreError::Forbidden(msg) => HttpResponse::Forbidden().json(ApiResponse::<()>::error(msg)),
        StoreError::InvalidInput(msg) => HttpResponse::BadRequest().json(ApiResponse::<()>::error(msg)),
        e => {
            log::error!("Request failed: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::<()>::error("Internal server error"))
        }
    }
}

pub(crate) fn auth_error_response(e: AuthError) -> HttpResponse {
    match e {
        AuthError::InvalidCredentials | AuthError::SessionRevoked | AuthError::Token(_) => {
            HttpResponse::Unauthorized().json(ApiResponse::<()>::error(e.to_string()))
        }
        AuthError::InvalidInput(msg) => HttpResponse::BadRequest().json(ApiResponse::<()>::error(msg)),
        AuthError::Store(e) => error_response(e),
        AuthError::Hash(e) => {
            log::error!("Password hashing failed: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::<()>::error("Internal server error"))
        }
    }
}

pub(crate) fn ok<T: serde::Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(data))
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(health))

        // Accounts and sessions
        .route("/register", web::post().to(auth::register))
        .route("/check_username", web::get().to(auth::check_username))
        .route("/login", web::post().to(auth::login))
        .route("/logout", web::get().to(auth::logout))
        .route("/logout", web::post().to(auth::logout))
        .route("/api/me", web::get().to(auth::me))
        .route("/api/profile", web::post().to(auth::update_profile))
        .route("/api/avatar", web::post().to(auth::upload_avatar))
        .route("/api/toggle_dark_mode", web::post().to(auth::toggle_dark_mode))

        // Users and the social graph
        .route("/api/users/{id}", web::get().to(social::get_profile))
        .route("/api/users/{id}/followers", web::get().to(social::list_followers))
        .route("/api/users/{id}/following", web::get().to(social::list_following))
        .route("/follow/{id}", web::post().to(social::follow))
        .route("/unfollow/{id}", web::post().to(social::unfollow))
        .route("/api/block/{id}", web::post().to(social::block))
        .route("/api/unblock/{id}", web::post().to(social::unblock))
        .route("/api/blocked", web::get().to(social::list_blocked))

        // Feeds
        .route("/", web::get().to(feed::home))
        .route("/trending", web::get().to(feed::trending))
        .route("/search", web::get().to(feed::search))
        .route("/tag/{tag}", web::get().to(feed::by_tag))
        .route("/api/tags", web::get().to(feed::top_tags))

        // Posts
        .route("/create_post", web::post().to(posts::create_post))
        .route("/edit_post/{id}", web::post().to(posts::edit_post))
        .route("/delete_post/{id}", web::post().to(posts::delete_post))
        .route("/post/{id}", web::get().to(posts::get_post))
        .route("/api/drafts", web::get().to(posts::list_drafts))
        .route("/api/posts/{id}/image", web::post().to(posts::upload_post_image))
        .route("/uploads/{filename}", web::get().to(posts::get_upload))
        .route("/api/admin/publish_scheduled", web::post().to(posts::publish_scheduled))

        // Comments
        .route("/comment/{post_id}", web::post().to(posts::add_comment))
        .route("/api/reply/{id}", web::post().to(posts::reply))
        .route("/delete_comment/{id}", web::post().to(posts::delete_comment))
        .route("/api/comments/{id}", web::get().to(posts::get_comment))

        // Engagement
        .route("/api/like/{id}", web::post().to(engagement::like))
        .route("/api/unlike/{id}", web::post().to(engagement::unlike))
        .route("/api/bookmark/{id}", web::post().to(engagement::bookmark))
        .route("/api/unbookmark/{id}", web::post().to(engagement::unbookmark))
        .route("/api/track_view/{id}", web::post().to(engagement::track_view))
        .route("/api/is_liked/{id}", web::get().to(engagement::is_liked))
        .route("/api/bookmarks", web::get().to(engagement::list_bookmarks))

        // Collections
        .route("/api/collections", web::get().to(collections::list_collections))
        .route("/api/collections", web::post().to(collections::create_collection))
        .route("/api/collections/{id}", web::get().to(collections::get_collection))
        .route("/api/collections/{id}/delete", web::post().to(collections::delete_collection))
        .route("/api/collections/{id}/add/{post_id}", web::post().to(collections::add_item))
        .route("/api/collections/{id}/remove/{post_id}", web::post().to(collections::remove_item))

        // Messages and notifications
        .route("/messages", web::get().to(messages::inbox))
        .route("/messages/{user_id}", web::get().to(messages::conversation))
        .route("/api/send_message/{id}", web::post().to(messages::send_message))
        .route("/api/messages/unread_count", web::get().to(messages::unread_message_count))
        .route("/api/notifications", web::get().to(messages::list_notifications))
        .route("/api/notifications/unread_count", web::get().to(messages::unread_notification_count))
        .route("/api/notifications/read_all", web::post().to(messages::mark_all_read))
        .route("/api/notifications/{id}/read", web::post().to(messages::mark_read))

        // Metrics
        .route("/api/metrics", web::get().to(metrics::get_metrics_handler));
}
