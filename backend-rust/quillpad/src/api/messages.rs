use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;

use super::{error_response, ok, AppState, PageQuery};
use crate::auth::AuthUser;
use crate::models::*;
use crate::store::NOTIFICATION_PAGE_SIZE;

// ==================== Direct Messages ====================

pub async fn inbox(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.conversations(&auth_user.user_id) {
        Ok(conversations) => ok(conversations),
        Err(e) => error_response(e),
    }
}

/// Opening a thread marks the counterpart's messages as read
pub async fn conversation(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let counterpart_id = path.into_inner();
    let counterpart = match state.store.get_user(&counterpart_id) {
        Ok(user) => user,
        Err(e) => return error_response(e),
    };
    match state.store.conversation(&auth_user.user_id, &counterpart_id) {
        Ok(messages) => ok(serde_json::json!({
            "counterpart": counterpart,
            "messages": messages,
        })),
        Err(e) => error_response(e),
    }
}

pub async fn send_message(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<BodyRequest>,
) -> impl Responder {
    match state
        .store
        .send_message(&auth_user.user_id, &path.into_inner(), &body.body, Utc::now())
    {
        Ok(message) => HttpResponse::Created().json(ApiResponse::success(message)),
        Err(e) => error_response(e),
    }
}

pub async fn unread_message_count(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.unread_message_count(&auth_user.user_id) {
        Ok(count) => ok(serde_json::json!({ "count": count })),
        Err(e) => error_response(e),
    }
}

// ==================== Notifications ====================

pub async fn list_notifications(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<PageQuery>,
) -> impl Responder {
    let page = query.page.unwrap_or(1).max(1);
    match state.store.list_notifications(&auth_user.user_id, page) {
        Ok(items) => ok(Page {
            items,
            page,
            page_size: NOTIFICATION_PAGE_SIZE,
        }),
        Err(e) => error_response(e),
    }
}

pub async fn unread_notification_count(
    state: web::Data<AppState>,
    auth_user: AuthUser,
) -> impl Responder {
    match state.store.unread_notification_count(&auth_user.user_id) {
        Ok(count) => ok(serde_json::json!({ "count": count })),
        Err(e) => error_response(e),
    }
}

pub async fn mark_read(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state
        .store
        .mark_notification_read(&auth_user.user_id, &path.into_inner())
    {
        Ok(()) => ok(serde_json::json!({ "read": true })),
        Err(e) => error_response(e),
    }
}

pub async fn mark_all_read(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.mark_all_notifications_read(&auth_user.user_id) {
        Ok(marked) => ok(serde_json::json!({ "marked": marked })),
        Err(e) => error_response(e),
    }
}
