use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;

use super::{error_response, ok, AppState};
use crate::auth::AuthUser;
use crate::events::like_created_event;
use crate::models::*;

fn like_state(state: &AppState, user_id: Option<&str>, post_id: &str) -> HttpResponse {
    let liked = match user_id {
        Some(uid) => state.store.has_engagement(Engagement::Like, uid, post_id),
        None => Ok(false),
    };
    let result = liked.and_then(|liked| {
        state
            .store
            .engagement_count(Engagement::Like, post_id)
            .map(|count| (liked, count))
    });
    match result {
        Ok((liked, like_count)) => ok(serde_json::json!({ "liked": liked, "like_count": like_count })),
        Err(e) => error_response(e),
    }
}

pub async fn like(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let post_id = path.into_inner();
    if let Err(e) = state
        .store
        .add_engagement(Engagement::Like, &auth_user.user_id, &post_id, Utc::now())
    {
        return error_response(e);
    }

    match state.store.get_post(&post_id) {
        Ok(post) => state
            .event_processor
            .dispatch(like_created_event(&auth_user.user_id, &post)),
        Err(e) => log::error!("Post {} vanished after like: {}", post_id, e),
    }
    like_state(&state, Some(auth_user.user_id.as_str()), &post_id)
}

pub async fn unlike(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let post_id = path.into_inner();
    if let Err(e) = state
        .store
        .remove_engagement(Engagement::Like, &auth_user.user_id, &post_id)
    {
        return error_response(e);
    }
    like_state(&state, Some(auth_user.user_id.as_str()), &post_id)
}

pub async fn bookmark(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.add_engagement(
        Engagement::Bookmark,
        &auth_user.user_id,
        &path.into_inner(),
        Utc::now(),
    ) {
        Ok(()) => ok(serde_json::json!({ "bookmarked": true })),
        Err(e) => error_response(e),
    }
}

pub async fn unbookmark(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state
        .store
        .remove_engagement(Engagement::Bookmark, &auth_user.user_id, &path.into_inner())
    {
        Ok(()) => ok(serde_json::json!({ "bookmarked": false })),
        Err(e) => error_response(e),
    }
}

/// Repeat views by the same user are accepted but not recorded again
pub async fn track_view(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state
        .store
        .record_view(&auth_user.viewer(), &path.into_inner(), Utc::now())
    {
        Ok(recorded) => ok(serde_json::json!({ "recorded": recorded })),
        Err(e) => error_response(e),
    }
}

pub async fn is_liked(
    state: web::Data<AppState>,
    viewer: Viewer,
    path: web::Path<String>,
) -> impl Responder {
    let post_id = path.into_inner();
    if let Err(e) = state.store.get_visible_post(&viewer, &post_id, Utc::now()) {
        return error_response(e);
    }
    like_state(&state, viewer.user_id(), &post_id)
}

pub async fn list_bookmarks(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.bookmarked_posts(&auth_user.user_id, Utc::now()) {
        Ok(posts) => ok(posts),
        Err(e) => error_response(e),
    }
}
