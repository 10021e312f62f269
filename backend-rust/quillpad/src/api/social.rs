use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;

use super::{error_response, ok, AppState};
use crate::auth::AuthUser;
use crate::events::follow_created_event;
use crate::models::*;
use crate::store::StoreResult;

fn build_profile(state: &AppState, viewer: &Viewer, user: User) -> StoreResult<Profile> {
    let (is_following, is_blocked, you_blocked) = match viewer.user_id() {
        Some(me) if me != user.id => (
            state.store.is_following(me, &user.id)?,
            state.store.is_blocked_either(me, &user.id)?,
            state.store.has_blocked(me, &user.id)?,
        ),
        _ => (false, false, false),
    };

    Ok(Profile {
        avatar_url: state.avatars.url_for(&user),
        follower_count: state.store.follower_count(&user.id)?,
        following_count: state.store.following_count(&user.id)?,
        post_count: state.store.count_visible_posts_by(&user.id, Utc::now())?,
        is_following,
        is_blocked,
        you_blocked,
        user,
    })
}

pub async fn get_profile(
    state: web::Data<AppState>,
    viewer: Viewer,
    path: web::Path<String>,
) -> impl Responder {
    let result = state
        .store
        .get_user(&path.into_inner())
        .and_then(|user| build_profile(&state, &viewer, user));
    match result {
        Ok(profile) => ok(profile),
        Err(e) => error_response(e),
    }
}

pub async fn list_followers(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_user(&id).and_then(|_| state.store.followers(&id)) {
        Ok(users) => ok(users),
        Err(e) => error_response(e),
    }
}

pub async fn list_following(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_user(&id).and_then(|_| state.store.following(&id)) {
        Ok(users) => ok(users),
        Err(e) => error_response(e),
    }
}

pub async fn follow(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.follow(&auth_user.user_id, &path.into_inner()) {
        Ok(follow) => {
            state.event_processor.dispatch(follow_created_event(&follow));
            HttpResponse::Created().json(ApiResponse::success(follow))
        }
        Err(e) => error_response(e),
    }
}

pub async fn unfollow(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.unfollow(&auth_user.user_id, &path.into_inner()) {
        Ok(()) => ok(serde_json::json!({ "following": false })),
        Err(e) => error_response(e),
    }
}

pub async fn block(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.block(&auth_user.user_id, &path.into_inner()) {
        Ok(block) => HttpResponse::Created().json(ApiResponse::success(block)),
        Err(e) => error_response(e),
    }
}

pub async fn unblock(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.unblock(&auth_user.user_id, &path.into_inner()) {
        Ok(()) => ok(serde_json::json!({ "blocked": false })),
        Err(e) => error_response(e),
    }
}

pub async fn list_blocked(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.blocked_users(&auth_user.user_id) {
        Ok(users) => ok(users),
        Err(e) => error_response(e),
    }
}
