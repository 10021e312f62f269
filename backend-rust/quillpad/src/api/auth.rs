use actix_web::{http::header, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::{auth_error_response, error_response, ok, AppState};
use crate::auth::{removal_cookie, session_cookie, AuthUser};
use crate::models::*;

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    username: String,
}

pub async fn register(state: web::Data<AppState>, body: web::Json<RegisterRequest>) -> impl Responder {
    match state.auth_service.register(&body.username, &body.password) {
        Ok(user) => HttpResponse::Created().json(ApiResponse::success(user)),
        Err(e) => auth_error_response(e),
    }
}

pub async fn check_username(state: web::Data<AppState>, query: web::Query<UsernameQuery>) -> impl Responder {
    match state.store.username_exists(query.username.trim()) {
        Ok(exists) => ok(serde_json::json!({ "exists": exists })),
        Err(e) => error_response(e),
    }
}

pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    match state.auth_service.login(&body.username, &body.password) {
        Ok((user, token)) => HttpResponse::Ok()
            .cookie(session_cookie(&token, state.auth_service.session_days()))
            .json(ApiResponse::success(LoginResponse { token, user })),
        Err(e) => auth_error_response(e),
    }
}

pub async fn logout(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    if let Err(e) = state.auth_service.end_session(&auth_user.session_id) {
        return auth_error_response(e);
    }
    HttpResponse::Ok()
        .cookie(removal_cookie())
        .json(ApiResponse::success(serde_json::json!({ "logged_out": true })))
}

pub async fn me(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.get_user(&auth_user.user_id) {
        Ok(user) => ok(serde_json::json!({
            "avatar_url": state.avatars.url_for(&user),
            "user": user,
        })),
        Err(e) => error_response(e),
    }
}

pub async fn update_profile(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<ProfileRequest>,
) -> impl Responder {
    match state.store.update_bio(&auth_user.user_id, &body.bio) {
        Ok(user) => ok(user),
        Err(e) => error_response(e),
    }
}

/// Raw image body; the Content-Type header picks the extension
pub async fn upload_avatar(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let filename = match state.media.save(&body, content_type) {
        Ok(name) => name,
        Err(e) => return error_response(e),
    };

    if let Err(e) = state.store.set_avatar(&auth_user.user_id, &filename) {
        return error_response(e);
    }
    match state.store.get_user(&auth_user.user_id) {
        Ok(user) => ok(serde_json::json!({ "avatar_url": state.avatars.url_for(&user) })),
        Err(e) => error_response(e),
    }
}

pub async fn toggle_dark_mode(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.toggle_dark_mode(&auth_user.user_id) {
        Ok(dark_mode) => ok(serde_json::json!({ "dark_mode": dark_mode })),
        Err(e) => error_response(e),
    }
}
