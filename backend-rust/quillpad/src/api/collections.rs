use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;

use super::{error_response, ok, AppState};
use crate::auth::AuthUser;
use crate::models::*;

pub async fn list_collections(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.list_collections(&auth_user.user_id) {
        Ok(collections) => ok(collections),
        Err(e) => error_response(e),
    }
}

pub async fn create_collection(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<CollectionRequest>,
) -> impl Responder {
    match state
        .store
        .create_collection(&auth_user.user_id, &body.name, &body.description, Utc::now())
    {
        Ok(collection) => HttpResponse::Created().json(ApiResponse::success(collection)),
        Err(e) => error_response(e),
    }
}

pub async fn get_collection(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state
        .store
        .get_collection(&auth_user.user_id, &path.into_inner(), Utc::now())
    {
        Ok(detail) => ok(detail),
        Err(e) => error_response(e),
    }
}

pub async fn delete_collection(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.delete_collection(&auth_user.user_id, &path.into_inner()) {
        Ok(()) => ok(serde_json::json!({ "deleted": true })),
        Err(e) => error_response(e),
    }
}

pub async fn add_item(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (collection_id, post_id) = path.into_inner();
    match state
        .store
        .add_to_collection(&auth_user.user_id, &collection_id, &post_id, Utc::now())
    {
        Ok(item) => HttpResponse::Created().json(ApiResponse::success(item)),
        Err(e) => error_response(e),
    }
}

pub async fn remove_item(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (collection_id, post_id) = path.into_inner();
    match state
        .store
        .remove_from_collection(&auth_user.user_id, &collection_id, &post_id)
    {
        Ok(()) => ok(serde_json::json!({ "removed": true })),
        Err(e) => error_response(e),
    }
}
