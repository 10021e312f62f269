use actix_web::{http::header, web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, NaiveDateTime, Utc};

use super::{error_response, ok, AppState};
use crate::auth::AuthUser;
use crate::events::{comment_created_event, reply_created_event};
use crate::models::*;

/// Accepts RFC 3339 or the `YYYY-MM-DDTHH:MM` a datetime-local input
/// submits (read as UTC). Anything else means no schedule.
fn parse_publish_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        Ok(naive) => Some(naive.and_utc()),
        Err(_) => {
            log::warn!("Ignoring unparseable publish_at {:?}", raw);
            None
        }
    }
}

fn post_input(body: PostRequest) -> PostInput {
    PostInput {
        publish_at: parse_publish_at(body.publish_at.as_deref()),
        title: body.title,
        content: body.content,
        tags: body.tags,
        hold_as_draft: body.draft,
    }
}

// ==================== Posts ====================

pub async fn create_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<PostRequest>,
) -> impl Responder {
    match state
        .store
        .create_post(&auth_user.user_id, post_input(body.into_inner()), Utc::now())
    {
        Ok(post) => HttpResponse::Created().json(ApiResponse::success(post)),
        Err(e) => error_response(e),
    }
}

pub async fn edit_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<PostRequest>,
) -> impl Responder {
    match state.store.edit_post(
        &auth_user.user_id,
        &path.into_inner(),
        post_input(body.into_inner()),
        Utc::now(),
    ) {
        Ok(post) => ok(post),
        Err(e) => error_response(e),
    }
}

pub async fn delete_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.delete_post(&auth_user.user_id, &path.into_inner()) {
        Ok(()) => ok(serde_json::json!({ "deleted": true })),
        Err(e) => error_response(e),
    }
}

/// A post with its comment tree
pub async fn get_post(
    state: web::Data<AppState>,
    viewer: Viewer,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    if let Err(e) = state.store.get_visible_post(&viewer, &id, Utc::now()) {
        return error_response(e);
    }

    let summary = match state.store.post_summary(&viewer, &id) {
        Ok(summary) => summary,
        Err(e) => return error_response(e),
    };
    match state.store.comment_tree(&id) {
        Ok(comments) => ok(serde_json::json!({ "post": summary, "comments": comments })),
        Err(e) => error_response(e),
    }
}

pub async fn list_drafts(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.list_unpublished(&auth_user.user_id) {
        Ok(posts) => ok(posts),
        Err(e) => error_response(e),
    }
}

pub async fn upload_post_image(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    let id = path.into_inner();

    // Check ownership before touching the disk
    match state.store.get_post(&id) {
        Ok(post) if post.author_id != auth_user.user_id => {
            return HttpResponse::Forbidden()
                .json(ApiResponse::<()>::error("only the author can edit this post"));
        }
        Ok(_) => {}
        Err(e) => return error_response(e),
    }

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let filename = match state.media.save(&body, content_type) {
        Ok(name) => name,
        Err(e) => return error_response(e),
    };

    match state.store.set_post_image(&auth_user.user_id, &id, &filename) {
        Ok(post) => ok(post),
        Err(e) => error_response(e),
    }
}

pub async fn get_upload(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.media.open(&path.into_inner()) {
        Ok((bytes, content_type)) => HttpResponse::Ok().content_type(content_type).body(bytes),
        Err(e) => error_response(e),
    }
}

/// Publish every scheduled post whose time has passed. Admin only.
pub async fn publish_scheduled(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    let user = match state.store.get_user(&auth_user.user_id) {
        Ok(user) => user,
        Err(e) => return error_response(e),
    };
    if state.admin_username.as_deref() != Some(user.username.as_str()) {
        return HttpResponse::Forbidden().json(ApiResponse::<()>::error("admin only"));
    }

    match state.store.publish_due_posts(Utc::now()) {
        Ok(published) => ok(serde_json::json!({ "published": published })),
        Err(e) => error_response(e),
    }
}

// ==================== Comments ====================

pub async fn add_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<BodyRequest>,
) -> impl Responder {
    let post_id = path.into_inner();
    let comment = match state
        .store
        .create_comment(&auth_user.user_id, &post_id, &body.body, Utc::now())
    {
        Ok(comment) => comment,
        Err(e) => return error_response(e),
    };

    match state.store.get_post(&post_id) {
        Ok(post) => state
            .event_processor
            .dispatch(comment_created_event(&comment, &post.author_id)),
        Err(e) => log::error!("Post {} vanished after comment: {}", post_id, e),
    }
    HttpResponse::Created().json(ApiResponse::success(comment))
}

pub async fn reply(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<BodyRequest>,
) -> impl Responder {
    let parent_id = path.into_inner();
    let reply = match state
        .store
        .create_reply(&auth_user.user_id, &parent_id, &body.body, Utc::now())
    {
        Ok(reply) => reply,
        Err(e) => return error_response(e),
    };

    match state.store.get_comment(&parent_id) {
        Ok(parent) => state
            .event_processor
            .dispatch(reply_created_event(&reply, &parent.author_id)),
        Err(e) => log::error!("Parent comment {} vanished after reply: {}", parent_id, e),
    }
    HttpResponse::Created().json(ApiResponse::success(reply))
}

pub async fn delete_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.delete_comment(&auth_user.user_id, &path.into_inner()) {
        Ok(removed) => ok(serde_json::json!({ "deleted": removed })),
        Err(e) => error_response(e),
    }
}

pub async fn get_comment(
    state: web::Data<AppState>,
    viewer: Viewer,
    path: web::Path<String>,
) -> impl Responder {
    let comment = match state.store.get_comment(&path.into_inner()) {
        Ok(comment) => comment,
        Err(e) => return error_response(e),
    };
    match state.store.get_visible_post(&viewer, &comment.post_id, Utc::now()) {
        Ok(_) => ok(comment),
        Err(e) => error_response(e),
    }
}
