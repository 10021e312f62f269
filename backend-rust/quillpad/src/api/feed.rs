use actix_web::{web, Responder};
use chrono::Utc;
use serde::Deserialize;

use super::{error_response, ok, AppState, PageQuery};
use crate::auth::AuthUser;
use crate::feed::{self, FeedMode};
use crate::models::*;

#[derive(Debug, Deserialize)]
pub struct HomeQuery {
    mode: Option<String>,
    page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
    page: Option<i64>,
}

fn respond(state: &AppState, viewer: &Viewer, mode: FeedMode, page: Option<i64>) -> actix_web::HttpResponse {
    match feed::compose(&state.store, viewer, &mode, page, Utc::now()) {
        Ok(page) => ok(page),
        Err(e) => error_response(e),
    }
}

/// Home feed: `for_you` or `following`
pub async fn home(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<HomeQuery>,
) -> impl Responder {
    let mode = FeedMode::from_param(query.mode.as_deref());
    respond(&state, &auth_user.viewer(), mode, query.page)
}

pub async fn trending(
    state: web::Data<AppState>,
    viewer: Viewer,
    query: web::Query<PageQuery>,
) -> impl Responder {
    respond(&state, &viewer, FeedMode::Trending, query.page)
}

pub async fn search(
    state: web::Data<AppState>,
    viewer: Viewer,
    query: web::Query<SearchQuery>,
) -> impl Responder {
    let query = query.into_inner();
    respond(&state, &viewer, FeedMode::Search(query.q), query.page)
}

pub async fn by_tag(
    state: web::Data<AppState>,
    viewer: Viewer,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    respond(&state, &viewer, FeedMode::Tag(path.into_inner()), query.page)
}

pub async fn top_tags(state: web::Data<AppState>) -> impl Responder {
    match feed::top_tags(&state.store, Utc::now()) {
        Ok(tags) => ok(tags),
        Err(e) => error_response(e),
    }
}
