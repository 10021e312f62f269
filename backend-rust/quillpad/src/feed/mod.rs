//! Feed composition: turns a mode and a page number into a store query.

use chrono::{DateTime, Utc};

use crate::models::{Page, PostSummary, TagCount, Viewer};
use crate::store::{FeedFilter, FeedOrder, FeedQuery, Store, StoreError, StoreResult};

pub const PAGE_SIZE: i64 = 10;
pub const TOP_TAG_LIMIT: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMode {
    ForYou,
    Following,
    Search(String),
    Tag(String),
    Trending,
}

impl FeedMode {
    /// Parse the `mode` query parameter of the home feed. Unknown values
    /// fall back to `for_you`.
    pub fn from_param(mode: Option<&str>) -> Self {
        match mode {
            Some("following") => FeedMode::Following,
            Some("trending") => FeedMode::Trending,
            _ => FeedMode::ForYou,
        }
    }

    /// None when the page lies past any representable offset
    fn query(&self, page: i64) -> Option<FeedQuery> {
        let (filter, order) = match self {
            FeedMode::ForYou => (FeedFilter::All, FeedOrder::Newest),
            FeedMode::Following => (FeedFilter::Followed, FeedOrder::Newest),
            FeedMode::Search(q) => (FeedFilter::Text(q.trim().to_string()), FeedOrder::RecentlyPublished),
            FeedMode::Tag(t) => (FeedFilter::Tag(t.trim().to_string()), FeedOrder::RecentlyPublished),
            FeedMode::Trending => (FeedFilter::All, FeedOrder::MostLiked),
        };
        Some(FeedQuery {
            filter,
            order,
            limit: PAGE_SIZE,
            offset: (page - 1).checked_mul(PAGE_SIZE)?,
        })
    }
}

/// Pages start at 1; anything lower is page 1
pub fn normalize_page(page: Option<i64>) -> i64 {
    page.unwrap_or(1).max(1)
}

pub fn compose(
    store: &Store,
    viewer: &Viewer,
    mode: &FeedMode,
    page: Option<i64>,
    now: DateTime<Utc>,
) -> StoreResult<Page<PostSummary>> {
    let page = normalize_page(page);
    let empty = || Page {
        items: Vec::new(),
        page,
        page_size: PAGE_SIZE,
    };

    match mode {
        FeedMode::Following if viewer.user_id().is_none() => {
            return Err(StoreError::Forbidden("sign in to see who you follow".to_string()));
        }
        FeedMode::Search(q) | FeedMode::Tag(q) if q.trim().is_empty() => {
            log::debug!("Empty feed filter, returning no results");
            return Ok(empty());
        }
        _ => {}
    }

    let Some(query) = mode.query(page) else {
        return Ok(empty());
    };
    let items = store.feed_page(viewer, &query, now)?;
    Ok(Page {
        items,
        page,
        page_size: PAGE_SIZE,
    })
}

pub fn top_tags(store: &Store, now: DateTime<Utc>) -> StoreResult<Vec<TagCount>> {
    store.top_tags(TOP_TAG_LIMIT, now)
}
