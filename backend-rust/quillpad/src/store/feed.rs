//! Read-side queries that join posts with their derived counts.

use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, ToSql};
use std::collections::HashMap;

use super::posts::row_to_post;
use super::{like_pattern, not_found, ts, Store, StoreResult};
use crate::models::*;

/// Post columns plus author and derived engagement, relative to `:viewer`
const SUMMARY_SELECT: &str = r#"
    SELECT p.*, u.username AS author_username,
        (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
        EXISTS(SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = :viewer) AS liked,
        EXISTS(SELECT 1 FROM bookmarks b WHERE b.post_id = p.id AND b.user_id = :viewer) AS bookmarked
    FROM posts p JOIN users u ON u.id = p.author_id"#;

const VISIBLE: &str = "p.draft = 0 AND (p.publish_at IS NULL OR p.publish_at <= :now)";

/// Which visible posts a feed page draws from
#[derive(Debug, Clone)]
pub enum FeedFilter {
    All,
    /// Posts by authors the viewer follows
    Followed,
    /// Title or content contains the text, ignoring case
    Text(String),
    /// Tag string contains the text
    Tag(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOrder {
    Newest,
    RecentlyPublished,
    MostLiked,
}

impl FeedOrder {
    fn clause(self) -> &'static str {
        match self {
            FeedOrder::Newest => "p.created_at DESC",
            FeedOrder::RecentlyPublished => "p.published_at DESC, p.created_at DESC",
            FeedOrder::MostLiked => "like_count DESC, p.created_at DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedQuery {
    pub filter: FeedFilter,
    pub order: FeedOrder,
    pub limit: i64,
    pub offset: i64,
}

impl Store {
    pub fn feed_page(
        &self,
        viewer: &Viewer,
        query: &FeedQuery,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<PostSummary>> {
        let viewer_id = viewer.user_id();
        let now = ts(now);

        let (condition, needle) = match &query.filter {
            FeedFilter::All => ("", None),
            FeedFilter::Followed => (
                " AND p.author_id IN (SELECT following_id FROM follows WHERE follower_id = :viewer)",
                None,
            ),
            FeedFilter::Text(q) => (
                r" AND (casefold(p.title) LIKE :needle ESCAPE '\' OR casefold(p.content) LIKE :needle ESCAPE '\')",
                Some(like_pattern(&q.to_lowercase())),
            ),
            FeedFilter::Tag(t) => (
                r" AND casefold(p.tags) LIKE :needle ESCAPE '\'",
                Some(like_pattern(&t.to_lowercase())),
            ),
        };

        let sql = format!(
            "{} WHERE {}{} ORDER BY {} LIMIT :limit OFFSET :offset",
            SUMMARY_SELECT,
            VISIBLE,
            condition,
            query.order.clause()
        );

        let mut params: Vec<(&str, &dyn ToSql)> = vec![
            (":viewer", &viewer_id),
            (":now", &now),
            (":limit", &query.limit),
            (":offset", &query.offset),
        ];
        if let Some(needle) = &needle {
            params.push((":needle", needle));
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let posts = stmt
            .query_map(params.as_slice(), row_to_summary)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    /// Summary of one post regardless of visibility; callers check access
    pub fn post_summary(&self, viewer: &Viewer, post_id: &str) -> StoreResult<PostSummary> {
        let conn = self.lock();
        let sql = format!("{} WHERE p.id = :id", SUMMARY_SELECT);
        conn.query_row(
            &sql,
            named_params! { ":viewer": viewer.user_id(), ":id": post_id },
            row_to_summary,
        )
        .map_err(not_found("post not found"))
    }

    /// Most used tags over visible posts, by count then name
    pub fn top_tags(&self, limit: usize, now: DateTime<Utc>) -> StoreResult<Vec<TagCount>> {
        let conn = self.lock();
        let sql = format!("SELECT p.tags FROM posts p WHERE {} AND p.tags != ''", VISIBLE);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(named_params! { ":now": ts(now) }, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts: HashMap<String, i64> = HashMap::new();
        for tags in &rows {
            for tag in split_tags(tags) {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }

        let mut tags: Vec<TagCount> = counts
            .into_iter()
            .map(|(name, count)| TagCount { name, count })
            .collect();
        tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        tags.truncate(limit);
        Ok(tags)
    }
}

pub(super) fn summaries_for_collection(
    conn: &Connection,
    viewer_id: &str,
    collection_id: &str,
    now: DateTime<Utc>,
) -> StoreResult<Vec<PostSummary>> {
    let sql = format!(
        "{} JOIN collection_items i ON i.post_id = p.id WHERE i.collection_id = :collection AND {} ORDER BY i.added_at DESC",
        SUMMARY_SELECT, VISIBLE
    );
    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(
            named_params! { ":viewer": viewer_id, ":collection": collection_id, ":now": ts(now) },
            row_to_summary,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<PostSummary> {
    Ok(PostSummary {
        post: row_to_post(row)?,
        author_username: row.get("author_username")?,
        like_count: row.get("like_count")?,
        comment_count: row.get("comment_count")?,
        liked: row.get("liked")?,
        bookmarked: row.get("bookmarked")?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn query(filter: FeedFilter, order: FeedOrder) -> FeedQuery {
        FeedQuery {
            filter,
            order,
            limit: 10,
            offset: 0,
        }
    }

    fn tagged(store: &Store, author: &User, title: &str, tags: &str) -> Post {
        store
            .create_post(
                &author.id,
                PostInput {
                    title: title.to_string(),
                    tags: tags.to_string(),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap()
    }

    #[test]
    fn test_summary_flags_follow_viewer() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        let bob = user(&store, "bob");
        let post = published(&store, &alice, "Hi");
        let now = Utc::now();
        store.add_engagement(Engagement::Like, &bob.id, &post.id, now).unwrap();

        let as_bob = store
            .feed_page(&Viewer::User(bob.id.clone()), &query(FeedFilter::All, FeedOrder::Newest), now)
            .unwrap();
        assert_eq!(as_bob[0].like_count, 1);
        assert!(as_bob[0].liked);
        assert!(!as_bob[0].bookmarked);

        let anon = store
            .feed_page(&Viewer::Anonymous, &query(FeedFilter::All, FeedOrder::Newest), now)
            .unwrap();
        assert!(!anon[0].liked);
        assert_eq!(anon[0].author_username, "alice");
    }

    #[test]
    fn test_search_matches_wildcards_literally() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        published(&store, &alice, "50% off everything");
        published(&store, &alice, "500 things");

        let hits = store
            .feed_page(
                &Viewer::Anonymous,
                &query(FeedFilter::Text("50%".to_string()), FeedOrder::RecentlyPublished),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);

        let upper = store
            .feed_page(
                &Viewer::Anonymous,
                &query(FeedFilter::Text("THINGS".to_string()), FeedOrder::RecentlyPublished),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(upper[0].post.title, "500 things");
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        published(&store, &alice, "Café society");
        tagged(&store, &alice, "Strasse", "ÜBER, travel");

        for needle in ["CAFÉ", "café", "CAFÉ SOC"] {
            let hits = store
                .feed_page(
                    &Viewer::Anonymous,
                    &query(FeedFilter::Text(needle.to_string()), FeedOrder::RecentlyPublished),
                    Utc::now(),
                )
                .unwrap();
            assert_eq!(hits.len(), 1, "search for {}", needle);
        }

        let tagged_hits = store
            .feed_page(
                &Viewer::Anonymous,
                &query(FeedFilter::Tag("über".to_string()), FeedOrder::RecentlyPublished),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(tagged_hits[0].post.title, "Strasse");
    }

    #[test]
    fn test_top_tags_ordering() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        tagged(&store, &alice, "a", "rust, web");
        tagged(&store, &alice, "b", "rust,cli");
        tagged(&store, &alice, "c", "web , rust,");

        let tags = store.top_tags(15, Utc::now()).unwrap();
        let names: Vec<_> = tags.iter().map(|t| (t.name.as_str(), t.count)).collect();
        assert_eq!(names, vec![("rust", 3), ("web", 2), ("cli", 1)]);
        assert_eq!(store.top_tags(1, Utc::now()).unwrap().len(), 1);
    }
}
