//! Likes, bookmarks and views. Each is a set of (user, post) pairs kept
//! unique by the schema, so racing duplicate writes resolve to exactly one
//! row and the losers see Conflict.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use super::posts::{row_to_post, visible_post};
use super::{conflict_or_db, ts, Store, StoreError, StoreResult};
use crate::models::*;

impl Store {
    /// Record a like or bookmark. The post must be one the user can see.
    pub fn add_engagement(
        &self,
        kind: Engagement,
        user_id: &str,
        post_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.lock();
        visible_post(&conn, &Viewer::User(user_id.to_string()), post_id, now)?;

        let sql = format!(
            "INSERT INTO {} (id, post_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            kind.table()
        );
        conn.execute(
            &sql,
            params![Uuid::new_v4().to_string(), post_id, user_id, ts(now)],
        )
        .map_err(|e| conflict_or_db(e, &format!("already {}", kind.past_tense())))?;
        Ok(())
    }

    pub fn remove_engagement(&self, kind: Engagement, user_id: &str, post_id: &str) -> StoreResult<()> {
        let conn = self.lock();
        let sql = format!("DELETE FROM {} WHERE user_id = ?1 AND post_id = ?2", kind.table());
        let rows = conn.execute(&sql, params![user_id, post_id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("not {}", kind.past_tense())));
        }
        Ok(())
    }

    pub fn has_engagement(&self, kind: Engagement, user_id: &str, post_id: &str) -> StoreResult<bool> {
        let conn = self.lock();
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE user_id = ?1 AND post_id = ?2)",
            kind.table()
        );
        let exists: bool = conn.query_row(&sql, params![user_id, post_id], |row| row.get(0))?;
        Ok(exists)
    }

    pub fn engagement_count(&self, kind: Engagement, post_id: &str) -> StoreResult<i64> {
        let conn = self.lock();
        let sql = format!("SELECT COUNT(*) FROM {} WHERE post_id = ?1", kind.table());
        let count = conn.query_row(&sql, params![post_id], |row| row.get(0))?;
        Ok(count)
    }

    /// Record that the viewer opened the post. Returns whether a new row was
    /// written: repeat views by a signed-in user are no-ops, while every
    /// anonymous view counts.
    pub fn record_view(&self, viewer: &Viewer, post_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.lock();
        visible_post(&conn, viewer, post_id, now)?;

        let rows = conn.execute(
            r#"INSERT OR IGNORE INTO post_views (id, post_id, user_id, created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![Uuid::new_v4().to_string(), post_id, viewer.user_id(), ts(now)],
        )?;
        Ok(rows == 1)
    }

    /// Bookmarked posts that are still visible, most recently bookmarked first
    pub fn bookmarked_posts(&self, user_id: &str, now: DateTime<Utc>) -> StoreResult<Vec<Post>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"SELECT p.* FROM bookmarks b JOIN posts p ON p.id = b.post_id
               WHERE b.user_id = ?1 AND p.draft = 0
                 AND (p.publish_at IS NULL OR p.publish_at <= ?2)
               ORDER BY b.created_at DESC"#,
        )?;
        let posts = stmt
            .query_map(params![user_id, ts(now)], row_to_post)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_like_twice_is_conflict() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        let bob = user(&store, "bob");
        let post = published(&store, &alice, "Hello");
        let now = Utc::now();

        store.add_engagement(Engagement::Like, &bob.id, &post.id, now).unwrap();
        match store.add_engagement(Engagement::Like, &bob.id, &post.id, now) {
            Err(StoreError::Conflict(msg)) => assert_eq!(msg, "already liked"),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(store.engagement_count(Engagement::Like, &post.id).unwrap(), 1);
        assert!(store.has_engagement(Engagement::Like, &bob.id, &post.id).unwrap());
    }

    #[test]
    fn test_remove_missing_engagement_is_not_found() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        let post = published(&store, &alice, "Hello");

        assert!(matches!(
            store.remove_engagement(Engagement::Bookmark, &alice.id, &post.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_likes_leave_one_row() {
        let store = Arc::new(Store::in_memory().unwrap());
        let alice = user(&store, "alice");
        let bob = user(&store, "bob");
        let post = published(&store, &alice, "Hot");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let (uid, pid) = (bob.id.clone(), post.id.clone());
                thread::spawn(move || store.add_engagement(Engagement::Like, &uid, &pid, Utc::now()))
            })
            .collect();

        let ok = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(ok, 1);
        assert_eq!(store.engagement_count(Engagement::Like, &post.id).unwrap(), 1);
    }

    #[test]
    fn test_views_are_recorded_once_per_user() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        let bob = user(&store, "bob");
        let post = published(&store, &alice, "Read me");
        let viewer = Viewer::User(bob.id.clone());
        let now = Utc::now();

        assert!(store.record_view(&viewer, &post.id, now).unwrap());
        assert!(!store.record_view(&viewer, &post.id, now).unwrap());
        assert!(store.record_view(&Viewer::Anonymous, &post.id, now).unwrap());
        assert!(store.record_view(&Viewer::Anonymous, &post.id, now).unwrap());
        assert_eq!(store.engagement_count(Engagement::View, &post.id).unwrap(), 3);
    }

    #[test]
    fn test_cannot_engage_with_draft() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        let bob = user(&store, "bob");
        let now = Utc::now();
        let draft = store
            .create_post(
                &alice.id,
                PostInput {
                    title: "Hidden".to_string(),
                    hold_as_draft: true,
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        assert!(matches!(
            store.add_engagement(Engagement::Bookmark, &bob.id, &draft.id, now),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.record_view(&Viewer::Anonymous, &draft.id, now),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_bookmarked_posts() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        let bob = user(&store, "bob");
        let post = published(&store, &alice, "Keep");
        published(&store, &alice, "Skip");

        store
            .add_engagement(Engagement::Bookmark, &bob.id, &post.id, Utc::now())
            .unwrap();
        let saved = store.bookmarked_posts(&bob.id, Utc::now()).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title, "Keep");
    }
}
