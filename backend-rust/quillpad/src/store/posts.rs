//! Posts, their publication state machine, and threaded comments.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use uuid::Uuid;

use super::{not_found, parse_datetime, parse_opt_datetime, ts, Store, StoreError, StoreResult};
use crate::models::*;

/// Publication state resolved for a write happening at `now`
#[derive(Debug, PartialEq, Eq)]
struct Publication {
    draft: bool,
    published_at: Option<DateTime<Utc>>,
    publish_at: Option<DateTime<Utc>>,
}

/// Drafts and future schedules are unpublished. Everything else is
/// published: at `now` for new or previously unpublished posts, keeping the
/// original `published_at` for posts that already were.
fn resolve_publication(input: &PostInput, now: DateTime<Utc>, current: Option<&Post>) -> Publication {
    if input.hold_as_draft {
        return Publication {
            draft: true,
            published_at: None,
            publish_at: None,
        };
    }

    if let Some(at) = input.publish_at.filter(|at| *at > now) {
        return Publication {
            draft: true,
            published_at: None,
            publish_at: Some(at),
        };
    }

    let published_at = match current {
        Some(post) if !post.draft => post.published_at.or(Some(now)),
        _ => Some(now),
    };

    Publication {
        draft: false,
        published_at,
        publish_at: input.publish_at,
    }
}

fn validate_input(input: &PostInput) -> StoreResult<()> {
    if input.title.trim().is_empty() {
        return Err(StoreError::InvalidInput("title is required".to_string()));
    }
    Ok(())
}

impl Store {
    // ==================== Post Operations ====================

    pub fn create_post(&self, author_id: &str, input: PostInput, now: DateTime<Utc>) -> StoreResult<Post> {
        validate_input(&input)?;
        let publication = resolve_publication(&input, now, None);

        let post = Post {
            id: Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            title: input.title.trim().to_string(),
            content: input.content,
            tags: input.tags.trim().to_string(),
            draft: publication.draft,
            image: None,
            created_at: now,
            updated_at: now,
            published_at: publication.published_at,
            publish_at: publication.publish_at,
        };

        let conn = self.lock();
        conn.execute(
            r#"INSERT INTO posts (id, author_id, title, content, tags, draft, image,
                created_at, updated_at, published_at, publish_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                &post.id,
                &post.author_id,
                &post.title,
                &post.content,
                &post.tags,
                post.draft,
                &post.image,
                ts(post.created_at),
                ts(post.updated_at),
                post.published_at.map(ts),
                post.publish_at.map(ts),
            ],
        )?;

        if post.draft {
            log::info!("Post {} saved unpublished (publish_at: {:?})", post.id, post.publish_at);
        } else {
            log::info!("Post {} published", post.id);
        }
        Ok(post)
    }

    /// Replace a post's editable fields. Only the author may edit.
    pub fn edit_post(
        &self,
        editor_id: &str,
        post_id: &str,
        input: PostInput,
        now: DateTime<Utc>,
    ) -> StoreResult<Post> {
        validate_input(&input)?;

        let conn = self.lock();
        let mut post = post_by_id(&conn, post_id)?;
        if post.author_id != editor_id {
            return Err(StoreError::Forbidden("only the author can edit this post".to_string()));
        }

        let publication = resolve_publication(&input, now, Some(&post));
        post.title = input.title.trim().to_string();
        post.content = input.content;
        post.tags = input.tags.trim().to_string();
        post.draft = publication.draft;
        post.published_at = publication.published_at;
        post.publish_at = publication.publish_at;
        post.updated_at = now;

        conn.execute(
            r#"UPDATE posts SET title = ?1, content = ?2, tags = ?3, draft = ?4,
               published_at = ?5, publish_at = ?6, updated_at = ?7 WHERE id = ?8"#,
            params![
                &post.title,
                &post.content,
                &post.tags,
                post.draft,
                post.published_at.map(ts),
                post.publish_at.map(ts),
                ts(post.updated_at),
                &post.id,
            ],
        )?;
        Ok(post)
    }

    /// Delete a post together with everything hanging off it, in one
    /// transaction. Only the author may delete.
    pub fn delete_post(&self, deleter_id: &str, post_id: &str) -> StoreResult<()> {
        let mut conn = self.lock();
        let post = post_by_id(&conn, post_id)?;
        if post.author_id != deleter_id {
            return Err(StoreError::Forbidden("only the author can delete this post".to_string()));
        }

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM notifications WHERE post_id = ?1", params![post_id])?;
        tx.execute(
            r#"DELETE FROM notifications
               WHERE comment_id IN (SELECT id FROM comments WHERE post_id = ?1)"#,
            params![post_id],
        )?;
        tx.execute("DELETE FROM collection_items WHERE post_id = ?1", params![post_id])?;
        tx.execute("DELETE FROM likes WHERE post_id = ?1", params![post_id])?;
        tx.execute("DELETE FROM bookmarks WHERE post_id = ?1", params![post_id])?;
        tx.execute("DELETE FROM post_views WHERE post_id = ?1", params![post_id])?;
        let comments = tx.execute("DELETE FROM comments WHERE post_id = ?1", params![post_id])?;
        tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
        tx.commit()?;

        log::info!("Post {} deleted with {} comments", post_id, comments);
        Ok(())
    }

    pub fn get_post(&self, id: &str) -> StoreResult<Post> {
        let conn = self.lock();
        post_by_id(&conn, id)
    }

    /// Fetch a post the viewer is allowed to see: any visible post, or an
    /// unpublished one they wrote.
    pub fn get_visible_post(&self, viewer: &Viewer, id: &str, now: DateTime<Utc>) -> StoreResult<Post> {
        let conn = self.lock();
        visible_post(&conn, viewer, id, now)
    }

    /// The author's drafts and scheduled posts, newest first
    pub fn list_unpublished(&self, author_id: &str) -> StoreResult<Vec<Post>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM posts WHERE author_id = ?1 AND draft = 1
               ORDER BY created_at DESC"#,
        )?;
        let posts = stmt
            .query_map(params![author_id], row_to_post)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    pub fn count_visible_posts_by(&self, author_id: &str, now: DateTime<Utc>) -> StoreResult<i64> {
        let conn = self.lock();
        let count = conn.query_row(
            r#"SELECT COUNT(*) FROM posts WHERE author_id = ?1 AND draft = 0
               AND (publish_at IS NULL OR publish_at <= ?2)"#,
            params![author_id, ts(now)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn set_post_image(&self, editor_id: &str, post_id: &str, filename: &str) -> StoreResult<Post> {
        let conn = self.lock();
        let mut post = post_by_id(&conn, post_id)?;
        if post.author_id != editor_id {
            return Err(StoreError::Forbidden("only the author can edit this post".to_string()));
        }
        post.image = Some(filename.to_string());
        conn.execute(
            "UPDATE posts SET image = ?1 WHERE id = ?2",
            params![filename, post_id],
        )?;
        Ok(post)
    }

    /// Administrative sweep: publish scheduled posts whose time has come.
    /// Nothing calls this implicitly; feeds never promote on their own.
    pub fn publish_due_posts(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.lock();
        let now = ts(now);
        let rows = conn.execute(
            r#"UPDATE posts SET draft = 0, published_at = ?1, updated_at = ?1
               WHERE draft = 1 AND publish_at IS NOT NULL AND publish_at <= ?1"#,
            params![now],
        )?;
        if rows > 0 {
            log::info!("Published {} scheduled posts", rows);
        }
        Ok(rows)
    }

    // ==================== Comment Operations ====================

    pub fn create_comment(
        &self,
        author_id: &str,
        post_id: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Comment> {
        let body = required_body(body)?;
        let conn = self.lock();
        visible_post(&conn, &Viewer::User(author_id.to_string()), post_id, now)?;
        insert_comment(&conn, post_id, author_id, body, None, now)
    }

    /// Reply to an existing comment; the reply lands on the same post.
    pub fn create_reply(
        &self,
        author_id: &str,
        parent_id: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Comment> {
        let body = required_body(body)?;
        let conn = self.lock();
        let parent = comment_by_id(&conn, parent_id)?;
        visible_post(&conn, &Viewer::User(author_id.to_string()), &parent.post_id, now)?;
        insert_comment(&conn, &parent.post_id, author_id, body, Some(&parent.id), now)
    }

    pub fn get_comment(&self, id: &str) -> StoreResult<Comment> {
        let conn = self.lock();
        comment_by_id(&conn, id)
    }

    /// Remove a comment and its whole reply subtree. Allowed for the
    /// comment's author and the post's author.
    pub fn delete_comment(&self, deleter_id: &str, id: &str) -> StoreResult<usize> {
        let mut conn = self.lock();
        let comment = comment_by_id(&conn, id)?;
        let post = post_by_id(&conn, &comment.post_id)?;
        if comment.author_id != deleter_id && post.author_id != deleter_id {
            return Err(StoreError::Forbidden("not allowed to delete this comment".to_string()));
        }

        let subtree = r#"WITH RECURSIVE subtree(id) AS (
                SELECT ?1
                UNION ALL
                SELECT c.id FROM comments c JOIN subtree s ON c.parent_comment_id = s.id
            )"#;

        let tx = conn.transaction()?;
        tx.execute(
            &format!("{} DELETE FROM notifications WHERE comment_id IN (SELECT id FROM subtree)", subtree),
            params![id],
        )?;
        let removed = tx.execute(
            &format!("{} DELETE FROM comments WHERE id IN (SELECT id FROM subtree)", subtree),
            params![id],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn comment_count(&self, post_id: &str) -> StoreResult<i64> {
        let conn = self.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All comments on a post arranged as reply trees, oldest first at
    /// every level
    pub fn comment_tree(&self, post_id: &str) -> StoreResult<Vec<CommentNode>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"SELECT c.*, u.username AS author_username
               FROM comments c JOIN users u ON u.id = c.author_id
               WHERE c.post_id = ?1 ORDER BY c.created_at ASC"#,
        )?;
        let rows = stmt
            .query_map(params![post_id], |row| {
                Ok((row_to_comment(row)?, row.get::<_, String>("author_username")?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut children: HashMap<Option<String>, Vec<(Comment, String)>> = HashMap::new();
        for (comment, username) in rows {
            children
                .entry(comment.parent_comment_id.clone())
                .or_default()
                .push((comment, username));
        }
        Ok(build_tree(&mut children, None))
    }
}

fn build_tree(
    children: &mut HashMap<Option<String>, Vec<(Comment, String)>>,
    parent: Option<String>,
) -> Vec<CommentNode> {
    let level = children.remove(&parent).unwrap_or_default();
    level
        .into_iter()
        .map(|(comment, author_username)| {
            let replies = build_tree(children, Some(comment.id.clone()));
            CommentNode {
                comment,
                author_username,
                replies,
            }
        })
        .collect()
}

fn required_body(body: &str) -> StoreResult<&str> {
    let body = body.trim();
    if body.is_empty() {
        return Err(StoreError::InvalidInput("comment cannot be empty".to_string()));
    }
    Ok(body)
}

fn insert_comment(
    conn: &Connection,
    post_id: &str,
    author_id: &str,
    body: &str,
    parent_id: Option<&str>,
    now: DateTime<Utc>,
) -> StoreResult<Comment> {
    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        post_id: post_id.to_string(),
        author_id: author_id.to_string(),
        body: body.to_string(),
        parent_comment_id: parent_id.map(String::from),
        created_at: now,
    };

    conn.execute(
        r#"INSERT INTO comments (id, post_id, author_id, body, parent_comment_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            &comment.id,
            &comment.post_id,
            &comment.author_id,
            &comment.body,
            &comment.parent_comment_id,
            ts(comment.created_at),
        ],
    )?;
    Ok(comment)
}

pub(super) fn post_by_id(conn: &Connection, id: &str) -> StoreResult<Post> {
    conn.query_row("SELECT * FROM posts WHERE id = ?1", params![id], row_to_post)
        .map_err(not_found("post not found"))
}

/// Invisible posts look missing to everyone but their author
pub(super) fn visible_post(
    conn: &Connection,
    viewer: &Viewer,
    id: &str,
    now: DateTime<Utc>,
) -> StoreResult<Post> {
    let post = post_by_id(conn, id)?;
    if post.is_visible_at(now) || viewer.is(&post.author_id) {
        Ok(post)
    } else {
        Err(StoreError::NotFound("post not found".to_string()))
    }
}

fn comment_by_id(conn: &Connection, id: &str) -> StoreResult<Comment> {
    conn.query_row("SELECT * FROM comments WHERE id = ?1", params![id], row_to_comment)
        .map_err(not_found("comment not found"))
}

pub(super) fn row_to_post(row: &rusqlite::Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get("id")?,
        author_id: row.get("author_id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        tags: row.get("tags")?,
        draft: row.get("draft")?,
        image: row.get("image")?,
        created_at: parse_datetime(row.get("created_at")?),
        updated_at: parse_datetime(row.get("updated_at")?),
        published_at: parse_opt_datetime(row.get("published_at")?),
        publish_at: parse_opt_datetime(row.get("publish_at")?),
    })
}

fn row_to_comment(row: &rusqlite::Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get("id")?,
        post_id: row.get("post_id")?,
        author_id: row.get("author_id")?,
        body: row.get("body")?,
        parent_comment_id: row.get("parent_comment_id")?,
        created_at: parse_datetime(row.get("created_at")?),
    })
}
