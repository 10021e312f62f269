//! Versioned schema migrations.
//!
//! The applied version lives in `PRAGMA user_version`. Each migration runs in
//! its own transaction exactly once; startup never inspects table shapes.

use rusqlite::Connection;

struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "identity",
        sql: r#"
            CREATE TABLE users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                bio TEXT NOT NULL DEFAULT '',
                avatar TEXT,
                dark_mode INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
        "#,
    },
    Migration {
        version: 2,
        name: "content",
        sql: r#"
            CREATE TABLE posts (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                tags TEXT NOT NULL DEFAULT '',
                draft INTEGER NOT NULL DEFAULT 0,
                image TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                published_at TEXT,
                publish_at TEXT,
                FOREIGN KEY (author_id) REFERENCES users(id)
            );

            CREATE TABLE comments (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                body TEXT NOT NULL,
                parent_comment_id TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id),
                FOREIGN KEY (author_id) REFERENCES users(id),
                FOREIGN KEY (parent_comment_id) REFERENCES comments(id)
            );

            CREATE INDEX idx_posts_author_id ON posts(author_id);
            CREATE INDEX idx_posts_created_at ON posts(created_at);
            CREATE INDEX idx_posts_published_at ON posts(published_at);
            CREATE INDEX idx_comments_post_id ON comments(post_id);
            CREATE INDEX idx_comments_parent ON comments(parent_comment_id);
        "#,
    },
    Migration {
        version: 3,
        name: "social_graph",
        sql: r#"
            CREATE TABLE follows (
                id TEXT PRIMARY KEY,
                follower_id TEXT NOT NULL,
                following_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (follower_id) REFERENCES users(id),
                FOREIGN KEY (following_id) REFERENCES users(id),
                UNIQUE(follower_id, following_id)
            );

            CREATE TABLE blocks (
                id TEXT PRIMARY KEY,
                blocker_id TEXT NOT NULL,
                blocked_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (blocker_id) REFERENCES users(id),
                FOREIGN KEY (blocked_id) REFERENCES users(id),
                UNIQUE(blocker_id, blocked_id)
            );

            CREATE INDEX idx_follows_following_id ON follows(following_id);
            CREATE INDEX idx_blocks_blocked_id ON blocks(blocked_id);
        "#,
    },
    Migration {
        version: 4,
        name: "engagement",
        sql: r#"
            CREATE TABLE likes (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id),
                FOREIGN KEY (user_id) REFERENCES users(id),
                UNIQUE(post_id, user_id)
            );

            CREATE TABLE bookmarks (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id),
                FOREIGN KEY (user_id) REFERENCES users(id),
                UNIQUE(post_id, user_id)
            );

            -- user_id is NULL for anonymous views; NULLs never collide
            CREATE TABLE post_views (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                user_id TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id),
                FOREIGN KEY (user_id) REFERENCES users(id),
                UNIQUE(post_id, user_id)
            );

            CREATE TABLE collections (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE TABLE collection_items (
                collection_id TEXT NOT NULL,
                post_id TEXT NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (collection_id, post_id),
                FOREIGN KEY (collection_id) REFERENCES collections(id),
                FOREIGN KEY (post_id) REFERENCES posts(id)
            );

            CREATE INDEX idx_likes_user_id ON likes(user_id);
            CREATE INDEX idx_bookmarks_user_id ON bookmarks(user_id);
            CREATE INDEX idx_collections_user_id ON collections(user_id);
        "#,
    },
    Migration {
        version: 5,
        name: "notifications_messages",
        sql: r#"
            CREATE TABLE notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                type TEXT NOT NULL,
                post_id TEXT,
                comment_id TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (actor_id) REFERENCES users(id)
            );

            CREATE TABLE messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                body TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (sender_id) REFERENCES users(id),
                FOREIGN KEY (recipient_id) REFERENCES users(id)
            );

            CREATE INDEX idx_notifications_user_id ON notifications(user_id, created_at);
            CREATE INDEX idx_messages_pair ON messages(sender_id, recipient_id);
            CREATE INDEX idx_messages_recipient ON messages(recipient_id, is_read);
        "#,
    },
];

/// Latest schema version known to this binary
pub fn latest_version() -> i32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

pub fn current_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

/// Apply every migration newer than the database's recorded version.
/// Returns how many were applied.
pub fn apply(conn: &mut Connection) -> rusqlite::Result<usize> {
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;

        log::info!(
            "Applied migration {} ({})",
            migration.version,
            migration.name
        );
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_once() {
        let mut conn = Connection::open_in_memory().unwrap();

        assert_eq!(apply(&mut conn).unwrap(), MIGRATIONS.len());
        assert_eq!(current_version(&conn).unwrap(), latest_version());

        // Second run is a no-op; re-running CREATE TABLE would fail otherwise
        assert_eq!(apply(&mut conn).unwrap(), 0);
    }

    #[test]
    fn test_versions_strictly_increase() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }
}
