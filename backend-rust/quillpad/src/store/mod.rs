use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

mod collections;
mod engagement;
mod feed;
mod messaging;
pub mod migrations;
mod posts;
mod social;

pub use feed::{FeedFilter, FeedOrder, FeedQuery};
pub use messaging::NOTIFICATION_PAGE_SIZE;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `db_path` and bring its schema up to
    /// date. `":memory:"` gives a private in-memory database.
    pub fn new(db_path: &str) -> StoreResult<Self> {
        Self::from_connection(Connection::open(db_path)?)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        register_casefold(&conn)?;
        migrations::apply(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store lock poisoned")
    }

    // ==================== User Operations ====================

    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.lock();
        user.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        conn.execute(
            r#"INSERT INTO users (id, username, password_hash, bio, avatar, dark_mode, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                &user.id,
                &user.username,
                &user.password_hash,
                &user.bio,
                &user.avatar,
                user.dark_mode,
                ts(user.created_at),
                ts(user.updated_at),
            ],
        )
        .map_err(|e| conflict_or_db(e, "username taken"))?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.lock();
        user_by_id(&conn, id)
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        let conn = self.lock();
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            row_to_user,
        )
        .map_err(not_found("user not found"))
    }

    pub fn username_exists(&self, username: &str) -> StoreResult<bool> {
        let conn = self.lock();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            params![username],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn count_users(&self) -> StoreResult<i64> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn update_bio(&self, user_id: &str, bio: &str) -> StoreResult<User> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE users SET bio = ?1, updated_at = ?2 WHERE id = ?3",
            params![bio.trim(), ts(Utc::now()), user_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("user not found".to_string()));
        }
        user_by_id(&conn, user_id)
    }

    pub fn set_avatar(&self, user_id: &str, filename: &str) -> StoreResult<()> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE users SET avatar = ?1, updated_at = ?2 WHERE id = ?3",
            params![filename, ts(Utc::now()), user_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("user not found".to_string()));
        }
        Ok(())
    }

    /// Flip the dark-mode preference and return the new value
    pub fn toggle_dark_mode(&self, user_id: &str) -> StoreResult<bool> {
        let conn = self.lock();
        conn.query_row(
            r#"UPDATE users SET dark_mode = NOT dark_mode, updated_at = ?1
               WHERE id = ?2 RETURNING dark_mode"#,
            params![ts(Utc::now()), user_id],
            |row| row.get(0),
        )
        .map_err(not_found("user not found"))
    }

    // ==================== Session Operations ====================

    pub fn create_session(&self, session: &mut Session) -> StoreResult<()> {
        let conn = self.lock();
        session.id = Uuid::new_v4().to_string();
        session.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO sessions (id, user_id, expires_at, created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                &session.id,
                &session.user_id,
                ts(session.expires_at),
                ts(session.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> StoreResult<Session> {
        let conn = self.lock();
        conn.query_row(
            "SELECT * FROM sessions WHERE id = ?1",
            params![id],
            |row| {
                Ok(Session {
                    id: row.get("id")?,
                    user_id: row.get("user_id")?,
                    expires_at: parse_datetime(row.get("expires_at")?),
                    created_at: parse_datetime(row.get("created_at")?),
                })
            },
        )
        .map_err(not_found("session not found"))
    }

    pub fn delete_session(&self, id: &str) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.lock();
        let rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![ts(now)],
        )?;
        Ok(rows)
    }
}

pub(crate) fn user_by_id(conn: &Connection, id: &str) -> StoreResult<User> {
    conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], row_to_user)
        .map_err(not_found("user not found"))
}

pub(crate) fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        password_hash: row.get("password_hash")?,
        bio: row.get("bio")?,
        avatar: row.get("avatar")?,
        dark_mode: row.get("dark_mode")?,
        created_at: parse_datetime(row.get("created_at")?),
        updated_at: parse_datetime(row.get("updated_at")?),
    })
}

/// Fixed-width UTC timestamp; lexicographic order matches time order, which
/// the visibility and ordering queries rely on.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_opt_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(parse_datetime)
}

pub(crate) fn not_found(what: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(what.to_string()),
        _ => StoreError::Database(e),
    }
}

/// Unique/primary-key violations become Conflict; the storage layer is what
/// serializes racing duplicate writes.
pub(crate) fn conflict_or_db(e: rusqlite::Error, msg: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation
            && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        {
            return StoreError::Conflict(msg.to_string());
        }
    }
    StoreError::Database(e)
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `ESCAPE '\'`
/// `casefold(text)`: Unicode lowercase, so LIKE matches "CAFÉ" against "Café".
/// SQLite's own LIKE and lower() only fold ASCII.
fn register_casefold(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )
}

pub(crate) fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
