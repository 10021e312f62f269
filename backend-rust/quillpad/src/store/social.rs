//! Follow and block edges. Counts and lists are recomputed from the edge
//! tables on every read.

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{conflict_or_db, row_to_user, ts, user_by_id, Store, StoreError, StoreResult};
use crate::models::*;

impl Store {
    // ==================== Follow Operations ====================

    pub fn follow(&self, follower_id: &str, following_id: &str) -> StoreResult<Follow> {
        if follower_id == following_id {
            return Err(StoreError::Conflict("cannot follow yourself".to_string()));
        }

        let conn = self.lock();
        user_by_id(&conn, following_id)?;

        let follow = Follow {
            id: Uuid::new_v4().to_string(),
            follower_id: follower_id.to_string(),
            following_id: following_id.to_string(),
            created_at: Utc::now(),
        };

        conn.execute(
            r#"INSERT INTO follows (id, follower_id, following_id, created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                &follow.id,
                &follow.follower_id,
                &follow.following_id,
                ts(follow.created_at),
            ],
        )
        .map_err(|e| conflict_or_db(e, "already following"))?;

        Ok(follow)
    }

    pub fn unfollow(&self, follower_id: &str, following_id: &str) -> StoreResult<()> {
        let conn = self.lock();
        let rows = conn.execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower_id, following_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("not following".to_string()));
        }
        Ok(())
    }

    pub fn is_following(&self, follower_id: &str, following_id: &str) -> StoreResult<bool> {
        let conn = self.lock();
        edge_exists(&conn, "follows", "follower_id", "following_id", follower_id, following_id)
    }

    /// Users following `user_id`
    pub fn followers(&self, user_id: &str) -> StoreResult<Vec<User>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"SELECT u.* FROM follows f JOIN users u ON u.id = f.follower_id
               WHERE f.following_id = ?1 ORDER BY f.created_at DESC"#,
        )?;
        let users = stmt
            .query_map(params![user_id], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Users `user_id` follows
    pub fn following(&self, user_id: &str) -> StoreResult<Vec<User>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"SELECT u.* FROM follows f JOIN users u ON u.id = f.following_id
               WHERE f.follower_id = ?1 ORDER BY f.created_at DESC"#,
        )?;
        let users = stmt
            .query_map(params![user_id], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn follower_count(&self, user_id: &str) -> StoreResult<i64> {
        let conn = self.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE following_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn following_count(&self, user_id: &str) -> StoreResult<i64> {
        let conn = self.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Block Operations ====================

    pub fn block(&self, blocker_id: &str, blocked_id: &str) -> StoreResult<Block> {
        if blocker_id == blocked_id {
            return Err(StoreError::Conflict("cannot block yourself".to_string()));
        }

        let conn = self.lock();
        user_by_id(&conn, blocked_id)?;

        let block = Block {
            id: Uuid::new_v4().to_string(),
            blocker_id: blocker_id.to_string(),
            blocked_id: blocked_id.to_string(),
            created_at: Utc::now(),
        };

        conn.execute(
            r#"INSERT INTO blocks (id, blocker_id, blocked_id, created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                &block.id,
                &block.blocker_id,
                &block.blocked_id,
                ts(block.created_at),
            ],
        )
        .map_err(|e| conflict_or_db(e, "already blocked"))?;

        log::info!("User {} blocked {}", blocker_id, blocked_id);
        Ok(block)
    }

    /// Remove the blocker's own edge. A block in the other direction stays.
    pub fn unblock(&self, blocker_id: &str, blocked_id: &str) -> StoreResult<()> {
        let conn = self.lock();
        let rows = conn.execute(
            "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
            params![blocker_id, blocked_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("not blocked".to_string()));
        }
        Ok(())
    }

    /// Directional: has `blocker_id` blocked `blocked_id`?
    pub fn has_blocked(&self, blocker_id: &str, blocked_id: &str) -> StoreResult<bool> {
        let conn = self.lock();
        edge_exists(&conn, "blocks", "blocker_id", "blocked_id", blocker_id, blocked_id)
    }

    /// Symmetric check used by every messaging gate
    pub fn is_blocked_either(&self, a: &str, b: &str) -> StoreResult<bool> {
        let conn = self.lock();
        blocked_either(&conn, a, b)
    }

    pub fn blocked_users(&self, blocker_id: &str) -> StoreResult<Vec<User>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"SELECT u.* FROM blocks b JOIN users u ON u.id = b.blocked_id
               WHERE b.blocker_id = ?1 ORDER BY b.created_at DESC"#,
        )?;
        let users = stmt
            .query_map(params![blocker_id], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

pub(super) fn blocked_either(conn: &Connection, a: &str, b: &str) -> StoreResult<bool> {
    let blocked: bool = conn.query_row(
        r#"SELECT EXISTS(
               SELECT 1 FROM blocks
               WHERE (blocker_id = ?1 AND blocked_id = ?2)
                  OR (blocker_id = ?2 AND blocked_id = ?1)
           )"#,
        params![a, b],
        |row| row.get(0),
    )?;
    Ok(blocked)
}

fn edge_exists(
    conn: &Connection,
    table: &str,
    from_col: &str,
    to_col: &str,
    from: &str,
    to: &str,
) -> StoreResult<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1 AND {} = ?2)",
        table, from_col, to_col
    );
    let exists: bool = conn.query_row(&sql, params![from, to], |row| row.get(0))?;
    Ok(exists)
}
