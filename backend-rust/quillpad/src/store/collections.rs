use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::feed::summaries_for_collection;
use super::posts::visible_post;
use super::{conflict_or_db, not_found, parse_datetime, ts, Store, StoreError, StoreResult};
use crate::models::*;

impl Store {
    // ==================== Collection Operations ====================

    pub fn create_collection(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Collection> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("collection name is required".to_string()));
        }

        let collection = Collection {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            description: description.trim().to_string(),
            created_at: now,
        };

        let conn = self.lock();
        conn.execute(
            r#"INSERT INTO collections (id, user_id, name, description, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &collection.id,
                &collection.user_id,
                &collection.name,
                &collection.description,
                ts(collection.created_at),
            ],
        )?;
        Ok(collection)
    }

    pub fn list_collections(&self, user_id: &str) -> StoreResult<Vec<CollectionSummary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"SELECT c.*, (SELECT COUNT(*) FROM collection_items i WHERE i.collection_id = c.id) AS item_count
               FROM collections c WHERE c.user_id = ?1 ORDER BY c.created_at DESC"#,
        )?;
        let collections = stmt
            .query_map(params![user_id], |row| {
                Ok(CollectionSummary {
                    collection: row_to_collection(row)?,
                    item_count: row.get("item_count")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(collections)
    }

    /// A collection with its still-visible posts, newest addition first
    pub fn get_collection(
        &self,
        viewer_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<CollectionDetail> {
        let conn = self.lock();
        let collection = owned_collection(&conn, viewer_id, id)?;
        let posts = summaries_for_collection(&conn, viewer_id, id, now)?;
        Ok(CollectionDetail { collection, posts })
    }

    pub fn delete_collection(&self, viewer_id: &str, id: &str) -> StoreResult<()> {
        let mut conn = self.lock();
        owned_collection(&conn, viewer_id, id)?;

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM collection_items WHERE collection_id = ?1", params![id])?;
        tx.execute("DELETE FROM collections WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn add_to_collection(
        &self,
        viewer_id: &str,
        collection_id: &str,
        post_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<CollectionItem> {
        let conn = self.lock();
        owned_collection(&conn, viewer_id, collection_id)?;
        visible_post(&conn, &Viewer::User(viewer_id.to_string()), post_id, now)?;

        let item = CollectionItem {
            collection_id: collection_id.to_string(),
            post_id: post_id.to_string(),
            added_at: now,
        };
        conn.execute(
            "INSERT INTO collection_items (collection_id, post_id, added_at) VALUES (?1, ?2, ?3)",
            params![&item.collection_id, &item.post_id, ts(item.added_at)],
        )
        .map_err(|e| conflict_or_db(e, "already in collection"))?;
        Ok(item)
    }

    pub fn remove_from_collection(
        &self,
        viewer_id: &str,
        collection_id: &str,
        post_id: &str,
    ) -> StoreResult<()> {
        let conn = self.lock();
        owned_collection(&conn, viewer_id, collection_id)?;
        let rows = conn.execute(
            "DELETE FROM collection_items WHERE collection_id = ?1 AND post_id = ?2",
            params![collection_id, post_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("post not in collection".to_string()));
        }
        Ok(())
    }
}

fn owned_collection(conn: &Connection, owner_id: &str, id: &str) -> StoreResult<Collection> {
    let collection = conn
        .query_row(
            "SELECT * FROM collections WHERE id = ?1",
            params![id],
            row_to_collection,
        )
        .map_err(not_found("collection not found"))?;
    if collection.user_id != owner_id {
        return Err(StoreError::Forbidden("not your collection".to_string()));
    }
    Ok(collection)
}

fn row_to_collection(row: &rusqlite::Row) -> rusqlite::Result<Collection> {
    Ok(Collection {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: parse_datetime(row.get("created_at")?),
    })
}
