//! Notification fan-in and direct messages.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::social::blocked_either;
use super::{parse_datetime, ts, user_by_id, Store, StoreError, StoreResult};
use crate::models::*;

pub const NOTIFICATION_PAGE_SIZE: i64 = 20;

impl Store {
    // ==================== Notification Operations ====================

    pub fn create_notification(&self, notification: &mut Notification) -> StoreResult<()> {
        let conn = self.lock();
        notification.id = Uuid::new_v4().to_string();

        conn.execute(
            r#"INSERT INTO notifications (id, user_id, actor_id, type, post_id, comment_id, is_read, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                &notification.id,
                &notification.user_id,
                &notification.actor_id,
                notification.notification_type.as_str(),
                &notification.post_id,
                &notification.comment_id,
                notification.is_read,
                ts(notification.created_at),
            ],
        )?;
        Ok(())
    }

    /// Newest first, `NOTIFICATION_PAGE_SIZE` per page starting at 1
    pub fn list_notifications(&self, user_id: &str, page: i64) -> StoreResult<Vec<Notification>> {
        let Some(offset) = (page.max(1) - 1).checked_mul(NOTIFICATION_PAGE_SIZE) else {
            return Ok(Vec::new());
        };
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM notifications WHERE user_id = ?1
               ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"#,
        )?;
        let notifications = stmt
            .query_map(params![user_id, NOTIFICATION_PAGE_SIZE, offset], row_to_notification)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    pub fn unread_notification_count(&self, user_id: &str) -> StoreResult<i64> {
        let conn = self.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn mark_notification_read(&self, user_id: &str, id: &str) -> StoreResult<()> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("notification not found".to_string()));
        }
        Ok(())
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> StoreResult<usize> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
            params![user_id],
        )?;
        Ok(rows)
    }

    // ==================== Message Operations ====================

    pub fn send_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Message> {
        let body = body.trim();
        if body.is_empty() {
            return Err(StoreError::InvalidInput("message cannot be empty".to_string()));
        }
        if sender_id == recipient_id {
            return Err(StoreError::InvalidInput("cannot message yourself".to_string()));
        }

        let conn = self.lock();
        user_by_id(&conn, recipient_id)?;
        if blocked_either(&conn, sender_id, recipient_id)? {
            return Err(StoreError::Forbidden("messaging is blocked between these users".to_string()));
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            body: body.to_string(),
            is_read: false,
            created_at: now,
        };

        conn.execute(
            r#"INSERT INTO messages (id, sender_id, recipient_id, body, is_read, created_at)
               VALUES (?1, ?2, ?3, ?4, 0, ?5)"#,
            params![
                &message.id,
                &message.sender_id,
                &message.recipient_id,
                &message.body,
                ts(message.created_at),
            ],
        )?;
        Ok(message)
    }

    /// The thread between the viewer and `counterpart_id`, oldest first.
    /// Opening it marks everything the counterpart sent as read.
    pub fn conversation(&self, viewer_id: &str, counterpart_id: &str) -> StoreResult<Vec<Message>> {
        let mut conn = self.lock();
        user_by_id(&conn, counterpart_id)?;

        let tx = conn.transaction()?;
        tx.execute(
            r#"UPDATE messages SET is_read = 1
               WHERE sender_id = ?1 AND recipient_id = ?2 AND is_read = 0"#,
            params![counterpart_id, viewer_id],
        )?;
        let messages = tx
            .prepare(
                r#"SELECT * FROM messages
                   WHERE (sender_id = ?1 AND recipient_id = ?2)
                      OR (sender_id = ?2 AND recipient_id = ?1)
                   ORDER BY created_at ASC"#,
            )?
            .query_map(params![viewer_id, counterpart_id], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;
        Ok(messages)
    }

    /// Inbox: one entry per counterpart, most recent exchange first
    pub fn conversations(&self, viewer_id: &str) -> StoreResult<Vec<Conversation>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"SELECT m.*, u.id AS counterpart_id, u.username AS counterpart_username,
                  (SELECT COUNT(*) FROM messages x
                   WHERE x.sender_id = u.id AND x.recipient_id = ?1 AND x.is_read = 0) AS unread_count
               FROM messages m
               JOIN users u ON u.id = CASE WHEN m.sender_id = ?1 THEN m.recipient_id ELSE m.sender_id END
               WHERE m.id = (
                   SELECT y.id FROM messages y
                   WHERE (y.sender_id = ?1 AND y.recipient_id = u.id)
                      OR (y.sender_id = u.id AND y.recipient_id = ?1)
                   ORDER BY y.created_at DESC, y.id DESC LIMIT 1
               )
               ORDER BY m.created_at DESC"#,
        )?;
        let conversations = stmt
            .query_map(params![viewer_id], |row| {
                Ok(Conversation {
                    counterpart_id: row.get("counterpart_id")?,
                    counterpart_username: row.get("counterpart_username")?,
                    last_message: row_to_message(row)?,
                    unread_count: row.get("unread_count")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conversations)
    }

    pub fn unread_message_count(&self, user_id: &str) -> StoreResult<i64> {
        let conn = self.lock();
        unread_messages(&conn, user_id)
    }
}

fn unread_messages(conn: &Connection, user_id: &str) -> StoreResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE recipient_id = ?1 AND is_read = 0",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
    let kind: String = row.get("type")?;
    let notification_type = NotificationType::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown notification type: {}", kind).into(),
        )
    })?;

    Ok(Notification {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        actor_id: row.get("actor_id")?,
        notification_type,
        post_id: row.get("post_id")?,
        comment_id: row.get("comment_id")?,
        is_read: row.get("is_read")?,
        created_at: parse_datetime(row.get("created_at")?),
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get("id")?,
        sender_id: row.get("sender_id")?,
        recipient_id: row.get("recipient_id")?,
        body: row.get("body")?,
        is_read: row.get("is_read")?,
        created_at: parse_datetime(row.get("created_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use chrono::Duration;

    fn notify(store: &Store, to: &User, from: &User, kind: NotificationType) -> Notification {
        let mut n = Notification {
            id: String::new(),
            user_id: to.id.clone(),
            actor_id: from.id.clone(),
            notification_type: kind,
            post_id: None,
            comment_id: None,
            is_read: false,
            created_at: Utc::now(),
        };
        store.create_notification(&mut n).unwrap();
        n
    }

    #[test]
    fn test_notification_read_flags() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        let bob = user(&store, "bob");

        let first = notify(&store, &alice, &bob, NotificationType::Follow);
        notify(&store, &alice, &bob, NotificationType::Like);
        assert_eq!(store.unread_notification_count(&alice.id).unwrap(), 2);

        // Only the recipient may mark it
        assert!(matches!(
            store.mark_notification_read(&bob.id, &first.id),
            Err(StoreError::NotFound(_))
        ));
        store.mark_notification_read(&alice.id, &first.id).unwrap();
        let listed = store.list_notifications(&alice.id, 1).unwrap();
        assert!(listed.iter().find(|n| n.id == first.id).unwrap().is_read);
        assert_eq!(store.unread_notification_count(&alice.id).unwrap(), 1);

        assert_eq!(store.mark_all_notifications_read(&alice.id).unwrap(), 1);
        assert_eq!(store.unread_notification_count(&alice.id).unwrap(), 0);
        assert_eq!(store.list_notifications(&alice.id, 1).unwrap().len(), 2);
        assert!(store.list_notifications(&alice.id, 2).unwrap().is_empty());
        assert!(store.list_notifications(&alice.id, i64::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_blocked_either_direction_forbids_messages() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        let bob = user(&store, "bob");
        let now = Utc::now();

        store.block(&alice.id, &bob.id).unwrap();
        assert!(matches!(
            store.send_message(&alice.id, &bob.id, "hi", now),
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            store.send_message(&bob.id, &alice.id, "hi", now),
            Err(StoreError::Forbidden(_))
        ));
    }

    #[test]
    fn test_message_validation() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        let now = Utc::now();

        assert!(matches!(
            store.send_message(&alice.id, &alice.id, "me", now),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            store.send_message(&alice.id, "ghost", "hi", now),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.send_message(&alice.id, "ghost", "   ", now),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_conversation_marks_inbound_read() {
        let store = Store::in_memory().unwrap();
        let alice = user(&store, "alice");
        let bob = user(&store, "bob");
        let carol = user(&store, "carol");
        let t = Utc::now();

        store.send_message(&bob.id, &alice.id, "one", t).unwrap();
        store.send_message(&alice.id, &bob.id, "two", t + Duration::seconds(1)).unwrap();
        store.send_message(&bob.id, &alice.id, "three", t + Duration::seconds(2)).unwrap();
        store.send_message(&carol.id, &alice.id, "hey", t + Duration::seconds(3)).unwrap();
        assert_eq!(store.unread_message_count(&alice.id).unwrap(), 3);

        let inbox = store.conversations(&alice.id).unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].counterpart_username, "carol");
        assert_eq!(inbox[1].last_message.body, "three");
        assert_eq!(inbox[1].unread_count, 2);

        let thread = store.conversation(&alice.id, &bob.id).unwrap();
        let bodies: Vec<_> = thread.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["one", "two", "three"]);
        assert_eq!(store.unread_message_count(&alice.id).unwrap(), 1);
        // Bob's copy of alice's message is untouched
        assert_eq!(store.unread_message_count(&bob.id).unwrap(), 1);

        store.conversation(&alice.id, &bob.id).unwrap();
        assert_eq!(store.unread_message_count(&alice.id).unwrap(), 1);
    }
}
