//! Event Processing Module
//!
//! Events are ephemeral triggers raised by handlers after a successful
//! write. They are NOT stored: the processor turns each one into at most one
//! notification row for the affected user and discards it.
//!
//! Flow: Event -> resolve recipient -> Notification (unless actor == recipient)

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::*;
use crate::store::Store;

/// Result type for event processing
pub type EventResult<T> = Result<T, EventError>;

#[derive(Debug)]
pub enum EventError {
    Store(String),
    Config(String),
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventError::Store(msg) => write!(f, "Store error: {}", msg),
            EventError::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for EventError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    LikeCreated,
    CommentCreated,
    ReplyCreated,
    FollowCreated,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::LikeCreated => "like.created",
            EventType::CommentCreated => "comment.created",
            EventType::ReplyCreated => "reply.created",
            EventType::FollowCreated => "follow.created",
        }
    }

    fn notification_type(self) -> NotificationType {
        match self {
            EventType::LikeCreated => NotificationType::Like,
            EventType::CommentCreated => NotificationType::Comment,
            EventType::ReplyCreated => NotificationType::Reply,
            EventType::FollowCreated => NotificationType::Follow,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub actor_id: String,
    /// User the event is about; `None` until a helper fills it in
    pub recipient_id: Option<String>,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, actor_id: &str) -> Self {
        Self {
            event_type,
            actor_id: actor_id.to_string(),
            recipient_id: None,
            post_id: None,
            comment_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_recipient(mut self, user_id: &str) -> Self {
        self.recipient_id = Some(user_id.to_string());
        self
    }

    pub fn with_post(mut self, post_id: &str) -> Self {
        self.post_id = Some(post_id.to_string());
        self
    }

    pub fn with_comment(mut self, comment_id: &str) -> Self {
        self.comment_id = Some(comment_id.to_string());
        self
    }
}

/// Result of processing an event
#[derive(Debug, Default)]
pub struct ProcessResult {
    pub notification_id: Option<String>,
    pub skipped_self: bool,
}

/// Event processor turns events into notifications
pub struct EventProcessor {
    store: Arc<Store>,
}

impl EventProcessor {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn process(&self, event: &Event) -> EventResult<ProcessResult> {
        let recipient = event.recipient_id.as_deref().ok_or_else(|| {
            EventError::Config(format!("{} event has no recipient", event.event_type.as_str()))
        })?;

        if recipient == event.actor_id {
            return Ok(ProcessResult {
                notification_id: None,
                skipped_self: true,
            });
        }

        let mut notification = Notification {
            id: String::new(),
            user_id: recipient.to_string(),
            actor_id: event.actor_id.clone(),
            notification_type: event.event_type.notification_type(),
            post_id: event.post_id.clone(),
            comment_id: event.comment_id.clone(),
            is_read: false,
            created_at: event.timestamp,
        };
        self.store
            .create_notification(&mut notification)
            .map_err(|e| EventError::Store(e.to_string()))?;

        log::debug!(
            "{} from {} notified {}",
            event.event_type.as_str(),
            event.actor_id,
            recipient
        );
        Ok(ProcessResult {
            notification_id: Some(notification.id),
            skipped_self: false,
        })
    }

    /// Process an event whose write already committed. Failures are logged
    /// rather than surfaced to the caller.
    pub fn dispatch(&self, event: Event) {
        if let Err(e) = self.process(&event) {
            log::error!("Failed to process {} event: {}", event.event_type.as_str(), e);
        }
    }
}

// ============================================================
// Helper functions for emitting events
// ============================================================

/// Emit a like.created event, addressed to the post's author
pub fn like_created_event(user_id: &str, post: &Post) -> Event {
    Event::new(EventType::LikeCreated, user_id)
        .with_recipient(&post.author_id)
        .with_post(&post.id)
}

/// Emit a comment.created event, addressed to the post's author
pub fn comment_created_event(comment: &Comment, post_author_id: &str) -> Event {
    Event::new(EventType::CommentCreated, &comment.author_id)
        .with_recipient(post_author_id)
        .with_post(&comment.post_id)
        .with_comment(&comment.id)
}

/// Emit a reply.created event, addressed to the parent comment's author
pub fn reply_created_event(reply: &Comment, parent_author_id: &str) -> Event {
    Event::new(EventType::ReplyCreated, &reply.author_id)
        .with_recipient(parent_author_id)
        .with_post(&reply.post_id)
        .with_comment(&reply.id)
}

/// Emit a follow.created event
pub fn follow_created_event(follow: &Follow) -> Event {
    Event::new(EventType::FollowCreated, &follow.follower_id).with_recipient(&follow.following_id)
}
