use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User is a registered account. Relations to posts, follows, etc. are
/// resolved through the store, never embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub bio: String,
    /// Filename of an uploaded avatar, if any
    pub avatar: Option<String>,
    pub dark_mode: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session represents an active login. Tokens carry the session id, so
/// deleting the row logs the token out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Who is asking. Passed explicitly into every store and feed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User(String),
}

impl Viewer {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(id),
        }
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.user_id() == Some(user_id)
    }
}

/// Post is a markdown article. A post is visible iff it is not a draft and
/// its `publish_at` (if any) has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
    /// Comma separated, as entered
    pub tags: String,
    pub draft: bool,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub publish_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        !self.draft && self.publish_at.map_or(true, |at| at <= now)
    }
}

/// Split a comma separated tag string, dropping blanks.
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Author-supplied fields for creating or editing a post
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub title: String,
    pub content: String,
    pub tags: String,
    pub hold_as_draft: bool,
    pub publish_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub body: String,
    pub parent_comment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A comment with its replies, as shown under a post
#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub author_username: String,
    pub replies: Vec<CommentNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub id: String,
    pub follower_id: String,
    pub following_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub blocker_id: String,
    pub blocked_id: String,
    pub created_at: DateTime<Utc>,
}

/// The three per-(user, post) ledgers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    Like,
    Bookmark,
    View,
}

impl Engagement {
    pub fn table(self) -> &'static str {
        match self {
            Engagement::Like => "likes",
            Engagement::Bookmark => "bookmarks",
            Engagement::View => "post_views",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            Engagement::Like => "liked",
            Engagement::Bookmark => "bookmarked",
            Engagement::View => "viewed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Like,
    Comment,
    Follow,
    Reply,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::Like => "like",
            NotificationType::Comment => "comment",
            NotificationType::Follow => "follow",
            NotificationType::Reply => "reply",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(NotificationType::Like),
            "comment" => Some(NotificationType::Comment),
            "follow" => Some(NotificationType::Follow),
            "reply" => Some(NotificationType::Reply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub actor_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// One entry of the inbox: the other party and the latest exchange
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub counterpart_id: String,
    pub counterpart_username: String,
    pub last_message: Message,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionItem {
    pub collection_id: String,
    pub post_id: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    #[serde(flatten)]
    pub collection: Collection,
    pub item_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionDetail {
    #[serde(flatten)]
    pub collection: Collection,
    pub posts: Vec<PostSummary>,
}

/// A post as it appears in a feed, with derived counts
#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub author_username: String,
    pub like_count: i64,
    pub comment_count: i64,
    pub liked: bool,
    pub bookmarked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: User,
    pub avatar_url: String,
    pub follower_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub is_following: bool,
    /// A block exists in either direction between viewer and profile owner
    pub is_blocked: bool,
    /// The viewer is the one who blocked
    pub you_blocked: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

// Request/Response types for API

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub draft: bool,
    /// Free-form; anything unparseable means "no schedule"
    pub publish_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BodyRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub bio: String,
}

#[derive(Debug, Deserialize)]
pub struct CollectionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn post(draft: bool, publish_at: Option<DateTime<Utc>>) -> Post {
        let now = Utc::now();
        Post {
            id: "p1".to_string(),
            author_id: "u1".to_string(),
            title: "t".to_string(),
            content: String::new(),
            tags: " rust, web ,,".to_string(),
            draft,
            image: None,
            created_at: now,
            updated_at: now,
            published_at: None,
            publish_at,
        }
    }

    #[test]
    fn test_visibility_predicate() {
        let now = Utc::now();
        assert!(post(false, None).is_visible_at(now));
        assert!(post(false, Some(now - Duration::minutes(1))).is_visible_at(now));
        assert!(!post(false, Some(now + Duration::minutes(1))).is_visible_at(now));
        // Drafts stay hidden even once their time has come
        assert!(!post(true, Some(now - Duration::minutes(1))).is_visible_at(now));
    }

    #[test]
    fn test_split_tags_trims_and_skips_blanks() {
        assert_eq!(split_tags(&post(false, None).tags), vec!["rust", "web"]);
    }
}
