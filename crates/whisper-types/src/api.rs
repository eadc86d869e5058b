use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actor::Author;
use crate::models::{AdminRole, Category, UserProfile};

// -- JWT Claims --

/// Which table the token subject lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    User,
    Admin,
}

/// JWT claims shared by the REST middleware and the auth handlers.
/// Canonical definition lives here in whisper-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub kind: ActorKind,
    /// Set for admin tokens only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<AdminRole>,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.kind == ActorKind::Admin
    }

    pub fn is_super_admin(&self) -> bool {
        self.is_admin() && self.role.is_some_and(|r| r.is_super())
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub id: Uuid,
    pub username: String,
    pub kind: ActorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<AdminRole>,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAdminRequest {
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub role: AdminRole,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMessageRequest {
    pub content: String,
    pub category: String,
    pub is_public: bool,
    /// Moderator display name; required when `is_public` is false.
    pub recipient: Option<String>,
    /// Free-text label for anonymous posts. Ignored for attributed posts.
    pub sender_name: Option<String>,
    pub media_url: Option<String>,
}

/// Body of the one-way visibility PATCH. Only `is_public: true` is ever
/// accepted — demotion does not exist.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchVisibilityRequest {
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub category: Category,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub author: Author,
    pub heart_count: i64,
    pub reply_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageDetailResponse {
    pub message: MessageResponse,
    pub replies: Vec<ReplyNode>,
}

// -- Replies --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReplyRequest {
    pub content: String,
    pub parent_reply_id: Option<Uuid>,
    /// Free-text label for anonymous replies. Ignored for attributed replies.
    pub nickname: Option<String>,
}

/// One node of the assembled reply tree. Depth is structural — it is never
/// stored, only implied by nesting.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyNode {
    pub id: Uuid,
    pub message_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_reply_id: Option<Uuid>,
    pub content: String,
    pub nickname: String,
    pub author: Author,
    /// `@name` tokens found in the content, for display emphasis only.
    pub mentions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub children: Vec<ReplyNode>,
}

// -- Social --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Messages,
    Replies,
    Hearts,
    Followers,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ActorStats {
    pub message_count: i64,
    pub reply_count: i64,
    pub reaction_total: i64,
    pub follower_count: i64,
    pub following_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserProfile,
    pub stats: ActorStats,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user: UserProfile,
    pub value: i64,
}
