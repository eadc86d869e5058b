/// Database row types — these map directly to SQLite rows.
/// Distinct from the whisper-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub verified: bool,
    pub active: bool,
    pub created_at: String,
}

pub struct AdminRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub role: String,
    pub active: bool,
    pub verified: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub category: String,
    pub content: String,
    pub media_url: Option<String>,
    pub is_public: bool,
    pub recipient: Option<String>,
    pub sender_name: Option<String>,
    pub user_id: Option<String>,
    pub admin_id: Option<String>,
    pub heart_count: i64,
    pub created_at: String,
}

pub struct ReplyRow {
    pub id: String,
    pub message_id: String,
    pub parent_reply_id: Option<String>,
    pub content: String,
    pub nickname: String,
    pub user_id: Option<String>,
    pub admin_id: Option<String>,
    pub created_at: String,
}

/// Result of the guarded private-to-public UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    Promoted,
    AlreadyPublic,
    NotFound,
}
