use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed set of message categories. Anything outside this set is rejected
/// at message creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Love,
    Advice,
    Confession,
    Rant,
    Reflection,
    Writing,
    Anything,
}

impl Category {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "love" => Some(Self::Love),
            "advice" => Some(Self::Advice),
            "confession" => Some(Self::Confession),
            "rant" => Some(Self::Rant),
            "reflection" => Some(Self::Reflection),
            "writing" => Some(Self::Writing),
            "anything" => Some(Self::Anything),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Love => "love",
            Self::Advice => "advice",
            Self::Confession => "confession",
            Self::Rant => "rant",
            Self::Reflection => "reflection",
            Self::Writing => "writing",
            Self::Anything => "anything",
        }
    }
}

/// Moderator roles. Only `SuperAdmin` may grant verification, create other
/// admin accounts, or delete accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    Admin,
    Moderator,
    Support,
    CommunityManager,
    SuperAdmin,
}

impl AdminRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "moderator" => Some(Self::Moderator),
            "support" => Some(Self::Support),
            "community_manager" => Some(Self::CommunityManager),
            "super_admin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::Support => "support",
            Self::CommunityManager => "community_manager",
            Self::SuperAdmin => "super_admin",
        }
    }

    pub fn is_super(&self) -> bool {
        matches!(self, Self::SuperAdmin)
    }
}

/// Public view of a registered user — never exposes the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(Category::parse("Advice"), Some(Category::Advice));
        assert_eq!(Category::parse("RANT"), Some(Category::Rant));
        assert_eq!(Category::parse("poetry"), None);
    }

    #[test]
    fn role_round_trips() {
        for role in [
            AdminRole::Admin,
            AdminRole::Moderator,
            AdminRole::Support,
            AdminRole::CommunityManager,
            AdminRole::SuperAdmin,
        ] {
            assert_eq!(AdminRole::parse(role.as_str()), Some(role));
        }
        assert!(AdminRole::SuperAdmin.is_super());
        assert!(!AdminRole::Moderator.is_super());
    }
}
