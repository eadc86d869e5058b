use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Who authored a piece of content. Resolved once when a row is loaded;
/// everything downstream matches on the tag instead of probing optional
/// id columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Author {
    /// No stored identity; the free-text label (if any) travels with the row.
    Anonymous { nickname: Option<String> },
    User { id: Uuid },
    Admin { id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("content row has both user_id and admin_id set")]
pub struct ConflictingIdentity;

impl Author {
    /// Resolve the optional id pair stored on a message/reply row.
    /// A row may carry at most one of the two ids.
    pub fn resolve(
        user_id: Option<Uuid>,
        admin_id: Option<Uuid>,
        nickname: Option<String>,
    ) -> Result<Self, ConflictingIdentity> {
        match (user_id, admin_id) {
            (Some(_), Some(_)) => Err(ConflictingIdentity),
            (Some(id), None) => Ok(Self::User { id }),
            (None, Some(id)) => Ok(Self::Admin { id }),
            (None, None) => Ok(Self::Anonymous { nickname }),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous { .. })
    }
}

/// Scan content for `@name` mention tokens. Purely cosmetic — mentions are
/// display annotations, never resolved against real accounts and never used
/// for access control or notifications.
pub fn scan_mentions(content: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut chars = content.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '@' {
            continue;
        }
        // An '@' glued to a preceding word (e.g. an email address) is not a mention.
        if i > 0 {
            let prev = content[..i].chars().next_back();
            if prev.is_some_and(|p| p.is_alphanumeric()) {
                continue;
            }
        }
        let start = i + c.len_utf8();
        let mut end = start;
        while let Some(&(j, n)) = chars.peek() {
            if n.is_alphanumeric() || n == '_' {
                end = j + n.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if end > start {
            let name = &content[start..end];
            if !found.iter().any(|f| f == name) {
                found.push(name.to_string());
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_dual_attribution() {
        let u = Uuid::new_v4();
        let a = Uuid::new_v4();
        assert_eq!(Author::resolve(Some(u), Some(a), None), Err(ConflictingIdentity));
    }

    #[test]
    fn resolve_picks_exactly_one_variant() {
        let id = Uuid::new_v4();
        assert_eq!(Author::resolve(Some(id), None, None), Ok(Author::User { id }));
        assert_eq!(Author::resolve(None, Some(id), None), Ok(Author::Admin { id }));
        assert_eq!(
            Author::resolve(None, None, Some("moth".into())),
            Ok(Author::Anonymous { nickname: Some("moth".into()) })
        );
    }

    #[test]
    fn mentions_are_scanned_not_resolved() {
        let found = scan_mentions("hey @luna, did @sol_9 and @luna see this? mail me@example.com");
        assert_eq!(found, vec!["luna".to_string(), "sol_9".to_string()]);
    }

    #[test]
    fn bare_at_is_not_a_mention() {
        assert!(scan_mentions("meet @ noon").is_empty());
        assert!(scan_mentions("no mentions here").is_empty());
    }
}
