use std::collections::HashMap;

use crate::models::{MessageRow, PromoteOutcome};
use crate::{Database, OptionalExt};
use anyhow::Result;

impl Database {
    /// Insert a validated message. `created_at` is assigned by the database.
    pub fn insert_message(&self, msg: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, category, content, media_url, is_public, recipient, sender_name,
                     user_id, admin_id, heart_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    msg.id,
                    msg.category,
                    msg.content,
                    msg.media_url,
                    msg.is_public,
                    msg.recipient,
                    msg.sender_name,
                    msg.user_id,
                    msg.admin_id,
                    msg.heart_count,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&message_select("id = ?1"))?;
            let row = stmt.query_row([id], message_from_row).optional()?;
            Ok(row)
        })
    }

    /// Public wall, newest first, optionally narrowed to one category.
    pub fn list_public_messages(&self, category: Option<&str>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| match category {
            Some(cat) => {
                let mut stmt = conn.prepare(&format!(
                    "{} ORDER BY created_at DESC, rowid DESC",
                    message_select("is_public = 1 AND category = ?1")
                ))?;
                let rows = stmt
                    .query_map([cat], message_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{} ORDER BY created_at DESC, rowid DESC",
                    message_select("is_public = 1")
                ))?;
                let rows = stmt
                    .query_map([], message_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        })
    }

    /// Private inbox for one moderator display name, newest first.
    pub fn list_private_for_recipient(&self, recipient: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY created_at DESC, rowid DESC",
                message_select("is_public = 0 AND recipient = ?1")
            ))?;
            let rows = stmt
                .query_map([recipient], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One-way visibility transition. The guarded UPDATE makes concurrent
    /// promotion idempotent-safe: whoever loses the race observes
    /// `AlreadyPublic`, never a second transition.
    pub fn promote_message(&self, id: &str) -> Result<PromoteOutcome> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages SET is_public = 1 WHERE id = ?1 AND is_public = 0",
                [id],
            )?;
            if n > 0 {
                return Ok(PromoteOutcome::Promoted);
            }
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(if exists {
                PromoteOutcome::AlreadyPublic
            } else {
                PromoteOutcome::NotFound
            })
        })
    }

    /// Deletes the message and its entire reply set in one transaction.
    /// Returns false if no such message existed.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM replies WHERE message_id = ?1", [id])?;
            let n = tx.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(n > 0)
        })
    }

    /// Anonymous reaction counter. Returns the new count, or None when the
    /// message does not exist.
    pub fn heart_message(&self, id: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages SET heart_count = heart_count + 1 WHERE id = ?1",
                [id],
            )?;
            if n == 0 {
                return Ok(None);
            }
            let count: i64 = conn.query_row(
                "SELECT heart_count FROM messages WHERE id = ?1",
                [id],
                |row| row.get(0),
            )?;
            Ok(Some(count))
        })
    }

    /// Batch-fetch reply counts for a set of message IDs.
    pub fn reply_counts_for_messages(
        &self,
        message_ids: &[String],
    ) -> Result<HashMap<String, i64>> {
        if message_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, COUNT(*) FROM replies WHERE message_id IN ({}) GROUP BY message_id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let mut counts = HashMap::new();
            let rows = stmt.query_map(params.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (id, count) = row?;
                counts.insert(id, count);
            }
            Ok(counts)
        })
    }
}

fn message_select(filter: &str) -> String {
    format!(
        "SELECT id, category, content, media_url, is_public, recipient, sender_name,
                user_id, admin_id, heart_count, created_at
         FROM messages WHERE {filter}"
    )
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        category: row.get(1)?,
        content: row.get(2)?,
        media_url: row.get(3)?,
        is_public: row.get(4)?,
        recipient: row.get(5)?,
        sender_name: row.get(6)?,
        user_id: row.get(7)?,
        admin_id: row.get(8)?,
        heart_count: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRow;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_admin("a1", "luna_mod", "hash", "Luna", "moderator").unwrap();
        db
    }

    fn message(id: &str, category: &str, public: bool, recipient: Option<&str>) -> MessageRow {
        MessageRow {
            id: id.into(),
            category: category.into(),
            content: "feeling lost".into(),
            media_url: None,
            is_public: public,
            recipient: recipient.map(Into::into),
            sender_name: None,
            user_id: None,
            admin_id: None,
            heart_count: 0,
            created_at: String::new(),
        }
    }

    #[test]
    fn private_messages_route_to_their_recipient_only() {
        let db = db();
        db.insert_message(&message("m1", "advice", false, Some("Luna"))).unwrap();
        db.insert_message(&message("m2", "rant", true, None)).unwrap();

        let inbox = db.list_private_for_recipient("Luna").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, "m1");

        let public = db.list_public_messages(None).unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].id, "m2");

        assert!(db.list_private_for_recipient("Sol").unwrap().is_empty());
    }

    #[test]
    fn schema_rejects_private_without_recipient() {
        let db = db();
        assert!(db.insert_message(&message("m1", "advice", false, None)).is_err());
    }

    #[test]
    fn schema_rejects_dual_attribution() {
        let db = db();
        db.create_user("u1", "luna", "hash", None).unwrap();
        let mut msg = message("m1", "advice", true, None);
        msg.user_id = Some("u1".into());
        msg.admin_id = Some("a1".into());
        assert!(db.insert_message(&msg).is_err());
    }

    #[test]
    fn promotion_is_one_way_and_idempotent_safe() {
        let db = db();
        db.insert_message(&message("m1", "advice", false, Some("Luna"))).unwrap();

        assert_eq!(db.promote_message("m1").unwrap(), PromoteOutcome::Promoted);
        assert_eq!(db.promote_message("m1").unwrap(), PromoteOutcome::AlreadyPublic);
        assert_eq!(db.promote_message("nope").unwrap(), PromoteOutcome::NotFound);

        // The message moved out of the private inbox and onto the wall.
        assert!(db.list_private_for_recipient("Luna").unwrap().is_empty());
        assert_eq!(db.list_public_messages(None).unwrap().len(), 1);
    }

    #[test]
    fn category_filter_narrows_the_wall() {
        let db = db();
        db.insert_message(&message("m1", "advice", true, None)).unwrap();
        db.insert_message(&message("m2", "rant", true, None)).unwrap();

        let rants = db.list_public_messages(Some("rant")).unwrap();
        assert_eq!(rants.len(), 1);
        assert_eq!(rants[0].id, "m2");
    }

    #[test]
    fn hearts_accumulate() {
        let db = db();
        db.insert_message(&message("m1", "love", true, None)).unwrap();

        assert_eq!(db.heart_message("m1").unwrap(), Some(1));
        assert_eq!(db.heart_message("m1").unwrap(), Some(2));
        assert_eq!(db.heart_message("gone").unwrap(), None);
    }
}
