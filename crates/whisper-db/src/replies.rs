use std::collections::HashMap;

use crate::models::ReplyRow;
use crate::{Database, OptionalExt};
use anyhow::{Result, anyhow};

/// Hard cap on ancestor-chain walks. Creation-time checks keep real chains
/// within MAX_REPLY_DEPTH; this only guards against a corrupted store.
const CHAIN_WALK_CAP: u32 = 16;

impl Database {
    /// Insert a validated reply. Parent/depth checks happen in the service
    /// layer before this runs; `created_at` is assigned by the database.
    pub fn insert_reply(&self, reply: &ReplyRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO replies
                    (id, message_id, parent_reply_id, content, nickname, user_id, admin_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    reply.id,
                    reply.message_id,
                    reply.parent_reply_id,
                    reply.content,
                    reply.nickname,
                    reply.user_id,
                    reply.admin_id,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_reply(&self, id: &str) -> Result<Option<ReplyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&reply_select("id = ?1"))?;
            let row = stmt.query_row([id], reply_from_row).optional()?;
            Ok(row)
        })
    }

    /// All replies of one message as a flat arena, oldest first. Tree
    /// assembly happens over this in memory — depth is structural, never
    /// stored, so there is no denormalized column to drift.
    pub fn replies_for_message(&self, message_id: &str) -> Result<Vec<ReplyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY created_at ASC, rowid ASC",
                reply_select("message_id = ?1")
            ))?;
            let rows = stmt
                .query_map([message_id], reply_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Structural depth of an existing reply: 1 for a top-level reply,
    /// parent depth + 1 otherwise. None if the reply does not exist.
    pub fn reply_depth(&self, id: &str) -> Result<Option<u32>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT parent_reply_id FROM replies WHERE id = ?1")?;

            let mut current = id.to_string();
            let mut depth = 0u32;
            loop {
                let parent: Option<Option<String>> = stmt
                    .query_row([&current], |row| row.get::<_, Option<String>>(0))
                    .optional()?;
                let Some(parent) = parent else {
                    // First hop missing means the reply itself does not exist.
                    return if depth == 0 { Ok(None) } else {
                        Err(anyhow!("reply {current} referenced by a child but missing"))
                    };
                };
                depth += 1;
                if depth > CHAIN_WALK_CAP {
                    return Err(anyhow!("reply ancestor chain exceeds walk cap"));
                }
                match parent {
                    Some(next) => current = next,
                    None => return Ok(Some(depth)),
                }
            }
        })
    }

    /// Delete a reply together with its whole descendant subtree.
    /// The subtree is collected from a parent→children index first, then
    /// removed with a single batched DELETE so it can never end up half
    /// removed. Returns false if the reply does not exist.
    pub fn delete_reply_subtree(&self, id: &str) -> Result<bool> {
        let Some(root) = self.get_reply(id)? else {
            return Ok(false);
        };

        let arena = self.replies_for_message(&root.message_id)?;
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for reply in &arena {
            if let Some(parent) = reply.parent_reply_id.as_deref() {
                children.entry(parent).or_default().push(&reply.id);
            }
        }

        // Explicit-stack traversal; chains are bounded so this stays tiny.
        let mut doomed: Vec<String> = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            doomed.push(current.to_string());
            if let Some(kids) = children.get(current) {
                stack.extend(kids.iter().copied());
            }
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=doomed.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "DELETE FROM replies WHERE id IN ({})",
                placeholders.join(", ")
            );
            let params: Vec<&dyn rusqlite::types::ToSql> = doomed
                .iter()
                .map(|d| d as &dyn rusqlite::types::ToSql)
                .collect();
            conn.execute(&sql, params.as_slice())?;
            Ok(())
        })?;

        Ok(true)
    }
}

fn reply_select(filter: &str) -> String {
    format!(
        "SELECT id, message_id, parent_reply_id, content, nickname, user_id, admin_id, created_at
         FROM replies WHERE {filter}"
    )
}

fn reply_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReplyRow> {
    Ok(ReplyRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        parent_reply_id: row.get(2)?,
        content: row.get(3)?,
        nickname: row.get(4)?,
        user_id: row.get(5)?,
        admin_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}
