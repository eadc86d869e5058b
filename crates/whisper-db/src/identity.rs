use crate::models::{AdminRow, UserRow};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    /// Creates the account unless the username is taken anywhere in the
    /// joint user + admin namespace. Check and insert run under one
    /// connection lock, so concurrent registrations cannot slip between
    /// them. Returns false when the name was taken.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        display_name: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            if username_taken(conn, username)? {
                return Ok(false);
            }
            insert_outcome(conn.execute(
                "INSERT INTO users (id, username, password, display_name) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, username, password_hash, display_name],
            ))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Returns false if no such user existed.
    pub fn set_user_verified(&self, id: &str, verified: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET verified = ?2 WHERE id = ?1",
                rusqlite::params![id, verified],
            )?;
            Ok(n > 0)
        })
    }

    /// Hard-deletes the account. Authored content survives: the owning id
    /// columns on messages/replies drop to NULL and the stored sender label
    /// keeps the historical attribution readable.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Admins --

    /// Same joint-namespace guard as `create_user`.
    pub fn create_admin(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        display_name: &str,
        role: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            if username_taken(conn, username)? {
                return Ok(false);
            }
            insert_outcome(conn.execute(
                "INSERT INTO admins (id, username, password, display_name, role)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, username, password_hash, display_name, role],
            ))
        })
    }

    pub fn get_admin_by_username(&self, username: &str) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| query_admin(conn, "username", username))
    }

    pub fn get_admin_by_id(&self, id: &str) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| query_admin(conn, "id", id))
    }

    /// Recipient lookup for private-message routing. Inactive moderators
    /// are not valid recipients.
    pub fn get_active_admin_by_display_name(&self, name: &str) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&admin_select("display_name = ?1 AND active = 1"))?;
            let row = stmt.query_row([name], admin_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn has_super_admin(&self) -> Result<bool> {
        self.with_conn(|conn| {
            let found: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM admins WHERE role = 'super_admin' AND active = 1)",
                [],
                |row| row.get(0),
            )?;
            Ok(found)
        })
    }

    pub fn set_admin_active(&self, id: &str, active: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE admins SET active = ?2 WHERE id = ?1",
                rusqlite::params![id, active],
            )?;
            Ok(n > 0)
        })
    }
}

/// Usernames are unique across the combined user + admin namespace.
fn username_taken(conn: &Connection, username: &str) -> Result<bool> {
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)
             OR EXISTS(SELECT 1 FROM admins WHERE username = ?1)",
        [username],
        |row| row.get(0),
    )?;
    Ok(taken)
}

/// Collapse a UNIQUE violation into "taken"; anything else is a real error.
fn insert_outcome(result: rusqlite::Result<usize>) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn user_select(filter: &str) -> String {
    format!(
        "SELECT id, username, password, display_name, bio, avatar_url, verified, active, created_at
         FROM users WHERE {filter}"
    )
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        display_name: row.get(3)?,
        bio: row.get(4)?,
        avatar_url: row.get(5)?,
        verified: row.get(6)?,
        active: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&user_select(&format!("{column} = ?1")))?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn admin_select(filter: &str) -> String {
    format!(
        "SELECT id, username, password, display_name, role, active, verified, created_at
         FROM admins WHERE {filter}"
    )
}

fn admin_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AdminRow> {
    Ok(AdminRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        display_name: row.get(3)?,
        role: row.get(4)?,
        active: row.get(5)?,
        verified: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn query_admin(conn: &Connection, column: &str, value: &str) -> Result<Option<AdminRow>> {
    let mut stmt = conn.prepare(&admin_select(&format!("{column} = ?1")))?;
    let row = stmt.query_row([value], admin_from_row).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn username_namespace_spans_users_and_admins() {
        let db = db();
        assert!(db.create_user("u1", "luna", "hash", None).unwrap());
        assert!(db.create_admin("a1", "sol", "hash", "Sol", "moderator").unwrap());

        // Cross-table collisions are refused by the store itself, not just
        // by a handler-side pre-check.
        assert!(!db.create_admin("a2", "luna", "hash", "Luna", "moderator").unwrap());
        assert!(!db.create_user("u2", "sol", "hash", None).unwrap());
        // Same-table duplicates report as taken rather than as an error.
        assert!(!db.create_user("u3", "luna", "hash", None).unwrap());
        assert!(db.create_user("u4", "nova", "hash", None).unwrap());
    }

    #[test]
    fn recipient_lookup_requires_active_admin() {
        let db = db();
        db.create_admin("a1", "luna_mod", "hash", "Luna", "moderator").unwrap();

        assert!(db.get_active_admin_by_display_name("Luna").unwrap().is_some());

        db.set_admin_active("a1", false).unwrap();
        assert!(db.get_active_admin_by_display_name("Luna").unwrap().is_none());
    }

    #[test]
    fn deleting_a_user_keeps_their_messages() {
        let db = db();
        db.create_user("u1", "luna", "hash", Some("Luna")).unwrap();

        let msg = crate::models::MessageRow {
            id: "m1".into(),
            category: "advice".into(),
            content: "hello".into(),
            media_url: None,
            is_public: true,
            recipient: None,
            sender_name: Some("Luna".into()),
            user_id: Some("u1".into()),
            admin_id: None,
            heart_count: 0,
            created_at: String::new(),
        };
        db.insert_message(&msg).unwrap();

        assert!(db.delete_user("u1").unwrap());

        let survived = db.get_message("m1").unwrap().unwrap();
        assert_eq!(survived.user_id, None);
        assert_eq!(survived.sender_name.as_deref(), Some("Luna"));
    }

    #[test]
    fn super_admin_detection() {
        let db = db();
        assert!(!db.has_super_admin().unwrap());
        db.create_admin("a1", "root", "hash", "Root", "super_admin").unwrap();
        assert!(db.has_super_admin().unwrap());
    }
}
