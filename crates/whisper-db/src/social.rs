use crate::Database;
use crate::models::UserRow;
use anyhow::Result;
use whisper_types::api::{ActorStats, Metric};

impl Database {
    // -- Follow edges --

    /// Idempotent edge insert: a duplicate follow is a no-op. Returns true
    /// when a new edge was created.
    pub fn insert_follow(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO follows (follower_id, followed_id) VALUES (?1, ?2)",
                rusqlite::params![follower_id, followed_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Returns true when an edge existed and was removed.
    pub fn delete_follow(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
                rusqlite::params![follower_id, followed_id],
            )?;
            Ok(n > 0)
        })
    }

    // -- Derived metrics --

    /// Profile counters for a registered user. Pure read-side aggregation;
    /// nothing here is stored.
    pub fn stats_for_user(&self, user_id: &str) -> Result<ActorStats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<i64> {
                Ok(conn.query_row(sql, [user_id], |row| row.get(0))?)
            };

            Ok(ActorStats {
                message_count: count("SELECT COUNT(*) FROM messages WHERE user_id = ?1")?,
                reply_count: count("SELECT COUNT(*) FROM replies WHERE user_id = ?1")?,
                // Hearts only accrue on the public wall.
                reaction_total: count(
                    "SELECT COALESCE(SUM(heart_count), 0) FROM messages
                     WHERE user_id = ?1 AND is_public = 1",
                )?,
                follower_count: count("SELECT COUNT(*) FROM follows WHERE followed_id = ?1")?,
                following_count: count("SELECT COUNT(*) FROM follows WHERE follower_id = ?1")?,
            })
        })
    }

    /// Same counters for a moderator account. Admins are not part of the
    /// follow graph, so both follow counts stay zero.
    pub fn stats_for_admin(&self, admin_id: &str) -> Result<ActorStats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<i64> {
                Ok(conn.query_row(sql, [admin_id], |row| row.get(0))?)
            };

            Ok(ActorStats {
                message_count: count("SELECT COUNT(*) FROM messages WHERE admin_id = ?1")?,
                reply_count: count("SELECT COUNT(*) FROM replies WHERE admin_id = ?1")?,
                reaction_total: count(
                    "SELECT COALESCE(SUM(heart_count), 0) FROM messages
                     WHERE admin_id = ?1 AND is_public = 1",
                )?,
                follower_count: 0,
                following_count: 0,
            })
        })
    }

    /// Active users ranked by one metric, highest first. Ties break on the
    /// earliest account creation so rank assignment is reproducible across
    /// requests.
    pub fn leaderboard(&self, metric: Metric, limit: u32) -> Result<Vec<(UserRow, i64)>> {
        let value_sql = match metric {
            Metric::Messages => {
                "(SELECT COUNT(*) FROM messages m WHERE m.user_id = u.id)"
            }
            Metric::Replies => {
                "(SELECT COUNT(*) FROM replies r WHERE r.user_id = u.id)"
            }
            Metric::Hearts => {
                "(SELECT COALESCE(SUM(m.heart_count), 0) FROM messages m
                  WHERE m.user_id = u.id AND m.is_public = 1)"
            }
            Metric::Followers => {
                "(SELECT COUNT(*) FROM follows f WHERE f.followed_id = u.id)"
            }
        };

        let sql = format!(
            "SELECT u.id, u.username, u.password, u.display_name, u.bio, u.avatar_url,
                    u.verified, u.active, u.created_at, {value_sql} AS value
             FROM users u
             WHERE u.active = 1
             ORDER BY value DESC, u.created_at ASC, u.rowid ASC
             LIMIT ?1"
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok((
                        UserRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            password: row.get(2)?,
                            display_name: row.get(3)?,
                            bio: row.get(4)?,
                            avatar_url: row.get(5)?,
                            verified: row.get(6)?,
                            active: row.get(7)?,
                            created_at: row.get(8)?,
                        },
                        row.get::<_, i64>(9)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRow;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "luna", "hash", None).unwrap();
        db.create_user("u2", "sol", "hash", None).unwrap();
        db.create_user("u3", "nova", "hash", None).unwrap();
        db
    }

    fn message(id: &str, user_id: &str, public: bool, hearts: i64) -> MessageRow {
        MessageRow {
            id: id.into(),
            category: "anything".into(),
            content: "hello".into(),
            media_url: None,
            is_public: public,
            recipient: (!public).then(|| "Luna".into()),
            sender_name: None,
            user_id: Some(user_id.into()),
            admin_id: None,
            heart_count: hearts,
            created_at: String::new(),
        }
    }

    #[test]
    fn follow_is_idempotent() {
        let db = db();
        assert!(db.insert_follow("u1", "u2").unwrap());
        assert!(!db.insert_follow("u1", "u2").unwrap());

        let stats = db.stats_for_user("u2").unwrap();
        assert_eq!(stats.follower_count, 1);
        let stats = db.stats_for_user("u1").unwrap();
        assert_eq!(stats.following_count, 1);

        assert!(db.delete_follow("u1", "u2").unwrap());
        assert!(!db.delete_follow("u1", "u2").unwrap());
    }

    #[test]
    fn self_follow_never_creates_an_edge() {
        // OR IGNORE also swallows the CHECK violation, so the edge is simply
        // not created. The handler layer rejects self-follow up front.
        let db = db();
        assert!(!db.insert_follow("u1", "u1").unwrap());
        assert_eq!(db.stats_for_user("u1").unwrap().follower_count, 0);
    }

    #[test]
    fn admin_stats_stay_outside_the_follow_graph() {
        let db = db();
        db.create_admin("a1", "luna_mod", "hash", "Luna", "moderator").unwrap();

        let mut msg = message("m1", "u1", true, 3);
        msg.user_id = None;
        msg.admin_id = Some("a1".into());
        db.insert_message(&msg).unwrap();

        let stats = db.stats_for_admin("a1").unwrap();
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.reaction_total, 3);
        assert_eq!(stats.follower_count, 0);
        assert_eq!(stats.following_count, 0);
    }

    #[test]
    fn reaction_total_counts_public_hearts_only() {
        let db = db();
        db.insert_message(&message("m1", "u1", true, 4)).unwrap();
        db.insert_message(&message("m2", "u1", false, 9)).unwrap();

        let stats = db.stats_for_user("u1").unwrap();
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.reaction_total, 4);
    }

    #[test]
    fn leaderboard_ranks_by_metric_with_deterministic_ties() {
        let db = db();
        // sol and nova tie on messages; sol registered earlier so it ranks first.
        db.insert_message(&message("m1", "u2", true, 0)).unwrap();
        db.insert_message(&message("m2", "u3", true, 0)).unwrap();
        db.insert_message(&message("m3", "u3", true, 0)).unwrap();
        db.insert_message(&message("m4", "u2", true, 0)).unwrap();

        let ranked = db.leaderboard(Metric::Messages, 10).unwrap();
        let order: Vec<(&str, i64)> =
            ranked.iter().map(|(u, v)| (u.username.as_str(), *v)).collect();
        assert_eq!(order, vec![("sol", 2), ("nova", 2), ("luna", 0)]);
    }

    #[test]
    fn leaderboard_by_followers() {
        let db = db();
        db.insert_follow("u1", "u3").unwrap();
        db.insert_follow("u2", "u3").unwrap();

        let ranked = db.leaderboard(Metric::Followers, 2).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0.username, "nova");
        assert_eq!(ranked[0].1, 2);
    }
}
