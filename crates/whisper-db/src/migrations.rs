use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            password      TEXT NOT NULL,
            display_name  TEXT,
            bio           TEXT,
            avatar_url    TEXT,
            verified      INTEGER NOT NULL DEFAULT 0,
            active        INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS admins (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            password      TEXT NOT NULL,
            -- Private messages are routed by this name, so it must be unambiguous.
            display_name  TEXT NOT NULL UNIQUE,
            role          TEXT NOT NULL,
            active        INTEGER NOT NULL DEFAULT 1,
            verified      INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id            TEXT PRIMARY KEY,
            category      TEXT NOT NULL,
            content       TEXT NOT NULL,
            media_url     TEXT,
            is_public     INTEGER NOT NULL,
            recipient     TEXT,
            sender_name   TEXT,
            user_id       TEXT REFERENCES users(id) ON DELETE SET NULL,
            admin_id      TEXT REFERENCES admins(id) ON DELETE SET NULL,
            heart_count   INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            -- A row is authored anonymously, by a user, or by an admin. Never two.
            CHECK (user_id IS NULL OR admin_id IS NULL),
            -- Private messages always name a recipient moderator.
            CHECK (is_public = 1 OR recipient IS NOT NULL)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_public
            ON messages(is_public, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_recipient
            ON messages(recipient) WHERE is_public = 0;

        CREATE TABLE IF NOT EXISTS replies (
            id               TEXT PRIMARY KEY,
            message_id       TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            parent_reply_id  TEXT REFERENCES replies(id) ON DELETE CASCADE,
            content          TEXT NOT NULL,
            nickname         TEXT NOT NULL,
            user_id          TEXT REFERENCES users(id) ON DELETE SET NULL,
            admin_id         TEXT REFERENCES admins(id) ON DELETE SET NULL,
            created_at       TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK (user_id IS NULL OR admin_id IS NULL)
        );

        CREATE INDEX IF NOT EXISTS idx_replies_message
            ON replies(message_id, created_at);

        CREATE TABLE IF NOT EXISTS follows (
            follower_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            followed_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at   TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (follower_id, followed_id),
            CHECK (follower_id <> followed_id)
        );

        CREATE INDEX IF NOT EXISTS idx_follows_followed
            ON follows(followed_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
