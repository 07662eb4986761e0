use rusqlite::Connection;

use crate::error::Result;

/// Creates every table and index used by the store if it does not already
/// exist. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA foreign_keys=ON;

        CREATE TABLE IF NOT EXISTS accounts (
            account_id TEXT PRIMARY KEY,
            ws_server  TEXT
        );

        CREATE TABLE IF NOT EXISTS members (
            account_id TEXT NOT NULL,
            uid        TEXT NOT NULL,
            role       TEXT NOT NULL,
            PRIMARY KEY (account_id, uid)
        );

        CREATE TABLE IF NOT EXISTS acl (
            account_id TEXT NOT NULL,
            uid        TEXT NOT NULL,
            labels     TEXT NOT NULL,
            PRIMARY KEY (account_id, uid)
        );

        CREATE TABLE IF NOT EXISTS sessions (
            account_id        TEXT NOT NULL,
            label             TEXT NOT NULL,
            wa_id             TEXT,
            status            TEXT NOT NULL,
            created_at        TEXT NOT NULL,
            last_ready_at     TEXT,
            bot_enabled       INTEGER NOT NULL DEFAULT 1,
            receive_from_bots INTEGER NOT NULL DEFAULT 0,
            mode              TEXT NOT NULL DEFAULT 'all',
            allowlist         TEXT NOT NULL DEFAULT '[]',
            blocklist         TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (account_id, label)
        );

        CREATE TABLE IF NOT EXISTS thread_settings (
            account_id          TEXT NOT NULL,
            label               TEXT NOT NULL,
            chat_id             TEXT NOT NULL,
            bot_enabled         INTEGER,
            preferred_modality  TEXT,
            PRIMARY KEY (account_id, label, chat_id)
        );

        CREATE TABLE IF NOT EXISTS turns (
            window_id      TEXT PRIMARY KEY,
            account_id     TEXT NOT NULL,
            label          TEXT NOT NULL,
            chat_id        TEXT NOT NULL,
            status         TEXT NOT NULL,
            opened_at      INTEGER NOT NULL,
            closed_at      INTEGER NOT NULL,
            hints          TEXT NOT NULL,
            items          TEXT NOT NULL,
            response       TEXT,
            claimed_at     INTEGER,
            delivered_at   INTEGER,
            skipped_at     INTEGER,
            wa_message_id  TEXT,
            error          TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_turns_account_label_status
            ON turns (account_id, label, status);
        ",
    )?;
    Ok(())
}
