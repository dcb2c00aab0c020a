// Database schema and migrations for the check-in bot store. Called once by
// `Store::open()` after WAL is enabled. Adding a column: append an
// idempotent `CREATE TABLE IF NOT EXISTS` or `ALTER TABLE ... ADD COLUMN`
// (errors silently swallowed) at the end of `run_migrations` — never modify
// existing SQL, to keep upgrade paths clean.

use crate::atoms::error::CheckinResult;
use log::info;
use rusqlite::Connection;

pub(crate) fn run_migrations(conn: &Connection) -> CheckinResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id INTEGER NOT NULL UNIQUE,
            username TEXT,
            first_name TEXT,
            last_name TEXT,
            fingerprint TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            site TEXT NOT NULL,
            site_username TEXT NOT NULL,
            encrypted_password TEXT NOT NULL,
            cookie TEXT,
            mode TEXT NOT NULL DEFAULT 'fixed',
            status TEXT NOT NULL DEFAULT 'active',
            credits INTEGER NOT NULL DEFAULT 0,
            checkin_count INTEGER NOT NULL DEFAULT 0,
            checkin_hour INTEGER,
            push_hour INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_id, site, site_username)
        );

        CREATE INDEX IF NOT EXISTS idx_accounts_checkin_hour
            ON accounts(checkin_hour) WHERE status = 'active';
        CREATE INDEX IF NOT EXISTS idx_accounts_push_hour
            ON accounts(push_hour) WHERE status = 'active';

        CREATE TABLE IF NOT EXISTS checkin_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            site TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            credits_delta INTEGER NOT NULL DEFAULT 0,
            credits_before INTEGER,
            credits_after INTEGER,
            error_code TEXT,
            executed_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_checkin_logs_account_time
            ON checkin_logs(account_id, executed_at DESC);

        CREATE TABLE IF NOT EXISTS account_updates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Partial-unique invariant (spec §3): at most one active row per account.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_account_updates_one_active
            ON account_updates(account_id)
            WHERE status IN ('pending', 'processing');

        CREATE INDEX IF NOT EXISTS idx_account_updates_account
            ON account_updates(account_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id INTEGER NOT NULL,
            state TEXT NOT NULL,
            data_json TEXT NOT NULL DEFAULT '{}',
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_external_id ON sessions(external_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);

        CREATE TABLE IF NOT EXISTS engine_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    info!("[store] migrations applied");
    Ok(())
}
