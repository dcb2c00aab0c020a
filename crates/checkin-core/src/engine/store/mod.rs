// ── Engine: Store (spec §4.C) ──────────────────────────────────────────────
// Durable record storage. One SQLite connection behind a mutex — all
// operations are short transactions or single statements, matching spec
// §5's "bounded connection pool ... short transactions" contract (a single
// mutex-guarded connection is the degenerate, correct case of that pool for
// a single-process scheduler; spec §1 assumes one active scheduler
// instance).
//
// Module layout:
//   schema          — migrations
//   users           — user upsert/lookup, fingerprint persistence
//   accounts        — account CRUD, hour-indexed queries
//   checkin_logs    — append-only log, today/slot queries
//   account_updates — single-flight try_begin/force_begin state machine
//   sessions        — TTL-scoped chat-shell session storage

use crate::atoms::error::CheckinResult;
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;

pub mod account_updates;
pub mod accounts;
pub mod checkin_logs;
mod schema;
pub mod sessions;
pub mod users;

pub use account_updates::AccountUpdate;
pub use accounts::Account;
pub use checkin_logs::CheckinLog;
pub use sessions::Session;
pub use users::User;

/// Thread-safe SQLite-backed store.
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `database_url` (a filesystem path or
    /// `:memory:`) and run migrations.
    pub fn open(database_url: &str) -> CheckinResult<Self> {
        info!("[store] opening {}", database_url);
        let conn = Connection::open(database_url)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA secure_delete = ON;").ok();
        conn.execute_batch("PRAGMA foreign_keys = ON;").ok();
        schema::run_migrations(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> CheckinResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").ok();
        schema::run_migrations(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_runs_migrations_idempotently() {
        let store = Store::open_in_memory().unwrap();
        // Re-running migrations on the same connection must not error.
        schema::run_migrations(&store.conn.lock()).unwrap();
    }
}
