//! SQLite schema for Citycast
//!
//! Users, live sessions, the session history audit trail, the city table and
//! the per-user lucky-draw tracker.

use rusqlite::{Connection, Result};

/// Initialize the database with required tables
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            username TEXT PRIMARY KEY,
            fullname TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            secret_question TEXT NOT NULL,
            secret_answer_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Live sessions - one row per login, many per user allowed
    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_sessions (
            token TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_user_sessions_username ON user_sessions(username)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_user_sessions_created_at ON user_sessions(created_at)",
        [],
    )?;

    // Append-only audit trail of logins
    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            token TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active' CHECK (
                status IN ('active', 'logged_out', 'expired_cleanup')
            ),
            login_time TEXT NOT NULL,
            status_updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_session_history_token ON session_history(token)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_session_history_status ON session_history(status, login_time)",
        [],
    )?;

    // Dense 1-based index over provider city ids
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cities (
            idx INTEGER PRIMARY KEY CHECK (idx >= 1),
            city_key INTEGER NOT NULL,
            region TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lucky_tracker (
            username TEXT PRIMARY KEY,
            last_shown_idx INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_db() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(init_db(&conn).is_ok());

        let table_count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
                 AND name IN ('users', 'user_sessions', 'session_history', 'cities', 'lucky_tracker')",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(table_count, 5);
    }

    #[test]
    fn test_init_db_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        assert!(init_db(&conn).is_ok());
    }

    #[test]
    fn test_history_status_is_constrained() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO session_history (username, token, status, login_time, status_updated_at)
             VALUES ('a', 't', 'bogus', 'x', 'x')",
            [],
        );
        assert!(result.is_err());
    }
}
