//! Row-level access to `user_sessions` and `session_history`.
//!
//! Plain functions over a connection (or transaction) so that the manager can
//! compose several of them inside one atomic unit.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use super::SessionStatus;
use crate::db::{format_timestamp, parse_timestamp};
use crate::error::Result;

/// A live session row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// A session history row
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRow {
    pub username: String,
    pub token: String,
    pub status: SessionStatus,
    pub login_time: DateTime<Utc>,
    pub status_updated_at: DateTime<Utc>,
}

pub fn insert_session(
    conn: &Connection,
    username: &str,
    token: &str,
    created_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO user_sessions (token, username, created_at) VALUES (?, ?, ?)",
        params![token, username, format_timestamp(created_at)],
    )?;
    Ok(())
}

/// Every live session of a user, oldest first
pub fn sessions_for(conn: &Connection, username: &str) -> Result<Vec<SessionRow>> {
    let mut stmt = conn.prepare(
        "SELECT token, created_at FROM user_sessions WHERE username = ? ORDER BY created_at",
    )?;
    let rows = stmt
        .query_map([username], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(token, created_at)| {
            Ok(SessionRow {
                token,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .collect()
}

/// Delete one session by exact token. Returns whether a row was removed.
pub fn delete_session(conn: &Connection, token: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM user_sessions WHERE token = ?", [token])?;
    Ok(deleted > 0)
}

/// Delete every session created before `cutoff`, across all users
pub fn delete_sessions_older_than(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM user_sessions WHERE created_at < ?",
        [format_timestamp(cutoff)],
    )?)
}

pub fn insert_history(
    conn: &Connection,
    username: &str,
    token: &str,
    status: SessionStatus,
    at: DateTime<Utc>,
) -> Result<()> {
    let at = format_timestamp(at);
    conn.execute(
        "INSERT INTO session_history (username, token, status, login_time, status_updated_at)
         VALUES (?, ?, ?, ?, ?)",
        params![username, token, status.as_str(), at, at],
    )?;
    Ok(())
}

/// Move the history row of `token` out of `active`.
///
/// Rows that already reached a terminal status are left alone.
pub fn update_history_by_token(
    conn: &Connection,
    token: &str,
    status: SessionStatus,
    at: DateTime<Utc>,
) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE session_history SET status = ?, status_updated_at = ?
         WHERE token = ? AND status = 'active'",
        params![status.as_str(), format_timestamp(at), token],
    )?)
}

/// Mark every still-active history row that logged in before `cutoff`
pub fn update_history_bulk_expired(
    conn: &Connection,
    status: SessionStatus,
    cutoff: DateTime<Utc>,
    at: DateTime<Utc>,
) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE session_history SET status = ?, status_updated_at = ?
         WHERE status = 'active' AND login_time < ?",
        params![status.as_str(), format_timestamp(at), format_timestamp(cutoff)],
    )?)
}

/// Full history, oldest login first
pub fn list_history(conn: &Connection) -> Result<Vec<HistoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT username, token, status, login_time, status_updated_at
         FROM session_history
         ORDER BY login_time, id",
    )?;
    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    raw.into_iter()
        .map(|(username, token, status, login_time, updated)| {
            Ok(HistoryRow {
                username,
                token,
                status: status.parse()?,
                login_time: parse_timestamp(&login_time)?,
                status_updated_at: parse_timestamp(&updated)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_db;
    use chrono::{Duration, TimeZone};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_multiple_sessions_per_user() {
        let conn = conn();
        insert_session(&conn, "alice", "tok-1", t0()).unwrap();
        insert_session(&conn, "alice", "tok-2", t0() + Duration::minutes(5)).unwrap();
        insert_session(&conn, "bob", "tok-3", t0()).unwrap();

        let rows = sessions_for(&conn, "alice").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].token, "tok-1");
        assert_eq!(rows[0].created_at, t0());
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let conn = conn();
        insert_session(&conn, "alice", "tok", t0()).unwrap();
        assert!(insert_session(&conn, "bob", "tok", t0()).is_err());
    }

    #[test]
    fn test_delete_session_reports_absence() {
        let conn = conn();
        insert_session(&conn, "alice", "tok", t0()).unwrap();
        assert!(delete_session(&conn, "tok").unwrap());
        assert!(!delete_session(&conn, "tok").unwrap());
    }

    #[test]
    fn test_delete_older_than_is_strict() {
        let conn = conn();
        insert_session(&conn, "a", "old", t0() - Duration::seconds(1)).unwrap();
        insert_session(&conn, "a", "edge", t0()).unwrap();

        assert_eq!(delete_sessions_older_than(&conn, t0()).unwrap(), 1);
        let left = sessions_for(&conn, "a").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].token, "edge");
    }

    #[test]
    fn test_history_transitions_once() {
        let conn = conn();
        insert_history(&conn, "alice", "tok", SessionStatus::Active, t0()).unwrap();

        let later = t0() + Duration::hours(1);
        assert_eq!(
            update_history_by_token(&conn, "tok", SessionStatus::LoggedOut, later).unwrap(),
            1
        );
        // terminal rows never move again
        assert_eq!(
            update_history_bulk_expired(
                &conn,
                SessionStatus::ExpiredCleanup,
                later + Duration::hours(10),
                later
            )
            .unwrap(),
            0
        );

        let history = list_history(&conn).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, SessionStatus::LoggedOut);
        assert_eq!(history[0].login_time, t0());
        assert_eq!(history[0].status_updated_at, later);
    }
}
