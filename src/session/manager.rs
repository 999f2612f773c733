//! Session manager: issues, verifies, clears and sweeps sessions.
//!
//! Every operation that reads and then writes session state runs inside one
//! SQLite transaction on the shared handle, so a verify racing a sweep or a
//! logout always sees a consistent set of rows.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, TransactionBehavior};

use super::{store, SessionStatus};
use crate::auth::{password, CookieCodec, SessionCookie};
use crate::db::Database;
use crate::error::Result;

/// Message shown when a signed cookie no longer maps to a live session
pub const EXPIRED_REASON: &str = "Session expired, please login";

/// Outcome of checking a request's session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    /// Cookie maps to a live session inside the validity window
    Valid { username: String },
    /// No cookie, an unreadable cookie, or a storage fault
    Anonymous,
    /// Cookie was genuine but its session is gone or past the window
    Expired,
}

impl SessionCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionCheck::Valid { .. })
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            SessionCheck::Valid { username } => Some(username),
            _ => None,
        }
    }

    /// User-facing explanation for an invalid session, if there is one
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            SessionCheck::Expired => Some(EXPIRED_REASON),
            _ => None,
        }
    }
}

/// Counts from one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub sessions_removed: usize,
    pub history_expired: usize,
}

/// Owns the lifecycle of every session row
#[derive(Clone)]
pub struct SessionManager {
    db: Arc<Database>,
    codec: CookieCodec,
    session_pepper: String,
    validity: Duration,
}

impl SessionManager {
    pub fn new(
        db: Arc<Database>,
        codec: CookieCodec,
        session_pepper: impl Into<String>,
        validity: Duration,
    ) -> Self {
        SessionManager {
            db,
            codec,
            session_pepper: session_pepper.into(),
            validity,
        }
    }

    pub fn codec(&self) -> &CookieCodec {
        &self.codec
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Start a session for a user who just proved their password.
    ///
    /// Returns the `Set-Cookie` header value to hand back to the client.
    pub async fn issue(&self, username: &str, password_material: &str) -> Result<String> {
        let token = self.issue_at(username, password_material, Utc::now()).await?;
        Ok(self.codec.set_cookie_header(&SessionCookie {
            username: username.to_string(),
            token,
        }))
    }

    /// Insert a new session created at `now` and return its token
    pub async fn issue_at(
        &self,
        username: &str,
        password_material: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let token = {
            let username = username.to_string();
            let material = password_material.to_string();
            let pepper = self.session_pepper.clone();
            tokio::task::spawn_blocking(move || {
                password::session_token(&username, &pepper, &material)
            })
            .await??
        };

        let username = username.to_string();
        let stored = token.clone();
        self.db
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                store::insert_session(&tx, &username, &stored, now)?;
                store::insert_history(&tx, &username, &stored, SessionStatus::Active, now)?;
                tx.commit()?;
                tracing::info!(%username, "session created");
                Ok(())
            })
            .await?;

        Ok(token)
    }

    /// Check the request's cookie against the session store.
    ///
    /// This is a side-effecting query: a cookie whose session has outlived
    /// the validity window has that one row deleted here (lazy expiry).
    pub async fn verify(&self, cookie_value: Option<&str>) -> SessionCheck {
        self.verify_at(cookie_value, Utc::now()).await
    }

    pub async fn verify_at(&self, cookie_value: Option<&str>, now: DateTime<Utc>) -> SessionCheck {
        let Some(value) = cookie_value else {
            return SessionCheck::Anonymous;
        };
        let Some(cookie) = self.codec.decode(value) else {
            tracing::debug!("Ignoring session cookie that failed verification");
            return SessionCheck::Anonymous;
        };

        let validity = self.validity;
        let result = self
            .db
            .with_conn(move |conn| reconcile(conn, cookie, now, validity))
            .await;

        match result {
            Ok(check) => check,
            Err(e) => {
                tracing::error!("Session verification failed: {}", e);
                SessionCheck::Anonymous
            }
        }
    }

    /// Log out: drop the cookie's session and close its history row.
    ///
    /// Returns whether a live session was removed. Clearing an unknown or
    /// already-removed session is not an error.
    pub async fn clear(&self, cookie_value: Option<&str>) -> Result<bool> {
        self.clear_at(cookie_value, Utc::now()).await
    }

    pub async fn clear_at(&self, cookie_value: Option<&str>, now: DateTime<Utc>) -> Result<bool> {
        let Some(cookie) = cookie_value.and_then(|v| self.codec.decode(v)) else {
            return Ok(false);
        };

        self.db
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let removed = store::delete_session(&tx, &cookie.token)?;
                store::update_history_by_token(&tx, &cookie.token, SessionStatus::LoggedOut, now)?;
                tx.commit()?;
                if removed {
                    tracing::info!(username = %cookie.username, "session cleared");
                }
                Ok(removed)
            })
            .await
    }

    /// Remove every session past the validity window, for all users
    pub async fn sweep_expired(&self) -> Result<SweepResult> {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<SweepResult> {
        let cutoff = now - self.validity;
        self.db
            .with_conn(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let sessions_removed = store::delete_sessions_older_than(&tx, cutoff)?;
                let history_expired = store::update_history_bulk_expired(
                    &tx,
                    SessionStatus::ExpiredCleanup,
                    cutoff,
                    now,
                )?;
                tx.commit()?;
                Ok(SweepResult {
                    sessions_removed,
                    history_expired,
                })
            })
            .await
    }
}

/// Read-and-reconcile step behind [`SessionManager::verify_at`].
///
/// Scans every row of the user; only the caller's own row can be deleted.
fn reconcile(
    conn: &mut Connection,
    cookie: SessionCookie,
    now: DateTime<Utc>,
    validity: Duration,
) -> Result<SessionCheck> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut valid = false;
    let mut stale: Option<String> = None;
    for row in store::sessions_for(&tx, &cookie.username)? {
        if row.token != cookie.token {
            continue;
        }
        if now - row.created_at <= validity {
            valid = true;
        } else {
            stale = Some(row.token);
        }
    }

    if valid {
        return Ok(SessionCheck::Valid {
            username: cookie.username,
        });
    }

    if let Some(token) = stale {
        store::delete_session(&tx, &token)?;
        tx.commit()?;
        tracing::info!(username = %cookie.username, "expired session removed on access");
    }

    Ok(SessionCheck::Expired)
}
