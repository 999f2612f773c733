//! Cookie-backed login sessions
//!
//! Lifecycle of a session row:
//!
//! ```text
//! login ──→ issue() ──→ [live row + history 'active']
//!                              │
//!          ┌───────────────────┼─────────────────────┐
//!          ▼                   ▼                     ▼
//!      clear()        verify() sees it       sweep_expired()
//!    (user logout)    past the window        (periodic task)
//!          │            (lazy expiry)                │
//!          ▼                   ▼                     ▼
//!  history 'logged_out'   row deleted      history 'expired_cleanup'
//! ```
//!
//! A row is never re-activated; a new login always creates a new row.

pub mod manager;
pub mod store;
pub mod sweeper;

pub use manager::{SessionCheck, SessionManager, SweepResult};
pub use store::HistoryRow;
pub use sweeper::SweeperHandle;

use crate::error::CoreError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Status of a session history row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    LoggedOut,
    ExpiredCleanup,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::LoggedOut => "logged_out",
            SessionStatus::ExpiredCleanup => "expired_cleanup",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "logged_out" => Ok(SessionStatus::LoggedOut),
            "expired_cleanup" => Ok(SessionStatus::ExpiredCleanup),
            other => Err(CoreError::Validation(format!(
                "Unknown session status: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            SessionStatus::Active,
            SessionStatus::LoggedOut,
            SessionStatus::ExpiredCleanup,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("zombie".parse::<SessionStatus>().is_err());
    }
}
