//! Periodic removal of expired sessions.
//!
//! A single background task that selects between its interval timer and a
//! cancellation token. When cancelled it runs one last sweep before it exits,
//! so shutdown leaves no stale rows behind.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::SessionManager;

/// Handle to the running sweeper task
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Spawn the sweeper on the current runtime
    pub fn start(manager: SessionManager, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(manager, period, cancel.clone()));
        SweeperHandle { cancel, task }
    }

    /// Token that stops the sweeper when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the task and wait for its final sweep to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("Session sweeper task failed: {}", e);
        }
    }
}

/// Sweep every `period` until `cancel` fires, then sweep once more
pub async fn run(manager: SessionManager, period: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = period.as_secs(),
        validity_hours = manager.validity().num_hours(),
        "Session sweeper started"
    );

    let mut ticker = tokio::time::interval(period);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session sweeper stopping, running final sweep");
                sweep_once(&manager).await;
                break;
            }
            _ = ticker.tick() => {
                sweep_once(&manager).await;
            }
        }
    }
}

async fn sweep_once(manager: &SessionManager) {
    match manager.sweep_expired().await {
        Ok(result) if result.sessions_removed > 0 || result.history_expired > 0 => {
            tracing::info!(
                removed = result.sessions_removed,
                history_expired = result.history_expired,
                "Expired sessions swept"
            );
        }
        Ok(_) => tracing::debug!("Session sweep: nothing to remove"),
        Err(e) => tracing::error!(error = %e, "Session sweep failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CookieCodec;
    use crate::db::Database;
    use crate::session::{store, SessionStatus};
    use chrono::Utc;
    use std::sync::Arc;

    fn manager(db: Arc<Database>) -> SessionManager {
        SessionManager::new(
            db,
            CookieCodec::new("session", b"secret"),
            "pepper",
            chrono::Duration::hours(6),
        )
    }

    async fn seed_stale(db: &Arc<Database>) {
        let stale = Utc::now() - chrono::Duration::hours(8);
        db.with_conn(move |conn| {
            store::insert_session(conn, "alice", "stale", stale)?;
            store::insert_history(conn, "alice", "stale", SessionStatus::Active, stale)
        })
        .await
        .unwrap();
    }

    async fn live_count(db: &Arc<Database>) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM user_sessions", [], |row| row.get(0))?)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_runs_final_sweep() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed_stale(&db).await;

        // Period far longer than the test: only the shutdown path can sweep
        let handle = SweeperHandle::start(manager(db.clone()), Duration::from_secs(3600));
        tokio::task::yield_now().await;
        assert_eq!(live_count(&db).await, 1);

        handle.shutdown().await;
        assert_eq!(live_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_sweeps_on_interval() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let handle = SweeperHandle::start(manager(db.clone()), Duration::from_millis(50));
        seed_stale(&db).await;

        let mut remaining = live_count(&db).await;
        for _ in 0..40 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            remaining = live_count(&db).await;
        }
        assert_eq!(remaining, 0);
        assert!(!handle.cancellation_token().is_cancelled());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_stops_promptly() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let handle = SweeperHandle::start(manager(db), Duration::from_secs(24 * 3600));

        let finished =
            tokio::time::timeout(Duration::from_secs(5), handle.shutdown()).await;
        assert!(finished.is_ok(), "sweeper did not observe cancellation");
    }
}
