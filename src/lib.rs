//! Citycast - weather front-end service with cookie sessions and a
//! feeling-lucky city draw
//!
//! This crate provides:
//! - Registration, login and password reset over Argon2id credential hashes
//! - Cookie-backed sessions with a fixed validity window, lazy expiry on
//!   access and a periodic sweep
//! - A per-user random city draw that never repeats a city until the whole
//!   table has been shown
//! - A JSON HTTP API tying the above together
//!
//! # Usage
//!
//! ```text
//! citycast --init
//! citycast --import-cities city.list.json
//! citycast
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod lucky;
pub mod session;

// Re-export main types for convenience
pub use config::Config;
pub use db::Database;
pub use error::{CoreError, Result};

use auth::{CookieCodec, CredentialStore};
use lucky::LuckySelector;
use session::{SessionManager, SweeperHandle};
use std::future::Future;
use std::sync::Arc;

/// Core service that wires storage, sessions and the lucky draw together
pub struct Core {
    /// Configuration
    pub config: Config,

    /// Database connection
    pub db: Arc<Database>,

    sessions: SessionManager,
    credentials: CredentialStore,
    lucky: Option<LuckySelector>,
}

impl Core {
    /// Open the database named by `config` and build every component
    pub async fn new(config: Config) -> Result<Self> {
        let db = Database::open(config.db_path())?;
        Self::with_database(config, Arc::new(db)).await
    }

    /// Build on an already opened database
    pub async fn with_database(config: Config, db: Arc<Database>) -> Result<Self> {
        config.validate()?;

        let cookie_secret = match &config.auth.cookie_secret {
            Some(secret) => secret.clone(),
            None => {
                tracing::warn!(
                    "auth.cookie_secret is not set; using a random key, sessions will not survive a restart"
                );
                config::random_secret()
            }
        };
        if config.auth.pepper.is_empty() {
            tracing::warn!("auth.pepper is empty; run `citycast --init` to generate secrets");
        }

        let codec = CookieCodec::new(config.auth.cookie_name.clone(), cookie_secret);
        let sessions = SessionManager::new(
            db.clone(),
            codec,
            config.auth.session_pepper.clone(),
            config.auth.validity_window(),
        );
        let credentials = CredentialStore::new(db.clone(), config.auth.pepper.clone());

        let lucky = LuckySelector::from_database(db.clone(), config.lucky.decrement).await?;
        if lucky.is_none() {
            tracing::warn!(
                "City table is empty; feeling-lucky draws are disabled until cities are imported"
            );
        }

        Ok(Core {
            config,
            db,
            sessions,
            credentials,
            lucky,
        })
    }

    pub fn lucky(&self) -> Option<&LuckySelector> {
        self.lucky.as_ref()
    }

    /// Spawn the periodic expired-session sweep
    pub fn start_session_sweeper(&self) -> SweeperHandle {
        let period = self.config.auth.sweep_interval();
        tracing::info!(
            "Starting session sweeper (every {} minutes)",
            self.config.auth.sweep_interval_minutes
        );
        SweeperHandle::start(self.sessions.clone(), period)
    }

    fn app_state(&self) -> api::AppState {
        api::AppState {
            sessions: self.sessions.clone(),
            credentials: self.credentials.clone(),
            lucky: self.lucky.clone(),
        }
    }

    /// Run the service until `shutdown` resolves.
    ///
    /// Shutdown order: stop accepting requests and drain, run the final
    /// session sweep, close the database.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sweeper = self.start_session_sweeper();
        let addr = self.config.server_addr();
        tracing::info!("Starting API server on {}", addr);

        let served = api::serve(addr, self.app_state(), shutdown).await;

        sweeper.shutdown().await;
        let closed = self.db.close();

        served?;
        closed
    }

    /// Run the service until Ctrl+C / SIGTERM
    pub async fn run(&self) -> Result<()> {
        self.run_until(api::shutdown_signal()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.server.port = 0;
        config.auth.cookie_secret = Some("test-secret".to_string());
        config
    }

    #[tokio::test]
    async fn test_core_without_cities_disables_lucky() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let core = Core::with_database(test_config(), db).await.unwrap();
        assert!(core.lucky().is_none());
    }

    #[tokio::test]
    async fn test_core_rejects_non_coprime_decrement() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.with_conn_blocking(|conn| {
            for idx in 1..=14i64 {
                conn.execute(
                    "INSERT INTO cities (idx, city_key, region) VALUES (?, ?, ?)",
                    params![idx, idx, "x"],
                )?;
            }
            Ok(())
        })
        .unwrap();

        let result = Core::with_database(test_config(), db).await;
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_until_closes_database() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let core = Core::with_database(test_config(), db.clone()).await.unwrap();

        core.run_until(async {}).await.unwrap();
        assert!(db.is_closed());
    }
}
