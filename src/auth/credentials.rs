//! Registered users and their password / secret-answer hashes

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::password;
use crate::db::{format_timestamp, Database};
use crate::error::{CoreError, Result};

/// New account as submitted by the registration form
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub fullname: String,
    pub password: String,
    pub question: String,
    pub answer: String,
}

/// Credential store over the `users` table
#[derive(Clone)]
pub struct CredentialStore {
    db: Arc<Database>,
    pepper: String,
}

impl CredentialStore {
    pub fn new(db: Arc<Database>, pepper: impl Into<String>) -> Self {
        CredentialStore {
            db,
            pepper: pepper.into(),
        }
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        let username = username.to_string();
        self.db
            .with_conn(move |conn| username_exists(conn, &username))
            .await
    }

    /// Register a new user. Both secrets are hashed before they touch storage.
    pub async fn insert_user(&self, user: NewUser) -> Result<()> {
        validate_username(&user.username)?;
        validate_secret("password", &user.password)?;
        validate_secret("answer", &user.answer)?;

        let password_hash = self.hash(&user.password).await?;
        let answer_hash = self.hash(&user.answer).await?;

        self.db
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                if username_exists(&tx, &user.username)? {
                    return Err(CoreError::Conflict("User", user.username));
                }
                tx.execute(
                    "INSERT INTO users (username, fullname, password_hash, secret_question, secret_answer_hash, created_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                    params![
                        user.username,
                        user.fullname,
                        password_hash,
                        user.question,
                        answer_hash,
                        format_timestamp(Utc::now()),
                    ],
                )?;
                tx.commit()?;

                tracing::info!("Registered user {}", user.username);
                Ok(())
            })
            .await
    }

    pub async fn lookup_password_hash(&self, username: &str) -> Result<Option<String>> {
        self.lookup_column(username, "password_hash").await
    }

    pub async fn lookup_secret_answer_hash(&self, username: &str) -> Result<Option<String>> {
        self.lookup_column(username, "secret_answer_hash").await
    }

    pub async fn secret_question(&self, username: &str) -> Result<Option<String>> {
        self.lookup_column(username, "secret_question").await
    }

    async fn lookup_column(
        &self,
        username: &str,
        column: &'static str,
    ) -> Result<Option<String>> {
        let username = username.to_string();
        self.db
            .with_conn(move |conn| {
                // `column` is one of a fixed set of literals, never user input
                let sql = format!("SELECT {} FROM users WHERE username = ?", column);
                Ok(conn
                    .query_row(&sql, [&username], |row| row.get(0))
                    .optional()?)
            })
            .await
    }

    /// Check a login attempt. Unknown users simply fail verification.
    pub async fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        let hash = self.lookup_password_hash(username).await?;
        self.verify_against(hash, password).await
    }

    /// Check an answer to the user's secret question
    pub async fn verify_secret_answer(&self, username: &str, answer: &str) -> Result<bool> {
        let hash = self.lookup_secret_answer_hash(username).await?;
        self.verify_against(hash, answer).await
    }

    async fn verify_against(&self, hash: Option<String>, secret: &str) -> Result<bool> {
        let Some(hash) = hash else {
            return Ok(false);
        };
        let secret = secret.to_string();
        let pepper = self.pepper.clone();
        tokio::task::spawn_blocking(move || password::verify_secret(&secret, &pepper, &hash))
            .await?
    }

    /// Argon2 on the blocking pool, outside the connection lock
    async fn hash(&self, secret: &str) -> Result<String> {
        let secret = secret.to_string();
        let pepper = self.pepper.clone();
        tokio::task::spawn_blocking(move || password::hash_secret(&secret, &pepper)).await?
    }

    /// Replace a user's password hash
    pub async fn update_password_hash(&self, username: &str, new_password: &str) -> Result<()> {
        validate_secret("password", new_password)?;

        let hash = self.hash(new_password).await?;
        let username = username.to_string();
        self.db
            .with_conn(move |conn| {
                let updated = conn.execute(
                    "UPDATE users SET password_hash = ? WHERE username = ?",
                    params![hash, username],
                )?;
                if updated == 0 {
                    return Err(CoreError::NotFound("User", username));
                }
                tracing::info!("Password reset for user {}", username);
                Ok(())
            })
            .await
    }
}

fn username_exists(conn: &Connection, username: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM users WHERE username = ?",
            [username],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(CoreError::Validation("username is required".to_string()));
    }
    if username.len() > 64 {
        return Err(CoreError::Validation(
            "username must be at most 64 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_secret(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CoreError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
