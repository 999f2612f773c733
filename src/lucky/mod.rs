//! "Feeling lucky" city draw
//!
//! Each user gets a random starting city; every later draw steps backwards
//! through the city table by a fixed decrement, wrapping at the start:
//!
//! ```text
//! r' = r - decrement
//! if r' <= 0 { r' += N }
//! ```
//!
//! Because the decrement and the table size `N` are co-prime, repeated
//! stepping from any seed visits all `N` indexes (`1..=N`) once before it
//! returns to the seed. A user therefore sees every city exactly once per
//! cycle with O(1) state: the last index shown.
//!
//! A decrement that shares a factor with `N` would only ever cover a subset
//! of the table, so [`DoubleHash::new`] refuses to build one.

pub mod import;

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;

use crate::db::{format_timestamp, Database};
use crate::error::{CoreError, Result};

/// Fixed-decrement stepping over `1..=table_size`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoubleHash {
    decrement: i64,
    table_size: i64,
}

impl DoubleHash {
    /// Build a stepper, failing unless it yields a full cycle
    pub fn new(decrement: i64, table_size: i64) -> Result<Self> {
        if table_size < 2 {
            return Err(CoreError::Config(format!(
                "city table needs at least 2 entries, found {}",
                table_size
            )));
        }
        if decrement < 1 || decrement >= table_size {
            return Err(CoreError::Config(format!(
                "lucky decrement {} must be between 1 and {}",
                decrement,
                table_size - 1
            )));
        }
        if gcd(decrement, table_size) != 1 {
            return Err(CoreError::Config(format!(
                "lucky decrement {} shares a factor with the city table size {}; \
                 draws would not cover every city",
                decrement, table_size
            )));
        }
        Ok(DoubleHash {
            decrement,
            table_size,
        })
    }

    /// Next index after `r`
    pub fn next(&self, r: i64) -> i64 {
        let mut next = r - self.decrement;
        if next <= 0 {
            next += self.table_size;
        }
        next
    }

    /// Uniform starting index in `[1, N-1]`
    pub fn seed<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        rng.gen_range(1..self.table_size)
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

/// One draw result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LuckyDraw {
    pub index: i64,
    pub city_key: i64,
    pub region: String,
}

/// Picks the next unseen city for a user
#[derive(Clone)]
pub struct LuckySelector {
    db: Arc<Database>,
    stepper: DoubleHash,
}

impl LuckySelector {
    /// Build a selector over the city table currently in `db`.
    ///
    /// Returns `Ok(None)` when no cities are imported yet.
    pub async fn from_database(db: Arc<Database>, decrement: i64) -> Result<Option<Self>> {
        let count = db.with_conn(|conn| city_count(conn)).await?;
        if count == 0 {
            return Ok(None);
        }
        let stepper = DoubleHash::new(decrement, count)?;
        tracing::info!(
            cities = count,
            decrement,
            "Lucky draw ready"
        );
        Ok(Some(LuckySelector { db, stepper }))
    }

    pub fn new(db: Arc<Database>, stepper: DoubleHash) -> Self {
        LuckySelector { db, stepper }
    }

    pub fn stepper(&self) -> DoubleHash {
        self.stepper
    }

    /// Draw the next city for `username`.
    ///
    /// Read, step, write and city lookup form one transaction, so two
    /// concurrent draws for the same user never see the same previous index.
    /// A tracked index with no city row is a data-integrity fault: it is
    /// returned as [`CoreError::NotFound`] and the tracker is left unchanged.
    pub async fn draw(&self, username: &str) -> Result<LuckyDraw> {
        let username = username.to_string();
        let stepper = self.stepper;
        let seed = stepper.seed(&mut rand::thread_rng());

        self.db
            .with_conn(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let index = match last_shown(&tx, &username)? {
                    Some(previous) => stepper.next(previous),
                    None => seed,
                };
                upsert_last_shown(&tx, &username, index)?;
                let (city_key, region) = city_for_index(&tx, index)?
                    .ok_or_else(|| CoreError::NotFound("City index", index.to_string()))?;

                tx.commit()?;

                tracing::debug!(%username, index, city_key, "lucky city drawn");
                Ok(LuckyDraw {
                    index,
                    city_key,
                    region,
                })
            })
            .await
    }
}

pub fn city_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))?)
}

pub fn last_shown(conn: &Connection, username: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT last_shown_idx FROM lucky_tracker WHERE username = ?",
            [username],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn upsert_last_shown(conn: &Connection, username: &str, index: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO lucky_tracker (username, last_shown_idx, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(username) DO UPDATE SET
             last_shown_idx = excluded.last_shown_idx,
             updated_at = excluded.updated_at",
        params![username, index, format_timestamp(Utc::now())],
    )?;
    Ok(())
}

pub fn city_for_index(conn: &Connection, index: i64) -> Result<Option<(i64, String)>> {
    Ok(conn
        .query_row(
            "SELECT city_key, region FROM cities WHERE idx = ?",
            [index],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?)
}
