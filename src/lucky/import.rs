//! Load the city table from an OpenWeatherMap city list.
//!
//! Accepts both published layouts of `city.list.json`: a single JSON array,
//! or one JSON object per line. Only `id`, `name` and `country` are read.

use std::path::Path;

use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::error::{CoreError, Result};

#[derive(Debug, Deserialize)]
pub struct CityRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub country: String,
}

impl CityRecord {
    /// Human-readable label, e.g. "Toronto, CA"
    pub fn region(&self) -> String {
        if self.country.is_empty() {
            self.name.clone()
        } else {
            format!("{}, {}", self.name, self.country)
        }
    }
}

/// Parse a city list in either layout
pub fn parse_city_list(content: &str) -> Result<Vec<CityRecord>> {
    if content.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(content)?);
    }

    serde_json::Deserializer::from_str(content)
        .into_iter::<CityRecord>()
        .map(|record| record.map_err(CoreError::from))
        .collect()
}

/// Replace the city table with `cities`, indexed `1..=n` in the given order.
///
/// Returns the new table size. Lucky trackers are reset in the same
/// transaction: a new table size gives a new permutation, and a tracked index
/// past the new end would step onto rows that no longer exist.
pub fn replace_cities(conn: &mut Connection, cities: &[CityRecord]) -> Result<usize> {
    if cities.is_empty() {
        return Err(CoreError::Validation("city list is empty".to_string()));
    }

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM cities", [])?;
    let reset = tx.execute("DELETE FROM lucky_tracker", [])?;
    if reset > 0 {
        tracing::info!("Reset {} lucky trackers for the new city table", reset);
    }
    {
        let mut stmt =
            tx.prepare("INSERT INTO cities (idx, city_key, region) VALUES (?, ?, ?)")?;
        for (offset, city) in cities.iter().enumerate() {
            stmt.execute(params![offset as i64 + 1, city.id, city.region()])?;
        }
    }
    tx.commit()?;

    Ok(cities.len())
}

/// Read `path` and load it into the city table
pub fn import_file(conn: &mut Connection, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let cities = parse_city_list(&content)?;
    let count = replace_cities(conn, &cities)?;
    tracing::info!("Imported {} cities from {}", count, path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_db;
    use crate::db::Database;
    use crate::lucky::{city_count, city_for_index, last_shown, upsert_last_shown, LuckySelector};
    use std::sync::Arc;

    const ARRAY: &str = r#"[
        {"id": 707860, "name": "Hurzuf", "country": "UA", "coord": {"lon": 34.28, "lat": 44.55}},
        {"id": 519188, "name": "Novinki", "country": "RU"},
        {"id": 1283378, "name": "Gorkhā", "country": "NP"}
    ]"#;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    #[test]
    fn test_parse_array_layout() {
        let cities = parse_city_list(ARRAY).unwrap();
        assert_eq!(cities.len(), 3);
        assert_eq!(cities[0].id, 707860);
        assert_eq!(cities[2].region(), "Gorkhā, NP");
    }

    #[test]
    fn test_parse_line_layout() {
        let lines = "{\"_id\":707860,\"id\":707860,\"name\":\"Hurzuf\",\"country\":\"UA\"}\n\
                     {\"id\":519188,\"name\":\"Novinki\",\"country\":\"RU\"}\n";
        let cities = parse_city_list(lines).unwrap();
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[1].region(), "Novinki, RU");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_city_list("{not json").is_err());
    }

    #[test]
    fn test_replace_assigns_dense_indexes() {
        let mut conn = conn();
        let cities = parse_city_list(ARRAY).unwrap();

        assert_eq!(replace_cities(&mut conn, &cities).unwrap(), 3);
        // importing again replaces rather than appends
        assert_eq!(replace_cities(&mut conn, &cities).unwrap(), 3);

        assert_eq!(city_count(&conn).unwrap(), 3);
        assert_eq!(
            city_for_index(&conn, 1).unwrap(),
            Some((707860, "Hurzuf, UA".to_string()))
        );
        assert_eq!(city_for_index(&conn, 0).unwrap(), None);
        assert_eq!(city_for_index(&conn, 4).unwrap(), None);
    }

    #[test]
    fn test_import_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("city.list.json");
        std::fs::write(&path, ARRAY).unwrap();

        let mut conn = conn();
        assert_eq!(import_file(&mut conn, &path).unwrap(), 3);
    }

    fn numbered_cities(count: i64) -> Vec<CityRecord> {
        (1..=count)
            .map(|id| CityRecord {
                id,
                name: format!("City {}", id),
                country: "XX".to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_smaller_reimport_resets_trackers() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.with_conn_blocking(|conn| {
            replace_cities(conn, &numbered_cities(30))?;
            upsert_last_shown(conn, "alice", 25)?;
            replace_cities(conn, &numbered_cities(13))?;
            Ok(())
        })
        .unwrap();

        let stored = db.with_conn_blocking(|conn| last_shown(conn, "alice")).unwrap();
        assert_eq!(stored, None);

        let selector = LuckySelector::from_database(db.clone(), 7)
            .await
            .unwrap()
            .unwrap();
        for _ in 0..3 {
            let draw = selector.draw("alice").await.unwrap();
            assert!((1..=13).contains(&draw.index));
        }
    }

    #[test]
    fn test_empty_list_rejected() {
        let mut conn = conn();
        assert!(matches!(
            replace_cities(&mut conn, &[]),
            Err(CoreError::Validation(_))
        ));
    }
}
