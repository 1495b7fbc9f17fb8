pub mod queries;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;

/// String key-value table on top of SQLite.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;

        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                self.conn
                    .execute(statement, [])
                    .context("Failed to initialize schema")
                    .map(|_| ())
            })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(queries::SELECT_VALUE, params![key], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to read key: {key}"))
    }

    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                queries::UPSERT_VALUE,
                params![key, value, Utc::now().timestamp()],
            )
            .with_context(|| format!("Failed to write key: {key}"))?;

        Ok(())
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut statement = self.conn.prepare(queries::SELECT_KEYS_WITH_PREFIX)?;

        let keys = statement
            .query_map(params![prefix], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to list keys")?;

        Ok(keys)
    }

    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, error)| error)
            .context("Failed to close SQLite DB")
    }
}

#[cfg(test)]
mod tests {
    use super::Database;

    #[test]
    fn put_overwrites_and_get_reads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let database = Database::open(&dir.path().join("db").join("kv.db")).expect("open");

        assert_eq!(database.get("missing").expect("get"), None);
        database.put("a", "1").expect("put");
        database.put("a", "2").expect("put");
        assert_eq!(database.get("a").expect("get").as_deref(), Some("2"));
    }

    #[test]
    fn prefix_scan_returns_sorted_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let database = Database::open(&dir.path().join("kv.db")).expect("open");

        database.put("p:x", "1").expect("put");
        database.put("p:y", "1").expect("put");
        database.put("q:x", "1").expect("put");

        assert_eq!(
            database.keys_with_prefix("p:").expect("scan"),
            vec!["p:x".to_string(), "p:y".to_string()]
        );
        database.close().expect("close");
    }
}
