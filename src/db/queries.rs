pub const CREATE_KV_STORE: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
  key        TEXT PRIMARY KEY,
  value      TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#;

pub const UPSERT_VALUE: &str = "INSERT INTO kv_store (key, value, updated_at)
     VALUES (?1, ?2, ?3)
     ON CONFLICT(key)
     DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at";

pub const SELECT_VALUE: &str = "SELECT value FROM kv_store WHERE key = ?1";

pub const SELECT_KEYS_WITH_PREFIX: &str =
    "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key ASC";

pub fn schema_statements() -> Vec<&'static str> {
    vec![CREATE_KV_STORE]
}
