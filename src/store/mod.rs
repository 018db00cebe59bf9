//! Durable conversation store
//!
//! The conversation log and the chat history are kept as two JSON arrays
//! under namespaced keys of a small `SQLite` key-value table. Loading never
//! fails: missing or corrupt data reverts to the built-in defaults, and
//! every entry that does parse is sanitized individually.

mod schema;

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde_json::Value;
use uuid::Uuid;

use crate::state::{ChatMessage, ChatRole, LogCategory, LogEntry};
use crate::{Error, Result};

pub use schema::SCHEMA_VERSION;

/// Key of the conversation log array
pub const LOGS_KEY: &str = "jarvis:logs";

/// Key of the chat history array
pub const MESSAGES_KEY: &str = "jarvis:messages";

/// First seed log line
pub const BOOT_MESSAGE: &str = "J.A.R.V.I.S. sistema inicializado.";

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Conversation store backed by `SQLite`
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
    wake_word: String,
}

impl Store {
    /// Open (or create) the store at `path`
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or migrated
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = Pool::builder()
            .max_size(2)
            .build(manager)
            .map_err(|e| Error::Database(e.to_string()))?;

        let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
        schema::init(&conn)?;

        tracing::info!(
            path = %path.as_ref().display(),
            version = SCHEMA_VERSION,
            "conversation store opened"
        );
        Ok(Self::from_pool(pool))
    }

    /// Open an in-memory store (for testing)
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be initialized
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| Error::Database(e.to_string()))?;

        let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
        schema::init(&conn)?;

        Ok(Self::from_pool(pool))
    }

    fn from_pool(pool: DbPool) -> Self {
        Self {
            pool,
            wake_word: "jarvis".to_string(),
        }
    }

    /// Set the wake word quoted by the default seed log
    #[must_use]
    pub fn with_wake_word(mut self, wake_word: &str) -> Self {
        self.wake_word = wake_word.to_string();
        self
    }

    /// Default conversation log: the two seed system entries
    #[must_use]
    pub fn default_logs(&self) -> Vec<LogEntry> {
        vec![
            LogEntry::system(BOOT_MESSAGE),
            LogEntry::system(format!(
                "Aguardando wake word \"{}\"...",
                capitalize(&self.wake_word)
            )),
        ]
    }

    /// Load the conversation log, falling back to the seed entries
    #[must_use]
    pub fn load_logs(&self) -> Vec<LogEntry> {
        match self.load_array(LOGS_KEY) {
            Some(items) => sanitize_logs(items),
            None => self.default_logs(),
        }
    }

    /// Load the chat history, falling back to an empty history
    #[must_use]
    pub fn load_messages(&self) -> Vec<ChatMessage> {
        self.load_array(MESSAGES_KEY)
            .map(sanitize_messages)
            .unwrap_or_default()
    }

    /// Overwrite the stored conversation log
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the database write fails
    pub fn save_logs(&self, logs: &[LogEntry]) -> Result<()> {
        let json = serde_json::to_string(logs)?;
        self.put(LOGS_KEY, &json)
    }

    /// Overwrite the stored chat history
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the database write fails
    pub fn save_messages(&self, messages: &[ChatMessage]) -> Result<()> {
        let json = serde_json::to_string(messages)?;
        self.put(MESSAGES_KEY, &json)
    }

    /// Remove both stored arrays
    ///
    /// # Errors
    ///
    /// Returns error if the database write fails
    pub fn clear(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute(
            "DELETE FROM kv WHERE key IN (?1, ?2)",
            rusqlite::params![LOGS_KEY, MESSAGES_KEY],
        )?;
        Ok(())
    }

    /// Read the raw stored value of a key
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;
        let result = conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace the raw value of a key
    ///
    /// # Errors
    ///
    /// Returns error if the database write fails
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO kv (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Read a key and parse it as a JSON array; any problem yields `None`
    fn load_array(&self, key: &str) -> Option<Vec<Value>> {
        let raw = match self.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read store, using defaults");
                return None;
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => Some(items),
            Ok(_) => {
                tracing::warn!(key, "stored value is not an array, using defaults");
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "stored value is not valid JSON, using defaults");
                None
            }
        }
    }
}

/// Sanitize loaded log entries, keeping ids unique
fn sanitize_logs(items: Vec<Value>) -> Vec<LogEntry> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|item| {
            let mut entry = sanitize_log(item);
            if !seen.insert(entry.id.clone()) {
                entry.id = Uuid::new_v4().to_string();
                seen.insert(entry.id.clone());
            }
            entry
        })
        .collect()
}

fn sanitize_log(item: &Value) -> LogEntry {
    let id = item
        .get("id")
        .and_then(scalar_to_string)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let timestamp = item
        .get("timestamp")
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    let category = item
        .get("category")
        .or_else(|| item.get("type"))
        .and_then(Value::as_str)
        .and_then(LogCategory::parse)
        .unwrap_or_default();

    let text = item.get("text").map(coerce_text).unwrap_or_default();

    LogEntry {
        id,
        timestamp,
        category,
        text,
    }
}

/// Sanitize loaded messages, dropping those left without content
fn sanitize_messages(items: Vec<Value>) -> Vec<ChatMessage> {
    items
        .iter()
        .filter_map(|item| {
            let role = item
                .get("role")
                .and_then(Value::as_str)
                .and_then(ChatRole::parse)
                .unwrap_or(ChatRole::User);
            let content = item.get("content").map(coerce_text).unwrap_or_default();
            ChatMessage::new(role, content)
        })
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// RFC 3339 strings or epoch milliseconds
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store() -> Store {
        Store::in_memory().unwrap()
    }

    #[test]
    fn test_missing_keys_yield_defaults() {
        let store = store();

        let logs = store.load_logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].text, BOOT_MESSAGE);
        assert_eq!(logs[1].text, "Aguardando wake word \"Jarvis\"...");
        assert!(logs.iter().all(|l| l.category == LogCategory::System));
        assert_ne!(logs[0].id, logs[1].id);

        assert!(store.load_messages().is_empty());
    }

    #[test]
    fn test_seed_quotes_configured_wake_word() {
        let store = store().with_wake_word("friday");
        assert_eq!(store.load_logs()[1].text, "Aguardando wake word \"Friday\"...");
    }

    #[test]
    fn test_corrupt_values_yield_defaults() {
        let store = store();
        store.put(LOGS_KEY, "{not json").unwrap();
        store.put(MESSAGES_KEY, "{\"role\":\"user\"}").unwrap();

        assert_eq!(store.load_logs().len(), 2);
        assert!(store.load_messages().is_empty());
    }

    #[test]
    fn test_empty_array_is_kept() {
        let store = store();
        store.put(LOGS_KEY, "[]").unwrap();
        assert!(store.load_logs().is_empty());
    }

    #[test]
    fn test_log_entries_sanitized() {
        let store = store();
        let raw = json!([
            {"timestamp": "garbage", "category": "weird", "text": 42},
            {"id": 7, "timestamp": 1_700_000_000_000_i64, "type": "jarvis", "text": "olá"},
            {"id": "dup", "category": "user", "text": null},
            {"id": "dup", "category": "user", "text": "segundo"}
        ]);
        store.put(LOGS_KEY, &raw.to_string()).unwrap();

        let logs = store.load_logs();
        assert_eq!(logs.len(), 4);

        assert!(!logs[0].id.is_empty());
        assert_eq!(logs[0].category, LogCategory::System);
        assert_eq!(logs[0].text, "42");

        assert_eq!(logs[1].id, "7");
        assert_eq!(logs[1].category, LogCategory::Assistant);
        assert_eq!(logs[1].timestamp.timestamp_millis(), 1_700_000_000_000);

        assert_eq!(logs[2].id, "dup");
        assert_eq!(logs[2].text, "");
        assert_ne!(logs[3].id, "dup");
    }

    #[test]
    fn test_messages_sanitized() {
        let store = store();
        let raw = json!([
            {"role": "user", "content": "que horas são"},
            {"role": "assistant", "content": ""},
            {"role": "narrator", "content": "texto"},
            {"content": 3.5},
            "not an object"
        ]);
        store.put(MESSAGES_KEY, &raw.to_string()).unwrap();

        let messages = store.load_messages();
        assert_eq!(
            messages,
            vec![
                ChatMessage::user("que horas são").unwrap(),
                ChatMessage::user("texto").unwrap(),
                ChatMessage::user("3.5").unwrap(),
            ]
        );
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = store();
        let logs = vec![
            LogEntry::system("boot"),
            LogEntry::new(LogCategory::User, "que horas são"),
            LogEntry::new(LogCategory::Assistant, "São dez horas."),
        ];
        let messages = vec![
            ChatMessage::user("que horas são").unwrap(),
            ChatMessage::assistant("São dez horas.").unwrap(),
        ];

        store.save_logs(&logs).unwrap();
        store.save_messages(&messages).unwrap();

        assert_eq!(store.load_logs(), logs);
        assert_eq!(store.load_messages(), messages);
    }

    #[test]
    fn test_save_overwrites_and_clear() {
        let store = store();
        store.save_logs(&[LogEntry::system("one")]).unwrap();
        store.save_logs(&[LogEntry::system("two")]).unwrap();
        assert_eq!(store.load_logs()[0].text, "two");

        store.clear().unwrap();
        assert_eq!(store.get(LOGS_KEY).unwrap(), None);
        assert_eq!(store.load_logs()[0].text, BOOT_MESSAGE);
    }

    #[test]
    fn test_reopen_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jarvis.db");

        let first = Store::open(&path).unwrap();
        first
            .save_messages(&[ChatMessage::user("lembre disso").unwrap()])
            .unwrap();
        drop(first);

        let second = Store::open(&path).unwrap();
        assert_eq!(second.load_messages()[0].content, "lembre disso");
    }
}
