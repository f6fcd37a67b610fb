use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};

/// Named-slot key-value storage. Each slot holds one text blob that is
/// replaced wholesale on every write.
pub trait SlotStorage {
    fn get(&self, slot: &str) -> StoreResult<Option<String>>;
    fn set(&mut self, slot: &str, value: &str) -> StoreResult<()>;
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        tracing::debug!(path = %path.display(), "opened slot database");
        Ok(db)
    }

    pub fn default_path() -> PathBuf {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "placement-tracker") {
            proj_dirs.data_dir().join("tracker.db")
        } else {
            PathBuf::from("tracker.db")
        }
    }

    fn init(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS slots (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }
}

impl SlotStorage for Database {
    fn get(&self, slot: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM slots WHERE name = ?1", [slot], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, slot: &str, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO slots (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![slot, value],
        )?;
        Ok(())
    }
}

/// In-process storage. Nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    slots: HashMap<String, String>,
    fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `set` fail, like a full quota.
    #[cfg(test)]
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl SlotStorage for MemoryStorage {
    fn get(&self, slot: &str) -> StoreResult<Option<String>> {
        Ok(self.slots.get(slot).cloned())
    }

    fn set(&mut self, slot: &str, value: &str) -> StoreResult<()> {
        if self.fail_writes {
            return Err(StoreError::Storage(format!("quota exceeded writing slot '{}'", slot)));
        }
        self.slots.insert(slot.to_string(), value.to_string());
        Ok(())
    }
}
