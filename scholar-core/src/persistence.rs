//! Persistence for agent memory stores.
//!
//! Two targets share one serialized form, the [`MemoryDocument`]:
//!
//! - **JSON files**: one document per agent, written through a temporary
//!   file in the same directory and renamed over the target.
//! - **SQLite snapshots**: every agent's document in one database:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS agent_memories (
//!     agent_id   TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! JSON inside a BLOB column keeps the schema stable when record fields
//! change; the optional CRC-32 checksum detects save corruption.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{CoreError, Result};
use crate::memory::MemoryRecord;
use crate::types::{AgentId, SimTime};

/// Serialized form of one agent's memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocument {
    /// The agent the memories belong to.
    pub owner: AgentId,
    /// Next id the store will hand out.
    pub next_id: u64,
    /// Store clock at save time.
    pub clock: SimTime,
    /// Short-term buffer, oldest first.
    pub short_term: Vec<MemoryRecord>,
    /// Long-term archive, oldest first.
    pub long_term: Vec<MemoryRecord>,
}

impl MemoryDocument {
    /// Records across both tiers.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.short_term.len() + self.long_term.len()
    }
}

/// Conventional file for `agent` inside `directory`: `<directory>/<agent>.json`.
#[must_use]
pub fn document_path(directory: &Path, agent: &AgentId) -> PathBuf {
    directory.join(format!("{agent}.json"))
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

/// Atomically write `document` to `path` as pretty JSON.
///
/// # Errors
/// [`CoreError::Serialization`] or [`CoreError::Io`]. The target is never
/// left partially written.
pub fn write_document(path: &Path, document: &MemoryDocument) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(document).map_err(|e| CoreError::Serialization(e.to_string()))?;
    write_atomic(path, &bytes)
}

/// Read a document from `path`; `Ok(None)` if the file does not exist.
///
/// # Errors
/// [`CoreError::Io`] for other read failures, [`CoreError::Serialization`]
/// for malformed content.
pub fn read_document(path: &Path) -> Result<Option<MemoryDocument>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let document = serde_json::from_slice(&bytes).map_err(|e| CoreError::Serialization(e.to_string()))?;
    Ok(Some(document))
}

/// Write `bytes` to a uniquely named sibling of `path`, then rename it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let file_name = path
        .file_name()
        .map_or_else(|| "memory".to_string(), |n| n.to_string_lossy().into_owned());
    let tmp = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()
    })()
    .and_then(|()| fs::rename(&tmp, path));

    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            if cleanup.kind() != ErrorKind::NotFound {
                warn!(tmp = %tmp.display(), error = %cleanup, "Could not remove temporary save file");
            }
        }
        return Err(e.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    format!("{:08x}", !crc)
}

// ---------------------------------------------------------------------------
// SnapshotDb
// ---------------------------------------------------------------------------

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS agent_memories (
    agent_id   TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

/// SQLite database holding a memory snapshot for every agent in a run.
pub struct SnapshotDb {
    conn: Connection,
    checksum_enabled: bool,
    db_path: PathBuf,
}

impl std::fmt::Debug for SnapshotDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotDb")
            .field("db_path", &self.db_path)
            .field("checksum_enabled", &self.checksum_enabled)
            .finish_non_exhaustive()
    }
}

impl SnapshotDb {
    /// Open (or create) the database at `path`, creating parent directories.
    ///
    /// # Errors
    /// [`CoreError::Io`] or [`CoreError::Database`].
    pub fn open(path: impl AsRef<Path>, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), "Memory snapshot database opened");
        Ok(Self {
            conn,
            checksum_enabled: config.checksum_enabled,
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    /// [`CoreError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            checksum_enabled: config.checksum_enabled,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Upsert one agent's document.
    ///
    /// # Errors
    /// [`CoreError::Serialization`] or [`CoreError::Database`].
    pub fn save_document(&self, document: &MemoryDocument) -> Result<()> {
        let start = Instant::now();
        let json = serde_json::to_vec(document).map_err(|e| CoreError::Serialization(e.to_string()))?;
        let checksum = self.checksum_enabled.then(|| crc32_hex(&json));
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO agent_memories (agent_id, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(agent_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![document.owner.as_str(), json, now, checksum],
        )?;

        debug!(
            agent = %document.owner,
            memories = document.total_count(),
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved memory snapshot"
        );
        Ok(())
    }

    /// Load one agent's document; `None` if it was never saved.
    ///
    /// A checksum mismatch is logged but the data is still decoded.
    ///
    /// # Errors
    /// [`CoreError::Serialization`] or [`CoreError::Database`].
    pub fn load_document(&self, agent: &AgentId) -> Result<Option<MemoryDocument>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT data, checksum FROM agent_memories WHERE agent_id = ?1")?;
        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![agent.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(
                        agent = %agent,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch, possible save corruption"
                    );
                }
            }
        }

        let document = serde_json::from_slice(&data).map_err(|e| CoreError::Serialization(e.to_string()))?;
        Ok(Some(document))
    }

    /// Every agent with a stored snapshot, in id order.
    ///
    /// # Errors
    /// [`CoreError::Database`] on SQLite failures.
    pub fn list_agents(&self) -> Result<Vec<AgentId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT agent_id FROM agent_memories ORDER BY agent_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut agents = Vec::new();
        for row in rows {
            agents.push(AgentId::new(row?));
        }
        Ok(agents)
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.db_path
    }
}
