use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::config::data_dir;
use crate::error::{Result, SafeZoneError};
use crate::model::{ActorId, ClaimRecord, Position};

const REFERENCE_START_KEY: &str = "window_started_at";

// ---------------------------------------------------------------------------
// Helper: parse RFC 3339 timestamps from SQLite TEXT columns
// ---------------------------------------------------------------------------

fn parse_dt(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}

fn parse_dt_opt(column: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|v| parse_dt(column, &v)).transpose()
}

fn row_to_claim(row: &Row<'_>) -> rusqlite::Result<ClaimRecord> {
    Ok(ClaimRecord {
        group: row.get(0)?,
        zone_id: row.get(1)?,
        claimed_by: ActorId(row.get::<_, i64>(2)? as u64),
        position: Position::new(row.get(3)?, row.get(4)?, row.get(5)?),
        radius: row.get(6)?,
        claimed_at: parse_dt(7, &row.get::<_, String>(7)?)?,
        expires_at: parse_dt_opt(8, row.get(8)?)?,
        zone_erased: row.get(9)?,
    })
}

const CLAIM_COLUMNS: &str = "group_tag, zone_id, claimed_by, pos_x, pos_y, pos_z, radius, \
                             claimed_at, expires_at, zone_erased";

// ---------------------------------------------------------------------------
// ClaimStore
// ---------------------------------------------------------------------------

/// Durable claim history, so a restart does not hand every group a second zone.
pub struct ClaimStore {
    conn: Connection,
    lock_dir: Option<PathBuf>,
}

impl ClaimStore {
    /// Open (or create) the claim database at the given file path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA busy_timeout=5000;",
        )?;
        let lock_dir = path.parent().map(|p| p.join("locks"));
        let store = Self { conn, lock_dir };
        store.create_tables()?;
        Ok(store)
    }

    /// Open an in-memory database (tests and dry runs).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            lock_dir: None,
        };
        store.create_tables()?;
        Ok(store)
    }

    /// Convenience: open `<root>/.clanzone/claims.db`.
    pub fn from_root(root: &Path) -> Result<Self> {
        let dir = data_dir(root);
        fs::create_dir_all(&dir)?;
        Self::open(&dir.join("claims.db"))
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS claims (
                group_tag TEXT PRIMARY KEY,
                zone_id TEXT NOT NULL,
                claimed_by INTEGER NOT NULL,
                pos_x REAL NOT NULL,
                pos_y REAL NOT NULL,
                pos_z REAL NOT NULL,
                radius REAL NOT NULL,
                claimed_at TEXT NOT NULL,
                expires_at TEXT,
                zone_erased INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Directory for per-group lock files; `None` for in-memory stores.
    pub fn lock_dir(&self) -> Option<&Path> {
        self.lock_dir.as_deref()
    }

    /// All claims, ordered by claim time.
    pub fn load_all(&self) -> Result<Vec<ClaimRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims ORDER BY claimed_at, group_tag"
        ))?;
        let rows = stmt.query_map([], row_to_claim)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn get(&self, group: &str) -> Result<Option<ClaimRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE group_tag = ?1"
        ))?;
        stmt.query_row(params![group], row_to_claim)
            .optional()
            .map_err(Into::into)
    }

    /// Record a claim. Returns `false` if the group already had one.
    pub fn insert(&self, claim: &ClaimRecord) -> Result<bool> {
        let changes = self.conn.execute(
            &format!(
                "INSERT INTO claims ({CLAIM_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(group_tag) DO NOTHING"
            ),
            params![
                claim.group,
                claim.zone_id,
                claim.claimed_by.0 as i64,
                claim.position.x,
                claim.position.y,
                claim.position.z,
                claim.radius,
                claim.claimed_at.to_rfc3339(),
                claim.expires_at.map(|dt| dt.to_rfc3339()),
                claim.zone_erased,
            ],
        )?;
        Ok(changes == 1)
    }

    pub fn remove(&self, group: &str) -> Result<ClaimRecord> {
        let claim = self
            .get(group)?
            .ok_or_else(|| SafeZoneError::ClaimNotFound(group.to_string()))?;
        self.conn
            .execute("DELETE FROM claims WHERE group_tag = ?1", params![group])?;
        Ok(claim)
    }

    pub fn mark_erased(&self, group: &str) -> Result<()> {
        let changes = self.conn.execute(
            "UPDATE claims SET zone_erased = 1 WHERE group_tag = ?1",
            params![group],
        )?;
        if changes == 0 {
            return Err(SafeZoneError::ClaimNotFound(group.to_string()));
        }
        Ok(())
    }

    /// The persisted activation-window start, recording `now` on first use.
    pub fn reference_start_or_init(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO NOTHING",
            params![REFERENCE_START_KEY, now.to_rfc3339()],
        )?;
        let stored = self.conn.query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![REFERENCE_START_KEY],
            |row| parse_dt(0, &row.get::<_, String>(0)?),
        )?;
        Ok(stored)
    }

    /// Forget the stored window start so the next start opens a new window.
    pub fn reset_reference_start(&self) -> Result<()> {
        self.conn.execute(
            "DELETE FROM meta WHERE key = ?1",
            params![REFERENCE_START_KEY],
        )?;
        Ok(())
    }
}
