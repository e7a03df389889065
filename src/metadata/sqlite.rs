//! SQLite metadata store
//!
//! One row per path. Size reservations run inside an immediate transaction,
//! so appends stay serialized even when several daemons share one file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{child_prefix, first_level_name, grown_size};
use super::{DirEntry, ExtendedDirEntry, MetadataEntry, MetadataStore, TOMBSTONE};
use crate::error::{Error, Result};

const COLUMNS: &str =
    "mode, size, blocks, target_path, uid, gid, link_count, atime, mtime, ctime";

/// Persistent metadata store backed by SQLite
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open the metadata database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init(conn)
    }

    /// Database that lives only as long as this store
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                path TEXT PRIMARY KEY,
                mode INTEGER NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                blocks INTEGER NOT NULL DEFAULT 0,
                target_path TEXT NOT NULL DEFAULT '',
                uid INTEGER NOT NULL,
                gid INTEGER NOT NULL,
                link_count INTEGER NOT NULL DEFAULT 1,
                atime INTEGER NOT NULL,
                mtime INTEGER NOT NULL,
                ctime INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn upsert(conn: &Connection, path: &str, entry: &MetadataEntry) -> Result<()> {
        conn.execute(
            &format!(
                r#"
                INSERT INTO metadata (path, {COLUMNS})
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(path) DO UPDATE SET
                    mode = excluded.mode, size = excluded.size, blocks = excluded.blocks,
                    target_path = excluded.target_path, uid = excluded.uid, gid = excluded.gid,
                    link_count = excluded.link_count, atime = excluded.atime,
                    mtime = excluded.mtime, ctime = excluded.ctime
                "#
            ),
            params![
                path,
                entry.mode,
                entry.size as i64,
                entry.blocks,
                entry.target_path,
                entry.uid,
                entry.gid,
                entry.link_count,
                entry.atime,
                entry.mtime,
                entry.ctime
            ],
        )?;
        Ok(())
    }

    fn children(&self, dir: &str) -> Result<Vec<(String, MetadataEntry)>> {
        let prefix = child_prefix(dir);
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT path, {COLUMNS} FROM metadata
             WHERE substr(path, 1, length(?1)) = ?1 AND blocks != ?2
             ORDER BY path"
        ))?;
        let rows = stmt.query_map(params![prefix, TOMBSTONE], |row| {
            Ok((row.get::<_, String>(0)?, entry_from_row(row, 1)?))
        })?;

        let mut children = Vec::new();
        for row in rows {
            let (path, entry) = row?;
            if let Some(name) = first_level_name(&prefix, &path) {
                children.push((name.to_string(), entry));
            }
        }
        Ok(children)
    }
}

fn entry_from_row(row: &Row<'_>, first: usize) -> rusqlite::Result<MetadataEntry> {
    Ok(MetadataEntry {
        mode: row.get(first)?,
        size: row.get::<_, i64>(first + 1)? as u64,
        blocks: row.get(first + 2)?,
        target_path: row.get(first + 3)?,
        uid: row.get(first + 4)?,
        gid: row.get(first + 5)?,
        link_count: row.get(first + 6)?,
        atime: row.get(first + 7)?,
        mtime: row.get(first + 8)?,
        ctime: row.get(first + 9)?,
    })
}

impl MetadataStore for SqliteStore {
    fn get(&self, path: &str) -> Result<MetadataEntry> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!("SELECT {COLUMNS} FROM metadata WHERE path = ?1"),
            params![path],
            |row| entry_from_row(row, 0),
        );

        match result {
            Ok(entry) => Ok(entry),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, path: &str, entry: &MetadataEntry) -> Result<()> {
        Self::upsert(&self.conn(), path, entry)
    }

    fn put_if_absent(&self, path: &str, entry: &MetadataEntry) -> Result<()> {
        let conn = self.conn();
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO metadata (path, {COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                path,
                entry.mode,
                entry.size as i64,
                entry.blocks,
                entry.target_path,
                entry.uid,
                entry.gid,
                entry.link_count,
                entry.atime,
                entry.mtime,
                entry.ctime
            ],
        )?;

        if inserted == 0 {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let removed = self
            .conn()
            .execute("DELETE FROM metadata WHERE path = ?1", params![path])?;
        if removed == 0 {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let found = self
            .conn()
            .query_row("SELECT 1 FROM metadata WHERE path = ?1", params![path], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn update(&self, old_path: &str, new_path: &str, entry: &MetadataEntry) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = if old_path != new_path {
            tx.execute("DELETE FROM metadata WHERE path = ?1", params![old_path])?
        } else {
            tx.query_row("SELECT 1 FROM metadata WHERE path = ?1", params![old_path], |_| Ok(()))
                .optional()?
                .map_or(0, |_| 1)
        };
        if removed == 0 {
            return Err(Error::NotFound(old_path.to_string()));
        }

        Self::upsert(&tx, new_path, entry)?;
        tx.commit()?;
        Ok(())
    }

    fn increase_size(
        &self,
        path: &str,
        io_size: u64,
        offset: u64,
        append: bool,
    ) -> Result<Option<u64>> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<i64> = tx
            .query_row("SELECT size FROM metadata WHERE path = ?1", params![path], |row| row.get(0))
            .optional()?;
        let current = current.ok_or_else(|| Error::NotFound(path.to_string()))? as u64;

        let (size, reserved) = grown_size(current, io_size, offset, append);
        tx.execute(
            "UPDATE metadata SET size = ?2 WHERE path = ?1",
            params![path, size as i64],
        )?;
        tx.commit()?;

        Ok(Some(reserved))
    }

    fn decrease_size(&self, path: &str, size: u64) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE metadata SET size = ?2 WHERE path = ?1",
            params![path, size as i64],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(())
    }

    fn get_dirents(&self, dir: &str) -> Result<Vec<DirEntry>> {
        Ok(self
            .children(dir)?
            .into_iter()
            .map(|(name, entry)| DirEntry {
                name,
                file_type: entry.file_type(),
            })
            .collect())
    }

    fn get_dirents_extended(&self, dir: &str) -> Result<Vec<ExtendedDirEntry>> {
        Ok(self
            .children(dir)?
            .into_iter()
            .map(|(name, entry)| ExtendedDirEntry {
                name,
                file_type: entry.file_type(),
                size: entry.size,
                ctime: entry.ctime,
            })
            .collect())
    }
}
