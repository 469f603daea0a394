//! SQLite-backed snapshot store.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use diskstrata_core::{
    FolderNode, NewFolderNode, NodeId, Scan, ScanId, ScanStatus, Settings,
};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::debug;

use crate::SnapshotStore;
use crate::error::{StoreError, StoreResult};

/// Schema version written to `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 2;

const SCAN_COLUMNS: &str = "id, start_time, end_time, status, error_message, \
                            folders_scanned, files_scanned, total_bytes";

const NODE_COLUMNS: &str =
    "id, path, name, size_bytes, file_count, last_scanned, parent_id, scan_id";

/// Snapshot store persisted in a single SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let store = Self::from_connection(Connection::open(path)?)?;
        debug!("Opened snapshot database at {}", path.display());
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        configure_pragmas(&conn)?;
        migrate_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn configure_pragmas(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn migrate_schema(conn: &Connection) -> StoreResult<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(StoreError::Corrupt(format!(
            "database schema version {version} is newer than supported {SCHEMA_VERSION}"
        )));
    }
    if version == 1 {
        // Version 1 kept paths as text; compare them as bytes from now on.
        conn.execute_batch(
            "UPDATE folder_nodes SET path = CAST(path AS BLOB) WHERE typeof(path) = 'text';
             UPDATE settings SET scan_root_path = CAST(scan_root_path AS BLOB)
                 WHERE typeof(scan_root_path) = 'text';",
        )?;
        debug!("Upgraded SQLite schema from version 1");
    }
    conn.execute_batch(include_str!("schema.sql"))?;
    debug!("SQLite schema initialized (version {SCHEMA_VERSION})");
    Ok(())
}

fn encode_time(time: &DateTime<Utc>) -> String {
    // Fixed-width UTC text sorts the same way as the timestamps themselves.
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {text:?}: {e}")))
}

fn decode_optional_time(text: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    text.as_deref().map(decode_time).transpose()
}

/// Raw bytes of a path, so names that are not UTF-8 stay distinct.
#[cfg(unix)]
fn encode_path(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
fn decode_path(bytes: Vec<u8>) -> StoreResult<PathBuf> {
    use std::os::unix::ffi::OsStringExt;
    Ok(PathBuf::from(OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn encode_path(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(not(unix))]
fn decode_path(bytes: Vec<u8>) -> StoreResult<PathBuf> {
    String::from_utf8(bytes)
        .map(|text| PathBuf::from(OsString::from(text)))
        .map_err(|e| StoreError::Corrupt(format!("bad path bytes: {e}")))
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Raw `scans` row, decoded outside the rusqlite callback.
struct ScanRow {
    id: i64,
    start_time: String,
    end_time: Option<String>,
    status: String,
    error_message: Option<String>,
    folders_scanned: i64,
    files_scanned: i64,
    total_bytes: i64,
}

impl ScanRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            start_time: row.get(1)?,
            end_time: row.get(2)?,
            status: row.get(3)?,
            error_message: row.get(4)?,
            folders_scanned: row.get(5)?,
            files_scanned: row.get(6)?,
            total_bytes: row.get(7)?,
        })
    }

    fn into_scan(self) -> StoreResult<Scan> {
        let status: ScanStatus = self
            .status
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("unknown scan status {:?}", self.status)))?;
        Ok(Scan {
            id: ScanId::new(from_db(self.id)),
            start_time: decode_time(&self.start_time)?,
            end_time: decode_optional_time(self.end_time)?,
            status,
            error_message: self.error_message,
            folders_scanned: from_db(self.folders_scanned),
            files_scanned: from_db(self.files_scanned),
            total_bytes: from_db(self.total_bytes),
        })
    }
}

/// Raw `folder_nodes` row.
struct NodeRow {
    id: i64,
    path: Vec<u8>,
    name: String,
    size_bytes: i64,
    file_count: i64,
    last_scanned: String,
    parent_id: Option<i64>,
    scan_id: i64,
}

impl NodeRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            path: row.get(1)?,
            name: row.get(2)?,
            size_bytes: row.get(3)?,
            file_count: row.get(4)?,
            last_scanned: row.get(5)?,
            parent_id: row.get(6)?,
            scan_id: row.get(7)?,
        })
    }

    fn into_node(self) -> StoreResult<FolderNode> {
        Ok(FolderNode {
            id: NodeId::new(from_db(self.id)),
            path: decode_path(self.path)?,
            name: self.name.into(),
            size_bytes: from_db(self.size_bytes),
            file_count: from_db(self.file_count),
            last_scanned: decode_time(&self.last_scanned)?,
            parent_id: self.parent_id.map(|id| NodeId::new(from_db(id))),
            scan_id: ScanId::new(from_db(self.scan_id)),
        })
    }
}

fn collect_nodes(rows: Vec<NodeRow>) -> StoreResult<Vec<FolderNode>> {
    rows.into_iter().map(NodeRow::into_node).collect()
}

impl SnapshotStore for SqliteStore {
    fn create_scan(&self, start_time: DateTime<Utc>, status: ScanStatus) -> StoreResult<Scan> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO scans (start_time, status) VALUES (?1, ?2)",
            params![encode_time(&start_time), status.as_ref()],
        )?;
        let id = ScanId::new(from_db(conn.last_insert_rowid()));
        debug!("Created scan {id} ({status})");
        Ok(Scan::new(id, start_time, status))
    }

    fn update_scan(&self, scan: &Scan) -> StoreResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE scans SET start_time = ?1, end_time = ?2, status = ?3, error_message = ?4, \
             folders_scanned = ?5, files_scanned = ?6, total_bytes = ?7 WHERE id = ?8",
            params![
                encode_time(&scan.start_time),
                scan.end_time.as_ref().map(encode_time),
                scan.status.as_ref(),
                scan.error_message,
                to_db(scan.folders_scanned),
                to_db(scan.files_scanned),
                to_db(scan.total_bytes),
                to_db(scan.id.0),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::ScanNotFound(scan.id));
        }
        Ok(())
    }

    fn delete_scan(&self, id: ScanId) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let nodes = tx.execute("DELETE FROM folder_nodes WHERE scan_id = ?1", params![to_db(id.0)])?;
        let scans = tx.execute("DELETE FROM scans WHERE id = ?1", params![to_db(id.0)])?;
        tx.commit()?;
        debug!("Deleted scan {id} with {nodes} folder nodes");
        Ok(scans > 0)
    }

    fn get_scan(&self, id: ScanId) -> StoreResult<Option<Scan>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = ?1"),
                params![to_db(id.0)],
                ScanRow::read,
            )
            .optional()?;
        row.map(ScanRow::into_scan).transpose()
    }

    fn list_scans(&self, limit: Option<usize>) -> StoreResult<Vec<Scan>> {
        let conn = self.conn()?;
        // SQLite treats a negative limit as "no limit".
        let limit = limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans ORDER BY start_time DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit], ScanRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ScanRow::into_scan).collect()
    }

    fn latest_scan_with_status(&self, status: ScanStatus) -> StoreResult<Option<Scan>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {SCAN_COLUMNS} FROM scans WHERE status = ?1 \
                     ORDER BY start_time DESC, id DESC LIMIT 1"
                ),
                params![status.as_ref()],
                ScanRow::read,
            )
            .optional()?;
        row.map(ScanRow::into_scan).transpose()
    }

    fn scans_with_status(&self, statuses: &[ScanStatus]) -> StoreResult<Vec<Scan>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE status IN ({placeholders}) \
             ORDER BY start_time DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map(
                params_from_iter(statuses.iter().map(AsRef::<str>::as_ref)),
                ScanRow::read,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ScanRow::into_scan).collect()
    }

    fn add_node(&self, node: NewFolderNode) -> StoreResult<FolderNode> {
        let conn = self.conn()?;
        let scan_id = to_db(node.scan_id.0);
        let path = encode_path(&node.path);

        let scan_exists: Option<i64> = conn
            .query_row("SELECT 1 FROM scans WHERE id = ?1", params![scan_id], |row| row.get(0))
            .optional()?;
        if scan_exists.is_none() {
            return Err(StoreError::ScanNotFound(node.scan_id));
        }

        if let Some(parent) = node.parent_id {
            let parent_scan: Option<i64> = conn
                .query_row(
                    "SELECT scan_id FROM folder_nodes WHERE id = ?1",
                    params![to_db(parent.0)],
                    |row| row.get(0),
                )
                .optional()?;
            match parent_scan {
                None => return Err(StoreError::NodeNotFound(parent)),
                Some(owner) if owner != scan_id => {
                    return Err(StoreError::ForeignParent {
                        parent,
                        scan: node.scan_id,
                    });
                }
                Some(_) => {}
            }
        }

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM folder_nodes WHERE path = ?1 AND scan_id = ?2",
                params![path, scan_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::DuplicateNode {
                path: node.path,
                scan: node.scan_id,
            });
        }

        conn.execute(
            "INSERT INTO folder_nodes \
             (path, name, size_bytes, file_count, last_scanned, parent_id, scan_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                path,
                node.name.as_str(),
                to_db(node.size_bytes),
                to_db(node.file_count),
                encode_time(&node.last_scanned),
                node.parent_id.map(|p| to_db(p.0)),
                scan_id,
            ],
        )?;
        let id = NodeId::new(from_db(conn.last_insert_rowid()));
        Ok(node.with_id(id))
    }

    fn update_node(&self, node: &FolderNode) -> StoreResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE folder_nodes SET size_bytes = ?1, file_count = ?2, last_scanned = ?3 \
             WHERE id = ?4",
            params![
                to_db(node.size_bytes),
                to_db(node.file_count),
                encode_time(&node.last_scanned),
                to_db(node.id.0),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NodeNotFound(node.id));
        }
        Ok(())
    }

    fn get_node(&self, id: NodeId) -> StoreResult<Option<FolderNode>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM folder_nodes WHERE id = ?1"),
                params![to_db(id.0)],
                NodeRow::read,
            )
            .optional()?;
        row.map(NodeRow::into_node).transpose()
    }

    fn get_node_by_path(&self, scan: ScanId, path: &Path) -> StoreResult<Option<FolderNode>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {NODE_COLUMNS} FROM folder_nodes WHERE scan_id = ?1 AND path = ?2"
                ),
                params![to_db(scan.0), encode_path(path)],
                NodeRow::read,
            )
            .optional()?;
        row.map(NodeRow::into_node).transpose()
    }

    fn get_nodes(&self, scan: ScanId, parent: Option<NodeId>) -> StoreResult<Vec<FolderNode>> {
        let conn = self.conn()?;
        let rows = match parent {
            Some(parent) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {NODE_COLUMNS} FROM folder_nodes \
                     WHERE scan_id = ?1 AND parent_id = ?2 ORDER BY id"
                ))?;
                stmt.query_map(params![to_db(scan.0), to_db(parent.0)], NodeRow::read)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {NODE_COLUMNS} FROM folder_nodes \
                     WHERE scan_id = ?1 AND parent_id IS NULL ORDER BY id"
                ))?;
                stmt.query_map(params![to_db(scan.0)], NodeRow::read)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        collect_nodes(rows)
    }

    fn count_nodes(&self, scan: ScanId) -> StoreResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM folder_nodes WHERE scan_id = ?1",
            params![to_db(scan.0)],
            |row| row.get(0),
        )?;
        Ok(from_db(count))
    }

    fn get_settings(&self) -> StoreResult<Option<Settings>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT scan_interval_hours, auto_scan_enabled, scan_root_path, \
                 last_scan_time, next_scan_time FROM settings WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((interval, enabled, root, last, next)) = row else {
            return Ok(None);
        };
        Ok(Some(Settings {
            scan_interval_hours: u32::try_from(interval)
                .map_err(|_| StoreError::Corrupt(format!("bad scan interval {interval}")))?,
            auto_scan_enabled: enabled,
            scan_root_path: decode_path(root)?,
            last_scan_time: decode_optional_time(last)?,
            next_scan_time: decode_optional_time(next)?,
        }))
    }

    fn update_settings(&self, settings: &Settings) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings \
             (id, scan_interval_hours, auto_scan_enabled, scan_root_path, last_scan_time, next_scan_time) \
             VALUES (1, ?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (id) DO UPDATE SET \
             scan_interval_hours = excluded.scan_interval_hours, \
             auto_scan_enabled = excluded.auto_scan_enabled, \
             scan_root_path = excluded.scan_root_path, \
             last_scan_time = excluded.last_scan_time, \
             next_scan_time = excluded.next_scan_time",
            params![
                i64::from(settings.scan_interval_hours),
                settings.auto_scan_enabled,
                encode_path(&settings.scan_root_path),
                settings.last_scan_time.as_ref().map(encode_time),
                settings.next_scan_time.as_ref().map(encode_time),
            ],
        )?;
        Ok(())
    }
}
