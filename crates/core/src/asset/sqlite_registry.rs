//! SQLite-backed asset registry.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{
    Asset, AssetId, AssetPatch, AssetRegistry, MediaCategory, MetadataRecord, NewAsset,
    RegistryError, StreamStatus, STATUS_NEW,
};

const ASSET_COLUMNS: &str = "id, path, mime_type, size_bytes, original_name, status, \
     stream_status, stream_path, stream_folder, thumbnail_path, created_at, updated_at";

/// SQLite-backed asset registry.
pub struct SqliteAssetRegistry {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> RegistryError {
    RegistryError::Database(e.to_string())
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SqliteAssetRegistry {
    /// Open or create the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, RegistryError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory registry (useful for testing).
    pub fn in_memory() -> Result<Self, RegistryError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RegistryError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                original_name TEXT,
                status TEXT NOT NULL,
                stream_status TEXT NOT NULL DEFAULT 'none',
                stream_path TEXT,
                stream_folder TEXT,
                thumbnail_path TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS asset_metadata (
                asset_id INTEGER PRIMARY KEY REFERENCES assets(id),
                document TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_assets_stream_status ON assets(stream_status);
            "#,
        )
        .map_err(db_err)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RegistryError> {
        self.conn
            .lock()
            .map_err(|_| RegistryError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_asset(row: &rusqlite::Row) -> rusqlite::Result<Asset> {
        let size_bytes: i64 = row.get(3)?;
        let stream_status: String = row.get(6)?;
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;

        Ok(Asset {
            id: row.get(0)?,
            path: row.get(1)?,
            mime_type: row.get(2)?,
            size_bytes: size_bytes.max(0) as u64,
            original_name: row.get(4)?,
            status: row.get(5)?,
            stream_status: stream_status.parse().unwrap_or_default(),
            stream_path: row.get(7)?,
            stream_folder: row.get(8)?,
            thumbnail_path: row.get(9)?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn fetch(conn: &Connection, id: AssetId) -> Result<Option<Asset>, RegistryError> {
        conn.query_row(
            &format!("SELECT {} FROM assets WHERE id = ?1", ASSET_COLUMNS),
            params![id],
            Self::row_to_asset,
        )
        .optional()
        .map_err(db_err)
    }
}

impl AssetRegistry for SqliteAssetRegistry {
    fn create(&self, asset: NewAsset) -> Result<Asset, RegistryError> {
        if asset.path.trim().is_empty() {
            return Err(RegistryError::Validation("path is required".to_string()));
        }
        if !MediaCategory::from_mime(&asset.mime_type).is_permitted() {
            return Err(RegistryError::Validation(format!(
                "unsupported MIME type: {}",
                asset.mime_type
            )));
        }

        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO assets (path, mime_type, size_bytes, original_name, status,
                                stream_status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
            params![
                asset.path,
                asset.mime_type,
                asset.size_bytes as i64,
                asset.original_name,
                STATUS_NEW,
                StreamStatus::None.as_str(),
                now,
            ],
        )
        .map_err(db_err)?;

        let id = conn.last_insert_rowid();
        debug!(asset_id = id, mime_type = %asset.mime_type, "Asset created");

        Self::fetch(&conn, id)?.ok_or(RegistryError::NotFound(id))
    }

    fn get(&self, id: AssetId) -> Result<Option<Asset>, RegistryError> {
        let conn = self.lock()?;
        Self::fetch(&conn, id)
    }

    fn update(&self, id: AssetId, patch: AssetPatch) -> Result<Asset, RegistryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let current: Option<String> = tx
            .query_row(
                "SELECT stream_status FROM assets WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        let current: StreamStatus = current
            .ok_or(RegistryError::NotFound(id))?
            .parse()
            .unwrap_or_default();

        if let Some(next) = patch.stream_status {
            if !current.can_transition_to(next) {
                return Err(RegistryError::InvalidTransition {
                    asset_id: id,
                    from: current,
                    to: next,
                });
            }
        }

        if !patch.is_empty() {
            tx.execute(
                r#"
                UPDATE assets SET
                    status = COALESCE(?1, status),
                    thumbnail_path = COALESCE(?2, thumbnail_path),
                    stream_status = COALESCE(?3, stream_status),
                    stream_path = COALESCE(?4, stream_path),
                    stream_folder = COALESCE(?5, stream_folder),
                    updated_at = ?6
                WHERE id = ?7
                "#,
                params![
                    patch.status,
                    patch.thumbnail_path,
                    patch.stream_status.map(|s| s.as_str()),
                    patch.stream_path,
                    patch.stream_folder,
                    Utc::now().to_rfc3339(),
                    id,
                ],
            )
            .map_err(db_err)?;
        }

        let asset = Self::fetch(&tx, id)?.ok_or(RegistryError::NotFound(id))?;
        tx.commit().map_err(db_err)?;

        Ok(asset)
    }

    fn upsert_metadata(
        &self,
        id: AssetId,
        document: serde_json::Value,
    ) -> Result<MetadataRecord, RegistryError> {
        let conn = self.lock()?;

        if Self::fetch(&conn, id)?.is_none() {
            return Err(RegistryError::NotFound(id));
        }

        let now = Utc::now();
        let document_json = serde_json::to_string(&document)
            .map_err(|e| RegistryError::Validation(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO asset_metadata (asset_id, document, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(asset_id) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
            params![id, document_json, now.to_rfc3339()],
        )
        .map_err(db_err)?;

        Ok(MetadataRecord {
            asset_id: id,
            document,
            updated_at: now,
        })
    }

    fn get_metadata(&self, id: AssetId) -> Result<Option<MetadataRecord>, RegistryError> {
        let conn = self.lock()?;

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT document, updated_at FROM asset_metadata WHERE asset_id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        row.map(|(document, updated_at)| {
            let document = serde_json::from_str(&document)
                .map_err(|e| RegistryError::Database(format!("corrupt metadata document: {}", e)))?;
            Ok(MetadataRecord {
                asset_id: id,
                document,
                updated_at: parse_timestamp(&updated_at),
            })
        })
        .transpose()
    }
}
