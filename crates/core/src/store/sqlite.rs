//! # SQLite Catalog Store
//!
//! Local single-process backend. Records live in the `catalog_entries`
//! table, scoped by collection. Writes made through this handle notify its
//! subscribers; writes by other processes are not observed.

use super::{CatalogStore, SnapshotFeed, Subscription};
use crate::error::StoreError;
use crate::model::{ProductRecord, Snapshot};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    collection: String,
    feed: SnapshotFeed,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open_at<P: AsRef<Path>>(path: P, collection: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn, collection)
    }

    /// Throwaway database, mostly for tests
    pub fn open_in_memory(collection: &str) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, collection)
    }

    fn from_connection(conn: Connection, collection: &str) -> Result<Self, StoreError> {
        run_migrations(&conn)?;
        let initial = load_collection(&conn, collection)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collection: collection.to_string(),
            feed: SnapshotFeed::new(initial),
        })
    }

    /// Run a statement, then publish the reloaded collection before the
    /// connection is released so subscribers see writes in order
    fn write(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<usize>) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::LockPoisoned("sqlite connection"))?;
        f(&conn)?;
        self.feed.publish(load_collection(&conn, &self.collection)?);
        Ok(())
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if current_version < 1 {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_entries (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                products_name TEXT NOT NULL DEFAULT '',
                products_type TEXT NOT NULL DEFAULT '',
                products_price INTEGER,
                image_url TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
            [],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
    }

    Ok(())
}

fn load_collection(conn: &Connection, collection: &str) -> rusqlite::Result<Snapshot> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, products_name, products_type, products_price, image_url
        FROM catalog_entries
        WHERE collection = ?1
        "#,
    )?;

    let rows = stmt.query_map(params![collection], |row| {
        Ok((
            row.get::<_, String>(0)?,
            ProductRecord {
                name: row.get(1)?,
                product_type: row.get(2)?,
                price: row.get(3)?,
                image_url: row.get(4)?,
            },
        ))
    })?;

    rows.collect()
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn set(&self, id: &str, record: &ProductRecord) -> Result<(), StoreError> {
        self.write(|conn| {
            conn.execute(
                r#"
                INSERT OR REPLACE INTO catalog_entries
                (collection, id, products_name, products_type, products_price, image_url, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    self.collection,
                    id,
                    record.name,
                    record.product_type,
                    record.price,
                    record.image_url,
                    Utc::now().to_rfc3339(),
                ],
            )
        })
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.write(|conn| {
            conn.execute(
                "DELETE FROM catalog_entries WHERE collection = ?1 AND id = ?2",
                params![self.collection, id],
            )
        })
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::LockPoisoned("sqlite connection"))?;
        Ok(load_collection(&conn, &self.collection)?)
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        Ok(self.feed.subscribe())
    }
}
