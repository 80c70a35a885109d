use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::error::StoreError;
use crate::ingest::types::Item;

use super::ItemStore;

const CREATE_ITEMS: &str = "CREATE TABLE IF NOT EXISTS items (
    guid TEXT NOT NULL,
    source TEXT NOT NULL,
    title TEXT NOT NULL,
    link TEXT NOT NULL,
    description TEXT,
    image TEXT,
    seen INTEGER NOT NULL
)";

const INDEXES: [&str; 3] = [
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_items_guid ON items (guid)",
    "CREATE INDEX IF NOT EXISTS idx_items_source ON items (source)",
    "CREATE INDEX IF NOT EXISTS idx_items_seen ON items (seen DESC)",
];

/// SQLite-backed item store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database at `url`, creating the file if needed.
    ///
    /// A single pooled connection is kept open for the life of the store so
    /// `sqlite::memory:` databases survive between queries.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(StoreError::Connect)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(opts)
            .await
            .map_err(StoreError::Connect)?;
        tracing::debug!(url, "sqlite store connected");
        Ok(Self { pool })
    }
}

fn row_to_item(row: &SqliteRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        guid: row.try_get("guid")?,
        source: row.try_get("source")?,
        title: row.try_get("title")?,
        link: row.try_get("link")?,
        description: row.try_get("description")?,
        image: row.try_get("image")?,
        seen_ms: row.try_get("seen")?,
    })
}

#[async_trait::async_trait]
impl ItemStore for SqliteStore {
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_ITEMS)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Index)?;
        for ddl in INDEXES {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(StoreError::Index)?;
        }
        Ok(())
    }

    async fn find_by_guid(&self, guid: &str) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(
            "SELECT guid, source, title, link, description, image, seen FROM items WHERE guid = ?",
        )
        .bind(guid)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        row.as_ref()
            .map(row_to_item)
            .transpose()
            .map_err(StoreError::Query)
    }

    async fn insert(&self, item: &Item) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO items (guid, source, title, link, description, image, seen)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.guid)
        .bind(&item.source)
        .bind(&item.title)
        .bind(&item.link)
        .bind(item.description.as_deref())
        .bind(item.image.as_deref())
        .bind(item.seen_ms)
        .execute(&self.pool)
        .await
        .map_err(|source| StoreError::Insert {
            guid: item.guid.clone(),
            source,
        })?;
        Ok(())
    }

    async fn latest_by_source(&self, source: &str, limit: usize) -> Result<Vec<Item>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT guid, source, title, link, description, image, seen FROM items
             WHERE source = ? ORDER BY seen DESC LIMIT ?",
        )
        .bind(source)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        rows.iter()
            .map(row_to_item)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Query)
    }
}
