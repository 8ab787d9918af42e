use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection},
    ConnectOptions, Connection,
};
use std::path::Path;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("History storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),
}

/// One logged prediction.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct HistoryRecord {
    pub id: i64,
    pub filename: String,
    pub label: String,
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

/// A history row without its image bytes, for listings.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct HistorySummary {
    pub id: i64,
    pub filename: String,
    pub label: String,
    pub has_image: bool,
    pub created_at: DateTime<Utc>,
}

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    label TEXT NOT NULL,
    image BLOB,
    created_at TEXT NOT NULL
)";

/// Append-only log of predictions in a single SQLite table.
///
/// Every operation opens its own connection and closes it before returning.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    options: SqliteConnectOptions,
}

impl HistoryStore {
    pub fn new(database_path: impl AsRef<Path>) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .disable_statement_logging();
        Self { options }
    }

    async fn connect(&self) -> Result<SqliteConnection, HistoryError> {
        let conn = self.options.connect().await?;
        Ok(conn)
    }

    pub async fn init(&self) -> Result<(), HistoryError> {
        let mut conn = self.connect().await?;
        sqlx::query(CREATE_TABLE).execute(&mut conn).await?;
        conn.close().await?;
        Ok(())
    }

    #[instrument(skip(self, image))]
    pub async fn append(
        &self,
        filename: &str,
        label: &str,
        image: Option<&[u8]>,
    ) -> Result<i64, HistoryError> {
        let mut conn = self.connect().await?;
        let id = sqlx::query(
            "INSERT INTO history (filename, label, image, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(filename)
        .bind(label)
        .bind(image)
        .bind(Utc::now())
        .execute(&mut conn)
        .await?
        .last_insert_rowid();
        conn.close().await?;

        tracing::debug!("Recorded prediction {} as history row {}", label, id);
        Ok(id)
    }

    /// All records, most recent first.
    pub async fn list_all(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut conn = self.connect().await?;
        let records = sqlx::query_as::<_, HistoryRecord>(
            "SELECT id, filename, label, image, created_at FROM history
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;
        Ok(records)
    }

    /// Same order as [`HistoryStore::list_all`], but only reports whether an
    /// image is stored instead of reading it.
    pub async fn list_summaries(&self) -> Result<Vec<HistorySummary>, HistoryError> {
        let mut conn = self.connect().await?;
        let summaries = sqlx::query_as::<_, HistorySummary>(
            "SELECT id, filename, label, image IS NOT NULL AS has_image, created_at
             FROM history
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;
        Ok(summaries)
    }

    pub async fn get(&self, id: i64) -> Result<Option<HistoryRecord>, HistoryError> {
        let mut conn = self.connect().await?;
        let record = sqlx::query_as::<_, HistoryRecord>(
            "SELECT id, filename, label, image, created_at FROM history WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut conn)
        .await?;
        conn.close().await?;
        Ok(record)
    }

    /// Removes the record if present. Unknown ids are not an error.
    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, id: i64) -> Result<(), HistoryError> {
        let mut conn = self.connect().await?;
        let removed = sqlx::query("DELETE FROM history WHERE id = ?")
            .bind(id)
            .execute(&mut conn)
            .await?
            .rows_affected();
        conn.close().await?;

        if removed == 0 {
            tracing::debug!("No history row {} to delete", id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    async fn store() -> (TempDir, HistoryStore) {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("riwayat.db"));
        store.init().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_append_then_list() {
        let (_dir, store) = store().await;
        let before = Utc::now();

        let id = store.append("a.jpg", "fresh", None).await.unwrap();
        let records = store.list_all().await.unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, id);
        assert_eq!(record.filename, "a.jpg");
        assert_eq!(record.label, "fresh");
        assert_eq!(record.image, None);
        assert!(record.created_at >= before);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let (_dir, store) = store().await;

        let r1 = store.append("1.jpg", "canker", None).await.unwrap();
        let r2 = store.append("2.jpg", "fresh", None).await.unwrap();
        let r3 = store.append("3.jpg", "greening", None).await.unwrap();

        let ids: Vec<i64> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![r3, r2, r1]);
        assert!(r1 < r2 && r2 < r3);
    }

    #[tokio::test]
    async fn test_image_bytes_round_trip_through_get() {
        let (_dir, store) = store().await;

        let id = store
            .append("b.png", "Sehat", Some(&[1, 2, 3, 4]))
            .await
            .unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.image, Some(vec![1, 2, 3, 4]));
        assert!(store.get(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_summaries_flag_stored_images() {
        let (_dir, store) = store().await;
        let without = store.append("a.jpg", "Busuk", None).await.unwrap();
        let with = store
            .append("b.png", "Sehat", Some(&[9, 8, 7]))
            .await
            .unwrap();

        let summaries = store.list_summaries().await.unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!((summaries[0].id, summaries[0].has_image), (with, true));
        assert_eq!((summaries[1].id, summaries[1].has_image), (without, false));
        assert_eq!(summaries[0].filename, "b.png");
        assert_eq!(summaries[0].label, "Sehat");
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let (_dir, store) = store().await;
        let keep = store.append("keep.jpg", "fresh", None).await.unwrap();
        let gone = store.append("gone.jpg", "canker", None).await.unwrap();

        store.delete_by_id(gone).await.unwrap();

        let ids: Vec<i64> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![keep]);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_a_no_op() {
        let (_dir, store) = store().await;
        store.append("a.jpg", "fresh", None).await.unwrap();
        let before = store.list_all().await.unwrap();

        store.delete_by_id(4242).await.unwrap();

        assert_eq!(store.list_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let (_dir, store) = store().await;
        let first = store.append("a.jpg", "fresh", None).await.unwrap();
        store.delete_by_id(first).await.unwrap();

        let second = store.append("b.jpg", "fresh", None).await.unwrap();

        assert!(second > first);
    }

    #[tokio::test]
    async fn test_unreachable_database_is_storage_unavailable() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("missing-dir").join("riwayat.db"));

        let result = store.append("a.jpg", "fresh", None).await;

        assert!(matches!(result, Err(HistoryError::StorageUnavailable(_))));
    }
}
