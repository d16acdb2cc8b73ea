use chrono::{SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};
use uuid::Uuid;

use parley_core::domain::command::{matches_filter, Document, ValidatedCommand};
use parley_core::domain::outcome::StoreResult;

use super::{with_id, CollectionStore, RepositoryError};
use crate::DbPool;

/// Document collections kept as JSON rows in `collection_document`.
///
/// Filters are top-level equality matches evaluated after decoding, so a
/// filter key is never spliced into SQL.
pub struct SqlCollectionStore {
    pool: DbPool,
}

impl SqlCollectionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_documents(
        &self,
        collection: &str,
        documents: &[Document],
    ) -> Result<Vec<String>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        ensure_collection(&mut tx, collection).await?;

        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            let id = Uuid::new_v4().to_string();
            let body_json = serde_json::to_string(document)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;

            sqlx::query(
                "INSERT INTO collection_document (id, collection, body_json, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(collection)
            .bind(body_json)
            .bind(now_text())
            .execute(&mut *tx)
            .await?;

            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn matching_documents(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Vec<Document>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, body_json
             FROM collection_document
             WHERE collection = ?
             ORDER BY rowid ASC",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut matched = Vec::new();
        for row in rows {
            let document = document_from_row(row)?;
            if matches_filter(&document, filter) {
                matched.push(document);
            }
        }
        Ok(matched)
    }

    async fn delete_matching(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT id, body_json
             FROM collection_document
             WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&mut *tx)
        .await?;

        let mut deleted = 0u64;
        for row in rows {
            let document = document_from_row(row)?;
            if !matches_filter(&document, filter) {
                continue;
            }
            let Some(id) = document.get("_id").and_then(|value| value.as_str()) else {
                continue;
            };
            let result = sqlx::query("DELETE FROM collection_document WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM collection_document WHERE collection = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collection_catalog WHERE name = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn create_collection(&self, collection: &str) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        ensure_collection(&mut tx, collection).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CollectionStore for SqlCollectionStore {
    async fn execute(&self, command: &ValidatedCommand) -> Result<StoreResult, RepositoryError> {
        match command {
            ValidatedCommand::Insert { collection, document } => {
                let mut ids =
                    self.insert_documents(collection, std::slice::from_ref(document)).await?;
                let id = ids.pop().ok_or_else(|| {
                    RepositoryError::Unavailable("insert returned no document id".to_string())
                })?;
                Ok(StoreResult::InsertedId(id))
            }
            ValidatedCommand::InsertMany { collection, documents } => {
                let ids = self.insert_documents(collection, documents).await?;
                Ok(StoreResult::InsertedIds(ids))
            }
            ValidatedCommand::Find { collection, filter, limit } => {
                let mut documents = self.matching_documents(collection, filter).await?;
                if let Some(limit) = limit {
                    documents.truncate(usize::try_from(*limit).unwrap_or(usize::MAX));
                }
                Ok(StoreResult::Documents(documents))
            }
            ValidatedCommand::Count { collection, filter } => {
                let documents = self.matching_documents(collection, filter).await?;
                Ok(StoreResult::Count(documents.len() as u64))
            }
            ValidatedCommand::Delete { collection, filter } => {
                let deleted = self.delete_matching(collection, filter).await?;
                Ok(StoreResult::DeletedCount(deleted))
            }
            ValidatedCommand::Drop { collection } => {
                self.drop_collection(collection).await?;
                Ok(StoreResult::Acknowledged)
            }
            ValidatedCommand::CreateCollection { collection } => {
                self.create_collection(collection).await?;
                Ok(StoreResult::Acknowledged)
            }
        }
    }
}

async fn ensure_collection(
    tx: &mut Transaction<'_, Sqlite>,
    collection: &str,
) -> Result<(), RepositoryError> {
    sqlx::query("INSERT OR IGNORE INTO collection_catalog (name, created_at) VALUES (?, ?)")
        .bind(collection)
        .bind(now_text())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn document_from_row(row: SqliteRow) -> Result<Document, RepositoryError> {
    let id: String = row.try_get("id")?;
    let body_json: String = row.try_get("body_json")?;
    let body = serde_json::from_str::<Document>(&body_json)
        .map_err(|error| RepositoryError::Decode(format!("document `{id}`: {error}")))?;
    Ok(with_id(&id, body))
}
