//! Row store: sqlx-backed persistence for documents, chunks, and
//! relationships. Hand-written SQL against SQLite, matching the pool's
//! dev/test posture; no ORM layer.

use chrono::Utc;
use sqlx::{sqlite::SqlitePool, Row};
use tracing::{debug, info};

use crate::error::{Result, RowStoreError};
use crate::models::{Document, DocumentChunk, DocumentRelationship};

/// Owns the connection pool and creates the schema on first use.
#[derive(Clone)]
pub struct RowStore {
    pool: SqlitePool,
}

impl RowStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                document_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                author TEXT,
                category TEXT,
                tags_json TEXT NOT NULL DEFAULT '[]',
                description TEXT,
                version TEXT,
                status TEXT NOT NULL,
                error_message TEXT,
                upload_date TEXT NOT NULL,
                processed_date TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_title ON documents(title)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(document_type)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_upload_date ON documents(upload_date)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                chunk_text TEXT NOT NULL,
                char_count INTEGER NOT NULL,
                section_title TEXT,
                section_level INTEGER,
                page_number INTEGER,
                UNIQUE (doc_id, chunk_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_doc ON document_chunks(doc_id, chunk_index)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_relationships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                target_doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                relationship_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                summary TEXT NOT NULL,
                details_json TEXT NOT NULL,
                validation_status TEXT NOT NULL DEFAULT 'AUTO_DETECTED',
                validated_by TEXT,
                validation_notes TEXT,
                validated_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (source_doc_id, target_doc_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_relationship_status ON document_relationships(validation_status, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL UNIQUE,
                hashed_password TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_admin INTEGER NOT NULL DEFAULT 0,
                is_reviewer INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("row store schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_document(
        &self,
        title: &str,
        document_type: &str,
        file_path: &str,
        file_type: &str,
        file_size: i64,
        author: Option<&str>,
        category: Option<&str>,
        tags_json: &str,
        description: Option<&str>,
        version: Option<&str>,
    ) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO documents
                (title, document_type, file_path, file_type, file_size, author, category,
                 tags_json, description, version, status, upload_date, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'UPLOADING', ?11, ?12)
            "#,
        )
        .bind(title)
        .bind(document_type)
        .bind(file_path)
        .bind(file_type)
        .bind(file_size)
        .bind(author)
        .bind(category)
        .bind(tags_json)
        .bind(description)
        .bind(version)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let document = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(document)
    }

    pub async fn set_document_status(&self, id: i64, status: &str) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_document_error(&self, id: i64, message: &str) -> Result<()> {
        let truncated: String = message.chars().take(2000).collect();
        sqlx::query("UPDATE documents SET status = 'ERROR', error_message = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(truncated)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_document_ready(&self, id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE documents SET status = 'READY', processed_date = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_other_ready_documents(&self, exclude_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM documents WHERE status = 'READY' AND id != ?1")
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }

    /// Inserts chunk rows in one transaction and returns them with assigned ids.
    pub async fn insert_chunks(
        &self,
        doc_id: i64,
        chunks: &[(i32, String, Option<String>, Option<i32>, Option<i32>)],
    ) -> Result<Vec<DocumentChunk>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(chunks.len());

        for (chunk_index, chunk_text, section_title, section_level, page_number) in chunks {
            let char_count = chunk_text.chars().count() as i32;
            let result = sqlx::query(
                r#"
                INSERT INTO document_chunks
                    (doc_id, chunk_index, chunk_text, char_count, section_title, section_level, page_number)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(doc_id)
            .bind(chunk_index)
            .bind(chunk_text)
            .bind(char_count)
            .bind(section_title)
            .bind(section_level)
            .bind(page_number)
            .execute(&mut *tx)
            .await
            .map_err(|e| RowStoreError::TransactionFailed(e.to_string()))?;

            inserted.push(DocumentChunk {
                id: result.last_insert_rowid(),
                doc_id,
                chunk_index: *chunk_index,
                chunk_text: chunk_text.clone(),
                char_count,
                section_title: section_title.clone(),
                section_level: *section_level,
                page_number: *page_number,
            });
        }

        tx.commit().await?;
        debug!(doc_id, count = inserted.len(), "inserted document chunks");
        Ok(inserted)
    }

    pub async fn delete_chunks_for_document(&self, doc_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM document_chunks WHERE doc_id = ?1")
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_chunks_for_document(&self, doc_id: i64) -> Result<Vec<DocumentChunk>> {
        let chunks = sqlx::query_as::<_, DocumentChunk>(
            "SELECT * FROM document_chunks WHERE doc_id = ?1 ORDER BY chunk_index ASC",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    pub async fn get_chunk(&self, chunk_id: i64) -> Result<Option<DocumentChunk>> {
        let chunk = sqlx::query_as::<_, DocumentChunk>("SELECT * FROM document_chunks WHERE id = ?1")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(chunk)
    }

    /// Case-insensitive substring scan, used as the fallback read path when
    /// the vector index is unavailable.
    pub async fn search_chunks_like(&self, needle: &str, limit: i64) -> Result<Vec<DocumentChunk>> {
        let pattern = format!("%{}%", needle.replace('%', "\\%").replace('_', "\\_"));
        let chunks = sqlx::query_as::<_, DocumentChunk>(
            "SELECT * FROM document_chunks WHERE chunk_text LIKE ?1 ESCAPE '\\' LIMIT ?2",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    pub async fn relationship_exists(&self, source_doc_id: i64, target_doc_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM document_relationships WHERE source_doc_id = ?1 AND target_doc_id = ?2",
        )
        .bind(source_doc_id)
        .bind(target_doc_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")? > 0)
    }

    pub async fn insert_relationship(
        &self,
        source_doc_id: i64,
        target_doc_id: i64,
        relationship_type: &str,
        confidence: f32,
        summary: &str,
        details_json: &str,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO document_relationships
                (source_doc_id, target_doc_id, relationship_type, confidence, summary,
                 details_json, validation_status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'AUTO_DETECTED', ?7, ?8)
            "#,
        )
        .bind(source_doc_id)
        .bind(target_doc_id)
        .bind(relationship_type)
        .bind(confidence)
        .bind(summary)
        .bind(details_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(r) => Ok(r.last_insert_rowid()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(RowStoreError::DuplicateRelationship(source_doc_id, target_doc_id).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Inserts relationship rows in one transaction. A unique-constraint
    /// violation on an individual row is treated as a benign race with a
    /// concurrent extraction run and skipped rather than aborting the
    /// whole batch; any other failure rolls back everything inserted so far.
    pub async fn insert_relationships_batch(
        &self,
        rows: &[(i64, i64, String, f32, String, String)],
    ) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());
        let now = Utc::now().to_rfc3339();

        for (source_doc_id, target_doc_id, relationship_type, confidence, summary, details_json) in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO document_relationships
                    (source_doc_id, target_doc_id, relationship_type, confidence, summary,
                     details_json, validation_status, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'AUTO_DETECTED', ?7, ?8)
                "#,
            )
            .bind(source_doc_id)
            .bind(target_doc_id)
            .bind(relationship_type)
            .bind(confidence)
            .bind(summary)
            .bind(details_json)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(r) => ids.push(r.last_insert_rowid()),
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    debug!(source_doc_id, target_doc_id, "skipping duplicate relationship");
                }
                Err(e) => return Err(RowStoreError::TransactionFailed(e.to_string()).into()),
            }
        }

        tx.commit().await?;
        Ok(ids)
    }

    pub async fn get_relationships_for_document(&self, doc_id: i64) -> Result<Vec<DocumentRelationship>> {
        let relationships = sqlx::query_as::<_, DocumentRelationship>(
            "SELECT * FROM document_relationships WHERE source_doc_id = ?1 OR target_doc_id = ?1",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(relationships)
    }

    pub async fn validate_relationship(
        &self,
        id: i64,
        validation_status: &str,
        validated_by: Option<&str>,
        validation_notes: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE document_relationships
            SET validation_status = ?1, validated_by = ?2, validation_notes = ?3,
                validated_at = ?4, updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(validation_status)
        .bind(validated_by)
        .bind(validation_notes)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> RowStore {
        RowStore::connect("sqlite::memory:", 5).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_fetch_document() {
        let store = test_store().await;
        let id = store
            .insert_document("Norm A", "NORM", "bucket/a.pdf", "pdf", 1024, None, None, "[]", None, None)
            .await
            .unwrap();

        let document = store.get_document(id).await.unwrap().unwrap();
        assert_eq!(document.title, "Norm A");
        assert_eq!(document.status, "UPLOADING");
    }

    #[tokio::test]
    async fn test_mark_document_ready_sets_processed_date() {
        let store = test_store().await;
        let id = store
            .insert_document("Norm A", "NORM", "bucket/a.pdf", "pdf", 1024, None, None, "[]", None, None)
            .await
            .unwrap();

        store.mark_document_ready(id).await.unwrap();
        let document = store.get_document(id).await.unwrap().unwrap();
        assert_eq!(document.status, "READY");
        assert!(document.processed_date.is_some());
    }

    #[tokio::test]
    async fn test_insert_chunks_assigns_ids_and_char_counts() {
        let store = test_store().await;
        let doc_id = store
            .insert_document("Norm A", "NORM", "bucket/a.pdf", "pdf", 1024, None, None, "[]", None, None)
            .await
            .unwrap();

        let chunks = vec![
            (0, "hello world".to_string(), None, None, None),
            (1, "second chunk".to_string(), None, None, None),
        ];
        let inserted = store.insert_chunks(doc_id, &chunks).await.unwrap();

        assert_eq!(inserted.len(), 2);
        assert_eq!(inserted[0].char_count, 11);
        assert!(inserted[0].id != inserted[1].id);
    }

    #[tokio::test]
    async fn test_duplicate_relationship_rejected() {
        let store = test_store().await;
        let a = store
            .insert_document("A", "NORM", "a.pdf", "pdf", 1, None, None, "[]", None, None)
            .await
            .unwrap();
        let b = store
            .insert_document("B", "GUIDELINE", "b.pdf", "pdf", 1, None, None, "[]", None, None)
            .await
            .unwrap();

        store
            .insert_relationship(a, b, "COMPLIANCE", 90.0, "summary", "{}")
            .await
            .unwrap();

        let err = store
            .insert_relationship(a, b, "COMPLIANCE", 90.0, "summary", "{}")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[tokio::test]
    async fn test_search_chunks_like_matches_substring() {
        let store = test_store().await;
        let doc_id = store
            .insert_document("A", "NORM", "a.pdf", "pdf", 1, None, None, "[]", None, None)
            .await
            .unwrap();
        store
            .insert_chunks(doc_id, &[(0, "contains the word privacy here".to_string(), None, None, None)])
            .await
            .unwrap();

        let hits = store.search_chunks_like("privacy", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
