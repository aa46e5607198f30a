//! The Process-Document job: downloads a document's source file, extracts
//! text, chunks it, embeds the chunks, persists rows and vectors, and fans
//! out an Extract-Relationships job once the document is `READY`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::{error, info};

use crate::blob::BlobStore;
use crate::chunk::{chunk_pages, chunk_text, Page};
use crate::config::{ChunkConfig, ExtractConfig};
use crate::embed::EmbeddingProvider;
use crate::error::{AppError, PipelineError, Result};
use crate::extract::extract_document;
use crate::models::{Document, DocumentStatus};
use crate::queue::{ExtractRelationshipsJob, Job, JobQueue};
use crate::store::RowStore;
use crate::vector::VectorIndex;

const EMBED_BATCH_SIZE: usize = 16;

/// Result of running the Process-Document job to completion.
///
/// A stage failure does not propagate as an `Err` from [`process_document`]
/// once the document has been loaded: it is recorded on the document row
/// and surfaced here so the caller (a worker loop) can log it and move on
/// without retrying. Preconditions that reject the job outright (document
/// missing, document already `READY`) are returned as `Err` instead, since
/// no document state needs to be (or can be) updated.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Ready { document_id: i64 },
    Error { document_id: i64, error: String },
}

/// Run the full ingestion pipeline for `document_id`.
///
/// Refuses to reprocess a document already in `READY` state (see the
/// design notes in `DESIGN.md` on reprocessing); callers that want to
/// retry a `READY` document must first move it back to `ERROR`.
pub async fn process_document(
    document_id: i64,
    store: &RowStore,
    blob: &dyn BlobStore,
    extract_config: &ExtractConfig,
    chunk_config: &ChunkConfig,
    embedder: &dyn EmbeddingProvider,
    vector_index: &dyn VectorIndex,
    queue: &dyn JobQueue,
) -> Result<ProcessOutcome> {
    let document = store
        .get_document(document_id)
        .await?
        .ok_or(PipelineError::DocumentNotFound(document_id))?;

    let status = document.status().ok_or_else(|| {
        AppError::Config(format!(
            "document {document_id} has unrecognized status {:?}",
            document.status
        ))
    })?;
    if status == DocumentStatus::Ready {
        return Err(PipelineError::AlreadyReady(document_id).into());
    }

    match run_stages(
        document_id,
        &document,
        store,
        blob,
        extract_config,
        chunk_config,
        embedder,
        vector_index,
        queue,
    )
    .await
    {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            let message = err.to_string();
            error!(document_id, error = %message, "document processing failed");
            store.set_document_error(document_id, &message).await?;
            let temp_path = temp_path_for(document_id, &document.title, &document.file_path);
            let _ = tokio::fs::remove_file(&temp_path).await;
            Ok(ProcessOutcome::Error {
                document_id,
                error: message,
            })
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_stages(
    document_id: i64,
    document: &Document,
    store: &RowStore,
    blob: &dyn BlobStore,
    extract_config: &ExtractConfig,
    chunk_config: &ChunkConfig,
    embedder: &dyn EmbeddingProvider,
    vector_index: &dyn VectorIndex,
    queue: &dyn JobQueue,
) -> Result<ProcessOutcome> {
    store
        .set_document_status(document_id, DocumentStatus::Extracting.as_str())
        .await?;

    let temp_path = temp_path_for(document_id, &document.title, &document.file_path);
    blob.get(&document.file_path, &temp_path).await?;

    let extracted = {
        let config = extract_config.clone();
        let path = temp_path.clone();
        tokio::task::spawn_blocking(move || extract_document(&path, &config))
            .await
            .map_err(|e| AppError::Config(format!("extraction task panicked: {e}")))??
    };

    store
        .set_document_status(document_id, DocumentStatus::Analyzing.as_str())
        .await?;
    let chunks = if extracted.pages.is_empty() {
        chunk_text(&extracted.text, chunk_config)
    } else {
        let pages: Vec<Page> = extracted
            .pages
            .iter()
            .map(|p| Page {
                page_number: p.page_number,
                text: p.text.clone(),
            })
            .collect();
        chunk_pages(&pages, chunk_config)
    };

    store
        .set_document_status(document_id, DocumentStatus::Embedding.as_str())
        .await?;
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts, EMBED_BATCH_SIZE).await?;

    let chunk_rows: Vec<(i32, String, Option<String>, Option<i32>, Option<i32>)> = chunks
        .iter()
        .map(|c| {
            (
                c.chunk_index as i32,
                c.text.clone(),
                c.section_title.clone(),
                c.section_level.map(|l| l as i32),
                c.page_number.map(|p| p as i32),
            )
        })
        .collect();
    let inserted = store.insert_chunks(document_id, &chunk_rows).await?;

    let ids: Vec<i64> = inserted.iter().map(|c| c.id).collect();
    let payloads: Vec<HashMap<String, Value>> = inserted
        .iter()
        .map(|chunk| {
            let mut payload = HashMap::new();
            payload.insert("document_id".to_string(), json!(document_id));
            payload.insert("chunk_index".to_string(), json!(chunk.chunk_index));
            payload.insert("chunk_text".to_string(), json!(chunk.chunk_text));
            payload.insert("document_title".to_string(), json!(document.title));
            if let Some(doc_type) = document.document_type() {
                payload.insert("document_type".to_string(), json!(doc_type.as_str()));
            }
            if let Some(title) = &chunk.section_title {
                payload.insert("section_title".to_string(), json!(title));
            }
            if let Some(level) = chunk.section_level {
                payload.insert("section_level".to_string(), json!(level));
            }
            if let Some(page) = chunk.page_number {
                payload.insert("page_number".to_string(), json!(page));
            }
            payload
        })
        .collect();
    vector_index.upsert_chunks(&ids, &vectors, &payloads).await?;

    store.mark_document_ready(document_id).await?;
    let _ = tokio::fs::remove_file(&temp_path).await;
    info!(document_id, chunk_count = inserted.len(), "document ready");

    let other_ready = store.count_other_ready_documents(document_id).await?;
    if other_ready >= 1 {
        queue
            .enqueue(Job::ExtractRelationships(ExtractRelationshipsJob {
                document_id,
                target_doc_ids: None,
                threshold: None,
                limit_per_chunk: None,
            }))
            .await?;
    }

    Ok(ProcessOutcome::Ready { document_id })
}

fn temp_path_for(document_id: i64, title: &str, file_path: &str) -> PathBuf {
    let ext = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    let sanitized: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    std::env::temp_dir().join(format!("regdoc-{document_id}-{sanitized}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockBlobStore {
        objects: Mutex<StdHashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl BlobStore for MockBlobStore {
        async fn put(&self, name: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
            self.objects.lock().unwrap().insert(name.to_string(), bytes);
            Ok(name.to_string())
        }

        async fn put_stream(
            &self,
            name: &str,
            mut reader: tokio::fs::File,
            content_type: &str,
        ) -> Result<String> {
            use tokio::io::AsyncReadExt;
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes).await?;
            self.put(name, bytes, content_type).await
        }

        async fn get(&self, name: &str, local_path: &Path) -> Result<()> {
            let bytes = self
                .objects
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| crate::error::BlobError::ObjectNotFound(name.to_string()))?;
            tokio::fs::write(local_path, bytes).await?;
            Ok(())
        }

        async fn delete(&self, name: &str) -> Result<()> {
            self.objects.lock().unwrap().remove(name);
            Ok(())
        }

        async fn presigned_get(&self, name: &str, ttl_seconds: u64) -> Result<String> {
            Ok(format!("memory://{name}?expires_in={ttl_seconds}"))
        }
    }

    struct MockEmbedder {
        dim: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbedder {
        fn dim(&self) -> usize {
            self.dim
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.trim().is_empty() {
                return Ok(vec![0.0; self.dim]);
            }
            let seed = text.len() as f32;
            Ok((0..self.dim).map(|i| (seed + i as f32).sin()).collect())
        }

        async fn embed_batch(&self, texts: &[String], _batch_size: usize) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }

    #[tokio::test]
    async fn test_rejects_unknown_document() {
        let store = RowStore::connect("sqlite::memory:", 5).await.unwrap();
        let blob = MockBlobStore::default();
        let embedder = MockEmbedder { dim: 8 };
        let vector_index = crate::vector::InMemoryVectorIndex::new();
        let queue = crate::queue::InMemoryJobQueue::new();

        let result = process_document(
            999,
            &store,
            &blob,
            &ExtractConfig::default(),
            &ChunkConfig::default(),
            &embedder,
            &vector_index,
            &queue,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rejects_reprocessing_ready_document() {
        let store = RowStore::connect("sqlite::memory:", 5).await.unwrap();
        let id = store
            .insert_document("A", "NORM", "a.docx", "docx", 1, None, None, "[]", None, None)
            .await
            .unwrap();
        store.mark_document_ready(id).await.unwrap();

        let blob = MockBlobStore::default();
        let embedder = MockEmbedder { dim: 8 };
        let vector_index = crate::vector::InMemoryVectorIndex::new();
        let queue = crate::queue::InMemoryJobQueue::new();

        let result = process_document(
            id,
            &store,
            &blob,
            &ExtractConfig::default(),
            &ChunkConfig::default(),
            &embedder,
            &vector_index,
            &queue,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_download_failure_marks_document_error() {
        let store = RowStore::connect("sqlite::memory:", 5).await.unwrap();
        let id = store
            .insert_document("A", "NORM", "missing.docx", "docx", 1, None, None, "[]", None, None)
            .await
            .unwrap();

        let blob = MockBlobStore::default();
        let embedder = MockEmbedder { dim: 8 };
        let vector_index = crate::vector::InMemoryVectorIndex::new();
        let queue = crate::queue::InMemoryJobQueue::new();

        let outcome = process_document(
            id,
            &store,
            &blob,
            &ExtractConfig::default(),
            &ChunkConfig::default(),
            &embedder,
            &vector_index,
            &queue,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, ProcessOutcome::Error { .. }));
        let document = store.get_document(id).await.unwrap().unwrap();
        assert_eq!(document.status, "ERROR");
        assert!(document.error_message.is_some());
    }
}
