//! Error handling for the document pipeline

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, AppError>;

/// Top-level error type for the pipeline
#[derive(Error, Debug)]
pub enum AppError {
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("chunking error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector index error: {0}")]
    VectorIndex(#[from] VectorIndexError),

    #[error("row store error: {0}")]
    RowStore(#[from] RowStoreError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors from the blob store client (C1)
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("bucket initialization failed: {0}")]
    BucketInit(String),

    #[error("presign failed: {0}")]
    PresignFailed(String),
}

/// Errors from the text extractor (C2)
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("extraction produced empty text")]
    ExtractionEmpty,

    #[error("parse failure: {0}")]
    ParseFailure(String),

    #[error("ocr failure: {0}")]
    OcrFailure(String),
}

/// Errors from the chunker (C3)
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("invalid chunk configuration: {0}")]
    InvalidConfig(String),
}

/// Errors from the embedding provider (C4)
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding generation failed: {0}")]
    GenerationFailed(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Errors from the vector index (C5)
#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("collection init failed: {0}")]
    InitFailed(String),

    #[error("upsert failed: {0}")]
    UpsertFailed(String),

    #[error("search failed: {0}")]
    SearchFailed(String),

    #[error("missing required payload field: {0}")]
    MissingPayloadField(String),

    #[error("length mismatch between ids/vectors/payloads")]
    LengthMismatch,

    #[error("delete failed: {0}")]
    DeleteFailed(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the row store (chunk/document/relationship persistence)
#[derive(Error, Debug)]
pub enum RowStoreError {
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("duplicate relationship for ({0}, {1})")]
    DuplicateRelationship(i64, i64),
}

/// Errors from the processing pipeline / relationship extractor (C6)
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("document {0} not found")]
    DocumentNotFound(i64),

    #[error("document {0} is not in READY state")]
    DocumentNotReady(i64),

    /// Reprocessing refusal: a document already in `READY` must be moved
    /// back to `ERROR` (or a fresh document created) before it can be
    /// processed again.
    #[error("document {0} is already READY; reprocessing requires an ERROR state")]
    AlreadyReady(i64),

    #[error("hard timeout exceeded for document {0}")]
    HardTimeout(i64),
}

impl AppError {
    /// Whether an operator-driven retry of the originating job is appropriate.
    ///
    /// Never consulted automatically inside the pipeline; the worker does
    /// not auto-retry, only an operator re-enqueue does.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Http(_)
                | AppError::Blob(BlobError::DownloadFailed(_))
                | AppError::Blob(BlobError::UploadFailed(_))
                | AppError::VectorIndex(VectorIndexError::Unavailable(_))
        )
    }

    /// Category label for logging/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Blob(_) => "blob",
            AppError::Extract(_) => "extract",
            AppError::Chunk(_) => "chunk",
            AppError::Embedding(_) => "embedding",
            AppError::VectorIndex(_) => "vector_index",
            AppError::RowStore(_) => "row_store",
            AppError::Pipeline(_) => "pipeline",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Serialization(_) => "serialization",
            AppError::Http(_) => "http",
            AppError::Database(_) => "database",
            AppError::NotFound(_) => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let timeout_error = AppError::Pipeline(PipelineError::HardTimeout(1));
        assert!(!timeout_error.is_retryable());

        let config_error = AppError::Config("invalid config".to_string());
        assert!(!config_error.is_retryable());
    }

    #[test]
    fn test_error_category() {
        let extract_error = AppError::Extract(ExtractError::ExtractionEmpty);
        assert_eq!(extract_error.category(), "extract");

        let vector_error = AppError::VectorIndex(VectorIndexError::LengthMismatch);
        assert_eq!(vector_error.category(), "vector_index");
    }
}
