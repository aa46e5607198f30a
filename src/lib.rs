//! Regulatory document processing and relationship-extraction pipeline.
//!
//! Ingests regulatory documents (normative standards and internal
//! guidelines), extracts and embeds their textual content, and discovers
//! semantic relationships between them: compliance, supersession,
//! cross-reference, and similarity.
//!
//! # Example
//!
//! ```rust,no_run
//! use regdoc_pipeline::pipeline::process_document;
//! use regdoc_pipeline::queue::InMemoryJobQueue;
//! use regdoc_pipeline::store::RowStore;
//!
//! #[tokio::main]
//! async fn main() -> regdoc_pipeline::error::Result<()> {
//!     let store = RowStore::connect("sqlite::memory:", 5).await?;
//!     let queue = InMemoryJobQueue::new();
//!     // construct a blob store, embedding provider, and vector index,
//!     // then call `process_document` for an uploaded document.
//!     let _ = (&store, &queue);
//!     Ok(())
//! }
//! ```

pub mod blob;
pub mod chunk;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod store;
pub mod vector;

pub use blob::{BlobStore, S3BlobStore};
pub use chunk::{chunk_sections, chunk_text, Chunk, Section};
pub use config::AppConfig;
pub use embed::{cosine_similarity, EmbeddingProvider, LocalEmbeddingProvider, RemoteEmbeddingProvider};
pub use error::{AppError, Result};
pub use extract::{extract_document, DocumentFormat, ExtractedDocument};
pub use models::{Document, DocumentChunk, DocumentRelationship, DocumentStatus, DocumentType, RelationshipType};
pub use pipeline::{extract_relationships, process_document, search, ProcessOutcome, SearchHit};
pub use queue::{InMemoryJobQueue, Job, JobQueue};
pub use store::RowStore;
pub use vector::{InMemoryVectorIndex, QdrantVectorIndex, VectorIndex};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
