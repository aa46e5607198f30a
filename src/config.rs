//! Configuration management for the document pipeline

use serde::{Deserialize, Serialize};

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Row store (documents/chunks/relationships) configuration
    pub database: DatabaseConfig,

    /// Blob store configuration
    pub blob: BlobConfig,

    /// Text extraction configuration
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Vector index configuration
    pub vector_index: VectorIndexConfig,

    /// Pipeline/worker configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Row store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection string, e.g. `sqlite::memory:` or `sqlite:data/app.db`
    pub url: String,

    /// Maximum pool connections
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
}

fn default_db_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: default_db_max_connections(),
        }
    }
}

/// S3-compatible blob store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Endpoint URL (e.g. a MinIO deployment)
    pub endpoint: String,

    /// Region, required by the S3 API even for non-AWS endpoints
    #[serde(default = "default_blob_region")]
    pub region: String,

    /// Bucket used for uploaded source documents
    pub bucket: String,

    /// Access key
    pub access_key: String,

    /// Secret key
    pub secret_key: String,

    /// Use path-style addressing (required by most non-AWS S3 endpoints)
    #[serde(default = "default_true")]
    pub path_style: bool,

    /// Presigned URL expiry, in seconds
    #[serde(default = "default_presign_expiry_secs")]
    pub presign_expiry_secs: u64,
}

fn default_blob_region() -> String {
    "us-east-1".to_string()
}

fn default_presign_expiry_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

/// Text extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Fall back to OCR when a PDF page has no text layer
    #[serde(default = "default_true")]
    pub use_ocr: bool,

    /// Rasterization scale factor used for OCR (matrix applied to each page)
    #[serde(default = "default_ocr_scale")]
    pub ocr_scale: f32,
}

fn default_ocr_scale() -> f32 {
    2.0
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            use_ocr: true,
            ocr_scale: default_ocr_scale(),
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target maximum chunk size, in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters of trailing context carried into the next chunk
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    Local,
    Remote,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Which provider implementation to construct
    pub provider: EmbeddingProviderKind,

    /// Local model identifier (weights directory or hub name), used when provider = local
    #[serde(default)]
    pub local_model: Option<String>,

    /// Remote embedding API base URL, used when provider = remote
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Remote API key, used when provider = remote
    #[serde(default)]
    pub remote_api_key: Option<String>,

    /// Output embedding dimension, must match the vector index's configured size
    pub dimension: usize,

    /// Request timeout in seconds (remote provider only)
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_timeout() -> u64 {
    30
}

/// Vector index (Qdrant) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    /// Qdrant gRPC URL
    pub url: String,

    /// API key, if the deployment requires one
    #[serde(default)]
    pub api_key: Option<String>,

    /// Vector dimension for both collections; must match embedding.dimension
    pub dimension: usize,

    /// Default similarity threshold applied to search results when the caller
    /// doesn't specify one
    #[serde(default = "default_similarity_threshold")]
    pub default_similarity_threshold: f32,
}

fn default_similarity_threshold() -> f32 {
    0.7
}

/// Pipeline/worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Soft time limit for a single document job, in seconds
    #[serde(default = "default_soft_time_limit")]
    pub soft_time_limit_secs: u64,

    /// Hard time limit for a single document job, in seconds
    #[serde(default = "default_hard_time_limit")]
    pub hard_time_limit_secs: u64,

    /// Maximum chunk-to-chunk similarity pairs retained per chunk during
    /// cross-document aggregation
    #[serde(default = "default_limit_per_chunk")]
    pub limit_per_chunk: usize,

    /// No automatic retry is performed by the worker; this is documentation
    /// for the operator-driven requeue path only.
    #[serde(default)]
    pub auto_retry: bool,
}

fn default_soft_time_limit() -> u64 {
    3300
}

fn default_hard_time_limit() -> u64 {
    3600
}

fn default_limit_per_chunk() -> usize {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            soft_time_limit_secs: default_soft_time_limit(),
            hard_time_limit_secs: default_hard_time_limit(),
            limit_per_chunk: default_limit_per_chunk(),
            auto_retry: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a file, dispatching on its extension
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        Ok(config)
    }

    /// Save configuration to a file, dispatching on its extension
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string(self)?,
            Some("yaml") | Some("yml") => serde_yml::to_string(self)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate cross-field invariants
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embedding.dimension == 0 {
            return Err(anyhow::anyhow!("Embedding dimension must be greater than 0"));
        }

        if self.embedding.dimension != self.vector_index.dimension {
            return Err(anyhow::anyhow!(
                "Embedding dimension ({}) must match vector index dimension ({})",
                self.embedding.dimension,
                self.vector_index.dimension
            ));
        }

        if self.embedding.provider == EmbeddingProviderKind::Remote
            && self.embedding.remote_url.is_none()
        {
            return Err(anyhow::anyhow!(
                "embedding.remote_url is required when provider = remote"
            ));
        }

        if self.chunk.chunk_overlap >= self.chunk.chunk_size {
            return Err(anyhow::anyhow!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk.chunk_overlap,
                self.chunk.chunk_size
            ));
        }

        let threshold = self.vector_index.default_similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow::anyhow!(
                "default_similarity_threshold must be between 0.0 and 1.0"
            ));
        }

        if self.pipeline.soft_time_limit_secs >= self.pipeline.hard_time_limit_secs {
            return Err(anyhow::anyhow!(
                "soft_time_limit_secs must be smaller than hard_time_limit_secs"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig::default(),
            blob: BlobConfig {
                endpoint: "http://localhost:9000".to_string(),
                region: default_blob_region(),
                bucket: "documents".to_string(),
                access_key: "minioadmin".to_string(),
                secret_key: "minioadmin".to_string(),
                path_style: true,
                presign_expiry_secs: default_presign_expiry_secs(),
            },
            extract: ExtractConfig::default(),
            chunk: ChunkConfig::default(),
            embedding: EmbeddingConfig {
                provider: EmbeddingProviderKind::Local,
                local_model: Some("sentence-transformers/all-MiniLM-L6-v2".to_string()),
                remote_url: None,
                remote_api_key: None,
                dimension: 384,
                timeout_secs: default_embedding_timeout(),
            },
            vector_index: VectorIndexConfig {
                url: "http://localhost:6334".to_string(),
                api_key: None,
                dimension: 384,
                default_similarity_threshold: default_similarity_threshold(),
            },
            pipeline: PipelineConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut config = sample_config();
        config.vector_index.dimension = 768;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_provider_requires_url() {
        let mut config = sample_config();
        config.embedding.provider = EmbeddingProviderKind::Remote;
        config.embedding.remote_url = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_overlap_must_be_smaller_than_chunk_size() {
        let mut config = sample_config();
        config.chunk.chunk_overlap = config.chunk.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_soft_limit_must_be_smaller_than_hard_limit() {
        let mut config = sample_config();
        config.pipeline.soft_time_limit_secs = config.pipeline.hard_time_limit_secs;
        assert!(config.validate().is_err());
    }
}
