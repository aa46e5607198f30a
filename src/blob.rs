//! Blob store client (C1): upload, download, delete opaque byte objects
//! keyed by object name, plus presigned URL generation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use futures::TryStreamExt;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{info, warn};

use crate::config::BlobConfig;
use crate::error::{BlobError, Result};

/// Capability set for an opaque, S3-shaped object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    async fn put_stream(
        &self,
        name: &str,
        reader: tokio::fs::File,
        content_type: &str,
    ) -> Result<String>;

    async fn get(&self, name: &str, local_path: &Path) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;

    async fn presigned_get(&self, name: &str, ttl_seconds: u64) -> Result<String>;
}

/// S3-compatible implementation, targeting MinIO or any other
/// S3-compatible endpoint via a configured region/endpoint/credentials.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub async fn new(config: &BlobConfig) -> Result<Self> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "regdoc-pipeline",
        );

        let aws_config = aws_config::from_env()
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(config.path_style);

        let client = Client::from_conf(s3_config_builder.build());

        let store = Self {
            client,
            bucket: config.bucket.clone(),
        };
        store.ensure_bucket().await?;
        Ok(store)
    }

    async fn ensure_bucket(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(_) => {
                info!(bucket = %self.bucket, "bucket missing, creating");
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map(|_| ())
                    .or_else(|err| {
                        // Tolerate "already owned by you" races between workers.
                        let msg = err.to_string();
                        if msg.contains("BucketAlreadyOwnedByYou") || msg.contains("BucketAlreadyExists")
                        {
                            Ok(())
                        } else {
                            Err(BlobError::BucketInit(msg).into())
                        }
                    })
            }
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BlobError::UploadFailed(e.to_string()))?;
        Ok(name.to_string())
    }

    async fn put_stream(
        &self,
        name: &str,
        reader: tokio::fs::File,
        content_type: &str,
    ) -> Result<String> {
        let body = ByteStream::read_from()
            .file(reader)
            .build()
            .await
            .map_err(|e| BlobError::UploadFailed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BlobError::UploadFailed(e.to_string()))?;
        Ok(name.to_string())
    }

    async fn get(&self, name: &str, local_path: &Path) -> Result<()> {
        let mut output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| BlobError::DownloadFailed(e.to_string()))?;

        let mut file = tokio::fs::File::create(local_path).await?;
        use tokio::io::AsyncWriteExt;
        while let Some(chunk) = output
            .body
            .try_next()
            .await
            .map_err(|e| BlobError::DownloadFailed(e.to_string()))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        if let Err(err) = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            // Deletion failures are logged but non-fatal, matching the
            // pipeline's tolerance for best-effort cleanup.
            warn!(object = %name, error = %err, "blob delete failed, ignoring");
        }
        Ok(())
    }

    async fn presigned_get(&self, name: &str, ttl_seconds: u64) -> Result<String> {
        let presign_config = PresigningConfig::expires_in(Duration::from_secs(ttl_seconds))
            .map_err(|e| BlobError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .presigned(presign_config)
            .await
            .map_err(|e| BlobError::PresignFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory test double, parallel to how the row store gets a
    /// SQLite-backed implementation for tests.
    #[derive(Default)]
    pub struct InMemoryBlobStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl BlobStore for InMemoryBlobStore {
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
            let objects = self.objects.lock().unwrap();
            let bytes = objects
                .get(name)
                .ok_or_else(|| BlobError::ObjectNotFound(name.to_string()))?
                .clone();
            drop(objects);
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

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = InMemoryBlobStore::default();
        store
            .put("docs/a.pdf", b"hello".to_vec(), "application/pdf")
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        store.get("docs/a.pdf", &path).await.unwrap();

        let content = tokio::fs::read(&path).await.unwrap();
        assert_eq!(content, b"hello");
    }

    #[tokio::test]
    async fn test_get_missing_object_fails() {
        let store = InMemoryBlobStore::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.pdf");
        let result = store.get("nope", &path).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryBlobStore::default();
        store.put("a", b"x".to_vec(), "text/plain").await.unwrap();
        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_presigned_get_returns_url() {
        let store = InMemoryBlobStore::default();
        let url = store.presigned_get("a", 3600).await.unwrap();
        assert!(url.contains("a"));
    }
}
