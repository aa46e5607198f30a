//! Local dense-transformer embedding provider, backed by `candle`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::info;

use crate::error::{AppError, EmbeddingError, Result};

use super::EmbeddingProvider;

/// The BERT-family sentence encoder itself, held behind an `Arc` so a
/// blocking forward pass can be moved onto a `spawn_blocking` thread
/// without borrowing across the `.await`.
struct Inner {
    model: Mutex<BertModel>,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

/// Wraps a BERT-family sentence encoder loaded once per worker process and
/// reused read-only across jobs.
pub struct LocalEmbeddingProvider {
    inner: Arc<Inner>,
}

impl LocalEmbeddingProvider {
    pub fn load(model_dir: &str, dim: usize) -> Result<Self> {
        let model_dir = PathBuf::from(model_dir);
        let device = Device::Cpu;

        let tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| EmbeddingError::GenerationFailed(format!("tokenizer load failed: {e}")))?;

        let config_str = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| EmbeddingError::GenerationFailed(format!("bad bert config: {e}")))?;

        let weights = candle_core::safetensors::load(model_dir.join("model.safetensors"), &device)
            .map_err(|e| EmbeddingError::GenerationFailed(format!("weights load failed: {e}")))?;
        let var_builder = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(var_builder, &config)
            .map_err(|e| EmbeddingError::GenerationFailed(format!("model load failed: {e}")))?;

        info!(model_dir = %model_dir.display(), dim, "local embedding model loaded");

        Ok(Self {
            inner: Arc::new(Inner {
                model: Mutex::new(model),
                tokenizer,
                device,
                dim,
            }),
        })
    }
}

impl Inner {
    fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dim]);
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::GenerationFailed(format!("tokenization failed: {e}")))?;

        let ids = encoding.get_ids();
        let type_ids = encoding.get_type_ids();
        let mask = encoding.get_attention_mask();

        let input_ids = Tensor::new(ids, &self.device)
            .and_then(|t| t.reshape((1, ids.len())))
            .map_err(|e| EmbeddingError::GenerationFailed(e.to_string()))?;
        let token_type_ids = Tensor::new(type_ids, &self.device)
            .and_then(|t| t.reshape((1, type_ids.len())))
            .map_err(|e| EmbeddingError::GenerationFailed(e.to_string()))?;
        let attention_mask = Tensor::new(mask, &self.device)
            .and_then(|t| t.reshape((1, mask.len())))
            .map_err(|e| EmbeddingError::GenerationFailed(e.to_string()))?;

        let model = self.model.lock().unwrap();
        let output = model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| EmbeddingError::GenerationFailed(format!("forward pass failed: {e}")))?;
        drop(model);

        // Mean pooling over the token dimension.
        let pooled = output
            .mean(1)
            .map_err(|e| EmbeddingError::GenerationFailed(e.to_string()))?;
        let vector: Vec<Vec<f32>> = pooled
            .to_vec2()
            .map_err(|e| EmbeddingError::GenerationFailed(e.to_string()))?;

        let embedding = vector.into_iter().next().ok_or_else(|| {
            EmbeddingError::GenerationFailed("empty pooled output".to_string())
        })?;

        if embedding.len() != self.dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dim,
                actual: embedding.len(),
            }
            .into());
        }

        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    fn dim(&self) -> usize {
        self.inner.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let inner = self.inner.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || inner.encode_one(&text))
            .await
            .map_err(|e| AppError::Config(format!("embedding task panicked: {e}")))?
    }

    async fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size.max(1)) {
            let inner = self.inner.clone();
            let batch: Vec<String> = batch.to_vec();
            let embedded = tokio::task::spawn_blocking(move || {
                batch.iter().map(|text| inner.encode_one(text)).collect::<Result<Vec<_>>>()
            })
            .await
            .map_err(|e| AppError::Config(format!("embedding task panicked: {e}")))??;
            out.extend(embedded);
        }
        Ok(out)
    }
}
