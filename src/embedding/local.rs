//! 로컬 임베딩 - fastembed (ONNX Runtime)
//!
//! sentence-transformers 계열 모델을 로컬에서 추론합니다.
//! 모델 파일은 최초 실행 시 다운로드되어 캐시 디렉토리에 저장됩니다.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{Device, EmbeddingProvider};

/// 배치당 문장 수
const BATCH_SIZE: usize = 64;

/// 지원 모델: (정규 모델 ID, fastembed 모델, 차원)
///
/// `all-MiniLM-L6-v2` 처럼 `sentence-transformers/` 를 생략한 별칭도 같은 모델로 해석합니다.
fn resolve_model(model_id: &str) -> Result<(&'static str, EmbeddingModel, usize)> {
    let id = model_id.trim().trim_start_matches("sentence-transformers/");
    match id {
        "all-MiniLM-L6-v2" => Ok((
            "sentence-transformers/all-MiniLM-L6-v2",
            EmbeddingModel::AllMiniLML6V2,
            384,
        )),
        "all-MiniLM-L12-v2" => Ok((
            "sentence-transformers/all-MiniLM-L12-v2",
            EmbeddingModel::AllMiniLML12V2,
            384,
        )),
        "BAAI/bge-small-en-v1.5" => Ok((
            "BAAI/bge-small-en-v1.5",
            EmbeddingModel::BGESmallENV15,
            384,
        )),
        "BAAI/bge-base-en-v1.5" => Ok((
            "BAAI/bge-base-en-v1.5",
            EmbeddingModel::BGEBaseENV15,
            768,
        )),
        other => anyhow::bail!(
            "Unsupported local embedding model: {}. \
             Supported: all-MiniLM-L6-v2, all-MiniLM-L12-v2, BAAI/bge-small-en-v1.5, BAAI/bge-base-en-v1.5",
            other
        ),
    }
}

/// 지원 모델이면 정규 모델 ID
pub(crate) fn canonical_id(model_id: &str) -> Option<&'static str> {
    resolve_model(model_id).ok().map(|(id, _, _)| id)
}

/// 모델 캐시 디렉토리
fn model_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("neuro-rag")
        .join("models")
}

/// fastembed 로컬 임베딩
///
/// `TextEmbedding` 은 `Mutex` 안에 두고 블로킹 스레드에서 호출합니다.
pub struct LocalEmbedding {
    model: Arc<Mutex<TextEmbedding>>,
    /// 정규 모델 ID (매니페스트에 기록됨)
    model_id: &'static str,
    dimension: usize,
    device: Device,
}

impl LocalEmbedding {
    /// 모델 로드 (블로킹, 필요 시 다운로드)
    pub fn new(model_id: &str, device: Device) -> Result<Self> {
        let (canonical, model, dimension) = resolve_model(model_id)?;

        let options = InitOptions::new(model)
            .with_show_download_progress(false)
            .with_cache_dir(model_cache_dir());
        let options = apply_device(options, device);

        let embedding = TextEmbedding::try_new(options)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Failed to load local embedding model {}", model_id))?;

        tracing::info!("Loaded local embedding model {} on {}", canonical, device);

        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            model_id: canonical,
            dimension,
            device,
        })
    }

    /// 실행 디바이스
    pub fn device(&self) -> Device {
        self.device
    }
}

#[cfg(feature = "cuda")]
fn apply_device(options: InitOptions, device: Device) -> InitOptions {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    match device {
        Device::Cuda => {
            options.with_execution_providers(vec![CUDAExecutionProvider::default().build()])
        }
        Device::Cpu => options,
    }
}

#[cfg(not(feature = "cuda"))]
fn apply_device(options: InitOptions, device: Device) -> InitOptions {
    if device == Device::Cuda {
        tracing::warn!("Built without the `cuda` feature, running embeddings on CPU");
    }
    options
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding model returned no vector"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();

        // ONNX 추론은 CPU 바운드이므로 spawn_blocking 사용
        tokio::task::spawn_blocking(move || {
            let model = model
                .lock()
                .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
            model
                .embed(texts, Some(BATCH_SIZE))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await
        .context("Embedding task failed")?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model() {
        let (_, _, dim) = resolve_model("sentence-transformers/all-MiniLM-L6-v2").unwrap();
        assert_eq!(dim, 384);

        let (_, _, dim) = resolve_model("BAAI/bge-base-en-v1.5").unwrap();
        assert_eq!(dim, 768);
    }

    #[test]
    fn test_alias_resolves_to_canonical_id() {
        assert_eq!(
            canonical_id("all-MiniLM-L6-v2"),
            Some("sentence-transformers/all-MiniLM-L6-v2")
        );
        assert_eq!(
            canonical_id(" sentence-transformers/all-MiniLM-L6-v2 "),
            Some("sentence-transformers/all-MiniLM-L6-v2")
        );
        assert_eq!(canonical_id("unknown/model"), None);
    }

    #[test]
    fn test_resolve_unknown_model() {
        let err = resolve_model("unknown/model").unwrap_err();
        assert!(err.to_string().contains("Unsupported local embedding model"));
    }

    #[test]
    fn test_cache_dir_is_namespaced() {
        assert!(model_cache_dir().ends_with("neuro-rag/models"));
    }
}
