//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 수집(ingest)과 질의(query)가 같은 임베딩 모델을 공유합니다.
//! 백엔드는 시작 시 한 번 결정되며, 디바이스 선택은 속도에만 영향을 줍니다.
//!
//! - [`LocalEmbedding`]: fastembed(ONNX) 로컬 추론 (기본, all-MiniLM-L6-v2)
//! - [`GeminiEmbedding`]: Gemini 임베딩 API
//! - [`LexicalEmbedding`]: 해시 기반 bag-of-words (오프라인/테스트용)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&settings).await?;
//! let embedding = embedder.embed("What is ADHD?").await?;
//! ```

mod gemini;
mod lexical;
mod local;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{get_api_key, Settings};
use crate::error::ConfigError;

pub use gemini::{GeminiEmbedding, DEFAULT_DIMENSION};
pub use lexical::{LexicalEmbedding, LEXICAL_MODEL_ID};
pub use local::LocalEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
/// 같은 모델에서 같은 텍스트는 같은 벡터를 반환해야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 질의 임베딩 (기본 구현: [`embed`](Self::embed))
    ///
    /// 질의와 문서를 다르게 인코딩하는 모델은 이 메서드를 재정의합니다.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(query).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 ID (인덱스 매니페스트에 기록됨)
    fn name(&self) -> &str;
}

// ============================================================================
// Device Selection
// ============================================================================

/// 디바이스 선호 설정 (`NEURORAG_DEVICE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// 가속기가 있으면 사용, 없으면 CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(format!("unknown device '{}', expected auto, cpu or cuda", other)),
        }
    }
}

/// 실제 사용 디바이스
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

impl DevicePreference {
    /// 선호 설정과 하드웨어 감지 결과로 디바이스 결정
    pub fn resolve(self) -> Device {
        self.resolve_with(cuda_available())
    }

    fn resolve_with(self, cuda: bool) -> Device {
        match (self, cuda) {
            (DevicePreference::Cpu, _) => Device::Cpu,
            (DevicePreference::Auto, true) | (DevicePreference::Cuda, true) => Device::Cuda,
            (DevicePreference::Auto, false) => Device::Cpu,
            (DevicePreference::Cuda, false) => {
                tracing::warn!("CUDA requested but no CUDA device detected, falling back to CPU");
                Device::Cpu
            }
        }
    }
}

/// CUDA 디바이스 감지
///
/// NVIDIA 디바이스 노드 또는 `CUDA_VISIBLE_DEVICES` 로 판단합니다.
fn cuda_available() -> bool {
    if let Ok(visible) = std::env::var("CUDA_VISIBLE_DEVICES") {
        let visible = visible.trim();
        if visible.is_empty() || visible == "-1" {
            return false;
        }
        return true;
    }
    Path::new("/dev/nvidia0").exists()
}

// ============================================================================
// Backend Selection
// ============================================================================

/// 임베딩 백엔드 종류 (닫힌 집합)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Gemini,
    Lexical,
}

impl BackendKind {
    /// 모델 ID로 백엔드 결정
    pub fn for_model(model_id: &str) -> Self {
        let id = model_id.trim();
        if id == LEXICAL_MODEL_ID {
            BackendKind::Lexical
        } else if id.trim_start_matches("models/").starts_with("gemini-embedding")
            || id.trim_start_matches("models/").starts_with("text-embedding-")
        {
            BackendKind::Gemini
        } else {
            BackendKind::Local
        }
    }
}

/// 모델 ID 정규화
///
/// 같은 모델을 가리키는 별칭(`all-MiniLM-L6-v2` 와 `sentence-transformers/all-MiniLM-L6-v2`,
/// `models/gemini-embedding-001` 과 `gemini-embedding-001`)을 하나의 ID 로 맞춥니다.
pub fn canonical_model_id(model_id: &str) -> String {
    let id = model_id.trim();
    match BackendKind::for_model(id) {
        BackendKind::Local => local::canonical_id(id).unwrap_or(id).to_string(),
        BackendKind::Gemini => id.trim_start_matches("models/").to_string(),
        BackendKind::Lexical => id.to_string(),
    }
}

/// 설정에 맞는 임베딩 프로바이더 생성
///
/// 모델 로드는 비싸므로 프로세스당 한 번만 호출하는 것을 전제로 합니다.
pub async fn create_embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
    let model_id = settings.embedding_model.clone();

    let embedder: Arc<dyn EmbeddingProvider> = match BackendKind::for_model(&model_id) {
        BackendKind::Lexical => Arc::new(LexicalEmbedding::new()),
        BackendKind::Gemini => {
            let api_key = get_api_key()?;
            let dimension = settings.embedding_dimension.unwrap_or(DEFAULT_DIMENSION);
            let embedder = GeminiEmbedding::new(api_key, &model_id, dimension)
                .map_err(|e| ConfigError::backend("Gemini embedding", &e))?;
            Arc::new(embedder)
        }
        BackendKind::Local => {
            let device = settings.device.resolve();
            // 모델 다운로드/로드는 블로킹 작업
            let embedder =
                tokio::task::spawn_blocking(move || LocalEmbedding::new(&model_id, device))
                    .await
                    .map_err(|e| ConfigError::Backend {
                        component: "local embedding",
                        message: e.to_string(),
                    })?
                    .map_err(|e| ConfigError::backend("local embedding", &e))?;
            Arc::new(embedder)
        }
    };

    if let Some(requested) = settings.embedding_dimension {
        if requested != embedder.dimension() {
            return Err(ConfigError::InvalidValue {
                key: "NEURORAG_EMBEDDING_DIMENSION",
                value: requested.to_string(),
                reason: format!(
                    "{} produces {}-d embeddings",
                    embedder.name(),
                    embedder.dimension()
                ),
            });
        }
    }

    tracing::info!(
        "Using embedding model {} (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_for_model() {
        assert_eq!(
            BackendKind::for_model("sentence-transformers/all-MiniLM-L6-v2"),
            BackendKind::Local
        );
        assert_eq!(
            BackendKind::for_model("gemini-embedding-001"),
            BackendKind::Gemini
        );
        assert_eq!(
            BackendKind::for_model("models/gemini-embedding-001"),
            BackendKind::Gemini
        );
        assert_eq!(BackendKind::for_model("lexical-hash-v1"), BackendKind::Lexical);
    }

    #[test]
    fn test_canonical_model_id() {
        assert_eq!(
            canonical_model_id("all-MiniLM-L6-v2"),
            canonical_model_id("sentence-transformers/all-MiniLM-L6-v2")
        );
        assert_eq!(
            canonical_model_id("models/gemini-embedding-001"),
            "gemini-embedding-001"
        );
        assert_eq!(canonical_model_id(LEXICAL_MODEL_ID), LEXICAL_MODEL_ID);
        assert_eq!(canonical_model_id("my/custom-model"), "my/custom-model");
    }

    #[test]
    fn test_device_preference_parse() {
        assert_eq!("auto".parse::<DevicePreference>(), Ok(DevicePreference::Auto));
        assert_eq!("CPU".parse::<DevicePreference>(), Ok(DevicePreference::Cpu));
        assert_eq!("gpu".parse::<DevicePreference>(), Ok(DevicePreference::Cuda));
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_device_resolution() {
        assert_eq!(DevicePreference::Auto.resolve_with(true), Device::Cuda);
        assert_eq!(DevicePreference::Auto.resolve_with(false), Device::Cpu);
        assert_eq!(DevicePreference::Cpu.resolve_with(true), Device::Cpu);
        assert_eq!(DevicePreference::Cuda.resolve_with(false), Device::Cpu);
    }

    #[tokio::test]
    async fn test_create_lexical_embedder() {
        let settings = Settings {
            embedding_model: LEXICAL_MODEL_ID.to_string(),
            ..Settings::default()
        };
        let embedder = create_embedder(&settings).await.unwrap();
        assert_eq!(embedder.name(), LEXICAL_MODEL_ID);
        assert_eq!(embedder.dimension(), lexical::LEXICAL_DIMENSION);
    }

    #[tokio::test]
    async fn test_dimension_override_must_match_model() {
        let settings = Settings {
            embedding_model: LEXICAL_MODEL_ID.to_string(),
            embedding_dimension: Some(768),
            ..Settings::default()
        };
        let err = create_embedder(&settings).await.err().unwrap();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "NEURORAG_EMBEDDING_DIMENSION",
                ..
            }
        ));
    }
}
