//! 공유 리소스 - 임베딩 모델과 열린 인덱스
//!
//! 모델 로드와 인덱스 열기는 비싸므로 프로세스당 한 번만 수행하고 공유합니다.
//! 모델이나 인덱스 경로를 바꾸려면 재시작하거나 [`reset`] 을 호출해야 합니다.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;

use crate::chain::{PromptTemplate, RagChain};
use crate::config::Settings;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::ConfigError;
use crate::generation::GeminiChat;
use crate::knowledge::{IndexManifest, LanceVectorStore, VectorStore};

/// 질의 파이프라인 리소스
pub struct Resources {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<LanceVectorStore>,
    /// 인덱스 매니페스트 (오래된 인덱스에는 없을 수 있음)
    pub manifest: Option<IndexManifest>,
    /// 인덱스 레코드 수
    pub record_count: usize,
}

impl Resources {
    /// 인덱스를 열고 임베딩 모델과의 호환성을 확인
    ///
    /// 인덱스가 없거나 비어 있으면 임베딩 모델을 로드하기 전에 실패합니다.
    pub async fn load(settings: &Settings) -> Result<Self, ConfigError> {
        let (store, record_count) = open_index(&settings.index_dir).await?;
        let manifest = read_manifest(&settings.index_dir).await?;
        let embedder = create_embedder(settings).await?;
        Self::assemble(settings, store, record_count, manifest, embedder)
    }

    /// 이미 준비된 임베딩 모델로 인덱스 열기
    pub async fn with_embedder(
        settings: &Settings,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, ConfigError> {
        let (store, record_count) = open_index(&settings.index_dir).await?;
        let manifest = read_manifest(&settings.index_dir).await?;
        Self::assemble(settings, store, record_count, manifest, embedder)
    }

    fn assemble(
        settings: &Settings,
        store: LanceVectorStore,
        record_count: usize,
        manifest: Option<IndexManifest>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, ConfigError> {
        if store.dimension() != embedder.dimension() {
            return Err(ConfigError::IndexIncompatible {
                reason: format!(
                    "index dimension is {} but {} produces {}",
                    store.dimension(),
                    embedder.name(),
                    embedder.dimension()
                ),
            });
        }

        match &manifest {
            Some(manifest) => manifest
                .check_compatible(embedder.name(), embedder.dimension())
                .map_err(|reason| ConfigError::IndexIncompatible { reason })?,
            None => tracing::warn!(
                "No {} in {:?}, only the embedding dimension was checked",
                crate::knowledge::MANIFEST_FILE,
                settings.index_dir
            ),
        }

        tracing::info!(
            "Opened index {:?} ({} records, model {})",
            settings.index_dir,
            record_count,
            embedder.name()
        );

        Ok(Self {
            embedder,
            store: Arc::new(store),
            manifest,
            record_count,
        })
    }
}

async fn read_manifest(index_dir: &Path) -> Result<Option<IndexManifest>, ConfigError> {
    IndexManifest::read(index_dir)
        .await
        .map_err(|e| ConfigError::backend("index manifest", &e))
}

/// 인덱스 열기 (없음/비어 있음은 설정 에러)
async fn open_index(path: &Path) -> Result<(LanceVectorStore, usize), ConfigError> {
    if !path.is_dir() {
        return Err(ConfigError::IndexMissing {
            path: path.to_path_buf(),
        });
    }

    let store = LanceVectorStore::open(path)
        .await
        .map_err(|e| ConfigError::backend("vector index", &e))?
        .ok_or_else(|| ConfigError::IndexEmpty {
            path: path.to_path_buf(),
        })?;

    let count = store
        .count()
        .await
        .map_err(|e| ConfigError::backend("vector index", &e))?;
    if count == 0 {
        return Err(ConfigError::IndexEmpty {
            path: path.to_path_buf(),
        });
    }

    Ok((store, count))
}

// ============================================================================
// Shared Slot
// ============================================================================

fn slot() -> &'static Mutex<Option<Arc<Resources>>> {
    static SHARED: OnceLock<Mutex<Option<Arc<Resources>>>> = OnceLock::new();
    SHARED.get_or_init(|| Mutex::new(None))
}

/// 공유 리소스 (최초 호출 시 로드)
///
/// 동시에 호출되어도 로드는 한 번만 일어납니다. 실패하면 슬롯은 비어 있는 채로 남습니다.
pub async fn shared(settings: &Settings) -> Result<Arc<Resources>, ConfigError> {
    let mut guard = slot().lock().await;
    if let Some(resources) = guard.as_ref() {
        return Ok(Arc::clone(resources));
    }

    let resources = Arc::new(Resources::load(settings).await?);
    *guard = Some(Arc::clone(&resources));
    Ok(resources)
}

/// 공유 리소스 해제 (다음 [`shared`] 호출 시 다시 로드)
pub async fn reset() {
    slot().lock().await.take();
}

/// 설정으로 질의 체인 구성
///
/// API 키를 가장 먼저 확인하여, 키가 없으면 모델을 로드하지 않고 실패합니다.
pub async fn build_chain(settings: &Settings) -> Result<RagChain, ConfigError> {
    settings.validate()?;
    let api_key = settings.require_api_key()?;
    let template = PromptTemplate::load(settings.prompt_file.as_deref())?;

    let resources = shared(settings).await?;
    let model = GeminiChat::new(api_key, &settings.llm_model, settings.temperature)
        .map_err(|e| ConfigError::backend("Gemini chat", &e))?;

    let store: Arc<dyn VectorStore> = resources.store.clone();
    Ok(RagChain::new(
        Arc::clone(&resources.embedder),
        store,
        Arc::new(model),
        template,
        settings.retrieval_k,
    ))
}
