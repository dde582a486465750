//! RAG 체인 - 질의 임베딩, 검색, 프롬프트 조립, 생성, 답변 추출
//!
//! 체인은 상태를 바꾸지 않습니다. 대화 기록은 호출자가 관리합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let chain = RagChain::new(embedder, store, model, PromptTemplate::default(), 5);
//! let answer = chain.answer("What is ADHD?").await?;
//! ```

mod extract;
mod prompt;

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{describe, QueryError};
use crate::generation::{GenerationModel, GenerationOutput};
use crate::knowledge::{SearchResult, VectorStore};

pub use extract::{extract_answer, extract_with, ExtractionStrategy, DEFAULT_STRATEGIES};
pub use prompt::{format_context, PromptTemplate, DEFAULT_TEMPLATE, NOT_FOUND_MESSAGE};

/// 체인 응답 (답변 + 근거 청크)
#[derive(Debug, Clone)]
pub struct ChainResponse {
    /// 추출된 답변
    pub answer: String,
    /// 검색된 청크 (유사도 내림차순)
    pub passages: Vec<SearchResult>,
    /// 생성 모델 원본 출력
    pub output: GenerationOutput,
}

/// 검색 증강 생성 체인
pub struct RagChain {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    model: Arc<dyn GenerationModel>,
    template: PromptTemplate,
    k: usize,
}

impl RagChain {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        model: Arc<dyn GenerationModel>,
        template: PromptTemplate,
        k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            model,
            template,
            k,
        }
    }

    /// top-K 값
    pub fn k(&self) -> usize {
        self.k
    }

    /// 질의에 답하고 근거 청크도 함께 반환
    pub async fn respond(&self, query: &str) -> Result<ChainResponse, QueryError> {
        // 1. 질의 임베딩 (수집과 같은 모델)
        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| QueryError::Embedding {
                message: describe(&e),
            })?;

        // 2. top-K 검색
        let passages = self
            .store
            .query(&embedding, self.k)
            .await
            .map_err(|e| QueryError::Retrieval {
                message: describe(&e),
            })?;

        if passages.is_empty() {
            tracing::warn!("No passages retrieved for query, generating without context");
        } else {
            tracing::debug!(
                "Retrieved {} passages (top score {:.3})",
                passages.len(),
                passages[0].score
            );
        }

        // 3. 프롬프트 조립
        let prompt = self.template.render(&format_context(&passages), query);

        // 4. 생성
        let output = self
            .model
            .generate(&prompt)
            .await
            .map_err(|e| QueryError::Generation {
                message: describe(&e),
            })?;

        // 5. 답변 추출
        let answer = extract_answer(&output);
        tracing::info!(
            "Answered with {} ({} passages, {} chars)",
            self.model.name(),
            passages.len(),
            answer.chars().count()
        );

        Ok(ChainResponse {
            answer,
            passages,
            output,
        })
    }

    /// 질의에 대한 답변 문자열
    pub async fn answer(&self, query: &str) -> Result<String, QueryError> {
        Ok(self.respond(query).await?.answer)
    }
}

// ============================================================================
// Tests
// ============================================================================
