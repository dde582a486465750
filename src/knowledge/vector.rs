//! Vector Store - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 수집 파이프라인은 `write` 만, 질의 파이프라인은 `query` / `count` 만 사용합니다.

use anyhow::Result;
use async_trait::async_trait;

// ============================================================================
// Types
// ============================================================================

/// 인덱스 레코드 (저장용)
#[derive(Debug, Clone)]
pub struct IndexRecord {
    /// 원본 문서 경로
    pub source: String,
    /// 페이지 번호 (1부터, 페이지 없는 문서는 None)
    pub page: Option<u32>,
    /// 문서 내 청크 순번 (0-based)
    pub chunk_index: u32,
    /// 청크 텍스트
    pub text: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// 원본 문서 경로
    pub source: String,
    /// 페이지 번호
    pub page: Option<u32>,
    /// 청크 순번
    pub chunk_index: u32,
    /// 청크 텍스트
    pub text: String,
    /// 코사인 유사도 (높을수록 유사)
    pub score: f32,
}

impl SearchResult {
    /// 사람이 읽을 수 있는 출처 표기 (`file.pdf p.3 #2`)
    pub fn citation(&self) -> String {
        match self.page {
            Some(page) => format!("{} p.{} #{}", self.source, page, self.chunk_index),
            None => format!("{} #{}", self.source, self.chunk_index),
        }
    }
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 레코드 배치 저장, 저장된 개수 반환
    async fn write(&self, records: &[IndexRecord]) -> Result<usize>;

    /// 가장 유사한 k개 레코드 (유사도 내림차순)
    ///
    /// `k == 0` 이면 빈 결과, `k` 가 레코드 수보다 크면 전체를 반환합니다.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// 저장된 레코드 수
    async fn count(&self) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 거리를 유사도 점수로 변환 (`1 - distance`)
///
/// 영벡터 질의처럼 거리가 정의되지 않으면(NaN) 0.0.
pub fn score_from_distance(distance: f32) -> f32 {
    let score = 1.0 - distance;
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
#[cfg(test)]
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 유사도 내림차순 정렬 (NaN 은 뒤로)
pub fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or_else(|| a.score.is_nan().cmp(&b.score.is_nan()))
    });
}

// ============================================================================
// Tests
// ============================================================================
