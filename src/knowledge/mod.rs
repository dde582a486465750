//! Knowledge 모듈 - 청킹 및 벡터 인덱스
//!
//! - Chunker: 고정 크기 문자 창 분할
//! - VectorStore: 인덱스 쓰기/검색 인터페이스
//! - LanceDB: 디스크 영속 벡터 인덱스 (코사인 거리)
//! - Manifest: 인덱스를 만든 임베딩 모델과 청킹 설정 기록

mod chunker;
mod lance;
mod manifest;
mod vector;

// Re-exports
pub use chunker::{split, Chunk, ChunkConfig, Chunker, WindowChunker};
pub use lance::{LanceVectorStore, TABLE_NAME};
pub use manifest::{IndexManifest, MANIFEST_FILE};
#[cfg(test)]
pub(crate) use vector::cosine_similarity;
pub use vector::{score_from_distance, sort_by_score, IndexRecord, SearchResult, VectorStore};
