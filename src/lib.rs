//! neuro-rag - 신경발달장애 문서 기반 RAG 챗봇
//!
//! 문서를 청크로 나눠 임베딩하여 LanceDB 에 저장하고(ingest),
//! 질문마다 가장 가까운 청크를 찾아 Gemini 로 답변을 생성합니다(query).

pub mod chain;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
mod gemini;
pub mod generation;
pub mod ingest;
pub mod knowledge;
pub mod loader;
pub mod resources;

// Re-exports
pub use chain::{ChainResponse, PromptTemplate, RagChain, NOT_FOUND_MESSAGE};
pub use config::{get_api_key, has_api_key, Settings};
pub use conversation::{process_turn, Conversation, Role, Turn, SUGGESTIONS};
pub use embedding::{
    create_embedder, EmbeddingProvider, GeminiEmbedding, LexicalEmbedding, LocalEmbedding,
};
pub use error::{ConfigError, IngestError, QueryError, RagError};
pub use generation::{GeminiChat, GenerationModel, GenerationOutput};
pub use ingest::{run_ingestion, IngestReport};
pub use knowledge::{
    split, Chunk, ChunkConfig, Chunker, IndexManifest, IndexRecord, LanceVectorStore,
    SearchResult, VectorStore, WindowChunker,
};
pub use loader::{load_documents, Document, DocumentLoader};
